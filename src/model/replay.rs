// 该文件是 Songshu （松鼠哨） 项目的一部分。
// src/model/replay.rs - 回放已记录的模型输出
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

//! 回放模型：为每张图像读取预先记录的原始输出张量。
//!
//! 张量保存在 `<目录>/<图像文件名去掉扩展名>.f32`，内容为小端 `f32` 序列。
//! 默认按 YOLOv8 原生的 `[4 + 类别数, 预测数]` 通道主序解释，
//! 可以通过 `?layout=row` 改为 `[预测数, 4 + 类别数]` 行主序。
//!
//! 预测数由 `?predictions=N` 指定（默认 8400，对应 640 输入），
//! 每行长度由文件长度推出，不取自类别表，类别数不一致时由后处理拒绝。
//!
//! ```text
//! replay:///var/lib/songshu/tensors
//! replay:///var/lib/songshu/tensors?layout=row&predictions=2100
//! ```

use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  model::Model,
  postprocess::{PostprocessError, RawOutput},
  url_path,
};

const F32_BYTES: usize = 4;
/// YOLOv8 在 640×640 输入下的预测数
pub const DEFAULT_PREDICTIONS: usize = 8400;

#[derive(Error, Debug)]
pub enum ReplayError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{actual}'")]
  SchemeMismatch {
    expected: &'static str,
    actual: String,
  },
  #[error("未知的张量布局: {0}")]
  UnknownLayout(String),
  #[error("预测数必须为正整数: {0}")]
  InvalidPredictions(String),
  #[error("图像没有可用的文件名: {0}")]
  NoFileStem(PathBuf),
  #[error("I/O 错误 ({path}): {source}")]
  IoError {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("张量文件 {path} 长度 {len} 字节, 不是 4 的倍数")]
  TruncatedTensor { path: PathBuf, len: usize },
  #[error("张量形状错误: {0}")]
  Shape(#[from] PostprocessError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplayLayout {
  /// `[4 + 类别数, 预测数]`
  #[default]
  ChannelMajor,
  /// `[预测数, 4 + 类别数]`
  RowMajor,
}

#[derive(Debug, Clone)]
pub struct ReplayModel {
  directory: PathBuf,
  layout: ReplayLayout,
  num_predictions: usize,
}

impl FromUrlWithScheme for ReplayModel {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayModel {
  type Error = ReplayError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ReplayError::SchemeMismatch {
        expected: Self::SCHEME,
        actual: url.scheme().to_string(),
      });
    }

    let mut layout = ReplayLayout::default();
    let mut num_predictions = DEFAULT_PREDICTIONS;
    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "layout" => {
          layout = match v.as_ref() {
            "channel" => ReplayLayout::ChannelMajor,
            "row" => ReplayLayout::RowMajor,
            other => return Err(ReplayError::UnknownLayout(other.to_string())),
          };
        }
        "predictions" => {
          num_predictions = match v.parse::<usize>() {
            Ok(n) if n > 0 => n,
            _ => return Err(ReplayError::InvalidPredictions(v.to_string())),
          };
        }
        _ => {}
      }
    }

    let directory = url_path(url);
    info!(
      "回放张量目录: {}, 布局: {:?}, 预测数: {}",
      directory.display(),
      layout,
      num_predictions
    );

    Ok(ReplayModel {
      directory,
      layout,
      num_predictions,
    })
  }
}

impl ReplayModel {
  pub fn new(directory: impl Into<PathBuf>, layout: ReplayLayout, num_predictions: usize) -> Self {
    Self {
      directory: directory.into(),
      layout,
      num_predictions,
    }
  }

  pub fn tensor_path(&self, frame: &Frame) -> Result<PathBuf, ReplayError> {
    let stem = frame
      .path()
      .file_stem()
      .ok_or_else(|| ReplayError::NoFileStem(frame.path().to_path_buf()))?;
    let mut name = stem.to_os_string();
    name.push(".f32");
    Ok(self.directory.join(name))
  }

  fn read_tensor(&self, path: PathBuf) -> Result<Vec<f32>, ReplayError> {
    let bytes = std::fs::read(&path).map_err(|source| ReplayError::IoError {
      path: path.clone(),
      source,
    })?;

    if bytes.len() % F32_BYTES != 0 {
      return Err(ReplayError::TruncatedTensor {
        path,
        len: bytes.len(),
      });
    }

    Ok(
      bytes
        .chunks_exact(F32_BYTES)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect(),
    )
  }
}

impl Model for ReplayModel {
  type Error = ReplayError;

  fn infer(&self, frame: &Frame, _tensor: &[f32]) -> Result<RawOutput, Self::Error> {
    let path = self.tensor_path(frame)?;
    debug!("读取张量文件: {}", path.display());
    let data = self.read_tensor(path)?;

    // 行长度由张量自身决定；不能整除时由 RawOutput 报告长度错误
    let num_predictions = self.num_predictions;
    let row_len = data.len().checked_div(num_predictions).unwrap_or(0);
    let raw = match self.layout {
      ReplayLayout::ChannelMajor => RawOutput::channel_major(data, row_len, num_predictions)?,
      ReplayLayout::RowMajor => RawOutput::row_major(data, num_predictions, row_len)?,
    };
    Ok(raw)
  }
}
