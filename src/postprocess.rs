// 该文件是 Songshu （松鼠哨） 项目的一部分。
// src/postprocess.rs - 检测结果后处理
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

//! # 后处理
//!
//! 把模型输出的原始张量转换为去重后的检测结果：
//!
//! 1. [`decode`] 逐行读取 `[cx, cy, w, h, score_0 .. score_{K-1}]`，取最高分类别，
//!    按置信度阈值过滤，并把中心格式的像素框转换为归一化的左上角格式；
//! 2. [`suppress`] 对候选框做按类别区分的贪心非极大值抑制。
//!
//! 两步都是纯函数，不持有可变状态，可以在多个线程上并行处理不同图像。
//!
//! ```
//! use songshu::config::{ClassNameTable, DetectorConfig};
//! use songshu::postprocess::{Postprocessor, RawOutput};
//!
//! let names = ClassNameTable::parse("squirrel").unwrap();
//! let config = DetectorConfig::new(640, 0.5, 0.45, names).unwrap();
//! let raw = RawOutput::row_major(
//!   vec![100.0, 100.0, 50.0, 50.0, 0.9, 105.0, 105.0, 50.0, 50.0, 0.8],
//!   2,
//!   5,
//! )
//! .unwrap();
//!
//! let detections = Postprocessor::new(config).process(&raw).unwrap();
//! assert_eq!(detections.len(), 1);
//! assert_eq!(detections[0].score, 0.9);
//! ```

use thiserror::Error;

use crate::{config::DetectorConfig, geometry::NormalizedBox};

mod decode;
mod suppress;

pub use self::decode::decode;
pub use self::suppress::suppress;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PostprocessError {
  #[error("模型输出形状不匹配: 每条预测期望 {expected} 个值 (4 + 类别数), 实际 {actual} 个")]
  ShapeMismatch { expected: usize, actual: usize },
  #[error("模型输出长度不匹配: 期望 {expected} 个值, 实际 {actual} 个")]
  BufferLength { expected: usize, actual: usize },
}

/// 模型输出的原始张量，按行存储，每行对应一个预测位置
#[derive(Debug, Clone, PartialEq)]
pub struct RawOutput {
  data: Box<[f32]>,
  num_predictions: usize,
  row_len: usize,
}

impl RawOutput {
  /// 由 `[num_predictions, row_len]` 行主序数据构造
  pub fn row_major(
    data: Vec<f32>,
    num_predictions: usize,
    row_len: usize,
  ) -> Result<Self, PostprocessError> {
    check_buffer_len(data.len(), num_predictions, row_len)?;
    Ok(Self {
      data: data.into_boxed_slice(),
      num_predictions,
      row_len,
    })
  }

  /// 由 `[row_len, num_predictions]` 通道主序数据构造（YOLOv8 的原生输出布局），转置为行主序
  pub fn channel_major(
    data: Vec<f32>,
    row_len: usize,
    num_predictions: usize,
  ) -> Result<Self, PostprocessError> {
    check_buffer_len(data.len(), num_predictions, row_len)?;

    let mut rows = vec![0.0f32; data.len()];
    for c in 0..row_len {
      for p in 0..num_predictions {
        rows[p * row_len + c] = data[c * num_predictions + p];
      }
    }

    Ok(Self {
      data: rows.into_boxed_slice(),
      num_predictions,
      row_len,
    })
  }

  pub fn num_predictions(&self) -> usize {
    self.num_predictions
  }

  pub fn row_len(&self) -> usize {
    self.row_len
  }

  pub fn row(&self, index: usize) -> Option<&[f32]> {
    let start = index.checked_mul(self.row_len)?;
    self.data.get(start..start + self.row_len)
  }

  pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
    // row_len 为 0 时 chunks_exact 会 panic
    self.data.chunks_exact(self.row_len.max(1))
  }
}

fn check_buffer_len(
  actual: usize,
  num_predictions: usize,
  row_len: usize,
) -> Result<(), PostprocessError> {
  let expected = num_predictions * row_len;
  if actual != expected {
    return Err(PostprocessError::BufferLength { expected, actual });
  }
  Ok(())
}

/// 抑制前的候选框
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
  pub class_id: usize,
  pub score: f32,
  pub bbox: NormalizedBox,
}

/// 最终检测结果
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  pub class_id: usize,
  pub class_name: String,
  pub score: f32,
  pub bbox: NormalizedBox,
}

impl From<&Detection> for Candidate {
  fn from(detection: &Detection) -> Self {
    Candidate {
      class_id: detection.class_id,
      score: detection.score,
      bbox: detection.bbox,
    }
  }
}

/// 解码与抑制的组合，持有只读配置
#[derive(Debug, Clone)]
pub struct Postprocessor {
  config: DetectorConfig,
}

impl Postprocessor {
  pub fn new(config: DetectorConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &DetectorConfig {
    &self.config
  }

  pub fn process(&self, raw: &RawOutput) -> Result<Vec<Detection>, PostprocessError> {
    let candidates = decode(raw, &self.config)?;
    Ok(suppress(
      &candidates,
      &self.config.class_names,
      self.config.nms_threshold,
    ))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn channel_major_is_transposed() {
    // 两个通道、三个预测位置
    let raw = RawOutput::channel_major(vec![1.0, 2.0, 3.0, 10.0, 20.0, 30.0], 2, 3).unwrap();
    assert_eq!(raw.num_predictions(), 3);
    assert_eq!(raw.row(0), Some(&[1.0, 10.0][..]));
    assert_eq!(raw.row(2), Some(&[3.0, 30.0][..]));
    assert_eq!(raw.row(3), None);
    assert_eq!(raw.rows().count(), 3);
  }

  #[test]
  fn buffer_length_is_checked() {
    assert_eq!(
      RawOutput::row_major(vec![0.0; 9], 2, 5),
      Err(PostprocessError::BufferLength {
        expected: 10,
        actual: 9
      })
    );
    assert!(RawOutput::channel_major(vec![0.0; 11], 5, 2).is_err());
  }

  #[test]
  fn empty_output_has_no_rows() {
    let raw = RawOutput::row_major(Vec::new(), 0, 5).unwrap();
    assert_eq!(raw.rows().count(), 0);
  }
}
