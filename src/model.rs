// 该文件是 Songshu （松鼠哨） 项目的一部分。
// src/model.rs - 模型
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

use thiserror::Error;
use tracing::{debug, info};

use crate::{
  frame::Frame,
  postprocess::{Detection, PostprocessError, Postprocessor, RawOutput},
};

/// 推理引擎：输入预处理后的 NCHW 张量，输出 `[预测数, 4 + 类别数]` 的原始结果
pub trait Model {
  type Error;

  fn infer(&self, frame: &Frame, tensor: &[f32]) -> Result<RawOutput, Self::Error>;
}

mod replay;
pub use self::replay::{ReplayError, ReplayLayout, ReplayModel};

#[derive(Error, Debug)]
pub enum DetectError<E: std::error::Error + 'static> {
  #[error("推理错误: {0}")]
  Inference(#[source] E),
  #[error("后处理错误: {0}")]
  Postprocess(#[from] PostprocessError),
}

/// 推理引擎与后处理的组合
pub struct Detector<M> {
  model: M,
  postprocessor: Postprocessor,
}

impl<M> Detector<M>
where
  M: Model,
  M::Error: std::error::Error + 'static,
{
  pub fn new(model: M, postprocessor: Postprocessor) -> Self {
    Self {
      model,
      postprocessor,
    }
  }

  pub fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, DetectError<M::Error>> {
    let input_size = self.postprocessor.config().input_size;
    debug!(
      "预处理 {}x{} -> {}x{}",
      frame.width(),
      frame.height(),
      input_size,
      input_size
    );
    let tensor = frame.to_nchw_tensor(input_size);

    let now = std::time::Instant::now();
    let raw = self
      .model
      .infer(frame, &tensor)
      .map_err(DetectError::Inference)?;
    debug!(
      "推理完成，耗时: {:.2?}, 输出 {} x {}",
      now.elapsed(),
      raw.num_predictions(),
      raw.row_len()
    );

    let detections = self.postprocessor.process(&raw)?;
    info!("检测到 {} 个目标", detections.len());
    for det in &detections {
      info!("  - {}: {:.2}%", det.class_name, det.score * 100.0);
    }

    Ok(detections)
  }
}
