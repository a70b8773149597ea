// 该文件是 Songshu （松鼠哨） 项目的一部分。
// src/postprocess/decode.rs - 原始预测解码
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

use tracing::{debug, error};

use super::{Candidate, PostprocessError, RawOutput};
use crate::{config::DetectorConfig, geometry::NormalizedBox};

/// 把原始输出逐行解码为候选框，输出顺序与输入行顺序一致
///
/// 行长度必须等于 `4 + 类别数`，否则整批拒绝，不做部分解码。
pub fn decode(raw: &RawOutput, config: &DetectorConfig) -> Result<Vec<Candidate>, PostprocessError> {
  let expected = config.row_len();
  if raw.row_len() != expected {
    error!(
      "模型输出每行 {} 个值, 与类别表要求的 {} 个不一致",
      raw.row_len(),
      expected
    );
    return Err(PostprocessError::ShapeMismatch {
      expected,
      actual: raw.row_len(),
    });
  }

  let input_size = config.input_size as f32;
  let mut candidates = Vec::new();

  for row in raw.rows() {
    let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);

    let Some((class_id, score)) = argmax(&row[4..]) else {
      continue;
    };

    if score < config.confidence_threshold {
      continue;
    }

    candidates.push(Candidate {
      class_id,
      score,
      bbox: NormalizedBox::from_center_pixels(cx, cy, w, h, input_size),
    });
  }

  debug!(
    "解码 {} 个预测, 置信度过滤后剩余 {} 个候选",
    raw.num_predictions(),
    candidates.len()
  );

  Ok(candidates)
}

// 并列时取下标最小者；NaN 分数不参与比较
fn argmax(scores: &[f32]) -> Option<(usize, f32)> {
  let mut best: Option<(usize, f32)> = None;
  for (index, &score) in scores.iter().enumerate() {
    if score.is_nan() {
      continue;
    }
    match best {
      Some((_, best_score)) if score <= best_score => {}
      _ => best = Some((index, score)),
    }
  }
  best
}
