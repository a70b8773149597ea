// 该文件是 Songshu （松鼠哨） 项目的一部分。
// src/postprocess/suppress.rs - 非极大值抑制
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

use std::cmp::Ordering;

use tracing::debug;

use super::{Candidate, Detection};
use crate::{config::ClassNameTable, geometry::iou};

/// 按类别区分的贪心非极大值抑制，结果按分数降序排列
///
/// 同类且 IoU 严格大于 `nms_threshold` 的低分框被抑制；不同类别之间互不抑制。
pub fn suppress(
  candidates: &[Candidate],
  class_names: &ClassNameTable,
  nms_threshold: f32,
) -> Vec<Detection> {
  // 稳定排序，分数相同（含 0.0 与 -0.0）保持原始顺序；解码后不会出现 NaN
  let mut order: Vec<usize> = (0..candidates.len()).collect();
  order.sort_by(|&a, &b| {
    candidates[b]
      .score
      .partial_cmp(&candidates[a].score)
      .unwrap_or(Ordering::Equal)
  });

  let mut suppressed = vec![false; order.len()];
  let mut detections = Vec::new();

  for i in 0..order.len() {
    if suppressed[i] {
      continue;
    }

    let best = &candidates[order[i]];
    detections.push(Detection {
      class_id: best.class_id,
      class_name: class_names
        .name(best.class_id)
        .unwrap_or("unknown")
        .to_string(),
      score: best.score,
      bbox: best.bbox,
    });

    for j in (i + 1)..order.len() {
      if suppressed[j] {
        continue;
      }
      let other = &candidates[order[j]];
      if other.class_id == best.class_id && iou(&best.bbox, &other.bbox) > nms_threshold {
        suppressed[j] = true;
      }
    }
  }

  debug!(
    "NMS: {} 个候选, 保留 {} 个",
    candidates.len(),
    detections.len()
  );

  detections
}
