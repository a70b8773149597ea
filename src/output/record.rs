// 该文件是 Songshu （松鼠哨） 项目的一部分。
// src/output/record.rs - 检测结果记录
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

use std::path::{Path, PathBuf};

use serde_json::{Value, json};

use crate::postprocess::Detection;

/// 以 JSON 旁路文件记录检测结果，文件名为图像文件名加 `.json`
pub struct Record {
  pub label_with_name: bool,
}

impl Record {
  pub fn to_json(&self, source: &str, detections: &[Detection]) -> Value {
    let items: Vec<Value> = detections
      .iter()
      .map(|d| {
        let label = if self.label_with_name {
          json!(d.class_name)
        } else {
          json!(d.class_id)
        };
        json!({
          "label": label,
          "score": d.score,
          "bbox": [d.bbox.x, d.bbox.y, d.bbox.width, d.bbox.height],
        })
      })
      .collect();

    json!({
      "source": source,
      "count": detections.len(),
      "detections": items,
    })
  }

  pub fn record(
    &self,
    image_path: &Path,
    detections: &[Detection],
  ) -> Result<PathBuf, std::io::Error> {
    let source = image_path
      .file_name()
      .and_then(|n| n.to_str())
      .unwrap_or_default();
    let mut name = image_path.as_os_str().to_os_string();
    name.push(".json");
    let path = PathBuf::from(name);

    let text = serde_json::to_string_pretty(&self.to_json(source, detections))
      .map_err(std::io::Error::other)?;
    std::fs::write(&path, text)?;
    Ok(path)
  }
}
