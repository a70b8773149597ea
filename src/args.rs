// 该文件是 Songshu （松鼠哨） 项目的一部分。
// src/args.rs - 项目参数配置
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

use clap::{Parser, ValueEnum};
use songshu::config::ClassNameTable;
use url::Url;

/// JSON 记录中的标签形式
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum RecordLabel {
  Name,
  Id,
}

/// Songshu 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 监视的输入目录，例如 folder:///srv/inbox
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 检测到目标时原图的输出目录
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,

  /// 检测到目标时标注图的输出目录，可加 ?dated 按日期分目录
  #[arg(long, value_name = "OUTPUT")]
  pub annotated: Url,

  /// 未检测到目标时原图的移入目录
  #[arg(long, value_name = "OUTPUT")]
  pub no_detection: Url,

  /// 处理失败的文件移入目录，默认为输入目录下的 .failed
  #[arg(long, value_name = "OUTPUT")]
  pub failed: Option<Url>,

  /// 推理引擎，例如 replay:///srv/tensors?predictions=8400
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 模型输入尺寸（正方形边长）
  #[arg(long, default_value = "640", value_name = "PIXELS")]
  pub input_size: u32,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.5", value_name = "THRESHOLD")]
  pub confidence: f32,

  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.45", value_name = "THRESHOLD")]
  pub nms_threshold: f32,

  /// 逗号分隔的类别名称，顺序即类别编号
  #[arg(long, default_value = "squirrel", value_name = "NAMES")]
  pub class_names: ClassNameTable,

  /// 接受的文件扩展名
  #[arg(long, default_value = "jpg,jpeg,png", value_delimiter = ',')]
  pub extensions: Vec<String>,

  /// 目录轮询间隔（毫秒）
  #[arg(long, default_value = "1000", value_name = "MS")]
  pub poll_delay_ms: u64,

  /// 最多处理的文件数
  #[arg(long, value_name = "COUNT")]
  pub max_files: Option<usize>,

  /// 为标注图写入 JSON 记录，标签写类别名称或编号
  #[arg(long, value_enum, value_name = "LABEL")]
  pub record: Option<RecordLabel>,

  /// 标签字体文件，默认使用内置字体
  #[arg(long, value_name = "FILE")]
  pub font: Option<std::path::PathBuf>,

  /// 处理完当前文件后退出，不再等待新文件
  #[arg(long)]
  pub once: bool,
}

#[cfg(test)]
mod tests {
  use super::*;

  const REQUIRED: [&str; 9] = [
    "songshu",
    "--input",
    "folder:///srv/inbox",
    "--output",
    "folder:///srv/out",
    "--annotated",
    "folder:///srv/annotated",
    "--no-detection",
    "folder:///srv/empty",
  ];

  fn parse(extra: &[&str]) -> Result<Args, clap::Error> {
    let mut argv: Vec<&str> = REQUIRED.to_vec();
    argv.extend(["--model", "replay:///srv/tensors"]);
    argv.extend(extra);
    Args::try_parse_from(argv)
  }

  #[test]
  fn record_label_is_name_or_id() {
    assert_eq!(parse(&[]).unwrap().record, None);
    assert_eq!(
      parse(&["--record", "name"]).unwrap().record,
      Some(RecordLabel::Name)
    );
    assert_eq!(parse(&["--record", "id"]).unwrap().record, Some(RecordLabel::Id));
    assert!(parse(&["--record", "nmae"]).is_err());
  }

  #[test]
  fn defaults_match_detector_settings() {
    let args = parse(&[]).unwrap();
    assert_eq!(args.input_size, 640);
    assert_eq!(args.confidence, 0.5);
    assert_eq!(args.nms_threshold, 0.45);
    assert_eq!(args.class_names.name(0), Some("squirrel"));
    assert_eq!(args.extensions, vec!["jpg", "jpeg", "png"]);
  }
}
