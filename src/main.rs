// 该文件是 Songshu （松鼠哨） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use songshu::{
  FromUrl,
  config::DetectorConfig,
  input::WatchDirectory,
  model::{Detector, ReplayModel},
  output::{Annotator, Destination, DirectoryRouter},
  postprocess::Postprocessor,
  task::{Task, WatchTask, install_stop_handler},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("Songshu 目录检测分拣");
  info!("输入目录: {}", args.input);
  info!("模型: {}", args.model);
  info!("置信度阈值: {}", args.confidence);
  info!("NMS 阈值: {}", args.nms_threshold);

  // 配置错误在启动时直接失败
  let config = DetectorConfig::new(
    args.input_size,
    args.confidence,
    args.nms_threshold,
    args.class_names.clone(),
  )?;

  let model = ReplayModel::from_url(&args.model)?;
  let detector = Detector::new(model, Postprocessor::new(config));

  let input = WatchDirectory::from_url(&args.input)?
    .with_extensions(&args.extensions)
    .with_poll_delay(Duration::from_millis(args.poll_delay_ms))
    .once(args.once);

  let failed = match &args.failed {
    Some(url) => Destination::from_url(url)?,
    None => Destination::new(input.directory().join(".failed")),
  };

  let annotator = match &args.font {
    Some(path) => Annotator::from_font_file(path)?,
    None => Annotator::new()?,
  };

  let mut router = DirectoryRouter::builder()
    .output(Destination::from_url(&args.output)?)
    .annotated(Destination::from_url(&args.annotated)?)
    .no_detection(Destination::from_url(&args.no_detection)?)
    .failed(failed)
    .annotator(annotator);
  if let Some(label) = args.record {
    router = router.record(label == args::RecordLabel::Name);
  }
  let router = router.build()?;

  install_stop_handler(input.stop_handle())?;

  let summary = WatchTask::default()
    .with_max_files(args.max_files)
    .run_task(input, &detector, &router)?;

  info!("处理完成: {:?}", summary);

  Ok(())
}
