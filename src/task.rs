// 该文件是 Songshu （松鼠哨） 项目的一部分。
// src/task.rs - 处理任务
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

use std::{
  path::{Path, PathBuf},
  thread,
  time::Duration,
};

use anyhow::Context;
use tracing::{info, warn};

use crate::{
  frame::Frame,
  input::{StopHandle, WatchDirectoryError},
  model::{Detector, Model},
  output::{Render, RouteOutcome},
};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, detector: &Detector<M>, output: &O) -> Result<TaskSummary, Self::Error>;
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TaskSummary {
  pub processed: usize,
  pub with_detections: usize,
  pub without_detections: usize,
  pub failed: usize,
  pub detections: usize,
}

impl TaskSummary {
  fn add(&mut self, outcome: &RouteOutcome) {
    self.processed += 1;
    match outcome {
      RouteOutcome::Detected { count, .. } => {
        self.with_detections += 1;
        self.detections += count;
      }
      RouteOutcome::Empty { .. } => self.without_detections += 1,
    }
  }
}

/// 处理单个文件：读取、解码、检测、分拣
pub fn process_file<M, O>(
  path: &Path,
  detector: &Detector<M>,
  output: &O,
) -> anyhow::Result<RouteOutcome>
where
  M: Model,
  M::Error: std::error::Error + Send + Sync + 'static,
  O: Render<Outcome = RouteOutcome>,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  let bytes = std::fs::read(path).with_context(|| format!("无法读取文件: {}", path.display()))?;
  let frame =
    Frame::decode(path, bytes).with_context(|| format!("无法解码图像: {}", path.display()))?;
  let detections = detector
    .detect(&frame)
    .with_context(|| format!("检测失败: {}", path.display()))?;
  let outcome = output.render_result(&frame, &detections)?;
  Ok(outcome)
}

fn process_or_reject<M, O>(
  path: &Path,
  detector: &Detector<M>,
  output: &O,
  summary: &mut TaskSummary,
) where
  M: Model,
  M::Error: std::error::Error + Send + Sync + 'static,
  O: Render<Outcome = RouteOutcome>,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  info!("📷 处理: {}", path.display());
  match process_file(path, detector, output) {
    Ok(outcome) => summary.add(&outcome),
    Err(e) => {
      warn!("处理 {} 失败: {:#}", path.display(), e);
      summary.failed += 1;
      // 移不走的文件不会被同一个输入重复产出
      if let Err(e) = output.reject(path) {
        warn!("无法移走失败文件 {}: {}", path.display(), e);
      }
    }
  }
}

/// 只处理输入中的第一个文件
pub struct OneShotTask;

impl<I, M, O> Task<I, M, O> for OneShotTask
where
  I: Iterator<Item = Result<PathBuf, WatchDirectoryError>>,
  M: Model,
  M::Error: std::error::Error + Send + Sync + 'static,
  O: Render<Outcome = RouteOutcome>,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, detector: &Detector<M>, output: &O) -> Result<TaskSummary, Self::Error> {
    info!("开始任务...");
    let path = input.next().ok_or_else(|| anyhow::anyhow!("没有待处理的文件"))??;

    let mut summary = TaskSummary::default();
    process_or_reject(&path, detector, output, &mut summary);
    info!("任务完成: {:?}", summary);
    Ok(summary)
  }
}

/// 持续处理输入，直到输入结束、收到停止信号或达到文件数上限
#[derive(Default, Debug)]
pub struct WatchTask {
  max_files: Option<usize>,
}

impl WatchTask {
  pub fn with_max_files(mut self, max_files: Option<usize>) -> Self {
    self.max_files = max_files;
    self
  }
}

impl<I, M, O> Task<I, M, O> for WatchTask
where
  I: Iterator<Item = Result<PathBuf, WatchDirectoryError>>,
  M: Model,
  M::Error: std::error::Error + Send + Sync + 'static,
  O: Render<Outcome = RouteOutcome>,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, detector: &Detector<M>, output: &O) -> Result<TaskSummary, Self::Error> {
    info!("开始任务...");
    let mut summary = TaskSummary::default();

    for path in input {
      // 目录不可读属于配置问题，直接终止
      let path = path?;
      process_or_reject(&path, detector, output, &mut summary);

      let handled = summary.processed + summary.failed;
      if self.max_files.map(|n| handled >= n).unwrap_or(false) {
        info!("达到指定文件数 {}, 退出任务循环", handled);
        break;
      }
    }

    info!(
      "任务完成: 处理 {} 个文件, 有目标 {} 个, 无目标 {} 个, 失败 {} 个, 共检测到 {} 个目标",
      summary.processed,
      summary.with_detections,
      summary.without_detections,
      summary.failed,
      summary.detections
    );
    Ok(summary)
  }
}

/// 注册 Ctrl-C 处理函数：第一次收到信号时请求停止，30 秒内未退出则强制结束
pub fn install_stop_handler(stop: StopHandle) -> Result<(), ctrlc::Error> {
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    stop.stop();
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })
}
