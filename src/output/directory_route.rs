// 该文件是 Songshu （松鼠哨） 项目的一部分。
// src/output/directory_route.rs - 按检测结果分拣到目录
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

use chrono::{Datelike, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  output::{
    Render,
    draw::{AnnotateError, Annotated, Annotator},
  },
  postprocess::Detection,
  url_path,
};

#[derive(Error, Debug)]
pub enum DirectoryRouteError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("缺少输出目录: {0}")]
  MissingDestination(&'static str),
  #[error("输入文件没有文件名: {0}")]
  NoFileName(PathBuf),
  #[error("I/O 错误 ({path}): {source}")]
  IoError {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("标注错误: {0}")]
  AnnotateError(#[from] AnnotateError),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> DirectoryRouteError + '_ {
  move |source| DirectoryRouteError::IoError {
    path: path.to_path_buf(),
    source,
  }
}

/// 输出目录，`folder:///path` 形式；带 `?dated` 时按 年/月/日 建子目录
#[derive(Debug, Clone, PartialEq)]
pub struct Destination {
  directory: PathBuf,
  dated: bool,
}

impl FromUrlWithScheme for Destination {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for Destination {
  type Error = DirectoryRouteError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(DirectoryRouteError::SchemeMismatch(format!(
        "期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let dated = url.query_pairs().any(|(k, _)| k == "dated");
    Ok(Destination {
      directory: url_path(url),
      dated,
    })
  }
}

impl Destination {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    Self {
      directory: directory.into(),
      dated: false,
    }
  }

  pub fn dated(mut self, dated: bool) -> Self {
    self.dated = dated;
    self
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  /// 当前应写入的目录，不存在时创建
  fn prepare(&self) -> Result<PathBuf, DirectoryRouteError> {
    let directory = if self.dated {
      let now = Utc::now();
      self
        .directory
        .join(now.year().to_string())
        .join(format!("{:02}", now.month()))
        .join(format!("{:02}", now.day()))
    } else {
      self.directory.clone()
    };

    std::fs::create_dir_all(&directory).map_err(io_error(&directory))?;
    Ok(directory)
  }

  /// 写入文件，同名文件直接覆盖
  fn write(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, DirectoryRouteError> {
    let path = self.prepare()?.join(file_name);
    std::fs::write(&path, bytes).map_err(io_error(&path))?;
    Ok(path)
  }

  /// 移动文件，跨文件系统时退化为复制后删除
  fn move_from(&self, source: &Path) -> Result<PathBuf, DirectoryRouteError> {
    let file_name = source
      .file_name()
      .ok_or_else(|| DirectoryRouteError::NoFileName(source.to_path_buf()))?;
    let target = self.prepare()?.join(file_name);

    if std::fs::rename(source, &target).is_err() {
      std::fs::copy(source, &target).map_err(io_error(source))?;
      std::fs::remove_file(source).map_err(io_error(source))?;
    }
    Ok(target)
  }
}

/// 分拣结果
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
  Detected {
    count: usize,
    original: PathBuf,
    annotated: PathBuf,
  },
  Empty {
    moved: PathBuf,
  },
}

/// 有检测结果时，原图写入输出目录、标注图写入标注目录；
/// 没有检测结果时原图移入无检测目录。处理完成后删除输入文件。
pub struct DirectoryRouter {
  output: Destination,
  annotated: Destination,
  no_detection: Destination,
  failed: Destination,
  annotator: Annotator,
  #[cfg(feature = "json_record")]
  record: Option<crate::output::record::Record>,
}

#[derive(Default)]
pub struct DirectoryRouterBuilder {
  output: Option<Destination>,
  annotated: Option<Destination>,
  no_detection: Option<Destination>,
  failed: Option<Destination>,
  annotator: Option<Annotator>,
  record: Option<bool>,
}

impl DirectoryRouterBuilder {
  pub fn output(mut self, destination: Destination) -> Self {
    self.output = Some(destination);
    self
  }

  pub fn annotated(mut self, destination: Destination) -> Self {
    self.annotated = Some(destination);
    self
  }

  pub fn no_detection(mut self, destination: Destination) -> Self {
    self.no_detection = Some(destination);
    self
  }

  pub fn failed(mut self, destination: Destination) -> Self {
    self.failed = Some(destination);
    self
  }

  pub fn annotator(mut self, annotator: Annotator) -> Self {
    self.annotator = Some(annotator);
    self
  }

  /// 为标注图写入 JSON 记录；`true` 时标签写类别名称，`false` 时写类别编号
  pub fn record(mut self, label_with_name: bool) -> Self {
    self.record = Some(label_with_name);
    self
  }

  pub fn build(self) -> Result<DirectoryRouter, DirectoryRouteError> {
    let output = self
      .output
      .ok_or(DirectoryRouteError::MissingDestination("output"))?;
    let annotated = self
      .annotated
      .ok_or(DirectoryRouteError::MissingDestination("annotated"))?;
    let no_detection = self
      .no_detection
      .ok_or(DirectoryRouteError::MissingDestination("no_detection"))?;
    let failed = self
      .failed
      .ok_or(DirectoryRouteError::MissingDestination("failed"))?;
    let annotator = match self.annotator {
      Some(annotator) => annotator,
      None => Annotator::new()?,
    };

    #[cfg(not(feature = "json_record"))]
    if self.record.is_some() {
      warn!("未启用 json_record 特性, 忽略检测记录");
    }

    Ok(DirectoryRouter {
      output,
      annotated,
      no_detection,
      failed,
      annotator,
      #[cfg(feature = "json_record")]
      record: self
        .record
        .map(|label_with_name| crate::output::record::Record { label_with_name }),
    })
  }
}

impl DirectoryRouter {
  pub fn builder() -> DirectoryRouterBuilder {
    DirectoryRouterBuilder::default()
  }

  fn file_name(frame: &Frame) -> Result<&str, DirectoryRouteError> {
    frame
      .file_name()
      .ok_or_else(|| DirectoryRouteError::NoFileName(frame.path().to_path_buf()))
  }

  fn consume(path: &Path) -> Result<(), DirectoryRouteError> {
    match std::fs::remove_file(path) {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(io_error(path)(e)),
    }
  }

  /// 删除本次已写出的文件，保证一张图像只落在一个去向
  fn rollback(written: &[PathBuf]) {
    for path in written {
      if let Err(e) = std::fs::remove_file(path) {
        warn!("无法撤销已写出的文件 {}: {}", path.display(), e);
      }
    }
  }

  fn route_detected(
    &self,
    frame: &Frame,
    detections: &[Detection],
  ) -> Result<RouteOutcome, DirectoryRouteError> {
    let file_name = Self::file_name(frame)?;

    // 先完成标注，失败时不写出任何文件
    let annotated = self.annotator.annotate(frame, detections)?;

    let mut written = Vec::with_capacity(3);
    let result = self.write_detected(frame, file_name, &annotated, detections, &mut written);
    if result.is_err() {
      Self::rollback(&written);
    }
    result
  }

  fn write_detected(
    &self,
    frame: &Frame,
    file_name: &str,
    annotated: &Annotated,
    detections: &[Detection],
    written: &mut Vec<PathBuf>,
  ) -> Result<RouteOutcome, DirectoryRouteError> {
    let original = self.output.write(file_name, frame.bytes())?;
    written.push(original.clone());

    let annotated_path = self.annotated.write(file_name, &annotated.bytes)?;
    written.push(annotated_path.clone());

    #[cfg(feature = "json_record")]
    let record_path = match &self.record {
      Some(record) => {
        let path = record
          .record(&annotated_path, detections)
          .map_err(io_error(&annotated_path))?;
        written.push(path.clone());
        Some(path)
      }
      None => None,
    };
    #[cfg(not(feature = "json_record"))]
    let _ = detections;

    Self::consume(frame.path())?;

    info!("   ✅ 原图 → {}", original.display());
    info!(
      "   {} {} 个目标, 标注图 → {}",
      annotated.glyphs,
      annotated.detection_count,
      annotated_path.display()
    );
    #[cfg(feature = "json_record")]
    if let Some(path) = record_path {
      info!("   📝 记录 → {}", path.display());
    }

    Ok(RouteOutcome::Detected {
      count: annotated.detection_count,
      original,
      annotated: annotated_path,
    })
  }

  fn route_empty(&self, frame: &Frame) -> Result<RouteOutcome, DirectoryRouteError> {
    let file_name = Self::file_name(frame)?;
    let moved = self.no_detection.write(file_name, frame.bytes())?;
    if let Err(e) = Self::consume(frame.path()) {
      Self::rollback(std::slice::from_ref(&moved));
      return Err(e);
    }
    info!("   📁 未检测到目标, 已移入 {}", moved.display());
    Ok(RouteOutcome::Empty { moved })
  }
}

impl Render for DirectoryRouter {
  type Outcome = RouteOutcome;
  type Error = DirectoryRouteError;

  fn render_result(
    &self,
    frame: &Frame,
    detections: &[Detection],
  ) -> Result<Self::Outcome, Self::Error> {
    if detections.is_empty() {
      self.route_empty(frame)
    } else {
      self.route_detected(frame, detections)
    }
  }

  fn reject(&self, path: &Path) -> Result<PathBuf, Self::Error> {
    let moved = self.failed.move_from(path)?;
    warn!("   ⚠️ 处理失败, 已移入 {}", moved.display());
    Ok(moved)
  }
}
