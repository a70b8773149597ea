// 该文件是 Songshu （松鼠哨） 项目的一部分。
// src/input/watch_directory.rs - 轮询目录输入
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

//! # 轮询目录输入
//!
//! 定期列出目录中扩展名匹配的文件，按文件名排序后逐个产出。
//! 文件由下游移走后不再出现；若下游没有移走，同一文件只产出一次，
//! 直到它从目录中消失后再次出现。
//!
//! ```text
//! folder:///srv/inbox
//! ```

use std::{
  collections::HashSet,
  path::PathBuf,
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  thread,
  time::{Duration, Instant},
};

use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, url_path};

const DEFAULT_POLL_DELAY: Duration = Duration::from_millis(1000);
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Error, Debug)]
pub enum WatchDirectoryError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error ({path}): {source}")]
  IoError {
    path: PathBuf,
    source: std::io::Error,
  },
}

/// 停止标志，可在信号处理函数中设置
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
  pub fn stop(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_stopped(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }
}

pub struct WatchDirectory {
  directory: PathBuf,
  extensions: Vec<String>,
  poll_delay: Duration,
  once: bool,
  stop: StopHandle,
  yielded: HashSet<PathBuf>,
}

impl FromUrlWithScheme for WatchDirectory {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for WatchDirectory {
  type Error = WatchDirectoryError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(WatchDirectoryError::SchemaMismatch);
    }

    Ok(WatchDirectory::new(url_path(url)))
  }
}

impl WatchDirectory {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    Self {
      directory: directory.into(),
      extensions: vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()],
      poll_delay: DEFAULT_POLL_DELAY,
      once: false,
      stop: StopHandle::default(),
      yielded: HashSet::new(),
    }
  }

  /// 接受的扩展名，不区分大小写
  pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    self.extensions = extensions
      .into_iter()
      .map(|e| e.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
      .filter(|e| !e.is_empty())
      .collect();
    self
  }

  pub fn with_poll_delay(mut self, poll_delay: Duration) -> Self {
    self.poll_delay = poll_delay;
    self
  }

  /// 目录清空后结束，而不是继续等待新文件
  pub fn once(mut self, once: bool) -> Self {
    self.once = once;
    self
  }

  pub fn stop_handle(&self) -> StopHandle {
    self.stop.clone()
  }

  pub fn directory(&self) -> &std::path::Path {
    &self.directory
  }

  fn accepts(&self, path: &std::path::Path) -> bool {
    let hidden = path
      .file_name()
      .and_then(|n| n.to_str())
      .is_none_or(|n| n.starts_with('.'));
    if hidden {
      return false;
    }

    path
      .extension()
      .and_then(|e| e.to_str())
      .map(|e| {
        let e = e.to_ascii_lowercase();
        self.extensions.iter().any(|x| *x == e)
      })
      .unwrap_or(false)
  }

  /// 当前目录中待处理的文件，按文件名排序
  pub fn pending(&self) -> Result<Vec<PathBuf>, WatchDirectoryError> {
    let io_error = |source| WatchDirectoryError::IoError {
      path: self.directory.clone(),
      source,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(&self.directory).map_err(io_error)? {
      let entry = entry.map_err(io_error)?;
      let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
      let path = entry.path();
      if is_file && self.accepts(&path) {
        files.push(path);
      }
    }
    files.sort();
    Ok(files)
  }

  fn sleep(&self) {
    let deadline = Instant::now() + self.poll_delay;
    while !self.stop.is_stopped() {
      let now = Instant::now();
      if now >= deadline {
        break;
      }
      thread::sleep(STOP_CHECK_INTERVAL.min(deadline - now));
    }
  }
}

impl Iterator for WatchDirectory {
  type Item = Result<PathBuf, WatchDirectoryError>;

  fn next(&mut self) -> Option<Self::Item> {
    loop {
      if self.stop.is_stopped() {
        info!("停止轮询目录 {}", self.directory.display());
        return None;
      }

      let files = match self.pending() {
        Ok(files) => files,
        Err(e) => return Some(Err(e)),
      };

      // 已消失的文件允许再次出现
      self.yielded.retain(|p| files.contains(p));

      if let Some(path) = files.into_iter().find(|p| !self.yielded.contains(p)) {
        debug!("发现待处理文件: {}", path.display());
        self.yielded.insert(path.clone());
        return Some(Ok(path));
      }

      if self.once {
        return None;
      }
      self.sleep();
    }
  }
}
