// 该文件是 Songshu （松鼠哨） 项目的一部分。
// src/config.rs - 检测参数配置
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

use std::{str::FromStr, sync::Arc};

use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
  #[error("类别列表为空")]
  EmptyClassNames,
  #[error("第 {0} 个类别名称为空")]
  EmptyClassName(usize),
  #[error("模型输入尺寸必须为正整数")]
  ZeroInputSize,
  #[error("{name} 必须位于 [0, 1] 区间内, 实际为 {value}")]
  ThresholdOutOfRange { name: &'static str, value: f32 },
}

/// 类别名称表，下标即类别编号；克隆只复制引用计数
#[derive(Debug, Clone, PartialEq)]
pub struct ClassNameTable {
  names: Arc<[String]>,
}

impl ClassNameTable {
  pub fn new<I, S>(names: I) -> Result<Self, ConfigError>
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let names: Vec<String> = names.into_iter().map(Into::into).collect();
    if names.is_empty() {
      return Err(ConfigError::EmptyClassNames);
    }
    if let Some(index) = names.iter().position(|n| n.is_empty()) {
      return Err(ConfigError::EmptyClassName(index));
    }

    Ok(Self {
      names: names.into(),
    })
  }

  /// 解析逗号分隔的类别列表，去除首尾空白
  pub fn parse(s: &str) -> Result<Self, ConfigError> {
    Self::new(s.split(',').map(str::trim))
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn name(&self, class_id: usize) -> Option<&str> {
    self.names.get(class_id).map(String::as_str)
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.names.iter().map(String::as_str)
  }
}

impl FromStr for ClassNameTable {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::parse(s)
  }
}

/// 后处理参数，启动时确定，运行期间只读
#[derive(Debug, Clone)]
pub struct DetectorConfig {
  /// 模型输入的正方形边长（像素）
  pub input_size: u32,
  /// 置信度阈值，低于该值的预测被丢弃
  pub confidence_threshold: f32,
  /// NMS IoU 阈值，同类 IoU 严格大于该值时被抑制
  pub nms_threshold: f32,
  pub class_names: ClassNameTable,
}

impl DetectorConfig {
  pub fn new(
    input_size: u32,
    confidence_threshold: f32,
    nms_threshold: f32,
    class_names: ClassNameTable,
  ) -> Result<Self, ConfigError> {
    let config = Self {
      input_size,
      confidence_threshold,
      nms_threshold,
      class_names,
    };
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.input_size == 0 {
      return Err(ConfigError::ZeroInputSize);
    }
    check_unit_range("confidence_threshold", self.confidence_threshold)?;
    check_unit_range("nms_threshold", self.nms_threshold)?;

    debug!(
      "检测配置: 输入 {}x{}, 置信度阈值 {}, NMS 阈值 {}, 类别 {:?}",
      self.input_size,
      self.input_size,
      self.confidence_threshold,
      self.nms_threshold,
      self.class_names.iter().collect::<Vec<_>>()
    );
    Ok(())
  }

  pub fn num_classes(&self) -> usize {
    self.class_names.len()
  }

  /// 每条原始预测的期望长度：4 个框坐标加每类一个分数
  pub fn row_len(&self) -> usize {
    4 + self.num_classes()
  }
}

fn check_unit_range(name: &'static str, value: f32) -> Result<(), ConfigError> {
  if (0.0..=1.0).contains(&value) {
    Ok(())
  } else {
    Err(ConfigError::ThresholdOutOfRange { name, value })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_comma_separated_names() {
    let table = ClassNameTable::parse("squirrel, bird ,cat").unwrap();
    assert_eq!(table.len(), 3);
    assert_eq!(table.name(0), Some("squirrel"));
    assert_eq!(table.name(1), Some("bird"));
    assert_eq!(table.name(2), Some("cat"));
    assert_eq!(table.name(3), None);
  }

  #[test]
  fn rejects_empty_names() {
    assert_eq!(
      ClassNameTable::parse("squirrel,,cat"),
      Err(ConfigError::EmptyClassName(1))
    );
    assert_eq!(ClassNameTable::parse(""), Err(ConfigError::EmptyClassName(0)));
    assert_eq!(
      ClassNameTable::new(Vec::<String>::new()),
      Err(ConfigError::EmptyClassNames)
    );
  }

  #[test]
  fn validates_thresholds_and_input_size() {
    let names = ClassNameTable::parse("squirrel").unwrap();
    assert!(DetectorConfig::new(640, 0.5, 0.45, names.clone()).is_ok());
    assert!(DetectorConfig::new(640, 0.0, 1.0, names.clone()).is_ok());
    assert_eq!(
      DetectorConfig::new(0, 0.5, 0.45, names.clone()).unwrap_err(),
      ConfigError::ZeroInputSize
    );
    assert!(matches!(
      DetectorConfig::new(640, 1.5, 0.45, names.clone()),
      Err(ConfigError::ThresholdOutOfRange {
        name: "confidence_threshold",
        ..
      })
    ));
    assert!(matches!(
      DetectorConfig::new(640, 0.5, f32::NAN, names),
      Err(ConfigError::ThresholdOutOfRange {
        name: "nms_threshold",
        ..
      })
    ));
  }

  #[test]
  fn row_len_counts_box_and_scores() {
    let names = ClassNameTable::parse("a,b,c").unwrap();
    let config = DetectorConfig::new(320, 0.25, 0.5, names).unwrap();
    assert_eq!(config.num_classes(), 3);
    assert_eq!(config.row_len(), 7);
  }
}
