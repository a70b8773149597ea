// 该文件是 Songshu （松鼠哨） 项目的一部分。
// src/frame.rs - 图像帧与预处理
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

use image::{ImageFormat, RgbImage, imageops::FilterType};
use thiserror::Error;

const RGB_CHANNELS: usize = 3;

#[derive(Error, Debug)]
pub enum FrameError {
  #[error("无法识别图像格式: {0}")]
  UnknownFormat(image::ImageError),
  #[error("图像解码错误: {0}")]
  DecodeError(image::ImageError),
}

/// 一张待检测的图像：原始字节、解码后的 RGB 像素以及编码格式
#[derive(Debug, Clone)]
pub struct Frame {
  path: PathBuf,
  bytes: Vec<u8>,
  image: RgbImage,
  format: ImageFormat,
}

impl Frame {
  /// 从原始字节解码，格式由文件头判断
  pub fn decode(path: impl Into<PathBuf>, bytes: Vec<u8>) -> Result<Self, FrameError> {
    let format = image::guess_format(&bytes).map_err(FrameError::UnknownFormat)?;
    let image = image::load_from_memory_with_format(&bytes, format)
      .map_err(FrameError::DecodeError)?
      .to_rgb8();

    Ok(Self {
      path: path.into(),
      bytes,
      image,
      format,
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// 文件名，不含目录
  pub fn file_name(&self) -> Option<&str> {
    self.path.file_name().and_then(|n| n.to_str())
  }

  pub fn bytes(&self) -> &[u8] {
    &self.bytes
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  pub fn format(&self) -> ImageFormat {
    self.format
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  /// 缩放到 `input_size × input_size`，转为 NCHW 排列并归一化到 `[0, 1]`
  pub fn to_nchw_tensor(&self, input_size: u32) -> Vec<f32> {
    let resized = image::imageops::resize(&self.image, input_size, input_size, FilterType::Triangle);

    let plane = (input_size as usize) * (input_size as usize);
    let mut tensor = vec![0.0f32; RGB_CHANNELS * plane];

    for (x, y, pixel) in resized.enumerate_pixels() {
      let idx = (y as usize) * (input_size as usize) + (x as usize);
      for c in 0..RGB_CHANNELS {
        tensor[c * plane + idx] = pixel[c] as f32 / 255.0;
      }
    }

    tensor
  }
}
