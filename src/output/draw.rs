// 该文件是 Songshu （松鼠哨） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use std::io::Cursor;

use ab_glyph::{FontArc, PxScale};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use thiserror::Error;
use tracing::debug;

use crate::{frame::Frame, postprocess::Detection};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 18.0;
const LABEL_HORIZONTAL_PADDING: i32 = 10;
const LABEL_VERTICAL_PADDING: i32 = 4;
const BOX_STROKE_WIDTH: i32 = 3;
const BOX_COLOR: [u8; 3] = [0, 255, 0]; // 绿色
const TEXT_COLOR: [u8; 3] = [255, 255, 0]; // 黄色

/// 日志与消息头中每个检测结果对应的符号
pub const DETECTION_GLYPH: &str = "🐿️";

static DEFAULT_FONT: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

#[derive(Error, Debug)]
pub enum AnnotateError {
  #[error("字体无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
  #[error("字体文件读取错误: {0}")]
  FontIo(#[from] std::io::Error),
  #[error("图像编码错误: {0}")]
  EncodeError(#[from] image::ImageError),
}

/// 标注结果：重新编码后的图像与检测统计
#[derive(Debug, Clone)]
pub struct Annotated {
  pub bytes: Vec<u8>,
  pub detection_count: usize,
  pub glyphs: String,
}

/// 在图像上绘制检测框与标签
pub struct Annotator {
  font: FontArc,
  font_size: f32,
  stroke_width: i32,
  box_color: Rgb<u8>,
  text_color: Rgb<u8>,
  glyph: String,
}

impl Annotator {
  /// 使用内置字体
  pub fn new() -> Result<Self, AnnotateError> {
    let font = FontArc::try_from_slice(DEFAULT_FONT)?;
    Ok(Self::with_font(font))
  }

  /// 从字体文件加载
  pub fn from_font_file(path: impl AsRef<std::path::Path>) -> Result<Self, AnnotateError> {
    let data = std::fs::read(path)?;
    let font = FontArc::try_from_vec(data)?;
    Ok(Self::with_font(font))
  }

  pub fn with_font(font: FontArc) -> Self {
    Self {
      font,
      font_size: LABEL_FONT_SIZE,
      stroke_width: BOX_STROKE_WIDTH,
      box_color: Rgb(BOX_COLOR),
      text_color: Rgb(TEXT_COLOR),
      glyph: DETECTION_GLYPH.to_string(),
    }
  }

  /// 标签文本，分数换算为百分比并四舍五入
  pub fn label(detection: &Detection) -> String {
    format!(
      "{} {}%",
      detection.class_name,
      (detection.score * 100.0).round() as i32
    )
  }

  /// 在帧图像的副本上绘制全部检测结果，并按原格式重新编码
  ///
  /// 编码失败时不返回部分结果。
  pub fn annotate(&self, frame: &Frame, detections: &[Detection]) -> Result<Annotated, AnnotateError> {
    let mut image = frame.image().clone();
    self.draw_detections(&mut image, detections);

    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image).write_to(&mut buffer, frame.format())?;

    let detection_count = detections.len();
    Ok(Annotated {
      bytes: buffer.into_inner(),
      detection_count,
      glyphs: self.glyph.repeat(detection_count),
    })
  }

  pub fn draw_detections(&self, image: &mut RgbImage, detections: &[Detection]) {
    for detection in detections {
      self.draw_bbox_with_label(image, detection);
    }
  }

  fn draw_bbox_with_label(&self, image: &mut RgbImage, detection: &Detection) {
    let (x, y, w, h) = detection.bbox.to_pixels(image.width(), image.height());
    debug!("绘制 {} 于 ({}, {}, {}x{})", detection.class_name, x, y, w, h);

    // 线宽以边框为中心向内外扩展
    let half = self.stroke_width / 2;
    for offset in -half..=(self.stroke_width - 1 - half) {
      let rect_w = w + 1 + 2 * offset;
      let rect_h = h + 1 + 2 * offset;
      if rect_w <= 0 || rect_h <= 0 {
        continue;
      }
      let rect = Rect::at(x - offset, y - offset).of_size(rect_w as u32, rect_h as u32);
      draw_hollow_rect_mut(image, rect, self.box_color);
    }

    let label = Self::label(detection);
    let scale = PxScale::from(self.font_size);
    let (text_width, text_height) = text_size(scale, &self.font, &label);

    // 标签背景位于边框上方，靠近图像顶部时允许超出画布
    let label_width = text_width as i32 + LABEL_HORIZONTAL_PADDING;
    let label_height = text_height as i32 + LABEL_VERTICAL_PADDING;
    let label_y = y - label_height;

    let background = Rect::at(x, label_y).of_size(label_width as u32, label_height as u32);
    draw_filled_rect_mut(image, background, self.box_color);

    draw_text_mut(
      image,
      self.text_color,
      x + LABEL_HORIZONTAL_PADDING / 2,
      label_y + LABEL_VERTICAL_PADDING / 2,
      scale,
      &self.font,
      &label,
    );
  }
}
