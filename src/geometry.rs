// 该文件是 Songshu （松鼠哨） 项目的一部分。
// src/geometry.rs - 边界框几何运算
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

/// 归一化边界框，左上角为原点，坐标位于单位正方形 `[0,1]×[0,1]` 内
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NormalizedBox {
  pub x: f32,
  pub y: f32,
  pub width: f32,
  pub height: f32,
}

impl NormalizedBox {
  pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
    Self {
      x,
      y,
      width,
      height,
    }
  }

  /// 由模型输入像素坐标系下的中心格式 `(cx, cy, w, h)` 构造，并裁剪到单位正方形内
  ///
  /// 先裁剪左上角，再以裁剪后的左上角约束宽高，保证 `x + width <= 1`、`y + height <= 1`。
  pub fn from_center_pixels(cx: f32, cy: f32, w: f32, h: f32, input_size: f32) -> Self {
    let x1 = (cx - w / 2.0) / input_size;
    let y1 = (cy - h / 2.0) / input_size;
    let w = w / input_size;
    let h = h / input_size;

    let x = clamp_unit(x1, 1.0);
    let y = clamp_unit(y1, 1.0);
    let width = clamp_unit(w, 1.0 - x);
    let height = clamp_unit(h, 1.0 - y);

    Self {
      x,
      y,
      width,
      height,
    }
  }

  pub fn right(&self) -> f32 {
    self.x + self.width
  }

  pub fn bottom(&self) -> f32 {
    self.y + self.height
  }

  pub fn area(&self) -> f32 {
    self.width * self.height
  }

  /// 按图像尺寸换算为像素坐标 `(x, y, w, h)`，四舍五入到最近的整数像素
  pub fn to_pixels(&self, image_width: u32, image_height: u32) -> (i32, i32, i32, i32) {
    let (w, h) = (image_width as f32, image_height as f32);
    (
      (self.x * w).round() as i32,
      (self.y * h).round() as i32,
      (self.width * w).round() as i32,
      (self.height * h).round() as i32,
    )
  }
}

// NaN 会落到上界，仍满足单位正方形约束
fn clamp_unit(value: f32, upper: f32) -> f32 {
  value.min(upper).max(0.0)
}

/// 计算两个边界框的交并比，并集面积为 0 时返回 0
pub fn iou(a: &NormalizedBox, b: &NormalizedBox) -> f32 {
  let x1 = a.x.max(b.x);
  let y1 = a.y.max(b.y);
  let x2 = a.right().min(b.right());
  let y2 = a.bottom().min(b.bottom());

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let union = a.area() + b.area() - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}
