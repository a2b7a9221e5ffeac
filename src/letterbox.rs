// 该文件是 Shanan （山南西风） 项目的一部分。
// src/letterbox.rs - 保持宽高比的缩放与填充
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

use image::{Rgb, RgbImage, imageops::FilterType};
use thiserror::Error;
use tracing::debug;

use crate::bbox::BBox;

/// 填充区域的灰度值
pub const LETTERBOX_FILL: [u8; 3] = [128, 128, 128];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LetterboxError {
  #[error("图像尺寸无效: {width}x{height}")]
  EmptyImage { width: u32, height: u32 },
  #[error("模型输入尺寸无效: {width}x{height}")]
  EmptyModelInput { width: u32, height: u32 },
  #[error("缩放比例无效: {0}")]
  InvalidScale(f32),
  #[error("填充偏移 ({x_offset}, {y_offset}) 超出模型输入 {width}x{height}")]
  OffsetOutOfRange {
    x_offset: u32,
    y_offset: u32,
    width: u32,
    height: u32,
  },
}

/// 缩放后的边长，至少 1 像素且不超过模型输入
fn scaled_extent(length: u32, scale: f32, limit: u32) -> u32 {
  ((length as f32 * scale) as u32).clamp(1, limit)
}

/// 图像与模型输入之间的 letterbox 变换
///
/// 只能通过 [`Letterbox::forward`] 或 [`Letterbox::new`] 构造，
/// 因此 `scale` 总是有限正数，偏移总在模型输入范围之内。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
  scale: f32,
  x_offset: u32,
  y_offset: u32,
  model_width: u32,
  model_height: u32,
}

impl Letterbox {
  pub fn new(
    scale: f32,
    x_offset: u32,
    y_offset: u32,
    model_width: u32,
    model_height: u32,
  ) -> Result<Self, LetterboxError> {
    if !(scale.is_finite() && scale > 0.0) {
      return Err(LetterboxError::InvalidScale(scale));
    }
    if model_width == 0 || model_height == 0 {
      return Err(LetterboxError::EmptyModelInput {
        width: model_width,
        height: model_height,
      });
    }
    if x_offset.saturating_mul(2) >= model_width || y_offset.saturating_mul(2) >= model_height {
      return Err(LetterboxError::OffsetOutOfRange {
        x_offset,
        y_offset,
        width: model_width,
        height: model_height,
      });
    }

    Ok(Self {
      scale,
      x_offset,
      y_offset,
      model_width,
      model_height,
    })
  }

  /// 计算把 `image_width x image_height` 的图像放入模型输入所需的变换
  pub fn forward(
    image_width: u32,
    image_height: u32,
    model_width: u32,
    model_height: u32,
  ) -> Result<Self, LetterboxError> {
    if image_width == 0 || image_height == 0 {
      return Err(LetterboxError::EmptyImage {
        width: image_width,
        height: image_height,
      });
    }
    if model_width == 0 || model_height == 0 {
      return Err(LetterboxError::EmptyModelInput {
        width: model_width,
        height: model_height,
      });
    }

    let scale = (model_height as f32 / image_height as f32)
      .min(model_width as f32 / image_width as f32);
    let scaled_width = scaled_extent(image_width, scale, model_width);
    let scaled_height = scaled_extent(image_height, scale, model_height);
    let x_offset = (model_width - scaled_width) / 2;
    let y_offset = (model_height - scaled_height) / 2;

    debug!(
      "letterbox: {}x{} -> {}x{}, 缩放 {:.4}, 偏移 ({}, {})",
      image_width, image_height, model_width, model_height, scale, x_offset, y_offset
    );

    Self::new(scale, x_offset, y_offset, model_width, model_height)
  }

  pub fn scale(&self) -> f32 {
    self.scale
  }

  pub fn x_offset(&self) -> u32 {
    self.x_offset
  }

  pub fn y_offset(&self) -> u32 {
    self.y_offset
  }

  pub fn model_width(&self) -> u32 {
    self.model_width
  }

  pub fn model_height(&self) -> u32 {
    self.model_height
  }

  /// 去掉两侧填充后的有效区域宽度
  pub fn content_width(&self) -> u32 {
    self.model_width - 2 * self.x_offset
  }

  /// 去掉两侧填充后的有效区域高度
  pub fn content_height(&self) -> u32 {
    self.model_height - 2 * self.y_offset
  }

  /// 模型坐标 -> 原图坐标
  pub fn inverse_box(&self, bbox: BBox) -> BBox {
    BBox::new(
      (bbox.x - self.x_offset as f32) / self.scale,
      (bbox.y - self.y_offset as f32) / self.scale,
      bbox.width / self.scale,
      bbox.height / self.scale,
    )
  }

  /// 原图坐标 -> 模型坐标
  pub fn forward_box(&self, bbox: BBox) -> BBox {
    BBox::new(
      bbox.x * self.scale + self.x_offset as f32,
      bbox.y * self.scale + self.y_offset as f32,
      bbox.width * self.scale,
      bbox.height * self.scale,
    )
  }

  /// 生成模型输入图像：双线性缩放后放在灰色画布中央
  pub fn apply(&self, image: &RgbImage) -> RgbImage {
    let scaled_width = scaled_extent(image.width(), self.scale, self.model_width);
    let scaled_height = scaled_extent(image.height(), self.scale, self.model_height);

    let resized = image::imageops::resize(image, scaled_width, scaled_height, FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(self.model_width, self.model_height, Rgb(LETTERBOX_FILL));
    image::imageops::replace(
      &mut canvas,
      &resized,
      self.x_offset as i64,
      self.y_offset as i64,
    );
    canvas
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn landscape_image_is_padded_vertically() {
    let lb = Letterbox::forward(1280, 720, 640, 640).unwrap();
    assert!((lb.scale() - 0.5).abs() < 1e-6);
    assert_eq!(lb.x_offset(), 0);
    assert_eq!(lb.y_offset(), 140);
    assert_eq!(lb.content_width(), 640);
    assert_eq!(lb.content_height(), 360);
  }

  #[test]
  fn portrait_image_is_padded_horizontally() {
    let lb = Letterbox::forward(300, 600, 640, 640).unwrap();
    assert!((lb.scale() - 640.0 / 600.0).abs() < 1e-6);
    assert_eq!(lb.y_offset(), 0);
    assert_eq!(lb.x_offset(), (640 - 320) / 2);
  }

  #[test]
  fn padded_axis_adds_up_to_model_size() {
    for (w, h) in [(1920, 1080), (333, 777), (640, 480), (17, 1000)] {
      let lb = Letterbox::forward(w, h, 640, 640).unwrap();
      let width = lb.scale() * w as f32 + 2.0 * lb.x_offset() as f32;
      let height = lb.scale() * h as f32 + 2.0 * lb.y_offset() as f32;
      assert!((width - 640.0).abs() <= 2.0, "{w}x{h}: {width}");
      assert!((height - 640.0).abs() <= 2.0, "{w}x{h}: {height}");
    }
  }

  #[test]
  fn box_round_trip_recovers_image_box() {
    let lb = Letterbox::forward(1280, 720, 640, 640).unwrap();
    let image_box = BBox::new(100.0, 200.0, 300.0, 150.0);
    let model = lb.forward_box(image_box);
    assert_eq!(model, BBox::new(50.0, 240.0, 150.0, 75.0));

    let back = lb.inverse_box(model);
    assert!((back.x - image_box.x).abs() < 1e-3);
    assert!((back.y - image_box.y).abs() < 1e-3);
    assert!((back.width - image_box.width).abs() < 1e-3);
    assert!((back.height - image_box.height).abs() < 1e-3);
  }

  #[test]
  fn invalid_scale_is_rejected() {
    assert_eq!(
      Letterbox::new(0.0, 0, 0, 640, 640).unwrap_err(),
      LetterboxError::InvalidScale(0.0)
    );
    assert!(Letterbox::new(-1.0, 0, 0, 640, 640).is_err());
    assert!(Letterbox::new(f32::NAN, 0, 0, 640, 640).is_err());
    assert!(Letterbox::new(1.0, 320, 0, 640, 640).is_err());
  }

  #[test]
  fn empty_image_is_rejected() {
    assert_eq!(
      Letterbox::forward(0, 10, 640, 640).unwrap_err(),
      LetterboxError::EmptyImage {
        width: 0,
        height: 10,
      }
    );
  }

  #[test]
  fn apply_fills_padding_with_gray() {
    let image = RgbImage::from_pixel(40, 20, Rgb([255, 0, 0]));
    let lb = Letterbox::forward(40, 20, 32, 32).unwrap();
    let input = lb.apply(&image);
    assert_eq!(input.dimensions(), (32, 32));
    assert_eq!(lb.y_offset(), 8);
    assert_eq!(input.get_pixel(16, 0), &Rgb(LETTERBOX_FILL));
    assert_eq!(input.get_pixel(16, 31), &Rgb(LETTERBOX_FILL));
    assert_eq!(input.get_pixel(16, 16), &Rgb([255, 0, 0]));
  }

  #[test]
  fn apply_places_image_at_forward_offsets() {
    // 宽度差为奇数时，右侧多出的一列也是填充
    let image = RgbImage::from_pixel(33, 30, Rgb([0, 0, 255]));
    let lb = Letterbox::forward(33, 30, 32, 32).unwrap();
    let input = lb.apply(&image);
    let scaled_width = scaled_extent(33, lb.scale(), 32);
    let scaled_height = scaled_extent(30, lb.scale(), 32);
    assert_eq!(lb.x_offset(), (32 - scaled_width) / 2);
    assert_eq!(lb.y_offset(), (32 - scaled_height) / 2);
    assert_eq!(input.get_pixel(lb.x_offset(), lb.y_offset()), &Rgb([0, 0, 255]));
    assert_eq!(
      input.get_pixel(lb.x_offset() + scaled_width - 1, lb.y_offset() + scaled_height - 1),
      &Rgb([0, 0, 255])
    );
  }
}
