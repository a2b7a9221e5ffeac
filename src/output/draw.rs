// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/draw.rs - 掩码与检测框绘制
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

use std::path::Path;

use ab_glyph::{FontVec, InvalidFont, PxScale};
use image::{GrayImage, Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut},
  rect::Rect,
};
use thiserror::Error;
use tracing::debug;

use crate::model::{Detection, SegmentResult};

const PALETTE_SIZE: usize = 80;
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_TEXT_HEIGHT: i32 = 20;
// 每字符平均宽度（粗略估计）
const LABEL_CHAR_WIDTH: f32 = 8.0;
const DEFAULT_MASK_ALPHA: f32 = 0.5;

#[derive(Error, Debug)]
pub enum FontLoadError {
  #[error("字体文件读取错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体无效: {0}")]
  InvalidFont(#[from] InvalidFont),
}

/// 把分割结果叠加到原图上
pub struct Draw {
  font: Option<FontVec>,
  font_scale: PxScale,
  colors: Vec<Rgb<u8>>,
  mask_alpha: f32,
}

impl Default for Draw {
  fn default() -> Self {
    // 每个类别一种颜色
    let colors = (0..PALETTE_SIZE)
      .map(|i| {
        let hue = (i as f32 / PALETTE_SIZE as f32) * 360.0;
        hsv_to_rgb(hue, 0.8, 0.9)
      })
      .collect();

    Self {
      font: None,
      font_scale: PxScale::from(LABEL_FONT_SIZE),
      colors,
      mask_alpha: DEFAULT_MASK_ALPHA,
    }
  }
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = if h < 60.0 {
    (c, x, 0.0)
  } else if h < 120.0 {
    (x, c, 0.0)
  } else if h < 180.0 {
    (0.0, c, x)
  } else if h < 240.0 {
    (0.0, x, c)
  } else if h < 300.0 {
    (x, 0.0, c)
  } else {
    (c, 0.0, x)
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}

impl Draw {
  pub fn with_font_file(mut self, path: impl AsRef<Path>) -> Result<Self, FontLoadError> {
    let data = std::fs::read(path.as_ref())?;
    debug!("加载字体: {}", path.as_ref().display());
    self.font = Some(FontVec::try_from_vec(data)?);
    Ok(self)
  }

  pub fn mask_alpha(mut self, alpha: f32) -> Self {
    self.mask_alpha = alpha.clamp(0.0, 1.0);
    self
  }

  pub fn color(&self, label: u32) -> Rgb<u8> {
    self.colors[label as usize % self.colors.len()]
  }

  /// 掩码值按比例参与混合，缩放边缘的中间值得到半透明过渡
  fn blend_mask(&self, image: &mut RgbImage, mask: &GrayImage, color: Rgb<u8>) {
    if mask.dimensions() != image.dimensions() {
      debug!(
        "掩码尺寸 {:?} 与图像 {:?} 不一致，跳过",
        mask.dimensions(),
        image.dimensions()
      );
      return;
    }
    for (pixel, value) in image.pixels_mut().zip(mask.pixels()) {
      let value = value.0[0];
      if value == 0 {
        continue;
      }
      let alpha = self.mask_alpha * value as f32 / 255.0;
      for (channel, target) in pixel.0.iter_mut().zip(color.0) {
        *channel = (*channel as f32 * (1.0 - alpha) + target as f32 * alpha).round() as u8;
      }
    }
  }

  fn draw_bbox(&self, image: &mut RgbImage, detection: &Detection, color: Rgb<u8>) -> Option<Rect> {
    let rect = detection.bbox.clamp_to_image(image.width(), image.height());
    if rect.is_empty() {
      return None;
    }
    let outer = Rect::at(rect.x as i32, rect.y as i32).of_size(rect.width, rect.height);
    draw_hollow_rect_mut(image, outer, color);

    // 第二道边框加粗
    if rect.width > 2 && rect.height > 2 {
      let inner = Rect::at(rect.x as i32 + 1, rect.y as i32 + 1)
        .of_size(rect.width - 2, rect.height - 2);
      draw_hollow_rect_mut(image, inner, color);
    }
    Some(outer)
  }

  fn draw_label(&self, image: &mut RgbImage, detection: &Detection, rect: Rect, color: Rgb<u8>) {
    let Some(font) = &self.font else {
      return;
    };

    let label = format!("{} {:.2}", detection.label_name(), detection.confidence);
    let text_width = (label.len() as f32 * LABEL_CHAR_WIDTH) as i32;
    let label_x = rect.left();
    let label_y = (rect.top() - LABEL_TEXT_HEIGHT).max(0);
    let label_width = text_width.min(image.width() as i32 - label_x);
    if label_width <= 0 {
      return;
    }

    let background =
      Rect::at(label_x, label_y).of_size(label_width as u32, LABEL_TEXT_HEIGHT as u32);
    draw_filled_rect_mut(image, background, color);
    draw_text_mut(
      image,
      Rgb([255u8, 255, 255]),
      label_x,
      label_y + 2,
      self.font_scale,
      font,
      &label,
    );
  }

  pub fn draw_segments(&self, image: &mut RgbImage, result: &SegmentResult) {
    // 先画全部掩码，避免后面的掩码盖住前面的框
    for detection in result {
      if let Some(mask) = &detection.mask {
        self.blend_mask(image, mask, self.color(detection.label));
      }
    }
    for detection in result {
      let color = self.color(detection.label);
      if let Some(rect) = self.draw_bbox(image, detection, color) {
        self.draw_label(image, detection, rect, color);
      }
    }
  }

  pub fn render(&self, image: &RgbImage, result: &SegmentResult) -> RgbImage {
    let mut canvas = image.clone();
    self.draw_segments(&mut canvas, result);
    canvas
  }
}
