// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bbox.rs - 边界框
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

use serde::{Deserialize, Serialize};

/// 左上角格式的轴对齐边界框
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BBox {
  /// 左上角 x 坐标
  pub x: f32,
  /// 左上角 y 坐标
  pub y: f32,
  /// 宽度
  pub width: f32,
  /// 高度
  pub height: f32,
}

/// 图像上的整数像素区域，右边界与下边界不包含在内
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
  pub x: u32,
  pub y: u32,
  pub width: u32,
  pub height: u32,
}

impl PixelRect {
  pub fn is_empty(&self) -> bool {
    self.width == 0 || self.height == 0
  }

  pub fn contains(&self, x: u32, y: u32) -> bool {
    x >= self.x && y >= self.y && x - self.x < self.width && y - self.y < self.height
  }
}

impl From<PixelRect> for BBox {
  fn from(rect: PixelRect) -> Self {
    BBox::new(
      rect.x as f32,
      rect.y as f32,
      rect.width as f32,
      rect.height as f32,
    )
  }
}

impl BBox {
  pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
    Self {
      x,
      y,
      width,
      height,
    }
  }

  /// 由中心点格式 (cx, cy, w, h) 转换
  pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
    Self::new(cx - 0.5 * width, cy - 0.5 * height, width, height)
  }

  pub fn right(&self) -> f32 {
    self.x + self.width
  }

  pub fn bottom(&self) -> f32 {
    self.y + self.height
  }

  pub fn area(&self) -> f32 {
    if self.width <= 0.0 || self.height <= 0.0 {
      0.0
    } else {
      self.width * self.height
    }
  }

  /// 交并比，任一框面积为零时为 0
  pub fn iou(&self, other: &BBox) -> f32 {
    let area_a = self.area();
    let area_b = other.area();
    if area_a == 0.0 || area_b == 0.0 {
      return 0.0;
    }

    let x1 = self.x.max(other.x);
    let y1 = self.y.max(other.y);
    let x2 = self.right().min(other.right());
    let y2 = self.bottom().min(other.bottom());

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = area_a + area_b - intersection;

    if union > 0.0 {
      intersection / union
    } else {
      0.0
    }
  }

  /// 截断为整数像素后裁剪到 `[0, width) x [0, height)`
  ///
  /// 各字段分别向零截断，右下角由截断后的原点与尺寸相加得到。
  /// 超出 `i64` 范围的坐标按饱和处理。
  pub fn clamp_to_image(&self, width: u32, height: u32) -> PixelRect {
    let x = self.x as i64;
    let y = self.y as i64;
    let max_x = x.saturating_add(self.width as i64).min(width as i64);
    let max_y = y.saturating_add(self.height as i64).min(height as i64);
    let x = x.clamp(0, width as i64);
    let y = y.clamp(0, height as i64);

    PixelRect {
      x: x as u32,
      y: y as u32,
      width: max_x.saturating_sub(x).max(0) as u32,
      height: max_y.saturating_sub(y).max(0) as u32,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn iou_of_identical_boxes_is_one() {
    let a = BBox::new(10.0, 10.0, 50.0, 50.0);
    assert!((a.iou(&a) - 1.0).abs() < 1e-6);
  }

  #[test]
  fn iou_of_disjoint_boxes_is_zero() {
    let a = BBox::new(0.0, 0.0, 10.0, 10.0);
    let b = BBox::new(20.0, 20.0, 10.0, 10.0);
    assert_eq!(a.iou(&b), 0.0);
  }

  #[test]
  fn iou_with_zero_area_is_zero() {
    let a = BBox::new(5.0, 5.0, 0.0, 10.0);
    let b = BBox::new(0.0, 0.0, 20.0, 20.0);
    assert_eq!(a.iou(&b), 0.0);
    assert_eq!(b.iou(&a), 0.0);
  }

  #[test]
  fn shifted_boxes_overlap_strongly() {
    let a = BBox::new(10.0, 10.0, 50.0, 50.0);
    let b = BBox::new(12.0, 12.0, 50.0, 50.0);
    let expected = (48.0 * 48.0) / (2.0 * 2500.0 - 48.0 * 48.0);
    assert!((a.iou(&b) - expected).abs() < 1e-6);
    assert!(a.iou(&b) > 0.5);
  }

  #[test]
  fn center_format_converts_to_corner() {
    let b = BBox::from_center(100.0, 50.0, 40.0, 20.0);
    assert_eq!(b, BBox::new(80.0, 40.0, 40.0, 20.0));
    assert_eq!((b.right(), b.bottom()), (120.0, 60.0));
  }

  #[test]
  fn clamp_truncates_and_limits_to_image() {
    let b = BBox::new(-10.7, 5.9, 50.2, 200.0);
    let rect = b.clamp_to_image(100, 100);
    // x: -10 + 50 = 40, y: 5 .. min(205, 100)
    assert_eq!(
      rect,
      PixelRect {
        x: 0,
        y: 5,
        width: 40,
        height: 95,
      }
    );
    assert!(rect.contains(39, 99));
    assert!(!rect.contains(40, 50));
  }

  #[test]
  fn clamp_of_box_outside_image_is_empty() {
    let b = BBox::new(150.0, 10.0, 20.0, 20.0);
    let rect = b.clamp_to_image(100, 100);
    assert!(rect.is_empty());
  }

  #[test]
  fn clamp_saturates_huge_coordinates() {
    let b = BBox::from_center(1e19, 10.0, 1e19, 20.0);
    let rect = b.clamp_to_image(32, 32);
    assert_eq!(
      rect,
      PixelRect {
        x: 32,
        y: 0,
        width: 0,
        height: 20,
      }
    );

    let b = BBox::new(-1e19, f32::MIN, f32::MAX, f32::MAX);
    let rect = b.clamp_to_image(32, 32);
    assert_eq!((rect.x, rect.y), (0, 0));
    assert!(rect.width <= 32 && rect.height <= 32);
  }
}
