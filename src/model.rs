// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model.rs - 模型
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

use image::GrayImage;

use crate::{bbox::BBox, labels::label_name, postprocess::Candidate};

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

impl<M: Model + ?Sized> Model for &M {
  type Input = M::Input;
  type Output = M::Output;
  type Error = M::Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    (**self).infer(input)
  }
}

/// 单个实例分割结果
#[derive(Debug, Clone)]
pub struct Detection {
  /// 原图坐标系下的框；掩码重建后为裁剪到图像范围内的整数框
  pub bbox: BBox,
  pub confidence: f32,
  pub label: u32,
  /// 产生该检测的锚点索引
  pub anchor: usize,
  /// 原图尺寸的掩码，非零像素为前景，只出现在 `bbox` 之内
  pub mask: Option<GrayImage>,
}

impl Detection {
  pub fn label_name(&self) -> std::borrow::Cow<'static, str> {
    label_name(self.label)
  }

  /// 裁剪出框内的掩码
  pub fn mask_region(&self) -> Option<GrayImage> {
    let mask = self.mask.as_ref()?;
    let rect = self.bbox.clamp_to_image(mask.width(), mask.height());
    Some(image::imageops::crop_imm(mask, rect.x, rect.y, rect.width, rect.height).to_image())
  }

  /// 前景像素数
  pub fn mask_area(&self) -> usize {
    self
      .mask
      .as_ref()
      .map(|mask| mask.pixels().filter(|p| p.0[0] > 0).count())
      .unwrap_or(0)
  }
}

impl From<Candidate> for Detection {
  fn from(candidate: Candidate) -> Self {
    Detection {
      bbox: candidate.bbox,
      confidence: candidate.confidence,
      label: candidate.label,
      anchor: candidate.anchor,
      mask: None,
    }
  }
}

/// 一张图像的全部检测，按置信度降序
#[derive(Debug, Clone, Default)]
pub struct SegmentResult {
  pub items: Box<[Detection]>,
}

impl SegmentResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
    self.items.iter()
  }
}

impl From<Vec<Detection>> for SegmentResult {
  fn from(items: Vec<Detection>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

impl<'a> IntoIterator for &'a SegmentResult {
  type Item = &'a Detection;
  type IntoIter = std::slice::Iter<'a, Detection>;

  fn into_iter(self) -> Self::IntoIter {
    self.items.iter()
  }
}

mod yolov8_seg;
pub use self::yolov8_seg::{
  DEFAULT_BOXES_OUTPUT, DEFAULT_COEFFICIENTS_OUTPUT, DEFAULT_PROTOTYPES_OUTPUT,
  DEFAULT_SCORES_OUTPUT, OutputNames, Yolov8Seg, Yolov8SegBuilder, Yolov8SegError,
};

#[cfg(test)]
mod tests {
  use super::*;
  use image::Luma;

  #[test]
  fn mask_region_follows_bbox() {
    let mut mask = GrayImage::new(10, 10);
    for y in 2..5 {
      for x in 3..7 {
        mask.put_pixel(x, y, Luma([255]));
      }
    }
    let detection = Detection {
      bbox: BBox::new(3.0, 2.0, 4.0, 3.0),
      confidence: 0.9,
      label: 0,
      anchor: 0,
      mask: Some(mask),
    };
    let region = detection.mask_region().unwrap();
    assert_eq!(region.dimensions(), (4, 3));
    assert!(region.pixels().all(|p| p.0[0] == 255));
    assert_eq!(detection.mask_area(), 12);
    assert_eq!(detection.label_name(), "person");
  }

  #[test]
  fn detection_without_mask() {
    let detection = Detection {
      bbox: BBox::new(0.0, 0.0, 1.0, 1.0),
      confidence: 0.6,
      label: 2,
      anchor: 7,
      mask: None,
    };
    assert!(detection.mask_region().is_none());
    assert_eq!(detection.mask_area(), 0);

    let result = SegmentResult::from(vec![detection]);
    assert_eq!(result.len(), 1);
    assert_eq!(result.iter().next().map(|d| d.anchor), Some(7));
  }
}
