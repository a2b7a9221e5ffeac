// 该文件是 Shanan （山南西风） 项目的一部分。
// src/postprocess/mask.rs - 原型掩码重建
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

use std::str::FromStr;

use image::{GrayImage, Luma, imageops::FilterType};

use super::{DecodeError, sigmoid};
use crate::{
  bbox::{BBox, PixelRect},
  letterbox::Letterbox,
  tensor::TensorView,
};

const MASK_THRESHOLD: f32 = 0.5;
const MASK_ON: u8 = 255;

/// 原型张量的内存布局
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrototypeLayout {
  /// `[num_prototypes, mask_h, mask_w]`
  #[default]
  ChannelFirst,
  /// `[mask_h, mask_w, num_prototypes]`
  ChannelLast,
}

impl FromStr for PrototypeLayout {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "nchw" | "chw" | "channel-first" => Ok(PrototypeLayout::ChannelFirst),
      "nhwc" | "hwc" | "channel-last" => Ok(PrototypeLayout::ChannelLast),
      other => Err(format!("未知的原型布局: {}", other)),
    }
  }
}

/// 一次解码中所有检测共享的原型掩码
#[derive(Debug, Clone, Copy)]
pub struct PrototypeSet<'a> {
  data: &'a [f32],
  layout: PrototypeLayout,
  count: usize,
  height: usize,
  width: usize,
}

impl<'a> PrototypeSet<'a> {
  pub fn new(view: TensorView<'a>, layout: PrototypeLayout) -> Result<Self, DecodeError> {
    let view = view.squeeze_batch(3)?;
    let (count, height, width) = match layout {
      PrototypeLayout::ChannelFirst => (view.dim(0), view.dim(1), view.dim(2)),
      PrototypeLayout::ChannelLast => (view.dim(2), view.dim(0), view.dim(1)),
    };
    if count == 0 || height == 0 || width == 0 {
      return Err(DecodeError::EmptyPrototypes(view.shape().to_vec()));
    }

    Ok(Self {
      data: view.as_slice(),
      layout,
      count,
      height,
      width,
    })
  }

  pub fn count(&self) -> usize {
    self.count
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn width(&self) -> usize {
    self.width
  }

  /// 系数行向量乘以原型矩阵，得到 `mask_h * mask_w` 的原始掩码
  pub fn combine(&self, coefficients: &[f32]) -> Result<Vec<f32>, DecodeError> {
    if coefficients.len() != self.count {
      return Err(DecodeError::CoefficientLength {
        expected: self.count,
        actual: coefficients.len(),
      });
    }

    let plane = self.height * self.width;
    let raw = match self.layout {
      PrototypeLayout::ChannelFirst => {
        let mut raw = vec![0.0f32; plane];
        for (c, prototype) in coefficients.iter().zip(self.data.chunks_exact(plane)) {
          for (acc, v) in raw.iter_mut().zip(prototype) {
            *acc += c * v;
          }
        }
        raw
      }
      PrototypeLayout::ChannelLast => self
        .data
        .chunks_exact(self.count)
        .map(|pixel| pixel.iter().zip(coefficients).map(|(v, c)| v * c).sum::<f32>())
        .collect(),
    };
    Ok(raw)
  }

  /// 原型分辨率下的二值掩码，前景为 255
  pub fn binary_mask(&self, coefficients: &[f32]) -> Result<GrayImage, DecodeError> {
    let raw = self.combine(coefficients)?;
    let width = self.width;
    Ok(GrayImage::from_fn(
      self.width as u32,
      self.height as u32,
      |x, y| {
        let v = raw[y as usize * width + x as usize];
        Luma([if sigmoid(v) > MASK_THRESHOLD { MASK_ON } else { 0 }])
      },
    ))
  }
}

/// 重建单个检测的原图尺寸掩码
///
/// 先在原型分辨率二值化，再双线性缩放到模型输入尺寸，裁掉 letterbox 填充后缩放到原图尺寸，
/// 缩放后不再二值化。最后只保留裁剪到图像范围内的框内像素。
/// 返回掩码以及裁剪后的整数框。
pub fn reconstruct_mask(
  prototypes: &PrototypeSet<'_>,
  coefficients: &[f32],
  bbox: BBox,
  letterbox: &Letterbox,
  image_width: u32,
  image_height: u32,
) -> Result<(GrayImage, PixelRect), DecodeError> {
  let binary = prototypes.binary_mask(coefficients)?;
  let rect = bbox.clamp_to_image(image_width, image_height);
  if rect.is_empty() {
    return Ok((GrayImage::new(image_width, image_height), rect));
  }

  let model_mask = image::imageops::resize(
    &binary,
    letterbox.model_width(),
    letterbox.model_height(),
    FilterType::Triangle,
  );
  let content = image::imageops::crop_imm(
    &model_mask,
    letterbox.x_offset(),
    letterbox.y_offset(),
    letterbox.content_width(),
    letterbox.content_height(),
  )
  .to_image();
  let full = image::imageops::resize(&content, image_width, image_height, FilterType::Triangle);

  let mask = GrayImage::from_fn(image_width, image_height, |x, y| {
    if rect.contains(x, y) {
      *full.get_pixel(x, y)
    } else {
      Luma([0])
    }
  });
  Ok((mask, rect))
}
