// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/read_image_file.rs - 读取图像文件
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

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{found}'")]
  SchemaMismatch { expected: &'static str, found: String },
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像加载错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("图像尺寸无效: {width}x{height}")]
  EmptyImage { width: u32, height: u32 },
}

const READ_IMAGE_FILE_SCHEME: &str = "image";

/// 单张图像文件，解码为 RGB
pub struct ImageFileInput {
  image: RgbImage,
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != READ_IMAGE_FILE_SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        READ_IMAGE_FILE_SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch {
        expected: READ_IMAGE_FILE_SCHEME,
        found: url.scheme().to_string(),
      });
    }

    let path = url.path();
    debug!("读取图像文件: {}", path);
    let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    Self::from_image(image.into_rgb8())
  }
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = READ_IMAGE_FILE_SCHEME;
}

impl ImageFileInput {
  pub fn from_image(image: RgbImage) -> Result<Self, ImageFileInputError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
      error!("图像尺寸无效: {}x{}", width, height);
      return Err(ImageFileInputError::EmptyImage { width, height });
    }
    debug!("图像尺寸: {}x{}", width, height);
    Ok(Self { image })
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  pub fn into_images(self) -> ImageFileInputIter {
    ImageFileInputIter {
      image: Some(self.image),
    }
  }
}

/// 只产出一帧的迭代器
pub struct ImageFileInputIter {
  image: Option<RgbImage>,
}

impl Iterator for ImageFileInputIter {
  type Item = RgbImage;

  fn next(&mut self) -> Option<Self::Item> {
    self.image.take()
  }
}
