// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/save_image_file.rs - 保存可视化图像
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

use image::RgbImage;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::SegmentResult,
  output::{
    Render,
    draw::{Draw, FontLoadError},
  },
};

pub struct SaveImageFileOutput {
  path: String,
  draw: Draw,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("字体错误: {0}")]
  FontError(#[from] FontLoadError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("输出参数 {key} 无效: {value}")]
  InvalidOption { key: String, value: String },
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    let mut draw = Draw::default();
    for (key, value) in uri.query_pairs() {
      match &*key {
        "font" => draw = draw.with_font_file(&*value)?,
        "alpha" => {
          let alpha = value
            .parse::<f32>()
            .map_err(|_| SaveImageFileError::InvalidOption {
              key: key.to_string(),
              value: value.to_string(),
            })?;
          draw = draw.mask_alpha(alpha);
        }
        _ => {
          return Err(SaveImageFileError::InvalidOption {
            key: key.to_string(),
            value: value.to_string(),
          });
        }
      }
    }

    Ok(SaveImageFileOutput {
      path: uri.path().to_string(),
      draw,
    })
  }
}

impl SaveImageFileOutput {
  fn save_image(&self, image: RgbImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = Path::new(&self.path).parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    image.save(&self.path)?;
    info!("保存图像到文件: {}", self.path);

    Ok(())
  }
}

impl Render<RgbImage, SegmentResult> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&self, frame: &RgbImage, result: &SegmentResult) -> Result<(), Self::Error> {
    let image = self.draw.render(frame, result);
    self.save_image(image)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn writes_rendered_png() {
    let dir = std::env::temp_dir().join(format!("shanan-seg-save-{}", std::process::id()));
    let path = dir.join("out.png");
    let url = Url::parse(&format!("image://{}?alpha=0.3", path.display())).unwrap();
    let output = SaveImageFileOutput::from_url(&url).unwrap();

    let frame = RgbImage::from_pixel(8, 6, image::Rgb([1, 2, 3]));
    output
      .render_result(&frame, &SegmentResult::default())
      .unwrap();

    let saved = image::open(&path).unwrap().into_rgb8();
    std::fs::remove_dir_all(&dir).ok();
    assert_eq!(saved, frame);
  }

  #[test]
  fn unknown_option_is_rejected() {
    let url = Url::parse("image:///tmp/out.png?colour=red").unwrap();
    assert!(matches!(
      SaveImageFileOutput::from_url(&url),
      Err(SaveImageFileError::InvalidOption { .. })
    ));
  }
}
