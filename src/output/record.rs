// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/record.rs - 以 JSON 记录分割结果
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

use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  bbox::BBox,
  model::{Detection, SegmentResult},
  output::Render,
};

#[derive(Error, Debug)]
pub enum RecordOutputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
  pub label: u32,
  pub name: String,
  pub confidence: f32,
  pub bbox: BBox,
  pub anchor: usize,
  pub mask_area: usize,
  /// 掩码 PNG 的文件名，与记录文件位于同一目录
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub mask: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
  pub width: u32,
  pub height: u32,
  pub detections: Vec<DetectionRecord>,
}

pub struct RecordOutput {
  path: PathBuf,
  save_masks: bool,
}

impl FromUrlWithScheme for RecordOutput {
  const SCHEME: &'static str = "record";
}

impl FromUrl for RecordOutput {
  type Error = RecordOutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(RecordOutputError::SchemeMismatch(uri.scheme().to_string()));
    }

    let save_masks = uri.query_pairs().any(|(k, _)| k == "masks");

    Ok(RecordOutput {
      path: PathBuf::from(uri.path()),
      save_masks,
    })
  }
}

impl RecordOutput {
  pub fn new(path: impl Into<PathBuf>, save_masks: bool) -> Self {
    Self {
      path: path.into(),
      save_masks,
    }
  }

  fn mask_file_name(&self, index: usize) -> String {
    let stem = self
      .path
      .file_stem()
      .map(|s| s.to_string_lossy().into_owned())
      .unwrap_or_else(|| "record".to_string());
    format!("{}-mask-{:03}.png", stem, index)
  }

  fn record_detection(
    &self,
    directory: &Path,
    index: usize,
    detection: &Detection,
  ) -> Result<DetectionRecord, RecordOutputError> {
    let mask = match (&detection.mask, self.save_masks) {
      (Some(mask), true) => {
        let name = self.mask_file_name(index);
        mask.save(directory.join(&name))?;
        debug!("保存掩码: {}", name);
        Some(name)
      }
      _ => None,
    };

    Ok(DetectionRecord {
      label: detection.label,
      name: detection.label_name().into_owned(),
      confidence: detection.confidence,
      bbox: detection.bbox,
      anchor: detection.anchor,
      mask_area: detection.mask_area(),
      mask,
    })
  }
}

impl Render<RgbImage, SegmentResult> for RecordOutput {
  type Error = RecordOutputError;

  fn render_result(&self, frame: &RgbImage, result: &SegmentResult) -> Result<(), Self::Error> {
    let directory = match self.path.parent() {
      Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
      _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&directory)?;

    let detections = result
      .iter()
      .enumerate()
      .map(|(index, detection)| self.record_detection(&directory, index, detection))
      .collect::<Result<Vec<_>, _>>()?;

    let record = FrameRecord {
      width: frame.width(),
      height: frame.height(),
      detections,
    };
    let file = std::fs::File::create(&self.path)?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), &record)?;
    info!(
      "记录 {} 个检测结果到: {}",
      record.detections.len(),
      self.path.display()
    );
    Ok(())
  }
}
