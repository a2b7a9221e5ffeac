// 该文件是 Shanan （山南西风） 项目的一部分。
// src/postprocess.rs - 实例分割后处理
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

//! 把模型输出的分类、回归、掩码系数与原型张量解码为带掩码的检测结果。
//!
//! 处理顺序固定为：候选解码 -> NMS -> 最小边长过滤 -> 掩码重建。

use std::{str::FromStr, time::Instant};

use thiserror::Error;
use tracing::debug;

use crate::{letterbox::Letterbox, model::Detection, tensor::{TensorError, TensorView}};

mod anchor;
mod candidate;
mod mask;
mod nms;

pub use self::anchor::{AnchorRecord, AnchorTensors};
pub use self::candidate::{Candidate, decode_candidates};
pub use self::mask::{PrototypeLayout, PrototypeSet, reconstruct_mask};
pub use self::nms::{filter_min_border, non_max_suppression};

pub const DEFAULT_CONF_THRESH: f32 = 0.5;
pub const DEFAULT_NMS_THRESH: f32 = 0.5;
pub const DEFAULT_MIN_BORDER: u32 = 16;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
  #[error("张量错误: {0}")]
  Tensor(#[from] TensorError),
  #[error("框张量第一维应为 4, 实际为 {0}")]
  BoxChannels(usize),
  #[error("分类张量没有任何类别")]
  NoClasses,
  #[error("锚点数量不一致: 分类张量 {scores}, 框张量 {boxes}")]
  AnchorCountMismatch { scores: usize, boxes: usize },
  #[error("掩码系数张量形状 {shape:?} 与锚点数 {anchors}、原型数 {prototypes} 不匹配")]
  CoefficientShape {
    shape: Vec<usize>,
    anchors: usize,
    prototypes: usize,
  },
  #[error("掩码系数长度 {actual} 与原型数量 {expected} 不匹配")]
  CoefficientLength { expected: usize, actual: usize },
  #[error("原型张量为空: {0:?}")]
  EmptyPrototypes(Vec<usize>),
  #[error("阈值 {name} 无效: {value} (应在 0 到 1 之间)")]
  InvalidThreshold { name: &'static str, value: f32 },
  #[error("原图尺寸无效: {width}x{height}")]
  EmptyImage { width: u32, height: u32 },
}

/// 分类张量中分数的含义
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScoreActivation {
  /// 未激活的 logit，置信度为 sigmoid(score)
  #[default]
  Logits,
  /// 模型已经做过 sigmoid，分数本身就是置信度
  Probabilities,
}

impl ScoreActivation {
  pub fn confidence(self, score: f32) -> f32 {
    match self {
      ScoreActivation::Logits => sigmoid(score),
      ScoreActivation::Probabilities => score,
    }
  }
}

impl FromStr for ScoreActivation {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "logits" | "logit" | "raw" => Ok(ScoreActivation::Logits),
      "probabilities" | "probability" | "sigmoid" => Ok(ScoreActivation::Probabilities),
      other => Err(format!("未知的分数类型: {}", other)),
    }
  }
}

/// 后处理参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeConfig {
  /// 置信度阈值，置信度严格大于该值才保留
  pub conf_thresh: f32,
  /// NMS IoU 阈值
  pub nms_thresh: f32,
  /// 最小边长（像素），NMS 之后宽或高小于该值的结果被丢弃
  pub min_border: u32,
  /// 原型张量的内存布局
  pub prototype_layout: PrototypeLayout,
  /// 分类分数是 logit 还是已激活的概率
  pub score_activation: ScoreActivation,
}

impl Default for DecodeConfig {
  fn default() -> Self {
    Self {
      conf_thresh: DEFAULT_CONF_THRESH,
      nms_thresh: DEFAULT_NMS_THRESH,
      min_border: DEFAULT_MIN_BORDER,
      prototype_layout: PrototypeLayout::default(),
      score_activation: ScoreActivation::default(),
    }
  }
}

impl DecodeConfig {
  pub fn conf_thresh(mut self, conf_thresh: f32) -> Self {
    self.conf_thresh = conf_thresh;
    self
  }

  pub fn nms_thresh(mut self, nms_thresh: f32) -> Self {
    self.nms_thresh = nms_thresh;
    self
  }

  pub fn min_border(mut self, min_border: u32) -> Self {
    self.min_border = min_border;
    self
  }

  pub fn prototype_layout(mut self, layout: PrototypeLayout) -> Self {
    self.prototype_layout = layout;
    self
  }

  pub fn score_activation(mut self, activation: ScoreActivation) -> Self {
    self.score_activation = activation;
    self
  }

  pub fn validate(&self) -> Result<(), DecodeError> {
    for (name, value) in [
      ("conf_thresh", self.conf_thresh),
      ("nms_thresh", self.nms_thresh),
    ] {
      if !(value > 0.0 && value < 1.0) {
        return Err(DecodeError::InvalidThreshold { name, value });
      }
    }
    Ok(())
  }
}

/// 一次解码所需的四个模型输出
#[derive(Debug, Clone, Copy)]
pub struct SegmentOutputs<'a> {
  /// `[num_classes, num_anchors]`
  pub scores: TensorView<'a>,
  /// `[4, num_anchors]`，依次为 cx, cy, w, h
  pub boxes: TensorView<'a>,
  /// `[num_anchors, num_prototypes]` 或 `[num_prototypes, num_anchors]`
  pub coefficients: TensorView<'a>,
  /// `[num_prototypes, mask_h, mask_w]` 或 `[mask_h, mask_w, num_prototypes]`
  pub prototypes: TensorView<'a>,
}

pub fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}

/// 解码一张图像的全部输出
///
/// 结果按置信度降序排列；没有任何锚点超过阈值时返回空列表。
pub fn decode(
  outputs: &SegmentOutputs<'_>,
  letterbox: &Letterbox,
  image_width: u32,
  image_height: u32,
  config: &DecodeConfig,
) -> Result<Vec<Detection>, DecodeError> {
  config.validate()?;
  if image_width == 0 || image_height == 0 {
    return Err(DecodeError::EmptyImage {
      width: image_width,
      height: image_height,
    });
  }

  let prototypes = PrototypeSet::new(outputs.prototypes, config.prototype_layout)?;
  let anchors = AnchorTensors::new(
    outputs.scores,
    outputs.boxes,
    outputs.coefficients,
    prototypes.count(),
  )?;
  debug!(
    "类别数 {}, 锚点数 {}, 原型 {}x{}x{}",
    anchors.num_classes(),
    anchors.num_anchors(),
    prototypes.count(),
    prototypes.height(),
    prototypes.width()
  );

  let now = Instant::now();
  let candidates = decode_candidates(&anchors, letterbox, config);
  debug!(
    "候选框 {} 个，耗时: {:.2?}",
    candidates.len(),
    now.elapsed()
  );
  if candidates.is_empty() {
    return Ok(Vec::new());
  }

  let now = Instant::now();
  let detections = candidates.into_iter().map(Detection::from).collect();
  let detections = non_max_suppression(detections, config.nms_thresh);
  let before_filter = detections.len();
  let mut detections = filter_min_border(detections, config.min_border);
  debug!(
    "NMS 后保留 {} 个，最小边长过滤后保留 {} 个，耗时: {:.2?}",
    before_filter,
    detections.len(),
    now.elapsed()
  );

  let now = Instant::now();
  reconstruct_masks(
    &mut detections,
    &anchors,
    &prototypes,
    letterbox,
    image_width,
    image_height,
  )?;
  debug!("掩码重建完成，耗时: {:.2?}", now.elapsed());

  Ok(detections)
}

fn reconstruct_one(
  detection: &mut Detection,
  anchors: &AnchorTensors<'_>,
  prototypes: &PrototypeSet<'_>,
  letterbox: &Letterbox,
  image_width: u32,
  image_height: u32,
) -> Result<(), DecodeError> {
  let coefficients = anchors.record(detection.anchor).coefficients();
  let (mask, rect) = reconstruct_mask(
    prototypes,
    &coefficients,
    detection.bbox,
    letterbox,
    image_width,
    image_height,
  )?;
  detection.bbox = rect.into();
  detection.mask = Some(mask);
  Ok(())
}

#[cfg(not(feature = "rayon"))]
fn reconstruct_masks(
  detections: &mut [Detection],
  anchors: &AnchorTensors<'_>,
  prototypes: &PrototypeSet<'_>,
  letterbox: &Letterbox,
  image_width: u32,
  image_height: u32,
) -> Result<(), DecodeError> {
  detections.iter_mut().try_for_each(|detection| {
    reconstruct_one(
      detection,
      anchors,
      prototypes,
      letterbox,
      image_width,
      image_height,
    )
  })
}

#[cfg(feature = "rayon")]
fn reconstruct_masks(
  detections: &mut [Detection],
  anchors: &AnchorTensors<'_>,
  prototypes: &PrototypeSet<'_>,
  letterbox: &Letterbox,
  image_width: u32,
  image_height: u32,
) -> Result<(), DecodeError> {
  use rayon::prelude::*;

  // 每个检测只写自己的掩码
  detections.par_iter_mut().try_for_each(|detection| {
    reconstruct_one(
      detection,
      anchors,
      prototypes,
      letterbox,
      image_width,
      image_height,
    )
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_config_matches_documented_values() {
    let config = DecodeConfig::default();
    assert_eq!(config.conf_thresh, 0.5);
    assert_eq!(config.nms_thresh, 0.5);
    assert_eq!(config.min_border, 16);
    assert_eq!(config.prototype_layout, PrototypeLayout::ChannelFirst);
    assert_eq!(config.score_activation, ScoreActivation::Logits);
    assert!(config.validate().is_ok());
  }

  #[test]
  fn thresholds_outside_unit_interval_are_rejected() {
    let err = DecodeConfig::default().conf_thresh(1.0).validate().unwrap_err();
    assert_eq!(
      err,
      DecodeError::InvalidThreshold {
        name: "conf_thresh",
        value: 1.0,
      }
    );
    assert!(DecodeConfig::default().nms_thresh(0.0).validate().is_err());
    assert!(DecodeConfig::default().nms_thresh(f32::NAN).validate().is_err());
  }

  #[test]
  fn score_activation_maps_scores_to_confidence() {
    assert_eq!(ScoreActivation::Logits.confidence(0.0), 0.5);
    assert_eq!(ScoreActivation::Probabilities.confidence(0.25), 0.25);
    assert_eq!(
      "probabilities".parse::<ScoreActivation>(),
      Ok(ScoreActivation::Probabilities)
    );
    assert_eq!("LOGITS".parse::<ScoreActivation>(), Ok(ScoreActivation::Logits));
    assert!("softmax".parse::<ScoreActivation>().is_err());
  }

  #[test]
  fn sigmoid_is_centered() {
    assert_eq!(sigmoid(0.0), 0.5);
    assert!(sigmoid(10.0) > 0.99);
    assert!(sigmoid(-10.0) < 0.01);
  }
}
