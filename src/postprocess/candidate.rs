// 该文件是 Shanan （山南西风） 项目的一部分。
// src/postprocess/candidate.rs - 候选框解码
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

use super::{AnchorRecord, AnchorTensors, DecodeConfig};
use crate::{bbox::BBox, letterbox::Letterbox};

/// 通过置信度阈值的单个锚点
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
  /// 模型输入坐标系下的框
  pub model_box: BBox,
  /// 原图坐标系下的框
  pub bbox: BBox,
  pub label: u32,
  /// 分类张量中的原始分数
  pub score: f32,
  /// 按分数类型换算后的置信度
  pub confidence: f32,
  /// 锚点索引，用于取回同一锚点的掩码系数
  pub anchor: usize,
}

fn candidate_at(
  record: AnchorRecord<'_>,
  letterbox: &Letterbox,
  config: &DecodeConfig,
) -> Option<Candidate> {
  // 两种分数换算都单调，先取最大值再换算与逐类换算后取最大值等价
  let (label, score) = record.best_class();
  let confidence = config.score_activation.confidence(score);
  let confident = confidence > config.conf_thresh;
  if !confident {
    return None;
  }

  let model_box = record.model_box();
  Some(Candidate {
    model_box,
    bbox: letterbox.inverse_box(model_box),
    label,
    score,
    confidence,
    anchor: record.index(),
  })
}

/// 扫描全部锚点，返回置信度超过阈值的候选框（无序）
#[cfg(not(feature = "rayon"))]
pub fn decode_candidates(
  anchors: &AnchorTensors<'_>,
  letterbox: &Letterbox,
  config: &DecodeConfig,
) -> Vec<Candidate> {
  anchors
    .iter()
    .filter_map(|record| candidate_at(record, letterbox, config))
    .collect()
}

/// 扫描全部锚点，返回置信度超过阈值的候选框（无序）
#[cfg(feature = "rayon")]
pub fn decode_candidates(
  anchors: &AnchorTensors<'_>,
  letterbox: &Letterbox,
  config: &DecodeConfig,
) -> Vec<Candidate> {
  use rayon::prelude::*;

  (0..anchors.num_anchors())
    .into_par_iter()
    .filter_map(|index| candidate_at(anchors.record(index), letterbox, config))
    .collect()
}
