// 该文件是 Shanan （山南西风） 项目的一部分。
// src/postprocess/nms.rs - 非极大值抑制
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

use crate::model::Detection;

/// 贪心 NMS（不区分类别）
///
/// 按置信度稳定降序排序后依次遍历：未被抑制的检测被保留，
/// 并抑制其后所有与之 IoU 大于 `iou_thresh` 的检测。
/// 返回结果保持置信度降序。
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_thresh: f32) -> Vec<Detection> {
  if detections.is_empty() {
    return detections;
  }

  // sort_by 是稳定排序，同分时保持原有相对顺序
  detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

  let mut suppressed = vec![false; detections.len()];
  for i in 0..detections.len() {
    if suppressed[i] {
      continue;
    }
    for j in (i + 1)..detections.len() {
      if !suppressed[j] && detections[i].bbox.iou(&detections[j].bbox) > iou_thresh {
        suppressed[j] = true;
      }
    }
  }

  detections
    .into_iter()
    .zip(suppressed)
    .filter_map(|(detection, suppressed)| (!suppressed).then_some(detection))
    .collect()
}

/// 丢弃宽或高小于 `min_border` 的检测，必须在 NMS 之后调用
pub fn filter_min_border(mut detections: Vec<Detection>, min_border: u32) -> Vec<Detection> {
  let border = min_border as f32;
  detections.retain(|d| d.bbox.width >= border && d.bbox.height >= border);
  detections
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bbox::BBox;
  use rand::{Rng, SeedableRng, rngs::StdRng};

  fn detection(bbox: BBox, confidence: f32, anchor: usize) -> Detection {
    Detection {
      bbox,
      confidence,
      label: 0,
      anchor,
      mask: None,
    }
  }

  #[test]
  fn overlapping_lower_confidence_box_is_suppressed() {
    let a = detection(BBox::new(10.0, 10.0, 50.0, 50.0), 0.9, 0);
    let b = detection(BBox::new(12.0, 12.0, 50.0, 50.0), 0.8, 1);
    let kept = non_max_suppression(vec![b, a], 0.5);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].anchor, 0);
    assert_eq!(kept[0].bbox, BBox::new(10.0, 10.0, 50.0, 50.0));
  }

  #[test]
  fn suppressed_box_does_not_suppress_others() {
    // b 被 a 抑制；c 只与 b 重叠，因此保留
    let a = detection(BBox::new(0.0, 0.0, 10.0, 10.0), 0.9, 0);
    let b = detection(BBox::new(4.0, 0.0, 10.0, 10.0), 0.8, 1);
    let c = detection(BBox::new(9.0, 0.0, 10.0, 10.0), 0.7, 2);
    let kept = non_max_suppression(vec![c, b, a], 0.3);
    let anchors: Vec<usize> = kept.iter().map(|d| d.anchor).collect();
    assert_eq!(anchors, vec![0, 2]);
  }

  #[test]
  fn equal_confidence_keeps_input_order() {
    let a = detection(BBox::new(0.0, 0.0, 10.0, 10.0), 0.7, 3);
    let b = detection(BBox::new(1.0, 1.0, 10.0, 10.0), 0.7, 1);
    let kept = non_max_suppression(vec![a, b], 0.5);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].anchor, 3);
  }

  #[test]
  fn random_boxes_satisfy_suppression_invariants() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..50 {
      let detections: Vec<Detection> = (0..40)
        .map(|i| {
          let bbox = BBox::new(
            rng.random_range(0.0..200.0),
            rng.random_range(0.0..200.0),
            rng.random_range(0.0..80.0),
            rng.random_range(0.0..80.0),
          );
          detection(bbox, rng.random_range(0.01..0.99), i)
        })
        .collect();

      let kept = non_max_suppression(detections, 0.45);
      for (i, a) in kept.iter().enumerate() {
        for b in kept.iter().skip(i + 1) {
          assert!(a.bbox.iou(&b.bbox) <= 0.45);
          assert!(a.confidence >= b.confidence);
        }
      }

      let again = non_max_suppression(kept.clone(), 0.45);
      let first: Vec<usize> = kept.iter().map(|d| d.anchor).collect();
      let second: Vec<usize> = again.iter().map(|d| d.anchor).collect();
      assert_eq!(first, second);
    }
  }

  #[test]
  fn small_boxes_are_removed_after_suppression() {
    let small = detection(BBox::new(0.0, 0.0, 5.0, 5.0), 0.95, 0);
    let large = detection(BBox::new(100.0, 100.0, 40.0, 16.0), 0.6, 1);
    let kept = non_max_suppression(vec![small, large], 0.5);
    assert_eq!(kept.len(), 2);

    let kept = filter_min_border(kept, 16);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].anchor, 1);
    assert!(kept.iter().all(|d| d.bbox.width >= 16.0 && d.bbox.height >= 16.0));
  }

  #[test]
  fn empty_input_stays_empty() {
    assert!(non_max_suppression(Vec::new(), 0.5).is_empty());
    assert!(filter_min_border(Vec::new(), 16).is_empty());
  }
}
