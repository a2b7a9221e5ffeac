// 该文件是 Shanan （山南西风） 项目的一部分。
// src/postprocess/anchor.rs - 按锚点索引绑定的输出视图
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

use tracing::debug;

use super::DecodeError;
use crate::{bbox::BBox, tensor::TensorView};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CoefficientLayout {
  /// `[num_anchors, num_prototypes]`
  AnchorMajor,
  /// `[num_prototypes, num_anchors]`
  PrototypeMajor,
}

/// 分类、回归、掩码系数三个张量的联合视图
///
/// 三个张量只能通过同一个锚点索引访问，保证同一锚点的分数、框和掩码系数一一对应。
#[derive(Debug, Clone, Copy)]
pub struct AnchorTensors<'a> {
  scores: &'a [f32],
  boxes: &'a [f32],
  coefficients: &'a [f32],
  coefficient_layout: CoefficientLayout,
  num_classes: usize,
  num_anchors: usize,
  num_prototypes: usize,
}

impl<'a> AnchorTensors<'a> {
  pub fn new(
    scores: TensorView<'a>,
    boxes: TensorView<'a>,
    coefficients: TensorView<'a>,
    num_prototypes: usize,
  ) -> Result<Self, DecodeError> {
    let scores = scores.squeeze_batch(2)?;
    let boxes = boxes.squeeze_batch(2)?;
    let coefficients = coefficients.squeeze_batch(2)?;

    let num_classes = scores.dim(0);
    let num_anchors = scores.dim(1);
    if num_classes == 0 {
      return Err(DecodeError::NoClasses);
    }
    if boxes.dim(0) != 4 {
      return Err(DecodeError::BoxChannels(boxes.dim(0)));
    }
    if boxes.dim(1) != num_anchors {
      return Err(DecodeError::AnchorCountMismatch {
        scores: num_anchors,
        boxes: boxes.dim(1),
      });
    }

    // 以框张量确定的锚点数判断系数张量是否转置，两种都匹配时按锚点优先处理
    let coefficient_layout = match (coefficients.dim(0), coefficients.dim(1)) {
      (a, p) if a == num_anchors && p == num_prototypes => CoefficientLayout::AnchorMajor,
      (p, a) if p == num_prototypes && a == num_anchors => CoefficientLayout::PrototypeMajor,
      _ => {
        return Err(DecodeError::CoefficientShape {
          shape: coefficients.shape().to_vec(),
          anchors: num_anchors,
          prototypes: num_prototypes,
        });
      }
    };
    debug!("掩码系数布局: {:?}", coefficient_layout);

    Ok(Self {
      scores: scores.as_slice(),
      boxes: boxes.as_slice(),
      coefficients: coefficients.as_slice(),
      coefficient_layout,
      num_classes,
      num_anchors,
      num_prototypes,
    })
  }

  pub fn num_classes(&self) -> usize {
    self.num_classes
  }

  pub fn num_anchors(&self) -> usize {
    self.num_anchors
  }

  pub fn num_prototypes(&self) -> usize {
    self.num_prototypes
  }

  /// 取第 `index` 个锚点，越界时 panic
  pub fn record(&self, index: usize) -> AnchorRecord<'_> {
    assert!(
      index < self.num_anchors,
      "锚点索引 {} 超出范围 {}",
      index,
      self.num_anchors
    );
    AnchorRecord {
      tensors: self,
      index,
    }
  }

  pub fn iter(&self) -> impl Iterator<Item = AnchorRecord<'_>> + '_ {
    (0..self.num_anchors).map(move |index| AnchorRecord {
      tensors: self,
      index,
    })
  }
}

/// 单个锚点的分数、框与掩码系数
#[derive(Debug, Clone, Copy)]
pub struct AnchorRecord<'t> {
  tensors: &'t AnchorTensors<'t>,
  index: usize,
}

impl AnchorRecord<'_> {
  pub fn index(&self) -> usize {
    self.index
  }

  /// 原始分数最大的类别及其分数，分数相同时取索引最小的类别
  pub fn best_class(&self) -> (u32, f32) {
    let t = self.tensors;
    let mut best = 0usize;
    let mut max_score = t.scores[self.index];
    for c in 1..t.num_classes {
      let score = t.scores[c * t.num_anchors + self.index];
      if score > max_score {
        max_score = score;
        best = c;
      }
    }
    (best as u32, max_score)
  }

  /// 模型输入坐标系下的左上角格式框
  pub fn model_box(&self) -> BBox {
    let t = self.tensors;
    let n = t.num_anchors;
    BBox::from_center(
      t.boxes[self.index],
      t.boxes[n + self.index],
      t.boxes[2 * n + self.index],
      t.boxes[3 * n + self.index],
    )
  }

  pub fn coefficients(&self) -> Vec<f32> {
    let t = self.tensors;
    match t.coefficient_layout {
      CoefficientLayout::AnchorMajor => {
        let start = self.index * t.num_prototypes;
        t.coefficients[start..start + t.num_prototypes].to_vec()
      }
      CoefficientLayout::PrototypeMajor => (0..t.num_prototypes)
        .map(|p| t.coefficients[p * t.num_anchors + self.index])
        .collect(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const CLASSES: usize = 3;
  const ANCHORS: usize = 4;
  const PROTOS: usize = 2;

  fn scores() -> Vec<f32> {
    // [class][anchor]
    vec![
      0.1, 0.9, 0.5, 0.5, //
      0.2, 0.3, 0.5, 0.7, //
      0.3, 0.9, 0.1, 0.7, //
    ]
  }

  fn boxes() -> Vec<f32> {
    vec![
      10.0, 20.0, 30.0, 40.0, //
      11.0, 21.0, 31.0, 41.0, //
      4.0, 4.0, 4.0, 4.0, //
      2.0, 2.0, 2.0, 2.0, //
    ]
  }

  #[test]
  fn record_binds_score_box_and_coefficients_by_index() {
    let scores = scores();
    let boxes = boxes();
    // [anchor][proto]
    let coefficients: Vec<f32> = (0..ANCHORS * PROTOS).map(|v| v as f32).collect();
    let tensors = AnchorTensors::new(
      TensorView::new(&scores, &[CLASSES, ANCHORS]).unwrap(),
      TensorView::new(&boxes, &[4, ANCHORS]).unwrap(),
      TensorView::new(&coefficients, &[ANCHORS, PROTOS]).unwrap(),
      PROTOS,
    )
    .unwrap();

    let record = tensors.record(2);
    assert_eq!(record.index(), 2);
    assert_eq!(record.model_box(), BBox::from_center(30.0, 31.0, 4.0, 2.0));
    assert_eq!(record.coefficients(), vec![4.0, 5.0]);
    assert_eq!(tensors.iter().count(), ANCHORS);
  }

  #[test]
  fn transposed_coefficients_are_detected() {
    let scores = scores();
    let boxes = boxes();
    // [proto][anchor]
    let coefficients: Vec<f32> = (0..ANCHORS * PROTOS).map(|v| v as f32).collect();
    let tensors = AnchorTensors::new(
      TensorView::new(&scores, &[1, CLASSES, ANCHORS]).unwrap(),
      TensorView::new(&boxes, &[1, 4, ANCHORS]).unwrap(),
      TensorView::new(&coefficients, &[1, PROTOS, ANCHORS]).unwrap(),
      PROTOS,
    )
    .unwrap();

    assert_eq!(tensors.record(1).coefficients(), vec![1.0, 5.0]);
  }

  #[test]
  fn ties_go_to_lowest_class() {
    let scores = scores();
    let boxes = boxes();
    let coefficients = vec![0.0f32; ANCHORS * PROTOS];
    let tensors = AnchorTensors::new(
      TensorView::new(&scores, &[CLASSES, ANCHORS]).unwrap(),
      TensorView::new(&boxes, &[4, ANCHORS]).unwrap(),
      TensorView::new(&coefficients, &[ANCHORS, PROTOS]).unwrap(),
      PROTOS,
    )
    .unwrap();

    assert_eq!(tensors.record(0).best_class(), (2, 0.3));
    assert_eq!(tensors.record(1).best_class(), (0, 0.9));
    assert_eq!(tensors.record(2).best_class(), (0, 0.5));
    assert_eq!(tensors.record(3).best_class(), (1, 0.7));
  }

  #[test]
  fn mismatched_shapes_are_configuration_errors() {
    let scores = scores();
    let boxes = boxes();
    let coefficients = vec![0.0f32; ANCHORS * 3];

    let err = AnchorTensors::new(
      TensorView::new(&scores, &[CLASSES, ANCHORS]).unwrap(),
      TensorView::new(&boxes, &[4, ANCHORS]).unwrap(),
      TensorView::new(&coefficients, &[ANCHORS, 3]).unwrap(),
      PROTOS,
    )
    .unwrap_err();
    assert_eq!(
      err,
      DecodeError::CoefficientShape {
        shape: vec![ANCHORS, 3],
        anchors: ANCHORS,
        prototypes: PROTOS,
      }
    );

    let err = AnchorTensors::new(
      TensorView::new(&scores, &[CLASSES, ANCHORS]).unwrap(),
      TensorView::new(&boxes, &[8, 2]).unwrap(),
      TensorView::new(&coefficients, &[ANCHORS, 3]).unwrap(),
      3,
    )
    .unwrap_err();
    assert_eq!(err, DecodeError::BoxChannels(8));

    let err = AnchorTensors::new(
      TensorView::new(&scores, &[CLASSES * 2, 2]).unwrap(),
      TensorView::new(&boxes, &[4, ANCHORS]).unwrap(),
      TensorView::new(&coefficients, &[ANCHORS, 3]).unwrap(),
      3,
    )
    .unwrap_err();
    assert_eq!(
      err,
      DecodeError::AnchorCountMismatch {
        scores: 2,
        boxes: ANCHORS,
      }
    );
  }
}
