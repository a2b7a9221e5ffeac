// 该文件是 Shanan （山南西风） 项目的一部分。
// src/tensor.rs - 张量缓冲与只读视图
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

use thiserror::Error;

pub const MAX_RANK: usize = 4;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TensorError {
  #[error("张量维度数无效: {0} (应为 1 到 4)")]
  InvalidRank(usize),
  #[error("张量数据长度不匹配: 形状 {shape:?} 需要 {expected} 个元素, 实际为 {actual}")]
  LengthMismatch {
    shape: Vec<usize>,
    expected: usize,
    actual: usize,
  },
  #[error("张量维度数不匹配: 期望 {expected}, 实际形状 {shape:?}")]
  RankMismatch { expected: usize, shape: Vec<usize> },
}

fn check_shape(shape: &[usize], len: usize) -> Result<(), TensorError> {
  if shape.is_empty() || shape.len() > MAX_RANK {
    return Err(TensorError::InvalidRank(shape.len()));
  }
  let expected = shape.iter().product::<usize>();
  if expected != len {
    return Err(TensorError::LengthMismatch {
      shape: shape.to_vec(),
      expected,
      actual: len,
    });
  }
  Ok(())
}

/// 推理引擎持有的浮点张量
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
  data: Box<[f32]>,
  shape: Box<[usize]>,
}

impl Tensor {
  pub fn new(data: Vec<f32>, shape: Vec<usize>) -> Result<Self, TensorError> {
    check_shape(&shape, data.len())?;
    Ok(Self {
      data: data.into_boxed_slice(),
      shape: shape.into_boxed_slice(),
    })
  }

  pub fn shape(&self) -> &[usize] {
    &self.shape
  }

  pub fn view(&self) -> TensorView<'_> {
    TensorView {
      data: &self.data,
      shape: &self.shape,
    }
  }
}

/// 借用自推理引擎的只读张量视图
///
/// 构造时检查数据长度等于各维度之积，之后按行优先顺序索引。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TensorView<'a> {
  data: &'a [f32],
  shape: &'a [usize],
}

impl<'a> TensorView<'a> {
  pub fn new(data: &'a [f32], shape: &'a [usize]) -> Result<Self, TensorError> {
    check_shape(shape, data.len())?;
    Ok(Self { data, shape })
  }

  pub fn as_slice(&self) -> &'a [f32] {
    self.data
  }

  pub fn shape(&self) -> &'a [usize] {
    self.shape
  }

  pub fn dim(&self, axis: usize) -> usize {
    self.shape[axis]
  }

  /// 去掉大小为 1 的前导批次维度，直到维度数等于 `rank`
  pub fn squeeze_batch(self, rank: usize) -> Result<Self, TensorError> {
    let mut shape = self.shape;
    while shape.len() > rank && shape[0] == 1 {
      shape = &shape[1..];
    }
    if shape.len() != rank {
      return Err(TensorError::RankMismatch {
        expected: rank,
        shape: self.shape.to_vec(),
      });
    }
    Ok(Self {
      data: self.data,
      shape,
    })
  }
}
