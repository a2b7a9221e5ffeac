// 该文件是 Shanan （山南西风） 项目的一部分。
// src/engine.rs - 推理引擎接口
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

use std::collections::HashMap;

use crate::{
  frame::RgbNhwcFrame,
  tensor::{Tensor, TensorView},
};

/// 推理引擎
///
/// 引擎在构造时完成初始化，使用完毕后由调用方显式调用 [`Inference::deinit`]。
pub trait Inference {
  type Error;

  /// 模型输入尺寸 (宽, 高)
  fn input_size(&self) -> (u32, u32);

  fn run(&self, frame: &RgbNhwcFrame) -> Result<Outputs, Self::Error>;

  fn deinit(&mut self) -> Result<(), Self::Error> {
    Ok(())
  }
}

/// 按名称索引的推理输出
#[derive(Debug, Clone, Default)]
pub struct Outputs {
  tensors: HashMap<String, Tensor>,
}

impl Outputs {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) {
    self.tensors.insert(name.into(), tensor);
  }

  pub fn get(&self, name: &str) -> Option<TensorView<'_>> {
    self.tensors.get(name).map(Tensor::view)
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.tensors.keys().map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.tensors.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tensors.is_empty()
  }
}

mod tensor_dump;
pub use self::tensor_dump::{
  TENSOR_DUMP_VERSION, TensorDump, TensorDumpBuilder, TensorDumpError, write_tensor_dump,
};
