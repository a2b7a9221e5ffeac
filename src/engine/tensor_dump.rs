// 该文件是 Shanan （山南西风） 项目的一部分。
// src/engine/tensor_dump.rs - 从 JSON 转储回放推理输出
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

//! 转储文件格式：
//!
//! ```json
//! {
//!   "version": 1,
//!   "input": { "width": 640, "height": 640 },
//!   "outputs": {
//!     "output1": { "shape": [1, 32, 160, 160], "data": [0.0, ...] }
//!   }
//! }
//! ```

use std::{
  collections::BTreeMap,
  path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use super::{Inference, Outputs};
use crate::{
  frame::RgbNhwcFrame,
  tensor::{Tensor, TensorError},
};

pub const TENSOR_DUMP_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum TensorDumpError {
  #[error("转储文件读取错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("转储文件解析错误: {0}")]
  Json(#[from] serde_json::Error),
  #[error("不支持的转储版本: {0}")]
  Version(u32),
  #[error("输出 {name} 无效: {source}")]
  Tensor {
    name: String,
    #[source]
    source: TensorError,
  },
  #[error("转储文件没有任何输出")]
  NoOutputs,
  #[error("模型输入尺寸无效: {width}x{height}")]
  EmptyInput { width: u32, height: u32 },
  #[error("输入帧尺寸 {actual:?} 与模型输入 {expected:?} 不一致")]
  FrameSize {
    expected: (u32, u32),
    actual: (usize, usize),
  },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct InputSize {
  width: u32,
  height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DumpTensor {
  shape: Vec<usize>,
  data: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DumpFile {
  version: u32,
  input: InputSize,
  outputs: BTreeMap<String, DumpTensor>,
}

/// 回放事先转储的推理输出
///
/// 不做真正的推理，每次 [`Inference::run`] 都返回同一组输出。
#[derive(Debug, Clone)]
pub struct TensorDump {
  input_size: (u32, u32),
  outputs: Outputs,
}

impl TensorDump {
  pub fn from_json(json: &str) -> Result<Self, TensorDumpError> {
    let dump: DumpFile = serde_json::from_str(json)?;
    Self::from_dump(dump)
  }

  fn from_dump(dump: DumpFile) -> Result<Self, TensorDumpError> {
    if dump.version != TENSOR_DUMP_VERSION {
      return Err(TensorDumpError::Version(dump.version));
    }
    if dump.input.width == 0 || dump.input.height == 0 {
      return Err(TensorDumpError::EmptyInput {
        width: dump.input.width,
        height: dump.input.height,
      });
    }
    if dump.outputs.is_empty() {
      return Err(TensorDumpError::NoOutputs);
    }

    let mut outputs = Outputs::new();
    for (name, tensor) in dump.outputs {
      debug!("输出 {}: 形状 {:?}", name, tensor.shape);
      let tensor = Tensor::new(tensor.data, tensor.shape)
        .map_err(|source| TensorDumpError::Tensor {
          name: name.clone(),
          source,
        })?;
      outputs.insert(name, tensor);
    }

    Ok(Self {
      input_size: (dump.input.width, dump.input.height),
      outputs,
    })
  }

  pub fn outputs(&self) -> &Outputs {
    &self.outputs
  }
}

/// 把一组输出写成转储文件，便于离线调试
pub fn write_tensor_dump<'a>(
  path: impl AsRef<Path>,
  input_size: (u32, u32),
  outputs: impl IntoIterator<Item = (&'a str, &'a Tensor)>,
) -> Result<(), TensorDumpError> {
  let outputs = outputs
    .into_iter()
    .map(|(name, tensor)| {
      let view = tensor.view();
      (
        name.to_string(),
        DumpTensor {
          shape: view.shape().to_vec(),
          data: view.as_slice().to_vec(),
        },
      )
    })
    .collect();
  let dump = DumpFile {
    version: TENSOR_DUMP_VERSION,
    input: InputSize {
      width: input_size.0,
      height: input_size.1,
    },
    outputs,
  };
  let file = std::fs::File::create(path)?;
  serde_json::to_writer(std::io::BufWriter::new(file), &dump)?;
  Ok(())
}

pub struct TensorDumpBuilder {
  path: PathBuf,
}

impl TensorDumpBuilder {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn build(self) -> Result<TensorDump, TensorDumpError> {
    info!("加载转储文件: {}", self.path.display());
    let json = std::fs::read_to_string(&self.path)?;
    debug!(
      "转储文件大小: {:.2} MB",
      json.len() as f64 / (1024.0 * 1024.0)
    );
    let dump = TensorDump::from_json(&json)?;
    info!(
      "转储加载完成, 模型输入 {}x{}, 输出 {} 个",
      dump.input_size.0,
      dump.input_size.1,
      dump.outputs.len()
    );
    Ok(dump)
  }
}

impl Inference for TensorDump {
  type Error = TensorDumpError;

  fn input_size(&self) -> (u32, u32) {
    self.input_size
  }

  fn run(&self, frame: &RgbNhwcFrame) -> Result<Outputs, Self::Error> {
    let (width, height) = self.input_size;
    if frame.width() != width as usize || frame.height() != height as usize {
      return Err(TensorDumpError::FrameSize {
        expected: self.input_size,
        actual: (frame.width(), frame.height()),
      });
    }
    debug!("回放转储输出");
    Ok(self.outputs.clone())
  }

  fn deinit(&mut self) -> Result<(), Self::Error> {
    debug!("释放转储输出");
    self.outputs = Outputs::new();
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const DUMP: &str = r#"{
    "version": 1,
    "input": { "width": 4, "height": 2 },
    "outputs": {
      "scores": { "shape": [1, 2, 3], "data": [0, 1, 2, 3, 4, 5] },
      "protos": { "shape": [1, 1, 1, 2], "data": [0.5, -0.5] }
    }
  }"#;

  #[test]
  fn parses_outputs_by_name() {
    let dump = TensorDump::from_json(DUMP).unwrap();
    assert_eq!(dump.input_size(), (4, 2));
    let scores = dump.outputs().get("scores").unwrap();
    assert_eq!(scores.shape(), &[1, 2, 3]);
    assert_eq!(scores.as_slice()[5], 5.0);
    assert!(dump.outputs().get("missing").is_none());
  }

  #[test]
  fn run_checks_frame_size() {
    let dump = TensorDump::from_json(DUMP).unwrap();
    let outputs = dump.run(&RgbNhwcFrame::with_shape(2, 4)).unwrap();
    assert_eq!(outputs.len(), 2);

    let err = dump.run(&RgbNhwcFrame::with_shape(4, 4)).unwrap_err();
    assert!(matches!(err, TensorDumpError::FrameSize { .. }));
  }

  #[test]
  fn rejects_inconsistent_tensors() {
    let bad = DUMP.replace("[0.5, -0.5]", "[0.5]");
    let err = TensorDump::from_json(&bad).unwrap_err();
    assert!(matches!(err, TensorDumpError::Tensor { ref name, .. } if name == "protos"));

    let bad = DUMP.replace("\"version\": 1", "\"version\": 2");
    assert!(matches!(
      TensorDump::from_json(&bad).unwrap_err(),
      TensorDumpError::Version(2)
    ));
  }

  #[test]
  fn written_dump_loads_back() {
    let path = std::env::temp_dir().join(format!("shanan-seg-dump-{}.json", std::process::id()));
    let tensor = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]).unwrap();
    write_tensor_dump(&path, (8, 8), [("x", &tensor)]).unwrap();

    let dump = TensorDumpBuilder::new(&path).build().unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(dump.input_size(), (8, 8));
    assert_eq!(dump.outputs().get("x").unwrap(), tensor.view());
  }
}
