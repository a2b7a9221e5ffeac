// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/yolov8_seg.rs - YOLOv8 实例分割模型
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

use std::time::Instant;

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  engine::{Inference, Outputs, TensorDump, TensorDumpBuilder, TensorDumpError},
  frame::RgbNhwcFrame,
  letterbox::{Letterbox, LetterboxError},
  model::{Model, SegmentResult},
  postprocess::{
    DecodeConfig, DecodeError, PrototypeLayout, ScoreActivation, SegmentOutputs, decode,
  },
  tensor::TensorView,
};

pub const DEFAULT_SCORES_OUTPUT: &str = "/model.22/Sigmoid_output_0";
pub const DEFAULT_BOXES_OUTPUT: &str = "/model.22/Mul_2_output_0";
pub const DEFAULT_COEFFICIENTS_OUTPUT: &str = "/model.22/Concat_output_0";
pub const DEFAULT_PROTOTYPES_OUTPUT: &str = "output1";

const YOLOV8_SEG_SCHEME: &str = "yolov8seg";

type EngineError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum Yolov8SegError {
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("模型参数 {key} 无效: {value}")]
  InvalidOption { key: String, value: String },
  #[error("转储加载错误: {0}")]
  DumpError(#[from] TensorDumpError),
  #[error("推理引擎错误: {0}")]
  EngineError(EngineError),
  #[error("模型输出缺失: {0}")]
  MissingOutput(String),
  #[error("预处理错误: {0}")]
  LetterboxError(#[from] LetterboxError),
  #[error("后处理错误: {0}")]
  DecodeError(#[from] DecodeError),
}

impl Yolov8SegError {
  fn engine(err: impl std::error::Error + Send + Sync + 'static) -> Self {
    Yolov8SegError::EngineError(Box::new(err))
  }

  fn invalid_option(key: &str, value: &str) -> Self {
    Yolov8SegError::InvalidOption {
      key: key.to_string(),
      value: value.to_string(),
    }
  }
}

/// 四个输出张量在引擎中的名称
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputNames {
  pub scores: String,
  pub boxes: String,
  pub coefficients: String,
  pub prototypes: String,
}

impl Default for OutputNames {
  fn default() -> Self {
    Self {
      scores: DEFAULT_SCORES_OUTPUT.to_string(),
      boxes: DEFAULT_BOXES_OUTPUT.to_string(),
      coefficients: DEFAULT_COEFFICIENTS_OUTPUT.to_string(),
      prototypes: DEFAULT_PROTOTYPES_OUTPUT.to_string(),
    }
  }
}

impl OutputNames {
  fn lookup<'a>(outputs: &'a Outputs, name: &str) -> Result<TensorView<'a>, Yolov8SegError> {
    outputs.get(name).ok_or_else(|| {
      error!(
        "模型输出 {} 不存在, 可用输出: {:?}",
        name,
        outputs.names().collect::<Vec<_>>()
      );
      Yolov8SegError::MissingOutput(name.to_string())
    })
  }

  fn resolve<'a>(&self, outputs: &'a Outputs) -> Result<SegmentOutputs<'a>, Yolov8SegError> {
    Ok(SegmentOutputs {
      scores: Self::lookup(outputs, &self.scores)?,
      boxes: Self::lookup(outputs, &self.boxes)?,
      coefficients: Self::lookup(outputs, &self.coefficients)?,
      prototypes: Self::lookup(outputs, &self.prototypes)?,
    })
  }
}

pub struct Yolov8Seg<E = TensorDump> {
  engine: E,
  config: DecodeConfig,
  names: OutputNames,
}

#[derive(Debug, Clone)]
pub struct Yolov8SegBuilder {
  model_path: String,
  config: DecodeConfig,
  names: OutputNames,
}

impl FromUrl for Yolov8SegBuilder {
  type Error = Yolov8SegError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != YOLOV8_SEG_SCHEME {
      return Err(Yolov8SegError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        YOLOV8_SEG_SCHEME
      )));
    }

    let mut builder = Yolov8SegBuilder::new(url.path());
    for (key, value) in url.query_pairs() {
      builder = match &*key {
        "conf" => builder.conf_thresh(parse_option(&key, &value)?),
        "nms" => builder.nms_thresh(parse_option(&key, &value)?),
        "border" => builder.min_border(parse_option(&key, &value)?),
        "proto" => builder.prototype_layout(
          value
            .parse::<PrototypeLayout>()
            .map_err(|_| Yolov8SegError::invalid_option(&key, &value))?,
        ),
        "activation" => builder.score_activation(
          value
            .parse::<ScoreActivation>()
            .map_err(|_| Yolov8SegError::invalid_option(&key, &value))?,
        ),
        "scores" => builder.scores_output(value.to_string()),
        "boxes" => builder.boxes_output(value.to_string()),
        "coefficients" => builder.coefficients_output(value.to_string()),
        "prototypes" => builder.prototypes_output(value.to_string()),
        _ => return Err(Yolov8SegError::invalid_option(&key, &value)),
      };
    }
    Ok(builder)
  }
}

impl FromUrlWithScheme for Yolov8SegBuilder {
  const SCHEME: &'static str = YOLOV8_SEG_SCHEME;
}

fn parse_option<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, Yolov8SegError> {
  value
    .parse::<T>()
    .map_err(|_| Yolov8SegError::invalid_option(key, value))
}

impl Yolov8SegBuilder {
  /// 默认分数输出是模型内 sigmoid 之后的节点，因此按概率解读
  pub fn new(model_path: impl Into<String>) -> Self {
    Self {
      model_path: model_path.into(),
      config: DecodeConfig::default().score_activation(ScoreActivation::Probabilities),
      names: OutputNames::default(),
    }
  }

  pub fn conf_thresh(mut self, conf_thresh: f32) -> Self {
    self.config = self.config.conf_thresh(conf_thresh);
    self
  }

  pub fn nms_thresh(mut self, nms_thresh: f32) -> Self {
    self.config = self.config.nms_thresh(nms_thresh);
    self
  }

  pub fn min_border(mut self, min_border: u32) -> Self {
    self.config = self.config.min_border(min_border);
    self
  }

  pub fn prototype_layout(mut self, layout: PrototypeLayout) -> Self {
    self.config = self.config.prototype_layout(layout);
    self
  }

  pub fn score_activation(mut self, activation: ScoreActivation) -> Self {
    self.config = self.config.score_activation(activation);
    self
  }

  pub fn scores_output(mut self, name: impl Into<String>) -> Self {
    self.names.scores = name.into();
    self
  }

  pub fn boxes_output(mut self, name: impl Into<String>) -> Self {
    self.names.boxes = name.into();
    self
  }

  pub fn coefficients_output(mut self, name: impl Into<String>) -> Self {
    self.names.coefficients = name.into();
    self
  }

  pub fn prototypes_output(mut self, name: impl Into<String>) -> Self {
    self.names.prototypes = name.into();
    self
  }

  pub fn config(&self) -> &DecodeConfig {
    &self.config
  }

  pub fn model_path(&self) -> &str {
    &self.model_path
  }

  /// 打开转储文件作为推理引擎
  pub fn build(self) -> Result<Yolov8Seg<TensorDump>, Yolov8SegError> {
    info!("加载模型输出转储: {}", self.model_path);
    let engine = TensorDumpBuilder::new(&self.model_path).build()?;
    self.build_with(engine)
  }

  /// 使用已经初始化的推理引擎
  pub fn build_with<E: Inference>(self, engine: E) -> Result<Yolov8Seg<E>, Yolov8SegError> {
    self.config.validate()?;
    let (width, height) = engine.input_size();
    debug!("模型输入尺寸: {}x{}", width, height);
    debug!("后处理参数: {:?}", self.config);
    debug!("输出名称: {:?}", self.names);
    info!("模型加载完成");

    Ok(Yolov8Seg {
      engine,
      config: self.config,
      names: self.names,
    })
  }
}

impl<E: Inference> Yolov8Seg<E> {
  pub fn config(&self) -> &DecodeConfig {
    &self.config
  }

  pub fn engine(&self) -> &E {
    &self.engine
  }

  pub fn deinit(&mut self) -> Result<(), Yolov8SegError>
  where
    E::Error: std::error::Error + Send + Sync + 'static,
  {
    info!("释放推理引擎");
    self.engine.deinit().map_err(Yolov8SegError::engine)
  }
}

impl<E> Model for Yolov8Seg<E>
where
  E: Inference,
  E::Error: std::error::Error + Send + Sync + 'static,
{
  type Input = RgbImage;
  type Output = SegmentResult;
  type Error = Yolov8SegError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let (image_width, image_height) = input.dimensions();
    let (model_width, model_height) = self.engine.input_size();

    debug!("预处理: letterbox");
    let now = Instant::now();
    let letterbox = Letterbox::forward(image_width, image_height, model_width, model_height)?;
    let frame = RgbNhwcFrame::letterboxed(input, &letterbox);
    debug!("预处理耗时: {:.2?}", now.elapsed());

    debug!("执行模型推理");
    let now = Instant::now();
    let outputs = self.engine.run(&frame).map_err(Yolov8SegError::engine)?;
    debug!("推理耗时: {:.2?}", now.elapsed());

    debug!("后处理模型输出");
    let segment_outputs = self.names.resolve(&outputs)?;
    let detections = decode(
      &segment_outputs,
      &letterbox,
      image_width,
      image_height,
      &self.config,
    )?;
    debug!("检测到 {} 个物体", detections.len());

    Ok(SegmentResult::from(detections))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn url_options_configure_builder() {
    let url = Url::parse(
      "yolov8seg:///tmp/dump.json?conf=0.4&nms=0.6&border=8&proto=nhwc&scores=cls&prototypes=protos",
    )
    .unwrap();
    let builder = Yolov8SegBuilder::from_url(&url).unwrap();
    assert_eq!(builder.model_path(), "/tmp/dump.json");
    assert_eq!(builder.config().conf_thresh, 0.4);
    assert_eq!(builder.config().nms_thresh, 0.6);
    assert_eq!(builder.config().min_border, 8);
    assert_eq!(builder.config().prototype_layout, PrototypeLayout::ChannelLast);
    assert_eq!(
      builder.config().score_activation,
      ScoreActivation::Probabilities
    );
    assert_eq!(builder.names.scores, "cls");
    assert_eq!(builder.names.boxes, DEFAULT_BOXES_OUTPUT);
    assert_eq!(builder.names.prototypes, "protos");
  }

  #[test]
  fn logits_can_be_selected_from_url() {
    let url = Url::parse("yolov8seg:///tmp/dump.json?activation=logits").unwrap();
    let builder = Yolov8SegBuilder::from_url(&url).unwrap();
    assert_eq!(builder.config().score_activation, ScoreActivation::Logits);

    let url = Url::parse("yolov8seg:///tmp/dump.json?activation=softmax").unwrap();
    assert!(matches!(
      Yolov8SegBuilder::from_url(&url),
      Err(Yolov8SegError::InvalidOption { .. })
    ));
  }

  #[test]
  fn wrong_scheme_or_option_is_rejected() {
    let url = Url::parse("yolo26:///tmp/model.rknn").unwrap();
    assert!(matches!(
      Yolov8SegBuilder::from_url(&url),
      Err(Yolov8SegError::ModelPathError(_))
    ));

    let url = Url::parse("yolov8seg:///tmp/dump.json?conf=high").unwrap();
    assert!(matches!(
      Yolov8SegBuilder::from_url(&url),
      Err(Yolov8SegError::InvalidOption { .. })
    ));

    let url = Url::parse("yolov8seg:///tmp/dump.json?anchors=8400").unwrap();
    assert!(Yolov8SegBuilder::from_url(&url).is_err());
  }

  #[test]
  fn invalid_threshold_fails_at_build() {
    let dump = TensorDump::from_json(
      r#"{"version":1,"input":{"width":4,"height":4},"outputs":{"x":{"shape":[1],"data":[0]}}}"#,
    )
    .unwrap();
    let err = Yolov8SegBuilder::new("unused")
      .conf_thresh(1.5)
      .build_with(dump)
      .err();
    assert!(matches!(
      err,
      Some(Yolov8SegError::DecodeError(DecodeError::InvalidThreshold { .. }))
    ));
  }

  #[test]
  fn missing_output_name_is_reported() {
    let dump = TensorDump::from_json(
      r#"{"version":1,"input":{"width":4,"height":4},"outputs":{"x":{"shape":[1],"data":[0]}}}"#,
    )
    .unwrap();
    let model = Yolov8SegBuilder::new("unused").build_with(dump).unwrap();
    let err = model.infer(&RgbImage::new(8, 8)).unwrap_err();
    assert!(matches!(err, Yolov8SegError::MissingOutput(ref name) if name == DEFAULT_SCORES_OUTPUT));
  }
}
