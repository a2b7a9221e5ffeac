// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/simple.rs - 单张图像实例分割
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

use anyhow::Result;
use clap::Parser;
use url::Url;

use shanan_seg::{
  FromUrl,
  input::InputWrapper,
  model::Yolov8SegBuilder,
  output::OutputWrapper,
  task::{OneShotTask, Task},
};
use tracing::info;

/// Shanan 实例分割参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型输出转储，例如 yolov8seg:///path/dump.json?proto=nhwc
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源，例如 image:///path/input.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径，image:///path/out.png 或 record:///path/out.json
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 置信度阈值 (0.0 - 1.0)，覆盖模型 URL 中的 conf
  #[arg(long, value_name = "THRESHOLD")]
  pub confidence: Option<f32>,
  /// NMS IoU 阈值 (0.0 - 1.0)，覆盖模型 URL 中的 nms
  #[arg(long, value_name = "THRESHOLD")]
  pub nms_threshold: Option<f32>,
  /// 最小边长（像素），覆盖模型 URL 中的 border
  #[arg(long, value_name = "PIXELS")]
  pub min_border: Option<u32>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let mut builder = Yolov8SegBuilder::from_url(&args.model)?;
  if let Some(confidence) = args.confidence {
    builder = builder.conf_thresh(confidence);
  }
  if let Some(nms_threshold) = args.nms_threshold {
    builder = builder.nms_thresh(nms_threshold);
  }
  if let Some(min_border) = args.min_border {
    builder = builder.min_border(min_border);
  }

  let input = InputWrapper::from_url(&args.input)?;
  let mut model = builder.build()?;
  let output = OutputWrapper::from_url(&args.output)?;

  let elapsed = OneShotTask.run_task(input.into_images(), &model, output)?;
  info!("推理耗时: {:.2?}", elapsed);

  model.deinit()?;
  Ok(())
}
