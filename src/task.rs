// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 任务
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

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::{model::Model, output::Render};

pub const DEFAULT_REPEAT_TIMES: usize = 100;
pub const DEFAULT_WARMUP_TIMES: usize = 2;

pub trait Task<I, M, O>: Sized {
  type Error;
  type Report;
  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Report, Self::Error>;
}

pub struct OneShotTask;

impl<F, D, ME, RE, I, M, O> Task<I, M, O> for OneShotTask
where
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
{
  type Error = anyhow::Error;
  type Report = Duration;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<Self::Report, Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let now = Instant::now();
    let result = model.infer(&frame)?;
    let elapsed = now.elapsed();
    info!("推理完成，耗时: {:.2?}", elapsed);
    let now = Instant::now();
    output.render_result(&frame, &result)?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    Ok(elapsed)
  }
}

/// 推理耗时统计，不含预热轮次
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyReport {
  pub runs: usize,
  pub mean: Duration,
  pub min: Duration,
  pub max: Duration,
}

impl LatencyReport {
  pub fn from_samples(samples: &[Duration]) -> Option<Self> {
    let min = *samples.iter().min()?;
    let max = *samples.iter().max()?;
    let mean = samples.iter().sum::<Duration>() / samples.len() as u32;
    Some(Self {
      runs: samples.len(),
      mean,
      min,
      max,
    })
  }
}

/// 对同一帧重复推理，用于测量耗时
#[derive(Debug, Clone, Copy)]
pub struct RepeatShotTask {
  repeat: usize,
  warmup: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self {
      repeat: DEFAULT_REPEAT_TIMES,
      warmup: DEFAULT_WARMUP_TIMES,
    }
  }
}

impl RepeatShotTask {
  pub fn with_repeat(mut self, repeat: usize) -> Self {
    self.repeat = repeat;
    self
  }

  pub fn with_warmup(mut self, warmup: usize) -> Self {
    self.warmup = warmup;
    self
  }
}

impl<F, D, ME, RE, I, M, O> Task<I, M, O> for RepeatShotTask
where
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
{
  type Error = anyhow::Error;
  type Report = LatencyReport;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<Self::Report, Self::Error> {
    if self.repeat <= self.warmup {
      anyhow::bail!(
        "重复次数 {} 必须大于预热次数 {}",
        self.repeat,
        self.warmup
      );
    }

    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let mut times = Vec::with_capacity(self.repeat);
    let mut last = None;
    for i in 0..self.repeat {
      let now = Instant::now();
      let result = model.infer(&frame)?;
      let elapsed = now.elapsed();
      debug!("({})推理完成，耗时: {:.2?}", i, elapsed);
      times.push(elapsed);
      last = Some(result);
    }

    if let Some(result) = last {
      output.render_result(&frame, &result)?;
      info!("渲染完成");
    }

    let report = LatencyReport::from_samples(&times[self.warmup..])
      .ok_or_else(|| anyhow::anyhow!("没有可统计的推理耗时"))?;
    warn!(
      "推理 {} 次 (预热 {} 次), 平均: {:.2?}, 最短: {:.2?}, 最长: {:.2?}",
      report.runs, self.warmup, report.mean, report.min, report.max
    );

    Ok(report)
  }
}
