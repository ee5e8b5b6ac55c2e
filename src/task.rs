// 该文件是 Model API （模型接口） 项目的一部分。
// src/task.rs - 推理任务
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

use std::{
  fmt, thread,
  time::{Duration, Instant},
};

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

use crate::{frame::Frame, model::Model, output::Render};

pub trait Task<I, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error>;
}

pub struct OneShotTask;

impl<I, IE, M, O> Task<I, M, O> for OneShotTask
where
  I: Iterator<Item = Result<Frame, IE>>,
  IE: std::error::Error + Send + Sync + 'static,
  M: Model,
  M::Error: std::error::Error + Send + Sync + 'static,
  O: Render<M::Output>,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Output = M::Output;
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, mut model: M, output: O) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))??;
    info!("输入帧获取成功，开始推理...");
    let now = Instant::now();
    let result = model.infer(&frame)?;
    let elapsed = now.elapsed();
    info!("推理完成，耗时: {:.2?}", elapsed);
    output.render_result(&frame, &result)?;
    info!("渲染完成，总耗时: {:.2?}", now.elapsed());

    Ok(result)
  }
}

/// 一次基准测试的统计
#[derive(Debug, Clone)]
pub struct BenchmarkReport {
  pub frames: usize,
  pub elapsed: Duration,
  pub finished_at: DateTime<Local>,
}

impl BenchmarkReport {
  pub fn fps(&self) -> f64 {
    let seconds = self.elapsed.as_secs_f64();
    if seconds > 0.0 {
      self.frames as f64 / seconds
    } else {
      0.0
    }
  }
}

impl fmt::Display for BenchmarkReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(
      f,
      "finished computation at {}",
      self.finished_at.format("%a %b %e %H:%M:%S %Y")
    )?;
    writeln!(f, "elapsed time: {:.6}s", self.elapsed.as_secs_f64())?;
    write!(f, "FPS: {:.4}", self.fps())
  }
}

/// 先解码全部输入，只对推理计时；渲染在计时结束后进行
#[derive(Default, Debug)]
pub struct BenchmarkTask {
  render: bool,
}

impl BenchmarkTask {
  pub fn with_render(mut self, render: bool) -> Self {
    self.render = render;
    self
  }
}

/// 输入为预先解码好的帧，见 [`crate::input::InputWrapper::cache`]
impl<M, O> Task<Vec<Frame>, M, O> for BenchmarkTask
where
  M: Model,
  M::Error: std::error::Error + Send + Sync + 'static,
  O: Render<M::Output>,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Output = BenchmarkReport;
  type Error = anyhow::Error;

  fn run_task(self, frames: Vec<Frame>, mut model: M, output: O) -> Result<Self::Output, Self::Error> {
    if frames.is_empty() {
      anyhow::bail!("没有输入帧");
    }
    info!("已缓存 {} 帧图像，开始推理...", frames.len());

    let mut results = Vec::with_capacity(if self.render { frames.len() } else { 0 });
    let start = Instant::now();
    for frame in frames.iter() {
      let result = model.infer(frame)?;
      if self.render {
        results.push(result);
      }
    }
    let elapsed = start.elapsed();
    let report = BenchmarkReport {
      frames: frames.len(),
      elapsed,
      finished_at: Local::now(),
    };
    info!("推理完成，共 {} 帧，耗时: {:.2?}", report.frames, elapsed);

    for (frame, result) in frames.iter().zip(results.iter()) {
      output.render_result(frame, result)?;
    }

    Ok(report)
  }
}

#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }
}

impl<I, IE, M, O> Task<I, M, O> for ContinuousTask
where
  I: Iterator<Item = Result<Frame, IE>>,
  IE: std::error::Error + Send + Sync + 'static,
  M: Model,
  M::Error: std::error::Error + Send + Sync + 'static,
  O: Render<M::Output>,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  /// 实际处理的帧数
  type Output = usize;
  type Error = anyhow::Error;

  fn run_task(self, input: I, mut model: M, output: O) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");
    let (tx, rx) = std::sync::mpsc::channel();

    let handler = ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    });
    if let Err(e) = handler {
      warn!("无法注册 Ctrl-C 处理函数: {}", e);
    }

    let mut processed = 0;
    let mut now = Instant::now();
    for frame in input {
      let frame = frame?;
      processed += 1;
      debug!("处理第 {} 帧图像: {}", processed, frame.source.display());
      let result = model.infer(&frame)?;
      let elapsed_a = now.elapsed();
      output.render_result(&frame, &result)?;
      let elapsed_b = now.elapsed();
      now = Instant::now();
      info!("推理完成，耗时: {:.2?} / {:.2?}", elapsed_a, elapsed_b);
      if self.frame_number.is_some_and(|n| processed >= n) {
        info!("达到指定帧数 {}, 退出任务循环", processed);
        break;
      }
      if rx.try_recv().is_ok() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    info!("任务完成，退出");
    Ok(processed)
  }
}
