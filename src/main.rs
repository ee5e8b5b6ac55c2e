// 该文件是 Model API （模型接口） 项目的一部分。
// src/main.rs - 通用推理程序
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

mod args;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use model_api::{
  FromUrl,
  config::ModelConfig,
  input::open_input,
  model::{Adapter, Classification, MaskRcnn, ModelSessionBuilder, OpenPose, Ssd},
  output::{OutputResult, OutputWrapper},
  task::{BenchmarkTask, ContinuousTask, OneShotTask, Task},
};

use crate::args::{Args, Mode, ModelKind};

fn run<A>(args: &Args, adapter: A) -> Result<()>
where
  A: Adapter,
  A::Output: OutputResult,
{
  let model = ModelSessionBuilder::new(&args.model)
    .device(&args.device)
    .build(adapter)?;
  let input = open_input(&args.input)?;
  let output = args
    .output
    .as_ref()
    .map(OutputWrapper::from_url)
    .transpose()?;

  match args.mode {
    Mode::OneShot => {
      OneShotTask.run_task(input, model, output)?;
    }
    Mode::Benchmark => {
      let report = BenchmarkTask::default()
        .with_render(output.is_some())
        .run_task(input.cache()?, model, output)?;
      println!("{}", report);
    }
    Mode::Continuous => {
      let processed = ContinuousTask::default()
        .with_frame_number(args.frame_number)
        .run_task(input, model, output)?;
      info!("共处理 {} 帧", processed);
    }
  }
  Ok(())
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model.display());
  info!("输入来源: {}", args.input.display());
  info!("模型类型: {:?}, 推理设备: {}", args.kind, args.device);

  let config = match &args.config {
    Some(path) => ModelConfig::load(path)?,
    None => ModelConfig::default(),
  };

  match args.kind {
    ModelKind::MaskRcnn => {
      let mut adapter = MaskRcnn::from_config(&config)?;
      if let Some(threshold) = args.confidence {
        adapter = adapter.with_confidence(threshold);
      }
      run(&args, adapter)
    }
    ModelKind::OpenPose => {
      let mut adapter = OpenPose::from_config(&config)?;
      if let Some(threshold) = args.confidence {
        adapter = adapter.with_confidence(threshold);
      }
      run(&args, adapter)
    }
    ModelKind::Ssd => {
      let mut adapter = Ssd::from_config(&config)?;
      if let Some(threshold) = args.confidence {
        adapter = adapter.with_confidence(threshold);
      }
      run(&args, adapter)
    }
    ModelKind::Classification => {
      if args.confidence.is_some() {
        warn!("分类模型不使用置信度阈值, 忽略 --confidence");
      }
      run(&args, Classification::from_config(&config)?)
    }
  }
}
