// 该文件是 Model API （模型接口） 项目的一部分。
// src/bin/human_pose_sync.rs - OpenPose 同步推理
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

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

use model_api::{
  FromUrl,
  config::ModelConfig,
  input::open_input,
  model::{ModelSessionBuilder, OpenPose},
  output::OutputWrapper,
  task::{ContinuousTask, Task},
};

/// 对每张图像做人体姿态估计并输出关键点
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型文件路径
  #[arg(value_name = "MODEL")]
  pub model: PathBuf,
  /// 输入图像或图像目录
  #[arg(value_name = "IMAGE_OR_FOLDER")]
  pub input: PathBuf,
  /// 推理设备
  #[arg(long, default_value = "CPU")]
  pub device: String,
  /// JSON 格式的模型配置文件
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,
  /// 关键点置信度阈值
  #[arg(long, value_name = "THRESHOLD")]
  pub confidence: Option<f32>,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT", default_value = "stdout://")]
  pub output: Url,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model.display());
  info!("输入来源: {}", args.input.display());
  info!("输出路径: {}", args.output);

  let config = match &args.config {
    Some(path) => ModelConfig::load(path)?,
    None => ModelConfig::default(),
  };
  let mut adapter = OpenPose::from_config(&config)?;
  if let Some(threshold) = args.confidence {
    adapter = adapter.with_confidence(threshold);
  }
  let input = open_input(&args.input)?;
  let model = ModelSessionBuilder::new(&args.model)
    .device(&args.device)
    .build(adapter)?;
  info!("模型输入尺寸: {:?}", model.adapter().input_size());
  let output = OutputWrapper::from_url(&args.output)?;

  ContinuousTask::default().run_task(input, model, output)?;

  Ok(())
}
