// 该文件是 Model API （模型接口） 项目的一部分。
// src/bin/instance_seg_sync.rs - Mask R-CNN 同步推理基准
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
  input::open_input,
  model::{MaskRcnn, ModelSessionBuilder},
  output::OutputWrapper,
  task::{BenchmarkTask, Task},
};

/// 缓存全部图像后用 Mask R-CNN 逐张推理，输出耗时和 FPS
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
  /// 可选的结果输出，在计时结束后渲染
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<Url>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model.display());
  info!("输入来源: {}", args.input.display());

  let frames = open_input(&args.input)?.cache()?;
  let model = ModelSessionBuilder::new(&args.model)
    .device(&args.device)
    .build(MaskRcnn::default())?;
  let output = args
    .output
    .as_ref()
    .map(OutputWrapper::from_url)
    .transpose()?;

  let report = BenchmarkTask::default()
    .with_render(output.is_some())
    .run_task(frames, model, output)?;
  println!("{}", report);

  Ok(())
}
