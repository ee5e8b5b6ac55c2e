// 该文件是 Model API （模型接口） 项目的一部分。
// src/args.rs - 命令行参数
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

use clap::{Parser, ValueEnum};
use url::Url;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
  /// Mask R-CNN 实例分割
  #[value(name = "maskrcnn")]
  MaskRcnn,
  /// OpenPose 人体姿态估计
  #[value(name = "openpose")]
  OpenPose,
  /// SSD 目标检测
  Ssd,
  /// 图像分类
  Classification,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
  /// 只推理第一帧
  #[value(name = "oneshot")]
  OneShot,
  /// 缓存全部帧后计时推理，输出 FPS
  #[default]
  Benchmark,
  /// 逐帧推理直到输入结束或收到 Ctrl-C
  Continuous,
}

/// Model API 推理示例
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型文件路径（.xml 或 .onnx）
  #[arg(value_name = "MODEL")]
  pub model: PathBuf,

  /// 输入图像或图像目录
  #[arg(value_name = "INPUT")]
  pub input: PathBuf,

  /// 模型类型
  #[arg(long, value_enum)]
  pub kind: ModelKind,

  /// 推理设备
  #[arg(long, default_value = "CPU")]
  pub device: String,

  /// JSON 格式的模型配置文件
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,

  /// 置信度阈值 (0.0 - 1.0)，覆盖配置文件中的值
  #[arg(long, value_name = "THRESHOLD")]
  pub confidence: Option<f32>,

  /// 输出路径，如 image:///tmp/out.png、folder:///tmp/records?record=name、stdout://
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<Url>,

  /// 运行方式
  #[arg(long, value_enum, default_value_t = Mode::default())]
  pub mode: Mode,

  /// 连续模式下最多处理的帧数
  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_positional_and_flags() {
    let args = Args::try_parse_from([
      "model-api",
      "model.xml",
      "images",
      "--kind",
      "maskrcnn",
      "--confidence",
      "0.3",
      "--output",
      "stdout://",
      "--mode",
      "oneshot",
    ])
    .unwrap();
    assert_eq!(args.kind, ModelKind::MaskRcnn);
    assert_eq!(args.device, "CPU");
    assert_eq!(args.confidence, Some(0.3));
    assert_eq!(args.mode, Mode::OneShot);
    assert_eq!(args.output.unwrap().scheme(), "stdout");
  }

  #[test]
  fn kind_is_required() {
    assert!(Args::try_parse_from(["model-api", "model.xml", "images"]).is_err());
  }
}
