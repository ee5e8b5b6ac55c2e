// 该文件是 Model API （模型接口） 项目的一部分。
// src/config.rs - 模型配置文件
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

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::{
  frame::{Layout, LayoutError},
  model::labels::{Labels, LabelsError},
  preprocess::{PreprocessConfig, ResizeMode},
};

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("配置文件解析错误: {0}")]
  ParseError(#[from] serde_json::Error),
  #[error(transparent)]
  Layout(#[from] LayoutError),
  #[error(transparent)]
  Labels(#[from] LabelsError),
  #[error("配置项 {0} 无效: {1}")]
  Invalid(&'static str, String),
}

/// 标签既可以直接写在配置里，也可以指向一个标签文件
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum LabelsConfig {
  List(Vec<String>),
  File(PathBuf),
}

/// 模型配置，所有字段均可省略，省略时使用各模型的默认值
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
  pub confidence_threshold: Option<f32>,
  pub labels: Option<LabelsConfig>,
  pub layout: Option<String>,
  pub resize_type: Option<ResizeMode>,
  pub pad_value: Option<u8>,
  pub reverse_input_channels: Option<bool>,
  pub mean_values: Option<[f32; 3]>,
  pub scale_values: Option<[f32; 3]>,
  /// 模型输入尺寸 [宽, 高]
  pub input_size: Option<[u32; 2]>,
  /// OpenPose 输入高度
  pub target_size: Option<u32>,
  /// OpenPose 输入宽高比
  pub aspect_ratio: Option<f64>,
  pub topk: Option<usize>,
  pub apply_softmax: Option<bool>,
}

impl ModelConfig {
  pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    info!("读取模型配置: {}", path.display());
    let content = std::fs::read_to_string(path)?;
    Self::from_json(&content)
  }

  pub fn from_json(content: &str) -> Result<Self, ConfigError> {
    let config: ModelConfig = serde_json::from_str(content)?;
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<(), ConfigError> {
    if let Some(t) = self.confidence_threshold
      && !(0.0..=1.0).contains(&t)
    {
      return Err(ConfigError::Invalid("confidence_threshold", t.to_string()));
    }
    if let Some(scale) = self.scale_values
      && scale.contains(&0.0)
    {
      return Err(ConfigError::Invalid("scale_values", format!("{:?}", scale)));
    }
    if let Some(ratio) = self.aspect_ratio
      && ratio <= 0.0
    {
      return Err(ConfigError::Invalid("aspect_ratio", ratio.to_string()));
    }
    if let Some(layout) = &self.layout {
      layout.parse::<Layout>()?;
    }
    Ok(())
  }

  /// 用配置中出现的字段覆盖预处理默认值
  pub fn apply_preprocess(&self, mut base: PreprocessConfig) -> Result<PreprocessConfig, ConfigError> {
    if let Some([w, h]) = self.input_size {
      base.input_size = (w, h);
      base.input_size_configured = true;
    }
    if let Some(layout) = &self.layout {
      base.layout = layout.parse()?;
    }
    if let Some(mode) = self.resize_type {
      base.resize_mode = mode;
    }
    if let Some(pad) = self.pad_value {
      base.pad_value = pad;
    }
    if let Some(reverse) = self.reverse_input_channels {
      base.reverse_input_channels = reverse;
    }
    if let Some(mean) = self.mean_values {
      base.mean_values = mean;
    }
    if let Some(scale) = self.scale_values {
      base.scale_values = scale;
    }
    Ok(base)
  }

  /// 解析标签配置，未配置时返回 `default`
  pub fn labels_or(&self, default: Labels) -> Result<Labels, ConfigError> {
    match &self.labels {
      Some(LabelsConfig::List(names)) => Ok(Labels::new(names.clone())),
      Some(LabelsConfig::File(path)) => Ok(Labels::from_file(path)?),
      None => Ok(default),
    }
  }
}
