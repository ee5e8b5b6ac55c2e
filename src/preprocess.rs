// 该文件是 Model API （模型接口） 项目的一部分。
// src/preprocess.rs - 图像模型通用预处理
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

use image::{Rgb, RgbImage, imageops::FilterType};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::{
  engine::InputShape,
  frame::{InputTensor, Layout},
};

#[derive(Error, Debug)]
pub enum PreprocessError {
  #[error("输入图像为空: {0}x{1}")]
  EmptyImage(u32, u32),
  #[error("模型输入尺寸无效: {0}x{1}")]
  InvalidInputSize(u32, u32),
  #[error("图像宽高比与模型输入不匹配: 缩放后宽度 {resized} 超过模型输入宽度 {input}")]
  AspectRatioMismatch { resized: u32, input: u32 },
  #[error("配置的输入尺寸 {configured:?} 与模型的静态输入尺寸 {model:?} 不一致")]
  InputSizeMismatch {
    configured: (u32, u32),
    model: (u32, u32),
  },
}

/// 模型输入为静态形状时以模型为准；`configured` 为真表示尺寸由配置指定，
/// 此时与模型不一致直接报错
pub(crate) fn bind_input_size(
  size: &mut (u32, u32),
  configured: bool,
  shape: &InputShape,
  layout: Layout,
) -> Result<(), PreprocessError> {
  let Some(model) = shape.spatial_size(layout) else {
    debug!("模型输入尺寸是动态的, 使用 {}x{}", size.0, size.1);
    return Ok(());
  };
  if configured && *size != model {
    return Err(PreprocessError::InputSizeMismatch {
      configured: *size,
      model,
    });
  }
  if *size != model {
    debug!("使用模型的输入尺寸 {}x{}", model.0, model.1);
  }
  *size = model;
  Ok(())
}

/// 缩放方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeMode {
  /// 直接拉伸到模型输入尺寸
  #[default]
  Standard,
  /// 保持宽高比，右侧和下方填充
  FitToWindow,
  /// 保持宽高比，居中填充
  FitToWindowLetterbox,
}

/// 预处理参数
#[derive(Debug, Clone)]
pub struct PreprocessConfig {
  /// 模型输入尺寸 (宽, 高)
  pub input_size: (u32, u32),
  /// 为真时 `input_size` 来自配置，不随模型输入改变
  pub input_size_configured: bool,
  pub layout: Layout,
  pub resize_mode: ResizeMode,
  pub pad_value: u8,
  /// 为真时输出 BGR 通道顺序
  pub reverse_input_channels: bool,
  pub mean_values: [f32; 3],
  pub scale_values: [f32; 3],
}

impl Default for PreprocessConfig {
  fn default() -> Self {
    Self {
      input_size: (640, 640),
      input_size_configured: false,
      layout: Layout::Nchw,
      resize_mode: ResizeMode::Standard,
      pad_value: 0,
      reverse_input_channels: true,
      mean_values: [0.0; 3],
      scale_values: [1.0; 3],
    }
  }
}

impl PreprocessConfig {
  pub fn bind_input(&mut self, shape: &InputShape) -> Result<(), PreprocessError> {
    bind_input_size(
      &mut self.input_size,
      self.input_size_configured,
      shape,
      self.layout,
    )
  }
}

/// 预处理时记录的图像几何信息，后处理用它把结果映射回原图
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageMeta {
  /// 原图尺寸 (宽, 高)
  pub original_size: (u32, u32),
  /// 模型输入尺寸 (宽, 高)
  pub input_size: (u32, u32),
  /// 模型输入坐标到原图坐标的缩放系数
  pub scale_x: f32,
  pub scale_y: f32,
  pub pad_left: f32,
  pub pad_top: f32,
}

impl ImageMeta {
  pub fn new(
    original_size: (u32, u32),
    input_size: (u32, u32),
    resize_mode: ResizeMode,
  ) -> Self {
    let (orig_w, orig_h) = (original_size.0 as f32, original_size.1 as f32);
    let (net_w, net_h) = (input_size.0 as f32, input_size.1 as f32);
    let mut scale_x = orig_w / net_w;
    let mut scale_y = orig_h / net_h;
    let (mut pad_left, mut pad_top) = (0.0, 0.0);

    if resize_mode != ResizeMode::Standard {
      let scale = scale_x.max(scale_y);
      scale_x = scale;
      scale_y = scale;
      if resize_mode == ResizeMode::FitToWindowLetterbox {
        pad_left = ((input_size.0 as i64 - (orig_w / scale).round() as i64) / 2) as f32;
        pad_top = ((input_size.1 as i64 - (orig_h / scale).round() as i64) / 2) as f32;
      }
    }

    Self {
      original_size,
      input_size,
      scale_x,
      scale_y,
      pad_left,
      pad_top,
    }
  }

  /// 缩放后图像在模型输入中占据的尺寸 (宽, 高)
  pub fn resized_size(&self) -> (u32, u32) {
    let w = (self.original_size.0 as f32 / self.scale_x).round() as u32;
    let h = (self.original_size.1 as f32 / self.scale_y).round() as u32;
    (w.clamp(1, self.input_size.0), h.clamp(1, self.input_size.1))
  }

  /// 模型输入坐标映射回原图坐标，并截断到原图范围内
  pub fn to_original(&self, x: f32, y: f32) -> (f32, f32) {
    let ox = ((x - self.pad_left) * self.scale_x).clamp(0.0, self.original_size.0 as f32);
    let oy = ((y - self.pad_top) * self.scale_y).clamp(0.0, self.original_size.1 as f32);
    (ox, oy)
  }
}

/// 按配置缩放、填充图像并生成输入张量
pub fn preprocess(
  image: &RgbImage,
  config: &PreprocessConfig,
) -> Result<(InputTensor, ImageMeta), PreprocessError> {
  let (width, height) = image.dimensions();
  if width == 0 || height == 0 {
    return Err(PreprocessError::EmptyImage(width, height));
  }
  let (net_w, net_h) = config.input_size;
  if net_w == 0 || net_h == 0 {
    return Err(PreprocessError::InvalidInputSize(net_w, net_h));
  }

  let meta = ImageMeta::new((width, height), config.input_size, config.resize_mode);
  let (resized_w, resized_h) = meta.resized_size();
  debug!(
    "预处理: 原图 {}x{} -> 缩放 {}x{} -> 输入 {}x{}",
    width, height, resized_w, resized_h, net_w, net_h
  );

  let resized = image::imageops::resize(image, resized_w, resized_h, FilterType::Triangle);
  let canvas = if (resized_w, resized_h) == (net_w, net_h) {
    resized
  } else {
    let mut canvas = RgbImage::from_pixel(net_w, net_h, Rgb([config.pad_value; 3]));
    image::imageops::overlay(
      &mut canvas,
      &resized,
      meta.pad_left as i64,
      meta.pad_top as i64,
    );
    canvas
  };

  let tensor = InputTensor::from_rgb_image(
    &canvas,
    config.layout,
    config.reverse_input_channels,
    config.mean_values,
    config.scale_values,
  );
  Ok((tensor, meta))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn standard_resize_scales_axes_independently() {
    let meta = ImageMeta::new((200, 100), (100, 100), ResizeMode::Standard);
    assert_eq!(meta.scale_x, 2.0);
    assert_eq!(meta.scale_y, 1.0);
    assert_eq!(meta.resized_size(), (100, 100));
    assert_eq!(meta.to_original(50.0, 50.0), (100.0, 50.0));
  }

  #[test]
  fn letterbox_centers_image_and_maps_back() {
    let meta = ImageMeta::new((200, 100), (100, 100), ResizeMode::FitToWindowLetterbox);
    assert_eq!(meta.scale_x, 2.0);
    assert_eq!(meta.scale_y, 2.0);
    assert_eq!(meta.resized_size(), (100, 50));
    assert_eq!(meta.pad_left, 0.0);
    assert_eq!(meta.pad_top, 25.0);
    assert_eq!(meta.to_original(50.0, 50.0), (100.0, 50.0));
    // 填充区域截断到原图边界
    assert_eq!(meta.to_original(0.0, 0.0), (0.0, 0.0));
    assert_eq!(meta.to_original(100.0, 100.0), (200.0, 100.0));
  }

  #[test]
  fn fit_to_window_pads_right_and_bottom() {
    let mut image = RgbImage::from_pixel(40, 20, Rgb([255, 0, 0]));
    image.put_pixel(0, 0, Rgb([255, 0, 0]));
    let config = PreprocessConfig {
      input_size: (20, 20),
      resize_mode: ResizeMode::FitToWindow,
      pad_value: 7,
      reverse_input_channels: false,
      ..Default::default()
    };

    let (tensor, meta) = preprocess(&image, &config).unwrap();
    assert_eq!(tensor.shape(), [1, 3, 20, 20]);
    assert_eq!(meta.resized_size(), (20, 10));
    let data = tensor.data();
    assert_eq!(data[[0, 0, 0, 0]], 255.0);
    assert_eq!(data[[0, 0, 15, 5]], 7.0);
    assert_eq!(data[[0, 1, 15, 5]], 7.0);
  }

  #[test]
  fn static_model_shape_sets_input_size() {
    let shape = InputShape(vec![Some(1), Some(3), Some(480), Some(640)]);
    let mut config = PreprocessConfig {
      input_size: (300, 300),
      ..Default::default()
    };
    config.bind_input(&shape).unwrap();
    assert_eq!(config.input_size, (640, 480));

    // 动态形状保留原尺寸
    let mut config = PreprocessConfig::default();
    config.bind_input(&InputShape(vec![Some(1), Some(3), None, None])).unwrap();
    assert_eq!(config.input_size, (640, 640));
  }

  #[test]
  fn configured_size_must_match_static_model() {
    let shape = InputShape(vec![Some(1), Some(3), Some(480), Some(640)]);
    let mut config = PreprocessConfig {
      input_size: (320, 320),
      input_size_configured: true,
      ..Default::default()
    };
    assert!(matches!(
      config.bind_input(&shape),
      Err(PreprocessError::InputSizeMismatch {
        configured: (320, 320),
        model: (640, 480),
      })
    ));

    config.input_size = (640, 480);
    assert!(config.bind_input(&shape).is_ok());
  }

  #[test]
  fn empty_image_is_rejected() {
    let image = RgbImage::new(0, 0);
    assert!(matches!(
      preprocess(&image, &PreprocessConfig::default()),
      Err(PreprocessError::EmptyImage(0, 0))
    ));
  }
}
