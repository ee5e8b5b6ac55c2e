// 该文件是 Model API （模型接口） 项目的一部分。
// src/frame.rs - 帧与输入张量定义
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

use std::{fmt, path::PathBuf, str::FromStr};

use image::RgbImage;
use ndarray::Array4;
use thiserror::Error;

const RGB_CHANNELS: usize = 3;

/// 一帧待推理的图像
#[derive(Debug, Clone)]
pub struct Frame {
  /// 帧序号（从 0 开始）
  pub index: usize,
  /// 图像来源路径
  pub source: PathBuf,
  /// RGB 图像数据
  pub image: RgbImage,
}

impl Frame {
  pub fn new(index: usize, source: impl Into<PathBuf>, image: RgbImage) -> Self {
    Self {
      index,
      source: source.into(),
      image,
    }
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("不支持的张量布局: {0}")]
pub struct LayoutError(pub String);

/// 模型输入张量布局
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layout {
  #[default]
  Nchw,
  Nhwc,
}

impl FromStr for Layout {
  type Err = LayoutError;

  /// 支持 `NCHW`、`NHWC` 以及带输入名前缀的 `data:NCHW` 写法
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let layout = match s.rsplit_once(':') {
      Some((_, layout)) => layout,
      None => s,
    };
    match layout.trim().to_ascii_uppercase().as_str() {
      "NCHW" => Ok(Layout::Nchw),
      "NHWC" => Ok(Layout::Nhwc),
      _ => Err(LayoutError(s.to_string())),
    }
  }
}

impl fmt::Display for Layout {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Layout::Nchw => write!(f, "NCHW"),
      Layout::Nhwc => write!(f, "NHWC"),
    }
  }
}

/// 预处理之后交给推理引擎的浮点张量
#[derive(Debug, Clone)]
pub struct InputTensor {
  layout: Layout,
  data: Array4<f32>,
}

impl InputTensor {
  /// 将 RGB 图像按布局展开，`reverse_channels` 为真时输出 BGR 顺序
  pub fn from_rgb_image(
    image: &RgbImage,
    layout: Layout,
    reverse_channels: bool,
    mean: [f32; 3],
    scale: [f32; 3],
  ) -> Self {
    let (width, height) = (image.width() as usize, image.height() as usize);
    let shape = match layout {
      Layout::Nchw => (1, RGB_CHANNELS, height, width),
      Layout::Nhwc => (1, height, width, RGB_CHANNELS),
    };
    let mut data = Array4::<f32>::zeros(shape);

    for (x, y, pixel) in image.enumerate_pixels() {
      let (x, y) = (x as usize, y as usize);
      for c in 0..RGB_CHANNELS {
        let src = if reverse_channels { RGB_CHANNELS - 1 - c } else { c };
        let value = (pixel[src] as f32 - mean[c]) / scale[c];
        match layout {
          Layout::Nchw => data[[0, c, y, x]] = value,
          Layout::Nhwc => data[[0, y, x, c]] = value,
        }
      }
    }

    Self { layout, data }
  }

  pub fn layout(&self) -> Layout {
    self.layout
  }

  /// 张量形状，顺序与布局一致
  pub fn shape(&self) -> [usize; 4] {
    let dim = self.data.dim();
    [dim.0, dim.1, dim.2, dim.3]
  }

  /// 张量的 (宽, 高)
  pub fn spatial_size(&self) -> (usize, usize) {
    let [_, a, b, c] = self.shape();
    match self.layout {
      Layout::Nchw => (c, b),
      Layout::Nhwc => (b, a),
    }
  }

  pub fn data(&self) -> &Array4<f32> {
    &self.data
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn layout_accepts_prefixed_names() {
    assert_eq!("NCHW".parse::<Layout>(), Ok(Layout::Nchw));
    assert_eq!("nhwc".parse::<Layout>(), Ok(Layout::Nhwc));
    assert_eq!("image:NHWC".parse::<Layout>(), Ok(Layout::Nhwc));
    assert!("CHW".parse::<Layout>().is_err());
    assert!("data:NC".parse::<Layout>().is_err());
  }

  #[test]
  fn nchw_tensor_is_bgr_and_normalized() {
    let mut image = RgbImage::new(2, 1);
    image.put_pixel(0, 0, Rgb([10, 20, 30]));
    image.put_pixel(1, 0, Rgb([40, 50, 60]));

    let tensor = InputTensor::from_rgb_image(&image, Layout::Nchw, true, [0.0; 3], [2.0; 3]);
    assert_eq!(tensor.shape(), [1, 3, 1, 2]);
    assert_eq!(tensor.spatial_size(), (2, 1));
    let data = tensor.data();
    assert_eq!(data[[0, 0, 0, 0]], 15.0);
    assert_eq!(data[[0, 2, 0, 0]], 5.0);
    assert_eq!(data[[0, 1, 0, 1]], 25.0);
  }

  #[test]
  fn nhwc_tensor_keeps_rgb_order() {
    let mut image = RgbImage::new(1, 2);
    image.put_pixel(0, 1, Rgb([1, 2, 3]));

    let tensor = InputTensor::from_rgb_image(&image, Layout::Nhwc, false, [1.0; 3], [1.0; 3]);
    assert_eq!(tensor.shape(), [1, 2, 1, 3]);
    assert_eq!(tensor.spatial_size(), (1, 2));
    assert_eq!(tensor.data()[[0, 1, 0, 2]], 2.0);
    assert_eq!(tensor.data()[[0, 0, 0, 0]], -1.0);
  }
}
