// 该文件是 Model API （模型接口） 项目的一部分。
// src/model/openpose.rs - OpenPose 人体姿态估计
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
use ndarray::{Array2, ArrayD, Axis, Ix3};
use tracing::{debug, warn};

use crate::{
  config::ModelConfig,
  engine::{InferenceResult, InputShape},
  frame::{InputTensor, Layout},
  model::{
    Adapter, ModelError, PoseResult,
    pose::{KEYPOINTS_NUMBER, extract_peaks, group_peaks_to_poses},
  },
  preprocess::{ImageMeta, PreprocessError, bind_input_size},
  utils::resize_cubic,
};

const OPENPOSE_STRIDE: u32 = 8;
const OPENPOSE_UPSAMPLE_RATIO: usize = 4;
const OPENPOSE_MEAN_PIXEL: u8 = 128;
const OPENPOSE_MIN_PEAKS_DISTANCE: f32 = 3.0;
const OPENPOSE_TARGET_SIZE: u32 = 256;
const OPENPOSE_ASPECT_RATIO: f64 = 456.0 / 256.0;
const OPENPOSE_CONFIDENCE: f32 = 0.1;
/// 热力图通道数，最后一个是背景
const HEATMAP_CHANNELS: usize = KEYPOINTS_NUMBER + 1;
const PAF_CHANNELS: usize = 2 * (KEYPOINTS_NUMBER + 1);

#[derive(Debug, Clone)]
pub struct OpenPose {
  /// 模型输入尺寸 (宽, 高)
  input_size: (u32, u32),
  /// 为真时输入尺寸由配置的 `target_size` / `aspect_ratio` 决定
  input_size_configured: bool,
  confidence_threshold: f32,
  layout: Layout,
  reverse_input_channels: bool,
}

/// NCHW 输出且通道数为 `channels`
fn has_channels(shape: &[usize], channels: usize) -> bool {
  shape.len() == 4 && shape[1] == channels
}

fn round_up_to_stride(value: u32) -> u32 {
  value.div_ceil(OPENPOSE_STRIDE) * OPENPOSE_STRIDE
}

impl Default for OpenPose {
  fn default() -> Self {
    Self::new(OPENPOSE_TARGET_SIZE, OPENPOSE_ASPECT_RATIO)
  }
}

impl OpenPose {
  /// 输入高度取 `target_size`，宽度取 `高度 * aspect_ratio`，都向上对齐到步长
  pub fn new(target_size: u32, aspect_ratio: f64) -> Self {
    let height = round_up_to_stride(target_size);
    let width = round_up_to_stride((height as f64 * aspect_ratio).round() as u32);
    Self {
      input_size: (width, height),
      input_size_configured: false,
      confidence_threshold: OPENPOSE_CONFIDENCE,
      layout: Layout::Nchw,
      reverse_input_channels: true,
    }
  }

  pub fn from_config(config: &ModelConfig) -> Result<Self, ModelError> {
    let mut model = Self::new(
      config.target_size.unwrap_or(OPENPOSE_TARGET_SIZE),
      config.aspect_ratio.unwrap_or(OPENPOSE_ASPECT_RATIO),
    );
    model.input_size_configured = config.target_size.is_some() || config.aspect_ratio.is_some();
    if let Some(threshold) = config.confidence_threshold {
      model.confidence_threshold = threshold;
    }
    if let Some(layout) = &config.layout {
      model.layout = layout.parse().map_err(crate::config::ConfigError::from)?;
    }
    if let Some(reverse) = config.reverse_input_channels {
      model.reverse_input_channels = reverse;
    }
    Ok(model)
  }

  pub fn with_confidence(mut self, threshold: f32) -> Self {
    self.confidence_threshold = threshold;
    self
  }

  pub fn input_size(&self) -> (u32, u32) {
    self.input_size
  }

  /// 取出 NCHW 输出中的前 `channels` 个通道，并按上采样倍数放大
  fn upsample_maps(tensor: &ArrayD<f32>, channels: usize) -> Result<Vec<Array2<f32>>, ModelError> {
    let maps = tensor
      .index_axis(Axis(0), 0)
      .into_dimensionality::<Ix3>()
      .map_err(|e| ModelError::unexpected(format!("特征图形状无效: {}", e)))?;
    let (_, h, w) = maps.dim();
    Ok(
      maps
        .outer_iter()
        .take(channels)
        .map(|map| resize_cubic(map, h * OPENPOSE_UPSAMPLE_RATIO, w * OPENPOSE_UPSAMPLE_RATIO))
        .collect(),
    )
  }
}

impl Adapter for OpenPose {
  type Output = PoseResult;

  fn bind_input(&mut self, shape: &InputShape) -> Result<(), ModelError> {
    bind_input_size(
      &mut self.input_size,
      self.input_size_configured,
      shape,
      self.layout,
    )?;
    let (width, height) = self.input_size;
    if width % OPENPOSE_STRIDE != 0 || height % OPENPOSE_STRIDE != 0 {
      warn!(
        "模型输入尺寸 {}x{} 不是步长 {} 的整数倍",
        width, height, OPENPOSE_STRIDE
      );
    }
    Ok(())
  }

  /// 按高度缩放到模型输入，右侧用均值像素补齐
  fn preprocess(&self, image: &RgbImage) -> Result<(InputTensor, ImageMeta), ModelError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
      return Err(PreprocessError::EmptyImage(width, height).into());
    }
    let (input_w, input_h) = self.input_size;
    let scale = input_h as f32 / height as f32;
    let resized_w = ((width as f32 * scale).round() as u32).max(1);
    let resized_h = ((height as f32 * scale).round() as u32).clamp(1, input_h);

    if resized_w > input_w {
      return Err(
        PreprocessError::AspectRatioMismatch {
          resized: resized_w,
          input: input_w,
        }
        .into(),
      );
    }
    if input_w - resized_w >= OPENPOSE_STRIDE {
      warn!(
        "图像宽高比与模型输入不匹配, 右侧将填充 {} 像素",
        input_w - resized_w
      );
    }

    let resized = image::imageops::resize(image, resized_w, resized_h, FilterType::CatmullRom);
    let mut canvas = RgbImage::from_pixel(input_w, input_h, Rgb([OPENPOSE_MEAN_PIXEL; 3]));
    image::imageops::overlay(&mut canvas, &resized, 0, 0);

    let tensor = InputTensor::from_rgb_image(
      &canvas,
      self.layout,
      self.reverse_input_channels,
      [0.0; 3],
      [1.0; 3],
    );
    let meta = ImageMeta {
      original_size: (width, height),
      input_size: self.input_size,
      scale_x: width as f32 / resized_w as f32,
      scale_y: height as f32 / resized_h as f32,
      pad_left: 0.0,
      pad_top: 0.0,
    };
    Ok((tensor, meta))
  }

  fn postprocess(
    &self,
    output: &InferenceResult,
    meta: &ImageMeta,
  ) -> Result<Self::Output, ModelError> {
    let heatmaps = output
      .find(|s| has_channels(s, HEATMAP_CHANNELS))
      .ok_or_else(|| ModelError::unexpected("缺少 19 通道的热力图输出"))?;
    let pafs = output
      .find(|s| has_channels(s, PAF_CHANNELS))
      .ok_or_else(|| ModelError::unexpected("缺少 38 通道的 PAF 输出"))?;

    // 背景通道不参与峰值提取
    let heatmaps = Self::upsample_maps(heatmaps, KEYPOINTS_NUMBER)?;
    let pafs = Self::upsample_maps(pafs, PAF_CHANNELS)?;

    let peaks = extract_peaks(
      &heatmaps,
      self.confidence_threshold,
      OPENPOSE_MIN_PEAKS_DISTANCE,
    );
    debug!(
      "关键点峰值数: {}",
      peaks.iter().map(Vec::len).sum::<usize>()
    );

    let factor = OPENPOSE_STRIDE as f32 / OPENPOSE_UPSAMPLE_RATIO as f32;
    let mut poses = group_peaks_to_poses(&peaks, &pafs);
    for pose in poses.iter_mut() {
      for (x, y) in pose.keypoints.iter_mut().flatten() {
        *x *= factor * meta.scale_x;
        *y *= factor * meta.scale_y;
      }
    }

    debug!("检测到 {} 个人体姿态", poses.len());
    Ok(PoseResult {
      poses: poses.into_boxed_slice(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use ndarray::{Array4, IxDyn};

  #[test]
  fn input_size_is_aligned_to_stride() {
    assert_eq!(OpenPose::default().input_size(), (456, 256));
    assert_eq!(OpenPose::new(250, 1.5).input_size(), (384, 256));
  }

  #[test]
  fn static_model_decides_input_size() {
    let shape = InputShape(vec![Some(1), Some(3), Some(368), Some(656)]);
    let mut model = OpenPose::default();
    model.bind_input(&shape).unwrap();
    assert_eq!(model.input_size(), (656, 368));

    let config = ModelConfig::from_json(r#"{ "target_size": 256 }"#).unwrap();
    let mut model = OpenPose::from_config(&config).unwrap();
    assert!(matches!(
      model.bind_input(&shape),
      Err(ModelError::Preprocess(PreprocessError::InputSizeMismatch { .. }))
    ));

    // 动态输入按 target_size 计算
    let mut model = OpenPose::from_config(&config).unwrap();
    model.bind_input(&InputShape(vec![Some(1), Some(3), None, None])).unwrap();
    assert_eq!(model.input_size(), (456, 256));
  }

  #[test]
  fn image_is_scaled_by_height_and_padded() {
    let model = OpenPose::new(64, 2.0);
    let image = RgbImage::from_pixel(50, 50, Rgb([0, 0, 0]));
    let (tensor, meta) = model.preprocess(&image).unwrap();

    assert_eq!(tensor.shape(), [1, 3, 64, 128]);
    assert_eq!(meta.scale_x, 50.0 / 64.0);
    assert_eq!(tensor.data()[[0, 0, 10, 10]], 0.0);
    assert_eq!(tensor.data()[[0, 0, 10, 100]], 128.0);
  }

  #[test]
  fn too_wide_images_are_rejected() {
    let model = OpenPose::new(64, 1.0);
    let image = RgbImage::new(200, 50);
    assert!(matches!(
      model.preprocess(&image),
      Err(ModelError::Preprocess(PreprocessError::AspectRatioMismatch { .. }))
    ));
  }

  #[test]
  fn missing_pafs_are_reported() {
    let model = OpenPose::default();
    let meta = ImageMeta::new((8, 8), (8, 8), Default::default());
    let output = InferenceResult::new(vec![ArrayD::zeros(IxDyn(&[1, 19, 4, 4]))]);
    assert!(matches!(
      model.postprocess(&output, &meta),
      Err(ModelError::UnexpectedOutput(_))
    ));
  }

  #[test]
  fn extracts_pose_from_feature_maps() {
    const H: usize = 16;
    const W: usize = 24;
    let mut heatmaps = Array4::<f32>::zeros((1, HEATMAP_CHANNELS, H, W));
    // 脖子、右肩、右肘排成一行；旁边略低的值让上采样后的极大值唯一
    for (joint, x) in [(1usize, 3usize), (2, 9), (3, 15)] {
      heatmaps[[0, joint, 6, x]] = 0.9;
      heatmaps[[0, joint, 6, x + 1]] = 0.6;
      heatmaps[[0, joint, 7, x]] = 0.6;
    }
    let mut pafs = Array4::<f32>::zeros((1, PAF_CHANNELS, H, W));
    for c in (0..PAF_CHANNELS).step_by(2) {
      pafs.index_axis_mut(Axis(1), c).fill(1.0);
    }
    let output = InferenceResult::new(vec![pafs.into_dyn(), heatmaps.into_dyn()]);

    let model = OpenPose::new((H as u32) * OPENPOSE_STRIDE, W as f64 / H as f64);
    let meta = ImageMeta::new(
      (W as u32 * OPENPOSE_STRIDE, H as u32 * OPENPOSE_STRIDE),
      model.input_size(),
      Default::default(),
    );
    let result = model.postprocess(&output, &meta).unwrap();

    assert_eq!(result.poses.len(), 1);
    let pose = &result.poses[0];
    assert_eq!(pose.joints(), 3);
    for (joint, x) in [(1usize, 3.0f32), (2, 9.0), (3, 15.0)] {
      let (kx, ky) = pose.keypoints[joint].unwrap();
      let expected_x = (x + 0.5) * OPENPOSE_STRIDE as f32;
      let expected_y = 6.5 * OPENPOSE_STRIDE as f32;
      assert!((kx - expected_x).abs() <= 6.0, "x: {} vs {}", kx, expected_x);
      assert!((ky - expected_y).abs() <= 6.0, "y: {} vs {}", ky, expected_y);
    }
  }
}
