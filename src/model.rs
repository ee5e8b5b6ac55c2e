// 该文件是 Model API （模型接口） 项目的一部分。
// src/model.rs - 模型
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

use image::{GrayImage, RgbImage};
use thiserror::Error;
use tracing::debug;

use crate::{
  config::ConfigError,
  engine::{Engine, EngineError, InferenceResult, InputShape},
  frame::{Frame, InputTensor},
  preprocess::{ImageMeta, PreprocessError},
};

pub mod labels;

mod classification;
mod maskrcnn;
mod openpose;
mod pose;
mod ssd;

pub use self::classification::Classification;
pub use self::labels::{Label, Labels};
pub use self::maskrcnn::MaskRcnn;
pub use self::openpose::OpenPose;
pub use self::pose::{KEYPOINTS_NUMBER, Peak, find_peaks, group_peaks_to_poses};
pub use self::ssd::Ssd;

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("推理引擎错误: {0}")]
  Engine(#[from] EngineError),
  #[error("预处理错误: {0}")]
  Preprocess(#[from] PreprocessError),
  #[error("模型配置错误: {0}")]
  Config(#[from] ConfigError),
  #[error("模型输出不符合预期: {0}")]
  UnexpectedOutput(String),
}

impl ModelError {
  pub fn unexpected(msg: impl Into<String>) -> Self {
    ModelError::UnexpectedOutput(msg.into())
  }
}

pub trait Model {
  type Output;
  type Error;

  fn infer(&mut self, frame: &Frame) -> Result<Self::Output, Self::Error>;
}

/// 某一类模型的前后处理，和推理引擎无关
pub trait Adapter {
  type Output;

  /// 加载模型后按模型声明的输入形状确定输入尺寸
  fn bind_input(&mut self, shape: &InputShape) -> Result<(), ModelError>;

  fn preprocess(&self, image: &RgbImage) -> Result<(InputTensor, ImageMeta), ModelError>;
  fn postprocess(&self, output: &InferenceResult, meta: &ImageMeta)
  -> Result<Self::Output, ModelError>;
}

/// 推理引擎加上前后处理
pub struct ModelSession<A> {
  engine: Engine,
  adapter: A,
}

impl<A> ModelSession<A> {
  pub fn adapter(&self) -> &A {
    &self.adapter
  }
}

impl<A: Adapter> Model for ModelSession<A> {
  type Output = A::Output;
  type Error = ModelError;

  fn infer(&mut self, frame: &Frame) -> Result<Self::Output, Self::Error> {
    debug!("预处理第 {} 帧", frame.index);
    let (tensor, meta) = self.adapter.preprocess(&frame.image)?;
    let output = self.engine.infer(&tensor)?;
    debug!("后处理模型输出, 共 {} 个张量", output.len());
    self.adapter.postprocess(&output, &meta)
  }
}

pub struct ModelSessionBuilder {
  model_path: PathBuf,
  device: String,
}

impl ModelSessionBuilder {
  pub fn new(model_path: impl Into<PathBuf>) -> Self {
    Self {
      model_path: model_path.into(),
      device: "CPU".to_string(),
    }
  }

  pub fn device(mut self, device: impl Into<String>) -> Self {
    self.device = device.into();
    self
  }

  pub fn build<A: Adapter>(self, mut adapter: A) -> Result<ModelSession<A>, ModelError> {
    let engine = Engine::load(&self.model_path, &self.device)?;
    adapter.bind_input(engine.input_shape())?;
    Ok(ModelSession { engine, adapter })
  }
}

#[derive(Debug, Clone)]
pub struct DetectItem {
  pub label: Label,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，原图像素坐标
}

impl DetectItem {
  pub fn width(&self) -> f32 {
    self.bbox[2] - self.bbox[0]
  }

  pub fn height(&self) -> f32 {
    self.bbox[3] - self.bbox[1]
  }
}

#[derive(Debug, Clone, Default)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }
}

#[derive(Debug, Clone)]
pub struct SegmentItem {
  pub label: Label,
  pub score: f32,
  pub bbox: [f32; 4],
  /// 裁剪到 bbox 的二值掩码（0 或 255），左上角对应 bbox 的 (x_min, y_min)
  pub mask: GrayImage,
}

#[derive(Debug, Clone, Default)]
pub struct SegmentResult {
  pub items: Box<[SegmentItem]>,
}

impl SegmentResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HumanPose {
  /// 18 个关键点，缺失的为 None
  pub keypoints: [Option<(f32, f32)>; KEYPOINTS_NUMBER],
  pub score: f32,
}

impl HumanPose {
  pub fn joints(&self) -> usize {
    self.keypoints.iter().filter(|k| k.is_some()).count()
  }
}

#[derive(Debug, Clone, Default)]
pub struct PoseResult {
  pub poses: Box<[HumanPose]>,
}

impl PoseResult {
  pub fn is_empty(&self) -> bool {
    self.poses.is_empty()
  }
}

#[derive(Debug, Clone)]
pub struct ClassifyItem {
  pub label: Label,
  pub score: f32,
}

#[derive(Debug, Clone, Default)]
pub struct ClassifyResult {
  /// 按得分从高到低排列
  pub items: Box<[ClassifyItem]>,
}

impl ClassifyResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }
}
