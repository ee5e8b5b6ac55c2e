// 该文件是 Model API （模型接口） 项目的一部分。
// src/model/ssd.rs - SSD 目标检测
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

use image::RgbImage;
use ndarray::{ArrayView2, Axis, Ix2};
use tracing::debug;

use crate::{
  config::ModelConfig,
  engine::{InferenceResult, InputShape},
  frame::InputTensor,
  model::{Adapter, DetectItem, DetectResult, Labels, ModelError},
  preprocess::{ImageMeta, PreprocessConfig, ResizeMode, preprocess},
};

const SSD_INPUT_SIZE: u32 = 300;
const SSD_CONFIDENCE: f32 = 0.5;
const SSD_OBJECT_SIZE: usize = 7; // image_id, label, conf, x_min, y_min, x_max, y_max
const SSD_BOX_SIZE: usize = 5; // x_min, y_min, x_max, y_max, score

#[derive(Debug, Clone)]
pub struct Ssd {
  preprocess: PreprocessConfig,
  confidence_threshold: f32,
  labels: Labels,
}

impl Default for Ssd {
  fn default() -> Self {
    Self {
      preprocess: PreprocessConfig {
        input_size: (SSD_INPUT_SIZE, SSD_INPUT_SIZE),
        resize_mode: ResizeMode::Standard,
        ..Default::default()
      },
      confidence_threshold: SSD_CONFIDENCE,
      labels: Labels::coco_91(),
    }
  }
}

impl Ssd {
  pub fn from_config(config: &ModelConfig) -> Result<Self, ModelError> {
    let base = Self::default();
    Ok(Self {
      preprocess: config.apply_preprocess(base.preprocess)?,
      confidence_threshold: config
        .confidence_threshold
        .unwrap_or(base.confidence_threshold),
      labels: config.labels_or(base.labels)?,
    })
  }

  pub fn with_confidence(mut self, threshold: f32) -> Self {
    self.confidence_threshold = threshold;
    self
  }

  fn make_item(&self, class_id: u32, score: f32, corners: [f32; 4], meta: &ImageMeta) -> DetectItem {
    let (x0, y0) = meta.to_original(corners[0], corners[1]);
    let (x1, y1) = meta.to_original(corners[2], corners[3]);
    DetectItem {
      label: self.labels.label(class_id),
      score,
      bbox: [x0, y0, x1, y1],
    }
  }

  /// `[1, 1, N, 7]` 的 DetectionOutput，坐标归一化到 [0, 1]
  fn parse_detection_out(&self, objects: ArrayView2<f32>, meta: &ImageMeta) -> Vec<DetectItem> {
    let (net_w, net_h) = (meta.input_size.0 as f32, meta.input_size.1 as f32);
    let mut items = Vec::new();
    for row in objects.outer_iter() {
      // 负的 image_id 表示后面没有有效结果
      if row[0] < 0.0 {
        break;
      }
      let score = row[2];
      if score < self.confidence_threshold {
        continue;
      }
      let corners = [row[3] * net_w, row[4] * net_h, row[5] * net_w, row[6] * net_h];
      items.push(self.make_item(row[1].max(0.0) as u32, score, corners, meta));
    }
    items
  }

  /// `[N, 5]` 的 boxes 加 `[N]` 的 labels，坐标为模型输入像素
  fn parse_boxes_labels(
    &self,
    boxes: ArrayView2<f32>,
    labels: &[f32],
    meta: &ImageMeta,
  ) -> Vec<DetectItem> {
    boxes
      .outer_iter()
      .zip(labels)
      .filter(|(row, _)| row[4] >= self.confidence_threshold)
      .map(|(row, label)| {
        self.make_item(label.max(0.0) as u32, row[4], [row[0], row[1], row[2], row[3]], meta)
      })
      .collect()
  }
}

impl Adapter for Ssd {
  type Output = DetectResult;

  fn bind_input(&mut self, shape: &InputShape) -> Result<(), ModelError> {
    Ok(self.preprocess.bind_input(shape)?)
  }

  fn preprocess(&self, image: &RgbImage) -> Result<(InputTensor, ImageMeta), ModelError> {
    Ok(preprocess(image, &self.preprocess)?)
  }

  fn postprocess(
    &self,
    output: &InferenceResult,
    meta: &ImageMeta,
  ) -> Result<Self::Output, ModelError> {
    let detection_out = output.find(|s| s.len() == 4 && s[3] == SSD_OBJECT_SIZE);
    let items = if let Some(tensor) = detection_out {
      let objects = tensor
        .index_axis(Axis(0), 0)
        .index_axis_move(Axis(0), 0)
        .into_dimensionality::<Ix2>()
        .map_err(|e| ModelError::unexpected(format!("DetectionOutput 形状无效: {}", e)))?;
      self.parse_detection_out(objects, meta)
    } else {
      let boxes = output
        .find(|s| s.len() == 2 && s[1] == SSD_BOX_SIZE)
        .ok_or_else(|| ModelError::unexpected("缺少 [1, 1, N, 7] 或 [N, 5] 形状的检测输出"))?;
      let n = boxes.shape()[0];
      let labels = output
        .find(|s| matches!(s, [len] | [1, len] if *len == n))
        .ok_or_else(|| ModelError::unexpected(format!("缺少长度为 {} 的 labels 输出", n)))?;
      let labels = labels.iter().copied().collect::<Vec<f32>>();
      let boxes = boxes
        .view()
        .into_dimensionality::<Ix2>()
        .map_err(|e| ModelError::unexpected(format!("boxes 形状无效: {}", e)))?;
      self.parse_boxes_labels(boxes, &labels, meta)
    };

    debug!("检测到 {} 个目标", items.len());
    Ok(DetectResult {
      items: items.into_boxed_slice(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use ndarray::{Array, IxDyn, array};

  fn detection_out(rows: &[[f32; 7]]) -> InferenceResult {
    let flat: Vec<f32> = rows.iter().flatten().copied().collect();
    let tensor = Array::from_shape_vec(IxDyn(&[1, 1, rows.len(), 7]), flat).unwrap();
    InferenceResult::new(vec![tensor])
  }

  #[test]
  fn stops_at_negative_image_id() {
    let output = detection_out(&[
      [0.0, 1.0, 0.9, 0.1, 0.1, 0.5, 0.5],
      [0.0, 3.0, 0.2, 0.1, 0.1, 0.5, 0.5],
      [-1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
      [0.0, 1.0, 0.9, 0.2, 0.2, 0.3, 0.3],
    ]);
    let meta = ImageMeta::new((600, 300), (300, 300), ResizeMode::Standard);
    let result = Ssd::default().postprocess(&output, &meta).unwrap();

    assert_eq!(result.items.len(), 1);
    let item = &result.items[0];
    assert_eq!(item.label.name, "person");
    assert!((item.bbox[0] - 60.0).abs() < 1e-3);
    assert!((item.bbox[1] - 30.0).abs() < 1e-3);
    assert!((item.bbox[2] - 300.0).abs() < 1e-3);
    assert!((item.bbox[3] - 150.0).abs() < 1e-3);
  }

  #[test]
  fn threshold_is_inclusive() {
    let output = detection_out(&[[0.0, 3.0, 0.5, 0.0, 0.0, 1.0, 1.0]]);
    let meta = ImageMeta::new((300, 300), (300, 300), ResizeMode::Standard);
    let result = Ssd::default().postprocess(&output, &meta).unwrap();
    assert_eq!(result.items.len(), 1);
    assert_eq!(result.items[0].label.name, "car");
  }

  #[test]
  fn boxes_and_labels_form() {
    let boxes = array![[10.0f32, 20.0, 110.0, 220.0, 0.8], [0.0, 0.0, 1.0, 1.0, 0.1]].into_dyn();
    let labels = array![[18.0f32, 1.0]].into_dyn();
    let output = InferenceResult::new(vec![labels, boxes]);
    let meta = ImageMeta::new((600, 600), (300, 300), ResizeMode::Standard);
    let result = Ssd::default().postprocess(&output, &meta).unwrap();

    assert_eq!(result.items.len(), 1);
    assert_eq!(result.items[0].label.name, "dog");
    assert_eq!(result.items[0].bbox, [20.0, 40.0, 220.0, 440.0]);
  }

  #[test]
  fn input_size_comes_from_static_model() {
    let mut model = Ssd::default();
    model
      .bind_input(&InputShape(vec![Some(1), Some(3), Some(512), Some(512)]))
      .unwrap();
    assert_eq!(model.preprocess.input_size, (512, 512));

    let image = image::RgbImage::new(100, 50);
    let (tensor, meta) = model.preprocess(&image).unwrap();
    assert_eq!(tensor.shape(), [1, 3, 512, 512]);
    assert_eq!(meta.input_size, (512, 512));
  }

  #[test]
  fn unknown_outputs_are_reported() {
    let output = InferenceResult::new(vec![Array::zeros(IxDyn(&[1, 1000]))]);
    let meta = ImageMeta::new((300, 300), (300, 300), ResizeMode::Standard);
    assert!(matches!(
      Ssd::default().postprocess(&output, &meta),
      Err(ModelError::UnexpectedOutput(_))
    ));
  }
}
