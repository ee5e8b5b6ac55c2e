// 该文件是 Model API （模型接口） 项目的一部分。
// src/model/maskrcnn.rs - Mask R-CNN 实例分割
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

use image::{GrayImage, Luma, RgbImage};
use ndarray::{Array2, ArrayView2, ArrayViewD, Axis, Ix2, s};
use tracing::{debug, warn};

use crate::{
  config::ModelConfig,
  engine::{InferenceResult, InputShape},
  frame::InputTensor,
  model::{Adapter, Labels, ModelError, SegmentItem, SegmentResult},
  preprocess::{ImageMeta, PreprocessConfig, ResizeMode, preprocess},
  utils::resize_bilinear,
};

const MASKRCNN_INPUT_W: u32 = 1344;
const MASKRCNN_INPUT_H: u32 = 800;
const MASKRCNN_CONFIDENCE: f32 = 0.5;
const MASKRCNN_BOX_SIZE: usize = 5; // x_min, y_min, x_max, y_max, score
const MASK_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone)]
pub struct MaskRcnn {
  preprocess: PreprocessConfig,
  confidence_threshold: f32,
  labels: Labels,
}

impl Default for MaskRcnn {
  fn default() -> Self {
    Self {
      preprocess: PreprocessConfig {
        input_size: (MASKRCNN_INPUT_W, MASKRCNN_INPUT_H),
        resize_mode: ResizeMode::FitToWindow,
        ..Default::default()
      },
      confidence_threshold: MASKRCNN_CONFIDENCE,
      labels: Labels::coco(),
    }
  }
}

impl MaskRcnn {
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

  pub fn confidence_threshold(&self) -> f32 {
    self.confidence_threshold
  }
}

/// 找出 boxes / labels / masks 三个输出
fn split_outputs(
  output: &InferenceResult,
) -> Result<(Array2<f32>, Vec<f32>, ArrayViewD<'_, f32>), ModelError> {
  let (boxes_idx, boxes) = output
    .iter()
    .enumerate()
    .find_map(|(i, t)| {
      let shape = t.shape();
      match shape {
        [_, b] if *b == MASKRCNN_BOX_SIZE => t.view().into_dimensionality::<Ix2>().ok(),
        [1, _, b] if *b == MASKRCNN_BOX_SIZE => {
          t.index_axis(Axis(0), 0).into_dimensionality::<Ix2>().ok()
        }
        _ => None,
      }
      .map(|view| (i, view.to_owned()))
    })
    .ok_or_else(|| ModelError::unexpected("缺少形状为 [N, 5] 的 boxes 输出"))?;
  let n = boxes.nrows();

  let labels = output
    .iter()
    .enumerate()
    .filter(|(i, _)| *i != boxes_idx)
    .find_map(|(_, t)| match t.shape() {
      [len] if *len == n => Some(t.iter().copied().collect::<Vec<f32>>()),
      [1, len] if *len == n => Some(t.iter().copied().collect::<Vec<f32>>()),
      _ => None,
    })
    .ok_or_else(|| ModelError::unexpected(format!("缺少长度为 {} 的 labels 输出", n)))?;

  let masks = output
    .iter()
    .enumerate()
    .filter(|(i, _)| *i != boxes_idx)
    .find_map(|(_, t)| match t.shape() {
      [len, _, _] | [len, _, _, _] if *len == n => Some(t.view()),
      _ => None,
    })
    .ok_or_else(|| ModelError::unexpected(format!("缺少 {} 个实例的 masks 输出", n)))?;

  Ok((boxes, labels, masks))
}

/// 把 M×M 掩码贴到 bbox 上：先补一圈 0，按补边比例扩大 bbox，
/// 缩放后在 0.5 处二值化，最后只保留 bbox 内的部分
pub(crate) fn paste_mask(raw: ArrayView2<f32>, bbox: [f32; 4]) -> GrayImage {
  let (mh, mw) = raw.dim();
  let mut padded = Array2::<f32>::zeros((mh + 2, mw + 2));
  padded.slice_mut(s![1..mh + 1, 1..mw + 1]).assign(&raw);

  let [x0, y0, x1, y1] = bbox;
  let (box_w, box_h) = (x1 - x0, y1 - y0);
  let half_w = box_w * 0.5 * (mw + 2) as f32 / mw.max(1) as f32;
  let half_h = box_h * 0.5 * (mh + 2) as f32 / mh.max(1) as f32;
  let ext_x = (x0 + box_w * 0.5 - half_w) as i64;
  let ext_y = (y0 + box_h * 0.5 - half_h) as i64;
  let ext_w = ((half_w * 2.0) as i64 + 1).max(1) as usize;
  let ext_h = ((half_h * 2.0) as i64 + 1).max(1) as usize;

  let resized = resize_bilinear(padded.view(), ext_h, ext_w);

  let (out_w, out_h) = (box_w.max(0.0) as u32, box_h.max(0.0) as u32);
  let (ox, oy) = (x0 as i64, y0 as i64);
  GrayImage::from_fn(out_w, out_h, |x, y| {
    let rx = ox + x as i64 - ext_x;
    let ry = oy + y as i64 - ext_y;
    let inside = rx >= 0 && ry >= 0 && (rx as usize) < ext_w && (ry as usize) < ext_h;
    if inside && resized[[ry as usize, rx as usize]] > MASK_THRESHOLD {
      Luma([255])
    } else {
      Luma([0])
    }
  })
}

impl Adapter for MaskRcnn {
  type Output = SegmentResult;

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
    let (boxes, labels, masks) = split_outputs(output)?;
    debug!("Mask R-CNN 候选实例数: {}", boxes.nrows());

    let mut items = Vec::new();
    for (i, row) in boxes.outer_iter().enumerate() {
      let score = row[4];
      if score < self.confidence_threshold {
        continue;
      }

      let (x0, y0) = meta.to_original(row[0], row[1]);
      let (x1, y1) = meta.to_original(row[2], row[3]);
      let bbox = [x0.round(), y0.round(), x1.round(), y1.round()];
      // 截断后宽或高为 0 (或坐标颠倒) 的框直接丢弃
      if bbox[2] <= bbox[0] || bbox[3] <= bbox[1] {
        debug!("丢弃退化的框: {:?}", bbox);
        continue;
      }

      let class_id = labels[i].max(0.0) as u32;
      let raw_mask = match masks.ndim() {
        3 => masks.index_axis(Axis(0), i),
        _ => {
          let per_class = masks.index_axis(Axis(0), i);
          let channels = per_class.shape()[0];
          let channel = if channels == 1 { 0 } else { (class_id as usize).min(channels - 1) };
          per_class.index_axis_move(Axis(0), channel)
        }
      };
      let raw_mask = match raw_mask.into_dimensionality::<Ix2>() {
        Ok(mask) => mask,
        Err(e) => {
          warn!("第 {} 个实例的掩码形状无效: {}", i, e);
          continue;
        }
      };

      items.push(SegmentItem {
        label: self.labels.label(class_id),
        score,
        bbox,
        mask: paste_mask(raw_mask, bbox),
      });
    }

    debug!("检测到 {} 个实例", items.len());
    Ok(SegmentResult {
      items: items.into_boxed_slice(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use ndarray::{Array, IxDyn, array};

  fn synthetic_output() -> InferenceResult {
    let boxes = array![[10.0f32, 10.0, 30.0, 30.0, 0.9], [0.0, 0.0, 5.0, 5.0, 0.1]].into_dyn();
    let labels = array![0.0f32, 2.0].into_dyn();
    let masks = Array::from_elem(IxDyn(&[2, 4, 4]), 1.0f32);
    InferenceResult::new(vec![masks, boxes, labels])
  }

  #[test]
  fn keeps_confident_instances_with_box_sized_masks() {
    let model = MaskRcnn::default();
    let meta = ImageMeta::new((100, 100), (100, 100), ResizeMode::Standard);
    let result = model.postprocess(&synthetic_output(), &meta).unwrap();

    assert_eq!(result.items.len(), 1);
    let item = &result.items[0];
    assert_eq!(item.label.name, "person");
    assert_eq!(item.bbox, [10.0, 10.0, 30.0, 30.0]);
    assert_eq!(item.mask.dimensions(), (20, 20));
    assert_eq!(item.mask.get_pixel(10, 10)[0], 255);
  }

  #[test]
  fn boxes_are_mapped_back_to_original_image() {
    let model = MaskRcnn::default().with_confidence(0.05);
    let meta = ImageMeta::new((200, 200), (100, 100), ResizeMode::FitToWindow);
    let result = model.postprocess(&synthetic_output(), &meta).unwrap();

    assert_eq!(result.items.len(), 2);
    assert_eq!(result.items[0].bbox, [20.0, 20.0, 60.0, 60.0]);
    assert_eq!(result.items[1].label.name, "car");
  }

  #[test]
  fn mask_is_cut_at_half() {
    // 左半边为 1，右半边为 0
    let raw = array![[1.0f32, 1.0, 0.0, 0.0], [1.0, 1.0, 0.0, 0.0]];
    let mask = paste_mask(raw.view(), [0.0, 0.0, 40.0, 20.0]);
    assert_eq!(mask.dimensions(), (40, 20));
    assert_eq!(mask.get_pixel(5, 10)[0], 255);
    assert_eq!(mask.get_pixel(35, 10)[0], 0);
  }

  #[test]
  fn degenerate_boxes_are_dropped() {
    let boxes = array![
      [30.0f32, 30.0, 10.0, 10.0, 0.9],
      [10.0, 10.0, 11.0, 11.0, 0.9],
      [50.0, 20.0, 50.0, 40.0, 0.9],
    ]
    .into_dyn();
    let labels = array![0.0f32, 0.0, 0.0].into_dyn();
    let masks = Array::from_elem(IxDyn(&[3, 4, 4]), 1.0f32);
    let output = InferenceResult::new(vec![boxes, labels, masks]);
    let meta = ImageMeta::new((100, 100), (100, 100), ResizeMode::Standard);
    let result = MaskRcnn::default().postprocess(&output, &meta).unwrap();

    // 颠倒的框和零宽的框被丢弃，1×1 的框保留
    assert_eq!(result.items.len(), 1);
    assert_eq!(result.items[0].bbox, [10.0, 10.0, 11.0, 11.0]);
    assert_eq!(result.items[0].mask.dimensions(), (1, 1));
  }

  #[test]
  fn missing_outputs_are_reported() {
    let model = MaskRcnn::default();
    let meta = ImageMeta::new((10, 10), (10, 10), ResizeMode::Standard);
    let output = InferenceResult::new(vec![Array::zeros(IxDyn(&[3, 5]))]);
    assert!(matches!(
      model.postprocess(&output, &meta),
      Err(ModelError::UnexpectedOutput(_))
    ));
  }
}
