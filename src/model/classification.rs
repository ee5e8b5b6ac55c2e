// 该文件是 Model API （模型接口） 项目的一部分。
// src/model/classification.rs - 图像分类
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
use tracing::debug;

use crate::{
  config::{ConfigError, ModelConfig},
  engine::{InferenceResult, InputShape},
  frame::InputTensor,
  model::{Adapter, ClassifyItem, ClassifyResult, Labels, ModelError},
  preprocess::{ImageMeta, PreprocessConfig, preprocess},
  utils::softmax,
};

const CLASSIFICATION_INPUT_SIZE: u32 = 224;

#[derive(Debug, Clone)]
pub struct Classification {
  preprocess: PreprocessConfig,
  topk: usize,
  apply_softmax: bool,
  labels: Labels,
}

impl Default for Classification {
  fn default() -> Self {
    Self {
      preprocess: PreprocessConfig {
        input_size: (CLASSIFICATION_INPUT_SIZE, CLASSIFICATION_INPUT_SIZE),
        ..Default::default()
      },
      topk: 1,
      apply_softmax: false,
      labels: Labels::default(),
    }
  }
}

impl Classification {
  pub fn from_config(config: &ModelConfig) -> Result<Self, ModelError> {
    let base = Self::default();
    let topk = config.topk.unwrap_or(base.topk);
    if topk == 0 {
      return Err(ConfigError::Invalid("topk", topk.to_string()).into());
    }
    Ok(Self {
      preprocess: config.apply_preprocess(base.preprocess)?,
      topk,
      apply_softmax: config.apply_softmax.unwrap_or(base.apply_softmax),
      labels: config.labels_or(base.labels)?,
    })
  }

  pub fn with_topk(mut self, topk: usize) -> Self {
    self.topk = topk.max(1);
    self
  }

  pub fn with_softmax(mut self, apply: bool) -> Self {
    self.apply_softmax = apply;
    self
  }
}

impl Adapter for Classification {
  type Output = ClassifyResult;

  fn bind_input(&mut self, shape: &InputShape) -> Result<(), ModelError> {
    Ok(self.preprocess.bind_input(shape)?)
  }

  fn preprocess(&self, image: &RgbImage) -> Result<(InputTensor, ImageMeta), ModelError> {
    Ok(preprocess(image, &self.preprocess)?)
  }

  fn postprocess(
    &self,
    output: &InferenceResult,
    _meta: &ImageMeta,
  ) -> Result<Self::Output, ModelError> {
    // 只接受一维概率向量，其余维度必须为 1
    let logits = output
      .find(|s| !s.is_empty() && s[..s.len() - 1].iter().all(|&d| d == 1))
      .ok_or_else(|| ModelError::unexpected("缺少形状为 [1, C] 的分类输出"))?;
    let logits: Vec<f32> = logits.iter().copied().collect();
    let scores = if self.apply_softmax {
      softmax(&logits)
    } else {
      logits
    };

    let mut ranked: Vec<(usize, f32)> = scores.into_iter().enumerate().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.truncate(self.topk);

    let items: Vec<ClassifyItem> = ranked
      .into_iter()
      .map(|(id, score)| ClassifyItem {
        label: self.labels.label(id as u32),
        score,
      })
      .collect();
    debug!(
      "分类结果: {:?}",
      items.iter().map(|i| &i.label.name).collect::<Vec<_>>()
    );
    Ok(ClassifyResult {
      items: items.into_boxed_slice(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::preprocess::{PreprocessError, ResizeMode};
  use ndarray::array;

  fn meta() -> ImageMeta {
    ImageMeta::new((224, 224), (224, 224), ResizeMode::Standard)
  }

  #[test]
  fn topk_is_sorted_by_score() {
    let model = Classification::default().with_topk(3);
    let output = InferenceResult::new(vec![array![[0.1f32, 0.5, 0.05, 0.3, 0.05]].into_dyn()]);
    let result = model.postprocess(&output, &meta()).unwrap();

    let ids: Vec<u32> = result.items.iter().map(|i| i.label.id).collect();
    assert_eq!(ids, vec![1, 3, 0]);
    assert_eq!(result.items[0].label.name, "#1");
  }

  #[test]
  fn softmax_scores_sum_to_one() {
    let model = Classification::default()
      .with_topk(10)
      .with_softmax(true);
    let output = InferenceResult::new(vec![array![2.0f32, 1.0, 0.0].into_dyn()]);
    let result = model.postprocess(&output, &meta()).unwrap();

    assert_eq!(result.items.len(), 3);
    let sum: f32 = result.items.iter().map(|i| i.score).sum();
    assert!((sum - 1.0).abs() < 1e-5);
    assert_eq!(result.items[0].label.id, 0);
  }

  #[test]
  fn labels_come_from_config() {
    let config = ModelConfig::from_json(r#"{ "labels": ["cat", "dog"], "topk": 2 }"#).unwrap();
    let model = Classification::from_config(&config).unwrap();
    let output = InferenceResult::new(vec![array![[0.2f32, 0.8]].into_dyn()]);
    let result = model.postprocess(&output, &meta()).unwrap();
    assert_eq!(result.items[0].label.name, "dog");
    assert_eq!(result.items[1].label.name, "cat");
  }

  #[test]
  fn configured_size_conflicting_with_model_is_rejected() {
    let shape = InputShape(vec![Some(1), Some(3), Some(299), Some(299)]);
    let config = ModelConfig::from_json(r#"{ "input_size": [224, 224] }"#).unwrap();
    let mut model = Classification::from_config(&config).unwrap();
    assert!(matches!(
      model.bind_input(&shape),
      Err(ModelError::Preprocess(PreprocessError::InputSizeMismatch {
        configured: (224, 224),
        model: (299, 299),
      }))
    ));

    let mut model = Classification::default();
    model.bind_input(&shape).unwrap();
    assert_eq!(model.preprocess.input_size, (299, 299));
  }

  #[test]
  fn zero_topk_is_rejected() {
    let config = ModelConfig::from_json(r#"{ "topk": 0 }"#).unwrap();
    assert!(matches!(
      Classification::from_config(&config),
      Err(ModelError::Config(ConfigError::Invalid("topk", _)))
    ));
  }
}
