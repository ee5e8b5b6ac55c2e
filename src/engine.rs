// 该文件是 Model API （模型接口） 项目的一部分。
// src/engine.rs - OpenVINO 推理引擎封装
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

use std::{
  fmt,
  path::{Path, PathBuf},
};

use ndarray::{ArrayD, ErrorKind, IxDyn, ShapeError};
use openvino::{
  CompiledModel, Core, ElementType, InferRequest, InferenceError, Model, Shape, Tensor,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::frame::{InputTensor, Layout};

/// 按序号探测输出张量时的上限
const MAX_OUTPUTS: usize = 32;

#[derive(Error, Debug)]
pub enum EngineError {
  #[error("模型文件不存在: {0}")]
  ModelNotFound(PathBuf),
  #[error("OpenVINO 错误 ({context}): {message}")]
  OpenVino {
    context: &'static str,
    message: String,
  },
  #[error("不支持的输出元素类型: {0}")]
  UnsupportedElementType(String),
  #[error("张量形状错误: {0}")]
  Shape(#[from] ndarray::ShapeError),
  #[error("模型没有输出")]
  NoOutputs,
}

impl EngineError {
  fn openvino(context: &'static str, err: impl std::fmt::Display) -> Self {
    EngineError::OpenVino {
      context,
      message: err.to_string(),
    }
  }
}

/// 一次推理的全部输出，按模型输出的序号排列
#[derive(Debug, Clone, Default)]
pub struct InferenceResult {
  outputs: Vec<ArrayD<f32>>,
}

impl InferenceResult {
  pub fn new(outputs: Vec<ArrayD<f32>>) -> Self {
    Self { outputs }
  }

  pub fn len(&self) -> usize {
    self.outputs.len()
  }

  pub fn is_empty(&self) -> bool {
    self.outputs.is_empty()
  }

  pub fn get(&self, index: usize) -> Option<&ArrayD<f32>> {
    self.outputs.get(index)
  }

  pub fn iter(&self) -> impl Iterator<Item = &ArrayD<f32>> {
    self.outputs.iter()
  }

  /// 查找第一个形状满足条件的输出
  pub fn find<F>(&self, predicate: F) -> Option<&ArrayD<f32>>
  where
    F: Fn(&[usize]) -> bool,
  {
    self.outputs.iter().find(|tensor| predicate(tensor.shape()))
  }
}

/// 模型第一个输入的形状，动态维度为 `None`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputShape(pub Vec<Option<usize>>);

impl InputShape {
  /// 按布局取出 (宽, 高)，宽或高是动态维度时返回 `None`
  pub fn spatial_size(&self, layout: Layout) -> Option<(u32, u32)> {
    let (h, w) = match (layout, self.0.as_slice()) {
      (Layout::Nchw, [_, _, h, w]) => (*h, *w),
      (Layout::Nhwc, [_, h, w, _]) => (*h, *w),
      _ => return None,
    };
    Some((w? as u32, h? as u32))
  }
}

impl fmt::Display for InputShape {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let dims: Vec<String> = self
      .0
      .iter()
      .map(|d| d.map_or_else(|| "?".to_string(), |d| d.to_string()))
      .collect();
    write!(f, "[{}]", dims.join(", "))
  }
}

fn read_input_shape(model: &Model) -> Result<InputShape, EngineError> {
  let input = model
    .get_input_by_index(0)
    .map_err(|e| EngineError::openvino("读取模型输入", e))?;
  let shape = input
    .get_partial_shape()
    .map_err(|e| EngineError::openvino("读取模型输入形状", e))?;
  if shape.get_rank().is_dynamic() {
    return Ok(InputShape::default());
  }
  let dims = shape
    .get_dimensions()
    .iter()
    .map(|d| (!d.is_dynamic()).then(|| d.get_min().max(0) as usize))
    .collect();
  Ok(InputShape(dims))
}

/// 模型会话：加载、编译模型并持有一个同步推理请求
pub struct Engine {
  input_shape: InputShape,
  request: InferRequest,
  _compiled: CompiledModel,
  _core: Core,
}

impl Engine {
  /// 加载 IR (`.xml` + `.bin`) 或 ONNX 模型并在指定设备上编译
  pub fn load(model_path: impl AsRef<Path>, device: &str) -> Result<Self, EngineError> {
    let model_path = model_path.as_ref();
    if !model_path.exists() {
      return Err(EngineError::ModelNotFound(model_path.to_path_buf()));
    }

    let weights = model_path.with_extension("bin");
    let weights = if weights.exists() {
      weights.to_string_lossy().into_owned()
    } else {
      String::new()
    };

    info!("加载模型文件: {}", model_path.display());
    let mut core = Core::new().map_err(|e| EngineError::openvino("创建 Core", e))?;
    let model = core
      .read_model_from_file(&model_path.to_string_lossy(), &weights)
      .map_err(|e| EngineError::openvino("读取模型", e))?;
    let input_shape = read_input_shape(&model)?;
    info!("模型输入形状: {}", input_shape);

    info!("在设备 {} 上编译模型", device);
    let mut compiled = core
      .compile_model(&model, device.into())
      .map_err(|e| EngineError::openvino("编译模型", e))?;
    let request = compiled
      .create_infer_request()
      .map_err(|e| EngineError::openvino("创建推理请求", e))?;
    info!("模型加载完成");

    Ok(Self {
      input_shape,
      request,
      _compiled: compiled,
      _core: core,
    })
  }

  pub fn input_shape(&self) -> &InputShape {
    &self.input_shape
  }

  /// 同步推理，返回全部输出张量
  pub fn infer(&mut self, input: &InputTensor) -> Result<InferenceResult, EngineError> {
    let dims: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
    let shape = Shape::new(&dims).map_err(|e| EngineError::openvino("创建输入形状", e))?;
    let mut tensor =
      Tensor::new(ElementType::F32, &shape).map_err(|e| EngineError::openvino("创建输入张量", e))?;

    let data = input.data().as_standard_layout();
    let src = data
      .as_slice()
      .ok_or_else(|| ShapeError::from_kind(ErrorKind::IncompatibleLayout))?;
    tensor
      .get_data_mut::<f32>()
      .map_err(|e| EngineError::openvino("写入输入张量", e))?
      .copy_from_slice(src);

    debug!("设置模型输入: {:?} {}", input.shape(), input.layout());
    self
      .request
      .set_input_tensor(&tensor)
      .map_err(|e| EngineError::openvino("设置输入", e))?;

    debug!("执行模型推理");
    self
      .request
      .infer()
      .map_err(|e| EngineError::openvino("推理", e))?;

    let mut outputs = Vec::new();
    for index in 0..MAX_OUTPUTS {
      let Ok(output) = self.request.get_output_tensor_by_index(index) else {
        break;
      };
      let array = read_tensor(&output)?;
      debug!("输出 {}: 形状 {:?}", index, array.shape());
      outputs.push(array);
    }

    if outputs.is_empty() {
      return Err(EngineError::NoOutputs);
    }
    Ok(InferenceResult::new(outputs))
  }
}

/// 读取输出张量并统一转换为 f32
fn read_tensor(tensor: &Tensor) -> Result<ArrayD<f32>, EngineError> {
  let shape = tensor
    .get_shape()
    .map_err(|e| EngineError::openvino("读取输出形状", e))?;
  let dims: Vec<usize> = shape
    .get_dimensions()
    .iter()
    .map(|&d| d.max(0) as usize)
    .collect();
  let element_type = tensor
    .get_element_type()
    .map_err(|e| EngineError::openvino("读取输出类型", e))?;
  let read_err = |e: InferenceError| EngineError::openvino("读取输出数据", e);

  let data: Vec<f32> = match element_type {
    ElementType::F32 => tensor.get_data::<f32>().map_err(read_err)?.to_vec(),
    ElementType::I32 => widen(tensor.get_data::<i32>().map_err(read_err)?, |v| v as f32),
    ElementType::I64 => widen(tensor.get_data::<i64>().map_err(read_err)?, |v| v as f32),
    ElementType::U8 => widen(tensor.get_data::<u8>().map_err(read_err)?, f32::from),
    other => return Err(EngineError::UnsupportedElementType(format!("{:?}", other))),
  };
  Ok(ArrayD::from_shape_vec(IxDyn(&dims), data)?)
}

fn widen<T: Copy>(data: &[T], convert: impl Fn(T) -> f32) -> Vec<f32> {
  data.iter().map(|&v| convert(v)).collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use ndarray::Array;

  #[test]
  fn widens_integer_outputs_to_f32() {
    assert_eq!(widen(&[3i64, -1], |v| v as f32), vec![3.0, -1.0]);
    assert_eq!(widen(&[7u8], f32::from), vec![7.0]);
  }

  #[test]
  fn input_shape_follows_layout() {
    let nchw = InputShape(vec![Some(1), Some(3), Some(800), Some(1344)]);
    assert_eq!(nchw.spatial_size(Layout::Nchw), Some((1344, 800)));
    assert_eq!(nchw.to_string(), "[1, 3, 800, 1344]");

    let nhwc = InputShape(vec![Some(1), Some(224), Some(320), Some(3)]);
    assert_eq!(nhwc.spatial_size(Layout::Nhwc), Some((320, 224)));

    // 高或宽为动态时交给配置决定
    let dynamic = InputShape(vec![None, Some(3), None, None]);
    assert_eq!(dynamic.spatial_size(Layout::Nchw), None);
    assert_eq!(dynamic.to_string(), "[?, 3, ?, ?]");
    assert_eq!(InputShape::default().spatial_size(Layout::Nchw), None);
  }

  #[test]
  fn finds_outputs_by_shape() {
    let result = InferenceResult::new(vec![
      Array::zeros(IxDyn(&[10])),
      Array::zeros(IxDyn(&[10, 5])),
    ]);
    assert_eq!(result.len(), 2);
    let boxes = result.find(|s| s.len() == 2 && s[1] == 5).unwrap();
    assert_eq!(boxes.shape(), &[10, 5]);
    assert!(result.find(|s| s.len() == 4).is_none());
  }

  #[test]
  fn missing_model_is_reported() {
    let err = Engine::load("/nonexistent/model.xml", "CPU").err().unwrap();
    assert!(matches!(err, EngineError::ModelNotFound(_)));
  }
}
