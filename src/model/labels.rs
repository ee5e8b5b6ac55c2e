// 该文件是 Model API （模型接口） 项目的一部分。
// src/model/labels.rs - 类别标签
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

use std::path::Path;

use thiserror::Error;

const COCO_LABELS: [&str; 80] = [
  "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
  "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
  "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
  "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
  "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
  "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
  "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch", "potted plant",
  "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote", "keyboard", "cell phone",
  "microwave", "oven", "toaster", "sink", "refrigerator", "book", "clock", "vase", "scissors",
  "teddy bear", "hair drier", "toothbrush",
];

/// COCO 原始类别编号，和 `COCO_LABELS` 一一对应，中间有空缺
const COCO_91_IDS: [u32; 80] = [
  1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 27, 28, 31,
  32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 46, 47, 48, 49, 50, 51, 52, 53, 54, 55, 56,
  57, 58, 59, 60, 61, 62, 63, 64, 65, 67, 70, 72, 73, 74, 75, 76, 77, 78, 79, 80, 81, 82, 84, 85,
  86, 87, 88, 89, 90,
];

#[derive(Error, Debug)]
pub enum LabelsError {
  #[error("无法读取标签文件 {0}: {1}")]
  IoError(String, std::io::Error),
  #[error("标签文件为空: {0}")]
  Empty(String),
}

/// 标签序号到名字的映射
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Labels {
  names: Vec<String>,
}

/// 一个带名字的类别
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
  pub id: u32,
  pub name: String,
}

impl Labels {
  pub fn new(names: Vec<String>) -> Self {
    Self { names }
  }

  /// COCO 80 类
  pub fn coco() -> Self {
    Self::new(COCO_LABELS.iter().map(|s| s.to_string()).collect())
  }

  /// 按 COCO 原始编号排列的 91 类标签，0 号为背景，空缺编号显示为 `#id`
  pub fn coco_91() -> Self {
    let mut names: Vec<String> = (0..=90).map(|id| format!("#{}", id)).collect();
    names[0] = "background".to_string();
    for (id, name) in COCO_91_IDS.iter().zip(COCO_LABELS) {
      names[*id as usize] = name.to_string();
    }
    Self::new(names)
  }

  /// 每行一个标签，空行跳过
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LabelsError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
      .map_err(|e| LabelsError::IoError(path.display().to_string(), e))?;
    let names: Vec<String> = content
      .lines()
      .map(str::trim)
      .filter(|line| !line.is_empty())
      .map(String::from)
      .collect();
    if names.is_empty() {
      return Err(LabelsError::Empty(path.display().to_string()));
    }
    Ok(Self::new(names))
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  /// 超出范围的序号显示为 `#id`
  pub fn name(&self, id: u32) -> String {
    self
      .names
      .get(id as usize)
      .cloned()
      .unwrap_or_else(|| format!("#{}", id))
  }

  pub fn label(&self, id: u32) -> Label {
    Label {
      id,
      name: self.name(id),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn coco_names() {
    let labels = Labels::coco();
    assert_eq!(labels.len(), 80);
    assert_eq!(labels.name(0), "person");
    assert_eq!(labels.name(79), "toothbrush");
    assert_eq!(labels.name(80), "#80");

    let coco_91 = Labels::coco_91();
    assert_eq!(coco_91.len(), 91);
    assert_eq!(coco_91.name(0), "background");
    assert_eq!(coco_91.name(1), "person");
    assert_eq!(coco_91.name(12), "#12");
    assert_eq!(coco_91.name(90), "toothbrush");
  }

  #[test]
  fn reads_label_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "cat\n\n dog \n").unwrap();
    let labels = Labels::from_file(file.path()).unwrap();
    assert_eq!(labels.len(), 2);
    assert_eq!(labels.label(1), Label { id: 1, name: "dog".into() });
  }

  #[test]
  fn empty_label_file_is_an_error() {
    let file = tempfile::NamedTempFile::new().unwrap();
    assert!(matches!(Labels::from_file(file.path()), Err(LabelsError::Empty(_))));
  }
}
