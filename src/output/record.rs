// 该文件是 Model API （模型接口） 项目的一部分。
// src/output/record.rs - 推理结果的文本记录
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

use crate::model::{ClassifyResult, DetectResult, Label, PoseResult, SegmentResult};

/// 把推理结果写成逐行的文本
pub trait Describe {
  /// 没有任何结果
  fn is_empty(&self) -> bool;
  /// 每个结果一行，逗号分隔
  fn describe(&self, label_with_name: bool) -> Vec<String>;
}

fn label_text(label: &Label, label_with_name: bool) -> String {
  if label_with_name {
    label.name.clone()
  } else {
    label.id.to_string()
  }
}

fn bbox_text(bbox: &[f32; 4]) -> String {
  format!(
    "{:.1}, {:.1}, {:.1}, {:.1}",
    bbox[0], bbox[1], bbox[2], bbox[3]
  )
}

impl Describe for DetectResult {
  fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  fn describe(&self, label_with_name: bool) -> Vec<String> {
    self
      .items
      .iter()
      .map(|item| {
        format!(
          "{}, {:.4}, {}",
          label_text(&item.label, label_with_name),
          item.score,
          bbox_text(&item.bbox)
        )
      })
      .collect()
  }
}

impl Describe for SegmentResult {
  fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  /// 末尾附上掩码面积（像素数）
  fn describe(&self, label_with_name: bool) -> Vec<String> {
    self
      .items
      .iter()
      .map(|item| {
        let area = item.mask.pixels().filter(|p| p[0] > 0).count();
        format!(
          "{}, {:.4}, {}, {}",
          label_text(&item.label, label_with_name),
          item.score,
          bbox_text(&item.bbox),
          area
        )
      })
      .collect()
  }
}

impl Describe for PoseResult {
  fn is_empty(&self) -> bool {
    self.poses.is_empty()
  }

  /// 得分后跟 18 个关键点的坐标，缺失的关键点记为 -1, -1
  fn describe(&self, _label_with_name: bool) -> Vec<String> {
    self
      .poses
      .iter()
      .map(|pose| {
        let mut fields = vec![format!("{:.4}", pose.score)];
        fields.extend(pose.keypoints.iter().map(|k| match k {
          Some((x, y)) => format!("{:.1}, {:.1}", x, y),
          None => "-1, -1".to_string(),
        }));
        fields.join(", ")
      })
      .collect()
  }
}

impl Describe for ClassifyResult {
  fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  fn describe(&self, label_with_name: bool) -> Vec<String> {
    self
      .items
      .iter()
      .map(|item| {
        format!(
          "{}, {:.4}",
          label_text(&item.label, label_with_name),
          item.score
        )
      })
      .collect()
  }
}

pub struct Record {
  pub label_with_name: bool,
}

impl Record {
  /// 写到与图像同名的 `.txt` 文件
  pub fn record<R: Describe>(&self, result: &R, path: &Path) -> Result<(), std::io::Error> {
    let records = result.describe(self.label_with_name);
    std::fs::write(path.with_extension("txt"), records.join("\n"))?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{ClassifyItem, DetectItem, HumanPose, KEYPOINTS_NUMBER};

  fn person() -> Label {
    Label {
      id: 0,
      name: "person".into(),
    }
  }

  #[test]
  fn detection_lines() {
    let result = DetectResult {
      items: vec![DetectItem {
        label: person(),
        score: 0.875,
        bbox: [1.0, 2.0, 30.5, 40.0],
      }]
      .into_boxed_slice(),
    };
    assert_eq!(
      result.describe(true),
      vec!["person, 0.8750, 1.0, 2.0, 30.5, 40.0"]
    );
    assert_eq!(result.describe(false)[0], "0, 0.8750, 1.0, 2.0, 30.5, 40.0");
  }

  #[test]
  fn pose_lines_mark_missing_keypoints() {
    let mut keypoints = [None; KEYPOINTS_NUMBER];
    keypoints[0] = Some((10.0, 20.0));
    let result = PoseResult {
      poses: vec![HumanPose {
        keypoints,
        score: 2.5,
      }]
      .into_boxed_slice(),
    };
    let line = &result.describe(true)[0];
    assert!(line.starts_with("2.5000, 10.0, 20.0, -1, -1"));
    assert_eq!(line.split(", ").count(), 1 + 2 * KEYPOINTS_NUMBER);
  }

  #[test]
  fn record_writes_text_next_to_image() {
    let dir = tempfile::tempdir().unwrap();
    let result = ClassifyResult {
      items: vec![ClassifyItem {
        label: person(),
        score: 0.5,
      }]
      .into_boxed_slice(),
    };
    Record {
      label_with_name: true,
    }
    .record(&result, &dir.path().join("frame.png"))
    .unwrap();
    let text = std::fs::read_to_string(dir.path().join("frame.txt")).unwrap();
    assert_eq!(text, "person, 0.5000");
  }
}
