// 该文件是 Model API （模型接口） 项目的一部分。
// src/model/pose.rs - 关键点峰值提取与基于 PAF 的人体姿态分组
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

use ndarray::{Array2, ArrayView2};
use tracing::debug;

use crate::model::HumanPose;

pub const KEYPOINTS_NUMBER: usize = 18;

const MIN_JOINTS_NUMBER: usize = 3;
const MID_POINTS_SCORE_THRESHOLD: f32 = 0.05;
const FOUND_MID_POINTS_RATIO_THRESHOLD: f32 = 0.8;
const MIN_SUBSET_SCORE: f32 = 0.2;
const MID_POINTS: usize = 10;

/// 肢体两端的关键点（热力图序号，从 1 开始）
const LIMB_IDS_HEATMAP: [(usize, usize); 19] = [
  (2, 3), (2, 6), (3, 4), (4, 5), (6, 7), (7, 8), (2, 9), (9, 10), (10, 11), (2, 12),
  (12, 13), (13, 14), (2, 1), (1, 15), (15, 17), (1, 16), (16, 18), (3, 17), (6, 18),
];

/// 肢体对应的 PAF 通道 (x, y)，减去 `PAF_ID_OFFSET` 后是 PAF 张量中的序号
const LIMB_IDS_PAF: [(usize, usize); 19] = [
  (31, 32), (39, 40), (33, 34), (35, 36), (41, 42), (43, 44), (19, 20), (21, 22), (23, 24),
  (25, 26), (27, 28), (29, 30), (47, 48), (49, 50), (53, 54), (51, 52), (55, 56), (37, 38),
  (45, 46),
];
const PAF_ID_OFFSET: usize = KEYPOINTS_NUMBER + 1;

/// 耳朵到肩膀的两条肢体只补全已有姿态，不新建姿态
const EXTRA_LIMBS: [usize; 2] = [17, 18];

/// 热力图上的一个峰值
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
  /// 全部热力图中的全局序号
  pub id: usize,
  pub x: usize,
  pub y: usize,
  pub score: f32,
}

/// 在单张热力图上找 4 邻域局部极大值，低于阈值的值按 0 处理。
/// 峰值按 x 排序后，距离已保留峰值小于 `min_distance` 的被抑制。
/// 返回的序号从 0 开始。
pub fn find_peaks(heatmap: ArrayView2<f32>, threshold: f32, min_distance: f32) -> Vec<Peak> {
  let (rows, cols) = heatmap.dim();
  let value = |x: isize, y: isize| -> f32 {
    if x < 0 || y < 0 || x >= cols as isize || y >= rows as isize {
      return 0.0;
    }
    let v = heatmap[[y as usize, x as usize]];
    if v >= threshold { v } else { 0.0 }
  };

  let mut candidates = Vec::new();
  for y in 0..rows as isize {
    for x in 0..cols as isize {
      let v = value(x, y);
      if v > value(x + 1, y) && v > value(x - 1, y) && v > value(x, y + 1) && v > value(x, y - 1) {
        candidates.push((x as usize, y as usize));
      }
    }
  }
  candidates.sort_by_key(|&(x, _)| x);

  let mut suppressed = vec![false; candidates.len()];
  let mut peaks = Vec::new();
  for i in 0..candidates.len() {
    if suppressed[i] {
      continue;
    }
    let (xi, yi) = candidates[i];
    for j in i + 1..candidates.len() {
      let (xj, yj) = candidates[j];
      let dx = xi as f32 - xj as f32;
      let dy = yi as f32 - yj as f32;
      if (dx * dx + dy * dy).sqrt() < min_distance {
        suppressed[j] = true;
      }
    }
    peaks.push(Peak {
      id: peaks.len(),
      x: xi,
      y: yi,
      score: heatmap[[yi, xi]],
    });
  }
  peaks
}

/// 对每张热力图找峰值，并把序号改为跨热力图的全局序号
pub fn extract_peaks(heatmaps: &[Array2<f32>], threshold: f32, min_distance: f32) -> Vec<Vec<Peak>> {
  let mut offset = 0;
  heatmaps
    .iter()
    .map(|map| {
      let mut peaks = find_peaks(map.view(), threshold, min_distance);
      for peak in peaks.iter_mut() {
        peak.id += offset;
      }
      offset += peaks.len();
      peaks
    })
    .collect()
}

#[derive(Debug, Clone)]
struct PoseSubset {
  peaks: [Option<usize>; KEYPOINTS_NUMBER],
  joints: usize,
  score: f32,
}

impl PoseSubset {
  fn empty() -> Self {
    Self {
      peaks: [None; KEYPOINTS_NUMBER],
      joints: 0,
      score: 0.0,
    }
  }

  fn single(joint: usize, peak: &Peak) -> Self {
    let mut subset = Self::empty();
    subset.peaks[joint] = Some(peak.id);
    subset.joints = 1;
    subset.score = peak.score;
    subset
  }
}

#[derive(Debug, Clone, Copy)]
struct Connection {
  first: usize,
  second: usize,
  score: f32,
}

fn sample(map: &Array2<f32>, x: f32, y: f32) -> f32 {
  let (rows, cols) = map.dim();
  let xi = (x.round_ties_even() as isize).clamp(0, cols as isize - 1) as usize;
  let yi = (y.round_ties_even() as isize).clamp(0, rows as isize - 1) as usize;
  map[[yi, xi]]
}

/// 沿候选肢体在 PAF 上采样，返回连接得分；不满足条件时返回 None
fn limb_score(a: &Peak, b: &Peak, paf_x: &Array2<f32>, paf_y: &Array2<f32>) -> Option<f32> {
  let (ax, ay) = (a.x as f32, a.y as f32);
  let (dx, dy) = (b.x as f32 - ax, b.y as f32 - ay);
  let norm = (dx * dx + dy * dy).sqrt();
  if norm == 0.0 {
    return None;
  }
  let (vx, vy) = (dx / norm, dy / norm);
  let step = (MID_POINTS - 1) as f32;

  let mut sum = 0.0;
  let mut count = 0usize;
  for n in 0..MID_POINTS {
    let px = ax + n as f32 * dx / step;
    let py = ay + n as f32 * dy / step;
    let score = vx * sample(paf_x, px, py) + vy * sample(paf_y, px, py);
    if score > MID_POINTS_SCORE_THRESHOLD {
      sum += score;
      count += 1;
    }
  }

  let success_ratio = count as f32 / MID_POINTS as f32;
  let ratio = if count > 0 { sum / count as f32 } else { 0.0 };
  // 过长的肢体按特征图高度的一半惩罚
  let half_height = (paf_x.nrows() / 2) as f32;
  let mid_score = ratio + (half_height / norm - 1.0).min(0.0);

  (mid_score > 0.0 && success_ratio > FOUND_MID_POINTS_RATIO_THRESHOLD).then_some(mid_score)
}

/// 一端没有候选峰值时，另一端尚未被任何姿态使用的峰值各自成为单点姿态
fn add_lonely_joints(subsets: &mut Vec<PoseSubset>, joint: usize, peaks: &[Peak]) {
  for peak in peaks {
    if !subsets.iter().any(|s| s.peaks[joint] == Some(peak.id)) {
      subsets.push(PoseSubset::single(joint, peak));
    }
  }
}

/// 按 PAF 把全部峰值贪心地分组为人体姿态。
///
/// `all_peaks` 的序号必须是全局序号（见 [`extract_peaks`]），`pafs` 为 38 张 PAF 图。
/// 返回的关键点位于热力图坐标系并已加上 0.5 像素的中心偏移。
pub fn group_peaks_to_poses(all_peaks: &[Vec<Peak>], pafs: &[Array2<f32>]) -> Vec<HumanPose> {
  let candidates: Vec<Peak> = all_peaks.iter().flatten().copied().collect();
  let score_of = |id: usize| candidates.get(id).map(|p| p.score).unwrap_or(0.0);
  let mut subsets: Vec<PoseSubset> = Vec::new();

  for (k, (&(heat_a, heat_b), &(paf_a, paf_b))) in
    LIMB_IDS_HEATMAP.iter().zip(LIMB_IDS_PAF.iter()).enumerate()
  {
    let (joint_a, joint_b) = (heat_a - 1, heat_b - 1);
    let (Some(paf_x), Some(paf_y)) = (
      pafs.get(paf_a - PAF_ID_OFFSET),
      pafs.get(paf_b - PAF_ID_OFFSET),
    ) else {
      continue;
    };
    let empty = Vec::new();
    let cand_a = all_peaks.get(joint_a).unwrap_or(&empty);
    let cand_b = all_peaks.get(joint_b).unwrap_or(&empty);

    match (cand_a.is_empty(), cand_b.is_empty()) {
      (true, true) => continue,
      (true, false) => {
        add_lonely_joints(&mut subsets, joint_b, cand_b);
        continue;
      }
      (false, true) => {
        add_lonely_joints(&mut subsets, joint_a, cand_a);
        continue;
      }
      (false, false) => {}
    }

    let mut scored = Vec::new();
    for (i, a) in cand_a.iter().enumerate() {
      for (j, b) in cand_b.iter().enumerate() {
        if let Some(score) = limb_score(a, b, paf_x, paf_y) {
          scored.push(Connection {
            first: i,
            second: j,
            score,
          });
        }
      }
    }
    scored.sort_by(|l, r| r.score.total_cmp(&l.score));

    // 每个峰值最多参与一条连接
    let max_limbs = cand_a.len().min(cand_b.len());
    let mut used_a = vec![false; cand_a.len()];
    let mut used_b = vec![false; cand_b.len()];
    let mut connections = Vec::new();
    for conn in scored {
      if connections.len() == max_limbs {
        break;
      }
      if !used_a[conn.first] && !used_b[conn.second] {
        used_a[conn.first] = true;
        used_b[conn.second] = true;
        connections.push(Connection {
          first: cand_a[conn.first].id,
          second: cand_b[conn.second].id,
          score: conn.score,
        });
      }
    }
    if connections.is_empty() {
      continue;
    }

    if k == 0 {
      subsets = connections
        .iter()
        .map(|conn| {
          let mut subset = PoseSubset::empty();
          subset.peaks[joint_a] = Some(conn.first);
          subset.peaks[joint_b] = Some(conn.second);
          subset.joints = 2;
          subset.score = score_of(conn.first) + score_of(conn.second) + conn.score;
          subset
        })
        .collect();
    } else if EXTRA_LIMBS.contains(&k) {
      for conn in &connections {
        for subset in subsets.iter_mut() {
          if subset.peaks[joint_a] == Some(conn.first) && subset.peaks[joint_b].is_none() {
            subset.peaks[joint_b] = Some(conn.second);
          } else if subset.peaks[joint_b] == Some(conn.second) && subset.peaks[joint_a].is_none() {
            subset.peaks[joint_a] = Some(conn.first);
          }
        }
      }
    } else {
      for conn in &connections {
        let mut found = false;
        for subset in subsets.iter_mut() {
          if subset.peaks[joint_a] == Some(conn.first) {
            subset.peaks[joint_b] = Some(conn.second);
            subset.joints += 1;
            subset.score += score_of(conn.second) + conn.score;
            found = true;
          }
        }
        if !found {
          let mut subset = PoseSubset::empty();
          subset.peaks[joint_a] = Some(conn.first);
          subset.peaks[joint_b] = Some(conn.second);
          subset.joints = 2;
          subset.score = score_of(conn.first) + score_of(conn.second) + conn.score;
          subsets.push(subset);
        }
      }
    }
  }

  debug!("候选姿态数: {}", subsets.len());

  subsets
    .into_iter()
    .filter(|s| s.joints >= MIN_JOINTS_NUMBER && s.score / s.joints as f32 >= MIN_SUBSET_SCORE)
    .map(|s| {
      let mut keypoints = [None; KEYPOINTS_NUMBER];
      for (slot, peak) in keypoints.iter_mut().zip(s.peaks.iter()) {
        *slot = peak
          .and_then(|id| candidates.get(id))
          .map(|p| (p.x as f32 + 0.5, p.y as f32 + 0.5));
      }
      HumanPose {
        keypoints,
        score: s.score * s.joints.saturating_sub(1) as f32,
      }
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  const MAP: usize = 40;

  fn heatmaps_with(points: &[(usize, usize, usize)]) -> Vec<Array2<f32>> {
    let mut maps = vec![Array2::<f32>::zeros((MAP, MAP)); KEYPOINTS_NUMBER];
    for &(joint, x, y) in points {
      maps[joint][[y, x]] = 0.9;
    }
    maps
  }

  /// 所有肢体的 PAF 都指向 +x 方向
  fn horizontal_pafs() -> Vec<Array2<f32>> {
    (0..2 * PAF_ID_OFFSET)
      .map(|i| {
        if i % 2 == 0 {
          Array2::from_elem((MAP, MAP), 1.0)
        } else {
          Array2::zeros((MAP, MAP))
        }
      })
      .collect()
  }

  #[test]
  fn finds_local_maxima_above_threshold() {
    let mut map = Array2::<f32>::zeros((10, 10));
    map[[2, 3]] = 0.8;
    map[[7, 1]] = 0.6;
    map[[5, 5]] = 0.05;
    let peaks = find_peaks(map.view(), 0.1, 3.0);

    assert_eq!(peaks.len(), 2);
    // 按 x 排序
    assert_eq!((peaks[0].x, peaks[0].y, peaks[0].id), (1, 7, 0));
    assert_eq!((peaks[1].x, peaks[1].y, peaks[1].id), (3, 2, 1));
    assert_eq!(peaks[1].score, 0.8);
  }

  #[test]
  fn close_peaks_are_suppressed() {
    let mut map = Array2::<f32>::zeros((10, 10));
    map[[4, 4]] = 0.5;
    map[[4, 6]] = 0.9;
    let peaks = find_peaks(map.view(), 0.1, 3.0);
    assert_eq!(peaks.len(), 1);
    assert_eq!((peaks[0].x, peaks[0].y), (4, 4));
  }

  #[test]
  fn plateau_is_not_a_peak() {
    let map = Array2::<f32>::from_elem((5, 5), 0.5);
    assert!(find_peaks(map.view(), 0.1, 3.0).is_empty());
  }

  #[test]
  fn peak_ids_are_global() {
    let maps = heatmaps_with(&[(0, 5, 5), (1, 10, 10), (1, 30, 30), (2, 20, 20)]);
    let peaks = extract_peaks(&maps, 0.1, 3.0);
    assert_eq!(peaks[0][0].id, 0);
    assert_eq!(peaks[1].iter().map(|p| p.id).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(peaks[2][0].id, 3);
  }

  #[test]
  fn groups_joints_into_a_single_pose() {
    // 第一个人：脖子、右肩、右肘；第二个人只有脖子和右肩
    let maps = heatmaps_with(&[
      (1, 10, 10),
      (2, 20, 10),
      (3, 30, 10),
      (1, 10, 30),
      (2, 20, 30),
    ]);
    let peaks = extract_peaks(&maps, 0.1, 3.0);
    let poses = group_peaks_to_poses(&peaks, &horizontal_pafs());

    assert_eq!(poses.len(), 1);
    let pose = &poses[0];
    assert_eq!(pose.joints(), 3);
    assert_eq!(pose.keypoints[1], Some((10.5, 10.5)));
    assert_eq!(pose.keypoints[2], Some((20.5, 10.5)));
    assert_eq!(pose.keypoints[3], Some((30.5, 10.5)));
    assert_eq!(pose.keypoints[0], None);
    // (0.9 + 0.9 + 1.0) + (0.9 + 1.0) 乘以 (关节数 - 1)
    assert!((pose.score - 9.4).abs() < 1e-4);
  }

  #[test]
  fn two_people_are_grouped_separately() {
    // 两个人各有脖子、右肩、右肘，分别位于 y = 10 和 y = 30
    let maps = heatmaps_with(&[
      (1, 10, 10),
      (2, 20, 10),
      (3, 30, 10),
      (1, 10, 30),
      (2, 20, 30),
      (3, 30, 30),
    ]);
    let peaks = extract_peaks(&maps, 0.1, 3.0);
    let poses = group_peaks_to_poses(&peaks, &horizontal_pafs());

    assert_eq!(poses.len(), 2);
    let mut rows: Vec<f32> = poses
      .iter()
      .map(|pose| {
        assert_eq!(pose.joints(), 3);
        let (_, neck_y) = pose.keypoints[1].unwrap();
        // 同一个人的关键点在同一行
        assert_eq!(pose.keypoints[2].map(|p| p.1), Some(neck_y));
        assert_eq!(pose.keypoints[3].map(|p| p.1), Some(neck_y));
        neck_y
      })
      .collect();
    rows.sort_by(f32::total_cmp);
    assert_eq!(rows, vec![10.5, 30.5]);
  }

  #[test]
  fn ear_limbs_only_complete_existing_poses() {
    // 第一个人：脖子、右肩、右肘、右耳；第二个人只有右肩和右耳
    let maps = heatmaps_with(&[
      (1, 10, 10),
      (2, 20, 10),
      (3, 30, 10),
      (16, 30, 12),
      (2, 20, 30),
      (16, 30, 30),
    ]);
    let peaks = extract_peaks(&maps, 0.1, 3.0);
    let poses = group_peaks_to_poses(&peaks, &horizontal_pafs());

    assert_eq!(poses.len(), 1);
    let pose = &poses[0];
    assert_eq!(pose.keypoints[16], Some((30.5, 12.5)));
    assert_eq!(pose.joints(), 4);
    // 耳朵不计入关节数，得分仍为 (0.9 + 0.9 + 1.0) + (0.9 + 1.0) 乘以 2
    assert!((pose.score - 9.4).abs() < 1e-4);
  }

  #[test]
  fn limbs_against_the_field_are_rejected() {
    // 右肘在右肩左侧，PAF 方向相反
    let maps = heatmaps_with(&[(1, 10, 10), (2, 20, 10), (3, 5, 10)]);
    let peaks = extract_peaks(&maps, 0.1, 3.0);
    let poses = group_peaks_to_poses(&peaks, &horizontal_pafs());
    assert!(poses.is_empty());
  }

  #[test]
  fn no_peaks_no_poses() {
    let peaks = vec![Vec::new(); KEYPOINTS_NUMBER];
    assert!(group_peaks_to_poses(&peaks, &horizontal_pafs()).is_empty());
  }
}
