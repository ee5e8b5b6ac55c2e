// 该文件是 Model API （模型接口） 项目的一部分。
// src/utils.rs - 特征图插值等数值工具
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

//! 特征图（单通道浮点图）的插值。
//!
//! `image::imageops::resize` 会把浮点像素截断到 `[0, 1]`，
//! PAF 之类带负值的特征图不能用它缩放，所以在这里直接基于 `ndarray` 实现。
//! 采样坐标使用像素中心对齐：`src = (dst + 0.5) * scale - 0.5`。

use ndarray::{Array2, ArrayView2};

const CUBIC_A: f32 = -0.75;

fn cubic_weights(t: f32) -> [f32; 4] {
  let a = CUBIC_A;
  let w0 = ((a * (t + 1.0) - 5.0 * a) * (t + 1.0) + 8.0 * a) * (t + 1.0) - 4.0 * a;
  let w1 = ((a + 2.0) * t - (a + 3.0)) * t * t + 1.0;
  let w2 = ((a + 2.0) * (1.0 - t) - (a + 3.0)) * (1.0 - t) * (1.0 - t) + 1.0;
  [w0, w1, w2, 1.0 - w0 - w1 - w2]
}

fn clamp_index(i: isize, len: usize) -> usize {
  i.clamp(0, len as isize - 1) as usize
}

/// 双三次插值缩放，边界按复制处理
pub fn resize_cubic(src: ArrayView2<f32>, out_h: usize, out_w: usize) -> Array2<f32> {
  let (in_h, in_w) = src.dim();
  if in_h == 0 || in_w == 0 || out_h == 0 || out_w == 0 {
    return Array2::zeros((out_h, out_w));
  }
  let scale_y = in_h as f32 / out_h as f32;
  let scale_x = in_w as f32 / out_w as f32;

  // 先横向，再纵向
  let mut horizontal = Array2::<f32>::zeros((in_h, out_w));
  for x in 0..out_w {
    let fx = (x as f32 + 0.5) * scale_x - 0.5;
    let ix = fx.floor();
    let w = cubic_weights(fx - ix);
    let ix = ix as isize;
    for y in 0..in_h {
      let mut acc = 0.0;
      for (k, wk) in w.iter().enumerate() {
        acc += wk * src[[y, clamp_index(ix - 1 + k as isize, in_w)]];
      }
      horizontal[[y, x]] = acc;
    }
  }

  let mut out = Array2::<f32>::zeros((out_h, out_w));
  for y in 0..out_h {
    let fy = (y as f32 + 0.5) * scale_y - 0.5;
    let iy = fy.floor();
    let w = cubic_weights(fy - iy);
    let iy = iy as isize;
    for x in 0..out_w {
      let mut acc = 0.0;
      for (k, wk) in w.iter().enumerate() {
        acc += wk * horizontal[[clamp_index(iy - 1 + k as isize, in_h), x]];
      }
      out[[y, x]] = acc;
    }
  }
  out
}

/// 双线性插值缩放，边界按复制处理
pub fn resize_bilinear(src: ArrayView2<f32>, out_h: usize, out_w: usize) -> Array2<f32> {
  let (in_h, in_w) = src.dim();
  if in_h == 0 || in_w == 0 || out_h == 0 || out_w == 0 {
    return Array2::zeros((out_h, out_w));
  }
  let scale_y = in_h as f32 / out_h as f32;
  let scale_x = in_w as f32 / out_w as f32;

  Array2::from_shape_fn((out_h, out_w), |(y, x)| {
    let fy = ((y as f32 + 0.5) * scale_y - 0.5).max(0.0);
    let fx = ((x as f32 + 0.5) * scale_x - 0.5).max(0.0);
    let y0 = (fy.floor() as usize).min(in_h - 1);
    let x0 = (fx.floor() as usize).min(in_w - 1);
    let y1 = (y0 + 1).min(in_h - 1);
    let x1 = (x0 + 1).min(in_w - 1);
    let dy = fy - y0 as f32;
    let dx = fx - x0 as f32;

    let top = src[[y0, x0]] * (1.0 - dx) + src[[y0, x1]] * dx;
    let bottom = src[[y1, x0]] * (1.0 - dx) + src[[y1, x1]] * dx;
    top * (1.0 - dy) + bottom * dy
  })
}

/// 数值稳定的 softmax
pub fn softmax(logits: &[f32]) -> Vec<f32> {
  let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
  let exps: Vec<f32> = logits.iter().map(|&v| (v - max).exp()).collect();
  let sum: f32 = exps.iter().sum();
  exps.into_iter().map(|v| v / sum).collect()
}
