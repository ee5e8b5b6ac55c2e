// 该文件是 Model API （模型接口） 项目的一部分。
// src/output/draw.rs - 推理结果可视化
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

use ab_glyph::{FontRef, InvalidFont, PxScale};
use image::{GrayImage, Rgb, RgbImage};
use imageproc::{
  drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut,
    draw_text_mut, text_size,
  },
  rect::Rect,
};

use crate::{
  frame::Frame,
  model::{
    ClassifyResult, DetectResult, HumanPose, KEYPOINTS_NUMBER, Label, PoseResult, SegmentResult,
  },
};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_HEIGHT: i32 = 24;
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const TEXT_COLOR: [u8; 3] = [255, 255, 255];
const MASK_ALPHA: f32 = 0.5;
const KEYPOINT_RADIUS: i32 = 4;

const PALETTE: [[u8; 3]; 10] = [
  [0, 0, 255],
  [255, 56, 56],
  [72, 249, 10],
  [255, 157, 151],
  [146, 204, 23],
  [0, 194, 255],
  [255, 178, 29],
  [207, 210, 49],
  [26, 147, 52],
  [132, 56, 255],
];

// 关键点颜色，下标与关键点编号一致
const POSE_COLORS: [[u8; 3]; KEYPOINTS_NUMBER] = [
  [255, 0, 0],
  [255, 85, 0],
  [255, 170, 0],
  [255, 255, 0],
  [170, 255, 0],
  [85, 255, 0],
  [0, 255, 0],
  [0, 255, 85],
  [0, 255, 170],
  [0, 255, 255],
  [0, 170, 255],
  [0, 85, 255],
  [0, 0, 255],
  [85, 0, 255],
  [170, 0, 255],
  [255, 0, 255],
  [255, 0, 170],
  [255, 0, 85],
];

// 骨架连线
const SKELETON: [(usize, usize); 17] = [
  (1, 2),
  (1, 5),
  (2, 3),
  (3, 4),
  (5, 6),
  (6, 7),
  (1, 8),
  (8, 9),
  (9, 10),
  (1, 11),
  (11, 12),
  (12, 13),
  (1, 0),
  (0, 14),
  (14, 16),
  (0, 15),
  (15, 17),
];

fn palette(id: u32) -> [u8; 3] {
  PALETTE[id as usize % PALETTE.len()]
}

pub struct Draw {
  font_size: f32,
  label_text_height: i32,
  label_text_vertical_padding: i32,
  font: FontRef<'static>,
}

impl Draw {
  pub fn new() -> Result<Self, InvalidFont> {
    let font_data: &'static [u8] = include_bytes!("../../assets/font.ttf");
    let font = FontRef::try_from_slice(font_data)?;

    Ok(Self {
      font_size: LABEL_FONT_SIZE,
      label_text_height: LABEL_TEXT_HEIGHT,
      label_text_vertical_padding: LABEL_TEXT_VERTICAL_PADDING,
      font,
    })
  }

  /// 复制一份帧图像，把结果画在上面
  pub fn annotate<R: DrawOnImage>(&self, frame: &Frame, result: &R) -> RgbImage {
    let mut image = frame.image.clone();
    result.draw_on_image(self, &mut image);
    image
  }

  /// 带实心背景的文本，超出图像右边界的部分截掉
  fn draw_label_text(&self, image: &mut RgbImage, x: i32, y: i32, text: &str, color: [u8; 3]) {
    let scale = PxScale::from(self.font_size);
    let (text_width, _) = text_size(scale, &self.font, text);
    let max_width = (image.width() as i32 - x).max(0) as u32;
    let width = text_width.min(max_width);
    if width == 0 {
      return;
    }

    let rect = Rect::at(x, y).of_size(width, self.label_text_height as u32);
    draw_filled_rect_mut(image, rect, Rgb(color));
    draw_text_mut(
      image,
      Rgb(TEXT_COLOR),
      x,
      y + self.label_text_vertical_padding,
      scale,
      &self.font,
      text,
    );
  }

  /// bbox 为原图像素坐标 [x_min, y_min, x_max, y_max]
  fn draw_bbox_with_label(
    &self,
    image: &mut RgbImage,
    bbox: &[f32; 4],
    label: &Label,
    score: f32,
    color: [u8; 3],
  ) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }

    let x_min = (bbox[0].floor() as i32).clamp(0, w - 1);
    let y_min = (bbox[1].floor() as i32).clamp(0, h - 1);
    let x_max = (bbox[2].ceil() as i32).clamp(0, w - 1);
    let y_max = (bbox[3].ceil() as i32).clamp(0, h - 1);
    if x_min >= x_max || y_min >= y_max {
      return;
    }

    // 边框加粗为 2 像素
    for thickness in 0..2 {
      let width = x_max - x_min - 2 * thickness;
      let height = y_max - y_min - 2 * thickness;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + thickness, y_min + thickness).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, Rgb(color));
    }

    let text = format!("{} {:.2}", label.name, score);
    let label_y = (y_min - self.label_text_height).max(0);
    self.draw_label_text(image, x_min, label_y, &text, color);
  }

  /// 按 `MASK_ALPHA` 把掩码混合到 bbox 区域
  fn blend_mask(&self, image: &mut RgbImage, mask: &GrayImage, bbox: &[f32; 4], color: [u8; 3]) {
    let (ox, oy) = (bbox[0].max(0.0) as u32, bbox[1].max(0.0) as u32);
    for (x, y, value) in mask.enumerate_pixels() {
      if value[0] == 0 {
        continue;
      }
      let (ix, iy) = (ox + x, oy + y);
      if ix >= image.width() || iy >= image.height() {
        continue;
      }
      let pixel = image.get_pixel_mut(ix, iy);
      for c in 0..3 {
        let blended = pixel[c] as f32 * (1.0 - MASK_ALPHA) + color[c] as f32 * MASK_ALPHA;
        pixel[c] = blended.round() as u8;
      }
    }
  }

  fn draw_pose(&self, image: &mut RgbImage, pose: &HumanPose) {
    for (i, (a, b)) in SKELETON.iter().enumerate() {
      if let (Some(start), Some(end)) = (pose.keypoints[*a], pose.keypoints[*b]) {
        let color = Rgb(POSE_COLORS[i % KEYPOINTS_NUMBER]);
        // 三条平行线，线宽约 3 像素
        for offset in [-1.0, 0.0, 1.0] {
          draw_line_segment_mut(
            image,
            (start.0 + offset, start.1),
            (end.0 + offset, end.1),
            color,
          );
        }
      }
    }
    for (i, keypoint) in pose.keypoints.iter().enumerate() {
      if let Some((x, y)) = keypoint {
        draw_filled_circle_mut(
          image,
          (x.round() as i32, y.round() as i32),
          KEYPOINT_RADIUS,
          Rgb(POSE_COLORS[i]),
        );
      }
    }
  }
}

/// 能画到图像上的推理结果
pub trait DrawOnImage {
  fn draw_on_image(&self, draw: &Draw, image: &mut RgbImage);
}

impl DrawOnImage for DetectResult {
  fn draw_on_image(&self, draw: &Draw, image: &mut RgbImage) {
    for item in self.items.iter() {
      let color = palette(item.label.id);
      draw.draw_bbox_with_label(image, &item.bbox, &item.label, item.score, color);
    }
  }
}

impl DrawOnImage for SegmentResult {
  fn draw_on_image(&self, draw: &Draw, image: &mut RgbImage) {
    // 先画掩码，避免覆盖文字
    for item in self.items.iter() {
      draw.blend_mask(image, &item.mask, &item.bbox, palette(item.label.id));
    }
    for item in self.items.iter() {
      let color = palette(item.label.id);
      draw.draw_bbox_with_label(image, &item.bbox, &item.label, item.score, color);
    }
  }
}

impl DrawOnImage for PoseResult {
  fn draw_on_image(&self, draw: &Draw, image: &mut RgbImage) {
    for pose in self.poses.iter() {
      draw.draw_pose(image, pose);
    }
  }
}

impl DrawOnImage for ClassifyResult {
  fn draw_on_image(&self, draw: &Draw, image: &mut RgbImage) {
    for (row, item) in self.items.iter().enumerate() {
      let text = format!("{} {:.2}", item.label.name, item.score);
      let y = row as i32 * draw.label_text_height;
      draw.draw_label_text(image, 0, y, &text, palette(item.label.id));
    }
  }
}
