// 该文件是 Model API （模型接口） 项目的一部分。
// src/output/save_image_file.rs - 保存图像文件
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  output::{
    Render,
    draw::{Draw, DrawOnImage},
  },
  url_path,
};

const FRAME_INDEX_PLACEHOLDER: &str = "{}";

pub struct SaveImageFileOutput {
  path: PathBuf,
  draw: Draw,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("字体加载错误: {0}")]
  FontError(#[from] ab_glyph::InvalidFont),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("输出路径为空")]
  EmptyPath,
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    let path = url_path(uri);
    if path.as_os_str().is_empty() {
      return Err(SaveImageFileError::EmptyPath);
    }
    Ok(SaveImageFileOutput {
      path,
      draw: Draw::new()?,
    })
  }
}

impl SaveImageFileOutput {
  /// 路径中的 `{}` 替换为帧序号；没有占位符时，第 0 帧之后的文件名加 `-序号` 后缀
  pub(crate) fn frame_path(&self, index: usize) -> PathBuf {
    let text = self.path.to_string_lossy();
    if text.contains(FRAME_INDEX_PLACEHOLDER) {
      return PathBuf::from(text.replace(FRAME_INDEX_PLACEHOLDER, &index.to_string()));
    }
    if index == 0 {
      return self.path.clone();
    }

    let stem = self
      .path
      .file_stem()
      .map(|s| s.to_string_lossy().into_owned())
      .unwrap_or_default();
    let name = match self.path.extension() {
      Some(ext) => format!("{}-{}.{}", stem, index, ext.to_string_lossy()),
      None => format!("{}-{}", stem, index),
    };
    self.path.with_file_name(name)
  }

  fn save_image(&self, image: image::RgbImage, path: &Path) -> Result<(), SaveImageFileError> {
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    image.save(path)?;
    info!("保存图像到文件: {}", path.display());

    Ok(())
  }
}

impl<R: DrawOnImage> Render<R> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&self, frame: &Frame, result: &R) -> Result<(), Self::Error> {
    let image = self.draw.annotate(frame, result);
    self.save_image(image, &self.frame_path(frame.index))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::DetectResult;
  use image::RgbImage;

  fn output(path: &str) -> SaveImageFileOutput {
    SaveImageFileOutput::from_url(&Url::parse(path).unwrap()).unwrap()
  }

  #[test]
  fn frame_paths() {
    let out = output("image:///tmp/out/result.png");
    assert_eq!(out.frame_path(0), PathBuf::from("/tmp/out/result.png"));
    assert_eq!(out.frame_path(2), PathBuf::from("/tmp/out/result-2.png"));

    let out = output("image:///tmp/frame_{}.jpg");
    assert_eq!(out.frame_path(0), PathBuf::from("/tmp/frame_0.jpg"));
    assert_eq!(out.frame_path(7), PathBuf::from("/tmp/frame_7.jpg"));
  }

  #[test]
  fn saves_annotated_image() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("nested").join("out.png");
    let out = output(&format!("image://{}", target.display()));
    let frame = Frame::new(0, "in.png", RgbImage::new(8, 8));
    out.render_result(&frame, &DetectResult::default()).unwrap();
    assert!(target.exists());
  }

  #[test]
  fn wrong_scheme_is_rejected() {
    let url = Url::parse("folder:///tmp").unwrap();
    assert!(matches!(
      SaveImageFileOutput::from_url(&url),
      Err(SaveImageFileError::SchemeMismatch(_))
    ));
  }
}
