// 该文件是 Model API （模型接口） 项目的一部分。
// src/input.rs - 图像输入
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

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{error, info};

use crate::frame::Frame;

mod image_folder;
mod read_image_file;

pub use self::image_folder::ImageFolderInput;
pub use self::read_image_file::ImageFileInput;

#[derive(Error, Debug)]
pub enum InputError {
  #[error("输入路径不存在: {0}")]
  NotFound(PathBuf),
  #[error("目录中没有图像文件: {0}")]
  NoImages(PathBuf),
  #[error("目录匹配模式无效: {0}")]
  Pattern(#[from] glob::PatternError),
  #[error("failed to read the image {path}: {source}")]
  ReadImage {
    path: PathBuf,
    #[source]
    source: image::ImageError,
  },
}

/// 读取并解码一张图像为 RGB
pub(crate) fn read_image(path: &Path) -> Result<RgbImage, InputError> {
  let decode = || -> Result<RgbImage, image::ImageError> {
    Ok(ImageReader::open(path)?.with_guessed_format()?.decode()?.to_rgb8())
  };
  decode().map_err(|source| {
    error!("无法读取图像 {}: {}", path.display(), source);
    InputError::ReadImage {
      path: path.to_path_buf(),
      source,
    }
  })
}

pub enum InputWrapper {
  ImageFile(ImageFileInput),
  ImageFolder(ImageFolderInput),
}

/// 路径是目录时读取目录下所有图像，否则当作单张图像
pub fn open_input(path: impl AsRef<Path>) -> Result<InputWrapper, InputError> {
  let path = path.as_ref();
  if path.is_dir() {
    let input = ImageFolderInput::new(path)?;
    info!("从目录 {} 读取 {} 张图像", path.display(), input.len());
    Ok(InputWrapper::ImageFolder(input))
  } else {
    info!("读取图像文件 {}", path.display());
    Ok(InputWrapper::ImageFile(ImageFileInput::new(path)?))
  }
}

impl InputWrapper {
  /// 剩余的帧数
  pub fn len(&self) -> usize {
    match self {
      InputWrapper::ImageFile(input) => input.len(),
      InputWrapper::ImageFolder(input) => input.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// 预先解码所有帧，任何一张读取失败都返回错误
  pub fn cache(self) -> Result<Vec<Frame>, InputError> {
    self.collect()
  }
}

impl Iterator for InputWrapper {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      InputWrapper::ImageFile(input) => input.next(),
      InputWrapper::ImageFolder(input) => input.next(),
    }
  }
}
