// 该文件是 Model API （模型接口） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use crate::{
  frame::Frame,
  input::{InputError, read_image},
};

/// 单张图像，迭代时才解码
pub struct ImageFileInput {
  path: Option<PathBuf>,
}

impl ImageFileInput {
  pub fn new(path: impl AsRef<Path>) -> Result<Self, InputError> {
    let path = path.as_ref();
    if !path.is_file() {
      return Err(InputError::NotFound(path.to_path_buf()));
    }
    Ok(Self {
      path: Some(path.to_path_buf()),
    })
  }

  pub fn len(&self) -> usize {
    usize::from(self.path.is_some())
  }

  pub fn is_empty(&self) -> bool {
    self.path.is_none()
  }
}

impl Iterator for ImageFileInput {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    let path = self.path.take()?;
    Some(read_image(&path).map(|image| Frame::new(0, path, image)))
  }
}
