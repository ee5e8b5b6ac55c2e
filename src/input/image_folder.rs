// 该文件是 Model API （模型接口） 项目的一部分。
// src/input/image_folder.rs - 图像目录输入
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
  path::{Path, PathBuf},
  vec::IntoIter,
};

use glob::glob;
use tracing::{debug, warn};

use crate::{
  frame::Frame,
  input::{InputError, read_image},
};

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// 目录下的所有图像，按文件名排序
pub struct ImageFolderInput {
  files: IntoIter<PathBuf>,
  index: usize,
}

fn is_image(path: &Path) -> bool {
  path
    .extension()
    .and_then(|e| e.to_str())
    .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
    .unwrap_or(false)
}

impl ImageFolderInput {
  pub fn new(dir: impl AsRef<Path>) -> Result<Self, InputError> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
      return Err(InputError::NotFound(dir.to_path_buf()));
    }

    let pattern = format!("{}/*", glob::Pattern::escape(&dir.to_string_lossy()));
    let mut files: Vec<PathBuf> = glob(&pattern)?
      .filter_map(|entry| match entry {
        Ok(path) => Some(path),
        Err(e) => {
          warn!("跳过无法访问的路径: {}", e);
          None
        }
      })
      .filter(|p| p.is_file() && is_image(p))
      .collect();
    files.sort();

    if files.is_empty() {
      return Err(InputError::NoImages(dir.to_path_buf()));
    }
    debug!("目录 {} 中的图像: {:?}", dir.display(), files);
    Ok(Self {
      files: files.into_iter(),
      index: 0,
    })
  }

  pub fn len(&self) -> usize {
    self.files.len()
  }

  pub fn is_empty(&self) -> bool {
    self.files.len() == 0
  }
}

impl Iterator for ImageFolderInput {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    let path = self.files.next()?;
    let index = self.index;
    self.index += 1;
    Some(read_image(&path).map(|image| Frame::new(index, path, image)))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::input::tests::write_image;

  #[test]
  fn files_are_sorted_and_filtered() {
    let dir = tempfile::tempdir().unwrap();
    write_image(dir.path(), "c.png", 2, 2);
    write_image(dir.path(), "a.PNG", 2, 2);
    write_image(dir.path(), "b.bmp", 2, 2);
    std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
    std::fs::create_dir(dir.path().join("sub.png")).unwrap();

    let frames: Vec<Frame> = ImageFolderInput::new(dir.path())
      .unwrap()
      .collect::<Result<_, _>>()
      .unwrap();
    let names: Vec<String> = frames
      .iter()
      .map(|f| f.source.file_name().unwrap().to_string_lossy().into_owned())
      .collect();
    assert_eq!(names, vec!["a.PNG", "b.bmp", "c.png"]);
    assert_eq!(frames.iter().map(|f| f.index).collect::<Vec<_>>(), vec![0, 1, 2]);
  }

  #[test]
  fn empty_folder_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("readme.md"), "x").unwrap();
    assert!(matches!(
      ImageFolderInput::new(dir.path()),
      Err(InputError::NoImages(_))
    ));
  }
}
