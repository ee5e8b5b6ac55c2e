// 该文件是 Model API （模型接口） 项目的一部分。
// src/output/stdout.rs - 标准输出
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

use std::convert::Infallible;

use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  output::{Describe, Render},
};

/// 把结果逐行打印到标准输出
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutOutput;

impl FromUrlWithScheme for StdoutOutput {
  const SCHEME: &'static str = "stdout";
}

impl FromUrl for StdoutOutput {
  type Error = Infallible;

  fn from_url(_url: &Url) -> Result<Self, Self::Error> {
    Ok(StdoutOutput)
  }
}

impl StdoutOutput {
  pub(crate) fn format<R: Describe>(frame: &Frame, result: &R) -> Vec<String> {
    let lines = result.describe(true);
    let mut out = Vec::with_capacity(lines.len() + 1);
    out.push(format!(
      "[{}] {}: {} 个结果",
      frame.index,
      frame.source.display(),
      lines.len()
    ));
    out.extend(lines.into_iter().map(|line| format!("  {}", line)));
    out
  }

  pub fn print<R: Describe>(&self, frame: &Frame, result: &R) {
    for line in Self::format(frame, result) {
      println!("{}", line);
    }
  }
}

impl<R: Describe> Render<R> for StdoutOutput {
  type Error = Infallible;

  fn render_result(&self, frame: &Frame, result: &R) -> Result<(), Self::Error> {
    self.print(frame, result);
    Ok(())
  }
}
