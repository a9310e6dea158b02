// 该文件是 Panshi （盘食） 项目的一部分。
// src/input.rs - 图像文件输入
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
use tracing::error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{actual}'")]
  SchemeMismatch {
    expected: &'static str,
    actual: String,
  },
  #[error("读取 {path} 失败: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// `image:///path/to/meal.jpg`，按原样读取文件字节
#[derive(Debug, Clone)]
pub struct ImageFileInput {
  path: PathBuf,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemeMismatch {
        expected: Self::SCHEME,
        actual: url.scheme().to_string(),
      });
    }
    let path = urlencoding::decode(url.path())
      .map(|p| p.into_owned())
      .unwrap_or_else(|_| url.path().to_string());
    Ok(Self {
      path: PathBuf::from(path),
    })
  }
}

impl ImageFileInput {
  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn read(&self) -> Result<Vec<u8>, ImageFileInputError> {
    std::fs::read(&self.path).map_err(|source| ImageFileInputError::Io {
      path: self.path.clone(),
      source,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn reads_bytes_from_image_url() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("my meal.jpg");
    std::fs::write(&path, b"jpeg bytes").unwrap();
    let url = Url::from_file_path(&path).unwrap();
    let url = Url::parse(&url.as_str().replacen("file:", "image:", 1)).unwrap();

    let input = ImageFileInput::from_url(&url).unwrap();
    assert_eq!(input.path(), path);
    assert_eq!(input.read().unwrap(), b"jpeg bytes");
  }

  #[test]
  fn rejects_other_schemes() {
    let url = Url::parse("folder:///tmp/x.jpg").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::SchemeMismatch { .. })
    ));
  }

  #[test]
  fn missing_file_is_io_error() {
    let url = Url::parse("image:///nonexistent/panshi/meal.jpg").unwrap();
    let input = ImageFileInput::from_url(&url).unwrap();
    assert!(matches!(input.read(), Err(ImageFileInputError::Io { .. })));
  }
}
