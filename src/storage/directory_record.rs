// 该文件是 Panshi （盘食） 项目的一部分。
// src/storage/directory_record.rs - 按日期分目录保存图像
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
  sync::atomic::{AtomicU32, Ordering},
};

use chrono::{Datelike, Utc};
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  storage::{Category, Storage, StorageError},
};

const DEFAULT_PREFIX: &str = "/media";

/// `folder:///srv/media?prefix=/media`
///
/// 文件写到 `<root>/<类别>/<年>/<月>/<日>/<时-分-秒>-<序号>.jpg`，
/// 返回 `<prefix>/<相对路径>`。
pub struct DirectoryStorage {
  directory: PathBuf,
  prefix: String,
  counter: AtomicU32,
}

impl FromUrlWithScheme for DirectoryStorage {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryStorage {
  type Error = StorageError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(StorageError::SchemeMismatch);
    }

    let prefix = uri
      .query_pairs()
      .find(|(k, _)| k == "prefix")
      .map(|(_, v)| v.into_owned())
      .unwrap_or_else(|| DEFAULT_PREFIX.to_string());

    let directory = urlencoding::decode(uri.path())
      .map(|p| p.into_owned())
      .unwrap_or_else(|_| uri.path().to_string());

    Ok(Self::new(directory).with_prefix(prefix))
  }
}

impl DirectoryStorage {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    Self {
      directory: directory.into(),
      prefix: DEFAULT_PREFIX.to_string(),
      counter: AtomicU32::new(0),
    }
  }

  pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
    self.prefix = prefix.into().trim_end_matches('/').to_string();
    self
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  fn next_id(&self) -> u32 {
    self.counter.fetch_add(1, Ordering::Relaxed) + 1
  }

  fn relative_path(&self, category: &Category) -> PathBuf {
    let now = Utc::now();
    let stem = format!("{}-{:04X}", now.format("%H-%M-%S"), self.next_id());
    let filename = match category {
      Category::Visualization => format!("{}.jpg", stem),
      Category::Crop { label } => format!("{}_{}.jpg", sanitize_label(label), stem),
    };
    PathBuf::from(category.directory())
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()))
      .join(filename)
  }
}

/// 文件名中只保留字母、数字与 `-`，其余字符变为 `_`
pub fn sanitize_label(label: &str) -> String {
  let label = label.trim().to_lowercase();
  if label.is_empty() {
    return "item".to_string();
  }
  label
    .chars()
    .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
    .collect()
}

impl Storage for DirectoryStorage {
  fn save(&self, bytes: &[u8], category: &Category) -> Result<String, StorageError> {
    let relative = self.relative_path(category);
    let path = self.directory.join(&relative);
    if let Some(parent) = path.parent()
      && !parent.exists()
    {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, bytes)?;
    debug!("保存图像到文件: {}", path.display());

    let relative = relative
      .components()
      .map(|c| c.as_os_str().to_string_lossy())
      .collect::<Vec<_>>()
      .join("/");
    Ok(format!("{}/{}", self.prefix, relative))
  }
}
