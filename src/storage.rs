// 该文件是 Panshi （盘食） 项目的一部分。
// src/storage.rs - 图像持久化接口
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

use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

mod directory_record;

pub use self::directory_record::DirectoryStorage;

#[derive(Error, Debug)]
pub enum StorageError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 保存的图像类别
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Category {
  Visualization,
  Crop { label: String },
}

impl Category {
  pub fn crop(label: impl Into<String>) -> Self {
    Category::Crop {
      label: label.into(),
    }
  }

  pub fn directory(&self) -> &'static str {
    match self {
      Category::Visualization => "visualizations",
      Category::Crop { .. } => "crops",
    }
  }
}

pub trait Storage: Send + Sync {
  /// 保存 JPEG 字节，返回可供调用方引用的地址
  fn save(&self, bytes: &[u8], category: &Category) -> Result<String, StorageError>;
}

/// 按 URL 方案选择存储实现
pub fn storage_from_url(url: &Url) -> Result<Box<dyn Storage>, StorageError> {
  match url.scheme() {
    DirectoryStorage::SCHEME => Ok(Box::new(DirectoryStorage::from_url(url)?)),
    _ => Err(StorageError::SchemeMismatch),
  }
}
