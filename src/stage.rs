// 该文件是 Panshi （盘食） 项目的一部分。
// src/stage.rs - 并发确认与分割阶段
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

use crate::geometry::{Mask, PixelBox};

mod confirm;
mod segment;

pub use self::confirm::confirm_boxes;
pub use self::segment::{remap_to_frame, segment_items};

/// 视觉模型确认过的菜品
#[derive(Debug, Clone)]
pub struct ConfirmedItem {
  /// 送给模型的 JPEG 裁剪图
  pub crop: Vec<u8>,
  /// 模型给出的名称，可能与检测标签不同
  pub label: String,
  /// 全图坐标，已裁剪到图像范围内
  pub bbox: PixelBox,
  pub confidence: f32,
}

/// 带全图掩码的菜品
#[derive(Debug, Clone)]
pub struct SegmentedItem {
  pub label: String,
  /// 与原图同尺寸，创建后只读
  pub mask: Mask,
  /// 黑色背景上的菜品像素（JPEG）
  pub crop: Vec<u8>,
  pub confidence: f32,
}
