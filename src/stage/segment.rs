// 该文件是 Panshi （盘食） 项目的一部分。
// src/stage/segment.rs - 分割与掩码坐标映射
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

use tracing::{debug, warn};

use crate::{
  fanout::fan_out,
  frame::{Frame, encode_jpeg},
  geometry::{GeometryError, Mask, PixelBox, resize_mask},
  oracle::SegmentationOracle,
  stage::{ConfirmedItem, SegmentedItem},
};

/// 把裁剪图坐标系下的掩码放回 `width`x`height` 的全图。
///
/// 掩码先按最近邻缩放到检测框尺寸；缩放后为空或放回后为空都返回 `Ok(None)`。
pub fn remap_to_frame(
  crop_mask: &Mask,
  bbox: &PixelBox,
  width: u32,
  height: u32,
) -> Result<Option<Mask>, GeometryError> {
  let local = resize_mask(crop_mask, bbox.height(), bbox.width())?;
  if local.is_empty() {
    return Ok(None);
  }
  let mut full = Mask::new(width, height);
  full.paste(&local, bbox.x1, bbox.y1);
  if full.is_empty() {
    return Ok(None);
  }
  Ok(Some(full))
}

fn segment_one(
  oracle: &dyn SegmentationOracle,
  frame: &Frame,
  item: ConfirmedItem,
  jpeg_quality: u8,
) -> Option<SegmentedItem> {
  let crop_mask = match oracle.segment(&item.crop, &item.label) {
    Ok(mask) => mask,
    Err(e) => {
      warn!("分割 {} 失败: {}", item.label, e);
      return None;
    }
  };

  let mask = match remap_to_frame(&crop_mask, &item.bbox, frame.width(), frame.height()) {
    Ok(Some(mask)) => mask,
    Ok(None) => {
      debug!("{} 的掩码为空，丢弃", item.label);
      return None;
    }
    Err(e) => {
      warn!("{} 的掩码无法映射: {}", item.label, e);
      return None;
    }
  };

  let crop = match encode_jpeg(&frame.masked_crop(&mask), jpeg_quality) {
    Ok(bytes) => bytes,
    Err(e) => {
      warn!("{} 的掩码裁剪图编码失败: {}", item.label, e);
      return None;
    }
  };

  Some(SegmentedItem {
    label: item.label,
    mask,
    crop,
    confidence: item.confidence,
  })
}

/// 逐项调用分割模型，掩码映射到全图坐标；失败或为空的项被丢弃。
pub fn segment_items(
  oracle: &dyn SegmentationOracle,
  frame: &Frame,
  items: Vec<ConfirmedItem>,
  workers: usize,
  jpeg_quality: u8,
) -> Vec<SegmentedItem> {
  fan_out(workers, items, |item| {
    segment_one(oracle, frame, item, jpeg_quality)
  })
}
