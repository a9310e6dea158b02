// 该文件是 Panshi （盘食） 项目的一部分。
// src/filter/brightness.rs - 亮度过滤
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

use image::{GrayImage, ImageError, Luma};
use tracing::{info, warn};

use crate::stage::SegmentedItem;

pub fn count_bright_pixels(image: &GrayImage, threshold: u8) -> usize {
  image.pixels().filter(|Luma([v])| *v > threshold).count()
}

/// 裁剪图的亮像素数是否严格大于 `min_bright`
pub fn passes_brightness(crop: &[u8], threshold: u8, min_bright: usize) -> Result<bool, ImageError> {
  let gray = image::load_from_memory(crop)?.to_luma8();
  Ok(count_bright_pixels(&gray, threshold) > min_bright)
}

/// 去掉几乎全黑的裁剪图；无法解码的保留
pub fn filter_brightness(
  items: Vec<SegmentedItem>,
  threshold: u8,
  min_bright: usize,
) -> (Vec<SegmentedItem>, usize) {
  let before = items.len();
  let kept: Vec<_> = items
    .into_iter()
    .filter(|item| match passes_brightness(&item.crop, threshold, min_bright) {
      Ok(pass) => pass,
      Err(e) => {
        warn!("{} 的亮度检查失败，保留: {}", item.label, e);
        true
      }
    })
    .collect();

  let removed = before - kept.len();
  if removed > 0 {
    info!("亮度过滤移除 {} 项", removed);
  }
  (kept, removed)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::filter::test_support::{crop_with_bright_pixels, item};

  #[test]
  fn boundary_is_strictly_greater() {
    assert!(!passes_brightness(&crop_with_bright_pixels(100), 30, 100).unwrap());
    assert!(passes_brightness(&crop_with_bright_pixels(101), 30, 100).unwrap());
  }

  #[test]
  fn threshold_itself_is_not_bright() {
    let gray = GrayImage::from_fn(4, 1, |x, _| Luma([[29, 30, 31, 255][x as usize]]));
    assert_eq!(count_bright_pixels(&gray, 30), 2);
  }

  #[test]
  fn undecodable_crop_is_kept() {
    let mut broken = item("mystery", (0, 0, 5, 5));
    broken.crop = b"not an image".to_vec();
    let mut dark = item("dark", (0, 0, 5, 5));
    dark.crop = crop_with_bright_pixels(100);
    let (kept, removed) = filter_brightness(vec![broken, dark], 30, 100);
    assert_eq!(removed, 1);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].label, "mystery");
  }
}
