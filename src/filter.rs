// 该文件是 Panshi （盘食） 项目的一部分。
// src/filter.rs - 分割结果后处理过滤链
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

use serde::Serialize;
use tracing::{debug, info};

use crate::{fanout::DEFAULT_WORKERS, oracle::VisionOracle, stage::SegmentedItem};

mod brightness;
mod containment;
mod duplicate;
mod quality;

pub use self::brightness::{count_bright_pixels, filter_brightness, passes_brightness};
pub use self::containment::filter_containment;
pub use self::duplicate::filter_duplicates;
pub use self::quality::filter_quality;

pub const DEFAULT_BRIGHTNESS_THRESHOLD: u8 = 30;
pub const DEFAULT_MIN_BRIGHT_PIXELS: usize = 100;
pub const DEFAULT_CONTAINMENT_RATIO: f32 = 0.8;

/// 过滤链各阶段的计数，恒有 `output_count + 各阶段移除数 == input_count`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterStats {
  pub input_count: usize,
  pub brightness_removed: usize,
  pub duplicates_removed: usize,
  pub containment_removed: usize,
  #[serde(rename = "gpt_quality_removed")]
  pub quality_removed: usize,
  pub output_count: usize,
}

impl FilterStats {
  pub fn removed(&self) -> usize {
    self.brightness_removed
      + self.duplicates_removed
      + self.containment_removed
      + self.quality_removed
  }
}

#[derive(Debug, Clone)]
pub struct FilterConfig {
  /// 灰度严格大于该值的像素计为亮像素
  pub brightness_threshold: u8,
  /// 亮像素数必须严格大于该值
  pub min_bright_pixels: usize,
  /// 包含率严格大于该值时视为包含
  pub containment_ratio: f32,
  pub quality_check: bool,
  pub workers: usize,
}

impl Default for FilterConfig {
  fn default() -> Self {
    Self {
      brightness_threshold: DEFAULT_BRIGHTNESS_THRESHOLD,
      min_bright_pixels: DEFAULT_MIN_BRIGHT_PIXELS,
      containment_ratio: DEFAULT_CONTAINMENT_RATIO,
      quality_check: true,
      workers: DEFAULT_WORKERS,
    }
  }
}

/// 去首尾空白并转小写，用于按名称分组
pub fn normalize_label(label: &str) -> String {
  label.trim().to_lowercase()
}

/// 亮度、去重、包含、质量四级过滤，依次执行
pub struct FilterChain<'a> {
  oracle: &'a dyn VisionOracle,
  config: FilterConfig,
}

impl<'a> FilterChain<'a> {
  pub fn new(oracle: &'a dyn VisionOracle, config: FilterConfig) -> Self {
    Self { oracle, config }
  }

  pub fn run(&self, items: Vec<SegmentedItem>) -> (Vec<SegmentedItem>, FilterStats) {
    let mut stats = FilterStats {
      input_count: items.len(),
      ..Default::default()
    };
    if items.is_empty() {
      return (items, stats);
    }

    let (items, removed) = filter_brightness(
      items,
      self.config.brightness_threshold,
      self.config.min_bright_pixels,
    );
    stats.brightness_removed = removed;
    if items.is_empty() {
      info!("亮度过滤后没有剩余项");
      return (items, stats);
    }

    let (items, removed) = filter_duplicates(items);
    stats.duplicates_removed = removed;
    if items.is_empty() {
      return (items, stats);
    }

    let (items, removed) = filter_containment(items, self.oracle, self.config.containment_ratio);
    stats.containment_removed = removed;
    if items.is_empty() {
      return (items, stats);
    }

    let items = if self.config.quality_check {
      let (items, removed) = filter_quality(items, self.oracle, self.config.workers);
      stats.quality_removed = removed;
      items
    } else {
      debug!("跳过质量检查");
      items
    };

    stats.output_count = items.len();
    (items, stats)
  }
}

#[cfg(test)]
pub(crate) mod test_support {
  use std::io::Cursor;

  use image::{GrayImage, ImageFormat, Luma};

  use crate::{geometry::Mask, stage::SegmentedItem};

  /// 前 `bright` 个像素为白色的 PNG 裁剪图
  pub fn crop_with_bright_pixels(bright: u32) -> Vec<u8> {
    let image = GrayImage::from_fn(32, 32, |x, y| {
      if y * 32 + x < bright { Luma([255]) } else { Luma([0]) }
    });
    let mut bytes = Vec::new();
    image
      .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
      .expect("PNG 编码失败");
    bytes
  }

  /// 在 100x100 画布上以 (x1, y1, x2, y2) 矩形为前景的条目
  pub fn item(label: &str, rect: (u32, u32, u32, u32)) -> SegmentedItem {
    let mut mask = Mask::new(100, 100);
    for y in rect.1..rect.3 {
      for x in rect.0..rect.2 {
        mask.set(x, y, true);
      }
    }
    SegmentedItem {
      label: label.to_string(),
      mask,
      crop: crop_with_bright_pixels(500),
      confidence: 0.5,
    }
  }
}
