// 该文件是 Panshi （盘食） 项目的一部分。
// src/geometry.rs - 几何内核：检测框与掩码
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

use std::fmt;

use image::{
  GrayImage, Luma,
  imageops::{self, FilterType},
};
use serde::Serialize;
use thiserror::Error;

/// 灰度掩码二值化阈值（取值范围中点）
pub const MASK_LUMA_THRESHOLD: u8 = 128;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
  #[error("IoU 阈值无效: {0}")]
  InvalidThreshold(f32),
  #[error("检测框坐标无效: {0:?}")]
  NonFiniteBox([f32; 4]),
  #[error("置信度无效: {0}")]
  NonFiniteScore(f32),
  #[error("掩码尺寸无效: {width}x{height}")]
  EmptyShape { width: u32, height: u32 },
  #[error("掩码数据长度不匹配: 期望 {expected}, 实际 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
}

/// 像素坐标下的浮点检测框 [x1, y1, x2, y2]
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BBox {
  pub x1: f32,
  pub y1: f32,
  pub x2: f32,
  pub y2: f32,
}

impl BBox {
  pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
    Self { x1, y1, x2, y2 }
  }

  pub fn width(&self) -> f32 {
    self.x2 - self.x1
  }

  pub fn height(&self) -> f32 {
    self.y2 - self.y1
  }

  /// 有符号面积，退化框可能为负
  pub fn area(&self) -> f32 {
    self.width() * self.height()
  }

  pub fn is_degenerate(&self) -> bool {
    !(self.x1 < self.x2 && self.y1 < self.y2)
  }

  pub fn is_finite(&self) -> bool {
    self.to_array().iter().all(|v| v.is_finite())
  }

  pub fn intersection_area(&self, other: &BBox) -> f32 {
    let x1 = self.x1.max(other.x1);
    let y1 = self.y1.max(other.y1);
    let x2 = self.x2.min(other.x2);
    let y2 = self.y2.min(other.y2);
    (x2 - x1).max(0.0) * (y2 - y1).max(0.0)
  }

  pub fn to_array(&self) -> [f32; 4] {
    [self.x1, self.y1, self.x2, self.y2]
  }
}

impl From<[f32; 4]> for BBox {
  fn from(v: [f32; 4]) -> Self {
    BBox::new(v[0], v[1], v[2], v[3])
  }
}

/// 整数像素框，右、下边界不包含在内
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PixelBox {
  pub x1: u32,
  pub y1: u32,
  pub x2: u32,
  pub y2: u32,
}

impl PixelBox {
  pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
    Self { x1, y1, x2, y2 }
  }

  pub fn width(&self) -> u32 {
    self.x2.saturating_sub(self.x1)
  }

  pub fn height(&self) -> u32 {
    self.y2.saturating_sub(self.y1)
  }

  pub fn area(&self) -> u64 {
    self.width() as u64 * self.height() as u64
  }

  pub fn is_empty(&self) -> bool {
    self.width() == 0 || self.height() == 0
  }

  pub fn to_bbox(&self) -> BBox {
    BBox::new(
      self.x1 as f32,
      self.y1 as f32,
      self.x2 as f32,
      self.y2 as f32,
    )
  }
}

/// 交并比；并集面积不大于 0 时返回 0
pub fn iou(a: &BBox, b: &BBox) -> f32 {
  let inter = a.intersection_area(b);
  let union = a.area() + b.area() - inter;
  if union <= 0.0 { 0.0 } else { inter / union }
}

/// 交集面积与两者中较小框面积之比，与参数顺序无关
pub fn containment_ratio(a: &BBox, b: &BBox) -> f32 {
  let smaller = a.area().max(0.0).min(b.area().max(0.0));
  if smaller <= 0.0 {
    return 0.0;
  }
  a.intersection_area(b) / smaller
}

/// 布尔掩码，按行优先存储
#[derive(Clone, PartialEq, Eq)]
pub struct Mask {
  width: u32,
  height: u32,
  data: Vec<bool>,
}

impl fmt::Debug for Mask {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Mask")
      .field("width", &self.width)
      .field("height", &self.height)
      .field("count", &self.count())
      .finish()
  }
}

impl Mask {
  /// 全部为 false 的掩码
  pub fn new(width: u32, height: u32) -> Self {
    Self {
      width,
      height,
      data: vec![false; width as usize * height as usize],
    }
  }

  pub fn from_vec(width: u32, height: u32, data: Vec<bool>) -> Result<Self, GeometryError> {
    let expected = width as usize * height as usize;
    if data.len() != expected {
      return Err(GeometryError::LengthMismatch {
        expected,
        actual: data.len(),
      });
    }
    Ok(Self {
      width,
      height,
      data,
    })
  }

  /// 灰度值严格大于 `threshold` 的像素为 true
  pub fn from_luma(image: &GrayImage, threshold: u8) -> Self {
    let (width, height) = image.dimensions();
    let data = image.pixels().map(|Luma([v])| *v > threshold).collect();
    Self {
      width,
      height,
      data,
    }
  }

  pub fn to_luma(&self) -> GrayImage {
    GrayImage::from_fn(self.width, self.height, |x, y| {
      if self.get(x, y) { Luma([255]) } else { Luma([0]) }
    })
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn dimensions(&self) -> (u32, u32) {
    (self.width, self.height)
  }

  fn index(&self, x: u32, y: u32) -> usize {
    y as usize * self.width as usize + x as usize
  }

  /// 越界坐标视为 false
  pub fn get(&self, x: u32, y: u32) -> bool {
    x < self.width && y < self.height && self.data[self.index(x, y)]
  }

  pub fn set(&mut self, x: u32, y: u32, value: bool) {
    if x < self.width && y < self.height {
      let idx = self.index(x, y);
      self.data[idx] = value;
    }
  }

  /// 前景像素数
  pub fn count(&self) -> usize {
    self.data.iter().filter(|v| **v).count()
  }

  pub fn is_empty(&self) -> bool {
    !self.data.iter().any(|v| *v)
  }

  /// 前景像素坐标迭代器 (x, y)
  pub fn iter_true(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
    let width = self.width.max(1) as usize;
    self
      .data
      .iter()
      .enumerate()
      .filter(|(_, v)| **v)
      .map(move |(i, _)| ((i % width) as u32, (i / width) as u32))
  }

  /// 前景紧致外接框；空掩码返回全零框
  pub fn bbox(&self) -> PixelBox {
    let mut iter = self.iter_true();
    let Some((x, y)) = iter.next() else {
      return PixelBox::default();
    };
    let (mut x1, mut y1, mut x2, mut y2) = (x, y, x, y);
    for (x, y) in iter {
      x1 = x1.min(x);
      y1 = y1.min(y);
      x2 = x2.max(x);
      y2 = y2.max(y);
    }
    PixelBox::new(x1, y1, x2 + 1, y2 + 1)
  }

  /// 前景像素坐标均值
  pub fn centroid(&self) -> Option<(f32, f32)> {
    let (mut sx, mut sy, mut n) = (0f64, 0f64, 0u64);
    for (x, y) in self.iter_true() {
      sx += x as f64;
      sy += y as f64;
      n += 1;
    }
    if n == 0 {
      return None;
    }
    Some(((sx / n as f64) as f32, (sy / n as f64) as f32))
  }

  /// 最近邻重采样到 `width`x`height`
  pub fn resize(&self, width: u32, height: u32) -> Result<Mask, GeometryError> {
    if (width, height) == self.dimensions() {
      return Ok(self.clone());
    }
    if width == 0 || height == 0 {
      return Err(GeometryError::EmptyShape { width, height });
    }
    if self.width == 0 || self.height == 0 {
      return Err(GeometryError::EmptyShape {
        width: self.width,
        height: self.height,
      });
    }
    let resized = imageops::resize(&self.to_luma(), width, height, FilterType::Nearest);
    Ok(Mask::from_luma(&resized, MASK_LUMA_THRESHOLD))
  }

  /// 将 `src` 的前景写入以 (x, y) 为左上角的区域，超出边界的部分被裁掉
  pub fn paste(&mut self, src: &Mask, x: u32, y: u32) {
    for (sx, sy) in src.iter_true() {
      let (Some(tx), Some(ty)) = (x.checked_add(sx), y.checked_add(sy)) else {
        continue;
      };
      self.set(tx, ty, true);
    }
  }
}

/// 掩码的紧致外接框
pub fn bbox_from_mask(mask: &Mask) -> PixelBox {
  mask.bbox()
}

/// 最近邻重采样，参数顺序为 (高, 宽)
pub fn resize_mask(mask: &Mask, target_h: u32, target_w: u32) -> Result<Mask, GeometryError> {
  mask.resize(target_w, target_h)
}

#[cfg(test)]
mod tests {
  use super::*;
  use proptest::prelude::*;

  fn mask_from_rows(rows: &[&str]) -> Mask {
    let height = rows.len() as u32;
    let width = rows.first().map(|r| r.len()).unwrap_or(0) as u32;
    let data = rows
      .iter()
      .flat_map(|r| r.chars().map(|c| c == '#'))
      .collect();
    Mask::from_vec(width, height, data).unwrap()
  }

  #[test]
  fn iou_of_identical_boxes_is_one() {
    let a = BBox::new(10.0, 10.0, 50.0, 30.0);
    assert_eq!(iou(&a, &a), 1.0);
  }

  #[test]
  fn iou_of_disjoint_or_degenerate_boxes_is_zero() {
    let a = BBox::new(0.0, 0.0, 10.0, 10.0);
    let b = BBox::new(20.0, 20.0, 30.0, 30.0);
    assert_eq!(iou(&a, &b), 0.0);
    let p = BBox::new(5.0, 5.0, 5.0, 5.0);
    assert_eq!(iou(&p, &p), 0.0);
  }

  #[test]
  fn iou_half_overlap() {
    let a = BBox::new(0.0, 0.0, 10.0, 10.0);
    let b = BBox::new(5.0, 0.0, 15.0, 10.0);
    let v = iou(&a, &b);
    assert!((v - 50.0 / 150.0).abs() < 1e-6);
  }

  #[test]
  fn containment_uses_smaller_box() {
    let outer = BBox::new(0.0, 0.0, 100.0, 100.0);
    let inner = BBox::new(10.0, 10.0, 30.0, 30.0);
    assert_eq!(containment_ratio(&outer, &inner), 1.0);
    assert_eq!(containment_ratio(&inner, &outer), 1.0);

    let half = BBox::new(90.0, 0.0, 110.0, 20.0);
    assert!((containment_ratio(&outer, &half) - 0.5).abs() < 1e-6);
  }

  #[test]
  fn containment_with_empty_box_is_zero() {
    let a = BBox::new(0.0, 0.0, 10.0, 10.0);
    let empty = BBox::new(3.0, 3.0, 3.0, 8.0);
    assert_eq!(containment_ratio(&a, &empty), 0.0);
  }

  #[test]
  fn bbox_from_mask_is_tight_and_exclusive() {
    let mask = mask_from_rows(&[
      "......", //
      "..##..",
      "...#..",
      "......",
    ]);
    assert_eq!(bbox_from_mask(&mask), PixelBox::new(2, 1, 4, 3));
  }

  #[test]
  fn bbox_of_empty_mask_is_zero() {
    let mask = Mask::new(8, 8);
    assert_eq!(bbox_from_mask(&mask), PixelBox::default());
    assert!(mask.is_empty());
    assert_eq!(mask.centroid(), None);
  }

  #[test]
  fn centroid_is_mean_of_true_pixels() {
    let mask = mask_from_rows(&[
      "#...", //
      "....",
      "...#",
    ]);
    assert_eq!(mask.centroid(), Some((1.5, 1.0)));
  }

  #[test]
  fn resize_nearest_keeps_boolean_blocks() {
    let mask = mask_from_rows(&[
      "#.", //
      ".#",
    ]);
    let big = resize_mask(&mask, 4, 4).unwrap();
    assert_eq!(big.dimensions(), (4, 4));
    assert_eq!(big.count(), 8);
    assert!(big.get(0, 0) && big.get(1, 1) && big.get(3, 3));
    assert!(!big.get(3, 0));
  }

  #[test]
  fn resize_to_zero_is_rejected() {
    let mask = Mask::new(4, 4);
    assert_eq!(
      mask.resize(0, 3),
      Err(GeometryError::EmptyShape {
        width: 0,
        height: 3
      })
    );
  }

  #[test]
  fn paste_clips_outside_region() {
    let src = mask_from_rows(&["###", "###"]);
    let mut full = Mask::new(4, 4);
    full.paste(&src, 2, 3);
    assert_eq!(full.count(), 2);
    assert!(full.get(2, 3) && full.get(3, 3));

    let mut far = Mask::new(4, 4);
    far.paste(&src, 10, 10);
    assert!(far.is_empty());
  }

  #[test]
  fn from_vec_checks_length() {
    assert_eq!(
      Mask::from_vec(2, 2, vec![true; 3]),
      Err(GeometryError::LengthMismatch {
        expected: 4,
        actual: 3
      })
    );
  }

  fn arb_box() -> impl Strategy<Value = BBox> {
    (0f32..500.0, 0f32..500.0, 1f32..300.0, 1f32..300.0)
      .prop_map(|(x, y, w, h)| BBox::new(x, y, x + w, y + h))
  }

  proptest! {
    #[test]
    fn iou_is_symmetric(a in arb_box(), b in arb_box()) {
      prop_assert_eq!(iou(&a, &b), iou(&b, &a));
    }

    #[test]
    fn iou_is_bounded(a in arb_box(), b in arb_box()) {
      let v = iou(&a, &b);
      prop_assert!((0.0..=1.0 + 1e-6).contains(&v));
    }

    #[test]
    fn iou_self_is_one(a in arb_box()) {
      prop_assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn containment_is_order_independent(a in arb_box(), b in arb_box()) {
      prop_assert_eq!(containment_ratio(&a, &b), containment_ratio(&b, &a));
    }
  }
}
