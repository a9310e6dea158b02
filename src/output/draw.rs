// 该文件是 Panshi （盘食） 项目的一部分。
// src/output/draw.rs - 分割结果可视化
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

use std::{borrow::Cow, convert::Infallible, path::Path};

use ab_glyph::{FontArc, InvalidFont, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{frame::Frame, geometry::Mask, output::Render, stage::SegmentedItem};

/// 掩码颜色，按条目序号循环使用
pub const PALETTE: [[u8; 3]; 6] = [
  [255, 99, 71],   // tomato
  [50, 205, 50],   // lime green
  [65, 105, 225],  // royal blue
  [255, 215, 0],   // gold
  [148, 103, 189], // purple
  [255, 127, 80],  // coral
];

// 内置标签字体
const EMBEDDED_FONT: &[u8] = include_bytes!("../../assets/DejaVuSans-Bold.ttf");

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_PADDING: i32 = 4;
const LABEL_RADIUS: i32 = 6;
const LABEL_MARGIN: i32 = 4;
const LABEL_BACKGROUND: [u8; 3] = [0, 0, 0];
const LABEL_TEXT: [u8; 3] = [255, 255, 255];

#[derive(Error, Debug)]
pub enum VisualizerError {
  #[error("字体文件读取失败: {0}")]
  FontIo(#[from] std::io::Error),
  #[error("字体无效: {0}")]
  InvalidFont(#[from] InvalidFont),
}

/// 掩码半透明叠加与标签绘制
pub struct Visualizer {
  font: Option<FontArc>,
  font_scale: PxScale,
}

impl Default for Visualizer {
  fn default() -> Self {
    Self::new()
  }
}

impl Visualizer {
  /// 使用内置字体绘制标签
  pub fn new() -> Self {
    match FontArc::try_from_slice(EMBEDDED_FONT) {
      Ok(font) => Self::plain().with_font(font),
      Err(e) => {
        warn!("内置字体无效，不绘制标签: {}", e);
        Self::plain()
      }
    }
  }

  /// 不带字体：只叠加掩码，不绘制标签
  pub fn plain() -> Self {
    Self {
      font: None,
      font_scale: PxScale::from(LABEL_FONT_SIZE),
    }
  }

  pub fn with_font(mut self, font: FontArc) -> Self {
    self.font = Some(font);
    self
  }

  pub fn from_font_path(path: impl AsRef<Path>) -> Result<Self, VisualizerError> {
    let data = std::fs::read(path)?;
    let font = FontArc::try_from_vec(data)?;
    Ok(Self::plain().with_font(font))
  }

  /// 尝试加载字体文件，失败时使用内置字体
  pub fn from_font_path_or_embedded(path: impl AsRef<Path>) -> Self {
    let path = path.as_ref();
    match Self::from_font_path(path) {
      Ok(visualizer) => visualizer,
      Err(e) => {
        warn!("无法加载字体 {}，改用内置字体: {}", path.display(), e);
        Self::new()
      }
    }
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  /// 先按顺序叠加全部掩码，再按顺序绘制全部标签；后绘制的会覆盖先绘制的
  pub fn compose(&self, frame: &Frame, items: &[SegmentedItem]) -> RgbImage {
    let mut image = frame.image().clone();
    let (width, height) = image.dimensions();

    let masks: Vec<Option<Cow<'_, Mask>>> = items
      .iter()
      .map(|item| fit_mask(&item.mask, width, height, &item.label))
      .collect();

    for (i, mask) in masks.iter().enumerate() {
      if let Some(mask) = mask {
        blend_mask(&mut image, mask, PALETTE[i % PALETTE.len()]);
      }
    }

    let Some(font) = &self.font else {
      return image;
    };
    for (item, mask) in items.iter().zip(&masks) {
      let Some((cx, cy)) = mask.as_ref().and_then(|m| m.centroid()) else {
        continue;
      };
      self.draw_label(&mut image, font, &capitalize(&item.label), cx as i32, cy as i32);
    }
    image
  }

  fn draw_label(&self, image: &mut RgbImage, font: &FontArc, label: &str, cx: i32, cy: i32) {
    if label.is_empty() {
      return;
    }
    let (tw, th) = text_size(self.font_scale, font, label);
    let (tw, th) = (tw as i32, th as i32);
    let tx = (cx - tw / 2).max(LABEL_MARGIN);
    let ty = (cy - th / 2).max(LABEL_MARGIN);

    draw_rounded_rect_mut(
      image,
      (tx - LABEL_PADDING, ty - LABEL_PADDING),
      (tx + tw + LABEL_PADDING, ty + th + LABEL_PADDING),
      LABEL_RADIUS,
      Rgb(LABEL_BACKGROUND),
    );
    draw_text_mut(
      image,
      Rgb(LABEL_TEXT),
      tx,
      ty,
      self.font_scale,
      font,
      label,
    );
  }
}

impl Render<Frame, [SegmentedItem]> for Visualizer {
  type Output = RgbImage;
  type Error = Infallible;

  fn render(&self, frame: &Frame, items: &[SegmentedItem]) -> Result<RgbImage, Infallible> {
    Ok(self.compose(frame, items))
  }
}

fn fit_mask<'m>(mask: &'m Mask, width: u32, height: u32, label: &str) -> Option<Cow<'m, Mask>> {
  if mask.dimensions() == (width, height) {
    return Some(Cow::Borrowed(mask));
  }
  debug!("{} 的掩码尺寸 {:?} 与图像不一致，重采样", label, mask.dimensions());
  match mask.resize(width, height) {
    Ok(resized) => Some(Cow::Owned(resized)),
    Err(e) => {
      warn!("{} 的掩码无法重采样，跳过: {}", label, e);
      None
    }
  }
}

/// 掩码为真的像素与 `color` 各取一半
pub fn blend_mask(image: &mut RgbImage, mask: &Mask, color: [u8; 3]) {
  for (x, y) in mask.iter_true() {
    if x >= image.width() || y >= image.height() {
      continue;
    }
    let pixel = image.get_pixel_mut(x, y);
    for c in 0..3 {
      pixel.0[c] = (0.5 * color[c] as f32 + 0.5 * pixel.0[c] as f32) as u8;
    }
  }
}

/// 首字母大写，其余小写
pub fn capitalize(label: &str) -> String {
  let mut chars = label.chars();
  match chars.next() {
    Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
    None => String::new(),
  }
}

/// 以 `top_left`、`bottom_right`（均包含）为角的实心圆角矩形
pub fn draw_rounded_rect_mut(
  image: &mut RgbImage,
  top_left: (i32, i32),
  bottom_right: (i32, i32),
  radius: i32,
  color: Rgb<u8>,
) {
  let (x1, y1) = top_left;
  let (x2, y2) = bottom_right;
  let (w, h) = (x2 - x1 + 1, y2 - y1 + 1);
  if w <= 0 || h <= 0 {
    return;
  }
  let r = radius.min((w - 1) / 2).min((h - 1) / 2).max(0);

  if h - 2 * r > 0 {
    draw_filled_rect_mut(
      image,
      Rect::at(x1, y1 + r).of_size(w as u32, (h - 2 * r) as u32),
      color,
    );
  }
  if w - 2 * r > 0 {
    draw_filled_rect_mut(
      image,
      Rect::at(x1 + r, y1).of_size((w - 2 * r) as u32, h as u32),
      color,
    );
  }
  if r > 0 {
    for center in [
      (x1 + r, y1 + r),
      (x2 - r, y1 + r),
      (x1 + r, y2 - r),
      (x2 - r, y2 - r),
    ] {
      draw_filled_circle_mut(image, center, r, color);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn item(label: &str, mask: Mask) -> SegmentedItem {
    SegmentedItem {
      label: label.to_string(),
      mask,
      crop: Vec::new(),
      confidence: 1.0,
    }
  }

  fn gray_frame(w: u32, h: u32) -> Frame {
    Frame::from(RgbImage::from_pixel(w, h, Rgb([100, 100, 100])))
  }

  #[test]
  fn blends_palette_colors_by_index() {
    let frame = gray_frame(10, 10);
    let mut first = Mask::new(10, 10);
    first.set(1, 1, true);
    let mut second = Mask::new(10, 10);
    second.set(5, 5, true);

    let image = Visualizer::plain().compose(&frame, &[item("a", first), item("b", second)]);
    assert_eq!(image.get_pixel(1, 1), &Rgb([177, 99, 85]));
    assert_eq!(image.get_pixel(5, 5), &Rgb([75, 152, 75]));
    assert_eq!(image.get_pixel(0, 0), &Rgb([100, 100, 100]));
  }

  #[test]
  fn later_items_blend_over_earlier_ones() {
    let frame = gray_frame(4, 4);
    let mut mask = Mask::new(4, 4);
    mask.set(2, 2, true);
    let image = Visualizer::plain().compose(&frame, &[item("a", mask.clone()), item("b", mask)]);
    // (177, 99, 85) 再与 (50, 205, 50) 混合
    assert_eq!(image.get_pixel(2, 2), &Rgb([113, 152, 67]));
  }

  #[test]
  fn palette_wraps_after_six_items() {
    let frame = gray_frame(8, 1);
    let items: Vec<_> = (0..7)
      .map(|i| {
        let mut mask = Mask::new(8, 1);
        mask.set(i, 0, true);
        item("x", mask)
      })
      .collect();
    let image = Visualizer::plain().compose(&frame, &items);
    assert_eq!(image.get_pixel(6, 0), image.get_pixel(0, 0));
    assert_ne!(image.get_pixel(5, 0), image.get_pixel(0, 0));
  }

  #[test]
  fn mismatched_mask_is_resized_to_frame() {
    let frame = gray_frame(8, 8);
    let mut small = Mask::new(2, 2);
    small.set(1, 1, true);
    let image = Visualizer::plain().compose(&frame, &[item("a", small)]);
    assert_eq!(image.get_pixel(7, 7), &Rgb([177, 99, 85]));
    assert_eq!(image.get_pixel(4, 4), &Rgb([177, 99, 85]));
    assert_eq!(image.get_pixel(3, 3), &Rgb([100, 100, 100]));
  }

  #[test]
  fn render_keeps_frame_dimensions() {
    let frame = gray_frame(30, 20);
    let items: Vec<SegmentedItem> = Vec::new();
    let image = Visualizer::default()
      .render(&frame, items.as_slice())
      .unwrap();
    assert_eq!(image.dimensions(), (30, 20));
  }

  #[test]
  fn capitalize_matches_title_case_of_first_letter() {
    assert_eq!(capitalize("fried RICE"), "Fried rice");
    assert_eq!(capitalize(""), "");
    assert_eq!(capitalize("éclair"), "Éclair");
  }

  #[test]
  fn rounded_rect_leaves_corners_open() {
    let mut image = RgbImage::new(40, 30);
    draw_rounded_rect_mut(&mut image, (5, 5), (30, 20), 6, Rgb([9, 9, 9]));
    assert_eq!(image.get_pixel(5, 5), &Rgb([0, 0, 0]));
    assert_eq!(image.get_pixel(30, 20), &Rgb([0, 0, 0]));
    assert_eq!(image.get_pixel(17, 12), &Rgb([9, 9, 9]));
    assert_eq!(image.get_pixel(5, 12), &Rgb([9, 9, 9]));
    assert_eq!(image.get_pixel(17, 5), &Rgb([9, 9, 9]));
    assert_eq!(image.get_pixel(4, 12), &Rgb([0, 0, 0]));
  }

  #[test]
  fn font_loading_reports_errors() {
    assert!(matches!(
      Visualizer::from_font_path("/nonexistent/font.ttf"),
      Err(VisualizerError::FontIo(_))
    ));
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.ttf");
    std::fs::write(&path, b"not a font").unwrap();
    assert!(matches!(
      Visualizer::from_font_path(&path),
      Err(VisualizerError::InvalidFont(_))
    ));
    assert!(Visualizer::from_font_path_or_embedded(&path).has_font());
    assert!(!Visualizer::plain().has_font());
  }

  #[test]
  fn default_visualizer_draws_badge_at_mask_centroid() {
    let frame = gray_frame(100, 100);
    let mut mask = Mask::new(100, 100);
    for y in 30..70 {
      for x in 30..70 {
        mask.set(x, y, true);
      }
    }
    let visualizer = Visualizer::new();
    assert!(visualizer.has_font());
    let image = visualizer.compose(&frame, &[item("rice", mask)]);

    let mut badge = 0;
    let mut text = 0;
    for (x, y, pixel) in image.enumerate_pixels() {
      let near_centroid = (20..80).contains(&x) && (35..65).contains(&y);
      if pixel.0 == LABEL_BACKGROUND {
        assert!(near_centroid, "badge pixel at ({}, {})", x, y);
        badge += 1;
      }
      if pixel.0.iter().all(|&c| c > 200) {
        assert!(near_centroid, "text pixel at ({}, {})", x, y);
        text += 1;
      }
    }
    assert!(badge > 0);
    assert!(text > 0);
    // 掩码边缘仍是叠加色
    assert_eq!(image.get_pixel(31, 31), &Rgb([177, 99, 85]));
  }
}
