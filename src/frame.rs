// 该文件是 Panshi （盘食） 项目的一部分。
// src/frame.rs - RGB 帧：解码、缩放、裁剪与编码
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

use base64::{Engine, engine::general_purpose::STANDARD};
use image::{
  ImageError, Rgb, RgbImage,
  codecs::jpeg::JpegEncoder,
  imageops::{self, FilterType},
};
use thiserror::Error;
use tracing::debug;

use crate::geometry::{BBox, Mask, PixelBox};

pub const DEFAULT_JPEG_QUALITY: u8 = 85;
const EMPTY_CROP_SIZE: u32 = 64;

#[derive(Error, Debug)]
pub enum FrameError {
  #[error("输入图像为空")]
  Empty,
  #[error("图像解码失败: {0}")]
  Decode(#[source] ImageError),
  #[error("图像编码失败: {0}")]
  Encode(#[source] ImageError),
}

/// 一次请求中只读共享的原始图像
#[derive(Debug, Clone)]
pub struct Frame {
  image: RgbImage,
}

impl From<RgbImage> for Frame {
  fn from(image: RgbImage) -> Self {
    Self { image }
  }
}

impl Frame {
  pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
    if bytes.is_empty() {
      return Err(FrameError::Empty);
    }
    let image = image::load_from_memory(bytes).map_err(FrameError::Decode)?;
    Ok(Self {
      image: image.to_rgb8(),
    })
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  pub fn into_image(self) -> RgbImage {
    self.image
  }

  /// 最长边超过 `max_dim` 时等比缩小；返回帧以及是否发生了缩放
  pub fn fit_within(self, max_dim: u32) -> (Self, bool) {
    let (w, h) = self.image.dimensions();
    let longest = w.max(h);
    if longest <= max_dim || max_dim == 0 {
      return (self, false);
    }
    let scale = max_dim as f64 / longest as f64;
    let nw = ((w as f64 * scale).round() as u32).max(1);
    let nh = ((h as f64 * scale).round() as u32).max(1);
    debug!("缩放输入图像: {}x{} -> {}x{}", w, h, nw, nh);
    let image = imageops::resize(&self.image, nw, nh, FilterType::Lanczos3);
    (Self { image }, true)
  }

  /// 裁剪检测框区域；坐标向零截断并限制在图像范围内，区域为空时返回 None
  pub fn crop_box(&self, bbox: &BBox) -> Option<(RgbImage, PixelBox)> {
    let (w, h) = (self.width() as i64, self.height() as i64);
    let x1 = (bbox.x1 as i64).max(0);
    let y1 = (bbox.y1 as i64).max(0);
    let x2 = (bbox.x2 as i64).min(w);
    let y2 = (bbox.y2 as i64).min(h);
    if x2 <= x1 || y2 <= y1 {
      return None;
    }
    let pixel_box = PixelBox::new(x1 as u32, y1 as u32, x2 as u32, y2 as u32);
    let crop = imageops::crop_imm(
      &self.image,
      pixel_box.x1,
      pixel_box.y1,
      pixel_box.width(),
      pixel_box.height(),
    )
    .to_image();
    Some((crop, pixel_box))
  }

  /// 黑色背景上的前景像素，裁剪到掩码外接框。
  /// 掩码尺寸与帧不一致时先做最近邻重采样；空掩码得到 64x64 的黑图。
  pub fn masked_crop(&self, mask: &Mask) -> RgbImage {
    let resized;
    let mask = if mask.dimensions() != self.image.dimensions() {
      match mask.resize(self.width(), self.height()) {
        Ok(m) => {
          resized = m;
          &resized
        }
        Err(_) => return RgbImage::new(EMPTY_CROP_SIZE, EMPTY_CROP_SIZE),
      }
    } else {
      mask
    };

    let bbox = mask.bbox();
    if bbox.is_empty() {
      return RgbImage::new(EMPTY_CROP_SIZE, EMPTY_CROP_SIZE);
    }

    RgbImage::from_fn(bbox.width(), bbox.height(), |x, y| {
      let (sx, sy) = (bbox.x1 + x, bbox.y1 + y);
      if mask.get(sx, sy) {
        *self.image.get_pixel(sx, sy)
      } else {
        Rgb([0, 0, 0])
      }
    })
  }

  pub fn to_jpeg(&self, quality: u8) -> Result<Vec<u8>, FrameError> {
    encode_jpeg(&self.image, quality)
  }
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, FrameError> {
  let mut buf = Vec::new();
  let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
  image
    .write_with_encoder(encoder)
    .map_err(FrameError::Encode)?;
  Ok(buf)
}

/// `data:image/jpeg;base64,...`
pub fn to_data_uri(bytes: &[u8]) -> String {
  format!("data:image/jpeg;base64,{}", STANDARD.encode(bytes))
}
