// 该文件是 Panshi （盘食） 项目的一部分。
// src/config.rs - 流水线参数
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

use crate::{
  fanout::DEFAULT_WORKERS,
  filter::{
    DEFAULT_BRIGHTNESS_THRESHOLD, DEFAULT_CONTAINMENT_RATIO, DEFAULT_MIN_BRIGHT_PIXELS,
    FilterConfig,
  },
  frame::DEFAULT_JPEG_QUALITY,
  nms::DEFAULT_IOU_THRESHOLD,
};

pub const DEFAULT_MAX_DIMENSION: u32 = 2048;
pub const DEFAULT_DETECTION_SCORE_THRESHOLD: f32 = 0.05;
pub const DEFAULT_DETECTION_NMS_THRESHOLD: f32 = 0.5;
pub const DEFAULT_DETECTION_MAX_BOXES: u32 = 20;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
  /// 输入图像最长边上限，超过则等比缩小
  pub max_dimension: u32,
  pub detection_score_threshold: f32,
  /// 检测模型内部（同类）NMS 阈值
  pub detection_nms_threshold: f32,
  pub detection_max_boxes: u32,
  /// 跨类别 NMS 阈值
  pub iou_threshold: f32,
  pub workers: usize,
  pub brightness_threshold: u8,
  pub min_bright_pixels: usize,
  pub containment_ratio: f32,
  pub quality_check: bool,
  pub jpeg_quality: u8,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      max_dimension: DEFAULT_MAX_DIMENSION,
      detection_score_threshold: DEFAULT_DETECTION_SCORE_THRESHOLD,
      detection_nms_threshold: DEFAULT_DETECTION_NMS_THRESHOLD,
      detection_max_boxes: DEFAULT_DETECTION_MAX_BOXES,
      iou_threshold: DEFAULT_IOU_THRESHOLD,
      workers: DEFAULT_WORKERS,
      brightness_threshold: DEFAULT_BRIGHTNESS_THRESHOLD,
      min_bright_pixels: DEFAULT_MIN_BRIGHT_PIXELS,
      containment_ratio: DEFAULT_CONTAINMENT_RATIO,
      quality_check: true,
      jpeg_quality: DEFAULT_JPEG_QUALITY,
    }
  }
}

impl PipelineConfig {
  pub fn with_max_dimension(mut self, max_dimension: u32) -> Self {
    self.max_dimension = max_dimension;
    self
  }

  pub fn with_detection(mut self, score_threshold: f32, nms_threshold: f32, max_boxes: u32) -> Self {
    self.detection_score_threshold = score_threshold;
    self.detection_nms_threshold = nms_threshold;
    self.detection_max_boxes = max_boxes;
    self
  }

  pub fn with_iou_threshold(mut self, iou_threshold: f32) -> Self {
    self.iou_threshold = iou_threshold;
    self
  }

  pub fn with_workers(mut self, workers: usize) -> Self {
    self.workers = workers.max(1);
    self
  }

  pub fn with_brightness(mut self, threshold: u8, min_bright_pixels: usize) -> Self {
    self.brightness_threshold = threshold;
    self.min_bright_pixels = min_bright_pixels;
    self
  }

  pub fn with_containment_ratio(mut self, ratio: f32) -> Self {
    self.containment_ratio = ratio;
    self
  }

  pub fn with_quality_check(mut self, enabled: bool) -> Self {
    self.quality_check = enabled;
    self
  }

  pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
    self.jpeg_quality = quality.clamp(1, 100);
    self
  }

  pub fn filter_config(&self) -> FilterConfig {
    FilterConfig {
      brightness_threshold: self.brightness_threshold,
      min_bright_pixels: self.min_bright_pixels,
      containment_ratio: self.containment_ratio,
      quality_check: self.quality_check,
      workers: self.workers,
    }
  }
}
