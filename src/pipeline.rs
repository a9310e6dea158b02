// 该文件是 Panshi （盘食） 项目的一部分。
// src/pipeline.rs - 检测到分割的完整流水线
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

use std::{borrow::Cow, time::Instant};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
  analysis::{FoodAnalysis, parse_analysis},
  config::PipelineConfig,
  filter::FilterChain,
  frame::{Frame, FrameError, encode_jpeg},
  nms::cross_class_nms,
  oracle::{DetectionOracle, DetectionRequest, SegmentationOracle, VisionOracle},
  output::{Render, Visualizer},
  response::{AnalyzeResponse, SegmentedFoodItem, Timing},
  stage::{SegmentedItem, confirm_boxes, segment_items},
  storage::{Category, Storage},
};

const FALLBACK_ITEM_NAME: &str = "food";

/// 只有无法解码的输入会让流水线拒绝请求
#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("输入图像无效: {0}")]
  Input(#[from] FrameError),
}

/// 流水线依赖的外部服务，由调用方构造并注入
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
  pub vision: &'a dyn VisionOracle,
  pub detector: &'a dyn DetectionOracle,
  pub segmenter: &'a dyn SegmentationOracle,
  pub storage: &'a dyn Storage,
}

pub struct Pipeline<'a> {
  collaborators: Collaborators<'a>,
  config: PipelineConfig,
  visualizer: Visualizer,
}

fn finish_stage(timing: &mut Timing, stage: &str, started: Instant) {
  let elapsed = started.elapsed();
  info!("{} 完成，耗时: {:.2?}", stage, elapsed);
  timing.record(stage, elapsed);
}

impl<'a> Pipeline<'a> {
  pub fn new(collaborators: Collaborators<'a>, config: PipelineConfig) -> Self {
    Self {
      collaborators,
      config,
      visualizer: Visualizer::new(),
    }
  }

  pub fn with_visualizer(mut self, visualizer: Visualizer) -> Self {
    self.visualizer = visualizer;
    self
  }

  pub fn config(&self) -> &PipelineConfig {
    &self.config
  }

  /// 对一张图像运行完整流水线。
  ///
  /// 外部服务的失败都在各阶段内部处理，任何阶段结果为空时提前返回已有结果。
  pub fn analyze(&self, bytes: &[u8]) -> Result<AnalyzeResponse, PipelineError> {
    let total = Instant::now();
    let mut response = AnalyzeResponse::default();

    let (frame, resized) = Frame::decode(bytes)?.fit_within(self.config.max_dimension);
    let image_bytes: Cow<'_, [u8]> = if resized {
      Cow::Owned(frame.to_jpeg(self.config.jpeg_quality)?)
    } else {
      Cow::Borrowed(bytes)
    };
    info!("输入图像: {}x{}", frame.width(), frame.height());

    // 整体分析
    let started = Instant::now();
    response.analysis = self.scene_analysis(&image_bytes);
    finish_stage(&mut response.timing, "vision_analysis", started);

    let mut item_names = response.analysis.item_names();
    if item_names.is_empty() {
      item_names.push(FALLBACK_ITEM_NAME.to_string());
    }

    // 检测
    let started = Instant::now();
    let request = DetectionRequest {
      class_names: &item_names,
      score_threshold: self.config.detection_score_threshold,
      nms_threshold: self.config.detection_nms_threshold,
      max_boxes: self.config.detection_max_boxes,
    };
    let boxes = match self.collaborators.detector.detect(&image_bytes, &request) {
      Ok(boxes) => boxes,
      Err(e) => {
        warn!("检测失败，按无结果处理: {}", e);
        Vec::new()
      }
    };
    finish_stage(&mut response.timing, "detection", started);
    info!("检测到 {} 个候选框", boxes.len());
    if boxes.is_empty() {
      return Ok(Self::finish(response, total));
    }

    // 跨类别抑制
    let started = Instant::now();
    let survivors = match cross_class_nms(&boxes, self.config.iou_threshold) {
      Ok(survivors) => survivors,
      Err(e) => {
        error!("NMS 失败，使用未过滤的候选框: {}", e);
        boxes
      }
    };
    finish_stage(&mut response.timing, "nms", started);

    // 逐框确认
    let started = Instant::now();
    let confirmed = confirm_boxes(
      self.collaborators.vision,
      &frame,
      survivors,
      &response.analysis.description,
      self.config.workers,
      self.config.jpeg_quality,
    );
    finish_stage(&mut response.timing, "confirmation", started);
    info!("确认 {} 项", confirmed.len());
    if confirmed.is_empty() {
      return Ok(Self::finish(response, total));
    }

    // 分割
    let started = Instant::now();
    let segmented = segment_items(
      self.collaborators.segmenter,
      &frame,
      confirmed,
      self.config.workers,
      self.config.jpeg_quality,
    );
    finish_stage(&mut response.timing, "segmentation", started);
    if segmented.is_empty() {
      return Ok(Self::finish(response, total));
    }

    // 后处理
    let started = Instant::now();
    let chain = FilterChain::new(self.collaborators.vision, self.config.filter_config());
    let (items, stats) = chain.run(segmented);
    response.filter_stats = stats;
    finish_stage(&mut response.timing, "post_processing", started);
    if items.is_empty() {
      return Ok(Self::finish(response, total));
    }

    // 可视化与保存
    let started = Instant::now();
    response.visualization_url = self.save_visualization(&frame, &items);
    response.items = items.into_iter().map(|item| self.save_item(item)).collect();
    finish_stage(&mut response.timing, "visualization", started);

    Ok(Self::finish(response, total))
  }

  fn scene_analysis(&self, image: &[u8]) -> FoodAnalysis {
    match self.collaborators.vision.analyze(image) {
      Ok(text) => parse_analysis(&text),
      Err(e) => {
        warn!("整体分析失败，使用空结果: {}", e);
        FoodAnalysis::default()
      }
    }
  }

  fn save_visualization(&self, frame: &Frame, items: &[SegmentedItem]) -> Option<String> {
    let Ok(image) = self.visualizer.render(frame, items);
    let bytes = match encode_jpeg(&image, self.config.jpeg_quality) {
      Ok(bytes) => bytes,
      Err(e) => {
        error!("可视化图像编码失败: {}", e);
        return None;
      }
    };
    match self
      .collaborators
      .storage
      .save(&bytes, &Category::Visualization)
    {
      Ok(url) => Some(url),
      Err(e) => {
        error!("保存可视化图像失败: {}", e);
        None
      }
    }
  }

  fn save_item(&self, item: SegmentedItem) -> SegmentedFoodItem {
    let crop_url = match self
      .collaborators
      .storage
      .save(&item.crop, &Category::crop(item.label.as_str()))
    {
      Ok(url) => Some(url),
      Err(e) => {
        error!("保存 {} 的裁剪图失败: {}", item.label, e);
        None
      }
    };
    SegmentedFoodItem {
      label: item.label,
      crop_url,
      confidence: item.confidence,
    }
  }

  fn finish(mut response: AnalyzeResponse, total: Instant) -> AnalyzeResponse {
    response.item_count = response.items.len();
    finish_stage(&mut response.timing, "total", total);
    response
  }
}
