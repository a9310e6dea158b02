// 该文件是 Panshi （盘食） 项目的一部分。
// src/nms.rs - 跨类别非极大值抑制
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
use tracing::debug;

use crate::geometry::{BBox, GeometryError, iou};

pub const DEFAULT_IOU_THRESHOLD: f32 = 0.5;

/// 检测器返回的一个候选框
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedBox {
  pub bbox: BBox,
  pub label: String,
  pub confidence: f32,
}

/// 通过抑制后保留下来的候选框
pub type SurvivingBox = DetectedBox;

impl DetectedBox {
  pub fn new(bbox: impl Into<BBox>, label: impl Into<String>, confidence: f32) -> Self {
    Self {
      bbox: bbox.into(),
      label: label.into(),
      confidence,
    }
  }
}

/// 按置信度降序贪心抑制，不区分类别。
///
/// 与任一已保留框 IoU 超过 `iou_threshold` 的框被丢弃；输出按置信度降序，
/// 置信度相同时保持输入顺序。
pub fn cross_class_nms(
  boxes: &[DetectedBox],
  iou_threshold: f32,
) -> Result<Vec<SurvivingBox>, GeometryError> {
  if !iou_threshold.is_finite() {
    return Err(GeometryError::InvalidThreshold(iou_threshold));
  }
  for b in boxes {
    if !b.bbox.is_finite() {
      return Err(GeometryError::NonFiniteBox(b.bbox.to_array()));
    }
    if !b.confidence.is_finite() {
      return Err(GeometryError::NonFiniteScore(b.confidence));
    }
  }

  let mut sorted: Vec<&DetectedBox> = boxes.iter().collect();
  // sort_by 是稳定排序
  sorted.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

  let mut kept: Vec<SurvivingBox> = Vec::with_capacity(sorted.len());
  for candidate in sorted {
    let suppressor = kept
      .iter()
      .find(|k| iou(&candidate.bbox, &k.bbox) > iou_threshold);
    match suppressor {
      Some(k) => debug!(
        "抑制 {} ({:.2})，与 {} ({:.2}) 重叠",
        candidate.label, candidate.confidence, k.label, k.confidence
      ),
      None => kept.push(candidate.clone()),
    }
  }

  Ok(kept)
}
