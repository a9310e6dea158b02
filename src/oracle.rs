// 该文件是 Panshi （盘食） 项目的一部分。
// src/oracle.rs - 外部判定服务（视觉语言、检测、分割）接口
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

use thiserror::Error;

use crate::{frame::FrameError, geometry::Mask, nms::DetectedBox};

#[derive(Error, Debug)]
pub enum OracleError {
  #[cfg(any(feature = "openai", feature = "replicate"))]
  #[error("HTTP 请求失败: {0}")]
  Http(#[from] reqwest::Error),
  #[error("服务返回错误状态 {status}: {body}")]
  Status { status: u16, body: String },
  #[error("响应格式错误: {0}")]
  Malformed(String),
  #[error("预测失败: {0}")]
  PredictionFailed(String),
  #[error("预测超时: {0}")]
  Timeout(String),
  #[error("掩码解码失败: {0}")]
  MaskDecode(#[from] image::ImageError),
  #[error("帧错误: {0}")]
  Frame(#[from] FrameError),
  #[error("服务不可用: {0}")]
  Unavailable(String),
}

/// 包含关系裁决：保留哪一个标签
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainmentVerdict {
  KeepInner,
  KeepOuter,
  /// 回答无法对应任何一个标签
  Ambiguous,
}

/// 视觉语言模型。所有调用都可能失败，重复调用不保证结果一致。
pub trait VisionOracle: Send + Sync {
  /// 整张图像的结构化分析文本
  fn analyze(&self, image: &[u8]) -> Result<String, OracleError>;

  /// 裁剪图是否为描述中的某个菜品；是则返回名称，否则返回 None
  fn confirm(&self, crop: &[u8], description: &str) -> Result<Option<String>, OracleError>;

  /// 裁剪图是否清楚地呈现了 `label`
  fn check_quality(&self, crop: &[u8], label: &str) -> Result<bool, OracleError>;

  /// `inner_label` 位于 `outer_label` 之内时，哪一个更值得单独展示
  fn resolve_containment(
    &self,
    inner_label: &str,
    outer_label: &str,
  ) -> Result<ContainmentVerdict, OracleError>;
}

/// 开放词表检测参数
#[derive(Debug, Clone)]
pub struct DetectionRequest<'a> {
  pub class_names: &'a [String],
  pub score_threshold: f32,
  pub nms_threshold: f32,
  pub max_boxes: u32,
}

pub trait DetectionOracle: Send + Sync {
  /// 没有检测结果时返回空列表，不视为错误
  fn detect(
    &self,
    image: &[u8],
    request: &DetectionRequest<'_>,
  ) -> Result<Vec<DetectedBox>, OracleError>;
}

pub trait SegmentationOracle: Send + Sync {
  /// 以文本提示分割图像，返回与输入同坐标系的掩码
  fn segment(&self, image: &[u8], prompt: &str) -> Result<Mask, OracleError>;
}

/// 将模型的自由文本回答对应到内外两个标签之一，先匹配内层
pub fn match_containment_answer(
  answer: &str,
  inner_label: &str,
  outer_label: &str,
) -> ContainmentVerdict {
  let answer = answer
    .trim()
    .trim_matches(|c| c == '\'' || c == '"')
    .to_lowercase();
  let inner = inner_label.trim().to_lowercase();
  let outer = outer_label.trim().to_lowercase();
  if !inner.is_empty() && answer.contains(&inner) {
    ContainmentVerdict::KeepInner
  } else if !outer.is_empty() && answer.contains(&outer) {
    ContainmentVerdict::KeepOuter
  } else {
    ContainmentVerdict::Ambiguous
  }
}

/// 确认回答：`none`（不区分大小写）或空白表示否定
pub fn parse_confirmation(answer: &str) -> Option<String> {
  let answer = answer.trim();
  if answer.is_empty() || answer.eq_ignore_ascii_case("none") {
    None
  } else {
    Some(answer.to_string())
  }
}

/// 质量检查回答中出现 `yes` 即为通过
pub fn parse_quality_answer(answer: &str) -> bool {
  answer.trim().to_lowercase().contains("yes")
}

#[cfg(feature = "openai")]
mod openai;
#[cfg(feature = "openai")]
pub use self::openai::OpenAiVision;

#[cfg(feature = "replicate")]
mod replicate;
#[cfg(feature = "replicate")]
pub use self::replicate::{
  ReplicateClient, ReplicateDetector, ReplicateSegmenter, mask_from_image_bytes, parse_detections,
};

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn containment_answer_prefers_inner() {
    assert_eq!(
      match_containment_answer("'Egg'", "egg", "fried rice"),
      ContainmentVerdict::KeepInner
    );
    assert_eq!(
      match_containment_answer("Keep \"fried rice\".", "egg", "Fried Rice"),
      ContainmentVerdict::KeepOuter
    );
    assert_eq!(
      match_containment_answer("neither", "egg", "fried rice"),
      ContainmentVerdict::Ambiguous
    );
  }

  #[test]
  fn confirmation_none_is_negative() {
    assert_eq!(parse_confirmation(" None "), None);
    assert_eq!(parse_confirmation("NONE"), None);
    assert_eq!(parse_confirmation(""), None);
    assert_eq!(parse_confirmation(" Dal makhani\n"), Some("Dal makhani".into()));
  }

  #[test]
  fn quality_answer_contains_yes() {
    assert!(parse_quality_answer("Yes."));
    assert!(!parse_quality_answer("No"));
  }
}
