// 该文件是 Panshi （盘食） 项目的一部分。
// src/stage/confirm.rs - 检测框确认
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
  nms::SurvivingBox,
  oracle::VisionOracle,
  stage::ConfirmedItem,
};

fn confirm_one(
  oracle: &dyn VisionOracle,
  frame: &Frame,
  candidate: SurvivingBox,
  description: &str,
  jpeg_quality: u8,
) -> Option<ConfirmedItem> {
  let Some((crop, bbox)) = frame.crop_box(&candidate.bbox) else {
    debug!("检测框 {} 裁剪后为空: {:?}", candidate.label, candidate.bbox);
    return None;
  };
  let crop = match encode_jpeg(&crop, jpeg_quality) {
    Ok(bytes) => bytes,
    Err(e) => {
      warn!("检测框 {} 裁剪图编码失败: {}", candidate.label, e);
      return None;
    }
  };

  match oracle.confirm(&crop, description) {
    Ok(Some(label)) if !label.trim().is_empty() => {
      debug!("确认 {} -> {}", candidate.label, label);
      Some(ConfirmedItem {
        crop,
        label: label.trim().to_string(),
        bbox,
        confidence: candidate.confidence,
      })
    }
    Ok(_) => {
      debug!("模型否认检测框 {}", candidate.label);
      None
    }
    Err(e) => {
      warn!("确认检测框 {} 失败: {}", candidate.label, e);
      None
    }
  }
}

/// 逐框询问视觉模型；否认、调用失败或裁剪为空的框被丢弃，不重试。
///
/// 输出顺序为完成顺序。
pub fn confirm_boxes(
  oracle: &dyn VisionOracle,
  frame: &Frame,
  boxes: Vec<SurvivingBox>,
  description: &str,
  workers: usize,
  jpeg_quality: u8,
) -> Vec<ConfirmedItem> {
  fan_out(workers, boxes, |candidate| {
    confirm_one(oracle, frame, candidate, description, jpeg_quality)
  })
}
