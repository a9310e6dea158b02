// 该文件是 Panshi （盘食） 项目的一部分。
// src/response.rs - 分析结果
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

use std::{collections::BTreeMap, time::Duration};

use serde::Serialize;

use crate::{analysis::FoodAnalysis, filter::FilterStats};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentedFoodItem {
  pub label: String,
  /// 保存失败时为空
  pub crop_url: Option<String>,
  pub confidence: f32,
}

/// 各阶段耗时，单位秒，保留两位小数
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Timing(BTreeMap<String, f64>);

impl Timing {
  pub fn record(&mut self, stage: &str, elapsed: Duration) {
    let seconds = (elapsed.as_secs_f64() * 100.0).round() / 100.0;
    self.0.insert(stage.to_string(), seconds);
  }

  pub fn get(&self, stage: &str) -> Option<f64> {
    self.0.get(stage).copied()
  }

  pub fn contains(&self, stage: &str) -> bool {
    self.0.contains_key(stage)
  }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalyzeResponse {
  pub analysis: FoodAnalysis,
  pub items: Vec<SegmentedFoodItem>,
  pub visualization_url: Option<String>,
  pub item_count: usize,
  pub timing: Timing,
  pub filter_stats: FilterStats,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn timing_rounds_to_hundredths() {
    let mut timing = Timing::default();
    timing.record("nms", Duration::from_millis(1234));
    timing.record("total", Duration::from_micros(4_999));
    assert_eq!(timing.get("nms"), Some(1.23));
    assert_eq!(timing.get("total"), Some(0.0));
    assert!(!timing.contains("detection"));
  }

  #[test]
  fn response_serializes_flat_timing() {
    let mut response = AnalyzeResponse::default();
    response.timing.record("total", Duration::from_millis(500));
    response.items.push(SegmentedFoodItem {
      label: "rice".into(),
      crop_url: None,
      confidence: 0.5,
    });
    response.item_count = 1;
    let value = serde_json::to_value(&response).unwrap();
    assert_eq!(value["timing"]["total"], 0.5);
    assert_eq!(value["items"][0]["crop_url"], serde_json::Value::Null);
    assert_eq!(value["filter_stats"]["gpt_quality_removed"], 0);
    assert_eq!(value["analysis"]["description"], "");
  }
}
