// 该文件是 Panshi （盘食） 项目的一部分。
// src/analysis.rs - 菜品整体分析文本解析
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

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static SECTION_HEADER: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^\d+\.\s\*\*.*?\*\*:\s*(.*)$").expect("正则表达式无效"));
static SECTION_BOUNDARY: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^\d+\.").expect("正则表达式无效"));
static ITEM_BULLET: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^[-*\d.)\s]+").expect("正则表达式无效"));

/// 视觉模型给出的整体分析，按编号顺序对应 15 个字段
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FoodAnalysis {
  pub description: String,
  pub items: String,
  pub calories: String,
  pub total_calories: String,
  pub health_score: String,
  pub rationale: String,
  pub macronutrient_estimate: String,
  pub eat_frequency: String,
  pub ideal_comparison: String,
  pub mood_impact: String,
  pub satiety_score: String,
  pub bloat_score: String,
  pub tasty_score: String,
  pub addiction_score: String,
  pub summary: String,
}

impl FoodAnalysis {
  fn from_sections(sections: Vec<String>) -> Self {
    let mut it = sections.into_iter();
    let mut next = || it.next().unwrap_or_default();
    Self {
      description: next(),
      items: next(),
      calories: next(),
      total_calories: next(),
      health_score: next(),
      rationale: next(),
      macronutrient_estimate: next(),
      eat_frequency: next(),
      ideal_comparison: next(),
      mood_impact: next(),
      satiety_score: next(),
      bloat_score: next(),
      tasty_score: next(),
      addiction_score: next(),
      summary: next(),
    }
  }

  /// 条目字段中的菜品名称
  pub fn item_names(&self) -> Vec<String> {
    extract_item_names(&self.items)
  }
}

/// 解析 `N. **标题**: 内容` 格式的编号段落。
///
/// 段落从标题行开始，到下一个以 `N.` 开头的行为止；字段按出现顺序填充，缺失的为空。
pub fn parse_analysis(text: &str) -> FoodAnalysis {
  let mut sections: Vec<String> = Vec::new();
  let mut current: Option<String> = None;

  for line in text.lines() {
    if SECTION_BOUNDARY.is_match(line) {
      if let Some(body) = current.take() {
        sections.push(body.trim().to_string());
      }
      if let Some(caps) = SECTION_HEADER.captures(line) {
        current = Some(caps[1].to_string());
      }
    } else if let Some(body) = current.as_mut() {
      body.push('\n');
      body.push_str(line);
    }
  }
  if let Some(body) = current {
    sections.push(body.trim().to_string());
  }

  FoodAnalysis::from_sections(sections)
}

/// 每行一个名称，去掉行首的列表符号与编号；逐行为空时退回逗号分隔
pub fn extract_item_names(items_text: &str) -> Vec<String> {
  let names: Vec<String> = items_text
    .trim()
    .lines()
    .map(|line| ITEM_BULLET.replace(line, "").trim().to_string())
    .filter(|name| !name.is_empty())
    .collect();

  if names.is_empty() && !items_text.trim().is_empty() {
    return items_text
      .split(',')
      .map(str::trim)
      .filter(|s| !s.is_empty())
      .map(str::to_string)
      .collect();
  }
  names
}
