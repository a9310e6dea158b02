// 该文件是 Panshi （盘食） 项目的一部分。
// src/filter/duplicate.rs - 同名去重
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

use std::collections::HashMap;

use tracing::info;

use crate::{filter::normalize_label, stage::SegmentedItem};

/// 同名（规范化后）的条目只保留掩码面积最大的一个，面积相同取先出现的。
///
/// 输出按各名称首次出现的顺序排列。
pub fn filter_duplicates(items: Vec<SegmentedItem>) -> (Vec<SegmentedItem>, usize) {
  let before = items.len();
  let mut slots: HashMap<String, usize> = HashMap::new();
  let mut kept: Vec<(usize, SegmentedItem)> = Vec::new();

  for item in items {
    let count = item.mask.count();
    let key = normalize_label(&item.label);
    match slots.get(&key).copied() {
      Some(slot) => {
        if count > kept[slot].0 {
          kept[slot] = (count, item);
        }
      }
      None => {
        slots.insert(key, kept.len());
        kept.push((count, item));
      }
    }
  }

  let kept: Vec<_> = kept.into_iter().map(|(_, item)| item).collect();
  let removed = before - kept.len();
  if removed > 0 {
    info!("同名去重移除 {} 项", removed);
  }
  (kept, removed)
}
