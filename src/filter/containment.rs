// 该文件是 Panshi （盘食） 项目的一部分。
// src/filter/containment.rs - 包含关系裁决
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

use tracing::{debug, info, warn};

use crate::{
  filter::normalize_label,
  geometry::{BBox, bbox_from_mask, containment_ratio},
  oracle::{ContainmentVerdict, VisionOracle},
  stage::SegmentedItem,
};

/// 不同名的两项外接框包含率超过 `threshold` 时，由模型决定保留哪一个。
///
/// 每对只比较一次；已标记移除的项不再参与后续比较，移除在全部比较结束后统一执行。
/// 回答无法识别或调用失败时两项都保留。
pub fn filter_containment(
  items: Vec<SegmentedItem>,
  oracle: &dyn VisionOracle,
  threshold: f32,
) -> (Vec<SegmentedItem>, usize) {
  if items.len() < 2 {
    return (items, 0);
  }

  let boxes: Vec<BBox> = items
    .iter()
    .map(|item| bbox_from_mask(&item.mask).to_bbox())
    .collect();
  let labels: Vec<String> = items.iter().map(|item| normalize_label(&item.label)).collect();
  let mut removed = vec![false; items.len()];

  for i in 0..items.len() {
    if removed[i] {
      continue;
    }
    for j in (i + 1)..items.len() {
      if removed[j] || labels[i] == labels[j] {
        continue;
      }
      let ratio = containment_ratio(&boxes[i], &boxes[j]);
      if ratio <= threshold {
        continue;
      }

      let (inner, outer) = if boxes[i].area() < boxes[j].area() {
        (i, j)
      } else {
        (j, i)
      };
      debug!(
        "{} 位于 {} 之内 (包含率 {:.2})",
        items[inner].label, items[outer].label, ratio
      );

      match oracle.resolve_containment(&items[inner].label, &items[outer].label) {
        Ok(ContainmentVerdict::KeepInner) => removed[outer] = true,
        Ok(ContainmentVerdict::KeepOuter) => removed[inner] = true,
        Ok(ContainmentVerdict::Ambiguous) => {
          debug!("包含裁决无法识别，保留 {} 与 {}", items[inner].label, items[outer].label)
        }
        Err(e) => warn!("包含裁决失败，两项都保留: {}", e),
      }

      if removed[i] {
        break;
      }
    }
  }

  let before = items.len();
  let kept: Vec<_> = items
    .into_iter()
    .zip(removed)
    .filter_map(|(item, gone)| (!gone).then_some(item))
    .collect();
  let removed = before - kept.len();
  if removed > 0 {
    info!("包含过滤移除 {} 项", removed);
  }
  (kept, removed)
}
