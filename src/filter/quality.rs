// 该文件是 Panshi （盘食） 项目的一部分。
// src/filter/quality.rs - 裁剪图质量检查
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

use std::panic::{self, AssertUnwindSafe};

use tracing::{info, warn};

use crate::{
  fanout::{fan_out, panic_message},
  oracle::VisionOracle,
  stage::SegmentedItem,
};

/// 并发询问裁剪图是否清楚呈现其名称；调用失败或 panic 的项保留
pub fn filter_quality(
  items: Vec<SegmentedItem>,
  oracle: &dyn VisionOracle,
  workers: usize,
) -> (Vec<SegmentedItem>, usize) {
  let before = items.len();
  let kept = fan_out(workers, items, |item| {
    let verdict = panic::catch_unwind(AssertUnwindSafe(|| {
      oracle.check_quality(&item.crop, &item.label)
    }));
    match verdict {
      Ok(Ok(true)) => Some(item),
      Ok(Ok(false)) => {
        info!("质量检查未通过: {}", item.label);
        None
      }
      Ok(Err(e)) => {
        warn!("{} 的质量检查失败，保留: {}", item.label, e);
        Some(item)
      }
      Err(payload) => {
        warn!(
          "{} 的质量检查 panic，保留: {}",
          item.label,
          panic_message(payload.as_ref())
        );
        Some(item)
      }
    }
  });
  let removed = before - kept.len();
  (kept, removed)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::filter::test_support::item;
  use crate::oracle::{ContainmentVerdict, OracleError};

  struct Picky;

  impl VisionOracle for Picky {
    fn analyze(&self, _: &[u8]) -> Result<String, OracleError> {
      Ok(String::new())
    }

    fn confirm(&self, _: &[u8], _: &str) -> Result<Option<String>, OracleError> {
      Ok(None)
    }

    fn check_quality(&self, _: &[u8], label: &str) -> Result<bool, OracleError> {
      match label {
        "plate" => Ok(false),
        "flaky" => Err(OracleError::Status {
          status: 503,
          body: "busy".into(),
        }),
        "crash" => panic!("连接中断"),
        _ => Ok(true),
      }
    }

    fn resolve_containment(&self, _: &str, _: &str) -> Result<ContainmentVerdict, OracleError> {
      Ok(ContainmentVerdict::Ambiguous)
    }
  }

  #[test]
  fn rejects_no_and_keeps_failures() {
    let items = vec![
      item("rice", (0, 0, 5, 5)),
      item("plate", (0, 0, 5, 5)),
      item("flaky", (0, 0, 5, 5)),
      item("crash", (0, 0, 5, 5)),
    ];
    let (kept, removed) = filter_quality(items, &Picky, 2);
    assert_eq!(removed, 1);
    let mut labels: Vec<_> = kept.iter().map(|i| i.label.clone()).collect();
    labels.sort();
    assert_eq!(labels, ["crash", "flaky", "rice"]);
  }
}
