// 该文件是 Panshi （盘食） 项目的一部分。
// src/fanout.rs - 有界线程池并发分发
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

use std::{
  any::Any,
  panic::{self, AssertUnwindSafe},
  sync::mpsc,
};

use rayon::ThreadPoolBuilder;
use tracing::warn;

pub const DEFAULT_WORKERS: usize = 6;

/// 在 `workers` 个线程上对每个元素执行 `task`，阻塞直到全部完成。
///
/// 返回值按完成顺序收集，不保证与输入顺序一致；`task` 返回 `None` 或 panic 的元素被丢弃。
pub fn fan_out<T, R, F>(workers: usize, items: Vec<T>, task: F) -> Vec<R>
where
  T: Send,
  R: Send,
  F: Fn(T) -> Option<R> + Sync,
{
  if items.is_empty() {
    return Vec::new();
  }

  let pool = match ThreadPoolBuilder::new()
    .num_threads(workers.max(1))
    .thread_name(|i| format!("panshi-worker-{}", i))
    .build()
  {
    Ok(pool) => pool,
    Err(e) => {
      warn!("无法创建工作线程池，改为顺序执行: {}", e);
      return items
        .into_iter()
        .filter_map(|item| run_guarded(&task, item))
        .collect();
    }
  };

  let (tx, rx) = mpsc::channel();
  let task = &task;
  pool.scope(|s| {
    for item in items {
      let tx = tx.clone();
      s.spawn(move |_| {
        if let Some(result) = run_guarded(task, item) {
          // 接收端在 scope 结束前一直存活
          let _ = tx.send(result);
        }
      });
    }
  });
  drop(tx);

  rx.into_iter().collect()
}

/// 执行单个任务，panic 视为丢弃
fn run_guarded<T, R>(task: impl FnOnce(T) -> Option<R>, item: T) -> Option<R> {
  match panic::catch_unwind(AssertUnwindSafe(|| task(item))) {
    Ok(result) => result,
    Err(payload) => {
      warn!("工作任务 panic，丢弃该项: {}", panic_message(payload.as_ref()));
      None
    }
  }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
  if let Some(message) = payload.downcast_ref::<&str>() {
    message
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message
  } else {
    "未知错误"
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::{
    collections::HashSet,
    sync::atomic::{AtomicUsize, Ordering},
    thread,
    time::Duration,
  };

  #[test]
  fn empty_input_runs_nothing() {
    let out: Vec<u32> = fan_out(4, Vec::<u32>::new(), |x| Some(x));
    assert!(out.is_empty());
  }

  #[test]
  fn drops_none_results_and_keeps_the_rest() {
    let out = fan_out(3, (0..20).collect(), |x: u32| (x % 2 == 0).then_some(x * 10));
    let got: HashSet<_> = out.into_iter().collect();
    let want: HashSet<_> = (0..20).filter(|x| x % 2 == 0).map(|x| x * 10).collect();
    assert_eq!(got, want);
  }

  #[test]
  fn never_exceeds_worker_cap() {
    let active = AtomicUsize::new(0);
    let peak = AtomicUsize::new(0);
    let out = fan_out(2, (0..8).collect(), |x: u32| {
      let now = active.fetch_add(1, Ordering::SeqCst) + 1;
      peak.fetch_max(now, Ordering::SeqCst);
      thread::sleep(Duration::from_millis(10));
      active.fetch_sub(1, Ordering::SeqCst);
      Some(x)
    });
    assert_eq!(out.len(), 8);
    assert!(peak.load(Ordering::SeqCst) <= 2);
  }

  #[test]
  fn panicking_task_is_dropped() {
    let out = fan_out(3, (0..6).collect(), |x: u32| {
      if x == 4 {
        panic!("任务 {} 失败", x);
      }
      Some(x)
    });
    let got: HashSet<_> = out.into_iter().collect();
    assert_eq!(got, HashSet::from([0, 1, 2, 3, 5]));
  }

  fn payload_of(f: fn()) -> Box<dyn Any + Send> {
    panic::catch_unwind(f).unwrap_err()
  }

  #[test]
  fn panic_message_reads_both_payload_kinds() {
    assert_eq!(panic_message(payload_of(|| panic!("静态")).as_ref()), "静态");
    assert_eq!(
      panic_message(payload_of(|| panic!("格式化 {}", 1)).as_ref()),
      "格式化 1"
    );
  }
}
