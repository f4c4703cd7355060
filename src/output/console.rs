// 该文件是 Lookout （瞭望） 项目的一部分。
// src/output/console.rs - 日志状态输出
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

use std::cell::{Cell, RefCell};

use tracing::{info, warn};

use crate::output::{Status, StatusSink, TriggerPanel, TriggerState};

/// 保存当前状态文本并写入日志
#[derive(Debug, Default)]
pub struct TracingStatus {
  current: RefCell<String>,
}

impl TracingStatus {
  pub fn current(&self) -> String {
    self.current.borrow().clone()
  }
}

impl StatusSink for TracingStatus {
  fn report(&self, status: &Status) {
    let text = status.to_string();
    if status.is_error() {
      warn!("状态: {}", text);
    } else {
      info!("状态: {}", text);
    }
    *self.current.borrow_mut() = text;
  }
}

#[derive(Debug)]
pub struct TracingTriggers {
  state: Cell<TriggerState>,
}

impl Default for TracingTriggers {
  fn default() -> Self {
    Self {
      state: Cell::new(TriggerState {
        start: true,
        stop: false,
      }),
    }
  }
}

impl TracingTriggers {
  pub fn state(&self) -> TriggerState {
    self.state.get()
  }
}

impl TriggerPanel for TracingTriggers {
  fn set_enabled(&self, triggers: TriggerState) {
    if self.state.replace(triggers) != triggers {
      info!(
        "触发器: start={} stop={}",
        if triggers.start { "可用" } else { "禁用" },
        if triggers.stop { "可用" } else { "禁用" }
      );
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn status_is_overwritten() {
    let sink = TracingStatus::default();
    assert_eq!(sink.current(), "");
    sink.report(&Status::LoadingModel);
    sink.report(&Status::NoObjects);
    assert_eq!(sink.current(), Status::NoObjects.to_string());
  }

  #[test]
  fn triggers_start_idle() {
    let triggers = TracingTriggers::default();
    assert!(triggers.state().start);
    assert!(!triggers.state().stop);

    let running = TriggerState {
      start: false,
      stop: true,
    };
    triggers.set_enabled(running);
    assert_eq!(triggers.state(), running);
  }
}
