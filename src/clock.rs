// 该文件是 Lookout （瞭望） 项目的一部分。
// src/clock.rs - 显示刷新节拍
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

use std::{future::Future, time::Duration};

use tokio::{
  sync::Mutex,
  time::{Interval, MissedTickBehavior},
};
use tracing::warn;

use crate::output::DirectoryPresenter;

const DEFAULT_FPS: f64 = 60.0;

/// 显示刷新节拍，每一步检测都对齐到下一个节拍
pub trait FrameClock {
  fn next_tick(&self) -> impl Future<Output = ()>;
}

/// 固定频率的刷新节拍，推理过慢时跳过错过的节拍
pub struct IntervalClock {
  period: Duration,
  interval: Mutex<Option<Interval>>,
}

impl Default for IntervalClock {
  fn default() -> Self {
    Self::with_fps(DEFAULT_FPS)
  }
}

impl IntervalClock {
  pub fn with_fps(fps: f64) -> Self {
    let fps = if fps.is_finite() && fps > 0.0 {
      fps
    } else {
      warn!("无效的刷新率 {}, 使用 {}", fps, DEFAULT_FPS);
      DEFAULT_FPS
    };

    Self {
      period: Duration::from_secs_f64(1.0 / fps),
      interval: Mutex::new(None),
    }
  }

  pub fn period(&self) -> Duration {
    self.period
  }
}

impl FrameClock for IntervalClock {
  async fn next_tick(&self) {
    let mut interval = self.interval.lock().await;
    // 首次使用时才创建，需要在 tokio 运行时内
    let interval = interval.get_or_insert_with(|| {
      let mut interval = tokio::time::interval(self.period);
      interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
      interval
    });
    interval.tick().await;
  }
}

/// 按配置选择的刷新节拍
pub enum ClockWrapper {
  Interval(IntervalClock),
  Present(DirectoryPresenter),
}

impl FrameClock for ClockWrapper {
  async fn next_tick(&self) {
    match self {
      ClockWrapper::Interval(clock) => clock.next_tick().await,
      ClockWrapper::Present(presenter) => presenter.next_tick().await,
    }
  }
}
