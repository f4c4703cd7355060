// 该文件是 Lookout （瞭望） 项目的一部分。
// src/model.rs - 检测模型
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

use std::future::Future;

use serde::Deserialize;

/// 检测器：将一帧图像异步映射为一组检测结果
///
/// 单次调用耗时不受限制，调用方负责保证同一时刻只有一个推理在进行。
pub trait Detector<Frame> {
  type Error: std::error::Error + 'static;

  fn detect(&self, frame: &Frame) -> impl Future<Output = Result<DetectResult, Self::Error>>;
}

/// 检测器加载器，加载过程可能耗时数秒
pub trait DetectorLoader {
  type Detector;
  type Error: std::error::Error + 'static;

  fn load(&self) -> impl Future<Output = Result<Self::Detector, Self::Error>>;
}

/// 帧像素坐标下的轴对齐矩形
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(from = "[f32; 4]")]
pub struct BBox {
  pub x_min: f32,
  pub y_min: f32,
  pub x_max: f32,
  pub y_max: f32,
}

impl From<[f32; 4]> for BBox {
  fn from([x_min, y_min, x_max, y_max]: [f32; 4]) -> Self {
    Self {
      x_min,
      y_min,
      x_max,
      y_max,
    }
  }
}

impl BBox {
  pub fn new(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
    Self {
      x_min,
      y_min,
      x_max,
      y_max,
    }
  }

  pub fn width(&self) -> f32 {
    (self.x_max - self.x_min).max(0.0)
  }

  pub fn height(&self) -> f32 {
    (self.y_max - self.y_min).max(0.0)
  }

  pub fn is_empty(&self) -> bool {
    self.width() <= 0.0 || self.height() <= 0.0
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Detection {
  pub label: String,
  pub score: f32,
  pub bbox: BBox,
}

impl Detection {
  pub fn new(label: impl Into<String>, score: f32, bbox: BBox) -> Self {
    Self {
      label: label.into(),
      score,
      bbox,
    }
  }

  /// 标签文本，例如 `person 87%`
  pub fn caption(&self) -> String {
    let percent = (self.score.clamp(0.0, 1.0) * 100.0).round() as u32;
    format!("{} {}%", self.label, percent)
  }
}

/// 单帧检测结果，保持检测器给出的顺序
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectResult {
  pub items: Box<[Detection]>,
}

impl From<Vec<Detection>> for DetectResult {
  fn from(items: Vec<Detection>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

impl DetectResult {
  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &Detection> {
    self.items.iter()
  }

  /// 丢弃置信度低于阈值的检测，其余保持原顺序
  pub fn retain_confident(self, min_confidence: f32) -> Self {
    if min_confidence <= 0.0 {
      return self;
    }
    self
      .items
      .into_vec()
      .into_iter()
      .filter(|item| item.score >= min_confidence)
      .collect::<Vec<_>>()
      .into()
  }
}

mod replay;
pub use self::replay::{ReplayDetector, ReplayDetectorLoader, ReplayError};
