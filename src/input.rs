// 该文件是 Lookout （瞭望） 项目的一部分。
// src/input.rs - 摄像头/帧源输入
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

use std::{future::Future, sync::Arc};

use image::RgbImage;

/// 帧数据
#[derive(Debug, Clone)]
pub struct Frame {
  /// RGB 图像数据
  pub image: Arc<RgbImage>,
  /// 帧索引
  pub index: u64,
  /// 时间戳（毫秒）
  pub timestamp_ms: u64,
}

/// 摄像头朝向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacingMode {
  /// 后置摄像头
  Environment,
  /// 前置摄像头
  User,
  /// 任意摄像头
  Any,
}

/// 摄像头请求参数，分辨率为期望值，环境可以降低
#[derive(Debug, Clone, PartialEq)]
pub struct CameraRequest {
  pub facing: FacingMode,
  /// 期望朝向不可用时是否退回任意摄像头
  pub fallback_to_any: bool,
  pub ideal_width: u32,
  pub ideal_height: u32,
}

impl Default for CameraRequest {
  fn default() -> Self {
    Self {
      facing: FacingMode::Environment,
      fallback_to_any: true,
      ideal_width: 1280,
      ideal_height: 720,
    }
  }
}

impl CameraRequest {
  pub fn with_facing(&self, facing: FacingMode) -> Self {
    Self {
      facing,
      ..self.clone()
    }
  }
}

/// 帧源，持有对摄像头设备的独占占用
pub trait FrameSource {
  type Frame;
  type Error: std::error::Error + 'static;

  /// 等待第一帧可解码
  fn ready(&mut self) -> impl Future<Output = Result<(), Self::Error>>;

  /// 当前可解码的帧；帧源失去信号时返回 `None`
  fn current_frame(&self) -> Option<Self::Frame>;

  /// 最近一次 `current_frame` 交出的帧的像素尺寸 (宽, 高)
  fn dimensions(&self) -> (u32, u32);

  /// 释放设备占用
  fn release(self);
}

/// 向环境申请摄像头
pub trait CameraProvider {
  type Source: FrameSource;
  type Error: std::error::Error + 'static;

  fn acquire(
    &self,
    request: &CameraRequest,
  ) -> impl Future<Output = Result<Self::Source, Self::Error>>;
}

mod image_sequence;
pub use self::image_sequence::{ImageSequenceCamera, ImageSequenceError, ImageSequenceSource};
