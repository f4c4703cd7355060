// 该文件是 Lookout （瞭望） 项目的一部分。
// src/output.rs - 输出定义
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

use std::{fmt, rc::Rc};

use image::Rgb;

use crate::model::BBox;

/// 绘制表面，坐标均为帧像素坐标，由实现负责映射到物理像素
pub trait Surface {
  /// 当前设备像素比
  fn device_pixel_ratio(&self) -> f64;
  fn resize(&self, geometry: &SurfaceGeometry);
  fn clear(&self);
  fn stroke_rect(&self, bbox: &BBox, color: Rgb<u8>, line_width: f32);
  fn fill_rect(&self, bbox: &BBox, color: Rgb<u8>);
  /// 文本的 (宽, 高)
  fn text_size(&self, text: &str) -> (f32, f32);
  /// `(x, y)` 为文本左上角
  fn fill_text(&self, text: &str, x: f32, y: f32, color: Rgb<u8>);
}

/// 状态输出，只保留当前一条
pub trait StatusSink {
  fn report(&self, status: &Status);
}

/// 开始/停止两个触发器
pub trait TriggerPanel {
  fn set_enabled(&self, triggers: TriggerState);
}

impl<S: Surface + ?Sized> Surface for Rc<S> {
  fn device_pixel_ratio(&self) -> f64 {
    (**self).device_pixel_ratio()
  }

  fn resize(&self, geometry: &SurfaceGeometry) {
    (**self).resize(geometry)
  }

  fn clear(&self) {
    (**self).clear()
  }

  fn stroke_rect(&self, bbox: &BBox, color: Rgb<u8>, line_width: f32) {
    (**self).stroke_rect(bbox, color, line_width)
  }

  fn fill_rect(&self, bbox: &BBox, color: Rgb<u8>) {
    (**self).fill_rect(bbox, color)
  }

  fn text_size(&self, text: &str) -> (f32, f32) {
    (**self).text_size(text)
  }

  fn fill_text(&self, text: &str, x: f32, y: f32, color: Rgb<u8>) {
    (**self).fill_text(text, x, y, color)
  }
}

impl<S: StatusSink + ?Sized> StatusSink for Rc<S> {
  fn report(&self, status: &Status) {
    (**self).report(status)
  }
}

impl<T: TriggerPanel + ?Sized> TriggerPanel for Rc<T> {
  fn set_enabled(&self, triggers: TriggerState) {
    (**self).set_enabled(triggers)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerState {
  pub start: bool,
  pub stop: bool,
}

/// 状态消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
  LoadingModel,
  ModelReady,
  ModelLoadFailed(String),
  RequestingCamera,
  CameraReady { width: u32, height: u32 },
  CameraFailed(String),
  Detected(usize),
  NoObjects,
  DetectionFailed,
  Stopped,
  CameraLost,
}

impl Status {
  pub fn from_count(count: usize) -> Self {
    if count == 0 {
      Status::NoObjects
    } else {
      Status::Detected(count)
    }
  }

  pub fn is_error(&self) -> bool {
    matches!(
      self,
      Status::ModelLoadFailed(_)
        | Status::CameraFailed(_)
        | Status::DetectionFailed
        | Status::CameraLost
    )
  }
}

impl fmt::Display for Status {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Status::LoadingModel => write!(f, "正在加载模型..."),
      Status::ModelReady => write!(f, "模型加载完成"),
      Status::ModelLoadFailed(reason) => write!(f, "模型加载失败: {}", reason),
      Status::RequestingCamera => write!(f, "正在请求摄像头..."),
      Status::CameraReady { width, height } => {
        write!(f, "摄像头已就绪 ({}x{}), 正在检测", width, height)
      }
      Status::CameraFailed(reason) => write!(f, "无法打开摄像头: {}", reason),
      Status::Detected(count) => write!(f, "检测到 {} 个对象", count),
      Status::NoObjects => write!(f, "未检测到对象"),
      Status::DetectionFailed => write!(f, "检测出错"),
      Status::Stopped => write!(f, "检测已停止"),
      Status::CameraLost => write!(f, "摄像头画面中断, 检测已停止"),
    }
  }
}

/// 绘制表面的尺寸
///
/// `display_*` 与帧像素一致，`backing_*` 为乘以设备像素比后的物理像素，
/// 帧坐标按 `scale` 一比一映射到物理像素上。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceGeometry {
  pub display_width: u32,
  pub display_height: u32,
  pub backing_width: u32,
  pub backing_height: u32,
  pub scale: f64,
}

impl SurfaceGeometry {
  pub fn fit(width: u32, height: u32, device_pixel_ratio: f64) -> Self {
    let scale = if device_pixel_ratio.is_finite() && device_pixel_ratio > 0.0 {
      device_pixel_ratio
    } else {
      1.0
    };

    Self {
      display_width: width,
      display_height: height,
      backing_width: (width as f64 * scale).round() as u32,
      backing_height: (height as f64 * scale).round() as u32,
      scale,
    }
  }

  pub fn display_size(&self) -> (u32, u32) {
    (self.display_width, self.display_height)
  }

  pub fn backing_size(&self) -> (u32, u32) {
    (self.backing_width, self.backing_height)
  }
}

pub mod draw;

mod console;
pub use self::console::{TracingStatus, TracingTriggers};

mod image_surface;
pub use self::image_surface::{ImageSurface, ImageSurfaceError};

mod directory_record;
pub use self::directory_record::{
  DirectoryPresenter, DirectoryPresenterBuilder, DirectoryPresenterError,
};
