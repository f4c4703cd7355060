// 该文件是 Lookout （瞭望） 项目的一部分。
// src/output/image_surface.rs - 图像叠加层绘制表面
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
  cell::{Cell, RefCell},
  path::Path,
};

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, Rgba, RgbaImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use thiserror::Error;
use tracing::debug;

use crate::{
  model::BBox,
  output::{Surface, SurfaceGeometry},
};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 16.0;
const DEFAULT_FONT: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");
const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

#[derive(Error, Debug)]
pub enum ImageSurfaceError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

/// 透明 RGBA 叠加层
///
/// 帧坐标乘以 `scale` 后落到物理像素上。
pub struct ImageSurface {
  overlay: RefCell<RgbaImage>,
  device_pixel_ratio: Cell<f64>,
  scale: Cell<f32>,
  font: FontArc,
  font_size: f32,
}

impl ImageSurface {
  /// 使用内置的 DejaVu Sans 字体
  pub fn new() -> Result<Self, ImageSurfaceError> {
    let font = FontArc::try_from_slice(DEFAULT_FONT)?;
    Ok(Self::with_font(font, LABEL_FONT_SIZE))
  }

  pub fn with_font(font: FontArc, font_size: f32) -> Self {
    Self {
      overlay: RefCell::new(RgbaImage::new(0, 0)),
      device_pixel_ratio: Cell::new(1.0),
      scale: Cell::new(1.0),
      font,
      font_size,
    }
  }

  pub fn with_font_file(path: &Path, font_size: f32) -> Result<Self, ImageSurfaceError> {
    let data = std::fs::read(path)?;
    let font = FontArc::try_from_vec(data)?;
    debug!("加载字体: {}", path.display());
    Ok(Self::with_font(font, font_size))
  }

  pub fn set_device_pixel_ratio(&self, ratio: f64) {
    self.device_pixel_ratio.set(ratio);
  }

  pub fn dimensions(&self) -> (u32, u32) {
    self.overlay.borrow().dimensions()
  }

  pub fn snapshot(&self) -> RgbaImage {
    self.overlay.borrow().clone()
  }

  /// 叠加层是否没有任何绘制内容
  pub fn is_blank(&self) -> bool {
    self.overlay.borrow().pixels().all(|p| p[3] == 0)
  }

  fn to_backing(&self, bbox: &BBox) -> Option<Rect> {
    let scale = self.scale.get();
    let x_min = (bbox.x_min * scale).floor() as i32;
    let y_min = (bbox.y_min * scale).floor() as i32;
    let x_max = (bbox.x_max * scale).ceil() as i32;
    let y_max = (bbox.y_max * scale).ceil() as i32;

    if x_min >= x_max || y_min >= y_max {
      return None;
    }
    Some(Rect::at(x_min, y_min).of_size((x_max - x_min) as u32, (y_max - y_min) as u32))
  }
}

fn opaque(color: Rgb<u8>) -> Rgba<u8> {
  Rgba([color[0], color[1], color[2], 255])
}

impl Surface for ImageSurface {
  fn device_pixel_ratio(&self) -> f64 {
    self.device_pixel_ratio.get()
  }

  fn resize(&self, geometry: &SurfaceGeometry) {
    debug!(
      "叠加层尺寸: 显示 {}x{}, 物理 {}x{}",
      geometry.display_width,
      geometry.display_height,
      geometry.backing_width,
      geometry.backing_height
    );
    *self.overlay.borrow_mut() = RgbaImage::new(geometry.backing_width, geometry.backing_height);
    self.scale.set(geometry.scale as f32);
  }

  fn clear(&self) {
    for pixel in self.overlay.borrow_mut().pixels_mut() {
      *pixel = TRANSPARENT;
    }
  }

  fn stroke_rect(&self, bbox: &BBox, color: Rgb<u8>, line_width: f32) {
    let Some(rect) = self.to_backing(bbox) else {
      return;
    };
    let thickness = (line_width * self.scale.get()).round().max(1.0) as u32;
    let mut overlay = self.overlay.borrow_mut();

    // 逐像素向内加粗
    for inset in 0..thickness {
      let (width, height) = (
        rect.width().saturating_sub(2 * inset),
        rect.height().saturating_sub(2 * inset),
      );
      if width == 0 || height == 0 {
        break;
      }
      let inner = Rect::at(rect.left() + inset as i32, rect.top() + inset as i32).of_size(width, height);
      draw_hollow_rect_mut(&mut *overlay, inner, opaque(color));
    }
  }

  fn fill_rect(&self, bbox: &BBox, color: Rgb<u8>) {
    if let Some(rect) = self.to_backing(bbox) {
      draw_filled_rect_mut(&mut *self.overlay.borrow_mut(), rect, opaque(color));
    }
  }

  fn text_size(&self, text: &str) -> (f32, f32) {
    let (width, height) = text_size(PxScale::from(self.font_size), &self.font, text);
    (width as f32, height as f32)
  }

  fn fill_text(&self, text: &str, x: f32, y: f32, color: Rgb<u8>) {
    let scale = self.scale.get();
    draw_text_mut(
      &mut *self.overlay.borrow_mut(),
      opaque(color),
      (x * scale).round() as i32,
      (y * scale).round() as i32,
      PxScale::from(self.font_size * scale),
      &self.font,
      text,
    );
  }
}
