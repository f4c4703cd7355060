// 该文件是 Lookout （瞭望） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use std::{cell::Cell, path::PathBuf, rc::Rc};

use chrono::{Datelike, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
  FromUrl, FromUrlWithScheme,
  clock::{FrameClock, IntervalClock},
  output::ImageSurface,
};

#[derive(Error, Debug)]
pub enum DirectoryPresenterError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("无效的参数 {0}: {1}")]
  InvalidParameter(String, String),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// URL 格式 `folder:///path/to/dir?fps=30&always`
#[derive(Debug, Clone)]
pub struct DirectoryPresenterBuilder {
  directory: PathBuf,
  fps: Option<f64>,
  always: bool,
}

impl FromUrlWithScheme for DirectoryPresenterBuilder {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryPresenterBuilder {
  type Error = DirectoryPresenterError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryPresenterError::SchemeMismatch);
    }

    let mut fps = None;
    for (k, v) in uri.query_pairs() {
      if k == "fps" {
        let value = v
          .parse::<f64>()
          .map_err(|e| DirectoryPresenterError::InvalidParameter(k.to_string(), e.to_string()))?;
        fps = Some(value);
      }
    }

    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryPresenterBuilder {
      directory: PathBuf::from(uri.path()),
      fps,
      always,
    })
  }
}

impl DirectoryPresenterBuilder {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    Self {
      directory: directory.into(),
      fps: None,
      always: false,
    }
  }

  /// URL 中未指定 fps 时使用的刷新率
  pub fn default_fps(mut self, fps: f64) -> Self {
    self.fps.get_or_insert(fps);
    self
  }

  pub fn always(mut self, always: bool) -> Self {
    self.always = always;
    self
  }

  pub fn build(self, surface: Rc<ImageSurface>) -> DirectoryPresenter {
    let clock = match self.fps {
      Some(fps) => IntervalClock::with_fps(fps),
      None => IntervalClock::default(),
    };

    DirectoryPresenter {
      directory: self.directory,
      surface,
      clock,
      always: self.always,
      frame_counter: Cell::new(0),
    }
  }
}

/// 无界面运行时的显示刷新：每个刷新节拍把叠加层保存为 PNG
///
/// 默认只保存有内容的叠加层，`always` 时空白帧也保存。
pub struct DirectoryPresenter {
  directory: PathBuf,
  surface: Rc<ImageSurface>,
  clock: IntervalClock,
  always: bool,
  frame_counter: Cell<u16>,
}

impl DirectoryPresenter {
  fn frame_id(&self) -> u16 {
    let id = self.frame_counter.get().wrapping_add(1);
    self.frame_counter.set(id);
    id
  }

  fn frame_path(&self) -> Result<PathBuf, DirectoryPresenterError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }

  /// 保存当前叠加层，返回写入的路径
  pub fn present(&self) -> Result<Option<PathBuf>, DirectoryPresenterError> {
    let (width, height) = self.surface.dimensions();
    if width == 0 || height == 0 || (!self.always && self.surface.is_blank()) {
      return Ok(None);
    }

    let path = self.frame_path()?;
    self.surface.snapshot().save(&path)?;
    debug!("保存叠加层: {}", path.display());
    Ok(Some(path))
  }
}

impl FrameClock for DirectoryPresenter {
  async fn next_tick(&self) {
    self.clock.next_tick().await;
    if let Err(e) = self.present() {
      warn!("保存叠加层失败: {}", e);
    }
  }
}
