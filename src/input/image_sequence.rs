// 该文件是 Lookout （瞭望） 项目的一部分。
// src/input/image_sequence.rs - 图像序列模拟摄像头
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
  cell::Cell,
  path::{Path, PathBuf},
  sync::Arc,
  time::Instant,
};

use image::{ImageReader, RgbImage, imageops::FilterType};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::{CameraProvider, CameraRequest, FacingMode, Frame, FrameSource},
};

#[derive(Error, Debug)]
pub enum ImageSequenceError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("没有可用的图像: {0}")]
  NoImages(String),
  #[error("没有可解码的帧")]
  NoDecodableFrames,
  #[error("解码任务异常终止: {0}")]
  TaskError(String),
}

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "gif", "webp"];

/// 将一组静态图像作为循环播放的实时画面
///
/// URL 格式 `image:///path/to/file.png` 或 `image:///path/to/directory`，
/// 目录中的图像按文件名排序。
#[derive(Debug, Clone)]
pub struct ImageSequenceCamera {
  path: PathBuf,
}

impl FromUrlWithScheme for ImageSequenceCamera {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageSequenceCamera {
  type Error = ImageSequenceError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ImageSequenceError::SchemeMismatch(format!(
        "期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    Ok(ImageSequenceCamera {
      path: PathBuf::from(url.path()),
    })
  }
}

impl ImageSequenceCamera {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  fn list_images(&self) -> Result<Vec<PathBuf>, ImageSequenceError> {
    if self.path.is_file() {
      return Ok(vec![self.path.clone()]);
    }

    let mut files = std::fs::read_dir(&self.path)?
      .filter_map(|entry| entry.ok().map(|e| e.path()))
      .filter(|path| has_image_extension(path))
      .collect::<Vec<_>>();
    files.sort();

    if files.is_empty() {
      return Err(ImageSequenceError::NoImages(self.path.display().to_string()));
    }
    Ok(files)
  }
}

fn has_image_extension(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
    .unwrap_or(false)
}

/// 在保持宽高比的前提下将尺寸缩小到期望分辨率以内，不放大
fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
  if width <= max_width && height <= max_height {
    return (width, height);
  }
  let ratio = f64::min(
    max_width as f64 / width as f64,
    max_height as f64 / height as f64,
  );
  (
    ((width as f64 * ratio).round() as u32).max(1),
    ((height as f64 * ratio).round() as u32).max(1),
  )
}

fn decode_all(files: &[PathBuf], max_width: u32, max_height: u32) -> Vec<Arc<RgbImage>> {
  files
    .iter()
    .filter_map(|path| {
      let decoded = ImageReader::open(path)
        .map_err(image::ImageError::IoError)
        .and_then(|reader| reader.decode());
      match decoded {
        Ok(image) => {
          let image = image.to_rgb8();
          let (width, height) = fit_within(image.width(), image.height(), max_width, max_height);
          let image = if (width, height) == image.dimensions() {
            image
          } else {
            debug!(
              "缩放 {}: {}x{} -> {}x{}",
              path.display(),
              image.width(),
              image.height(),
              width,
              height
            );
            image::imageops::resize(&image, width, height, FilterType::Triangle)
          };
          Some(Arc::new(image))
        }
        Err(e) => {
          warn!("跳过无法解码的图像 {}: {}", path.display(), e);
          None
        }
      }
    })
    .collect()
}

impl CameraProvider for ImageSequenceCamera {
  type Source = ImageSequenceSource;
  type Error = ImageSequenceError;

  async fn acquire(&self, request: &CameraRequest) -> Result<Self::Source, Self::Error> {
    if request.facing != FacingMode::Any {
      debug!("图像序列没有朝向区分, 忽略 {:?}", request.facing);
    }

    let files = self.list_images()?;
    info!(
      "打开图像序列: {} ({} 个文件)",
      self.path.display(),
      files.len()
    );

    Ok(ImageSequenceSource {
      files,
      max_width: request.ideal_width,
      max_height: request.ideal_height,
      frames: Vec::new(),
      cursor: Cell::new(0),
      shown: Cell::new(None),
      started: Instant::now(),
    })
  }
}

/// 图像序列帧源，每次取帧前进一帧并循环
#[derive(Debug)]
pub struct ImageSequenceSource {
  files: Vec<PathBuf>,
  max_width: u32,
  max_height: u32,
  frames: Vec<Arc<RgbImage>>,
  cursor: Cell<u64>,
  // 最近一次交出的帧
  shown: Cell<Option<usize>>,
  started: Instant,
}

impl FrameSource for ImageSequenceSource {
  type Frame = Frame;
  type Error = ImageSequenceError;

  async fn ready(&mut self) -> Result<(), Self::Error> {
    if !self.frames.is_empty() {
      return Ok(());
    }

    let files = self.files.clone();
    let (max_width, max_height) = (self.max_width, self.max_height);
    let frames = tokio::task::spawn_blocking(move || decode_all(&files, max_width, max_height))
      .await
      .map_err(|e| ImageSequenceError::TaskError(e.to_string()))?;

    if frames.is_empty() {
      return Err(ImageSequenceError::NoDecodableFrames);
    }

    info!("图像序列就绪: {} 帧", frames.len());
    self.frames = frames;
    Ok(())
  }

  fn current_frame(&self) -> Option<Self::Frame> {
    if self.frames.is_empty() {
      return None;
    }

    let index = self.cursor.get();
    self.cursor.set(index.wrapping_add(1));
    let slot = (index % self.frames.len() as u64) as usize;
    self.shown.set(Some(slot));

    Some(Frame {
      image: Arc::clone(&self.frames[slot]),
      index,
      timestamp_ms: self.started.elapsed().as_millis() as u64,
    })
  }

  /// 最近一次交出的帧的尺寸，尚未取帧时为第一帧的尺寸
  fn dimensions(&self) -> (u32, u32) {
    let slot = self.shown.get().unwrap_or(0);
    self
      .frames
      .get(slot)
      .map_or((0, 0), |frame| frame.dimensions())
  }

  fn release(self) {
    info!("释放图像序列: {} 帧", self.frames.len());
  }
}
