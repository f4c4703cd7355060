// 该文件是 Lookout （瞭望） 项目的一部分。
// src/model/replay.rs - 检测结果回放
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

use std::{path::PathBuf, time::Duration};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::Frame,
  model::{DetectResult, Detection, Detector, DetectorLoader},
};

#[derive(Error, Debug)]
pub enum ReplayError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("无效的参数 {0}: {1}")]
  InvalidParameter(String, String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("第 {line} 行解析失败: {source}")]
  ParseError {
    line: usize,
    source: serde_json::Error,
  },
  #[error("加载任务异常终止: {0}")]
  TaskError(String),
  #[error("回放的推理错误: {0}")]
  Scripted(String),
}

/// 回放文件中的一行：一帧的检测结果，或一次模拟的推理失败
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ReplayLine {
  Detections(Vec<Detection>),
  Failure { error: String },
}

/// 从 JSON Lines 文件加载检测结果的加载器
///
/// URL 格式 `replay:///path/to/detections.jsonl?latency_ms=40`。
#[derive(Debug, Clone)]
pub struct ReplayDetectorLoader {
  path: PathBuf,
  latency: Duration,
}

impl FromUrlWithScheme for ReplayDetectorLoader {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayDetectorLoader {
  type Error = ReplayError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ReplayError::SchemeMismatch(format!(
        "期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let mut latency = Duration::ZERO;
    for (k, v) in url.query_pairs() {
      if k == "latency_ms" {
        let ms = v
          .parse::<u64>()
          .map_err(|e| ReplayError::InvalidParameter(k.to_string(), e.to_string()))?;
        latency = Duration::from_millis(ms);
      }
    }

    Ok(ReplayDetectorLoader {
      path: PathBuf::from(url.path()),
      latency,
    })
  }
}

impl ReplayDetectorLoader {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      latency: Duration::ZERO,
    }
  }

  pub fn latency(mut self, latency: Duration) -> Self {
    self.latency = latency;
    self
  }
}

fn parse_lines(text: &str) -> Result<Vec<Result<DetectResult, String>>, ReplayError> {
  text
    .lines()
    .enumerate()
    .filter(|(_, line)| !line.trim().is_empty())
    .map(|(index, line)| {
      let parsed = serde_json::from_str::<ReplayLine>(line).map_err(|source| {
        ReplayError::ParseError {
          line: index + 1,
          source,
        }
      })?;
      Ok(match parsed {
        ReplayLine::Detections(items) => Ok(DetectResult::from(items)),
        ReplayLine::Failure { error } => Err(error),
      })
    })
    .collect()
}

impl DetectorLoader for ReplayDetectorLoader {
  type Detector = ReplayDetector;
  type Error = ReplayError;

  async fn load(&self) -> Result<Self::Detector, Self::Error> {
    info!("加载回放文件: {}", self.path.display());
    let path = self.path.clone();
    let text = tokio::task::spawn_blocking(move || std::fs::read_to_string(path))
      .await
      .map_err(|e| ReplayError::TaskError(e.to_string()))??;

    let frames = parse_lines(&text).inspect_err(|e| error!("回放文件无效: {}", e))?;
    debug!(
      "回放帧数: {}, 模拟推理延迟: {:?}",
      frames.len(),
      self.latency
    );

    Ok(ReplayDetector {
      frames,
      latency: self.latency,
    })
  }
}

/// 按帧序号循环回放检测结果
#[derive(Debug)]
pub struct ReplayDetector {
  frames: Vec<Result<DetectResult, String>>,
  latency: Duration,
}

impl ReplayDetector {
  pub fn len(&self) -> usize {
    self.frames.len()
  }

  pub fn is_empty(&self) -> bool {
    self.frames.is_empty()
  }
}

impl Detector<Frame> for ReplayDetector {
  type Error = ReplayError;

  async fn detect(&self, frame: &Frame) -> Result<DetectResult, Self::Error> {
    if !self.latency.is_zero() {
      tokio::time::sleep(self.latency).await;
    }

    if self.frames.is_empty() {
      return Ok(DetectResult::default());
    }

    let slot = (frame.index % self.frames.len() as u64) as usize;
    self.frames[slot].clone().map_err(ReplayError::Scripted)
  }
}
