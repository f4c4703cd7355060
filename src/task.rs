// 该文件是 Lookout （瞭望） 项目的一部分。
// src/task.rs - 采集、推理、渲染生命周期控制
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

//! 生命周期控制器
//!
//! 所有工作运行在同一个线程上（tokio `LocalSet`），并发只体现为挂起的
//! 异步操作：模型加载、摄像头就绪、单帧推理以及等待下一个刷新节拍。
//! 每个挂起点恢复后都会重新检查运行状态和运行代次，`stop()` 之后到达的
//! 推理结果会被直接丢弃。
//!
//! | 状态     | `start()`        | `stop()`          | 结束                    |
//! |----------|------------------|-------------------|-------------------------|
//! | Idle     | → Starting       | 无操作            |                         |
//! | Starting | 无操作           | → Stopping → Idle | 成功 → Running，失败 → Idle |
//! | Running  | 无操作           | → Stopping → Idle | 帧源失去信号 → Idle     |
//! | Stopping | 无操作           | 无操作            | → Idle                  |

use std::{
  cell::{Cell, RefCell},
  rc::Rc,
};

use thiserror::Error;
use tokio::{
  sync::{Mutex, OnceCell},
  task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{
  clock::FrameClock,
  input::{CameraProvider, CameraRequest, FacingMode, FrameSource},
  model::{Detector, DetectorLoader},
  output::{
    Status, StatusSink, Surface, SurfaceGeometry, TriggerPanel, TriggerState,
    draw::{OverlayStyle, draw_detections},
  },
};

/// 控制器的协作方类型集合
pub trait Platform: 'static {
  type Frame: 'static;
  type Source: FrameSource<Frame = Self::Frame> + 'static;
  type Camera: CameraProvider<Source = Self::Source> + 'static;
  type Detector: Detector<Self::Frame> + 'static;
  type Loader: DetectorLoader<Detector = Self::Detector> + 'static;
  type Surface: Surface + 'static;
  type Clock: FrameClock + 'static;
  type Status: StatusSink + 'static;
  type Triggers: TriggerPanel + 'static;
}

pub struct Collaborators<P: Platform> {
  pub camera: P::Camera,
  pub loader: P::Loader,
  pub surface: P::Surface,
  pub clock: P::Clock,
  pub status: P::Status,
  pub triggers: P::Triggers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
  Idle,
  Starting,
  Running,
  Stopping,
}

impl RunState {
  /// 该状态下两个触发器是否可用
  pub fn triggers(self) -> TriggerState {
    match self {
      RunState::Idle => TriggerState {
        start: true,
        stop: false,
      },
      RunState::Starting | RunState::Running => TriggerState {
        start: false,
        stop: true,
      },
      RunState::Stopping => TriggerState {
        start: false,
        stop: false,
      },
    }
  }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ControllerConfig {
  pub camera: CameraRequest,
  /// 低于该置信度的检测不绘制也不计数
  pub min_confidence: f32,
  pub style: OverlayStyle,
}

type BoxError = Box<dyn std::error::Error>;

#[derive(Error, Debug)]
pub enum ControllerError {
  #[error("模型加载失败: {0}")]
  ModelLoad(#[source] BoxError),
  #[error("摄像头获取失败: {0}")]
  CameraAcquire(#[source] BoxError),
  #[error("摄像头未能就绪: {0}")]
  CameraNotReady(#[source] BoxError),
  #[error("启动已被新的请求取代")]
  Superseded,
}

impl ControllerError {
  fn status(&self) -> Option<Status> {
    match self {
      ControllerError::ModelLoad(source) => Some(Status::ModelLoadFailed(source.to_string())),
      ControllerError::CameraAcquire(source) | ControllerError::CameraNotReady(source) => {
        Some(Status::CameraFailed(source.to_string()))
      }
      ControllerError::Superseded => None,
    }
  }
}

/// 已排期、尚未触发的下一步
pub struct ScheduledStep {
  handle: JoinHandle<()>,
  generation: u64,
}

impl ScheduledStep {
  fn cancel(self) {
    debug!("取消第 {} 轮的待执行步骤", self.generation);
    self.handle.abort();
  }
}

struct Shared<P: Platform> {
  parts: Collaborators<P>,
  config: ControllerConfig,
  detector: OnceCell<P::Detector>,
  state: Cell<RunState>,
  generation: Cell<u64>,
  source: RefCell<Option<P::Source>>,
  geometry: Cell<Option<SurfaceGeometry>>,
  scheduled: RefCell<Option<ScheduledStep>>,
  // 同一时刻最多一个推理在进行，包括停止后立刻重启的情况
  inference_lane: Mutex<()>,
  // 同一时刻最多一个帧源处于获取或占用中
  camera_lane: Mutex<()>,
}

/// 采集、推理、渲染生命周期控制器
///
/// 克隆得到的是同一个控制器的句柄。必须在 tokio `LocalSet` 中使用。
pub struct LifecycleController<P: Platform> {
  shared: Rc<Shared<P>>,
}

impl<P: Platform> Clone for LifecycleController<P> {
  fn clone(&self) -> Self {
    Self {
      shared: Rc::clone(&self.shared),
    }
  }
}

impl<P: Platform> LifecycleController<P> {
  pub fn new(parts: Collaborators<P>, config: ControllerConfig) -> Self {
    let shared = Shared {
      parts,
      config,
      detector: OnceCell::new(),
      state: Cell::new(RunState::Idle),
      generation: Cell::new(0),
      source: RefCell::new(None),
      geometry: Cell::new(None),
      scheduled: RefCell::new(None),
      inference_lane: Mutex::new(()),
      camera_lane: Mutex::new(()),
    };
    shared
      .parts
      .triggers
      .set_enabled(RunState::Idle.triggers());

    Self {
      shared: Rc::new(shared),
    }
  }

  pub fn state(&self) -> RunState {
    self.shared.state.get()
  }

  pub fn collaborators(&self) -> &Collaborators<P> {
    &self.shared.parts
  }

  pub fn is_detector_loaded(&self) -> bool {
    self.shared.detector.initialized()
  }

  pub fn has_frame_source(&self) -> bool {
    self.shared.source.borrow().is_some()
  }

  pub fn has_scheduled_step(&self) -> bool {
    self.shared.scheduled.borrow().is_some()
  }

  pub fn geometry(&self) -> Option<SurfaceGeometry> {
    self.shared.geometry.get()
  }

  /// 在后台预加载检测器，失败时静默忽略
  pub fn warm_up(&self) -> JoinHandle<()> {
    let shared = Rc::clone(&self.shared);
    tokio::task::spawn_local(async move {
      match shared.ensure_detector().await {
        Ok(_) => debug!("检测器预加载完成"),
        Err(e) => debug!("检测器预加载失败, 忽略: {}", e),
      }
    })
  }

  /// 开始检测，仅在 Idle 时生效
  ///
  /// 返回时控制器处于 Running 或 Idle，失败只体现为状态消息。
  pub async fn start(&self) {
    let shared = &self.shared;
    if shared.state.get() != RunState::Idle {
      debug!("忽略开始请求, 当前状态 {:?}", shared.state.get());
      return;
    }

    let generation = shared.generation.get().wrapping_add(1);
    shared.generation.set(generation);
    shared.transition(RunState::Starting);
    info!("开始第 {} 轮检测", generation);

    match shared.bring_up(generation).await {
      Ok(()) => info!("第 {} 轮检测已运行", generation),
      Err(ControllerError::Superseded) => debug!("第 {} 轮启动已被停止", generation),
      Err(e) => shared.recover(generation, e),
    }
  }

  /// 停止检测，Idle 时无操作
  pub fn stop(&self) {
    match self.shared.state.get() {
      RunState::Idle | RunState::Stopping => {
        debug!("忽略停止请求, 当前状态 {:?}", self.shared.state.get());
      }
      RunState::Starting | RunState::Running => {
        info!("停止第 {} 轮检测", self.shared.generation.get());
        self.shared.shutdown(Status::Stopped);
      }
    }
  }

  /// 布局或设备像素比变化后重新计算绘制表面尺寸
  pub fn refresh_layout(&self) {
    let shared = &self.shared;
    if shared.state.get() != RunState::Running {
      return;
    }
    let dimensions = shared.source.borrow().as_ref().map(|s| s.dimensions());
    if let Some((width, height)) = dimensions {
      shared.fit_surface(width, height);
    }
  }
}

impl<P: Platform> Shared<P> {
  fn transition(&self, state: RunState) {
    let previous = self.state.replace(state);
    debug!("状态 {:?} -> {:?}", previous, state);
    self.parts.triggers.set_enabled(state.triggers());
  }

  fn report(&self, status: Status) {
    self.parts.status.report(&status);
  }

  fn is_current(&self, generation: u64, state: RunState) -> bool {
    self.generation.get() == generation && self.state.get() == state
  }

  fn ensure_current(&self, generation: u64) -> Result<(), ControllerError> {
    if self.is_current(generation, RunState::Starting) {
      Ok(())
    } else {
      Err(ControllerError::Superseded)
    }
  }

  /// 取得检测器，未加载时加载一次；并发调用共享同一个加载过程
  async fn ensure_detector(&self) -> Result<&P::Detector, ControllerError> {
    self
      .detector
      .get_or_try_init(|| async {
        info!("正在加载检测器...");
        let now = std::time::Instant::now();
        let detector = self.parts.loader.load().await.map_err(|e| {
          error!("检测器加载失败: {}", e);
          ControllerError::ModelLoad(Box::new(e))
        })?;
        info!("检测器加载完成, 耗时: {:.2?}", now.elapsed());
        Ok::<_, ControllerError>(detector)
      })
      .await
  }

  /// 优先请求配置的朝向，失败时按配置退回任意摄像头
  async fn acquire_camera(&self) -> Result<P::Source, ControllerError> {
    let request = &self.config.camera;
    match self.parts.camera.acquire(request).await {
      Ok(source) => Ok(source),
      Err(e) if request.fallback_to_any && request.facing != FacingMode::Any => {
        warn!("请求 {:?} 摄像头失败: {}, 改为任意摄像头", request.facing, e);
        self
          .parts
          .camera
          .acquire(&request.with_facing(FacingMode::Any))
          .await
          .map_err(|e| ControllerError::CameraAcquire(Box::new(e)))
      }
      Err(e) => Err(ControllerError::CameraAcquire(Box::new(e))),
    }
  }

  async fn bring_up(self: &Rc<Self>, generation: u64) -> Result<(), ControllerError> {
    let loaded = self.detector.initialized();
    if !loaded {
      self.report(Status::LoadingModel);
    }
    self.ensure_detector().await?;
    self.ensure_current(generation)?;
    if !loaded {
      self.report(Status::ModelReady);
    }

    // 上一轮尚未结束的获取释放帧源之后才开始新的获取
    let _claim = self.camera_lane.lock().await;
    self.ensure_current(generation)?;

    self.report(Status::RequestingCamera);
    let mut source = self.acquire_camera().await?;
    if let Err(e) = self.ensure_current(generation) {
      source.release();
      return Err(e);
    }

    if let Err(e) = source.ready().await {
      error!("摄像头未能就绪: {}", e);
      source.release();
      return Err(ControllerError::CameraNotReady(Box::new(e)));
    }
    if let Err(e) = self.ensure_current(generation) {
      source.release();
      return Err(e);
    }

    let (width, height) = source.dimensions();
    info!("摄像头已就绪: {}x{}", width, height);
    *self.source.borrow_mut() = Some(source);
    self.fit_surface(width, height);
    self.report(Status::CameraReady { width, height });

    self.transition(RunState::Running);
    self.schedule_step(generation);
    Ok(())
  }

  /// 启动失败：回到 Idle 并释放已获取的资源
  fn recover(&self, generation: u64, err: ControllerError) {
    if !self.is_current(generation, RunState::Starting) {
      debug!("第 {} 轮已结束, 忽略启动错误: {}", generation, err);
      return;
    }

    error!("启动失败: {}", err);
    let source = self.source.borrow_mut().take();
    if let Some(source) = source {
      source.release();
    }
    self.geometry.set(None);
    self.transition(RunState::Idle);
    if let Some(status) = err.status() {
      self.report(status);
    }
  }

  fn shutdown(&self, status: Status) {
    self.transition(RunState::Stopping);

    let scheduled = self.scheduled.borrow_mut().take();
    if let Some(step) = scheduled {
      step.cancel();
    }
    let source = self.source.borrow_mut().take();
    if let Some(source) = source {
      source.release();
    }
    self.parts.surface.clear();
    self.geometry.set(None);

    self.transition(RunState::Idle);
    self.report(status);
  }

  fn fit_surface(&self, width: u32, height: u32) {
    let geometry = SurfaceGeometry::fit(width, height, self.parts.surface.device_pixel_ratio());
    if self.geometry.get() == Some(geometry) {
      return;
    }
    debug!(
      "调整绘制表面: {}x{} (x{})",
      geometry.display_width, geometry.display_height, geometry.scale
    );
    self.parts.surface.resize(&geometry);
    self.geometry.set(Some(geometry));
  }

  fn schedule_step(self: &Rc<Self>, generation: u64) {
    let shared = Rc::clone(self);
    let handle = tokio::task::spawn_local(async move {
      shared.parts.clock.next_tick().await;
      // 已触发的步骤不再可取消，之后由状态检查负责丢弃结果
      shared.scheduled.borrow_mut().take();
      shared.step(generation).await;
    });

    let previous = self
      .scheduled
      .borrow_mut()
      .replace(ScheduledStep { handle, generation });
    if let Some(previous) = previous {
      previous.cancel();
    }
  }

  /// 帧源失去信号时视为一次隐式停止
  fn lose_source(&self, generation: u64, reason: &str) {
    warn!("第 {} 轮检测中断: {}", generation, reason);
    self.shutdown(Status::CameraLost);
  }

  async fn step(self: &Rc<Self>, generation: u64) {
    if !self.is_current(generation, RunState::Running) {
      return;
    }
    let Some(detector) = self.detector.get() else {
      self.lose_source(generation, "检测器不可用");
      return;
    };

    let (frame, dimensions) = {
      let source = self.source.borrow();
      match source.as_ref() {
        Some(source) => (source.current_frame(), source.dimensions()),
        None => (None, (0, 0)),
      }
    };
    let Some(frame) = frame else {
      self.lose_source(generation, "没有可解码的帧");
      return;
    };
    if self.geometry.get().map(|g| g.display_size()) != Some(dimensions) {
      self.fit_surface(dimensions.0, dimensions.1);
    }

    let outcome = {
      let _lane = self.inference_lane.lock().await;
      if !self.is_current(generation, RunState::Running) {
        return;
      }
      let now = std::time::Instant::now();
      let outcome = detector.detect(&frame).await;
      debug!("推理完成, 耗时: {:.2?}", now.elapsed());
      outcome
    };

    if !self.is_current(generation, RunState::Running) {
      debug!("第 {} 轮已停止, 丢弃推理结果", generation);
      return;
    }

    match outcome {
      Ok(result) => {
        let result = result.retain_confident(self.config.min_confidence);
        draw_detections(&self.parts.surface, &result, &self.config.style);
        self.report(Status::from_count(result.len()));
      }
      Err(e) => {
        warn!("单帧推理失败: {}", e);
        self.report(Status::DetectionFailed);
      }
    }

    self.schedule_step(generation);
  }
}
