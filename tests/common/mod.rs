// 该文件是 Lookout （瞭望） 项目的一部分。
// tests/common/mod.rs - 生命周期测试用的协作方替身
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

#![allow(dead_code)]

use std::{
  cell::{Cell, RefCell},
  collections::VecDeque,
  future::Future,
  rc::Rc,
};

use image::Rgb;
use thiserror::Error;
use tokio::{
  sync::{Semaphore, oneshot},
  task::LocalSet,
};

use lookout::{
  clock::FrameClock,
  input::{CameraProvider, CameraRequest, FacingMode, FrameSource},
  model::{BBox, DetectResult, Detection, Detector, DetectorLoader},
  output::{Status, StatusSink, Surface, SurfaceGeometry, TriggerPanel, TriggerState},
  task::{Collaborators, ControllerConfig, LifecycleController, Platform},
};

#[derive(Error, Debug)]
#[error("{0}")]
pub struct MockError(pub String);

impl MockError {
  fn new(reason: &str) -> Self {
    Self(reason.to_string())
  }
}

/// 在 `LocalSet` 中运行测试主体
pub async fn local<F: Future>(future: F) -> F::Output {
  LocalSet::new().run_until(future).await
}

/// 让所有已就绪的本地任务跑到下一个挂起点
pub async fn settle() {
  for _ in 0..64 {
    tokio::task::yield_now().await;
  }
}

pub fn detections(items: &[(&str, f32)]) -> DetectResult {
  items
    .iter()
    .enumerate()
    .map(|(i, (label, score))| {
      let x = 40.0 * i as f32;
      Detection::new(*label, *score, BBox::new(x, 30.0, x + 30.0, 90.0))
    })
    .collect::<Vec<_>>()
    .into()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MockFrame(pub u64);

/// 手动驱动的刷新节拍，每个许可放行一个步骤
#[derive(Clone)]
pub struct MockClock {
  permits: Rc<Semaphore>,
}

impl Default for MockClock {
  fn default() -> Self {
    Self {
      permits: Rc::new(Semaphore::new(0)),
    }
  }
}

impl MockClock {
  pub fn tick(&self, count: usize) {
    self.permits.add_permits(count);
  }
}

impl FrameClock for MockClock {
  async fn next_tick(&self) {
    if let Ok(permit) = self.permits.acquire().await {
      permit.forget();
    }
  }
}

pub enum Reply {
  Ready(Result<DetectResult, String>),
  Gated(oneshot::Receiver<()>, Result<DetectResult, String>),
}

#[derive(Default)]
pub struct DetectorScript {
  replies: RefCell<VecDeque<Reply>>,
  calls: Cell<usize>,
  in_flight: Cell<usize>,
  max_in_flight: Cell<usize>,
}

impl DetectorScript {
  pub fn reply(&self, result: Result<DetectResult, &str>) {
    self
      .replies
      .borrow_mut()
      .push_back(Reply::Ready(result.map_err(str::to_string)));
  }

  /// 推理挂起，直到返回的发送端被触发
  pub fn gated(&self, result: Result<DetectResult, &str>) -> oneshot::Sender<()> {
    let (tx, rx) = oneshot::channel();
    self
      .replies
      .borrow_mut()
      .push_back(Reply::Gated(rx, result.map_err(str::to_string)));
    tx
  }

  pub fn calls(&self) -> usize {
    self.calls.get()
  }

  pub fn in_flight(&self) -> usize {
    self.in_flight.get()
  }

  pub fn max_in_flight(&self) -> usize {
    self.max_in_flight.get()
  }
}

pub struct MockDetector {
  script: Rc<DetectorScript>,
}

impl Detector<MockFrame> for MockDetector {
  type Error = MockError;

  async fn detect(&self, _frame: &MockFrame) -> Result<DetectResult, MockError> {
    let script = &self.script;
    script.calls.set(script.calls.get() + 1);
    script.in_flight.set(script.in_flight.get() + 1);
    script
      .max_in_flight
      .set(script.max_in_flight.get().max(script.in_flight.get()));

    let reply = script.replies.borrow_mut().pop_front();
    let result = match reply {
      Some(Reply::Ready(result)) => result,
      Some(Reply::Gated(gate, result)) => {
        let _ = gate.await;
        result
      }
      None => Ok(DetectResult::default()),
    };
    tokio::task::yield_now().await;

    script.in_flight.set(script.in_flight.get() - 1);
    result.map_err(MockError)
  }
}

#[derive(Clone)]
pub struct MockLoader {
  loads: Rc<Cell<usize>>,
  fail_next: Rc<Cell<bool>>,
  gate: Rc<RefCell<Option<oneshot::Receiver<()>>>>,
  script: Rc<DetectorScript>,
}

impl MockLoader {
  fn new(script: Rc<DetectorScript>) -> Self {
    Self {
      loads: Rc::default(),
      fail_next: Rc::default(),
      gate: Rc::default(),
      script,
    }
  }

  pub fn loads(&self) -> usize {
    self.loads.get()
  }

  pub fn fail_next(&self) {
    self.fail_next.set(true);
  }

  /// 下一次加载挂起，直到返回的发送端被触发
  pub fn gate(&self) -> oneshot::Sender<()> {
    let (tx, rx) = oneshot::channel();
    *self.gate.borrow_mut() = Some(rx);
    tx
  }
}

impl DetectorLoader for MockLoader {
  type Detector = MockDetector;
  type Error = MockError;

  async fn load(&self) -> Result<MockDetector, MockError> {
    self.loads.set(self.loads.get() + 1);
    let gate = self.gate.borrow_mut().take();
    if let Some(gate) = gate {
      let _ = gate.await;
    }
    tokio::task::yield_now().await;

    if self.fail_next.replace(false) {
      return Err(MockError::new("model file is corrupt"));
    }
    Ok(MockDetector {
      script: Rc::clone(&self.script),
    })
  }
}

pub struct CameraState {
  deny: Cell<bool>,
  without_rear: Cell<bool>,
  fail_ready: Cell<bool>,
  live: Cell<bool>,
  dimensions: Cell<(u32, u32)>,
  requests: RefCell<Vec<FacingMode>>,
  acquired: Cell<usize>,
  released: Cell<usize>,
  max_claims: Cell<usize>,
  gate: RefCell<Option<oneshot::Receiver<()>>>,
}

impl CameraState {
  fn claims(&self) -> usize {
    self.acquired.get() - self.released.get()
  }
}

#[derive(Clone)]
pub struct MockCamera {
  state: Rc<CameraState>,
}

impl Default for MockCamera {
  fn default() -> Self {
    Self {
      state: Rc::new(CameraState {
        deny: Cell::new(false),
        without_rear: Cell::new(false),
        fail_ready: Cell::new(false),
        live: Cell::new(true),
        dimensions: Cell::new((1280, 720)),
        requests: RefCell::default(),
        acquired: Cell::new(0),
        released: Cell::new(0),
        max_claims: Cell::new(0),
        gate: RefCell::default(),
      }),
    }
  }
}

impl MockCamera {
  pub fn deny(&self, deny: bool) {
    self.state.deny.set(deny);
  }

  pub fn without_rear(&self) {
    self.state.without_rear.set(true);
  }

  pub fn fail_ready(&self, fail: bool) {
    self.state.fail_ready.set(fail);
  }

  /// 关闭后帧源不再产生可解码的帧
  pub fn set_live(&self, live: bool) {
    self.state.live.set(live);
  }

  pub fn set_dimensions(&self, width: u32, height: u32) {
    self.state.dimensions.set((width, height));
  }

  pub fn requests(&self) -> Vec<FacingMode> {
    self.state.requests.borrow().clone()
  }

  pub fn acquired(&self) -> usize {
    self.state.acquired.get()
  }

  pub fn released(&self) -> usize {
    self.state.released.get()
  }

  /// 同时被占用的帧源数的最大值
  pub fn max_claims(&self) -> usize {
    self.state.max_claims.get()
  }

  /// 下一次获取挂起，直到返回的发送端被触发
  pub fn gate(&self) -> oneshot::Sender<()> {
    let (tx, rx) = oneshot::channel();
    *self.state.gate.borrow_mut() = Some(rx);
    tx
  }
}

impl CameraProvider for MockCamera {
  type Source = MockSource;
  type Error = MockError;

  async fn acquire(&self, request: &CameraRequest) -> Result<MockSource, MockError> {
    self.state.requests.borrow_mut().push(request.facing);
    let gate = self.state.gate.borrow_mut().take();
    if let Some(gate) = gate {
      let _ = gate.await;
    }
    tokio::task::yield_now().await;

    if self.state.deny.get() {
      return Err(MockError::new("permission denied"));
    }
    if self.state.without_rear.get() && request.facing == FacingMode::Environment {
      return Err(MockError::new("no rear camera"));
    }

    self.state.acquired.set(self.state.acquired.get() + 1);
    self
      .state
      .max_claims
      .set(self.state.max_claims.get().max(self.state.claims()));
    Ok(MockSource {
      state: Rc::clone(&self.state),
      next: Cell::new(0),
    })
  }
}

pub struct MockSource {
  state: Rc<CameraState>,
  next: Cell<u64>,
}

impl FrameSource for MockSource {
  type Frame = MockFrame;
  type Error = MockError;

  async fn ready(&mut self) -> Result<(), MockError> {
    tokio::task::yield_now().await;
    if self.state.fail_ready.get() {
      Err(MockError::new("no decodable frame"))
    } else {
      Ok(())
    }
  }

  fn current_frame(&self) -> Option<MockFrame> {
    self.state.live.get().then(|| {
      let index = self.next.get();
      self.next.set(index + 1);
      MockFrame(index)
    })
  }

  fn dimensions(&self) -> (u32, u32) {
    self.state.dimensions.get()
  }

  fn release(self) {
    self.state.released.set(self.state.released.get() + 1);
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Drawing {
  Outline(BBox),
  Background(BBox),
  Text(String),
}

pub struct MockSurface {
  ratio: Cell<f64>,
  geometry: Cell<Option<SurfaceGeometry>>,
  resizes: Cell<usize>,
  drawings: RefCell<Vec<Drawing>>,
}

impl Default for MockSurface {
  fn default() -> Self {
    Self {
      ratio: Cell::new(1.0),
      geometry: Cell::new(None),
      resizes: Cell::new(0),
      drawings: RefCell::default(),
    }
  }
}

impl MockSurface {
  pub fn set_ratio(&self, ratio: f64) {
    self.ratio.set(ratio);
  }

  pub fn geometry(&self) -> Option<SurfaceGeometry> {
    self.geometry.get()
  }

  pub fn resizes(&self) -> usize {
    self.resizes.get()
  }

  pub fn drawings(&self) -> Vec<Drawing> {
    self.drawings.borrow().clone()
  }

  pub fn captions(&self) -> Vec<String> {
    self
      .drawings
      .borrow()
      .iter()
      .filter_map(|d| match d {
        Drawing::Text(text) => Some(text.clone()),
        _ => None,
      })
      .collect()
  }
}

impl Surface for MockSurface {
  fn device_pixel_ratio(&self) -> f64 {
    self.ratio.get()
  }

  fn resize(&self, geometry: &SurfaceGeometry) {
    self.geometry.set(Some(*geometry));
    self.resizes.set(self.resizes.get() + 1);
    self.drawings.borrow_mut().clear();
  }

  fn clear(&self) {
    self.drawings.borrow_mut().clear();
  }

  fn stroke_rect(&self, bbox: &BBox, _color: Rgb<u8>, _line_width: f32) {
    self.drawings.borrow_mut().push(Drawing::Outline(*bbox));
  }

  fn fill_rect(&self, bbox: &BBox, _color: Rgb<u8>) {
    self.drawings.borrow_mut().push(Drawing::Background(*bbox));
  }

  fn text_size(&self, text: &str) -> (f32, f32) {
    (text.chars().count() as f32 * 8.0, 16.0)
  }

  fn fill_text(&self, text: &str, _x: f32, _y: f32, _color: Rgb<u8>) {
    self.drawings.borrow_mut().push(Drawing::Text(text.to_string()));
  }
}

#[derive(Default)]
pub struct RecordingStatus {
  history: RefCell<Vec<Status>>,
}

impl RecordingStatus {
  pub fn history(&self) -> Vec<Status> {
    self.history.borrow().clone()
  }

  pub fn last(&self) -> Option<Status> {
    self.history.borrow().last().cloned()
  }
}

impl StatusSink for RecordingStatus {
  fn report(&self, status: &Status) {
    self.history.borrow_mut().push(status.clone());
  }
}

#[derive(Default)]
pub struct RecordingTriggers {
  history: RefCell<Vec<TriggerState>>,
}

impl RecordingTriggers {
  pub fn last(&self) -> Option<TriggerState> {
    self.history.borrow().last().copied()
  }
}

impl TriggerPanel for RecordingTriggers {
  fn set_enabled(&self, triggers: TriggerState) {
    self.history.borrow_mut().push(triggers);
  }
}

pub struct Mock;

impl Platform for Mock {
  type Frame = MockFrame;
  type Source = MockSource;
  type Camera = MockCamera;
  type Detector = MockDetector;
  type Loader = MockLoader;
  type Surface = Rc<MockSurface>;
  type Clock = MockClock;
  type Status = Rc<RecordingStatus>;
  type Triggers = Rc<RecordingTriggers>;
}

pub const IDLE_TRIGGERS: TriggerState = TriggerState {
  start: true,
  stop: false,
};

pub const BUSY_TRIGGERS: TriggerState = TriggerState {
  start: false,
  stop: true,
};

/// 控制器及其全部替身的句柄
pub struct Harness {
  pub controller: LifecycleController<Mock>,
  pub clock: MockClock,
  pub loader: MockLoader,
  pub detector: Rc<DetectorScript>,
  pub camera: MockCamera,
  pub surface: Rc<MockSurface>,
  pub status: Rc<RecordingStatus>,
  pub triggers: Rc<RecordingTriggers>,
}

impl Harness {
  pub fn new() -> Self {
    Self::with_config(ControllerConfig::default())
  }

  pub fn with_config(config: ControllerConfig) -> Self {
    let detector = Rc::new(DetectorScript::default());
    let clock = MockClock::default();
    let loader = MockLoader::new(Rc::clone(&detector));
    let camera = MockCamera::default();
    let surface = Rc::new(MockSurface::default());
    let status = Rc::new(RecordingStatus::default());
    let triggers = Rc::new(RecordingTriggers::default());

    let controller = LifecycleController::new(
      Collaborators {
        camera: camera.clone(),
        loader: loader.clone(),
        surface: Rc::clone(&surface),
        clock: clock.clone(),
        status: Rc::clone(&status),
        triggers: Rc::clone(&triggers),
      },
      config,
    );

    Self {
      controller,
      clock,
      loader,
      detector,
      camera,
      surface,
      status,
      triggers,
    }
  }

  /// 放行一个步骤并等待它完成
  pub async fn step(&self) {
    self.clock.tick(1);
    settle().await;
  }

  pub fn spawn_start(&self) {
    let controller = self.controller.clone();
    tokio::task::spawn_local(async move { controller.start().await });
  }
}
