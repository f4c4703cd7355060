// 该文件是 Lookout （瞭望） 项目的一部分。
// src/main.rs - 项目主程序
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

use std::{path::PathBuf, rc::Rc, time::Duration};

use anyhow::Result;
use clap::Parser;
use tokio::{
  io::{AsyncBufReadExt, BufReader},
  sync::mpsc,
  task::LocalSet,
};
use tracing::{info, warn};
use url::Url;

use lookout::{
  FromUrl,
  clock::{ClockWrapper, IntervalClock},
  input::{Frame, ImageSequenceCamera, ImageSequenceSource},
  model::{ReplayDetector, ReplayDetectorLoader},
  output::{DirectoryPresenterBuilder, ImageSurface, TracingStatus, TracingTriggers},
  task::{Collaborators, ControllerConfig, LifecycleController, Platform},
};

const LABEL_FONT_SIZE: f32 = 16.0;
const MIN_CONFIDENCE: f32 = 0.1;
const MAX_CONFIDENCE: f32 = 0.9;

/// Lookout 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 检测器，例如 replay:///path/to/detections.jsonl?latency_ms=40
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 画面来源，例如 image:///path/to/frames
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 叠加层记录目录，例如 folder:///path/to/output?always
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<Url>,
  /// 标签字体文件 (TTF/OTF)，不指定时使用内置的 DejaVu Sans
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,
  /// 置信度阈值 (0.1 - 0.9)
  #[arg(long, default_value_t = 0.25, value_name = "THRESHOLD", value_parser = parse_confidence)]
  pub confidence: f32,
  /// 设备像素比
  #[arg(long, default_value_t = 1.0, value_name = "RATIO")]
  pub device_pixel_ratio: f64,
  /// 显示刷新率
  #[arg(long, default_value_t = 30.0, value_name = "FPS")]
  pub fps: f64,
  /// 不自动开始，等待 start 命令
  #[arg(long)]
  pub manual: bool,
}

fn parse_confidence(value: &str) -> Result<f32, String> {
  let confidence = value.parse::<f32>().map_err(|e| e.to_string())?;
  if (MIN_CONFIDENCE..=MAX_CONFIDENCE).contains(&confidence) {
    Ok(confidence)
  } else {
    Err(format!(
      "置信度必须在 {} 到 {} 之间: {}",
      MIN_CONFIDENCE, MAX_CONFIDENCE, confidence
    ))
  }
}

struct Lookout;

impl Platform for Lookout {
  type Frame = Frame;
  type Source = ImageSequenceSource;
  type Camera = ImageSequenceCamera;
  type Detector = ReplayDetector;
  type Loader = ReplayDetectorLoader;
  type Surface = Rc<ImageSurface>;
  type Clock = ClockWrapper;
  type Status = TracingStatus;
  type Triggers = TracingTriggers;
}

/// 标准输入上的控制命令
#[derive(Debug, Clone, Copy, PartialEq)]
enum Command {
  Start,
  Stop,
  Resize(f64),
  Quit,
}

impl Command {
  fn parse(line: &str) -> Option<Self> {
    let mut words = line.split_whitespace();
    let command = match words.next()? {
      "start" => Command::Start,
      "stop" => Command::Stop,
      "resize" => Command::Resize(words.next()?.parse().ok()?),
      "quit" | "exit" => Command::Quit,
      _ => return None,
    };
    words.next().is_none().then_some(command)
  }
}

async fn read_commands(tx: mpsc::UnboundedSender<Command>) {
  let mut lines = BufReader::new(tokio::io::stdin()).lines();
  loop {
    match lines.next_line().await {
      Ok(Some(line)) if line.trim().is_empty() => {}
      Ok(Some(line)) => match Command::parse(&line) {
        Some(command) => {
          if tx.send(command).is_err() {
            break;
          }
        }
        None => warn!("未知命令: {} (可用: start, stop, resize <ratio>, quit)", line.trim()),
      },
      Ok(None) => {
        info!("标准输入已关闭, 使用 Ctrl-C 退出");
        break;
      }
      Err(e) => {
        warn!("读取标准输入失败: {}", e);
        break;
      }
    }
  }
}

fn spawn_start(controller: &LifecycleController<Lookout>) {
  let controller = controller.clone();
  tokio::task::spawn_local(async move { controller.start().await });
}

async fn run(args: Args) -> Result<()> {
  let camera = ImageSequenceCamera::from_url(&args.input)?;
  let loader = ReplayDetectorLoader::from_url(&args.model)?;

  let surface = Rc::new(match &args.font {
    Some(path) => ImageSurface::with_font_file(path, LABEL_FONT_SIZE)?,
    None => ImageSurface::new()?,
  });
  surface.set_device_pixel_ratio(args.device_pixel_ratio);

  let clock = match &args.output {
    Some(url) => ClockWrapper::Present(
      DirectoryPresenterBuilder::from_url(url)?
        .default_fps(args.fps)
        .build(Rc::clone(&surface)),
    ),
    None => ClockWrapper::Interval(IntervalClock::with_fps(args.fps)),
  };

  let controller = LifecycleController::<Lookout>::new(
    Collaborators {
      camera,
      loader,
      surface: Rc::clone(&surface),
      clock,
      status: TracingStatus::default(),
      triggers: TracingTriggers::default(),
    },
    ControllerConfig {
      min_confidence: args.confidence,
      ..Default::default()
    },
  );
  controller.warm_up();

  let (tx, mut rx) = mpsc::unbounded_channel();
  let interrupt = tx.clone();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = interrupt.send(Command::Quit);
  })?;
  tokio::task::spawn_local(read_commands(tx));

  if !args.manual {
    spawn_start(&controller);
  }

  while let Some(command) = rx.recv().await {
    match command {
      Command::Start => spawn_start(&controller),
      Command::Stop => controller.stop(),
      Command::Resize(ratio) => {
        surface.set_device_pixel_ratio(ratio);
        controller.refresh_layout();
      }
      Command::Quit => {
        controller.stop();
        break;
      }
    }
  }

  info!("最后状态: {}", controller.collaborators().status.current());
  Ok(())
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("检测器: {}", args.model);
  info!("输入来源: {}", args.input);
  if let Some(output) = &args.output {
    info!("输出路径: {}", output);
  }
  info!("置信度阈值: {}", args.confidence);

  let runtime = tokio::runtime::Builder::new_current_thread()
    .enable_all()
    .build()?;
  let result = LocalSet::new().block_on(&runtime, run(args));
  // 标准输入的阻塞读取不会自行结束
  runtime.shutdown_timeout(Duration::from_millis(100));
  result
}
