// 该文件是 Guoxian （果鲜） 项目的一部分。
// src/task.rs - 货架巡检流水线
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
  fmt,
  path::PathBuf,
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  time::Duration,
};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  detector::{DetectionError, Detector, FruitDetector},
  frame::Frame,
  input::{FrameSource, InputError, open_source},
  model::ColorBlobModel,
  output::{FrameRecorder, OutputError, PreviewViewer, Viewer, draw::Annotator},
  policy::{Retry, logged, timed},
  quality::{HeuristicScorer, QualityScorer},
  sink::{
    ConfigError, ConsoleSearch, ConsoleTelemetry, EventMetadata, QualityDocument, QualityEvent,
    SearchSettings, SearchSink, TelemetrySettings, TelemetrySink, search_sink, telemetry_sink,
  },
};

/// 一次运行的配置快照
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
  /// 设备编号、路径或 URL
  pub source: String,
  /// 标注帧输出路径
  pub output_path: Option<PathBuf>,
  /// 帧数上限，0 表示不限
  pub max_frames: u64,
  pub detector_conf: f32,
  pub enable_events: bool,
  pub enable_search: bool,
  pub display: bool,
  pub location: Option<String>,
  pub camera_id: Option<String>,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      source: "0".to_string(),
      output_path: None,
      max_frames: 0,
      detector_conf: 0.3,
      enable_events: true,
      enable_search: true,
      display: false,
      location: None,
      camera_id: None,
    }
  }
}

impl PipelineConfig {
  /// 检查置信度阈值落在 [0, 1] 内
  pub fn validate(&self) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&self.detector_conf) {
      Ok(())
    } else {
      Err(ConfigError::InvalidValue {
        name: "DETECTION_CONFIDENCE",
        value: self.detector_conf.to_string(),
      })
    }
  }

  pub fn metadata(&self) -> EventMetadata {
    EventMetadata {
      location: self.location.clone(),
      camera_id: self.camera_id.clone(),
    }
  }
}

/// 运行统计，只增不减
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStatistics {
  pub frames_processed: u64,
  pub detections: u64,
  pub events_published: u64,
  pub documents_indexed: u64,
}

impl fmt::Display for RunStatistics {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "处理帧数 {}, 检测数 {}, 已发布事件 {}, 已索引文档 {}",
      self.frames_processed, self.detections, self.events_published, self.documents_indexed
    )
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
  Idle,
  Running,
  Draining,
  Closed,
  Failed,
}

/// 进程内共享的取消标志，每帧结束时检查一次
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }

  pub fn reset(&self) {
    self.0.store(false, Ordering::SeqCst);
  }
}

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("输入源不可用: {0}")]
  SourceUnavailable(#[from] InputError),
  #[error("检测失败: {0}")]
  Detection(#[from] DetectionError),
  #[error("配置错误: {0}")]
  Configuration(#[from] ConfigError),
  #[error("输出失败: {0}")]
  Output(#[from] OutputError),
}

/// 货架巡检流水线
///
/// 单线程逐帧处理：检测 → 逐个目标评分并投递到两个接收端 → 标注 → 保存/预览。
/// 接收端失败只记日志并少计一次，检测失败和输出失败终止运行；
/// 无论如何结束，输入源都会被释放，接收端都会被关闭一次。
pub struct Pipeline<D, S> {
  config: PipelineConfig,
  detector: D,
  scorer: S,
  metadata: EventMetadata,
  telemetry: Option<Box<dyn TelemetrySink>>,
  search: Option<Box<dyn SearchSink>>,
  annotator: Annotator,
  recorder: Option<FrameRecorder>,
  viewer: Option<Box<dyn Viewer>>,
  cancel: CancelFlag,
  detect_retry: Retry,
  state: RunState,
}

impl<D: Detector, S: QualityScorer> Pipeline<D, S> {
  /// 按启用标志创建日志接收端；配置了输出路径时准备好输出目录
  pub fn new(config: PipelineConfig, detector: D, scorer: S) -> Result<Self, PipelineError> {
    let telemetry: Option<Box<dyn TelemetrySink>> = config
      .enable_events
      .then(|| Box::new(ConsoleTelemetry::default()) as Box<dyn TelemetrySink>);
    let search: Option<Box<dyn SearchSink>> = config
      .enable_search
      .then(|| Box::new(ConsoleSearch::default()) as Box<dyn SearchSink>);
    let recorder = config
      .output_path
      .as_deref()
      .map(FrameRecorder::new)
      .transpose()?;
    Ok(Self {
      metadata: config.metadata(),
      config,
      detector,
      scorer,
      telemetry,
      search,
      annotator: Annotator::new(),
      recorder,
      viewer: None,
      cancel: CancelFlag::new(),
      detect_retry: Retry::new(1, Duration::ZERO),
      state: RunState::Idle,
    })
  }

  /// 替换遥测接收端；事件未启用时丢弃
  pub fn with_telemetry_sink(mut self, sink: Box<dyn TelemetrySink>) -> Self {
    if self.config.enable_events {
      self.telemetry = Some(sink);
    } else {
      debug!("质量事件未启用，忽略接收端 {}", sink.name());
    }
    self
  }

  /// 替换检索接收端；检索未启用时丢弃
  pub fn with_search_sink(mut self, sink: Box<dyn SearchSink>) -> Self {
    if self.config.enable_search {
      self.search = Some(sink);
    } else {
      debug!("检索未启用，忽略接收端 {}", sink.name());
    }
    self
  }

  pub fn with_viewer(mut self, viewer: Box<dyn Viewer>) -> Self {
    self.viewer = Some(viewer);
    self
  }

  pub fn with_recorder(mut self, recorder: FrameRecorder) -> Self {
    self.recorder = Some(recorder);
    self
  }

  pub fn with_annotator(mut self, annotator: Annotator) -> Self {
    self.annotator = annotator;
    self
  }

  pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
    self.cancel = cancel;
    self
  }

  pub fn with_detect_retry(mut self, retry: Retry) -> Self {
    self.detect_retry = retry;
    self
  }

  pub fn config(&self) -> &PipelineConfig {
    &self.config
  }

  fn transition(&mut self, next: RunState) {
    debug!("流水线状态: {:?} -> {:?}", self.state, next);
    self.state = next;
  }

  /// 消费帧序列直到上限、流结束、取消或出现致命错误
  ///
  /// 中途读取失败按流结束处理。
  pub fn run<I>(mut self, frames: I) -> Result<RunStatistics, PipelineError>
  where
    I: IntoIterator<Item = Result<Frame, InputError>>,
  {
    self.cancel.reset();
    if self.config.display && self.viewer.is_none() {
      let path = PreviewViewer::default_path();
      info!("预览画面写入 {}", path.display());
      match PreviewViewer::new(&path) {
        Ok(viewer) => self.viewer = Some(Box::new(viewer)),
        Err(e) => {
          self.close_sinks();
          self.transition(RunState::Failed);
          return Err(e.into());
        }
      }
    }

    self.transition(RunState::Running);
    let mut stats = RunStatistics::default();
    let mut frames = frames.into_iter();
    let result = self.run_loop(&mut frames, &mut stats);

    self.transition(RunState::Draining);
    drop(frames);
    self.close_sinks();

    match result {
      Ok(()) => {
        self.transition(RunState::Closed);
        info!("运行结束: {}", stats);
        Ok(stats)
      }
      Err(e) => {
        self.transition(RunState::Failed);
        Err(e)
      }
    }
  }

  fn run_loop<I>(&mut self, frames: &mut I, stats: &mut RunStatistics) -> Result<(), PipelineError>
  where
    I: Iterator<Item = Result<Frame, InputError>>,
  {
    loop {
      if self.config.max_frames != 0 && stats.frames_processed >= self.config.max_frames {
        info!("达到指定帧数 {}，退出任务循环", self.config.max_frames);
        return Ok(());
      }
      let frame = match frames.next() {
        Some(Ok(frame)) => frame,
        Some(Err(e)) => {
          warn!("读取帧失败，按输入结束处理: {}", e);
          return Ok(());
        }
        None => {
          info!("输入结束");
          return Ok(());
        }
      };
      self.process_frame(&frame, stats)?;
      if self.cancel.is_cancelled() {
        warn!("中断信号接收，退出任务循环");
        return Ok(());
      }
    }
  }

  fn process_frame(&mut self, frame: &Frame, stats: &mut RunStatistics) -> Result<(), PipelineError> {
    let detector = &self.detector;
    let detections = self
      .detect_retry
      .run("detect", || detector.detect(frame))?;

    for detection in &detections {
      let quality = self
        .scorer
        .assess(&frame.image, &detection.bbox, Some(&detection.label));

      if let Some(sink) = self.telemetry.as_mut() {
        let event = QualityEvent::new(
          &detection.label,
          &quality,
          detection.confidence,
          &self.metadata,
        );
        match sink.publish(&event) {
          Ok(()) => stats.events_published += 1,
          Err(e) => warn!("{} 发布事件失败: {}", sink.name(), e),
        }
      }

      if let Some(sink) = self.search.as_mut() {
        let document = QualityDocument::new(
          &detection.label,
          &quality,
          detection.confidence,
          &self.metadata,
        );
        match sink.index(&document) {
          Ok(()) => stats.documents_indexed += 1,
          Err(e) => warn!("{} 索引文档失败: {}", sink.name(), e),
        }
      }
    }

    let annotated = self.annotator.annotate(&frame.image, &detections);
    if let Some(recorder) = self.recorder.as_mut() {
      recorder.record(frame.index, &annotated)?;
    }
    if self.config.display
      && let Some(viewer) = self.viewer.as_mut()
    {
      viewer.show(&annotated)?;
    }

    stats.frames_processed += 1;
    stats.detections += detections.len() as u64;
    debug!(
      "处理第 {} 帧，检测到 {} 个目标",
      frame.index,
      detections.len()
    );
    Ok(())
  }
}

impl<D, S> Pipeline<D, S> {
  /// 关闭两个接收端，已关闭的不会再次关闭
  fn close_sinks(&mut self) {
    if let Some(mut sink) = self.telemetry.take()
      && let Err(e) = sink.close()
    {
      warn!("关闭 {} 失败: {}", sink.name(), e);
    }
    if let Some(mut sink) = self.search.take()
      && let Err(e) = sink.close()
    {
      warn!("关闭 {} 失败: {}", sink.name(), e);
    }
  }
}

impl<D, S> Drop for Pipeline<D, S> {
  fn drop(&mut self) {
    self.close_sinks();
  }
}

/// 命令行层面的附加选项
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
  pub telemetry: TelemetrySettings,
  pub search: SearchSettings,
  /// 类别白名单，空表示不过滤
  pub classes: Vec<String>,
  pub font: Option<PathBuf>,
  pub preview: Option<PathBuf>,
  /// 检测最多尝试次数，1 表示不重试
  pub detect_retries: u32,
}

/// 打开输入源并运行一次完整的巡检
///
/// 阈值越界或接收端凭据不完整时在打开输入源之前返回配置错误。
pub fn process_shelf_video(
  config: PipelineConfig,
  options: &RunOptions,
  cancel: CancelFlag,
) -> Result<RunStatistics, PipelineError> {
  timed("process_shelf_video", || {
    logged("process_shelf_video", || {
      config.validate()?;
      let detector = FruitDetector::new(ColorBlobModel::default(), config.detector_conf)?
        .with_classes(options.classes.iter().cloned());

      let annotator = match &options.font {
        Some(path) => Annotator::new().with_font_file(path)?,
        None => Annotator::new().with_system_font(),
      };

      let mut pipeline = Pipeline::new(config.clone(), detector, HeuristicScorer)?
        .with_annotator(annotator)
        .with_cancel_flag(cancel.clone())
        .with_detect_retry(Retry::new(
          options.detect_retries,
          Duration::from_millis(200),
        ));
      if config.enable_events {
        pipeline = pipeline.with_telemetry_sink(telemetry_sink(&options.telemetry)?);
      }
      if config.enable_search {
        pipeline = pipeline.with_search_sink(search_sink(&options.search)?);
      }
      if config.display
        && let Some(path) = &options.preview
      {
        pipeline = pipeline.with_viewer(Box::new(PreviewViewer::new(path)?));
      }

      let source = open_source(&config.source, config.max_frames)?;
      info!("开始处理 {}", source.describe());
      pipeline.run(source)
    })
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn cancel_flag_is_shared_between_clones() {
    let flag = CancelFlag::new();
    let other = flag.clone();
    other.cancel();
    assert!(flag.is_cancelled());
    flag.reset();
    assert!(!other.is_cancelled());
  }

  #[test]
  fn default_config_is_unbounded_with_sinks_enabled() {
    let config = PipelineConfig::default();
    assert_eq!(config.max_frames, 0);
    assert!(config.enable_events && config.enable_search);
    assert!(!config.display);
    assert_eq!(config.metadata(), EventMetadata::default());
  }

  #[test]
  fn statistics_serialize_with_field_names() {
    let stats = RunStatistics {
      frames_processed: 5,
      detections: 5,
      events_published: 4,
      documents_indexed: 5,
    };
    let json = serde_json::to_value(stats).unwrap();
    assert_eq!(json["events_published"], 4);
    assert_eq!(json["frames_processed"], 5);
  }
}
