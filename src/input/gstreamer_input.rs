// 该文件是 Guoxian （果鲜） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 视频文件/网络流输入
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

use std::time::Instant;

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use image::RgbImage;
use tracing::{error, info, warn};

use crate::{
  frame::Frame,
  input::{FrameSource, InputError, InputSourceType},
};

fn gst_error(e: impl std::fmt::Display) -> InputError {
  InputError::GStreamerError(e.to_string())
}

/// 等待管道进入 PAUSED 的最长时间
const PREROLL_TIMEOUT_SECS: u64 = 10;

const RGB_SINK: &str = "videoconvert ! video/x-raw,format=RGB ! appsink max-buffers=2 name=sink";

fn uri_description(uri: &str) -> String {
  format!("uridecodebin uri=\"{}\" ! {}", uri, RGB_SINK)
}

fn camera_description(device: &str) -> String {
  format!("v4l2src device={} ! {}", device, RGB_SINK)
}

/// GStreamer 解码输入
///
/// 通过 `uridecodebin` 打开视频文件或 rtsp/http 流，或通过 `v4l2src` 打开摄像头，
/// 统一转换为 RGB 后由 appsink 取帧。
/// 打开时等待管道预卷，地址错误或无法解码在打开阶段即报告。
/// 流结束时迭代器返回 `None`；迭代器被丢弃时管道置为 Null。
pub struct GStreamerInput {
  source_id: String,
  source_type: InputSourceType,
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  index: u64,
  start_time: Instant,
}

impl GStreamerInput {
  pub fn open(uri: &str) -> Result<Self, InputError> {
    Self::launch(&uri_description(uri), uri, InputSourceType::Video)
  }

  /// 通过 `v4l2src` 打开摄像头设备，如 `/dev/video0`
  pub fn open_camera(device: &str) -> Result<Self, InputError> {
    Self::launch(&camera_description(device), device, InputSourceType::Camera)
  }

  fn launch(
    description: &str,
    source_id: &str,
    source_type: InputSourceType,
  ) -> Result<Self, InputError> {
    gst::init().map_err(gst_error)?;
    info!("GStreamer pipeline description: {}", description);

    let pipeline = gst::parse::launch(description)
      .map_err(gst_error)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| gst_error("Failed to create pipeline"))?;

    let appsink = pipeline
      .by_name("sink")
      .ok_or_else(|| gst_error("Failed to get appsink element"))?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| gst_error("Failed to convert element to appsink"))?;

    let input = GStreamerInput {
      source_id: source_id.to_string(),
      source_type,
      pipeline,
      appsink,
      index: 0,
      start_time: Instant::now(),
    };

    if let Err(e) = input.pipeline.set_state(gst::State::Playing) {
      let reason = input.bus_error().unwrap_or_else(|| e.to_string());
      return Err(input.unavailable(reason));
    }
    input.wait_for_preroll()?;
    Ok(input)
  }

  /// 阻塞到管道完成状态切换，期间总线上的错误视为无法打开
  fn wait_for_preroll(&self) -> Result<(), InputError> {
    let (result, current, _) = self
      .pipeline
      .state(gst::ClockTime::from_seconds(PREROLL_TIMEOUT_SECS));
    if let Some(reason) = self.bus_error() {
      return Err(self.unavailable(reason));
    }
    match result {
      Ok(gst::StateChangeSuccess::Async) => Err(self.unavailable(format!(
        "{} 秒内未完成预卷，当前状态 {:?}",
        PREROLL_TIMEOUT_SECS, current
      ))),
      Ok(_) => Ok(()),
      Err(e) => Err(self.unavailable(e.to_string())),
    }
  }

  fn bus_error(&self) -> Option<String> {
    let message = self
      .pipeline
      .bus()?
      .pop_filtered(&[gst::MessageType::Error])?;
    match message.view() {
      gst::MessageView::Error(err) => Some(err.error().to_string()),
      _ => None,
    }
  }

  fn unavailable(&self, reason: String) -> InputError {
    error!("无法打开 {}: {}", self.source_id, reason);
    InputError::SourceUnavailable {
      source_id: self.source_id.clone(),
      reason,
    }
  }

  fn pull_sample(&self) -> Option<gst::Sample> {
    if self.appsink.is_eos() {
      return None;
    }
    self
      .appsink
      .pull_sample()
      .map_err(|e| {
        error!("Failed to pull sample: {}", e);
        e
      })
      .ok()
  }

  fn make_frame(&mut self, image: RgbImage, pts_ms: Option<u64>) -> Frame {
    let timestamp_ms = pts_ms.unwrap_or_else(|| self.start_time.elapsed().as_millis() as u64);
    let frame = Frame::new(image, self.index, timestamp_ms);
    self.index += 1;
    frame
  }
}

impl Drop for GStreamerInput {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer pipeline: {}", e);
    }
  }
}

impl Iterator for GStreamerInput {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    let sample = self.pull_sample()?;
    let pts_ms = sample
      .buffer()
      .and_then(|b| b.pts())
      .map(|pts| pts.mseconds());
    match convert_sample(sample) {
      Ok(image) => Some(Ok(self.make_frame(image, pts_ms))),
      Err(e) => {
        error!("Failed to fetch sample: {}", e);
        Some(Err(e))
      }
    }
  }
}

impl FrameSource for GStreamerInput {
  fn source_type(&self) -> InputSourceType {
    self.source_type
  }

  fn describe(&self) -> String {
    match self.source_type {
      InputSourceType::Camera => format!("摄像头 {}", self.source_id),
      _ => format!("视频 {}", self.source_id),
    }
  }
}

fn convert_sample(sample: gst::Sample) -> Result<RgbImage, InputError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| gst_error("No buffer in sample"))?;
  let caps = sample.caps().ok_or_else(|| gst_error("No caps in sample"))?;
  let video_info = gst_video::VideoInfo::from_caps(caps)
    .map_err(|_| gst_error("Failed to get video info from caps"))?;

  if video_info.format() != gst_video::VideoFormat::Rgb {
    return Err(gst_error("Unsupported video format"));
  }

  let width = video_info.width();
  let height = video_info.height();
  let stride = video_info.stride()[0] as usize;
  let row = width as usize * 3;

  let map = buffer
    .map_readable()
    .map_err(|e| gst_error(format!("Failed to map buffer for reading: {}", e)))?;
  let data = map.as_slice();
  if height == 0 || data.len() < stride * (height as usize - 1) + row {
    return Err(gst_error(format!(
      "Buffer size mismatch: expected {} bytes, got {} bytes",
      stride * height as usize,
      data.len()
    )));
  }

  // 行之间可能有对齐填充
  let mut pixels = Vec::with_capacity(row * height as usize);
  for y in 0..height as usize {
    pixels.extend_from_slice(&data[y * stride..y * stride + row]);
  }
  RgbImage::from_raw(width, height, pixels).ok_or_else(|| gst_error("无法创建 RGB 图像"))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn descriptions_end_in_rgb_appsink() {
    assert_eq!(
      uri_description("file:///tmp/shelf.mp4"),
      "uridecodebin uri=\"file:///tmp/shelf.mp4\" ! videoconvert ! video/x-raw,format=RGB ! appsink max-buffers=2 name=sink"
    );
    assert!(camera_description("/dev/video2").starts_with("v4l2src device=/dev/video2 ! "));
    assert!(camera_description("/dev/video2").ends_with(RGB_SINK));
  }

  #[test]
  fn missing_file_fails_at_open() {
    let result = GStreamerInput::open("file:///nonexistent/guoxian/shelf.mp4");
    assert!(result.is_err());
  }

  #[test]
  fn missing_camera_fails_at_open() {
    let result = GStreamerInput::open_camera("/dev/video-guoxian-missing");
    assert!(result.is_err());
  }
}
