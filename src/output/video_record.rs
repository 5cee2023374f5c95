// 该文件是 Guoxian （果鲜） 项目的一部分。
// src/output/video_record.rs - GStreamer 视频文件输出
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


use std::path::{Path, PathBuf};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use image::RgbImage;
use tracing::{info, warn};

use crate::output::OutputError;

fn video_error(e: impl std::fmt::Display) -> OutputError {
  OutputError::VideoError(e.to_string())
}

/// 结束时等待封装器写完文件尾的最长时间
const EOS_TIMEOUT_SECS: u64 = 5;

fn encoder_description(path: &Path) -> Result<String, OutputError> {
  let muxer = match path
    .extension()
    .and_then(|e| e.to_str())
    .map(|e| e.to_ascii_lowercase())
    .as_deref()
  {
    Some("mp4") => "mp4mux",
    Some("mkv") => "matroskamux",
    Some("avi") => "avimux",
    _ => return Err(OutputError::UnsupportedTarget(path.display().to_string())),
  };
  Ok(format!(
    "appsrc name=src ! videoconvert ! video/x-raw,format=I420 ! x264enc speed-preset=fast tune=zerolatency ! h264parse ! {} ! filesink location=\"{}\"",
    muxer,
    path.display()
  ))
}

/// GStreamer 默认的 RGB 行跨度按 4 字节对齐
fn padded_rows(image: &RgbImage) -> Vec<u8> {
  let row = image.width() as usize * 3;
  let stride = (row + 3) & !3;
  if stride == row {
    return image.as_raw().clone();
  }
  let mut data = vec![0u8; stride * image.height() as usize];
  for (y, src) in image.as_raw().chunks_exact(row).enumerate() {
    data[y * stride..y * stride + row].copy_from_slice(src);
  }
  data
}

struct Encoder {
  pipeline: gst::Pipeline,
  appsrc: gst_app::AppSrc,
  width: u32,
  height: u32,
}

/// 把标注帧编码为 H.264 视频文件
///
/// 管道在收到第一帧时按帧尺寸建立，之后所有帧必须同尺寸。
/// 丢弃时发送 EOS 并等待文件写完。
pub struct VideoWriter {
  path: PathBuf,
  fps: u32,
  encoder: Option<Encoder>,
  frames: u64,
}

impl VideoWriter {
  pub fn new(path: &Path, fps: u32) -> Result<Self, OutputError> {
    encoder_description(path)?;
    Ok(VideoWriter {
      path: path.to_path_buf(),
      fps: fps.max(1),
      encoder: None,
      frames: 0,
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn start(&self, width: u32, height: u32) -> Result<Encoder, OutputError> {
    gst::init().map_err(video_error)?;
    let description = encoder_description(&self.path)?;
    info!("创建视频输出管道: {}", description);

    let pipeline = gst::parse::launch(&description)
      .map_err(video_error)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| video_error("Failed to create pipeline"))?;
    let appsrc = pipeline
      .by_name("src")
      .ok_or_else(|| video_error("Failed to get appsrc element"))?
      .downcast::<gst_app::AppSrc>()
      .map_err(|_| video_error("Failed to convert element to appsrc"))?;

    let caps = gst::Caps::builder("video/x-raw")
      .field("format", "RGB")
      .field("width", width as i32)
      .field("height", height as i32)
      .field("framerate", gst::Fraction::new(self.fps as i32, 1))
      .build();
    appsrc.set_caps(Some(&caps));
    appsrc.set_format(gst::Format::Time);

    pipeline.set_state(gst::State::Playing).map_err(video_error)?;
    info!(
      "视频输出: {}x{} @ {} fps -> {}",
      width,
      height,
      self.fps,
      self.path.display()
    );
    Ok(Encoder {
      pipeline,
      appsrc,
      width,
      height,
    })
  }

  pub fn write(&mut self, image: &RgbImage) -> Result<(), OutputError> {
    if self.encoder.is_none() {
      self.encoder = Some(self.start(image.width(), image.height())?);
    }
    let Some(encoder) = self.encoder.as_ref() else {
      return Err(video_error("编码管道未建立"));
    };
    if (image.width(), image.height()) != (encoder.width, encoder.height) {
      return Err(video_error(format!(
        "帧尺寸 {}x{} 与视频尺寸 {}x{} 不一致",
        image.width(),
        image.height(),
        encoder.width,
        encoder.height
      )));
    }

    let frame_ns = 1_000_000_000 / self.fps as u64;
    let mut buffer = gst::Buffer::from_slice(padded_rows(image));
    if let Some(buffer) = buffer.get_mut() {
      buffer.set_pts(gst::ClockTime::from_nseconds(self.frames * frame_ns));
      buffer.set_duration(gst::ClockTime::from_nseconds(frame_ns));
    }
    encoder
      .appsrc
      .push_buffer(buffer)
      .map_err(|e| video_error(format!("Failed to push buffer: {:?}", e)))?;
    self.frames += 1;
    Ok(())
  }

  /// 结束编码；重复调用无效果
  pub fn finish(&mut self) {
    let Some(encoder) = self.encoder.take() else {
      return;
    };
    if let Err(e) = encoder.appsrc.end_of_stream() {
      warn!("发送 EOS 失败: {:?}", e);
    }
    if let Some(bus) = encoder.pipeline.bus()
      && let Some(message) = bus.timed_pop_filtered(
        gst::ClockTime::from_seconds(EOS_TIMEOUT_SECS),
        &[gst::MessageType::Eos, gst::MessageType::Error],
      )
      && let gst::MessageView::Error(err) = message.view()
    {
      warn!("视频输出管道错误: {}", err.error());
    }
    if let Err(e) = encoder.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer video output pipeline: {}", e);
    }
    info!("视频输出结束，共写入 {} 帧: {}", self.frames, self.path.display());
  }
}

impl Drop for VideoWriter {
  fn drop(&mut self) {
    self.finish();
  }
}
