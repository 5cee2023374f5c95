// 该文件是 Guoxian （果鲜） 项目的一部分。
// src/input/v4l_input.rs - V4L2 摄像头输入
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

use image::{ImageFormat, RgbImage};
use tracing::{error, info, warn};
use url::Url;
use v4l::{
  FourCC, buffer::Type, io::mmap::Stream, io::traits::CaptureStream, prelude::*,
  video::Capture,
};

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  input::{FrameSource, InputError, InputSourceType, query_number},
};

const V4L_SCHEME: &str = "v4l";

const BUFFER_COUNT: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PixelFormat {
  Rgb3,
  Yuyv,
  Mjpg,
}

impl PixelFormat {
  fn from_fourcc(fourcc: FourCC) -> Option<Self> {
    match &fourcc.repr {
      b"RGB3" => Some(PixelFormat::Rgb3),
      b"YUYV" => Some(PixelFormat::Yuyv),
      b"MJPG" => Some(PixelFormat::Mjpg),
      _ => None,
    }
  }
}

/// V4L2 摄像头输入
///
/// 优先协商 YUYV，驱动拒绝时沿用设备当前格式（需为 RGB3/YUYV/MJPG）。
/// 捕获流在设备之前释放。
pub struct V4lInput {
  stream: Option<Stream<'static>>,
  device: Device,
  device_path: String,
  format: PixelFormat,
  width: u32,
  height: u32,
  index: u64,
  start_time: Instant,
}

impl V4lInput {
  pub fn open(device_path: &str) -> Result<Self, InputError> {
    Self::open_with_size(device_path, 640, 480)
  }

  pub fn open_with_size(device_path: &str, width: u32, height: u32) -> Result<Self, InputError> {
    let device = Device::with_path(device_path).map_err(|e| InputError::SourceUnavailable {
      source_id: device_path.to_string(),
      reason: e.to_string(),
    })?;

    let mut format = device.format()?;
    format.width = width;
    format.height = height;
    format.fourcc = FourCC::new(b"YUYV");
    let format = match device.set_format(&format) {
      Ok(format) => format,
      Err(e) => {
        warn!("设备 {} 无法设置格式: {}", device_path, e);
        device.format()?
      }
    };
    let pixel_format = PixelFormat::from_fourcc(format.fourcc)
      .ok_or_else(|| InputError::V4lError(format!("不支持的像素格式 {}", format.fourcc)))?;

    let stream = Stream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT)
      .map_err(|e| InputError::V4lError(format!("无法创建捕获流: {}", e)))?;

    info!(
      "已连接摄像头 {} ({}x{}, {})",
      device_path, format.width, format.height, format.fourcc
    );

    Ok(V4lInput {
      stream: Some(stream),
      device,
      device_path: device_path.to_string(),
      format: pixel_format,
      width: format.width,
      height: format.height,
      index: 0,
      start_time: Instant::now(),
    })
  }

  pub fn device(&self) -> &Device {
    &self.device
  }

  fn decode(&self, data: &[u8]) -> Result<RgbImage, InputError> {
    let image = match self.format {
      PixelFormat::Rgb3 => {
        let size = (self.width * self.height * 3) as usize;
        if data.len() < size {
          return Err(InputError::V4lError(format!(
            "缓冲区大小不匹配: 期望 {} 字节, 实际 {} 字节",
            size,
            data.len()
          )));
        }
        RgbImage::from_raw(self.width, self.height, data[..size].to_vec())
      }
      PixelFormat::Yuyv => RgbImage::from_raw(self.width, self.height, yuyv_to_rgb(data)),
      PixelFormat::Mjpg => {
        return Ok(image::load_from_memory_with_format(data, ImageFormat::Jpeg)?.to_rgb8());
      }
    };
    image.ok_or_else(|| InputError::V4lError("无法创建 RGB 图像".to_string()))
  }
}

impl Drop for V4lInput {
  fn drop(&mut self) {
    self.stream.take();
  }
}

/// 将 YUYV 格式转换为 RGB
fn yuyv_to_rgb(yuyv: &[u8]) -> Vec<u8> {
  let mut rgb = Vec::with_capacity(yuyv.len() / 2 * 3);

  for chunk in yuyv.chunks_exact(4) {
    let u = chunk[1] as f32 - 128.0;
    let v = chunk[3] as f32 - 128.0;
    for y in [chunk[0] as f32, chunk[2] as f32] {
      let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
      let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
      let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
      rgb.extend_from_slice(&[r, g, b]);
    }
  }

  rgb
}

impl FromUrl for V4lInput {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != V4L_SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        V4L_SCHEME,
        url.scheme()
      );
      return Err(InputError::SchemeMismatch(url.scheme().to_string()));
    }
    let width = query_number(url, "width")?.unwrap_or(640);
    let height = query_number(url, "height")?.unwrap_or(480);
    Self::open_with_size(url.path(), width, height)
  }
}

impl FromUrlWithScheme for V4lInput {
  const SCHEME: &'static str = V4L_SCHEME;
}

impl Iterator for V4lInput {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    let stream = self.stream.as_mut()?;
    let data = match stream.next() {
      Ok((buffer, _meta)) => buffer.to_vec(),
      Err(e) => return Some(Err(InputError::V4lError(format!("无法捕获帧: {}", e)))),
    };
    let image = match self.decode(&data) {
      Ok(image) => image,
      Err(e) => return Some(Err(e)),
    };
    let frame = Frame::new(
      image,
      self.index,
      self.start_time.elapsed().as_millis() as u64,
    );
    self.index += 1;
    Some(Ok(frame))
  }
}

impl FrameSource for V4lInput {
  fn source_type(&self) -> InputSourceType {
    InputSourceType::Camera
  }

  fn describe(&self) -> String {
    format!("摄像头 {} ({}x{})", self.device_path, self.width, self.height)
  }
}
