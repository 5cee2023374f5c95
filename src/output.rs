// 该文件是 Guoxian （果鲜） 项目的一部分。
// src/output.rs - 输出定义
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

use std::path::Path;

use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("无法加载字体 {0}")]
  InvalidFont(String),
  #[error("不支持的输出目标: {0}")]
  UnsupportedTarget(String),
  #[cfg(feature = "gstreamer_output")]
  #[error("视频编码错误: {0}")]
  VideoError(String),
}

/// 展示标注后的帧
pub trait Viewer {
  fn show(&mut self, image: &RgbImage) -> Result<(), OutputError>;
}

impl<V: Viewer + ?Sized> Viewer for Box<V> {
  fn show(&mut self, image: &RgbImage) -> Result<(), OutputError> {
    (**self).show(image)
  }
}

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];
const VIDEO_EXTENSIONS: [&str; 3] = ["mp4", "mkv", "avi"];

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
  path
    .extension()
    .and_then(|e| e.to_str())
    .map(|e| extensions.contains(&e.to_ascii_lowercase().as_str()))
    .unwrap_or(false)
}

/// 根据扩展名判断路径是否指向单张图片
pub fn is_image_path(path: &Path) -> bool {
  has_extension(path, &IMAGE_EXTENSIONS)
}

/// 根据扩展名判断路径是否指向视频文件
pub fn is_video_path(path: &Path) -> bool {
  has_extension(path, &VIDEO_EXTENSIONS)
}

pub mod draw;

mod directory_record;
pub use self::directory_record::FrameRecorder;

mod preview;
pub use self::preview::PreviewViewer;

#[cfg(feature = "gstreamer_output")]
mod video_record;
#[cfg(feature = "gstreamer_output")]
pub use self::video_record::VideoWriter;
