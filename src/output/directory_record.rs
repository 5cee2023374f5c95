// 该文件是 Guoxian （果鲜） 项目的一部分。
// src/output/directory_record.rs - 标注帧记录输出
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

use image::RgbImage;
use tracing::{debug, info};

#[cfg(feature = "gstreamer_output")]
use crate::output::VideoWriter;
use crate::output::{OutputError, is_image_path, is_video_path};

/// 视频输出的帧率
#[cfg(feature = "gstreamer_output")]
const VIDEO_FPS: u32 = 25;

enum RecordTarget {
  /// 每帧覆盖同一张图片
  Snapshot(PathBuf),
  /// 每帧一个文件 `frame-{index:06}.png`
  Directory(PathBuf),
  #[cfg(feature = "gstreamer_output")]
  Video(VideoWriter),
}

/// 把标注后的帧写到输出路径
///
/// 路径带图片扩展名时只保留最新一帧；带视频扩展名（mp4/mkv/avi）时编码为视频，
/// 需要 `gstreamer_output` 特性；否则视为目录逐帧保存。
pub struct FrameRecorder {
  target: RecordTarget,
  written: u64,
}

impl FrameRecorder {
  pub fn new(path: &Path) -> Result<Self, OutputError> {
    let target = if is_video_path(path) {
      create_parent(path)?;
      Self::video_target(path)?
    } else if is_image_path(path) {
      create_parent(path)?;
      RecordTarget::Snapshot(path.to_path_buf())
    } else {
      std::fs::create_dir_all(path)?;
      RecordTarget::Directory(path.to_path_buf())
    };
    Ok(Self { target, written: 0 })
  }

  #[cfg(feature = "gstreamer_output")]
  fn video_target(path: &Path) -> Result<RecordTarget, OutputError> {
    Ok(RecordTarget::Video(VideoWriter::new(path, VIDEO_FPS)?))
  }

  #[cfg(not(feature = "gstreamer_output"))]
  fn video_target(path: &Path) -> Result<RecordTarget, OutputError> {
    Err(OutputError::UnsupportedTarget(format!(
      "{} (视频输出需要启用 gstreamer_output 特性)",
      path.display()
    )))
  }

  fn location(&self) -> &Path {
    match &self.target {
      RecordTarget::Snapshot(path) | RecordTarget::Directory(path) => path,
      #[cfg(feature = "gstreamer_output")]
      RecordTarget::Video(writer) => writer.path(),
    }
  }

  /// 写入一帧，返回写入的文件路径
  pub fn record(&mut self, index: u64, image: &RgbImage) -> Result<PathBuf, OutputError> {
    let path = match &mut self.target {
      RecordTarget::Snapshot(path) => {
        image.save(&*path)?;
        path.clone()
      }
      RecordTarget::Directory(directory) => {
        let path = directory.join(format!("frame-{:06}.png", index));
        image.save(&path)?;
        path
      }
      #[cfg(feature = "gstreamer_output")]
      RecordTarget::Video(writer) => {
        writer.write(image)?;
        writer.path().to_path_buf()
      }
    };
    self.written += 1;
    debug!("保存标注帧到文件: {}", path.display());
    Ok(path)
  }

  pub fn written(&self) -> u64 {
    self.written
  }
}

impl Drop for FrameRecorder {
  fn drop(&mut self) {
    if self.written > 0 {
      info!("共保存 {} 帧到 {}", self.written, self.location().display());
    }
  }
}

fn create_parent(path: &Path) -> Result<(), OutputError> {
  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)?;
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn directory_target_writes_one_file_per_frame() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("annotated");
    let mut recorder = FrameRecorder::new(&out).unwrap();
    let image = RgbImage::from_pixel(4, 4, Rgb([1, 2, 3]));

    recorder.record(0, &image).unwrap();
    let second = recorder.record(7, &image).unwrap();

    assert_eq!(second, out.join("frame-000007.png"));
    assert!(out.join("frame-000000.png").exists());
    assert_eq!(recorder.written(), 2);
  }

  #[test]
  fn image_target_keeps_latest_frame() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("nested").join("latest.png");
    let mut recorder = FrameRecorder::new(&out).unwrap();

    recorder.record(0, &RgbImage::from_pixel(4, 4, Rgb([0, 0, 0]))).unwrap();
    recorder.record(1, &RgbImage::from_pixel(4, 4, Rgb([255, 0, 0]))).unwrap();

    let saved = image::open(&out).unwrap().to_rgb8();
    assert_eq!(*saved.get_pixel(0, 0), Rgb([255, 0, 0]));
  }

  #[test]
  fn video_extension_is_not_treated_as_directory() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("clips").join("shelf.mp4");
    let recorder = FrameRecorder::new(&out);

    assert!(!out.is_dir());
    #[cfg(feature = "gstreamer_output")]
    assert_eq!(recorder.unwrap().location(), out.as_path());
    #[cfg(not(feature = "gstreamer_output"))]
    assert!(matches!(recorder, Err(OutputError::UnsupportedTarget(_))));
  }
}
