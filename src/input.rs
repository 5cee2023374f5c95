// 该文件是 Guoxian （果鲜） 项目的一部分。
// src/input.rs - 帧来源
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

use std::{fmt, path::PathBuf, str::FromStr};

use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::Frame, output::is_image_path};

mod image_folder;
pub use self::image_folder::ImageFolderInput;

mod synthetic;
pub use self::synthetic::{FruitKind, SyntheticInput};

#[cfg(feature = "v4l_input")]
mod v4l_input;
#[cfg(feature = "v4l_input")]
pub use self::v4l_input::V4lInput;

#[cfg(feature = "gstreamer_input")]
mod gstreamer_input;
#[cfg(feature = "gstreamer_input")]
pub use self::gstreamer_input::GStreamerInput;

#[derive(Error, Debug)]
pub enum InputError {
  #[error("无法打开输入源 {source_id}: {reason}")]
  SourceUnavailable { source_id: String, reason: String },
  #[error("图像加载错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("URI scheme 不匹配: {0}")]
  SchemeMismatch(String),
  #[error("无效参数 {name}={value}")]
  InvalidParameter { name: String, value: String },
  #[cfg(feature = "v4l_input")]
  #[error("V4L 错误: {0}")]
  V4lError(String),
  #[cfg(feature = "gstreamer_input")]
  #[error("GStreamer 错误: {0}")]
  GStreamerError(String),
}

/// 输入源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSourceType {
  /// 单张图片或图片目录
  ImageFolder,
  /// 合成货架画面
  Synthetic,
  /// V4L2 摄像头
  Camera,
  /// 视频文件或网络流
  Video,
}

/// 帧序列
///
/// 迭代器按到达顺序产出帧；`None` 表示流结束，`Some(Err(_))` 表示读取失败。
/// 底层设备/文件句柄随迭代器一起释放。
pub trait FrameSource: Iterator<Item = Result<Frame, InputError>> {
  fn source_type(&self) -> InputSourceType;

  fn describe(&self) -> String;

  /// 限制最多产出 `max_frames` 帧，0 表示不限
  fn capped(self, max_frames: u64) -> Capped<Self>
  where
    Self: Sized,
  {
    Capped {
      inner: self,
      max_frames,
      yielded: 0,
    }
  }
}

/// 带帧数上限的帧序列
pub struct Capped<S> {
  inner: S,
  max_frames: u64,
  yielded: u64,
}

impl<S> Capped<S> {
  pub fn max_frames(&self) -> u64 {
    self.max_frames
  }

  pub fn into_inner(self) -> S {
    self.inner
  }
}

impl<S: FrameSource> Iterator for Capped<S> {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.max_frames != 0 && self.yielded >= self.max_frames {
      return None;
    }
    let item = self.inner.next()?;
    if item.is_ok() {
      self.yielded += 1;
    }
    Some(item)
  }
}

impl<S: FrameSource> FrameSource for Capped<S> {
  fn source_type(&self) -> InputSourceType {
    self.inner.source_type()
  }

  fn describe(&self) -> String {
    if self.max_frames == 0 {
      self.inner.describe()
    } else {
      format!("{} (最多 {} 帧)", self.inner.describe(), self.max_frames)
    }
  }
}

/// 输入源标识：设备编号、URL 或本地路径
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceId {
  Device(u32),
  Url(Url),
  Path(PathBuf),
}

impl FromStr for SourceId {
  type Err = InputError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s = s.trim();
    if s.is_empty() {
      return Err(InputError::InvalidParameter {
        name: "source".to_string(),
        value: String::new(),
      });
    }
    if let Ok(index) = s.parse::<u32>() {
      return Ok(SourceId::Device(index));
    }
    // 单字母 scheme 视为 Windows 盘符
    if let Ok(url) = Url::parse(s)
      && url.scheme().len() > 1
    {
      return Ok(SourceId::Url(url));
    }
    Ok(SourceId::Path(PathBuf::from(s)))
  }
}

impl fmt::Display for SourceId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SourceId::Device(index) => write!(f, "设备 {}", index),
      SourceId::Url(url) => write!(f, "{}", url),
      SourceId::Path(path) => write!(f, "{}", path.display()),
    }
  }
}

pub enum InputWrapper {
  ImageFolder(ImageFolderInput),
  Synthetic(SyntheticInput),
  #[cfg(feature = "v4l_input")]
  V4l(V4lInput),
  #[cfg(feature = "gstreamer_input")]
  GStreamer(GStreamerInput),
}

impl InputWrapper {
  fn open_device(index: u32) -> Result<Self, InputError> {
    #[cfg(feature = "v4l_input")]
    {
      let input = V4lInput::open(&format!("/dev/video{}", index))?;
      Ok(InputWrapper::V4l(input))
    }
    #[cfg(all(feature = "gstreamer_input", not(feature = "v4l_input")))]
    {
      let input = GStreamerInput::open_camera(&format!("/dev/video{}", index))?;
      Ok(InputWrapper::GStreamer(input))
    }
    #[cfg(not(any(feature = "v4l_input", feature = "gstreamer_input")))]
    {
      Err(InputError::SourceUnavailable {
        source_id: format!("/dev/video{}", index),
        reason: "摄像头需要启用 v4l_input 或 gstreamer_input 特性".to_string(),
      })
    }
  }

  fn open_path(path: PathBuf) -> Result<Self, InputError> {
    if !path.exists() {
      return Err(InputError::SourceUnavailable {
        source_id: path.display().to_string(),
        reason: "路径不存在".to_string(),
      });
    }
    if path.is_dir() || is_image_path(&path) {
      return Ok(InputWrapper::ImageFolder(ImageFolderInput::open(&path)?));
    }
    Self::open_video(&path)
  }

  #[cfg(feature = "gstreamer_input")]
  fn open_video(path: &std::path::Path) -> Result<Self, InputError> {
    let absolute = std::fs::canonicalize(path)?;
    let url = Url::from_file_path(&absolute).map_err(|_| InputError::InvalidParameter {
      name: "path".to_string(),
      value: path.display().to_string(),
    })?;
    Ok(InputWrapper::GStreamer(GStreamerInput::open(url.as_str())?))
  }

  #[cfg(not(feature = "gstreamer_input"))]
  fn open_video(path: &std::path::Path) -> Result<Self, InputError> {
    Err(InputError::SourceUnavailable {
      source_id: path.display().to_string(),
      reason: "视频文件需要启用 gstreamer_input 特性".to_string(),
    })
  }

  pub fn open(source: SourceId) -> Result<Self, InputError> {
    match source {
      SourceId::Device(index) => Self::open_device(index),
      SourceId::Path(path) => Self::open_path(path),
      SourceId::Url(url) => Self::from_url(&url),
    }
  }
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      s if s == SyntheticInput::SCHEME => {
        Ok(InputWrapper::Synthetic(SyntheticInput::from_url(url)?))
      }
      s if s == ImageFolderInput::SCHEME || s == ImageFolderInput::FOLDER_SCHEME => {
        Ok(InputWrapper::ImageFolder(ImageFolderInput::from_url(url)?))
      }
      "file" => {
        let path = url
          .to_file_path()
          .map_err(|_| InputError::SchemeMismatch(url.to_string()))?;
        Self::open_path(path)
      }
      #[cfg(feature = "v4l_input")]
      s if s == V4lInput::SCHEME => Ok(InputWrapper::V4l(V4lInput::from_url(url)?)),
      #[cfg(feature = "gstreamer_input")]
      "rtsp" | "http" | "https" => Ok(InputWrapper::GStreamer(GStreamerInput::open(
        url.as_str(),
      )?)),
      other => Err(InputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Iterator for InputWrapper {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      InputWrapper::ImageFolder(input) => input.next(),
      InputWrapper::Synthetic(input) => input.next(),
      #[cfg(feature = "v4l_input")]
      InputWrapper::V4l(input) => input.next(),
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamer(input) => input.next(),
    }
  }
}

impl FrameSource for InputWrapper {
  fn source_type(&self) -> InputSourceType {
    match self {
      InputWrapper::ImageFolder(input) => input.source_type(),
      InputWrapper::Synthetic(input) => input.source_type(),
      #[cfg(feature = "v4l_input")]
      InputWrapper::V4l(input) => input.source_type(),
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamer(input) => input.source_type(),
    }
  }

  fn describe(&self) -> String {
    match self {
      InputWrapper::ImageFolder(input) => input.describe(),
      InputWrapper::Synthetic(input) => input.describe(),
      #[cfg(feature = "v4l_input")]
      InputWrapper::V4l(input) => input.describe(),
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamer(input) => input.describe(),
    }
  }
}

/// 打开输入源并附加帧数上限
///
/// 打开失败统一归为 [`InputError::SourceUnavailable`]，在处理任何帧之前返回。
pub fn open_source(source: &str, max_frames: u64) -> Result<Capped<InputWrapper>, InputError> {
  let id: SourceId = source.parse()?;
  let input = InputWrapper::open(id).map_err(|e| match e {
    e @ InputError::SourceUnavailable { .. } => e,
    other => {
      warn!("打开输入源 {} 失败: {}", source, other);
      InputError::SourceUnavailable {
        source_id: source.to_string(),
        reason: other.to_string(),
      }
    }
  })?;
  info!("已打开输入源: {}", input.describe());
  Ok(input.capped(max_frames))
}

/// 解析 URL 查询参数中的数值
pub(crate) fn query_number<T: FromStr>(url: &Url, name: &str) -> Result<Option<T>, InputError> {
  match url.query_pairs().find(|(k, _)| k == name) {
    Some((_, v)) => v.parse::<T>().map(Some).map_err(|_| InputError::InvalidParameter {
      name: name.to_string(),
      value: v.into_owned(),
    }),
    None => Ok(None),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_source_id_device_index() {
    assert_eq!("0".parse::<SourceId>().unwrap(), SourceId::Device(0));
    assert_eq!(" 3 ".parse::<SourceId>().unwrap(), SourceId::Device(3));
  }

  #[test]
  fn test_source_id_url_and_path() {
    match "rtsp://camera.local/stream".parse::<SourceId>().unwrap() {
      SourceId::Url(url) => assert_eq!(url.scheme(), "rtsp"),
      other => panic!("unexpected {:?}", other),
    }
    assert_eq!(
      "shelf/video.mp4".parse::<SourceId>().unwrap(),
      SourceId::Path(PathBuf::from("shelf/video.mp4"))
    );
    assert_eq!(
      "C:/videos/a.mp4".parse::<SourceId>().unwrap(),
      SourceId::Path(PathBuf::from("C:/videos/a.mp4"))
    );
  }

  #[test]
  fn test_source_id_empty_is_invalid() {
    assert!(matches!(
      "  ".parse::<SourceId>(),
      Err(InputError::InvalidParameter { .. })
    ));
  }

  #[test]
  fn test_capped_stops_at_limit() {
    let url = Url::parse("synthetic://shelf?width=64&height=48").unwrap();
    let source = SyntheticInput::from_url(&url).unwrap().capped(4);
    assert_eq!(source.count(), 4);
  }

  #[test]
  fn test_capped_zero_is_unbounded() {
    let url = Url::parse("synthetic://shelf?width=64&height=48&frames=7").unwrap();
    let source = SyntheticInput::from_url(&url).unwrap().capped(0);
    assert_eq!(source.count(), 7);
  }

  #[test]
  fn test_unknown_scheme_is_rejected() {
    let url = Url::parse("ftp://example.com/a.mp4").unwrap();
    assert!(matches!(
      InputWrapper::from_url(&url),
      Err(InputError::SchemeMismatch(_))
    ));
  }

  #[test]
  fn test_query_number() {
    let url = Url::parse("synthetic://shelf?width=320&height=abc").unwrap();
    assert_eq!(query_number::<u32>(&url, "width").unwrap(), Some(320));
    assert_eq!(query_number::<u32>(&url, "frames").unwrap(), None);
    assert!(query_number::<u32>(&url, "height").is_err());
  }
}
