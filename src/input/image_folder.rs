// 该文件是 Guoxian （果鲜） 项目的一部分。
// src/input/image_folder.rs - 图片/图片目录输入
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
  collections::VecDeque,
  fs,
  path::{Path, PathBuf},
};

use image::{ImageReader, RgbImage};
use tracing::{debug, error, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  input::{FrameSource, InputError, InputSourceType},
  output::is_image_path,
};

const READ_IMAGE_FILE_SCHEME: &str = "image";

/// 图片目录按 25 fps 估算时间戳
const FRAME_INTERVAL_MS: u64 = 40;

/// 单张图片或图片目录输入
///
/// 目录中的图片按文件名字典序依次产出；单张图片在打开时即解码，
/// 因此损坏的文件会在运行开始前报错。
pub struct ImageFolderInput {
  root: PathBuf,
  first: Option<RgbImage>,
  pending: VecDeque<PathBuf>,
  index: u64,
}

impl ImageFolderInput {
  pub const FOLDER_SCHEME: &'static str = "folder";

  pub fn open(path: &Path) -> Result<Self, InputError> {
    if path.is_dir() {
      let mut files = fs::read_dir(path)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_image_path(p))
        .collect::<Vec<_>>();
      files.sort();
      if files.is_empty() {
        warn!("目录 {} 中没有图片", path.display());
      }
      debug!("目录 {} 中共 {} 张图片", path.display(), files.len());
      return Ok(ImageFolderInput {
        root: path.to_path_buf(),
        first: None,
        pending: files.into(),
        index: 0,
      });
    }

    let image = ImageReader::open(path)?.decode()?.to_rgb8();
    Ok(ImageFolderInput {
      root: path.to_path_buf(),
      first: Some(image),
      pending: VecDeque::new(),
      index: 0,
    })
  }

  /// 剩余帧数
  pub fn remaining(&self) -> usize {
    self.pending.len() + usize::from(self.first.is_some())
  }

  fn make_frame(&mut self, image: RgbImage) -> Frame {
    let frame = Frame::new(image, self.index, self.index * FRAME_INTERVAL_MS);
    self.index += 1;
    frame
  }
}

impl FromUrl for ImageFolderInput {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != READ_IMAGE_FILE_SCHEME && url.scheme() != Self::FOLDER_SCHEME {
      error!(
        "URI scheme mismatch: expected '{}' or '{}', found '{}'",
        READ_IMAGE_FILE_SCHEME,
        Self::FOLDER_SCHEME,
        url.scheme()
      );
      return Err(InputError::SchemeMismatch(url.scheme().to_string()));
    }

    let path = urlencoding::decode(url.path()).map_err(|_| InputError::InvalidParameter {
      name: "path".to_string(),
      value: url.path().to_string(),
    })?;
    Self::open(Path::new(path.as_ref()))
  }
}

impl FromUrlWithScheme for ImageFolderInput {
  const SCHEME: &'static str = READ_IMAGE_FILE_SCHEME;
}

impl Iterator for ImageFolderInput {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    if let Some(image) = self.first.take() {
      return Some(Ok(self.make_frame(image)));
    }
    let path = self.pending.pop_front()?;
    let decoded = ImageReader::open(&path)
      .map_err(InputError::from)
      .and_then(|reader| reader.decode().map_err(InputError::from));
    match decoded {
      Ok(image) => Some(Ok(self.make_frame(image.to_rgb8()))),
      Err(e) => {
        error!("读取图片 {} 失败: {}", path.display(), e);
        Some(Err(e))
      }
    }
  }
}

impl FrameSource for ImageFolderInput {
  fn source_type(&self) -> InputSourceType {
    InputSourceType::ImageFolder
  }

  fn describe(&self) -> String {
    format!("图片 {}", self.root.display())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  fn write_image(path: &Path, value: u8) {
    RgbImage::from_pixel(8, 6, Rgb([value, value, value]))
      .save(path)
      .unwrap();
  }

  #[test]
  fn test_directory_is_sorted_and_filtered() {
    let dir = tempfile::tempdir().unwrap();
    write_image(&dir.path().join("b.png"), 20);
    write_image(&dir.path().join("a.png"), 10);
    fs::write(dir.path().join("notes.txt"), "skip").unwrap();

    let input = ImageFolderInput::open(dir.path()).unwrap();
    assert_eq!(input.remaining(), 2);
    let frames = input.collect::<Result<Vec<_>, _>>().unwrap();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].image.get_pixel(0, 0), &Rgb([10, 10, 10]));
    assert_eq!(frames[1].index, 1);
    assert_eq!(frames[1].timestamp_ms, FRAME_INTERVAL_MS);
  }

  #[test]
  fn test_single_image_yields_one_frame() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shelf.png");
    write_image(&path, 99);

    let url = Url::parse(&format!("image://{}", path.display())).unwrap();
    let mut input = ImageFolderInput::from_url(&url).unwrap();
    let frame = input.next().unwrap().unwrap();
    assert_eq!((frame.width(), frame.height()), (8, 6));
    assert!(input.next().is_none());
  }

  #[test]
  fn test_missing_file_fails_on_open() {
    assert!(ImageFolderInput::open(Path::new("/nonexistent/shelf.png")).is_err());
  }

  #[test]
  fn test_corrupt_file_in_directory_is_per_frame_error() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("broken.png"), b"not a png").unwrap();
    let mut input = ImageFolderInput::open(dir.path()).unwrap();
    assert!(matches!(input.next(), Some(Err(_))));
    assert!(input.next().is_none());
  }
}
