// 该文件是 Guoxian （果鲜） 项目的一部分。
// src/output/preview.rs - 预览输出
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

use image::{ImageFormat, RgbImage};

use crate::output::{OutputError, Viewer};

/// 把最新的标注帧写入预览文件，供外部看图工具刷新显示
///
/// 先写临时文件再重命名，读取方不会看到写了一半的图片。
pub struct PreviewViewer {
  path: PathBuf,
  staging: PathBuf,
  format: ImageFormat,
  shown: u64,
}

impl PreviewViewer {
  pub fn new(path: &Path) -> Result<Self, OutputError> {
    let format = ImageFormat::from_path(path)?;
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    let mut staging = path.as_os_str().to_owned();
    staging.push(".partial");
    Ok(Self {
      path: path.to_path_buf(),
      staging: PathBuf::from(staging),
      format,
      shown: 0,
    })
  }

  /// 默认预览文件位于系统临时目录
  pub fn default_path() -> PathBuf {
    std::env::temp_dir().join("guoxian-preview.jpg")
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn shown(&self) -> u64 {
    self.shown
  }
}

impl Viewer for PreviewViewer {
  fn show(&mut self, image: &RgbImage) -> Result<(), OutputError> {
    image.save_with_format(&self.staging, self.format)?;
    std::fs::rename(&self.staging, &self.path)?;
    self.shown += 1;
    Ok(())
  }
}
