// 该文件是 Guoxian （果鲜） 项目的一部分。
// src/frame.rs - 帧与检测框定义
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

use image::RgbImage;

/// 单帧图像
///
/// 帧只在一次循环迭代内由流水线持有，不跨迭代保留。
#[derive(Debug, Clone)]
pub struct Frame {
  /// RGB 图像数据
  pub image: RgbImage,
  /// 帧索引（从 0 开始）
  pub index: u64,
  /// 时间戳（毫秒）
  pub timestamp_ms: u64,
}

impl Frame {
  pub fn new(image: RgbImage, index: u64, timestamp_ms: u64) -> Self {
    Self {
      image,
      index,
      timestamp_ms,
    }
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }
}

/// 像素坐标下的检测框 [x1, y1, x2, y2)，右下角不包含
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct BBox {
  pub x1: i32,
  pub y1: i32,
  pub x2: i32,
  pub y2: i32,
}

impl BBox {
  pub const fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
    Self { x1, y1, x2, y2 }
  }

  pub fn width(&self) -> u32 {
    (self.x2 - self.x1).max(0) as u32
  }

  pub fn height(&self) -> u32 {
    (self.y2 - self.y1).max(0) as u32
  }

  pub fn area(&self) -> u64 {
    self.width() as u64 * self.height() as u64
  }

  pub fn is_empty(&self) -> bool {
    self.area() == 0
  }

  /// 裁剪到 `width` x `height` 的图像范围内
  pub fn clip(&self, width: u32, height: u32) -> BBox {
    let (w, h) = (width as i32, height as i32);
    BBox {
      x1: self.x1.clamp(0, w),
      y1: self.y1.clamp(0, h),
      x2: self.x2.clamp(0, w),
      y2: self.y2.clamp(0, h),
    }
  }
}

impl From<[i32; 4]> for BBox {
  fn from([x1, y1, x2, y2]: [i32; 4]) -> Self {
    BBox { x1, y1, x2, y2 }
  }
}
