// 该文件是 Guoxian （果鲜） 项目的一部分。
// src/output/draw.rs - 检测结果可视化
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

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use tracing::{debug, warn};

use crate::{model::Detection, output::OutputError, utils::hsv_to_rgb};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_TEXT_HEIGHT: i32 = 20;
const LABEL_CHAR_WIDTH: f32 = 9.0; // 每字符平均宽度（粗略估计）
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

const SYSTEM_FONT_PATHS: [&str; 4] = [
  "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/TTF/DejaVuSans.ttf",
  "/usr/share/fonts/dejavu/DejaVuSans.ttf",
  "/System/Library/Fonts/Supplemental/Arial.ttf",
];

/// 标注器：复制输入帧，在副本上为每个检测结果画框并在框左上角上方写标签
///
/// 没有可用字体时只画框和标签底色。
#[derive(Clone)]
pub struct Annotator {
  font: Option<FontArc>,
  font_size: f32,
}

impl Default for Annotator {
  fn default() -> Self {
    Self::new()
  }
}

impl Annotator {
  pub fn new() -> Self {
    Self {
      font: None,
      font_size: LABEL_FONT_SIZE,
    }
  }

  pub fn with_font_file(mut self, path: &Path) -> Result<Self, OutputError> {
    let data = std::fs::read(path)?;
    let font = FontArc::try_from_vec(data)
      .map_err(|_| OutputError::InvalidFont(path.display().to_string()))?;
    self.font = Some(font);
    Ok(self)
  }

  /// 依次尝试常见的系统字体路径
  pub fn with_system_font(mut self) -> Self {
    for path in SYSTEM_FONT_PATHS {
      let path = Path::new(path);
      if !path.exists() {
        continue;
      }
      match Annotator::new().with_font_file(path) {
        Ok(annotator) => {
          debug!("使用系统字体: {}", path.display());
          self.font = annotator.font;
          return self;
        }
        Err(e) => warn!("系统字体不可用 {}: {}", path.display(), e),
      }
    }
    warn!("未找到可用字体，标注将不包含文字");
    self
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  /// 标签文本：类别 + 两位小数置信度
  pub fn label_text(detection: &Detection) -> String {
    format!("{} {:.2}", detection.label, detection.confidence)
  }

  /// 标签左上角坐标，紧贴检测框上边缘
  pub fn label_anchor(detection: &Detection) -> (i32, i32) {
    let x = detection.bbox.x1.max(0);
    let y = (detection.bbox.y1 - LABEL_TEXT_HEIGHT).max(0);
    (x, y)
  }

  /// 同一类别总是同一种颜色
  pub fn color_for(label: &str) -> Rgb<u8> {
    // FNV-1a
    let hash = label
      .bytes()
      .fold(0x811c9dc5u32, |h, b| (h ^ b as u32).wrapping_mul(0x01000193));
    let hue = (hash % 360) as f32;
    hsv_to_rgb(hue, 0.8, 0.9)
  }

  pub fn annotate(&self, image: &RgbImage, detections: &[Detection]) -> RgbImage {
    let mut annotated = image.clone();
    for detection in detections {
      self.draw_detection(&mut annotated, detection);
    }
    annotated
  }

  fn draw_detection(&self, image: &mut RgbImage, detection: &Detection) {
    let bbox = detection.bbox.clip(image.width(), image.height());
    if bbox.is_empty() {
      return;
    }
    let color = Self::color_for(&detection.label);

    // 绘制边框（加粗为2像素）
    let (width, height) = (bbox.width(), bbox.height());
    draw_hollow_rect_mut(image, Rect::at(bbox.x1, bbox.y1).of_size(width, height), color);
    if width > 2 && height > 2 {
      let inner = Rect::at(bbox.x1 + 1, bbox.y1 + 1).of_size(width - 2, height - 2);
      draw_hollow_rect_mut(image, inner, color);
    }

    let label = Self::label_text(detection);
    let (label_x, label_y) = Self::label_anchor(detection);
    let scale = PxScale::from(self.font_size);
    let text_width = match &self.font {
      Some(font) => text_size(scale, font, &label).0 as i32 + 2,
      None => (label.len() as f32 * LABEL_CHAR_WIDTH) as i32,
    };

    // 确保标签不超出图像边界
    let max_width = (image.width() as i32 - label_x).max(0);
    let label_width = text_width.min(max_width) as u32;
    if label_width == 0 {
      return;
    }
    let rect = Rect::at(label_x, label_y).of_size(label_width, LABEL_TEXT_HEIGHT as u32);
    draw_filled_rect_mut(image, rect, color);

    if let Some(font) = &self.font {
      draw_text_mut(
        image,
        TEXT_COLOR,
        label_x + 1,
        label_y + LABEL_TEXT_VERTICAL_PADDING,
        scale,
        font,
        &label,
      );
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn frame() -> RgbImage {
    RgbImage::from_fn(160, 120, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 90]))
  }

  #[test]
  fn no_detections_returns_identical_copy() {
    let image = frame();
    let annotated = Annotator::new().annotate(&image, &[]);
    assert_eq!(annotated, image);
  }

  #[test]
  fn annotate_draws_on_copy_only() {
    let image = frame();
    let before = image.clone();
    let detection = Detection::new([40, 50, 100, 110], "apple", 0.876);

    let annotated = Annotator::new().annotate(&image, &[detection]);

    assert_eq!(image, before);
    let color = Annotator::color_for("apple");
    assert_eq!(*annotated.get_pixel(40, 80), color);
    assert_eq!(*annotated.get_pixel(99, 80), color);
    assert_eq!(*annotated.get_pixel(70, 50), color);
    // 框内部保持不变
    assert_eq!(annotated.get_pixel(70, 80), image.get_pixel(70, 80));
    // 标签底色位于框上方
    assert_eq!(*annotated.get_pixel(41, 35), color);
  }

  #[test]
  fn label_combines_name_and_confidence() {
    let detection = Detection::new([10, 30, 20, 40], "banana", 0.5);
    assert_eq!(Annotator::label_text(&detection), "banana 0.50");
    assert_eq!(Annotator::label_anchor(&detection), (10, 10));

    let at_top = Detection::new([5, 3, 20, 40], "banana", 0.987);
    assert_eq!(Annotator::label_text(&at_top), "banana 0.99");
    assert_eq!(Annotator::label_anchor(&at_top), (5, 0));
  }

  #[test]
  fn boxes_outside_the_frame_are_skipped() {
    let image = frame();
    let detection = Detection::new([500, 500, 600, 600], "apple", 0.9);
    assert_eq!(Annotator::new().annotate(&image, &[detection]), image);
  }
}
