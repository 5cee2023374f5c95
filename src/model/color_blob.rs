// 该文件是 Guoxian （果鲜） 项目的一部分。
// src/model/color_blob.rs - 基于颜色块的经典水果检测模型
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

use std::collections::BTreeMap;
use std::convert::Infallible;

use image::{GrayImage, Luma};
use imageproc::region_labelling::{Connectivity, connected_components};

use crate::{
  frame::{BBox, Frame},
  model::{Detection, Model},
  utils::{Hsv, rgb_to_hsv},
};

const MIN_SATURATION: f32 = 0.35;
const MIN_VALUE: f32 = 0.2;
const MIN_AREA_RATIO: f32 = 0.001;
const MIN_AREA_PIXELS: u64 = 16;

/// 色相区间（度）到水果类别的映射，红色跨越 0 度单独处理
const HUE_TABLE: [(f32, f32, &str); 4] = [
  (18.0, 45.0, "orange"),
  (45.0, 70.0, "banana"),
  (70.0, 170.0, "lime"),
  (270.0, 340.0, "grape"),
];

/// 颜色块检测模型
///
/// 在 HSV 空间中按饱和度/亮度做前景分割，八连通域标记后，每个足够大的连通域
/// 输出一个检测框。类别由平均色相决定，置信度由填充率和平均饱和度决定。
/// 背景为低饱和度（灰色货架）时效果最好。
#[derive(Debug, Clone)]
pub struct ColorBlobModel {
  min_saturation: f32,
  min_value: f32,
  min_area_ratio: f32,
}

impl Default for ColorBlobModel {
  fn default() -> Self {
    Self {
      min_saturation: MIN_SATURATION,
      min_value: MIN_VALUE,
      min_area_ratio: MIN_AREA_RATIO,
    }
  }
}

impl ColorBlobModel {
  pub fn with_min_saturation(mut self, min_saturation: f32) -> Self {
    self.min_saturation = min_saturation;
    self
  }

  pub fn with_min_area_ratio(mut self, min_area_ratio: f32) -> Self {
    self.min_area_ratio = min_area_ratio;
    self
  }

  fn is_foreground(&self, hsv: &Hsv) -> bool {
    hsv.s >= self.min_saturation && hsv.v >= self.min_value
  }
}

fn label_for_hue(hue: f32) -> Option<&'static str> {
  if !(18.0..340.0).contains(&hue) {
    return Some("apple");
  }
  HUE_TABLE
    .iter()
    .find(|(low, high, _)| (*low..*high).contains(&hue))
    .map(|(_, _, label)| *label)
}

#[derive(Debug)]
struct Blob {
  min_x: u32,
  min_y: u32,
  max_x: u32,
  max_y: u32,
  pixels: u64,
  hue_sin: f32,
  hue_cos: f32,
  saturation: f32,
}

impl Blob {
  fn new(x: u32, y: u32) -> Self {
    Self {
      min_x: x,
      min_y: y,
      max_x: x,
      max_y: y,
      pixels: 0,
      hue_sin: 0.0,
      hue_cos: 0.0,
      saturation: 0.0,
    }
  }

  fn add(&mut self, x: u32, y: u32, hsv: &Hsv) {
    self.min_x = self.min_x.min(x);
    self.min_y = self.min_y.min(y);
    self.max_x = self.max_x.max(x);
    self.max_y = self.max_y.max(y);
    self.pixels += 1;
    let radians = hsv.h.to_radians();
    self.hue_sin += radians.sin();
    self.hue_cos += radians.cos();
    self.saturation += hsv.s;
  }

  fn bbox(&self) -> BBox {
    BBox::new(
      self.min_x as i32,
      self.min_y as i32,
      self.max_x as i32 + 1,
      self.max_y as i32 + 1,
    )
  }

  // 色相是环形量，取圆周平均
  fn mean_hue(&self) -> f32 {
    let hue = self.hue_sin.atan2(self.hue_cos).to_degrees();
    if hue < 0.0 { hue + 360.0 } else { hue }
  }

  fn confidence(&self) -> f32 {
    let fill = self.pixels as f32 / self.bbox().area() as f32;
    let saturation = self.saturation / self.pixels as f32;
    (0.5 * fill + 0.5 * saturation).clamp(0.0, 1.0)
  }
}

impl Model for ColorBlobModel {
  type Error = Infallible;

  fn name(&self) -> &'static str {
    "color-blob"
  }

  fn infer(&self, frame: &Frame) -> Result<Vec<Detection>, Self::Error> {
    let image = &frame.image;
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
      return Ok(Vec::new());
    }

    let hsv: Vec<Hsv> = image.pixels().map(rgb_to_hsv).collect();
    let mask = GrayImage::from_fn(width, height, |x, y| {
      if self.is_foreground(&hsv[(y * width + x) as usize]) {
        Luma([255u8])
      } else {
        Luma([0u8])
      }
    });

    let labels = connected_components(&mask, Connectivity::Eight, Luma([0u8]));
    let mut blobs: BTreeMap<u32, Blob> = BTreeMap::new();
    for (x, y, label) in labels.enumerate_pixels() {
      let id = label[0];
      if id == 0 {
        continue;
      }
      blobs
        .entry(id)
        .or_insert_with(|| Blob::new(x, y))
        .add(x, y, &hsv[(y * width + x) as usize]);
    }

    let min_pixels =
      ((width as u64 * height as u64) as f32 * self.min_area_ratio).ceil() as u64;
    let min_pixels = min_pixels.max(MIN_AREA_PIXELS);

    let detections = blobs
      .values()
      .filter(|blob| blob.pixels >= min_pixels)
      .filter_map(|blob| {
        let label = label_for_hue(blob.mean_hue())?;
        Some(Detection::new(blob.bbox(), label, blob.confidence()))
      })
      .collect();

    Ok(detections)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage};
  use imageproc::drawing::draw_filled_rect_mut;
  use imageproc::rect::Rect;

  fn shelf(width: u32, height: u32) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb([128, 128, 128]))
  }

  #[test]
  fn gray_shelf_has_no_detections() {
    let frame = Frame::new(shelf(64, 48), 0, 0);
    let detections = ColorBlobModel::default().infer(&frame).unwrap();
    assert!(detections.is_empty());
  }

  #[test]
  fn solid_patches_are_labelled_by_hue() {
    let mut image = shelf(120, 80);
    draw_filled_rect_mut(&mut image, Rect::at(10, 10).of_size(20, 20), Rgb([200, 30, 40]));
    draw_filled_rect_mut(&mut image, Rect::at(60, 30).of_size(30, 20), Rgb([230, 200, 40]));
    let frame = Frame::new(image, 0, 0);

    let detections = ColorBlobModel::default().infer(&frame).unwrap();
    assert_eq!(detections.len(), 2);

    let apple = detections.iter().find(|d| d.label == "apple").unwrap();
    assert_eq!(apple.bbox, BBox::new(10, 10, 30, 30));
    assert!(apple.confidence > 0.8 && apple.confidence <= 1.0);

    let banana = detections.iter().find(|d| d.label == "banana").unwrap();
    assert_eq!(banana.bbox, BBox::new(60, 30, 90, 50));
  }

  #[test]
  fn tiny_specks_are_ignored() {
    let mut image = shelf(100, 100);
    draw_filled_rect_mut(&mut image, Rect::at(5, 5).of_size(2, 2), Rgb([200, 30, 40]));
    let frame = Frame::new(image, 0, 0);
    assert!(ColorBlobModel::default().infer(&frame).unwrap().is_empty());
  }

  #[test]
  fn hue_table_covers_fruit_colors() {
    assert_eq!(label_for_hue(356.0), Some("apple"));
    assert_eq!(label_for_hue(5.0), Some("apple"));
    assert_eq!(label_for_hue(32.0), Some("orange"));
    assert_eq!(label_for_hue(50.0), Some("banana"));
    assert_eq!(label_for_hue(101.0), Some("lime"));
    assert_eq!(label_for_hue(210.0), None);
  }
}
