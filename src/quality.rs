// 该文件是 Guoxian （果鲜） 项目的一部分。
// src/quality.rs - 新鲜度评分
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

use std::fmt;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::{
  frame::BBox,
  utils::{luma, rgb_to_hsv},
};

const COLOR_WEIGHT: f32 = 0.6;
const TEXTURE_WEIGHT: f32 = 0.4;
const FRESH_THRESHOLD: f32 = 70.0;
const MEDIUM_THRESHOLD: f32 = 40.0;
const HEURISTIC_CONFIDENCE: f32 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FreshnessLevel {
  Fresh,
  Medium,
  Rotten,
}

impl FreshnessLevel {
  /// 阈值下界包含：>= 70 为新鲜，>= 40 为一般，其余为腐坏
  pub fn from_score(score: f32) -> Self {
    if score >= FRESH_THRESHOLD {
      FreshnessLevel::Fresh
    } else if score >= MEDIUM_THRESHOLD {
      FreshnessLevel::Medium
    } else {
      FreshnessLevel::Rotten
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      FreshnessLevel::Fresh => "fresh",
      FreshnessLevel::Medium => "medium",
      FreshnessLevel::Rotten => "rotten",
    }
  }
}

impl fmt::Display for FreshnessLevel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
  pub freshness_level: FreshnessLevel,
  pub score: f32,
  pub color_score: f32,
  pub texture_score: f32,
  pub confidence: f32,
}

impl QualityScore {
  /// 由颜色分和纹理分合成总分（固定权重 0.6 / 0.4）
  pub fn from_components(color_score: f32, texture_score: f32, confidence: f32) -> Self {
    let score = COLOR_WEIGHT * color_score + TEXTURE_WEIGHT * texture_score;
    Self {
      freshness_level: FreshnessLevel::from_score(score),
      score,
      color_score,
      texture_score,
      confidence,
    }
  }

  /// 无效区域的中性默认值
  pub fn neutral() -> Self {
    Self {
      freshness_level: FreshnessLevel::Medium,
      score: 50.0,
      color_score: 50.0,
      texture_score: 50.0,
      confidence: 0.0,
    }
  }
}

/// 新鲜度评估：纯函数，不修改输入帧，不做 I/O
pub trait QualityScorer {
  fn assess(&self, image: &RgbImage, bbox: &BBox, fruit_type: Option<&str>) -> QualityScore;
}

/// 基于颜色与纹理统计的启发式评分
///
/// 颜色分为区域平均亮度与平均饱和度（百分制）的均值，越暗越灰分越低；
/// 纹理分为 `100 - 灰度方差 / 10`，表面斑点越多方差越大。
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicScorer;

impl HeuristicScorer {
  fn color_score(image: &RgbImage, region: &BBox) -> f32 {
    let (mut value, mut saturation, mut count) = (0.0f64, 0.0f64, 0u64);
    for y in region.y1..region.y2 {
      for x in region.x1..region.x2 {
        let hsv = rgb_to_hsv(image.get_pixel(x as u32, y as u32));
        value += hsv.v as f64;
        saturation += hsv.s as f64;
        count += 1;
      }
    }
    let brightness = value / count as f64 * 100.0;
    let saturation = saturation / count as f64 * 100.0;
    ((brightness + saturation) / 2.0) as f32
  }

  fn texture_score(image: &RgbImage, region: &BBox) -> f32 {
    let values: Vec<f64> = (region.y1..region.y2)
      .flat_map(|y| (region.x1..region.x2).map(move |x| (x, y)))
      .map(|(x, y)| luma(image.get_pixel(x as u32, y as u32)) as f64)
      .collect();
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (100.0 - variance / 10.0).clamp(0.0, 100.0) as f32
  }
}

impl QualityScorer for HeuristicScorer {
  fn assess(&self, image: &RgbImage, bbox: &BBox, _fruit_type: Option<&str>) -> QualityScore {
    let region = bbox.clip(image.width(), image.height());
    if region.is_empty() {
      return QualityScore::neutral();
    }

    let color_score = Self::color_score(image, &region);
    let texture_score = Self::texture_score(image, &region);
    QualityScore::from_components(color_score, texture_score, HEURISTIC_CONFIDENCE)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  fn noisy_frame() -> RgbImage {
    RgbImage::from_fn(64, 48, |x, y| {
      let v = ((x * 37 + y * 91) % 256) as u8;
      Rgb([v, v.wrapping_mul(3), 255 - v])
    })
  }

  #[test]
  fn score_is_weighted_sum_of_components() {
    let image = noisy_frame();
    for bbox in [BBox::new(0, 0, 64, 48), BBox::new(10, 5, 30, 40), BBox::new(60, 40, 64, 48)] {
      let q = HeuristicScorer.assess(&image, &bbox, Some("apple"));
      let expected = 0.6 * q.color_score + 0.4 * q.texture_score;
      assert!((q.score - expected).abs() < 1e-4);
      assert_eq!(q.freshness_level, FreshnessLevel::from_score(q.score));
      assert!((0.0..=100.0).contains(&q.score));
      assert!((0.0..=1.0).contains(&q.confidence));
    }
  }

  #[test]
  fn zero_area_box_yields_neutral_default() {
    let image = noisy_frame();
    let q = HeuristicScorer.assess(&image, &BBox::new(10, 10, 10, 10), None);
    assert_eq!(q.score, 50.0);
    assert_eq!(q.freshness_level, FreshnessLevel::Medium);
    assert_eq!(q.confidence, 0.0);

    let outside = HeuristicScorer.assess(&image, &BBox::new(100, 100, 120, 120), None);
    assert_eq!(outside, QualityScore::neutral());
  }

  #[test]
  fn level_boundaries_include_lower_bound() {
    assert_eq!(FreshnessLevel::from_score(70.0), FreshnessLevel::Fresh);
    assert_eq!(FreshnessLevel::from_score(69.999), FreshnessLevel::Medium);
    assert_eq!(FreshnessLevel::from_score(40.0), FreshnessLevel::Medium);
    assert_eq!(FreshnessLevel::from_score(39.999), FreshnessLevel::Rotten);
    assert_eq!(FreshnessLevel::from_score(100.0), FreshnessLevel::Fresh);
    assert_eq!(FreshnessLevel::from_score(0.0), FreshnessLevel::Rotten);
  }

  #[test]
  fn flat_bright_fruit_scores_fresh() {
    let image = RgbImage::from_pixel(20, 20, Rgb([230, 200, 40]));
    let q = HeuristicScorer.assess(&image, &BBox::new(0, 0, 20, 20), Some("banana"));
    assert_eq!(q.texture_score, 100.0);
    assert_eq!(q.freshness_level, FreshnessLevel::Fresh);
  }

  #[test]
  fn assess_does_not_mutate_frame() {
    let image = noisy_frame();
    let before = image.clone();
    let _ = HeuristicScorer.assess(&image, &BBox::new(0, 0, 32, 32), None);
    assert_eq!(image, before);
  }
}
