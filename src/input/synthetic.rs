// 该文件是 Guoxian （果鲜） 项目的一部分。
// src/input/synthetic.rs - 合成货架画面
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

use std::{fmt, str::FromStr};

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_circle_mut;
use tracing::error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  input::{FrameSource, InputError, InputSourceType, query_number},
};

const SYNTHETIC_SCHEME: &str = "synthetic";

const BACKGROUND: Rgb<u8> = Rgb([128, 128, 128]);

/// 合成画面中可出现的水果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FruitKind {
  Apple,
  Banana,
  Orange,
  Lime,
}

impl FruitKind {
  pub const ALL: [FruitKind; 4] = [
    FruitKind::Apple,
    FruitKind::Banana,
    FruitKind::Orange,
    FruitKind::Lime,
  ];

  pub fn color(self) -> Rgb<u8> {
    match self {
      FruitKind::Apple => Rgb([200, 30, 40]),
      FruitKind::Banana => Rgb([230, 200, 40]),
      FruitKind::Orange => Rgb([240, 140, 20]),
      FruitKind::Lime => Rgb([90, 180, 50]),
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      FruitKind::Apple => "apple",
      FruitKind::Banana => "banana",
      FruitKind::Orange => "orange",
      FruitKind::Lime => "lime",
    }
  }
}

impl fmt::Display for FruitKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for FruitKind {
  type Err = InputError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    FruitKind::ALL
      .into_iter()
      .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
      .ok_or_else(|| InputError::InvalidParameter {
        name: "fruits".to_string(),
        value: s.to_string(),
      })
  }
}

/// 合成货架视频
///
/// 灰色背景上，每种水果占一条水平通道，圆盘随帧号向右移动并循环。
/// 画面完全由帧号决定，可重复生成。
///
/// `synthetic://shelf?width=640&height=480&frames=100&fps=25&fruits=apple,lime`
#[derive(Debug, Clone)]
pub struct SyntheticInput {
  width: u32,
  height: u32,
  frames: u64,
  fps: u32,
  fruits: Vec<FruitKind>,
  index: u64,
}

impl Default for SyntheticInput {
  fn default() -> Self {
    SyntheticInput {
      width: 640,
      height: 480,
      frames: 0,
      fps: 25,
      fruits: FruitKind::ALL.to_vec(),
      index: 0,
    }
  }
}

impl SyntheticInput {
  pub fn new(width: u32, height: u32, frames: u64) -> Result<Self, InputError> {
    if width < 16 {
      return Err(InputError::InvalidParameter {
        name: "width".to_string(),
        value: width.to_string(),
      });
    }
    if height < 16 {
      return Err(InputError::InvalidParameter {
        name: "height".to_string(),
        value: height.to_string(),
      });
    }
    Ok(SyntheticInput {
      width,
      height,
      frames,
      ..Default::default()
    })
  }

  pub fn with_fruits(mut self, fruits: Vec<FruitKind>) -> Self {
    if !fruits.is_empty() {
      self.fruits = fruits;
    }
    self
  }

  pub fn with_fps(mut self, fps: u32) -> Self {
    self.fps = fps.max(1);
    self
  }

  pub fn fruits(&self) -> &[FruitKind] {
    &self.fruits
  }

  /// 渲染第 `index` 帧
  pub fn render_frame(&self, index: u64) -> RgbImage {
    let mut image = RgbImage::from_pixel(self.width, self.height, BACKGROUND);
    let lanes = self.fruits.len() as i64;
    let (w, h) = (self.width as i64, self.height as i64);
    let radius = (h / (2 * (lanes + 1)) - 4).min(w / 8).max(3);
    let travel = (w - 2 * radius - 2).max(1);
    let step = (w / 50).max(1);

    for (lane, fruit) in self.fruits.iter().enumerate() {
      let lane = lane as i64;
      let cy = h * (lane + 1) / (lanes + 1);
      let offset = (lane * 37 + index as i64 * step).rem_euclid(travel);
      let cx = radius + 1 + offset;
      draw_filled_circle_mut(
        &mut image,
        (cx as i32, cy as i32),
        radius as i32,
        fruit.color(),
      );
    }
    image
  }
}

impl FromUrl for SyntheticInput {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != SYNTHETIC_SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        SYNTHETIC_SCHEME,
        url.scheme()
      );
      return Err(InputError::SchemeMismatch(url.scheme().to_string()));
    }
    let defaults = SyntheticInput::default();
    let width = query_number(url, "width")?.unwrap_or(defaults.width);
    let height = query_number(url, "height")?.unwrap_or(defaults.height);
    let frames = query_number(url, "frames")?.unwrap_or(defaults.frames);
    let fps = query_number(url, "fps")?.unwrap_or(defaults.fps);
    let fruits = match url.query_pairs().find(|(k, _)| k == "fruits") {
      Some((_, v)) => v
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(FruitKind::from_str)
        .collect::<Result<Vec<_>, _>>()?,
      None => Vec::new(),
    };

    Ok(
      SyntheticInput::new(width, height, frames)?
        .with_fps(fps)
        .with_fruits(fruits),
    )
  }
}

impl FromUrlWithScheme for SyntheticInput {
  const SCHEME: &'static str = SYNTHETIC_SCHEME;
}

impl Iterator for SyntheticInput {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.frames != 0 && self.index >= self.frames {
      return None;
    }
    let index = self.index;
    self.index += 1;
    let timestamp_ms = index * 1000 / self.fps as u64;
    Some(Ok(Frame::new(self.render_frame(index), index, timestamp_ms)))
  }
}

impl FrameSource for SyntheticInput {
  fn source_type(&self) -> InputSourceType {
    InputSourceType::Synthetic
  }

  fn describe(&self) -> String {
    let fruits = self
      .fruits
      .iter()
      .map(|f| f.as_str())
      .collect::<Vec<_>>()
      .join(",");
    format!(
      "合成画面 {}x{} [{}]{}",
      self.width,
      self.height,
      fruits,
      if self.frames == 0 {
        String::new()
      } else {
        format!(" 共 {} 帧", self.frames)
      }
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_from_url_parses_parameters() {
    let url = Url::parse("synthetic://shelf?width=320&height=240&frames=3&fruits=apple,lime")
      .unwrap();
    let input = SyntheticInput::from_url(&url).unwrap();
    assert_eq!(input.fruits(), &[FruitKind::Apple, FruitKind::Lime]);
    let frames = input.collect::<Result<Vec<_>, _>>().unwrap();
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0].width(), 320);
    assert_eq!(frames[2].index, 2);
    assert_eq!(frames[1].timestamp_ms, 40);
  }

  #[test]
  fn test_unknown_fruit_is_rejected() {
    let url = Url::parse("synthetic://shelf?fruits=apple,durian").unwrap();
    assert!(matches!(
      SyntheticInput::from_url(&url),
      Err(InputError::InvalidParameter { .. })
    ));
  }

  #[test]
  fn test_tiny_frame_is_rejected() {
    assert!(SyntheticInput::new(8, 480, 0).is_err());
  }

  #[test]
  fn test_render_is_deterministic_and_moves() {
    let input = SyntheticInput::new(200, 160, 0).unwrap();
    assert_eq!(input.render_frame(5), input.render_frame(5));
    assert_ne!(input.render_frame(0), input.render_frame(1));
  }

  #[test]
  fn test_each_lane_has_its_color() {
    let input = SyntheticInput::new(320, 240, 0)
      .unwrap()
      .with_fruits(vec![FruitKind::Orange]);
    let image = input.render_frame(0);
    let count = image
      .pixels()
      .filter(|p| **p == FruitKind::Orange.color())
      .count();
    assert!(count > 100);
    assert_eq!(image.get_pixel(0, 0), &BACKGROUND);
  }
}
