// 该文件是 Guoxian （果鲜） 项目的一部分。
// src/utils.rs - 颜色空间工具
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

use image::Rgb;

/// HSV 颜色，h 以度为单位 [0, 360)，s / v 归一化到 [0, 1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsv {
  pub h: f32,
  pub s: f32,
  pub v: f32,
}

/// RGB 转 HSV（v 取最大分量，s = (max - min) / max）
pub fn rgb_to_hsv(pixel: &Rgb<u8>) -> Hsv {
  let [r, g, b] = pixel.0.map(|c| c as f32 / 255.0);
  let max = r.max(g).max(b);
  let min = r.min(g).min(b);
  let delta = max - min;

  let h = if delta <= f32::EPSILON {
    0.0
  } else if max == r {
    60.0 * (((g - b) / delta) % 6.0)
  } else if max == g {
    60.0 * ((b - r) / delta + 2.0)
  } else {
    60.0 * ((r - g) / delta + 4.0)
  };
  let h = if h < 0.0 { h + 360.0 } else { h };
  let s = if max <= f32::EPSILON { 0.0 } else { delta / max };

  Hsv { h, s, v: max }
}

/// HSV 转 RGB
pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = if h < 60.0 {
    (c, x, 0.0)
  } else if h < 120.0 {
    (x, c, 0.0)
  } else if h < 180.0 {
    (0.0, c, x)
  } else if h < 240.0 {
    (0.0, x, c)
  } else if h < 300.0 {
    (x, 0.0, c)
  } else {
    (c, 0.0, x)
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}

/// ITU-R BT.601 亮度
pub fn luma(pixel: &Rgb<u8>) -> f32 {
  let [r, g, b] = pixel.0;
  0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn primary_colors_map_to_expected_hues() {
    let red = rgb_to_hsv(&Rgb([255, 0, 0]));
    assert_eq!(red.h, 0.0);
    assert_eq!(red.s, 1.0);
    assert_eq!(red.v, 1.0);

    let green = rgb_to_hsv(&Rgb([0, 255, 0]));
    assert!((green.h - 120.0).abs() < 1e-3);

    let gray = rgb_to_hsv(&Rgb([128, 128, 128]));
    assert_eq!(gray.s, 0.0);
  }

  #[test]
  fn hsv_round_trip_is_close() {
    let hsv = rgb_to_hsv(&Rgb([230, 200, 40]));
    let Rgb([r, g, b]) = hsv_to_rgb(hsv.h, hsv.s, hsv.v);
    assert!((r as i32 - 230).abs() <= 2);
    assert!((g as i32 - 200).abs() <= 2);
    assert!((b as i32 - 40).abs() <= 2);
  }
}
