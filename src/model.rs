// 该文件是 Guoxian （果鲜） 项目的一部分。
// src/model.rs - 模型
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

use serde::{Deserialize, Serialize};

use crate::frame::{BBox, Frame};

/// 推理模型：输入一帧，输出原始检测结果
///
/// 模型本身不做阈值和类别过滤，这些由 [`crate::detector::FruitDetector`] 负责。
pub trait Model {
  type Error;

  fn name(&self) -> &'static str;
  fn infer(&self, frame: &Frame) -> Result<Vec<Detection>, Self::Error>;
}

/// 单个检测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
  pub bbox: BBox,
  pub label: String,
  pub confidence: f32,
}

impl Detection {
  pub fn new(bbox: impl Into<BBox>, label: impl Into<String>, confidence: f32) -> Self {
    Self {
      bbox: bbox.into(),
      label: label.into(),
      confidence,
    }
  }
}

mod color_blob;
pub use self::color_blob::ColorBlobModel;
