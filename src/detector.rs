// 该文件是 Guoxian （果鲜） 项目的一部分。
// src/detector.rs - 水果检测器
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

use std::collections::HashSet;

use thiserror::Error;
use tracing::debug;

use crate::{
  frame::Frame,
  model::{Detection, Model},
};

#[derive(Error, Debug)]
pub enum DetectionError {
  #[error("模型 {model} 推理失败: {source}")]
  Inference {
    model: &'static str,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },
  #[error("无效的置信度阈值: {0}")]
  InvalidThreshold(f32),
}

/// 检测器：帧 → 检测结果列表
///
/// 实现必须只返回置信度不低于阈值、且在类别白名单内的结果；返回顺序不作保证。
pub trait Detector {
  fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, DetectionError>;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
  fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, DetectionError> {
    (**self).detect(frame)
  }
}

/// 在任意 [`Model`] 之上施加置信度阈值和类别白名单
#[derive(Debug, Clone)]
pub struct FruitDetector<M> {
  model: M,
  confidence_threshold: f32,
  classes: Option<HashSet<String>>,
}

impl<M: Model> FruitDetector<M> {
  pub fn new(model: M, confidence_threshold: f32) -> Result<Self, DetectionError> {
    if !(0.0..=1.0).contains(&confidence_threshold) {
      return Err(DetectionError::InvalidThreshold(confidence_threshold));
    }
    Ok(Self {
      model,
      confidence_threshold,
      classes: None,
    })
  }

  /// 设置类别白名单，空列表视为不过滤
  pub fn with_classes<I, S>(mut self, classes: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let classes: HashSet<String> = classes.into_iter().map(Into::into).collect();
    self.classes = (!classes.is_empty()).then_some(classes);
    self
  }

  pub fn confidence_threshold(&self) -> f32 {
    self.confidence_threshold
  }

  fn accepts(&self, detection: &Detection) -> bool {
    if detection.confidence < self.confidence_threshold {
      return false;
    }
    match &self.classes {
      Some(classes) => classes.contains(&detection.label),
      None => true,
    }
  }
}

impl<M> Detector for FruitDetector<M>
where
  M: Model,
  M::Error: std::error::Error + Send + Sync + 'static,
{
  fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, DetectionError> {
    let raw = self
      .model
      .infer(frame)
      .map_err(|e| DetectionError::Inference {
        model: self.model.name(),
        source: Box::new(e),
      })?;
    let total = raw.len();
    let detections: Vec<Detection> = raw.into_iter().filter(|d| self.accepts(d)).collect();
    debug!(
      "帧 {}: 模型输出 {} 个目标，过滤后保留 {} 个",
      frame.index,
      total,
      detections.len()
    );
    Ok(detections)
  }
}
