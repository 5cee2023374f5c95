// 该文件是 Guoxian （果鲜） 项目的一部分。
// src/bin/benchmark_repeatshot.rs - 单帧重复检测与评分耗时
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

use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use clap::Parser;
use tracing::{info, warn};

use guoxian::{
  detector::{Detector, FruitDetector},
  input::open_source,
  model::ColorBlobModel,
  quality::{HeuristicScorer, QualityScorer},
};

/// 对同一帧重复运行检测和评分，统计平均耗时
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入来源，只取第一帧
  #[arg(long, value_name = "SOURCE", default_value = "synthetic://shelf?frames=1")]
  pub source: String,

  /// 重复次数
  #[arg(long, default_value_t = 1000)]
  pub repeat: usize,

  /// 置信度阈值
  #[arg(long, default_value_t = 0.3)]
  pub conf: f32,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  if args.repeat < 3 {
    return Err(anyhow!("重复次数至少为 3"));
  }

  let detector = FruitDetector::new(ColorBlobModel::default(), args.conf)?;
  let scorer = HeuristicScorer;

  info!("开始任务...");
  let frame = open_source(&args.source, 1)?
    .next()
    .ok_or_else(|| anyhow!("没有输入帧"))??;
  info!("输入帧获取成功，开始推理...");

  let mut times = Vec::with_capacity(args.repeat);
  for i in 0..args.repeat {
    let now = Instant::now();
    let detections = detector.detect(&frame)?;
    let scores = detections
      .iter()
      .map(|d| scorer.assess(&frame.image, &d.bbox, Some(&d.label)))
      .collect::<Vec<_>>();
    let elapsed = now.elapsed();
    info!(
      "({})检测到 {} 个目标，评分 {} 个，耗时: {:.2?}",
      i,
      detections.len(),
      scores.len(),
      elapsed
    );
    times.push(elapsed);
  }

  warn!(
    "平均耗时: {:.2?}",
    times.iter().skip(2).sum::<Duration>() / (times.len() - 2) as u32
  );

  Ok(())
}
