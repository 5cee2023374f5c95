// 该文件是 Guoxian （果鲜） 项目的一部分。
// src/main.rs - 命令行入口
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

mod args;

use std::{str::FromStr, thread, time::Duration};

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{info, warn};

use args::{Args, Command, Credentials};
use guoxian::{
  input::{FruitKind, SyntheticInput},
  output::FrameRecorder,
  sink::{SearchQuery, SearchSink, rest_search_index, search_sink},
  task::{CancelFlag, PipelineConfig, RunOptions, RunStatistics, process_shelf_video},
};

fn install_cancel_handler() -> Result<CancelFlag> {
  let cancel = CancelFlag::new();
  let flag = cancel.clone();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    flag.cancel();
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })
  .context("无法设置 Ctrl-C 处理函数")?;
  Ok(cancel)
}

fn print_statistics(stats: &RunStatistics) -> Result<()> {
  println!();
  println!("处理完成!");
  println!("总帧数: {}", stats.frames_processed);
  println!("总检测数: {}", stats.detections);
  println!("已发布事件: {}", stats.events_published);
  println!("已索引文档: {}", stats.documents_indexed);
  if stats.events_published < stats.detections || stats.documents_indexed < stats.detections {
    warn!("部分事件或文档未能送达");
  }
  println!("{}", serde_json::to_string(stats)?);
  Ok(())
}

fn configured(flag: bool) -> &'static str {
  if flag { "已配置" } else { "未配置" }
}

fn show_config(credentials: &Credentials) {
  let telemetry = credentials.telemetry();
  let search = credentials.search();
  println!("Guoxian 配置");
  println!("==================");
  println!("Event Hub: {}", configured(telemetry.is_configured()));
  if let Some(name) = &telemetry.event_hub_name {
    println!("  EVENT_HUB_NAME: {}", name);
  }
  println!("AI Search: {}", configured(search.is_configured()));
  if let Some(endpoint) = &search.endpoint {
    println!("  SEARCH_ENDPOINT: {}", endpoint);
  }
  println!("  SEARCH_INDEX_NAME: {}", search.index_name);
}

fn generate(output: &std::path::Path, frames: u64, width: u32, height: u32, fruits: &[String]) -> Result<()> {
  let fruits = fruits
    .iter()
    .map(|f| FruitKind::from_str(f))
    .collect::<Result<Vec<_>, _>>()?;
  let input = SyntheticInput::new(width, height, frames)?.with_fruits(fruits);
  let mut recorder = FrameRecorder::new(output)?;
  for index in 0..frames {
    recorder.record(index, &input.render_frame(index))?;
  }
  info!("已生成 {} 帧到 {}", recorder.written(), output.display());
  Ok(())
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  match args.command {
    Command::Detect(detect) => {
      let config = detect.pipeline_config();
      let options = detect.run_options(&args.credentials);
      info!("输入来源: {}", config.source);
      info!("置信度阈值: {}", config.detector_conf);
      if let Some(output) = &config.output_path {
        info!("输出路径: {}", output.display());
      }
      let cancel = install_cancel_handler()?;
      let stats = process_shelf_video(config, &options, cancel)?;
      print_statistics(&stats)?;
    }
    Command::Demo { max_frames, output } => {
      let config = PipelineConfig {
        source: format!("synthetic://shelf?frames={}", max_frames),
        output_path: output,
        max_frames,
        enable_events: false,
        enable_search: false,
        display: true,
        ..Default::default()
      };
      let cancel = install_cancel_handler()?;
      let stats = process_shelf_video(config, &RunOptions::default(), cancel)?;
      print_statistics(&stats)?;
    }
    Command::Config => show_config(&args.credentials),
    Command::Search { query, filter, top } => {
      let sink = search_sink(&args.credentials.search())?;
      let mut query = SearchQuery::new(query).with_top(top);
      if let Some(filter) = filter {
        query = query.with_filter(filter);
      }
      let documents = sink.search(&query)?;
      println!("共 {} 条结果", documents.len());
      for document in &documents {
        println!("{}", serde_json::to_string(document)?);
      }
    }
    Command::CreateIndex => match rest_search_index(&args.credentials.search())? {
      Some(index) => index.create_index()?,
      None => bail!("AI Search 未配置，无法创建索引"),
    },
    Command::Generate {
      output,
      frames,
      width,
      height,
      fruits,
    } => generate(&output, frames, width, height, &fruits)?,
  }

  Ok(())
}
