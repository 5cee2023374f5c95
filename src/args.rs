// 该文件是 Guoxian （果鲜） 项目的一部分。
// src/args.rs - 命令行参数
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

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

use guoxian::{
  sink::{SearchSettings, TelemetrySettings},
  task::{PipelineConfig, RunOptions},
};

/// Guoxian 货架水果新鲜度巡检
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(flatten)]
  pub credentials: Credentials,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// 对摄像头、视频或图片运行巡检
  Detect(DetectArgs),
  /// 用合成画面演示完整流程（不投递事件和文档）
  Demo {
    /// 处理帧数
    #[arg(long, default_value_t = 300)]
    max_frames: u64,
    /// 标注帧输出路径
    #[arg(long, value_name = "OUTPUT")]
    output: Option<PathBuf>,
  },
  /// 打印当前配置（不输出密钥）
  Config,
  /// 查询检索接收端
  Search {
    /// 查询文本，`*` 表示全部
    #[arg(long, default_value = "*")]
    query: String,
    /// 过滤表达式，例如 "freshness_level eq 'rotten'"
    #[arg(long)]
    filter: Option<String>,
    /// 最多返回条数
    #[arg(long, default_value_t = 10)]
    top: usize,
  },
  /// 在检索服务上创建索引
  CreateIndex,
  /// 把合成货架画面写成 PNG 序列或视频文件
  Generate {
    /// 输出目录，或 .mp4/.mkv/.avi 视频文件
    #[arg(long, value_name = "OUTPUT")]
    output: PathBuf,
    /// 帧数
    #[arg(long, default_value_t = 100)]
    frames: u64,
    #[arg(long, default_value_t = 640)]
    width: u32,
    #[arg(long, default_value_t = 480)]
    height: u32,
    /// 水果种类，逗号分隔
    #[arg(long, value_delimiter = ',')]
    fruits: Vec<String>,
  },
}

#[derive(ClapArgs, Debug)]
pub struct DetectArgs {
  /// 输入来源
  /// 支持格式:
  /// - 摄像头编号: 0, 1, ...
  /// - 图片或图片目录: shelf.jpg, frames/
  /// - 视频文件或网络流: shelf.mp4, rtsp://...
  /// - 合成画面: synthetic://shelf?frames=100
  #[arg(long, env = "DEFAULT_CAMERA_SOURCE", default_value = "0", value_name = "SOURCE")]
  pub source: String,

  /// 标注帧输出路径（图片文件、视频文件或目录）
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<PathBuf>,

  /// 最大处理帧数（0 表示无限制）
  #[arg(long, default_value_t = 0, value_name = "COUNT")]
  pub max_frames: u64,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(
    long,
    env = "DETECTION_CONFIDENCE",
    default_value_t = 0.3,
    value_name = "THRESHOLD",
    value_parser = parse_confidence
  )]
  pub conf: f32,

  /// 投递质量事件
  #[arg(long, overrides_with = "no_events", default_value_t = true)]
  pub events: bool,
  #[arg(long = "no-events")]
  pub no_events: bool,

  /// 索引质量文档
  #[arg(long, overrides_with = "no_search", default_value_t = true)]
  pub search: bool,
  #[arg(long = "no-search")]
  pub no_search: bool,

  /// 写出预览画面
  #[arg(long, overrides_with = "no_display", default_value_t = true)]
  pub display: bool,
  #[arg(long = "no-display")]
  pub no_display: bool,

  /// 类别白名单，逗号分隔
  #[arg(long, value_delimiter = ',')]
  pub classes: Vec<String>,

  /// 标签字体（TTF/OTF）
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,

  /// 预览文件路径
  #[arg(long, value_name = "PREVIEW")]
  pub preview: Option<PathBuf>,

  /// 货架位置
  #[arg(long)]
  pub location: Option<String>,

  /// 摄像头标识
  #[arg(long)]
  pub camera_id: Option<String>,

  /// 检测最多尝试次数
  #[arg(long, default_value_t = 1)]
  pub detect_retries: u32,
}

impl DetectArgs {
  pub fn pipeline_config(&self) -> PipelineConfig {
    PipelineConfig {
      source: self.source.clone(),
      output_path: self.output.clone(),
      max_frames: self.max_frames,
      detector_conf: self.conf,
      enable_events: self.events && !self.no_events,
      enable_search: self.search && !self.no_search,
      display: self.display && !self.no_display,
      location: self.location.clone(),
      camera_id: self.camera_id.clone(),
    }
  }

  pub fn run_options(&self, credentials: &Credentials) -> RunOptions {
    RunOptions {
      telemetry: credentials.telemetry(),
      search: credentials.search(),
      classes: self.classes.clone(),
      font: self.font.clone(),
      preview: self.preview.clone(),
      detect_retries: self.detect_retries,
    }
  }
}

/// 接收端凭据，从环境变量读取
#[derive(ClapArgs, Debug)]
pub struct Credentials {
  #[arg(long, env = "EVENT_HUB_CONNECTION_STRING", hide_env_values = true, global = true)]
  pub event_hub_connection_string: Option<String>,

  #[arg(long, env = "EVENT_HUB_NAME", global = true)]
  pub event_hub_name: Option<String>,

  #[arg(long, env = "SEARCH_ENDPOINT", global = true)]
  pub search_endpoint: Option<String>,

  #[arg(long, env = "SEARCH_API_KEY", hide_env_values = true, global = true)]
  pub search_api_key: Option<String>,

  #[arg(long, env = "SEARCH_INDEX_NAME", default_value = "fruits-quality", global = true)]
  pub search_index_name: String,
}

impl Credentials {
  pub fn telemetry(&self) -> TelemetrySettings {
    TelemetrySettings {
      connection_string: self.event_hub_connection_string.clone(),
      event_hub_name: self.event_hub_name.clone(),
    }
  }

  pub fn search(&self) -> SearchSettings {
    SearchSettings {
      endpoint: self.search_endpoint.clone(),
      api_key: self.search_api_key.clone(),
      index_name: self.search_index_name.clone(),
    }
  }
}

fn parse_confidence(value: &str) -> Result<f32, String> {
  let conf: f32 = value
    .parse()
    .map_err(|_| format!("'{}' 不是有效的数字", value))?;
  if (0.0..=1.0).contains(&conf) {
    Ok(conf)
  } else {
    Err(format!("置信度阈值必须在 0.0 到 1.0 之间，实际为 {}", conf))
  }
}
