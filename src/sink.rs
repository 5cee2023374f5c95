// 该文件是 Guoxian （果鲜） 项目的一部分。
// src/sink.rs - 遥测与检索接收端
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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::quality::{FreshnessLevel, QualityScore};

#[derive(Error, Debug)]
pub enum SinkError {
  #[error("传输失败: {0}")]
  Transport(String),
  #[error("服务端拒绝 (HTTP {status}): {message}")]
  Rejected { status: u16, message: String },
  #[error("序列化失败: {0}")]
  Encode(#[from] serde_json::Error),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("签名失败: {0}")]
  Signature(String),
  #[error("接收端已关闭")]
  Closed,
}

impl From<ureq::Error> for SinkError {
  fn from(err: ureq::Error) -> Self {
    match err {
      ureq::Error::Status(status, response) => SinkError::Rejected {
        status,
        message: response.into_string().unwrap_or_default(),
      },
      ureq::Error::Transport(transport) => SinkError::Transport(transport.to_string()),
    }
  }
}

/// 接收端启用但凭据不完整时，在运行开始前报告
#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("缺少配置项: {0}")]
  MissingField(&'static str),
  #[error("无效的连接字符串: {0}")]
  InvalidConnectionString(String),
  #[error("无效的地址 '{value}': {source}")]
  InvalidUrl {
    value: String,
    #[source]
    source: url::ParseError,
  },
  #[error("配置项 {name} 的值无效: {value}")]
  InvalidValue { name: &'static str, value: String },
}

/// 事件和文档共有的部署信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventMetadata {
  pub location: Option<String>,
  pub camera_id: Option<String>,
}

/// 交给遥测接收端的质量事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityEvent {
  pub timestamp: DateTime<Utc>,
  pub fruit_type: String,
  pub freshness_level: FreshnessLevel,
  pub quality_score: f32,
  pub confidence: f32,
  pub location: Option<String>,
  pub camera_id: Option<String>,
}

impl QualityEvent {
  pub fn new(
    fruit_type: &str,
    quality: &QualityScore,
    confidence: f32,
    metadata: &EventMetadata,
  ) -> Self {
    Self {
      timestamp: Utc::now(),
      fruit_type: fruit_type.to_string(),
      freshness_level: quality.freshness_level,
      quality_score: quality.score,
      confidence,
      location: metadata.location.clone(),
      camera_id: metadata.camera_id.clone(),
    }
  }
}

/// 交给检索接收端的质量文档
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityDocument {
  pub id: String,
  pub timestamp: DateTime<Utc>,
  pub fruit_type: String,
  pub freshness_level: FreshnessLevel,
  pub quality_score: f32,
  pub confidence: f32,
  pub location: Option<String>,
  pub camera_id: Option<String>,
  pub image_url: Option<String>,
}

impl QualityDocument {
  /// 文档 id 为 `{fruit_type}_{微秒时间戳}`
  ///
  /// 同一类别在同一微秒内生成的两个文档会得到相同的 id。
  pub fn new(
    fruit_type: &str,
    quality: &QualityScore,
    confidence: f32,
    metadata: &EventMetadata,
  ) -> Self {
    let timestamp = Utc::now();
    Self {
      id: format!("{}_{}", fruit_type, timestamp.timestamp_micros()),
      timestamp,
      fruit_type: fruit_type.to_string(),
      freshness_level: quality.freshness_level,
      quality_score: quality.score,
      confidence,
      location: metadata.location.clone(),
      camera_id: metadata.camera_id.clone(),
      image_url: None,
    }
  }

  pub fn with_image_url(mut self, image_url: impl Into<String>) -> Self {
    self.image_url = Some(image_url.into());
    self
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
  pub text: String,
  pub filter: Option<String>,
  pub top: usize,
}

impl SearchQuery {
  pub fn new(text: impl Into<String>) -> Self {
    Self {
      text: text.into(),
      filter: None,
      top: 10,
    }
  }

  pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
    self.filter = Some(filter.into());
    self
  }

  pub fn with_top(mut self, top: usize) -> Self {
    self.top = top;
    self
  }
}

/// 遥测接收端：发布一个质量事件（尽力而为，至多一次）
pub trait TelemetrySink {
  fn name(&self) -> &'static str;
  fn publish(&mut self, event: &QualityEvent) -> Result<(), SinkError>;
  fn close(&mut self) -> Result<(), SinkError> {
    Ok(())
  }
}

/// 检索接收端：索引一个质量文档，并支持查询
pub trait SearchSink {
  fn name(&self) -> &'static str;
  fn index(&mut self, document: &QualityDocument) -> Result<(), SinkError>;
  fn search(&self, query: &SearchQuery) -> Result<Vec<QualityDocument>, SinkError>;
  fn close(&mut self) -> Result<(), SinkError> {
    Ok(())
  }
}

mod console;
mod event_hub;
mod rest_search;

pub use self::console::{ConsoleSearch, ConsoleTelemetry};
pub use self::event_hub::{ConnectionString, EventHubTelemetry, sas_token};
pub use self::rest_search::RestSearchIndex;

/// Event Hub 凭据，均来自环境变量
#[derive(Debug, Clone, Default)]
pub struct TelemetrySettings {
  pub connection_string: Option<String>,
  pub event_hub_name: Option<String>,
}

impl TelemetrySettings {
  pub fn is_configured(&self) -> bool {
    non_empty(&self.connection_string).is_some() || non_empty(&self.event_hub_name).is_some()
  }
}

/// AI Search 凭据，均来自环境变量
#[derive(Debug, Clone)]
pub struct SearchSettings {
  pub endpoint: Option<String>,
  pub api_key: Option<String>,
  pub index_name: String,
}

impl Default for SearchSettings {
  fn default() -> Self {
    Self {
      endpoint: None,
      api_key: None,
      index_name: "fruits-quality".to_string(),
    }
  }
}

impl SearchSettings {
  pub fn is_configured(&self) -> bool {
    non_empty(&self.endpoint).is_some() || non_empty(&self.api_key).is_some()
  }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
  value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// 构造遥测接收端：未配置任何凭据时退回到日志输出，凭据不完整时报错
pub fn telemetry_sink(settings: &TelemetrySettings) -> Result<Box<dyn TelemetrySink>, ConfigError> {
  match (
    non_empty(&settings.connection_string),
    non_empty(&settings.event_hub_name),
  ) {
    (None, None) => {
      info!("Event Hub 未配置，质量事件将输出到日志");
      Ok(Box::new(ConsoleTelemetry::default()))
    }
    (None, Some(_)) => Err(ConfigError::MissingField("EVENT_HUB_CONNECTION_STRING")),
    (Some(connection_string), hub) => {
      let connection: ConnectionString = connection_string.parse()?;
      let hub = hub
        .map(str::to_string)
        .or_else(|| connection.entity_path.clone())
        .ok_or(ConfigError::MissingField("EVENT_HUB_NAME"))?;
      info!("Event Hub 已配置: {}/{}", connection.host, hub);
      Ok(Box::new(EventHubTelemetry::new(&connection, &hub)))
    }
  }
}

/// 构造检索接收端：规则与 [`telemetry_sink`] 相同
pub fn search_sink(settings: &SearchSettings) -> Result<Box<dyn SearchSink>, ConfigError> {
  Ok(match rest_search_index(settings)? {
    Some(index) => Box::new(index),
    None => {
      info!("AI Search 未配置，质量文档将输出到日志");
      Box::new(ConsoleSearch::default())
    }
  })
}

/// 只在凭据完整时构造 REST 索引客户端
pub fn rest_search_index(settings: &SearchSettings) -> Result<Option<RestSearchIndex>, ConfigError> {
  match (non_empty(&settings.endpoint), non_empty(&settings.api_key)) {
    (None, None) => Ok(None),
    (Some(_), None) => Err(ConfigError::MissingField("SEARCH_API_KEY")),
    (None, Some(_)) => Err(ConfigError::MissingField("SEARCH_ENDPOINT")),
    (Some(endpoint), Some(api_key)) => {
      let index_name = settings.index_name.trim();
      if index_name.is_empty() {
        return Err(ConfigError::MissingField("SEARCH_INDEX_NAME"));
      }
      let endpoint = url::Url::parse(endpoint).map_err(|source| ConfigError::InvalidUrl {
        value: endpoint.to_string(),
        source,
      })?;
      info!("AI Search 已配置: {} / {}", endpoint, index_name);
      Ok(Some(RestSearchIndex::new(endpoint, api_key, index_name)))
    }
  }
}
