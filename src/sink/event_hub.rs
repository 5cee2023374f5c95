// 该文件是 Guoxian （果鲜） 项目的一部分。
// src/sink/event_hub.rs - Event Hub REST 遥测端
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

use std::{str::FromStr, time::Duration};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, info};

use crate::{
  policy::Retry,
  sink::{ConfigError, QualityEvent, SinkError, TelemetrySink},
};

const TOKEN_TTL: Duration = Duration::from_secs(3600);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const CONTENT_TYPE: &str = "application/atom+xml;type=entry;charset=utf-8";

/// Event Hub 连接字符串
///
/// 形如 `Endpoint=sb://<ns>.servicebus.windows.net/;SharedAccessKeyName=<name>;SharedAccessKey=<key>[;EntityPath=<hub>]`
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionString {
  /// 发送使用的协议，`sb` 按 `https` 处理
  pub scheme: String,
  /// 主机名（含端口）
  pub host: String,
  pub key_name: String,
  pub key: String,
  pub entity_path: Option<String>,
}

impl std::fmt::Debug for ConnectionString {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ConnectionString")
      .field("scheme", &self.scheme)
      .field("host", &self.host)
      .field("key_name", &self.key_name)
      .field("key", &"***")
      .field("entity_path", &self.entity_path)
      .finish()
  }
}

impl FromStr for ConnectionString {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (mut endpoint, mut key_name, mut key, mut entity_path) = (None, None, None, None);
    for part in s.split(';').map(str::trim).filter(|p| !p.is_empty()) {
      let (name, value) = part.split_once('=').ok_or_else(|| {
        ConfigError::InvalidConnectionString(format!("缺少 '=' 的片段: {}", part))
      })?;
      match name.trim().to_ascii_lowercase().as_str() {
        "endpoint" => endpoint = Some(value.trim().to_string()),
        "sharedaccesskeyname" => key_name = Some(value.trim().to_string()),
        "sharedaccesskey" => key = Some(value.trim().to_string()),
        "entitypath" => entity_path = Some(value.trim().to_string()),
        other => debug!("忽略连接字符串字段: {}", other),
      }
    }

    let endpoint = endpoint
      .ok_or_else(|| ConfigError::InvalidConnectionString("缺少 Endpoint".to_string()))?;
    let url = url::Url::parse(&endpoint).map_err(|source| ConfigError::InvalidUrl {
      value: endpoint.clone(),
      source,
    })?;
    let host = url
      .host_str()
      .ok_or_else(|| ConfigError::InvalidConnectionString(format!("Endpoint 缺少主机名: {}", endpoint)))?;
    let host = match url.port() {
      Some(port) => format!("{}:{}", host, port),
      None => host.to_string(),
    };
    let scheme = match url.scheme() {
      "http" => "http",
      _ => "https",
    };

    Ok(ConnectionString {
      scheme: scheme.to_string(),
      host,
      key_name: key_name.ok_or_else(|| {
        ConfigError::InvalidConnectionString("缺少 SharedAccessKeyName".to_string())
      })?,
      key: key
        .ok_or_else(|| ConfigError::InvalidConnectionString("缺少 SharedAccessKey".to_string()))?,
      entity_path: entity_path.filter(|p| !p.is_empty()),
    })
  }
}

/// 生成 SharedAccessSignature 令牌
///
/// 待签名串为 `urlencode(resource) + "\n" + expiry`，HMAC-SHA256 后 base64 编码。
pub fn sas_token(resource: &str, key_name: &str, key: &str, expiry: i64) -> Result<String, SinkError> {
  let encoded_resource = urlencoding::encode(resource);
  let mut mac = Hmac::<Sha256>::new_from_slice(key.as_bytes())
    .map_err(|e| SinkError::Signature(e.to_string()))?;
  mac.update(format!("{}\n{}", encoded_resource, expiry).as_bytes());
  let signature = STANDARD.encode(mac.finalize().into_bytes());

  Ok(format!(
    "SharedAccessSignature sr={}&sig={}&se={}&skn={}",
    encoded_resource,
    urlencoding::encode(&signature),
    expiry,
    key_name
  ))
}

/// 通过 Event Hub REST 接口逐条发送质量事件
pub struct EventHubTelemetry {
  agent: ureq::Agent,
  messages_url: String,
  resource_uri: String,
  key_name: String,
  key: String,
  retry: Retry,
  published: u64,
  closed: bool,
}

impl EventHubTelemetry {
  pub fn new(connection: &ConnectionString, event_hub_name: &str) -> Self {
    let resource_uri = format!("{}://{}/{}", connection.scheme, connection.host, event_hub_name);
    Self {
      agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
      messages_url: format!("{}/messages?timeout=60&api-version=2014-01", resource_uri),
      resource_uri,
      key_name: connection.key_name.clone(),
      key: connection.key.clone(),
      retry: Retry::default(),
      published: 0,
      closed: false,
    }
  }

  pub fn with_retry(mut self, retry: Retry) -> Self {
    self.retry = retry;
    self
  }

  pub fn messages_url(&self) -> &str {
    &self.messages_url
  }

  fn send(&self, token: &str, body: &str) -> Result<(), SinkError> {
    self
      .agent
      .post(&self.messages_url)
      .set("Authorization", token)
      .set("Content-Type", CONTENT_TYPE)
      .send_string(body)?;
    Ok(())
  }
}

impl TelemetrySink for EventHubTelemetry {
  fn name(&self) -> &'static str {
    "event-hub"
  }

  fn publish(&mut self, event: &QualityEvent) -> Result<(), SinkError> {
    if self.closed {
      return Err(SinkError::Closed);
    }
    let body = serde_json::to_string(event)?;
    let expiry = Utc::now().timestamp() + TOKEN_TTL.as_secs() as i64;
    let token = sas_token(&self.resource_uri.to_lowercase(), &self.key_name, &self.key, expiry)?;

    self.retry.run("Event Hub 发送", || self.send(&token, &body))?;
    self.published += 1;
    Ok(())
  }

  fn close(&mut self) -> Result<(), SinkError> {
    if !self.closed {
      self.closed = true;
      info!("Event Hub 发送端关闭，共发送 {} 个事件", self.published);
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const CONNECTION: &str = "Endpoint=sb://shelf-ns.servicebus.windows.net/;SharedAccessKeyName=send;SharedAccessKey=c2VjcmV0a2V5PQ==;EntityPath=quality";

  #[test]
  fn parses_connection_string() {
    let connection: ConnectionString = CONNECTION.parse().unwrap();
    assert_eq!(connection.scheme, "https");
    assert_eq!(connection.host, "shelf-ns.servicebus.windows.net");
    assert_eq!(connection.key_name, "send");
    assert_eq!(connection.key, "c2VjcmV0a2V5PQ==");
    assert_eq!(connection.entity_path.as_deref(), Some("quality"));
  }

  #[test]
  fn debug_output_hides_key() {
    let connection: ConnectionString = CONNECTION.parse().unwrap();
    assert!(!format!("{:?}", connection).contains("c2VjcmV0a2V5PQ=="));
  }

  #[test]
  fn rejects_incomplete_connection_string() {
    let missing_key = "Endpoint=sb://ns.servicebus.windows.net/;SharedAccessKeyName=send";
    assert!(matches!(
      missing_key.parse::<ConnectionString>(),
      Err(ConfigError::InvalidConnectionString(_))
    ));
    assert!("garbage".parse::<ConnectionString>().is_err());
  }

  #[test]
  fn sas_token_has_expected_shape() {
    let token = sas_token("https://ns.servicebus.windows.net/hub", "send", "key", 1_700_000_000).unwrap();
    assert!(token.starts_with("SharedAccessSignature sr=https%3A%2F%2Fns.servicebus.windows.net%2Fhub&sig="));
    assert!(token.ends_with("&se=1700000000&skn=send"));

    let again = sas_token("https://ns.servicebus.windows.net/hub", "send", "key", 1_700_000_000).unwrap();
    assert_eq!(token, again);
    let other_key = sas_token("https://ns.servicebus.windows.net/hub", "send", "other", 1_700_000_000).unwrap();
    assert_ne!(token, other_key);
  }

  #[test]
  fn builds_messages_url_from_hub_name() {
    let connection: ConnectionString = CONNECTION.parse().unwrap();
    let sink = EventHubTelemetry::new(&connection, "quality");
    assert_eq!(
      sink.messages_url(),
      "https://shelf-ns.servicebus.windows.net/quality/messages?timeout=60&api-version=2014-01"
    );
  }
}
