// 该文件是 Guoxian （果鲜） 项目的一部分。
// src/sink/rest_search.rs - AI Search REST 检索端
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

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;
use url::Url;

use crate::{
  policy::Retry,
  sink::{QualityDocument, SearchQuery, SearchSink, SinkError},
};

const API_VERSION: &str = "2023-11-01";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct IndexResult {
  key: String,
  status: bool,
  #[serde(rename = "errorMessage")]
  error_message: Option<String>,
  #[serde(rename = "statusCode")]
  status_code: u16,
}

#[derive(Debug, Deserialize)]
struct IndexResponse {
  value: Vec<IndexResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
  value: Vec<QualityDocument>,
}

/// AI Search REST 客户端
pub struct RestSearchIndex {
  agent: ureq::Agent,
  endpoint: Url,
  api_key: String,
  index_name: String,
  retry: Retry,
  indexed: u64,
  closed: bool,
}

impl RestSearchIndex {
  pub fn new(endpoint: Url, api_key: &str, index_name: &str) -> Self {
    Self {
      agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
      endpoint,
      api_key: api_key.to_string(),
      index_name: index_name.to_string(),
      retry: Retry::default(),
      indexed: 0,
      closed: false,
    }
  }

  pub fn with_retry(mut self, retry: Retry) -> Self {
    self.retry = retry;
    self
  }

  pub fn index_url(&self) -> String {
    format!(
      "{}/indexes/{}?api-version={}",
      self.endpoint.as_str().trim_end_matches('/'),
      self.index_name,
      API_VERSION
    )
  }

  pub fn docs_url(&self, action: &str) -> String {
    format!(
      "{}/indexes/{}/docs/{}?api-version={}",
      self.endpoint.as_str().trim_end_matches('/'),
      self.index_name,
      action,
      API_VERSION
    )
  }

  fn post_json(&self, url: &str, body: &Value) -> Result<String, SinkError> {
    let response = self
      .agent
      .post(url)
      .set("api-key", &self.api_key)
      .set("Content-Type", "application/json")
      .send_string(&body.to_string())?;
    Ok(response.into_string()?)
  }

  /// 创建（或更新）索引结构
  pub fn create_index(&self) -> Result<(), SinkError> {
    let schema = json!({
      "name": self.index_name,
      "fields": [
        { "name": "id", "type": "Edm.String", "key": true, "filterable": true },
        { "name": "timestamp", "type": "Edm.DateTimeOffset", "filterable": true, "sortable": true },
        { "name": "fruit_type", "type": "Edm.String", "searchable": true, "filterable": true, "facetable": true },
        { "name": "freshness_level", "type": "Edm.String", "filterable": true, "facetable": true },
        { "name": "quality_score", "type": "Edm.Double", "filterable": true, "sortable": true },
        { "name": "confidence", "type": "Edm.Double", "filterable": true },
        { "name": "location", "type": "Edm.String", "searchable": true, "filterable": true },
        { "name": "camera_id", "type": "Edm.String", "filterable": true },
        { "name": "image_url", "type": "Edm.String" }
      ]
    });

    self.retry.run("创建索引", || {
      self
        .agent
        .put(&self.index_url())
        .set("api-key", &self.api_key)
        .set("Content-Type", "application/json")
        .send_string(&schema.to_string())
        .map(|_| ())
        .map_err(SinkError::from)
    })?;
    info!("索引 {} 已创建", self.index_name);
    Ok(())
  }
}

impl SearchSink for RestSearchIndex {
  fn name(&self) -> &'static str {
    "rest-search"
  }

  fn index(&mut self, document: &QualityDocument) -> Result<(), SinkError> {
    if self.closed {
      return Err(SinkError::Closed);
    }
    let mut action = serde_json::to_value(document)?;
    if let Value::Object(fields) = &mut action {
      fields.insert("@search.action".to_string(), json!("mergeOrUpload"));
    }
    let body = json!({ "value": [action] });
    let url = self.docs_url("index");

    let text = self.retry.run("文档索引", || self.post_json(&url, &body))?;
    let response: IndexResponse = serde_json::from_str(&text)?;
    if let Some(failed) = response.value.iter().find(|r| !r.status) {
      return Err(SinkError::Rejected {
        status: failed.status_code,
        message: format!(
          "{}: {}",
          failed.key,
          failed.error_message.as_deref().unwrap_or("未知错误")
        ),
      });
    }
    self.indexed += 1;
    Ok(())
  }

  fn search(&self, query: &SearchQuery) -> Result<Vec<QualityDocument>, SinkError> {
    let body = json!({
      "search": query.text,
      "filter": query.filter,
      "top": query.top,
    });
    let url = self.docs_url("search");
    let text = self.retry.run("文档检索", || self.post_json(&url, &body))?;
    let response: SearchResponse = serde_json::from_str(&text)?;
    Ok(response.value)
  }

  fn close(&mut self) -> Result<(), SinkError> {
    if !self.closed {
      self.closed = true;
      info!("AI Search 客户端关闭，共索引 {} 个文档", self.indexed);
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builds_rest_urls() {
    let index = RestSearchIndex::new(
      Url::parse("https://shelf.search.windows.net/").unwrap(),
      "key",
      "fruits-quality",
    );
    assert_eq!(
      index.docs_url("index"),
      "https://shelf.search.windows.net/indexes/fruits-quality/docs/index?api-version=2023-11-01"
    );
    assert_eq!(
      index.index_url(),
      "https://shelf.search.windows.net/indexes/fruits-quality?api-version=2023-11-01"
    );
  }

  #[test]
  fn search_response_ignores_score_fields() {
    let text = r#"{"value":[{"@search.score":1.5,"id":"apple_1","timestamp":"2026-01-02T03:04:05Z","fruit_type":"apple","freshness_level":"fresh","quality_score":81.5,"confidence":0.9,"location":null,"camera_id":"cam-1","image_url":null}]}"#;
    let response: SearchResponse = serde_json::from_str(text).unwrap();
    assert_eq!(response.value.len(), 1);
    assert_eq!(response.value[0].camera_id.as_deref(), Some("cam-1"));
  }
}
