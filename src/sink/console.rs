// 该文件是 Guoxian （果鲜） 项目的一部分。
// src/sink/console.rs - 未配置后端时的日志接收端
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

use tracing::info;

use crate::sink::{
  QualityDocument, QualityEvent, SearchQuery, SearchSink, SinkError, TelemetrySink,
};

/// 把质量事件以 JSON 写入日志，总是成功
#[derive(Debug, Default)]
pub struct ConsoleTelemetry {
  published: u64,
}

impl ConsoleTelemetry {
  pub fn published(&self) -> u64 {
    self.published
  }
}

impl TelemetrySink for ConsoleTelemetry {
  fn name(&self) -> &'static str {
    "console-telemetry"
  }

  fn publish(&mut self, event: &QualityEvent) -> Result<(), SinkError> {
    info!("[EVENT] {}", serde_json::to_string(event)?);
    self.published += 1;
    Ok(())
  }

  fn close(&mut self) -> Result<(), SinkError> {
    info!("日志遥测端关闭，共输出 {} 个事件", self.published);
    Ok(())
  }
}

/// 把质量文档以 JSON 写入日志；查询总是返回空结果
#[derive(Debug, Default)]
pub struct ConsoleSearch {
  indexed: u64,
}

impl ConsoleSearch {
  pub fn indexed(&self) -> u64 {
    self.indexed
  }
}

impl SearchSink for ConsoleSearch {
  fn name(&self) -> &'static str {
    "console-search"
  }

  fn index(&mut self, document: &QualityDocument) -> Result<(), SinkError> {
    info!("[INDEX] {}", serde_json::to_string(document)?);
    self.indexed += 1;
    Ok(())
  }

  fn search(&self, query: &SearchQuery) -> Result<Vec<QualityDocument>, SinkError> {
    info!(
      "[SEARCH] 查询: {}, 过滤: {}, 数量: {}",
      query.text,
      query.filter.as_deref().unwrap_or("-"),
      query.top
    );
    Ok(Vec::new())
  }
}
