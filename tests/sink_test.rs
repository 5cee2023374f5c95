// 该文件是 Guoxian （果鲜） 项目的一部分。
// tests/sink_test.rs - 接收端集成测试
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

use std::{
  io::{BufRead, BufReader, Read, Write},
  net::TcpListener,
  sync::mpsc,
  thread,
  time::Duration,
};

use url::Url;

use guoxian::{
  policy::Retry,
  quality::QualityScore,
  sink::{
    ConfigError, ConnectionString, ConsoleSearch, ConsoleTelemetry, EventHubTelemetry,
    EventMetadata, QualityDocument, QualityEvent, RestSearchIndex, SearchQuery, SearchSettings,
    SearchSink, SinkError, TelemetrySettings, TelemetrySink, rest_search_index, search_sink,
    telemetry_sink,
  },
};

/// 收到的一次 HTTP 请求
struct Captured {
  request_line: String,
  headers: Vec<(String, String)>,
  body: String,
}

impl Captured {
  fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }
}

/// 只应答一次请求的本地 HTTP 服务，返回其地址和收到的请求
fn serve_once(status: &'static str, body: &'static str) -> (String, mpsc::Receiver<Captured>) {
  let listener = TcpListener::bind("127.0.0.1:0").unwrap();
  let address = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());
  let (tx, rx) = mpsc::channel();
  thread::spawn(move || {
    let (stream, _) = listener.accept().unwrap();
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut request_line = String::new();
    reader.read_line(&mut request_line).unwrap();
    let mut headers = Vec::new();
    loop {
      let mut line = String::new();
      reader.read_line(&mut line).unwrap();
      let line = line.trim_end();
      if line.is_empty() {
        break;
      }
      if let Some((k, v)) = line.split_once(':') {
        headers.push((k.trim().to_string(), v.trim().to_string()));
      }
    }
    let length = headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
      .and_then(|(_, v)| v.parse::<usize>().ok())
      .unwrap_or(0);
    let mut buffer = vec![0u8; length];
    reader.read_exact(&mut buffer).unwrap();

    let mut stream = stream;
    write!(
      stream,
      "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
      status,
      body.len(),
      body
    )
    .unwrap();
    stream.flush().unwrap();
    tx.send(Captured {
      request_line: request_line.trim_end().to_string(),
      headers,
      body: String::from_utf8(buffer).unwrap(),
    })
    .unwrap();
  });
  (address, rx)
}

fn event() -> QualityEvent {
  let metadata = EventMetadata {
    location: Some("aisle-3".to_string()),
    camera_id: Some("cam-01".to_string()),
  };
  QualityEvent::new("apple", &QualityScore::from_components(80.0, 70.0, 0.75), 0.9, &metadata)
}

fn document() -> QualityDocument {
  QualityDocument::new(
    "banana",
    &QualityScore::from_components(30.0, 40.0, 0.75),
    0.8,
    &EventMetadata::default(),
  )
}

fn no_retry() -> Retry {
  Retry::new(1, Duration::ZERO)
}

#[test]
fn unconfigured_factories_fall_back_to_console() {
  let mut telemetry = telemetry_sink(&TelemetrySettings::default()).unwrap();
  assert_eq!(telemetry.name(), "console-telemetry");
  assert!(telemetry.publish(&event()).is_ok());
  assert!(telemetry.close().is_ok());

  let mut search = search_sink(&SearchSettings::default()).unwrap();
  assert_eq!(search.name(), "console-search");
  assert!(search.index(&document()).is_ok());
  assert!(search.search(&SearchQuery::new("*")).unwrap().is_empty());
}

#[test]
fn whitespace_only_credentials_count_as_unconfigured() {
  let settings = TelemetrySettings {
    connection_string: Some("  ".to_string()),
    event_hub_name: Some(String::new()),
  };
  assert_eq!(telemetry_sink(&settings).unwrap().name(), "console-telemetry");
}

#[test]
fn console_sinks_count_records() {
  let mut telemetry = ConsoleTelemetry::default();
  let mut search = ConsoleSearch::default();
  for _ in 0..3 {
    telemetry.publish(&event()).unwrap();
    search.index(&document()).unwrap();
  }
  assert_eq!(telemetry.published(), 3);
  assert_eq!(search.indexed(), 3);
}

#[test]
fn partial_event_hub_settings_are_rejected() {
  let hub_only = TelemetrySettings {
    connection_string: None,
    event_hub_name: Some("shelf-events".to_string()),
  };
  assert!(matches!(
    telemetry_sink(&hub_only),
    Err(ConfigError::MissingField("EVENT_HUB_CONNECTION_STRING"))
  ));

  let no_hub = TelemetrySettings {
    connection_string: Some(
      "Endpoint=sb://shelf.servicebus.windows.net/;SharedAccessKeyName=send;SharedAccessKey=c2VjcmV0"
        .to_string(),
    ),
    event_hub_name: None,
  };
  assert!(matches!(
    telemetry_sink(&no_hub),
    Err(ConfigError::MissingField("EVENT_HUB_NAME"))
  ));

  let malformed = TelemetrySettings {
    connection_string: Some("not a connection string".to_string()),
    event_hub_name: Some("shelf-events".to_string()),
  };
  assert!(matches!(
    telemetry_sink(&malformed),
    Err(ConfigError::InvalidConnectionString(_))
  ));
}

#[test]
fn entity_path_stands_in_for_hub_name() {
  let settings = TelemetrySettings {
    connection_string: Some(
      "Endpoint=sb://shelf.servicebus.windows.net/;SharedAccessKeyName=send;SharedAccessKey=c2VjcmV0;EntityPath=shelf-events"
        .to_string(),
    ),
    event_hub_name: None,
  };
  assert_eq!(telemetry_sink(&settings).unwrap().name(), "event-hub");
}

#[test]
fn partial_search_settings_are_rejected() {
  let endpoint_only = SearchSettings {
    endpoint: Some("https://shelf.search.windows.net".to_string()),
    ..Default::default()
  };
  assert!(matches!(
    search_sink(&endpoint_only),
    Err(ConfigError::MissingField("SEARCH_API_KEY"))
  ));

  let key_only = SearchSettings {
    api_key: Some("key".to_string()),
    ..Default::default()
  };
  assert!(matches!(
    rest_search_index(&key_only),
    Err(ConfigError::MissingField("SEARCH_ENDPOINT"))
  ));

  let bad_url = SearchSettings {
    endpoint: Some("shelf search".to_string()),
    api_key: Some("key".to_string()),
    ..Default::default()
  };
  assert!(matches!(
    search_sink(&bad_url),
    Err(ConfigError::InvalidUrl { .. })
  ));
}

#[test]
fn unreachable_event_hub_reports_failure() {
  let connection: ConnectionString =
    "Endpoint=http://127.0.0.1:1/;SharedAccessKeyName=send;SharedAccessKey=c2VjcmV0"
      .parse()
      .unwrap();
  let mut sink = EventHubTelemetry::new(&connection, "shelf-events").with_retry(no_retry());
  assert!(matches!(
    sink.publish(&event()),
    Err(SinkError::Transport(_))
  ));
  sink.close().unwrap();
  assert!(matches!(sink.publish(&event()), Err(SinkError::Closed)));
}

#[test]
fn event_hub_posts_signed_json() {
  let (address, requests) = serve_once("201 Created", "");
  let connection: ConnectionString = format!(
    "Endpoint=http://{}/;SharedAccessKeyName=send;SharedAccessKey=c2VjcmV0",
    address
  )
  .parse()
  .unwrap();
  let mut sink = EventHubTelemetry::new(&connection, "shelf-events").with_retry(no_retry());

  sink.publish(&event()).unwrap();

  let request = requests.recv_timeout(Duration::from_secs(5)).unwrap();
  assert!(request.request_line.starts_with("POST /shelf-events/messages?"));
  assert!(
    request
      .header("Authorization")
      .unwrap()
      .starts_with("SharedAccessSignature sr=")
  );
  let body: serde_json::Value = serde_json::from_str(&request.body).unwrap();
  assert_eq!(body["fruit_type"], "apple");
  assert_eq!(body["freshness_level"], "fresh");
  assert_eq!(body["location"], "aisle-3");
}

#[test]
fn event_hub_rejection_carries_status() {
  let (address, _requests) = serve_once("401 Unauthorized", "{\"error\":\"bad token\"}");
  let connection: ConnectionString = format!(
    "Endpoint=http://{}/;SharedAccessKeyName=send;SharedAccessKey=c2VjcmV0",
    address
  )
  .parse()
  .unwrap();
  let mut sink = EventHubTelemetry::new(&connection, "shelf-events").with_retry(no_retry());
  assert!(matches!(
    sink.publish(&event()),
    Err(SinkError::Rejected { status: 401, .. })
  ));
}

#[test]
fn rest_search_index_uses_merge_or_upload() {
  let (address, requests) = serve_once(
    "200 OK",
    "{\"value\":[{\"key\":\"banana_1\",\"status\":true,\"errorMessage\":null,\"statusCode\":201}]}",
  );
  let endpoint = Url::parse(&format!("http://{}/", address)).unwrap();
  let mut index = RestSearchIndex::new(endpoint, "key", "fruits-quality").with_retry(no_retry());

  index.index(&document()).unwrap();

  let request = requests.recv_timeout(Duration::from_secs(5)).unwrap();
  assert!(
    request
      .request_line
      .starts_with("POST /indexes/fruits-quality/docs/index?api-version=")
  );
  assert_eq!(request.header("api-key"), Some("key"));
  let body: serde_json::Value = serde_json::from_str(&request.body).unwrap();
  assert_eq!(body["value"][0]["@search.action"], "mergeOrUpload");
  assert_eq!(body["value"][0]["fruit_type"], "banana");
}

#[test]
fn rest_search_per_document_failure_is_rejected() {
  let (address, _requests) = serve_once(
    "207 Multi-Status",
    "{\"value\":[{\"key\":\"banana_1\",\"status\":false,\"errorMessage\":\"quota\",\"statusCode\":503}]}",
  );
  let endpoint = Url::parse(&format!("http://{}/", address)).unwrap();
  let mut index = RestSearchIndex::new(endpoint, "key", "fruits-quality").with_retry(no_retry());
  assert!(matches!(
    index.index(&document()),
    Err(SinkError::Rejected { status: 503, .. })
  ));
}

#[test]
fn rest_search_returns_documents() {
  let (address, requests) = serve_once(
    "200 OK",
    "{\"value\":[{\"@search.score\":1.0,\"id\":\"apple_1\",\"timestamp\":\"2026-01-01T00:00:00Z\",\"fruit_type\":\"apple\",\"freshness_level\":\"rotten\",\"quality_score\":21.5,\"confidence\":0.7,\"location\":null,\"camera_id\":null,\"image_url\":null}]}",
  );
  let endpoint = Url::parse(&format!("http://{}/", address)).unwrap();
  let index = RestSearchIndex::new(endpoint, "key", "fruits-quality").with_retry(no_retry());

  let documents = index
    .search(
      &SearchQuery::new("apple")
        .with_filter("freshness_level eq 'rotten'")
        .with_top(5),
    )
    .unwrap();

  assert_eq!(documents.len(), 1);
  assert_eq!(documents[0].id, "apple_1");
  let request = requests.recv_timeout(Duration::from_secs(5)).unwrap();
  let body: serde_json::Value = serde_json::from_str(&request.body).unwrap();
  assert_eq!(body["filter"], "freshness_level eq 'rotten'");
  assert_eq!(body["top"], 5);
}
