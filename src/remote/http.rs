//! HTTP reporting API source.
//!
//! Fetches `{base}/{platform}/{account}/{kind}?range={range}` with a bearer
//! token and walks `paging.next` cursors on the same origin.

use async_trait::async_trait;
use reqwest::{header::HeaderMap, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

use super::{RemoteDataSource, RemoteError};
use crate::error::{Error, Result};

const DEFAULT_MAX_PAGES: usize = 20;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Reporting API client.
///
/// Concatenates every page's `data` array into one `{"data": [...]}` body.
/// A result that needs more than `max_pages` pages is rejected rather than
/// cached truncated.
#[derive(Clone)]
pub struct HttpSource {
  client: reqwest::Client,
  base_url: Url,
  token: Option<String>,
  max_pages: usize,
}

impl HttpSource {
  pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
    Self::with_options(base_url, token, DEFAULT_MAX_PAGES, DEFAULT_TIMEOUT)
  }

  pub fn with_options(
    base_url: &str,
    token: Option<String>,
    max_pages: usize,
    timeout: Duration,
  ) -> Result<Self> {
    let base_url = Url::parse(base_url)
      .map_err(|e| Error::InvalidArgument(format!("invalid base url {}: {}", base_url, e)))?;
    if base_url.cannot_be_a_base() {
      return Err(Error::InvalidArgument(format!(
        "base url {} cannot have path segments",
        base_url
      )));
    }

    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| Error::InvalidArgument(format!("failed to build HTTP client: {}", e)))?;

    Ok(Self {
      client,
      base_url,
      token,
      max_pages: max_pages.max(1),
    })
  }

  /// URL for the first page of a request.
  pub fn request_url(&self, scope: &str, range_descriptor: &str, data_kind: &str) -> Url {
    let mut url = self.base_url.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
      segments
        .pop_if_empty()
        .extend(scope.split(':'))
        .push(data_kind);
    }
    url.query_pairs_mut().append_pair("range", range_descriptor);
    url
  }

  async fn get_json(&self, url: Url) -> Result<Value, RemoteError> {
    let mut request = self.client.get(url);
    if let Some(token) = &self.token {
      request = request.bearer_auth(token);
    }

    let response = request
      .send()
      .await
      .map_err(|e| RemoteError::Transient(format!("request failed: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
      let retry_after = retry_after(response.headers());
      let body = response.text().await.unwrap_or_default();
      return Err(classify_status(status, retry_after, &body));
    }

    let bytes = response
      .bytes()
      .await
      .map_err(|e| RemoteError::Transient(format!("failed to read response: {}", e)))?;
    serde_json::from_slice(&bytes)
      .map_err(|e| RemoteError::Other(format!("invalid JSON in response: {}", e)))
  }

  /// Parse a paging cursor. The token is only ever sent to the base origin.
  fn follow(&self, cursor: &str) -> Result<Url, RemoteError> {
    let url = Url::parse(cursor)
      .map_err(|e| RemoteError::Other(format!("invalid paging cursor {:?}: {}", cursor, e)))?;
    if url.origin() != self.base_url.origin() {
      return Err(RemoteError::Other(format!(
        "paging cursor leaves {}: {}",
        self.base_url.origin().ascii_serialization(),
        url
      )));
    }
    Ok(url)
  }
}

#[async_trait]
impl RemoteDataSource for HttpSource {
  type Payload = Value;

  async fn fetch(
    &self,
    scope: &str,
    range_descriptor: &str,
    data_kind: &str,
  ) -> Result<Value, RemoteError> {
    let mut next = Some(self.request_url(scope, range_descriptor, data_kind));
    let mut rows = Vec::new();
    let mut pages = 0;

    while let Some(url) = next.take() {
      let body = self.get_json(url).await?;
      pages += 1;

      let (data, cursor) = match split_page(body) {
        Ok(page) => page,
        // Unpaged body on the first request: hand it back untouched
        Err(body) if pages == 1 => return Ok(body),
        Err(_) => {
          return Err(RemoteError::Other(format!(
            "page {} of {} had no data array",
            pages, data_kind
          )))
        }
      };
      rows.extend(data);

      let Some(cursor) = cursor else { break };
      if pages >= self.max_pages {
        tracing::warn!(scope, data_kind, pages, "page limit reached");
        return Err(RemoteError::Validation(format!(
          "{} for {} spans more than {} pages; narrow the date range",
          data_kind, range_descriptor, self.max_pages
        )));
      }
      next = Some(self.follow(&cursor)?);
    }

    tracing::debug!(scope, data_kind, pages, rows = rows.len(), "remote fetch complete");
    Ok(json!({ "data": rows }))
  }
}

/// Split a `{ "data": [...], "paging": { "next": "..." } }` page.
/// Bodies without a `data` array are returned as `Err`.
fn split_page(mut body: Value) -> std::result::Result<(Vec<Value>, Option<String>), Value> {
  let data = match body.get_mut("data").map(Value::take) {
    Some(Value::Array(rows)) => rows,
    Some(other) => {
      body["data"] = other;
      return Err(body);
    }
    None => return Err(body),
  };

  let next = body
    .pointer("/paging/next")
    .and_then(Value::as_str)
    .map(String::from);
  Ok((data, next))
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
  headers
    .get(reqwest::header::RETRY_AFTER)?
    .to_str()
    .ok()?
    .trim()
    .parse::<u64>()
    .ok()
    .map(Duration::from_secs)
}

fn classify_status(status: StatusCode, retry_after: Option<Duration>, body: &str) -> RemoteError {
  let message = format!("{}: {}", status, truncate(body, 200));
  match status {
    StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::Auth(message),
    StatusCode::TOO_MANY_REQUESTS => RemoteError::RateLimited {
      message,
      retry_after,
    },
    StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY => {
      RemoteError::Validation(message)
    }
    s if s.is_server_error() => RemoteError::Transient(message),
    _ => RemoteError::Other(message),
  }
}

fn truncate(s: &str, max: usize) -> &str {
  match s.char_indices().nth(max) {
    Some((idx, _)) => &s[..idx],
    None => s,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use wiremock::matchers::{header, method, path, query_param};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  const TOKEN: &str = "secret-token";

  fn source(server: &MockServer, max_pages: usize) -> HttpSource {
    HttpSource::with_options(
      &format!("{}/v1/", server.uri()),
      Some(TOKEN.to_string()),
      max_pages,
      Duration::from_secs(5),
    )
    .unwrap()
  }

  async fn mount_json(server: &MockServer, at: &str, body: Value) {
    Mock::given(method("GET"))
      .and(path(at))
      .respond_with(ResponseTemplate::new(200).set_body_json(body))
      .expect(1)
      .mount(server)
      .await;
  }

  #[tokio::test]
  async fn test_fetch_concatenates_pages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/v1/meta/act_1/insights"))
      .and(query_param("range", "preset:last_7d"))
      .and(header("authorization", "Bearer secret-token"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "data": [{"ad_id": "1"}, {"ad_id": "2"}],
        "paging": {"next": format!("{}/v1/pages/2", server.uri())}
      })))
      .expect(1)
      .mount(&server)
      .await;
    mount_json(
      &server,
      "/v1/pages/2",
      json!({"data": [{"ad_id": "3"}], "paging": {}}),
    )
    .await;

    let body = source(&server, 20)
      .fetch("meta:act_1", "preset:last_7d", "insights")
      .await
      .unwrap();

    assert_eq!(
      body,
      json!({"data": [{"ad_id": "1"}, {"ad_id": "2"}, {"ad_id": "3"}]})
    );
  }

  #[tokio::test]
  async fn test_fetch_returns_unpaged_body_as_is() {
    let server = MockServer::start().await;
    let summary = json!({"summary": {"spend": 1250.5, "orders": 12}});
    mount_json(&server, "/v1/ecforce/shop/orders", summary.clone()).await;

    let body = source(&server, 20)
      .fetch("ecforce:shop", "preset:yesterday", "orders")
      .await
      .unwrap();

    assert_eq!(body, summary);
  }

  #[tokio::test]
  async fn test_fetch_rejects_results_past_page_limit() {
    let server = MockServer::start().await;
    mount_json(
      &server,
      "/v1/meta/act_1/ads",
      json!({"data": [1], "paging": {"next": format!("{}/v1/pages/2", server.uri())}}),
    )
    .await;
    mount_json(
      &server,
      "/v1/pages/2",
      json!({"data": [2], "paging": {"next": format!("{}/v1/pages/3", server.uri())}}),
    )
    .await;

    let err = source(&server, 2)
      .fetch("meta:act_1", "preset:last_30d", "ads")
      .await
      .unwrap_err();

    assert!(matches!(err, RemoteError::Validation(_)));
    assert!(!err.is_retryable());
  }

  #[tokio::test]
  async fn test_fetch_last_page_at_limit_is_complete() {
    let server = MockServer::start().await;
    mount_json(
      &server,
      "/v1/meta/act_1/ads",
      json!({"data": [1], "paging": {"next": format!("{}/v1/pages/2", server.uri())}}),
    )
    .await;
    mount_json(&server, "/v1/pages/2", json!({"data": [2]})).await;

    let body = source(&server, 2)
      .fetch("meta:act_1", "preset:last_30d", "ads")
      .await
      .unwrap();

    assert_eq!(body, json!({"data": [1, 2]}));
  }

  #[tokio::test]
  async fn test_fetch_invalid_cursor() {
    let server = MockServer::start().await;
    mount_json(
      &server,
      "/v1/meta/act_1/insights",
      json!({"data": [], "paging": {"next": "::not a url"}}),
    )
    .await;

    let err = source(&server, 20)
      .fetch("meta:act_1", "preset:today", "insights")
      .await
      .unwrap_err();

    assert!(matches!(err, RemoteError::Other(ref m) if m.contains("invalid paging cursor")));
  }

  #[tokio::test]
  async fn test_fetch_refuses_cross_origin_cursor() {
    let server = MockServer::start().await;
    mount_json(
      &server,
      "/v1/meta/act_1/insights",
      json!({"data": [], "paging": {"next": "https://collector.example.net/v1/pages/2"}}),
    )
    .await;

    let err = source(&server, 20)
      .fetch("meta:act_1", "preset:today", "insights")
      .await
      .unwrap_err();

    assert!(matches!(err, RemoteError::Other(ref m) if m.contains("leaves")));
  }

  #[tokio::test]
  async fn test_fetch_later_page_without_data() {
    let server = MockServer::start().await;
    mount_json(
      &server,
      "/v1/google/1234567890/campaigns",
      json!({"data": [1], "paging": {"next": format!("{}/v1/pages/2", server.uri())}}),
    )
    .await;
    mount_json(&server, "/v1/pages/2", json!({"error": "cursor expired"})).await;

    let err = source(&server, 20)
      .fetch("google:1234567890", "preset:last_14d", "campaigns")
      .await
      .unwrap_err();

    assert!(matches!(err, RemoteError::Other(ref m) if m.contains("page 2")));
  }

  #[tokio::test]
  async fn test_fetch_maps_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .respond_with(ResponseTemplate::new(401).set_body_string("invalid token"))
      .mount(&server)
      .await;

    let err = source(&server, 20)
      .fetch("meta:act_1", "preset:today", "insights")
      .await
      .unwrap_err();

    assert!(matches!(err, RemoteError::Auth(ref m) if m.contains("invalid token")));
  }

  #[tokio::test]
  async fn test_fetch_maps_rate_limit_with_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .respond_with(
        ResponseTemplate::new(429)
          .insert_header("Retry-After", "3")
          .set_body_string("too many calls"),
      )
      .mount(&server)
      .await;

    let err = source(&server, 20)
      .fetch("meta:act_1", "preset:today", "insights")
      .await
      .unwrap_err();

    assert!(matches!(
      err,
      RemoteError::RateLimited {
        retry_after: Some(d),
        ..
      } if d == Duration::from_secs(3)
    ));
  }

  #[test]
  fn test_request_url() {
    let source = HttpSource::new("https://reports.example.com/v1/", None).unwrap();
    let url = source.request_url("meta:act_123", "preset:last_7d", "insights");
    assert_eq!(
      url.as_str(),
      "https://reports.example.com/v1/meta/act_123/insights?range=preset%3Alast_7d"
    );
  }

  #[test]
  fn test_request_url_without_trailing_slash() {
    let source = HttpSource::new("https://reports.example.com/api", None).unwrap();
    let url = source.request_url("google:123-456-7890", "custom:2024-01-01..2024-01-31", "campaigns");
    assert_eq!(url.path(), "/api/google/123-456-7890/campaigns");
    assert_eq!(
      url.query_pairs().next().map(|(k, v)| (k.into_owned(), v.into_owned())),
      Some(("range".to_string(), "custom:2024-01-01..2024-01-31".to_string()))
    );
  }

  #[test]
  fn test_rejects_bad_base_url() {
    assert!(matches!(
      HttpSource::new("not a url", None),
      Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
      HttpSource::new("mailto:ads@example.com", None),
      Err(Error::InvalidArgument(_))
    ));
  }

  #[test]
  fn test_classify_status() {
    assert!(matches!(
      classify_status(StatusCode::UNAUTHORIZED, None, ""),
      RemoteError::Auth(_)
    ));
    assert!(matches!(
      classify_status(StatusCode::FORBIDDEN, None, ""),
      RemoteError::Auth(_)
    ));
    assert!(matches!(
      classify_status(StatusCode::UNPROCESSABLE_ENTITY, None, "bad field"),
      RemoteError::Validation(_)
    ));
    assert!(matches!(
      classify_status(StatusCode::SERVICE_UNAVAILABLE, None, ""),
      RemoteError::Transient(_)
    ));
    assert!(matches!(
      classify_status(StatusCode::TOO_MANY_REQUESTS, Some(Duration::from_secs(5)), ""),
      RemoteError::RateLimited {
        retry_after: Some(d),
        ..
      } if d == Duration::from_secs(5)
    ));
    assert!(classify_status(StatusCode::IM_A_TEAPOT, None, "").is_retryable());
  }

  #[test]
  fn test_retry_after_header() {
    let mut headers = HeaderMap::new();
    headers.insert(reqwest::header::RETRY_AFTER, "7".parse().unwrap());
    assert_eq!(retry_after(&headers), Some(Duration::from_secs(7)));

    headers.insert(
      reqwest::header::RETRY_AFTER,
      "Wed, 21 Oct 2015 07:28:00 GMT".parse().unwrap(),
    );
    assert_eq!(retry_after(&headers), None);
  }

  #[test]
  fn test_split_page() {
    let page = json!({
      "data": [{"ad_id": "1"}, {"ad_id": "2"}],
      "paging": {"next": "https://reports.example.com/v1/next?after=abc"}
    });
    let (rows, next) = split_page(page).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(next.as_deref(), Some("https://reports.example.com/v1/next?after=abc"));

    let (rows, next) = split_page(json!({"data": []})).unwrap();
    assert!(rows.is_empty());
    assert!(next.is_none());
  }

  #[test]
  fn test_split_page_unpaged_body_untouched() {
    let body = json!({"summary": {"spend": 10}});
    assert_eq!(split_page(body.clone()).unwrap_err(), body);

    let body = json!({"data": {"spend": 10}});
    assert_eq!(split_page(body.clone()).unwrap_err(), body);
  }

  #[test]
  fn test_truncate_respects_char_boundaries() {
    assert_eq!(truncate("広告データ", 2), "広告");
    assert_eq!(truncate("short", 200), "short");
  }
}
