use std::time::Duration;

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use tracing::debug;
use url::Url;

use crate::config::{ApiConfig, Config};
use crate::error::FetchError;

use super::api_types::decode_response;
use super::types::{EntityKind, FiscalYear, ReportRecord, UserId};

/// Source of full report collections.
///
/// Implementations return either the complete collection for a kind and year
/// or an error; never a partial result.
#[async_trait]
pub trait RemoteSource: Send + Sync {
  async fn fetch(
    &self,
    kind: EntityKind,
    user: UserId,
    year: &FiscalYear,
  ) -> Result<Vec<ReportRecord>, FetchError>;
}

/// Report API client over HTTP
#[derive(Clone)]
pub struct HttpRemoteSource {
  client: reqwest::Client,
  base_url: Url,
  token: Option<String>,
}

impl HttpRemoteSource {
  pub fn new(api: &ApiConfig) -> Result<Self> {
    let timeout = Duration::from_secs(api.timeout_secs);
    let client = reqwest::Client::builder()
      .connect_timeout(timeout)
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    // Url::join drops the last path segment unless it ends with a slash
    let mut base = api.base_url.clone();
    if !base.ends_with('/') {
      base.push('/');
    }
    let base_url =
      Url::parse(&base).map_err(|e| eyre!("Invalid API base URL '{}': {}", api.base_url, e))?;

    Ok(Self {
      client,
      base_url,
      token: Config::get_api_token(),
    })
  }

  fn endpoint_url(
    &self,
    kind: EntityKind,
    user: UserId,
    year: &FiscalYear,
  ) -> Result<Url, FetchError> {
    let mut url = self
      .base_url
      .join(kind.endpoint())
      .map_err(|e| FetchError::NetworkUnavailable(format!("bad endpoint url: {}", e)))?;
    url
      .query_pairs_mut()
      .append_pair("userId", &user.to_string())
      .append_pair("fiscalYear", year.as_str());
    Ok(url)
  }
}

#[async_trait]
impl RemoteSource for HttpRemoteSource {
  async fn fetch(
    &self,
    kind: EntityKind,
    user: UserId,
    year: &FiscalYear,
  ) -> Result<Vec<ReportRecord>, FetchError> {
    let url = self.endpoint_url(kind, user, year)?;
    debug!(%kind, %year, %url, "fetching report collection");

    let mut request = self.client.get(url);
    if let Some(token) = &self.token {
      request = request.bearer_auth(token);
    }

    let response = request.send().await.map_err(transport_error)?;
    let status = response.status();
    let body = response.bytes().await.map_err(transport_error)?;

    if !status.is_success() {
      return Err(FetchError::ServerError {
        code: status.as_u16(),
        message: String::from_utf8_lossy(&body).chars().take(200).collect(),
      });
    }

    decode_response(kind, status.as_u16(), &body)
  }
}

/// Timeouts, refused connections and dropped bodies all mean "network down".
fn transport_error(e: reqwest::Error) -> FetchError {
  if e.is_decode() {
    return FetchError::MalformedResponse(e.to_string());
  }
  if let Some(status) = e.status() {
    return FetchError::ServerError {
      code: status.as_u16(),
      message: e.to_string(),
    };
  }
  FetchError::NetworkUnavailable(e.to_string())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn api(base_url: &str) -> ApiConfig {
    ApiConfig {
      base_url: base_url.to_string(),
      user_id: 1,
      company_code: "ACME".into(),
      timeout_secs: 30,
    }
  }

  #[test]
  fn test_endpoint_url_keeps_base_path() {
    let source = HttpRemoteSource::new(&api("https://reports.example.com/api")).unwrap();
    let url = source
      .endpoint_url(
        EntityKind::Outstanding,
        UserId::new(42).unwrap(),
        &FiscalYear::parse("2024-25").unwrap(),
      )
      .unwrap();
    assert_eq!(
      url.as_str(),
      "https://reports.example.com/api/reports/outstanding?userId=42&fiscalYear=2024-25"
    );
  }

  #[test]
  fn test_invalid_base_url_is_rejected() {
    assert!(HttpRemoteSource::new(&api("not a url")).is_err());
  }

  #[tokio::test]
  async fn test_unreachable_host_is_network_unavailable() {
    let mut config = api("http://127.0.0.1:9/");
    config.timeout_secs = 1;
    let source = HttpRemoteSource::new(&config).unwrap();
    let err = source
      .fetch(
        EntityKind::Stock,
        UserId::new(1).unwrap(),
        &FiscalYear::parse("2024-25").unwrap(),
      )
      .await
      .unwrap_err();
    assert!(matches!(err, FetchError::NetworkUnavailable(_)));
  }

  /// Serve one canned HTTP response on a local port and return its base URL.
  async fn serve_once(response: &'static [u8]) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      let (mut socket, _) = listener.accept().await.unwrap();
      let mut request = Vec::new();
      let mut buf = [0u8; 1024];
      while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
          break;
        }
        request.extend_from_slice(&buf[..n]);
      }
      socket.write_all(response).await.unwrap();
      socket.shutdown().await.unwrap();
    });
    format!("http://{}/", addr)
  }

  #[tokio::test]
  async fn test_non_success_status_is_server_error() {
    let base = serve_once(
      b"HTTP/1.1 503 Service Unavailable\r\ncontent-length: 4\r\nconnection: close\r\n\r\nbusy",
    )
    .await;
    let source = HttpRemoteSource::new(&api(&base)).unwrap();

    let err = source
      .fetch(
        EntityKind::Ledger,
        UserId::new(1).unwrap(),
        &FiscalYear::parse("2024-25").unwrap(),
      )
      .await
      .unwrap_err();

    match &err {
      FetchError::ServerError { code, message } => {
        assert_eq!(*code, 503);
        assert_eq!(message, "busy");
      }
      other => panic!("expected server error, got {:?}", other),
    }
    assert!(err.is_retryable());
  }
}
