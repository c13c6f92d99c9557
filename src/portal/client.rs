use color_eyre::{eyre::eyre, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::cache::FetchError;
use crate::config::Config;

use super::api_types::ApiProfile;
use super::types::{Confrere, FormationMember};

const PROFILE_COLUMNS: &str = "id,first_name,last_name,email,role,stage,created_at,community:communities(name)";

/// REST client for the portal backend
#[derive(Clone)]
pub struct PortalClient {
  http: reqwest::Client,
  base: Url,
}

impl PortalClient {
  pub fn new(config: &Config) -> Result<Self> {
    let api_key = Config::get_api_key()?;
    let access_token = Config::get_access_token();
    Self::with_credentials(
      &config.backend.url,
      &config.backend.schema,
      &api_key,
      access_token.as_deref(),
    )
  }

  pub fn with_credentials(
    base_url: &str,
    schema: &str,
    api_key: &str,
    access_token: Option<&str>,
  ) -> Result<Self> {
    let base = Url::parse(base_url)
      .and_then(|url| url.join("rest/v1/"))
      .map_err(|e| eyre!("Invalid backend URL '{}': {}", base_url, e))?;

    let bearer = format!("Bearer {}", access_token.unwrap_or(api_key));
    let mut headers = HeaderMap::new();
    headers.insert(
      "apikey",
      HeaderValue::from_str(api_key).map_err(|e| eyre!("Invalid API key: {}", e))?,
    );
    headers.insert(
      AUTHORIZATION,
      HeaderValue::from_str(&bearer).map_err(|e| eyre!("Invalid access token: {}", e))?,
    );
    headers.insert(
      "Accept-Profile",
      HeaderValue::from_str(schema).map_err(|e| eyre!("Invalid schema name: {}", e))?,
    );
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    let http = reqwest::Client::builder()
      .default_headers(headers)
      .timeout(Duration::from_secs(30))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { http, base })
  }

  /// Host shown in the dashboard header
  pub fn host(&self) -> &str {
    self.base.host_str().unwrap_or("")
  }

  fn table_url(&self, table: &str) -> Result<Url, FetchError> {
    self
      .base
      .join(table)
      .map_err(|e| FetchError::permanent(format!("Invalid table '{}': {}", table, e)))
  }

  async fn get_profiles(&self, filters: &[(&str, &str)]) -> Result<Vec<ApiProfile>, FetchError> {
    let url = self.table_url("profiles")?;
    debug!(%url, ?filters, "fetching profiles");

    let response = self
      .http
      .get(url)
      .query(&[("select", PROFILE_COLUMNS)])
      .query(filters)
      .send()
      .await
      .map_err(transport_error)?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(classify_status(status, &body));
    }

    response
      .json()
      .await
      .map_err(|e| FetchError::decode(format!("Failed to parse profiles: {}", e)))
  }

  /// Formators and directors, ordered by name
  pub async fn formation_personnel(&self) -> Result<Vec<FormationMember>, FetchError> {
    let rows = self
      .get_profiles(&[
        ("role", "in.(formator,director)"),
        ("approved", "eq.true"),
        ("order", "last_name.asc"),
      ])
      .await?;

    Ok(rows.into_iter().map(ApiProfile::into_member).collect())
  }

  /// Confreres in formation, optionally restricted to one stage
  pub async fn confreres_in_formation(
    &self,
    stage: Option<&str>,
  ) -> Result<Vec<Confrere>, FetchError> {
    let stage_filter = match stage {
      Some(s) => format!("eq.{}", s.trim().to_lowercase()),
      None => "not.is.null".to_string(),
    };

    let rows = self
      .get_profiles(&[
        ("role", "eq.confrere"),
        ("stage", stage_filter.as_str()),
        ("order", "last_name.asc"),
      ])
      .await?;

    Ok(rows.into_iter().map(ApiProfile::into_confrere).collect())
  }

  /// Number of accounts waiting for approval
  pub async fn pending_approvals(&self) -> Result<u64, FetchError> {
    let url = self.table_url("profiles")?;

    let response = self
      .http
      .get(url)
      .query(&[("select", "id"), ("approved", "eq.false")])
      .header("Prefer", "count=exact")
      .header("Range", "0-0")
      .send()
      .await
      .map_err(transport_error)?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(classify_status(status, &body));
    }

    response
      .headers()
      .get("content-range")
      .and_then(|v| v.to_str().ok())
      .and_then(parse_content_range)
      .ok_or_else(|| FetchError::decode("Missing or malformed Content-Range header"))
  }
}

fn transport_error(e: reqwest::Error) -> FetchError {
  FetchError::transient(format!("Request failed: {}", e))
}

/// Map an HTTP error status to a fetch error.
///
/// Server errors, timeouts and throttling are worth retrying; anything else
/// will fail the same way again.
fn classify_status(status: StatusCode, body: &str) -> FetchError {
  let message = if body.trim().is_empty() {
    format!("Backend returned {}", status)
  } else {
    format!("Backend returned {}: {}", status, body.trim())
  };

  if status.is_server_error()
    || status == StatusCode::REQUEST_TIMEOUT
    || status == StatusCode::TOO_MANY_REQUESTS
  {
    FetchError::transient(message)
  } else {
    FetchError::permanent(message)
  }
}

/// Parse the total from a `Content-Range` header ("0-0/42" or "*/0").
fn parse_content_range(header: &str) -> Option<u64> {
  header.rsplit_once('/')?.1.trim().parse().ok()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::FetchErrorKind;
  use httpmock::prelude::*;
  use serde_json::json;

  fn client(server: &MockServer) -> PortalClient {
    PortalClient::with_credentials(&server.base_url(), "public", "anon-key", None).unwrap()
  }

  #[test]
  fn test_parse_content_range() {
    assert_eq!(parse_content_range("0-0/42"), Some(42));
    assert_eq!(parse_content_range("*/0"), Some(0));
    assert_eq!(parse_content_range("0-0/*"), None);
    assert_eq!(parse_content_range("garbage"), None);
  }

  #[test]
  fn test_classify_status() {
    let err = classify_status(StatusCode::SERVICE_UNAVAILABLE, "");
    assert_eq!(err.kind(), FetchErrorKind::Transient);
    assert_eq!(err.message(), "Backend returned 503 Service Unavailable");

    let err = classify_status(StatusCode::FORBIDDEN, "permission denied for table profiles");
    assert_eq!(err.kind(), FetchErrorKind::Permanent);
    assert!(err.message().contains("permission denied"));

    assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "").is_retryable());
  }

  #[test]
  fn test_invalid_base_url() {
    assert!(PortalClient::with_credentials("not a url", "public", "k", None).is_err());
  }

  #[tokio::test]
  async fn test_formation_personnel() {
    let server = MockServer::start_async().await;
    let mock = server
      .mock_async(|when, then| {
        when
          .method(GET)
          .path("/rest/v1/profiles")
          .header("apikey", "anon-key")
          .header("authorization", "Bearer anon-key")
          .query_param("role", "in.(formator,director)");
        then.status(200).json_body(json!([
          {"id": "p1", "first_name": "Anne", "last_name": "Bernard", "role": "director"},
          {"id": "p2", "first_name": "Paul", "last_name": "Roux", "role": "formator",
           "community": {"name": "Paris"}}
        ]));
      })
      .await;

    let members = client(&server).formation_personnel().await.unwrap();

    mock.assert_async().await;
    assert_eq!(members.len(), 2);
    assert_eq!(members[0].full_name, "Anne Bernard");
    assert_eq!(members[1].community.as_deref(), Some("Paris"));
  }

  #[tokio::test]
  async fn test_confreres_stage_filter() {
    let server = MockServer::start_async().await;
    let mock = server
      .mock_async(|when, then| {
        when
          .method(GET)
          .path("/rest/v1/profiles")
          .query_param("role", "eq.confrere")
          .query_param("stage", "eq.novitiate");
        then.status(200).json_body(json!([]));
      })
      .await;

    let confreres = client(&server)
      .confreres_in_formation(Some("Novitiate"))
      .await
      .unwrap();

    mock.assert_async().await;
    assert!(confreres.is_empty());
  }

  #[tokio::test]
  async fn test_pending_approvals_count() {
    let server = MockServer::start_async().await;
    server
      .mock_async(|when, then| {
        when
          .method(GET)
          .path("/rest/v1/profiles")
          .query_param("approved", "eq.false")
          .header("prefer", "count=exact");
        then
          .status(206)
          .header("content-range", "0-0/4")
          .json_body(json!([{"id": "p9"}]));
      })
      .await;

    assert_eq!(client(&server).pending_approvals().await.unwrap(), 4);
  }

  #[tokio::test]
  async fn test_forbidden_is_permanent() {
    let server = MockServer::start_async().await;
    server
      .mock_async(|when, then| {
        when.method(GET).path("/rest/v1/profiles");
        then
          .status(403)
          .body("permission denied for table profiles");
      })
      .await;

    let err = client(&server).formation_personnel().await.unwrap_err();
    assert_eq!(err.kind(), FetchErrorKind::Permanent);
  }
}
