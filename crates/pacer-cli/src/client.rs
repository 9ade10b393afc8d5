//! Async HTTP client wrapping the Pacer JSON API.
//!
//! Also the queue's [`ActionExecutor`]: each queued payload maps to exactly
//! one idempotent endpoint, and the HTTP status decides whether a failure is
//! worth retrying.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result, anyhow};
use pacer_core::{
  challenge::Standing,
  lifecycle::EffectiveStatus,
  store::Applied,
  streak::StreakView,
};
use pacer_sync::{ActionExecutor, ActionPayload, ExecError, SessionProvider};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

/// Header the server reads the caller's id from.
const USER_HEADER: &str = "x-pacer-user";

/// Connection settings for the Pacer API.
#[derive(Debug, Clone)]
pub struct ApiConfig {
  pub base_url: String,
}

/// Async HTTP client for the Pacer JSON REST API.
///
/// Cheap to clone: the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct ApiClient {
  client:  Client,
  config:  ApiConfig,
  session: Arc<dyn SessionProvider>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
  #[serde(default)]
  error: String,
  #[serde(default)]
  kind:  String,
}

#[derive(Debug, Deserialize)]
struct StatusBody {
  status: EffectiveStatus,
}

impl ApiClient {
  pub fn new(config: ApiConfig, session: Arc<dyn SessionProvider>) -> Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .context("failed to build HTTP client")?;
    Ok(Self { client, config, session })
  }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
  }

  /// Attach the identity current *now*.
  fn identify(&self, req: RequestBuilder) -> Option<RequestBuilder> {
    let user = self.session.current_user()?;
    Some(req.header(USER_HEADER, user.to_string()))
  }

  fn authed(&self, req: RequestBuilder) -> Result<RequestBuilder> {
    self
      .identify(req)
      .ok_or_else(|| anyhow!("not logged in; run `pacer login <user-id>` or pass --user"))
  }

  // ── Health ────────────────────────────────────────────────────────────────

  /// Reachability probe: `GET /health` with a short timeout.
  pub async fn ping(&self) -> bool {
    self
      .client
      .get(self.url("/health"))
      .timeout(Duration::from_secs(3))
      .send()
      .await
      .is_ok_and(|r| r.status().is_success())
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  /// `POST /profiles`
  pub async fn register(&self) -> Result<bool> {
    let resp = self
      .authed(self.client.post(self.url("/profiles")))?
      .send()
      .await
      .context("POST /profiles failed")?;
    match resp.status() {
      StatusCode::CREATED => Ok(true),
      StatusCode::OK => Ok(false),
      s => Err(anyhow!("POST /profiles → {s}")),
    }
  }

  /// `GET /challenges/:id/status`
  pub async fn status(&self, challenge_id: Uuid) -> Result<EffectiveStatus> {
    let path = format!("/challenges/{challenge_id}/status");
    let resp = self
      .authed(self.client.get(self.url(&path)))?
      .send()
      .await
      .with_context(|| format!("GET {path} failed"))?;
    if !resp.status().is_success() {
      return Err(anyhow!("GET {path} → {}", resp.status()));
    }
    let body: StatusBody = resp.json().await.context("deserialising status")?;
    Ok(body.status)
  }

  /// `GET /challenges/:id/leaderboard`
  pub async fn leaderboard(&self, challenge_id: Uuid) -> Result<Vec<Standing>> {
    let path = format!("/challenges/{challenge_id}/leaderboard");
    let resp = self
      .authed(self.client.get(self.url(&path)))?
      .send()
      .await
      .with_context(|| format!("GET {path} failed"))?;
    if !resp.status().is_success() {
      let status = resp.status();
      let body = resp.text().await.unwrap_or_default();
      return Err(anyhow!("GET {path} → {}", classify(status, &body)));
    }
    resp.json().await.context("deserialising leaderboard")
  }

  /// `GET /profiles/me/streak`
  pub async fn streak(&self) -> Result<StreakView> {
    let resp = self
      .authed(self.client.get(self.url("/profiles/me/streak")))?
      .send()
      .await
      .context("GET /profiles/me/streak failed")?;
    if !resp.status().is_success() {
      return Err(anyhow!("GET /profiles/me/streak → {}", resp.status()));
    }
    resp.json().await.context("deserialising streak")
  }

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn post_idempotent(
    &self,
    path: &str,
    body: Option<serde_json::Value>,
  ) -> Result<Applied<()>, ExecError> {
    let mut req = self
      .identify(self.client.post(self.url(path)))
      .ok_or_else(|| ExecError::Deferred("not logged in".into()))?;
    if let Some(body) = body {
      req = req.json(&body);
    }

    let resp = req
      .send()
      .await
      .map_err(|e| ExecError::Transient(format!("POST {path}: {e}")))?;

    match resp.status() {
      StatusCode::CREATED => Ok(Applied::Created(())),
      StatusCode::OK => Ok(Applied::AlreadyApplied(())),
      status => {
        let text = resp.text().await.unwrap_or_default();
        Err(classify(status, &text))
      }
    }
  }
}

impl ActionExecutor for ApiClient {
  async fn execute(&self, action: &ActionPayload) -> Result<Applied<()>, ExecError> {
    match action {
      ActionPayload::LogActivity(activity) => {
        let body = serde_json::to_value(activity)
          .map_err(|e| ExecError::Permanent { kind: "encode".into(), message: e.to_string() })?;
        self.post_idempotent("/activity", Some(body)).await
      }
      ActionPayload::AcceptInvite { challenge_id } => {
        self
          .post_idempotent(&format!("/challenges/{challenge_id}/accept"), None)
          .await
      }
      ActionPayload::SendFriendRequest { to_user_id } => {
        self
          .post_idempotent("/friend-requests", Some(json!({ "to_user_id": to_user_id })))
          .await
      }
    }
  }
}

/// Client errors are the server saying no; anything else may pass on retry.
/// Timeouts and rate limiting are the exceptions among 4xx.
fn classify(status: StatusCode, body: &str) -> ExecError {
  let parsed: Option<ErrorBody> = serde_json::from_str(body).ok();
  let (kind, message) = match parsed {
    Some(b) if !b.kind.is_empty() => (b.kind, b.error),
    _ => (status.as_str().to_owned(), body.to_owned()),
  };

  let retryable = matches!(
    status,
    StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS
  );
  if status.is_client_error() && !retryable {
    ExecError::Permanent { kind, message }
  } else {
    ExecError::Transient(format!("{status}: {message}"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rejections_are_permanent() {
    let body = r#"{"error":"caller is not an accepted participant","kind":"not_participant"}"#;
    assert_eq!(
      classify(StatusCode::FORBIDDEN, body),
      ExecError::Permanent {
        kind:    "not_participant".into(),
        message: "caller is not an accepted participant".into(),
      }
    );
    assert!(classify(StatusCode::UNPROCESSABLE_ENTITY, "").is_permanent());
  }

  struct LoggedOut;

  impl SessionProvider for LoggedOut {
    fn current_user(&self) -> Option<Uuid> { None }
  }

  #[tokio::test]
  async fn logged_out_actions_are_deferred() {
    // Unroutable; nothing must be sent anyway.
    let config = ApiConfig { base_url: "http://127.0.0.1:9".into() };
    let client = ApiClient::new(config, Arc::new(LoggedOut)).unwrap();
    let action = ActionPayload::SendFriendRequest { to_user_id: Uuid::new_v4() };
    assert_eq!(
      client.execute(&action).await,
      Err(ExecError::Deferred("not logged in".into()))
    );
  }

  #[test]
  fn server_errors_and_throttling_are_transient() {
    assert!(!classify(StatusCode::INTERNAL_SERVER_ERROR, "boom").is_permanent());
    assert!(!classify(StatusCode::BAD_GATEWAY, "").is_permanent());
    assert!(!classify(StatusCode::TOO_MANY_REQUESTS, "").is_permanent());
    assert!(!classify(StatusCode::REQUEST_TIMEOUT, "").is_permanent());
  }
}
