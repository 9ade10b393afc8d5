//! HTTP server wiring for Pacer.
//!
//! Mounts the [`pacer_api`] router next to a health probe and wraps
//! everything in request tracing. The binary in `main.rs` only loads
//! configuration, opens the store and calls [`router`].

use std::{path::PathBuf, sync::Arc};

use axum::{Json, Router, routing::get};
use pacer_core::store::ChallengeStore;
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `PACER_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  pub host:       String,
  pub port:       u16,
  pub store_path: PathBuf,
}

impl ServerConfig {
  pub const DEFAULT_HOST: &'static str = "127.0.0.1";
  pub const DEFAULT_PORT: u16 = 8080;
  pub const DEFAULT_STORE_PATH: &'static str = "~/.local/share/pacer/pacer.db";

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the full application router for `store`.
pub fn router<S>(store: Arc<S>) -> Router
where
  S: ChallengeStore + Send + Sync + 'static,
{
  Router::new()
    .route("/health", get(health))
    .merge(pacer_api::api_router(store))
    .layer(
      TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO)),
    )
}

async fn health() -> Json<Value> { Json(json!({ "status": "ok" })) }

#[cfg(test)]
mod tests {
  use axum::{
    body::Body,
    http::{Request, StatusCode},
  };
  use pacer_store_sqlite::SqliteStore;
  use tower::ServiceExt as _;

  use super::*;

  async fn app() -> Router {
    let store = SqliteStore::open_in_memory().await.unwrap();
    router(Arc::new(store))
  }

  #[tokio::test]
  async fn health_is_ok_without_identity() {
    let res = app()
      .await
      .oneshot(Request::get("/health").body(Body::empty()).unwrap())
      .await
      .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
  }

  #[tokio::test]
  async fn api_routes_are_mounted_at_root() {
    let res = app()
      .await
      .oneshot(
        Request::post("/profiles")
          .header(pacer_api::USER_HEADER, uuid_string())
          .body(Body::empty())
          .unwrap(),
      )
      .await
      .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
  }

  #[tokio::test]
  async fn unknown_route_is_not_found() {
    let res = app()
      .await
      .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
      .await
      .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
  }

  fn uuid_string() -> String { "6f1c2b7e-3d4a-4c5b-9e8f-0a1b2c3d4e5f".to_owned() }

  #[test]
  fn address_joins_host_and_port() {
    let cfg = ServerConfig {
      host:       "0.0.0.0".into(),
      port:       9000,
      store_path: PathBuf::from(":memory:"),
    };
    assert_eq!(cfg.address(), "0.0.0.0:9000");
  }
}
