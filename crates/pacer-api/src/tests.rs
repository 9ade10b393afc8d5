//! Router tests over an in-memory SQLite store.

use std::sync::Arc;

use axum::{
  Router,
  body::Body,
  http::{Method, Request, StatusCode, header},
};
use chrono::{TimeDelta, Utc};
use pacer_store_sqlite::SqliteStore;
use serde_json::{Value, json};
use tower::ServiceExt as _;
use uuid::Uuid;

use crate::{USER_HEADER, api_router};

async fn app() -> Router {
  let store = SqliteStore::open_in_memory().await.expect("store");
  api_router(Arc::new(store))
}

async fn send(
  app: &Router,
  method: Method,
  uri: &str,
  user: Option<Uuid>,
  body: Option<Value>,
) -> (StatusCode, Value) {
  let mut req = Request::builder().method(method).uri(uri);
  if let Some(user) = user {
    req = req.header(USER_HEADER, user.to_string());
  }
  let req = match body {
    Some(b) => req
      .header(header::CONTENT_TYPE, "application/json")
      .body(Body::from(b.to_string()))
      .unwrap(),
    None => req.body(Body::empty()).unwrap(),
  };

  let res = app.clone().oneshot(req).await.unwrap();
  let status = res.status();
  let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
    .await
    .unwrap();
  let json = if bytes.is_empty() {
    Value::Null
  } else {
    serde_json::from_slice(&bytes).unwrap()
  };
  (status, json)
}

/// Register `user` and create an active challenge owned by them.
async fn active_challenge(app: &Router, user: Uuid) -> String {
  send(app, Method::POST, "/profiles", Some(user), None).await;
  let now = Utc::now();
  let (status, body) = send(
    app,
    Method::POST,
    "/challenges",
    Some(user),
    Some(json!({
      "title": "Step it up",
      "start_date": now - TimeDelta::days(1),
      "end_date": now + TimeDelta::days(6),
    })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
  body["challenge_id"].as_str().unwrap().to_owned()
}

#[tokio::test]
async fn missing_identity_is_unauthorized() {
  let app = app().await;
  let (status, body) = send(&app, Method::POST, "/profiles", None, None).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
  assert_eq!(body["kind"], "unauthenticated");
}

#[tokio::test]
async fn register_twice_reports_already_applied() {
  let app = app().await;
  let user = Uuid::new_v4();

  let (first, body) = send(&app, Method::POST, "/profiles", Some(user), None).await;
  assert_eq!(first, StatusCode::CREATED);
  assert_eq!(body["outcome"], "created");

  let (second, body) = send(&app, Method::POST, "/profiles", Some(user), None).await;
  assert_eq!(second, StatusCode::OK);
  assert_eq!(body["outcome"], "already_applied");
}

#[tokio::test]
async fn duplicate_activity_is_ok_not_error() {
  let app = app().await;
  let user = Uuid::new_v4();
  let challenge_id = active_challenge(&app, user).await;

  let activity = json!({
    "challenge_id": challenge_id,
    "activity_type": "steps",
    "value": 4200,
    "unit": "steps",
    "recorded_at": Utc::now() - TimeDelta::minutes(10),
    "source": "manual",
    "client_event_id": Uuid::new_v4(),
    "source_external_id": null,
  });

  let (status, body) =
    send(&app, Method::POST, "/activity", Some(user), Some(activity.clone())).await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(body["record"]["value"], 4200);

  let (status, body) =
    send(&app, Method::POST, "/activity", Some(user), Some(activity)).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["outcome"], "already_applied");

  let uri = format!("/challenges/{challenge_id}/leaderboard");
  let (_, board) = send(&app, Method::GET, &uri, Some(user), None).await;
  assert_eq!(board[0]["current_progress"], 4200);
}

#[tokio::test]
async fn missing_dedupe_key_is_unprocessable() {
  let app = app().await;
  let user = Uuid::new_v4();
  let challenge_id = active_challenge(&app, user).await;

  let (status, body) = send(
    &app,
    Method::POST,
    "/activity",
    Some(user),
    Some(json!({
      "challenge_id": challenge_id,
      "activity_type": "steps",
      "value": 10,
      "unit": "steps",
      "recorded_at": Utc::now(),
      "source": "googlefit",
      "client_event_id": null,
      "source_external_id": null,
    })),
  )
  .await;
  assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
  assert_eq!(body["kind"], "dedupe_key_required");
}

#[tokio::test]
async fn outsider_is_forbidden() {
  let app = app().await;
  let owner = Uuid::new_v4();
  let outsider = Uuid::new_v4();
  let challenge_id = active_challenge(&app, owner).await;
  send(&app, Method::POST, "/profiles", Some(outsider), None).await;

  let uri = format!("/challenges/{challenge_id}/status");
  let (status, body) = send(&app, Method::GET, &uri, Some(outsider), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["status"], "forbidden");

  let (status, body) = send(&app, Method::GET, &uri, Some(owner), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["status"], "active");

  let uri = format!("/challenges/{challenge_id}/leaderboard");
  let (status, body) = send(&app, Method::GET, &uri, Some(outsider), None).await;
  assert_eq!(status, StatusCode::FORBIDDEN);
  assert_eq!(body["kind"], "not_participant");

  let uri = format!("/challenges/{challenge_id}");
  let (status, _) = send(&app, Method::GET, &uri, Some(outsider), None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invite_accept_flow() {
  let app = app().await;
  let owner = Uuid::new_v4();
  let friend = Uuid::new_v4();
  let challenge_id = active_challenge(&app, owner).await;
  send(&app, Method::POST, "/profiles", Some(friend), None).await;

  let uri = format!("/challenges/{challenge_id}/invites");
  let (status, _) = send(
    &app,
    Method::POST,
    &uri,
    Some(owner),
    Some(json!({ "user_id": friend })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);

  let uri = format!("/challenges/{challenge_id}/accept");
  let (status, body) = send(&app, Method::POST, &uri, Some(friend), None).await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(body["record"]["invite_status"], "accepted");

  let (status, _) = send(&app, Method::POST, &uri, Some(friend), None).await;
  assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn cancelled_challenge_reports_cancelled() {
  let app = app().await;
  let owner = Uuid::new_v4();
  let challenge_id = active_challenge(&app, owner).await;

  let uri = format!("/challenges/{challenge_id}/override");
  let (status, _) = send(
    &app,
    Method::POST,
    &uri,
    Some(owner),
    Some(json!({ "status": "cancelled" })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);

  let uri = format!("/challenges/{challenge_id}");
  let (_, body) = send(&app, Method::GET, &uri, Some(owner), None).await;
  assert_eq!(body["status"], "cancelled");
  assert_eq!(body["status_override"], "cancelled");
}

#[tokio::test]
async fn friend_request_to_self_is_rejected() {
  let app = app().await;
  let user = Uuid::new_v4();
  send(&app, Method::POST, "/profiles", Some(user), None).await;

  let (status, body) = send(
    &app,
    Method::POST,
    "/friend-requests",
    Some(user),
    Some(json!({ "to_user_id": user })),
  )
  .await;
  assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
  assert_eq!(body["kind"], "self_friend_request");
}
