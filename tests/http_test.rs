//! Daemon wire contract: auth, status mapping, task surface.

mod helpers;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use helpers::{mem_db, root_container, seed_actor, simple_task};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tower::ServiceExt;
use wrkq::config::{Overrides, WrkqConfig};
use wrkq::infrastructure::http::{self, ApiState};
use wrkq::operations::{resolver::Resolver, webhooks};

async fn state_with_token(token: Option<&str>) -> (Arc<ApiState>, uuid::Uuid) {
	let db = mem_db().await;
	let actor = seed_actor(&db).await;
	let inbox = root_container(&db, actor, "inbox").await;
	simple_task(&db, actor, inbox.uuid, "ship-it").await;

	let tmp = tempfile::tempdir().expect("tempdir");
	let mut config = WrkqConfig::resolve(Overrides {
		data_dir: Some(tmp.path().to_path_buf()),
		..Default::default()
	})
	.expect("config");
	config.token = token.map(str::to_owned);

	let state = Arc::new(ApiState {
		db: Arc::new(db),
		resolver: Resolver::new(None),
		sink: Arc::new(webhooks::TraceSink),
		config,
	});
	(state, actor)
}

#[tokio::test]
async fn bearer_token_gates_requests() {
	let (state, _) = state_with_token(Some("sekrit")).await;
	let app = http::router(state);

	let denied = app
		.clone()
		.oneshot(
			Request::builder()
				.uri("/v1/tasks")
				.body(Body::empty())
				.expect("request"),
		)
		.await
		.expect("response");
	assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

	let wrong = app
		.clone()
		.oneshot(
			Request::builder()
				.uri("/v1/tasks")
				.header("authorization", "Bearer nope")
				.body(Body::empty())
				.expect("request"),
		)
		.await
		.expect("response");
	assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

	let allowed = app
		.oneshot(
			Request::builder()
				.uri("/v1/tasks")
				.header("authorization", "Bearer sekrit")
				.body(Body::empty())
				.expect("request"),
		)
		.await
		.expect("response");
	assert_eq!(allowed.status(), StatusCode::OK);
}

#[tokio::test]
async fn task_lifecycle_over_http() {
	let (state, _) = state_with_token(None).await;
	let app = http::router(state);

	// Create under the existing container.
	let created = app
		.clone()
		.oneshot(
			Request::builder()
				.method("POST")
				.uri("/v1/tasks")
				.header("content-type", "application/json")
				.body(Body::from(
					serde_json::json!({
						"container": "inbox",
						"title": "From the wire",
					})
					.to_string(),
				))
				.expect("request"),
		)
		.await
		.expect("response");
	assert_eq!(created.status(), StatusCode::CREATED);

	// Read it back by path.
	let fetched = app
		.clone()
		.oneshot(
			Request::builder()
				.uri("/v1/tasks/inbox%2Ffrom-the-wire")
				.body(Body::empty())
				.expect("request"),
		)
		.await
		.expect("response");
	assert_eq!(fetched.status(), StatusCode::OK);

	// Stale etag precondition maps to 409.
	let conflicted = app
		.clone()
		.oneshot(
			Request::builder()
				.method("PATCH")
				.uri("/v1/tasks/inbox%2Ffrom-the-wire")
				.header("content-type", "application/json")
				.header("if-match", "42")
				.body(Body::from(
					serde_json::json!({ "title": "stale write" }).to_string(),
				))
				.expect("request"),
		)
		.await
		.expect("response");
	assert_eq!(conflicted.status(), StatusCode::CONFLICT);

	// Unknown references map to 404.
	let missing = app
		.oneshot(
			Request::builder()
				.uri("/v1/tasks/T-09999")
				.body(Body::empty())
				.expect("request"),
		)
		.await
		.expect("response");
	assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn validation_maps_to_bad_request() {
	let (state, _) = state_with_token(None).await;
	let app = http::router(state);

	let response = app
		.oneshot(
			Request::builder()
				.method("POST")
				.uri("/v1/tasks")
				.header("content-type", "application/json")
				.body(Body::from(
					serde_json::json!({
						"container": "inbox",
						"title": "bad priority",
						"priority": 9,
					})
					.to_string(),
				))
				.expect("request"),
		)
		.await
		.expect("response");
	assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
