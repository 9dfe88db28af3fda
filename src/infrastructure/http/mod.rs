//! HTTP daemon.
//!
//! A thin JSON surface over the store operations. Authentication is a
//! bearer token compared in constant time; an `x-wrkq-actor` header
//! overrides the configured actor. Error kinds map onto status codes:
//! validation and resolution 400, auth 401, missing subject 404, wrong verb
//! 405 (axum's default), etag mismatch 409, anything else 500.

use crate::config::WrkqConfig;
use crate::domain::fields::{parse_relation_kind, parse_role, parse_state, parse_task_kind};
use crate::infrastructure::database::{paths, Database};
use crate::operations::{
	actors, bundle, comments, containers, doctor, find, relations, resolver::Resolver, snapshot,
	tasks, watch, webhooks,
};
use crate::shared::{Error, Result};
use axum::extract::{Path as UrlPath, Query, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// Per-transaction deadline for reading the request and writing the
/// response.
const REQUEST_DEADLINE: Duration = Duration::from_secs(30);

pub struct ApiState {
	pub db: Arc<Database>,
	pub config: WrkqConfig,
	pub resolver: Resolver,
	pub sink: Arc<dyn webhooks::WebhookSink>,
}

type Shared = Arc<ApiState>;

struct ApiError(Error);

impl From<Error> for ApiError {
	fn from(e: Error) -> Self {
		ApiError(e)
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let status = match &self.0 {
			Error::NotFound { .. } => StatusCode::NOT_FOUND,
			Error::EtagMismatch { .. } | Error::Conflict(_) => StatusCode::CONFLICT,
			Error::Validation(_)
			| Error::Precondition(_)
			| Error::WrongKind { .. }
			| Error::Json(_) => StatusCode::BAD_REQUEST,
			_ => StatusCode::INTERNAL_SERVER_ERROR,
		};
		let body = json!({ "error": self.0.kind_str(), "message": self.0.to_string() });
		(status, Json(body)).into_response()
	}
}

type ApiResult<T> = std::result::Result<T, ApiError>;

pub fn router(state: Shared) -> Router {
	Router::new()
		.route("/v1/health", get(health))
		.route("/v1/tree", get(tree))
		.route("/v1/tasks", get(task_list).post(task_create))
		.route("/v1/tasks/{reference}", get(task_get).patch(task_update))
		.route("/v1/tasks/{reference}/archive", post(task_archive))
		.route("/v1/tasks/{reference}/restore", post(task_restore))
		.route(
			"/v1/tasks/{reference}/comments",
			get(comment_list).post(comment_create),
		)
		.route(
			"/v1/tasks/{reference}/relations",
			get(relation_list).post(relation_create).delete(relation_delete),
		)
		.route("/v1/actors", get(actor_list).post(actor_create))
		.route("/v1/actors/{reference}", axum::routing::patch(actor_update))
		.route("/v1/events", get(event_tail))
		.route("/v1/snapshot", get(snapshot_export))
		.route("/v1/bundles", post(bundle_create))
		.route("/v1/bundles/apply", post(bundle_apply))
		.layer(middleware::from_fn_with_state(state.clone(), auth))
		.layer(middleware::from_fn(deadline))
		.with_state(state)
}

/// Serves on a TCP address or, with a `unix:` prefix, a filesystem socket.
pub async fn serve(state: Shared) -> Result<()> {
	let bind = state.config.bind.clone();
	let app = router(state);
	if let Some(path) = bind.strip_prefix("unix:") {
		let _ = std::fs::remove_file(path);
		let listener = tokio::net::UnixListener::bind(path)?;
		info!("daemon listening on unix socket {path}");
		axum::serve(listener, app)
			.await
			.map_err(|e| Error::Io(std::io::Error::other(e)))?;
	} else {
		let listener = tokio::net::TcpListener::bind(&bind).await?;
		info!("daemon listening on {bind}");
		axum::serve(listener, app)
			.await
			.map_err(|e| Error::Io(std::io::Error::other(e)))?;
	}
	Ok(())
}

async fn deadline(req: Request, next: Next) -> Response {
	match tokio::time::timeout(REQUEST_DEADLINE, next.run(req)).await {
		Ok(resp) => resp,
		Err(_) => (
			StatusCode::REQUEST_TIMEOUT,
			Json(json!({ "error": "io", "message": "request deadline exceeded" })),
		)
			.into_response(),
	}
}

async fn auth(State(state): State<Shared>, req: Request, next: Next) -> Response {
	let Some(expected) = state.config.token.as_deref() else {
		return next.run(req).await;
	};
	let provided = req
		.headers()
		.get("authorization")
		.and_then(|v| v.to_str().ok())
		.and_then(|v| v.strip_prefix("Bearer "));
	let ok = provided.is_some_and(|p| {
		ring::constant_time::verify_slices_are_equal(p.as_bytes(), expected.as_bytes()).is_ok()
	});
	if !ok {
		return (
			StatusCode::UNAUTHORIZED,
			Json(json!({ "error": "auth", "message": "invalid bearer token" })),
		)
			.into_response();
	}
	next.run(req).await
}

/// Resolves the acting principal once per request.
async fn acting(state: &ApiState, headers: &HeaderMap) -> Result<Uuid> {
	let slug = headers
		.get("x-wrkq-actor")
		.and_then(|v| v.to_str().ok())
		.unwrap_or(&state.config.actor);
	Ok(state
		.resolver
		.resolve_actor(state.db.conn(), slug)
		.await?
		.uuid)
}

fn if_match(headers: &HeaderMap) -> i64 {
	headers
		.get("if-match")
		.and_then(|v| v.to_str().ok())
		.and_then(|v| v.trim().parse().ok())
		.unwrap_or(0)
}

/// Post-commit webhook trigger: hand the latest event for the resource to
/// the sink.
async fn dispatch_latest(state: &ApiState, resource_uuid: Uuid) -> Result<()> {
	if let Some(ev) = watch::latest_for(state.db.conn(), resource_uuid).await? {
		webhooks::dispatch(state.db.conn(), state.sink.as_ref(), &ev).await?;
	}
	Ok(())
}

// -- handlers ---------------------------------------------------------------

async fn health(State(state): State<Shared>) -> ApiResult<Json<doctor::DoctorReport>> {
	let report = doctor::run(&state.db, &state.config.db_path, &state.config.attach_dir).await?;
	Ok(Json(report))
}

#[derive(Deserialize)]
struct TreeParams {
	path: Option<String>,
	depth: Option<u32>,
	#[serde(default)]
	include_archived: bool,
}

async fn tree(
	State(state): State<Shared>,
	Query(params): Query<TreeParams>,
) -> ApiResult<Json<serde_json::Value>> {
	let prefix = match &params.path {
		Some(p) => Some(state.resolver.apply_project_root(p, false)?),
		None => None,
	};
	let nodes = containers::tree(
		state.db.conn(),
		prefix.as_deref(),
		params.depth,
		params.include_archived,
	)
	.await?;
	let body: Vec<_> = nodes
		.into_iter()
		.map(|n| json!({ "path": n.path, "container": n.container }))
		.collect();
	Ok(Json(json!(body)))
}

#[derive(Deserialize)]
struct TaskListParams {
	path: Option<String>,
	r#type: Option<String>,
	slug: Option<String>,
	state: Option<String>,
	kind: Option<String>,
	assignee: Option<String>,
	parent: Option<String>,
	due_before: Option<String>,
	due_after: Option<String>,
	sort: Option<String>,
	#[serde(default)]
	limit: u64,
	cursor: Option<String>,
}

async fn task_list(
	State(state): State<Shared>,
	Query(p): Query<TaskListParams>,
) -> ApiResult<Json<find::FindPage>> {
	let conn = state.db.conn();
	let mut query = find::FindQuery {
		limit: p.limit,
		cursor: p.cursor,
		slug_glob: p.slug,
		state: p.state,
		kind: p.kind,
		..Default::default()
	};
	if let Some(path) = &p.path {
		for part in path.split(',').filter(|s| !s.is_empty()) {
			query.paths.push(state.resolver.apply_project_root(part, false)?);
		}
	}
	query.target = match p.r#type.as_deref() {
		None | Some("tasks") => find::FindTarget::Tasks,
		Some("containers") => find::FindTarget::Containers,
		Some("both") => find::FindTarget::Both,
		Some(other) => {
			return Err(Error::Validation(format!("invalid type filter {other:?}")).into())
		}
	};
	if let Some(a) = &p.assignee {
		query.assignee = Some(state.resolver.resolve_actor(conn, a).await?.uuid);
	}
	if let Some(t) = &p.parent {
		query.parent_task = Some(state.resolver.resolve_task(conn, t).await?.uuid);
	}
	if let Some(s) = &p.due_before {
		query.due_before = Some(crate::operations::parse_ts("due_before", s)?);
	}
	if let Some(s) = &p.due_after {
		query.due_after = Some(crate::operations::parse_ts("due_after", s)?);
	}
	query.sort = match p.sort.as_deref() {
		None | Some("updated_at") => find::SortKey::UpdatedAt,
		Some("created_at") => find::SortKey::CreatedAt,
		Some("due_at") => find::SortKey::DueAt,
		Some("priority") => find::SortKey::Priority,
		Some(other) => {
			return Err(Error::Validation(format!("invalid sort key {other:?}")).into())
		}
	};
	Ok(Json(find::find(conn, &query).await?))
}

#[derive(Deserialize)]
struct TaskCreateBody {
	container: String,
	title: String,
	slug: Option<String>,
	#[serde(default)]
	description: String,
	state: Option<String>,
	priority: Option<i64>,
	kind: Option<String>,
	parent_task: Option<String>,
	assignee: Option<String>,
	start_at: Option<String>,
	due_at: Option<String>,
	#[serde(default)]
	labels: Vec<String>,
	meta: Option<serde_json::Value>,
}

async fn task_create(
	State(state): State<Shared>,
	headers: HeaderMap,
	Json(body): Json<TaskCreateBody>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
	let conn = state.db.conn();
	let actor = acting(&state, &headers).await?;
	let (container, _) = state.resolver.resolve_container(conn, &body.container).await?;

	let mut params = tasks::TaskCreate::new(container.uuid, body.title);
	params.slug = body.slug;
	params.description = body.description;
	if let Some(s) = &body.state {
		params.state = parse_state(s)?;
	}
	if let Some(p) = body.priority {
		params.priority = p;
	}
	if let Some(k) = &body.kind {
		params.kind = parse_task_kind(k)?;
	}
	if let Some(t) = &body.parent_task {
		params.parent_task = Some(state.resolver.resolve_task(conn, t).await?.uuid);
	}
	if let Some(a) = &body.assignee {
		params.assignee = Some(state.resolver.resolve_actor(conn, a).await?.uuid);
	}
	if let Some(s) = &body.start_at {
		params.start_at = Some(crate::operations::parse_ts("start_at", s)?);
	}
	if let Some(s) = &body.due_at {
		params.due_at = Some(crate::operations::parse_ts("due_at", s)?);
	}
	params.labels = body.labels;
	if let Some(m) = body.meta {
		params.meta = m;
	}

	let row = tasks::create(conn, actor, params).await?;
	dispatch_latest(&state, row.uuid).await?;
	let path = paths::task_path(conn, row.uuid).await?;
	Ok((StatusCode::CREATED, Json(json!({ "path": path, "task": row }))))
}

async fn task_get(
	State(state): State<Shared>,
	UrlPath(reference): UrlPath<String>,
) -> ApiResult<Json<serde_json::Value>> {
	let conn = state.db.conn();
	let row = state.resolver.resolve_task(conn, &reference).await?;
	let path = paths::task_path(conn, row.uuid).await?;
	let assignee = match row.assignee_actor_uuid {
		Some(u) => Some(actors::get(conn, u).await?.slug),
		None => None,
	};
	let blocked_by: Vec<String> = relations::blocked_by(conn, row.uuid)
		.await?
		.into_iter()
		.map(|t| t.friendly_id)
		.collect();
	Ok(Json(json!({
		"path": path,
		"task": row,
		"assignee": assignee,
		"blocked_by": blocked_by,
	})))
}

async fn task_update(
	State(state): State<Shared>,
	UrlPath(reference): UrlPath<String>,
	headers: HeaderMap,
	Json(fields): Json<serde_json::Map<String, serde_json::Value>>,
) -> ApiResult<Json<serde_json::Value>> {
	let conn = state.db.conn();
	let actor = acting(&state, &headers).await?;
	let row = state.resolver.resolve_task(conn, &reference).await?;
	let row = tasks::update_fields(conn, actor, row.uuid, &fields, if_match(&headers)).await?;
	dispatch_latest(&state, row.uuid).await?;
	Ok(Json(json!({ "task": row })))
}

async fn task_archive(
	State(state): State<Shared>,
	UrlPath(reference): UrlPath<String>,
	headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
	let conn = state.db.conn();
	let actor = acting(&state, &headers).await?;
	let row = state.resolver.resolve_task(conn, &reference).await?;
	let row = tasks::archive(conn, actor, row.uuid, if_match(&headers)).await?;
	dispatch_latest(&state, row.uuid).await?;
	Ok(Json(json!({ "task": row })))
}

#[derive(Deserialize, Default)]
struct RestoreBody {
	state: Option<String>,
	container: Option<String>,
}

async fn task_restore(
	State(state): State<Shared>,
	UrlPath(reference): UrlPath<String>,
	headers: HeaderMap,
	body: Option<Json<RestoreBody>>,
) -> ApiResult<Json<serde_json::Value>> {
	let conn = state.db.conn();
	let actor = acting(&state, &headers).await?;
	let row = state.resolver.resolve_task(conn, &reference).await?;
	let body = body.map(|Json(b)| b).unwrap_or_default();
	let mut opts = tasks::RestoreOptions {
		if_match: if_match(&headers),
		..Default::default()
	};
	if let Some(s) = &body.state {
		opts.target_state = Some(parse_state(s)?);
	}
	if let Some(c) = &body.container {
		opts.new_container = Some(state.resolver.resolve_container(conn, c).await?.0.uuid);
	}
	let (row, report) = tasks::restore(conn, actor, row.uuid, opts).await?;
	dispatch_latest(&state, row.uuid).await?;
	Ok(Json(json!({
		"task": row,
		"restored": report.restored,
		"failed": report.failed,
	})))
}

async fn comment_list(
	State(state): State<Shared>,
	UrlPath(reference): UrlPath<String>,
) -> ApiResult<Json<serde_json::Value>> {
	let conn = state.db.conn();
	let row = state.resolver.resolve_task(conn, &reference).await?;
	let list = comments::list(conn, row.uuid, false).await?;
	Ok(Json(json!({ "comments": list })))
}

#[derive(Deserialize)]
struct CommentBody {
	body: String,
	meta: Option<serde_json::Value>,
}

async fn comment_create(
	State(state): State<Shared>,
	UrlPath(reference): UrlPath<String>,
	headers: HeaderMap,
	Json(body): Json<CommentBody>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
	let conn = state.db.conn();
	let actor = acting(&state, &headers).await?;
	let row = state.resolver.resolve_task(conn, &reference).await?;
	let comment = comments::create(conn, actor, row.uuid, &body.body, body.meta).await?;
	Ok((StatusCode::CREATED, Json(json!({ "comment": comment }))))
}

async fn relation_list(
	State(state): State<Shared>,
	UrlPath(reference): UrlPath<String>,
) -> ApiResult<Json<serde_json::Value>> {
	let conn = state.db.conn();
	let row = state.resolver.resolve_task(conn, &reference).await?;
	let list = relations::list(conn, row.uuid).await?;
	Ok(Json(json!({ "relations": list })))
}

#[derive(Deserialize)]
struct RelationBody {
	to: String,
	kind: String,
}

async fn relation_create(
	State(state): State<Shared>,
	UrlPath(reference): UrlPath<String>,
	headers: HeaderMap,
	Json(body): Json<RelationBody>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
	let conn = state.db.conn();
	let actor = acting(&state, &headers).await?;
	let from = state.resolver.resolve_task(conn, &reference).await?;
	let to = state.resolver.resolve_task(conn, &body.to).await?;
	let kind = parse_relation_kind(&body.kind)?;
	let row = relations::create(conn, actor, from.uuid, to.uuid, kind).await?;
	Ok((StatusCode::CREATED, Json(json!({ "relation": row }))))
}

async fn relation_delete(
	State(state): State<Shared>,
	UrlPath(reference): UrlPath<String>,
	headers: HeaderMap,
	Json(body): Json<RelationBody>,
) -> ApiResult<StatusCode> {
	let conn = state.db.conn();
	let actor = acting(&state, &headers).await?;
	let from = state.resolver.resolve_task(conn, &reference).await?;
	let to = state.resolver.resolve_task(conn, &body.to).await?;
	let kind = parse_relation_kind(&body.kind)?;
	relations::delete(conn, actor, from.uuid, to.uuid, kind).await?;
	Ok(StatusCode::NO_CONTENT)
}

async fn actor_list(State(state): State<Shared>) -> ApiResult<Json<serde_json::Value>> {
	let list = actors::list(state.db.conn()).await?;
	Ok(Json(json!({ "actors": list })))
}

#[derive(Deserialize)]
struct ActorCreateBody {
	slug: String,
	display_name: String,
	role: String,
}

async fn actor_create(
	State(state): State<Shared>,
	headers: HeaderMap,
	Json(body): Json<ActorCreateBody>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
	let conn = state.db.conn();
	let acting_uuid = acting(&state, &headers).await?;
	let row = actors::create(
		conn,
		Some(acting_uuid),
		actors::ActorCreate {
			slug: body.slug,
			display_name: body.display_name,
			role: parse_role(&body.role)?,
		},
	)
	.await?;
	Ok((StatusCode::CREATED, Json(json!({ "actor": row }))))
}

async fn actor_update(
	State(state): State<Shared>,
	UrlPath(reference): UrlPath<String>,
	headers: HeaderMap,
	Json(fields): Json<serde_json::Map<String, serde_json::Value>>,
) -> ApiResult<Json<serde_json::Value>> {
	let conn = state.db.conn();
	let acting_uuid = acting(&state, &headers).await?;
	let row = state.resolver.resolve_actor(conn, &reference).await?;
	let row = actors::update_fields(conn, acting_uuid, row.uuid, &fields, if_match(&headers)).await?;
	Ok(Json(json!({ "actor": row })))
}

#[derive(Deserialize)]
struct EventParams {
	#[serde(default)]
	after: i32,
	limit: Option<u64>,
}

async fn event_tail(
	State(state): State<Shared>,
	Query(p): Query<EventParams>,
) -> ApiResult<Json<serde_json::Value>> {
	let events = watch::events_after(state.db.conn(), p.after, p.limit.unwrap_or(500)).await?;
	Ok(Json(json!({ "events": events })))
}

#[derive(Deserialize)]
struct SnapshotParams {
	#[serde(default)]
	events: bool,
}

async fn snapshot_export(
	State(state): State<Shared>,
	Query(p): Query<SnapshotParams>,
) -> ApiResult<String> {
	Ok(snapshot::export(state.db.conn(), p.events).await?)
}

#[derive(Deserialize)]
struct BundleCreateBody {
	project: String,
	dir: String,
	#[serde(default)]
	with_attachments: bool,
	#[serde(default)]
	with_events: bool,
}

async fn bundle_create(
	State(state): State<Shared>,
	Json(body): Json<BundleCreateBody>,
) -> ApiResult<Json<serde_json::Value>> {
	let conn = state.db.conn();
	let (project, _) = state.resolver.resolve_container(conn, &body.project).await?;
	let manifest = bundle::create(
		conn,
		project.uuid,
		std::path::Path::new(&body.dir),
		&state.config.attach_dir,
		bundle::BundleCreateOptions {
			with_attachments: body.with_attachments,
			with_events: body.with_events,
		},
	)
	.await?;
	Ok(Json(json!({ "manifest": manifest })))
}

#[derive(Deserialize)]
struct BundleApplyBody {
	dir: String,
	#[serde(default)]
	continue_on_error: bool,
	dest_root: Option<String>,
}

async fn bundle_apply(
	State(state): State<Shared>,
	headers: HeaderMap,
	Json(body): Json<BundleApplyBody>,
) -> ApiResult<Json<serde_json::Value>> {
	let conn = state.db.conn();
	let actor = acting(&state, &headers).await?;
	let report = bundle::apply(
		conn,
		actor,
		std::path::Path::new(&body.dir),
		&state.config.attach_dir,
		bundle::BundleApplyOptions {
			continue_on_error: body.continue_on_error,
			dest_root: body.dest_root,
		},
	)
	.await?;
	Ok(Json(json!({ "report": report })))
}
