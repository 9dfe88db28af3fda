//! Task store operations.
//!
//! The etag discipline lives here: every mutation re-reads the row inside
//! its transaction, checks the caller's precondition, bumps the etag by
//! exactly one, and appends its event before commit.

use crate::domain::fields::{
	parse_state, validate_priority, validate_restore_target, validate_transition, TaskKind,
	TaskState,
};
use crate::domain::ident::{normalize_slug, IdKind};
use crate::infrastructure::database::entities::{
	attachment, task, Attachment, Container, Task,
};
use crate::infrastructure::database::entities::container;
use crate::infrastructure::database::next_friendly_id;
use crate::infrastructure::events::{log_event, EventKind, NewEvent};
use crate::operations::{as_str, check_etag, parse_ts};
use crate::shared::{Error, ResourceKind, Result};
use chrono::{DateTime, Utc};
use sea_orm::{
	ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
	EntityTrait, QueryFilter, TransactionTrait,
};
use std::path::Path;
use tracing::warn;
use uuid::Uuid;

pub struct TaskCreate {
	/// Owning project container.
	pub container: Uuid,
	pub title: String,
	/// Derived from the title when absent.
	pub slug: Option<String>,
	pub description: String,
	pub state: TaskState,
	pub priority: i64,
	pub kind: TaskKind,
	pub parent_task: Option<Uuid>,
	pub assignee: Option<Uuid>,
	pub start_at: Option<DateTime<Utc>>,
	pub due_at: Option<DateTime<Utc>>,
	pub labels: Vec<String>,
	pub meta: serde_json::Value,
}

impl TaskCreate {
	pub fn new(container: Uuid, title: impl Into<String>) -> Self {
		Self {
			container,
			title: title.into(),
			slug: None,
			description: String::new(),
			state: TaskState::Open,
			priority: 2,
			kind: TaskKind::Task,
			parent_task: None,
			assignee: None,
			start_at: None,
			due_at: None,
			labels: Vec::new(),
			meta: serde_json::json!({}),
		}
	}
}

pub async fn create(
	conn: &DatabaseConnection,
	actor: Uuid,
	params: TaskCreate,
) -> Result<task::Model> {
	let slug = normalize_slug(params.slug.as_deref().unwrap_or(&params.title))?;
	let priority = validate_priority(params.priority)?;
	if matches!(params.state, TaskState::Archived | TaskState::Deleted) {
		return Err(Error::Validation(format!(
			"cannot create a task in state {}",
			params.state
		)));
	}
	if params.title.trim().is_empty() {
		return Err(Error::Validation("title must not be blank".into()));
	}

	let txn = conn.begin().await?;
	if Container::find()
		.filter(container::Column::Uuid.eq(params.container))
		.one(&txn)
		.await?
		.is_none()
	{
		return Err(Error::not_found(
			ResourceKind::Container,
			params.container.to_string(),
		));
	}
	if let Some(parent) = params.parent_task {
		let parent_row = Task::find()
			.filter(task::Column::Uuid.eq(parent))
			.one(&txn)
			.await?
			.ok_or_else(|| Error::not_found(ResourceKind::Task, parent.to_string()))?;
		if parent_row.project_uuid != params.container {
			return Err(Error::Validation(
				"parent task belongs to a different container".into(),
			));
		}
	}
	ensure_task_slug_free(&txn, params.container, &slug, None).await?;

	let friendly = next_friendly_id(&txn, IdKind::Task).await?;
	let now = Utc::now();
	let completed_at = matches!(params.state, TaskState::Completed).then_some(now);
	let row = task::ActiveModel {
		uuid: Set(Uuid::new_v4()),
		friendly_id: Set(friendly),
		slug: Set(slug.clone()),
		title: Set(params.title),
		description: Set(params.description),
		state: Set(params.state.to_string()),
		priority: Set(priority),
		kind: Set(params.kind.to_string()),
		project_uuid: Set(params.container),
		parent_task_uuid: Set(params.parent_task),
		assignee_actor_uuid: Set(params.assignee),
		start_at: Set(params.start_at),
		due_at: Set(params.due_at),
		labels: Set(serde_json::json!(params.labels)),
		meta: Set(params.meta),
		etag: Set(1),
		created_by_actor_uuid: Set(actor),
		created_at: Set(now),
		updated_at: Set(now),
		completed_at: Set(completed_at),
		..Default::default()
	}
	.insert(&txn)
	.await?;

	log_event(
		&txn,
		NewEvent {
			actor_uuid: Some(actor),
			resource: ResourceKind::Task,
			resource_uuid: row.uuid,
			kind: EventKind::Created,
			etag: Some(1),
			payload: Some(serde_json::json!({
				"slug": slug,
				"title": row.title,
				"state": row.state,
				"priority": row.priority,
				"kind": row.kind,
				"project_uuid": row.project_uuid,
			})),
		},
	)
	.await?;

	txn.commit().await?;
	Ok(row)
}

/// Recognized fields: `title`, `state`, `priority`, `description`, `labels`,
/// `due_at`, `start_at`, `assignee_actor_uuid`. Anything else is a
/// validation error; archived/deleted rows must be restored first.
pub async fn update_fields(
	conn: &DatabaseConnection,
	actor: Uuid,
	uuid: Uuid,
	fields: &serde_json::Map<String, serde_json::Value>,
	if_match: i64,
) -> Result<task::Model> {
	if fields.is_empty() {
		return Err(Error::Validation("no fields to update".into()));
	}
	let txn = conn.begin().await?;
	let row = fetch(&txn, uuid).await?;
	check_etag(&row.friendly_id, row.etag, if_match)?;
	let current_state = parse_state(&row.state)?;
	if matches!(current_state, TaskState::Archived | TaskState::Deleted) {
		return Err(Error::Precondition(format!(
			"task {} is {current_state}; restore it before updating",
			row.friendly_id
		)));
	}

	let new_etag = row.etag + 1;
	let mut active: task::ActiveModel = row.into();
	let mut changed = serde_json::Map::new();
	for (key, value) in fields {
		match key.as_str() {
			"title" => {
				let title = as_str(key, value)?;
				if title.trim().is_empty() {
					return Err(Error::Validation("title must not be blank".into()));
				}
				active.title = Set(title.to_owned());
				changed.insert(key.clone(), value.clone());
			}
			"state" => {
				let next = parse_state(as_str(key, value)?)?;
				validate_transition(current_state, next)?;
				let now = Utc::now();
				active.completed_at = Set(matches!(next, TaskState::Completed).then_some(now));
				active.state = Set(next.to_string());
				changed.insert(key.clone(), value.clone());
			}
			"priority" => {
				let p = value
					.as_i64()
					.ok_or_else(|| Error::Validation("priority must be an integer".into()))?;
				active.priority = Set(validate_priority(p)?);
				changed.insert(key.clone(), value.clone());
			}
			"description" => {
				active.description = Set(as_str(key, value)?.to_owned());
				changed.insert(key.clone(), value.clone());
			}
			"labels" => {
				let labels: Vec<String> = value
					.as_array()
					.ok_or_else(|| Error::Validation("labels must be an array".into()))?
					.iter()
					.map(|v| {
						v.as_str()
							.map(str::to_owned)
							.ok_or_else(|| Error::Validation("labels must be strings".into()))
					})
					.collect::<Result<_>>()?;
				active.labels = Set(serde_json::json!(labels));
				changed.insert(key.clone(), serde_json::json!(labels));
			}
			"due_at" => {
				active.due_at = Set(opt_ts(key, value)?);
				changed.insert(key.clone(), value.clone());
			}
			"start_at" => {
				active.start_at = Set(opt_ts(key, value)?);
				changed.insert(key.clone(), value.clone());
			}
			"assignee_actor_uuid" => {
				let assignee = match value {
					serde_json::Value::Null => None,
					serde_json::Value::String(s) => {
						let u = Uuid::parse_str(s).map_err(|_| {
							Error::Validation(format!("invalid assignee uuid: {s:?}"))
						})?;
						crate::operations::actors::get(conn, u).await?;
						Some(u)
					}
					_ => {
						return Err(Error::Validation(
							"assignee_actor_uuid must be a uuid string or null".into(),
						))
					}
				};
				active.assignee_actor_uuid = Set(assignee);
				changed.insert(key.clone(), value.clone());
			}
			other => {
				return Err(Error::Validation(format!(
					"unrecognized task field: {other}"
				)))
			}
		}
	}
	active.etag = Set(new_etag);
	active.updated_at = Set(Utc::now());
	active.updated_by_actor_uuid = Set(Some(actor));
	let row = active.update(&txn).await?;

	log_event(
		&txn,
		NewEvent {
			actor_uuid: Some(actor),
			resource: ResourceKind::Task,
			resource_uuid: row.uuid,
			kind: EventKind::Updated,
			etag: Some(new_etag),
			payload: Some(serde_json::Value::Object(changed)),
		},
	)
	.await?;

	txn.commit().await?;
	Ok(row)
}

/// Soft delete into the archive.
pub async fn archive(
	conn: &DatabaseConnection,
	actor: Uuid,
	uuid: Uuid,
	if_match: i64,
) -> Result<task::Model> {
	lifecycle_mark(conn, actor, uuid, if_match, TaskState::Archived).await
}

/// Soft delete into the trash.
pub async fn soft_delete(
	conn: &DatabaseConnection,
	actor: Uuid,
	uuid: Uuid,
	if_match: i64,
) -> Result<task::Model> {
	lifecycle_mark(conn, actor, uuid, if_match, TaskState::Deleted).await
}

async fn lifecycle_mark(
	conn: &DatabaseConnection,
	actor: Uuid,
	uuid: Uuid,
	if_match: i64,
	target: TaskState,
) -> Result<task::Model> {
	let txn = conn.begin().await?;
	let row = fetch(&txn, uuid).await?;
	check_etag(&row.friendly_id, row.etag, if_match)?;
	let current = parse_state(&row.state)?;
	if matches!(current, TaskState::Archived | TaskState::Deleted) {
		return Err(Error::Precondition(format!(
			"task {} is already {current}",
			row.friendly_id
		)));
	}

	let now = Utc::now();
	let new_etag = row.etag + 1;
	let row_uuid = row.uuid;
	let mut active: task::ActiveModel = row.into();
	active.state = Set(target.to_string());
	match target {
		TaskState::Archived => active.archived_at = Set(Some(now)),
		TaskState::Deleted => active.deleted_at = Set(Some(now)),
		_ => unreachable!("lifecycle_mark only targets archived/deleted"),
	}
	active.etag = Set(new_etag);
	active.updated_at = Set(now);
	active.updated_by_actor_uuid = Set(Some(actor));
	let row = active.update(&txn).await?;

	let kind = if target == TaskState::Archived {
		EventKind::Archived
	} else {
		EventKind::SoftDeleted
	};
	log_event(
		&txn,
		NewEvent {
			actor_uuid: Some(actor),
			resource: ResourceKind::Task,
			resource_uuid: row_uuid,
			kind,
			etag: Some(new_etag),
			payload: None,
		},
	)
	.await?;

	txn.commit().await?;
	Ok(row)
}

#[derive(Debug, Default, serde::Serialize)]
pub struct RestoreReport {
	/// Friendly IDs restored, the subject first.
	pub restored: Vec<String>,
	/// Descendants that could not be restored, with the reason.
	pub failed: Vec<(String, String)>,
}

pub struct RestoreOptions {
	/// Defaults to `open`; archived/deleted are refused.
	pub target_state: Option<TaskState>,
	/// Move the task into a different container while restoring.
	pub new_container: Option<Uuid>,
	pub if_match: i64,
}

impl Default for RestoreOptions {
	fn default() -> Self {
		Self {
			target_state: None,
			new_container: None,
			if_match: 0,
		}
	}
}

/// Restores an archived/deleted task, then cascades to archived/deleted
/// descendants. The subject commits in its own transaction; each descendant
/// gets one too, and failures are aggregated instead of aborting the walk.
pub async fn restore(
	conn: &DatabaseConnection,
	actor: Uuid,
	uuid: Uuid,
	opts: RestoreOptions,
) -> Result<(task::Model, RestoreReport)> {
	let target = opts.target_state.unwrap_or(TaskState::Open);
	validate_restore_target(target)?;

	let row = restore_one(conn, actor, uuid, target, opts.new_container, opts.if_match).await?;
	let mut report = RestoreReport::default();
	report.restored.push(row.friendly_id.clone());

	// Cascade: descendants restore into the same live state.
	let mut frontier = vec![uuid];
	while let Some(parent) = frontier.pop() {
		let children = Task::find()
			.filter(task::Column::ParentTaskUuid.eq(parent))
			.all(conn)
			.await?;
		for child in children {
			frontier.push(child.uuid);
			let child_state = parse_state(&child.state)?;
			if !matches!(child_state, TaskState::Archived | TaskState::Deleted) {
				continue;
			}
			match restore_one(conn, actor, child.uuid, target, None, 0).await {
				Ok(restored) => report.restored.push(restored.friendly_id),
				Err(e) => report.failed.push((child.friendly_id, e.to_string())),
			}
		}
	}

	Ok((row, report))
}

async fn restore_one(
	conn: &DatabaseConnection,
	actor: Uuid,
	uuid: Uuid,
	target: TaskState,
	new_container: Option<Uuid>,
	if_match: i64,
) -> Result<task::Model> {
	let txn = conn.begin().await?;
	let row = fetch(&txn, uuid).await?;
	check_etag(&row.friendly_id, row.etag, if_match)?;
	let current = parse_state(&row.state)?;
	if !matches!(current, TaskState::Archived | TaskState::Deleted) {
		return Err(Error::Precondition(format!(
			"task {} is {current}, not archived or deleted",
			row.friendly_id
		)));
	}

	if let Some(dest) = new_container {
		if Container::find()
			.filter(container::Column::Uuid.eq(dest))
			.one(&txn)
			.await?
			.is_none()
		{
			return Err(Error::not_found(ResourceKind::Container, dest.to_string()));
		}
		ensure_task_slug_free(&txn, dest, &row.slug, Some(row.uuid)).await?;
	}

	let now = Utc::now();
	let new_etag = row.etag + 1;
	let row_uuid = row.uuid;
	let mut active: task::ActiveModel = row.into();
	active.state = Set(target.to_string());
	active.archived_at = Set(None);
	active.deleted_at = Set(None);
	active.completed_at = Set(matches!(target, TaskState::Completed).then_some(now));
	if let Some(dest) = new_container {
		active.project_uuid = Set(dest);
	}
	active.etag = Set(new_etag);
	active.updated_at = Set(now);
	active.updated_by_actor_uuid = Set(Some(actor));
	let row = active.update(&txn).await?;

	log_event(
		&txn,
		NewEvent {
			actor_uuid: Some(actor),
			resource: ResourceKind::Task,
			resource_uuid: row_uuid,
			kind: EventKind::Restored,
			etag: Some(new_etag),
			payload: Some(serde_json::json!({ "state": target.to_string() })),
		},
	)
	.await?;

	txn.commit().await?;
	Ok(row)
}

/// Hard delete. Comments, relations and attachment rows cascade by foreign
/// key; the `task.purged` event is written before the row is deleted so
/// history persists. Attachment files are removed best-effort after commit.
pub async fn purge(
	conn: &DatabaseConnection,
	actor: Uuid,
	uuid: Uuid,
	attach_dir: &Path,
	if_match: i64,
) -> Result<()> {
	let txn = conn.begin().await?;
	let row = fetch(&txn, uuid).await?;
	check_etag(&row.friendly_id, row.etag, if_match)?;

	let files = Attachment::find()
		.filter(attachment::Column::TaskUuid.eq(uuid))
		.all(&txn)
		.await?;
	let rel_paths: Vec<String> = files.into_iter().map(|a| a.rel_path).collect();

	log_event(
		&txn,
		NewEvent {
			actor_uuid: Some(actor),
			resource: ResourceKind::Task,
			resource_uuid: uuid,
			kind: EventKind::Purged,
			etag: Some(row.etag),
			payload: Some(serde_json::json!({
				"friendly_id": row.friendly_id,
				"slug": row.slug,
				"title": row.title,
			})),
		},
	)
	.await?;

	Task::delete_many()
		.filter(task::Column::Uuid.eq(uuid))
		.exec(&txn)
		.await?;

	txn.commit().await?;

	let task_dir = attach_dir.join("tasks").join(uuid.to_string());
	for rel in rel_paths {
		let path = attach_dir.join(&rel);
		if let Err(e) = std::fs::remove_file(&path) {
			warn!("could not remove attachment file {:?}: {e}", path);
		}
	}
	let _ = std::fs::remove_dir(&task_dir);
	Ok(())
}

pub async fn get(conn: &DatabaseConnection, uuid: Uuid) -> Result<task::Model> {
	fetch(conn, uuid).await
}

pub(crate) async fn ensure_task_slug_free<C: ConnectionTrait>(
	conn: &C,
	container_uuid: Uuid,
	slug: &str,
	exclude: Option<Uuid>,
) -> Result<()> {
	let hit = Task::find()
		.filter(task::Column::ProjectUuid.eq(container_uuid))
		.filter(task::Column::Slug.eq(slug))
		.one(conn)
		.await?;
	if let Some(hit) = hit {
		if Some(hit.uuid) != exclude {
			return Err(Error::Conflict(format!(
				"task slug already used in this container: {slug}"
			)));
		}
	}
	Ok(())
}

async fn fetch<C: ConnectionTrait>(conn: &C, uuid: Uuid) -> Result<task::Model> {
	Task::find()
		.filter(task::Column::Uuid.eq(uuid))
		.one(conn)
		.await?
		.ok_or_else(|| Error::not_found(ResourceKind::Task, uuid.to_string()))
}

fn opt_ts(key: &str, value: &serde_json::Value) -> Result<Option<DateTime<Utc>>> {
	match value {
		serde_json::Value::Null => Ok(None),
		serde_json::Value::String(s) => Ok(Some(parse_ts(key, s)?)),
		_ => Err(Error::Validation(format!(
			"{key} must be an RFC 3339 timestamp or null"
		))),
	}
}
