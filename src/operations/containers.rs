//! Container store operations.
//!
//! Soft delete (archive) touches only the container row unless the caller
//! asks for a recursive cascade; hard delete (purge) is an explicit opt-in
//! that still commits as one transaction, with the foreign keys cascading
//! the rows and the attachment files removed best-effort after commit.

use crate::domain::fields::{parse_container_kind, ContainerKind, TaskState};
use crate::domain::ident::{normalize_slug, IdKind};
use crate::infrastructure::database::entities::{
	attachment, container, task, Attachment, Container, Task,
};
use crate::infrastructure::database::{next_friendly_id, paths};
use crate::infrastructure::events::{log_event, EventKind, NewEvent};
use crate::operations::{as_str, check_etag, webhooks};
use crate::shared::{Error, ResourceKind, Result};
use chrono::Utc;
use sea_orm::{
	ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
	DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use std::path::Path;
use tracing::warn;
use uuid::Uuid;

pub struct ContainerCreate {
	pub parent_uuid: Option<Uuid>,
	/// Slug; derived from the title when absent.
	pub slug: Option<String>,
	pub title: String,
	pub kind: ContainerKind,
	pub description: String,
	pub sort_index: i64,
	pub webhook_urls: Vec<String>,
}

pub async fn create(
	conn: &DatabaseConnection,
	actor: Uuid,
	params: ContainerCreate,
) -> Result<container::Model> {
	let txn = conn.begin().await?;
	let row = create_in(&txn, actor, params).await?;
	txn.commit().await?;
	Ok(row)
}

/// Creation body, run on the caller's transaction (the bundle engine shares
/// it across many ensures).
pub(crate) async fn create_in<C: ConnectionTrait>(
	txn: &C,
	actor: Uuid,
	params: ContainerCreate,
) -> Result<container::Model> {
	let slug = normalize_slug(params.slug.as_deref().unwrap_or(&params.title))?;
	webhooks::validate_webhook_urls(&params.webhook_urls)?;

	if let Some(parent) = params.parent_uuid {
		if Container::find()
			.filter(container::Column::Uuid.eq(parent))
			.one(txn)
			.await?
			.is_none()
		{
			return Err(Error::not_found(ResourceKind::Container, parent.to_string()));
		}
	}
	ensure_sibling_slug_free(txn, params.parent_uuid, &slug, None).await?;

	let friendly = next_friendly_id(txn, IdKind::Container).await?;
	let now = Utc::now();
	let row = container::ActiveModel {
		uuid: Set(Uuid::new_v4()),
		friendly_id: Set(friendly),
		slug: Set(slug.clone()),
		title: Set(params.title),
		description: Set(params.description),
		kind: Set(params.kind.to_string()),
		parent_uuid: Set(params.parent_uuid),
		sort_index: Set(params.sort_index),
		webhook_urls: Set(serde_json::json!(params.webhook_urls)),
		etag: Set(1),
		created_by_actor_uuid: Set(actor),
		created_at: Set(now),
		updated_at: Set(now),
		..Default::default()
	}
	.insert(txn)
	.await?;

	log_event(
		txn,
		NewEvent {
			actor_uuid: Some(actor),
			resource: ResourceKind::Container,
			resource_uuid: row.uuid,
			kind: EventKind::Created,
			etag: Some(1),
			payload: Some(serde_json::json!({
				"slug": slug,
				"title": row.title,
				"kind": row.kind,
				"parent_uuid": row.parent_uuid,
			})),
		},
	)
	.await?;

	Ok(row)
}

/// Recognized fields: `title`, `description`, `kind`, `webhook_urls`,
/// `sort_index`.
pub async fn update_fields(
	conn: &DatabaseConnection,
	actor: Uuid,
	uuid: Uuid,
	fields: &serde_json::Map<String, serde_json::Value>,
	if_match: i64,
) -> Result<container::Model> {
	if fields.is_empty() {
		return Err(Error::Validation("no fields to update".into()));
	}
	let txn = conn.begin().await?;
	let row = fetch(&txn, uuid).await?;
	check_etag(&row.friendly_id, row.etag, if_match)?;

	let new_etag = row.etag + 1;
	let mut active: container::ActiveModel = row.into();
	let mut changed = serde_json::Map::new();
	for (key, value) in fields {
		match key.as_str() {
			"title" => {
				let title = as_str(key, value)?;
				if title.trim().is_empty() {
					return Err(Error::Validation("title must not be blank".into()));
				}
				active.title = Set(title.to_owned());
			}
			"description" => {
				active.description = Set(as_str(key, value)?.to_owned());
			}
			"kind" => {
				active.kind = Set(parse_container_kind(as_str(key, value)?)?.to_string());
			}
			"webhook_urls" => {
				let urls: Vec<String> = value
					.as_array()
					.ok_or_else(|| Error::Validation("webhook_urls must be an array".into()))?
					.iter()
					.map(|v| {
						v.as_str()
							.map(str::to_owned)
							.ok_or_else(|| Error::Validation("webhook url must be a string".into()))
					})
					.collect::<Result<_>>()?;
				webhooks::validate_webhook_urls(&urls)?;
				active.webhook_urls = Set(serde_json::json!(urls));
			}
			"sort_index" => {
				let idx = value
					.as_i64()
					.ok_or_else(|| Error::Validation("sort_index must be an integer".into()))?;
				active.sort_index = Set(idx);
			}
			other => {
				return Err(Error::Validation(format!(
					"unrecognized container field: {other}"
				)))
			}
		}
		changed.insert(key.clone(), value.clone());
	}
	active.etag = Set(new_etag);
	active.updated_at = Set(Utc::now());
	active.updated_by_actor_uuid = Set(Some(actor));
	let row = active.update(&txn).await?;

	log_event(
		&txn,
		NewEvent {
			actor_uuid: Some(actor),
			resource: ResourceKind::Container,
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

/// Soft delete. Non-recursive by default; `recurse` archives descendant
/// containers and their live tasks inside the same transaction.
pub async fn archive(
	conn: &DatabaseConnection,
	actor: Uuid,
	uuid: Uuid,
	recurse: bool,
	if_match: i64,
) -> Result<container::Model> {
	let txn = conn.begin().await?;
	let row = fetch(&txn, uuid).await?;
	check_etag(&row.friendly_id, row.etag, if_match)?;
	if row.archived_at.is_some() {
		return Err(Error::Precondition(format!(
			"container {} is already archived",
			row.friendly_id
		)));
	}

	let mut targets = vec![row.clone()];
	if recurse {
		let descendants = collect_subtree(&txn, uuid).await?;
		for child in descendants {
			if child.uuid != uuid && child.archived_at.is_none() {
				targets.push(child);
			}
		}
	}

	let now = Utc::now();
	let mut archived_root = None;
	for target in targets {
		let new_etag = target.etag + 1;
		let target_uuid = target.uuid;
		let mut active: container::ActiveModel = target.into();
		active.archived_at = Set(Some(now));
		active.etag = Set(new_etag);
		active.updated_at = Set(now);
		active.updated_by_actor_uuid = Set(Some(actor));
		let updated = active.update(&txn).await?;
		log_event(
			&txn,
			NewEvent {
				actor_uuid: Some(actor),
				resource: ResourceKind::Container,
				resource_uuid: target_uuid,
				kind: EventKind::Archived,
				etag: Some(new_etag),
				payload: None,
			},
		)
		.await?;
		if recurse {
			archive_live_tasks(&txn, actor, target_uuid, now).await?;
		}
		if target_uuid == uuid {
			archived_root = Some(updated);
		}
	}

	txn.commit().await?;
	archived_root.ok_or_else(|| Error::Integrity("archive lost its subject row".into()))
}

async fn archive_live_tasks(
	txn: &DatabaseTransaction,
	actor: Uuid,
	container_uuid: Uuid,
	now: chrono::DateTime<Utc>,
) -> Result<()> {
	let live = Task::find()
		.filter(task::Column::ProjectUuid.eq(container_uuid))
		.filter(task::Column::ArchivedAt.is_null())
		.filter(task::Column::DeletedAt.is_null())
		.all(txn)
		.await?;
	for t in live {
		let new_etag = t.etag + 1;
		let t_uuid = t.uuid;
		let mut active: task::ActiveModel = t.into();
		active.state = Set(TaskState::Archived.to_string());
		active.archived_at = Set(Some(now));
		active.etag = Set(new_etag);
		active.updated_at = Set(now);
		active.updated_by_actor_uuid = Set(Some(actor));
		active.update(txn).await?;
		log_event(
			txn,
			NewEvent {
				actor_uuid: Some(actor),
				resource: ResourceKind::Task,
				resource_uuid: t_uuid,
				kind: EventKind::Archived,
				etag: Some(new_etag),
				payload: None,
			},
		)
		.await?;
	}
	Ok(())
}

/// Clears `archived_at` on the container itself. Descendants are restored
/// through task/container restores of their own.
pub async fn restore(
	conn: &DatabaseConnection,
	actor: Uuid,
	uuid: Uuid,
	if_match: i64,
) -> Result<container::Model> {
	let txn = conn.begin().await?;
	let row = fetch(&txn, uuid).await?;
	check_etag(&row.friendly_id, row.etag, if_match)?;
	if row.archived_at.is_none() {
		return Err(Error::Precondition(format!(
			"container {} is not archived",
			row.friendly_id
		)));
	}

	let new_etag = row.etag + 1;
	let row_uuid = row.uuid;
	let mut active: container::ActiveModel = row.into();
	active.archived_at = Set(None);
	active.etag = Set(new_etag);
	active.updated_at = Set(Utc::now());
	active.updated_by_actor_uuid = Set(Some(actor));
	let row = active.update(&txn).await?;

	log_event(
		&txn,
		NewEvent {
			actor_uuid: Some(actor),
			resource: ResourceKind::Container,
			resource_uuid: row_uuid,
			kind: EventKind::Restored,
			etag: Some(new_etag),
			payload: None,
		},
	)
	.await?;

	txn.commit().await?;
	Ok(row)
}

/// Hard delete of the container and everything under it, in one
/// transaction. The `container.purged` event is written before the row goes
/// so history survives; attachment files are removed best-effort afterward.
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

	let subtree = collect_subtree(&txn, uuid).await?;
	let container_uuids: Vec<Uuid> = subtree.iter().map(|c| c.uuid).collect();
	let mut rel_paths = Vec::new();
	for chunk in container_uuids.chunks(100) {
		let tasks = Task::find()
			.filter(task::Column::ProjectUuid.is_in(chunk.iter().copied()))
			.all(&txn)
			.await?;
		for t in &tasks {
			let files = Attachment::find()
				.filter(attachment::Column::TaskUuid.eq(t.uuid))
				.all(&txn)
				.await?;
			rel_paths.extend(files.into_iter().map(|a| a.rel_path));
		}
	}

	log_event(
		&txn,
		NewEvent {
			actor_uuid: Some(actor),
			resource: ResourceKind::Container,
			resource_uuid: uuid,
			kind: EventKind::Purged,
			etag: Some(row.etag),
			payload: Some(serde_json::json!({
				"friendly_id": row.friendly_id,
				"slug": row.slug,
				"containers": container_uuids.len(),
			})),
		},
	)
	.await?;

	// Child containers, tasks, comments, relations and attachment rows all
	// go via foreign-key cascade.
	Container::delete_many()
		.filter(container::Column::Uuid.eq(uuid))
		.exec(&txn)
		.await?;

	txn.commit().await?;

	for rel in rel_paths {
		let path = attach_dir.join(&rel);
		if let Err(e) = std::fs::remove_file(&path) {
			warn!("could not remove attachment file {:?}: {e}", path);
		}
	}
	Ok(())
}

pub async fn get(conn: &DatabaseConnection, uuid: Uuid) -> Result<container::Model> {
	fetch(conn, uuid).await
}

#[derive(Debug, Clone)]
pub struct TreeNode {
	pub path: String,
	pub container: container::Model,
}

/// Containers at or under `prefix`, ordered by path, with an optional depth
/// limit relative to the prefix.
pub async fn tree(
	conn: &DatabaseConnection,
	prefix: Option<&str>,
	depth: Option<u32>,
	include_archived: bool,
) -> Result<Vec<TreeNode>> {
	let rows = paths::container_paths_under(conn, prefix).await?;
	let base_depth = prefix.map(|p| p.split('/').count()).unwrap_or(0);
	let mut nodes = Vec::with_capacity(rows.len());
	for r in rows {
		let rel_depth = r.path.split('/').count() - base_depth;
		if let Some(d) = depth {
			if rel_depth > d as usize {
				continue;
			}
		}
		let model = fetch(conn, r.uuid).await?;
		if !include_archived && model.archived_at.is_some() {
			continue;
		}
		nodes.push(TreeNode {
			path: r.path,
			container: model,
		});
	}
	Ok(nodes)
}

pub async fn children(
	conn: &DatabaseConnection,
	parent: Option<Uuid>,
) -> Result<Vec<container::Model>> {
	let query = match parent {
		Some(p) => Container::find().filter(container::Column::ParentUuid.eq(p)),
		None => Container::find().filter(container::Column::ParentUuid.is_null()),
	};
	Ok(query
		.order_by_asc(container::Column::SortIndex)
		.order_by_asc(container::Column::FriendlyId)
		.all(conn)
		.await?)
}

/// The container plus all transitive children, breadth-first.
pub(crate) async fn collect_subtree<C: ConnectionTrait>(
	conn: &C,
	root: Uuid,
) -> Result<Vec<container::Model>> {
	let root_row = Container::find()
		.filter(container::Column::Uuid.eq(root))
		.one(conn)
		.await?
		.ok_or_else(|| Error::not_found(ResourceKind::Container, root.to_string()))?;
	let mut out = vec![root_row];
	let mut frontier = vec![root];
	while let Some(parent) = frontier.pop() {
		let kids = Container::find()
			.filter(container::Column::ParentUuid.eq(parent))
			.all(conn)
			.await?;
		for k in kids {
			frontier.push(k.uuid);
			out.push(k);
		}
	}
	Ok(out)
}

/// Slug-uniqueness precheck among siblings. `exclude` skips the row being
/// moved or renamed.
pub(crate) async fn ensure_sibling_slug_free<C: ConnectionTrait>(
	conn: &C,
	parent: Option<Uuid>,
	slug: &str,
	exclude: Option<Uuid>,
) -> Result<()> {
	let query = match parent {
		Some(p) => Container::find().filter(container::Column::ParentUuid.eq(p)),
		None => Container::find().filter(container::Column::ParentUuid.is_null()),
	};
	let hit = query
		.filter(container::Column::Slug.eq(slug))
		.one(conn)
		.await?;
	if let Some(hit) = hit {
		if Some(hit.uuid) != exclude {
			return Err(Error::Conflict(format!(
				"container slug already used by a sibling: {slug}"
			)));
		}
	}
	Ok(())
}

async fn fetch<C: ConnectionTrait>(conn: &C, uuid: Uuid) -> Result<container::Model> {
	Container::find()
		.filter(container::Column::Uuid.eq(uuid))
		.one(conn)
		.await?
		.ok_or_else(|| Error::not_found(ResourceKind::Container, uuid.to_string()))
}
