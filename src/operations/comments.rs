//! Comment store operations.
//!
//! Comments are append-only. An "edit" is a successor comment plus a soft
//! delete of the predecessor in one transaction; the original body is never
//! rewritten.

use crate::domain::ident::IdKind;
use crate::infrastructure::database::entities::{comment, task, Comment, Task};
use crate::infrastructure::database::next_friendly_id;
use crate::infrastructure::events::{log_event, EventKind, NewEvent};
use crate::operations::check_etag;
use crate::shared::{Error, ResourceKind, Result};
use chrono::Utc;
use sea_orm::{
	ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
	DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use uuid::Uuid;

pub async fn create(
	conn: &DatabaseConnection,
	actor: Uuid,
	task_uuid: Uuid,
	body: &str,
	meta: Option<serde_json::Value>,
) -> Result<comment::Model> {
	let txn = conn.begin().await?;
	let row = insert_comment(&txn, actor, task_uuid, body, meta).await?;
	txn.commit().await?;
	Ok(row)
}

async fn insert_comment(
	txn: &DatabaseTransaction,
	actor: Uuid,
	task_uuid: Uuid,
	body: &str,
	meta: Option<serde_json::Value>,
) -> Result<comment::Model> {
	if body.is_empty() {
		return Err(Error::Precondition("comment body must not be empty".into()));
	}
	if body.trim().is_empty() {
		return Err(Error::Validation(
			"comment body must not be only whitespace".into(),
		));
	}
	if Task::find()
		.filter(task::Column::Uuid.eq(task_uuid))
		.one(txn)
		.await?
		.is_none()
	{
		return Err(Error::not_found(ResourceKind::Task, task_uuid.to_string()));
	}

	let friendly = next_friendly_id(txn, IdKind::Comment).await?;
	let now = Utc::now();
	let row = comment::ActiveModel {
		uuid: Set(Uuid::new_v4()),
		friendly_id: Set(friendly),
		task_uuid: Set(task_uuid),
		actor_uuid: Set(actor),
		body: Set(body.to_owned()),
		meta: Set(meta),
		etag: Set(1),
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
			resource: ResourceKind::Comment,
			resource_uuid: row.uuid,
			kind: EventKind::Created,
			etag: Some(1),
			payload: Some(serde_json::json!({ "task_uuid": task_uuid })),
		},
	)
	.await?;
	Ok(row)
}

pub async fn list(
	conn: &DatabaseConnection,
	task_uuid: Uuid,
	include_deleted: bool,
) -> Result<Vec<comment::Model>> {
	let mut query = Comment::find().filter(comment::Column::TaskUuid.eq(task_uuid));
	if !include_deleted {
		query = query.filter(comment::Column::DeletedAt.is_null());
	}
	Ok(query
		.order_by_asc(comment::Column::FriendlyId)
		.all(conn)
		.await?)
}

pub async fn get(conn: &DatabaseConnection, uuid: Uuid) -> Result<comment::Model> {
	fetch(conn, uuid).await
}

pub async fn soft_delete(
	conn: &DatabaseConnection,
	actor: Uuid,
	uuid: Uuid,
	if_match: i64,
) -> Result<comment::Model> {
	let txn = conn.begin().await?;
	let row = soft_delete_in(&txn, actor, uuid, if_match).await?;
	txn.commit().await?;
	Ok(row)
}

async fn soft_delete_in(
	txn: &DatabaseTransaction,
	actor: Uuid,
	uuid: Uuid,
	if_match: i64,
) -> Result<comment::Model> {
	let row = fetch(txn, uuid).await?;
	check_etag(&row.friendly_id, row.etag, if_match)?;
	if row.deleted_at.is_some() {
		return Err(Error::Precondition(format!(
			"comment {} is already deleted",
			row.friendly_id
		)));
	}

	let now = Utc::now();
	let new_etag = row.etag + 1;
	let row_uuid = row.uuid;
	let mut active: comment::ActiveModel = row.into();
	active.deleted_at = Set(Some(now));
	active.etag = Set(new_etag);
	active.updated_at = Set(now);
	let row = active.update(txn).await?;

	log_event(
		txn,
		NewEvent {
			actor_uuid: Some(actor),
			resource: ResourceKind::Comment,
			resource_uuid: row_uuid,
			kind: EventKind::SoftDeleted,
			etag: Some(new_etag),
			payload: None,
		},
	)
	.await?;
	Ok(row)
}

/// Append-only edit: writes the successor, then soft-deletes the original,
/// atomically. The successor's meta records what it supersedes.
pub async fn edit(
	conn: &DatabaseConnection,
	actor: Uuid,
	uuid: Uuid,
	new_body: &str,
	if_match: i64,
) -> Result<comment::Model> {
	let txn = conn.begin().await?;
	let original = fetch(&txn, uuid).await?;
	check_etag(&original.friendly_id, original.etag, if_match)?;
	if original.deleted_at.is_some() {
		return Err(Error::Precondition(format!(
			"comment {} is already deleted",
			original.friendly_id
		)));
	}

	let successor = insert_comment(
		&txn,
		actor,
		original.task_uuid,
		new_body,
		Some(serde_json::json!({ "supersedes": original.uuid })),
	)
	.await?;
	soft_delete_in(&txn, actor, original.uuid, 0).await?;

	txn.commit().await?;
	Ok(successor)
}

async fn fetch<C: ConnectionTrait>(conn: &C, uuid: Uuid) -> Result<comment::Model> {
	Comment::find()
		.filter(comment::Column::Uuid.eq(uuid))
		.one(conn)
		.await?
		.ok_or_else(|| Error::not_found(ResourceKind::Comment, uuid.to_string()))
}
