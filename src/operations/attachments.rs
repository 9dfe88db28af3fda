//! Attachment store operations.
//!
//! The row is the source of truth. On create the file is written before the
//! row commits; on delete the row goes first and the file removal is
//! best-effort; the health component reconciles any drift.

use crate::domain::ident::IdKind;
use crate::infrastructure::database::entities::{attachment, task, Attachment, Task};
use crate::infrastructure::database::next_friendly_id;
use crate::infrastructure::events::{log_event, EventKind, NewEvent};
use crate::shared::{Error, ResourceKind, Result};
use chrono::Utc;
use sea_orm::{
	ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
	QueryOrder, TransactionTrait,
};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;

/// Storage layout is fixed: `tasks/<task-uuid>/<filename>` under the attach
/// root.
pub fn rel_path_for(task_uuid: Uuid, filename: &str) -> String {
	format!("tasks/{task_uuid}/{filename}")
}

fn validate_filename(filename: &str) -> Result<()> {
	if filename.is_empty()
		|| filename == "."
		|| filename == ".."
		|| filename.contains('/')
		|| filename.contains('\\')
	{
		return Err(Error::Validation(format!(
			"invalid attachment filename: {filename:?}"
		)));
	}
	Ok(())
}

/// Stores `data` as an attachment. Re-putting an existing filename replaces
/// the file and bumps the row.
pub async fn put(
	conn: &DatabaseConnection,
	actor: Uuid,
	task_uuid: Uuid,
	filename: &str,
	mime: Option<&str>,
	data: &[u8],
	attach_dir: &Path,
) -> Result<attachment::Model> {
	validate_filename(filename)?;
	if Task::find()
		.filter(task::Column::Uuid.eq(task_uuid))
		.one(conn)
		.await?
		.is_none()
	{
		return Err(Error::not_found(ResourceKind::Task, task_uuid.to_string()));
	}

	let rel = rel_path_for(task_uuid, filename);
	let abs = attach_dir.join(&rel);
	if let Some(parent) = abs.parent() {
		std::fs::create_dir_all(parent)?;
	}
	// File first; a failed transaction below leaves an orphan file that
	// doctor reports, never a row without bytes.
	std::fs::write(&abs, data)?;

	let checksum = hex::encode(Sha256::digest(data));
	let mime = mime.unwrap_or("application/octet-stream").to_owned();
	let now = Utc::now();

	let txn = conn.begin().await?;
	let existing = Attachment::find()
		.filter(attachment::Column::TaskUuid.eq(task_uuid))
		.filter(attachment::Column::Filename.eq(filename))
		.one(&txn)
		.await?;

	let row = match existing {
		Some(prev) => {
			let new_etag = prev.etag + 1;
			let prev_uuid = prev.uuid;
			let mut active: attachment::ActiveModel = prev.into();
			active.mime = Set(mime);
			active.size_bytes = Set(data.len() as i64);
			active.checksum = Set(checksum);
			active.etag = Set(new_etag);
			let row = active.update(&txn).await?;
			log_event(
				&txn,
				NewEvent {
					actor_uuid: Some(actor),
					resource: ResourceKind::Attachment,
					resource_uuid: prev_uuid,
					kind: EventKind::Updated,
					etag: Some(new_etag),
					payload: Some(serde_json::json!({ "filename": filename })),
				},
			)
			.await?;
			row
		}
		None => {
			let friendly = next_friendly_id(&txn, IdKind::Attachment).await?;
			let row = attachment::ActiveModel {
				uuid: Set(Uuid::new_v4()),
				friendly_id: Set(friendly),
				task_uuid: Set(task_uuid),
				filename: Set(filename.to_owned()),
				rel_path: Set(rel.clone()),
				mime: Set(mime),
				size_bytes: Set(data.len() as i64),
				checksum: Set(checksum),
				etag: Set(1),
				created_by_actor_uuid: Set(actor),
				created_at: Set(now),
				..Default::default()
			}
			.insert(&txn)
			.await?;
			log_event(
				&txn,
				NewEvent {
					actor_uuid: Some(actor),
					resource: ResourceKind::Attachment,
					resource_uuid: row.uuid,
					kind: EventKind::Created,
					etag: Some(1),
					payload: Some(serde_json::json!({
						"filename": filename,
						"task_uuid": task_uuid,
						"size_bytes": data.len(),
					})),
				},
			)
			.await?;
			row
		}
	};

	txn.commit().await?;
	Ok(row)
}

pub async fn list(conn: &DatabaseConnection, task_uuid: Uuid) -> Result<Vec<attachment::Model>> {
	Ok(Attachment::find()
		.filter(attachment::Column::TaskUuid.eq(task_uuid))
		.order_by_asc(attachment::Column::FriendlyId)
		.all(conn)
		.await?)
}

pub async fn get(
	conn: &DatabaseConnection,
	task_uuid: Uuid,
	filename: &str,
) -> Result<attachment::Model> {
	Attachment::find()
		.filter(attachment::Column::TaskUuid.eq(task_uuid))
		.filter(attachment::Column::Filename.eq(filename))
		.one(conn)
		.await?
		.ok_or_else(|| Error::not_found(ResourceKind::Attachment, filename))
}

/// Absolute path of the stored file.
pub fn file_path(attach_dir: &Path, row: &attachment::Model) -> PathBuf {
	attach_dir.join(&row.rel_path)
}

/// Removes row then file. A failed file delete is logged, never fatal; the
/// row has already gone in the same transaction as the event.
pub async fn delete(
	conn: &DatabaseConnection,
	actor: Uuid,
	uuid: Uuid,
	attach_dir: &Path,
) -> Result<()> {
	let txn = conn.begin().await?;
	let row = Attachment::find()
		.filter(attachment::Column::Uuid.eq(uuid))
		.one(&txn)
		.await?
		.ok_or_else(|| Error::not_found(ResourceKind::Attachment, uuid.to_string()))?;

	log_event(
		&txn,
		NewEvent {
			actor_uuid: Some(actor),
			resource: ResourceKind::Attachment,
			resource_uuid: row.uuid,
			kind: EventKind::Purged,
			etag: Some(row.etag),
			payload: Some(serde_json::json!({ "filename": row.filename })),
		},
	)
	.await?;
	let rel = row.rel_path.clone();
	Attachment::delete_by_id(row.id).exec(&txn).await?;
	txn.commit().await?;

	let path = attach_dir.join(&rel);
	if let Err(e) = std::fs::remove_file(&path) {
		warn!("could not remove attachment file {:?}: {e}", path);
	}
	Ok(())
}
