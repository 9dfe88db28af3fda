//! Attachment rows. The row is the source of truth; the file lives under
//! `attachments/tasks/<task-uuid>/<filename>` relative to the attach root.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "attachments")]
pub struct Model {
	#[sea_orm(primary_key)]
	pub id: i32,
	#[sea_orm(unique)]
	pub uuid: Uuid,
	#[sea_orm(unique)]
	pub friendly_id: String,
	pub task_uuid: Uuid,
	pub filename: String,
	/// Relative storage path, always `tasks/<task-uuid>/<filename>`.
	pub rel_path: String,
	pub mime: String,
	pub size_bytes: i64,
	/// Hex SHA-256 of the file contents.
	pub checksum: String,
	pub etag: i64,
	pub created_by_actor_uuid: Uuid,
	pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
