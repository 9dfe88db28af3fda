//! Task entity: the unit of work.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tasks")]
pub struct Model {
	#[sea_orm(primary_key)]
	pub id: i32,
	#[sea_orm(unique)]
	pub uuid: Uuid,
	#[sea_orm(unique)]
	pub friendly_id: String,
	/// Unique per (project_uuid, slug).
	pub slug: String,
	pub title: String,
	#[sea_orm(column_type = "Text")]
	pub description: String,
	pub state: String,
	pub priority: i32,
	pub kind: String,
	/// Owning container. Cascade on container purge.
	pub project_uuid: Uuid,
	/// Parent chains are trees; the writer rejects cycles.
	pub parent_task_uuid: Option<Uuid>,
	pub assignee_actor_uuid: Option<Uuid>,
	pub start_at: Option<DateTimeUtc>,
	pub due_at: Option<DateTimeUtc>,
	#[sea_orm(column_type = "Json")]
	pub labels: Json,
	/// Opaque client metadata; never interpreted by the engine.
	#[sea_orm(column_type = "Json")]
	pub meta: Json,
	pub etag: i64,
	pub created_by_actor_uuid: Uuid,
	pub updated_by_actor_uuid: Option<Uuid>,
	pub created_at: DateTimeUtc,
	pub updated_at: DateTimeUtc,
	pub completed_at: Option<DateTimeUtc>,
	pub archived_at: Option<DateTimeUtc>,
	pub deleted_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
