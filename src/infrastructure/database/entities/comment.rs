//! Comment entity. Comments are append-only: edits are a successor comment
//! plus a soft delete of the predecessor, never a body rewrite.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "comments")]
pub struct Model {
	#[sea_orm(primary_key)]
	pub id: i32,
	#[sea_orm(unique)]
	pub uuid: Uuid,
	#[sea_orm(unique)]
	pub friendly_id: String,
	pub task_uuid: Uuid,
	pub actor_uuid: Uuid,
	#[sea_orm(column_type = "Text")]
	pub body: String,
	#[sea_orm(column_type = "Json", nullable)]
	pub meta: Option<Json>,
	pub etag: i64,
	pub created_at: DateTimeUtc,
	pub updated_at: DateTimeUtc,
	pub deleted_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
