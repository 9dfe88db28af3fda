//! Typed directed edges between tasks. `(from, to, kind)` is unique and
//! self-loops are rejected both here and by a database trigger.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "task_relations")]
pub struct Model {
	#[sea_orm(primary_key)]
	pub id: i32,
	pub from_task_uuid: Uuid,
	pub to_task_uuid: Uuid,
	pub kind: String,
	pub created_by_actor_uuid: Uuid,
	pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
