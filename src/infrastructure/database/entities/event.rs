//! Append-only event journal. Events are written inside the transaction of
//! the mutation that caused them and are never rewritten; they outlive purge
//! and remain the authoritative history.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "events")]
pub struct Model {
	#[sea_orm(primary_key)]
	pub id: i32,
	pub ts: DateTimeUtc,
	pub actor_uuid: Option<Uuid>,
	/// task | container | comment | actor | attachment
	pub resource_type: String,
	pub resource_uuid: Uuid,
	/// e.g. `task.created`, `task.archived`, `relation.created`
	pub event_type: String,
	/// Subject etag after the mutation, when the subject has one.
	pub etag: Option<i64>,
	#[sea_orm(column_type = "Json", nullable)]
	pub payload: Option<Json>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
