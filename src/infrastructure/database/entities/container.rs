//! Container entity: hierarchical namespaces holding tasks and
//! sub-containers.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "containers")]
pub struct Model {
	#[sea_orm(primary_key)]
	pub id: i32,
	#[sea_orm(unique)]
	pub uuid: Uuid,
	#[sea_orm(unique)]
	pub friendly_id: String,
	pub slug: String,
	pub title: String,
	#[sea_orm(column_type = "Text")]
	pub description: String,
	pub kind: String,
	/// Root containers have no parent. Sibling slugs are unique per parent
	/// (expression index; NULL parents collapse to one bucket).
	pub parent_uuid: Option<Uuid>,
	pub sort_index: i64,
	#[sea_orm(column_type = "Json")]
	pub webhook_urls: Json,
	pub etag: i64,
	pub created_by_actor_uuid: Uuid,
	pub updated_by_actor_uuid: Option<Uuid>,
	pub created_at: DateTimeUtc,
	pub updated_at: DateTimeUtc,
	pub archived_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
