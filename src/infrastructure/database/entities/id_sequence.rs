//! Per-kind monotonic counters backing friendly-ID issuance. The
//! read-modify-write on a row is the serialization point for parallel
//! writers.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "id_sequences")]
pub struct Model {
	#[sea_orm(primary_key, auto_increment = false)]
	pub kind: String,
	pub next: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
