//! Actor store operations.

use crate::domain::fields::{parse_role, ActorRole};
use crate::domain::ident::{normalize_slug, IdKind};
use crate::infrastructure::database::entities::{actor, Actor};
use crate::infrastructure::database::next_friendly_id;
use crate::infrastructure::events::{log_event, EventKind, NewEvent};
use crate::operations::check_etag;
use crate::shared::{Error, ResourceKind, Result};
use chrono::Utc;
use sea_orm::{
	ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
	QueryOrder, TransactionTrait,
};
use uuid::Uuid;

pub struct ActorCreate {
	pub slug: String,
	pub display_name: String,
	pub role: ActorRole,
}

/// `acting` is None only during bootstrap, before any actor exists.
pub async fn create(
	conn: &DatabaseConnection,
	acting: Option<Uuid>,
	params: ActorCreate,
) -> Result<actor::Model> {
	let slug = normalize_slug(&params.slug)?;
	let txn = conn.begin().await?;

	if Actor::find()
		.filter(actor::Column::Slug.eq(&slug))
		.one(&txn)
		.await?
		.is_some()
	{
		return Err(Error::Conflict(format!("actor slug already in use: {slug}")));
	}

	let friendly = next_friendly_id(&txn, IdKind::Actor).await?;
	let now = Utc::now();
	let row = actor::ActiveModel {
		uuid: Set(Uuid::new_v4()),
		friendly_id: Set(friendly),
		slug: Set(slug.clone()),
		display_name: Set(params.display_name),
		role: Set(params.role.to_string()),
		etag: Set(1),
		created_at: Set(now),
		updated_at: Set(now),
		..Default::default()
	}
	.insert(&txn)
	.await?;

	log_event(
		&txn,
		NewEvent {
			actor_uuid: acting.or(Some(row.uuid)),
			resource: ResourceKind::Actor,
			resource_uuid: row.uuid,
			kind: EventKind::Created,
			etag: Some(1),
			payload: Some(serde_json::json!({ "slug": slug, "role": row.role })),
		},
	)
	.await?;

	txn.commit().await?;
	Ok(row)
}

/// Recognized fields: `display_name`, `role`.
pub async fn update_fields(
	conn: &DatabaseConnection,
	acting: Uuid,
	uuid: Uuid,
	fields: &serde_json::Map<String, serde_json::Value>,
	if_match: i64,
) -> Result<actor::Model> {
	if fields.is_empty() {
		return Err(Error::Validation("no fields to update".into()));
	}
	let txn = conn.begin().await?;
	let row = Actor::find()
		.filter(actor::Column::Uuid.eq(uuid))
		.one(&txn)
		.await?
		.ok_or_else(|| Error::not_found(ResourceKind::Actor, uuid.to_string()))?;
	check_etag(&row.friendly_id, row.etag, if_match)?;

	let new_etag = row.etag + 1;
	let mut active: actor::ActiveModel = row.into();
	let mut changed = serde_json::Map::new();
	for (key, value) in fields {
		match key.as_str() {
			"display_name" => {
				let name = value
					.as_str()
					.ok_or_else(|| Error::Validation("display_name must be a string".into()))?;
				active.display_name = Set(name.to_owned());
				changed.insert(key.clone(), value.clone());
			}
			"role" => {
				let role = value
					.as_str()
					.ok_or_else(|| Error::Validation("role must be a string".into()))?;
				active.role = Set(parse_role(role)?.to_string());
				changed.insert(key.clone(), value.clone());
			}
			other => {
				return Err(Error::Validation(format!(
					"unrecognized actor field: {other}"
				)))
			}
		}
	}
	active.etag = Set(new_etag);
	active.updated_at = Set(Utc::now());
	let row = active.update(&txn).await?;

	log_event(
		&txn,
		NewEvent {
			actor_uuid: Some(acting),
			resource: ResourceKind::Actor,
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

pub async fn get(conn: &DatabaseConnection, uuid: Uuid) -> Result<actor::Model> {
	Actor::find()
		.filter(actor::Column::Uuid.eq(uuid))
		.one(conn)
		.await?
		.ok_or_else(|| Error::not_found(ResourceKind::Actor, uuid.to_string()))
}

pub async fn get_by_slug(conn: &DatabaseConnection, slug: &str) -> Result<actor::Model> {
	Actor::find()
		.filter(actor::Column::Slug.eq(slug))
		.one(conn)
		.await?
		.ok_or_else(|| Error::not_found(ResourceKind::Actor, slug))
}

pub async fn list(conn: &DatabaseConnection) -> Result<Vec<actor::Model>> {
	Ok(Actor::find()
		.order_by_asc(actor::Column::FriendlyId)
		.all(conn)
		.await?)
}

/// Idempotently creates the seeded `system` actor. `wrkq init` calls this;
/// it is the only state an empty-required snapshot import tolerates.
pub async fn seed_defaults(conn: &DatabaseConnection) -> Result<actor::Model> {
	if let Ok(existing) = get_by_slug(conn, "system").await {
		return Ok(existing);
	}
	create(
		conn,
		None,
		ActorCreate {
			slug: "system".into(),
			display_name: "System".into(),
			role: ActorRole::System,
		},
	)
	.await
}
