//! Event journal writer.
//!
//! A single surface: [`log_event`] appends one row inside the caller's
//! transaction. The writer never opens its own transaction; callers own the
//! atomicity boundary, so a rolled-back mutation leaves no event behind.
//! Payloads are canonical JSON: `serde_json` maps are BTree-backed, so keys
//! serialize sorted and the journal stays diffable.

use crate::infrastructure::database::entities::event;
use crate::shared::{ResourceKind, Result};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ConnectionTrait};
use uuid::Uuid;

/// Action part of an event type. Combined with the resource kind this forms
/// the journal's `event_type` string (`task.created`, `comment.deleted`, …).
/// Relation edges are journaled against the *from* task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
	Created,
	Updated,
	Archived,
	SoftDeleted,
	Restored,
	Purged,
	RelationCreated,
	RelationDeleted,
}

impl EventKind {
	pub fn event_type(&self, resource: ResourceKind) -> String {
		match self {
			EventKind::RelationCreated => "relation.created".to_owned(),
			EventKind::RelationDeleted => "relation.deleted".to_owned(),
			EventKind::Created => format!("{resource}.created"),
			EventKind::Updated => format!("{resource}.updated"),
			EventKind::Archived => format!("{resource}.archived"),
			EventKind::SoftDeleted => format!("{resource}.deleted"),
			EventKind::Restored => format!("{resource}.restored"),
			EventKind::Purged => format!("{resource}.purged"),
		}
	}
}

pub struct NewEvent {
	pub actor_uuid: Option<Uuid>,
	pub resource: ResourceKind,
	pub resource_uuid: Uuid,
	pub kind: EventKind,
	/// Subject etag after the mutation, when the subject carries one.
	pub etag: Option<i64>,
	pub payload: Option<serde_json::Value>,
}

/// Append one event. Must run on the transaction of the causing mutation.
pub async fn log_event<C: ConnectionTrait>(conn: &C, ev: NewEvent) -> Result<event::Model> {
	let row = event::ActiveModel {
		ts: Set(Utc::now()),
		actor_uuid: Set(ev.actor_uuid),
		resource_type: Set(ev.resource.as_str().to_owned()),
		resource_uuid: Set(ev.resource_uuid),
		event_type: Set(ev.kind.event_type(ev.resource)),
		etag: Set(ev.etag),
		payload: Set(ev.payload),
		..Default::default()
	}
	.insert(conn)
	.await?;
	Ok(row)
}
