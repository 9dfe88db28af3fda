//! Typed task-to-task relations.

use crate::domain::fields::{blocks_active, parse_state, RelationKind};
use crate::infrastructure::database::entities::{task, task_relation, Task, TaskRelation};
use crate::infrastructure::events::{log_event, EventKind, NewEvent};
use crate::shared::{Error, ResourceKind, Result};
use chrono::Utc;
use sea_orm::{
	ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, ConnectionTrait,
	DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use uuid::Uuid;

pub async fn create(
	conn: &DatabaseConnection,
	actor: Uuid,
	from: Uuid,
	to: Uuid,
	kind: RelationKind,
) -> Result<task_relation::Model> {
	if from == to {
		return Err(Error::Validation(
			"a task cannot relate to itself".into(),
		));
	}
	let txn = conn.begin().await?;
	for uuid in [from, to] {
		if Task::find()
			.filter(task::Column::Uuid.eq(uuid))
			.one(&txn)
			.await?
			.is_none()
		{
			return Err(Error::not_found(ResourceKind::Task, uuid.to_string()));
		}
	}
	let existing = TaskRelation::find()
		.filter(task_relation::Column::FromTaskUuid.eq(from))
		.filter(task_relation::Column::ToTaskUuid.eq(to))
		.filter(task_relation::Column::Kind.eq(kind.to_string()))
		.one(&txn)
		.await?;
	if existing.is_some() {
		return Err(Error::Conflict(format!(
			"relation already exists: {from} {kind} {to}"
		)));
	}

	let row = task_relation::ActiveModel {
		from_task_uuid: Set(from),
		to_task_uuid: Set(to),
		kind: Set(kind.to_string()),
		created_by_actor_uuid: Set(actor),
		created_at: Set(Utc::now()),
		..Default::default()
	}
	.insert(&txn)
	.await?;

	log_event(
		&txn,
		NewEvent {
			actor_uuid: Some(actor),
			resource: ResourceKind::Task,
			resource_uuid: from,
			kind: EventKind::RelationCreated,
			etag: None,
			payload: Some(serde_json::json!({
				"from": from,
				"to": to,
				"kind": kind.to_string(),
			})),
		},
	)
	.await?;

	txn.commit().await?;
	Ok(row)
}

pub async fn delete(
	conn: &DatabaseConnection,
	actor: Uuid,
	from: Uuid,
	to: Uuid,
	kind: RelationKind,
) -> Result<()> {
	let txn = conn.begin().await?;
	let row = TaskRelation::find()
		.filter(task_relation::Column::FromTaskUuid.eq(from))
		.filter(task_relation::Column::ToTaskUuid.eq(to))
		.filter(task_relation::Column::Kind.eq(kind.to_string()))
		.one(&txn)
		.await?
		.ok_or_else(|| {
			Error::not_found(ResourceKind::Task, format!("relation {from} {kind} {to}"))
		})?;

	TaskRelation::delete_by_id(row.id).exec(&txn).await?;

	log_event(
		&txn,
		NewEvent {
			actor_uuid: Some(actor),
			resource: ResourceKind::Task,
			resource_uuid: from,
			kind: EventKind::RelationDeleted,
			etag: None,
			payload: Some(serde_json::json!({
				"from": from,
				"to": to,
				"kind": kind.to_string(),
			})),
		},
	)
	.await?;

	txn.commit().await?;
	Ok(())
}

/// Every relation touching the task, in either direction.
pub async fn list(
	conn: &DatabaseConnection,
	task_uuid: Uuid,
) -> Result<Vec<task_relation::Model>> {
	Ok(TaskRelation::find()
		.filter(
			Condition::any()
				.add(task_relation::Column::FromTaskUuid.eq(task_uuid))
				.add(task_relation::Column::ToTaskUuid.eq(task_uuid)),
		)
		.order_by_asc(task_relation::Column::Id)
		.all(conn)
		.await?)
}

/// Tasks that actively block `task_uuid`: `blocks` edges whose source is
/// still live work (not completed/cancelled/archived/deleted).
pub async fn blocked_by<C: ConnectionTrait>(conn: &C, task_uuid: Uuid) -> Result<Vec<task::Model>> {
	let edges = TaskRelation::find()
		.filter(task_relation::Column::ToTaskUuid.eq(task_uuid))
		.filter(task_relation::Column::Kind.eq(RelationKind::Blocks.to_string()))
		.all(conn)
		.await?;
	let mut blockers = Vec::new();
	for edge in edges {
		let Some(task) = Task::find()
			.filter(task::Column::Uuid.eq(edge.from_task_uuid))
			.one(conn)
			.await?
		else {
			continue;
		};
		if blocks_active(parse_state(&task.state)?) {
			blockers.push(task);
		}
	}
	blockers.sort_by(|a, b| a.friendly_id.cmp(&b.friendly_id));
	Ok(blockers)
}
