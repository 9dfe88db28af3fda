//! Canonical JSON snapshots of the whole store.
//!
//! Canonical means: object keys sorted at every level (serde_json's default
//! BTree maps), arrays sorted by a stable per-collection key, no
//! insignificant whitespace, one trailing newline. `snapshot_rev` is a hex
//! SHA-256 over the canonical bytes with the revision field absent.
//! Re-exporting an imported snapshot must reproduce it byte for byte, which
//! is also why import never writes events of its own.

use crate::domain::fields::{
	parse_container_kind, parse_relation_kind, parse_role, parse_state, parse_task_kind,
	validate_priority,
};
use crate::domain::ident::IdKind;
use crate::infrastructure::database::entities::{
	actor, comment, container, event, id_sequence, task, task_relation, Actor, Comment, Container,
	Event, IdSequence, Task, TaskRelation,
};
use crate::shared::{Error, Result};
use crate::MACHINE_INTERFACE_VERSION;
use chrono::{DateTime, SecondsFormat, Utc};
use sea_orm::{
	ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
	EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

fn ts(t: DateTime<Utc>) -> Value {
	Value::String(t.to_rfc3339_opts(SecondsFormat::Micros, true))
}

fn opt_ts_value(t: Option<DateTime<Utc>>) -> Value {
	t.map(ts).unwrap_or(Value::Null)
}

fn opt_uuid_value(u: Option<Uuid>) -> Value {
	u.map(|u| Value::String(u.to_string())).unwrap_or(Value::Null)
}

/// Exports the canonical snapshot. Events are included only on request; by
/// default snapshots reflect state, not history.
pub async fn export(conn: &DatabaseConnection, with_events: bool) -> Result<String> {
	let mut actors = Actor::find().all(conn).await?;
	actors.sort_by_key(|a| a.uuid.to_string());
	let mut containers = Container::find().all(conn).await?;
	containers.sort_by_key(|c| c.uuid.to_string());
	let mut tasks = Task::find().all(conn).await?;
	tasks.sort_by_key(|t| t.uuid.to_string());
	let mut comments = Comment::find().all(conn).await?;
	comments.sort_by_key(|c| c.uuid.to_string());
	let mut relations = TaskRelation::find().all(conn).await?;
	relations.sort_by_key(|r| {
		(
			r.from_task_uuid.to_string(),
			r.to_task_uuid.to_string(),
			r.kind.clone(),
		)
	});

	let mut root = Map::new();
	root.insert(
		"actors".into(),
		Value::Array(actors.iter().map(actor_value).collect()),
	);
	root.insert(
		"containers".into(),
		Value::Array(containers.iter().map(container_value).collect()),
	);
	root.insert(
		"tasks".into(),
		Value::Array(tasks.iter().map(task_value).collect()),
	);
	root.insert(
		"comments".into(),
		Value::Array(comments.iter().map(comment_value).collect()),
	);
	root.insert(
		"relations".into(),
		Value::Array(relations.iter().map(relation_value).collect()),
	);
	if with_events {
		let events = Event::find()
			.order_by_asc(event::Column::Id)
			.all(conn)
			.await?;
		root.insert(
			"events".into(),
			Value::Array(events.iter().map(event_value).collect()),
		);
	}
	root.insert(
		"machine_interface_version".into(),
		Value::String(MACHINE_INTERFACE_VERSION.into()),
	);

	// The revision hashes the canonical bytes without the revision itself.
	let unhashed = serde_json::to_string(&Value::Object(root.clone()))?;
	let rev = hex::encode(Sha256::digest(unhashed.as_bytes()));
	root.insert("snapshot_rev".into(), Value::String(rev));

	Ok(format!("{}\n", serde_json::to_string(&Value::Object(root))?))
}

/// Re-exports and byte-compares against `expected`.
pub async fn verify(conn: &DatabaseConnection, expected: &str, with_events: bool) -> Result<()> {
	let actual = export(conn, with_events).await?;
	if actual != expected {
		return Err(Error::Conflict(
			"snapshot verify failed: canonical export differs".into(),
		));
	}
	Ok(())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImportOptions {
	/// Parse, validate and apply, then roll back.
	pub dry_run: bool,
	/// Truncate first instead of requiring an empty (freshly seeded) store.
	pub force: bool,
}

#[derive(Debug, Default, serde::Serialize)]
pub struct ImportReport {
	pub actors: usize,
	pub containers: usize,
	pub tasks: usize,
	pub comments: usize,
	pub relations: usize,
	pub events: usize,
	pub dry_run: bool,
}

pub async fn import(
	conn: &DatabaseConnection,
	text: &str,
	opts: ImportOptions,
) -> Result<ImportReport> {
	let root: Value = serde_json::from_str(text)
		.map_err(|e| Error::Validation(format!("snapshot is not valid JSON: {e}")))?;
	let root = root
		.as_object()
		.ok_or_else(|| Error::Validation("snapshot root must be an object".into()))?;

	let version = field_str(root, "machine_interface_version")?;
	if version != MACHINE_INTERFACE_VERSION {
		return Err(Error::Validation(format!(
			"machine interface version mismatch: snapshot {version}, engine {MACHINE_INTERFACE_VERSION}"
		)));
	}

	let txn = conn.begin().await?;

	if opts.force {
		// Containers cascade to tasks, comments, relations, attachments.
		Container::delete_many().exec(&txn).await?;
		Task::delete_many().exec(&txn).await?;
		Actor::delete_many().exec(&txn).await?;
		Event::delete_many().exec(&txn).await?;
	} else {
		ensure_only_seeded(&txn).await?;
		Actor::delete_many().exec(&txn).await?;
		Event::delete_many().exec(&txn).await?;
	}

	let mut report = ImportReport {
		dry_run: opts.dry_run,
		..Default::default()
	};
	let mut max_ids: Vec<(IdKind, i64)> = vec![
		(IdKind::Actor, 0),
		(IdKind::Container, 0),
		(IdKind::Task, 0),
		(IdKind::Comment, 0),
	];
	let mut bump = |kind: IdKind, friendly: &str| {
		for (k, max) in max_ids.iter_mut() {
			if *k == kind {
				if let Some(n) = kind.parse(friendly) {
					*max = (*max).max(n);
				}
			}
		}
	};

	for item in array(root, "actors")? {
		let row = import_actor(item)?;
		bump(IdKind::Actor, row.friendly_id.as_ref());
		row.insert(&txn).await?;
		report.actors += 1;
	}
	for item in topo_containers(array(root, "containers")?)? {
		let row = import_container(item)?;
		bump(IdKind::Container, row.friendly_id.as_ref());
		row.insert(&txn).await?;
		report.containers += 1;
	}
	for item in topo_tasks(array(root, "tasks")?)? {
		let row = import_task(item)?;
		bump(IdKind::Task, row.friendly_id.as_ref());
		row.insert(&txn).await?;
		report.tasks += 1;
	}
	for item in array(root, "comments")? {
		let row = import_comment(item)?;
		bump(IdKind::Comment, row.friendly_id.as_ref());
		row.insert(&txn).await?;
		report.comments += 1;
	}
	for item in array(root, "relations")? {
		import_relation(item)?.insert(&txn).await?;
		report.relations += 1;
	}
	if let Some(events) = root.get("events") {
		let events = events
			.as_array()
			.ok_or_else(|| Error::Validation("events must be an array".into()))?;
		for item in events {
			import_event(item)?.insert(&txn).await?;
			report.events += 1;
		}
	}

	// Counters resume after the highest imported friendly ID.
	for (kind, max) in max_ids {
		let key = kind.sequence_key();
		let row = IdSequence::find_by_id(key)
			.one(&txn)
			.await?
			.ok_or_else(|| Error::Integrity(format!("id sequence row missing: {key}")))?;
		let mut active: id_sequence::ActiveModel = row.into();
		active.next = Set(max + 1);
		active.update(&txn).await?;
	}

	if opts.dry_run {
		txn.rollback().await?;
	} else {
		txn.commit().await?;
	}
	Ok(report)
}

/// Empty-DB enforcement: anything beyond the seeded `system` actor (and its
/// bootstrap events) refuses the import.
async fn ensure_only_seeded<C: ConnectionTrait>(conn: &C) -> Result<()> {
	let containers = Container::find().count(conn).await?;
	let tasks = Task::find().count(conn).await?;
	let comments = Comment::find().count(conn).await?;
	let relations = TaskRelation::find().count(conn).await?;
	let foreign_actors = Actor::find()
		.filter(actor::Column::Slug.ne("system"))
		.count(conn)
		.await?;
	if containers + tasks + comments + relations + foreign_actors > 0 {
		return Err(Error::Conflict(
			"target store is not empty; re-run with force to truncate".into(),
		));
	}
	Ok(())
}

// -- export value shapes ----------------------------------------------------

fn actor_value(a: &actor::Model) -> Value {
	json!({
		"created_at": ts(a.created_at),
		"display_name": a.display_name,
		"etag": a.etag,
		"id": a.friendly_id,
		"role": a.role,
		"slug": a.slug,
		"updated_at": ts(a.updated_at),
		"uuid": a.uuid.to_string(),
	})
}

fn container_value(c: &container::Model) -> Value {
	json!({
		"archived_at": opt_ts_value(c.archived_at),
		"created_at": ts(c.created_at),
		"created_by": c.created_by_actor_uuid.to_string(),
		"description": c.description,
		"etag": c.etag,
		"id": c.friendly_id,
		"kind": c.kind,
		"parent_uuid": opt_uuid_value(c.parent_uuid),
		"slug": c.slug,
		"sort_index": c.sort_index,
		"title": c.title,
		"updated_at": ts(c.updated_at),
		"updated_by": opt_uuid_value(c.updated_by_actor_uuid),
		"uuid": c.uuid.to_string(),
		"webhook_urls": c.webhook_urls,
	})
}

fn task_value(t: &task::Model) -> Value {
	json!({
		"archived_at": opt_ts_value(t.archived_at),
		"assignee": opt_uuid_value(t.assignee_actor_uuid),
		"completed_at": opt_ts_value(t.completed_at),
		"created_at": ts(t.created_at),
		"created_by": t.created_by_actor_uuid.to_string(),
		"deleted_at": opt_ts_value(t.deleted_at),
		"description": t.description,
		"due_at": opt_ts_value(t.due_at),
		"etag": t.etag,
		"id": t.friendly_id,
		"kind": t.kind,
		"labels": t.labels,
		"meta": t.meta,
		"parent_task_uuid": opt_uuid_value(t.parent_task_uuid),
		"priority": t.priority,
		"project_uuid": t.project_uuid.to_string(),
		"slug": t.slug,
		"start_at": opt_ts_value(t.start_at),
		"state": t.state,
		"title": t.title,
		"updated_at": ts(t.updated_at),
		"updated_by": opt_uuid_value(t.updated_by_actor_uuid),
		"uuid": t.uuid.to_string(),
	})
}

fn comment_value(c: &comment::Model) -> Value {
	json!({
		"actor_uuid": c.actor_uuid.to_string(),
		"body": c.body,
		"created_at": ts(c.created_at),
		"deleted_at": opt_ts_value(c.deleted_at),
		"etag": c.etag,
		"id": c.friendly_id,
		"meta": c.meta.clone().unwrap_or(Value::Null),
		"task_uuid": c.task_uuid.to_string(),
		"updated_at": ts(c.updated_at),
		"uuid": c.uuid.to_string(),
	})
}

fn relation_value(r: &task_relation::Model) -> Value {
	json!({
		"created_at": ts(r.created_at),
		"created_by": r.created_by_actor_uuid.to_string(),
		"from": r.from_task_uuid.to_string(),
		"kind": r.kind,
		"to": r.to_task_uuid.to_string(),
	})
}

fn event_value(e: &event::Model) -> Value {
	json!({
		"actor_uuid": opt_uuid_value(e.actor_uuid),
		"etag": e.etag,
		"event_type": e.event_type,
		"id": e.id,
		"payload": e.payload.clone().unwrap_or(Value::Null),
		"resource_type": e.resource_type,
		"resource_uuid": e.resource_uuid.to_string(),
		"ts": ts(e.ts),
	})
}

// -- import parsing ---------------------------------------------------------

fn array<'a>(root: &'a Map<String, Value>, key: &str) -> Result<&'a Vec<Value>> {
	root.get(key)
		.and_then(Value::as_array)
		.ok_or_else(|| Error::Validation(format!("snapshot is missing array {key:?}")))
}

fn obj<'a>(v: &'a Value, what: &str) -> Result<&'a Map<String, Value>> {
	v.as_object()
		.ok_or_else(|| Error::Validation(format!("{what} entry must be an object")))
}

fn field_str(m: &Map<String, Value>, key: &str) -> Result<String> {
	m.get(key)
		.and_then(Value::as_str)
		.map(str::to_owned)
		.ok_or_else(|| Error::Validation(format!("missing string field {key:?}")))
}

fn field_i64(m: &Map<String, Value>, key: &str) -> Result<i64> {
	m.get(key)
		.and_then(Value::as_i64)
		.ok_or_else(|| Error::Validation(format!("missing integer field {key:?}")))
}

fn field_uuid(m: &Map<String, Value>, key: &str) -> Result<Uuid> {
	let s = field_str(m, key)?;
	Uuid::parse_str(&s).map_err(|_| Error::Validation(format!("invalid uuid in {key:?}: {s}")))
}

fn field_opt_uuid(m: &Map<String, Value>, key: &str) -> Result<Option<Uuid>> {
	match m.get(key) {
		None | Some(Value::Null) => Ok(None),
		Some(Value::String(s)) => Uuid::parse_str(s)
			.map(Some)
			.map_err(|_| Error::Validation(format!("invalid uuid in {key:?}: {s}"))),
		Some(_) => Err(Error::Validation(format!("{key} must be a uuid or null"))),
	}
}

fn field_ts(m: &Map<String, Value>, key: &str) -> Result<DateTime<Utc>> {
	let s = field_str(m, key)?;
	DateTime::parse_from_rfc3339(&s)
		.map(|t| t.with_timezone(&Utc))
		.map_err(|e| Error::Validation(format!("invalid timestamp in {key:?}: {e}")))
}

fn field_opt_ts(m: &Map<String, Value>, key: &str) -> Result<Option<DateTime<Utc>>> {
	match m.get(key) {
		None | Some(Value::Null) => Ok(None),
		Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
			.map(|t| Some(t.with_timezone(&Utc)))
			.map_err(|e| Error::Validation(format!("invalid timestamp in {key:?}: {e}"))),
		Some(_) => Err(Error::Validation(format!("{key} must be a timestamp or null"))),
	}
}

fn import_actor(v: &Value) -> Result<actor::ActiveModel> {
	let m = obj(v, "actor")?;
	parse_role(&field_str(m, "role")?)?;
	Ok(actor::ActiveModel {
		uuid: Set(field_uuid(m, "uuid")?),
		friendly_id: Set(field_str(m, "id")?),
		slug: Set(field_str(m, "slug")?),
		display_name: Set(field_str(m, "display_name")?),
		role: Set(field_str(m, "role")?),
		etag: Set(field_i64(m, "etag")?),
		created_at: Set(field_ts(m, "created_at")?),
		updated_at: Set(field_ts(m, "updated_at")?),
		..Default::default()
	})
}

fn import_container(v: &Value) -> Result<container::ActiveModel> {
	let m = obj(v, "container")?;
	parse_container_kind(&field_str(m, "kind")?)?;
	Ok(container::ActiveModel {
		uuid: Set(field_uuid(m, "uuid")?),
		friendly_id: Set(field_str(m, "id")?),
		slug: Set(field_str(m, "slug")?),
		title: Set(field_str(m, "title")?),
		description: Set(field_str(m, "description").unwrap_or_default()),
		kind: Set(field_str(m, "kind")?),
		parent_uuid: Set(field_opt_uuid(m, "parent_uuid")?),
		sort_index: Set(field_i64(m, "sort_index").unwrap_or(0)),
		webhook_urls: Set(m.get("webhook_urls").cloned().unwrap_or_else(|| json!([]))),
		etag: Set(field_i64(m, "etag")?),
		created_by_actor_uuid: Set(field_uuid(m, "created_by")?),
		updated_by_actor_uuid: Set(field_opt_uuid(m, "updated_by")?),
		created_at: Set(field_ts(m, "created_at")?),
		updated_at: Set(field_ts(m, "updated_at")?),
		archived_at: Set(field_opt_ts(m, "archived_at")?),
		..Default::default()
	})
}

fn import_task(v: &Value) -> Result<task::ActiveModel> {
	let m = obj(v, "task")?;
	parse_state(&field_str(m, "state")?)?;
	parse_task_kind(&field_str(m, "kind")?)?;
	let priority = validate_priority(field_i64(m, "priority")?)?;
	Ok(task::ActiveModel {
		uuid: Set(field_uuid(m, "uuid")?),
		friendly_id: Set(field_str(m, "id")?),
		slug: Set(field_str(m, "slug")?),
		title: Set(field_str(m, "title")?),
		description: Set(field_str(m, "description").unwrap_or_default()),
		state: Set(field_str(m, "state")?),
		priority: Set(priority),
		kind: Set(field_str(m, "kind")?),
		project_uuid: Set(field_uuid(m, "project_uuid")?),
		parent_task_uuid: Set(field_opt_uuid(m, "parent_task_uuid")?),
		assignee_actor_uuid: Set(field_opt_uuid(m, "assignee")?),
		start_at: Set(field_opt_ts(m, "start_at")?),
		due_at: Set(field_opt_ts(m, "due_at")?),
		labels: Set(m.get("labels").cloned().unwrap_or_else(|| json!([]))),
		meta: Set(m.get("meta").cloned().unwrap_or_else(|| json!({}))),
		etag: Set(field_i64(m, "etag")?),
		created_by_actor_uuid: Set(field_uuid(m, "created_by")?),
		updated_by_actor_uuid: Set(field_opt_uuid(m, "updated_by")?),
		created_at: Set(field_ts(m, "created_at")?),
		updated_at: Set(field_ts(m, "updated_at")?),
		completed_at: Set(field_opt_ts(m, "completed_at")?),
		archived_at: Set(field_opt_ts(m, "archived_at")?),
		deleted_at: Set(field_opt_ts(m, "deleted_at")?),
		..Default::default()
	})
}

fn import_comment(v: &Value) -> Result<comment::ActiveModel> {
	let m = obj(v, "comment")?;
	Ok(comment::ActiveModel {
		uuid: Set(field_uuid(m, "uuid")?),
		friendly_id: Set(field_str(m, "id")?),
		task_uuid: Set(field_uuid(m, "task_uuid")?),
		actor_uuid: Set(field_uuid(m, "actor_uuid")?),
		body: Set(field_str(m, "body")?),
		meta: Set(match m.get("meta") {
			None | Some(Value::Null) => None,
			Some(v) => Some(v.clone()),
		}),
		etag: Set(field_i64(m, "etag")?),
		created_at: Set(field_ts(m, "created_at")?),
		updated_at: Set(field_ts(m, "updated_at")?),
		deleted_at: Set(field_opt_ts(m, "deleted_at")?),
		..Default::default()
	})
}

fn import_relation(v: &Value) -> Result<task_relation::ActiveModel> {
	let m = obj(v, "relation")?;
	let from = field_uuid(m, "from")?;
	let to = field_uuid(m, "to")?;
	if from == to {
		return Err(Error::Validation("relation from a task to itself".into()));
	}
	parse_relation_kind(&field_str(m, "kind")?)?;
	Ok(task_relation::ActiveModel {
		from_task_uuid: Set(from),
		to_task_uuid: Set(to),
		kind: Set(field_str(m, "kind")?),
		created_by_actor_uuid: Set(field_uuid(m, "created_by")?),
		created_at: Set(field_ts(m, "created_at")?),
		..Default::default()
	})
}

fn import_event(v: &Value) -> Result<event::ActiveModel> {
	let m = obj(v, "event")?;
	Ok(event::ActiveModel {
		id: Set(field_i64(m, "id")? as i32),
		ts: Set(field_ts(m, "ts")?),
		actor_uuid: Set(field_opt_uuid(m, "actor_uuid")?),
		resource_type: Set(field_str(m, "resource_type")?),
		resource_uuid: Set(field_uuid(m, "resource_uuid")?),
		event_type: Set(field_str(m, "event_type")?),
		etag: Set(m.get("etag").and_then(Value::as_i64)),
		payload: Set(match m.get("payload") {
			None | Some(Value::Null) => None,
			Some(v) => Some(v.clone()),
		}),
	})
}

/// Parents before children, so foreign keys hold during insert.
fn topo_containers(items: &[Value]) -> Result<Vec<&Value>> {
	topo_sort(items, "container", "parent_uuid")
}

fn topo_tasks(items: &[Value]) -> Result<Vec<&Value>> {
	topo_sort(items, "task", "parent_task_uuid")
}

fn topo_sort<'a>(items: &'a [Value], what: &str, parent_key: &str) -> Result<Vec<&'a Value>> {
	let mut pending: Vec<&Value> = items.iter().collect();
	let mut placed: std::collections::HashSet<String> = std::collections::HashSet::new();
	let mut out = Vec::with_capacity(items.len());
	while !pending.is_empty() {
		let before = pending.len();
		pending.retain(|v| {
			let Some(m) = v.as_object() else {
				// Let the per-entity parser produce the real error.
				out.push(*v);
				return false;
			};
			let parent = m.get(parent_key).and_then(Value::as_str);
			let ready = match parent {
				None => true,
				Some(p) => placed.contains(p),
			};
			if ready {
				if let Some(u) = m.get("uuid").and_then(Value::as_str) {
					placed.insert(u.to_owned());
				}
				out.push(*v);
			}
			!ready
		});
		if pending.len() == before {
			return Err(Error::Validation(format!(
				"{what} parent chain contains a cycle or a missing parent"
			)));
		}
	}
	Ok(out)
}
