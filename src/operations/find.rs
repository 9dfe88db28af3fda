//! The find engine: filtered listing with stable ordering and keyset
//! pagination.
//!
//! Ordering is explicit: the requested sort key ascending, friendly ID
//! ascending as the tiebreak. The cursor is an opaque hex-encoded token
//! holding the last row's sort value and friendly ID; the next page
//! predicate is `sort > last OR (sort = last AND id > last_id)`.

use crate::domain::fields::{parse_container_kind, parse_state, parse_task_kind};
use crate::shared::{Error, Result};
use chrono::{DateTime, Utc};
use sea_orm::{ConnectionTrait, DatabaseBackend, FromQueryResult, Statement, Value};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FindTarget {
	#[default]
	Tasks,
	Containers,
	Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
	#[default]
	UpdatedAt,
	CreatedAt,
	DueAt,
	Priority,
}

impl SortKey {
	/// SQL expression the ordering and the cursor predicate share. Values
	/// compare as TEXT; timestamps are stored in a sortable format and
	/// priority is a single digit.
	fn expr(&self) -> &'static str {
		match self {
			SortKey::UpdatedAt => "CAST(t.updated_at AS TEXT)",
			SortKey::CreatedAt => "CAST(t.created_at AS TEXT)",
			SortKey::DueAt => "COALESCE(CAST(t.due_at AS TEXT), '')",
			SortKey::Priority => "CAST(t.priority AS TEXT)",
		}
	}
}

#[derive(Debug, Clone, Default)]
pub struct FindQuery {
	/// Path prefixes; empty means everywhere.
	pub paths: Vec<String>,
	pub target: FindTarget,
	/// SQLite GLOB over the slug.
	pub slug_glob: Option<String>,
	/// Exact state, or a pseudo-state: "", "active", "all", "deleted".
	pub state: Option<String>,
	pub kind: Option<String>,
	pub assignee: Option<Uuid>,
	pub parent_task: Option<Uuid>,
	pub due_before: Option<DateTime<Utc>>,
	pub due_after: Option<DateTime<Utc>>,
	pub sort: SortKey,
	/// 0 means the default page size.
	pub limit: u64,
	pub cursor: Option<String>,
}

const DEFAULT_LIMIT: u64 = 100;

#[derive(Debug, Clone, FromQueryResult, Serialize)]
pub struct TaskHit {
	pub path: String,
	pub uuid: Uuid,
	pub friendly_id: String,
	pub slug: String,
	pub title: String,
	pub state: String,
	pub priority: i32,
	pub kind: String,
	pub assignee_actor_uuid: Option<Uuid>,
	pub due_at: Option<chrono::DateTime<Utc>>,
	pub updated_at: chrono::DateTime<Utc>,
	pub etag: i64,
	#[serde(skip)]
	pub sort_text: String,
}

#[derive(Debug, Clone, FromQueryResult, Serialize)]
pub struct ContainerHit {
	pub path: String,
	pub uuid: Uuid,
	pub friendly_id: String,
	pub slug: String,
	pub title: String,
	pub kind: String,
	pub archived: bool,
	pub etag: i64,
}

#[derive(Debug, Default, Serialize)]
pub struct FindPage {
	pub tasks: Vec<TaskHit>,
	pub containers: Vec<ContainerHit>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub next_cursor: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct Cursor {
	/// Last sort value, as the comparison TEXT.
	s: String,
	/// Last friendly ID.
	id: String,
}

fn encode_cursor(c: &Cursor) -> String {
	hex::encode(serde_json::to_string(c).unwrap_or_default())
}

fn decode_cursor(s: &str) -> Result<Cursor> {
	let bytes = hex::decode(s).map_err(|_| Error::Validation("invalid cursor".into()))?;
	serde_json::from_slice(&bytes).map_err(|_| Error::Validation("invalid cursor".into()))
}

pub async fn find<C: ConnectionTrait>(conn: &C, query: &FindQuery) -> Result<FindPage> {
	let limit = if query.limit == 0 {
		DEFAULT_LIMIT
	} else {
		query.limit
	};
	let mut page = FindPage::default();

	// Containers come back on the first page only; the cursor continues the
	// task stream.
	if matches!(query.target, FindTarget::Containers | FindTarget::Both)
		&& query.cursor.is_none()
	{
		page.containers = find_containers(conn, query).await?;
	}
	if matches!(query.target, FindTarget::Tasks | FindTarget::Both) {
		let hits = find_tasks(conn, query, limit).await?;
		if hits.len() as u64 == limit {
			if let Some(last) = hits.last() {
				page.next_cursor = Some(encode_cursor(&Cursor {
					s: last.sort_text.clone(),
					id: last.friendly_id.clone(),
				}));
			}
		}
		page.tasks = hits;
	}
	Ok(page)
}

async fn find_tasks<C: ConnectionTrait>(
	conn: &C,
	query: &FindQuery,
	limit: u64,
) -> Result<Vec<TaskHit>> {
	let sort = query.sort.expr();
	let mut conds: Vec<String> = Vec::new();
	let mut values: Vec<Value> = Vec::new();

	if !query.paths.is_empty() {
		let mut ors = Vec::new();
		for p in &query.paths {
			ors.push("(p.path = ? OR p.path LIKE ?)".to_owned());
			values.push(p.clone().into());
			values.push(format!("{p}/%").into());
		}
		conds.push(format!("({})", ors.join(" OR ")));
	}
	if let Some(glob) = &query.slug_glob {
		conds.push("t.slug GLOB ?".to_owned());
		values.push(glob.clone().into());
	}
	match query.state.as_deref() {
		None | Some("") | Some("active") => {
			conds.push("t.state NOT IN ('archived', 'deleted')".to_owned());
		}
		Some("all") => {}
		Some("deleted") => conds.push("t.state = 'deleted'".to_owned()),
		Some(other) => {
			let state = parse_state(other)?;
			conds.push("t.state = ?".to_owned());
			values.push(state.to_string().into());
		}
	}
	if let Some(kind) = &query.kind {
		let kind = parse_task_kind(kind)?;
		conds.push("t.kind = ?".to_owned());
		values.push(kind.to_string().into());
	}
	if let Some(assignee) = query.assignee {
		conds.push("t.assignee_actor_uuid = ?".to_owned());
		values.push(assignee.into());
	}
	if let Some(parent) = query.parent_task {
		conds.push("t.parent_task_uuid = ?".to_owned());
		values.push(parent.into());
	}
	if let Some(before) = query.due_before {
		conds.push("t.due_at IS NOT NULL AND t.due_at < ?".to_owned());
		values.push(before.into());
	}
	if let Some(after) = query.due_after {
		conds.push("t.due_at IS NOT NULL AND t.due_at > ?".to_owned());
		values.push(after.into());
	}
	if let Some(cursor) = &query.cursor {
		let cursor = decode_cursor(cursor)?;
		conds.push(format!(
			"({sort} > ? OR ({sort} = ? AND t.friendly_id > ?))"
		));
		values.push(cursor.s.clone().into());
		values.push(cursor.s.into());
		values.push(cursor.id.into());
	}

	let where_clause = if conds.is_empty() {
		String::new()
	} else {
		format!("WHERE {}", conds.join(" AND "))
	};
	let sql = format!(
		"SELECT p.path AS path, t.uuid AS uuid, t.friendly_id AS friendly_id, \
		        t.slug AS slug, t.title AS title, t.state AS state, \
		        t.priority AS priority, t.kind AS kind, \
		        t.assignee_actor_uuid AS assignee_actor_uuid, t.due_at AS due_at, \
		        t.updated_at AS updated_at, t.etag AS etag, {sort} AS sort_text \
		 FROM tasks t JOIN v_task_paths p ON p.uuid = t.uuid \
		 {where_clause} \
		 ORDER BY {sort} ASC, t.friendly_id ASC \
		 LIMIT {limit}"
	);
	Ok(TaskHit::find_by_statement(Statement::from_sql_and_values(
		DatabaseBackend::Sqlite,
		sql,
		values,
	))
	.all(conn)
	.await?)
}

async fn find_containers<C: ConnectionTrait>(
	conn: &C,
	query: &FindQuery,
) -> Result<Vec<ContainerHit>> {
	let mut conds: Vec<String> = Vec::new();
	let mut values: Vec<Value> = Vec::new();

	if !query.paths.is_empty() {
		let mut ors = Vec::new();
		for p in &query.paths {
			ors.push("(p.path = ? OR p.path LIKE ?)".to_owned());
			values.push(p.clone().into());
			values.push(format!("{p}/%").into());
		}
		conds.push(format!("({})", ors.join(" OR ")));
	}
	if let Some(glob) = &query.slug_glob {
		conds.push("c.slug GLOB ?".to_owned());
		values.push(glob.clone().into());
	}
	match query.state.as_deref() {
		None | Some("") | Some("active") => conds.push("c.archived_at IS NULL".to_owned()),
		Some("all") => {}
		// Containers have no deleted state; that pseudo-state matches none.
		Some("deleted") => return Ok(Vec::new()),
		Some(_) => return Ok(Vec::new()),
	}
	if let Some(kind) = &query.kind {
		if let Ok(kind) = parse_container_kind(kind) {
			conds.push("c.kind = ?".to_owned());
			values.push(kind.to_string().into());
		} else {
			// A task-only kind filter excludes every container.
			return Ok(Vec::new());
		}
	}

	let where_clause = if conds.is_empty() {
		String::new()
	} else {
		format!("WHERE {}", conds.join(" AND "))
	};
	let sql = format!(
		"SELECT p.path AS path, c.uuid AS uuid, c.friendly_id AS friendly_id, \
		        c.slug AS slug, c.title AS title, c.kind AS kind, \
		        c.archived_at IS NOT NULL AS archived, c.etag AS etag \
		 FROM containers c JOIN v_container_paths p ON p.uuid = c.uuid \
		 {where_clause} \
		 ORDER BY p.path ASC"
	);
	Ok(
		ContainerHit::find_by_statement(Statement::from_sql_and_values(
			DatabaseBackend::Sqlite,
			sql,
			values,
		))
		.all(conn)
		.await?,
	)
}
