//! Portable per-project bundles.
//!
//! A bundle is a directory: `manifest.json`, `containers.json` (ordered
//! paths to ensure), `tasks/<uuid>.md` (front-matter markdown),
//! `attachments/<task-uuid>/…`, and optionally `events.ndjson`. Apply walks
//! the archive and feeds the normal store surfaces; attachments go through
//! the attachment service directly.

use crate::domain::fields::{
	parse_state, parse_task_kind, validate_priority, ContainerKind, TaskState,
};
use crate::domain::ident::IdKind;
use crate::infrastructure::database::entities::{
	attachment, container, event, task, Attachment, Container, Event, Task,
};
use crate::infrastructure::database::{next_friendly_id, paths};
use crate::infrastructure::events::{log_event, EventKind, NewEvent};
use crate::operations::{actors, attachments, containers, taskdoc};
use crate::shared::{Error, ResourceKind, Result};
use crate::MACHINE_INTERFACE_VERSION;
use chrono::{DateTime, Utc};
use sea_orm::{
	ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
	EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleManifest {
	pub machine_interface_version: String,
	pub version: String,
	pub created_at: DateTime<Utc>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub project_uuid: Option<Uuid>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub project_path: Option<String>,
	pub with_attachments: bool,
	pub with_events: bool,
	pub containers: usize,
	pub tasks: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BundleCreateOptions {
	pub with_attachments: bool,
	pub with_events: bool,
}

pub async fn create(
	conn: &DatabaseConnection,
	project_uuid: Uuid,
	dir: &Path,
	attach_dir: &Path,
	opts: BundleCreateOptions,
) -> Result<BundleManifest> {
	let subtree = containers::collect_subtree(conn, project_uuid).await?;
	let project_path = paths::container_path(conn, project_uuid)
		.await?
		.ok_or_else(|| Error::Integrity(format!("container {project_uuid} has no path")))?;

	let mut container_paths = Vec::with_capacity(subtree.len());
	for c in &subtree {
		let p = paths::container_path(conn, c.uuid)
			.await?
			.ok_or_else(|| Error::Integrity(format!("container {} has no path", c.uuid)))?;
		container_paths.push(p);
	}
	container_paths.sort();

	std::fs::create_dir_all(dir.join("tasks"))?;
	std::fs::write(
		dir.join("containers.json"),
		format!("{}\n", serde_json::to_string_pretty(&container_paths)?),
	)?;

	let subtree_uuids: Vec<Uuid> = subtree.iter().map(|c| c.uuid).collect();
	let mut tasks = Vec::new();
	for chunk in subtree_uuids.chunks(100) {
		tasks.extend(
			Task::find()
				.filter(task::Column::ProjectUuid.is_in(chunk.iter().copied()))
				.order_by_asc(task::Column::FriendlyId)
				.all(conn)
				.await?,
		);
	}

	for t in &tasks {
		let doc_path = dir.join("tasks").join(format!("{}.md", t.uuid));
		let assignee = match t.assignee_actor_uuid {
			Some(u) => Some(actors::get(conn, u).await?.slug),
			None => None,
		};
		let full_path = paths::task_path(conn, t.uuid)
			.await?
			.ok_or_else(|| Error::Integrity(format!("task {} has no path", t.uuid)))?;
		let labels: Vec<String> =
			serde_json::from_value(t.labels.clone()).unwrap_or_default();
		let front = taskdoc::FrontMatter {
			uuid: Some(t.uuid),
			id: Some(t.friendly_id.clone()),
			path: Some(full_path),
			updated_at: Some(t.updated_at),
			title: Some(t.title.clone()),
			state: Some(t.state.clone()),
			priority: Some(t.priority as i64),
			kind: Some(t.kind.clone()),
			due_at: t.due_at,
			start_at: t.start_at,
			labels: Some(labels),
			meta: Some(t.meta.clone()),
			assignee,
		};
		std::fs::write(&doc_path, taskdoc::render(&front, &t.description)?)?;
	}

	if opts.with_attachments {
		for t in &tasks {
			let rows = Attachment::find()
				.filter(attachment::Column::TaskUuid.eq(t.uuid))
				.all(conn)
				.await?;
			for a in rows {
				let src = attach_dir.join(&a.rel_path);
				let dest = dir.join("attachments").join(t.uuid.to_string()).join(&a.filename);
				if let Some(parent) = dest.parent() {
					std::fs::create_dir_all(parent)?;
				}
				if let Err(e) = std::fs::copy(&src, &dest) {
					warn!("skipping attachment {:?}: {e}", src);
				}
			}
		}
	}

	if opts.with_events {
		let mut uuids: HashSet<Uuid> = subtree_uuids.iter().copied().collect();
		uuids.extend(tasks.iter().map(|t| t.uuid));
		let events = Event::find()
			.order_by_asc(event::Column::Id)
			.all(conn)
			.await?;
		let mut lines = String::new();
		for e in events {
			if uuids.contains(&e.resource_uuid) {
				lines.push_str(&serde_json::to_string(&e)?);
				lines.push('\n');
			}
		}
		std::fs::write(dir.join("events.ndjson"), lines)?;
	}

	let manifest = BundleManifest {
		machine_interface_version: MACHINE_INTERFACE_VERSION.into(),
		version: env!("CARGO_PKG_VERSION").into(),
		created_at: Utc::now(),
		project_uuid: Some(project_uuid),
		project_path: Some(project_path),
		with_attachments: opts.with_attachments,
		with_events: opts.with_events,
		containers: container_paths.len(),
		tasks: tasks.len(),
	};
	std::fs::write(
		dir.join("manifest.json"),
		format!("{}\n", serde_json::to_string_pretty(&manifest)?),
	)?;
	Ok(manifest)
}

#[derive(Debug, Clone, Default)]
pub struct BundleApplyOptions {
	/// Per-item transactions with a conflict report instead of
	/// all-or-nothing.
	pub continue_on_error: bool,
	/// Re-root the donor project under a different canonical path.
	pub dest_root: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct ApplyReport {
	pub containers_ensured: usize,
	pub tasks_created: usize,
	pub tasks_updated: usize,
	pub tasks_skipped: usize,
	pub attachments_applied: usize,
	pub errors: Vec<String>,
}

pub async fn apply(
	conn: &DatabaseConnection,
	actor: Uuid,
	dir: &Path,
	attach_dir: &Path,
	opts: BundleApplyOptions,
) -> Result<ApplyReport> {
	let manifest: BundleManifest =
		serde_json::from_str(&std::fs::read_to_string(dir.join("manifest.json"))?)
			.map_err(|e| Error::Validation(format!("invalid manifest.json: {e}")))?;
	if manifest.machine_interface_version != MACHINE_INTERFACE_VERSION {
		return Err(Error::Validation(format!(
			"machine interface version mismatch: bundle {}, engine {}",
			manifest.machine_interface_version, MACHINE_INTERFACE_VERSION
		)));
	}

	let container_paths: Vec<String> =
		serde_json::from_str(&std::fs::read_to_string(dir.join("containers.json"))?)
			.map_err(|e| Error::Validation(format!("invalid containers.json: {e}")))?;
	let donor_root = manifest
		.project_path
		.clone()
		.or_else(|| container_paths.first().cloned())
		.ok_or_else(|| Error::Validation("bundle has no project path".into()))?;
	let dest_root = opts.dest_root.clone().unwrap_or_else(|| donor_root.clone());
	let map_path = |p: &str| -> String {
		if p == donor_root {
			dest_root.clone()
		} else if let Some(rest) = p.strip_prefix(&format!("{donor_root}/")) {
			format!("{dest_root}/{rest}")
		} else {
			p.to_owned()
		}
	};

	let mut report = ApplyReport::default();
	let task_docs = read_task_docs(dir)?;

	if opts.continue_on_error {
		for p in &container_paths {
			let mapped = map_path(p);
			let txn = conn.begin().await?;
			match ensure_container_path(&txn, actor, &mapped).await {
				Ok(created) => {
					txn.commit().await?;
					report.containers_ensured += created;
				}
				Err(e) => {
					txn.rollback().await?;
					report.errors.push(format!("container {mapped}: {e}"));
				}
			}
		}
		for (uuid, doc) in &task_docs {
			let txn = conn.begin().await?;
			match apply_task_doc(&txn, actor, *uuid, doc, &map_path).await {
				Ok(outcome) => {
					txn.commit().await?;
					outcome.count(&mut report);
				}
				Err(e) => {
					txn.rollback().await?;
					report.errors.push(format!("task {uuid}: {e}"));
				}
			}
		}
	} else {
		let txn = conn.begin().await?;
		for p in &container_paths {
			report.containers_ensured += ensure_container_path(&txn, actor, &map_path(p)).await?;
		}
		for (uuid, doc) in &task_docs {
			let outcome = apply_task_doc(&txn, actor, *uuid, doc, &map_path).await?;
			outcome.count(&mut report);
		}
		txn.commit().await?;
	}

	// Attachments are re-materialized through the normal put surface.
	let attach_root = dir.join("attachments");
	if attach_root.is_dir() {
		for entry in walkdir::WalkDir::new(&attach_root)
			.min_depth(2)
			.max_depth(2)
			.sort_by_file_name()
		{
			let entry = entry.map_err(|e| {
				Error::Validation(format!("unreadable bundle attachment: {e}"))
			})?;
			if !entry.file_type().is_file() {
				continue;
			}
			let task_uuid = entry
				.path()
				.parent()
				.and_then(|p| p.file_name())
				.and_then(|n| n.to_str())
				.and_then(|s| Uuid::parse_str(s).ok());
			let filename = entry.file_name().to_str().map(str::to_owned);
			let (Some(task_uuid), Some(filename)) = (task_uuid, filename) else {
				report
					.errors
					.push(format!("unrecognized attachment path: {:?}", entry.path()));
				continue;
			};
			let data = std::fs::read(entry.path())?;
			match attachments::put(conn, actor, task_uuid, &filename, None, &data, attach_dir)
				.await
			{
				Ok(_) => report.attachments_applied += 1,
				Err(e) if opts.continue_on_error => {
					report.errors.push(format!("attachment {filename}: {e}"));
				}
				Err(e) => return Err(e),
			}
		}
	}

	Ok(report)
}

fn read_task_docs(dir: &Path) -> Result<Vec<(Uuid, taskdoc::TaskDocFile)>> {
	let tasks_dir = dir.join("tasks");
	let mut docs = Vec::new();
	if !tasks_dir.is_dir() {
		return Ok(docs);
	}
	let mut entries: Vec<_> = std::fs::read_dir(&tasks_dir)?
		.collect::<std::io::Result<Vec<_>>>()?;
	entries.sort_by_key(|e| e.file_name());
	for entry in entries {
		let name = entry.file_name();
		let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".md")) else {
			continue;
		};
		let uuid = Uuid::parse_str(stem)
			.map_err(|_| Error::Validation(format!("task document is not named by uuid: {name:?}")))?;
		let doc = taskdoc::parse(&std::fs::read_to_string(entry.path())?)?;
		docs.push((uuid, doc));
	}
	Ok(docs)
}

enum TaskOutcome {
	Created,
	Updated,
	Skipped,
}

impl TaskOutcome {
	fn count(&self, report: &mut ApplyReport) {
		match self {
			TaskOutcome::Created => report.tasks_created += 1,
			TaskOutcome::Updated => report.tasks_updated += 1,
			TaskOutcome::Skipped => report.tasks_skipped += 1,
		}
	}
}

/// Ensures every container along `path` exists; returns how many were
/// created. The first segment is created as a project, the rest as folders.
async fn ensure_container_path<C: ConnectionTrait>(
	conn: &C,
	actor: Uuid,
	path: &str,
) -> Result<usize> {
	let mut created = 0;
	let mut parent: Option<Uuid> = None;
	let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
	if segments.is_empty() {
		return Err(Error::Validation(format!("empty container path: {path:?}")));
	}
	for (i, seg) in segments.iter().enumerate() {
		let query = match parent {
			Some(p) => Container::find().filter(container::Column::ParentUuid.eq(p)),
			None => Container::find().filter(container::Column::ParentUuid.is_null()),
		};
		let existing = query
			.filter(container::Column::Slug.eq(*seg))
			.order_by_asc(container::Column::FriendlyId)
			.one(conn)
			.await?;
		let next = match existing {
			Some(c) => c,
			None => {
				let kind = if i == 0 {
					ContainerKind::Project
				} else {
					ContainerKind::Folder
				};
				created += 1;
				containers::create_in(
					conn,
					actor,
					containers::ContainerCreate {
						parent_uuid: parent,
						slug: Some((*seg).to_owned()),
						title: (*seg).to_owned(),
						kind,
						description: String::new(),
						sort_index: 0,
						webhook_urls: Vec::new(),
					},
				)
				.await?
			}
		};
		parent = Some(next.uuid);
	}
	parent
		.map(|_| created)
		.ok_or_else(|| Error::Validation(format!("empty container path: {path:?}")))
}

async fn apply_task_doc<C: ConnectionTrait>(
	conn: &C,
	actor: Uuid,
	uuid: Uuid,
	doc: &taskdoc::TaskDocFile,
	map_path: &impl Fn(&str) -> String,
) -> Result<TaskOutcome> {
	let front = doc
		.front
		.as_ref()
		.ok_or_else(|| Error::Validation("task document has no front matter".into()))?;
	let donor_path = front
		.path
		.as_deref()
		.ok_or_else(|| Error::Validation("task document has no path".into()))?;
	let mapped = map_path(donor_path);
	let (container_path, donor_slug) = mapped
		.rsplit_once('/')
		.ok_or_else(|| Error::Validation(format!("task path has no container: {mapped:?}")))?;
	let container_uuid = resolve_container_path(conn, container_path).await?;

	let state = front.state.as_deref().unwrap_or("open");
	parse_state(state)?;
	let kind = front.kind.as_deref().unwrap_or("task");
	parse_task_kind(kind)?;
	let priority = validate_priority(front.priority.unwrap_or(2))?;
	let title = front
		.title
		.clone()
		.ok_or_else(|| Error::Validation("task document has no title".into()))?;
	let assignee = match &front.assignee {
		Some(slug) => Some(resolve_assignee(conn, slug).await?),
		None => None,
	};
	let donor_updated = front.updated_at.unwrap_or_else(Utc::now);

	let existing = Task::find()
		.filter(task::Column::Uuid.eq(uuid))
		.one(conn)
		.await?;

	match existing {
		Some(host) => {
			// UUID collision: the newer side wins.
			if host.updated_at >= donor_updated {
				return Ok(TaskOutcome::Skipped);
			}
			let new_etag = host.etag + 1;
			let mut active: task::ActiveModel = host.into();
			active.title = Set(title);
			active.state = Set(state.to_owned());
			active.priority = Set(priority);
			active.kind = Set(kind.to_owned());
			active.description = Set(doc.body.clone());
			active.labels = Set(serde_json::json!(front.labels.clone().unwrap_or_default()));
			active.meta = Set(front.meta.clone().unwrap_or_else(|| serde_json::json!({})));
			active.due_at = Set(front.due_at);
			active.start_at = Set(front.start_at);
			active.assignee_actor_uuid = Set(assignee);
			active.project_uuid = Set(container_uuid);
			active.etag = Set(new_etag);
			active.updated_at = Set(donor_updated);
			active.updated_by_actor_uuid = Set(Some(actor));
			let row = active.update(conn).await?;
			log_event(
				conn,
				NewEvent {
					actor_uuid: Some(actor),
					resource: ResourceKind::Task,
					resource_uuid: row.uuid,
					kind: EventKind::Updated,
					etag: Some(new_etag),
					payload: Some(serde_json::json!({ "source": "bundle" })),
				},
			)
			.await?;
			Ok(TaskOutcome::Updated)
		}
		None => {
			let slug = free_slug(conn, container_uuid, donor_slug).await?;
			let friendly = next_friendly_id(conn, IdKind::Task).await?;
			let now = Utc::now();
			let state_parsed = parse_state(state)?;
			let row = task::ActiveModel {
				uuid: Set(uuid),
				friendly_id: Set(friendly),
				slug: Set(slug),
				title: Set(title),
				description: Set(doc.body.clone()),
				state: Set(state.to_owned()),
				priority: Set(priority),
				kind: Set(kind.to_owned()),
				project_uuid: Set(container_uuid),
				assignee_actor_uuid: Set(assignee),
				start_at: Set(front.start_at),
				due_at: Set(front.due_at),
				labels: Set(serde_json::json!(front.labels.clone().unwrap_or_default())),
				meta: Set(front.meta.clone().unwrap_or_else(|| serde_json::json!({}))),
				etag: Set(1),
				created_by_actor_uuid: Set(actor),
				created_at: Set(now),
				updated_at: Set(donor_updated),
				completed_at: Set(matches!(state_parsed, TaskState::Completed).then_some(now)),
				archived_at: Set(matches!(state_parsed, TaskState::Archived).then_some(now)),
				deleted_at: Set(matches!(state_parsed, TaskState::Deleted).then_some(now)),
				..Default::default()
			}
			.insert(conn)
			.await?;
			log_event(
				conn,
				NewEvent {
					actor_uuid: Some(actor),
					resource: ResourceKind::Task,
					resource_uuid: row.uuid,
					kind: EventKind::Created,
					etag: Some(1),
					payload: Some(serde_json::json!({
						"slug": row.slug,
						"source": "bundle",
						"title": row.title,
					})),
				},
			)
			.await?;
			Ok(TaskOutcome::Created)
		}
	}
}

/// Donor slug, suffixed `--dup-N` when a different task already owns it in
/// the target container.
async fn free_slug<C: ConnectionTrait>(
	conn: &C,
	container_uuid: Uuid,
	slug: &str,
) -> Result<String> {
	let taken = |candidate: String| async move {
		Ok::<_, Error>(
			Task::find()
				.filter(task::Column::ProjectUuid.eq(container_uuid))
				.filter(task::Column::Slug.eq(candidate))
				.one(conn)
				.await?
				.is_some(),
		)
	};
	if !taken(slug.to_owned()).await? {
		return Ok(slug.to_owned());
	}
	for n in 2..=1000 {
		let candidate = format!("{slug}--dup-{n}");
		if !taken(candidate.clone()).await? {
			return Ok(candidate);
		}
	}
	Err(Error::Conflict(format!(
		"could not find a free slug for {slug} in container {container_uuid}"
	)))
}

async fn resolve_container_path<C: ConnectionTrait>(conn: &C, path: &str) -> Result<Uuid> {
	paths::container_uuid_by_path(conn, path)
		.await?
		.ok_or_else(|| Error::not_found(ResourceKind::Container, path))
}

async fn resolve_assignee<C: ConnectionTrait>(conn: &C, slug: &str) -> Result<Uuid> {
	use crate::infrastructure::database::entities::{actor, Actor};
	Ok(Actor::find()
		.filter(actor::Column::Slug.eq(slug))
		.one(conn)
		.await?
		.ok_or_else(|| Error::not_found(ResourceKind::Actor, slug))?
		.uuid)
}
