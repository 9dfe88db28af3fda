//! Path and selector resolution.
//!
//! External references come in four shapes: friendly ID (`T-00042`), UUID,
//! slash-separated path (`portal/auth/login`), and typed prefix (`t:`, `c:`,
//! `a:`). Resolution order is friendly ID, UUID, then path. A configured
//! project root is prefixed onto paths that do not already carry it.

use crate::domain::ident::{friendly_kind, is_uuid, normalize_slug, IdKind};
use crate::infrastructure::database::entities::{actor, container, task, Actor, Container, Task};
use crate::infrastructure::database::paths;
use crate::shared::{Error, ResourceKind, Result};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct Resolver {
	/// Optional root path prepended to un-rooted path references.
	pub project_root: Option<String>,
}

impl Resolver {
	pub fn new(project_root: Option<String>) -> Self {
		Self { project_root }
	}

	/// Prefixes the configured project root onto `path` unless it is already
	/// rooted. Strict mode rejects already-rooted paths instead of passing
	/// them through.
	pub fn apply_project_root(&self, path: &str, strict: bool) -> Result<String> {
		let Some(root) = &self.project_root else {
			return Ok(path.to_owned());
		};
		let rooted = path == root || path.starts_with(&format!("{root}/"));
		if rooted {
			if strict {
				return Err(Error::Validation(format!(
					"path {path:?} already begins with project root {root:?}"
				)));
			}
			return Ok(path.to_owned());
		}
		Ok(format!("{root}/{path}"))
	}

	pub async fn resolve_task(&self, conn: &DatabaseConnection, r: &str) -> Result<task::Model> {
		let r = check_prefix(r, "t:", ResourceKind::Task)?;

		if let Some(kind) = friendly_kind(r) {
			if kind != IdKind::Task {
				return Err(wrong_friendly(r, ResourceKind::Task, kind));
			}
			return Task::find()
				.filter(task::Column::FriendlyId.eq(r))
				.one(conn)
				.await?
				.ok_or_else(|| Error::not_found(ResourceKind::Task, r));
		}

		if is_uuid(r) {
			let uuid = parse_uuid(r)?;
			return Task::find()
				.filter(task::Column::Uuid.eq(uuid))
				.one(conn)
				.await?
				.ok_or_else(|| Error::not_found(ResourceKind::Task, r));
		}

		let path = self.apply_project_root(r, false)?;
		let segments = split_path(&path)?;
		if segments.len() < 2 {
			// A bare slug cannot name a task; it may still name a container.
			if self.lookup_root_container(conn, &segments[0]).await?.is_some() {
				return Err(Error::WrongKind {
					reference: r.to_owned(),
					expected: ResourceKind::Task,
					actual: ResourceKind::Container,
				});
			}
			return Err(Error::not_found(ResourceKind::Task, r));
		}
		let Some((leaf, parents)) = segments.split_last() else {
			return Err(Error::not_found(ResourceKind::Task, r));
		};
		let parent = self.walk_containers(conn, parents, r).await?;
		if let Some(found) = Task::find()
			.filter(task::Column::ProjectUuid.eq(parent.uuid))
			.filter(task::Column::Slug.eq(leaf.as_str()))
			.one(conn)
			.await?
		{
			return Ok(found);
		}
		// The leaf may name a sub-container instead of a task.
		if self.lookup_child_container(conn, parent.uuid, leaf).await?.is_some() {
			return Err(Error::WrongKind {
				reference: r.to_owned(),
				expected: ResourceKind::Task,
				actual: ResourceKind::Container,
			});
		}
		Err(Error::not_found(ResourceKind::Task, r))
	}

	/// Resolves to a container and its full computed path.
	pub async fn resolve_container(
		&self,
		conn: &DatabaseConnection,
		r: &str,
	) -> Result<(container::Model, String)> {
		let r = check_prefix(r, "c:", ResourceKind::Container)?;

		let row = if let Some(kind) = friendly_kind(r) {
			if kind != IdKind::Container {
				return Err(wrong_friendly(r, ResourceKind::Container, kind));
			}
			Container::find()
				.filter(container::Column::FriendlyId.eq(r))
				.one(conn)
				.await?
				.ok_or_else(|| Error::not_found(ResourceKind::Container, r))?
		} else if is_uuid(r) {
			let uuid = parse_uuid(r)?;
			Container::find()
				.filter(container::Column::Uuid.eq(uuid))
				.one(conn)
				.await?
				.ok_or_else(|| Error::not_found(ResourceKind::Container, r))?
		} else {
			let path = self.apply_project_root(r, false)?;
			let segments = split_path(&path)?;
			self.walk_containers(conn, &segments, r).await?
		};

		let path = paths::container_path(conn, row.uuid)
			.await?
			.ok_or_else(|| Error::Integrity(format!("container {} has no path", row.uuid)))?;
		Ok((row, path))
	}

	pub async fn resolve_actor(&self, conn: &DatabaseConnection, r: &str) -> Result<actor::Model> {
		let r = check_prefix(r, "a:", ResourceKind::Actor)?;

		if let Some(kind) = friendly_kind(r) {
			if kind != IdKind::Actor {
				return Err(wrong_friendly(r, ResourceKind::Actor, kind));
			}
			return Actor::find()
				.filter(actor::Column::FriendlyId.eq(r))
				.one(conn)
				.await?
				.ok_or_else(|| Error::not_found(ResourceKind::Actor, r));
		}
		if is_uuid(r) {
			let uuid = parse_uuid(r)?;
			return Actor::find()
				.filter(actor::Column::Uuid.eq(uuid))
				.one(conn)
				.await?
				.ok_or_else(|| Error::not_found(ResourceKind::Actor, r));
		}
		Actor::find()
			.filter(actor::Column::Slug.eq(r))
			.one(conn)
			.await?
			.ok_or_else(|| Error::not_found(ResourceKind::Actor, r))
	}

	/// Splits `path` into an existing parent container (None for root) and
	/// the normalized leaf slug, the shape container/task creation wants.
	pub async fn resolve_parent_container(
		&self,
		conn: &DatabaseConnection,
		path: &str,
	) -> Result<(Option<Uuid>, String)> {
		let path = self.apply_project_root(path, false)?;
		let segments = split_path(&path)?;
		let Some((leaf, parents)) = segments.split_last() else {
			return Err(Error::Validation(format!("empty path reference: {path:?}")));
		};
		if parents.is_empty() {
			return Ok((None, leaf.clone()));
		}
		let parent = self.walk_containers(conn, parents, &path).await?;
		Ok((Some(parent.uuid), leaf.clone()))
	}

	async fn walk_containers(
		&self,
		conn: &DatabaseConnection,
		segments: &[String],
		reference: &str,
	) -> Result<container::Model> {
		let mut current: Option<container::Model> = None;
		for seg in segments {
			let next = match &current {
				None => self.lookup_root_container(conn, seg).await?,
				Some(parent) => self.lookup_child_container(conn, parent.uuid, seg).await?,
			};
			current = Some(
				next.ok_or_else(|| Error::not_found(ResourceKind::Container, reference))?,
			);
		}
		current.ok_or_else(|| Error::not_found(ResourceKind::Container, reference))
	}

	/// Root containers matching a bare slug resolve to the first row by
	/// friendly-ID order, a deliberate `LIMIT 1`.
	async fn lookup_root_container(
		&self,
		conn: &DatabaseConnection,
		slug: &str,
	) -> Result<Option<container::Model>> {
		Ok(Container::find()
			.filter(container::Column::ParentUuid.is_null())
			.filter(container::Column::Slug.eq(slug))
			.order_by_asc(container::Column::FriendlyId)
			.one(conn)
			.await?)
	}

	async fn lookup_child_container(
		&self,
		conn: &DatabaseConnection,
		parent: Uuid,
		slug: &str,
	) -> Result<Option<container::Model>> {
		Ok(Container::find()
			.filter(container::Column::ParentUuid.eq(parent))
			.filter(container::Column::Slug.eq(slug))
			.one(conn)
			.await?)
	}
}

/// Strips the matching typed prefix; a mismatched prefix is a usage error.
fn check_prefix<'a>(r: &'a str, expected: &str, want: ResourceKind) -> Result<&'a str> {
	for (prefix, kind) in [
		("t:", ResourceKind::Task),
		("c:", ResourceKind::Container),
		("a:", ResourceKind::Actor),
	] {
		if let Some(rest) = r.strip_prefix(prefix) {
			if prefix == expected {
				return Ok(rest);
			}
			return Err(Error::WrongKind {
				reference: r.to_owned(),
				expected: want,
				actual: kind,
			});
		}
	}
	Ok(r)
}

fn parse_uuid(r: &str) -> Result<Uuid> {
	Uuid::parse_str(r).map_err(|e| Error::Validation(format!("invalid uuid {r:?}: {e}")))
}

fn wrong_friendly(r: &str, expected: ResourceKind, actual: IdKind) -> Error {
	let actual = match actual {
		IdKind::Task => ResourceKind::Task,
		IdKind::Container => ResourceKind::Container,
		IdKind::Actor => ResourceKind::Actor,
		IdKind::Comment => ResourceKind::Comment,
		IdKind::Attachment => ResourceKind::Attachment,
	};
	Error::WrongKind {
		reference: r.to_owned(),
		expected,
		actual,
	}
}

/// Splits a path reference into normalized slug segments. Both `/` and `.`
/// separate segments; empty paths are rejected.
fn split_path(path: &str) -> Result<Vec<String>> {
	let raw: Vec<&str> = path
		.split(['/', '.'])
		.filter(|s| !s.is_empty())
		.collect();
	if raw.is_empty() {
		return Err(Error::Validation(format!("empty path reference: {path:?}")));
	}
	raw.into_iter().map(normalize_slug).collect()
}
