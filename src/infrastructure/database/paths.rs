//! Readers over the computed path views.
//!
//! `v_container_paths` and `v_task_paths` project full path strings with a
//! recursive CTE so paths never drift from the parent chain.

use crate::shared::Result;
use sea_orm::{ConnectionTrait, DatabaseBackend, FromQueryResult, Statement};
use uuid::Uuid;

#[derive(Debug, Clone, FromQueryResult)]
pub struct PathRow {
	pub uuid: Uuid,
	pub path: String,
}

pub async fn container_path<C: ConnectionTrait>(conn: &C, uuid: Uuid) -> Result<Option<String>> {
	let rows = PathRow::find_by_statement(Statement::from_sql_and_values(
		DatabaseBackend::Sqlite,
		"SELECT uuid, path FROM v_container_paths WHERE uuid = ?",
		[uuid.into()],
	))
	.all(conn)
	.await?;
	Ok(rows.into_iter().next().map(|r| r.path))
}

pub async fn task_path<C: ConnectionTrait>(conn: &C, uuid: Uuid) -> Result<Option<String>> {
	let rows = PathRow::find_by_statement(Statement::from_sql_and_values(
		DatabaseBackend::Sqlite,
		"SELECT uuid, path FROM v_task_paths WHERE uuid = ?",
		[uuid.into()],
	))
	.all(conn)
	.await?;
	Ok(rows.into_iter().next().map(|r| r.path))
}

pub async fn container_uuid_by_path<C: ConnectionTrait>(
	conn: &C,
	path: &str,
) -> Result<Option<Uuid>> {
	let rows = PathRow::find_by_statement(Statement::from_sql_and_values(
		DatabaseBackend::Sqlite,
		"SELECT uuid, path FROM v_container_paths WHERE path = ?",
		[path.into()],
	))
	.all(conn)
	.await?;
	Ok(rows.into_iter().next().map(|r| r.uuid))
}

/// All container paths at or under `prefix` (the whole tree when `None`),
/// ordered by path.
pub async fn container_paths_under<C: ConnectionTrait>(
	conn: &C,
	prefix: Option<&str>,
) -> Result<Vec<PathRow>> {
	let stmt = match prefix {
		Some(p) => Statement::from_sql_and_values(
			DatabaseBackend::Sqlite,
			"SELECT uuid, path FROM v_container_paths \
			 WHERE path = ? OR path LIKE ? ORDER BY path",
			[p.into(), format!("{p}/%").into()],
		),
		None => Statement::from_string(
			DatabaseBackend::Sqlite,
			"SELECT uuid, path FROM v_container_paths ORDER BY path",
		),
	};
	Ok(PathRow::find_by_statement(stmt).all(conn).await?)
}

/// Task paths for every task in the given project containers.
pub async fn task_paths_in<C: ConnectionTrait>(
	conn: &C,
	project_uuids: &[Uuid],
) -> Result<Vec<PathRow>> {
	let mut out = Vec::new();
	for chunk in project_uuids.chunks(100) {
		let marks = vec!["?"; chunk.len()].join(", ");
		let stmt = Statement::from_sql_and_values(
			DatabaseBackend::Sqlite,
			format!(
				"SELECT p.uuid AS uuid, p.path AS path FROM v_task_paths p \
				 JOIN tasks t ON t.uuid = p.uuid \
				 WHERE t.project_uuid IN ({marks}) ORDER BY p.path"
			),
			chunk.iter().map(|u| (*u).into()),
		);
		out.extend(PathRow::find_by_statement(stmt).all(conn).await?);
	}
	Ok(out)
}
