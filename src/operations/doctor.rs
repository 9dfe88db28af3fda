//! Health checks ("doctor").
//!
//! A suite of independent checks, each tri-state, rolled up to the worst
//! status. Only this component surfaces Integrity findings; it never mutates
//! anything.

use crate::domain::ident::IdKind;
use crate::infrastructure::database::entities::Attachment;
use crate::infrastructure::database::Database;
use crate::shared::Result;
use sea_orm::{ConnectionTrait, DatabaseBackend, EntityTrait, Statement};
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
	Ok,
	Warning,
	Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
	pub name: &'static str,
	pub status: CheckStatus,
	pub message: String,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub details: Vec<String>,
}

impl CheckResult {
	fn ok(name: &'static str, message: impl Into<String>) -> Self {
		Self {
			name,
			status: CheckStatus::Ok,
			message: message.into(),
			details: Vec::new(),
		}
	}

	fn warn(name: &'static str, message: impl Into<String>, details: Vec<String>) -> Self {
		Self {
			name,
			status: CheckStatus::Warning,
			message: message.into(),
			details,
		}
	}

	fn error(name: &'static str, message: impl Into<String>, details: Vec<String>) -> Self {
		Self {
			name,
			status: CheckStatus::Error,
			message: message.into(),
			details,
		}
	}
}

#[derive(Debug, Serialize)]
pub struct DoctorReport {
	pub status: CheckStatus,
	pub checks: Vec<CheckResult>,
}

const REQUIRED_TABLES: &[&str] = &[
	"actors",
	"containers",
	"tasks",
	"comments",
	"task_relations",
	"attachments",
	"events",
	"id_sequences",
];

pub async fn run(db: &Database, db_path: &Path, attach_dir: &Path) -> Result<DoctorReport> {
	let mut checks = Vec::new();

	checks.push(check_file(db_path));
	checks.push(check_pragmas(db).await);
	checks.push(check_schema(db).await);
	checks.push(check_migrations(db).await);
	checks.push(check_orphans(db).await);
	checks.push(check_duplicate_slugs(db).await);
	checks.push(check_sequences(db).await);
	checks.push(check_attachments(db, attach_dir).await);
	checks.push(check_telemetry(db, db_path).await);

	let status = checks
		.iter()
		.map(|c| c.status)
		.max()
		.unwrap_or(CheckStatus::Ok);
	Ok(DoctorReport { status, checks })
}

fn check_file(db_path: &Path) -> CheckResult {
	if !db_path.exists() {
		return CheckResult::error(
			"database_file",
			format!("database file missing: {}", db_path.display()),
			Vec::new(),
		);
	}
	match std::fs::metadata(db_path) {
		Ok(meta) if meta.permissions().readonly() => CheckResult::warn(
			"database_file",
			"database file is read-only",
			Vec::new(),
		),
		Ok(_) => CheckResult::ok("database_file", format!("{}", db_path.display())),
		Err(e) => CheckResult::error("database_file", format!("stat failed: {e}"), Vec::new()),
	}
}

async fn check_pragmas(db: &Database) -> CheckResult {
	let mut problems = Vec::new();
	match db.pragma("journal_mode").await {
		Ok(mode) if mode.eq_ignore_ascii_case("wal") => {}
		Ok(mode) => problems.push(format!("journal_mode is {mode}, expected wal")),
		Err(e) => problems.push(format!("journal_mode: {e}")),
	}
	match db.pragma("foreign_keys").await {
		Ok(v) if v == "1" => {}
		Ok(v) => problems.push(format!("foreign_keys is {v}, expected 1")),
		Err(e) => problems.push(format!("foreign_keys: {e}")),
	}
	match db.integrity_check().await {
		Ok(v) if v == "ok" => {}
		Ok(v) => problems.push(format!("integrity_check: {v}")),
		Err(e) => problems.push(format!("integrity_check: {e}")),
	}
	if problems.is_empty() {
		CheckResult::ok("pragmas", "wal, foreign keys, integrity ok")
	} else {
		CheckResult::error("pragmas", "pragma state unhealthy", problems)
	}
}

async fn check_schema(db: &Database) -> CheckResult {
	let rows = match db
		.conn()
		.query_all(Statement::from_string(
			DatabaseBackend::Sqlite,
			"SELECT name FROM sqlite_master WHERE type = 'table'",
		))
		.await
	{
		Ok(rows) => rows,
		Err(e) => return CheckResult::error("schema", format!("{e}"), Vec::new()),
	};
	let present: HashSet<String> = rows
		.iter()
		.filter_map(|r| r.try_get::<String>("", "name").ok())
		.collect();
	let missing: Vec<String> = REQUIRED_TABLES
		.iter()
		.filter(|t| !present.contains(**t))
		.map(|t| (*t).to_owned())
		.collect();
	if missing.is_empty() {
		CheckResult::ok("schema", "all required tables present")
	} else {
		CheckResult::error("schema", "required tables missing", missing)
	}
}

async fn check_migrations(db: &Database) -> CheckResult {
	match db.migration_status().await {
		Ok((applied, pending)) if pending.is_empty() => {
			CheckResult::ok("migrations", format!("{} applied", applied.len()))
		}
		Ok((_, pending)) => CheckResult::warn(
			"migrations",
			format!("{} migrations pending", pending.len()),
			pending,
		),
		Err(e) => CheckResult::error("migrations", format!("{e}"), Vec::new()),
	}
}

async fn count_query(db: &Database, sql: &str) -> std::result::Result<i64, String> {
	let row = db
		.conn()
		.query_one(Statement::from_string(DatabaseBackend::Sqlite, sql))
		.await
		.map_err(|e| e.to_string())?
		.ok_or_else(|| "no row".to_owned())?;
	row.try_get::<i64>("", "n").map_err(|e| e.to_string())
}

async fn check_orphans(db: &Database) -> CheckResult {
	let queries = [
		(
			"tasks without container",
			"SELECT COUNT(*) AS n FROM tasks t \
			 LEFT JOIN containers c ON c.uuid = t.project_uuid WHERE c.uuid IS NULL",
		),
		(
			"comments without task",
			"SELECT COUNT(*) AS n FROM comments m \
			 LEFT JOIN tasks t ON t.uuid = m.task_uuid WHERE t.uuid IS NULL",
		),
		(
			"attachment rows without task",
			"SELECT COUNT(*) AS n FROM attachments a \
			 LEFT JOIN tasks t ON t.uuid = a.task_uuid WHERE t.uuid IS NULL",
		),
		(
			"relations without endpoint",
			"SELECT COUNT(*) AS n FROM task_relations r \
			 LEFT JOIN tasks f ON f.uuid = r.from_task_uuid \
			 LEFT JOIN tasks t ON t.uuid = r.to_task_uuid \
			 WHERE f.uuid IS NULL OR t.uuid IS NULL",
		),
	];
	let mut findings = Vec::new();
	for (what, sql) in queries {
		match count_query(db, sql).await {
			Ok(0) => {}
			Ok(n) => findings.push(format!("{n} {what}")),
			Err(e) => findings.push(format!("{what}: {e}")),
		}
	}
	if findings.is_empty() {
		CheckResult::ok("orphans", "no orphan rows")
	} else {
		CheckResult::error("orphans", "orphan rows found", findings)
	}
}

async fn check_duplicate_slugs(db: &Database) -> CheckResult {
	let queries = [
		(
			"container sibling slugs",
			"SELECT COALESCE(parent_uuid, '') || '/' || slug AS n FROM containers \
			 GROUP BY COALESCE(parent_uuid, ''), slug HAVING COUNT(*) > 1",
		),
		(
			"task slugs per container",
			"SELECT project_uuid || '/' || slug AS n FROM tasks \
			 GROUP BY project_uuid, slug HAVING COUNT(*) > 1",
		),
	];
	let mut findings = Vec::new();
	for (what, sql) in queries {
		match db
			.conn()
			.query_all(Statement::from_string(DatabaseBackend::Sqlite, sql))
			.await
		{
			Ok(rows) if rows.is_empty() => {}
			Ok(rows) => {
				for r in rows {
					if let Ok(v) = r.try_get::<String>("", "n") {
						findings.push(format!("duplicate {what}: {v}"));
					}
				}
			}
			Err(e) => findings.push(format!("{what}: {e}")),
		}
	}
	if findings.is_empty() {
		CheckResult::ok("duplicate_slugs", "sibling slugs unique")
	} else {
		CheckResult::error("duplicate_slugs", "duplicate slugs found", findings)
	}
}

/// The counter is authoritative; a counter at or below the highest issued
/// friendly number means two paths disagreed about issuance.
async fn check_sequences(db: &Database) -> CheckResult {
	let specs: [(IdKind, &str, &str); 5] = [
		(IdKind::Task, "tasks", "T-"),
		(IdKind::Container, "containers", "P-"),
		(IdKind::Actor, "actors", "A-"),
		(IdKind::Comment, "comments", "C-"),
		(IdKind::Attachment, "attachments", "ATT-"),
	];
	let mut findings = Vec::new();
	for (kind, table, prefix) in specs {
		let sql = format!(
			"SELECT COALESCE(MAX(CAST(SUBSTR(friendly_id, {}) AS INTEGER)), 0) AS n FROM {table}",
			prefix.len() + 1
		);
		let max = match count_query(db, &sql).await {
			Ok(n) => n,
			Err(e) => {
				findings.push(format!("{table}: {e}"));
				continue;
			}
		};
		let next_sql = format!(
			"SELECT next AS n FROM id_sequences WHERE kind = '{}'",
			kind.sequence_key()
		);
		match count_query(db, &next_sql).await {
			Ok(next) if next > max => {}
			Ok(next) => findings.push(format!(
				"{}: counter {next} but highest issued is {max}",
				kind.sequence_key()
			)),
			Err(e) => findings.push(format!("{}: {e}", kind.sequence_key())),
		}
	}
	if findings.is_empty() {
		CheckResult::ok("id_sequences", "counters ahead of issued ids")
	} else {
		CheckResult::error("id_sequences", "sequence divergence", findings)
	}
}

/// Rows without files are errors; files without rows are warnings.
async fn check_attachments(db: &Database, attach_dir: &Path) -> CheckResult {
	let rows = match Attachment::find().all(db.conn()).await {
		Ok(rows) => rows,
		Err(e) => return CheckResult::error("attachments", format!("{e}"), Vec::new()),
	};
	let mut missing_files = Vec::new();
	let mut known: HashSet<std::path::PathBuf> = HashSet::new();
	for a in &rows {
		let path = attach_dir.join(&a.rel_path);
		known.insert(path.clone());
		if !path.is_file() {
			missing_files.push(format!("{}: {}", a.friendly_id, a.rel_path));
		}
	}

	let mut orphan_files = Vec::new();
	let tasks_root = attach_dir.join("tasks");
	if tasks_root.is_dir() {
		for entry in walkdir::WalkDir::new(&tasks_root).min_depth(2).max_depth(2) {
			let Ok(entry) = entry else { continue };
			if entry.file_type().is_file() && !known.contains(entry.path()) {
				orphan_files.push(entry.path().display().to_string());
			}
		}
	}

	if !missing_files.is_empty() {
		let mut details = missing_files;
		details.extend(orphan_files);
		CheckResult::error("attachments", "attachment rows without files", details)
	} else if !orphan_files.is_empty() {
		CheckResult::warn("attachments", "orphan files on disk", orphan_files)
	} else {
		CheckResult::ok("attachments", format!("{} attachments reconciled", rows.len()))
	}
}

async fn check_telemetry(db: &Database, db_path: &Path) -> CheckResult {
	let size = std::fs::metadata(db_path).map(|m| m.len()).unwrap_or(0);
	let mut details = vec![format!("database size: {size} bytes")];
	for table in REQUIRED_TABLES {
		if let Ok(n) = count_query(db, &format!("SELECT COUNT(*) AS n FROM {table}")).await {
			details.push(format!("{table}: {n} rows"));
		}
	}
	CheckResult {
		name: "telemetry",
		status: CheckStatus::Ok,
		message: "size and row counts".into(),
		details,
	}
}
