//! Database infrastructure using SeaORM.
//!
//! A single SQLite file is the sole shared mutable resource. The wrapper
//! applies the required pragmas at open time (WAL journaling, foreign keys)
//! and owns the migration entry points.

use crate::domain::ident::IdKind;
use crate::shared::{Error, Result};
use sea_orm::{
	ActiveModelTrait, ActiveValue::Set, ConnectOptions, ConnectionTrait, Database as SeaDatabase,
	DatabaseBackend, DatabaseConnection, EntityTrait, Statement,
};
use sea_orm_migration::MigratorTrait;
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub mod entities;
pub mod migration;
pub mod paths;

pub struct Database {
	conn: DatabaseConnection,
}

impl Database {
	/// Create a new database at the specified path, creating parent
	/// directories as needed.
	pub async fn create(path: &Path) -> Result<Self> {
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		let db = Self::connect(&format!("sqlite://{}?mode=rwc", path.display()), 10).await?;
		info!("created database at {:?}", path);
		Ok(db)
	}

	/// Open an existing database; refuses to create one implicitly.
	pub async fn open(path: &Path) -> Result<Self> {
		if !path.exists() {
			return Err(Error::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("database does not exist: {} (run `wrkq init`)", path.display()),
			)));
		}
		Self::connect(&format!("sqlite://{}", path.display()), 10).await
	}

	/// In-memory store for tests and dry runs. Pinned to one connection so
	/// every query sees the same memory database.
	pub async fn in_memory() -> Result<Self> {
		let db = Self::connect("sqlite::memory:", 1).await?;
		db.migrate().await?;
		Ok(db)
	}

	async fn connect(url: &str, max_connections: u32) -> Result<Self> {
		let mut opt = ConnectOptions::new(url.to_owned());
		opt.max_connections(max_connections)
			.connect_timeout(Duration::from_secs(8))
			.idle_timeout(Duration::from_secs(8))
			.sqlx_logging(false);

		let conn = SeaDatabase::connect(opt).await?;
		for pragma in [
			"PRAGMA journal_mode=WAL",
			"PRAGMA foreign_keys=ON",
			"PRAGMA synchronous=NORMAL",
		] {
			conn.execute(Statement::from_string(DatabaseBackend::Sqlite, pragma))
				.await?;
		}
		Ok(Self { conn })
	}

	/// Apply all pending migrations.
	pub async fn migrate(&self) -> Result<()> {
		migration::Migrator::up(&self.conn, None).await?;
		Ok(())
	}

	/// Names of applied and pending migrations, in order.
	pub async fn migration_status(&self) -> Result<(Vec<String>, Vec<String>)> {
		let applied = migration::Migrator::get_applied_migrations(&self.conn)
			.await?
			.iter()
			.map(|m| m.name().to_owned())
			.collect();
		let pending = migration::Migrator::get_pending_migrations(&self.conn)
			.await?
			.iter()
			.map(|m| m.name().to_owned())
			.collect();
		Ok((applied, pending))
	}

	/// `PRAGMA integrity_check`; returns the check result string ("ok" when
	/// healthy).
	pub async fn integrity_check(&self) -> Result<String> {
		self.pragma("integrity_check").await
	}

	/// Reads a single-valued pragma.
	pub async fn pragma(&self, name: &str) -> Result<String> {
		let row = self
			.conn
			.query_one(Statement::from_string(
				DatabaseBackend::Sqlite,
				format!("PRAGMA {name}"),
			))
			.await?
			.ok_or_else(|| Error::Integrity(format!("pragma {name} returned no rows")))?;
		// Pragmas answer in a column named after themselves; values may be
		// TEXT or INTEGER depending on the pragma.
		if let Ok(s) = row.try_get::<String>("", name) {
			return Ok(s);
		}
		let n = row.try_get::<i64>("", name)?;
		Ok(n.to_string())
	}

	pub fn conn(&self) -> &DatabaseConnection {
		&self.conn
	}
}

/// Allocate the next friendly ID of `kind`. Must be called inside the same
/// transaction that inserts the row; the sequence row serializes concurrent
/// writers.
pub async fn next_friendly_id<C: ConnectionTrait>(conn: &C, kind: IdKind) -> Result<String> {
	let key = kind.sequence_key();
	let row = entities::IdSequence::find_by_id(key)
		.one(conn)
		.await?
		.ok_or_else(|| Error::Integrity(format!("id sequence row missing: {key}")))?;
	let n = row.next;
	let mut seq: entities::id_sequence::ActiveModel = row.into();
	seq.next = Set(n + 1);
	seq.update(conn).await?;
	Ok(kind.format(n))
}
