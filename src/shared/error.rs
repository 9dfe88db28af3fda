//! Error kinds shared across the engine.
//!
//! Every fallible operation returns [`Error`]. The variants map onto the
//! contract surfaces: exit codes for the CLI, HTTP status codes for the
//! daemon, and an `error` discriminator for machine-readable output.

use sea_orm::DbErr;
use serde::{Deserialize, Serialize};

pub type Result<T> = std::result::Result<T, Error>;

/// Resource discriminator used by the resolver and the event journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
	Task,
	Container,
	Comment,
	Actor,
	Attachment,
}

impl ResourceKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			ResourceKind::Task => "task",
			ResourceKind::Container => "container",
			ResourceKind::Comment => "comment",
			ResourceKind::Actor => "actor",
			ResourceKind::Attachment => "attachment",
		}
	}
}

impl std::fmt::Display for ResourceKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// A reference did not resolve to any row.
	#[error("{kind} not found: {reference}")]
	NotFound {
		kind: ResourceKind,
		reference: String,
	},

	/// Etag precondition violated.
	#[error("etag mismatch on {reference}: expected {expected}, found {found}")]
	EtagMismatch {
		reference: String,
		expected: i64,
		found: i64,
	},

	/// Merge conflict, verify mismatch, non-empty target on import, and
	/// other concurrent-intent collisions.
	#[error("conflict: {0}")]
	Conflict(String),

	/// Malformed input: slug, state, priority, kind, UUID, JSON payload,
	/// webhook URL.
	#[error("validation: {0}")]
	Validation(String),

	/// The operation is well-formed but the subject is in the wrong state
	/// for it (restore of a live row, comment create with an empty body).
	#[error("precondition: {0}")]
	Precondition(String),

	/// A path resolved to a resource of a different kind than requested.
	#[error("{reference} is a {actual}, not a {expected}")]
	WrongKind {
		reference: String,
		expected: ResourceKind,
		actual: ResourceKind,
	},

	/// Surfaced only by the health component.
	#[error("integrity: {0}")]
	Integrity(String),

	#[error(transparent)]
	Db(#[from] DbErr),

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),
}

impl Error {
	/// Stable machine-readable discriminator carried in JSON error output.
	pub fn kind_str(&self) -> &'static str {
		match self {
			Error::NotFound { .. } => "not_found",
			Error::EtagMismatch { .. } => "conflict",
			Error::Conflict(_) => "conflict",
			Error::Validation(_) => "validation",
			Error::Precondition(_) => "precondition",
			Error::WrongKind { .. } => "wrong_kind",
			Error::Integrity(_) => "integrity",
			Error::Db(_) => "db",
			Error::Io(_) => "io",
			Error::Json(_) => "validation",
		}
	}

	/// CLI exit code contract: 0 success, 1 generic, 2 usage, 4 conflict,
	/// 5 partial (partial is produced by bulk callers, not here).
	pub fn exit_code(&self) -> i32 {
		match self {
			Error::WrongKind { .. } => 2,
			Error::EtagMismatch { .. } | Error::Conflict(_) => 4,
			_ => 1,
		}
	}

	pub fn not_found(kind: ResourceKind, reference: impl Into<String>) -> Self {
		Error::NotFound {
			kind,
			reference: reference.into(),
		}
	}
}
