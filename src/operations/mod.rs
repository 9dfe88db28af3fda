//! Store operations: the concurrency-controlled mutation layer and the read
//! engines built on it.
//!
//! Every mutation follows the same shape: begin a transaction, read and
//! validate the current row (etag precondition included), mutate, bump the
//! etag, append the event(s), commit. Every mutation accepts the acting
//! actor's UUID explicitly; identifier-to-UUID resolution happens once at
//! the process or request boundary.

pub mod actors;
pub mod attachments;
pub mod bundle;
pub mod comments;
pub mod containers;
pub mod doctor;
pub mod find;
pub mod merge;
pub mod relations;
pub mod resolver;
pub mod snapshot;
pub mod taskdoc;
pub mod tasks;
pub mod watch;
pub mod webhooks;

use crate::shared::{Error, Result};

/// `if_match == 0` opts out of the precondition (last write wins).
pub(crate) fn check_etag(reference: &str, current: i64, if_match: i64) -> Result<()> {
	if if_match != 0 && current != if_match {
		return Err(Error::EtagMismatch {
			reference: reference.to_owned(),
			expected: if_match,
			found: current,
		});
	}
	Ok(())
}

pub(crate) fn as_str<'v>(key: &str, value: &'v serde_json::Value) -> Result<&'v str> {
	value
		.as_str()
		.ok_or_else(|| Error::Validation(format!("{key} must be a string")))
}

/// Parses an RFC 3339 timestamp into UTC.
pub fn parse_ts(field: &str, s: &str) -> Result<chrono::DateTime<chrono::Utc>> {
	chrono::DateTime::parse_from_rfc3339(s)
		.map(|dt| dt.with_timezone(&chrono::Utc))
		.map_err(|e| Error::Validation(format!("invalid {field} timestamp {s:?}: {e}")))
}
