//! Slug normalization and friendly identifiers.
//!
//! Friendly IDs (`T-00001`, `P-00001`, …) are allocated from per-kind
//! monotonic sequences and are stable per entity kind; UUIDs remain the
//! cross-reference keys. Slugs are lowercase `[a-z0-9-]` derived from free
//! text.

use crate::shared::{Error, Result};
use uuid::Uuid;

/// Slugs longer than this are rejected rather than truncated.
pub const MAX_SLUG_LEN: usize = 64;

/// Minimum zero-padded width of the numeric part of a friendly ID. Numbers
/// above 99999 simply widen.
const FRIENDLY_WIDTH: usize = 5;

/// Entity kinds that receive friendly IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
	Task,
	Container,
	Actor,
	Comment,
	Attachment,
}

impl IdKind {
	pub const ALL: [IdKind; 5] = [
		IdKind::Task,
		IdKind::Container,
		IdKind::Actor,
		IdKind::Comment,
		IdKind::Attachment,
	];

	pub fn prefix(&self) -> &'static str {
		match self {
			IdKind::Task => "T",
			IdKind::Container => "P",
			IdKind::Actor => "A",
			IdKind::Comment => "C",
			IdKind::Attachment => "ATT",
		}
	}

	/// Row key in the `id_sequences` table.
	pub fn sequence_key(&self) -> &'static str {
		match self {
			IdKind::Task => "next_task",
			IdKind::Container => "next_container",
			IdKind::Actor => "next_actor",
			IdKind::Comment => "next_comment",
			IdKind::Attachment => "next_attachment",
		}
	}

	pub fn format(&self, n: i64) -> String {
		format!("{}-{:0width$}", self.prefix(), n, width = FRIENDLY_WIDTH)
	}

	/// Parses the numeric part of a friendly ID of this kind.
	pub fn parse(&self, s: &str) -> Option<i64> {
		let rest = s.strip_prefix(self.prefix())?.strip_prefix('-')?;
		if rest.len() < FRIENDLY_WIDTH || !rest.bytes().all(|b| b.is_ascii_digit()) {
			return None;
		}
		rest.parse().ok()
	}
}

/// Detects the kind of a well-formed friendly ID, if any. `ATT-` is checked
/// before `A-` since the prefixes overlap.
pub fn friendly_kind(s: &str) -> Option<IdKind> {
	for kind in [
		IdKind::Attachment,
		IdKind::Task,
		IdKind::Container,
		IdKind::Actor,
		IdKind::Comment,
	] {
		if kind.parse(s).is_some() {
			return Some(kind);
		}
	}
	None
}

pub fn is_friendly_id(s: &str) -> bool {
	friendly_kind(s).is_some()
}

pub fn is_uuid(s: &str) -> bool {
	Uuid::parse_str(s).is_ok()
}

/// Normalizes free text into a slug: accent folding, lowercase, non-alnum
/// runs collapsed to `-`, edges trimmed. Empty or oversized results are
/// validation errors.
pub fn normalize_slug(input: &str) -> Result<String> {
	let mut out = String::with_capacity(input.len());
	let mut pending_dash = false;
	for ch in input.chars() {
		let ch = fold_accent(ch).to_ascii_lowercase();
		if ch.is_ascii_alphanumeric() {
			if pending_dash && !out.is_empty() {
				out.push('-');
			}
			pending_dash = false;
			out.push(ch);
		} else {
			pending_dash = true;
		}
	}
	if out.is_empty() {
		return Err(Error::Validation(format!(
			"slug is empty after normalization of {input:?}"
		)));
	}
	if out.len() > MAX_SLUG_LEN {
		return Err(Error::Validation(format!(
			"slug exceeds {MAX_SLUG_LEN} characters: {out:?}"
		)));
	}
	Ok(out)
}

/// Folds common Latin accents to their ASCII base letter. Anything else
/// passes through and is handled by the alnum filter.
fn fold_accent(c: char) -> char {
	let lower = c.to_lowercase().next().unwrap_or(c);
	match lower {
		'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
		'è' | 'é' | 'ê' | 'ë' => 'e',
		'ì' | 'í' | 'î' | 'ï' => 'i',
		'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' => 'o',
		'ù' | 'ú' | 'û' | 'ü' => 'u',
		'ç' => 'c',
		'ñ' => 'n',
		'ý' | 'ÿ' => 'y',
		other => other,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn slug_normalization() {
		assert_eq!(normalize_slug("Ship It!").unwrap(), "ship-it");
		assert_eq!(normalize_slug("  déjà vu  ").unwrap(), "deja-vu");
		assert_eq!(normalize_slug("a--b__c").unwrap(), "a-b-c");
		assert!(normalize_slug("!!!").is_err());
		assert!(normalize_slug("").is_err());
	}

	#[test]
	fn slug_normalization_is_idempotent() {
		for input in ["Ship It!", "déjà vu", "portal/auth/login"] {
			let once = normalize_slug(input).unwrap();
			assert_eq!(normalize_slug(&once).unwrap(), once);
		}
	}

	#[test]
	fn friendly_id_format_and_parse() {
		assert_eq!(IdKind::Task.format(1), "T-00001");
		assert_eq!(IdKind::Attachment.format(42), "ATT-00042");
		assert_eq!(IdKind::Task.parse("T-00001"), Some(1));
		assert_eq!(IdKind::Task.parse("T-1"), None);
		assert_eq!(friendly_kind("ATT-00007"), Some(IdKind::Attachment));
		assert_eq!(friendly_kind("A-00007"), Some(IdKind::Actor));
		assert_eq!(friendly_kind("X-00007"), None);
	}

	#[test]
	fn friendly_id_widens_past_five_digits() {
		assert_eq!(IdKind::Task.format(99999), "T-99999");
		assert_eq!(IdKind::Task.format(100000), "T-100000");
		assert_eq!(IdKind::Task.parse("T-100000"), Some(100000));
	}
}
