//! Task documents: UTF-8 markdown with optional YAML front matter.
//!
//! The bundle engine writes one of these per task; the edit path reads the
//! same shape back. A body-only document (no front matter) is accepted and
//! treated as a description update.

use crate::shared::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Recognized front-matter keys. Unknown keys are rejected by serde so a
/// typo does not silently drop a field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FrontMatter {
	// Identity fields, written by bundles, ignored as update input.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub uuid: Option<Uuid>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub path: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub updated_at: Option<DateTime<Utc>>,

	// Mutable fields.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub title: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub state: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub priority: Option<i64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub kind: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub due_at: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub start_at: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub labels: Option<Vec<String>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub meta: Option<serde_json::Value>,
	/// Actor slug, resolved on the applying side.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub assignee: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskDocFile {
	pub front: Option<FrontMatter>,
	pub body: String,
}

const DELIM: &str = "---";

pub fn parse(text: &str) -> Result<TaskDocFile> {
	let Some(rest) = text.strip_prefix(DELIM) else {
		return Ok(TaskDocFile {
			front: None,
			body: text.to_owned(),
		});
	};
	let rest = rest
		.strip_prefix("\r\n")
		.or_else(|| rest.strip_prefix('\n'))
		.ok_or_else(|| Error::Validation("malformed front matter delimiter".into()))?;

	// Find the closing `---` on a line of its own.
	let mut yaml_end = None;
	let mut offset = 0;
	for line in rest.split_inclusive('\n') {
		if line.trim_end_matches(['\r', '\n']) == DELIM {
			yaml_end = Some((offset, offset + line.len()));
			break;
		}
		offset += line.len();
	}
	let Some((yaml_end, body_start)) = yaml_end else {
		return Err(Error::Validation(
			"front matter is not closed by a --- line".into(),
		));
	};

	let yaml = &rest[..yaml_end];
	let front: FrontMatter = serde_yaml::from_str(yaml)
		.map_err(|e| Error::Validation(format!("invalid front matter: {e}")))?;
	let body = rest[body_start..].to_owned();
	Ok(TaskDocFile {
		front: Some(front),
		body,
	})
}

pub fn render(front: &FrontMatter, body: &str) -> Result<String> {
	let yaml = serde_yaml::to_string(front)
		.map_err(|e| Error::Validation(format!("front matter render: {e}")))?;
	Ok(format!("{DELIM}\n{yaml}{DELIM}\n{body}"))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn body_only_document() {
		let doc = parse("just a description\n").unwrap();
		assert!(doc.front.is_none());
		assert_eq!(doc.body, "just a description\n");
	}

	#[test]
	fn front_matter_round_trip() {
		let front = FrontMatter {
			title: Some("Ship it".into()),
			state: Some("open".into()),
			priority: Some(2),
			labels: Some(vec!["release".into()]),
			..Default::default()
		};
		let text = render(&front, "body text\n").unwrap();
		let doc = parse(&text).unwrap();
		let parsed = doc.front.expect("front matter");
		assert_eq!(parsed.title.as_deref(), Some("Ship it"));
		assert_eq!(parsed.priority, Some(2));
		assert_eq!(doc.body, "body text\n");
	}

	#[test]
	fn unclosed_front_matter_is_rejected() {
		assert!(parse("---\ntitle: x\n").is_err());
	}

	#[test]
	fn unknown_keys_are_rejected() {
		assert!(parse("---\nbogus: 1\n---\n").is_err());
	}
}
