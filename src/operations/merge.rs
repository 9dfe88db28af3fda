//! Three-way document merge for interactive edits.
//!
//! base = state when the editor opened, current = state right before save,
//! edited = what the editor produced. Per field: an untouched field follows
//! current, a field only the editor touched follows edited, agreement is
//! accepted, and divergence is a conflict. The merge never mutates the
//! store; callers re-apply the merged document through the normal
//! update-fields path so etag discipline is preserved.

use crate::domain::fields::TaskState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The editable slice of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDoc {
	pub title: String,
	pub state: TaskState,
	pub priority: i64,
	pub due_at: Option<DateTime<Utc>>,
	pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldConflict {
	pub field: &'static str,
	pub base: serde_json::Value,
	pub current: serde_json::Value,
	pub edited: serde_json::Value,
}

#[derive(Debug)]
pub enum MergeOutcome {
	Merged(TaskDoc),
	Conflicts(Vec<FieldConflict>),
}

pub fn three_way(base: &TaskDoc, current: &TaskDoc, edited: &TaskDoc) -> MergeOutcome {
	let mut merged = current.clone();
	let mut conflicts = Vec::new();

	merge_field(
		"title",
		&base.title,
		&current.title,
		&edited.title,
		&mut merged.title,
		&mut conflicts,
	);
	merge_field(
		"state",
		&base.state,
		&current.state,
		&edited.state,
		&mut merged.state,
		&mut conflicts,
	);
	merge_field(
		"priority",
		&base.priority,
		&current.priority,
		&edited.priority,
		&mut merged.priority,
		&mut conflicts,
	);
	merge_field(
		"due_at",
		&base.due_at,
		&current.due_at,
		&edited.due_at,
		&mut merged.due_at,
		&mut conflicts,
	);
	merge_field(
		"description",
		&base.description,
		&current.description,
		&edited.description,
		&mut merged.description,
		&mut conflicts,
	);

	if conflicts.is_empty() {
		MergeOutcome::Merged(merged)
	} else {
		MergeOutcome::Conflicts(conflicts)
	}
}

fn merge_field<T: Clone + PartialEq + Serialize>(
	field: &'static str,
	base: &T,
	current: &T,
	edited: &T,
	out: &mut T,
	conflicts: &mut Vec<FieldConflict>,
) {
	if edited == base {
		// No local intent to change; keep current.
		*out = current.clone();
	} else if current == base || edited == current {
		*out = edited.clone();
	} else {
		conflicts.push(FieldConflict {
			field,
			base: serde_json::to_value(base).unwrap_or_default(),
			current: serde_json::to_value(current).unwrap_or_default(),
			edited: serde_json::to_value(edited).unwrap_or_default(),
		});
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn doc(title: &str, priority: i64, desc: &str) -> TaskDoc {
		TaskDoc {
			title: title.into(),
			state: TaskState::Open,
			priority,
			due_at: None,
			description: desc.into(),
		}
	}

	#[test]
	fn identity_merge_is_unchanged() {
		let d = doc("A", 3, "x");
		match three_way(&d, &d, &d) {
			MergeOutcome::Merged(m) => assert_eq!(m, d),
			MergeOutcome::Conflicts(_) => panic!("no conflicts expected"),
		}
	}

	#[test]
	fn concurrent_edits_of_different_fields_merge() {
		let base = doc("A", 3, "x");
		let current = doc("A", 1, "x"); // concurrent priority change
		let edited = doc("B", 3, "x"); // editor changed the title
		match three_way(&base, &current, &edited) {
			MergeOutcome::Merged(m) => {
				assert_eq!(m.title, "B");
				assert_eq!(m.priority, 1);
				assert_eq!(m.description, "x");
			}
			MergeOutcome::Conflicts(c) => panic!("unexpected conflicts: {c:?}"),
		}
	}

	#[test]
	fn convergent_edits_are_accepted() {
		let base = doc("A", 3, "x");
		let current = doc("B", 3, "x");
		let edited = doc("B", 3, "x");
		assert!(matches!(
			three_way(&base, &current, &edited),
			MergeOutcome::Merged(_)
		));
	}

	#[test]
	fn divergent_edits_conflict() {
		let base = doc("A", 3, "x");
		let current = doc("B", 3, "x");
		let edited = doc("C", 3, "x");
		match three_way(&base, &current, &edited) {
			MergeOutcome::Conflicts(c) => {
				assert_eq!(c.len(), 1);
				assert_eq!(c[0].field, "title");
			}
			MergeOutcome::Merged(_) => panic!("conflict expected"),
		}
	}
}
