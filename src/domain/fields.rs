//! Fixed enumerations and field validators.
//!
//! Entities store these as plain strings; the store layer parses and
//! validates on the way in so the database only ever holds members of the
//! fixed sets.

use crate::shared::{Error, Result};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

#[derive(
	Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, AsRefStr, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
	Draft,
	Open,
	InProgress,
	Completed,
	Blocked,
	Cancelled,
	Archived,
	Deleted,
}

#[derive(
	Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, AsRefStr, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
	Task,
	Bug,
	Feature,
	Chore,
	Epic,
}

#[derive(
	Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, AsRefStr, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
	Project,
	Folder,
}

#[derive(
	Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, AsRefStr, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
	Human,
	Agent,
	System,
}

#[derive(
	Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, AsRefStr, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
	Blocks,
	RelatesTo,
	Duplicates,
}

fn parse_member<T>(what: &str, s: &str) -> Result<T>
where
	T: std::str::FromStr + IntoEnumIterator + AsRef<str>,
{
	s.parse::<T>().map_err(|_| {
		let valid = T::iter()
			.map(|v| v.as_ref().to_owned())
			.collect::<Vec<_>>()
			.join(", ");
		Error::Validation(format!("invalid {what} {s:?}; expected one of {valid}"))
	})
}

pub fn parse_state(s: &str) -> Result<TaskState> {
	parse_member("state", s)
}

pub fn parse_task_kind(s: &str) -> Result<TaskKind> {
	parse_member("task kind", s)
}

pub fn parse_container_kind(s: &str) -> Result<ContainerKind> {
	parse_member("container kind", s)
}

pub fn parse_role(s: &str) -> Result<ActorRole> {
	parse_member("role", s)
}

pub fn parse_relation_kind(s: &str) -> Result<RelationKind> {
	parse_member("relation kind", s)
}

/// Priority is an inclusive 1..=4 range.
pub fn validate_priority(p: i64) -> Result<i32> {
	if (1..=4).contains(&p) {
		Ok(p as i32)
	} else {
		Err(Error::Validation(format!("priority must be 1..=4, got {p}")))
	}
}

/// Gate for `UpdateFields(state=…)`. Archived and deleted are lifecycle
/// states reached only through archive/delete; rows already in them must be
/// restored before any field update.
pub fn validate_transition(from: TaskState, to: TaskState) -> Result<()> {
	if matches!(to, TaskState::Archived | TaskState::Deleted) {
		return Err(Error::Validation(format!(
			"state {to} is set via archive/delete, not a field update"
		)));
	}
	if matches!(from, TaskState::Archived | TaskState::Deleted) {
		return Err(Error::Precondition(format!(
			"task is {from}; restore it before updating"
		)));
	}
	Ok(())
}

/// Restore may target any live state; archived and deleted are refused.
pub fn validate_restore_target(target: TaskState) -> Result<()> {
	if matches!(target, TaskState::Archived | TaskState::Deleted) {
		return Err(Error::Validation(format!(
			"cannot restore into state {target}"
		)));
	}
	Ok(())
}

/// A `blocks` relation is active while the blocking task is still live work.
pub fn blocks_active(state: TaskState) -> bool {
	!matches!(
		state,
		TaskState::Completed | TaskState::Cancelled | TaskState::Archived | TaskState::Deleted
	)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn priority_bounds() {
		assert!(validate_priority(0).is_err());
		assert!(validate_priority(5).is_err());
		assert_eq!(validate_priority(1).unwrap(), 1);
		assert_eq!(validate_priority(4).unwrap(), 4);
	}

	#[test]
	fn state_round_trips_snake_case() {
		assert_eq!(parse_state("in_progress").unwrap(), TaskState::InProgress);
		assert_eq!(TaskState::InProgress.to_string(), "in_progress");
		assert!(parse_state("doing").is_err());
	}

	#[test]
	fn archived_and_deleted_are_not_update_targets() {
		assert!(validate_transition(TaskState::Open, TaskState::Archived).is_err());
		assert!(validate_transition(TaskState::Archived, TaskState::Open).is_err());
		assert!(validate_transition(TaskState::Open, TaskState::Completed).is_ok());
	}

	#[test]
	fn restore_targets() {
		assert!(validate_restore_target(TaskState::Open).is_ok());
		assert!(validate_restore_target(TaskState::Deleted).is_err());
		assert!(validate_restore_target(TaskState::Archived).is_err());
	}
}
