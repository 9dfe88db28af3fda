//! Store mutation layer: friendly IDs, etag discipline, lifecycle, events.

mod helpers;

use helpers::{mem_db, root_container, seed_actor, simple_task};
use pretty_assertions::assert_eq;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder};
use wrkq::domain::fields::TaskState;
use wrkq::infrastructure::database::entities::{event, Event, Task};
use wrkq::operations::{comments, tasks};
use wrkq::shared::Error;

async fn events_for(db: &wrkq::infrastructure::database::Database, uuid: uuid::Uuid) -> Vec<event::Model> {
	Event::find()
		.filter(event::Column::ResourceUuid.eq(uuid))
		.order_by_asc(event::Column::Id)
		.all(db.conn())
		.await
		.expect("events query")
}

#[tokio::test]
async fn create_issues_friendly_ids_and_events() {
	let db = mem_db().await;
	let actor = seed_actor(&db).await;

	let inbox = root_container(&db, actor, "inbox").await;
	let task = simple_task(&db, actor, inbox.uuid, "ship-it").await;

	assert_eq!(inbox.friendly_id, "P-00001");
	assert_eq!(task.friendly_id, "T-00001");
	assert_eq!(inbox.etag, 1);
	assert_eq!(task.etag, 1);

	let container_events = events_for(&db, inbox.uuid).await;
	assert_eq!(container_events.len(), 1);
	assert_eq!(container_events[0].event_type, "container.created");

	let task_events = events_for(&db, task.uuid).await;
	assert_eq!(task_events.len(), 1);
	assert_eq!(task_events[0].event_type, "task.created");
	assert_eq!(task_events[0].etag, Some(1));
}

#[tokio::test]
async fn etag_precondition_conflicts_without_side_effects() {
	let db = mem_db().await;
	let actor = seed_actor(&db).await;
	let inbox = root_container(&db, actor, "inbox").await;
	let task = simple_task(&db, actor, inbox.uuid, "ship-it").await;

	// Take the task to etag 3.
	for title in ["one", "two"] {
		let mut fields = serde_json::Map::new();
		fields.insert("title".into(), serde_json::json!(title));
		tasks::update_fields(db.conn(), actor, task.uuid, &fields, 0)
			.await
			.expect("update");
	}
	let current = tasks::get(db.conn(), task.uuid).await.expect("get");
	assert_eq!(current.etag, 3);
	let events_before = events_for(&db, task.uuid).await.len();

	let mut fields = serde_json::Map::new();
	fields.insert("title".into(), serde_json::json!("three"));
	let err = tasks::update_fields(db.conn(), actor, task.uuid, &fields, 2)
		.await
		.expect_err("stale precondition");
	assert!(matches!(err, Error::EtagMismatch { found: 3, expected: 2, .. }));

	let after = tasks::get(db.conn(), task.uuid).await.expect("get");
	assert_eq!(after.etag, 3);
	assert_eq!(after.title, "two");
	assert_eq!(events_for(&db, task.uuid).await.len(), events_before);
}

#[tokio::test]
async fn archive_then_restore_round_trips() {
	let db = mem_db().await;
	let actor = seed_actor(&db).await;
	let inbox = root_container(&db, actor, "inbox").await;
	let task = simple_task(&db, actor, inbox.uuid, "ship-it").await;
	let pre_etag = task.etag;

	tasks::archive(db.conn(), actor, task.uuid, 0)
		.await
		.expect("archive");
	let archived = tasks::get(db.conn(), task.uuid).await.expect("get");
	assert_eq!(archived.state, "archived");
	assert!(archived.archived_at.is_some());

	let (restored, report) = tasks::restore(
		db.conn(),
		actor,
		task.uuid,
		tasks::RestoreOptions::default(),
	)
	.await
	.expect("restore");
	assert_eq!(restored.state, "open");
	assert!(restored.archived_at.is_none());
	assert!(restored.deleted_at.is_none());
	assert_eq!(restored.etag, pre_etag + 2);
	assert_eq!(report.restored, vec![restored.friendly_id.clone()]);

	let types: Vec<String> = events_for(&db, task.uuid)
		.await
		.into_iter()
		.map(|e| e.event_type)
		.collect();
	assert_eq!(types, vec!["task.created", "task.archived", "task.restored"]);
}

#[tokio::test]
async fn restore_refuses_live_rows_and_dead_targets() {
	let db = mem_db().await;
	let actor = seed_actor(&db).await;
	let inbox = root_container(&db, actor, "inbox").await;
	let task = simple_task(&db, actor, inbox.uuid, "ship-it").await;

	let err = tasks::restore(db.conn(), actor, task.uuid, tasks::RestoreOptions::default())
		.await
		.expect_err("not archived");
	assert!(matches!(err, Error::Precondition(_)));

	tasks::archive(db.conn(), actor, task.uuid, 0)
		.await
		.expect("archive");
	let err = tasks::restore(
		db.conn(),
		actor,
		task.uuid,
		tasks::RestoreOptions {
			target_state: Some(TaskState::Deleted),
			..Default::default()
		},
	)
	.await
	.expect_err("deleted is not a restore target");
	assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn restore_cascades_to_archived_descendants() {
	let db = mem_db().await;
	let actor = seed_actor(&db).await;
	let inbox = root_container(&db, actor, "inbox").await;
	let parent = simple_task(&db, actor, inbox.uuid, "parent").await;

	let mut child_params = tasks::TaskCreate::new(inbox.uuid, "child".to_owned());
	child_params.slug = Some("child".into());
	child_params.parent_task = Some(parent.uuid);
	let child = tasks::create(db.conn(), actor, child_params)
		.await
		.expect("child");

	tasks::archive(db.conn(), actor, child.uuid, 0)
		.await
		.expect("archive child");
	tasks::archive(db.conn(), actor, parent.uuid, 0)
		.await
		.expect("archive parent");

	let (_, report) = tasks::restore(
		db.conn(),
		actor,
		parent.uuid,
		tasks::RestoreOptions::default(),
	)
	.await
	.expect("restore");
	assert_eq!(report.restored.len(), 2);
	assert!(report.failed.is_empty());

	let child_after = tasks::get(db.conn(), child.uuid).await.expect("child");
	assert_eq!(child_after.state, "open");
}

#[tokio::test]
async fn priority_bounds_are_validation_errors() {
	let db = mem_db().await;
	let actor = seed_actor(&db).await;
	let inbox = root_container(&db, actor, "inbox").await;
	let task = simple_task(&db, actor, inbox.uuid, "ship-it").await;

	for bad in [0i64, 5] {
		let mut fields = serde_json::Map::new();
		fields.insert("priority".into(), serde_json::json!(bad));
		let err = tasks::update_fields(db.conn(), actor, task.uuid, &fields, 0)
			.await
			.expect_err("out of range");
		assert!(matches!(err, Error::Validation(_)), "priority {bad}");
	}
	for good in [1i64, 4] {
		let mut fields = serde_json::Map::new();
		fields.insert("priority".into(), serde_json::json!(good));
		tasks::update_fields(db.conn(), actor, task.uuid, &fields, 0)
			.await
			.expect("in range");
	}
}

#[tokio::test]
async fn sibling_slugs_are_unique() {
	let db = mem_db().await;
	let actor = seed_actor(&db).await;
	let inbox = root_container(&db, actor, "inbox").await;
	simple_task(&db, actor, inbox.uuid, "ship-it").await;

	let mut params = tasks::TaskCreate::new(inbox.uuid, "Ship It".to_owned());
	params.slug = Some("ship-it".into());
	let err = tasks::create(db.conn(), actor, params)
		.await
		.expect_err("duplicate slug");
	assert!(matches!(err, Error::Conflict(_)));
}

#[tokio::test]
async fn unknown_update_fields_are_rejected() {
	let db = mem_db().await;
	let actor = seed_actor(&db).await;
	let inbox = root_container(&db, actor, "inbox").await;
	let task = simple_task(&db, actor, inbox.uuid, "ship-it").await;

	let mut fields = serde_json::Map::new();
	fields.insert("slug".into(), serde_json::json!("renamed"));
	let err = tasks::update_fields(db.conn(), actor, task.uuid, &fields, 0)
		.await
		.expect_err("slug is not updatable");
	assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn state_update_stamps_completed_at() {
	let db = mem_db().await;
	let actor = seed_actor(&db).await;
	let inbox = root_container(&db, actor, "inbox").await;
	let task = simple_task(&db, actor, inbox.uuid, "ship-it").await;

	let mut fields = serde_json::Map::new();
	fields.insert("state".into(), serde_json::json!("completed"));
	let done = tasks::update_fields(db.conn(), actor, task.uuid, &fields, 0)
		.await
		.expect("complete");
	assert!(done.completed_at.is_some());

	let mut fields = serde_json::Map::new();
	fields.insert("state".into(), serde_json::json!("open"));
	let reopened = tasks::update_fields(db.conn(), actor, task.uuid, &fields, 0)
		.await
		.expect("reopen");
	assert!(reopened.completed_at.is_none());
}

#[tokio::test]
async fn archived_state_is_not_an_update_target() {
	let db = mem_db().await;
	let actor = seed_actor(&db).await;
	let inbox = root_container(&db, actor, "inbox").await;
	let task = simple_task(&db, actor, inbox.uuid, "ship-it").await;

	let mut fields = serde_json::Map::new();
	fields.insert("state".into(), serde_json::json!("archived"));
	let err = tasks::update_fields(db.conn(), actor, task.uuid, &fields, 0)
		.await
		.expect_err("archived via update");
	assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn purge_removes_row_but_keeps_history() {
	let db = mem_db().await;
	let actor = seed_actor(&db).await;
	let inbox = root_container(&db, actor, "inbox").await;
	let task = simple_task(&db, actor, inbox.uuid, "ship-it").await;
	comments::create(db.conn(), actor, task.uuid, "note", None)
		.await
		.expect("comment");

	let tmp = tempfile::tempdir().expect("tempdir");
	tasks::purge(db.conn(), actor, task.uuid, tmp.path(), 0)
		.await
		.expect("purge");

	assert_eq!(
		Task::find().count(db.conn()).await.expect("count"),
		0,
		"task row removed"
	);
	let types: Vec<String> = events_for(&db, task.uuid)
		.await
		.into_iter()
		.map(|e| e.event_type)
		.collect();
	assert!(types.contains(&"task.purged".to_owned()));
}

#[tokio::test]
async fn comments_are_append_only() {
	let db = mem_db().await;
	let actor = seed_actor(&db).await;
	let inbox = root_container(&db, actor, "inbox").await;
	let task = simple_task(&db, actor, inbox.uuid, "ship-it").await;

	let err = comments::create(db.conn(), actor, task.uuid, "", None)
		.await
		.expect_err("empty body");
	assert!(matches!(err, Error::Precondition(_)));

	let err = comments::create(db.conn(), actor, task.uuid, "   \n\t", None)
		.await
		.expect_err("whitespace-only body");
	assert!(matches!(err, Error::Validation(_)));

	let original = comments::create(db.conn(), actor, task.uuid, "first", None)
		.await
		.expect("create");
	let successor = comments::edit(db.conn(), actor, original.uuid, "second", 0)
		.await
		.expect("edit");
	assert_ne!(successor.uuid, original.uuid);
	assert_eq!(successor.body, "second");

	let visible = comments::list(db.conn(), task.uuid, false).await.expect("list");
	assert_eq!(visible.len(), 1);
	assert_eq!(visible[0].uuid, successor.uuid);

	let all = comments::list(db.conn(), task.uuid, true).await.expect("list all");
	assert_eq!(all.len(), 2);
	let old = all.iter().find(|c| c.uuid == original.uuid).expect("original");
	assert_eq!(old.body, "first", "original body untouched");
	assert!(old.deleted_at.is_some());
}
