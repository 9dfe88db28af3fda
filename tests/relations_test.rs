//! Relations: uniqueness, self-loop rejection, blocked-by semantics.

mod helpers;

use helpers::{mem_db, root_container, seed_actor, simple_task};
use pretty_assertions::assert_eq;
use wrkq::domain::fields::RelationKind;
use wrkq::operations::{relations, tasks};
use wrkq::shared::Error;

#[tokio::test]
async fn blocks_relation_follows_blocker_state() {
	let db = mem_db().await;
	let actor = seed_actor(&db).await;
	let inbox = root_container(&db, actor, "inbox").await;
	let a = simple_task(&db, actor, inbox.uuid, "a").await;
	let b = simple_task(&db, actor, inbox.uuid, "b").await;

	relations::create(db.conn(), actor, a.uuid, b.uuid, RelationKind::Blocks)
		.await
		.expect("relate");

	let blockers = relations::blocked_by(db.conn(), b.uuid).await.expect("query");
	assert_eq!(blockers.len(), 1);
	assert_eq!(blockers[0].uuid, a.uuid);
	assert_eq!(blockers[0].state, "open");

	let mut fields = serde_json::Map::new();
	fields.insert("state".into(), serde_json::json!("completed"));
	tasks::update_fields(db.conn(), actor, a.uuid, &fields, 0)
		.await
		.expect("complete");

	let blockers = relations::blocked_by(db.conn(), b.uuid).await.expect("query");
	assert!(blockers.is_empty());
}

#[tokio::test]
async fn self_relation_is_rejected() {
	let db = mem_db().await;
	let actor = seed_actor(&db).await;
	let inbox = root_container(&db, actor, "inbox").await;
	let a = simple_task(&db, actor, inbox.uuid, "a").await;

	let err = relations::create(db.conn(), actor, a.uuid, a.uuid, RelationKind::Blocks)
		.await
		.expect_err("self relation");
	assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn duplicate_triples_conflict() {
	let db = mem_db().await;
	let actor = seed_actor(&db).await;
	let inbox = root_container(&db, actor, "inbox").await;
	let a = simple_task(&db, actor, inbox.uuid, "a").await;
	let b = simple_task(&db, actor, inbox.uuid, "b").await;

	relations::create(db.conn(), actor, a.uuid, b.uuid, RelationKind::RelatesTo)
		.await
		.expect("first");
	let err = relations::create(db.conn(), actor, a.uuid, b.uuid, RelationKind::RelatesTo)
		.await
		.expect_err("duplicate");
	assert!(matches!(err, Error::Conflict(_)));

	// A different kind on the same pair is a distinct edge.
	relations::create(db.conn(), actor, a.uuid, b.uuid, RelationKind::Duplicates)
		.await
		.expect("different kind");

	let edges = relations::list(db.conn(), a.uuid).await.expect("list");
	assert_eq!(edges.len(), 2);

	relations::delete(db.conn(), actor, a.uuid, b.uuid, RelationKind::Duplicates)
		.await
		.expect("delete");
	let edges = relations::list(db.conn(), a.uuid).await.expect("list");
	assert_eq!(edges.len(), 1);
}
