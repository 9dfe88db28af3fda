//! Snapshot canonical form, verify, and round-trip import.

mod helpers;

use helpers::{mem_db, root_container, seed_actor, simple_task};
use pretty_assertions::assert_eq;
use wrkq::domain::fields::RelationKind;
use wrkq::operations::{comments, relations, snapshot, tasks};
use wrkq::shared::Error;

async fn populated() -> (wrkq::infrastructure::database::Database, uuid::Uuid) {
	let db = mem_db().await;
	let actor = seed_actor(&db).await;
	let inbox = root_container(&db, actor, "inbox").await;
	let a = simple_task(&db, actor, inbox.uuid, "alpha").await;
	let b = simple_task(&db, actor, inbox.uuid, "beta").await;
	comments::create(db.conn(), actor, a.uuid, "looks good", None)
		.await
		.expect("comment");
	relations::create(db.conn(), actor, a.uuid, b.uuid, RelationKind::Blocks)
		.await
		.expect("relation");
	(db, actor)
}

#[tokio::test]
async fn export_is_canonical_and_verifies() {
	let (db, _) = populated().await;

	let one = snapshot::export(db.conn(), false).await.expect("export");
	let two = snapshot::export(db.conn(), false).await.expect("export");
	assert_eq!(one, two, "export is deterministic");
	assert!(one.ends_with('\n'));
	assert!(!one.contains("events"), "events are opt-in");

	snapshot::verify(db.conn(), &one, false).await.expect("verify");

	let err = snapshot::verify(db.conn(), "{}\n", false)
		.await
		.expect_err("verify mismatch");
	assert!(matches!(err, Error::Conflict(_)));
	assert_eq!(err.exit_code(), 4);
}

#[tokio::test]
async fn snapshot_rev_covers_content() {
	let (db, actor) = populated().await;
	let before = snapshot::export(db.conn(), false).await.expect("export");

	let task = wrkq::operations::resolver::Resolver::new(None)
		.resolve_task(db.conn(), "inbox/alpha")
		.await
		.expect("resolve");
	let mut fields = serde_json::Map::new();
	fields.insert("title".into(), serde_json::json!("renamed"));
	tasks::update_fields(db.conn(), actor, task.uuid, &fields, 0)
		.await
		.expect("update");

	let after = snapshot::export(db.conn(), false).await.expect("export");
	assert_ne!(before, after);
}

#[tokio::test]
async fn import_into_empty_store_round_trips_bytes() {
	let (db, _) = populated().await;
	let exported = snapshot::export(db.conn(), false).await.expect("export");

	let fresh = mem_db().await;
	// Freshly initialized: only the seeded system actor.
	wrkq::operations::actors::seed_defaults(fresh.conn())
		.await
		.expect("seed");
	let report = snapshot::import(fresh.conn(), &exported, snapshot::ImportOptions::default())
		.await
		.expect("import");
	assert_eq!(report.tasks, 2);
	assert_eq!(report.containers, 1);

	let re_exported = snapshot::export(fresh.conn(), false).await.expect("export");
	assert_eq!(exported, re_exported, "byte-identical after reimport");
}

#[tokio::test]
async fn import_with_events_round_trips_bytes() {
	let (db, _) = populated().await;
	let exported = snapshot::export(db.conn(), true).await.expect("export");

	let fresh = mem_db().await;
	let report = snapshot::import(fresh.conn(), &exported, snapshot::ImportOptions::default())
		.await
		.expect("import");
	assert!(report.events > 0);

	let re_exported = snapshot::export(fresh.conn(), true).await.expect("export");
	assert_eq!(exported, re_exported);
}

#[tokio::test]
async fn import_refuses_populated_store_without_force() {
	let (db, _) = populated().await;
	let exported = snapshot::export(db.conn(), false).await.expect("export");

	let err = snapshot::import(db.conn(), &exported, snapshot::ImportOptions::default())
		.await
		.expect_err("non-empty target");
	assert!(matches!(err, Error::Conflict(_)));

	// Force truncates and succeeds on the same store.
	let report = snapshot::import(
		db.conn(),
		&exported,
		snapshot::ImportOptions {
			force: true,
			..Default::default()
		},
	)
	.await
	.expect("forced import");
	assert_eq!(report.tasks, 2);
	let re_exported = snapshot::export(db.conn(), false).await.expect("export");
	assert_eq!(exported, re_exported);
}

#[tokio::test]
async fn dry_run_rolls_back() {
	let (db, _) = populated().await;
	let exported = snapshot::export(db.conn(), false).await.expect("export");

	let fresh = mem_db().await;
	let report = snapshot::import(
		fresh.conn(),
		&exported,
		snapshot::ImportOptions {
			dry_run: true,
			..Default::default()
		},
	)
	.await
	.expect("dry run");
	assert!(report.dry_run);

	let after = snapshot::export(fresh.conn(), false).await.expect("export");
	let parsed: serde_json::Value = serde_json::from_str(&after).expect("json");
	assert_eq!(parsed["tasks"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn version_mismatch_is_rejected() {
	let fresh = mem_db().await;
	let bogus = r#"{"actors":[],"comments":[],"containers":[],"machine_interface_version":"99","relations":[],"tasks":[]}"#;
	let err = snapshot::import(fresh.conn(), bogus, snapshot::ImportOptions::default())
		.await
		.expect_err("wrong version");
	assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn friendly_id_sequences_resume_after_import() {
	let (db, _) = populated().await;
	let exported = snapshot::export(db.conn(), false).await.expect("export");

	let fresh = mem_db().await;
	snapshot::import(fresh.conn(), &exported, snapshot::ImportOptions::default())
		.await
		.expect("import");

	let actor = seed_actor(&fresh).await;
	let inbox = wrkq::operations::resolver::Resolver::new(None)
		.resolve_container(fresh.conn(), "inbox")
		.await
		.expect("resolve")
		.0;
	let next = simple_task(&fresh, actor, inbox.uuid, "gamma").await;
	assert_eq!(next.friendly_id, "T-00003", "counter resumes past imported ids");
}
