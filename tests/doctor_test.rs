//! Health checks over a real file-backed store.

mod helpers;

use helpers::{root_container, seed_actor, simple_task};
use wrkq::infrastructure::database::Database;
use wrkq::operations::{attachments, doctor};

#[tokio::test]
async fn healthy_store_reports_ok() {
	let dir = tempfile::tempdir().expect("tempdir");
	let db_path = dir.path().join("wrkq.db");
	let attach_dir = dir.path().join("attachments");
	std::fs::create_dir_all(&attach_dir).expect("attach dir");

	let db = Database::create(&db_path).await.expect("create");
	db.migrate().await.expect("migrate");
	let actor = seed_actor(&db).await;
	let inbox = root_container(&db, actor, "inbox").await;
	let task = simple_task(&db, actor, inbox.uuid, "ship-it").await;
	attachments::put(
		db.conn(),
		actor,
		task.uuid,
		"log.txt",
		None,
		b"hello",
		&attach_dir,
	)
	.await
	.expect("attach");

	let report = doctor::run(&db, &db_path, &attach_dir).await.expect("doctor");
	assert_eq!(report.status, doctor::CheckStatus::Ok, "{:#?}", report.checks);
}

#[tokio::test]
async fn missing_attachment_file_is_an_error() {
	let dir = tempfile::tempdir().expect("tempdir");
	let db_path = dir.path().join("wrkq.db");
	let attach_dir = dir.path().join("attachments");
	std::fs::create_dir_all(&attach_dir).expect("attach dir");

	let db = Database::create(&db_path).await.expect("create");
	db.migrate().await.expect("migrate");
	let actor = seed_actor(&db).await;
	let inbox = root_container(&db, actor, "inbox").await;
	let task = simple_task(&db, actor, inbox.uuid, "ship-it").await;
	let row = attachments::put(
		db.conn(),
		actor,
		task.uuid,
		"log.txt",
		None,
		b"hello",
		&attach_dir,
	)
	.await
	.expect("attach");

	std::fs::remove_file(attachments::file_path(&attach_dir, &row)).expect("remove");

	let report = doctor::run(&db, &db_path, &attach_dir).await.expect("doctor");
	assert_eq!(report.status, doctor::CheckStatus::Error);
	let check = report
		.checks
		.iter()
		.find(|c| c.name == "attachments")
		.expect("attachments check");
	assert_eq!(check.status, doctor::CheckStatus::Error);
}

#[tokio::test]
async fn orphan_file_is_a_warning() {
	let dir = tempfile::tempdir().expect("tempdir");
	let db_path = dir.path().join("wrkq.db");
	let attach_dir = dir.path().join("attachments");

	let db = Database::create(&db_path).await.expect("create");
	db.migrate().await.expect("migrate");
	seed_actor(&db).await;

	let stray = attach_dir.join("tasks").join("not-a-task");
	std::fs::create_dir_all(&stray).expect("stray dir");
	std::fs::write(stray.join("stray.bin"), b"???").expect("stray file");

	let report = doctor::run(&db, &db_path, &attach_dir).await.expect("doctor");
	let check = report
		.checks
		.iter()
		.find(|c| c.name == "attachments")
		.expect("attachments check");
	assert_eq!(check.status, doctor::CheckStatus::Warning);
}
