//! Find engine: filters, stable ordering, cursor pagination.

mod helpers;

use helpers::{mem_db, root_container, seed_actor, simple_task};
use pretty_assertions::assert_eq;
use wrkq::operations::{find, tasks};

#[tokio::test]
async fn state_filter_and_pseudo_states() {
	let db = mem_db().await;
	let actor = seed_actor(&db).await;
	let inbox = root_container(&db, actor, "inbox").await;
	let live = simple_task(&db, actor, inbox.uuid, "live").await;
	let gone = simple_task(&db, actor, inbox.uuid, "gone").await;
	tasks::archive(db.conn(), actor, gone.uuid, 0).await.expect("archive");

	let page = find::find(db.conn(), &find::FindQuery::default()).await.expect("find");
	assert_eq!(page.tasks.len(), 1, "active by default");
	assert_eq!(page.tasks[0].uuid, live.uuid);

	let page = find::find(
		db.conn(),
		&find::FindQuery {
			state: Some("all".into()),
			..Default::default()
		},
	)
	.await
	.expect("find all");
	assert_eq!(page.tasks.len(), 2);

	let page = find::find(
		db.conn(),
		&find::FindQuery {
			state: Some("archived".into()),
			..Default::default()
		},
	)
	.await
	.expect("find archived");
	assert_eq!(page.tasks.len(), 1);
	assert_eq!(page.tasks[0].uuid, gone.uuid);

	let err = find::find(
		db.conn(),
		&find::FindQuery {
			state: Some("bogus".into()),
			..Default::default()
		},
	)
	.await;
	assert!(err.is_err(), "invalid state is a validation error");
}

#[tokio::test]
async fn path_prefix_and_slug_glob() {
	let db = mem_db().await;
	let actor = seed_actor(&db).await;
	let one = root_container(&db, actor, "one").await;
	let two = root_container(&db, actor, "two").await;
	simple_task(&db, actor, one.uuid, "ship-core").await;
	simple_task(&db, actor, one.uuid, "ship-docs").await;
	simple_task(&db, actor, two.uuid, "ship-extra").await;

	let page = find::find(
		db.conn(),
		&find::FindQuery {
			paths: vec!["one".into()],
			..Default::default()
		},
	)
	.await
	.expect("path filter");
	assert_eq!(page.tasks.len(), 2);
	assert!(page.tasks.iter().all(|t| t.path.starts_with("one/")));

	let page = find::find(
		db.conn(),
		&find::FindQuery {
			slug_glob: Some("ship-d*".into()),
			..Default::default()
		},
	)
	.await
	.expect("glob filter");
	assert_eq!(page.tasks.len(), 1);
	assert_eq!(page.tasks[0].slug, "ship-docs");
}

#[tokio::test]
async fn pagination_is_stable_and_complete() {
	let db = mem_db().await;
	let actor = seed_actor(&db).await;
	let inbox = root_container(&db, actor, "inbox").await;
	for i in 0..7 {
		simple_task(&db, actor, inbox.uuid, &format!("task-{i}")).await;
	}

	let mut seen = Vec::new();
	let mut cursor = None;
	loop {
		let page = find::find(
			db.conn(),
			&find::FindQuery {
				limit: 3,
				cursor: cursor.clone(),
				..Default::default()
			},
		)
		.await
		.expect("page");
		seen.extend(page.tasks.iter().map(|t| t.friendly_id.clone()));
		match page.next_cursor {
			Some(next) => cursor = Some(next),
			None => break,
		}
	}

	assert_eq!(seen.len(), 7, "every task seen exactly once: {seen:?}");
	let mut deduped = seen.clone();
	deduped.sort();
	deduped.dedup();
	assert_eq!(deduped.len(), 7);
}

#[tokio::test]
async fn containers_come_back_for_both_target() {
	let db = mem_db().await;
	let actor = seed_actor(&db).await;
	let inbox = root_container(&db, actor, "inbox").await;
	simple_task(&db, actor, inbox.uuid, "a").await;

	let page = find::find(
		db.conn(),
		&find::FindQuery {
			target: find::FindTarget::Both,
			..Default::default()
		},
	)
	.await
	.expect("both");
	assert_eq!(page.containers.len(), 1);
	assert_eq!(page.tasks.len(), 1);
	assert_eq!(page.containers[0].path, "inbox");
}
