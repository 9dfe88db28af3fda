//! Event journal ordering and the polling watcher.

mod helpers;

use helpers::{mem_db, root_container, seed_actor, simple_task};
use pretty_assertions::assert_eq;
use std::time::Duration;
use wrkq::operations::{tasks, watch};

#[tokio::test]
async fn event_ids_are_strictly_increasing() {
	let db = mem_db().await;
	let actor = seed_actor(&db).await;
	let inbox = root_container(&db, actor, "inbox").await;
	let task = simple_task(&db, actor, inbox.uuid, "a").await;
	for title in ["one", "two", "three"] {
		let mut fields = serde_json::Map::new();
		fields.insert("title".into(), serde_json::json!(title));
		tasks::update_fields(db.conn(), actor, task.uuid, &fields, 0)
			.await
			.expect("update");
	}

	let events = watch::events_after(db.conn(), 0, 100).await.expect("events");
	let ids: Vec<i32> = events.iter().map(|e| e.id).collect();
	let mut sorted = ids.clone();
	sorted.sort();
	sorted.dedup();
	assert_eq!(ids, sorted, "monotonic, no duplicates");
}

#[tokio::test]
async fn watcher_sees_each_event_exactly_once() {
	let db = mem_db().await;
	let actor = seed_actor(&db).await;
	let inbox = root_container(&db, actor, "inbox").await;
	simple_task(&db, actor, inbox.uuid, "a").await;

	let mut watcher = watch::Watcher::new(0);
	let first = watcher.poll(db.conn()).await.expect("poll");
	assert!(!first.is_empty());
	let drained = watcher.poll(db.conn()).await.expect("poll again");
	assert!(drained.is_empty(), "no events re-delivered");

	// New activity shows up on the next poll.
	simple_task(&db, actor, inbox.uuid, "b").await;
	let next = watcher.poll(db.conn()).await.expect("poll");
	assert!(next.iter().all(|e| e.id > first.last().map(|e| e.id).unwrap_or(0)));
}

#[tokio::test]
async fn non_follow_run_stops_at_first_empty_poll() {
	let db = mem_db().await;
	let actor = seed_actor(&db).await;
	let inbox = root_container(&db, actor, "inbox").await;
	simple_task(&db, actor, inbox.uuid, "a").await;

	let mut count = 0;
	let last = watch::Watcher::new(0)
		.run(db.conn(), false, Duration::from_millis(10), |_| {
			count += 1;
			Ok(())
		})
		.await
		.expect("run");
	assert!(count > 0);
	assert!(last > 0);
}
