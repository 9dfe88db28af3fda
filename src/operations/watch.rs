//! Polling tail of the event journal.
//!
//! State is a single monotonic "last seen event ID". Readers see each event
//! exactly once, in commit order.

use crate::infrastructure::database::entities::{event, Event};
use crate::shared::Result;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect};
use std::time::Duration;

const POLL_BATCH: u64 = 500;

pub async fn events_after(
	conn: &DatabaseConnection,
	after: i32,
	limit: u64,
) -> Result<Vec<event::Model>> {
	Ok(Event::find()
		.filter(event::Column::Id.gt(after))
		.order_by_asc(event::Column::Id)
		.limit(limit)
		.all(conn)
		.await?)
}

/// Most recent event for a resource, if any.
pub async fn latest_for(
	conn: &DatabaseConnection,
	resource_uuid: uuid::Uuid,
) -> Result<Option<event::Model>> {
	Ok(Event::find()
		.filter(event::Column::ResourceUuid.eq(resource_uuid))
		.order_by_desc(event::Column::Id)
		.one(conn)
		.await?)
}

pub struct Watcher {
	pub last_seen: i32,
}

impl Watcher {
	pub fn new(last_seen: i32) -> Self {
		Self { last_seen }
	}

	/// One poll iteration; advances the cursor past everything returned.
	pub async fn poll(&mut self, conn: &DatabaseConnection) -> Result<Vec<event::Model>> {
		let batch = events_after(conn, self.last_seen, POLL_BATCH).await?;
		if let Some(last) = batch.last() {
			self.last_seen = last.id;
		}
		Ok(batch)
	}

	/// Drains the journal through `emit`. Without `follow` this returns at
	/// the first empty poll; with it, it sleeps `interval` and polls again,
	/// indefinitely.
	pub async fn run<F>(
		mut self,
		conn: &DatabaseConnection,
		follow: bool,
		interval: Duration,
		mut emit: F,
	) -> Result<i32>
	where
		F: FnMut(&event::Model) -> Result<()>,
	{
		loop {
			let batch = self.poll(conn).await?;
			for ev in &batch {
				emit(ev)?;
			}
			if batch.is_empty() {
				if !follow {
					return Ok(self.last_seen);
				}
				tokio::time::sleep(interval).await;
			}
		}
	}
}
