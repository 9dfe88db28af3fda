//! Webhook registration and the dispatch trigger point.
//!
//! Containers register URLs; after a mutation commits, the trigger resolves
//! the owning container chain and hands (url, event) pairs to a sink.
//! Delivery itself lives outside the engine; the default sink only traces.

use crate::infrastructure::database::entities::{container, event, task, Container, Task};
use crate::shared::{Error, Result};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use tracing::debug;
use uuid::Uuid;

/// Registration-time validation: absolute http(s) URL with a host.
pub fn validate_webhook_urls(urls: &[String]) -> Result<()> {
	for raw in urls {
		let parsed = url::Url::parse(raw)
			.map_err(|e| Error::Validation(format!("invalid webhook url {raw:?}: {e}")))?;
		if !matches!(parsed.scheme(), "http" | "https") {
			return Err(Error::Validation(format!(
				"webhook url must be http or https: {raw:?}"
			)));
		}
		if parsed.host_str().is_none() {
			return Err(Error::Validation(format!(
				"webhook url has no host: {raw:?}"
			)));
		}
	}
	Ok(())
}

pub trait WebhookSink: Send + Sync {
	fn deliver(&self, url: &str, event: &event::Model);
}

/// Default sink: records the would-be delivery and nothing else.
pub struct TraceSink;

impl WebhookSink for TraceSink {
	fn deliver(&self, url: &str, event: &event::Model) {
		debug!(url, event_type = %event.event_type, "webhook dispatch");
	}
}

/// Dispatch trigger. Called after commit with the event row; collects the
/// webhook URLs registered along the owning container chain.
pub async fn dispatch(
	conn: &DatabaseConnection,
	sink: &dyn WebhookSink,
	ev: &event::Model,
) -> Result<()> {
	let start_container: Option<Uuid> = match ev.resource_type.as_str() {
		"task" => Task::find()
			.filter(task::Column::Uuid.eq(ev.resource_uuid))
			.one(conn)
			.await?
			.map(|t| t.project_uuid),
		"container" => Some(ev.resource_uuid),
		_ => None,
	};
	let Some(mut cursor) = start_container else {
		return Ok(());
	};

	loop {
		let Some(c) = Container::find()
			.filter(container::Column::Uuid.eq(cursor))
			.one(conn)
			.await?
		else {
			break;
		};
		if let Some(urls) = c.webhook_urls.as_array() {
			for u in urls {
				if let Some(u) = u.as_str() {
					sink.deliver(u, ev);
				}
			}
		}
		match c.parent_uuid {
			Some(p) => cursor = p,
			None => break,
		}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn webhook_url_validation() {
		assert!(validate_webhook_urls(&["https://example.com/hook".into()]).is_ok());
		assert!(validate_webhook_urls(&["ftp://example.com".into()]).is_err());
		assert!(validate_webhook_urls(&["not a url".into()]).is_err());
		assert!(validate_webhook_urls(&["http://".into()]).is_err());
	}
}
