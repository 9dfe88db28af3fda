//! Shared test fixtures.
#![allow(dead_code)]

use uuid::Uuid;
use wrkq::domain::fields::ContainerKind;
use wrkq::infrastructure::database::entities::{container, task};
use wrkq::infrastructure::database::Database;
use wrkq::operations::{actors, containers, tasks};

pub async fn mem_db() -> Database {
	Database::in_memory().await.expect("in-memory database")
}

/// Seeds the system actor and returns its UUID.
pub async fn seed_actor(db: &Database) -> Uuid {
	actors::seed_defaults(db.conn())
		.await
		.expect("seed system actor")
		.uuid
}

pub async fn root_container(db: &Database, actor: Uuid, slug: &str) -> container::Model {
	containers::create(
		db.conn(),
		actor,
		containers::ContainerCreate {
			parent_uuid: None,
			slug: Some(slug.to_owned()),
			title: slug.to_owned(),
			kind: ContainerKind::Project,
			description: String::new(),
			sort_index: 0,
			webhook_urls: Vec::new(),
		},
	)
	.await
	.expect("create container")
}

pub async fn simple_task(
	db: &Database,
	actor: Uuid,
	container: Uuid,
	slug: &str,
) -> task::Model {
	let mut params = tasks::TaskCreate::new(container, slug.to_owned());
	params.slug = Some(slug.to_owned());
	tasks::create(db.conn(), actor, params)
		.await
		.expect("create task")
}
