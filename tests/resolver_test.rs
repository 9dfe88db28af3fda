//! Reference resolution: friendly IDs, UUIDs, paths, typed prefixes,
//! project roots.

mod helpers;

use helpers::{mem_db, root_container, seed_actor, simple_task};
use pretty_assertions::assert_eq;
use uuid::Uuid;
use wrkq::domain::fields::ContainerKind;
use wrkq::operations::{containers, resolver::Resolver};
use wrkq::shared::Error;

#[tokio::test]
async fn resolves_by_friendly_uuid_and_path() {
	let db = mem_db().await;
	let actor = seed_actor(&db).await;
	let portal = root_container(&db, actor, "portal").await;
	let auth = containers::create(
		db.conn(),
		actor,
		containers::ContainerCreate {
			parent_uuid: Some(portal.uuid),
			slug: Some("auth".into()),
			title: "Auth".into(),
			kind: ContainerKind::Folder,
			description: String::new(),
			sort_index: 0,
			webhook_urls: Vec::new(),
		},
	)
	.await
	.expect("child container");
	let login = simple_task(&db, actor, auth.uuid, "login").await;

	let resolver = Resolver::new(None);
	let conn = db.conn();

	for reference in [
		login.friendly_id.clone(),
		login.uuid.to_string(),
		"portal/auth/login".to_owned(),
		"t:portal/auth/login".to_owned(),
		"portal.auth.login".to_owned(),
	] {
		let hit = resolver.resolve_task(conn, &reference).await.expect("resolve");
		assert_eq!(hit.uuid, login.uuid, "reference {reference}");
	}

	let (hit, path) = resolver
		.resolve_container(conn, "portal/auth")
		.await
		.expect("container");
	assert_eq!(hit.uuid, auth.uuid);
	assert_eq!(path, "portal/auth");
}

#[tokio::test]
async fn container_path_is_not_a_task() {
	let db = mem_db().await;
	let actor = seed_actor(&db).await;
	let portal = root_container(&db, actor, "portal").await;
	let _auth = containers::create(
		db.conn(),
		actor,
		containers::ContainerCreate {
			parent_uuid: Some(portal.uuid),
			slug: Some("auth".into()),
			title: "Auth".into(),
			kind: ContainerKind::Folder,
			description: String::new(),
			sort_index: 0,
			webhook_urls: Vec::new(),
		},
	)
	.await
	.expect("child");

	let resolver = Resolver::new(None);
	let err = resolver
		.resolve_task(db.conn(), "portal/auth")
		.await
		.expect_err("container, not task");
	assert!(matches!(err, Error::WrongKind { .. }));
}

#[tokio::test]
async fn typed_prefix_mismatch_is_a_usage_error() {
	let db = mem_db().await;
	let actor = seed_actor(&db).await;
	let portal = root_container(&db, actor, "portal").await;
	let task = simple_task(&db, actor, portal.uuid, "login").await;

	let resolver = Resolver::new(None);
	let err = resolver
		.resolve_container(db.conn(), &format!("t:{}", task.friendly_id))
		.await
		.expect_err("task prefix where container expected");
	assert!(matches!(err, Error::WrongKind { .. }));
	assert_eq!(err.exit_code(), 2);
}

#[tokio::test]
async fn project_root_is_applied_to_unrooted_paths() {
	let db = mem_db().await;
	let actor = seed_actor(&db).await;
	let portal = root_container(&db, actor, "portal").await;
	let task = simple_task(&db, actor, portal.uuid, "login").await;

	let resolver = Resolver::new(Some("portal".into()));
	let hit = resolver.resolve_task(db.conn(), "login").await.expect("rooted");
	assert_eq!(hit.uuid, task.uuid);

	// Already-rooted paths pass through unchanged in non-strict mode.
	let hit = resolver
		.resolve_task(db.conn(), "portal/login")
		.await
		.expect("already rooted");
	assert_eq!(hit.uuid, task.uuid);

	// Strict mode rejects already-rooted paths.
	let err = resolver
		.apply_project_root("portal/login", true)
		.expect_err("strict");
	assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn parent_resolution_splits_the_leaf() {
	let db = mem_db().await;
	let actor = seed_actor(&db).await;
	let portal = root_container(&db, actor, "portal").await;

	let resolver = Resolver::new(None);
	let (parent, leaf) = resolver
		.resolve_parent_container(db.conn(), "portal/New Thing!")
		.await
		.expect("split");
	assert_eq!(parent, Some(portal.uuid));
	assert_eq!(leaf, "new-thing");

	let (parent, leaf) = resolver
		.resolve_parent_container(db.conn(), "rooty")
		.await
		.expect("root split");
	assert_eq!(parent, None);
	assert_eq!(leaf, "rooty");
}

#[tokio::test]
async fn missing_references_are_not_found() {
	let db = mem_db().await;
	seed_actor(&db).await;
	let resolver = Resolver::new(None);

	let err = resolver
		.resolve_task(db.conn(), "T-09999")
		.await
		.expect_err("missing friendly");
	assert!(matches!(err, Error::NotFound { .. }));

	let err = resolver
		.resolve_task(db.conn(), &Uuid::new_v4().to_string())
		.await
		.expect_err("missing uuid");
	assert!(matches!(err, Error::NotFound { .. }));
}
