//! Bundle round-trip and apply semantics.

mod helpers;

use helpers::{mem_db, root_container, seed_actor, simple_task};
use pretty_assertions::assert_eq;
use wrkq::domain::fields::ContainerKind;
use wrkq::operations::{attachments, bundle, containers, resolver::Resolver, tasks};

#[tokio::test]
async fn bundle_round_trip_preserves_uuids_and_counts() {
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
	.expect("sub container");
	let login = simple_task(&db, actor, auth.uuid, "login").await;
	let signup = simple_task(&db, actor, portal.uuid, "signup").await;

	let attach_src = tempfile::tempdir().expect("attach dir");
	attachments::put(
		db.conn(),
		actor,
		login.uuid,
		"notes.txt",
		Some("text/plain"),
		b"remember the salt",
		attach_src.path(),
	)
	.await
	.expect("attach");

	let bundle_dir = tempfile::tempdir().expect("bundle dir");
	let manifest = bundle::create(
		db.conn(),
		portal.uuid,
		bundle_dir.path(),
		attach_src.path(),
		bundle::BundleCreateOptions {
			with_attachments: true,
			with_events: true,
		},
	)
	.await
	.expect("bundle create");
	assert_eq!(manifest.containers, 2);
	assert_eq!(manifest.tasks, 2);
	assert!(bundle_dir.path().join("manifest.json").is_file());
	assert!(bundle_dir.path().join("containers.json").is_file());
	assert!(bundle_dir.path().join("events.ndjson").is_file());

	// Apply into a fresh host.
	let host = mem_db().await;
	let host_actor = seed_actor(&host).await;
	let attach_dest = tempfile::tempdir().expect("attach dest");
	let report = bundle::apply(
		host.conn(),
		host_actor,
		bundle_dir.path(),
		attach_dest.path(),
		bundle::BundleApplyOptions::default(),
	)
	.await
	.expect("apply");
	assert_eq!(report.containers_ensured, 2);
	assert_eq!(report.tasks_created, 2);
	assert_eq!(report.attachments_applied, 1);
	assert!(report.errors.is_empty());

	// UUIDs survive the transfer.
	let resolver = Resolver::new(None);
	let host_login = resolver
		.resolve_task(host.conn(), "portal/auth/login")
		.await
		.expect("resolve");
	assert_eq!(host_login.uuid, login.uuid);
	let host_signup = resolver
		.resolve_task(host.conn(), "portal/signup")
		.await
		.expect("resolve");
	assert_eq!(host_signup.uuid, signup.uuid);

	// Re-bundling the host reports the same shape.
	let second_dir = tempfile::tempdir().expect("second bundle");
	let host_portal = resolver
		.resolve_container(host.conn(), "portal")
		.await
		.expect("container")
		.0;
	let second = bundle::create(
		host.conn(),
		host_portal.uuid,
		second_dir.path(),
		attach_dest.path(),
		bundle::BundleCreateOptions {
			with_attachments: true,
			with_events: false,
		},
	)
	.await
	.expect("re-bundle");
	assert_eq!(second.containers, manifest.containers);
	assert_eq!(second.tasks, manifest.tasks);
}

#[tokio::test]
async fn slug_collisions_get_dup_suffixes() {
	let db = mem_db().await;
	let actor = seed_actor(&db).await;
	let portal = root_container(&db, actor, "portal").await;
	simple_task(&db, actor, portal.uuid, "login").await;

	let bundle_dir = tempfile::tempdir().expect("bundle dir");
	let attach_dir = tempfile::tempdir().expect("attach dir");
	bundle::create(
		db.conn(),
		portal.uuid,
		bundle_dir.path(),
		attach_dir.path(),
		bundle::BundleCreateOptions::default(),
	)
	.await
	.expect("bundle");

	// Host already owns portal/login under a different UUID.
	let host = mem_db().await;
	let host_actor = seed_actor(&host).await;
	let host_portal = root_container(&host, host_actor, "portal").await;
	simple_task(&host, host_actor, host_portal.uuid, "login").await;

	let report = bundle::apply(
		host.conn(),
		host_actor,
		bundle_dir.path(),
		attach_dir.path(),
		bundle::BundleApplyOptions::default(),
	)
	.await
	.expect("apply");
	assert_eq!(report.tasks_created, 1);

	let resolver = Resolver::new(None);
	let dup = resolver
		.resolve_task(host.conn(), "portal/login--dup-2")
		.await
		.expect("suffixed task");
	assert_eq!(dup.slug, "login--dup-2");
}

#[tokio::test]
async fn uuid_collisions_prefer_newer_updated_at() {
	let db = mem_db().await;
	let actor = seed_actor(&db).await;
	let portal = root_container(&db, actor, "portal").await;
	let task = simple_task(&db, actor, portal.uuid, "login").await;

	let bundle_dir = tempfile::tempdir().expect("bundle dir");
	let attach_dir = tempfile::tempdir().expect("attach dir");
	bundle::create(
		db.conn(),
		portal.uuid,
		bundle_dir.path(),
		attach_dir.path(),
		bundle::BundleCreateOptions::default(),
	)
	.await
	.expect("bundle");

	// The host copy moves on after the bundle was cut; the stale donor
	// must not clobber it.
	let mut fields = serde_json::Map::new();
	fields.insert("title".into(), serde_json::json!("fresher"));
	tasks::update_fields(db.conn(), actor, task.uuid, &fields, 0)
		.await
		.expect("update");

	let report = bundle::apply(
		db.conn(),
		actor,
		bundle_dir.path(),
		attach_dir.path(),
		bundle::BundleApplyOptions::default(),
	)
	.await
	.expect("apply");
	assert_eq!(report.tasks_skipped, 1);
	assert_eq!(report.tasks_created, 0);

	let after = tasks::get(db.conn(), task.uuid).await.expect("get");
	assert_eq!(after.title, "fresher");
}

#[tokio::test]
async fn dest_root_remaps_the_project_path() {
	let db = mem_db().await;
	let actor = seed_actor(&db).await;
	let portal = root_container(&db, actor, "portal").await;
	simple_task(&db, actor, portal.uuid, "login").await;

	let bundle_dir = tempfile::tempdir().expect("bundle dir");
	let attach_dir = tempfile::tempdir().expect("attach dir");
	bundle::create(
		db.conn(),
		portal.uuid,
		bundle_dir.path(),
		attach_dir.path(),
		bundle::BundleCreateOptions::default(),
	)
	.await
	.expect("bundle");

	let host = mem_db().await;
	let host_actor = seed_actor(&host).await;
	bundle::apply(
		host.conn(),
		host_actor,
		bundle_dir.path(),
		attach_dir.path(),
		bundle::BundleApplyOptions {
			dest_root: Some("imported".into()),
			..Default::default()
		},
	)
	.await
	.expect("apply");

	let resolver = Resolver::new(None);
	resolver
		.resolve_task(host.conn(), "imported/login")
		.await
		.expect("remapped task");
}
