//! Path views, the sibling-slug uniqueness index for containers, and the
//! self-relation trigger. All raw SQL: sea-query has no view builder, and
//! the uniqueness index needs a COALESCE expression so that root containers
//! (NULL parent) share one slug namespace.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
	async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
		let conn = manager.get_connection();

		conn.execute_unprepared(
			"CREATE UNIQUE INDEX IF NOT EXISTS idx_containers_parent_slug \
			 ON containers (COALESCE(parent_uuid, ''), slug)",
		)
		.await?;

		conn.execute_unprepared(
			"CREATE TRIGGER IF NOT EXISTS trg_task_relations_no_self \
			 BEFORE INSERT ON task_relations \
			 FOR EACH ROW WHEN NEW.from_task_uuid = NEW.to_task_uuid \
			 BEGIN SELECT RAISE(ABORT, 'self relation forbidden'); END",
		)
		.await?;

		// Full path strings are computed on read to avoid denormalization
		// drift across renames and moves.
		conn.execute_unprepared(
			"CREATE VIEW IF NOT EXISTS v_container_paths AS \
			 WITH RECURSIVE cpath(uuid, path) AS ( \
			   SELECT uuid, slug FROM containers WHERE parent_uuid IS NULL \
			   UNION ALL \
			   SELECT c.uuid, cpath.path || '/' || c.slug \
			   FROM containers c JOIN cpath ON c.parent_uuid = cpath.uuid \
			 ) \
			 SELECT uuid, path FROM cpath",
		)
		.await?;

		conn.execute_unprepared(
			"CREATE VIEW IF NOT EXISTS v_task_paths AS \
			 SELECT t.uuid AS uuid, cp.path || '/' || t.slug AS path \
			 FROM tasks t JOIN v_container_paths cp ON t.project_uuid = cp.uuid",
		)
		.await?;

		Ok(())
	}

	async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
		let conn = manager.get_connection();
		conn.execute_unprepared("DROP VIEW IF EXISTS v_task_paths").await?;
		conn.execute_unprepared("DROP VIEW IF EXISTS v_container_paths")
			.await?;
		conn.execute_unprepared("DROP TRIGGER IF EXISTS trg_task_relations_no_self")
			.await?;
		conn.execute_unprepared("DROP INDEX IF EXISTS idx_containers_parent_slug")
			.await?;
		Ok(())
	}
}
