//! Initial migration: entity tables, indexes, and seeded ID sequences.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
	async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
		// Actors first: everything else attributes writes to them
		manager
			.create_table(
				Table::create()
					.table(Actors::Table)
					.if_not_exists()
					.col(
						ColumnDef::new(Actors::Id)
							.integer()
							.not_null()
							.auto_increment()
							.primary_key(),
					)
					.col(ColumnDef::new(Actors::Uuid).uuid().not_null().unique_key())
					.col(
						ColumnDef::new(Actors::FriendlyId)
							.string()
							.not_null()
							.unique_key(),
					)
					.col(ColumnDef::new(Actors::Slug).string().not_null().unique_key())
					.col(ColumnDef::new(Actors::DisplayName).string().not_null())
					.col(ColumnDef::new(Actors::Role).string().not_null())
					.col(
						ColumnDef::new(Actors::Etag)
							.big_integer()
							.not_null()
							.default(1),
					)
					.col(
						ColumnDef::new(Actors::CreatedAt)
							.timestamp_with_time_zone()
							.not_null(),
					)
					.col(
						ColumnDef::new(Actors::UpdatedAt)
							.timestamp_with_time_zone()
							.not_null(),
					)
					.to_owned(),
			)
			.await?;

		manager
			.create_table(
				Table::create()
					.table(Containers::Table)
					.if_not_exists()
					.col(
						ColumnDef::new(Containers::Id)
							.integer()
							.not_null()
							.auto_increment()
							.primary_key(),
					)
					.col(
						ColumnDef::new(Containers::Uuid)
							.uuid()
							.not_null()
							.unique_key(),
					)
					.col(
						ColumnDef::new(Containers::FriendlyId)
							.string()
							.not_null()
							.unique_key(),
					)
					.col(ColumnDef::new(Containers::Slug).string().not_null())
					.col(ColumnDef::new(Containers::Title).string().not_null())
					.col(
						ColumnDef::new(Containers::Description)
							.text()
							.not_null()
							.default(""),
					)
					.col(ColumnDef::new(Containers::Kind).string().not_null())
					.col(ColumnDef::new(Containers::ParentUuid).uuid())
					.col(
						ColumnDef::new(Containers::SortIndex)
							.big_integer()
							.not_null()
							.default(0),
					)
					.col(ColumnDef::new(Containers::WebhookUrls).json().not_null())
					.col(
						ColumnDef::new(Containers::Etag)
							.big_integer()
							.not_null()
							.default(1),
					)
					.col(
						ColumnDef::new(Containers::CreatedByActorUuid)
							.uuid()
							.not_null(),
					)
					.col(ColumnDef::new(Containers::UpdatedByActorUuid).uuid())
					.col(
						ColumnDef::new(Containers::CreatedAt)
							.timestamp_with_time_zone()
							.not_null(),
					)
					.col(
						ColumnDef::new(Containers::UpdatedAt)
							.timestamp_with_time_zone()
							.not_null(),
					)
					.col(ColumnDef::new(Containers::ArchivedAt).timestamp_with_time_zone())
					.foreign_key(
						ForeignKey::create()
							.from(Containers::Table, Containers::ParentUuid)
							.to(Containers::Table, Containers::Uuid)
							.on_delete(ForeignKeyAction::Cascade),
					)
					.foreign_key(
						ForeignKey::create()
							.from(Containers::Table, Containers::CreatedByActorUuid)
							.to(Actors::Table, Actors::Uuid),
					)
					.to_owned(),
			)
			.await?;

		manager
			.create_table(
				Table::create()
					.table(Tasks::Table)
					.if_not_exists()
					.col(
						ColumnDef::new(Tasks::Id)
							.integer()
							.not_null()
							.auto_increment()
							.primary_key(),
					)
					.col(ColumnDef::new(Tasks::Uuid).uuid().not_null().unique_key())
					.col(
						ColumnDef::new(Tasks::FriendlyId)
							.string()
							.not_null()
							.unique_key(),
					)
					.col(ColumnDef::new(Tasks::Slug).string().not_null())
					.col(ColumnDef::new(Tasks::Title).string().not_null())
					.col(
						ColumnDef::new(Tasks::Description)
							.text()
							.not_null()
							.default(""),
					)
					.col(ColumnDef::new(Tasks::State).string().not_null())
					.col(ColumnDef::new(Tasks::Priority).integer().not_null())
					.col(ColumnDef::new(Tasks::Kind).string().not_null())
					.col(ColumnDef::new(Tasks::ProjectUuid).uuid().not_null())
					.col(ColumnDef::new(Tasks::ParentTaskUuid).uuid())
					.col(ColumnDef::new(Tasks::AssigneeActorUuid).uuid())
					.col(ColumnDef::new(Tasks::StartAt).timestamp_with_time_zone())
					.col(ColumnDef::new(Tasks::DueAt).timestamp_with_time_zone())
					.col(ColumnDef::new(Tasks::Labels).json().not_null())
					.col(ColumnDef::new(Tasks::Meta).json().not_null())
					.col(
						ColumnDef::new(Tasks::Etag)
							.big_integer()
							.not_null()
							.default(1),
					)
					.col(ColumnDef::new(Tasks::CreatedByActorUuid).uuid().not_null())
					.col(ColumnDef::new(Tasks::UpdatedByActorUuid).uuid())
					.col(
						ColumnDef::new(Tasks::CreatedAt)
							.timestamp_with_time_zone()
							.not_null(),
					)
					.col(
						ColumnDef::new(Tasks::UpdatedAt)
							.timestamp_with_time_zone()
							.not_null(),
					)
					.col(ColumnDef::new(Tasks::CompletedAt).timestamp_with_time_zone())
					.col(ColumnDef::new(Tasks::ArchivedAt).timestamp_with_time_zone())
					.col(ColumnDef::new(Tasks::DeletedAt).timestamp_with_time_zone())
					.foreign_key(
						ForeignKey::create()
							.from(Tasks::Table, Tasks::ProjectUuid)
							.to(Containers::Table, Containers::Uuid)
							.on_delete(ForeignKeyAction::Cascade),
					)
					.foreign_key(
						ForeignKey::create()
							.from(Tasks::Table, Tasks::ParentTaskUuid)
							.to(Tasks::Table, Tasks::Uuid)
							.on_delete(ForeignKeyAction::SetNull),
					)
					.foreign_key(
						ForeignKey::create()
							.from(Tasks::Table, Tasks::AssigneeActorUuid)
							.to(Actors::Table, Actors::Uuid)
							.on_delete(ForeignKeyAction::SetNull),
					)
					.foreign_key(
						ForeignKey::create()
							.from(Tasks::Table, Tasks::CreatedByActorUuid)
							.to(Actors::Table, Actors::Uuid),
					)
					.to_owned(),
			)
			.await?;

		manager
			.create_table(
				Table::create()
					.table(Comments::Table)
					.if_not_exists()
					.col(
						ColumnDef::new(Comments::Id)
							.integer()
							.not_null()
							.auto_increment()
							.primary_key(),
					)
					.col(ColumnDef::new(Comments::Uuid).uuid().not_null().unique_key())
					.col(
						ColumnDef::new(Comments::FriendlyId)
							.string()
							.not_null()
							.unique_key(),
					)
					.col(ColumnDef::new(Comments::TaskUuid).uuid().not_null())
					.col(ColumnDef::new(Comments::ActorUuid).uuid().not_null())
					.col(ColumnDef::new(Comments::Body).text().not_null())
					.col(ColumnDef::new(Comments::Meta).json())
					.col(
						ColumnDef::new(Comments::Etag)
							.big_integer()
							.not_null()
							.default(1),
					)
					.col(
						ColumnDef::new(Comments::CreatedAt)
							.timestamp_with_time_zone()
							.not_null(),
					)
					.col(
						ColumnDef::new(Comments::UpdatedAt)
							.timestamp_with_time_zone()
							.not_null(),
					)
					.col(ColumnDef::new(Comments::DeletedAt).timestamp_with_time_zone())
					.foreign_key(
						ForeignKey::create()
							.from(Comments::Table, Comments::TaskUuid)
							.to(Tasks::Table, Tasks::Uuid)
							.on_delete(ForeignKeyAction::Cascade),
					)
					.foreign_key(
						ForeignKey::create()
							.from(Comments::Table, Comments::ActorUuid)
							.to(Actors::Table, Actors::Uuid),
					)
					.to_owned(),
			)
			.await?;

		manager
			.create_table(
				Table::create()
					.table(TaskRelations::Table)
					.if_not_exists()
					.col(
						ColumnDef::new(TaskRelations::Id)
							.integer()
							.not_null()
							.auto_increment()
							.primary_key(),
					)
					.col(ColumnDef::new(TaskRelations::FromTaskUuid).uuid().not_null())
					.col(ColumnDef::new(TaskRelations::ToTaskUuid).uuid().not_null())
					.col(ColumnDef::new(TaskRelations::Kind).string().not_null())
					.col(
						ColumnDef::new(TaskRelations::CreatedByActorUuid)
							.uuid()
							.not_null(),
					)
					.col(
						ColumnDef::new(TaskRelations::CreatedAt)
							.timestamp_with_time_zone()
							.not_null(),
					)
					.foreign_key(
						ForeignKey::create()
							.from(TaskRelations::Table, TaskRelations::FromTaskUuid)
							.to(Tasks::Table, Tasks::Uuid)
							.on_delete(ForeignKeyAction::Cascade),
					)
					.foreign_key(
						ForeignKey::create()
							.from(TaskRelations::Table, TaskRelations::ToTaskUuid)
							.to(Tasks::Table, Tasks::Uuid)
							.on_delete(ForeignKeyAction::Cascade),
					)
					.to_owned(),
			)
			.await?;

		manager
			.create_table(
				Table::create()
					.table(Attachments::Table)
					.if_not_exists()
					.col(
						ColumnDef::new(Attachments::Id)
							.integer()
							.not_null()
							.auto_increment()
							.primary_key(),
					)
					.col(
						ColumnDef::new(Attachments::Uuid)
							.uuid()
							.not_null()
							.unique_key(),
					)
					.col(
						ColumnDef::new(Attachments::FriendlyId)
							.string()
							.not_null()
							.unique_key(),
					)
					.col(ColumnDef::new(Attachments::TaskUuid).uuid().not_null())
					.col(ColumnDef::new(Attachments::Filename).string().not_null())
					.col(ColumnDef::new(Attachments::RelPath).string().not_null())
					.col(ColumnDef::new(Attachments::Mime).string().not_null())
					.col(
						ColumnDef::new(Attachments::SizeBytes)
							.big_integer()
							.not_null(),
					)
					.col(ColumnDef::new(Attachments::Checksum).string().not_null())
					.col(
						ColumnDef::new(Attachments::Etag)
							.big_integer()
							.not_null()
							.default(1),
					)
					.col(
						ColumnDef::new(Attachments::CreatedByActorUuid)
							.uuid()
							.not_null(),
					)
					.col(
						ColumnDef::new(Attachments::CreatedAt)
							.timestamp_with_time_zone()
							.not_null(),
					)
					.foreign_key(
						ForeignKey::create()
							.from(Attachments::Table, Attachments::TaskUuid)
							.to(Tasks::Table, Tasks::Uuid)
							.on_delete(ForeignKeyAction::Cascade),
					)
					.to_owned(),
			)
			.await?;

		// Events carry no foreign keys: they outlive purge
		manager
			.create_table(
				Table::create()
					.table(Events::Table)
					.if_not_exists()
					.col(
						ColumnDef::new(Events::Id)
							.integer()
							.not_null()
							.auto_increment()
							.primary_key(),
					)
					.col(
						ColumnDef::new(Events::Ts)
							.timestamp_with_time_zone()
							.not_null(),
					)
					.col(ColumnDef::new(Events::ActorUuid).uuid())
					.col(ColumnDef::new(Events::ResourceType).string().not_null())
					.col(ColumnDef::new(Events::ResourceUuid).uuid().not_null())
					.col(ColumnDef::new(Events::EventType).string().not_null())
					.col(ColumnDef::new(Events::Etag).big_integer())
					.col(ColumnDef::new(Events::Payload).json())
					.to_owned(),
			)
			.await?;

		manager
			.create_table(
				Table::create()
					.table(IdSequences::Table)
					.if_not_exists()
					.col(
						ColumnDef::new(IdSequences::Kind)
							.string()
							.not_null()
							.primary_key(),
					)
					.col(ColumnDef::new(IdSequences::Next).big_integer().not_null())
					.to_owned(),
			)
			.await?;

		// Seed the per-kind counters
		for kind in [
			"next_task",
			"next_container",
			"next_actor",
			"next_comment",
			"next_attachment",
		] {
			manager
				.exec_stmt(
					Query::insert()
						.into_table(IdSequences::Table)
						.columns([IdSequences::Kind, IdSequences::Next])
						.values_panic([kind.into(), 1i64.into()])
						.to_owned(),
				)
				.await?;
		}

		// Filter-column indexes
		manager
			.create_index(
				Index::create()
					.name("idx_tasks_project_slug")
					.table(Tasks::Table)
					.col(Tasks::ProjectUuid)
					.col(Tasks::Slug)
					.unique()
					.to_owned(),
			)
			.await?;
		manager
			.create_index(
				Index::create()
					.name("idx_tasks_state")
					.table(Tasks::Table)
					.col(Tasks::State)
					.to_owned(),
			)
			.await?;
		manager
			.create_index(
				Index::create()
					.name("idx_tasks_priority")
					.table(Tasks::Table)
					.col(Tasks::Priority)
					.to_owned(),
			)
			.await?;
		manager
			.create_index(
				Index::create()
					.name("idx_tasks_due_at")
					.table(Tasks::Table)
					.col(Tasks::DueAt)
					.to_owned(),
			)
			.await?;
		manager
			.create_index(
				Index::create()
					.name("idx_tasks_archived_at")
					.table(Tasks::Table)
					.col(Tasks::ArchivedAt)
					.to_owned(),
			)
			.await?;
		manager
			.create_index(
				Index::create()
					.name("idx_tasks_deleted_at")
					.table(Tasks::Table)
					.col(Tasks::DeletedAt)
					.to_owned(),
			)
			.await?;
		manager
			.create_index(
				Index::create()
					.name("idx_tasks_assignee")
					.table(Tasks::Table)
					.col(Tasks::AssigneeActorUuid)
					.to_owned(),
			)
			.await?;
		manager
			.create_index(
				Index::create()
					.name("idx_tasks_parent_task")
					.table(Tasks::Table)
					.col(Tasks::ParentTaskUuid)
					.to_owned(),
			)
			.await?;
		manager
			.create_index(
				Index::create()
					.name("idx_containers_parent")
					.table(Containers::Table)
					.col(Containers::ParentUuid)
					.to_owned(),
			)
			.await?;
		manager
			.create_index(
				Index::create()
					.name("idx_comments_task")
					.table(Comments::Table)
					.col(Comments::TaskUuid)
					.to_owned(),
			)
			.await?;
		manager
			.create_index(
				Index::create()
					.name("idx_relations_from_to_kind")
					.table(TaskRelations::Table)
					.col(TaskRelations::FromTaskUuid)
					.col(TaskRelations::ToTaskUuid)
					.col(TaskRelations::Kind)
					.unique()
					.to_owned(),
			)
			.await?;
		manager
			.create_index(
				Index::create()
					.name("idx_relations_to")
					.table(TaskRelations::Table)
					.col(TaskRelations::ToTaskUuid)
					.to_owned(),
			)
			.await?;
		manager
			.create_index(
				Index::create()
					.name("idx_attachments_task_filename")
					.table(Attachments::Table)
					.col(Attachments::TaskUuid)
					.col(Attachments::Filename)
					.unique()
					.to_owned(),
			)
			.await?;
		manager
			.create_index(
				Index::create()
					.name("idx_events_resource")
					.table(Events::Table)
					.col(Events::ResourceUuid)
					.to_owned(),
			)
			.await?;

		Ok(())
	}

	async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
		manager
			.drop_table(Table::drop().table(IdSequences::Table).to_owned())
			.await?;
		manager
			.drop_table(Table::drop().table(Events::Table).to_owned())
			.await?;
		manager
			.drop_table(Table::drop().table(Attachments::Table).to_owned())
			.await?;
		manager
			.drop_table(Table::drop().table(TaskRelations::Table).to_owned())
			.await?;
		manager
			.drop_table(Table::drop().table(Comments::Table).to_owned())
			.await?;
		manager
			.drop_table(Table::drop().table(Tasks::Table).to_owned())
			.await?;
		manager
			.drop_table(Table::drop().table(Containers::Table).to_owned())
			.await?;
		manager
			.drop_table(Table::drop().table(Actors::Table).to_owned())
			.await?;
		Ok(())
	}
}

#[derive(Iden)]
enum Actors {
	Table,
	Id,
	Uuid,
	FriendlyId,
	Slug,
	DisplayName,
	Role,
	Etag,
	CreatedAt,
	UpdatedAt,
}

#[derive(Iden)]
enum Containers {
	Table,
	Id,
	Uuid,
	FriendlyId,
	Slug,
	Title,
	Description,
	Kind,
	ParentUuid,
	SortIndex,
	WebhookUrls,
	Etag,
	CreatedByActorUuid,
	UpdatedByActorUuid,
	CreatedAt,
	UpdatedAt,
	ArchivedAt,
}

#[derive(Iden)]
enum Tasks {
	Table,
	Id,
	Uuid,
	FriendlyId,
	Slug,
	Title,
	Description,
	State,
	Priority,
	Kind,
	ProjectUuid,
	ParentTaskUuid,
	AssigneeActorUuid,
	StartAt,
	DueAt,
	Labels,
	Meta,
	Etag,
	CreatedByActorUuid,
	UpdatedByActorUuid,
	CreatedAt,
	UpdatedAt,
	CompletedAt,
	ArchivedAt,
	DeletedAt,
}

#[derive(Iden)]
enum Comments {
	Table,
	Id,
	Uuid,
	FriendlyId,
	TaskUuid,
	ActorUuid,
	Body,
	Meta,
	Etag,
	CreatedAt,
	UpdatedAt,
	DeletedAt,
}

#[derive(Iden)]
enum TaskRelations {
	Table,
	Id,
	FromTaskUuid,
	ToTaskUuid,
	Kind,
	CreatedByActorUuid,
	CreatedAt,
}

#[derive(Iden)]
enum Attachments {
	Table,
	Id,
	Uuid,
	FriendlyId,
	TaskUuid,
	Filename,
	RelPath,
	Mime,
	SizeBytes,
	Checksum,
	Etag,
	CreatedByActorUuid,
	CreatedAt,
}

#[derive(Iden)]
enum Events {
	Table,
	Id,
	Ts,
	ActorUuid,
	ResourceType,
	ResourceUuid,
	EventType,
	Etag,
	Payload,
}

#[derive(Iden)]
enum IdSequences {
	Table,
	Kind,
	Next,
}
