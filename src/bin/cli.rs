//! wrkq CLI.
//!
//! A thin surface over the engine: flags map straight onto store operations
//! and output is plain lines or JSON. Exit codes: 0 success, 1 generic,
//! 2 usage, 4 conflict, 5 partial success.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use wrkq::config::{Overrides, WrkqConfig};
use wrkq::domain::fields::{parse_container_kind, parse_relation_kind, parse_role, parse_state};
use wrkq::infrastructure::database::{paths, Database};
use wrkq::infrastructure::http;
use wrkq::operations::{
	actors, attachments, bundle, comments, containers, doctor, find, relations,
	resolver::Resolver, snapshot, tasks, watch, webhooks,
};
use wrkq::shared::Error;

#[derive(Parser)]
#[command(name = "wrkq", version, about = "Task tracking for humans and coding agents")]
struct Cli {
	#[command(flatten)]
	global: GlobalArgs,

	/// Emit JSON instead of plain lines.
	#[arg(long, global = true)]
	json: bool,

	#[command(subcommand)]
	command: Command,
}

#[derive(Args)]
struct GlobalArgs {
	/// Data directory root.
	#[arg(long, global = true, env = "WRKQ_DIR")]
	dir: Option<PathBuf>,

	/// Database file path.
	#[arg(long, global = true)]
	db: Option<PathBuf>,

	/// Attachments directory.
	#[arg(long, global = true)]
	attach_dir: Option<PathBuf>,

	/// Acting principal (actor slug, friendly ID, or UUID).
	#[arg(long, global = true)]
	actor: Option<String>,

	/// Project root prefix for path references.
	#[arg(long, global = true)]
	project_root: Option<String>,
}

#[derive(Subcommand)]
enum Command {
	/// Create the store, apply migrations, seed the system actor.
	Init,
	#[command(subcommand)]
	Actor(ActorCmd),
	#[command(subcommand)]
	Container(ContainerCmd),
	#[command(subcommand)]
	Task(TaskCmd),
	#[command(subcommand)]
	Comment(CommentCmd),
	#[command(subcommand)]
	Rel(RelCmd),
	#[command(subcommand)]
	Attach(AttachCmd),
	/// Filtered listing with cursor pagination.
	Find(FindArgs),
	/// Container tree.
	Tree {
		path: Option<String>,
		#[arg(long)]
		depth: Option<u32>,
		#[arg(long)]
		include_archived: bool,
	},
	#[command(subcommand)]
	Snapshot(SnapshotCmd),
	#[command(subcommand)]
	Bundle(BundleCmd),
	/// Tail the event journal.
	Watch {
		#[arg(long, default_value_t = 0)]
		after: i32,
		#[arg(long)]
		follow: bool,
		/// Poll interval in seconds when following.
		#[arg(long, default_value_t = 2)]
		interval: u64,
	},
	/// Health checks.
	Doctor,
	/// Run the HTTP daemon.
	Daemon {
		#[arg(long)]
		bind: Option<String>,
		#[arg(long)]
		token: Option<String>,
	},
}

#[derive(Subcommand)]
enum ActorCmd {
	Add {
		slug: String,
		#[arg(long)]
		name: Option<String>,
		#[arg(long, default_value = "human")]
		role: String,
	},
	List,
}

#[derive(Subcommand)]
enum ContainerCmd {
	/// Create a container at a path; parents must exist.
	Add {
		path: String,
		#[arg(long)]
		title: Option<String>,
		#[arg(long, default_value = "project")]
		kind: String,
		#[arg(long, default_value_t = 0)]
		sort_index: i64,
		#[arg(long = "webhook")]
		webhooks: Vec<String>,
	},
	/// Update recognized fields (`field=value` pairs).
	Set {
		reference: String,
		fields: Vec<String>,
		#[arg(long, default_value_t = 0)]
		if_match: i64,
	},
	Archive {
		reference: String,
		#[arg(long)]
		recurse: bool,
		#[arg(long, default_value_t = 0)]
		if_match: i64,
	},
	Restore {
		reference: String,
		#[arg(long, default_value_t = 0)]
		if_match: i64,
	},
	Purge {
		reference: String,
		#[arg(long, default_value_t = 0)]
		if_match: i64,
	},
}

#[derive(Subcommand)]
enum TaskCmd {
	/// Create a task at `<container-path>/<slug>` or from an explicit title.
	Add {
		path: String,
		#[arg(long)]
		title: Option<String>,
		#[arg(long, default_value = "open")]
		state: String,
		#[arg(long, default_value_t = 2)]
		priority: i64,
		#[arg(long, default_value = "task")]
		kind: String,
		#[arg(long)]
		description: Option<String>,
		#[arg(long)]
		parent: Option<String>,
		#[arg(long)]
		assignee: Option<String>,
		#[arg(long)]
		due: Option<String>,
		#[arg(long)]
		start: Option<String>,
		#[arg(long = "label")]
		labels: Vec<String>,
	},
	Show {
		reference: String,
	},
	/// Update recognized fields (`field=value` pairs; values parse as JSON
	/// when they can).
	Set {
		reference: String,
		fields: Vec<String>,
		#[arg(long, default_value_t = 0)]
		if_match: i64,
	},
	Archive {
		reference: String,
		#[arg(long, default_value_t = 0)]
		if_match: i64,
	},
	/// Soft delete.
	Rm {
		reference: String,
		#[arg(long, default_value_t = 0)]
		if_match: i64,
	},
	Restore {
		reference: String,
		#[arg(long)]
		state: Option<String>,
		#[arg(long)]
		container: Option<String>,
		#[arg(long, default_value_t = 0)]
		if_match: i64,
	},
	/// Hard delete, including attachment files.
	Purge {
		reference: String,
		#[arg(long, default_value_t = 0)]
		if_match: i64,
	},
	/// Tasks actively blocking this one.
	Blocked {
		reference: String,
	},
}

#[derive(Subcommand)]
enum CommentCmd {
	Add {
		task: String,
		body: String,
	},
	Ls {
		task: String,
		#[arg(long)]
		include_deleted: bool,
	},
	Rm {
		comment: String,
		#[arg(long, default_value_t = 0)]
		if_match: i64,
	},
	/// Append-only edit: successor comment plus soft delete.
	Edit {
		comment: String,
		body: String,
		#[arg(long, default_value_t = 0)]
		if_match: i64,
	},
}

#[derive(Subcommand)]
enum RelCmd {
	Add {
		from: String,
		kind: String,
		to: String,
	},
	Rm {
		from: String,
		kind: String,
		to: String,
	},
	Ls {
		task: String,
	},
}

#[derive(Subcommand)]
enum AttachCmd {
	Put {
		task: String,
		file: PathBuf,
		#[arg(long)]
		mime: Option<String>,
		#[arg(long)]
		name: Option<String>,
	},
	Ls {
		task: String,
	},
	Get {
		task: String,
		filename: String,
		#[arg(long)]
		out: Option<PathBuf>,
	},
	Rm {
		task: String,
		filename: String,
	},
}

#[derive(Args)]
struct FindArgs {
	/// Path prefixes.
	paths: Vec<String>,
	#[arg(long, default_value = "tasks")]
	r#type: String,
	#[arg(long)]
	slug: Option<String>,
	#[arg(long)]
	state: Option<String>,
	#[arg(long)]
	kind: Option<String>,
	#[arg(long)]
	assignee: Option<String>,
	#[arg(long)]
	parent: Option<String>,
	#[arg(long)]
	due_before: Option<String>,
	#[arg(long)]
	due_after: Option<String>,
	#[arg(long, default_value = "updated_at")]
	sort: String,
	#[arg(long, default_value_t = 0)]
	limit: u64,
	#[arg(long)]
	cursor: Option<String>,
}

#[derive(Subcommand)]
enum SnapshotCmd {
	Export {
		#[arg(long)]
		out: Option<PathBuf>,
		#[arg(long)]
		events: bool,
	},
	Import {
		file: PathBuf,
		#[arg(long)]
		dry_run: bool,
		#[arg(long)]
		force: bool,
	},
	Verify {
		file: PathBuf,
		#[arg(long)]
		events: bool,
	},
}

#[derive(Subcommand)]
enum BundleCmd {
	Create {
		project: String,
		#[arg(long)]
		out: PathBuf,
		#[arg(long)]
		attachments: bool,
		#[arg(long)]
		events: bool,
	},
	Apply {
		dir: PathBuf,
		#[arg(long)]
		continue_on_error: bool,
		#[arg(long)]
		dest_root: Option<String>,
	},
}

fn main() {
	let cli = Cli::parse();
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
		)
		.with_writer(std::io::stderr)
		.init();

	let runtime = match tokio::runtime::Runtime::new() {
		Ok(rt) => rt,
		Err(e) => {
			eprintln!("error: {e}");
			std::process::exit(1);
		}
	};
	let code = match runtime.block_on(run(cli)) {
		Ok(code) => code,
		Err(e) => {
			eprintln!("error: {e}");
			e.exit_code()
		}
	};
	std::process::exit(code);
}

fn parse_kv(pairs: &[String]) -> Result<serde_json::Map<String, serde_json::Value>, Error> {
	let mut map = serde_json::Map::new();
	for pair in pairs {
		let (key, raw) = pair
			.split_once('=')
			.ok_or_else(|| Error::Validation(format!("expected field=value, got {pair:?}")))?;
		// JSON when it parses, bare string otherwise.
		let value = serde_json::from_str(raw)
			.unwrap_or_else(|_| serde_json::Value::String(raw.to_owned()));
		map.insert(key.to_owned(), value);
	}
	Ok(map)
}

fn emit<T: serde::Serialize>(json: bool, value: &T, line: impl FnOnce() -> String) {
	if json {
		match serde_json::to_string_pretty(value) {
			Ok(s) => println!("{s}"),
			Err(e) => eprintln!("error: {e}"),
		}
	} else {
		println!("{}", line());
	}
}

async fn run(cli: Cli) -> Result<i32, Error> {
	let config = WrkqConfig::resolve(Overrides {
		data_dir: cli.global.dir,
		db_path: cli.global.db,
		attach_dir: cli.global.attach_dir,
		actor: cli.global.actor,
		project_root: cli.global.project_root,
		..Default::default()
	})?;
	let resolver = Resolver::new(config.project_root.clone());
	let json = cli.json;

	if let Command::Init = cli.command {
		config.ensure_directories()?;
		let db = Database::create(&config.db_path).await?;
		db.migrate().await?;
		let system = actors::seed_defaults(db.conn()).await?;
		emit(json, &system, || {
			format!("initialized {} ({})", config.db_path.display(), system.slug)
		});
		return Ok(0);
	}

	let db = Database::open(&config.db_path).await?;
	let conn = db.conn();
	let actor = resolver.resolve_actor(conn, &config.actor).await?.uuid;

	match cli.command {
		Command::Init => unreachable!("handled above"),

		Command::Actor(cmd) => match cmd {
			ActorCmd::Add { slug, name, role } => {
				let row = actors::create(
					conn,
					Some(actor),
					actors::ActorCreate {
						display_name: name.unwrap_or_else(|| slug.clone()),
						slug,
						role: parse_role(&role)?,
					},
				)
				.await?;
				emit(json, &row, || format!("{} {}", row.friendly_id, row.slug));
			}
			ActorCmd::List => {
				let rows = actors::list(conn).await?;
				emit(json, &rows, || {
					rows.iter()
						.map(|a| format!("{} {} ({})", a.friendly_id, a.slug, a.role))
						.collect::<Vec<_>>()
						.join("\n")
				});
			}
		},

		Command::Container(cmd) => match cmd {
			ContainerCmd::Add {
				path,
				title,
				kind,
				sort_index,
				webhooks: hook_urls,
			} => {
				let (parent, leaf) = resolver.resolve_parent_container(conn, &path).await?;
				let row = containers::create(
					conn,
					actor,
					containers::ContainerCreate {
						parent_uuid: parent,
						slug: Some(leaf.clone()),
						title: title.unwrap_or(leaf),
						kind: parse_container_kind(&kind)?,
						description: String::new(),
						sort_index,
						webhook_urls: hook_urls,
					},
				)
				.await?;
				emit(json, &row, || format!("{} {}", row.friendly_id, row.slug));
			}
			ContainerCmd::Set {
				reference,
				fields,
				if_match,
			} => {
				let (c, _) = resolver.resolve_container(conn, &reference).await?;
				let fields = parse_kv(&fields)?;
				let row = containers::update_fields(conn, actor, c.uuid, &fields, if_match).await?;
				emit(json, &row, || format!("{} etag={}", row.friendly_id, row.etag));
			}
			ContainerCmd::Archive {
				reference,
				recurse,
				if_match,
			} => {
				let (c, _) = resolver.resolve_container(conn, &reference).await?;
				let row = containers::archive(conn, actor, c.uuid, recurse, if_match).await?;
				emit(json, &row, || format!("archived {}", row.friendly_id));
			}
			ContainerCmd::Restore { reference, if_match } => {
				let (c, _) = resolver.resolve_container(conn, &reference).await?;
				let row = containers::restore(conn, actor, c.uuid, if_match).await?;
				emit(json, &row, || format!("restored {}", row.friendly_id));
			}
			ContainerCmd::Purge { reference, if_match } => {
				let (c, path) = resolver.resolve_container(conn, &reference).await?;
				containers::purge(conn, actor, c.uuid, &config.attach_dir, if_match).await?;
				println!("purged {path}");
			}
		},

		Command::Task(cmd) => match cmd {
			TaskCmd::Add {
				path,
				title,
				state,
				priority,
				kind,
				description,
				parent,
				assignee,
				due,
				start,
				labels,
			} => {
				let (parent_container, leaf) =
					resolver.resolve_parent_container(conn, &path).await?;
				let container_uuid = parent_container.ok_or_else(|| {
					Error::Validation(format!(
						"task path needs a container: {path:?}"
					))
				})?;
				let mut params =
					tasks::TaskCreate::new(container_uuid, title.unwrap_or_else(|| leaf.clone()));
				params.slug = Some(leaf);
				params.state = parse_state(&state)?;
				params.priority = priority;
				params.kind = wrkq::domain::fields::parse_task_kind(&kind)?;
				params.description = description.unwrap_or_default();
				params.labels = labels;
				if let Some(p) = &parent {
					params.parent_task = Some(resolver.resolve_task(conn, p).await?.uuid);
				}
				if let Some(a) = &assignee {
					params.assignee = Some(resolver.resolve_actor(conn, a).await?.uuid);
				}
				if let Some(d) = &due {
					params.due_at = Some(wrkq::operations::parse_ts("due", d)?);
				}
				if let Some(s) = &start {
					params.start_at = Some(wrkq::operations::parse_ts("start", s)?);
				}
				let row = tasks::create(conn, actor, params).await?;
				emit(json, &row, || format!("{} {}", row.friendly_id, row.slug));
			}
			TaskCmd::Show { reference } => {
				let row = resolver.resolve_task(conn, &reference).await?;
				let path = paths::task_path(conn, row.uuid).await?.unwrap_or_default();
				emit(json, &row, || {
					format!(
						"{} {} [{}] p{} etag={}",
						row.friendly_id, path, row.state, row.priority, row.etag
					)
				});
			}
			TaskCmd::Set {
				reference,
				fields,
				if_match,
			} => {
				let t = resolver.resolve_task(conn, &reference).await?;
				let fields = parse_kv(&fields)?;
				let row = tasks::update_fields(conn, actor, t.uuid, &fields, if_match).await?;
				emit(json, &row, || format!("{} etag={}", row.friendly_id, row.etag));
			}
			TaskCmd::Archive { reference, if_match } => {
				let t = resolver.resolve_task(conn, &reference).await?;
				let row = tasks::archive(conn, actor, t.uuid, if_match).await?;
				emit(json, &row, || format!("archived {}", row.friendly_id));
			}
			TaskCmd::Rm { reference, if_match } => {
				let t = resolver.resolve_task(conn, &reference).await?;
				let row = tasks::soft_delete(conn, actor, t.uuid, if_match).await?;
				emit(json, &row, || format!("deleted {}", row.friendly_id));
			}
			TaskCmd::Restore {
				reference,
				state,
				container,
				if_match,
			} => {
				let t = resolver.resolve_task(conn, &reference).await?;
				let mut opts = tasks::RestoreOptions {
					if_match,
					..Default::default()
				};
				if let Some(s) = &state {
					opts.target_state = Some(parse_state(s)?);
				}
				if let Some(c) = &container {
					opts.new_container =
						Some(resolver.resolve_container(conn, c).await?.0.uuid);
				}
				let (row, report) = tasks::restore(conn, actor, t.uuid, opts).await?;
				emit(json, &report, || {
					format!("restored {} (+{} descendants)", row.friendly_id, report.restored.len() - 1)
				});
				if !report.failed.is_empty() {
					return Ok(5);
				}
			}
			TaskCmd::Purge { reference, if_match } => {
				let t = resolver.resolve_task(conn, &reference).await?;
				tasks::purge(conn, actor, t.uuid, &config.attach_dir, if_match).await?;
				println!("purged {}", t.friendly_id);
			}
			TaskCmd::Blocked { reference } => {
				let t = resolver.resolve_task(conn, &reference).await?;
				let blockers = relations::blocked_by(conn, t.uuid).await?;
				emit(json, &blockers, || {
					blockers
						.iter()
						.map(|b| format!("{} {} [{}]", b.friendly_id, b.slug, b.state))
						.collect::<Vec<_>>()
						.join("\n")
				});
			}
		},

		Command::Comment(cmd) => match cmd {
			CommentCmd::Add { task, body } => {
				let t = resolver.resolve_task(conn, &task).await?;
				let row = comments::create(conn, actor, t.uuid, &body, None).await?;
				emit(json, &row, || row.friendly_id.clone());
			}
			CommentCmd::Ls {
				task,
				include_deleted,
			} => {
				let t = resolver.resolve_task(conn, &task).await?;
				let rows = comments::list(conn, t.uuid, include_deleted).await?;
				emit(json, &rows, || {
					rows.iter()
						.map(|c| format!("{} {}", c.friendly_id, c.body))
						.collect::<Vec<_>>()
						.join("\n")
				});
			}
			CommentCmd::Rm { comment, if_match } => {
				let c = resolve_comment(conn, &comment).await?;
				let row = comments::soft_delete(conn, actor, c, if_match).await?;
				emit(json, &row, || format!("deleted {}", row.friendly_id));
			}
			CommentCmd::Edit {
				comment,
				body,
				if_match,
			} => {
				let c = resolve_comment(conn, &comment).await?;
				let row = comments::edit(conn, actor, c, &body, if_match).await?;
				emit(json, &row, || format!("superseded by {}", row.friendly_id));
			}
		},

		Command::Rel(cmd) => match cmd {
			RelCmd::Add { from, kind, to } => {
				let f = resolver.resolve_task(conn, &from).await?;
				let t = resolver.resolve_task(conn, &to).await?;
				let row =
					relations::create(conn, actor, f.uuid, t.uuid, parse_relation_kind(&kind)?)
						.await?;
				emit(json, &row, || {
					format!("{} {} {}", f.friendly_id, row.kind, t.friendly_id)
				});
			}
			RelCmd::Rm { from, kind, to } => {
				let f = resolver.resolve_task(conn, &from).await?;
				let t = resolver.resolve_task(conn, &to).await?;
				relations::delete(conn, actor, f.uuid, t.uuid, parse_relation_kind(&kind)?)
					.await?;
				println!("removed");
			}
			RelCmd::Ls { task } => {
				let t = resolver.resolve_task(conn, &task).await?;
				let rows = relations::list(conn, t.uuid).await?;
				emit(json, &rows, || {
					rows.iter()
						.map(|r| format!("{} {} {}", r.from_task_uuid, r.kind, r.to_task_uuid))
						.collect::<Vec<_>>()
						.join("\n")
				});
			}
		},

		Command::Attach(cmd) => match cmd {
			AttachCmd::Put {
				task,
				file,
				mime,
				name,
			} => {
				let t = resolver.resolve_task(conn, &task).await?;
				let data = std::fs::read(&file)?;
				let filename = match name {
					Some(n) => n,
					None => file
						.file_name()
						.and_then(|n| n.to_str())
						.map(str::to_owned)
						.ok_or_else(|| {
							Error::Validation(format!("no filename in {}", file.display()))
						})?,
				};
				let row = attachments::put(
					conn,
					actor,
					t.uuid,
					&filename,
					mime.as_deref(),
					&data,
					&config.attach_dir,
				)
				.await?;
				emit(json, &row, || format!("{} {}", row.friendly_id, row.rel_path));
			}
			AttachCmd::Ls { task } => {
				let t = resolver.resolve_task(conn, &task).await?;
				let rows = attachments::list(conn, t.uuid).await?;
				emit(json, &rows, || {
					rows.iter()
						.map(|a| format!("{} {} ({} bytes)", a.friendly_id, a.filename, a.size_bytes))
						.collect::<Vec<_>>()
						.join("\n")
				});
			}
			AttachCmd::Get { task, filename, out } => {
				let t = resolver.resolve_task(conn, &task).await?;
				let row = attachments::get(conn, t.uuid, &filename).await?;
				let src = attachments::file_path(&config.attach_dir, &row);
				let dest = out.unwrap_or_else(|| PathBuf::from(&row.filename));
				std::fs::copy(&src, &dest)?;
				println!("{}", dest.display());
			}
			AttachCmd::Rm { task, filename } => {
				let t = resolver.resolve_task(conn, &task).await?;
				let row = attachments::get(conn, t.uuid, &filename).await?;
				attachments::delete(conn, actor, row.uuid, &config.attach_dir).await?;
				println!("removed {filename}");
			}
		},

		Command::Find(args) => {
			let mut query = find::FindQuery {
				slug_glob: args.slug,
				state: args.state,
				kind: args.kind,
				limit: args.limit,
				cursor: args.cursor,
				..Default::default()
			};
			for p in &args.paths {
				query.paths.push(resolver.apply_project_root(p, false)?);
			}
			query.target = match args.r#type.as_str() {
				"tasks" => find::FindTarget::Tasks,
				"containers" => find::FindTarget::Containers,
				"both" => find::FindTarget::Both,
				other => {
					return Err(Error::Validation(format!("invalid type filter {other:?}")))
				}
			};
			if let Some(a) = &args.assignee {
				query.assignee = Some(resolver.resolve_actor(conn, a).await?.uuid);
			}
			if let Some(p) = &args.parent {
				query.parent_task = Some(resolver.resolve_task(conn, p).await?.uuid);
			}
			if let Some(s) = &args.due_before {
				query.due_before = Some(wrkq::operations::parse_ts("due-before", s)?);
			}
			if let Some(s) = &args.due_after {
				query.due_after = Some(wrkq::operations::parse_ts("due-after", s)?);
			}
			query.sort = match args.sort.as_str() {
				"updated_at" => find::SortKey::UpdatedAt,
				"created_at" => find::SortKey::CreatedAt,
				"due_at" => find::SortKey::DueAt,
				"priority" => find::SortKey::Priority,
				other => return Err(Error::Validation(format!("invalid sort key {other:?}"))),
			};
			let page = find::find(conn, &query).await?;
			emit(json, &page, || {
				let mut lines: Vec<String> = page
					.containers
					.iter()
					.map(|c| format!("{} {}/ [{}]", c.friendly_id, c.path, c.kind))
					.collect();
				lines.extend(
					page.tasks
						.iter()
						.map(|t| format!("{} {} [{}] p{}", t.friendly_id, t.path, t.state, t.priority)),
				);
				if let Some(cursor) = &page.next_cursor {
					lines.push(format!("next: --cursor {cursor}"));
				}
				lines.join("\n")
			});
		}

		Command::Tree {
			path,
			depth,
			include_archived,
		} => {
			let prefix = match &path {
				Some(p) => Some(resolver.apply_project_root(p, false)?),
				None => None,
			};
			let nodes =
				containers::tree(conn, prefix.as_deref(), depth, include_archived).await?;
			emit(json, &nodes.iter().map(|n| &n.path).collect::<Vec<_>>(), || {
				nodes
					.iter()
					.map(|n| format!("{} {}", n.container.friendly_id, n.path))
					.collect::<Vec<_>>()
					.join("\n")
			});
		}

		Command::Snapshot(cmd) => match cmd {
			SnapshotCmd::Export { out, events } => {
				let text = snapshot::export(conn, events).await?;
				match out {
					Some(path) => {
						std::fs::write(&path, &text)?;
						println!("{}", path.display());
					}
					None => print!("{text}"),
				}
			}
			SnapshotCmd::Import {
				file,
				dry_run,
				force,
			} => {
				let text = std::fs::read_to_string(&file)?;
				let report = snapshot::import(
					conn,
					&text,
					snapshot::ImportOptions { dry_run, force },
				)
				.await?;
				emit(json, &report, || {
					format!(
						"imported {} containers, {} tasks{}",
						report.containers,
						report.tasks,
						if report.dry_run { " (dry run)" } else { "" }
					)
				});
			}
			SnapshotCmd::Verify { file, events } => {
				let expected = std::fs::read_to_string(&file)?;
				snapshot::verify(conn, &expected, events).await?;
				println!("ok");
			}
		},

		Command::Bundle(cmd) => match cmd {
			BundleCmd::Create {
				project,
				out,
				attachments: with_attachments,
				events: with_events,
			} => {
				let (p, _) = resolver.resolve_container(conn, &project).await?;
				let manifest = bundle::create(
					conn,
					p.uuid,
					&out,
					&config.attach_dir,
					bundle::BundleCreateOptions {
						with_attachments,
						with_events,
					},
				)
				.await?;
				emit(json, &manifest, || {
					format!(
						"bundled {} containers, {} tasks into {}",
						manifest.containers,
						manifest.tasks,
						out.display()
					)
				});
			}
			BundleCmd::Apply {
				dir,
				continue_on_error,
				dest_root,
			} => {
				let report = bundle::apply(
					conn,
					actor,
					&dir,
					&config.attach_dir,
					bundle::BundleApplyOptions {
						continue_on_error,
						dest_root,
					},
				)
				.await?;
				let partial = !report.errors.is_empty();
				emit(json, &report, || {
					format!(
						"applied: {} created, {} updated, {} skipped, {} errors",
						report.tasks_created,
						report.tasks_updated,
						report.tasks_skipped,
						report.errors.len()
					)
				});
				if partial {
					return Ok(5);
				}
			}
		},

		Command::Watch {
			after,
			follow,
			interval,
		} => {
			let watcher = watch::Watcher::new(after);
			watcher
				.run(conn, follow, Duration::from_secs(interval), |ev| {
					if json {
						println!("{}", serde_json::to_string(ev)?);
					} else {
						println!(
							"{} {} {} {}",
							ev.id, ev.ts, ev.event_type, ev.resource_uuid
						);
					}
					Ok(())
				})
				.await?;
		}

		Command::Doctor => {
			let report = doctor::run(&db, &config.db_path, &config.attach_dir).await?;
			emit(json, &report, || {
				report
					.checks
					.iter()
					.map(|c| format!("{:?} {}: {}", c.status, c.name, c.message))
					.collect::<Vec<_>>()
					.join("\n")
			});
			if matches!(report.status, doctor::CheckStatus::Error) {
				return Ok(1);
			}
		}

		Command::Daemon { bind, token } => {
			let mut config = config.clone();
			if let Some(b) = bind {
				config.bind = b;
			}
			if let Some(t) = token {
				config.token = Some(t);
			}
			let state = Arc::new(http::ApiState {
				db: Arc::new(db),
				resolver: Resolver::new(config.project_root.clone()),
				sink: Arc::new(webhooks::TraceSink),
				config,
			});
			http::serve(state).await?;
		}
	}

	Ok(0)
}

/// Comments resolve by friendly ID or UUID only; they have no path.
async fn resolve_comment(
	conn: &sea_orm::DatabaseConnection,
	reference: &str,
) -> Result<uuid::Uuid, Error> {
	use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
	use wrkq::infrastructure::database::entities::{comment, Comment};
	use wrkq::shared::ResourceKind;

	let row = if wrkq::domain::ident::is_uuid(reference) {
		Comment::find()
			.filter(comment::Column::Uuid.eq(uuid::Uuid::parse_str(reference).map_err(
				|e| Error::Validation(format!("invalid uuid {reference:?}: {e}")),
			)?))
			.one(conn)
			.await?
	} else {
		Comment::find()
			.filter(comment::Column::FriendlyId.eq(reference))
			.one(conn)
			.await?
	};
	row.map(|c| c.uuid)
		.ok_or_else(|| Error::not_found(ResourceKind::Comment, reference))
}
