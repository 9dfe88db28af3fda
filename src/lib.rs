//! wrkq core
//!
//! Task-tracking engine for collaboration between humans and coding agents.
//! Hierarchical containers and tasks over a single embedded SQLite file, with
//! etag optimistic concurrency, an append-only event journal, canonical
//! snapshots, and portable per-project bundles. A thin CLI and an optional
//! HTTP daemon front the same store.

pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod operations;
pub mod shared;

/// Version of the machine-facing interface (snapshots, bundles, daemon wire
/// format). Imports refuse material produced under a different version.
pub const MACHINE_INTERFACE_VERSION: &str = "1";
