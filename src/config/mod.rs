//! Effective configuration.
//!
//! Merged once at process entry from defaults → config file → environment →
//! flags, then passed by value into every component. No ambient singleton.

use crate::shared::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variables, each shadowing one setting.
const ENV_DIR: &str = "WRKQ_DIR";
const ENV_DB: &str = "WRKQ_DB";
const ENV_ATTACH_DIR: &str = "WRKQ_ATTACH_DIR";
const ENV_ACTOR: &str = "WRKQ_ACTOR";
const ENV_PROJECT_ROOT: &str = "WRKQ_PROJECT_ROOT";
const ENV_BIND: &str = "WRKQ_BIND";
const ENV_TOKEN: &str = "WRKQ_TOKEN";

#[derive(Debug, Clone, Serialize)]
pub struct WrkqConfig {
	/// Root directory holding the database and attachments.
	pub data_dir: PathBuf,
	pub db_path: PathBuf,
	pub attach_dir: PathBuf,
	/// Slug of the acting principal; resolved to a UUID at the boundary.
	pub actor: String,
	/// Optional path prefix applied to un-rooted path references.
	pub project_root: Option<String>,
	/// `host:port`, or `unix:/path/to.sock`.
	pub bind: String,
	/// Daemon bearer token; no token means no auth required.
	pub token: Option<String>,
}

/// Flag-level overrides, highest precedence.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
	pub data_dir: Option<PathBuf>,
	pub db_path: Option<PathBuf>,
	pub attach_dir: Option<PathBuf>,
	pub actor: Option<String>,
	pub project_root: Option<String>,
	pub bind: Option<String>,
	pub token: Option<String>,
}

/// On-disk shape, `<data_dir>/config.toml`. Every key optional.
#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigFile {
	db_path: Option<PathBuf>,
	attach_dir: Option<PathBuf>,
	actor: Option<String>,
	project_root: Option<String>,
	bind: Option<String>,
	token: Option<String>,
}

fn env_var(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl WrkqConfig {
	pub fn resolve(overrides: Overrides) -> Result<Self> {
		let data_dir = overrides
			.data_dir
			.or_else(|| env_var(ENV_DIR).map(PathBuf::from))
			.or_else(|| dirs::data_dir().map(|d| d.join("wrkq")))
			.ok_or_else(|| Error::Validation("could not determine a data directory".into()))?;

		let file = Self::load_file(&data_dir)?;

		let db_path = overrides
			.db_path
			.or_else(|| env_var(ENV_DB).map(PathBuf::from))
			.or(file.db_path)
			.unwrap_or_else(|| data_dir.join("wrkq.db"));
		let attach_dir = overrides
			.attach_dir
			.or_else(|| env_var(ENV_ATTACH_DIR).map(PathBuf::from))
			.or(file.attach_dir)
			.unwrap_or_else(|| data_dir.join("attachments"));
		let actor = overrides
			.actor
			.or_else(|| env_var(ENV_ACTOR))
			.or(file.actor)
			.unwrap_or_else(|| "system".to_owned());
		let project_root = overrides
			.project_root
			.or_else(|| env_var(ENV_PROJECT_ROOT))
			.or(file.project_root)
			.filter(|p| !p.is_empty());
		let bind = overrides
			.bind
			.or_else(|| env_var(ENV_BIND))
			.or(file.bind)
			.unwrap_or_else(|| "127.0.0.1:8377".to_owned());
		let token = overrides
			.token
			.or_else(|| env_var(ENV_TOKEN))
			.or(file.token)
			.filter(|t| !t.is_empty());

		Ok(Self {
			data_dir,
			db_path,
			attach_dir,
			actor,
			project_root,
			bind,
			token,
		})
	}

	fn load_file(data_dir: &PathBuf) -> Result<ConfigFile> {
		let path = data_dir.join("config.toml");
		if !path.exists() {
			return Ok(ConfigFile::default());
		}
		let text = std::fs::read_to_string(&path)?;
		toml::from_str(&text)
			.map_err(|e| Error::Validation(format!("invalid config {}: {e}", path.display())))
	}

	pub fn ensure_directories(&self) -> Result<()> {
		std::fs::create_dir_all(&self.data_dir)?;
		if let Some(parent) = self.db_path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		std::fs::create_dir_all(&self.attach_dir)?;
		Ok(())
	}

	/// Default location for snapshots and bundles under the data root.
	pub fn wrkq_dir(&self) -> PathBuf {
		self.data_dir.join(".wrkq")
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn flag_overrides_beat_defaults() {
		let cfg = WrkqConfig::resolve(Overrides {
			data_dir: Some(PathBuf::from("/tmp/wrkq-test")),
			actor: Some("robot".into()),
			..Default::default()
		})
		.unwrap();
		assert_eq!(cfg.data_dir, PathBuf::from("/tmp/wrkq-test"));
		assert_eq!(cfg.db_path, PathBuf::from("/tmp/wrkq-test/wrkq.db"));
		assert_eq!(cfg.actor, "robot");
		assert!(cfg.token.is_none());
	}
}
