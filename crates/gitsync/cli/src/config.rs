//! gitsync configuration
//!
//! Layered as defaults, then an optional file, then `GITSYNC_`-prefixed
//! environment variables. Nested keys use a double underscore, e.g.
//! `GITSYNC_LOCK__TTL_SECS=600`.

use gitsync_engine::PassConfig;
use gitsync_types::WorkspaceId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Workspace the pass runs against; one pass per workspace at a time
    #[serde(default = "default_workspace")]
    pub workspace: String,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub lock: LockConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            storage: StorageConfig::default(),
            lock: LockConfig::default(),
            engine: EngineConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Storage backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Process-local store; every invocation starts empty
    #[default]
    Memory,

    /// PostgreSQL; the sync lock lives in the same database
    Postgres {
        url: String,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        #[serde(default = "default_connect_timeout")]
        connect_timeout_secs: u64,
    },
}

impl StorageConfig {
    pub fn backend_name(&self) -> &'static str {
        match self {
            StorageConfig::Memory => "memory",
            StorageConfig::Postgres { .. } => "postgres",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// Lease length; only matters when a holder dies without releasing
    #[serde(default = "default_lock_ttl")]
    pub ttl_secs: u64,

    #[serde(default = "default_lock_owner")]
    pub owner: String,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_lock_ttl(),
            owner: default_lock_owner(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// `created_by` written on rows a pass creates
    #[serde(default = "default_origin_marker")]
    pub origin_marker: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            origin_marker: default_origin_marker(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_workspace() -> String {
    "default".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_lock_ttl() -> u64 {
    300
}

fn default_lock_owner() -> String {
    "gitsync".to_string()
}

fn default_origin_marker() -> String {
    "git-sync".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl SyncConfig {
    /// Load configuration from an optional file plus the environment
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&SyncConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("GITSYNC")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    pub fn workspace_id(&self) -> WorkspaceId {
        WorkspaceId::new(self.workspace.clone())
    }

    pub fn pass_config(&self) -> PassConfig {
        PassConfig {
            origin_marker: self.engine.origin_marker.clone(),
            lock_owner: self.lock.owner.clone(),
            lock_ttl: Duration::from_secs(self.lock.ttl_secs),
        }
    }
}
