//! Configuration with layered file and environment support
//!
//! Loads configuration from, later layers overriding earlier ones key by key:
//! 1. Default values
//! 2. User-level config: ~/.colloquy/colloquy.toml
//! 3. Project-level config: ./.colloquy/colloquy.toml
//! 4. An explicit file (`colloquy --config <path>`)
//! 5. `COLLOQUY_*` environment variables
//!
//! ```toml
//! [engine]
//! node_timeout_ms = 30000
//! stream_buffer = 100
//!
//! [workflow]
//! max_critic_passes = 2
//! exploration = false
//!
//! [checkpoint]
//! backend = "file"
//! path = "/var/lib/colloquy/threads"
//! ttl_secs = 604800
//!
//! [logging]
//! level = "info"
//! format = "compact"
//! ```

use crate::error::{Result, RoleError};
use colloquy_checkpoint::{CheckpointSaver, FileCheckpointSaver, InMemoryCheckpointSaver};
use colloquy_core::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use toml::{Table, Value};
use tracing::{debug, info};

/// Prefix of environment variables read by [`ConfigLoader`].
pub const ENV_PREFIX: &str = "COLLOQUY_";

/// Main colloquy configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColloquyConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub workflow: WorkflowConfig,

    #[serde(default)]
    pub checkpoint: CheckpointConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Shape of the classroom workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Critic runs allowed before the points go to the human regardless of
    /// the teaching assistant's verdict.
    pub max_critic_passes: u64,

    /// Pause after the report so a point can be explored in detail.
    pub exploration: bool,

    /// Documents retrieved per prompt.
    pub retrieval_limit: usize,

    /// Deepest level of detailed reports.
    pub max_report_depth: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_critic_passes: 2,
            exploration: false,
            retrieval_limit: 4,
            max_report_depth: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointBackend {
    /// Threads live only as long as the process.
    Memory,
    /// One JSON file per thread, shared across processes.
    #[default]
    File,
}

/// Where thread checkpoints are kept
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    pub backend: CheckpointBackend,

    /// Directory of the file store. Defaults to ~/.colloquy/threads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Threads idle for longer than this are treated as unknown.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
}

impl CheckpointConfig {
    /// Directory used by the file backend.
    pub fn resolved_path(&self) -> PathBuf {
        match &self.path {
            Some(path) => path.clone(),
            None => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".colloquy")
                .join("threads"),
        }
    }

    /// Open the configured store.
    pub async fn open_saver(&self) -> Result<Arc<dyn CheckpointSaver>> {
        let ttl = self.ttl_secs.map(Duration::from_secs);
        let saver: Arc<dyn CheckpointSaver> = match self.backend {
            CheckpointBackend::Memory => {
                let saver = InMemoryCheckpointSaver::new();
                Arc::new(match ttl {
                    Some(ttl) => saver.with_ttl(ttl),
                    None => saver,
                })
            }
            CheckpointBackend::File => {
                let saver = FileCheckpointSaver::open(self.resolved_path()).await?;
                Arc::new(match ttl {
                    Some(ttl) => saver.with_ttl(ttl),
                    None => saver,
                })
            }
        };
        Ok(saver)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive, e.g. "info" or "colloquy_core=debug".
    /// `RUST_LOG` takes precedence when set.
    pub level: String,

    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

impl ColloquyConfig {
    /// Parse a single TOML document on top of the defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let table: Table = content
            .parse()
            .map_err(|e: toml::de::Error| RoleError::Config(e.to_string()))?;
        Self::from_table(table)
    }

    fn from_table(table: Table) -> Result<Self> {
        let config: ColloquyConfig = Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| RoleError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workflow.max_critic_passes == 0 {
            return Err(RoleError::Config(
                "workflow.max_critic_passes must be at least 1".into(),
            ));
        }
        if self.workflow.retrieval_limit == 0 {
            return Err(RoleError::Config(
                "workflow.retrieval_limit must be at least 1".into(),
            ));
        }
        if self.engine.stream_buffer == 0 {
            return Err(RoleError::Config(
                "engine.stream_buffer must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration loader for the user, project and explicit config files
pub struct ConfigLoader {
    user_config_path: Option<PathBuf>,
    project_config_path: PathBuf,
    explicit_path: Option<PathBuf>,
    env: Vec<(String, String)>,
}

impl ConfigLoader {
    /// Loader over the standard locations and the process environment.
    pub fn new() -> Self {
        Self {
            user_config_path: dirs::home_dir().map(|home| home.join(".colloquy").join("colloquy.toml")),
            project_config_path: PathBuf::from(".colloquy").join("colloquy.toml"),
            explicit_path: None,
            env: std::env::vars()
                .filter(|(key, _)| key.starts_with(ENV_PREFIX))
                .collect(),
        }
    }

    pub fn with_user_config_path(mut self, path: Option<PathBuf>) -> Self {
        self.user_config_path = path;
        self
    }

    pub fn with_project_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.project_config_path = path.into();
        self
    }

    /// Layer `path` over the user and project files. Unlike those, it must exist.
    pub fn with_explicit_path(mut self, path: Option<PathBuf>) -> Self {
        self.explicit_path = path;
        self
    }

    /// Replace the captured environment.
    pub fn with_env<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env = vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self
    }

    pub fn user_config_path(&self) -> Option<&Path> {
        self.user_config_path.as_deref()
    }

    pub fn project_config_path(&self) -> &Path {
        &self.project_config_path
    }

    pub async fn load(&self) -> Result<ColloquyConfig> {
        let mut merged = Table::new();

        let optional = self
            .user_config_path
            .iter()
            .chain(std::iter::once(&self.project_config_path));
        for path in optional {
            if fs::try_exists(path).await.unwrap_or(false) {
                debug!(path = %path.display(), "Loaded config file");
                deep_merge(&mut merged, read_table(path).await?);
            } else {
                debug!(path = %path.display(), "Config file not found");
            }
        }

        if let Some(path) = &self.explicit_path {
            debug!(path = %path.display(), "Loaded explicit config file");
            deep_merge(&mut merged, read_table(path).await?);
        }

        let overrides = apply_env_overrides(&mut merged, self.env.as_slice())?;
        let config = ColloquyConfig::from_table(merged)?;
        info!(env_overrides = overrides, "Configuration loaded");
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

async fn read_table(path: &Path) -> Result<Table> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|source| RoleError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
    content.parse().map_err(|source| RoleError::ConfigParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Merge `overlay` into `base`: tables merge recursively, other values replace.
fn deep_merge(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(Value::Table(existing)), Value::Table(incoming)) => deep_merge(existing, incoming),
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Type an override value is parsed as.
#[derive(Debug, Clone, Copy)]
enum EnvKind {
    Integer,
    Boolean,
    Text,
}

const ENV_KEYS: &[(&str, &str, &str, EnvKind)] = &[
    ("NODE_TIMEOUT_MS", "engine", "node_timeout_ms", EnvKind::Integer),
    ("STREAM_BUFFER", "engine", "stream_buffer", EnvKind::Integer),
    ("MAX_CRITIC_PASSES", "workflow", "max_critic_passes", EnvKind::Integer),
    ("EXPLORATION", "workflow", "exploration", EnvKind::Boolean),
    ("RETRIEVAL_LIMIT", "workflow", "retrieval_limit", EnvKind::Integer),
    ("MAX_REPORT_DEPTH", "workflow", "max_report_depth", EnvKind::Integer),
    ("CHECKPOINT_BACKEND", "checkpoint", "backend", EnvKind::Text),
    ("CHECKPOINT_PATH", "checkpoint", "path", EnvKind::Text),
    ("CHECKPOINT_TTL_SECS", "checkpoint", "ttl_secs", EnvKind::Integer),
    ("LOG_LEVEL", "logging", "level", EnvKind::Text),
    ("LOG_FORMAT", "logging", "format", EnvKind::Text),
];

/// Variables with the prefix that are read elsewhere, e.g. by the CLI.
const ENV_RESERVED: &[&str] = &["CONFIG"];

/// Apply `COLLOQUY_*` variables to `table`, returning how many applied.
/// Unrecognized `COLLOQUY_*` names are rejected so typos surface.
pub fn apply_env_overrides<K, V>(table: &mut Table, vars: &[(K, V)]) -> Result<usize>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut applied = 0;
    for (name, raw) in vars {
        let Some(suffix) = name.as_ref().strip_prefix(ENV_PREFIX) else {
            continue;
        };
        if ENV_RESERVED.contains(&suffix) {
            continue;
        }
        let Some((_, section, key, kind)) = ENV_KEYS.iter().find(|(s, ..)| *s == suffix) else {
            return Err(RoleError::Config(format!(
                "unknown environment override {}",
                name.as_ref()
            )));
        };

        let entry = table
            .entry(section.to_string())
            .or_insert_with(|| Value::Table(Table::new()));
        let Value::Table(entry) = entry else {
            return Err(RoleError::Config(format!("[{section}] is not a table")));
        };
        entry.insert(key.to_string(), env_value(name.as_ref(), raw.as_ref(), *kind)?);
        applied += 1;
    }
    Ok(applied)
}

fn env_value(name: &str, raw: &str, kind: EnvKind) -> Result<Value> {
    let invalid = |expected: &str| RoleError::Config(format!("{name} expects {expected}, got '{raw}'"));
    match kind {
        EnvKind::Integer => raw
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|_| invalid("an integer")),
        EnvKind::Boolean => raw
            .parse::<bool>()
            .map(Value::Boolean)
            .map_err(|_| invalid("true or false")),
        EnvKind::Text => Ok(Value::String(raw.to_string())),
    }
}
