//! Session configuration, persisted as TOML.
//!
//! Every section and field has a default, so an empty file (or no file at
//! all) is a valid configuration. The default location is
//! `$XDG_CONFIG_HOME/pln-reasoner/config.toml`.

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chain::ChainConfig;
use crate::controller::ControllerConfig;
use crate::controller::repair::RepairConfig;
use crate::oracle::OllamaConfig;
use crate::paths::SessionPaths;
use crate::resolver::ResolverConfig;

/// Errors from reading or writing configuration.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(pln::config::read),
        help("Ensure the config file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {path}: {message}")]
    #[diagnostic(
        code(pln::config::parse),
        help("Check the TOML syntax. Unknown sections are rejected; valid ones are [llm], [knowledge], [chaining], [resolver], [controller] and [repair].")
    )]
    Parse { path: String, message: String },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(pln::config::write),
        help("Ensure you have write permissions to the config directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// `[knowledge]`: where the session's statements and exemplars live.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    /// Knowledge-base file. Defaults to the session's `knowledge.pln`.
    pub file: Option<PathBuf>,
    /// Exemplar database. Defaults to the session's `exemplars.redb`.
    pub exemplar_db: Option<PathBuf>,
    /// Never write the knowledge-base file.
    pub read_only: bool,
}

impl KnowledgeConfig {
    pub fn knowledge_file(&self, session: &SessionPaths) -> PathBuf {
        self.file
            .clone()
            .unwrap_or_else(|| session.knowledge_file.clone())
    }

    pub fn exemplar_db(&self, session: &SessionPaths) -> PathBuf {
        self.exemplar_db
            .clone()
            .unwrap_or_else(|| session.exemplar_db.clone())
    }
}

/// Complete configuration of one reasoning session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    pub llm: OllamaConfig,
    pub knowledge: KnowledgeConfig,
    pub chaining: ChainConfig,
    pub resolver: ResolverConfig,
    pub controller: ControllerConfig,
    pub repair: RepairConfig,
}

impl SessionConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::parse(&content, path)
    }

    /// Load from `path`, or defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file; using defaults");
            Ok(Self::default())
        }
    }

    fn parse(content: &str, path: &Path) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }
}
