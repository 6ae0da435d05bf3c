//! XDG-compliant path resolution for pln-reasoner.
//!
//! Provides `PlnPaths` (global directories) and `SessionPaths` (per-session
//! files) following the XDG Base Directory Specification.

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use thiserror::Error;

/// Errors from path resolution.
#[derive(Debug, Error, Diagnostic)]
pub enum PathError {
    #[error("cannot determine home directory")]
    #[diagnostic(
        code(pln::paths::no_home),
        help("Set the HOME environment variable or pass explicit file paths.")
    )]
    NoHome,

    #[error("failed to create directory: {path}")]
    #[diagnostic(
        code(pln::paths::create_dir),
        help("Check that the parent directory exists and you have write permissions.")
    )]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type PathResult<T> = std::result::Result<T, PathError>;

/// Global XDG-compliant directories for pln-reasoner.
#[derive(Debug, Clone)]
pub struct PlnPaths {
    /// `$XDG_CONFIG_HOME/pln-reasoner/`
    pub config_dir: PathBuf,
    /// `$XDG_DATA_HOME/pln-reasoner/`
    pub data_dir: PathBuf,
    /// `$XDG_STATE_HOME/pln-reasoner/`
    pub state_dir: PathBuf,
}

impl PlnPaths {
    /// Resolve XDG directories from environment variables with standard fallbacks.
    pub fn resolve() -> PathResult<Self> {
        let home = std::env::var("HOME")
            .map(PathBuf::from)
            .map_err(|_| PathError::NoHome)?;

        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".config"))
            .join("pln-reasoner");

        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".local/share"))
            .join("pln-reasoner");

        let state_dir = std::env::var("XDG_STATE_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".local/state"))
            .join("pln-reasoner");

        Ok(Self {
            config_dir,
            data_dir,
            state_dir,
        })
    }

    /// Paths rooted at an explicit directory instead of the XDG locations.
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            config_dir: root.join("config"),
            data_dir: root.join("data"),
            state_dir: root.join("state"),
        }
    }

    /// Files of a named reasoning session.
    pub fn session(&self, name: &str) -> SessionPaths {
        let root = self.data_dir.join("sessions").join(name);
        SessionPaths {
            name: name.to_string(),
            knowledge_file: root.join("knowledge.pln"),
            exemplar_db: root.join("exemplars.redb"),
            root,
        }
    }

    /// List existing session names.
    pub fn list_sessions(&self) -> Vec<String> {
        let dir = self.data_dir.join("sessions");
        match std::fs::read_dir(&dir) {
            Ok(entries) => {
                let mut names: Vec<String> = entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
                    .filter_map(|e| e.file_name().into_string().ok())
                    .collect();
                names.sort();
                names
            }
            Err(_) => Vec::new(),
        }
    }

    /// Create all base directories. Idempotent.
    pub fn ensure_dirs(&self) -> PathResult<()> {
        for dir in [
            &self.config_dir,
            &self.data_dir,
            &self.state_dir,
            &self.data_dir.join("sessions"),
        ] {
            create_dir(dir)?;
        }
        Ok(())
    }

    /// Path to the global config file.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }
}

/// Per-session file layout.
#[derive(Debug, Clone)]
pub struct SessionPaths {
    pub name: String,
    /// `data_dir/sessions/{name}/`
    pub root: PathBuf,
    /// `root/knowledge.pln`: newline-delimited statements
    pub knowledge_file: PathBuf,
    /// `root/exemplars.redb`: committed (sentence, prediction) pairs
    pub exemplar_db: PathBuf,
}

impl SessionPaths {
    /// Create the session directory. Idempotent.
    pub fn ensure_dirs(&self) -> PathResult<()> {
        create_dir(&self.root)
    }
}

fn create_dir(dir: &Path) -> PathResult<()> {
    std::fs::create_dir_all(dir).map_err(|e| PathError::CreateDir {
        path: dir.display().to_string(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_layout() {
        let paths = PlnPaths::rooted("/tmp/pln-test");
        let session = paths.session("umbrella");
        assert_eq!(session.name, "umbrella");
        assert!(session.root.ends_with("data/sessions/umbrella"));
        assert!(session.knowledge_file.ends_with("umbrella/knowledge.pln"));
        assert!(session.exemplar_db.ends_with("umbrella/exemplars.redb"));
        assert!(paths.config_file().ends_with("config/config.toml"));
    }

    #[test]
    fn ensure_and_list_sessions() {
        let dir = tempfile::TempDir::new().unwrap();
        let paths = PlnPaths::rooted(dir.path());
        paths.ensure_dirs().unwrap();
        assert!(paths.list_sessions().is_empty());

        paths.session("b").ensure_dirs().unwrap();
        paths.session("a").ensure_dirs().unwrap();
        assert_eq!(paths.list_sessions(), vec!["a".to_string(), "b".to_string()]);
    }
}
