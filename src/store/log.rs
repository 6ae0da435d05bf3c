//! Newline-delimited statement file backing a [`super::KnowledgeStore`].
//!
//! During a session every admitted statement is appended; an explicit flush
//! rewrites the whole file (temp file + rename) so removals are reflected.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::statement::TypedStatement;

use super::StoreResult;

/// Append-only statement log with whole-file rewrite on flush.
#[derive(Debug, Clone)]
pub struct StatementLog {
    path: PathBuf,
    read_only: bool,
}

impl StatementLog {
    pub fn new(path: impl Into<PathBuf>, read_only: bool) -> Self {
        Self {
            path: path.into(),
            read_only,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Read the raw file contents. A missing file reads as empty.
    pub fn read(&self) -> StoreResult<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(self.io(e)),
        }
    }

    /// Append statements, one per line. No-op when read-only.
    pub fn append<'a>(&self, statements: impl IntoIterator<Item = &'a TypedStatement>) -> StoreResult<()> {
        if self.read_only {
            return Ok(());
        }
        self.ensure_parent()?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io(e))?;
        let mut writer = BufWriter::new(file);
        for statement in statements {
            writeln!(writer, "{statement}").map_err(|e| self.io(e))?;
        }
        writer.flush().map_err(|e| self.io(e))
    }

    /// Replace the file with exactly these statements.
    pub fn rewrite<'a>(&self, statements: impl IntoIterator<Item = &'a TypedStatement>) -> StoreResult<()> {
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        self.ensure_parent()?;
        let tmp = self.path.with_extension("tmp");
        {
            let file = File::create(&tmp).map_err(|e| self.io(e))?;
            let mut writer = BufWriter::new(file);
            for statement in statements {
                writeln!(writer, "{statement}").map_err(|e| self.io(e))?;
            }
            writer.flush().map_err(|e| self.io(e))?;
        }
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io(e))
    }

    fn ensure_parent(&self) -> StoreResult<()> {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => {
                std::fs::create_dir_all(dir).map_err(|e| self.io(e))
            }
            _ => Ok(()),
        }
    }

    fn io(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn st(s: &str) -> TypedStatement {
        s.parse().unwrap()
    }

    #[test]
    fn append_then_rewrite() {
        let dir = TempDir::new().unwrap();
        let log = StatementLog::new(dir.path().join("kb").join("facts.pln"), false);

        assert_eq!(log.read().unwrap(), "");
        log.append([&st("(: a (P A))"), &st("(: b (P B))")]).unwrap();
        assert_eq!(log.read().unwrap(), "(: a (P A))\n(: b (P B))\n");

        log.rewrite([&st("(: b (P B))")]).unwrap();
        assert_eq!(log.read().unwrap(), "(: b (P B))\n");
    }

    #[test]
    fn read_only_log_never_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("facts.pln");
        let log = StatementLog::new(&path, true);

        log.append([&st("(: a (P A))")]).unwrap();
        assert!(!path.exists());
        assert!(matches!(log.rewrite(std::iter::empty()), Err(StoreError::ReadOnly)));
    }
}
