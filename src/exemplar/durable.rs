//! Exemplar store persisted in redb.
//!
//! Records are bincode-encoded under their canonical sentence. The
//! similarity index is in memory only and is rebuilt from the table on open.

use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};

use crate::error::ExemplarError;
use crate::index::TextEncoder;

use super::{Exemplar, ExemplarResult, ExemplarStore, MemoryExemplars};

/// Canonical sentence → bincode-encoded [`Exemplar`].
const EXEMPLAR_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("exemplars");

/// ACID-durable exemplar store.
pub struct DurableExemplars {
    db: Database,
    memory: MemoryExemplars,
}

impl DurableExemplars {
    /// Open or create the database at `path` and load every stored exemplar.
    pub fn open(path: &Path) -> ExemplarResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ExemplarError::Io { source: e })?;
        }
        let db = Database::create(path).map_err(|e| ExemplarError::Redb {
            message: format!("failed to open redb at {}: {e}", path.display()),
        })?;

        // Make sure the table exists so read transactions can open it.
        let txn = db.begin_write().map_err(redb_err("begin_write"))?;
        txn.open_table(EXEMPLAR_TABLE)
            .map_err(redb_err("open_table"))?;
        txn.commit().map_err(redb_err("commit"))?;

        let mut memory = MemoryExemplars::new();
        {
            let txn = db.begin_read().map_err(redb_err("begin_read"))?;
            let table = txn.open_table(EXEMPLAR_TABLE).map_err(redb_err("open_table"))?;
            for entry in table.iter().map_err(redb_err("iter"))? {
                let (_, value) = entry.map_err(redb_err("iter"))?;
                let exemplar: Exemplar = bincode::deserialize(value.value()).map_err(|e| {
                    ExemplarError::Serialization {
                        message: e.to_string(),
                    }
                })?;
                memory.record(exemplar)?;
            }
        }
        tracing::debug!(path = %path.display(), exemplars = memory.len(), "exemplar store opened");

        Ok(Self { db, memory })
    }
}

fn redb_err<E: std::fmt::Display>(op: &'static str) -> impl Fn(E) -> ExemplarError {
    move |e| ExemplarError::Redb {
        message: format!("{op} failed: {e}"),
    }
}

impl ExemplarStore for DurableExemplars {
    fn record(&mut self, exemplar: Exemplar) -> ExemplarResult<()> {
        self.record_all(vec![exemplar])
    }

    fn record_all(&mut self, exemplars: Vec<Exemplar>) -> ExemplarResult<()> {
        let mut rows = Vec::with_capacity(exemplars.len());
        for exemplar in &exemplars {
            let bytes = bincode::serialize(exemplar).map_err(|e| ExemplarError::Serialization {
                message: e.to_string(),
            })?;
            rows.push((TextEncoder::canonical(&exemplar.sentence), bytes));
        }

        let txn = self.db.begin_write().map_err(redb_err("begin_write"))?;
        {
            let mut table = txn.open_table(EXEMPLAR_TABLE).map_err(redb_err("open_table"))?;
            for (key, bytes) in &rows {
                table
                    .insert(key.as_str(), bytes.as_slice())
                    .map_err(redb_err("insert"))?;
            }
        }
        txn.commit().map_err(redb_err("commit"))?;

        tracing::debug!(exemplars = rows.len(), "exemplars recorded");
        self.memory.record_all(exemplars)
    }

    fn similar(&self, sentence: &str, limit: usize) -> ExemplarResult<Vec<Exemplar>> {
        self.memory.similar(sentence, limit)
    }

    fn contains(&self, sentence: &str) -> bool {
        self.memory.contains(sentence)
    }

    fn len(&self) -> usize {
        self.memory.len()
    }
}

impl std::fmt::Debug for DurableExemplars {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableExemplars")
            .field("exemplars", &self.memory.len())
            .finish()
    }
}
