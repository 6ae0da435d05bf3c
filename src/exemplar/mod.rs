//! Long-term example storage.
//!
//! Every committed reasoning unit leaves its (sentence, prediction) pairs
//! here; later translations retrieve the most similar ones as few-shot
//! examples. Only the controller's commit path writes to it.

pub mod durable;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ExemplarError;
use crate::index::{HnswIndex, RecordId, SimilarityIndex, TextEncoder};
use crate::oracle::Prediction;

pub use durable::DurableExemplars;

/// Result type for exemplar operations.
pub type ExemplarResult<T> = std::result::Result<T, ExemplarError>;

/// A committed sentence with the logic it was translated into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exemplar {
    pub sentence: String,
    pub prediction: Prediction,
}

/// Storage for committed exemplars.
pub trait ExemplarStore {
    /// Store an exemplar, replacing any earlier one for the same sentence.
    fn record(&mut self, exemplar: Exemplar) -> ExemplarResult<()>;

    /// Store a unit's exemplars together. Durable stores write them in a
    /// single transaction, so either all of them land or none do.
    fn record_all(&mut self, exemplars: Vec<Exemplar>) -> ExemplarResult<()> {
        for exemplar in exemplars {
            self.record(exemplar)?;
        }
        Ok(())
    }

    /// Up to `limit` exemplars most similar to `sentence`.
    fn similar(&self, sentence: &str, limit: usize) -> ExemplarResult<Vec<Exemplar>>;

    fn contains(&self, sentence: &str) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory exemplar store over an [`HnswIndex`].
#[derive(Debug)]
pub struct MemoryExemplars {
    index: HnswIndex<Exemplar>,
    /// Canonical sentence → live record.
    by_sentence: HashMap<String, RecordId>,
}

impl MemoryExemplars {
    pub fn new() -> Self {
        Self::with_encoder(TextEncoder::default())
    }

    pub fn with_encoder(encoder: TextEncoder) -> Self {
        Self {
            index: HnswIndex::new(encoder, 10_000),
            by_sentence: HashMap::new(),
        }
    }

    /// Exemplar stored for `sentence`, if any.
    pub fn get(&self, sentence: &str) -> Option<&Exemplar> {
        let id = self.by_sentence.get(&TextEncoder::canonical(sentence))?;
        self.index.get(*id)
    }
}

impl Default for MemoryExemplars {
    fn default() -> Self {
        Self::new()
    }
}

impl ExemplarStore for MemoryExemplars {
    fn record(&mut self, exemplar: Exemplar) -> ExemplarResult<()> {
        let key = TextEncoder::canonical(&exemplar.sentence);
        let sentence = exemplar.sentence.clone();
        let id = self.index.store(&sentence, exemplar)?;
        if let Some(old) = self.by_sentence.insert(key, id) {
            self.index.set_active(old, false);
        }
        Ok(())
    }

    fn similar(&self, sentence: &str, limit: usize) -> ExemplarResult<Vec<Exemplar>> {
        Ok(self
            .index
            .search(sentence, limit)?
            .into_iter()
            .map(|hit| hit.record)
            .collect())
    }

    fn contains(&self, sentence: &str) -> bool {
        self.by_sentence
            .contains_key(&TextEncoder::canonical(sentence))
    }

    fn len(&self) -> usize {
        self.by_sentence.len()
    }
}
