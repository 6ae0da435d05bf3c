//! Similarity index: text keys to records, with approximate nearest-neighbor search.
//!
//! Keys are encoded by [`TextEncoder`] into binary SimHash vectors built from
//! character trigrams, so names and sentences with overlapping spelling land
//! close together. Vectors live in an HNSW graph searched with Hamming
//! distance. Records are never deleted from the graph; they are deactivated
//! and filtered from results, which is how superseded type records are kept
//! restorable.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use anndists::dist::DistHamming;
use hnsw_rs::hnsw::Hnsw;
use unicode_normalization::UnicodeNormalization;

use crate::error::IndexError;

/// Result type for index operations.
pub type IndexResult<T> = std::result::Result<T, IndexError>;

/// Default embedding width in bits.
pub const DEFAULT_DIMENSION: usize = 512;

/// Identifier of a stored record (insertion order).
pub type RecordId = usize;

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Character-trigram SimHash encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextEncoder {
    dimension: usize,
}

impl TextEncoder {
    pub fn new(dimension: usize) -> IndexResult<Self> {
        if dimension < 32 {
            return Err(IndexError::Dimension { dimension });
        }
        Ok(Self { dimension })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// NFKC-normalized, lowercased, whitespace-collapsed form of `text`.
    pub fn canonical(text: &str) -> String {
        let lowered: String = text.nfkc().collect::<String>().to_lowercase();
        lowered.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// One `u32` per bit, each 0 or 1, as the Hamming distance expects.
    pub fn encode(&self, text: &str) -> Vec<u32> {
        let canonical = Self::canonical(text);
        let padded: Vec<char> = format!("  {canonical} ").chars().collect();
        let mut weights = vec![0i32; self.dimension];
        let chunks = self.dimension.div_ceil(64);

        for gram in padded.windows(3) {
            for chunk in 0..chunks {
                let mut hasher = DefaultHasher::new();
                gram.hash(&mut hasher);
                chunk.hash(&mut hasher);
                let bits = hasher.finish();
                for bit in 0..64 {
                    let pos = chunk * 64 + bit;
                    if pos >= self.dimension {
                        break;
                    }
                    weights[pos] += if (bits >> bit) & 1 == 1 { 1 } else { -1 };
                }
            }
        }
        weights.into_iter().map(|w| u32::from(w > 0)).collect()
    }
}

impl Default for TextEncoder {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
        }
    }
}

// ---------------------------------------------------------------------------
// Index contract
// ---------------------------------------------------------------------------

/// A search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct Scored<T> {
    pub id: RecordId,
    pub key: String,
    pub record: T,
    /// 0.0 = unrelated, 1.0 = identical encoding.
    pub similarity: f32,
}

/// Store records under text keys and retrieve them by similarity.
pub trait SimilarityIndex<T> {
    /// Store `record` under `key`; returns its id.
    fn store(&mut self, key: &str, record: T) -> IndexResult<RecordId>;

    /// Up to `limit` active records ranked by descending similarity to `query`.
    fn search(&self, query: &str, limit: usize) -> IndexResult<Vec<Scored<T>>>;

    /// Hide or restore a record. Returns false for unknown ids.
    fn set_active(&mut self, id: RecordId, active: bool) -> bool;

    fn get(&self, id: RecordId) -> Option<&T>;

    /// Number of active records.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// HNSW implementation
// ---------------------------------------------------------------------------

struct Entry<T> {
    key: String,
    record: T,
    active: bool,
}

/// [`SimilarityIndex`] over an HNSW graph with Hamming distance.
pub struct HnswIndex<T> {
    encoder: TextEncoder,
    hnsw: Hnsw<'static, u32, DistHamming>,
    entries: Vec<Entry<T>>,
}

impl<T> fmt::Debug for HnswIndex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HnswIndex")
            .field("dimension", &self.encoder.dimension())
            .field("entries", &self.entries.len())
            .field("active", &self.active_count())
            .finish()
    }
}

impl<T> HnswIndex<T> {
    /// `max_elements` is a capacity hint for the graph.
    pub fn new(encoder: TextEncoder, max_elements: usize) -> Self {
        // HNSW parameters:
        // max_nb_connection: 16
        // ef_construction: 200 (higher = better recall during build)
        // max_layer: from expected elements, within hnsw_rs' limit of 16
        let max_layer = (max_elements.max(2) as f64).log2().ceil() as usize;
        let max_layer = max_layer.clamp(4, 16);
        let hnsw = Hnsw::new(16, max_elements.max(1), max_layer, 200, DistHamming {});
        Self {
            encoder,
            hnsw,
            entries: Vec::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(TextEncoder::default(), 10_000)
    }

    pub fn encoder(&self) -> &TextEncoder {
        &self.encoder
    }

    fn active_count(&self) -> usize {
        self.entries.iter().filter(|e| e.active).count()
    }

    /// Active records with their keys, in insertion order.
    pub fn active(&self) -> impl Iterator<Item = (RecordId, &str, &T)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.active)
            .map(|(id, e)| (id, e.key.as_str(), &e.record))
    }
}

impl<T: Clone> SimilarityIndex<T> for HnswIndex<T> {
    fn store(&mut self, key: &str, record: T) -> IndexResult<RecordId> {
        let id = self.entries.len();
        let data = self.encoder.encode(key);
        self.hnsw.insert((&data, id));
        self.entries.push(Entry {
            key: key.to_string(),
            record,
            active: true,
        });
        Ok(id)
    }

    fn search(&self, query: &str, limit: usize) -> IndexResult<Vec<Scored<T>>> {
        if limit == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }
        let query_data = self.encoder.encode(query);
        if query_data.len() != self.encoder.dimension() {
            return Err(IndexError::Dimension {
                dimension: query_data.len(),
            });
        }

        // Inactive entries still occupy graph slots, so over-fetch by that many.
        let inactive = self.entries.len() - self.active_count();
        let k = (limit + inactive).min(self.entries.len());
        let ef_search = (k * 2).max(32);
        let neighbours = self.hnsw.search(&query_data, k, ef_search);

        let mut results: Vec<Scored<T>> = neighbours
            .into_iter()
            .filter_map(|n| {
                let entry = self.entries.get(n.d_id)?;
                if !entry.active {
                    return None;
                }
                Some(Scored {
                    id: n.d_id,
                    key: entry.key.clone(),
                    record: entry.record.clone(),
                    // DistHamming reports the fraction of differing positions.
                    similarity: 1.0 - n.distance,
                })
            })
            .collect();

        results.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| b.id.cmp(&a.id))
        });
        results.truncate(limit);
        Ok(results)
    }

    fn set_active(&mut self, id: RecordId, active: bool) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) => {
                entry.active = active;
                true
            }
            None => false,
        }
    }

    fn get(&self, id: RecordId) -> Option<&T> {
        self.entries.get(id).map(|e| &e.record)
    }

    fn len(&self) -> usize {
        self.active_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hamming(a: &[u32], b: &[u32]) -> usize {
        a.iter().zip(b).filter(|(x, y)| x != y).count()
    }

    #[test]
    fn encoder_rejects_tiny_dimensions() {
        assert!(matches!(
            TextEncoder::new(8),
            Err(IndexError::Dimension { dimension: 8 })
        ));
    }

    #[test]
    fn encoding_is_deterministic_and_binary() {
        let enc = TextEncoder::default();
        let a = enc.encode("Carries");
        assert_eq!(a, enc.encode("Carries"));
        assert_eq!(a.len(), DEFAULT_DIMENSION);
        assert!(a.iter().all(|&b| b <= 1));
    }

    #[test]
    fn similar_spelling_encodes_closer() {
        let enc = TextEncoder::default();
        let base = enc.encode("CarriesUmbrella");
        let near = enc.encode("CarryUmbrella");
        let far = enc.encode("Xylophone");
        assert!(hamming(&base, &near) < hamming(&base, &far));
    }

    #[test]
    fn canonical_form_ignores_case_and_spacing() {
        assert_eq!(TextEncoder::canonical("  John   LEFT\thome "), "john left home");
    }

    #[test]
    fn canonical_form_folds_compatibility_characters() {
        assert_eq!(TextEncoder::canonical("\u{FB01}le"), "file");
        assert_eq!(TextEncoder::canonical("\u{FF2A}ohn"), "john");
    }

    #[test]
    fn search_finds_exact_key_first() {
        let mut index = HnswIndex::with_defaults();
        for name in ["Raining", "Carries", "Umbrella", "Wet"] {
            index.store(name, name.to_string()).unwrap();
        }
        let hits = index.search("Carries", 2).unwrap();
        assert_eq!(hits[0].record, "Carries");
        assert!(hits[0].similarity > 0.99);
        assert!(hits.len() <= 2);
    }

    #[test]
    fn inactive_records_are_hidden_and_restorable() {
        let mut index = HnswIndex::with_defaults();
        let old = index.store("Raining", 1).unwrap();
        let new = index.store("Raining", 2).unwrap();
        index.set_active(old, false);

        let hits = index.search("Raining", 5).unwrap();
        assert!(hits.iter().all(|h| h.id != old));
        assert_eq!(hits[0].id, new);
        assert_eq!(index.len(), 1);

        index.set_active(new, false);
        index.set_active(old, true);
        assert_eq!(index.search("Raining", 5).unwrap()[0].record, 1);
        assert!(!index.set_active(99, true));
    }

    #[test]
    fn empty_index_returns_nothing() {
        let index: HnswIndex<String> = HnswIndex::with_defaults();
        assert!(index.search("anything", 3).unwrap().is_empty());
        assert!(index.is_empty());
    }
}
