use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    clock::Clock,
    models::{GenreId, MediaType, TitleKey},
    services::vectorizer::{ContentVectorizer, EmbeddingVector, QueryCriteria},
};

/// Cosine similarity; 0.0 when either side is the zero vector
pub fn cosine_similarity(a: &EmbeddingVector, b: &EmbeddingVector) -> f64 {
    let denominator = a.norm() * b.norm();
    if denominator == 0.0 {
        return 0.0;
    }
    a.dot(b) / denominator
}

#[derive(Debug, Clone)]
pub struct SimilarityIndexEntry {
    pub key: TitleKey,
    pub vector: EmbeddingVector,
    pub inserted_at: DateTime<Utc>,
    /// Monotonic insertion order; larger is more recent
    sequence: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarityMatch {
    pub id: u64,
    pub media_type: MediaType,
    pub score: f64,
}

impl SimilarityMatch {
    pub fn key(&self) -> TitleKey {
        TitleKey::new(self.id, self.media_type)
    }
}

#[derive(Debug, Default)]
struct IndexState {
    entries: HashMap<TitleKey, SimilarityIndexEntry>,
    next_sequence: u64,
}

/// In-memory nearest-neighbour index over title embeddings
///
/// Brute-force cosine scan. Bounded by entry count: once `max_size` is
/// exceeded the oldest-inserted entries are dropped.
pub struct SimilarityIndex {
    vectorizer: ContentVectorizer,
    clock: Arc<dyn Clock>,
    max_size: usize,
    state: RwLock<IndexState>,
}

impl SimilarityIndex {
    pub fn new(vectorizer: ContentVectorizer, clock: Arc<dyn Clock>, max_size: usize) -> Self {
        Self {
            vectorizer,
            clock,
            max_size,
            state: RwLock::new(IndexState::default()),
        }
    }

    pub fn vectorizer(&self) -> &ContentVectorizer {
        &self.vectorizer
    }

    /// Upserts vectors. Re-indexing an item replaces its vector and makes it
    /// the most recent entry.
    pub fn index<I>(&self, items: I)
    where
        I: IntoIterator<Item = (TitleKey, EmbeddingVector)>,
    {
        let now = self.clock.now();
        let mut state = self.state.write();
        let mut indexed = 0;

        for (key, vector) in items {
            let sequence = state.next_sequence;
            state.next_sequence += 1;
            state.entries.insert(
                key,
                SimilarityIndexEntry {
                    key,
                    vector,
                    inserted_at: now,
                    sequence,
                },
            );
            indexed += 1;
        }

        let overflow = state.entries.len().saturating_sub(self.max_size);
        if overflow > 0 {
            let mut by_age: Vec<(u64, TitleKey)> = state
                .entries
                .values()
                .map(|entry| (entry.sequence, entry.key))
                .collect();
            by_age.sort_unstable();
            for (_, key) in by_age.into_iter().take(overflow) {
                state.entries.remove(&key);
            }
            tracing::debug!(evicted = overflow, "Similarity index evicted oldest entries");
        }

        tracing::debug!(indexed = indexed, size = state.entries.len(), "Similarity index updated");
    }

    /// Top `top_k` entries by cosine similarity to `vector`. Equal scores are
    /// ordered most recently indexed first.
    pub fn query_by_vector(&self, vector: &EmbeddingVector, top_k: usize) -> Vec<SimilarityMatch> {
        self.ranked(vector, f64::NEG_INFINITY, top_k)
    }

    /// Entries scoring at least `min_score` against a single-genre query vector
    pub fn query_by_genre(
        &self,
        genre: GenreId,
        min_score: f64,
        top_k: usize,
    ) -> Vec<SimilarityMatch> {
        let query = self.vectorizer.query_vector(&QueryCriteria::genre(genre));
        if query.is_zero() {
            return Vec::new();
        }
        self.ranked(&query, min_score, top_k)
    }

    pub fn get(&self, key: &TitleKey) -> Option<SimilarityIndexEntry> {
        self.state.read().entries.get(key).cloned()
    }

    pub fn contains(&self, key: &TitleKey) -> bool {
        self.state.read().entries.contains_key(key)
    }

    pub fn remove(&self, key: &TitleKey) -> bool {
        self.state.write().entries.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.state.write().entries.clear();
    }

    fn ranked(&self, query: &EmbeddingVector, min_score: f64, top_k: usize) -> Vec<SimilarityMatch> {
        let state = self.state.read();
        let mut scored: Vec<(f64, u64, TitleKey)> = state
            .entries
            .values()
            .map(|entry| (cosine_similarity(query, &entry.vector), entry.sequence, entry.key))
            .filter(|(score, _, _)| *score >= min_score)
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| b.1.cmp(&a.1)));

        scored
            .into_iter()
            .take(top_k)
            .map(|(score, _, key)| SimilarityMatch {
                id: key.id,
                media_type: key.media_type,
                score,
            })
            .collect()
    }
}
