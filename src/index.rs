//! Per-user vector index storage and nearest-neighbor search.
//!
//! Each user owns an independent [`VectorIndex`] persisted as JSON under
//! `<root>/<user_id>/index.json`. Rebuilds are atomic: the new index is
//! written to `index.json.tmp` in the same directory and renamed over the
//! old file, so readers observe either the previous index or the complete
//! new one, never a partial state. The [`IndexManager`] is the namespace
//! key for every index operation; lookups against one user's index can
//! never return another user's chunks.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::embedding::cosine_similarity;
use crate::models::{Chunk, Retrieved};

const INDEX_FILE: &str = "index.json";
const INDEX_TMP_FILE: &str = "index.json.tmp";

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("index file is corrupt: {0}")]
    Corrupt(String),
}

/// A chunk together with its embedding vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// An in-memory similarity index over one user's chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndex {
    /// Embedding model the vectors were produced with.
    pub model: String,
    pub dims: usize,
    pub entries: Vec<IndexEntry>,
}

impl VectorIndex {
    pub fn new(model: &str, dims: usize) -> Self {
        Self {
            model: model.to_string(),
            dims,
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, chunk: Chunk, vector: Vec<f32>) {
        self.entries.push(IndexEntry { chunk, vector });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return the `top_k` most similar chunks to `query`, highest first.
    ///
    /// Scores below `min_score` are dropped. The sort is stable, so equal
    /// scores keep insertion order. `top_k == 0` and an empty index both
    /// return an empty list.
    pub fn search(&self, query: &[f32], top_k: usize, min_score: f32) -> Vec<Retrieved> {
        if top_k == 0 || self.entries.is_empty() {
            return Vec::new();
        }

        let mut results: Vec<Retrieved> = self
            .entries
            .iter()
            .map(|entry| Retrieved {
                chunk: entry.chunk.clone(),
                score: cosine_similarity(query, &entry.vector),
            })
            .filter(|r| r.score >= min_score)
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(top_k);
        results
    }
}

/// Owner of all per-user indexes under one root directory.
///
/// Writes to a given user's index are serialized through a per-user async
/// mutex; reads and other users' operations proceed concurrently.
pub struct IndexManager {
    root: PathBuf,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl IndexManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn user_dir(&self, user_id: &str) -> PathBuf {
        self.root.join(user_id)
    }

    fn write_lock(&self, user_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().expect("index lock map poisoned");
        locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    pub fn exists(&self, user_id: &str) -> bool {
        self.user_dir(user_id).join(INDEX_FILE).exists()
    }

    /// Load a user's index; `Ok(None)` when none has been built yet.
    pub fn load(&self, user_id: &str) -> Result<Option<VectorIndex>, IndexError> {
        let path = self.user_dir(user_id).join(INDEX_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path)?;
        let index: VectorIndex = serde_json::from_slice(&bytes)
            .map_err(|e| IndexError::Corrupt(format!("{}: {}", path.display(), e)))?;
        Ok(Some(index))
    }

    /// Atomically replace a user's index with `index`.
    ///
    /// The serialized index is written to a temporary file in the user's
    /// directory and renamed over the live file. On any failure the prior
    /// index is left intact.
    pub async fn replace(&self, user_id: &str, index: &VectorIndex) -> Result<(), IndexError> {
        let lock = self.write_lock(user_id);
        let _guard = lock.lock().await;

        let dir = self.user_dir(user_id);
        std::fs::create_dir_all(&dir)?;

        let tmp = dir.join(INDEX_TMP_FILE);
        let live = dir.join(INDEX_FILE);

        let bytes = serde_json::to_vec(index)
            .map_err(|e| IndexError::Corrupt(format!("serialization failed: {}", e)))?;
        std::fs::write(&tmp, &bytes)?;
        std::fs::rename(&tmp, &live)?;
        Ok(())
    }

    /// Delete a user's index. Returns whether anything was removed.
    pub async fn delete(&self, user_id: &str) -> Result<bool, IndexError> {
        let lock = self.write_lock(user_id);
        let _guard = lock.lock().await;

        let dir = self.user_dir(user_id);
        if !dir.exists() {
            return Ok(false);
        }
        std::fs::remove_dir_all(&dir)?;
        Ok(true)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(ordinal: i64, text: &str) -> Chunk {
        Chunk {
            id: format!("c{}", ordinal),
            filename: "doc.txt".to_string(),
            page: 1,
            ordinal,
            text: text.to_string(),
        }
    }

    fn small_index() -> VectorIndex {
        let mut index = VectorIndex::new("test-model", 2);
        index.push(chunk(0, "north"), vec![0.0, 1.0]);
        index.push(chunk(1, "east"), vec![1.0, 0.0]);
        index.push(chunk(2, "northeast"), vec![0.7071, 0.7071]);
        index
    }

    #[test]
    fn search_orders_by_similarity() {
        let index = small_index();
        let results = index.search(&[0.0, 1.0], 3, 0.0);
        assert_eq!(results[0].chunk.text, "north");
        assert_eq!(results[1].chunk.text, "northeast");
        assert!(results[0].score > results[1].score);
    }

    #[test]
    fn search_k_zero_returns_empty() {
        assert!(small_index().search(&[0.0, 1.0], 0, 0.0).is_empty());
    }

    #[test]
    fn search_empty_index_returns_empty() {
        let index = VectorIndex::new("test-model", 2);
        assert!(index.search(&[0.0, 1.0], 3, 0.0).is_empty());
    }

    #[test]
    fn search_applies_min_score_threshold() {
        let index = small_index();
        let results = index.search(&[0.0, 1.0], 3, 0.9);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.text, "north");
    }

    #[test]
    fn ties_keep_insertion_order() {
        let mut index = VectorIndex::new("test-model", 2);
        index.push(chunk(0, "first"), vec![1.0, 0.0]);
        index.push(chunk(1, "second"), vec![1.0, 0.0]);
        index.push(chunk(2, "third"), vec![2.0, 0.0]);

        let results = index.search(&[1.0, 0.0], 3, 0.0);
        // All three are cosine-identical to the query; insertion order holds.
        assert_eq!(results[0].chunk.text, "first");
        assert_eq!(results[1].chunk.text, "second");
        assert_eq!(results[2].chunk.text, "third");
    }

    #[test]
    fn search_is_deterministic() {
        let index = small_index();
        let a = index.search(&[0.3, 0.8], 3, 0.0);
        let b = index.search(&[0.3, 0.8], 3, 0.0);
        let ids = |rs: &[Retrieved]| rs.iter().map(|r| r.chunk.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&a), ids(&b));
    }

    #[tokio::test]
    async fn replace_round_trips_and_missing_index_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = IndexManager::new(tmp.path());

        assert!(manager.load("alice").unwrap().is_none());
        assert!(!manager.exists("alice"));

        manager.replace("alice", &small_index()).await.unwrap();
        let loaded = manager.load("alice").unwrap().unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.model, "test-model");
    }

    #[tokio::test]
    async fn per_user_paths_are_isolated() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = IndexManager::new(tmp.path());

        manager.replace("alice", &small_index()).await.unwrap();
        let mut bobs = VectorIndex::new("test-model", 2);
        bobs.push(chunk(0, "bob secret"), vec![0.0, 1.0]);
        manager.replace("bob", &bobs).await.unwrap();

        let alice = manager.load("alice").unwrap().unwrap();
        assert!(alice.entries.iter().all(|e| e.chunk.text != "bob secret"));

        assert!(manager.delete("bob").await.unwrap());
        assert!(manager.load("bob").unwrap().is_none());
        assert!(manager.exists("alice"));
    }

    #[tokio::test]
    async fn corrupt_index_file_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = IndexManager::new(tmp.path());
        let dir = tmp.path().join("alice");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(INDEX_FILE), b"{ not json").unwrap();

        assert!(matches!(
            manager.load("alice"),
            Err(IndexError::Corrupt(_))
        ));
    }
}
