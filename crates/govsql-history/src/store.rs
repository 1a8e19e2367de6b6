//! Persistent similarity store

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use instant_distance::{Builder, HnswMap, Search};
use serde::{Deserialize, Serialize};

use crate::{Embedder, HistoryError, HistoryRecord, NewRecord};

/// A nearest-neighbor hit: cosine distance plus the stored record.
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub distance: f32,
    pub record: HistoryRecord,
}

/// Embedding vector wrapper for the HNSW index.
#[derive(Debug, Clone)]
struct EmbeddingPoint(Vec<f32>);

impl instant_distance::Point for EmbeddingPoint {
    fn distance(&self, other: &Self) -> f32 {
        cosine_distance(&self.0, &other.0)
    }
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    // Clamp against float drift so an identical vector reads as 0.
    (1.0 - dot / (norm_a * norm_b)).max(0.0)
}

/// One persisted entry: the record plus its question embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    record: HistoryRecord,
    embedding: Vec<f32>,
}

/// On-disk document for a collection.
#[derive(Debug, Serialize, Deserialize)]
struct CollectionFile {
    collection: String,
    entries: Vec<StoredEntry>,
}

/// Similarity store over a named collection.
///
/// Records live in a JSON document under the store directory and are
/// rewritten after every mutation; records are never deleted, so ids
/// assigned as `count + 1` stay unique. The HNSW index is rebuilt in
/// memory after each mutation.
pub struct HistoryStore {
    path: PathBuf,
    collection: String,
    embedder: Arc<dyn Embedder>,
    entries: Vec<StoredEntry>,
    index: Option<HnswMap<EmbeddingPoint, usize>>,
}

impl HistoryStore {
    /// Open (or create) the collection under `dir`.
    ///
    /// Hosts call this at startup; failure here means the store is
    /// unreachable and the host should refuse to start.
    pub fn open(
        dir: impl AsRef<Path>,
        collection: &str,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, HistoryError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.json", collection));

        let entries = if path.exists() {
            let bytes = std::fs::read(&path)?;
            let file: CollectionFile = serde_json::from_slice(&bytes)?;
            file.entries
        } else {
            Vec::new()
        };

        let mut store = Self {
            path,
            collection: collection.to_string(),
            embedder,
            entries,
            index: None,
        };
        store.rebuild_index();

        tracing::info!(
            collection = %store.collection,
            records = store.entries.len(),
            "history store opened"
        );

        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Nearest stored question to `text`, over the whole collection.
    /// `None` when the collection is empty.
    pub async fn nearest(&self, text: &str) -> Result<Option<Neighbor>, HistoryError> {
        let embedding = self.embedder.embed(text).await?;
        Ok(self.nearest_matching(&embedding, |_| true))
    }

    /// Nearest stored question restricted to one (user, schema) pair.
    /// This is the probe behind the insert-vs-touch decision.
    pub async fn nearest_for(
        &self,
        text: &str,
        user: &str,
        schema_name: &str,
    ) -> Result<Option<Neighbor>, HistoryError> {
        let embedding = self.embedder.embed(text).await?;
        Ok(self.nearest_matching(&embedding, |record| {
            record.user == user && record.schema_name == schema_name
        }))
    }

    /// Ranked history search for the audit operation.
    pub async fn search(
        &self,
        text: &str,
        schema_name: &str,
        limit: usize,
    ) -> Result<Vec<Neighbor>, HistoryError> {
        let embedding = self.embedder.embed(text).await?;

        let index = match &self.index {
            Some(index) => index,
            None => return Ok(Vec::new()),
        };

        let mut search = Search::default();
        let hits = index
            .search(&EmbeddingPoint(embedding), &mut search)
            .filter_map(|item| {
                let record = &self.entries[*item.value].record;
                (record.schema_name == schema_name).then(|| Neighbor {
                    distance: item.distance,
                    record: record.clone(),
                })
            })
            .take(limit)
            .collect();

        Ok(hits)
    }

    /// Insert a new record; returns the assigned id.
    pub async fn insert(&mut self, new: NewRecord) -> Result<String, HistoryError> {
        let embedding = self.embedder.embed(&new.question).await?;
        let id = (self.entries.len() + 1).to_string();

        let record = HistoryRecord {
            id: id.clone(),
            question: new.question,
            sql: new.sql,
            schema_name: new.schema_name,
            user: new.user,
            updated_at: Utc::now(),
            origin: new.origin,
        };

        self.entries.push(StoredEntry { record, embedding });
        self.rebuild_index();
        self.persist()?;

        tracing::debug!(id = %id, "history record inserted");
        Ok(id)
    }

    /// Touch an existing record's timestamp; the "seen again" signal
    /// for a near-duplicate question.
    pub fn update_timestamp(
        &mut self,
        id: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<(), HistoryError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| entry.record.id == id)
            .ok_or_else(|| HistoryError::UnknownId(id.to_string()))?;

        entry.record.updated_at = timestamp;
        self.persist()?;

        tracing::debug!(id = %id, "history record touched");
        Ok(())
    }

    fn nearest_matching<F>(&self, embedding: &[f32], matches: F) -> Option<Neighbor>
    where
        F: Fn(&HistoryRecord) -> bool,
    {
        let index = self.index.as_ref()?;

        let mut search = Search::default();
        let result = index
            .search(&EmbeddingPoint(embedding.to_vec()), &mut search)
            .find_map(|item| {
                let record = &self.entries[*item.value].record;
                matches(record).then(|| Neighbor {
                    distance: item.distance,
                    record: record.clone(),
                })
            });
        result
    }

    fn rebuild_index(&mut self) {
        if self.entries.is_empty() {
            self.index = None;
            return;
        }

        let points: Vec<EmbeddingPoint> = self
            .entries
            .iter()
            .map(|entry| EmbeddingPoint(entry.embedding.clone()))
            .collect();
        let values: Vec<usize> = (0..self.entries.len()).collect();

        self.index = Some(Builder::default().build(points, values));
    }

    fn persist(&self) -> Result<(), HistoryError> {
        let file = CollectionFile {
            collection: self.collection.clone(),
            entries: self.entries.clone(),
        };
        std::fs::write(&self.path, serde_json::to_vec(&file)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RecordOrigin;
    use async_trait::async_trait;

    /// Deterministic embedder: identical text maps to identical
    /// vectors, so distance 0 means "the same question".
    struct StubEmbedder;

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, HistoryError> {
            let mut v = vec![0.1f32; 16];
            for (i, b) in text.bytes().enumerate() {
                v[i % 16] += (b as f32) / 255.0;
            }
            Ok(v)
        }
    }

    fn new_record(question: &str, schema: &str, user: &str) -> NewRecord {
        NewRecord {
            question: question.to_string(),
            sql: format!("SELECT 1 -- {}", question),
            schema_name: schema.to_string(),
            user: user.to_string(),
            origin: RecordOrigin::Interactive,
        }
    }

    fn open_store(dir: &Path) -> HistoryStore {
        HistoryStore::open(dir, "questions_sql_history", Arc::new(StubEmbedder)).unwrap()
    }

    #[tokio::test]
    async fn empty_collection_has_no_neighbors() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        assert!(store.nearest("how many rows").await.unwrap().is_none());
        assert!(store
            .search("how many rows", "sales", 5)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn ids_are_monotonic_counts() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(dir.path());

        let first = store
            .insert(new_record("count users", "sales", "alice"))
            .await
            .unwrap();
        let second = store
            .insert(new_record("list orders", "sales", "alice"))
            .await
            .unwrap();

        assert_eq!(first, "1");
        assert_eq!(second, "2");
    }

    #[tokio::test]
    async fn identical_question_is_distance_zero() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(dir.path());
        store
            .insert(new_record("count users", "sales", "alice"))
            .await
            .unwrap();

        let hit = store.nearest("count users").await.unwrap().unwrap();

        assert!(hit.distance < 1e-6);
        assert_eq!(hit.record.question, "count users");
    }

    #[tokio::test]
    async fn nearest_for_respects_user_and_schema() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(dir.path());
        store
            .insert(new_record("count users", "sales", "alice"))
            .await
            .unwrap();

        let other_user = store
            .nearest_for("count users", "bob", "sales")
            .await
            .unwrap();
        let other_schema = store
            .nearest_for("count users", "alice", "hr")
            .await
            .unwrap();
        let matching = store
            .nearest_for("count users", "alice", "sales")
            .await
            .unwrap();

        assert!(other_user.is_none());
        assert!(other_schema.is_none());
        assert!(matching.is_some());
    }

    #[tokio::test]
    async fn update_timestamp_touches_only_the_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(dir.path());
        let id = store
            .insert(new_record("count users", "sales", "alice"))
            .await
            .unwrap();

        let later = Utc::now() + chrono::Duration::seconds(90);
        store.update_timestamp(&id, later).unwrap();

        let hit = store.nearest("count users").await.unwrap().unwrap();
        assert_eq!(hit.record.updated_at, later);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn update_timestamp_unknown_id_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(dir.path());

        let result = store.update_timestamp("99", Utc::now());

        assert!(matches!(result, Err(HistoryError::UnknownId(_))));
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = open_store(dir.path());
            store
                .insert(new_record("count users", "sales", "alice"))
                .await
                .unwrap();
        }

        let reopened = open_store(dir.path());

        assert_eq!(reopened.len(), 1);
        let hit = reopened.nearest("count users").await.unwrap().unwrap();
        assert_eq!(hit.record.id, "1");
    }

    #[tokio::test]
    async fn search_filters_by_schema_and_limits() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(dir.path());
        store
            .insert(new_record("count users", "sales", "alice"))
            .await
            .unwrap();
        store
            .insert(new_record("count orders", "sales", "alice"))
            .await
            .unwrap();
        store
            .insert(new_record("count employees", "hr", "alice"))
            .await
            .unwrap();

        let hits = store.search("count", "sales", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.schema_name, "sales");

        let all_sales = store.search("count", "sales", 10).await.unwrap();
        assert_eq!(all_sales.len(), 2);
    }
}
