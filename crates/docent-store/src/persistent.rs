//! Vector store persisted as a single `SQLite` file inside a directory.
//!
//! Vectors are stored as little-endian `f32` blobs and payloads as JSON text.
//! Search is a brute-force cosine scan over the rows that pass the filter.

use std::path::{Path, PathBuf};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::vector_store::{
    BoxFuture, FieldValue, Payload, ScoredVectorPoint, StoredPoint, VectorFilter, VectorPoint,
    VectorStore, VectorStoreError, cosine_similarity,
};

pub const INDEX_FILE: &str = "index.sqlite3";

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS collections (
        name TEXT PRIMARY KEY,
        vector_size INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS points (
        collection TEXT NOT NULL REFERENCES collections(name) ON DELETE CASCADE,
        id TEXT NOT NULL,
        vector BLOB NOT NULL,
        payload TEXT NOT NULL,
        PRIMARY KEY (collection, id)
    )",
];

const DELETE_BATCH: usize = 500;

#[derive(Debug, Clone)]
pub struct PersistentVectorStore {
    pool: SqlitePool,
    path: PathBuf,
}

impl PersistentVectorStore {
    /// Open (or create) the index file inside `dir`.
    ///
    /// # Errors
    ///
    /// Returns `VectorStoreError::Connection` if the file cannot be opened or
    /// the schema cannot be created.
    pub async fn open(dir: &Path) -> Result<Self, VectorStoreError> {
        let path = dir.join(INDEX_FILE);
        let opts = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Delete);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await
            .map_err(|e| VectorStoreError::Connection(e.to_string()))?;

        for stmt in SCHEMA {
            sqlx::query(stmt)
                .execute(&pool)
                .await
                .map_err(|e| VectorStoreError::Connection(e.to_string()))?;
        }

        Ok(Self { pool, path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close every connection so the directory can be removed.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    async fn vector_size(&self, collection: &str) -> Result<Option<usize>, sqlx::Error> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT vector_size FROM collections WHERE name = ?")
                .bind(collection)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.and_then(|(size,)| usize::try_from(size).ok()))
    }
}

fn push_value(qb: &mut QueryBuilder<'_, Sqlite>, value: &FieldValue) {
    match value {
        FieldValue::Integer(i) => qb.push_bind(*i),
        FieldValue::Text(s) => qb.push_bind(s.clone()),
    };
}

fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: Option<&VectorFilter>) {
    let Some(filter) = filter else {
        return;
    };
    for cond in &filter.must {
        qb.push(" AND json_extract(payload, ")
            .push_bind(format!("$.{}", cond.field))
            .push(") = ");
        push_value(qb, &cond.value);
    }
    for cond in &filter.must_not {
        qb.push(" AND COALESCE(json_extract(payload, ")
            .push_bind(format!("$.{}", cond.field))
            .push(") = ");
        push_value(qb, &cond.value);
        qb.push(", 0) = 0");
    }
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

fn decode_payload(raw: &str) -> Result<Payload, VectorStoreError> {
    serde_json::from_str(raw).map_err(|e| VectorStoreError::Serialization(e.to_string()))
}

impl VectorStore for PersistentVectorStore {
    fn ensure_collection(
        &self,
        collection: &str,
        vector_size: u64,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let size = i64::try_from(vector_size)
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            sqlx::query(
                "INSERT INTO collections (name, vector_size) VALUES (?, ?) \
                 ON CONFLICT(name) DO NOTHING",
            )
            .bind(&collection)
            .bind(size)
            .execute(&self.pool)
            .await
            .map_err(|e| VectorStoreError::Collection(e.to_string()))?;

            let existing = self
                .vector_size(&collection)
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            match existing {
                Some(existing) if u64::try_from(existing).ok() == Some(vector_size) => Ok(()),
                Some(existing) => Err(VectorStoreError::Collection(format!(
                    "collection {collection} has vector size {existing}, requested {vector_size}"
                ))),
                None => Err(VectorStoreError::Collection(format!(
                    "collection {collection} was not created"
                ))),
            }
        })
    }

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let size = self
                .vector_size(&collection)
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            Ok(size.is_some())
        })
    }

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let map_err = |e: sqlx::Error| VectorStoreError::Collection(e.to_string());
            let mut tx = self.pool.begin().await.map_err(map_err)?;
            sqlx::query("DELETE FROM points WHERE collection = ?")
                .bind(&collection)
                .execute(&mut *tx)
                .await
                .map_err(map_err)?;
            sqlx::query("DELETE FROM collections WHERE name = ?")
                .bind(&collection)
                .execute(&mut *tx)
                .await
                .map_err(map_err)?;
            tx.commit().await.map_err(map_err)?;
            Ok(())
        })
    }

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let map_err = |e: sqlx::Error| VectorStoreError::Upsert(e.to_string());
            let size = self.vector_size(&collection).await.map_err(map_err)?;
            let Some(size) = size else {
                return Err(VectorStoreError::Upsert(format!(
                    "collection {collection} not found"
                )));
            };

            let mut tx = self.pool.begin().await.map_err(map_err)?;
            for point in points {
                if point.vector.len() != size {
                    return Err(VectorStoreError::Upsert(format!(
                        "point {} has {} dimensions, collection {collection} expects {size}",
                        point.id,
                        point.vector.len()
                    )));
                }
                let payload = serde_json::to_string(&point.payload)
                    .map_err(|e| VectorStoreError::Serialization(e.to_string()))?;
                sqlx::query(
                    "INSERT INTO points (collection, id, vector, payload) VALUES (?, ?, ?, ?) \
                     ON CONFLICT(collection, id) DO UPDATE \
                     SET vector = excluded.vector, payload = excluded.payload",
                )
                .bind(&collection)
                .bind(&point.id)
                .bind(encode_vector(&point.vector))
                .bind(payload)
                .execute(&mut *tx)
                .await
                .map_err(map_err)?;
            }
            tx.commit().await.map_err(map_err)?;
            Ok(())
        })
    }

    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
        filter: Option<VectorFilter>,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let map_err = |e: sqlx::Error| VectorStoreError::Search(e.to_string());
            if self.vector_size(&collection).await.map_err(map_err)?.is_none() {
                return Err(VectorStoreError::Search(format!(
                    "collection {collection} not found"
                )));
            }

            let mut qb: QueryBuilder<'_, Sqlite> =
                QueryBuilder::new("SELECT id, vector, payload FROM points WHERE collection = ");
            qb.push_bind(collection);
            push_filter(&mut qb, filter.as_ref());
            qb.push(" ORDER BY rowid");

            let rows: Vec<(String, Vec<u8>, String)> = qb
                .build_query_as()
                .fetch_all(&self.pool)
                .await
                .map_err(map_err)?;

            let mut scored = Vec::with_capacity(rows.len());
            for (id, blob, payload) in rows {
                scored.push(ScoredVectorPoint {
                    score: cosine_similarity(&vector, &decode_vector(&blob)),
                    id,
                    payload: decode_payload(&payload)?,
                });
            }

            scored.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            scored.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
            Ok(scored)
        })
    }

    fn scroll(
        &self,
        collection: &str,
        filter: Option<VectorFilter>,
        limit: Option<u64>,
    ) -> BoxFuture<'_, Result<Vec<StoredPoint>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut qb: QueryBuilder<'_, Sqlite> =
                QueryBuilder::new("SELECT id, payload FROM points WHERE collection = ");
            qb.push_bind(collection);
            push_filter(&mut qb, filter.as_ref());
            qb.push(" ORDER BY rowid");
            if let Some(limit) = limit {
                qb.push(" LIMIT ")
                    .push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
            }

            let rows: Vec<(String, String)> = qb
                .build_query_as()
                .fetch_all(&self.pool)
                .await
                .map_err(|e| VectorStoreError::Scroll(e.to_string()))?;

            rows.into_iter()
                .map(|(id, payload)| {
                    Ok(StoredPoint {
                        id,
                        payload: decode_payload(&payload)?,
                    })
                })
                .collect::<Result<Vec<_>, VectorStoreError>>()
        })
    }

    fn count(
        &self,
        collection: &str,
        filter: Option<VectorFilter>,
    ) -> BoxFuture<'_, Result<u64, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut qb: QueryBuilder<'_, Sqlite> =
                QueryBuilder::new("SELECT COUNT(*) FROM points WHERE collection = ");
            qb.push_bind(collection);
            push_filter(&mut qb, filter.as_ref());

            let (count,): (i64,) = qb
                .build_query_as()
                .fetch_one(&self.pool)
                .await
                .map_err(|e| VectorStoreError::Scroll(e.to_string()))?;
            Ok(u64::try_from(count).unwrap_or(0))
        })
    }

    fn delete_by_ids(
        &self,
        collection: &str,
        ids: Vec<String>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let map_err = |e: sqlx::Error| VectorStoreError::Delete(e.to_string());
            let mut tx = self.pool.begin().await.map_err(map_err)?;
            for batch in ids.chunks(DELETE_BATCH) {
                let mut qb: QueryBuilder<'_, Sqlite> =
                    QueryBuilder::new("DELETE FROM points WHERE collection = ");
                qb.push_bind(collection.clone()).push(" AND id IN (");
                let mut separated = qb.separated(", ");
                for id in batch {
                    separated.push_bind(id.clone());
                }
                separated.push_unseparated(")");
                qb.build().execute(&mut *tx).await.map_err(map_err)?;
            }
            tx.commit().await.map_err(map_err)?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn point(id: &str, vector: Vec<f32>, document_id: &str, chunk_index: i64) -> VectorPoint {
        let mut payload = Payload::new();
        payload.insert("document_id".into(), json!(document_id));
        payload.insert("user_id".into(), json!(7));
        payload.insert("chunk_index".into(), json!(chunk_index));
        VectorPoint {
            id: id.into(),
            vector,
            payload,
        }
    }

    async fn seeded() -> (tempfile::TempDir, PersistentVectorStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistentVectorStore::open(dir.path()).await.unwrap();
        store.ensure_collection("docs", 2).await.unwrap();
        store
            .upsert(
                "docs",
                vec![
                    point("a", vec![1.0, 0.0], "doc-1", 0),
                    point("b", vec![0.0, 1.0], "doc-1", 1),
                    point("c", vec![0.7, 0.7], "doc-2", 0),
                ],
            )
            .await
            .unwrap();
        (dir, store)
    }

    #[test]
    fn vector_encoding_is_little_endian() {
        let bytes = encode_vector(&[1.0, -2.5]);
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[..4], &1.0f32.to_le_bytes());
        assert_eq!(decode_vector(&bytes), vec![1.0, -2.5]);
    }

    #[tokio::test]
    async fn open_creates_index_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistentVectorStore::open(dir.path()).await.unwrap();
        assert!(store.path().exists());
        assert_eq!(store.path(), dir.path().join(INDEX_FILE));
        assert!(!store.collection_exists("docs").await.unwrap());
    }

    #[tokio::test]
    async fn ensure_collection_is_idempotent_and_checks_size() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistentVectorStore::open(dir.path()).await.unwrap();
        store.ensure_collection("docs", 3).await.unwrap();
        store.ensure_collection("docs", 3).await.unwrap();
        assert!(store.collection_exists("docs").await.unwrap());
        assert!(store.ensure_collection("docs", 4).await.is_err());
    }

    #[tokio::test]
    async fn search_orders_by_cosine_score() {
        let (_dir, store) = seeded().await;
        let results = store.search("docs", vec![1.0, 0.1], 2, None).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "a");
        assert_eq!(results[1].id, "c");
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn tied_scores_keep_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistentVectorStore::open(dir.path()).await.unwrap();
        store.ensure_collection("docs", 2).await.unwrap();
        store
            .upsert(
                "docs",
                vec![
                    point("z", vec![1.0, 0.0], "doc-1", 0),
                    point("m", vec![1.0, 0.0], "doc-1", 1),
                    point("a", vec![1.0, 0.0], "doc-1", 2),
                ],
            )
            .await
            .unwrap();

        let results = store.search("docs", vec![1.0, 0.0], 3, None).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["z", "m", "a"]);
    }

    #[tokio::test]
    async fn search_applies_filters() {
        let (_dir, store) = seeded().await;
        let only_doc2 = VectorFilter::must("document_id", FieldValue::Text("doc-2".into()));
        let results = store
            .search("docs", vec![1.0, 0.0], 10, Some(only_doc2))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "c");

        let not_first = VectorFilter {
            must: vec![],
            must_not: vec![crate::vector_store::FieldCondition {
                field: "chunk_index".into(),
                value: FieldValue::Integer(0),
            }],
        };
        let results = store
            .search("docs", vec![1.0, 0.0], 10, Some(not_first))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "b");
    }

    #[tokio::test]
    async fn search_missing_collection_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistentVectorStore::open(dir.path()).await.unwrap();
        let result = store.search("nope", vec![1.0], 1, None).await;
        assert!(matches!(result, Err(VectorStoreError::Search(_))));
    }

    #[tokio::test]
    async fn upsert_rejects_dimension_mismatch() {
        let (_dir, store) = seeded().await;
        let result = store
            .upsert("docs", vec![point("d", vec![1.0, 2.0, 3.0], "doc-3", 0)])
            .await;
        assert!(matches!(result, Err(VectorStoreError::Upsert(_))));
        assert_eq!(store.count("docs", None).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn upsert_replaces_existing_id() {
        let (_dir, store) = seeded().await;
        store
            .upsert("docs", vec![point("a", vec![0.0, 1.0], "doc-9", 0)])
            .await
            .unwrap();
        assert_eq!(store.count("docs", None).await.unwrap(), 3);
        let doc9 = VectorFilter::must("document_id", FieldValue::Text("doc-9".into()));
        assert_eq!(store.count("docs", Some(doc9)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn scroll_count_and_delete_by_ids() {
        let (_dir, store) = seeded().await;
        let doc1 = VectorFilter::must("document_id", FieldValue::Text("doc-1".into()));

        let points = store.scroll("docs", Some(doc1.clone()), None).await.unwrap();
        let ids: Vec<String> = points.iter().map(|p| p.id.clone()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(store.scroll("docs", None, Some(1)).await.unwrap().len(), 1);
        assert_eq!(store.count("docs", Some(doc1.clone())).await.unwrap(), 2);

        store.delete_by_ids("docs", ids).await.unwrap();
        assert_eq!(store.count("docs", Some(doc1)).await.unwrap(), 0);
        assert_eq!(store.count("docs", None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_collection_removes_points() {
        let (_dir, store) = seeded().await;
        store.delete_collection("docs").await.unwrap();
        assert!(!store.collection_exists("docs").await.unwrap());
        assert_eq!(store.count("docs", None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn data_survives_reopen() {
        let (dir, store) = seeded().await;
        store.close().await;
        assert!(store.is_closed());

        let reopened = PersistentVectorStore::open(dir.path()).await.unwrap();
        assert_eq!(reopened.count("docs", None).await.unwrap(), 3);
    }
}
