//! Per-user vector index lifecycle.
//!
//! Every user owns one directory `<root>/user_<id>` holding a single
//! collection `documents_<id>`. The directory exists only while it may hold
//! chunks: deleting the last document drops the collection and removes the
//! directory.

use std::path::{Path, PathBuf};

use crate::persistent::PersistentVectorStore;
use crate::vector_store::{FieldValue, VectorFilter, VectorPoint, VectorStore, VectorStoreError};

const SAMPLE_LIMIT: u64 = 3;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("vector store error: {0}")]
    Store(#[from] VectorStoreError),

    #[error("{remaining} chunks of document {document_id} remain after deletion")]
    Incomplete { document_id: String, remaining: u64 },

    #[error("embedding vectors must not be empty")]
    EmptyVector,
}

/// What `delete_document` found and did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    DirectoryMissing,
    CollectionMissing,
    Deleted {
        removed: u64,
        remaining: u64,
        directory_removed: bool,
    },
    NotFound {
        directory_removed: bool,
    },
}

impl DeleteOutcome {
    #[must_use]
    pub fn directory_removed(&self) -> bool {
        match self {
            Self::Deleted {
                directory_removed, ..
            }
            | Self::NotFound { directory_removed } => *directory_removed,
            Self::DirectoryMissing | Self::CollectionMissing => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub content: String,
    pub document_id: Option<String>,
    pub source: Option<String>,
    pub chunk_index: Option<u64>,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct VectorIndex {
    root: PathBuf,
}

impl VectorIndex {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn user_dir(&self, user_id: i64) -> PathBuf {
        self.root.join(format!("user_{user_id}"))
    }

    #[must_use]
    pub fn collection_name(user_id: i64) -> String {
        format!("documents_{user_id}")
    }

    pub async fn exists(&self, user_id: i64) -> bool {
        tokio::fs::metadata(self.user_dir(user_id))
            .await
            .is_ok_and(|m| m.is_dir())
    }

    /// Store chunk points in the user's collection, creating it on first use.
    ///
    /// Returns the number of points written.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the store rejects the points.
    pub async fn add_chunks(
        &self,
        user_id: i64,
        points: Vec<VectorPoint>,
    ) -> Result<usize, IndexError> {
        let Some(first) = points.first() else {
            return Ok(0);
        };
        let dimension = first.vector.len() as u64;
        if dimension == 0 {
            return Err(IndexError::EmptyVector);
        }

        let dir = self.user_dir(user_id);
        tokio::fs::create_dir_all(&dir).await?;

        let collection = Self::collection_name(user_id);
        let count = points.len();
        let store = PersistentVectorStore::open(&dir).await?;
        let result = async {
            store.ensure_collection(&collection, dimension).await?;
            store.upsert(&collection, points).await?;
            Ok::<(), IndexError>(())
        }
        .await;
        store.close().await;

        match result {
            Ok(()) => {
                tracing::info!(user_id, collection = %collection, count, "stored chunks");
                Ok(count)
            }
            Err(e) => {
                tracing::error!(user_id, collection = %collection, "failed to store chunks: {e}");
                self.cleanup_if_empty(user_id).await;
                Err(e)
            }
        }
    }

    /// Top `k` chunks for `vector` in the user's collection.
    ///
    /// Returns `None` when the user has no vector directory yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or searched.
    pub async fn search(
        &self,
        user_id: i64,
        vector: Vec<f32>,
        k: u64,
    ) -> Result<Option<Vec<RetrievedChunk>>, IndexError> {
        if !self.exists(user_id).await {
            return Ok(None);
        }

        let dir = self.user_dir(user_id);
        let collection = Self::collection_name(user_id);
        let store = PersistentVectorStore::open(&dir).await?;
        let result = async {
            if !store.collection_exists(&collection).await? {
                return Ok(Vec::new());
            }
            let filter = VectorFilter::must("user_id", FieldValue::Integer(user_id));
            let points = store.search(&collection, vector, k, Some(filter)).await?;
            Ok::<_, IndexError>(
                points
                    .into_iter()
                    .map(|p| RetrievedChunk {
                        content: p
                            .payload
                            .get("content")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default()
                            .to_owned(),
                        document_id: p
                            .payload
                            .get("document_id")
                            .and_then(|v| v.as_str())
                            .map(str::to_owned),
                        source: p
                            .payload
                            .get("source")
                            .and_then(|v| v.as_str())
                            .map(str::to_owned),
                        chunk_index: p.payload.get("chunk_index").and_then(serde_json::Value::as_u64),
                        score: p.score,
                    })
                    .collect::<Vec<_>>(),
            )
        }
        .await;
        store.close().await;
        result.map(Some)
    }

    /// Number of chunks in the user's collection, optionally for one document.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn count(&self, user_id: i64, document_id: Option<&str>) -> Result<u64, IndexError> {
        if !self.exists(user_id).await {
            return Ok(0);
        }
        let collection = Self::collection_name(user_id);
        let store = PersistentVectorStore::open(&self.user_dir(user_id)).await?;
        let result = async {
            if !store.collection_exists(&collection).await? {
                return Ok(0);
            }
            let filter = document_id
                .map(|id| VectorFilter::must("document_id", FieldValue::Text(id.to_owned())));
            Ok::<_, IndexError>(store.count(&collection, filter).await?)
        }
        .await;
        store.close().await;
        result
    }

    /// Remove every chunk of `document_id` from the user's collection.
    ///
    /// Drops the collection and removes the user directory once it is empty.
    /// On failure an empty collection is still cleaned up before the original
    /// error is returned.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::Incomplete` if chunks survive the delete, or the
    /// underlying store/IO error.
    pub async fn delete_document(
        &self,
        user_id: i64,
        document_id: &str,
    ) -> Result<DeleteOutcome, IndexError> {
        let dir = self.user_dir(user_id);
        if !self.exists(user_id).await {
            tracing::warn!(user_id, path = %dir.display(), "vector store directory does not exist");
            return Ok(DeleteOutcome::DirectoryMissing);
        }

        let collection = Self::collection_name(user_id);
        let store = PersistentVectorStore::open(&dir).await?;
        let result = purge(&store, &collection, &dir, document_id).await;
        store.close().await;

        match result {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::error!(user_id, document_id, "vector deletion failed: {e}");
                self.cleanup_if_empty(user_id).await;
                Err(e)
            }
        }
    }

    /// Best-effort removal of an empty collection and its directory.
    async fn cleanup_if_empty(&self, user_id: i64) {
        let dir = self.user_dir(user_id);
        if !self.exists(user_id).await {
            return;
        }
        let store = match PersistentVectorStore::open(&dir).await {
            Ok(store) => store,
            Err(e) => {
                tracing::warn!(user_id, "cleanup skipped, cannot open vector store: {e}");
                return;
            }
        };

        let collection = Self::collection_name(user_id);
        let empty = match store.collection_exists(&collection).await {
            Ok(true) => matches!(store.count(&collection, None).await, Ok(0)),
            Ok(false) => true,
            Err(_) => false,
        };
        if empty {
            tracing::info!(user_id, "removing empty vector store during cleanup");
            if let Err(e) = collect_garbage(&store, &collection, &dir).await {
                tracing::warn!(user_id, "cleanup failed: {e}");
            }
        }
        store.close().await;
    }
}

async fn purge(
    store: &PersistentVectorStore,
    collection: &str,
    dir: &Path,
    document_id: &str,
) -> Result<DeleteOutcome, IndexError> {
    if !store.collection_exists(collection).await? {
        tracing::warn!(collection, "collection does not exist");
        return Ok(DeleteOutcome::CollectionMissing);
    }

    let total = store.count(collection, None).await?;
    tracing::info!(collection, total, "collection chunk count before deletion");

    let filter = VectorFilter::must("document_id", FieldValue::Text(document_id.to_owned()));
    let ids: Vec<String> = store
        .scroll(collection, Some(filter.clone()), None)
        .await?
        .into_iter()
        .map(|p| p.id)
        .collect();

    if ids.is_empty() {
        tracing::warn!(collection, document_id, "no chunks found for document");
        if total > 0 {
            for sample in store.scroll(collection, None, Some(SAMPLE_LIMIT)).await? {
                tracing::debug!(id = %sample.id, payload = ?sample.payload, "sample chunk metadata");
            }
            return Ok(DeleteOutcome::NotFound {
                directory_removed: false,
            });
        }
        collect_garbage(store, collection, dir).await?;
        return Ok(DeleteOutcome::NotFound {
            directory_removed: true,
        });
    }

    let removed = ids.len() as u64;
    tracing::info!(collection, document_id, removed, "deleting chunks");
    store.delete_by_ids(collection, ids).await?;

    let remaining = store.count(collection, None).await?;
    tracing::info!(collection, remaining, "collection chunk count after deletion");

    let leftover = store.count(collection, Some(filter)).await?;
    if leftover > 0 {
        return Err(IndexError::Incomplete {
            document_id: document_id.to_owned(),
            remaining: leftover,
        });
    }

    let directory_removed = if remaining == 0 {
        tracing::info!(collection, "collection emptied");
        collect_garbage(store, collection, dir).await?;
        true
    } else {
        false
    };

    Ok(DeleteOutcome::Deleted {
        removed,
        remaining,
        directory_removed,
    })
}

async fn collect_garbage(
    store: &PersistentVectorStore,
    collection: &str,
    dir: &Path,
) -> Result<(), IndexError> {
    store.delete_collection(collection).await?;
    store.close().await;
    tokio::fs::remove_dir_all(dir).await?;
    tracing::info!(path = %dir.display(), "removed vector store directory");
    Ok(())
}
