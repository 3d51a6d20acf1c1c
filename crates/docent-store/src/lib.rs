//! Document ingestion, per-user vector index and relational records.

pub mod document;
pub mod error;
pub mod index;
pub mod persistent;
pub mod sqlite;
pub mod vector_store;

pub use error::StoreError;
pub use index::{DeleteOutcome, IndexError, RetrievedChunk, VectorIndex};
pub use persistent::PersistentVectorStore;
pub use sqlite::{
    AdminDocument, DOCUMENTS_PER_PAGE, DocumentFilter, DocumentPage, DocumentRecord, SqliteStore,
    User, token_digest,
};
pub use vector_store::{
    FieldCondition, FieldValue, ScoredVectorPoint, VectorFilter, VectorPoint, VectorStore,
    VectorStoreError,
};
