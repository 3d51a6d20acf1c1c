use std::collections::HashMap;

use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct DocumentMetadata {
    pub source: String,
    pub content_type: String,
    pub extra: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct Document {
    pub content: String,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone)]
pub struct Chunk {
    pub content: String,
    pub metadata: DocumentMetadata,
    pub chunk_index: usize,
}

/// Ownership written into every chunk payload; deletion filters on `document_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkTags {
    pub user_id: i64,
    pub document_id: Uuid,
}
