use docent_llm::EmbedFuture;
use serde_json::json;
use uuid::Uuid;

use super::{
    Chunk, ChunkTags, Document, DocumentError, DocumentLoader, TextSplitter, clean_text,
};
use crate::index::VectorIndex;
use crate::vector_store::{Payload, VectorPoint};

pub type EmbedFn = Box<dyn Fn(&str) -> EmbedFuture + Send + Sync>;

pub struct IngestionPipeline {
    splitter: TextSplitter,
    index: VectorIndex,
    embed_fn: EmbedFn,
}

impl IngestionPipeline {
    pub fn new(splitter: TextSplitter, index: VectorIndex, embed_fn: EmbedFn) -> Self {
        Self {
            splitter,
            index,
            embed_fn,
        }
    }

    #[must_use]
    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Ingest a document: clean -> split -> embed -> store in the owner's collection.
    /// Returns chunk count.
    ///
    /// Every chunk is embedded before anything is written, so an embedding
    /// failure leaves the index untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding or vector storage fails.
    pub async fn ingest(&self, document: Document, tags: ChunkTags) -> Result<usize, DocumentError> {
        let cleaned = Document {
            content: clean_text(&document.content),
            metadata: document.metadata,
        };
        let chunks = self.splitter.split(&cleaned);
        if chunks.is_empty() {
            tracing::warn!(document_id = %tags.document_id, "document produced no chunks");
            return Ok(0);
        }

        let mut points = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let vector = (self.embed_fn)(&chunk.content).await?;
            points.push(VectorPoint {
                id: Uuid::new_v4().to_string(),
                vector,
                payload: chunk_payload(chunk, tags),
            });
        }

        let count = self.index.add_chunks(tags.user_id, points).await?;
        tracing::info!(
            user_id = tags.user_id,
            document_id = %tags.document_id,
            chunks = count,
            "document ingested"
        );
        Ok(count)
    }

    /// # Errors
    ///
    /// Returns an error if loading, embedding, or storage fails.
    pub async fn load_and_ingest(
        &self,
        loader: &(dyn DocumentLoader + '_),
        path: &std::path::Path,
        tags: ChunkTags,
    ) -> Result<usize, DocumentError> {
        let documents = loader.load(path).await?;
        let mut total = 0;
        for doc in documents {
            total += self.ingest(doc, tags).await?;
        }
        Ok(total)
    }
}

fn chunk_payload(chunk: &Chunk, tags: ChunkTags) -> Payload {
    let mut payload = Payload::new();
    payload.insert("user_id".into(), json!(tags.user_id));
    payload.insert("document_id".into(), json!(tags.document_id.to_string()));
    payload.insert("source".into(), json!(chunk.metadata.source));
    payload.insert("content_type".into(), json!(chunk.metadata.content_type));
    payload.insert("chunk_index".into(), json!(chunk.chunk_index));
    payload.insert("content".into(), json!(chunk.content));
    payload
}
