//! Retrieval-augmented answering over a user's own collection.

use docent_llm::{AnyProvider, LlmError, LlmProvider, Message};
use docent_store::{IndexError, RetrievedChunk, VectorIndex};

pub const NO_DOCUMENTS: &str =
    "No documents have been uploaded yet. Please upload a document first.";
pub const NO_RELEVANT_INFORMATION: &str = "No relevant information was found.";
pub const CANNOT_ANSWER: &str = "The uploaded documents cannot answer this question.";

const HYDE_PROMPT: &str = "Please write a passage to answer the question \nQuestion: {question}\nPassage:";

#[derive(Debug, thiserror::Error)]
pub enum RagError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

pub struct RagService {
    provider: AnyProvider,
    index: VectorIndex,
    top_k: usize,
    hyde: bool,
}

impl RagService {
    #[must_use]
    pub fn new(provider: AnyProvider, index: VectorIndex) -> Self {
        Self {
            provider,
            index,
            top_k: 5,
            hyde: true,
        }
    }

    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    #[must_use]
    pub fn with_hyde(mut self, hyde: bool) -> Self {
        self.hyde = hyde;
        self
    }

    /// Answer `query` from the user's documents.
    ///
    /// Never fails: missing collections, empty results and provider errors
    /// all become user-facing text.
    pub async fn generate_response(&self, query: &str, user_id: i64) -> String {
        if !self.index.exists(user_id).await {
            return NO_DOCUMENTS.to_owned();
        }

        match self.answer(query, user_id).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(user_id, "answer generation failed: {e}");
                format!("An error occurred while generating the answer: {e}")
            }
        }
    }

    async fn answer(&self, query: &str, user_id: i64) -> Result<String, RagError> {
        let vector = self.query_embedding(query).await?;
        let Some(chunks) = self
            .index
            .search(user_id, vector, self.top_k as u64)
            .await?
        else {
            return Ok(NO_DOCUMENTS.to_owned());
        };
        if chunks.is_empty() {
            return Ok(NO_RELEVANT_INFORMATION.to_owned());
        }

        tracing::debug!(user_id, retrieved = chunks.len(), "context retrieved");
        let prompt = build_prompt(query, &chunks);
        Ok(self.provider.chat(&[Message::user(prompt)]).await?)
    }

    /// With HyDE the LLM first drafts an answer passage and that passage is
    /// embedded in place of the question.
    async fn query_embedding(&self, query: &str) -> Result<Vec<f32>, LlmError> {
        if !self.hyde {
            return self.provider.embed_query(query).await;
        }
        let prompt = HYDE_PROMPT.replace("{question}", query);
        let passage = self.provider.chat(&[Message::user(prompt)]).await?;
        tracing::debug!(chars = passage.len(), "hypothetical passage generated");
        self.provider.embed(&passage).await
    }
}

fn build_prompt(query: &str, chunks: &[RetrievedChunk]) -> String {
    let context = chunks
        .iter()
        .map(|c| c.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "\nAnswer the user's question using only the context below.\n\
         If the context does not contain the information, reply \"{CANNOT_ANSWER}\"\n\n\
         Context:\n{context}\n\n\
         Question: {query}\n\n\
         Answer:"
    )
}
