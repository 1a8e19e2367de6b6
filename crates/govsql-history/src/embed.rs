//! Text embedding providers

use async_openai::config::OpenAIConfig;
use async_openai::types::CreateEmbeddingRequestArgs;
use async_openai::Client;
use async_trait::async_trait;

use crate::HistoryError;

/// Maps question text into the vector space the store searches in.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, HistoryError>;
}

/// OpenAI embeddings API provider.
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(client: Client<OpenAIConfig>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, HistoryError> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(self.model.as_str())
            .input(text.to_string())
            .build()
            .map_err(|e| HistoryError::Embedding(format!("bad embedding request: {}", e)))?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| HistoryError::Embedding(format!("embeddings API call failed: {}", e)))?;

        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| HistoryError::Embedding("empty embedding response".to_string()))
    }
}
