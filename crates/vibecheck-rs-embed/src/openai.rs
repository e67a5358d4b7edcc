use crate::{EmbedError, EmbeddingTransport, IndexedVector};
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};

/// Transport for OpenAI-compatible `POST {api_base}/embeddings` endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiEmbeddingTransport {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbeddingTransport {
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.api_base)
    }
}

#[async_trait]
impl EmbeddingTransport for OpenAiEmbeddingTransport {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed_chunk(&self, texts: &[String]) -> Result<Vec<IndexedVector>, EmbedError> {
        debug!(
            "requesting embeddings (model={}, inputs={})",
            self.model,
            texts.len()
        );
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|err| EmbedError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbedError::Status {
                status: status.as_u16(),
                body: body.chars().take(240).collect(),
            });
        }

        let payload: EmbeddingResponse = response
            .json()
            .await
            .map_err(|err| EmbedError::InvalidResponse(err.to_string()))?;
        Ok(payload
            .data
            .into_iter()
            .map(|item| IndexedVector {
                index: item.index,
                vector: item.embedding,
            })
            .collect())
    }
}
