// ============================================
// Presentation Embeddings
// ============================================
//
// Keeps `presentation_embeddings` in sync with presentation content.
// The text is hashed (SHA-256) and the generator is only called when the
// hash stored for the model differs. Generator failures degrade to
// "no embedding" and are never retried here.

use crate::config::EmbeddingConfig;
use crate::db::EmbeddingStore;
use crate::error::{AppError, Result};
use crate::models::{Presentation, PresentationEmbedding};
use crate::services::neighbors::{l2_normalize, pack_f32_le};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Output of the external embedding collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedEmbedding {
    pub vector: Vec<f32>,
    pub model: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmbeddingGenerator: Send + Sync {
    async fn generate(&self, text: &str) -> Result<GeneratedEmbedding>;
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EmbeddingResponse {
    Batch { data: Vec<EmbeddingData> },
    Single { embedding: Vec<f32> },
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// OpenAI-compatible `/embeddings` endpoint
pub struct HttpEmbeddingGenerator {
    client: HttpClient,
    url: String,
    api_key: Option<String>,
    model: String,
}

impl HttpEmbeddingGenerator {
    pub fn new(url: &str, api_key: Option<&str>, model: &str, timeout: Duration) -> Result<Self> {
        let client = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.to_string(),
            api_key: api_key.map(str::to_string),
            model: model.to_string(),
        })
    }

    /// `None` when no endpoint is configured
    pub fn from_config(config: &EmbeddingConfig) -> Result<Option<Self>> {
        let Some(url) = config.api_url.as_deref() else {
            info!("Embedding generator not configured");
            return Ok(None);
        };
        Self::new(
            url,
            config.api_key.as_deref(),
            &config.model,
            Duration::from_secs(config.timeout_secs.max(1)),
        )
        .map(Some)
    }
}

#[async_trait]
impl EmbeddingGenerator for HttpEmbeddingGenerator {
    async fn generate(&self, text: &str) -> Result<GeneratedEmbedding> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: text,
        };

        let mut builder = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Embedding(format!(
                "Embedding API returned {}: {}",
                status, error_text
            )));
        }

        let vector = match response.json::<EmbeddingResponse>().await? {
            EmbeddingResponse::Batch { data } => data
                .into_iter()
                .next()
                .map(|d| d.embedding)
                .unwrap_or_default(),
            EmbeddingResponse::Single { embedding } => embedding,
        };

        Ok(GeneratedEmbedding {
            vector,
            model: self.model.clone(),
        })
    }
}

/// Text sent to the generator: title, goal, description, categories, keywords
pub fn embedding_text(presentation: &Presentation) -> String {
    let categories = presentation.categories.join(", ");
    [
        Some(presentation.title.as_str()),
        presentation.goal.as_deref(),
        presentation.description.as_deref(),
        Some(categories.as_str()),
        presentation.keywords.as_deref(),
    ]
    .into_iter()
    .flatten()
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .collect::<Vec<_>>()
    .join("\n")
}

pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndexOutcome {
    Indexed(PresentationEmbedding),
    /// Stored hash matches the current content
    Unchanged,
    /// Generator missing, failing or returning an unusable vector
    Unavailable,
}

pub struct EmbeddingIndexer {
    store: Arc<dyn EmbeddingStore>,
    generator: Option<Arc<dyn EmbeddingGenerator>>,
    model: String,
    dims: i32,
}

impl EmbeddingIndexer {
    pub fn new(
        store: Arc<dyn EmbeddingStore>,
        generator: Option<Arc<dyn EmbeddingGenerator>>,
        model: &str,
        dims: i32,
    ) -> Self {
        Self {
            store,
            generator,
            model: model.to_string(),
            dims,
        }
    }

    pub async fn index(&self, presentation: &Presentation) -> Result<IndexOutcome> {
        let Some(generator) = &self.generator else {
            return Ok(IndexOutcome::Unavailable);
        };

        let text = embedding_text(presentation);
        let hash = content_hash(&text);
        if self.store.content_hash(presentation.id, &self.model).await?.as_deref() == Some(hash.as_str()) {
            debug!(presentation_id = %presentation.id, "Embedding content unchanged");
            return Ok(IndexOutcome::Unchanged);
        }

        let generated = match generator.generate(&text).await {
            Ok(generated) => generated,
            Err(e) => {
                warn!(
                    presentation_id = %presentation.id,
                    error = %e,
                    "Embedding generation failed"
                );
                return Ok(IndexOutcome::Unavailable);
            }
        };

        let mut vector = generated.vector;
        let dims_match = self.dims <= 0 || vector.len() == self.dims as usize;
        if vector.is_empty() || !dims_match || !l2_normalize(&mut vector) {
            warn!(
                presentation_id = %presentation.id,
                expected = self.dims,
                received = vector.len(),
                "Unusable embedding vector"
            );
            return Ok(IndexOutcome::Unavailable);
        }

        let embedding = PresentationEmbedding {
            presentation_id: presentation.id,
            model: self.model.clone(),
            dims: vector.len() as i32,
            normalized: true,
            vector: pack_f32_le(&vector),
            content_hash: hash,
            updated_at: Utc::now(),
        };
        self.store.upsert_embedding(&embedding).await?;

        debug!(presentation_id = %presentation.id, model = %self.model, "Embedding stored");
        Ok(IndexOutcome::Indexed(embedding))
    }
}
