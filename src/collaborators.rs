//! Collaborator interfaces consumed by the document layer but not
//! implemented here: embedding providers, tokenizers, and text fetchers.
//!
//! Production implementations (an OpenAI-style HTTP embeddings client, a
//! BPE tokenizer, a filesystem/web fetcher) live outside this crate; callers
//! supply their own `Arc<dyn Embeddings>` / `Arc<dyn Tokenizer>` /
//! `Arc<dyn TextFetcher>`.

use async_trait::async_trait;

/// Outcome of a batch embeddings request.
#[derive(Debug, Clone, PartialEq)]
pub enum EmbeddingsStatus {
    Success,
    RateLimited,
    Error,
}

#[derive(Debug, Clone)]
pub struct EmbeddingsResponse {
    pub status: EmbeddingsStatus,
    pub output: Option<Vec<Vec<f32>>>,
    pub message: Option<String>,
}

impl EmbeddingsResponse {
    pub fn success(output: Vec<Vec<f32>>) -> Self {
        Self {
            status: EmbeddingsStatus::Success,
            output: Some(output),
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: EmbeddingsStatus::Error,
            output: None,
            message: Some(message.into()),
        }
    }
}

/// A batch embeddings provider. `max_tokens` bounds how many tokens worth of
/// input text the document layer will pack into a single
/// `create_embeddings` call (see `upsertDocument`'s batching rule).
#[async_trait]
pub trait Embeddings: Send + Sync {
    fn max_tokens(&self) -> usize;
    async fn create_embeddings(&self, inputs: &[String]) -> EmbeddingsResponse;
}

/// A tokenizer, consumed by the splitter and the section renderer to bound
/// chunk/section sizes and to decode truncated/expanded spans back to text.
pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Vec<u32>;
    fn decode(&self, tokens: &[u32]) -> String;
}

/// Result of fetching a single URI: the resolved URI, its text, and a
/// best-guess `doc_type` (usually the lowercased file extension).
#[derive(Debug, Clone)]
pub struct FetchedText {
    pub uri: String,
    pub text: String,
    pub doc_type: Option<String>,
}

/// A source of document text.
///
/// A filesystem-backed implementation is expected to recurse when `uri`
/// names a directory (fetching and yielding one [`FetchedText`] per entry)
/// rather than requiring the caller to pre-enumerate files; a missing path
/// yields no results rather than an error.
#[async_trait]
pub trait TextFetcher: Send + Sync {
    async fn fetch(&self, uri: &str) -> anyhow::Result<Vec<FetchedText>>;
}
