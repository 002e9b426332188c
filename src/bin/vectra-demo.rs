//! Thin smoke-test CLI: create an index in a folder, upsert a couple of
//! documents, and print the top query result. Not part of the tested public
//! contract — exercises the library the way a caller would wire it up, with
//! a toy whitespace tokenizer and a deterministic hashing "embeddings"
//! provider standing in for the real collaborators this crate doesn't ship.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use vectra_index::collaborators::{Embeddings, EmbeddingsResponse, Tokenizer};
use vectra_index::document_index::{DocumentIndex, DocumentQueryOptions};
use vectra_index::vector_index::CreateIndexConfig;

#[derive(Debug, Parser)]
#[command(name = "vectra-demo")]
#[command(about = "Smoke-tests VectorIndex/DocumentIndex against a folder")]
struct Cli {
    /// Folder to create (or reuse) the index in.
    #[arg(long, default_value = "./.vectra-demo")]
    folder: PathBuf,

    /// Query text to run after ingesting the demo documents.
    #[arg(long, default_value = "hello world")]
    query: String,
}

struct WhitespaceTokenizer;

impl Tokenizer for WhitespaceTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        text.split_whitespace().map(|w| fnv1a(w)).collect()
    }

    fn decode(&self, tokens: &[u32]) -> String {
        // Lossy by construction (hashing isn't invertible); good enough for
        // a smoke test, never used where round-tripping matters.
        tokens.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(" ")
    }
}

fn fnv1a(s: &str) -> u32 {
    let mut hash: u32 = 2166136261;
    for b in s.bytes() {
        hash ^= b as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}

/// Deterministic 8-dim bag-of-words embedding: hashes each word into one of
/// 8 buckets. Real callers supply an HTTP-backed provider instead.
struct HashEmbeddings;

#[async_trait]
impl Embeddings for HashEmbeddings {
    fn max_tokens(&self) -> usize {
        8_000
    }

    async fn create_embeddings(&self, inputs: &[String]) -> EmbeddingsResponse {
        let output = inputs
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; 8];
                for word in text.split_whitespace() {
                    v[(fnv1a(word) % 8) as usize] += 1.0;
                }
                if v.iter().all(|x| *x == 0.0) {
                    v[0] = 1.0;
                }
                v
            })
            .collect();
        EmbeddingsResponse::success(output)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::try_init().ok();
    let cli = Cli::parse();

    let index = DocumentIndex::new(
        cli.folder.clone(),
        Arc::new(WhitespaceTokenizer),
        Some(Arc::new(HashEmbeddings)),
        None,
    );
    index
        .create_index(CreateIndexConfig {
            version: 1,
            delete_if_exists: true,
            metadata_config: None,
        })
        .await
        .context("create_index failed")?;

    index
        .upsert_document("demo://greeting", "hello world, this is a friendly greeting", None, None)
        .await
        .context("upsert_document failed")?;
    index
        .upsert_document("demo://farewell", "goodbye, see you later", None, None)
        .await
        .context("upsert_document failed")?;

    let results = index
        .query_documents(&cli.query, DocumentQueryOptions::default())
        .await
        .context("query_documents failed")?;

    for doc in &results {
        println!("{} (score {:.4})", doc.uri(), doc.score());
        let sections = doc.render_sections(200, 1, true).await?;
        for section in sections {
            println!("  {}", section.text);
        }
    }

    Ok(())
}
