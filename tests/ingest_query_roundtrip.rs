//! End-to-end integration test: create an index, ingest two documents
//! through the document layer, query, and render a section — driven
//! against deterministic in-test `Embeddings`/`Tokenizer` doubles instead
//! of a real provider.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use vectra_index::collaborators::{Embeddings, EmbeddingsResponse, Tokenizer};
use vectra_index::document_index::{DocumentIndex, DocumentQueryOptions};
use vectra_index::vector_index::{CreateIndexConfig, MetadataConfig, VectorIndex};

struct WordTokenizer;

impl Tokenizer for WordTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        text.split_whitespace().map(|w| word_id(w)).collect()
    }

    fn decode(&self, tokens: &[u32]) -> String {
        tokens.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(" ")
    }
}

fn word_id(w: &str) -> u32 {
    w.bytes().fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32))
}

/// One-hot-ish bag-of-words embedding over a small fixed vocabulary so
/// cosine similarity behaves predictably in assertions.
struct VocabEmbeddings {
    vocab: Vec<&'static str>,
}

#[async_trait]
impl Embeddings for VocabEmbeddings {
    fn max_tokens(&self) -> usize {
        1_000
    }

    async fn create_embeddings(&self, inputs: &[String]) -> EmbeddingsResponse {
        let output = inputs
            .iter()
            .map(|text| {
                let words: Vec<&str> = text.split_whitespace().collect();
                self.vocab
                    .iter()
                    .map(|v| words.iter().filter(|w| w.eq_ignore_ascii_case(v)).count() as f32)
                    .collect()
            })
            .collect();
        EmbeddingsResponse::success(output)
    }
}

fn embeddings() -> Arc<VocabEmbeddings> {
    Arc::new(VocabEmbeddings {
        vocab: vec!["apple", "banana", "cherry", "delta"],
    })
}

#[tokio::test]
async fn create_upsert_query_render_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let index = DocumentIndex::new(dir.path().to_path_buf(), Arc::new(WordTokenizer), Some(embeddings()), None);

    index
        .create_index(CreateIndexConfig::new(1))
        .await
        .unwrap();

    index
        .upsert_document("doc://apple", "apple apple apple is a fruit that grows on trees", None, None)
        .await
        .unwrap();
    index
        .upsert_document("doc://banana", "banana banana is a yellow fruit from the tropics", None, None)
        .await
        .unwrap();

    let stats = index.get_catalog_stats().await.unwrap();
    assert_eq!(stats.documents, 2);
    assert!(stats.chunks >= 2);

    let results = index
        .query_documents("apple", DocumentQueryOptions::default())
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0].uri(), "doc://apple", "the apple document should rank first for an apple query");

    for chunk in results[0].chunks() {
        assert_eq!(chunk.item.metadata.get("document_id").and_then(|v| v.as_str()), Some(results[0].id()));
    }

    let sections = results[0].render_sections(50, 2, true).await.unwrap();
    assert!(!sections.is_empty());
    assert!(sections[0].text.contains("apple"));
}

#[tokio::test]
async fn re_upsert_replaces_chunks_and_keeps_catalog_count_stable() {
    let dir = tempfile::tempdir().unwrap();
    let index = DocumentIndex::new(dir.path().to_path_buf(), Arc::new(WordTokenizer), Some(embeddings()), None);
    index.create_index(CreateIndexConfig::new(1)).await.unwrap();

    index.upsert_document("doc://a", "apple apple apple", None, None).await.unwrap();
    let first_id = index.get_document_id("doc://a").await.unwrap().unwrap();

    index.upsert_document("doc://a", "banana banana banana", None, None).await.unwrap();
    let second_id = index.get_document_id("doc://a").await.unwrap().unwrap();

    let stats = index.get_catalog_stats().await.unwrap();
    assert_eq!(stats.documents, 1, "re-upserting the same uri must not grow the catalog");
    assert_ne!(first_id, second_id, "re-upsert assigns a fresh document id");

    // old document's text file should be gone.
    assert!(!dir.path().join(format!("{first_id}.txt")).exists());
    assert!(dir.path().join(format!("{second_id}.txt")).exists());
}

#[tokio::test]
async fn delete_document_is_idempotent_and_removes_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let index = DocumentIndex::new(dir.path().to_path_buf(), Arc::new(WordTokenizer), Some(embeddings()), None);
    index.create_index(CreateIndexConfig::new(1)).await.unwrap();
    index.upsert_document("doc://a", "apple banana cherry", None, None).await.unwrap();

    index.delete_document("doc://a").await.unwrap();
    index.delete_document("doc://a").await.unwrap(); // second call must be a no-op

    let stats = index.get_catalog_stats().await.unwrap();
    assert_eq!(stats.documents, 0);
    assert_eq!(stats.chunks, 0);
}

#[tokio::test]
async fn metadata_filter_narrows_document_query_results() {
    let dir = tempfile::tempdir().unwrap();
    let index = DocumentIndex::new(dir.path().to_path_buf(), Arc::new(WordTokenizer), Some(embeddings()), None);
    index.create_index(CreateIndexConfig::new(1)).await.unwrap();

    let mut meta_a = vectra_index::metadata::Metadata::new();
    meta_a.insert("lang".to_string(), json!("en"));
    index
        .upsert_document("doc://a", "apple apple apple", None, Some(meta_a))
        .await
        .unwrap();

    let mut meta_b = vectra_index::metadata::Metadata::new();
    meta_b.insert("lang".to_string(), json!("fr"));
    index
        .upsert_document("doc://b", "apple apple apple", None, Some(meta_b))
        .await
        .unwrap();

    let opts = DocumentQueryOptions {
        max_documents: 10,
        max_chunks: 50,
        filter: Some(json!({"lang": "fr"})),
    };
    let results = index.query_documents("apple", opts).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].uri(), "doc://b");
}

#[tokio::test]
async fn allow_listed_metadata_is_queryable_inline_but_full_blob_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let vector_index = VectorIndex::new(dir.path().to_path_buf(), None);
    vector_index
        .create_index(CreateIndexConfig {
            version: 1,
            delete_if_exists: false,
            metadata_config: Some(MetadataConfig {
                indexed: Some(vec!["tag".to_string()]),
            }),
        })
        .await
        .unwrap();

    vector_index
        .insert_item(vectra_index::vector_index::NewItem {
            id: Some("x".to_string()),
            metadata: Some(serde_json::json!({"tag": "hot", "body": "private notes"}).as_object().unwrap().clone()),
            vector: vec![1.0, 0.0],
        })
        .await
        .unwrap();

    let results = vector_index.query_items(&[1.0, 0.0], 1, None).await.unwrap();
    assert_eq!(results[0].item.metadata.get("body").unwrap(), "private notes");

    let by_tag = vector_index
        .list_items_by_metadata(Some(&json!({"tag": "hot"})))
        .await
        .unwrap();
    assert_eq!(by_tag.len(), 1);
    assert!(by_tag[0].metadata.get("body").is_none());
}
