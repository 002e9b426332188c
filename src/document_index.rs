//! The document layer: a catalog mapping URI↔document-id layered on top of
//! [`VectorIndex`], plus chunking + embedding batching on ingest.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::collaborators::{Embeddings, EmbeddingsStatus, Tokenizer};
use crate::document_result::{DocumentResult, LocalDocument};
use crate::error::{Result, VectraError};
use crate::fsutil::atomic_write_json;
use crate::metadata::Metadata;
use crate::text_splitter::{TextSplitter, TextSplitterConfig};
use crate::vector_index::{CreateIndexConfig, NewItem, VectorIndex};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentCatalog {
    pub version: u32,
    pub count: usize,
    pub uri_to_id: HashMap<String, String>,
    pub id_to_uri: HashMap<String, String>,
}

impl DocumentCatalog {
    fn empty() -> Self {
        Self {
            version: 1,
            count: 0,
            uri_to_id: HashMap::new(),
            id_to_uri: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DocumentCatalogStats {
    pub version: u32,
    pub documents: usize,
    pub chunks: usize,
    pub metadata_config: crate::vector_index::MetadataConfig,
}

#[derive(Debug, Clone)]
pub struct DocumentQueryOptions {
    pub max_documents: usize,
    pub max_chunks: usize,
    pub filter: Option<Value>,
}

impl Default for DocumentQueryOptions {
    fn default() -> Self {
        Self {
            max_documents: 10,
            max_chunks: 50,
            filter: None,
        }
    }
}

struct CatalogState {
    catalog: Option<DocumentCatalog>,
    new_catalog: Option<DocumentCatalog>,
}

pub struct DocumentIndex {
    vector_index: VectorIndex,
    folder_path: PathBuf,
    embeddings: Option<Arc<dyn Embeddings>>,
    tokenizer: Arc<dyn Tokenizer>,
    chunking_config: TextSplitterConfig,
    catalog_state: Mutex<CatalogState>,
}

impl DocumentIndex {
    pub fn new(
        folder_path: impl Into<PathBuf>,
        tokenizer: Arc<dyn Tokenizer>,
        embeddings: Option<Arc<dyn Embeddings>>,
        chunking_config: Option<TextSplitterConfig>,
    ) -> Self {
        let folder_path = folder_path.into();
        Self {
            vector_index: VectorIndex::new(folder_path.clone(), None),
            folder_path,
            embeddings,
            tokenizer,
            chunking_config: chunking_config.unwrap_or_default(),
            catalog_state: Mutex::new(CatalogState {
                catalog: None,
                new_catalog: None,
            }),
        }
    }

    pub fn folder_path(&self) -> &Path {
        &self.folder_path
    }

    fn catalog_path(&self) -> PathBuf {
        self.folder_path.join("catalog.json")
    }

    pub async fn create_index(&self, config: CreateIndexConfig) -> Result<()> {
        self.vector_index.create_index(config).await?;
        self.load_catalog().await
    }

    async fn load_catalog(&self) -> Result<()> {
        let mut state = self.catalog_state.lock().await;
        if state.catalog.is_some() {
            return Ok(());
        }
        let path = self.catalog_path();
        if path.is_file() {
            let text = tokio::fs::read_to_string(&path).await?;
            let catalog: DocumentCatalog = serde_json::from_str(&text)
                .map_err(|e| VectraError::DataCorruption(format!("error loading document catalog: {e}")))?;
            debug!(documents = catalog.count, "loaded catalog.json");
            state.catalog = Some(catalog);
        } else {
            let catalog = DocumentCatalog::empty();
            atomic_write_json(&path, &catalog)
                .await
                .map_err(|e| VectraError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
            state.catalog = Some(catalog);
        }
        Ok(())
    }

    pub async fn get_document_id(&self, uri: &str) -> Result<Option<String>> {
        self.load_catalog().await?;
        let state = self.catalog_state.lock().await;
        Ok(state.catalog.as_ref().and_then(|c| c.uri_to_id.get(uri).cloned()))
    }

    pub async fn get_document_uri(&self, document_id: &str) -> Result<Option<String>> {
        self.load_catalog().await?;
        let state = self.catalog_state.lock().await;
        Ok(state.catalog.as_ref().and_then(|c| c.id_to_uri.get(document_id).cloned()))
    }

    async fn begin_update(&self) -> Result<()> {
        self.vector_index.begin_update().await?;
        self.load_catalog().await?;
        let mut state = self.catalog_state.lock().await;
        state.new_catalog = state.catalog.clone();
        Ok(())
    }

    async fn cancel_update(&self) -> Result<()> {
        self.vector_index.cancel_update().await?;
        let mut state = self.catalog_state.lock().await;
        state.new_catalog = None;
        Ok(())
    }

    async fn end_update(&self) -> Result<()> {
        self.vector_index.end_update().await?;
        let snapshot = {
            let state = self.catalog_state.lock().await;
            state
                .new_catalog
                .clone()
                .ok_or_else(|| VectraError::PreconditionViolation("no update in progress".into()))?
        };
        atomic_write_json(&self.catalog_path(), &snapshot)
            .await
            .map_err(|e| VectraError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
        debug!(documents = snapshot.count, "saved catalog.json");
        let mut state = self.catalog_state.lock().await;
        state.catalog = Some(snapshot);
        state.new_catalog = None;
        Ok(())
    }

    pub async fn get_catalog_stats(&self) -> Result<DocumentCatalogStats> {
        let stats = self.vector_index.get_index_stats().await?;
        self.load_catalog().await?;
        let state = self.catalog_state.lock().await;
        let catalog = state.catalog.as_ref().expect("loaded above");
        Ok(DocumentCatalogStats {
            version: catalog.version,
            documents: catalog.count,
            chunks: stats.items,
            metadata_config: stats.metadata_config,
        })
    }

    /// Ingests a document: chunk → batch-embed → transactional insert of
    /// chunk items → persist text/metadata sidecars → update the catalog.
    /// If `uri` is already known, the prior document is deleted first.
    #[tracing::instrument(skip(self, text, metadata), fields(uri = %uri))]
    pub async fn upsert_document(
        &self,
        uri: &str,
        text: &str,
        doc_type: Option<String>,
        metadata: Option<Metadata>,
    ) -> Result<LocalDocument> {
        let embeddings = self
            .embeddings
            .clone()
            .ok_or_else(|| VectraError::PreconditionViolation("embeddings model not configured".into()))?;

        if self.get_document_id(uri).await?.is_some() {
            self.delete_document(uri).await?;
        }
        let document_id = Uuid::new_v4().to_string();

        let resolved_doc_type = doc_type
            .or_else(|| self.chunking_config.doc_type.clone())
            .or_else(|| uri.rfind('.').map(|pos| uri[pos + 1..].to_lowercase()));

        let splitter_config = TextSplitterConfig {
            separators: vec![],
            doc_type: resolved_doc_type,
            ..self.chunking_config.clone()
        };
        let splitter = TextSplitter::new(splitter_config, self.tokenizer.clone())
            .map_err(|e| VectraError::PreconditionViolation(e.to_string()))?;
        let chunks = splitter.split(text);

        let max_tokens = embeddings.max_tokens();
        let mut batches: Vec<Vec<String>> = Vec::new();
        let mut current: Vec<String> = Vec::new();
        let mut total_tokens = 0usize;
        for chunk in &chunks {
            total_tokens += chunk.tokens.len();
            if total_tokens > max_tokens {
                if !current.is_empty() {
                    batches.push(std::mem::take(&mut current));
                }
                total_tokens = chunk.tokens.len();
            }
            current.push(chunk.text.replace('\n', " "));
        }
        if !current.is_empty() {
            batches.push(current);
        }

        let mut embedded: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());
        for batch in &batches {
            let response = embeddings.create_embeddings(batch).await;
            if response.status != EmbeddingsStatus::Success {
                return Err(VectraError::ProviderError(
                    response.message.unwrap_or_else(|| "error generating embeddings".to_string()),
                ));
            }
            embedded.extend(response.output.unwrap_or_default());
        }
        if embedded.len() != chunks.len() {
            return Err(VectraError::ProviderError(
                "embeddings output count did not match chunk count".to_string(),
            ));
        }

        let ingest_result = self
            .upsert_document_transaction(uri, &document_id, text, &chunks, embedded, metadata.clone())
            .await;

        match ingest_result {
            Ok(()) => {
                info!(document_id = %document_id, chunks = chunks.len(), "document ingested");
                Ok(LocalDocument::new(
                    self.folder_path.clone(),
                    document_id,
                    uri.to_string(),
                    self.tokenizer.clone(),
                ))
            }
            Err(err) => {
                warn!(uri = %uri, error = %err, "upsert_document failed, cancelling transaction");
                let _ = self.cancel_update().await;
                Err(err)
            }
        }
    }

    async fn upsert_document_transaction(
        &self,
        uri: &str,
        document_id: &str,
        text: &str,
        chunks: &[crate::text_splitter::TextChunk],
        embeddings: Vec<Vec<f32>>,
        metadata: Option<Metadata>,
    ) -> Result<()> {
        self.begin_update().await?;

        for (chunk, vector) in chunks.iter().zip(embeddings.into_iter()) {
            let mut chunk_metadata = Metadata::new();
            chunk_metadata.insert("document_id".to_string(), json!(document_id));
            chunk_metadata.insert("start_pos".to_string(), json!(chunk.start_pos));
            chunk_metadata.insert("end_pos".to_string(), json!(chunk.end_pos));
            if let Some(extra) = &metadata {
                for (k, v) in extra {
                    chunk_metadata.insert(k.clone(), v.clone());
                }
            }
            self.vector_index
                .insert_item(NewItem {
                    id: None,
                    metadata: Some(chunk_metadata),
                    vector,
                })
                .await?;
        }

        if let Some(meta) = &metadata {
            let path = self.folder_path.join(format!("{document_id}.json"));
            let bytes = serde_json::to_vec(meta)?;
            tokio::fs::write(&path, bytes).await?;
        }
        let text_path = self.folder_path.join(format!("{document_id}.txt"));
        tokio::fs::write(&text_path, text.as_bytes()).await?;

        {
            let mut state = self.catalog_state.lock().await;
            let new_catalog = state
                .new_catalog
                .as_mut()
                .expect("begin_update populated new_catalog");
            new_catalog.uri_to_id.insert(uri.to_string(), document_id.to_string());
            new_catalog.id_to_uri.insert(document_id.to_string(), uri.to_string());
            new_catalog.count += 1;
        }

        self.end_update().await
    }

    #[tracing::instrument(skip(self), fields(uri = %uri))]
    pub async fn delete_document(&self, uri: &str) -> Result<()> {
        let Some(document_id) = self.get_document_id(uri).await? else {
            return Ok(());
        };

        let result: Result<()> = async {
            self.begin_update().await?;
            let chunks = self
                .vector_index
                .list_items_by_metadata(Some(&json!({ "document_id": document_id })))
                .await?;
            for chunk in chunks {
                self.vector_index.delete_item(&chunk.id).await?;
            }
            {
                let mut state = self.catalog_state.lock().await;
                let new_catalog = state
                    .new_catalog
                    .as_mut()
                    .expect("begin_update populated new_catalog");
                new_catalog.uri_to_id.remove(uri);
                new_catalog.id_to_uri.remove(&document_id);
                new_catalog.count = new_catalog.count.saturating_sub(1);
            }
            self.end_update().await
        }
        .await;

        if result.is_err() {
            let _ = self.cancel_update().await;
            return result;
        }

        for ext in ["txt", "json"] {
            let path = self.folder_path.join(format!("{document_id}.{ext}"));
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(VectraError::Io(e)),
            }
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, query))]
    pub async fn query_documents(
        &self,
        query: &str,
        opts: DocumentQueryOptions,
    ) -> Result<Vec<DocumentResult>> {
        let embeddings = self
            .embeddings
            .clone()
            .ok_or_else(|| VectraError::PreconditionViolation("embeddings model not configured".into()))?;

        let response = embeddings
            .create_embeddings(&[query.replace('\n', " ")])
            .await;
        if response.status != EmbeddingsStatus::Success {
            return Err(VectraError::ProviderError(
                response.message.unwrap_or_else(|| "error generating embeddings for query".to_string()),
            ));
        }
        let query_vector = response
            .output
            .and_then(|mut o| if o.is_empty() { None } else { Some(o.remove(0)) })
            .ok_or_else(|| VectraError::ProviderError("embeddings provider returned no output".into()))?;

        let results = self
            .vector_index
            .query_items(&query_vector, opts.max_chunks, opts.filter.as_ref())
            .await?;

        let mut by_document: HashMap<String, Vec<crate::vector_index::QueryResult>> = HashMap::new();
        for result in results {
            let doc_id = result
                .item
                .metadata
                .get("document_id")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            by_document.entry(doc_id).or_default().push(result);
        }

        let mut document_results = Vec::with_capacity(by_document.len());
        for (document_id, chunks) in by_document {
            let uri = self.get_document_uri(&document_id).await?.unwrap_or_default();
            document_results.push(DocumentResult::new(
                self.folder_path.clone(),
                document_id,
                uri,
                chunks,
                self.tokenizer.clone(),
            ));
        }

        document_results.sort_by(|a, b| b.score().partial_cmp(&a.score()).unwrap_or(std::cmp::Ordering::Equal));
        document_results.truncate(opts.max_documents);
        Ok(document_results)
    }
}
