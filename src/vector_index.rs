//! The on-disk vector store: `index.json` persistence, the transactional
//! update protocol, and exact top-K cosine search under an optional
//! metadata filter.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{Result, VectraError};
use crate::fsutil::atomic_write_json;
use crate::item_selector;
use crate::metadata::{self, Metadata};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexItem {
    pub id: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub vector: Vec<f32>,
    pub norm: f32,
    #[serde(rename = "metadataFile", skip_serializing_if = "Option::is_none", default)]
    pub metadata_file: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataConfig {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub indexed: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexData {
    pub version: u32,
    #[serde(default)]
    pub metadata_config: MetadataConfig,
    #[serde(default)]
    pub items: Vec<IndexItem>,
}

impl IndexData {
    fn empty(version: u32, metadata_config: MetadataConfig) -> Self {
        Self {
            version,
            metadata_config,
            items: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CreateIndexConfig {
    pub version: u32,
    pub delete_if_exists: bool,
    pub metadata_config: Option<MetadataConfig>,
}

impl CreateIndexConfig {
    pub fn new(version: u32) -> Self {
        Self {
            version,
            ..Default::default()
        }
    }
}

/// A new item to insert/upsert. `id` is caller-supplied or freshly
/// generated; `vector` must be non-empty.
#[derive(Debug, Clone, Default)]
pub struct NewItem {
    pub id: Option<String>,
    pub metadata: Option<Metadata>,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct QueryResult {
    pub item: IndexItem,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct IndexStats {
    pub version: u32,
    pub metadata_config: MetadataConfig,
    pub items: usize,
}

struct Inner {
    data: Option<IndexData>,
    update: Option<IndexData>,
}

/// Bound to a folder path and an index filename. Construction does not
/// touch disk; `data`/`update` are loaded lazily (`Unloaded → Loaded`) on
/// first access, per the `{Unloaded, Loaded, Updating}` state machine.
pub struct VectorIndex {
    folder_path: PathBuf,
    index_name: String,
    inner: Mutex<Inner>,
}

impl VectorIndex {
    pub fn new(folder_path: impl Into<PathBuf>, index_name: Option<String>) -> Self {
        Self {
            folder_path: folder_path.into(),
            index_name: index_name.unwrap_or_else(|| "index.json".to_string()),
            inner: Mutex::new(Inner {
                data: None,
                update: None,
            }),
        }
    }

    pub fn folder_path(&self) -> &Path {
        &self.folder_path
    }

    fn index_path(&self) -> PathBuf {
        self.folder_path.join(&self.index_name)
    }

    pub fn is_index_created(&self) -> bool {
        self.index_path().is_file()
    }

    #[instrument(skip(self, config), fields(folder = %self.folder_path.display()))]
    pub async fn create_index(&self, config: CreateIndexConfig) -> Result<()> {
        if self.is_index_created() {
            if config.delete_if_exists {
                self.delete_index().await?;
            } else {
                return Err(VectraError::PreconditionViolation(
                    "index already exists".into(),
                ));
            }
        }

        let data = IndexData::empty(config.version, config.metadata_config.unwrap_or_default());

        let result: anyhow::Result<()> = async {
            tokio::fs::create_dir_all(&self.folder_path).await?;
            atomic_write_json(&self.index_path(), &data).await?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                let mut inner = self.inner.lock().await;
                inner.data = Some(data);
                info!(folder = %self.folder_path.display(), "index created");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "create_index failed, rolling back folder");
                let _ = self.delete_index().await;
                Err(VectraError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    err.to_string(),
                )))
            }
        }
    }

    pub async fn delete_index(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.data = None;
        inner.update = None;
        match tokio::fs::remove_dir_all(&self.folder_path).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(error = %err, "delete_index: failed to remove folder"),
        }
        Ok(())
    }

    /// Idempotent: creates with defaults if missing, or if the file on disk
    /// is syntactically invalid.
    pub async fn init_index(&self) -> Result<()> {
        if !self.is_index_created() {
            return self.create_index(CreateIndexConfig::new(1)).await;
        }
        if self.load_index_data().await.is_err() {
            return self.create_index(CreateIndexConfig {
                version: 1,
                delete_if_exists: true,
                metadata_config: None,
            })
            .await;
        }
        Ok(())
    }

    async fn load_index_data(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.data.is_some() {
            return Ok(());
        }
        if !self.is_index_created() {
            return Err(VectraError::NotFound("index does not exist".into()));
        }
        let text = tokio::fs::read_to_string(self.index_path()).await?;
        let data: IndexData = serde_json::from_str(&text)
            .map_err(|e| VectraError::DataCorruption(format!("error loading index data: {e}")))?;
        debug!(items = data.items.len(), "loaded index.json");
        inner.data = Some(data);
        Ok(())
    }

    pub async fn begin_update(&self) -> Result<()> {
        self.load_index_data().await?;
        let mut inner = self.inner.lock().await;
        if inner.update.is_some() {
            return Err(VectraError::PreconditionViolation(
                "update already in progress".into(),
            ));
        }
        inner.update = inner.data.clone();
        Ok(())
    }

    pub async fn cancel_update(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.update = None;
        Ok(())
    }

    #[instrument(skip(self), fields(folder = %self.folder_path.display()))]
    pub async fn end_update(&self) -> Result<()> {
        let snapshot = {
            let inner = self.inner.lock().await;
            inner
                .update
                .clone()
                .ok_or_else(|| VectraError::PreconditionViolation("no update in progress".into()))?
        };

        atomic_write_json(&self.index_path(), &snapshot)
            .await
            .map_err(|e| VectraError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
        debug!(items = snapshot.items.len(), "saved index.json");

        let mut inner = self.inner.lock().await;
        inner.data = Some(snapshot);
        inner.update = None;
        Ok(())
    }

    pub async fn insert_item(&self, item: NewItem) -> Result<IndexItem> {
        self.add_item(item, true).await
    }

    pub async fn upsert_item(&self, item: NewItem) -> Result<IndexItem> {
        self.add_item(item, false).await
    }

    async fn add_item(&self, item: NewItem, unique: bool) -> Result<IndexItem> {
        let wrap = !self.update_active().await;
        if wrap {
            self.begin_update().await?;
        }
        let result = self.add_item_to_update(item, unique).await;
        if wrap {
            match &result {
                Ok(_) => self.end_update().await?,
                Err(_) => {
                    self.cancel_update().await?;
                }
            }
        }
        result
    }

    async fn update_active(&self) -> bool {
        self.inner.lock().await.update.is_some()
    }

    async fn add_item_to_update(&self, item: NewItem, unique: bool) -> Result<IndexItem> {
        if item.vector.is_empty() {
            return Err(VectraError::PreconditionViolation("vector is required".into()));
        }

        let id = item.id.unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut inner = self.inner.lock().await;
        let update = inner
            .update
            .as_mut()
            .ok_or_else(|| VectraError::PreconditionViolation("no update in progress".into()))?;

        if unique && update.items.iter().any(|i| i.id == id) {
            return Err(VectraError::PreconditionViolation(format!(
                "item with id {id} already exists"
            )));
        }

        let indexed = update.metadata_config.indexed.clone().unwrap_or_default();
        let mut inline_metadata = Metadata::new();
        let mut metadata_file = None;

        if let Some(full) = &item.metadata {
            if !indexed.is_empty() {
                for key in &indexed {
                    if let Some(v) = full.get(key) {
                        inline_metadata.insert(key.clone(), v.clone());
                    }
                }
                if !full.is_empty() {
                    let filename = format!("{}.json", Uuid::new_v4());
                    let path = self.folder_path.join(&filename);
                    let full_value = Value::Object(full.clone());
                    atomic_write_json(&path, &full_value)
                        .await
                        .map_err(|e| VectraError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
                    metadata_file = Some(filename);
                }
            } else {
                inline_metadata = full.clone();
            }
        }

        let norm = item_selector::normalize(&item.vector);
        let new_item = IndexItem {
            id: id.clone(),
            metadata: inline_metadata,
            vector: item.vector,
            norm,
            metadata_file,
        };

        if !unique {
            if let Some(existing) = update.items.iter_mut().find(|i| i.id == id) {
                *existing = new_item.clone();
                return Ok(new_item);
            }
        }

        update.items.push(new_item.clone());
        Ok(new_item)
    }

    pub async fn delete_item(&self, id: &str) -> Result<()> {
        let wrap = !self.update_active().await;
        if wrap {
            self.begin_update().await?;
        }
        {
            let mut inner = self.inner.lock().await;
            if let Some(update) = inner.update.as_mut() {
                update.items.retain(|i| i.id != id);
            }
        }
        if wrap {
            self.end_update().await?;
        }
        Ok(())
    }

    pub async fn get_item(&self, id: &str) -> Result<Option<IndexItem>> {
        self.load_index_data().await?;
        let inner = self.inner.lock().await;
        Ok(inner
            .data
            .as_ref()
            .and_then(|d| d.items.iter().find(|i| i.id == id).cloned()))
    }

    pub async fn list_items(&self) -> Result<Vec<IndexItem>> {
        self.load_index_data().await?;
        let inner = self.inner.lock().await;
        Ok(inner.data.as_ref().map(|d| d.items.clone()).unwrap_or_default())
    }

    pub async fn list_items_by_metadata(&self, filter: Option<&Value>) -> Result<Vec<IndexItem>> {
        self.load_index_data().await?;
        let inner = self.inner.lock().await;
        Ok(inner
            .data
            .as_ref()
            .map(|d| {
                d.items
                    .iter()
                    .filter(|i| metadata::select(&i.metadata, filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    pub async fn get_index_stats(&self) -> Result<IndexStats> {
        self.load_index_data().await?;
        let inner = self.inner.lock().await;
        let data = inner.data.as_ref().expect("loaded above");
        Ok(IndexStats {
            version: data.version,
            metadata_config: data.metadata_config.clone(),
            items: data.items.len(),
        })
    }

    /// Exact top-`k` cosine search. Candidates are filtered against inline
    /// metadata first; scores use the precomputed-norm fast path; ties are
    /// broken by insertion order (stable sort).
    pub async fn query_items(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&Value>,
    ) -> Result<Vec<QueryResult>> {
        self.load_index_data().await?;
        let items = {
            let inner = self.inner.lock().await;
            inner.data.as_ref().map(|d| d.items.clone()).unwrap_or_default()
        };

        let candidates: Vec<&IndexItem> = items
            .iter()
            .filter(|i| metadata::select(&i.metadata, filter))
            .collect();

        let qn = item_selector::normalize(vector);
        let mut scored: Vec<(usize, f32)> = candidates
            .iter()
            .enumerate()
            .map(|(idx, item)| {
                let score =
                    item_selector::normalized_cosine_similarity(vector, qn, &item.vector, item.norm);
                (idx, score)
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        let mut out = Vec::with_capacity(scored.len());
        for (idx, score) in scored {
            let mut item = candidates[idx].clone();
            if let Some(file) = item.metadata_file.clone() {
                let path = self.folder_path.join(&file);
                match tokio::fs::read_to_string(&path).await {
                    Ok(text) => match serde_json::from_str::<Value>(&text) {
                        Ok(Value::Object(full)) => item.metadata = full,
                        _ => {
                            return Err(VectraError::DataCorruption(format!(
                                "sidecar metadata file {file} is not a JSON object"
                            )))
                        }
                    },
                    Err(_) => {
                        return Err(VectraError::NotFound(format!(
                            "sidecar metadata file {file} referenced by item {} is missing",
                            item.id
                        )))
                    }
                }
            }
            out.push(QueryResult { item, score });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(id: &str, vector: Vec<f32>, meta: Option<Value>) -> NewItem {
        NewItem {
            id: Some(id.to_string()),
            vector,
            metadata: meta.map(|v| v.as_object().unwrap().clone()),
        }
    }

    #[tokio::test]
    async fn create_insert_query_round_trips_the_spec_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let idx = VectorIndex::new(dir.path().join("idx"), None);
        idx.create_index(CreateIndexConfig::new(1)).await.unwrap();

        idx.insert_item(item("a", vec![1.0, 0.0, 0.0], Some(json!({"t": "x"}))))
            .await
            .unwrap();
        idx.insert_item(item("b", vec![0.0, 1.0, 0.0], Some(json!({"t": "y"}))))
            .await
            .unwrap();
        idx.insert_item(item("c", vec![1.0, 1.0, 0.0], Some(json!({"t": "x"}))))
            .await
            .unwrap();

        let results = idx.query_items(&[1.0, 0.0, 0.0], 2, None).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].item.id, "a");
        assert_eq!(results[1].item.id, "c");
        assert!((results[0].score - 1.0).abs() < 1e-4);
        assert!((results[1].score - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-3);

        let filtered = idx
            .query_items(&[1.0, 0.0, 0.0], 2, Some(&json!({"t": "y"})))
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].item.id, "b");
    }

    #[tokio::test]
    async fn allow_listed_metadata_spills_to_a_sidecar_and_query_restores_it() {
        let dir = tempfile::tempdir().unwrap();
        let idx = VectorIndex::new(dir.path().join("idx"), None);
        idx.create_index(CreateIndexConfig {
            version: 1,
            delete_if_exists: false,
            metadata_config: Some(MetadataConfig {
                indexed: Some(vec!["tag".to_string()]),
            }),
        })
        .await
        .unwrap();

        idx.insert_item(item(
            "x",
            vec![1.0, 0.0],
            Some(json!({"tag": "hot", "body": "secret"})),
        ))
        .await
        .unwrap();

        let listed = idx.list_items().await.unwrap();
        assert_eq!(listed[0].metadata.get("tag").unwrap(), "hot");
        assert!(listed[0].metadata.get("body").is_none(), "unindexed keys must not be stored inline");
        assert!(listed[0].metadata_file.is_some());

        let results = idx.query_items(&[1.0, 0.0], 1, None).await.unwrap();
        assert_eq!(results[0].item.metadata.get("body").unwrap(), "secret");

        // In-memory index must remain untouched by the restoration above.
        let listed_again = idx.list_items().await.unwrap();
        assert!(listed_again[0].metadata.get("body").is_none());

        let by_tag = idx
            .list_items_by_metadata(Some(&json!({"tag": "hot"})))
            .await
            .unwrap();
        assert_eq!(by_tag.len(), 1);
        let by_body = idx
            .list_items_by_metadata(Some(&json!({"body": "secret"})))
            .await
            .unwrap();
        assert!(by_body.is_empty(), "body is not indexed so it cannot be filtered on");
    }

    #[tokio::test]
    async fn cancel_update_leaves_disk_and_state_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let idx = VectorIndex::new(dir.path().join("idx"), None);
        idx.create_index(CreateIndexConfig::new(1)).await.unwrap();

        idx.begin_update().await.unwrap();
        idx.add_item_to_update(item("x", vec![1.0], None), true)
            .await
            .unwrap();
        idx.cancel_update().await.unwrap();

        let idx2 = VectorIndex::new(dir.path().join("idx"), None);
        let items = idx2.list_items().await.unwrap();
        assert!(items.is_empty(), "cancelled transaction must not be visible after reload");
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let idx = VectorIndex::new(dir.path().join("idx"), None);
        idx.create_index(CreateIndexConfig::new(1)).await.unwrap();

        let i = item("x", vec![1.0, 2.0], Some(json!({"t": 1})));
        idx.upsert_item(i.clone()).await.unwrap();
        idx.upsert_item(i).await.unwrap();

        let items = idx.list_items().await.unwrap();
        assert_eq!(items.len(), 1, "upserting the same id twice must not duplicate the item");
    }

    #[tokio::test]
    async fn empty_index_queries_return_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let idx = VectorIndex::new(dir.path().join("idx"), None);
        idx.create_index(CreateIndexConfig::new(1)).await.unwrap();
        let results = idx.query_items(&[1.0, 0.0], 5, None).await.unwrap();
        assert!(results.is_empty());
        let stats = idx.get_index_stats().await.unwrap();
        assert_eq!(stats.items, 0);
    }

    #[tokio::test]
    async fn reload_preserves_norm_within_tolerance() {
        let dir = tempfile::tempdir().unwrap();
        let idx = VectorIndex::new(dir.path().join("idx"), None);
        idx.create_index(CreateIndexConfig::new(1)).await.unwrap();
        idx.insert_item(item("a", vec![3.0, 4.0], None)).await.unwrap();

        let idx2 = VectorIndex::new(dir.path().join("idx"), None);
        let items = idx2.list_items().await.unwrap();
        assert!((items[0].norm - 5.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn callers_can_match_on_the_structured_error_kind() {
        let dir = tempfile::tempdir().unwrap();
        let idx = VectorIndex::new(dir.path().join("idx"), None);
        idx.create_index(CreateIndexConfig::new(1)).await.unwrap();

        let err = idx
            .create_index(CreateIndexConfig::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, VectraError::PreconditionViolation(_)));

        let err = idx.insert_item(NewItem::default()).await.unwrap_err();
        assert!(matches!(err, VectraError::PreconditionViolation(_)), "missing vector must be a precondition violation, not an io/json error");

        let missing = VectorIndex::new(dir.path().join("does-not-exist"), None);
        let err = missing.query_items(&[1.0], 1, None).await.unwrap_err();
        assert!(matches!(err, VectraError::NotFound(_)));
    }
}
