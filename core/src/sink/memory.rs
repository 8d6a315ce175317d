use super::{check_id, SearchQuery, Sink, SinkResult};
use crate::error::SinkError;
use crate::model::{DocId, Kind};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Process-local sink. Writes are visible immediately.
#[derive(Default)]
pub struct MemorySink {
    indices: RwLock<HashMap<String, BTreeMap<DocId, Value>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.indices.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Ids stored in `index`, ascending.
    pub fn ids(&self, index: &str) -> Vec<DocId> {
        self.indices.read().get(index).map(|docs| docs.keys().copied().collect()).unwrap_or_default()
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn create_index(&self, index: &str, _kind: Kind) -> SinkResult<()> {
        self.indices.write().entry(index.to_string()).or_default();
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> SinkResult<()> {
        self.indices.write().remove(index);
        Ok(())
    }

    async fn put_document(&self, index: &str, _kind: Kind, id: DocId, doc: &Value) -> SinkResult<()> {
        check_id(id)?;
        let mut indices = self.indices.write();
        let docs = indices.get_mut(index).ok_or_else(|| SinkError::MissingIndex(index.to_string()))?;
        docs.insert(id, doc.clone());
        Ok(())
    }

    async fn get_document(&self, index: &str, _kind: Kind, id: DocId) -> SinkResult<Option<Value>> {
        let indices = self.indices.read();
        let docs = indices.get(index).ok_or_else(|| SinkError::MissingIndex(index.to_string()))?;
        Ok(docs.get(&id).cloned())
    }

    async fn search(&self, index: &str, query: &SearchQuery) -> SinkResult<Vec<Value>> {
        let indices = self.indices.read();
        let docs = indices.get(index).ok_or_else(|| SinkError::MissingIndex(index.to_string()))?;
        Ok(docs.values().filter(|d| query.matches(d)).take(query.size).cloned().collect())
    }

    async fn refresh_index(&self, _index: &str) -> SinkResult<()> {
        Ok(())
    }

    async fn count(&self, index: &str) -> SinkResult<u64> {
        let indices = self.indices.read();
        let docs = indices.get(index).ok_or_else(|| SinkError::MissingIndex(index.to_string()))?;
        Ok(docs.len() as u64)
    }
}
