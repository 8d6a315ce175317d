use super::{check_id, SearchQuery, Sink, SinkResult};
use crate::error::SinkError;
use crate::model::{DocId, Kind};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

/// Sink backed by an embedded sled database.
///
/// Each index is a tree of JSON documents keyed by big-endian id, plus a
/// `<index>__by_parent` tree keyed by `ParentId ++ Id` so answer lookups are prefix scans.
/// Scans and flushes run on the blocking pool.
pub struct SledSink {
    db: sled::Db,
    open: RwLock<HashMap<String, Trees>>,
}

#[derive(Clone)]
struct Trees {
    docs: sled::Tree,
    by_parent: sled::Tree,
}

fn key(id: DocId) -> [u8; 8] {
    id.to_be_bytes()
}

fn parent_key(parent: DocId, id: DocId) -> [u8; 16] {
    let mut k = [0u8; 16];
    k[..8].copy_from_slice(&key(parent));
    k[8..].copy_from_slice(&key(id));
    k
}

fn parent_tree_name(index: &str) -> String {
    format!("{index}__by_parent")
}

fn join_error(e: tokio::task::JoinError) -> SinkError {
    SinkError::Backend(e.to_string())
}

impl SledSink {
    pub fn open<P: AsRef<Path>>(path: P) -> SinkResult<Self> {
        Ok(Self { db: sled::open(path)?, open: RwLock::new(HashMap::new()) })
    }

    fn open_trees(&self, index: &str) -> SinkResult<Trees> {
        let trees = Trees { docs: self.db.open_tree(index)?, by_parent: self.db.open_tree(parent_tree_name(index))? };
        self.open.write().insert(index.to_string(), trees.clone());
        Ok(trees)
    }

    /// Handles for an existing index. Indices created by an earlier process are found
    /// through the database's tree names and cached on first use.
    fn trees(&self, index: &str) -> SinkResult<Trees> {
        if let Some(trees) = self.open.read().get(index) {
            return Ok(trees.clone());
        }
        let exists = self.db.tree_names().iter().any(|name| &name[..] == index.as_bytes());
        if !exists {
            return Err(SinkError::MissingIndex(index.to_string()));
        }
        self.open_trees(index)
    }
}

fn scan(trees: &Trees, query: &SearchQuery) -> SinkResult<Vec<Value>> {
    let mut hits = Vec::new();
    let parent = query.terms.iter().find(|(field, _)| field == "ParentId").and_then(|(_, v)| v.as_i64());
    if let Some(parent) = parent {
        for entry in trees.by_parent.scan_prefix(key(parent)) {
            if hits.len() >= query.size {
                break;
            }
            let (k, _) = entry?;
            let Some(bytes) = trees.docs.get(&k[8..])? else { continue };
            let doc: Value = serde_json::from_slice(&bytes)?;
            // the doc may have been rewritten under another parent
            if query.matches(&doc) {
                hits.push(doc);
            }
        }
        return Ok(hits);
    }
    for entry in trees.docs.iter() {
        if hits.len() >= query.size {
            break;
        }
        let (_, bytes) = entry?;
        let doc: Value = serde_json::from_slice(&bytes)?;
        if query.matches(&doc) {
            hits.push(doc);
        }
    }
    Ok(hits)
}

#[async_trait]
impl Sink for SledSink {
    async fn create_index(&self, index: &str, _kind: Kind) -> SinkResult<()> {
        self.open_trees(index)?;
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> SinkResult<()> {
        self.open.write().remove(index);
        self.db.drop_tree(index)?;
        self.db.drop_tree(parent_tree_name(index))?;
        Ok(())
    }

    async fn put_document(&self, index: &str, _kind: Kind, id: DocId, doc: &Value) -> SinkResult<()> {
        check_id(id)?;
        let trees = self.trees(index)?;
        let bytes = serde_json::to_vec(doc)?;
        trees.docs.insert(key(id), bytes)?;
        if let Some(parent) = doc.get("ParentId").and_then(Value::as_i64) {
            trees.by_parent.insert(parent_key(parent, id), Vec::new())?;
        }
        Ok(())
    }

    async fn get_document(&self, index: &str, _kind: Kind, id: DocId) -> SinkResult<Option<Value>> {
        match self.trees(index)?.docs.get(key(id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn search(&self, index: &str, query: &SearchQuery) -> SinkResult<Vec<Value>> {
        let trees = self.trees(index)?;
        let query = query.clone();
        tokio::task::spawn_blocking(move || scan(&trees, &query)).await.map_err(join_error)?
    }

    async fn refresh_index(&self, index: &str) -> SinkResult<()> {
        let trees = self.trees(index)?;
        tokio::task::spawn_blocking(move || trees.docs.flush().and_then(|_| trees.by_parent.flush()))
            .await
            .map_err(join_error)??;
        Ok(())
    }

    async fn count(&self, index: &str) -> SinkResult<u64> {
        Ok(self.trees(index)?.docs.len() as u64)
    }
}
