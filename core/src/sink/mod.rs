//! Document sinks: the search index the pipeline writes into.

mod elastic;
mod embedded;
mod memory;
pub(crate) mod writer;

pub use elastic::ElasticSink;
pub use embedded::SledSink;
pub use memory::MemorySink;
pub use writer::{BoundedWriter, WriteFailure};

use crate::error::SinkError;
use crate::model::{DocId, Kind};
use async_trait::async_trait;
use serde_json::Value;

pub type SinkResult<T> = std::result::Result<T, SinkError>;

/// Conjunction of exact field matches with a bounded page size.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub terms: Vec<(String, Value)>,
    pub size: usize,
}

impl SearchQuery {
    pub fn new(size: usize) -> Self {
        Self { terms: Vec::new(), size }
    }

    pub fn term(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.terms.push((field.into(), value.into()));
        self
    }

    /// Stored answers whose `ParentId` is `question_id`.
    pub fn answers_of(question_id: DocId, size: usize) -> Self {
        Self::new(size).term("PostTypeId", 2).term("ParentId", question_id)
    }

    pub fn matches(&self, doc: &Value) -> bool {
        self.terms.iter().all(|(field, value)| doc.get(field) == Some(value))
    }
}

#[async_trait]
pub trait Sink: Send + Sync {
    async fn create_index(&self, index: &str, kind: Kind) -> SinkResult<()>;

    /// Deleting an index that does not exist is not an error.
    async fn delete_index(&self, index: &str) -> SinkResult<()>;

    async fn put_document(&self, index: &str, kind: Kind, id: DocId, doc: &Value) -> SinkResult<()>;

    async fn get_document(&self, index: &str, kind: Kind, id: DocId) -> SinkResult<Option<Value>>;

    async fn search(&self, index: &str, query: &SearchQuery) -> SinkResult<Vec<Value>>;

    /// Make buffered writes visible to reads.
    async fn refresh_index(&self, index: &str) -> SinkResult<()>;

    async fn count(&self, index: &str) -> SinkResult<u64>;

    /// Drop and create `index`.
    async fn recreate_index(&self, index: &str, kind: Kind) -> SinkResult<()> {
        self.delete_index(index).await?;
        self.create_index(index, kind).await
    }
}

pub(crate) fn check_id(id: DocId) -> SinkResult<()> {
    if id < 0 {
        return Err(SinkError::InvalidId(id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn answers_query_matches_numeric_fields() {
        let q = SearchQuery::answers_of(7, 1000);
        assert!(q.matches(&json!({"Id": 8, "PostTypeId": 2, "ParentId": 7})));
        assert!(!q.matches(&json!({"Id": 7, "PostTypeId": 1})));
        assert!(!q.matches(&json!({"Id": 9, "PostTypeId": 2, "ParentId": 6})));
    }
}
