use super::{check_id, SearchQuery, Sink, SinkResult};
use crate::error::SinkError;
use crate::model::{DocId, Kind};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;

/// Elasticsearch over its REST API. Mapping types are gone from modern clusters, so the
/// kind is only used for logging.
pub struct ElasticSink {
    client: Client,
    base_url: String,
}

impl ElasticSink {
    pub fn new(base_url: impl Into<String>) -> SinkResult<Self> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

async fn check(resp: Response) -> SinkResult<Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    Err(SinkError::Backend(format!("{status}: {body}")))
}

fn search_body(query: &SearchQuery) -> Value {
    let filters: Vec<Value> = query.terms.iter().map(|(field, value)| json!({ "term": { field: value } })).collect();
    json!({
        "size": query.size,
        "query": { "bool": { "filter": filters } }
    })
}

#[async_trait]
impl Sink for ElasticSink {
    async fn create_index(&self, index: &str, kind: Kind) -> SinkResult<()> {
        tracing::debug!(index, %kind, "creating index");
        let resp = self.client.put(self.url(index)).send().await?;
        check(resp).await?;
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> SinkResult<()> {
        let resp = self.client.delete(self.url(index)).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check(resp).await?;
        Ok(())
    }

    async fn put_document(&self, index: &str, _kind: Kind, id: DocId, doc: &Value) -> SinkResult<()> {
        check_id(id)?;
        let resp = self.client.put(self.url(&format!("{index}/_doc/{id}"))).json(doc).send().await?;
        check(resp).await?;
        Ok(())
    }

    async fn get_document(&self, index: &str, _kind: Kind, id: DocId) -> SinkResult<Option<Value>> {
        let resp = self.client.get(self.url(&format!("{index}/_doc/{id}"))).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: Value = check(resp).await?.json().await?;
        if body["found"].as_bool() != Some(true) {
            return Ok(None);
        }
        Ok(body.get("_source").cloned())
    }

    async fn search(&self, index: &str, query: &SearchQuery) -> SinkResult<Vec<Value>> {
        let resp = self.client.post(self.url(&format!("{index}/_search"))).json(&search_body(query)).send().await?;
        let body: Value = check(resp).await?.json().await?;
        let hits = body["hits"]["hits"]
            .as_array()
            .map(|hits| hits.iter().filter_map(|h| h.get("_source").cloned()).collect())
            .unwrap_or_default();
        Ok(hits)
    }

    async fn refresh_index(&self, index: &str) -> SinkResult<()> {
        let resp = self.client.post(self.url(&format!("{index}/_refresh"))).send().await?;
        check(resp).await?;
        Ok(())
    }

    async fn count(&self, index: &str) -> SinkResult<u64> {
        let resp = self.client.get(self.url(&format!("{index}/_count"))).send().await?;
        let body: Value = check(resp).await?.json().await?;
        body["count"].as_u64().ok_or_else(|| SinkError::Backend(format!("no count in response for {index}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_body_uses_term_filters() {
        let body = search_body(&SearchQuery::answers_of(42, 1000));
        assert_eq!(body["size"], json!(1000));
        assert_eq!(body["query"]["bool"]["filter"][0], json!({"term": {"PostTypeId": 2}}));
        assert_eq!(body["query"]["bool"]["filter"][1], json!({"term": {"ParentId": 42}}));
    }

    #[test]
    fn base_url_is_normalized() {
        let sink = ElasticSink::new("http://localhost:9200/").unwrap();
        assert_eq!(sink.url("so_post"), "http://localhost:9200/so_post");
    }
}
