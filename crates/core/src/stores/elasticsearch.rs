use crate::endpoint::parse_base_url;
use crate::models::HIT_FIELDS;
use crate::traits::VectorIndex;
use crate::{IndexedRecord, RetrievalHit, SearchError};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

const BACKEND: &str = "elasticsearch";

/// Cosine similarity shifted into `[0, 2]` so scores stay non-negative.
pub const SCORE_SCRIPT: &str = "cosineSimilarity(params.query_vector, 'embedding') + 1.0";

pub struct ElasticsearchStore {
    client: Client,
    endpoint: Url,
    index_name: String,
    credentials: Option<(String, String)>,
}

impl ElasticsearchStore {
    pub fn new(
        endpoint: &str,
        index_name: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SearchError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            endpoint: parse_base_url(endpoint)?,
            index_name: index_name.into(),
            credentials: None,
        })
    }

    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    fn index_url(&self, suffix: &str) -> Result<Url, SearchError> {
        Ok(self.endpoint.join(&format!("{}{}", self.index_name, suffix))?)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some((username, password)) => request.basic_auth(username, Some(password)),
            None => request,
        }
    }

    async fn create_index(&self, dimensions: usize) -> Result<(), SearchError> {
        let response = self
            .authorized(self.client.put(self.index_url("")?))
            .json(&index_mapping(dimensions))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            info!(index = %self.index_name, dimensions, "created index");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::BAD_REQUEST && body.contains("resource_already_exists_exception") {
            return Ok(());
        }

        Err(SearchError::Request(format!(
            "index setup failed with {status}: {body}"
        )))
    }
}

#[async_trait]
impl VectorIndex for ElasticsearchStore {
    async fn ensure_index(&self, dimensions: usize) -> Result<(), SearchError> {
        // GET rather than HEAD: some 8.x releases answer HEAD on an index with 400.
        let response = self
            .authorized(self.client.get(self.index_url("")?))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                info!(index = %self.index_name, "index already exists, skipping create");
                Ok(())
            }
            StatusCode::NOT_FOUND => self.create_index(dimensions).await,
            status => Err(SearchError::BackendResponse {
                backend: BACKEND.to_string(),
                details: status.to_string(),
            }),
        }
    }

    async fn bulk_write(&self, records: &[IndexedRecord]) -> Result<(), SearchError> {
        if records.is_empty() {
            return Ok(());
        }

        let payload = bulk_payload(&self.index_name, records)?;
        let response = self
            .authorized(self.client.post(self.endpoint.join("_bulk")?))
            .header("Content-Type", "application/x-ndjson")
            .body(payload)
            .send()
            .await?;

        let body = success_json(response).await?;
        if let Some(reason) = first_bulk_failure(&body) {
            return Err(SearchError::BackendResponse {
                backend: BACKEND.to_string(),
                details: reason,
            });
        }

        debug!(index = %self.index_name, records = records.len(), "bulk write accepted");
        Ok(())
    }

    async fn refresh(&self) -> Result<(), SearchError> {
        let response = self
            .authorized(self.client.post(self.index_url("/_refresh")?))
            .send()
            .await?;
        success_json(response).await?;
        Ok(())
    }

    async fn similarity_search(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievalHit>, SearchError> {
        let response = self
            .authorized(self.client.post(self.index_url("/_search")?))
            .json(&similarity_query(query_vector, top_k))
            .send()
            .await?;

        let body = success_json(response).await?;
        parse_hits(&body)
    }
}

async fn success_json(response: Response) -> Result<Value, SearchError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SearchError::BackendResponse {
            backend: BACKEND.to_string(),
            details: format!("{status}: {body}"),
        });
    }
    Ok(response.json().await?)
}

pub fn index_mapping(dimensions: usize) -> Value {
    json!({
        "mappings": {
            "properties": {
                "record_id": {"type": "keyword"},
                "document_id": {"type": "keyword"},
                "title": {"type": "text"},
                "url": {"type": "keyword"},
                "text": {"type": "text"},
                "chunk_id": {"type": "integer"},
                "summary": {"type": "text"},
                "key_points": {"type": "text"},
                "locations": {"type": "text"},
                "people": {"type": "text"},
                "date": {"type": "keyword"},
                "source": {"type": "keyword"},
                "embedding": {
                    "type": "dense_vector",
                    "dims": dimensions
                }
            }
        }
    })
}

/// NDJSON body for `_bulk`; each record is keyed by its `record_id` so a re-run overwrites.
pub fn bulk_payload(index_name: &str, records: &[IndexedRecord]) -> Result<String, SearchError> {
    let mut lines = Vec::with_capacity(records.len() * 2);
    for record in records {
        lines.push(serde_json::to_string(&json!({
            "index": {
                "_index": index_name,
                "_id": record.record_id,
            }
        }))?);
        lines.push(serde_json::to_string(record)?);
    }
    Ok(lines.join("\n") + "\n")
}

pub fn similarity_query(query_vector: &[f32], top_k: usize) -> Value {
    json!({
        "size": top_k,
        "_source": HIT_FIELDS,
        "query": {
            "script_score": {
                "query": {"match_all": {}},
                "script": {
                    "source": SCORE_SCRIPT,
                    "params": {"query_vector": query_vector}
                }
            }
        }
    })
}

pub fn parse_hits(body: &Value) -> Result<Vec<RetrievalHit>, SearchError> {
    let hits = body
        .pointer("/hits/hits")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut result = Vec::with_capacity(hits.len());
    for raw in hits {
        let source = raw.get("_source").cloned().unwrap_or_else(|| json!({}));
        let mut hit: RetrievalHit = serde_json::from_value(source)?;
        hit.score = raw.get("_score").and_then(Value::as_f64).unwrap_or(0.0);
        if hit.record_id.is_empty() {
            hit.record_id = raw
                .get("_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
        }
        result.push(hit);
    }
    Ok(result)
}

fn first_bulk_failure(body: &Value) -> Option<String> {
    if !body.get("errors").and_then(Value::as_bool).unwrap_or(false) {
        return None;
    }

    let items = body.get("items").and_then(Value::as_array)?;
    let failed = items
        .iter()
        .filter_map(|item| item.as_object()?.values().next())
        .filter(|action| action.get("error").is_some())
        .collect::<Vec<_>>();

    let reason = failed
        .first()
        .and_then(|action| action.pointer("/error/reason"))
        .and_then(Value::as_str)
        .unwrap_or("unknown error");

    Some(format!("{} of {} bulk items failed: {reason}", failed.len(), items.len()))
}
