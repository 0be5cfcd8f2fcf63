// Elasticsearch-backed search index and index manager.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Method, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use tracing::{debug, info};
use url::Url;

use super::{
    Hit, IndexDocument, IndexError, IndexManager, SearchBody, SearchContext, SearchIndex,
    SearchResults, GENERIC_RESOURCES_KIND, GENERIC_RESOURCE_VERSIONS_KIND,
};

const DISTINCT_AGGREGATION: &str = "distinct";
/// Highest precision threshold Elasticsearch accepts for cardinality aggregations.
const DISTINCT_PRECISION_THRESHOLD: u64 = 40_000;
const INDEX_VERSION: &str = "v1";

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Shared HTTP plumbing for the search index and the index manager.
#[derive(Debug, Clone)]
pub struct ElasticClient {
    http: reqwest::Client,
    base_url: Url,
    credentials: Option<Credentials>,
}

impl ElasticClient {
    pub fn new(
        base_url: &str,
        credentials: Option<Credentials>,
        timeout: Duration,
    ) -> Result<Self, IndexError> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url, credentials })
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, IndexError> {
        let builder = self.http.request(method, self.base_url.join(path)?);
        Ok(match &self.credentials {
            Some(credentials) => {
                builder.basic_auth(&credentials.username, Some(&credentials.password))
            }
            None => builder,
        })
    }
}

async fn send<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, IndexError> {
    let response = builder.send().await?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(IndexError::Status { status: status.as_u16(), body });
    }

    Ok(serde_json::from_str(&body)?)
}

#[derive(Debug, Clone)]
pub struct ElasticSearchIndex {
    client: ElasticClient,
}

impl ElasticSearchIndex {
    pub fn new(client: ElasticClient) -> Self {
        Self { client }
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    pit_id: Option<String>,
    hits: ResponseHits,
    #[serde(default)]
    aggregations: Option<ResponseAggregations>,
}

#[derive(Deserialize)]
struct ResponseHits {
    #[serde(default)]
    total: ResponseTotal,
    #[serde(default)]
    hits: Vec<ResponseHit>,
}

#[derive(Default, Deserialize)]
struct ResponseTotal {
    value: u64,
}

#[derive(Deserialize)]
struct ResponseHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_source", default)]
    source: Value,
}

#[derive(Deserialize)]
struct ResponseAggregations {
    distinct: CardinalityValue,
}

#[derive(Deserialize)]
struct CardinalityValue {
    value: u64,
}

#[derive(Deserialize)]
struct PitResponse {
    id: String,
}

#[derive(Deserialize)]
struct BulkResponse {
    errors: bool,
    #[serde(default)]
    items: Vec<Value>,
}

fn search_path(index: &str, body: &SearchBody) -> String {
    if body.pit.is_some() {
        "_search".to_string()
    } else {
        format!("{index}/_search")
    }
}

fn search_payload(body: &SearchBody) -> Result<Value, IndexError> {
    let mut payload = serde_json::to_value(body)?;
    payload["track_total_hits"] = Value::Bool(true);
    if let Some(collapse) = &body.collapse {
        payload["aggs"] = json!({
            DISTINCT_AGGREGATION: {
                "cardinality": {
                    "field": collapse.field,
                    "precision_threshold": DISTINCT_PRECISION_THRESHOLD
                }
            }
        });
    }
    Ok(payload)
}

fn into_results(body: &SearchBody, response: SearchResponse) -> SearchResults {
    // Cardinality aggregations are estimates; exact only below the precision threshold.
    let (total, approximate_total) = match (&body.collapse, response.aggregations) {
        (Some(_), Some(aggregations)) => (aggregations.distinct.value, true),
        _ => (response.hits.total.value, false),
    };

    SearchResults {
        hits: response
            .hits
            .hits
            .into_iter()
            .map(|hit| Hit { id: hit.id, source: hit.source })
            .collect(),
        total,
        approximate_total,
        context_id: response.pit_id,
    }
}

fn bulk_payload(index: &str, documents: &[IndexDocument]) -> Result<String, IndexError> {
    let mut payload = String::new();
    for document in documents {
        payload.push_str(&serde_json::to_string(
            &json!({ "create": { "_index": index, "_id": document.id } }),
        )?);
        payload.push('\n');
        payload.push_str(&serde_json::to_string(&document.source)?);
        payload.push('\n');
    }
    Ok(payload)
}

/// Per-item failures other than "document already exists".
fn bulk_failures(response: &BulkResponse) -> Vec<String> {
    if !response.errors {
        return Vec::new();
    }

    response
        .items
        .iter()
        .filter_map(|item| item.get("create"))
        .filter(|result| {
            let status = result.get("status").and_then(Value::as_u64).unwrap_or(0);
            status >= 300 && status != 409
        })
        .map(|result| {
            let id = result.get("_id").and_then(Value::as_str).unwrap_or("?");
            let reason = result
                .pointer("/error/reason")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            format!("{id}: {reason}")
        })
        .collect()
}

#[async_trait]
impl SearchIndex for ElasticSearchIndex {
    async fn search(&self, index: &str, body: &SearchBody) -> Result<SearchResults, IndexError> {
        let payload = search_payload(body)?;
        let request = self.client.request(Method::POST, &search_path(index, body))?.json(&payload);
        let response: SearchResponse = send(request).await?;
        Ok(into_results(body, response))
    }

    async fn open_search_context(
        &self,
        index: &str,
        keep_alive: &str,
    ) -> Result<SearchContext, IndexError> {
        let request = self
            .client
            .request(Method::POST, &format!("{index}/_pit"))?
            .query(&[("keep_alive", keep_alive)]);
        let response: PitResponse = send(request).await?;
        Ok(SearchContext { id: response.id })
    }

    async fn bulk_create(
        &self,
        index: &str,
        documents: Vec<IndexDocument>,
    ) -> Result<(), IndexError> {
        if documents.is_empty() {
            return Ok(());
        }

        let request = self
            .client
            .request(Method::POST, "_bulk")?
            .query(&[("refresh", "wait_for")])
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(bulk_payload(index, &documents)?);
        let response: BulkResponse = send(request).await?;

        let failures = bulk_failures(&response);
        if !failures.is_empty() {
            return Err(IndexError::Bulk(failures.join("; ")));
        }

        debug!(index, documents = documents.len(), "bulk create completed");
        Ok(())
    }
}

/// Provisions versioned indices behind stable aliases: `{prefix}-{kind}-v1` / `{prefix}-{kind}`.
#[derive(Debug, Clone)]
pub struct ElasticIndexManager {
    client: ElasticClient,
    prefix: String,
}

impl ElasticIndexManager {
    pub fn new(client: ElasticClient, prefix: impl Into<String>) -> Self {
        Self { client, prefix: prefix.into() }
    }
}

pub fn mapping_for(kind: &str) -> Result<Value, IndexError> {
    match kind {
        GENERIC_RESOURCES_KIND => Ok(json!({
            "dynamic": "strict",
            "properties": {
                "id": { "type": "keyword" },
                "name": { "type": "keyword" },
                "type": { "type": "keyword" }
            }
        })),
        GENERIC_RESOURCE_VERSIONS_KIND => Ok(json!({
            "dynamic": "strict",
            "properties": {
                "resourceId": { "type": "keyword" },
                "version": { "type": "keyword" },
                "created": { "type": "date" }
            }
        })),
        _ => Err(IndexError::UnknownKind(kind.to_string())),
    }
}

fn is_already_exists(error: &IndexError) -> bool {
    matches!(
        error,
        IndexError::Status { status: 400, body } if body.contains("resource_already_exists_exception")
    )
}

#[async_trait]
impl IndexManager for ElasticIndexManager {
    fn index_name(&self, kind: &str) -> String {
        format!("{}-{kind}-{INDEX_VERSION}", self.prefix)
    }

    fn alias_name(&self, kind: &str) -> String {
        format!("{}-{kind}", self.prefix)
    }

    async fn ensure_index(&self, index: &str, alias: &str, kind: &str) -> Result<(), IndexError> {
        let mappings = mapping_for(kind)?;
        let create = self
            .client
            .request(Method::PUT, index)?
            .json(&json!({ "mappings": mappings, "aliases": { alias: {} } }));

        match send::<Value>(create).await {
            Ok(_) => info!(index, alias, "created index"),
            Err(error) if is_already_exists(&error) => debug!(index, "index already exists"),
            Err(error) => return Err(error),
        }

        let alias_request = self.client.request(Method::PUT, &format!("{index}/_alias/{alias}"))?;
        send::<Value>(alias_request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{
        extract::{Path, State},
        routing::{post, put},
        Json, Router,
    };
    use serde_json::json;
    use tokio::net::TcpListener;

    use super::*;
    use crate::search::{Collapse, PointInTime, Sort};

    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("test server");
        });
        format!("http://{addr}")
    }

    fn client(base_url: &str) -> ElasticClient {
        ElasticClient::new(base_url, None, Duration::from_secs(5)).expect("client")
    }

    #[test]
    fn context_bound_searches_omit_the_index() {
        let mut body = SearchBody::default();
        assert_eq!(search_path("occurrences", &body), "occurrences/_search");

        body.pit = Some(PointInTime { id: "p".to_string(), keep_alive: "5m".to_string() });
        assert_eq!(search_path("occurrences", &body), "_search");
    }

    #[test]
    fn collapsed_searches_request_distinct_totals() {
        let body = SearchBody {
            sort: vec![Sort::asc("resource.uri")],
            collapse: Some(Collapse { field: "resource.uri".to_string() }),
            ..Default::default()
        };

        let payload = search_payload(&body).unwrap();
        assert_eq!(payload["track_total_hits"], true);
        assert_eq!(payload["aggs"]["distinct"]["cardinality"]["field"], "resource.uri");
        assert_eq!(payload["aggs"]["distinct"]["cardinality"]["precision_threshold"], 40_000);

        let response: SearchResponse = serde_json::from_value(json!({
            "pit_id": "refreshed",
            "hits": { "total": { "value": 12 }, "hits": [] },
            "aggregations": { "distinct": { "value": 4 } }
        }))
        .unwrap();
        let results = into_results(&body, response);
        assert_eq!(results.total, 4);
        assert!(results.approximate_total);
        assert_eq!(results.context_id.as_deref(), Some("refreshed"));
    }

    #[test]
    fn plain_searches_report_exact_totals() {
        let body = SearchBody::default();
        let payload = search_payload(&body).unwrap();
        assert!(payload.get("aggs").is_none());

        let response: SearchResponse = serde_json::from_value(json!({
            "hits": { "total": { "value": 12 }, "hits": [{ "_id": "a", "_source": { "n": 1 } }] },
            "aggregations": { "distinct": { "value": 4 } }
        }))
        .unwrap();
        let results = into_results(&body, response);
        assert_eq!(results.total, 12);
        assert!(!results.approximate_total);
        assert_eq!(results.hits, vec![Hit { id: "a".to_string(), source: json!({ "n": 1 }) }]);
    }

    #[test]
    fn bulk_conflicts_are_not_failures() {
        let response: BulkResponse = serde_json::from_value(json!({
            "errors": true,
            "items": [
                { "create": { "_id": "a", "status": 201 } },
                { "create": { "_id": "b", "status": 409, "error": { "reason": "exists" } } },
                { "create": { "_id": "c", "status": 400, "error": { "reason": "mapping" } } }
            ]
        }))
        .unwrap();

        assert_eq!(bulk_failures(&response), vec!["c: mapping".to_string()]);
    }

    #[test]
    fn bulk_payload_is_newline_delimited() {
        let payload = bulk_payload(
            "resources",
            &[IndexDocument { id: "a".to_string(), source: json!({ "name": "x" }) }],
        )
        .unwrap();
        assert!(payload.ends_with('\n'));
        let lines: Vec<Value> =
            payload.lines().map(|line| serde_json::from_str(line).unwrap()).collect();
        assert_eq!(
            lines,
            vec![json!({ "create": { "_index": "resources", "_id": "a" } }), json!({ "name": "x" })]
        );
    }

    #[test]
    fn unknown_kinds_have_no_mapping() {
        assert!(matches!(mapping_for("policies"), Err(IndexError::UnknownKind(_))));
    }

    #[tokio::test]
    async fn search_decodes_hits_and_totals() {
        let router = Router::new().route(
            "/{index}/_search",
            post(|Path(index): Path<String>, Json(body): Json<Value>| async move {
                assert_eq!(index, "occurrences");
                assert_eq!(body["track_total_hits"], true);
                Json(json!({
                    "hits": {
                        "total": { "value": 1 },
                        "hits": [{ "_id": "1", "_source": { "kind": "BUILD" } }]
                    }
                }))
            }),
        );
        let index = ElasticSearchIndex::new(client(&serve(router).await));

        let results = index.search("occurrences", &SearchBody::default()).await.unwrap();
        assert_eq!(results.total, 1);
        assert_eq!(results.hits[0].source["kind"], "BUILD");
        assert!(results.context_id.is_none());
    }

    #[tokio::test]
    async fn error_statuses_keep_the_raw_body() {
        let router = Router::new().route(
            "/_search",
            post(|| async {
                (
                    axum::http::StatusCode::NOT_FOUND,
                    "{\"error\":\"search_context_missing_exception\"}",
                )
            }),
        );
        let index = ElasticSearchIndex::new(client(&serve(router).await));
        let body = SearchBody {
            pit: Some(PointInTime { id: "gone".to_string(), keep_alive: "5m".to_string() }),
            ..Default::default()
        };

        match index.search("ignored", &body).await {
            Err(IndexError::Status { status, body }) => {
                assert_eq!(status, 404);
                assert!(body.contains("search_context_missing_exception"));
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ensure_index_tolerates_existing_indices() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let router = Router::new()
            .route(
                "/{index}",
                put(|State(calls): State<Arc<Mutex<Vec<String>>>>, Path(index): Path<String>| async move {
                    calls.lock().unwrap().push(format!("create {index}"));
                    (
                        axum::http::StatusCode::BAD_REQUEST,
                        "{\"error\":{\"type\":\"resource_already_exists_exception\"}}",
                    )
                }),
            )
            .route(
                "/{index}/_alias/{alias}",
                put(
                    |State(calls): State<Arc<Mutex<Vec<String>>>>,
                     Path((index, alias)): Path<(String, String)>| async move {
                        calls.lock().unwrap().push(format!("alias {index} {alias}"));
                        Json(json!({ "acknowledged": true }))
                    },
                ),
            )
            .with_state(Arc::clone(&calls));
        let manager = ElasticIndexManager::new(client(&serve(router).await), "provenance");

        let index = manager.index_name(GENERIC_RESOURCES_KIND);
        let alias = manager.alias_name(GENERIC_RESOURCES_KIND);
        assert_eq!(index, "provenance-generic-resources-v1");
        assert_eq!(alias, "provenance-generic-resources");

        manager.ensure_index(&index, &alias, GENERIC_RESOURCES_KIND).await.unwrap();
        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                "create provenance-generic-resources-v1".to_string(),
                "alias provenance-generic-resources-v1 provenance-generic-resources".to_string(),
            ]
        );
    }
}
