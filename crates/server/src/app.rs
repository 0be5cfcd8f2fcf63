// Router assembly and cross-cutting middleware.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tower_http::timeout::TimeoutLayer;
use tracing::{error, info};

use crate::api::{self, ApiState};
use crate::config::ServerConfig;
use crate::error::{
    attach_request_id_header, request_id_from_headers_or_generate, with_request_id_scope,
    ApiError, ErrorCode,
};
use crate::filter::{CelFilterCompiler, FilterCompiler};
use crate::pagination::PaginationEngine;
use crate::registration::CollectorRegistry;
use crate::resources::IndexedResourceManager;
use crate::search::elastic::{Credentials, ElasticClient};
use crate::search::{ElasticIndexManager, ElasticSearchIndex, IndexManager, SearchIndex};
use crate::store::GrafeasClient;

pub const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

/// Concrete collaborators shared by bootstrap and the API.
pub struct Collaborators {
    pub index: Arc<dyn SearchIndex>,
    pub indices: Arc<dyn IndexManager>,
    pub grafeas: Arc<GrafeasClient>,
    pub filter: Arc<dyn FilterCompiler>,
}

impl Collaborators {
    pub fn from_config(config: &ServerConfig) -> anyhow::Result<Self> {
        let credentials = config.elasticsearch_auth.as_ref().map(|auth| Credentials {
            username: auth.username.clone(),
            password: auth.password.clone(),
        });
        let elastic =
            ElasticClient::new(&config.elasticsearch_url, credentials, config.upstream_timeout)
                .context("invalid search index configuration")?;
        let grafeas = GrafeasClient::new(&config.grafeas_url, config.upstream_timeout)
            .context("invalid evidence store configuration")?;

        Ok(Self {
            index: Arc::new(ElasticSearchIndex::new(elastic.clone())),
            indices: Arc::new(ElasticIndexManager::new(elastic, config.index_prefix.clone())),
            grafeas: Arc::new(grafeas),
            filter: Arc::new(CelFilterCompiler),
        })
    }

    pub fn api_state(&self, config: &ServerConfig) -> ApiState {
        let engine = Arc::new(PaginationEngine::new(
            Arc::clone(&self.index),
            Arc::clone(&self.filter),
            config.search_context_keep_alive.clone(),
        ));

        ApiState {
            store: self.grafeas.clone(),
            registry: Arc::new(CollectorRegistry::new(self.grafeas.clone(), config.project.clone())),
            resources: Arc::new(IndexedResourceManager::new(
                Arc::clone(&self.index),
                Arc::clone(&engine),
                self.indices.as_ref(),
            )),
            engine,
            project: Arc::from(config.project.as_str()),
            occurrences_alias: Arc::from(config.occurrences_alias.as_str()),
        }
    }
}

pub fn build_router(state: ApiState, request_timeout: Duration) -> Router {
    apply_middleware(
        Router::new().route("/healthz", get(healthz)).merge(api::router(state)),
        request_timeout,
    )
}

pub fn apply_middleware(router: Router, request_timeout: Duration) -> Router {
    router
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, request_timeout))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(middleware::from_fn(request_context_middleware))
        .layer(middleware::from_fn(panic_handler))
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

async fn panic_handler(request: Request<Body>, next: Next) -> Response {
    match tokio::spawn(async move { next.run(request).await }).await {
        Ok(response) => response,
        Err(join_error) => {
            error!(?join_error, "request handling panicked");
            ApiError::from_code(ErrorCode::Internal).into_response()
        }
    }
}

async fn request_context_middleware(request: Request<Body>, next: Next) -> Response {
    let request_id = request_id_from_headers_or_generate(request.headers());
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let started_at = Instant::now();

    let mut response = with_request_id_scope(request_id.clone(), next.run(request)).await;
    attach_request_id_header(&mut response, &request_id);

    info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = started_at.elapsed().as_millis() as u64,
        "request completed"
    );

    response
}
