// Cursor pagination over search contexts.
//
//   no token, no size  -> one search capped at MAX_PAGE_SIZE, no token
//   no token, size     -> open a search context, offset 0
//   token              -> decode (context, offset) and reuse the context
//
// The next token is cleared as soon as `offset + size` reaches an exact total.
// Estimated totals only end the walk on a short page.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{debug, info_span, Instrument, Span};

use crate::cursor::{decode_page_token, encode_page_token};
use crate::error::{create_error, ApiError};
use crate::filter::FilterCompiler;
use crate::query::{compose, ListRequest};
use crate::search::{Hit, PointInTime, SearchBody, SearchIndex, SearchResults};

pub const DEFAULT_PAGE_SIZE: u64 = 50;
pub const MAX_PAGE_SIZE: u64 = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchPage {
    pub hits: Vec<Hit>,
    pub next_page_token: String,
}

pub struct PaginationEngine {
    index: Arc<dyn SearchIndex>,
    filter: Arc<dyn FilterCompiler>,
    keep_alive: String,
}

impl PaginationEngine {
    pub fn new(
        index: Arc<dyn SearchIndex>,
        filter: Arc<dyn FilterCompiler>,
        keep_alive: impl Into<String>,
    ) -> Self {
        Self { index, filter, keep_alive: keep_alive.into() }
    }

    pub fn filter_compiler(&self) -> &dyn FilterCompiler {
        self.filter.as_ref()
    }

    pub async fn list(&self, request: &ListRequest) -> Result<SearchPage, ApiError> {
        self.list_page(request)
            .instrument(info_span!(
                "provenance.pagination.list",
                index = %request.index,
                filter = ?request.filter,
                page_size = ?request.page_size,
                page_token = ?request.page_token,
                body = tracing::field::Empty
            ))
            .await
    }

    async fn list_page(&self, request: &ListRequest) -> Result<SearchPage, ApiError> {
        let mut body = compose(self.filter.as_ref(), request)?;

        if !request.is_paginated() {
            body.size = Some(MAX_PAGE_SIZE);
            let results = self.search(&request.index, &body).await?;
            return Ok(SearchPage { hits: results.hits, next_page_token: String::new() });
        }

        let size = normalize_page_size(request.requested_page_size());
        let (context_id, offset) = match request.continuation_token() {
            Some(token) => {
                let cursor = decode_page_token(token)
                    .map_err(|error| create_error("error parsing page token", Some(error)))?;
                (cursor.context_id, cursor.offset)
            }
            None => {
                let context = self
                    .index
                    .open_search_context(&request.index, &self.keep_alive)
                    .await
                    .map_err(|error| create_error("error creating search context", Some(error)))?;
                (context.id, 0)
            }
        };

        body.pit = Some(PointInTime { id: context_id.clone(), keep_alive: self.keep_alive.clone() });
        body.from = Some(offset);
        body.size = Some(size);

        let results = self.search(&request.index, &body).await?;
        let next_offset = offset.saturating_add(size);
        let exhausted = if results.approximate_total {
            (results.hits.len() as u64) < size
        } else {
            next_offset >= results.total
        };
        let next_page_token = if exhausted {
            String::new()
        } else {
            let context_id = results.context_id.as_deref().unwrap_or(&context_id);
            encode_page_token(context_id, next_offset)
                .map_err(|error| create_error("error creating page token", Some(error)))?
        };

        Ok(SearchPage { hits: results.hits, next_page_token })
    }

    async fn search(&self, index: &str, body: &SearchBody) -> Result<SearchResults, ApiError> {
        let rendered = serde_json::to_string(body).unwrap_or_default();
        Span::current().record("body", rendered.as_str());
        debug!(index, "searching index");

        let results = self
            .index
            .search(index, body)
            .await
            .map_err(|error| create_error("error searching index", Some(error)))?;

        debug!(hits = results.hits.len(), total = results.total, "search completed");
        Ok(results)
    }
}

/// Absent or zero falls back to the default; anything larger than the maximum is clamped.
pub fn normalize_page_size(page_size: Option<u32>) -> u64 {
    match page_size {
        Some(0) | None => DEFAULT_PAGE_SIZE,
        Some(value) => u64::from(value).min(MAX_PAGE_SIZE),
    }
}

pub fn decode_hits<T: DeserializeOwned>(hits: Vec<Hit>) -> Result<Vec<T>, ApiError> {
    hits.into_iter()
        .map(|hit| {
            serde_json::from_value(hit.source)
                .map_err(|error| create_error("error unmarshalling search result", Some(error)))
        })
        .collect()
}
