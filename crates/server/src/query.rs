// Composes structured search bodies from logical list requests.

use serde_json::json;

use crate::error::{create_error_with_code, ApiError, ErrorCode};
use crate::filter::FilterCompiler;
use crate::search::{Collapse, SearchBody, Sort};

/// A logical list request against one index or alias.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListRequest {
    pub index: String,
    pub filter: Option<String>,
    pub page_size: Option<u32>,
    pub page_token: Option<String>,
    pub sort: Option<Sort>,
    pub collapse: Option<String>,
}

impl ListRequest {
    pub fn new(index: impl Into<String>) -> Self {
        Self { index: index.into(), ..Self::default() }
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn page(mut self, page_size: Option<u32>, page_token: Option<String>) -> Self {
        self.page_size = page_size;
        self.page_token = page_token;
        self
    }

    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn collapse(mut self, field: impl Into<String>) -> Self {
        self.collapse = Some(field.into());
        self
    }

    /// Token to continue from; blank tokens count as absent.
    pub fn continuation_token(&self) -> Option<&str> {
        self.page_token.as_deref().map(str::trim).filter(|token| !token.is_empty())
    }

    /// Requested page size; zero counts as absent.
    pub fn requested_page_size(&self) -> Option<u32> {
        self.page_size.filter(|size| *size > 0)
    }

    pub fn is_paginated(&self) -> bool {
        self.continuation_token().is_some() || self.requested_page_size().is_some()
    }
}

/// Query, sort and collapse clauses for `request`. Pagination clauses are left to the caller.
pub fn compose(compiler: &dyn FilterCompiler, request: &ListRequest) -> Result<SearchBody, ApiError> {
    let mut body = SearchBody::default();

    if let Some(filter) = request.filter.as_deref().map(str::trim).filter(|f| !f.is_empty()) {
        let query = compiler.compile(filter).map_err(|error| {
            let details = match error.offset() {
                Some(offset) => json!({ "offset": offset }),
                None => json!({}),
            };
            create_error_with_code(
                ErrorCode::InvalidArgument,
                "error while parsing filter expression",
                Some(error),
            )
            .with_details(details)
        })?;
        body.query = Some(query);
    }

    if let Some(sort) = &request.sort {
        body.sort = vec![sort.clone()];
    }

    if let Some(field) = &request.collapse {
        body.collapse = Some(Collapse { field: field.clone() });
    }

    Ok(body)
}
