// Request extractors that report rejections through the error envelope.
//
// Axum's own `Json`, `Query` and `Path` reject with plain-text bodies; these
// wrappers classify the rejection and answer with `INVALID_ARGUMENT`.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts, Path, Query, Request,
    },
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::error::{create_error_with_code, ApiError, ErrorCode};

/// JSON body extractor that rejects with a structured `ApiError`.
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ValidatedJson(value)),
            Err(rejection) => {
                let (message, details) = classify_json_rejection(&rejection);
                Err(invalid_argument(message, &rejection.body_text(), details))
            }
        }
    }
}

/// Query string extractor that rejects with a structured `ApiError`.
pub struct ValidatedQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ValidatedQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(ValidatedQuery(value)),
            Err(rejection) => {
                let kind = match &rejection {
                    QueryRejection::FailedToDeserializeQueryString(_) => "query_error",
                    _ => "unknown",
                };
                Err(invalid_argument("invalid query string", &rejection.body_text(), json!({ "kind": kind })))
            }
        }
    }
}

/// Path parameter extractor that rejects with a structured `ApiError`.
pub struct ValidatedPath<T>(pub T);

impl<S, T> FromRequestParts<S> for ValidatedPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(ValidatedPath(value)),
            Err(rejection) => {
                let kind = match &rejection {
                    PathRejection::FailedToDeserializePathParams(_) => "path_error",
                    _ => "unknown",
                };
                Err(invalid_argument("invalid path parameters", &rejection.body_text(), json!({ "kind": kind })))
            }
        }
    }
}

fn invalid_argument(message: &str, cause: &str, details: Value) -> ApiError {
    create_error_with_code(ErrorCode::InvalidArgument, message, Some(cause)).with_details(details)
}

fn classify_json_rejection(rejection: &JsonRejection) -> (&'static str, Value) {
    match rejection {
        JsonRejection::JsonDataError(_) => ("invalid JSON payload", json!({ "kind": "data_error" })),
        JsonRejection::JsonSyntaxError(_) => ("malformed JSON", json!({ "kind": "syntax_error" })),
        JsonRejection::MissingJsonContentType(_) => {
            ("expected Content-Type: application/json", json!({ "kind": "missing_content_type" }))
        }
        JsonRejection::BytesRejection(_) => ("request body error", json!({ "kind": "body_error" })),
        _ => ("request body error", json!({ "kind": "unknown" })),
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        routing::post,
        Router,
    };
    use serde::Deserialize;
    use tower::ServiceExt;

    use super::*;
    use crate::api::testing::body_json;

    #[derive(Deserialize)]
    struct Payload {
        #[allow(dead_code)]
        name: String,
    }

    #[derive(Deserialize)]
    struct Paging {
        #[serde(rename = "pageSize")]
        #[allow(dead_code)]
        page_size: Option<u32>,
    }

    async fn accept(ValidatedQuery(_): ValidatedQuery<Paging>, ValidatedJson(_): ValidatedJson<Payload>) -> StatusCode {
        StatusCode::NO_CONTENT
    }

    async fn send(uri: &str, content_type: Option<&str>, body: &'static str) -> (StatusCode, Value) {
        let router = Router::new().route("/", post(accept));
        let mut request = Request::builder().method("POST").uri(uri);
        if let Some(content_type) = content_type {
            request = request.header("content-type", content_type);
        }
        let response = router.oneshot(request.body(Body::from(body)).unwrap()).await.unwrap();
        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return (status, Value::Null);
        }
        (status, body_json(response).await)
    }

    #[tokio::test]
    async fn well_formed_requests_pass_through() {
        let (status, _) = send("/?pageSize=3", Some("application/json"), r#"{"name":"a"}"#).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn json_rejections_are_classified() {
        for (content_type, body, kind) in [
            (Some("application/json"), "{not json", "syntax_error"),
            (Some("application/json"), r#"{"name":1}"#, "data_error"),
            (None, r#"{"name":"a"}"#, "missing_content_type"),
        ] {
            let (status, body) = send("/", content_type, body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"]["code"], "INVALID_ARGUMENT");
            assert_eq!(body["error"]["retryable"], false);
            assert_eq!(body["error"]["details"]["kind"], kind);
        }
    }

    #[tokio::test]
    async fn query_rejections_use_the_error_envelope() {
        let (status, body) = send("/?pageSize=-1", Some("application/json"), r#"{"name":"a"}"#).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_ARGUMENT");
        assert_eq!(body["error"]["details"]["kind"], "query_error");
        assert!(body["error"]["message"].as_str().unwrap().starts_with("invalid query string: "));
    }
}
