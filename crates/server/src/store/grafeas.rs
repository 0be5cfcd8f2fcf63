// Evidence store client for the Grafeas v1beta1 REST gateway.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use provenance_common::types::{Note, Occurrence, Project};
use reqwest::{Method, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::{EvidenceStore, ListParams, NotePage, OccurrencePage, ProjectStore, StoreError};

const API_VERSION: &str = "v1beta1";

#[derive(Debug, Clone)]
pub struct GrafeasClient {
    http: reqwest::Client,
    base_url: Url,
}

#[derive(Serialize)]
struct BatchCreateOccurrencesBody<'a> {
    parent: &'a str,
    occurrences: Vec<Occurrence>,
}

#[derive(Serialize)]
struct BatchCreateNotesBody<'a> {
    parent: &'a str,
    notes: BTreeMap<String, Note>,
}

#[derive(Deserialize)]
struct OccurrencesResponse {
    #[serde(default)]
    occurrences: Vec<Occurrence>,
    #[serde(default, rename = "nextPageToken")]
    next_page_token: String,
}

#[derive(Deserialize)]
struct NotesResponse {
    #[serde(default)]
    notes: Vec<Note>,
    #[serde(default, rename = "nextPageToken")]
    next_page_token: String,
}

impl GrafeasClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url })
    }

    fn request(&self, method: Method, resource: &str) -> Result<RequestBuilder, StoreError> {
        let url = self.base_url.join(&api_path(resource))?;
        Ok(self.http.request(method, url))
    }
}

fn api_path(resource: &str) -> String {
    format!("{API_VERSION}/{}", resource.trim_start_matches('/'))
}

fn list_query(params: &ListParams) -> Vec<(&'static str, String)> {
    let mut query = Vec::new();
    if let Some(filter) = params.filter.as_deref().filter(|filter| !filter.is_empty()) {
        query.push(("filter", filter.to_string()));
    }
    if let Some(page_size) = params.page_size.filter(|size| *size > 0) {
        query.push(("page_size", page_size.to_string()));
    }
    if let Some(page_token) = params.page_token.as_deref().filter(|token| !token.is_empty()) {
        query.push(("page_token", page_token.to_string()));
    }
    query
}

/// The gateway reports `{"code": .., "message": ..}`; fall back to the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

fn status_error(status: u16, body: String) -> StoreError {
    match status {
        400 => StoreError::InvalidArgument(error_message(&body)),
        404 => StoreError::NotFound(error_message(&body)),
        409 => StoreError::AlreadyExists(error_message(&body)),
        _ => StoreError::Status { status, body },
    }
}

async fn send<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, StoreError> {
    let response = builder.send().await?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(status_error(status.as_u16(), body));
    }

    Ok(serde_json::from_str(&body)?)
}

#[async_trait]
impl EvidenceStore for GrafeasClient {
    async fn batch_create_occurrences(
        &self,
        parent: &str,
        occurrences: Vec<Occurrence>,
    ) -> Result<Vec<Occurrence>, StoreError> {
        let request = self
            .request(Method::POST, &format!("{parent}/occurrences:batchCreate"))?
            .json(&BatchCreateOccurrencesBody { parent, occurrences });
        let response: OccurrencesResponse = send(request).await?;
        Ok(response.occurrences)
    }

    async fn list_occurrences(
        &self,
        parent: &str,
        params: &ListParams,
    ) -> Result<OccurrencePage, StoreError> {
        let request = self
            .request(Method::GET, &format!("{parent}/occurrences"))?
            .query(&list_query(params));
        let response: OccurrencesResponse = send(request).await?;
        Ok(OccurrencePage {
            occurrences: response.occurrences,
            next_page_token: response.next_page_token,
        })
    }

    async fn update_occurrence(
        &self,
        name: &str,
        occurrence: Occurrence,
        update_mask: Option<&str>,
    ) -> Result<Occurrence, StoreError> {
        let mut request = self.request(Method::PATCH, name)?.json(&occurrence);
        if let Some(mask) = update_mask.filter(|mask| !mask.is_empty()) {
            request = request.query(&[("update_mask", mask)]);
        }
        send(request).await
    }

    async fn create_note(
        &self,
        parent: &str,
        note_id: &str,
        note: Note,
    ) -> Result<Note, StoreError> {
        let request = self
            .request(Method::POST, &format!("{parent}/notes"))?
            .query(&[("note_id", note_id)])
            .json(&note);
        send(request).await
    }

    async fn batch_create_notes(
        &self,
        parent: &str,
        notes: BTreeMap<String, Note>,
    ) -> Result<Vec<Note>, StoreError> {
        debug!(parent, notes = notes.len(), "batch creating notes");
        let request = self
            .request(Method::POST, &format!("{parent}/notes:batchCreate"))?
            .json(&BatchCreateNotesBody { parent, notes });
        let response: NotesResponse = send(request).await?;
        Ok(response.notes)
    }

    async fn list_notes(&self, parent: &str, params: &ListParams) -> Result<NotePage, StoreError> {
        let request =
            self.request(Method::GET, &format!("{parent}/notes"))?.query(&list_query(params));
        let response: NotesResponse = send(request).await?;
        Ok(NotePage { notes: response.notes, next_page_token: response.next_page_token })
    }
}

#[async_trait]
impl ProjectStore for GrafeasClient {
    async fn get_project(&self, name: &str) -> Result<Project, StoreError> {
        send(self.request(Method::GET, name)?).await
    }

    async fn create_project(&self, project: Project) -> Result<Project, StoreError> {
        send(self.request(Method::POST, "projects")?.json(&project)).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{
        extract::{Query, State},
        http::{StatusCode, Uri},
        routing::{get, post},
        Json, Router,
    };
    use provenance_common::types::NoteKind;
    use serde_json::json;
    use std::collections::HashMap;
    use tokio::net::TcpListener;

    use super::*;

    async fn serve(router: Router) -> GrafeasClient {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("test server");
        });
        GrafeasClient::new(&format!("http://{addr}"), Duration::from_secs(5)).expect("client")
    }

    #[test]
    fn coded_statuses_map_to_store_errors() {
        assert!(matches!(
            status_error(404, r#"{"code":5,"message":"project not found"}"#.to_string()),
            StoreError::NotFound(message) if message == "project not found"
        ));
        assert!(matches!(status_error(400, "bad".to_string()), StoreError::InvalidArgument(m) if m == "bad"));
        assert!(matches!(status_error(409, "{}".to_string()), StoreError::AlreadyExists(_)));
        assert!(matches!(
            status_error(502, "gateway".to_string()),
            StoreError::Status { status: 502, .. }
        ));
    }

    #[test]
    fn list_query_omits_unset_parameters() {
        assert!(list_query(&ListParams::default()).is_empty());

        let params = ListParams::filtered(r#"kind == "BUILD""#).page_size(10);
        assert_eq!(
            list_query(&params),
            vec![("filter", r#"kind == "BUILD""#.to_string()), ("page_size", "10".to_string())]
        );
    }

    #[test]
    fn api_paths_are_versioned() {
        assert_eq!(api_path("projects/p/notes"), "v1beta1/projects/p/notes");
        assert_eq!(api_path("/projects/p"), "v1beta1/projects/p");
    }

    #[tokio::test]
    async fn list_notes_forwards_filter_and_decodes_page() {
        let seen = Arc::new(Mutex::new(None));
        let router = Router::new()
            .route(
                "/v1beta1/projects/p/notes",
                get(
                    |State(seen): State<Arc<Mutex<Option<String>>>>,
                     Query(query): Query<HashMap<String, String>>| async move {
                        *seen.lock().unwrap() = query.get("filter").cloned();
                        Json(json!({
                            "notes": [{ "name": "projects/p/notes/c-build", "kind": "BUILD" }],
                            "nextPageToken": "next"
                        }))
                    },
                ),
            )
            .with_state(Arc::clone(&seen));
        let client = serve(router).await;

        let page = client
            .list_notes("projects/p", &ListParams::filtered(r#"name.startsWith("projects/p/notes/c-")"#))
            .await
            .unwrap();

        assert_eq!(page.notes[0].kind, NoteKind::Build);
        assert_eq!(page.next_page_token, "next");
        assert_eq!(
            seen.lock().unwrap().as_deref(),
            Some(r#"name.startsWith("projects/p/notes/c-")"#)
        );
    }

    #[tokio::test]
    async fn batch_create_notes_sends_notes_keyed_by_id() {
        let router = Router::new().route(
            "/v1beta1/projects/p/notes:batchCreate",
            post(|uri: Uri, Json(body): Json<Value>| async move {
                assert_eq!(uri.path(), "/v1beta1/projects/p/notes:batchCreate");
                assert_eq!(body["parent"], "projects/p");
                let notes: Vec<Value> = body["notes"]
                    .as_object()
                    .map(|notes| {
                        notes
                            .iter()
                            .map(|(id, note)| {
                                let mut note = note.clone();
                                note["name"] = json!(format!("projects/p/notes/{id}"));
                                note
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                Json(json!({ "notes": notes }))
            }),
        );
        let client = serve(router).await;

        let notes = BTreeMap::from([(
            "c-build".to_string(),
            Note { kind: NoteKind::Build, ..Note::default() },
        )]);
        let created = client.batch_create_notes("projects/p", notes).await.unwrap();

        assert_eq!(created.len(), 1);
        assert_eq!(created[0].name, "projects/p/notes/c-build");
    }

    #[tokio::test]
    async fn missing_projects_are_not_found() {
        let router = Router::new().route(
            "/v1beta1/projects/p",
            get(|| async { (StatusCode::NOT_FOUND, r#"{"code":5,"message":"missing"}"#) }),
        );
        let client = serve(router).await;

        assert!(matches!(client.get_project("projects/p").await, Err(StoreError::NotFound(_))));
    }
}
