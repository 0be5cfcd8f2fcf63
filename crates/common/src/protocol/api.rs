// REST request/response envelopes for the provenance API.
//
// Query parameters and bodies are camelCase. List responses always carry
// `nextPageToken`; an empty token marks the last page.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{GenericResource, GenericResourceVersion, Note, Occurrence, Resource};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ListOccurrencesRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListOccurrencesResponse {
    pub occurrences: Vec<Occurrence>,
    pub next_page_token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ListResourcesRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListResourcesResponse {
    pub resources: Vec<Resource>,
    pub next_page_token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ListVersionedResourceOccurrencesRequest {
    #[serde(default)]
    pub resource_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
    #[serde(default)]
    pub fetch_related_notes: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListVersionedResourceOccurrencesResponse {
    pub occurrences: Vec<Occurrence>,
    pub next_page_token: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub related_notes: BTreeMap<String, Note>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ListGenericResourcesRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    /// Comma-separated resource types, e.g. `docker,npm`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_types: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
}

impl ListGenericResourcesRequest {
    pub fn resource_types(&self) -> Vec<String> {
        self.resource_types
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(|value| value.trim().to_ascii_lowercase())
            .filter(|value| !value.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ListGenericResourcesResponse {
    pub generic_resources: Vec<GenericResource>,
    pub next_page_token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ListGenericResourceVersionsRequest {
    /// Filled from the route, never from the query string.
    #[serde(skip)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ListGenericResourceVersionsResponse {
    pub versions: Vec<GenericResourceVersion>,
    pub next_page_token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatchCreateOccurrencesRequest {
    #[serde(default)]
    pub occurrences: Vec<Occurrence>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatchCreateOccurrencesResponse {
    pub occurrences: Vec<Occurrence>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOccurrenceRequest {
    pub occurrence: Occurrence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_mask: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegisterCollectorRequest {
    #[serde(default)]
    pub notes: Vec<Note>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegisterCollectorResponse {
    /// Registered notes keyed by their derived note id.
    pub notes: BTreeMap<String, Note>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateNoteQuery {
    #[serde(default)]
    pub note_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn list_responses_always_carry_next_page_token() {
        let value = serde_json::to_value(ListResourcesResponse::default()).unwrap();
        assert_eq!(value, json!({ "resources": [], "nextPageToken": "" }));
    }

    #[test]
    fn resource_types_are_split_and_normalized() {
        let request = ListGenericResourcesRequest {
            resource_types: Some("Docker, npm,,".to_string()),
            ..Default::default()
        };
        assert_eq!(request.resource_types(), vec!["docker".to_string(), "npm".to_string()]);
        assert!(ListGenericResourcesRequest::default().resource_types().is_empty());
    }

    #[test]
    fn related_notes_are_omitted_when_empty() {
        let value =
            serde_json::to_value(ListVersionedResourceOccurrencesResponse::default()).unwrap();
        assert!(value.get("relatedNotes").is_none());
    }

    #[test]
    fn versioned_request_reads_camel_case_fields() {
        let request: ListVersionedResourceOccurrencesRequest = serde_json::from_value(json!({
            "resourceUri": "git://example.com/repo@abc",
            "pageSize": 5,
            "fetchRelatedNotes": true
        }))
        .unwrap();
        assert_eq!(request.resource_uri, "git://example.com/repo@abc");
        assert_eq!(request.page_size, Some(5));
        assert!(request.fetch_related_notes);
        assert!(request.page_token.is_none());
    }
}
