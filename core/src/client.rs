//! Stateless HTTP request builder and response parser for the work-item API.
//!
//! # Design
//! `TfsClient` holds the collection base URL, the api version and an optional
//! `Authorization` header, and carries no mutable state between calls. Each
//! remote operation is split into a `build_*` method that produces an
//! `HttpRequest` and a `parse_*` method that consumes an `HttpResponse`.
//! A [`Transport`](crate::transport::Transport) executes the round-trip in
//! between, keeping this module deterministic and free of I/O.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use url::Url;

use crate::config::{Credentials, ServiceConfig};
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::types::{
    PatchOperation, QueryDefinition, WiqlQuery, WiqlResult, WorkItemBatch, WorkItemRecord,
};

/// Largest id list the server accepts in one batch fetch.
pub const MAX_BATCH_SIZE: usize = 200;

const JSON: &str = "application/json";
const JSON_PATCH: &str = "application/json-patch+json";

/// Synchronous, stateless client for the work-item REST API.
#[derive(Clone)]
pub struct TfsClient {
    base: Url,
    api_version: String,
    authorization: Option<String>,
}

impl std::fmt::Debug for TfsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TfsClient")
            .field("base", &self.base.as_str())
            .field("api_version", &self.api_version)
            .field("authorized", &self.authorization.is_some())
            .finish()
    }
}

impl TfsClient {
    /// Bind a client to `{server}/{collection}`.
    pub fn new(config: &ServiceConfig) -> Result<Self, ApiError> {
        let server = config.server.trim_end_matches('/');
        let collection = config.collection.trim_matches('/');
        let raw = if collection.is_empty() {
            format!("{server}/")
        } else {
            format!("{server}/{collection}/")
        };
        let base = Url::parse(&raw).map_err(|e| ApiError::InvalidUrl(format!("{raw}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(raw));
        }
        Ok(Self {
            base,
            api_version: config.api_version.clone(),
            authorization: None,
        })
    }

    /// Attach HTTP Basic credentials to every request built from now on.
    pub fn with_credentials(mut self, credentials: &Credentials) -> Self {
        let token = STANDARD.encode(format!("{}:{}", credentials.username, credentials.password));
        self.authorization = Some(format!("Basic {token}"));
        self
    }

    /// Collection base URL, always ending in `/`.
    pub fn base_url(&self) -> &str {
        self.base.as_str()
    }

    /// Canonical resource URL of a work item, as used in relation links.
    pub fn work_item_url(&self, id: i64) -> String {
        self.endpoint(&["_apis", "wit", "workItems", &id.to_string()], &[])
    }

    pub fn build_get_work_item(&self, id: i64) -> HttpRequest {
        let path = self.api(&["workitems", &id.to_string()], &[("$expand", "relations")]);
        self.request(HttpMethod::Get, path, None, None)
    }

    /// Build a batch fetch. Callers split id lists at [`MAX_BATCH_SIZE`].
    pub fn build_get_work_items(&self, ids: &[i64]) -> HttpRequest {
        let joined = ids.iter().map(i64::to_string).collect::<Vec<_>>().join(",");
        let path = self.api(
            &["workitems"],
            &[("ids", joined.as_str()), ("$expand", "relations"), ("errorPolicy", "omit")],
        );
        self.request(HttpMethod::Get, path, None, None)
    }

    pub fn build_create_work_item(
        &self,
        item_type: &str,
        operations: &[PatchOperation],
        suppress_notifications: bool,
    ) -> Result<HttpRequest, ApiError> {
        let body = to_json(operations)?;
        let segment = format!("${item_type}");
        let query: &[(&str, &str)] = if suppress_notifications {
            &[("suppressNotifications", "true")]
        } else {
            &[]
        };
        let path = self.api(&["workitems", &segment], query);
        Ok(self.request(HttpMethod::Post, path, Some(JSON_PATCH), Some(body)))
    }

    pub fn build_update_work_item(
        &self,
        id: i64,
        operations: &[PatchOperation],
    ) -> Result<HttpRequest, ApiError> {
        let body = to_json(operations)?;
        let path = self.api(&["workitems", &id.to_string()], &[]);
        Ok(self.request(HttpMethod::Patch, path, Some(JSON_PATCH), Some(body)))
    }

    /// Look up a stored query by folder path (`Shared Queries/Bugs`) or GUID.
    pub fn build_get_query(&self, path_or_id: &str) -> HttpRequest {
        let mut segments = vec!["queries"];
        segments.extend(path_or_id.split('/').filter(|s| !s.is_empty()));
        let path = self.api(&segments, &[]);
        self.request(HttpMethod::Get, path, None, None)
    }

    pub fn build_run_query(&self, query: &QueryDefinition) -> HttpRequest {
        let path = self.api(&["wiql", &query.id.to_string()], &[]);
        self.request(HttpMethod::Get, path, None, None)
    }

    pub fn build_run_wiql(
        &self,
        wiql: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<HttpRequest, ApiError> {
        let body = to_json(&WiqlQuery {
            query: wiql.to_string(),
        })?;
        let extra: Vec<(&str, &str)> = params.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        let path = self.api(&["wiql"], &extra);
        Ok(self.request(HttpMethod::Post, path, Some(JSON), Some(body)))
    }

    pub fn parse_get_work_item(&self, response: HttpResponse) -> Result<WorkItemRecord, ApiError> {
        check_status(&response, 200)?;
        from_json(&response.body)
    }

    /// Parse a batch fetch, dropping entries the server omitted.
    pub fn parse_get_work_items(
        &self,
        response: HttpResponse,
    ) -> Result<Vec<WorkItemRecord>, ApiError> {
        check_status(&response, 200)?;
        let batch: WorkItemBatch = from_json(&response.body)?;
        Ok(batch.value.into_iter().flatten().collect())
    }

    pub fn parse_create_work_item(
        &self,
        response: HttpResponse,
    ) -> Result<WorkItemRecord, ApiError> {
        check_status(&response, 200)?;
        from_json(&response.body)
    }

    pub fn parse_update_work_item(
        &self,
        response: HttpResponse,
    ) -> Result<WorkItemRecord, ApiError> {
        check_status(&response, 200)?;
        from_json(&response.body)
    }

    pub fn parse_get_query(&self, response: HttpResponse) -> Result<QueryDefinition, ApiError> {
        check_status(&response, 200)?;
        from_json(&response.body)
    }

    /// Shared by stored-query and ad-hoc WIQL execution.
    pub fn parse_wiql_result(&self, response: HttpResponse) -> Result<WiqlResult, ApiError> {
        check_status(&response, 200)?;
        from_json(&response.body)
    }

    fn api(&self, segments: &[&str], query: &[(&str, &str)]) -> String {
        let mut full = vec!["_apis", "wit"];
        full.extend_from_slice(segments);
        let mut pairs: Vec<(&str, &str)> = query.to_vec();
        pairs.push(("api-version", self.api_version.as_str()));
        self.endpoint(&full, &pairs)
    }

    fn endpoint(&self, segments: &[&str], query: &[(&str, &str)]) -> String {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        url.into()
    }

    fn request(
        &self,
        method: HttpMethod,
        path: String,
        content_type: Option<&str>,
        body: Option<String>,
    ) -> HttpRequest {
        let mut headers = vec![("accept".to_string(), JSON.to_string())];
        if let Some(ct) = content_type {
            headers.push(("content-type".to_string(), ct.to_string()));
        }
        if let Some(auth) = &self.authorization {
            headers.push(("authorization".to_string(), auth.clone()));
        }
        HttpRequest {
            method,
            path,
            headers,
            body,
        }
    }
}

/// Map non-success status codes to the appropriate `ApiError` variant.
fn check_status(response: &HttpResponse, expected: u16) -> Result<(), ApiError> {
    if response.status == expected {
        return Ok(());
    }
    if response.status == 404 {
        return Err(ApiError::NotFound);
    }
    Err(ApiError::HttpError {
        status: response.status,
        body: response.body.clone(),
    })
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String, ApiError> {
    serde_json::to_string(value).map_err(|e| ApiError::SerializationError(e.to_string()))
}

fn from_json<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|e| ApiError::DeserializationError(e.to_string()))
}
