//! A credentialed client paired with the transport that carries its requests.
//!
//! Both `TfsService` (while connected) and every `WorkItem` it hands out hold
//! a `Session`. Cloning is cheap: the client is a few strings and the
//! transport is shared through an `Arc`.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::client::{TfsClient, MAX_BATCH_SIZE};
use crate::error::ApiError;
use crate::transport::Transport;
use crate::types::{PatchOperation, QueryDefinition, WiqlResult, WorkItemRecord};

#[derive(Clone)]
pub struct Session {
    client: TfsClient,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("client", &self.client).finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(client: TfsClient, transport: Arc<dyn Transport>) -> Self {
        Self { client, transport }
    }

    pub fn client(&self) -> &TfsClient {
        &self.client
    }

    /// Fetch one record; `None` when the server reports 404.
    pub fn fetch(&self, id: i64) -> Result<Option<WorkItemRecord>, ApiError> {
        debug!(id, "fetching work item");
        let response = self.transport.execute(self.client.build_get_work_item(id))?;
        match self.client.parse_get_work_item(response) {
            Ok(record) => Ok(Some(record)),
            Err(ApiError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Fetch many records in server-sized chunks. Missing ids are omitted.
    pub fn fetch_many(&self, ids: &[i64]) -> Result<Vec<WorkItemRecord>, ApiError> {
        let mut records = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_BATCH_SIZE) {
            debug!(count = chunk.len(), "fetching work item batch");
            let response = self.transport.execute(self.client.build_get_work_items(chunk))?;
            records.extend(self.client.parse_get_work_items(response)?);
        }
        Ok(records)
    }

    /// Create a record; `None` when the server does not know `item_type`.
    pub fn create(
        &self,
        item_type: &str,
        operations: &[PatchOperation],
        suppress_notifications: bool,
    ) -> Result<Option<WorkItemRecord>, ApiError> {
        debug!(item_type, fields = operations.len(), "creating work item");
        let request =
            self.client
                .build_create_work_item(item_type, operations, suppress_notifications)?;
        let response = self.transport.execute(request)?;
        match self.client.parse_create_work_item(response) {
            Ok(record) => Ok(Some(record)),
            Err(ApiError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn update(
        &self,
        id: i64,
        operations: &[PatchOperation],
    ) -> Result<WorkItemRecord, ApiError> {
        debug!(id, ops = operations.len(), "updating work item");
        let request = self.client.build_update_work_item(id, operations)?;
        let response = self.transport.execute(request)?;
        self.client.parse_update_work_item(response)
    }

    /// Resolve a stored query; `None` when no query has that path or id.
    pub fn find_query(&self, path_or_id: &str) -> Result<Option<QueryDefinition>, ApiError> {
        debug!(query = path_or_id, "resolving stored query");
        let response = self.transport.execute(self.client.build_get_query(path_or_id))?;
        match self.client.parse_get_query(response) {
            Ok(query) => Ok(Some(query)),
            Err(ApiError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn run_query(&self, query: &QueryDefinition) -> Result<WiqlResult, ApiError> {
        debug!(query = %query.id, "running stored query");
        let response = self.transport.execute(self.client.build_run_query(query))?;
        self.client.parse_wiql_result(response)
    }

    pub fn run_wiql(
        &self,
        wiql: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<WiqlResult, ApiError> {
        debug!(params = params.len(), "running wiql");
        let response = self.transport.execute(self.client.build_run_wiql(wiql, params)?)?;
        self.client.parse_wiql_result(response)
    }
}
