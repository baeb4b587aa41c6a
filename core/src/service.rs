//! Connection façade.
//!
//! # Design
//! `TfsService` carries its connection state as an explicit value:
//! `Disconnected` until a probe fetch succeeds, then `Connected` with the
//! credentialed [`Session`]. Every data operation starts by asking for that
//! session and fails with `ServiceError::NotConnected` when there is none.
//!
//! Argument checks run before any request is built, so a rejected call never
//! touches the transport.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::args::{check_fields, coerce_ids, ToItemId};
use crate::client::TfsClient;
use crate::config::{ConnectionSettings, Credentials, ServiceConfig};
use crate::error::{Result, ServiceError};
use crate::relation::LinkKind;
use crate::session::Session;
use crate::transport::{Transport, UreqTransport};
use crate::types::{FieldMap, PatchOperation, Relation, WiqlResult, WorkItemRecord};
use crate::workitem::{qualify_field_name, RemoteRecord, WorkItem};

/// Fields the server owns; a copy never carries them over.
const COPY_SKIPPED_FIELDS: &[&str] = &[
    "System.Id",
    "System.Rev",
    "System.WorkItemType",
    "System.State",
    "System.Reason",
    "System.CreatedDate",
    "System.CreatedBy",
    "System.ChangedDate",
    "System.ChangedBy",
    "System.AuthorizedDate",
    "System.AuthorizedAs",
    "System.RevisedDate",
    "System.Watermark",
    "System.PersonId",
    "System.TeamProject",
    "System.NodeName",
    "System.AreaId",
    "System.IterationId",
    "System.BoardColumn",
    "System.BoardColumnDone",
    "System.BoardLane",
    "System.CommentCount",
    "System.AttachedFileCount",
    "System.ExternalLinkCount",
    "System.HyperLinkCount",
    "System.RelatedLinkCount",
    "Microsoft.VSTS.Common.StateChangeDate",
    "Microsoft.VSTS.Common.ActivatedDate",
    "Microsoft.VSTS.Common.ActivatedBy",
    "Microsoft.VSTS.Common.ResolvedDate",
    "Microsoft.VSTS.Common.ResolvedBy",
    "Microsoft.VSTS.Common.ClosedDate",
    "Microsoft.VSTS.Common.ClosedBy",
];

const COPY_SKIPPED_PREFIXES: &[&str] = &["System.AreaLevel", "System.IterationLevel"];

/// How `copy_work_item` builds the copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyOptions {
    /// Carry the source's links and attachments (child links excepted).
    pub with_links_and_attachments: bool,
    /// Ask the server not to notify subscribers about the new item.
    pub suppress_notifications: bool,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            with_links_and_attachments: true,
            suppress_notifications: true,
        }
    }
}

#[derive(Debug)]
enum ConnectionState {
    Disconnected,
    Connected(Session),
}

/// Entry point: owns the connection state and hands out `WorkItem`s.
pub struct TfsService {
    config: ServiceConfig,
    transport: Arc<dyn Transport>,
    state: ConnectionState,
}

impl std::fmt::Debug for TfsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TfsService")
            .field("config", &self.config)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl TfsService {
    /// A disconnected service using the blocking `ureq` transport.
    pub fn new(config: ServiceConfig) -> Self {
        Self::with_transport(config, Arc::new(UreqTransport::new()))
    }

    pub fn with_transport(config: ServiceConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            state: ConnectionState::Disconnected,
        }
    }

    pub fn from_settings(settings: &ConnectionSettings) -> Self {
        Self::new(settings.service.clone())
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, ConnectionState::Connected(_))
    }

    /// Build a credentialed client and fetch `probe_item_id` through it.
    ///
    /// Connected iff the probe returns a record. Every failure on the way
    /// (bad address, transport error, rejected credentials, missing item) is
    /// logged and reported as `false`.
    pub fn connect(&mut self, credentials: &Credentials, probe_item_id: impl ToItemId) -> bool {
        self.state = ConnectionState::Disconnected;
        match self.probe(credentials, &probe_item_id) {
            Ok(Some(session)) => {
                info!(
                    server = %self.config.server,
                    collection = %self.config.collection,
                    user = %credentials.username,
                    "connected"
                );
                self.state = ConnectionState::Connected(session);
                true
            }
            Ok(None) => {
                warn!(server = %self.config.server, "connection probe item not found");
                false
            }
            Err(e) => {
                warn!(server = %self.config.server, error = %e, "connection probe failed");
                false
            }
        }
    }

    /// `connect` with the credentials and probe id from `settings`.
    pub fn connect_with(&mut self, settings: &ConnectionSettings) -> bool {
        self.connect(&settings.credentials, settings.probe_item_id)
    }

    fn probe(&self, credentials: &Credentials, probe: &dyn ToItemId) -> Result<Option<Session>> {
        let id = probe.to_item_id()?;
        let client = TfsClient::new(&self.config)?.with_credentials(credentials);
        let session = Session::new(client, Arc::clone(&self.transport));
        Ok(session.fetch(id)?.map(|_| session))
    }

    fn session(&self) -> Result<&Session> {
        match &self.state {
            ConnectionState::Connected(session) => Ok(session),
            ConnectionState::Disconnected => Err(ServiceError::NotConnected),
        }
    }

    /// Fetch one work item; `None` when it does not exist.
    pub fn get_work_item(&self, id: impl ToItemId) -> Result<Option<WorkItem>> {
        let session = self.session()?;
        let id = id.to_item_id()?;
        Ok(session.fetch(id)?.map(|data| WorkItem::wrap(data, session)))
    }

    /// Fetch several work items; `None` when nothing comes back.
    ///
    /// Order and completeness follow the server: ids it cannot resolve are
    /// left out rather than reported.
    pub fn get_work_items<I>(&self, ids: I) -> Result<Option<Vec<WorkItem>>>
    where
        I: IntoIterator,
        I::Item: ToItemId,
    {
        let session = self.session()?;
        let ids = coerce_ids(ids)?;
        if ids.is_empty() {
            return Ok(None);
        }
        let items = wrap_all(session.fetch_many(&ids)?, session);
        Ok((!items.is_empty()).then_some(items))
    }

    /// Write `fields` to an existing item, one round-trip per field.
    ///
    /// Returns false when the item does not exist.
    pub fn save_fields(&self, id: impl ToItemId, fields: &FieldMap) -> Result<bool> {
        let session = self.session()?;
        check_fields(fields, "fields")?;
        let id = id.to_item_id()?;
        let Some(data) = session.fetch(id)? else {
            debug!(id, "save skipped, work item not found");
            return Ok(false);
        };
        let mut record = RemoteRecord::new(data, session.clone());
        for (name, value) in fields {
            record.set(name, value.clone())?;
        }
        Ok(true)
    }

    /// Create an item of `item_type` from `required`, then write `optional`.
    ///
    /// Returns `None` when the server does not know the type.
    pub fn create_work_item(
        &self,
        item_type: &str,
        required: &FieldMap,
        optional: Option<&FieldMap>,
    ) -> Result<Option<WorkItem>> {
        let session = self.session()?;
        check_fields(required, "required_fields")?;
        if let Some(optional) = optional {
            check_fields(optional, "props")?;
        }

        let ops: Vec<PatchOperation> = required
            .iter()
            .map(|(name, value)| PatchOperation::set_field(&qualify_field_name(name), value.clone()))
            .collect();
        let Some(data) = session.create(item_type, &ops, false)? else {
            return Ok(None);
        };
        let mut item = WorkItem::wrap(data, session);
        apply_props(&mut item, optional)?;
        info!(id = item.id(), item_type, "created work item");
        Ok(Some(item))
    }

    /// Copy an existing item (given as a `WorkItem` or an id).
    ///
    /// Fails with `SourceNotFound` when the source does not resolve.
    pub fn copy_work_item(
        &self,
        source: impl ToItemId,
        options: CopyOptions,
        props: Option<&FieldMap>,
    ) -> Result<Option<WorkItem>> {
        let session = self.session()?;
        if let Some(props) = props {
            check_fields(props, "props")?;
        }
        let id = source.to_item_id()?;
        let Some(data) = session.fetch(id)? else {
            return Err(ServiceError::SourceNotFound(id));
        };
        let source = WorkItem::wrap(data, session);
        if source.item_type().is_empty() {
            return Err(ServiceError::invalid(format!("work item {id} has no type")));
        }

        let ops = copy_operations(source.raw_item().data(), options.with_links_and_attachments);
        let Some(copy) = session.create(source.item_type(), &ops, options.suppress_notifications)?
        else {
            return Ok(None);
        };
        let mut item = WorkItem::wrap(copy, session);
        apply_props(&mut item, props)?;
        info!(source = id, id = item.id(), "copied work item");
        Ok(Some(item))
    }

    /// Run a stored query by folder path or GUID.
    ///
    /// `None` when no such query exists or the path names a folder; an empty
    /// list when it matches nothing.
    pub fn run_query(&self, query: &str) -> Result<Option<Vec<WorkItem>>> {
        let session = self.session()?;
        let Some(definition) = session.find_query(query)? else {
            return Ok(None);
        };
        if definition.is_folder {
            debug!(query, "stored query path is a folder");
            return Ok(None);
        }
        let result = session.run_query(&definition)?;
        resolve_result(session, &result)
    }

    /// Run ad-hoc WIQL, optionally with extra URI parameters such as `$top`.
    pub fn run_wiql(
        &self,
        wiql: &str,
        uri_params: Option<&BTreeMap<String, String>>,
    ) -> Result<Option<Vec<WorkItem>>> {
        let session = self.session()?;
        let empty = BTreeMap::new();
        let params = uri_params.unwrap_or(&empty);
        for key in params.keys() {
            if key.trim().is_empty() {
                return Err(ServiceError::invalid("uri_params contains a blank name"));
            }
            if key.eq_ignore_ascii_case("api-version") {
                return Err(ServiceError::invalid("uri_params cannot override api-version"));
            }
        }
        let result = session.run_wiql(wiql, params)?;
        resolve_result(session, &result)
    }

    pub fn add_link(&self, kind: LinkKind, source: &mut WorkItem, dest: &WorkItem) -> Result<bool> {
        self.session()?;
        source.add_link(kind, dest)
    }

    pub fn add_parent_link(&self, source: &mut WorkItem, dest: &WorkItem) -> Result<bool> {
        self.add_link(LinkKind::Parent, source, dest)
    }

    pub fn add_child_link(&self, source: &mut WorkItem, dest: &WorkItem) -> Result<bool> {
        self.add_link(LinkKind::Child, source, dest)
    }

    pub fn add_affect_link(&self, source: &mut WorkItem, dest: &WorkItem) -> Result<bool> {
        self.add_link(LinkKind::Affects, source, dest)
    }

    pub fn add_affected_by_link(&self, source: &mut WorkItem, dest: &WorkItem) -> Result<bool> {
        self.add_link(LinkKind::AffectedBy, source, dest)
    }
}

fn wrap_all(records: Vec<WorkItemRecord>, session: &Session) -> Vec<WorkItem> {
    records
        .into_iter()
        .map(|data| WorkItem::wrap(data, session))
        .collect()
}

fn apply_props(item: &mut WorkItem, props: Option<&FieldMap>) -> Result<()> {
    for (name, value) in props.into_iter().flatten() {
        item.set(name, value.clone())?;
    }
    Ok(())
}

fn resolve_result(session: &Session, result: &WiqlResult) -> Result<Option<Vec<WorkItem>>> {
    let Some(ids) = result.item_ids() else {
        return Ok(None);
    };
    if ids.is_empty() {
        return Ok(Some(Vec::new()));
    }
    Ok(Some(wrap_all(session.fetch_many(&ids)?, session)))
}

fn copy_operations(source: &WorkItemRecord, with_relations: bool) -> Vec<PatchOperation> {
    let mut ops: Vec<PatchOperation> = source
        .fields
        .iter()
        .filter(|(name, _)| copyable_field(name))
        .map(|(name, value)| PatchOperation::set_field(name, value.clone()))
        .collect();
    if with_relations {
        ops.extend(
            source
                .relations
                .iter()
                .filter(|r| !LinkKind::Child.matches(&r.rel))
                .map(|r| PatchOperation::add_relation(&copied_relation(r))),
        );
    }
    ops
}

fn copyable_field(name: &str) -> bool {
    !COPY_SKIPPED_FIELDS.contains(&name)
        && !COPY_SKIPPED_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Keep only the caller-settable part of a relation.
fn copied_relation(relation: &Relation) -> Relation {
    let mut copy = Relation::new(relation.rel.clone(), relation.url.clone());
    if let Some(Value::String(comment)) = relation.attributes.get("comment") {
        copy.attributes
            .insert("comment".to_string(), Value::String(comment.clone()));
    }
    copy
}
