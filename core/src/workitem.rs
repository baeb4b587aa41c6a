//! Work-item façade.
//!
//! # Design
//! A [`RemoteRecord`] is the live remote object: the last snapshot the server
//! sent plus the session needed to write it back. Field writes go straight
//! to the server and the snapshot is replaced by the response; nothing is
//! buffered locally.
//!
//! [`WorkItem`] wraps a `RemoteRecord` and pins `id`, type and parent id at
//! construction. Those three never change for the lifetime of the façade,
//! even if the remote item is re-parented later.

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::args::ToItemId;
use crate::error::Result;
use crate::relation::{item_id_or_zero, parse_item_id, LinkKind};
use crate::session::Session;
use crate::types::{FieldMap, PatchOperation, Relation, WorkItemRecord};

const TYPE_FIELD: &str = "System.WorkItemType";
const TITLE_FIELD: &str = "System.Title";

/// Resolve a caller-supplied key to a reference name present in `fields`.
///
/// Tries the exact name, then a case-insensitive match, then a
/// case-insensitive match on the last dotted segment (`Title` matches
/// `System.Title`).
pub fn resolve_field_name<'a>(fields: &'a FieldMap, key: &str) -> Option<&'a str> {
    if let Some((name, _)) = fields.get_key_value(key) {
        return Some(name.as_str());
    }
    if let Some(name) = fields.keys().find(|k| k.eq_ignore_ascii_case(key)) {
        return Some(name.as_str());
    }
    if key.contains('.') {
        return None;
    }
    fields
        .keys()
        .find(|k| {
            k.rsplit('.')
                .next()
                .is_some_and(|short| short.eq_ignore_ascii_case(key))
        })
        .map(String::as_str)
}

/// Qualify a bare field name into the `System` namespace.
///
/// `Title` becomes `System.Title`; dotted reference names pass through.
pub fn qualify_field_name(key: &str) -> String {
    if key.contains('.') {
        key.to_string()
    } else {
        format!("System.{key}")
    }
}

/// The remote work item object: snapshot plus write-back session.
#[derive(Debug, Clone)]
pub struct RemoteRecord {
    data: WorkItemRecord,
    session: Session,
}

impl RemoteRecord {
    pub fn new(data: WorkItemRecord, session: Session) -> Self {
        Self { data, session }
    }

    pub fn data(&self) -> &WorkItemRecord {
        &self.data
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Canonical URL, falling back to one derived from the id.
    pub fn url(&self) -> String {
        if self.data.url.is_empty() {
            self.session.client().work_item_url(self.data.id)
        } else {
            self.data.url.clone()
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        resolve_field_name(&self.data.fields, key).and_then(|name| self.data.fields.get(name))
    }

    /// Write one field to the server.
    pub fn set(&mut self, key: &str, value: Value) -> Result<()> {
        let name = match resolve_field_name(&self.data.fields, key) {
            Some(name) => name.to_string(),
            None => qualify_field_name(key),
        };
        debug!(id = self.data.id, field = %name, "writing field");
        let op = PatchOperation::set_field(&name, value);
        self.data = self.session.update(self.data.id, &[op])?;
        Ok(())
    }

    /// Relations whose type belongs to `kind`'s category.
    pub fn find_in_relation(&self, kind: LinkKind) -> impl Iterator<Item = &Relation> + '_ {
        self.data.relations.iter().filter(move |r| kind.matches(&r.rel))
    }

    /// Submit relations as-is. True when the updated record carries all of them.
    pub fn add_relations_raw(&mut self, relations: &[Relation]) -> Result<bool> {
        let ops: Vec<PatchOperation> = relations.iter().map(PatchOperation::add_relation).collect();
        self.data = self.session.update(self.data.id, &ops)?;
        Ok(relations.iter().all(|wanted| {
            self.data
                .relations
                .iter()
                .any(|have| same_relation(have, wanted))
        }))
    }

    /// Replace the snapshot with the server's current state.
    ///
    /// Returns false, leaving the snapshot alone, when the item is gone.
    pub fn refresh(&mut self) -> Result<bool> {
        match self.session.fetch(self.data.id)? {
            Some(data) => {
                self.data = data;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

fn same_relation(have: &Relation, wanted: &Relation) -> bool {
    if have.rel != wanted.rel {
        return false;
    }
    if have.url.eq_ignore_ascii_case(&wanted.url) {
        return true;
    }
    match (parse_item_id(&have.url), parse_item_id(&wanted.url)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Serializable view of a work item, for callers outside Rust.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WorkItemSnapshot {
    pub id: i64,
    pub item_type: String,
    pub parent_id: Option<i64>,
    pub title: Option<String>,
    pub rev: i64,
    pub url: String,
    pub fields: FieldMap,
    pub relations: Vec<Relation>,
}

/// A single work item with cached identity and live field access.
#[derive(Debug, Clone)]
pub struct WorkItem {
    record: RemoteRecord,
    id: i64,
    item_type: String,
    parent_id: Option<i64>,
}

impl WorkItem {
    pub fn new(record: RemoteRecord) -> Self {
        let data = record.data();
        let id = data.id;
        let item_type = data
            .fields
            .get(TYPE_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let parent_id = record
            .find_in_relation(LinkKind::Parent)
            .next()
            .and_then(|r| parse_item_id(&r.url));
        Self {
            record,
            id,
            item_type,
            parent_id,
        }
    }

    pub(crate) fn wrap(data: WorkItemRecord, session: &Session) -> Self {
        Self::new(RemoteRecord::new(data, session.clone()))
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn item_type(&self) -> &str {
        &self.item_type
    }

    /// Parent id as it was when this façade was built.
    pub fn parent_id(&self) -> Option<i64> {
        self.parent_id
    }

    pub fn title(&self) -> Option<&str> {
        self.record.get(TITLE_FIELD).and_then(Value::as_str)
    }

    pub fn set_title(&mut self, title: impl Into<String>) -> Result<()> {
        self.record.set(TITLE_FIELD, Value::String(title.into()))
    }

    pub fn url(&self) -> String {
        self.record.url()
    }

    pub fn rev(&self) -> i64 {
        self.record.data().rev
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.record.data().fields.keys().map(String::as_str)
    }

    pub fn raw_item(&self) -> &RemoteRecord {
        &self.record
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.record.get(key)
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.record.set(key, value.into())
    }

    /// Ids at the other end of `kind` relations; `None` when there are none.
    ///
    /// Malformed relation URLs yield `0` for that entry.
    pub fn related_ids(&self, kind: LinkKind) -> Option<Vec<i64>> {
        let ids: Vec<i64> = self
            .record
            .find_in_relation(kind)
            .map(|r| item_id_or_zero(&r.url))
            .collect();
        if ids.is_empty() {
            None
        } else {
            Some(ids)
        }
    }

    pub fn get_child_ids(&self) -> Option<Vec<i64>> {
        self.related_ids(LinkKind::Child)
    }

    pub fn get_affect_ids(&self) -> Option<Vec<i64>> {
        self.related_ids(LinkKind::Affects)
    }

    /// Link this item to `dest` with one relation of `kind`.
    pub fn add_link(&mut self, kind: LinkKind, dest: &WorkItem) -> Result<bool> {
        debug!(source = self.id, dest = dest.id, rel = kind.rel(), "adding link");
        let relation = Relation::new(kind.rel(), dest.url());
        self.record.add_relations_raw(&[relation])
    }

    pub fn add_parent_link(&mut self, dest: &WorkItem) -> Result<bool> {
        self.add_link(LinkKind::Parent, dest)
    }

    pub fn add_child_link(&mut self, dest: &WorkItem) -> Result<bool> {
        self.add_link(LinkKind::Child, dest)
    }

    pub fn add_affect_link(&mut self, dest: &WorkItem) -> Result<bool> {
        self.add_link(LinkKind::Affects, dest)
    }

    pub fn add_affected_by_link(&mut self, dest: &WorkItem) -> Result<bool> {
        self.add_link(LinkKind::AffectedBy, dest)
    }

    /// Re-read the remote record. Identity fields keep their captured values.
    pub fn refresh(&mut self) -> Result<bool> {
        self.record.refresh()
    }

    pub fn snapshot(&self) -> WorkItemSnapshot {
        let data = self.record.data();
        WorkItemSnapshot {
            id: self.id,
            item_type: self.item_type.clone(),
            parent_id: self.parent_id,
            title: self.title().map(str::to_string),
            rev: data.rev,
            url: self.url(),
            fields: data.fields.clone(),
            relations: data.relations.clone(),
        }
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.item_type, self.id, self.title().unwrap_or_default())
    }
}

impl ToItemId for WorkItem {
    fn to_item_id(&self) -> Result<i64> {
        Ok(self.id)
    }
}
