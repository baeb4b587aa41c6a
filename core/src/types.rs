//! Wire DTOs for the work-item tracking REST API.
//!
//! # Design
//! Field values stay as `serde_json::Value`: the remote schema decides whether
//! a field is a string, number, date or identity, and this layer does not
//! second-guess it. The mock server defines its own copies of these shapes;
//! integration tests catch drift between the two.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Named field store of a work item, keyed by reference name
/// (`System.Title`, `Microsoft.VSTS.Common.Priority`, ...).
pub type FieldMap = serde_json::Map<String, Value>;

/// A work item as returned by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkItemRecord {
    pub id: i64,
    #[serde(default)]
    pub rev: i64,
    #[serde(default)]
    pub fields: FieldMap,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relations: Vec<Relation>,
    #[serde(default)]
    pub url: String,
}

/// A typed, directed link from one work item to another resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Relation {
    pub rel: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "FieldMap::is_empty")]
    pub attributes: FieldMap,
}

impl Relation {
    pub fn new(rel: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            rel: rel.into(),
            url: url.into(),
            attributes: FieldMap::new(),
        }
    }
}

/// Envelope of a batch fetch. Entries are `null` for ids the server omitted.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkItemBatch {
    #[serde(default)]
    pub count: usize,
    pub value: Vec<Option<WorkItemRecord>>,
}

/// JSON-Patch operation kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Add,
}

/// One JSON-Patch operation against a work item document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatchOperation {
    pub op: PatchOp,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl PatchOperation {
    /// Set (or overwrite) a field by reference name.
    pub fn set_field(name: &str, value: Value) -> Self {
        Self {
            op: PatchOp::Add,
            path: format!("/fields/{name}"),
            value: Some(value),
        }
    }

    /// Append a relation to the document.
    pub fn add_relation(relation: &Relation) -> Self {
        Self {
            op: PatchOp::Add,
            path: "/relations/-".to_string(),
            value: serde_json::to_value(relation).ok(),
        }
    }
}

/// A stored query (or query folder) definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryDefinition {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub wiql: Option<String>,
    #[serde(default, rename = "isFolder")]
    pub is_folder: bool,
}

/// Request body for an ad-hoc WIQL query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WiqlQuery {
    pub query: String,
}

/// Reference to a work item inside a query result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkItemReference {
    pub id: i64,
    #[serde(default)]
    pub url: String,
}

/// One edge of a link (tree / one-hop) query result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkItemLink {
    #[serde(default)]
    pub source: Option<WorkItemReference>,
    #[serde(default)]
    pub target: Option<WorkItemReference>,
    #[serde(default)]
    pub rel: Option<String>,
}

/// Result of running a stored query or ad-hoc WIQL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WiqlResult {
    #[serde(default, rename = "queryType")]
    pub query_type: Option<String>,
    #[serde(default, rename = "workItems")]
    pub work_items: Option<Vec<WorkItemReference>>,
    #[serde(default, rename = "workItemRelations")]
    pub work_item_relations: Option<Vec<WorkItemLink>>,
}

impl WiqlResult {
    /// Ids selected by the query, in server order.
    ///
    /// Flat queries list them under `workItems`; link queries only carry
    /// `workItemRelations`, whose targets are deduplicated. `None` when the
    /// response carries neither.
    pub fn item_ids(&self) -> Option<Vec<i64>> {
        if let Some(items) = &self.work_items {
            return Some(items.iter().map(|r| r.id).collect());
        }
        let links = self.work_item_relations.as_ref()?;
        let mut ids: Vec<i64> = Vec::with_capacity(links.len());
        for target in links.iter().filter_map(|l| l.target.as_ref()) {
            if !ids.contains(&target.id) {
                ids.push(target.id);
            }
        }
        Some(ids)
    }
}
