//! In-memory emulation of the work-item REST API subset the client uses.
//!
//! Items live in a [`Store`] behind a `tokio` `RwLock`. Relation URLs are
//! rendered from the request's `Host` header, so links returned by a server
//! bound to a random port point back at that same server. Hierarchy and
//! affects links are stored on both ends, the way the real server records
//! the reverse link automatically.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tower_http::trace::TraceLayer;
use tracing::debug;
use uuid::Uuid;

pub const HIERARCHY_FORWARD: &str = "System.LinkTypes.Hierarchy-Forward";
pub const HIERARCHY_REVERSE: &str = "System.LinkTypes.Hierarchy-Reverse";
pub const AFFECTS_FORWARD: &str = "Microsoft.VSTS.Common.Affects-Forward";
pub const AFFECTS_REVERSE: &str = "Microsoft.VSTS.Common.Affects-Reverse";
pub const RELATED: &str = "System.LinkTypes.Related";

const DEFAULT_TYPES: &[&str] = &["Bug", "Epic", "Feature", "Task", "User Story"];

#[derive(Clone, Debug, PartialEq)]
struct StoredRelation {
    rel: String,
    target: i64,
    attributes: Map<String, Value>,
}

#[derive(Clone, Debug)]
struct StoredItem {
    id: i64,
    rev: i64,
    fields: Map<String, Value>,
    relations: Vec<StoredRelation>,
}

impl StoredItem {
    fn has_parent(&self) -> bool {
        self.relations.iter().any(|r| r.rel == HIERARCHY_REVERSE)
    }

    fn item_type(&self) -> Option<&str> {
        self.fields.get("System.WorkItemType").and_then(Value::as_str)
    }
}

#[derive(Clone, Debug)]
struct StoredQuery {
    id: Uuid,
    name: String,
    path: String,
    wiql: String,
}

/// Work items, stored queries and known work item types.
#[derive(Debug)]
pub struct Store {
    items: BTreeMap<i64, StoredItem>,
    queries: Vec<StoredQuery>,
    types: BTreeSet<String>,
    next_id: i64,
}

impl Default for Store {
    fn default() -> Self {
        Self {
            items: BTreeMap::new(),
            queries: Vec::new(),
            types: DEFAULT_TYPES.iter().map(|t| t.to_string()).collect(),
            next_id: 1,
        }
    }
}

impl Store {
    /// Seed an item with a type and title. Ids are handed out from 1.
    pub fn with_item(mut self, item_type: &str, title: &str) -> Self {
        let mut fields = Map::new();
        fields.insert("System.Title".into(), Value::String(title.into()));
        self.insert(item_type, fields);
        self
    }

    /// Seed a stored query reachable by `path` (e.g. `Shared Queries/Bugs`)
    /// or by its generated id.
    pub fn with_query(mut self, path: &str, wiql: &str) -> Self {
        let name = path.rsplit('/').next().unwrap_or(path).to_string();
        self.queries.push(StoredQuery {
            id: Uuid::new_v4(),
            name,
            path: path.trim_matches('/').to_string(),
            wiql: wiql.to_string(),
        });
        self
    }

    fn insert(&mut self, item_type: &str, mut fields: Map<String, Value>) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        fields.insert("System.Id".into(), json!(id));
        fields.insert("System.WorkItemType".into(), json!(item_type));
        fields.entry("System.State").or_insert_with(|| json!("New"));
        self.items.insert(
            id,
            StoredItem {
                id,
                rev: 1,
                fields,
                relations: Vec::new(),
            },
        );
        id
    }

    fn find_query(&self, path_or_id: &str) -> Option<&StoredQuery> {
        let wanted = path_or_id.trim_matches('/');
        self.queries.iter().find(|q| {
            q.path.eq_ignore_ascii_case(wanted) || q.id.to_string().eq_ignore_ascii_case(wanted)
        })
    }

    /// True when `path` is a folder holding at least one stored query.
    fn is_folder(&self, path: &str) -> bool {
        let prefix = format!("{}/", path.trim_matches('/').to_ascii_lowercase());
        prefix.len() > 1
            && self
                .queries
                .iter()
                .any(|q| q.path.to_ascii_lowercase().starts_with(&prefix))
    }

    /// Ids selected by a WIQL text, ascending.
    ///
    /// Understands a single `[System.WorkItemType] = '...'` condition; any
    /// other text selects every item.
    fn select(&self, wiql: &str) -> Vec<i64> {
        let wanted_type = type_condition(wiql);
        self.items
            .values()
            .filter(|item| match &wanted_type {
                Some(t) => item.item_type().is_some_and(|it| it.eq_ignore_ascii_case(t)),
                None => true,
            })
            .map(|item| item.id)
            .collect()
    }
}

/// Shared server state: the store plus the expected `Authorization` value.
#[derive(Clone, Default)]
pub struct MockState {
    store: Arc<RwLock<Store>>,
    authorization: Option<Arc<str>>,
}

impl MockState {
    pub fn new(store: Store) -> Self {
        Self {
            store: Arc::new(RwLock::new(store)),
            authorization: None,
        }
    }

    /// Require HTTP Basic credentials on every request.
    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        let token = STANDARD.encode(format!("{username}:{password}"));
        self.authorization = Some(format!("Basic {token}").into());
        self
    }
}

/// An open server with no seeded items and no authentication.
pub fn app() -> Router {
    router(MockState::default())
}

pub fn router(state: MockState) -> Router {
    Router::new()
        .route("/{collection}/_apis/wit/workitems", get(get_work_items))
        .route(
            "/{collection}/_apis/wit/workitems/{key}",
            get(get_work_item).patch(update_work_item).post(create_work_item),
        )
        .route("/{collection}/_apis/wit/queries/{*path}", get(get_query))
        .route("/{collection}/_apis/wit/wiql", post(run_wiql))
        .route("/{collection}/_apis/wit/wiql/{id}", get(run_stored_query))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(listener: TcpListener, state: MockState) -> Result<(), std::io::Error> {
    axum::serve(listener, router(state)).await
}

/// Error body in the server's `{ "message": ... }` shape.
#[derive(Debug)]
struct Failure {
    status: StatusCode,
    message: String,
}

fn failure(status: StatusCode, message: impl Into<String>) -> Failure {
    Failure {
        status,
        message: message.into(),
    }
}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "message": self.message }))).into_response()
    }
}

async fn require_auth(State(state): State<MockState>, request: Request, next: Next) -> Response {
    if let Some(expected) = &state.authorization {
        let given = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        if given != Some(expected.as_ref()) {
            return failure(StatusCode::UNAUTHORIZED, "authentication required").into_response();
        }
    }
    next.run(request).await
}

/// `http://{host}/{collection}/_apis/wit/workItems`, used for every rendered URL.
fn items_base(headers: &HeaderMap, collection: &str) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("http://{host}/{collection}/_apis/wit/workItems")
}

fn render(item: &StoredItem, base: &str) -> Value {
    let mut out = json!({
        "id": item.id,
        "rev": item.rev,
        "fields": item.fields,
        "url": format!("{base}/{}", item.id),
    });
    if !item.relations.is_empty() {
        let relations: Vec<Value> = item
            .relations
            .iter()
            .map(|r| {
                json!({
                    "rel": r.rel,
                    "url": format!("{base}/{}", r.target),
                    "attributes": r.attributes,
                })
            })
            .collect();
        out["relations"] = Value::Array(relations);
    }
    out
}

fn parse_id(key: &str) -> Result<i64, Failure> {
    key.parse()
        .map_err(|_| failure(StatusCode::BAD_REQUEST, format!("'{key}' is not a work item id")))
}

fn not_found(id: i64) -> Failure {
    failure(
        StatusCode::NOT_FOUND,
        format!("TF401232: Work item {id} does not exist."),
    )
}

async fn get_work_item(
    State(state): State<MockState>,
    Path((collection, key)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<Value>, Failure> {
    let id = parse_id(&key)?;
    let store = state.store.read().await;
    let item = store.items.get(&id).ok_or_else(|| not_found(id))?;
    Ok(Json(render(item, &items_base(&headers, &collection))))
}

#[derive(Deserialize)]
struct BatchParams {
    ids: String,
    #[serde(rename = "errorPolicy")]
    error_policy: Option<String>,
}

async fn get_work_items(
    State(state): State<MockState>,
    Path(collection): Path<String>,
    Query(params): Query<BatchParams>,
    headers: HeaderMap,
) -> Result<Json<Value>, Failure> {
    let ids = params
        .ids
        .split(',')
        .map(str::trim)
        .map(parse_id)
        .collect::<Result<Vec<_>, _>>()?;
    let omit = params
        .error_policy
        .is_some_and(|p| p.eq_ignore_ascii_case("omit"));
    let base = items_base(&headers, &collection);
    let store = state.store.read().await;

    let mut value = Vec::with_capacity(ids.len());
    for id in ids {
        match store.items.get(&id) {
            Some(item) => value.push(render(item, &base)),
            None if omit => value.push(Value::Null),
            None => return Err(not_found(id)),
        }
    }
    let count = value.iter().filter(|v| !v.is_null()).count();
    Ok(Json(json!({ "count": count, "value": value })))
}

#[derive(Debug, Deserialize)]
struct PatchOperation {
    op: String,
    path: String,
    #[serde(default)]
    value: Option<Value>,
}

enum Change {
    SetField(String, Value),
    RemoveField(String),
    AddRelation(StoredRelation),
}

fn reverse_rel(rel: &str) -> Option<&'static str> {
    match rel {
        HIERARCHY_FORWARD => Some(HIERARCHY_REVERSE),
        HIERARCHY_REVERSE => Some(HIERARCHY_FORWARD),
        AFFECTS_FORWARD => Some(AFFECTS_REVERSE),
        AFFECTS_REVERSE => Some(AFFECTS_FORWARD),
        RELATED => Some(RELATED),
        _ => None,
    }
}

/// Id after the `workItems` segment of a relation URL.
fn target_id(url: &str) -> Option<i64> {
    let mut segments = url.split('/');
    segments.find(|s| s.eq_ignore_ascii_case("workItems"))?;
    segments.next()?.parse().ok()
}

/// Validate every operation before any of them is applied.
fn plan(store: &Store, id: Option<i64>, ops: &[PatchOperation]) -> Result<Vec<Change>, Failure> {
    let current = id.and_then(|id| store.items.get(&id));
    let mut gains_parent = current.is_some_and(StoredItem::has_parent);
    let mut changes = Vec::with_capacity(ops.len());

    for op in ops {
        if let Some(name) = op.path.strip_prefix("/fields/") {
            match op.op.as_str() {
                "add" | "replace" => {
                    let value = op.value.clone().unwrap_or(Value::Null);
                    changes.push(Change::SetField(name.to_string(), value));
                }
                "remove" => changes.push(Change::RemoveField(name.to_string())),
                other => {
                    return Err(failure(StatusCode::BAD_REQUEST, format!("unsupported op '{other}'")))
                }
            }
            continue;
        }
        if op.path != "/relations/-" || op.op != "add" {
            return Err(failure(
                StatusCode::BAD_REQUEST,
                format!("unsupported operation {} {}", op.op, op.path),
            ));
        }
        let value = op.value.as_ref().and_then(Value::as_object).ok_or_else(|| {
            failure(StatusCode::BAD_REQUEST, "relation value must be an object")
        })?;
        let rel = value.get("rel").and_then(Value::as_str).unwrap_or_default();
        let url = value.get("url").and_then(Value::as_str).unwrap_or_default();
        if rel.is_empty() {
            return Err(failure(StatusCode::BAD_REQUEST, "relation has no type"));
        }
        let target = target_id(url)
            .ok_or_else(|| failure(StatusCode::BAD_REQUEST, format!("'{url}' is not a work item url")))?;
        let target_item = store.items.get(&target).ok_or_else(|| not_found(target))?;
        if Some(target) == id {
            return Err(failure(StatusCode::BAD_REQUEST, "a work item cannot link to itself"));
        }
        if rel == HIERARCHY_REVERSE {
            let duplicate = current.is_some_and(|c| {
                c.relations.iter().any(|r| r.rel == rel && r.target == target)
            });
            if gains_parent && !duplicate {
                return Err(failure(StatusCode::BAD_REQUEST, "work item already has a parent"));
            }
            gains_parent = true;
        }
        if rel == HIERARCHY_FORWARD
            && target_item
                .relations
                .iter()
                .any(|r| r.rel == HIERARCHY_REVERSE && Some(r.target) != id)
        {
            return Err(failure(
                StatusCode::BAD_REQUEST,
                format!("work item {target} already has a parent"),
            ));
        }
        let attributes = value
            .get("attributes")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        changes.push(Change::AddRelation(StoredRelation {
            rel: rel.to_string(),
            target,
            attributes,
        }));
    }
    Ok(changes)
}

fn push_relation(item: &mut StoredItem, relation: StoredRelation) -> bool {
    let exists = item
        .relations
        .iter()
        .any(|r| r.rel == relation.rel && r.target == relation.target);
    if !exists {
        item.relations.push(relation);
    }
    !exists
}

fn commit(store: &mut Store, id: i64, changes: Vec<Change>) {
    let mut reverse_links = Vec::new();
    if let Some(item) = store.items.get_mut(&id) {
        for change in changes {
            match change {
                Change::SetField(name, value) => {
                    item.fields.insert(name, value);
                }
                Change::RemoveField(name) => {
                    item.fields.remove(&name);
                }
                Change::AddRelation(relation) => {
                    if let Some(reverse) = reverse_rel(&relation.rel) {
                        reverse_links.push((relation.target, reverse));
                    }
                    push_relation(item, relation);
                }
            }
        }
        item.rev += 1;
    }
    for (target, rel) in reverse_links {
        if let Some(other) = store.items.get_mut(&target) {
            let added = push_relation(
                other,
                StoredRelation {
                    rel: rel.to_string(),
                    target: id,
                    attributes: Map::new(),
                },
            );
            if added {
                other.rev += 1;
            }
        }
    }
}

async fn update_work_item(
    State(state): State<MockState>,
    Path((collection, key)): Path<(String, String)>,
    headers: HeaderMap,
    Json(ops): Json<Vec<PatchOperation>>,
) -> Result<Json<Value>, Failure> {
    let id = parse_id(&key)?;
    let mut store = state.store.write().await;
    if !store.items.contains_key(&id) {
        return Err(not_found(id));
    }
    let changes = plan(&store, Some(id), &ops)?;
    commit(&mut store, id, changes);
    debug!(id, ops = ops.len(), "updated work item");
    let item = store.items.get(&id).ok_or_else(|| not_found(id))?;
    Ok(Json(render(item, &items_base(&headers, &collection))))
}

async fn create_work_item(
    State(state): State<MockState>,
    Path((collection, key)): Path<(String, String)>,
    headers: HeaderMap,
    Json(ops): Json<Vec<PatchOperation>>,
) -> Result<Json<Value>, Failure> {
    let item_type = key.strip_prefix('$').ok_or_else(|| {
        failure(StatusCode::METHOD_NOT_ALLOWED, "POST needs a $Type segment")
    })?;
    let mut store = state.store.write().await;
    let Some(item_type) = store
        .types
        .iter()
        .find(|t| t.eq_ignore_ascii_case(item_type))
        .cloned()
    else {
        return Err(failure(
            StatusCode::NOT_FOUND,
            format!("TF51535: Cannot find work item type '{item_type}'."),
        ));
    };

    let changes = plan(&store, None, &ops)?;
    let has_title = changes.iter().any(|c| {
        matches!(c, Change::SetField(name, Value::String(t)) if name == "System.Title" && !t.trim().is_empty())
    });
    if !has_title {
        return Err(failure(
            StatusCode::BAD_REQUEST,
            "TF401320: Rule Error for field Title. Error code: Required.",
        ));
    }

    let id = store.insert(&item_type, Map::new());
    commit(&mut store, id, changes);
    if let Some(item) = store.items.get_mut(&id) {
        item.rev = 1;
    }
    debug!(id, item_type = %item_type, "created work item");
    let item = store.items.get(&id).ok_or_else(|| not_found(id))?;
    Ok(Json(render(item, &items_base(&headers, &collection))))
}

async fn get_query(
    State(state): State<MockState>,
    Path((_collection, path)): Path<(String, String)>,
) -> Result<Json<Value>, Failure> {
    let store = state.store.read().await;
    if store.is_folder(&path) {
        let name = path.trim_matches('/').rsplit('/').next().unwrap_or_default();
        return Ok(Json(json!({
            "id": Uuid::new_v4(),
            "name": name,
            "path": path.trim_matches('/'),
            "isFolder": true,
        })));
    }
    let query = store.find_query(&path).ok_or_else(|| {
        failure(
            StatusCode::NOT_FOUND,
            format!("TF401243: The query {path} does not exist."),
        )
    })?;
    Ok(Json(json!({
        "id": query.id,
        "name": query.name,
        "path": query.path,
        "wiql": query.wiql,
        "isFolder": false,
    })))
}

fn wiql_result(ids: &[i64], base: &str) -> Value {
    let items: Vec<Value> = ids
        .iter()
        .map(|id| json!({ "id": id, "url": format!("{base}/{id}") }))
        .collect();
    json!({ "queryType": "flat", "workItems": items })
}

/// `[System.WorkItemType] = 'Bug'` → `Some("Bug")`.
fn type_condition(wiql: &str) -> Option<String> {
    let lower = wiql.to_ascii_lowercase();
    let at = lower.find("[system.workitemtype]")? + "[system.workitemtype]".len();
    let rest = wiql[at..].trim_start().strip_prefix('=')?.trim_start();
    let rest = rest.strip_prefix('\'')?;
    let end = rest.find('\'')?;
    Some(rest[..end].to_string())
}

#[derive(Deserialize)]
struct WiqlBody {
    query: String,
}

async fn run_wiql(
    State(state): State<MockState>,
    Path(collection): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<WiqlBody>,
) -> Result<Json<Value>, Failure> {
    if body.query.trim().is_empty() {
        return Err(failure(StatusCode::BAD_REQUEST, "query text is empty"));
    }
    let top = match params.get("$top") {
        Some(raw) => Some(raw.parse::<usize>().map_err(|_| {
            failure(StatusCode::BAD_REQUEST, format!("'{raw}' is not a valid $top"))
        })?),
        None => None,
    };
    let store = state.store.read().await;
    let mut ids = store.select(&body.query);
    if let Some(top) = top {
        ids.truncate(top);
    }
    Ok(Json(wiql_result(&ids, &items_base(&headers, &collection))))
}

async fn run_stored_query(
    State(state): State<MockState>,
    Path((collection, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<Value>, Failure> {
    let store = state.store.read().await;
    let query = store
        .queries
        .iter()
        .find(|q| q.id.to_string().eq_ignore_ascii_case(&id))
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, format!("query {id} does not exist")))?;
    let ids = store.select(&query.wiql);
    Ok(Json(wiql_result(&ids, &items_base(&headers, &collection))))
}
