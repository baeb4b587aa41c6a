//! C-ABI wrapper around `tfs-core`.
//!
//! # Overview
//! Exposes the connection and work-item façades through `extern "C"`
//! functions. List and map arguments cross the boundary as JSON text;
//! results come back in a single `FfiTfsResult` envelope whose payload is
//! JSON as well (work items as snapshots, id lists as arrays, `null` for
//! "nothing found").
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - JSON arguments are shape-checked with the core `*_arg` helpers, so a
//!   wrong shape is reported as `InvalidArgument` before any request is made.
//! - The C caller owns all returned pointers and must call the matching
//!   `tfs_free_*` function to release them.

pub mod types;

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};

use serde_json::Value;
use tfs_core::args::{coerce_ids, list_arg, map_arg, params_arg};
use tfs_core::{
    ApiError, CopyOptions, Credentials, LinkKind, ServiceConfig, ServiceError, TfsService,
    WorkItem, WorkItemSnapshot,
};

use types::*;

/// `kind` values accepted by `tfs_add_link`.
pub const TFS_LINK_PARENT: u32 = 0;
pub const TFS_LINK_CHILD: u32 = 1;
pub const TFS_LINK_AFFECTS: u32 = 2;
pub const TFS_LINK_AFFECTED_BY: u32 = 3;

// ---------------------------------------------------------------------------
// Argument helpers
// ---------------------------------------------------------------------------

/// Borrow a C string as UTF-8. `None` for null or invalid UTF-8.
fn c_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().ok()
}

/// Borrow a non-null C string argument, rejecting invalid UTF-8.
fn text_arg<'a>(ptr: *const c_char, name: &str) -> Result<&'a str, ServiceError> {
    c_str(ptr).ok_or_else(|| ServiceError::InvalidArgument(format!("{name} is not valid UTF-8")))
}

/// Parse a required JSON argument.
fn json_arg(ptr: *const c_char, name: &str) -> Result<Value, ServiceError> {
    let text = text_arg(ptr, name)?;
    serde_json::from_str(text)
        .map_err(|e| ServiceError::InvalidArgument(format!("{name} is not valid JSON: {e}")))
}

/// Parse an optional JSON argument; null pointers and JSON `null` are absent.
fn optional_json_arg(ptr: *const c_char, name: &str) -> Result<Option<Value>, ServiceError> {
    if ptr.is_null() {
        return Ok(None);
    }
    match json_arg(ptr, name)? {
        Value::Null => Ok(None),
        value => Ok(Some(value)),
    }
}

fn link_kind(kind: u32) -> Result<LinkKind, ServiceError> {
    match kind {
        TFS_LINK_PARENT => Ok(LinkKind::Parent),
        TFS_LINK_CHILD => Ok(LinkKind::Child),
        TFS_LINK_AFFECTS => Ok(LinkKind::Affects),
        TFS_LINK_AFFECTED_BY => Ok(LinkKind::AffectedBy),
        other => Err(ServiceError::InvalidArgument(format!("unknown link kind {other}"))),
    }
}

fn snapshots(items: Option<Vec<WorkItem>>) -> Option<Vec<WorkItemSnapshot>> {
    items.map(|items| items.iter().map(WorkItem::snapshot).collect())
}

/// Fetch an item that must exist.
fn require_item(service: &TfsService, id: i64) -> Result<WorkItem, ServiceError> {
    service
        .get_work_item(id)?
        .ok_or(ServiceError::Api(ApiError::NotFound))
}

/// Run `op` against a non-null service handle inside `catch_unwind`.
fn with_service<F>(service: *const FfiTfsService, name: &str, op: F) -> *mut FfiTfsResult
where
    F: FnOnce(&TfsService) -> *mut FfiTfsResult,
{
    catch_unwind(AssertUnwindSafe(|| {
        if service.is_null() {
            return FfiTfsResult::null_arg("service");
        }
        let service = unsafe { &*service };
        op(&service.inner)
    }))
    .unwrap_or_else(|_| FfiTfsResult::panic(&format!("panic in {name}")))
}

/// Like `with_service`, but a disconnected service fails with
/// `NotConnected` before `op` looks at any other argument.
fn with_connected<F>(service: *const FfiTfsService, name: &str, op: F) -> *mut FfiTfsResult
where
    F: FnOnce(&TfsService) -> *mut FfiTfsResult,
{
    with_service(service, name, |svc| {
        if !svc.is_connected() {
            return FfiTfsResult::from_error(ServiceError::NotConnected);
        }
        op(svc)
    })
}

// ---------------------------------------------------------------------------
// Service lifecycle
// ---------------------------------------------------------------------------

/// Create a disconnected service for `server`.
///
/// `collection` may be null for `DefaultCollection`. Returns null if
/// `server` is null or not UTF-8, or if an internal panic occurs.
/// The caller must free the returned pointer with `tfs_service_free`.
#[unsafe(no_mangle)]
pub extern "C" fn tfs_service_new(
    server: *const c_char,
    collection: *const c_char,
) -> *mut FfiTfsService {
    catch_unwind(|| {
        let Some(server) = c_str(server) else {
            return std::ptr::null_mut();
        };
        let mut config = ServiceConfig::new(server);
        if let Some(collection) = c_str(collection) {
            config = config.with_collection(collection);
        }
        let inner = TfsService::new(config);
        Box::into_raw(Box::new(FfiTfsService { inner }))
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Free a service created by `tfs_service_new`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn tfs_service_free(service: *mut FfiTfsService) {
    if !service.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            drop(unsafe { Box::from_raw(service) });
        }));
    }
}

/// Authenticate and probe `probe_item_id`. True iff the probe succeeded.
///
/// Null `service` or `username` returns false; a null `password` is empty.
#[unsafe(no_mangle)]
pub extern "C" fn tfs_service_connect(
    service: *mut FfiTfsService,
    username: *const c_char,
    password: *const c_char,
    probe_item_id: i64,
) -> bool {
    catch_unwind(AssertUnwindSafe(|| {
        if service.is_null() {
            return false;
        }
        let Some(username) = c_str(username) else {
            return false;
        };
        let credentials = Credentials::new(username, c_str(password).unwrap_or_default());
        let service = unsafe { &mut *service };
        service.inner.connect(&credentials, probe_item_id)
    }))
    .unwrap_or(false)
}

#[unsafe(no_mangle)]
pub extern "C" fn tfs_service_is_connected(service: *const FfiTfsService) -> bool {
    if service.is_null() {
        return false;
    }
    catch_unwind(AssertUnwindSafe(|| unsafe { &*service }.inner.is_connected())).unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Work items
// ---------------------------------------------------------------------------

/// Fetch one work item. Payload: snapshot object, or `null` if absent.
#[unsafe(no_mangle)]
pub extern "C" fn tfs_get_work_item(service: *const FfiTfsService, id: i64) -> *mut FfiTfsResult {
    with_connected(service, "tfs_get_work_item", |svc| {
        FfiTfsResult::from_outcome(svc.get_work_item(id).map(|item| item.map(|w| w.snapshot())))
    })
}

/// Fetch several work items. `ids_json` is a JSON array of ids (numbers or
/// numeric strings). Payload: array of snapshots, or `null`.
#[unsafe(no_mangle)]
pub extern "C" fn tfs_get_work_items(
    service: *const FfiTfsService,
    ids_json: *const c_char,
) -> *mut FfiTfsResult {
    with_connected(service, "tfs_get_work_items", |svc| {
        if ids_json.is_null() {
            return FfiTfsResult::null_arg("ids_json");
        }
        let outcome = (|| -> Result<_, ServiceError> {
            let value = json_arg(ids_json, "item_ids")?;
            let ids = coerce_ids(list_arg(&value, "item_ids")?)?;
            svc.get_work_items(ids).map(snapshots)
        })();
        FfiTfsResult::from_outcome(outcome)
    })
}

/// Write each field in `fields_json` (a JSON object). Payload: bool.
#[unsafe(no_mangle)]
pub extern "C" fn tfs_save_fields(
    service: *const FfiTfsService,
    id: i64,
    fields_json: *const c_char,
) -> *mut FfiTfsResult {
    with_connected(service, "tfs_save_fields", |svc| {
        if fields_json.is_null() {
            return FfiTfsResult::null_arg("fields_json");
        }
        let outcome = (|| -> Result<_, ServiceError> {
            let fields = map_arg(&json_arg(fields_json, "fields")?, "fields")?;
            svc.save_fields(id, &fields)
        })();
        FfiTfsResult::from_outcome(outcome)
    })
}

/// Create a work item. `optional_json` may be null.
/// Payload: snapshot, or `null` for an unknown type.
#[unsafe(no_mangle)]
pub extern "C" fn tfs_create_work_item(
    service: *const FfiTfsService,
    item_type: *const c_char,
    required_json: *const c_char,
    optional_json: *const c_char,
) -> *mut FfiTfsResult {
    with_connected(service, "tfs_create_work_item", |svc| {
        if item_type.is_null() {
            return FfiTfsResult::null_arg("item_type");
        }
        if required_json.is_null() {
            return FfiTfsResult::null_arg("required_json");
        }
        let outcome = (|| -> Result<_, ServiceError> {
            let item_type = text_arg(item_type, "item_type")?;
            let required = map_arg(&json_arg(required_json, "required_fields")?, "required_fields")?;
            let optional = optional_json_arg(optional_json, "props")?
                .map(|v| map_arg(&v, "props"))
                .transpose()?;
            svc.create_work_item(item_type, &required, optional.as_ref())
                .map(|item| item.map(|w| w.snapshot()))
        })();
        FfiTfsResult::from_outcome(outcome)
    })
}

/// Copy work item `source_id`. `props_json` may be null.
/// Payload: snapshot of the copy.
#[unsafe(no_mangle)]
pub extern "C" fn tfs_copy_work_item(
    service: *const FfiTfsService,
    source_id: i64,
    with_links_and_attachments: bool,
    suppress_notifications: bool,
    props_json: *const c_char,
) -> *mut FfiTfsResult {
    with_connected(service, "tfs_copy_work_item", |svc| {
        let outcome = (|| -> Result<_, ServiceError> {
            let props = optional_json_arg(props_json, "props")?
                .map(|v| map_arg(&v, "props"))
                .transpose()?;
            let options = CopyOptions {
                with_links_and_attachments,
                suppress_notifications,
            };
            svc.copy_work_item(source_id, options, props.as_ref())
                .map(|item| item.map(|w| w.snapshot()))
        })();
        FfiTfsResult::from_outcome(outcome)
    })
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Run a stored query by path or GUID. Payload: array of snapshots, or
/// `null` when no such query exists.
#[unsafe(no_mangle)]
pub extern "C" fn tfs_run_query(
    service: *const FfiTfsService,
    query: *const c_char,
) -> *mut FfiTfsResult {
    with_connected(service, "tfs_run_query", |svc| {
        if query.is_null() {
            return FfiTfsResult::null_arg("query");
        }
        let outcome = text_arg(query, "query").and_then(|query| svc.run_query(query));
        FfiTfsResult::from_outcome(outcome.map(snapshots))
    })
}

/// Run ad-hoc WIQL. `params_json` (a JSON object of scalars) may be null.
#[unsafe(no_mangle)]
pub extern "C" fn tfs_run_wiql(
    service: *const FfiTfsService,
    wiql: *const c_char,
    params_json: *const c_char,
) -> *mut FfiTfsResult {
    with_connected(service, "tfs_run_wiql", |svc| {
        if wiql.is_null() {
            return FfiTfsResult::null_arg("wiql");
        }
        let outcome = (|| -> Result<_, ServiceError> {
            let wiql = text_arg(wiql, "wiql")?;
            let params = optional_json_arg(params_json, "uri_params")?
                .map(|v| params_arg(&v, "uri_params"))
                .transpose()?;
            svc.run_wiql(wiql, params.as_ref()).map(snapshots)
        })();
        FfiTfsResult::from_outcome(outcome)
    })
}

// ---------------------------------------------------------------------------
// Links
// ---------------------------------------------------------------------------

/// Link `source_id` to `dest_id` with a `TFS_LINK_*` kind. Payload: bool.
#[unsafe(no_mangle)]
pub extern "C" fn tfs_add_link(
    service: *const FfiTfsService,
    kind: u32,
    source_id: i64,
    dest_id: i64,
) -> *mut FfiTfsResult {
    with_connected(service, "tfs_add_link", |svc| {
        let outcome = (|| -> Result<_, ServiceError> {
            let kind = link_kind(kind)?;
            let mut source = require_item(svc, source_id)?;
            let dest = require_item(svc, dest_id)?;
            svc.add_link(kind, &mut source, &dest)
        })();
        FfiTfsResult::from_outcome(outcome)
    })
}

/// Child ids of `id`. Payload: array of ids, or `null` when it has none.
#[unsafe(no_mangle)]
pub extern "C" fn tfs_get_child_ids(service: *const FfiTfsService, id: i64) -> *mut FfiTfsResult {
    with_connected(service, "tfs_get_child_ids", |svc| {
        FfiTfsResult::from_outcome(require_item(svc, id).map(|w| w.get_child_ids()))
    })
}

/// Ids `id` affects. Payload: array of ids, or `null` when it has none.
#[unsafe(no_mangle)]
pub extern "C" fn tfs_get_affect_ids(service: *const FfiTfsService, id: i64) -> *mut FfiTfsResult {
    with_connected(service, "tfs_get_affect_ids", |svc| {
        FfiTfsResult::from_outcome(require_item(svc, id).map(|w| w.get_affect_ids()))
    })
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Free an `FfiTfsResult` returned by any operation. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn tfs_free_result(result: *mut FfiTfsResult) {
    if result.is_null() {
        return;
    }
    let _ = catch_unwind(|| {
        let result = unsafe { Box::from_raw(result) };
        tfs_free_string(result.error_message);
        tfs_free_string(result.json);
    });
}

/// Free a C string allocated by this library. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn tfs_free_string(s: *mut c_char) {
    if !s.is_null() {
        let _ = catch_unwind(|| {
            drop(unsafe { CString::from_raw(s) });
        });
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    use mock_server::{MockState, Store};

    /// Serve a seeded store on a random port from a background thread.
    fn start_server() -> SocketAddr {
        let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = std_listener.local_addr().unwrap();
        std_listener.set_nonblocking(true).unwrap();
        let store = Store::default()
            .with_item("Feature", "Parent")
            .with_item("Task", "Child")
            .with_item("Bug", "Defect");

        std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async {
                let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
                mock_server::run(listener, MockState::new(store)).await
            })
            .unwrap();
        });
        addr
    }

    fn new_service(server: &str) -> *mut FfiTfsService {
        let server = CString::new(server).unwrap();
        let service = tfs_service_new(server.as_ptr(), std::ptr::null());
        assert!(!service.is_null());
        service
    }

    fn connected_service() -> *mut FfiTfsService {
        let service = new_service(&format!("http://{}", start_server()));
        let user = CString::new("user").unwrap();
        assert!(tfs_service_connect(service, user.as_ptr(), std::ptr::null(), 1));
        service
    }

    /// Take the payload out of a result, asserting success.
    fn payload(result: *mut FfiTfsResult) -> Value {
        assert!(!result.is_null());
        let r = unsafe { &*result };
        assert_eq!(r.error_code, FfiErrorCode::Ok, "{}", message(r));
        let json = unsafe { CStr::from_ptr(r.json) }.to_str().unwrap();
        let value = serde_json::from_str(json).unwrap();
        tfs_free_result(result);
        value
    }

    fn message(r: &FfiTfsResult) -> String {
        if r.error_message.is_null() {
            return String::new();
        }
        unsafe { CStr::from_ptr(r.error_message) }.to_str().unwrap().to_string()
    }

    fn error_code(result: *mut FfiTfsResult) -> FfiErrorCode {
        assert!(!result.is_null());
        let r = unsafe { &*result };
        assert!(r.json.is_null());
        assert!(!r.error_message.is_null());
        let code = r.error_code;
        tfs_free_result(result);
        code
    }

    #[test]
    fn service_new_and_free() {
        let service = new_service("http://localhost:8080/tfs");
        assert!(!tfs_service_is_connected(service));
        tfs_service_free(service);
    }

    #[test]
    fn service_new_null_returns_null() {
        assert!(tfs_service_new(std::ptr::null(), std::ptr::null()).is_null());
    }

    #[test]
    fn free_null_is_safe() {
        tfs_service_free(std::ptr::null_mut());
        tfs_free_result(std::ptr::null_mut());
        tfs_free_string(std::ptr::null_mut());
    }

    #[test]
    fn null_service_returns_null_arg() {
        assert_eq!(error_code(tfs_get_work_item(std::ptr::null(), 1)), FfiErrorCode::NullArg);
        assert!(!tfs_service_is_connected(std::ptr::null()));
    }

    #[test]
    fn disconnected_operations_report_not_connected() {
        let service = new_service("http://localhost:8080/tfs");
        let ids = CString::new("not even json").unwrap();
        let wiql = CString::new("SELECT [System.Id] FROM WorkItems").unwrap();

        assert_eq!(error_code(tfs_get_work_item(service, 1)), FfiErrorCode::NotConnected);
        assert_eq!(error_code(tfs_get_work_items(service, ids.as_ptr())), FfiErrorCode::NotConnected);
        assert_eq!(error_code(tfs_run_wiql(service, wiql.as_ptr(), std::ptr::null())), FfiErrorCode::NotConnected);
        assert_eq!(error_code(tfs_add_link(service, TFS_LINK_CHILD, 1, 2)), FfiErrorCode::NotConnected);
        assert_eq!(
            error_code(tfs_copy_work_item(service, 1, true, true, std::ptr::null())),
            FfiErrorCode::NotConnected
        );
        tfs_service_free(service);
    }

    #[test]
    fn disconnected_wins_over_null_arguments() {
        let service = new_service("http://localhost:8080/tfs");
        let null = std::ptr::null();

        assert_eq!(error_code(tfs_get_work_items(service, null)), FfiErrorCode::NotConnected);
        assert_eq!(error_code(tfs_save_fields(service, 1, null)), FfiErrorCode::NotConnected);
        assert_eq!(error_code(tfs_create_work_item(service, null, null, null)), FfiErrorCode::NotConnected);
        assert_eq!(error_code(tfs_run_query(service, null)), FfiErrorCode::NotConnected);
        assert_eq!(error_code(tfs_run_wiql(service, null, null)), FfiErrorCode::NotConnected);
        assert_eq!(error_code(tfs_get_child_ids(service, 1)), FfiErrorCode::NotConnected);
        tfs_service_free(service);
    }

    #[test]
    fn connect_to_unreachable_server_is_false() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let service = new_service(&format!("http://{addr}"));
        let user = CString::new("user").unwrap();
        assert!(!tfs_service_connect(service, user.as_ptr(), std::ptr::null(), 1));
        assert!(!tfs_service_is_connected(service));
        tfs_service_free(service);
    }

    #[test]
    fn get_work_item_returns_snapshot_or_null() {
        let service = connected_service();
        let item = payload(tfs_get_work_item(service, 2));
        assert_eq!(item["id"], 2);
        assert_eq!(item["item_type"], "Task");
        assert_eq!(item["title"], "Child");
        assert!(item["parent_id"].is_null());

        assert!(payload(tfs_get_work_item(service, 999)).is_null());
        tfs_service_free(service);
    }

    #[test]
    fn get_work_items_checks_shape() {
        let service = connected_service();
        let not_list = CString::new(r#"{"id": 1}"#).unwrap();
        let bad_id = CString::new(r#"[1, "two"]"#).unwrap();
        let good = CString::new(r#"[3, "1"]"#).unwrap();

        assert_eq!(error_code(tfs_get_work_items(service, not_list.as_ptr())), FfiErrorCode::InvalidArgument);
        assert_eq!(error_code(tfs_get_work_items(service, bad_id.as_ptr())), FfiErrorCode::InvalidArgument);

        let items = payload(tfs_get_work_items(service, good.as_ptr()));
        let ids: Vec<i64> = items.as_array().unwrap().iter().map(|i| i["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![3, 1]);
        tfs_service_free(service);
    }

    #[test]
    fn create_then_save_fields() {
        let service = connected_service();
        let item_type = CString::new("Bug").unwrap();
        let required = CString::new(r#"{"Title": "X"}"#).unwrap();
        let not_map = CString::new("[1]").unwrap();

        assert_eq!(
            error_code(tfs_create_work_item(service, item_type.as_ptr(), not_map.as_ptr(), std::ptr::null())),
            FfiErrorCode::InvalidArgument
        );

        let created = payload(tfs_create_work_item(service, item_type.as_ptr(), required.as_ptr(), std::ptr::null()));
        assert_eq!(created["title"], "X");
        let id = created["id"].as_i64().unwrap();

        let fields = CString::new(r#"{"Title": "Y"}"#).unwrap();
        assert_eq!(payload(tfs_save_fields(service, id, fields.as_ptr())), Value::Bool(true));
        assert_eq!(payload(tfs_get_work_item(service, id))["title"], "Y");
        tfs_service_free(service);
    }

    #[test]
    fn link_and_read_child_ids() {
        let service = connected_service();
        assert!(payload(tfs_get_child_ids(service, 1)).is_null());
        assert_eq!(payload(tfs_add_link(service, TFS_LINK_CHILD, 1, 2)), Value::Bool(true));
        assert_eq!(payload(tfs_get_child_ids(service, 1)), serde_json::json!([2]));
        assert_eq!(payload(tfs_get_work_item(service, 2))["parent_id"], 1);

        assert_eq!(payload(tfs_add_link(service, TFS_LINK_AFFECTS, 3, 1)), Value::Bool(true));
        assert_eq!(payload(tfs_get_affect_ids(service, 3)), serde_json::json!([1]));

        assert_eq!(error_code(tfs_add_link(service, 9, 1, 2)), FfiErrorCode::InvalidArgument);
        assert_eq!(error_code(tfs_add_link(service, TFS_LINK_CHILD, 1, 999)), FfiErrorCode::NotFound);
        tfs_service_free(service);
    }

    #[test]
    fn copy_missing_source_reports_source_not_found() {
        let service = connected_service();
        assert_eq!(
            error_code(tfs_copy_work_item(service, 999, true, true, std::ptr::null())),
            FfiErrorCode::SourceNotFound
        );
        let props = CString::new(r#"{"Title": "Copied"}"#).unwrap();
        let copy = payload(tfs_copy_work_item(service, 3, true, true, props.as_ptr()));
        assert_eq!(copy["item_type"], "Bug");
        assert_eq!(copy["title"], "Copied");
        tfs_service_free(service);
    }

    #[test]
    fn map_arguments_reject_lists() {
        let service = connected_service();
        let not_map = CString::new("[1]").unwrap();
        let wiql = CString::new("SELECT [System.Id] FROM WorkItems").unwrap();

        assert_eq!(error_code(tfs_save_fields(service, 1, not_map.as_ptr())), FfiErrorCode::InvalidArgument);
        assert_eq!(
            error_code(tfs_copy_work_item(service, 3, true, true, not_map.as_ptr())),
            FfiErrorCode::InvalidArgument
        );
        assert_eq!(
            error_code(tfs_run_wiql(service, wiql.as_ptr(), not_map.as_ptr())),
            FfiErrorCode::InvalidArgument
        );
        tfs_service_free(service);
    }

    #[test]
    fn query_text_null_or_not_utf8() {
        let service = connected_service();
        let garbled = CString::new(vec![0x53, 0xff, 0xfe]).unwrap();

        assert_eq!(error_code(tfs_run_query(service, std::ptr::null())), FfiErrorCode::NullArg);
        assert_eq!(error_code(tfs_run_wiql(service, std::ptr::null(), std::ptr::null())), FfiErrorCode::NullArg);
        assert_eq!(error_code(tfs_run_query(service, garbled.as_ptr())), FfiErrorCode::InvalidArgument);
        assert_eq!(
            error_code(tfs_run_wiql(service, garbled.as_ptr(), std::ptr::null())),
            FfiErrorCode::InvalidArgument
        );
        tfs_service_free(service);
    }

    #[test]
    fn wiql_params_must_be_scalars() {
        let service = connected_service();
        let wiql = CString::new("SELECT [System.Id] FROM WorkItems").unwrap();
        let nested = CString::new(r#"{"$top": [1]}"#).unwrap();
        let top = CString::new(r#"{"$top": 1}"#).unwrap();

        assert_eq!(error_code(tfs_run_wiql(service, wiql.as_ptr(), nested.as_ptr())), FfiErrorCode::InvalidArgument);
        let items = payload(tfs_run_wiql(service, wiql.as_ptr(), top.as_ptr()));
        assert_eq!(items.as_array().unwrap().len(), 1);

        let query = CString::new("Shared Queries/Missing").unwrap();
        assert!(payload(tfs_run_query(service, query.as_ptr())).is_null());
        tfs_service_free(service);
    }
}
