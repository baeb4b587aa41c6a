//! Synchronous façade over the TFS / Azure DevOps work-item REST API.
//!
//! # Overview
//! [`TfsService`] is the connection façade: it holds the server address,
//! authenticates with a probe fetch, and exposes fetch, create, copy, save,
//! query and link operations. Every work item it hands out is a [`WorkItem`]
//! with its id, type and parent id captured at construction and live access
//! to the remaining fields.
//!
//! # Design
//! - `TfsClient` is stateless: each remote operation is a `build_*` method
//!   producing an `HttpRequest` and a `parse_*` method consuming an
//!   `HttpResponse`, so the request shapes are testable without a network.
//! - A [`Transport`] executes the round-trip. [`UreqTransport`] is the
//!   blocking default; any `Fn(HttpRequest) -> Result<HttpResponse, ApiError>`
//!   closure works in its place.
//! - Connection state is explicit (`Disconnected` / `Connected`), and every
//!   data operation fails with [`ServiceError::NotConnected`] until a probe
//!   succeeds.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod args;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod relation;
pub mod service;
pub mod session;
pub mod transport;
pub mod types;
pub mod workitem;

pub use args::ToItemId;
pub use client::TfsClient;
pub use config::{ConfigError, ConnectionSettings, Credentials, ServiceConfig};
pub use error::{ApiError, Result, ServiceError};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use relation::LinkKind;
pub use service::{CopyOptions, TfsService};
pub use session::Session;
pub use transport::{Transport, UreqTransport};
pub use types::{FieldMap, Relation, WorkItemRecord};
pub use workitem::{RemoteRecord, WorkItem, WorkItemSnapshot};
