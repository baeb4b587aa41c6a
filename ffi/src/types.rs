//! `#[repr(C)]` types for the FFI boundary.
//!
//! # Design
//! The service handle is opaque. Every operation answers with one
//! `FfiTfsResult`: an error code, an optional message, the HTTP status when
//! the server produced one, and the payload as JSON text. Work items travel
//! as JSON snapshots, so C callers never see Rust-owned structures.

use std::ffi::CString;
use std::os::raw::c_char;

use serde::Serialize;
use tfs_core::{ApiError, ServiceError, TfsService};

/// Opaque handle to a `TfsService`. C callers receive a pointer to this
/// and pass it back into every FFI function.
pub struct FfiTfsService {
    pub(crate) inner: TfsService,
}

/// Error codes returned in `FfiTfsResult`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiErrorCode {
    Ok = 0,
    NotConnected = 1,
    InvalidArgument = 2,
    SourceNotFound = 3,
    NotFound = 4,
    Http = 5,
    Deserialization = 6,
    Serialization = 7,
    InvalidUrl = 8,
    Transport = 9,
    Panic = 10,
    NullArg = 11,
}

/// Result envelope for every operation.
///
/// On success `error_code` is `Ok`, `error_message` is null and `json`
/// holds the payload (`null` when the operation found nothing).
/// On failure `error_code` describes the category, `error_message` is a
/// human-readable C string and `json` is null.
#[repr(C)]
pub struct FfiTfsResult {
    pub error_code: FfiErrorCode,
    pub error_message: *mut c_char,
    pub http_status: u16,
    pub json: *mut c_char,
}

/// Copy `s` into a C string, dropping interior NUL bytes.
pub(crate) fn into_c_string(s: String) -> *mut c_char {
    let bytes: Vec<u8> = s.into_bytes().into_iter().filter(|b| *b != 0).collect();
    CString::new(bytes)
        .map(CString::into_raw)
        .unwrap_or(std::ptr::null_mut())
}

impl FfiTfsResult {
    fn boxed(
        error_code: FfiErrorCode,
        error_message: Option<String>,
        http_status: u16,
        json: Option<String>,
    ) -> *mut Self {
        Box::into_raw(Box::new(FfiTfsResult {
            error_code,
            error_message: error_message.map_or(std::ptr::null_mut(), into_c_string),
            http_status,
            json: json.map_or(std::ptr::null_mut(), into_c_string),
        }))
    }

    /// Serialize a successful payload, or report the failure.
    pub(crate) fn from_outcome<T: Serialize>(outcome: Result<T, ServiceError>) -> *mut Self {
        match outcome {
            Ok(payload) => match serde_json::to_string(&payload) {
                Ok(json) => Self::boxed(FfiErrorCode::Ok, None, 0, Some(json)),
                Err(e) => Self::boxed(FfiErrorCode::Serialization, Some(e.to_string()), 0, None),
            },
            Err(e) => Self::from_error(e),
        }
    }

    /// Build an error result from a `ServiceError`.
    pub(crate) fn from_error(err: ServiceError) -> *mut Self {
        let (error_code, http_status) = match &err {
            ServiceError::NotConnected => (FfiErrorCode::NotConnected, 0),
            ServiceError::InvalidArgument(_) => (FfiErrorCode::InvalidArgument, 0),
            ServiceError::SourceNotFound(_) => (FfiErrorCode::SourceNotFound, 0),
            ServiceError::Api(api) => match api {
                ApiError::NotFound => (FfiErrorCode::NotFound, 404u16),
                ApiError::HttpError { status, .. } => (FfiErrorCode::Http, *status),
                ApiError::DeserializationError(_) => (FfiErrorCode::Deserialization, 0),
                ApiError::SerializationError(_) => (FfiErrorCode::Serialization, 0),
                ApiError::InvalidUrl(_) => (FfiErrorCode::InvalidUrl, 0),
                ApiError::Transport(_) => (FfiErrorCode::Transport, 0),
            },
        };
        Self::boxed(error_code, Some(err.to_string()), http_status, None)
    }

    /// Build an error result for a null argument.
    pub(crate) fn null_arg(name: &str) -> *mut Self {
        Self::boxed(
            FfiErrorCode::NullArg,
            Some(format!("null argument: {name}")),
            0,
            None,
        )
    }

    /// Build an error result for a caught panic.
    pub(crate) fn panic(msg: &str) -> *mut Self {
        Self::boxed(FfiErrorCode::Panic, Some(msg.to_string()), 0, None)
    }
}
