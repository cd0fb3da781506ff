//! # Error Handling Module
//!
//! This module provides the error taxonomy for the gateway using the `thiserror` crate.
//! It defines all error categories that can occur during request processing and maps
//! each of them to the HTTP status code the caller should see.
//!
//! Two properties of the taxonomy are load-bearing for security and resilience:
//!
//! - `Unauthorized` carries no diagnostic detail at all. Signature, issuer and
//!   token-parse failures all collapse into the same opaque 401 so that callers
//!   cannot use the response as an oracle. Expiry and audience failures are the
//!   deliberate exception: they surface as a 400 with a short machine-readable
//!   reason, signalling "refresh your token" rather than "authenticate differently".
//! - `Dispatch` (a single failed upstream attempt) is recoverable *only* by the
//!   HA failover policy. Nothing else in the gateway may retry it. Once the HA
//!   budget is exhausted it becomes a terminal `BadGateway`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::convert::Infallible;
use thiserror::Error;

/// Main result type used throughout the gateway
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Error categories for the gateway request-processing pipeline
///
/// The `#[error("...")]` attribute from `thiserror` implements `Display` with the
/// given message. Note that the `Display` output is for logs only; the body sent
/// to callers is produced by `IntoResponse` below and is intentionally sparser.
#[derive(Debug, Error, Clone)]
pub enum GatewayError {
    /// Authentication failure: missing, unparseable or unverifiable token,
    /// or issuer mismatch. Terminal, never retried, no diagnostic body.
    #[error("unauthorized")]
    Unauthorized,

    /// Request-level failure the caller can remediate (expired token, missing
    /// required audience). Distinguished from `Unauthorized` on purpose.
    #[error("bad request: {reason}")]
    BadRequest { reason: String },

    /// Unresolvable topology or service role. A configuration problem, not a
    /// caller problem, but surfaced as 404 since the path names the resource.
    #[error("not found: {resource}")]
    NotFound { resource: String },

    /// Backend unreachable after the HA policy exhausted its budget.
    #[error("bad gateway: {service} - {reason}")]
    BadGateway { service: String, reason: String },

    /// A single upstream dispatch attempt failed (connect error, timeout or a
    /// failure-range status). Recoverable only by the HA failover provider.
    #[error("dispatch failed: {message}")]
    Dispatch { message: String },

    /// Configuration errors detected at topology/provider activation time
    /// (malformed HA policy integers, malformed verification key, bad timeouts).
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// I/O errors (topology file reads, watcher failures)
    #[error("I/O error: {message}")]
    Io { message: String },

    /// YAML parsing errors for declarative resources
    #[error("YAML error: {message}")]
    Yaml { message: String },

    /// Internal errors for unexpected failures
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl GatewayError {
    /// Create a `BadRequest` with a short machine-distinguishable reason
    pub fn bad_request<S: Into<String>>(reason: S) -> Self {
        Self::BadRequest {
            reason: reason.into(),
        }
    }

    /// Create a `NotFound` naming the missing resource
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create a `BadGateway` for an exhausted service
    pub fn bad_gateway<S: Into<String>>(service: S, reason: S) -> Self {
        Self::BadGateway {
            service: service.into(),
            reason: reason.into(),
        }
    }

    /// Create a `Dispatch` error for a failed upstream attempt
    pub fn dispatch<S: Into<String>>(message: S) -> Self {
        Self::Dispatch {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Map this error to the HTTP status code the caller should see
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::BadGateway { .. } => StatusCode::BAD_GATEWAY,
            // A dispatch error that escapes the HA policy still means the
            // backend could not be reached.
            Self::Dispatch { .. } => StatusCode::BAD_GATEWAY,
            Self::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Yaml { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the HA failover policy is allowed to retry after this error.
    ///
    /// Only single-attempt dispatch failures qualify; everything else is
    /// terminal no matter how many attempts remain in the budget.
    pub fn is_recoverable_by_failover(&self) -> bool {
        matches!(self, Self::Dispatch { .. })
    }

    /// Short stable identifier for API responses and logs
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::BadRequest { .. } => "bad_request",
            Self::NotFound { .. } => "not_found",
            Self::BadGateway { .. } => "bad_gateway",
            Self::Dispatch { .. } => "dispatch_error",
            Self::Configuration { .. } => "configuration_error",
            Self::Io { .. } => "io_error",
            Self::Yaml { .. } => "yaml_error",
            Self::Internal { .. } => "internal_error",
        }
    }
}

impl From<Infallible> for GatewayError {
    fn from(infallible: Infallible) -> Self {
        match infallible {}
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for GatewayError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        Self::Dispatch {
            message: err.to_string(),
        }
    }
}

/// Convert gateway errors into HTTP responses.
///
/// `Unauthorized` deliberately produces an empty body: no hint about whether
/// the token was missing, malformed, badly signed or issued elsewhere.
/// `BadRequest` carries only the short reason string. Server-side categories
/// never leak their internal message to the caller.
impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            Self::Unauthorized => status.into_response(),
            Self::BadRequest { reason } => {
                let body = json!({
                    "error": {
                        "code": status.as_u16(),
                        "type": self.error_type(),
                        "reason": reason,
                    }
                });
                (status, Json(body)).into_response()
            }
            Self::NotFound { resource } => {
                let body = json!({
                    "error": {
                        "code": status.as_u16(),
                        "type": self.error_type(),
                        "resource": resource,
                    }
                });
                (status, Json(body)).into_response()
            }
            Self::BadGateway { service, .. } => {
                let body = json!({
                    "error": {
                        "code": status.as_u16(),
                        "type": self.error_type(),
                        "service": service,
                    }
                });
                (status, Json(body)).into_response()
            }
            _ => {
                let body = json!({
                    "error": {
                        "code": status.as_u16(),
                        "type": self.error_type(),
                    }
                });
                (status, Json(body)).into_response()
            }
        }
    }
}
