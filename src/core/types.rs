//! # Core Types Module
//!
//! Foundational data structures used throughout the gateway: the unified
//! request/response types that all chain steps work with, the per-request
//! processing context, and the identity context established by federation.

use axum::http::{HeaderMap, Method, StatusCode, Uri, Version};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Represents an inbound request as seen by the provider chain
///
/// Protocol-specific details are abstracted away; the body is held behind an
/// `Arc` so that cloning the request while it moves through chain steps does
/// not copy large payloads.
#[derive(Debug, Clone)]
pub struct IncomingRequest {
    /// Unique identifier for this request (for tracing and logging)
    pub id: String,

    /// HTTP method (GET, POST, etc.)
    pub method: Method,

    /// Request URI including path and query parameters
    pub uri: Uri,

    /// HTTP version
    pub version: Version,

    /// Request headers
    pub headers: HeaderMap,

    /// Request body as bytes
    pub body: Arc<Vec<u8>>,

    /// Client's remote address
    pub remote_addr: SocketAddr,

    /// Timestamp when the request was received
    pub received_at: Instant,
}

impl IncomingRequest {
    /// Create a new incoming request with a generated ID
    pub fn new(
        method: Method,
        uri: Uri,
        version: Version,
        headers: HeaderMap,
        body: Vec<u8>,
        remote_addr: SocketAddr,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            method,
            uri,
            version,
            headers,
            body: Arc::new(body),
            remote_addr,
            received_at: Instant::now(),
        }
    }

    /// Get the request path without query parameters
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Get the raw query string, if any
    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// Get a header value by name, if present and valid UTF-8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Look up a single query parameter by name.
    ///
    /// Used by the federation provider as the fallback token carrier when no
    /// `Authorization` header is present.
    pub fn query_param(&self, name: &str) -> Option<String> {
        let query = self.query()?;
        for pair in query.split('&') {
            let mut parts = pair.splitn(2, '=');
            if parts.next() == Some(name) {
                return Some(parts.next().unwrap_or("").to_string());
            }
        }
        None
    }
}

/// The authenticated principal established by a federation provider.
///
/// Attached to the request's processing scope for the remainder of the chain
/// and for the dispatch step; discarded when request processing ends. Never
/// persisted and never shared between requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityContext {
    /// Principal name (the token's subject)
    pub principal: String,

    /// Additional credentials, empty by default
    pub credentials: Vec<String>,
}

impl IdentityContext {
    /// Create an identity context for a principal with no extra credentials
    pub fn new<S: Into<String>>(principal: S) -> Self {
        Self {
            principal: principal.into(),
            credentials: Vec::new(),
        }
    }
}

/// Per-request context threaded explicitly through the provider chain.
///
/// Carrying the identity here, rather than in ambient/task-local state, keeps
/// chain steps unit-testable and makes cross-request leakage impossible: the
/// context is created for one request and dropped with it.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Name of the topology this request resolved to
    pub topology_name: String,

    /// Service role extracted from the request path, used by the dispatch
    /// step to resolve the forwarding target
    pub service_role: String,

    /// Path remainder to forward to the backend (no leading slash)
    pub backend_path: String,

    /// Identity established by a federation provider, absent until then
    pub identity: Option<Arc<IdentityContext>>,

    /// Externally visible base URL reconstructed from `X-Forwarded-*` headers
    /// (physical request fallback), for self-referential links
    pub external_base_url: String,

    /// Request start time for latency measurement
    pub start_time: Instant,

    /// Additional context data that chain steps can set
    pub data: HashMap<String, String>,
}

impl RequestContext {
    /// Create a new request context for a resolved route
    pub fn new(topology_name: String, service_role: String, backend_path: String) -> Self {
        Self {
            topology_name,
            service_role,
            backend_path,
            identity: None,
            external_base_url: String::new(),
            start_time: Instant::now(),
            data: HashMap::new(),
        }
    }

    /// Attach or replace the identity context
    pub fn set_identity(&mut self, identity: IdentityContext) {
        self.identity = Some(Arc::new(identity));
    }

    /// Get elapsed time since request processing started
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

/// Response flowing back through the chain to the caller
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    /// HTTP status code
    pub status: StatusCode,

    /// Response headers
    pub headers: HeaderMap,

    /// Response body
    pub body: Arc<Vec<u8>>,
}

impl GatewayResponse {
    /// Create a new response
    pub fn new(status: StatusCode, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body: Arc::new(body),
        }
    }

    /// Create a simple text response
    pub fn text(status: StatusCode, text: String) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "text/plain".parse().expect("static value"));
        Self::new(status, headers, text.into_bytes())
    }
}
