//! # Gateway HTTP Server
//!
//! The axum front of the gateway. Requests arrive on
//! `/{topology}/{service-role}/{path...}`; the handler resolves the deployed
//! topology snapshot, builds the unified request type, runs the provider
//! chain and converts the outcome back into an HTTP response. All
//! request-processing semantics live in the chain; this module only adapts
//! between axum and the core types.

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::core::config::ServerConfig;
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::forwarded::{external_base_url, PhysicalRequest};
use crate::core::types::{GatewayResponse, IncomingRequest, RequestContext};
use crate::topology::registry::TopologyRegistry;

/// Maximum buffered request body size.
const MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

/// Shared handler state.
#[derive(Clone)]
struct ServerState {
    registry: Arc<TopologyRegistry>,
    config: Arc<ServerConfig>,
}

/// The gateway HTTP server.
pub struct GatewayServer {
    config: ServerConfig,
    app: Router,
}

impl GatewayServer {
    /// Build the server around a topology registry.
    pub fn new(config: ServerConfig, registry: Arc<TopologyRegistry>) -> Self {
        let state = ServerState {
            registry,
            config: Arc::new(config.clone()),
        };
        let app = build_router(state);
        Self { config, app }
    }

    /// The axum router, exposed for in-process testing.
    pub fn router(&self) -> Router {
        self.app.clone()
    }

    /// Bind and serve until the process is stopped.
    pub async fn start(self) -> GatewayResult<()> {
        let addr = self.config.listen_addr;
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            GatewayError::internal(format!("failed to bind gateway server to {}: {}", addr, e))
        })?;
        info!("gateway listening on {}", addr);
        axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .map_err(|e| GatewayError::internal(format!("server error: {}", e)))
    }
}

fn build_router(state: ServerState) -> Router {
    Router::new()
        .route("/*path", any(handle))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Split a request path into (topology, service role, backend remainder).
///
/// The remainder may be empty; topology and role are required.
fn split_gateway_path(path: &str) -> Option<(&str, &str, &str)> {
    let mut segments = path.trim_start_matches('/').splitn(3, '/');
    let topology = segments.next().filter(|s| !s.is_empty())?;
    let role = segments.next().filter(|s| !s.is_empty())?;
    let remainder = segments.next().unwrap_or("");
    Some((topology, role, remainder))
}

async fn handle(
    State(state): State<ServerState>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    match process(state, remote_addr, request).await {
        Ok(response) => into_axum_response(response),
        Err(error) => error.into_response(),
    }
}

async fn process(
    state: ServerState,
    remote_addr: SocketAddr,
    request: Request,
) -> GatewayResult<GatewayResponse> {
    let (parts, body) = request.into_parts();

    // The segments are owned up front so the URI can move into the unified
    // request type below.
    let Some((topology_name, service_role, backend_path)) =
        split_gateway_path(parts.uri.path()).map(|(t, r, p)| {
            (t.to_string(), r.to_string(), p.to_string())
        })
    else {
        return Err(GatewayError::not_found(parts.uri.path().to_string()));
    };

    // Resolve the snapshot before reading the body; an unknown topology
    // should not buffer a payload first.
    let Some(deployment) = state.registry.snapshot(&topology_name) else {
        debug!(topology = %topology_name, "no such topology deployed");
        return Err(GatewayError::not_found(format!(
            "topology '{}'",
            topology_name
        )));
    };

    let physical = PhysicalRequest {
        scheme: "http".to_string(),
        host: parts
            .headers
            .get("host")
            .and_then(|v| v.to_str().ok())
            .map(|h| h.split(':').next().unwrap_or(h).to_string())
            .unwrap_or_else(|| state.config.listen_addr.ip().to_string()),
        port: state.config.listen_addr.port(),
        context: state.config.context_path.clone(),
    };
    let base_url = external_base_url(&parts.headers, &physical);

    let body = axum::body::to_bytes(body, MAX_BODY_SIZE)
        .await
        .map_err(|e| GatewayError::bad_request(format!("unreadable body: {}", e)))?;

    let incoming = IncomingRequest::new(
        parts.method,
        parts.uri,
        parts.version,
        parts.headers,
        body.to_vec(),
        remote_addr,
    );

    let mut context = RequestContext::new(topology_name, service_role, backend_path);
    context.external_base_url = base_url;

    deployment.chain.process(incoming, &mut context).await
}

fn into_axum_response(response: GatewayResponse) -> Response {
    let mut builder = Response::builder().status(response.status);
    if let Some(headers) = builder.headers_mut() {
        headers.extend(response.headers.clone());
    }
    builder
        .body(Body::from(Bytes::from(response.body.as_ref().clone())))
        .unwrap_or_else(|_| {
            GatewayError::internal("failed to assemble response").into_response()
        })
}
