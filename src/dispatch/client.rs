//! # Backend Dispatch Client
//!
//! Executes exactly one outbound HTTP call to a resolved backend URL and
//! returns its response or a transport error.
//!
//! Three transport behaviors are explicitly disabled, because the gateway
//! must own them itself:
//!
//! - cookie persistence: every call is stateless; nothing is retained or
//!   replayed between calls (the client is built without a cookie store),
//! - redirect following: a 3xx goes back to the caller/provider chain,
//! - transport-level retry: all retry and failover policy belongs to the HA
//!   provider. Retrying here as well would break the HA policy's attempt
//!   accounting and could multiply side effects of non-idempotent calls
//!   (`reqwest` performs no automatic retries).

use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use std::fmt;
use tracing::debug;

use crate::core::config::DispatchConfig;
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::{GatewayResponse, IncomingRequest, RequestContext};

/// Hop-by-hop headers that must not be forwarded in either direction.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
}

/// The outbound HTTP client with gateway-controlled timeouts.
pub struct BackendClient {
    client: reqwest::Client,
}

impl fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendClient").finish_non_exhaustive()
    }
}

impl BackendClient {
    /// Build the client from dispatch configuration.
    ///
    /// Timeout strings are validated here; a malformed value is a
    /// configuration error at construction, not at request time. The default
    /// for both timeouts is the `-1` sentinel, i.e. no timeout.
    pub fn new(config: &DispatchConfig) -> GatewayResult<Self> {
        let mut builder = reqwest::Client::builder()
            // A 3xx is an answer, not an instruction: hand it back to the
            // chain untouched.
            .redirect(reqwest::redirect::Policy::none());

        if let Some(timeout) = config.connection_timeout()? {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(timeout) = config.socket_timeout()? {
            builder = builder.timeout(timeout);
        }

        let client = builder
            .build()
            .map_err(|e| GatewayError::config(format!("failed to build dispatch client: {}", e)))?;
        Ok(Self { client })
    }

    /// Resolve the concrete target URL for this request against a service
    /// base URL: base + forwarded path remainder + original query string.
    pub fn target_url(
        base_url: &str,
        context: &RequestContext,
        request: &IncomingRequest,
    ) -> GatewayResult<url::Url> {
        let mut target = base_url.trim_end_matches('/').to_string();
        if !context.backend_path.is_empty() {
            target.push('/');
            target.push_str(&context.backend_path);
        }
        if let Some(query) = request.query() {
            target.push('?');
            target.push_str(query);
        }
        url::Url::parse(&target)
            .map_err(|e| GatewayError::internal(format!("invalid target url '{}': {}", target, e)))
    }

    /// Execute one outbound call. Exactly one attempt: connection errors and
    /// timeouts surface as a `Dispatch` error for the HA policy to judge.
    pub async fn execute(
        &self,
        base_url: &str,
        request: &IncomingRequest,
        context: &RequestContext,
    ) -> GatewayResult<GatewayResponse> {
        let target = Self::target_url(base_url, context, request)?;
        debug!(target = %target, method = %request.method, "dispatching to backend");

        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| GatewayError::internal(format!("invalid method: {}", e)))?;

        let mut headers = reqwest::header::HeaderMap::new();
        for (name, value) in request.headers.iter() {
            if is_hop_by_hop(name.as_str()) {
                continue;
            }
            if let (Ok(name), Ok(value)) = (
                reqwest::header::HeaderName::from_bytes(name.as_str().as_bytes()),
                reqwest::header::HeaderValue::from_bytes(value.as_bytes()),
            ) {
                headers.append(name, value);
            }
        }
        if let Ok(value) =
            reqwest::header::HeaderValue::from_str(&request.remote_addr.ip().to_string())
        {
            headers.append(reqwest::header::HeaderName::from_static("x-forwarded-for"), value);
        }
        if !headers.contains_key("x-forwarded-proto") {
            headers.insert(
                reqwest::header::HeaderName::from_static("x-forwarded-proto"),
                reqwest::header::HeaderValue::from_static("http"),
            );
        }
        if !headers.contains_key("x-forwarded-host") {
            if let Some(host) = request.header("host") {
                if let Ok(value) = reqwest::header::HeaderValue::from_str(host) {
                    headers.insert(
                        reqwest::header::HeaderName::from_static("x-forwarded-host"),
                        value,
                    );
                }
            }
        }

        let response = self
            .client
            .request(method, target)
            .headers(headers)
            .body(request.body.as_ref().clone())
            .send()
            .await?;

        let status = StatusCode::from_u16(response.status().as_u16())
            .map_err(|e| GatewayError::internal(format!("invalid upstream status: {}", e)))?;

        let mut response_headers = HeaderMap::new();
        for (name, value) in response.headers().iter() {
            if is_hop_by_hop(name.as_str()) {
                continue;
            }
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_str().as_bytes()),
                HeaderValue::from_bytes(value.as_bytes()),
            ) {
                response_headers.append(name, value);
            }
        }

        let body = response.bytes().await?;
        Ok(GatewayResponse::new(
            status,
            response_headers,
            body.to_vec(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Method, Version};

    fn request(uri: &str) -> IncomingRequest {
        IncomingRequest::new(
            Method::GET,
            uri.parse().unwrap(),
            Version::HTTP_11,
            HeaderMap::new(),
            Vec::new(),
            "10.0.0.9:55555".parse().unwrap(),
        )
    }

    fn context(backend_path: &str) -> RequestContext {
        RequestContext::new(
            "sandbox".to_string(),
            "webhdfs".to_string(),
            backend_path.to_string(),
        )
    }

    #[test]
    fn test_target_url_joins_base_path_and_query() {
        let url = BackendClient::target_url(
            "http://nn1.example.com:50070/webhdfs",
            &context("v1/tmp"),
            &request("/sandbox/webhdfs/v1/tmp?op=LISTSTATUS"),
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "http://nn1.example.com:50070/webhdfs/v1/tmp?op=LISTSTATUS"
        );
    }

    #[test]
    fn test_target_url_without_remainder_or_query() {
        let url = BackendClient::target_url(
            "http://oozie.example.com:11000/oozie/",
            &context(""),
            &request("/sandbox/oozie"),
        )
        .unwrap();
        assert_eq!(url.as_str(), "http://oozie.example.com:11000/oozie");
    }

    #[test]
    fn test_hop_by_hop_detection() {
        assert!(is_hop_by_hop("Connection"));
        assert!(is_hop_by_hop("transfer-encoding"));
        assert!(is_hop_by_hop("HOST"));
        assert!(!is_hop_by_hop("authorization"));
        assert!(!is_hop_by_hop("content-type"));
    }

    #[test]
    fn test_client_rejects_malformed_timeout_at_construction() {
        let config = DispatchConfig {
            connection_timeout: "eventually".to_string(),
            socket_timeout: "-1".to_string(),
        };
        assert!(matches!(
            BackendClient::new(&config),
            Err(GatewayError::Configuration { .. })
        ));
    }

    #[test]
    fn test_client_accepts_sentinel_and_duration_timeouts() {
        let config = DispatchConfig {
            connection_timeout: "30s".to_string(),
            socket_timeout: "-1".to_string(),
        };
        assert!(BackendClient::new(&config).is_ok());
    }
}
