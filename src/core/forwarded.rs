//! Reconstruction of the externally visible base URL.
//!
//! When the gateway sits behind a load balancer or TLS terminator, the
//! scheme/host/port the client actually used arrive in the `X-Forwarded-*`
//! header family rather than on the physical connection. Self-referential
//! links must be built from those values, falling back to the physical
//! request's own scheme, server and port when the headers are absent.

use axum::http::HeaderMap;

/// Physical request attributes used when no forwarded headers are present.
#[derive(Debug, Clone)]
pub struct PhysicalRequest {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    /// Context path the gateway is mounted at, e.g. `/gateway`; may be empty
    pub context: String,
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

/// Build the externally visible base URL for self-referential links.
///
/// Honors `X-Forwarded-Proto`, `X-Forwarded-Host`, `X-Forwarded-Port` and
/// `X-Forwarded-Context`, each independently falling back to the physical
/// request. When `X-Forwarded-Host` already carries a port (as most proxies
/// send it), `X-Forwarded-Port` is ignored to avoid a doubled port. Default
/// ports for the effective scheme are elided.
pub fn external_base_url(headers: &HeaderMap, physical: &PhysicalRequest) -> String {
    let scheme = header(headers, "x-forwarded-proto").unwrap_or(&physical.scheme);

    let (host, host_has_port) = match header(headers, "x-forwarded-host") {
        // Forwarded host lists may contain multiple hops; the first is the
        // client-facing one.
        Some(value) => {
            let first = value.split(',').next().unwrap_or(value).trim();
            (first.to_string(), first.contains(':'))
        }
        None => (physical.host.clone(), false),
    };

    let port = if host_has_port {
        None
    } else {
        match header(headers, "x-forwarded-port") {
            Some(p) => p.parse::<u16>().ok(),
            None => Some(physical.port),
        }
    };

    let context = header(headers, "x-forwarded-context").unwrap_or(&physical.context);

    let mut url = format!("{}://{}", scheme, host);
    if let Some(port) = port {
        let default = match scheme {
            "https" => 443,
            _ => 80,
        };
        if port != default {
            url.push_str(&format!(":{}", port));
        }
    }
    url.push_str(context);
    url
}
