//! # Topology Model
//!
//! An immutable, versioned description of one logical gateway path: which
//! backend services it fronts and which providers process requests for it,
//! in declared order. Topologies are built from declarative YAML by the
//! loader in [`crate::topology::registry`] and are never mutated after
//! deployment; reload replaces the whole snapshot atomically.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core::error::{GatewayError, GatewayResult};

/// Named routing configuration binding a provider chain and backend services
/// for one gateway-exposed path.
///
/// Invariant: `providers` preserves declaration order exactly; it determines
/// chain execution order. Disabled providers are retained in the model (so a
/// redeploy round-trips losslessly) and skipped at chain-build time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Topology {
    /// Topology name; first path segment of gateway URLs
    pub name: String,

    /// Backend services fronted by this topology
    #[serde(default)]
    pub services: Vec<Service>,

    /// Ordered provider chain configuration
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

/// One backend service: a logical role, a primary URL and zero or more
/// alternates used by HA failover.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Service {
    /// Logical backend name, e.g. a storage or compute API role
    pub role: String,

    /// Primary URL requests are forwarded to
    pub url: String,

    /// Alternate URLs tried in order when HA failover is active
    #[serde(default)]
    pub alternate_urls: Vec<String>,
}

impl Service {
    /// Primary URL followed by the alternates, in failover order
    pub fn all_urls(&self) -> Vec<String> {
        let mut urls = Vec::with_capacity(1 + self.alternate_urls.len());
        urls.push(self.url.clone());
        urls.extend(self.alternate_urls.iter().cloned());
        urls
    }
}

/// Declarative configuration for one provider chain step.
///
/// `role` says what kind of step this is (federation, ha, rewrite, ...);
/// `name` selects the implementation; `params` is free-form string
/// configuration interpreted by that implementation. Roles unknown to the
/// chain engine are preserved here but produce no chain step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    /// Kind of chain step
    pub role: String,

    /// Implementation name within the role
    pub name: String,

    /// Whether the chain engine should build a step for this provider
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Free-form string parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_enabled() -> bool {
    true
}

impl ProviderConfig {
    /// Get a parameter value by key
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

impl Topology {
    /// Resolve the service entry for a role.
    ///
    /// Fails with `NotFound` when no service of that role exists in this
    /// topology; the role comparison is case-insensitive since roles come
    /// from request paths.
    pub fn resolve_service(&self, role: &str) -> GatewayResult<&Service> {
        self.services
            .iter()
            .find(|s| s.role.eq_ignore_ascii_case(role))
            .ok_or_else(|| {
                GatewayError::not_found(format!(
                    "service role '{}' in topology '{}'",
                    role, self.name
                ))
            })
    }

    /// Enabled providers of a given role, in declaration order
    pub fn providers_of_role<'a>(
        &'a self,
        role: &'a str,
    ) -> impl Iterator<Item = &'a ProviderConfig> + 'a {
        self.providers
            .iter()
            .filter(move |p| p.enabled && p.role == role)
    }
}
