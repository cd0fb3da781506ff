//! # Provider Factory
//!
//! Maps `(role, name)` pairs from declarative provider configuration to
//! constructor functions, and compiles a topology's ordered provider list
//! into an executable [`ProviderChain`]. Compilation happens once at
//! topology deployment; constructor failures (bad key material, malformed
//! policy strings) fail the deployment, never individual requests.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::auth::federation::FederationProvider;
use crate::auth::token::TokenAuthority;
use crate::chain::provider::{Dispatcher, Provider, ProviderChain};
use crate::core::error::GatewayResult;
use crate::dispatch::client::BackendClient;
use crate::dispatch::ha::{DefaultDispatcher, HaDispatcher, HA_PROVIDER_NAME};
use crate::topology::model::{ProviderConfig, Topology};

/// Role under which the HA dispatch decorator is declared. It is not a chain
/// step; the factory turns it into the terminal dispatcher instead.
pub const HA_ROLE: &str = "ha";

/// Shared collaborators available to provider constructors.
pub struct GatewayServices {
    /// Shared token-authority service for delegated verification
    pub authority: Arc<dyn TokenAuthority>,

    /// Outbound dispatch client
    pub client: Arc<BackendClient>,
}

impl fmt::Debug for GatewayServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayServices").finish_non_exhaustive()
    }
}

/// Constructor for one provider implementation.
pub type ProviderCtor =
    Box<dyn Fn(&ProviderConfig, &GatewayServices) -> GatewayResult<Arc<dyn Provider>> + Send + Sync>;

/// Registry of known provider implementations keyed by `(role, name)`.
///
/// Configurations whose pair is not registered are preserved in the topology
/// model but contribute no chain step; the engine never guesses at an
/// implementation.
pub struct ProviderRegistry {
    ctors: HashMap<(String, String), ProviderCtor>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("registered", &self.ctors.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ProviderRegistry {
    /// Empty registry with no implementations
    pub fn empty() -> Self {
        Self {
            ctors: HashMap::new(),
        }
    }

    /// Registry with the built-in implementations registered
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("federation", "JWTFederation", |config, services| {
            let provider = FederationProvider::from_config(config, services.authority.clone())?;
            Ok(Arc::new(provider) as Arc<dyn Provider>)
        });
        registry
    }

    /// Register a constructor for a `(role, name)` pair
    pub fn register<F>(&mut self, role: &str, name: &str, ctor: F)
    where
        F: Fn(&ProviderConfig, &GatewayServices) -> GatewayResult<Arc<dyn Provider>>
            + Send
            + Sync
            + 'static,
    {
        self.ctors
            .insert((role.to_string(), name.to_string()), Box::new(ctor));
    }

    fn lookup(&self, config: &ProviderConfig) -> Option<&ProviderCtor> {
        self.ctors.get(&(config.role.clone(), config.name.clone()))
    }

    /// Compile a topology's declared providers into an executable chain.
    ///
    /// Enabled providers become steps in exact declaration order; there is no
    /// implicit reordering by role. The enabled `ha` provider, if any, is
    /// lifted out of the step list and becomes the terminal dispatch
    /// decorator.
    pub fn build_chain(
        &self,
        topology: &Arc<Topology>,
        services: &GatewayServices,
    ) -> GatewayResult<ProviderChain> {
        let mut steps: Vec<Arc<dyn Provider>> = Vec::new();
        for config in &topology.providers {
            if !config.enabled {
                debug!(
                    role = %config.role,
                    name = %config.name,
                    "skipping disabled provider"
                );
                continue;
            }
            if config.role == HA_ROLE {
                continue;
            }
            match self.lookup(config) {
                Some(ctor) => steps.push(ctor(config, services)?),
                None => warn!(
                    role = %config.role,
                    name = %config.name,
                    "no implementation registered; provider contributes no chain step"
                ),
            }
        }

        let ha_config = topology
            .providers
            .iter()
            .find(|p| p.enabled && p.role == HA_ROLE && p.name == HA_PROVIDER_NAME);

        let dispatcher: Arc<dyn Dispatcher> = match ha_config {
            Some(config) => Arc::new(HaDispatcher::from_config(
                config,
                Arc::clone(topology),
                services.client.clone(),
            )?),
            None => Arc::new(DefaultDispatcher::new(
                Arc::clone(topology),
                services.client.clone(),
            )),
        };

        Ok(ProviderChain::new(steps, dispatcher))
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
