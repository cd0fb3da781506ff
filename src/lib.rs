//! # Federated API Gateway - Core Library Crate
//!
//! A topology-driven API gateway that fronts a set of backend HTTP services
//! behind a single externally-reachable endpoint. Clients authenticate once
//! with a bearer token; the gateway federates that identity to heterogeneous
//! backends and hides backend topology, multiplicity and failure from
//! callers.
//!
//! The request-processing pipeline is the heart of the crate: a deployed
//! topology compiles into an ordered provider chain (federation first in
//! typical deployments, then any other configured steps) terminating in a
//! dispatch step that forwards the call, optionally decorated with bounded
//! high-availability retry/failover.

/// Core functionality: error taxonomy, configuration, request/response types
/// and forwarded-header handling
pub mod core;

/// Topology model and registry: immutable routing snapshots with atomic
/// deploy/redeploy
pub mod topology;

/// Provider chain engine: the ordered, role-keyed filter composition built
/// from declarative configuration
pub mod chain;

/// Token validation and federation: bearer-token parsing, signature
/// verification and the federation chain step
pub mod auth;

/// Backend dispatch: the outbound client and the HA failover decorator
pub mod dispatch;

/// The axum HTTP server fronting deployed topologies
pub mod gateway;

// Re-export the types most integrations need directly from the crate root.

pub use crate::core::config::{DispatchConfig, GatewayConfig, ServerConfig};
pub use crate::core::error::{GatewayError, GatewayResult};
pub use crate::core::types::{GatewayResponse, IdentityContext, IncomingRequest, RequestContext};

pub use auth::federation::FederationProvider;
pub use auth::token::{JwtToken, TokenAuthority};
pub use chain::factory::{GatewayServices, ProviderRegistry};
pub use chain::provider::{Dispatcher, Next, Provider, ProviderChain};
pub use dispatch::client::BackendClient;
pub use dispatch::ha::{HaDispatcher, HaPolicy};
pub use gateway::server::GatewayServer;
pub use topology::model::{ProviderConfig, Service, Topology};
pub use topology::registry::{DeployedTopology, TopologyRegistry};
