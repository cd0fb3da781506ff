//! # Topology Registry
//!
//! Holds the deployed topologies and their compiled provider chains. A
//! deployment is an immutable snapshot behind an `Arc`; redeploying a
//! topology swaps the map entry atomically, so in-flight requests keep the
//! snapshot they started with while new requests observe the new one. No
//! partial visibility, no reader locks held across request processing.
//!
//! The registry also owns the declarative loader: a YAML file listing
//! topologies, optionally watched with `notify` so edits redeploy without a
//! restart. A topology whose provider activation fails (bad verification
//! key, malformed HA policy) is skipped on reload and its previous
//! deployment, if any, keeps serving.

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

use crate::chain::factory::{GatewayServices, ProviderRegistry};
use crate::chain::provider::ProviderChain;
use crate::core::error::GatewayResult;
use crate::topology::model::Topology;

/// Declarative topology file: a list of topologies.
#[derive(Debug, Serialize, Deserialize)]
pub struct TopologyFile {
    pub topologies: Vec<Topology>,
}

/// One deployed topology: the immutable model plus its compiled chain.
#[derive(Debug)]
pub struct DeployedTopology {
    pub topology: Arc<Topology>,
    pub chain: ProviderChain,
}

/// Registry of deployed topologies keyed by name.
pub struct TopologyRegistry {
    providers: ProviderRegistry,
    services: GatewayServices,
    deployed: RwLock<HashMap<String, Arc<DeployedTopology>>>,
}

impl std::fmt::Debug for TopologyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopologyRegistry")
            .field("deployed", &self.deployed.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl TopologyRegistry {
    pub fn new(providers: ProviderRegistry, services: GatewayServices) -> Self {
        Self {
            providers,
            services,
            deployed: RwLock::new(HashMap::new()),
        }
    }

    /// Deploy or redeploy one topology.
    ///
    /// The chain is compiled outside the lock; the swap itself is a map
    /// insert under a short write lock. Activation errors leave any previous
    /// deployment of the same name untouched.
    pub fn deploy(&self, topology: Topology) -> GatewayResult<()> {
        let name = topology.name.clone();
        let topology = Arc::new(topology);
        let chain = self.providers.build_chain(&topology, &self.services)?;
        let deployment = Arc::new(DeployedTopology { topology, chain });
        self.deployed.write().insert(name.clone(), deployment);
        info!(topology = %name, "topology deployed");
        Ok(())
    }

    /// Remove a deployment; in-flight requests keep their snapshot.
    pub fn undeploy(&self, name: &str) -> bool {
        self.deployed.write().remove(name).is_some()
    }

    /// Current snapshot for a topology name. The caller holds the `Arc` for
    /// the whole request, so a concurrent redeploy never changes what it
    /// sees.
    pub fn snapshot(&self, name: &str) -> Option<Arc<DeployedTopology>> {
        self.deployed.read().get(name).cloned()
    }

    /// Names of currently deployed topologies
    pub fn deployed_names(&self) -> Vec<String> {
        self.deployed.read().keys().cloned().collect()
    }

    /// Load a topology file and deploy every topology in it.
    ///
    /// A file-level parse error fails the whole load. A per-topology
    /// activation error is logged and that topology skipped, so one bad
    /// resource cannot take down the others on a hot reload. Returns the
    /// names that were deployed.
    pub fn deploy_file(&self, path: &Path) -> GatewayResult<Vec<String>> {
        let contents = std::fs::read_to_string(path)?;
        let file: TopologyFile = serde_yaml::from_str(&contents)?;
        let mut deployed = Vec::new();
        for topology in file.topologies {
            let name = topology.name.clone();
            match self.deploy(topology) {
                Ok(()) => deployed.push(name),
                Err(e) => error!(topology = %name, "activation failed, keeping previous deployment: {}", e),
            }
        }
        Ok(deployed)
    }
}

/// Watch a topology file and redeploy on change.
///
/// The returned watcher must be kept alive for watching to continue. Reload
/// failures are logged; the previous deployments keep serving.
pub fn watch_topology_file(
    registry: Arc<TopologyRegistry>,
    path: &Path,
) -> GatewayResult<RecommendedWatcher> {
    let watched = path.to_path_buf();
    let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
        match event {
            Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                info!(path = %watched.display(), "topology file changed, redeploying");
                if let Err(e) = registry.deploy_file(&watched) {
                    error!("topology reload failed: {}", e);
                }
            }
            Ok(_) => {}
            Err(e) => error!("topology watch error: {}", e),
        }
    })
    .map_err(|e| crate::core::error::GatewayError::config(format!("failed to create watcher: {}", e)))?;

    watcher
        .watch(path, RecursiveMode::NonRecursive)
        .map_err(|e| {
            crate::core::error::GatewayError::config(format!(
                "failed to watch {}: {}",
                path.display(),
                e
            ))
        })?;
    Ok(watcher)
}
