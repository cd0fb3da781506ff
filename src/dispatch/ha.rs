//! # High-Availability Failover Dispatch
//!
//! A decorator around the backend dispatch step that retries a forwarded
//! call under a bounded policy: first against the same URL (retry), then
//! against the service's alternate URLs in order (failover). Wrapping past
//! the last alternate is not attempted; exhausting the budget is a terminal
//! `Bad Gateway`.
//!
//! The preferred URL per service role is shared across concurrent requests:
//! it models the operational health of the backend, not a per-request retry
//! count. Once one request fails over to an alternate, subsequent requests
//! start there and the preference does not drift back to the primary until
//! the alternate itself fails. The retry/failover budgets, by contrast, are
//! per-dispatch counters: one forwarded call makes at most
//! `1 + maxRetryAttempts + maxFailoverAttempts` attempts.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::chain::provider::Dispatcher;
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::{GatewayResponse, IncomingRequest, RequestContext};
use crate::dispatch::client::BackendClient;
use crate::topology::model::{ProviderConfig, Service, Topology};

/// Provider name the chain factory recognizes for the `ha` role.
pub const HA_PROVIDER_NAME: &str = "HaProvider";

/// Bounded retry/failover policy for one service role.
///
/// Parsed once at provider activation from a single delimited parameter
/// string such as
/// `maxFailoverAttempts=3;failoverSleep=1000;maxRetryAttempts=3;retrySleep=1000;enabled=true`.
/// Unknown keys are ignored; missing keys take the defaults below; malformed
/// values are a configuration error surfaced at activation, never at request
/// time. Sleep values are milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct HaPolicy {
    pub enabled: bool,
    pub max_failover_attempts: u32,
    pub failover_sleep: Duration,
    pub max_retry_attempts: u32,
    pub retry_sleep: Duration,
}

impl Default for HaPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_failover_attempts: 3,
            failover_sleep: Duration::from_millis(1000),
            max_retry_attempts: 3,
            retry_sleep: Duration::from_millis(1000),
        }
    }
}

impl HaPolicy {
    /// Parse the `key=value;key=value` policy string.
    pub fn parse(raw: &str) -> GatewayResult<Self> {
        let mut policy = Self::default();
        for pair in raw.split(';') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            let Some((key, value)) = pair.split_once('=') else {
                return Err(GatewayError::config(format!(
                    "malformed HA policy entry '{}'",
                    pair
                )));
            };
            let (key, value) = (key.trim(), value.trim());
            match key {
                "enabled" => {
                    policy.enabled = value.parse().map_err(|_| {
                        GatewayError::config(format!("invalid HA policy boolean '{}'", value))
                    })?;
                }
                "maxFailoverAttempts" => policy.max_failover_attempts = parse_int(key, value)?,
                "failoverSleep" => {
                    policy.failover_sleep = Duration::from_millis(parse_int(key, value)? as u64)
                }
                "maxRetryAttempts" => policy.max_retry_attempts = parse_int(key, value)?,
                "retrySleep" => {
                    policy.retry_sleep = Duration::from_millis(parse_int(key, value)? as u64)
                }
                // Unknown keys are ignored so older/newer policy strings
                // remain deployable.
                _ => debug!(key, "ignoring unknown HA policy key"),
            }
        }
        Ok(policy)
    }
}

fn parse_int(key: &str, value: &str) -> GatewayResult<u32> {
    value.parse().map_err(|_| {
        GatewayError::config(format!("invalid HA policy integer for {}: '{}'", key, value))
    })
}

/// Shared URL preference for one service role: the ordered URL list and the
/// index of the currently preferred one. Lock scope is the single advance
/// transition; unrelated backend calls are never serialized by it.
#[derive(Debug)]
struct UrlState {
    urls: Vec<String>,
    active: usize,
}

impl UrlState {
    fn new(urls: Vec<String>) -> Self {
        Self { urls, active: 0 }
    }

    fn preferred(&self) -> &str {
        &self.urls[self.active]
    }

    /// Record that `failed_url` failed and pick the URL to try next.
    ///
    /// If another request already advanced past `failed_url`, its choice is
    /// reused instead of advancing twice. Returns `None` when there is no
    /// alternate left beyond the failed URL (terminal).
    fn mark_failed(&mut self, failed_url: &str) -> Option<String> {
        if self.preferred() != failed_url {
            return Some(self.preferred().to_string());
        }
        if self.active + 1 < self.urls.len() {
            self.active += 1;
            warn!(
                failed = failed_url,
                preferred = self.preferred(),
                "failing over to alternate backend url"
            );
            Some(self.preferred().to_string())
        } else {
            None
        }
    }
}

/// Per-role HA state: the parsed policy plus the shared URL preference.
#[derive(Debug)]
struct RoleState {
    policy: HaPolicy,
    urls: Mutex<UrlState>,
}

/// Dispatch decorator applying HA policies to the service roles that declare
/// one; roles without a policy get a plain single attempt.
#[derive(Debug)]
pub struct HaDispatcher {
    topology: Arc<Topology>,
    client: Arc<BackendClient>,
    policies: HashMap<String, HaPolicy>,
    states: DashMap<String, Arc<RoleState>>,
}

impl HaDispatcher {
    /// Build from the `ha` provider's declarative configuration: each
    /// parameter maps a service role to a policy string. All policy strings
    /// are parsed here so a malformed one fails topology activation.
    pub fn from_config(
        config: &ProviderConfig,
        topology: Arc<Topology>,
        client: Arc<BackendClient>,
    ) -> GatewayResult<Self> {
        let mut policies = HashMap::new();
        for (role, raw) in &config.params {
            let policy = HaPolicy::parse(raw)?;
            policies.insert(role.to_ascii_uppercase(), policy);
        }
        Ok(Self {
            topology,
            client,
            policies,
            states: DashMap::new(),
        })
    }

    fn role_state(&self, role: &str, service: &Service, policy: &HaPolicy) -> Arc<RoleState> {
        let key = role.to_ascii_uppercase();
        self.states
            .entry(key)
            .or_insert_with(|| {
                Arc::new(RoleState {
                    policy: policy.clone(),
                    urls: Mutex::new(UrlState::new(service.all_urls())),
                })
            })
            .clone()
    }

    /// One attempt. A transport error or a failure-range (5xx) status counts
    /// as a failed attempt for HA accounting; anything else, including 3xx
    /// and 4xx, is the backend's answer and is returned as-is.
    async fn attempt(
        &self,
        url: &str,
        request: &IncomingRequest,
        context: &RequestContext,
    ) -> GatewayResult<GatewayResponse> {
        let response = self.client.execute(url, request, context).await?;
        if response.status.is_server_error() {
            return Err(GatewayError::dispatch(format!(
                "backend returned {}",
                response.status
            )));
        }
        Ok(response)
    }

    async fn dispatch_with_policy(
        &self,
        state: &RoleState,
        role: &str,
        request: &IncomingRequest,
        context: &RequestContext,
    ) -> GatewayResult<GatewayResponse> {
        let policy = &state.policy;
        let mut retries_left = policy.max_retry_attempts;
        let mut failovers_left = policy.max_failover_attempts;
        let mut current_url = state.urls.lock().preferred().to_string();

        loop {
            let failure = match self.attempt(&current_url, request, context).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_recoverable_by_failover() => e,
                Err(e) => return Err(e),
            };
            debug!(role, url = %current_url, error = %failure, "dispatch attempt failed");

            if retries_left > 0 {
                retries_left -= 1;
                if !policy.retry_sleep.is_zero() {
                    sleep(policy.retry_sleep).await;
                }
                // Same URL again.
            } else if failovers_left > 0 {
                failovers_left -= 1;
                if !policy.failover_sleep.is_zero() {
                    sleep(policy.failover_sleep).await;
                }
                match state.urls.lock().mark_failed(&current_url) {
                    Some(next) => current_url = next,
                    // Failing past the last alternate is terminal.
                    None => {
                        return Err(GatewayError::bad_gateway(
                            role.to_string(),
                            format!("no alternate urls left: {}", failure),
                        ))
                    }
                }
            } else {
                return Err(GatewayError::bad_gateway(
                    role.to_string(),
                    format!("ha budget exhausted: {}", failure),
                ));
            }
        }
    }
}

#[async_trait]
impl Dispatcher for HaDispatcher {
    async fn dispatch(
        &self,
        request: IncomingRequest,
        context: &mut RequestContext,
    ) -> GatewayResult<GatewayResponse> {
        let role = context.service_role.clone();
        let service = self.topology.resolve_service(&role)?;

        let policy = self.policies.get(&role.to_ascii_uppercase());
        match policy {
            Some(policy) if policy.enabled => {
                let state = self.role_state(&role, service, policy);
                self.dispatch_with_policy(&state, &role, &request, context)
                    .await
            }
            // Disabled or absent policy: exactly one attempt, outcome
            // returned directly whatever it is.
            _ => self.client.execute(&service.url, &request, context).await,
        }
    }
}

/// Plain terminal dispatch for topologies with no HA provider: one attempt
/// against the service's primary URL.
#[derive(Debug)]
pub struct DefaultDispatcher {
    topology: Arc<Topology>,
    client: Arc<BackendClient>,
}

impl DefaultDispatcher {
    pub fn new(topology: Arc<Topology>, client: Arc<BackendClient>) -> Self {
        Self { topology, client }
    }
}

#[async_trait]
impl Dispatcher for DefaultDispatcher {
    async fn dispatch(
        &self,
        request: IncomingRequest,
        context: &mut RequestContext,
    ) -> GatewayResult<GatewayResponse> {
        let service = self.topology.resolve_service(&context.service_role)?;
        self.client.execute(&service.url, &request, context).await
    }
}
