//! # Provider Chain Engine
//!
//! Executes the ordered sequence of request-processing steps (providers)
//! declared by a topology, terminating in the dispatch step that forwards the
//! request to a backend.
//!
//! Each step receives the request, the mutable per-request context (carrying
//! the identity once federation has run) and a [`Next`] continuation. A step
//! may invoke the continuation to pass through, short-circuit by returning a
//! terminal response or error, or attach/replace the identity before
//! continuing. The engine never reorders steps by role: execution order is
//! exactly declaration order. A failure before dispatch prevents the backend
//! from ever being called.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::core::error::GatewayResult;
use crate::core::types::{GatewayResponse, IncomingRequest, RequestContext};

/// One configured request-processing step in a topology's chain.
#[async_trait]
pub trait Provider: Send + Sync + fmt::Debug {
    /// Provider name for identification and logging
    fn name(&self) -> &str;

    /// Process the request.
    ///
    /// Call `next.run(request, context)` to continue the chain; return
    /// without doing so to short-circuit. Returning an error also
    /// short-circuits: no later step, including dispatch, runs.
    async fn handle(
        &self,
        request: IncomingRequest,
        context: &mut RequestContext,
        next: Next<'_>,
    ) -> GatewayResult<GatewayResponse>;
}

/// Terminal chain step: forwards the request to a resolved backend and
/// returns its response. Implemented by the plain backend client and by the
/// HA failover decorator around it.
#[async_trait]
pub trait Dispatcher: Send + Sync + fmt::Debug {
    async fn dispatch(
        &self,
        request: IncomingRequest,
        context: &mut RequestContext,
    ) -> GatewayResult<GatewayResponse>;
}

/// Continuation capability handed to each provider.
///
/// Borrows the remaining steps rather than owning them, so constructing a
/// `Next` per hop is free; the recursion bottoms out at the dispatcher.
pub struct Next<'a> {
    steps: &'a [Arc<dyn Provider>],
    dispatcher: &'a dyn Dispatcher,
}

impl<'a> Next<'a> {
    /// Invoke the rest of the chain
    pub async fn run(
        self,
        request: IncomingRequest,
        context: &mut RequestContext,
    ) -> GatewayResult<GatewayResponse> {
        match self.steps.split_first() {
            Some((step, rest)) => {
                debug!(provider = step.name(), "executing chain step");
                step.handle(
                    request,
                    context,
                    Next {
                        steps: rest,
                        dispatcher: self.dispatcher,
                    },
                )
                .await
            }
            None => self.dispatcher.dispatch(request, context).await,
        }
    }
}

/// The compiled chain for one deployed topology: enabled providers in
/// declaration order plus the terminal dispatcher. Immutable after build;
/// safe for unsynchronized concurrent use.
#[derive(Debug)]
pub struct ProviderChain {
    steps: Vec<Arc<dyn Provider>>,
    dispatcher: Arc<dyn Dispatcher>,
}

impl ProviderChain {
    pub fn new(steps: Vec<Arc<dyn Provider>>, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self { steps, dispatcher }
    }

    /// Number of provider steps (excluding the terminal dispatch)
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Process one request through the chain.
    #[instrument(skip(self, request, context), fields(request_id = %request.id, topology = %context.topology_name))]
    pub async fn process(
        &self,
        request: IncomingRequest,
        context: &mut RequestContext,
    ) -> GatewayResult<GatewayResponse> {
        let next = Next {
            steps: &self.steps,
            dispatcher: self.dispatcher.as_ref(),
        };
        next.run(request, context).await
    }
}
