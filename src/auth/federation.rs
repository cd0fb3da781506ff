//! # Token Federation Provider
//!
//! The chain step that authenticates the caller via a bearer token and
//! establishes the identity context for the rest of the chain. Clients
//! authenticate once against the token issuer; this provider federates that
//! identity to whatever backend the topology fronts.
//!
//! Failure statuses are deliberately split: signature, issuer and parse
//! failures are an opaque 401 (no oracle for attackers probing tokens),
//! while an expired token or a missing required audience is a 400 with a
//! short machine reason, telling a legitimate caller to refresh rather than
//! re-authenticate differently.

use async_trait::async_trait;
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::auth::token::{JwtToken, TokenAuthority, VerificationKey};
use crate::chain::provider::{Next, Provider};
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::{GatewayResponse, IdentityContext, IncomingRequest, RequestContext};
use crate::topology::model::ProviderConfig;

/// Issuer assumed when the topology does not configure one.
pub const DEFAULT_ISSUER: &str = "KNOXSSO";

/// Query parameter used as the fallback token carrier.
pub const DEFAULT_TOKEN_QUERY_PARAM: &str = "knoxtoken";

/// Provider parameter keys.
pub const PARAM_EXPECTED_ISSUER: &str = "federation.expected.issuer";
pub const PARAM_VERIFICATION_PEM: &str = "federation.verification.pem";
pub const PARAM_AUDIENCES: &str = "federation.audiences";
pub const PARAM_TOKEN_QUERY_PARAM: &str = "federation.token.query.param";

const BEARER: &str = "Bearer ";

/// Federation chain step. All fields are fixed at topology deployment; the
/// provider holds no per-request state and is safe for unsynchronized
/// concurrent use.
pub struct FederationProvider {
    expected_issuer: String,
    verification_key: Option<VerificationKey>,
    audiences: Option<Vec<String>>,
    query_param: String,
    authority: Arc<dyn TokenAuthority>,
}

impl fmt::Debug for FederationProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FederationProvider")
            .field("expected_issuer", &self.expected_issuer)
            .field("has_verification_key", &self.verification_key.is_some())
            .field("audiences", &self.audiences)
            .field("query_param", &self.query_param)
            .finish()
    }
}

impl FederationProvider {
    /// Build the provider from its declarative configuration.
    ///
    /// A malformed verification key fails activation here, at deploy time,
    /// never individual requests.
    pub fn from_config(
        config: &ProviderConfig,
        authority: Arc<dyn TokenAuthority>,
    ) -> GatewayResult<Self> {
        let expected_issuer = config
            .param(PARAM_EXPECTED_ISSUER)
            .unwrap_or(DEFAULT_ISSUER)
            .to_string();

        let verification_key = match config.param(PARAM_VERIFICATION_PEM) {
            Some(pem) => Some(VerificationKey::from_pem(pem)?),
            None => None,
        };

        let audiences = config
            .param(PARAM_AUDIENCES)
            .map(|list| list.split(',').map(|a| a.trim().to_string()).collect());

        let query_param = config
            .param(PARAM_TOKEN_QUERY_PARAM)
            .unwrap_or(DEFAULT_TOKEN_QUERY_PARAM)
            .to_string();

        Ok(Self {
            expected_issuer,
            verification_key,
            audiences,
            query_param,
            authority,
        })
    }

    /// Extract the wire token: `Authorization: Bearer` header first, then the
    /// configured query parameter. No further carriers are tried.
    fn extract_wire_token(&self, request: &IncomingRequest) -> Option<String> {
        if let Some(header) = request.header("authorization") {
            if let Some(token) = header.strip_prefix(BEARER) {
                return Some(token.to_string());
            }
        }
        request.query_param(&self.query_param)
    }

    /// Signature check: against the configured key when present, otherwise
    /// delegated to the shared token authority. Authority errors count as
    /// verification failure.
    async fn verify_signature(&self, token: &JwtToken) -> bool {
        let outcome = match &self.verification_key {
            Some(key) => self.authority.verify_token_with_key(token, key).await,
            None => self.authority.verify_token(token).await,
        };
        match outcome {
            Ok(verified) => verified,
            Err(e) => {
                warn!("unable to verify token: {}", e);
                false
            }
        }
    }

    /// A token with no expiration claim is still valid for this check alone;
    /// its lifecycle is bound to whatever external session mechanism carries
    /// it. Otherwise the current time must be strictly before the expiration.
    pub fn token_is_still_valid(token: &JwtToken) -> bool {
        match token.expires_at() {
            None => true,
            Some(expires) => Utc::now() < expires,
        }
    }

    /// With no configured allow-list every token passes. With one, the token
    /// must present at least one audience that intersects the list.
    fn validate_audiences(&self, token: &JwtToken) -> bool {
        let Some(expected) = &self.audiences else {
            return true;
        };
        match token.audience_claims() {
            Some(claimed) => claimed.iter().any(|aud| expected.iter().any(|e| e == aud)),
            None => false,
        }
    }
}

#[async_trait]
impl Provider for FederationProvider {
    fn name(&self) -> &str {
        "JWTFederation"
    }

    async fn handle(
        &self,
        request: IncomingRequest,
        context: &mut RequestContext,
        next: Next<'_>,
    ) -> GatewayResult<GatewayResponse> {
        let Some(wire_token) = self.extract_wire_token(&request) else {
            debug!("no bearer token in header or query parameter");
            return Err(GatewayError::Unauthorized);
        };

        let token = JwtToken::parse(&wire_token)?;

        if !self.verify_signature(&token).await {
            debug!("token signature verification failed");
            return Err(GatewayError::Unauthorized);
        }

        if token.issuer() != Some(self.expected_issuer.as_str()) {
            debug!("token issuer does not match expected issuer");
            return Err(GatewayError::Unauthorized);
        }

        if !Self::token_is_still_valid(&token) {
            debug!("token has expired");
            return Err(GatewayError::bad_request("token_expired"));
        }

        if !self.validate_audiences(&token) {
            debug!("token is missing a required audience");
            return Err(GatewayError::bad_request("missing_audience"));
        }

        let principal = token.subject().unwrap_or_default().to_string();
        context.set_identity(IdentityContext::new(principal));
        next.run(request, context).await
    }
}
