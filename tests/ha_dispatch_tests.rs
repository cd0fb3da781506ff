//! # HA Failover Dispatch Integration Tests
//!
//! Exercises the bounded retry/failover policy against stub backends:
//! attempt accounting, terminal Bad Gateway after exhaustion, the
//! single-attempt behavior of disabled policies, shared URL preference
//! across dispatches, and the dispatch client's refusal to follow
//! redirects or retry on its own.

use axum::http::{HeaderMap, Method, StatusCode, Version};
use std::collections::HashMap;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use federated_gateway::chain::provider::Dispatcher;
use federated_gateway::dispatch::client::BackendClient;
use federated_gateway::dispatch::ha::{DefaultDispatcher, HaDispatcher};
use federated_gateway::{
    GatewayError, IncomingRequest, ProviderConfig, RequestContext, Service, Topology,
};

fn request() -> IncomingRequest {
    IncomingRequest::new(
        Method::GET,
        "/sandbox/webhdfs/v1".parse().unwrap(),
        Version::HTTP_11,
        HeaderMap::new(),
        Vec::new(),
        "127.0.0.1:4444".parse().unwrap(),
    )
}

fn context() -> RequestContext {
    RequestContext::new("sandbox".to_string(), "WEBHDFS".to_string(), "v1".to_string())
}

fn topology(primary: &str, alternates: Vec<String>) -> Arc<Topology> {
    Arc::new(Topology {
        name: "sandbox".to_string(),
        services: vec![Service {
            role: "WEBHDFS".to_string(),
            url: primary.to_string(),
            alternate_urls: alternates,
        }],
        providers: Vec::new(),
    })
}

fn ha_dispatcher(topology: Arc<Topology>, policy: &str) -> HaDispatcher {
    let config = ProviderConfig {
        role: "ha".to_string(),
        name: "HaProvider".to_string(),
        enabled: true,
        params: HashMap::from([("WEBHDFS".to_string(), policy.to_string())]),
    };
    let client = Arc::new(BackendClient::new(&Default::default()).unwrap());
    HaDispatcher::from_config(&config, topology, client).unwrap()
}

async fn attempts(server: &MockServer) -> usize {
    server.received_requests().await.unwrap_or_default().len()
}

#[tokio::test]
async fn failover_to_alternate_succeeds_after_exact_attempt_budget() {
    let primary = MockServer::start().await;
    let alternate = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&primary)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("from alternate"))
        .mount(&alternate)
        .await;

    let dispatcher = ha_dispatcher(
        topology(&primary.uri(), vec![alternate.uri()]),
        "maxRetryAttempts=2;maxFailoverAttempts=1;retrySleep=0;failoverSleep=0;enabled=true",
    );

    let response = dispatcher.dispatch(request(), &mut context()).await.unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body.as_ref(), b"from alternate");
    // Exactly 4 dispatch attempts: 3 against the primary, 1 against the
    // alternate.
    assert_eq!(attempts(&primary).await, 3);
    assert_eq!(attempts(&alternate).await, 1);
}

#[tokio::test]
async fn exhausted_budget_is_bad_gateway_after_exact_attempts() {
    let primary = MockServer::start().await;
    let alternate = MockServer::start().await;
    for server in [&primary, &alternate] {
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(server)
            .await;
    }

    let dispatcher = ha_dispatcher(
        topology(&primary.uri(), vec![alternate.uri()]),
        "maxRetryAttempts=2;maxFailoverAttempts=1;retrySleep=0;failoverSleep=0;enabled=true",
    );

    let result = dispatcher.dispatch(request(), &mut context()).await;
    assert!(matches!(result, Err(GatewayError::BadGateway { .. })));
    // Exactly 4 attempts total, then terminal failure.
    assert_eq!(attempts(&primary).await, 3);
    assert_eq!(attempts(&alternate).await, 1);
}

#[tokio::test]
async fn disabled_policy_makes_exactly_one_attempt() {
    let primary = MockServer::start().await;
    let alternate = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&primary)
        .await;

    let dispatcher = ha_dispatcher(
        topology(&primary.uri(), vec![alternate.uri()]),
        "maxRetryAttempts=5;maxFailoverAttempts=5;retrySleep=0;failoverSleep=0;enabled=false",
    );

    // The single attempt's outcome is returned directly, even a 500.
    let response = dispatcher.dispatch(request(), &mut context()).await.unwrap();
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(attempts(&primary).await, 1);
    assert_eq!(attempts(&alternate).await, 0);
}

#[tokio::test]
async fn preferred_url_is_shared_across_dispatches() {
    let primary = MockServer::start().await;
    let alternate = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&primary)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&alternate)
        .await;

    let dispatcher = ha_dispatcher(
        topology(&primary.uri(), vec![alternate.uri()]),
        "maxRetryAttempts=0;maxFailoverAttempts=1;retrySleep=0;failoverSleep=0;enabled=true",
    );

    dispatcher.dispatch(request(), &mut context()).await.unwrap();
    assert_eq!(attempts(&primary).await, 1);

    // The second request benefits from the first one's probe: it starts at
    // the alternate, the primary sees no further traffic.
    dispatcher.dispatch(request(), &mut context()).await.unwrap();
    assert_eq!(attempts(&primary).await, 1);
    assert_eq!(attempts(&alternate).await, 2);
}

#[tokio::test]
async fn client_never_follows_redirects() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1"))
        .respond_with(
            ResponseTemplate::new(301).insert_header("location", "http://elsewhere.example.com/"),
        )
        .mount(&backend)
        .await;

    let client = BackendClient::new(&Default::default()).unwrap();
    let response = client
        .execute(&backend.uri(), &request(), &context())
        .await
        .unwrap();
    // The 3xx comes back to the chain untouched.
    assert_eq!(response.status, StatusCode::MOVED_PERMANENTLY);
    assert_eq!(
        response.headers.get("location").unwrap(),
        "http://elsewhere.example.com/"
    );
    assert_eq!(attempts(&backend).await, 1);
}

#[tokio::test]
async fn plain_dispatch_never_retries_failures() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&backend)
        .await;

    let client = Arc::new(BackendClient::new(&Default::default()).unwrap());
    let dispatcher = DefaultDispatcher::new(topology(&backend.uri(), Vec::new()), client);

    let response = dispatcher.dispatch(request(), &mut context()).await.unwrap();
    assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    assert_eq!(attempts(&backend).await, 1);
}

#[tokio::test]
async fn connection_errors_count_as_failed_attempts() {
    // A port nobody listens on: every attempt is a transport error.
    let dead_primary = "http://127.0.0.1:1";
    let alternate = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&alternate)
        .await;

    let dispatcher = ha_dispatcher(
        topology(dead_primary, vec![alternate.uri()]),
        "maxRetryAttempts=1;maxFailoverAttempts=1;retrySleep=0;failoverSleep=0;enabled=true",
    );

    let response = dispatcher.dispatch(request(), &mut context()).await.unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(attempts(&alternate).await, 1);
}

#[tokio::test]
async fn unknown_role_in_topology_is_not_found() {
    let dispatcher = ha_dispatcher(topology("http://127.0.0.1:1", Vec::new()), "enabled=true");
    let mut context = RequestContext::new(
        "sandbox".to_string(),
        "HBASE".to_string(),
        "v1".to_string(),
    );
    let result = dispatcher.dispatch(request(), &mut context).await;
    assert!(matches!(result, Err(GatewayError::NotFound { .. })));
}
