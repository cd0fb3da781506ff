//! # Gateway End-to-End Tests
//!
//! Drives the axum router directly with `tower::ServiceExt::oneshot`: a
//! deployed topology with a federation provider in front of a stub backend,
//! checked for the externally observable contract. Status codes, body
//! opacity on auth failures, and faithful proxying of the backend response.

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use federated_gateway::auth::federation::PARAM_VERIFICATION_PEM;
use federated_gateway::auth::token::RejectingAuthority;
use federated_gateway::{
    GatewayServer, GatewayServices, ProviderConfig, ProviderRegistry, Service, ServerConfig,
    Topology, TopologyRegistry,
};
use federated_gateway::dispatch::client::BackendClient;

const ISSUER_PRIVATE_PEM: &str = include_str!("fixtures/token_rsa_private.pem");
const ISSUER_PUBLIC_PEM: &str = include_str!("fixtures/token_rsa_public.pem");

fn sign(claims: &serde_json::Value) -> String {
    encode(
        &Header::new(Algorithm::RS256),
        claims,
        &EncodingKey::from_rsa_pem(ISSUER_PRIVATE_PEM.as_bytes()).unwrap(),
    )
    .unwrap()
}

fn valid_token() -> String {
    sign(&json!({"iss": "KNOXSSO", "sub": "guest", "exp": 4_102_444_800i64}))
}

/// Router fronting a topology whose WEBHDFS service points at `backend_url`.
fn gateway(backend_url: &str) -> axum::Router {
    let topology = Topology {
        name: "sandbox".to_string(),
        services: vec![Service {
            role: "WEBHDFS".to_string(),
            url: backend_url.to_string(),
            alternate_urls: Vec::new(),
        }],
        providers: vec![ProviderConfig {
            role: "federation".to_string(),
            name: "JWTFederation".to_string(),
            enabled: true,
            params: [(
                PARAM_VERIFICATION_PEM.to_string(),
                ISSUER_PUBLIC_PEM.to_string(),
            )]
            .into_iter()
            .collect(),
        }],
    };

    let registry = Arc::new(TopologyRegistry::new(
        ProviderRegistry::with_builtins(),
        GatewayServices {
            authority: Arc::new(RejectingAuthority),
            client: Arc::new(BackendClient::new(&Default::default()).unwrap()),
        },
    ));
    registry.deploy(topology).unwrap();

    GatewayServer::new(ServerConfig::default(), registry).router()
}

fn get(uri: &str) -> Request<Body> {
    request(uri, None)
}

fn request(uri: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = bearer {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let mut request = builder.body(Body::empty()).unwrap();
    let addr: SocketAddr = "127.0.0.1:4444".parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap()
        .to_vec()
}

#[tokio::test]
async fn authenticated_request_reaches_backend() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/tmp"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(r#"{"FileStatus":{}}"#, "application/json"),
        )
        .mount(&backend)
        .await;

    let app = gateway(&backend.uri());
    let response = app
        .oneshot(request("/sandbox/webhdfs/v1/tmp", Some(&valid_token())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/json"
    );
    assert_eq!(body_bytes(response).await, br#"{"FileStatus":{}}"#);
}

#[tokio::test]
async fn missing_token_is_unauthorized_with_empty_body() {
    let backend = MockServer::start().await;
    let app = gateway(&backend.uri());

    let response = app.oneshot(get("/sandbox/webhdfs/v1/tmp")).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(body_bytes(response).await.is_empty());
    // Rejected before dispatch: the backend saw nothing.
    assert!(backend.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn garbage_token_is_unauthorized_with_empty_body() {
    let backend = MockServer::start().await;
    let app = gateway(&backend.uri());

    let response = app
        .oneshot(request("/sandbox/webhdfs/v1/tmp", Some("not.a.token")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn expired_token_is_bad_request_with_reason() {
    let backend = MockServer::start().await;
    let app = gateway(&backend.uri());

    let expired = sign(&json!({"iss": "KNOXSSO", "sub": "guest", "exp": 1_000_000_000}));
    let response = app
        .oneshot(request("/sandbox/webhdfs/v1/tmp", Some(&expired)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_bytes(response).await;
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(parsed["error"]["reason"], "token_expired");
}

#[tokio::test]
async fn token_accepted_from_query_parameter() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&backend)
        .await;

    let app = gateway(&backend.uri());
    let uri = format!("/sandbox/webhdfs/v1/tmp?knoxtoken={}", valid_token());
    let response = app.oneshot(get(&uri)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_topology_is_not_found() {
    let backend = MockServer::start().await;
    let app = gateway(&backend.uri());

    let response = app
        .oneshot(request("/missing/webhdfs/v1", Some(&valid_token())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_service_role_is_not_found() {
    let backend = MockServer::start().await;
    let app = gateway(&backend.uri());

    let response = app
        .oneshot(request("/sandbox/hbase/v1", Some(&valid_token())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn path_without_service_role_is_not_found() {
    let backend = MockServer::start().await;
    let app = gateway(&backend.uri());

    let response = app.oneshot(get("/sandbox")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn forwarded_headers_reach_the_backend() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(wiremock::matchers::header("x-forwarded-for", "127.0.0.1"))
        .and(wiremock::matchers::header("x-forwarded-proto", "http"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&backend)
        .await;

    let app = gateway(&backend.uri());
    let response = app
        .oneshot(request("/sandbox/webhdfs/v1", Some(&valid_token())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn query_string_is_forwarded_to_backend() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/tmp"))
        .and(wiremock::matchers::query_param("op", "LISTSTATUS"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&backend)
        .await;

    let app = gateway(&backend.uri());
    let response = app
        .oneshot(request(
            "/sandbox/webhdfs/v1/tmp?op=LISTSTATUS",
            Some(&valid_token()),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
