#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use aliri_base64::Base64Url;
use async_trait::async_trait;
use aliri_clock::DurationSecs;
use authward::{AuthorizerConfig, OutboundRequest, Response, Transport, TransportError};
use authward_tokens::store::{CredentialStore, InMemoryStore, StoreError};
use reqwest::{
    header::{self, HeaderMap, HeaderName, HeaderValue},
    StatusCode,
};
use serde_json::json;

pub const TOKEN_URL: &str = "https://auth.example.com/oauth/token";
pub const DELEGATION_URL: &str = "https://auth.example.com/delegation";
pub const API_URL: &str = "https://api.example.com/orders";

type Handler = dyn Fn(&OutboundRequest) -> Result<Response, TransportError> + Send + Sync;

/// A transport answering every request with a scripted handler
pub struct FakeTransport {
    handler: Box<Handler>,
    requests: Mutex<Vec<OutboundRequest>>,
}

impl FakeTransport {
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&OutboundRequest) -> Result<Response, TransportError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, url: &str) -> Vec<OutboundRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.url.as_str() == url)
            .collect()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: OutboundRequest) -> Result<Response, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        (self.handler)(&request)
    }
}

/// An in-memory store that remembers every write
#[derive(Default)]
pub struct RecordingStore {
    inner: InMemoryStore,
    writes: Mutex<Vec<(String, u64)>>,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every key written, with its TTL in seconds
    pub fn writes(&self) -> Vec<(String, u64)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn keys(&self) -> Vec<String> {
        self.writes().into_iter().map(|(key, _)| key).collect()
    }
}

#[async_trait]
impl CredentialStore for RecordingStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: String, ttl: DurationSecs) -> Result<(), StoreError> {
        self.writes.lock().unwrap().push((key.to_owned(), ttl.0));
        self.inner.set(key, value, ttl).await
    }
}

pub fn config() -> AuthorizerConfig {
    AuthorizerConfig::default()
        .with_token_url(TOKEN_URL.parse().unwrap())
        .with_delegation_url(DELEGATION_URL.parse().unwrap())
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// An unsigned JWT carrying the given claims
pub fn jwt(sub: &str, iat: u64, exp: u64) -> String {
    let header = Base64Url::from_raw(json!({ "alg": "HS256", "typ": "JWT" }).to_string());
    let claims = Base64Url::from_raw(json!({ "sub": sub, "iat": iat, "exp": exp }).to_string());
    format!("{}.{}.c2lnbmF0dXJl", header, claims)
}

pub fn response(status: u16, headers: &[(&'static str, &'static str)], body: &str) -> Response {
    let mut map = HeaderMap::new();
    for &(name, value) in headers {
        map.append(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }
    Response::new(
        StatusCode::from_u16(status).unwrap(),
        map,
        body.to_owned(),
    )
}

pub fn json_response(status: u16, body: serde_json::Value) -> Response {
    response(status, &[("content-type", "application/json")], &body.to_string())
}

pub fn ok(body: &str) -> Result<Response, TransportError> {
    Ok(response(200, &[], body))
}

pub fn unauthorized(challenge: &'static str) -> Result<Response, TransportError> {
    Ok(response(401, &[("www-authenticate", challenge)], ""))
}

pub fn connection_refused() -> Result<Response, TransportError> {
    Err(TransportError::new("connection refused"))
}

pub fn authorization(request: &OutboundRequest) -> Option<String> {
    request
        .headers
        .get(header::AUTHORIZATION)
        .map(|v| v.to_str().unwrap().to_owned())
}

pub fn json_body(request: &OutboundRequest) -> serde_json::Value {
    match &request.body {
        Some(authward::Body::Json(value)) => value.clone(),
        other => panic!("expected a JSON body, got {:?}", other),
    }
}
