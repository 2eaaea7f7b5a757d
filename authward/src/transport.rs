//! The HTTP transport used to send requests
//!
//! Every outbound call, including token grants and unauthenticated probes,
//! goes through a single [`Transport`]. A transport never treats a non-2xx
//! status as an error; the status is handed back so that it can be inspected.

use std::{borrow::Cow, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{
    header::{self, HeaderMap},
    Method, StatusCode, Url,
};
use serde::de::DeserializeOwned;

use crate::error::TransportError;

/// The body of an outbound request
#[derive(Clone, Debug, PartialEq)]
pub enum Body {
    /// A JSON value, sent as `application/json` unless a content type was set
    Json(serde_json::Value),
    /// Raw bytes, passed through unchanged
    Bytes(Bytes),
}

/// A fully resolved request ready to be sent
#[derive(Clone, Debug)]
pub struct OutboundRequest {
    /// The HTTP method
    pub method: Method,
    /// The target URL
    pub url: Url,
    /// The request headers
    pub headers: HeaderMap,
    /// The request body
    pub body: Option<Body>,
}

impl OutboundRequest {
    /// Constructs a request without headers or a body
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// The value of the `Authorization` header, if any
    pub fn authorization(&self) -> Option<&str> {
        self.headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
    }
}

/// A response with its body fully read
#[derive(Clone, Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Response {
    /// Constructs a response from its parts
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// The status code
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The response headers
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The value of the named header, if present and valid UTF-8
    ///
    /// Header names are matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The raw body
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// The body, decoded as UTF-8 with invalid sequences replaced
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// The body, deserialized from JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    async fn read(response: reqwest::Response) -> Result<Self, TransportError> {
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(TransportError::new)?;
        Ok(Self {
            status,
            headers,
            body,
        })
    }
}

/// A capability to send HTTP requests
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request`, returning the response whatever its status
    async fn send(&self, request: OutboundRequest) -> Result<Response, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: OutboundRequest) -> Result<Response, TransportError> {
        (**self).send(request).await
    }
}

#[async_trait]
impl Transport for reqwest::Client {
    async fn send(&self, request: OutboundRequest) -> Result<Response, TransportError> {
        let builder = self
            .request(request.method, request.url)
            .headers(request.headers);

        let builder = match request.body {
            Some(Body::Json(value)) => builder.json(&value),
            Some(Body::Bytes(bytes)) => builder.body(bytes),
            None => builder,
        };

        let response = builder.send().await.map_err(TransportError::new)?;
        Response::read(response).await
    }
}

#[async_trait]
impl Transport for reqwest_middleware::ClientWithMiddleware {
    async fn send(&self, request: OutboundRequest) -> Result<Response, TransportError> {
        let builder = self
            .request(request.method, request.url)
            .headers(request.headers);

        let builder = match request.body {
            Some(Body::Json(value)) => builder.json(&value),
            Some(Body::Bytes(bytes)) => builder.body(bytes),
            None => builder,
        };

        let response = builder.send().await.map_err(TransportError::new)?;
        Response::read(response).await
    }
}
