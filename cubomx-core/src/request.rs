//! Requests
//!
//! The runtime never talks to the network itself. Links, loads and
//! navigation go through a [`Transport`] installed with
//! [`Runtime::set_transport`](crate::runtime::Runtime::set_transport), and
//! [`request`] turns whatever it returns into a uniform [`Response`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// An outgoing request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestInit {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
}

impl RequestInit {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "GET".into(),
            headers: IndexMap::new(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: "POST".into(),
            body: Some(body.into()),
            ..Self::get(url)
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// What a transport hands back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub headers: IndexMap<String, String>,
    pub body: String,
    /// Final URL after redirects, when it differs from the request's.
    pub url: Option<String>,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            ..Self::default()
        }
    }

    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Sends requests on the runtime's behalf.
pub trait Transport: Send + Sync {
    fn send(&self, request: RequestInit) -> BoxFuture<'static, Result<RawResponse>>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(&self, request: RequestInit) -> BoxFuture<'static, Result<RawResponse>> {
        (**self).send(request)
    }
}

/// The uniform response descriptor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub ok: bool,
    pub status: u16,
    /// Header names are lowercased.
    pub headers: IndexMap<String, String>,
    pub url: String,
    pub text: String,
    /// The body, when it parses as JSON.
    pub json: Option<serde_json::Value>,
    /// Target of a `location` or `x-redirect` header.
    pub redirect: Option<String>,
}

/// Send `init` through `transport` and describe the result.
pub async fn request(transport: &dyn Transport, init: RequestInit) -> Result<Response> {
    let requested = init.url.clone();
    debug!(method = %init.method, url = %requested, "sending request");
    let raw = transport.send(init).await?;

    let headers: IndexMap<String, String> = raw
        .headers
        .into_iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value))
        .collect();
    let redirect = headers
        .get("x-redirect")
        .or_else(|| headers.get("location"))
        .cloned();
    let json = match raw.body.trim() {
        "" => None,
        body => serde_json::from_str(body).ok(),
    };

    Ok(Response {
        ok: (200..300).contains(&raw.status),
        status: raw.status,
        url: raw.url.unwrap_or(requested),
        text: raw.body,
        json,
        redirect,
        headers,
    })
}

/// A transport serving canned responses by URL. Unknown URLs get a 404.
///
/// Clones share routes and the request log.
#[derive(Debug, Clone, Default)]
pub struct StaticTransport {
    routes: Arc<RwLock<IndexMap<String, RawResponse>>>,
    log: Arc<Mutex<Vec<RequestInit>>>,
}

impl StaticTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, url: impl Into<String>, response: RawResponse) -> Self {
        self.insert(url, response);
        self
    }

    pub fn insert(&self, url: impl Into<String>, response: RawResponse) {
        self.routes.write().insert(url.into(), response);
    }

    /// Every request sent so far, oldest first.
    pub fn requests(&self) -> Vec<RequestInit> {
        self.log.lock().clone()
    }
}

impl Transport for StaticTransport {
    fn send(&self, request: RequestInit) -> BoxFuture<'static, Result<RawResponse>> {
        let response = self
            .routes
            .read()
            .get(&request.url)
            .cloned()
            .unwrap_or_else(|| RawResponse::new(404, "not found"));
        self.log.lock().push(request);
        Box::pin(async move { Ok(response) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn describes_responses() {
        let transport = StaticTransport::new()
            .route("/data", RawResponse::ok(r#"{"n": 1}"#))
            .route(
                "/moved",
                RawResponse::new(302, "").header("Location", "/new"),
            );

        let data = request(&transport, RequestInit::get("/data")).await.unwrap();
        assert!(data.ok);
        assert_eq!(data.url, "/data");
        assert_eq!(data.json, Some(serde_json::json!({"n": 1})));
        assert_eq!(data.redirect, None);

        let moved = request(&transport, RequestInit::get("/moved")).await.unwrap();
        assert!(!moved.ok);
        assert_eq!(moved.redirect.as_deref(), Some("/new"));
        assert!(moved.headers.contains_key("location"));
        assert_eq!(moved.json, None);

        let missing = request(&transport, RequestInit::get("/nope")).await.unwrap();
        assert_eq!(missing.status, 404);

        let urls: Vec<_> = transport.requests().into_iter().map(|r| r.url).collect();
        assert_eq!(urls, vec!["/data", "/moved", "/nope"]);
    }

    #[test]
    fn request_builders() {
        let init = RequestInit::post("/save", "x=1").header("x-token", "t");
        assert_eq!(init.method, "POST");
        assert_eq!(init.body.as_deref(), Some("x=1"));
        assert_eq!(init.headers.get("x-token").map(String::as_str), Some("t"));
    }
}
