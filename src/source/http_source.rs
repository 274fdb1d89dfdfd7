use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, RequestBuilder, Url};
use tracing::{debug, warn};

use super::traits::Network;
use crate::message::{Method, Request, Response};

/// Network capability backed by reqwest. Relative request keys are resolved
/// against `origin`.
pub struct HttpNetwork {
    client: Client,
    origin: Arc<RwLock<Url>>,
    headers: Arc<RwLock<HashMap<String, String>>>,
}

impl HttpNetwork {
    pub fn new(origin: &str) -> Result<Self> {
        Self::with_headers(origin, HashMap::new())
    }

    pub fn with_headers(origin: &str, headers: HashMap<String, String>) -> Result<Self> {
        let origin = Url::parse(origin).map_err(|e| anyhow!("invalid origin url: {}", e))?;
        Ok(Self {
            client: Client::new(),
            origin: Arc::new(RwLock::new(origin)),
            headers: Arc::new(RwLock::new(headers)),
        })
    }

    /// Point the network at a new origin and/or replace the default headers.
    pub fn update_origin(&self, new_origin: &str, new_headers: HashMap<String, String>) -> Result<()> {
        if !new_origin.trim().is_empty() {
            let url = Url::parse(new_origin).map_err(|e| anyhow!("invalid origin url: {}", e))?;
            *self.origin.write() = url;
        }
        if !new_headers.is_empty() {
            *self.headers.write() = new_headers;
        }
        Ok(())
    }

    /// Absolute URL for a request key.
    pub fn resolve(&self, key: &str) -> Result<Url> {
        let origin = self.origin.read();
        origin
            .join(key)
            .map_err(|e| anyhow!("cannot resolve {} against {}: {}", key, origin, e))
    }

    /// Build a request with the default headers, then the request's own headers.
    fn build_request(&self, request: &Request, url: Url) -> RequestBuilder {
        let headers = self.headers.read().clone();

        let mut req = self.client.request(to_reqwest_method(request.method), url);
        for (k, v) in &headers {
            req = req.header(k.as_str(), v.as_str());
        }
        for (k, v) in &request.headers {
            req = req.header(k.as_str(), v.as_str());
        }
        req
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Head => reqwest::Method::HEAD,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
        Method::Patch => reqwest::Method::PATCH,
        Method::Options => reqwest::Method::OPTIONS,
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let url = self.resolve(&request.url)?;
        let resp = self.build_request(request, url.clone()).send().await?;

        let status = resp.status();
        if status.is_success() {
            debug!("http fetch {} {} status={}", request.method, url, status.as_u16());
        } else {
            warn!("http fetch {} {} status={}", request.method, url, status.as_u16());
        }

        let mut headers = HashMap::new();
        for (name, value) in resp.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str().to_ascii_lowercase(), value.to_string());
            }
        }

        let body = resp.bytes().await?;

        Ok(Response {
            status: status.as_u16(),
            headers,
            body,
            url: url.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_key() {
        let network = HttpNetwork::new("http://127.0.0.1:8080/").unwrap();
        let url = network
            .resolve("/service-worker-boilerplate/index.html")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:8080/service-worker-boilerplate/index.html"
        );
    }

    #[test]
    fn test_resolve_absolute_key_overrides_origin() {
        let network = HttpNetwork::new("http://127.0.0.1:8080/").unwrap();
        let url = network.resolve("http://example.com/a.png").unwrap();
        assert_eq!(url.as_str(), "http://example.com/a.png");
    }

    #[test]
    fn test_invalid_origin_rejected() {
        assert!(HttpNetwork::new("not a url").is_err());
    }

    #[test]
    fn test_update_origin() {
        let network = HttpNetwork::new("http://127.0.0.1:8080/").unwrap();
        network
            .update_origin("http://127.0.0.1:9090/", HashMap::new())
            .unwrap();
        assert_eq!(
            network.resolve("/x").unwrap().as_str(),
            "http://127.0.0.1:9090/x"
        );
    }
}
