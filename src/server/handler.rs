// Axum front: turns incoming HTTP requests into fetch signals for the
// registration and writes the resolved response back.

use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, Method as HttpMethod, StatusCode, Uri},
    response::{IntoResponse, Response as HttpResponse},
    Router,
};
use tokio::net::TcpListener;
use tracing::{debug, error};

use super::registration::Registration;
use crate::error::AgentError;
use crate::message::{Method, Request, Response};

/// Headers recomputed by the HTTP stack and never copied from a stored response.
const SKIPPED_HEADERS: &[&str] = &["content-length", "transfer-encoding", "connection"];

pub struct AgentServer {
    port: u16,
    registration: Arc<Registration>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl AgentServer {
    /// Start the server on a random loopback port.
    pub async fn start(registration: Arc<Registration>) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let app = Router::new()
            .fallback(intercept_handler)
            .with_state(registration.clone());

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Ok(Self {
            port,
            registration,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    pub fn registration(&self) -> &Arc<Registration> {
        &self.registration
    }

    /// Shutdown the server gracefully.
    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

fn to_request(method: &HttpMethod, uri: &Uri, headers: &HeaderMap) -> Option<Request> {
    let method = Method::parse(method.as_str())?;
    let key = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());

    let mut request = Request::new(method, key);
    for (name, value) in headers {
        if *name == header::HOST {
            continue;
        }
        if let Ok(value) = value.to_str() {
            request = request.with_header(name.as_str(), value);
        }
    }
    Some(request)
}

fn to_http_response(response: Response) -> HttpResponse {
    let status = match StatusCode::from_u16(response.status) {
        Ok(status) => status,
        Err(_) => {
            error!("upstream produced invalid status {}", response.status);
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    let mut headers = HeaderMap::new();
    for (name, value) in &response.headers {
        if SKIPPED_HEADERS.contains(&name.as_str()) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }

    (status, headers, response.body).into_response()
}

fn error_status(err: &AgentError) -> StatusCode {
    match err {
        AgentError::FallbackMissing { .. } | AgentError::FallbackNotConfigured => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        e if e.is_network() => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Every path: dispatch as a fetch signal.
async fn intercept_handler(
    State(registration): State<Arc<Registration>>,
    method: HttpMethod,
    uri: Uri,
    headers: HeaderMap,
) -> HttpResponse {
    let Some(request) = to_request(&method, &uri, &headers) else {
        return (StatusCode::METHOD_NOT_ALLOWED, "unsupported method").into_response();
    };

    debug!("intercepted {} {}", request.method, request.url);

    match registration.dispatch_fetch(request).await {
        Ok(response) => to_http_response(response),
        Err(e) => {
            error!("request resolution failed: {}", e);
            (error_status(&e), format!("error: {}", e)).into_response()
        }
    }
}
