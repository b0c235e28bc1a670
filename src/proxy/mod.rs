//! Forwarding of a fixed set of path prefixes to the inference service.

pub mod table;

use std::{sync::Arc, time::Duration};

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Json, Router,
};
use http_body_util::LengthLimitError;
use serde_json::json;
use thiserror::Error;

pub use table::{inference_routes, ProxyRoute};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Largest request body the gateway buffers before forwarding.
pub const MAX_BODY_BYTES: usize = 100 * 1024 * 1024;

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

#[derive(Debug, Error)]
enum ProxyError {
    #[error("request body too large")]
    TooLarge,

    #[error("failed to read request body: {0}")]
    Body(axum::Error),

    #[error("{0}")]
    Upstream(#[from] reqwest::Error),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = match &self {
            ProxyError::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::Body(_) => StatusCode::BAD_REQUEST,
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
        };
        (
            status,
            Json(json!({ "error": format!("AI proxy error: {}", self) })),
        )
            .into_response()
    }
}

pub struct ProxyGateway {
    client: reqwest::Client,
    routes: Vec<ProxyRoute>,
}

impl ProxyGateway {
    pub fn new(routes: Vec<ProxyRoute>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client, routes })
    }

    pub fn routes(&self) -> &[ProxyRoute] {
        &self.routes
    }

    pub async fn forward(&self, route: &ProxyRoute, req: Request<Body>) -> Response {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        match self.try_forward(route, req).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(%method, %path, prefix = %route.prefix, error = %e, "AI proxy error");
                e.into_response()
            }
        }
    }

    async fn try_forward(
        &self,
        route: &ProxyRoute,
        req: Request<Body>,
    ) -> Result<Response, ProxyError> {
        let (parts, body) = req.into_parts();

        let declared_len = parts
            .headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared_len.is_some_and(|len| len > MAX_BODY_BYTES) {
            return Err(ProxyError::TooLarge);
        }
        let body = axum::body::to_bytes(body, MAX_BODY_BYTES)
            .await
            .map_err(body_error)?;

        let url = route.upstream_url(parts.uri.path(), parts.uri.query());
        tracing::debug!(method = %parts.method, %url, "forwarding to inference service");

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        // reqwest sets Host from the target URL and recomputes the length.
        headers.remove(header::HOST);
        headers.remove(header::CONTENT_LENGTH);

        let upstream = self
            .client
            .request(parts.method, url)
            .headers(headers)
            .timeout(route.timeout)
            .body(body)
            .send()
            .await?;

        let mut response = Response::builder().status(upstream.status());
        if let Some(out) = response.headers_mut() {
            let mut upstream_headers = upstream.headers().clone();
            strip_hop_by_hop(&mut upstream_headers);
            out.extend(upstream_headers);
        }

        let body = Body::from_stream(upstream.bytes_stream());
        Ok(response
            .body(body)
            .unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response()))
    }
}

// Bodies without a Content-Length only hit the limit while being read.
fn body_error(err: axum::Error) -> ProxyError {
    let inner = err.into_inner();
    if inner.downcast_ref::<LengthLimitError>().is_some() {
        ProxyError::TooLarge
    } else {
        ProxyError::Body(axum::Error::new(inner))
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// One pair of routes per table entry: the bare prefix and everything below it.
pub fn proxy_router(gateway: Arc<ProxyGateway>) -> Router {
    let mut router: Router<Arc<ProxyGateway>> = Router::new();

    for (index, route) in gateway.routes().iter().enumerate() {
        let handler = move |State(gateway): State<Arc<ProxyGateway>>, req: Request<Body>| async move {
            let route = &gateway.routes()[index];
            gateway.forward(route, req).await
        };
        router = router
            .route(&route.prefix, any(handler.clone()))
            .route(&format!("{}/{{*rest}}", route.prefix), any(handler));
    }

    router.with_state(gateway)
}
