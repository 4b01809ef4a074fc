use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Json, Router,
};
use serde_json::json;
use tracing::{debug, warn};

use super::routes::RouteTable;
use crate::config::GatewayConfig;

/// Connection-scoped headers that must not be relayed across a proxy hop.
const HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    header::TRANSFER_ENCODING,
    header::TE,
    header::TRAILER,
    header::UPGRADE,
    header::PROXY_AUTHORIZATION,
    header::PROXY_AUTHENTICATE,
];

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("no route for {path}")]
    NoRoute { path: String },
    #[error("upstream {upstream} failed: {source}")]
    Upstream {
        upstream: String,
        source: reqwest::Error,
    },
    #[error("failed to build upstream client: {0}")]
    Client(#[source] reqwest::Error),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match self {
            GatewayError::NoRoute { .. } => StatusCode::NOT_FOUND,
            GatewayError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::Client(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// Path-prefix reverse proxy. Requests and responses are streamed, never buffered.
#[derive(Debug, Clone)]
pub struct Gateway {
    routes: Arc<RouteTable>,
    client: reqwest::Client,
}

impl Gateway {
    pub fn new(routes: RouteTable, client: reqwest::Client) -> Self {
        Self {
            routes: Arc::new(routes),
            client,
        }
    }

    /// Uses the default route table. Redirects are relayed to the caller, not followed.
    ///
    /// An upstream that stays silent for `read_timeout` fails the request with 502.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(GatewayError::Client)?;
        Ok(Self::new(RouteTable::from_config(config), client))
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Forwards `request` to the upstream owning its path. Transport failures are not retried.
    pub async fn forward(&self, request: Request) -> Result<Response, GatewayError> {
        let (parts, body) = request.into_parts();
        let path = parts.uri.path();
        let route = self
            .routes
            .resolve(path)
            .ok_or_else(|| GatewayError::NoRoute {
                path: path.to_string(),
            })?;

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|value| value.as_str())
            .unwrap_or(path);
        let target = route.target(path_and_query);

        let mut headers = strip_hop_by_hop(parts.headers);
        // Host follows the new destination.
        headers.remove(header::HOST);

        debug!(method = %parts.method, %target, "forwarding request");
        let upstream = self
            .client
            .request(parts.method.clone(), target.as_str())
            .headers(headers)
            .body(reqwest::Body::wrap_stream(body.into_data_stream()))
            .send()
            .await
            .map_err(|source| {
                warn!(method = %parts.method, %target, error = %source, "upstream request failed");
                GatewayError::Upstream {
                    upstream: route.upstream().to_string(),
                    source,
                }
            })?;

        let status = upstream.status();
        let headers = strip_hop_by_hop(upstream.headers().clone());
        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

fn strip_hop_by_hop(mut headers: HeaderMap) -> HeaderMap {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in HOP_BY_HOP.iter().chain(listed.iter()) {
        headers.remove(name);
    }
    headers.remove("keep-alive");
    headers.remove("proxy-connection");
    headers
}

/// Router sending every request through the gateway.
pub fn gateway_router(gateway: Gateway) -> Router {
    Router::new()
        .fallback(proxy_handler)
        .with_state(Arc::new(gateway))
}

async fn proxy_handler(State(gateway): State<Arc<Gateway>>, request: Request) -> Response {
    match gateway.forward(request).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}
