//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the gate ahead of every handler
//! - Wire up middleware (tracing, timeout, request ID)
//! - Forward admitted requests upstream, or echo them when no upstream is set
//! - Serve until the shutdown signal fires

use axum::{
    body::Body,
    extract::State,
    http::{
        uri::{Authority, PathAndQuery, Scheme},
        HeaderValue, Request, StatusCode, Uri,
    },
    middleware,
    response::{IntoResponse, Response},
    routing::any,
    Json, Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde_json::json;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::clock::Clock;
use crate::config::GuardConfig;
use crate::http::middleware::{gate_middleware, GateState};
use crate::http::request::{GatedRequest, MakeRequestUuid, X_REQUEST_ID};
use crate::http::response::error_response;
use crate::security::gate::RequestGate;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub client: Client<HttpConnector, Body>,
    pub upstream: Option<SocketAddr>,
    pub upstream_timeout: Duration,
}

/// HTTP front of the guard.
pub struct GuardServer {
    router: Router,
    config: GuardConfig,
}

impl GuardServer {
    pub fn new(config: GuardConfig, gate: Arc<RequestGate>, clock: Arc<dyn Clock>) -> Self {
        let upstream = config.upstream.address.as_deref().and_then(|addr| {
            addr.parse::<SocketAddr>()
                .map_err(|e| tracing::error!(address = %addr, error = %e, "Invalid upstream address, echoing instead"))
                .ok()
        });

        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        let state = AppState {
            client,
            upstream,
            upstream_timeout: Duration::from_secs(config.upstream.timeout_secs),
        };
        let gate_state = GateState {
            gate,
            clock,
            client_key: config.client_key.clone(),
            max_body_bytes: config.listener.max_body_bytes,
        };

        let router = Self::build_router(&config, state, gate_state);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GuardConfig, state: AppState, gate_state: GateState) -> Router {
        Router::new()
            .route("/{*path}", any(upstream_handler))
            .route("/", any(upstream_handler))
            .route_layer(middleware::from_fn_with_state(gate_state, gate_middleware))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.listener.request_timeout_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The fully layered router, for serving or driving in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = ?self.config.upstream.address,
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server received shutdown signal");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }
}

/// Handler behind the gate.
async fn upstream_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    match state.upstream {
        Some(upstream) => forward(&state, upstream, request).await,
        None => echo(request),
    }
}

/// Development mode: reflect what the gate admitted.
fn echo(request: Request<Body>) -> Response {
    let Some(gated) = request.extensions().get::<GatedRequest>() else {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
    };
    Json(json!({
        "client": gated.client_key,
        "method": request.method().as_str(),
        "path": request.uri().path(),
        "payload": gated.payload,
    }))
    .into_response()
}

async fn forward(state: &AppState, upstream: SocketAddr, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();
    let request_id = parts
        .headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let mut uri_parts = parts.uri.clone().into_parts();
    uri_parts.scheme = Some(Scheme::HTTP);
    match Authority::from_str(&upstream.to_string()) {
        Ok(authority) => uri_parts.authority = Some(authority),
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Invalid upstream authority");
            return error_response(StatusCode::BAD_GATEWAY, "Bad gateway");
        }
    }
    if uri_parts.path_and_query.is_none() {
        uri_parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }
    let uri = match Uri::from_parts(uri_parts) {
        Ok(uri) => uri,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Failed to build upstream URI");
            return error_response(StatusCode::BAD_GATEWAY, "Bad gateway");
        }
    };

    let mut builder = Request::builder().method(parts.method.clone()).uri(uri);
    if let Some(headers) = builder.headers_mut() {
        for (name, value) in parts.headers.iter() {
            headers.insert(name.clone(), value.clone());
        }
        if let Some(gated) = parts.extensions.get::<GatedRequest>() {
            if let Ok(value) = HeaderValue::from_str(&gated.client_key) {
                headers.insert("x-forwarded-for", value);
            }
        }
    }
    let upstream_request = match builder.body(body) {
        Ok(req) => req,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Failed to build upstream request");
            return error_response(StatusCode::BAD_GATEWAY, "Bad gateway");
        }
    };

    match tokio::time::timeout(state.upstream_timeout, state.client.request(upstream_request)).await {
        Ok(Ok(response)) => {
            let (parts, body) = response.into_parts();
            Response::from_parts(parts, Body::new(body))
        }
        Ok(Err(e)) => {
            tracing::error!(request_id = %request_id, upstream = %upstream, error = %e, "Upstream error");
            error_response(StatusCode::BAD_GATEWAY, "Bad gateway")
        }
        Err(_) => {
            tracing::error!(request_id = %request_id, upstream = %upstream, "Upstream timed out");
            error_response(StatusCode::GATEWAY_TIMEOUT, "Gateway timeout")
        }
    }
}
