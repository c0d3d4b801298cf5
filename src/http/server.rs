//! HTTP server adapter.
//!
//! # Responsibilities
//! - Serve one frozen App over Axum
//! - Buffer request bodies up to the configured limit
//! - Run the synchronous dispatcher off the async workers
//! - Wire up middleware (tracing, timeout) and graceful shutdown

use axum::{
    body::Body,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response as AxumResponse},
    Router,
};
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::ListenerConfig;
use crate::dispatch::Dispatcher;
use crate::http::request::{Request, X_REQUEST_ID};

#[derive(Clone)]
struct ServerState {
    dispatcher: Dispatcher,
    max_body_size: usize,
}

/// HTTP server for one App.
pub struct HttpServer {
    router: Router,
    config: ListenerConfig,
}

impl HttpServer {
    pub fn new(dispatcher: Dispatcher, config: ListenerConfig) -> Self {
        let state = ServerState {
            dispatcher,
            max_body_size: config.max_body_size,
        };
        let router = Self::build_router(&config, state);
        Self { router, config }
    }

    /// Every path and method goes to the dispatcher.
    #[allow(deprecated)]
    fn build_router(config: &ListenerConfig, state: ServerState) -> Router {
        Router::new()
            .fallback(dispatch_handler)
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
            .layer(TraceLayer::new_for_http())
    }

    /// The Axum router, for embedding or in-process tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    /// Serve until Ctrl+C.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        self.run_until(listener, shutdown_signal()).await
    }

    /// Serve until `shutdown` resolves.
    pub async fn run_until<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn dispatch_handler(
    State(state): State<ServerState>,
    request: axum::http::Request<Body>,
) -> AxumResponse {
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, state.max_body_size).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, limit = state.max_body_size, "Request body rejected");
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
        }
    };

    let request = Request::from_parts(parts, body);
    let request_id = request.id().to_string();
    let dispatcher = state.dispatcher.clone();

    match tokio::task::spawn_blocking(move || dispatcher.handle(request)).await {
        Ok(mut response) => {
            if let Err(e) = response.set_header(X_REQUEST_ID, &request_id) {
                tracing::warn!(error = %e, "Request id header rejected");
            }
            response.into_http()
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Dispatch task failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
    }
}

/// Wait for shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::App;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_router_dispatches() {
        let mut app = App::new("server");
        app.get("/hello/:name", |ctx| {
            Ok(format!("hi {}", ctx.param("name").unwrap_or("?")).into())
        })
        .unwrap();
        let server = HttpServer::new(app.into_dispatcher(), ListenerConfig::default());

        let response = server
            .router()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/hello/ann")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(X_REQUEST_ID));
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"hi ann");
    }

    #[tokio::test]
    async fn test_body_limit() {
        let mut app = App::new("server");
        app.post("/upload", |_| Ok("ok".into())).unwrap();
        let config = ListenerConfig {
            max_body_size: 4,
            ..ListenerConfig::default()
        };
        let server = HttpServer::new(app.into_dispatcher(), config);
        let response = server
            .router()
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/upload")
                    .body(Body::from("too large"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
