//! HTTP server for the interview control surface

use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use crate::config::UiConfig;
use crate::feedback::KeywordEvaluator;
use crate::session::SessionController;
use crate::ui::handlers;

/// Shared handler state
pub struct AppState {
    pub controller: SessionController,
    /// Source of the latest turn feedback, if the evaluator is installed
    pub evaluator: Option<Arc<KeywordEvaluator>>,
}

pub struct WebServer {
    config: UiConfig,
    state: Arc<AppState>,
}

impl WebServer {
    pub fn new(
        config: UiConfig,
        controller: SessionController,
        evaluator: Option<Arc<KeywordEvaluator>>,
    ) -> Self {
        Self {
            config,
            state: Arc::new(AppState { controller, evaluator }),
        }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Serve until `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = format!("{}:{}", self.config.bind_address, self.config.http_port);
        let listener = TcpListener::bind(&addr).await?;
        tracing::info!("Control surface listening on http://{}", listener.local_addr()?);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/interview", post(handlers::start_interview))
        .route("/stop-interview", post(handlers::stop_interview))
        .route("/api/status", get(handlers::get_status))
        .route("/api/devices", get(handlers::get_devices))
        .layer(cors)
        .with_state(state)
}
