//! HTTP transport for the function.
//!
//! Exposes `POST /run-function`, taking a JSON encoded [`RunFunctionRequest`]
//! and answering with a JSON encoded [`RunFunctionResponse`], and
//! `GET /health`.

use std::{
    future::Future,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
};

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use snafu::{ResultExt, Snafu};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::{
    function::Function,
    proto::{RunFunctionRequest, RunFunctionResponse},
    signal::SignalWatcher,
};

#[derive(Debug, Snafu)]
pub enum ServerError {
    #[snafu(display("failed to bind TCP listener to {socket_addr}"))]
    BindTcpListener {
        source: std::io::Error,
        socket_addr: SocketAddr,
    },

    #[snafu(display("failed to run server"))]
    RunServer { source: std::io::Error },
}

#[derive(Clone)]
struct AppState {
    function: Arc<Function>,
    shutdown: SignalWatcher,
}

/// Serves a [`Function`] until the shutdown signal fires.
pub struct FunctionServer {
    router: Router,
    socket_addr: SocketAddr,
}

impl FunctionServer {
    /// The default socket address the server binds to.
    pub const DEFAULT_SOCKET_ADDRESS: SocketAddr =
        SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 9443);

    /// Creates the server.
    ///
    /// Invocations still in flight when `shutdown` fires are cancelled.
    pub fn new(
        function: Arc<Function>,
        socket_addr: SocketAddr,
        shutdown: SignalWatcher,
    ) -> Self {
        Self {
            router: router(function, shutdown),
            socket_addr,
        }
    }

    /// Binds to the configured address and serves requests until `shutdown`
    /// completes.
    pub async fn run<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let socket_addr = self.socket_addr;
        let listener = TcpListener::bind(socket_addr)
            .await
            .context(BindTcpListenerSnafu { socket_addr })?;

        tracing::info!(%socket_addr, "function server listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
            .context(RunServerSnafu)?;

        tracing::info!("function server stopped");
        Ok(())
    }
}

fn router(function: Arc<Function>, shutdown: SignalWatcher) -> Router {
    Router::new()
        .route("/run-function", post(run_function))
        .with_state(AppState { function, shutdown })
        .layer(TraceLayer::new_for_http())
        // Below the trace layer, so health checks are not traced
        .route("/health", get(|| async { "ok" }))
}

async fn run_function(
    State(state): State<AppState>,
    Json(request): Json<RunFunctionRequest>,
) -> Json<RunFunctionResponse> {
    let cancel = state.shutdown.handle();
    Json(state.function.run_function(request, cancel).await)
}
