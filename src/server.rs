//! Scoped HTTP listener for the mock responder.
//!
//! The listener runs on its own thread with a current-thread runtime, so a
//! [`MockServer`] can be started from synchronous or asynchronous tests
//! alike. Dropping the server stops the listener, releases the port and tears
//! the registry down.

use crate::config::ServiceSettings;
use crate::error::Result;
use crate::interaction::Interaction;
use crate::registry::{InteractionHandle, InteractionRegistry, InvocationReport, RecordedRequest};
use crate::responder::{MockRequest, MockResponder};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use tokio::runtime::Builder;
use tokio::sync::oneshot;
use tracing::{debug, error, info};

#[derive(Clone)]
struct ServerState {
    registry: Arc<Mutex<InteractionRegistry>>,
    responder: Arc<MockResponder>,
}

/// A running mock provider bound to a local port.
pub struct MockServer {
    addr: SocketAddr,
    registry: Arc<Mutex<InteractionRegistry>>,
    shutdown: Option<oneshot::Sender<()>>,
    join: Option<thread::JoinHandle<()>>,
}

impl MockServer {
    /// Bind the listener and start serving an empty registry.
    pub fn start(settings: &ServiceSettings) -> Result<Self> {
        let listener = StdTcpListener::bind((settings.host.as_str(), settings.port))?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;

        let registry = Arc::new(Mutex::new(InteractionRegistry::new()));
        let state = ServerState {
            registry: Arc::clone(&registry),
            responder: Arc::new(MockResponder::new(settings)),
        };
        let app = Router::new().fallback(serve_request).with_state(state);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let join = thread::Builder::new()
            .name("mock-server".to_string())
            .spawn(move || {
                let runtime = match Builder::new_current_thread().enable_all().build() {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        error!(error = %e, "Failed to build mock server runtime");
                        return;
                    }
                };
                runtime.block_on(async move {
                    let listener = match tokio::net::TcpListener::from_std(listener) {
                        Ok(listener) => listener,
                        Err(e) => {
                            error!(error = %e, "Failed to adopt mock listener");
                            return;
                        }
                    };
                    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                        let _ = shutdown_rx.await;
                    });
                    if let Err(e) = server.await {
                        error!(error = %e, "Mock server stopped with error");
                    }
                });
            })?;

        info!(addr = %addr, "Mock server listening");

        Ok(Self {
            addr,
            registry,
            shutdown: Some(shutdown_tx),
            join: Some(join),
        })
    }

    /// Socket address the listener is bound to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL, e.g. `http://127.0.0.1:1234`.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// URL for a path on this server.
    pub fn url(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base_url(), path_and_query)
    }

    /// Register an interaction.
    pub fn register(&self, interaction: Interaction) -> Result<InteractionHandle> {
        self.registry().register(interaction)
    }

    /// Snapshot of the registered interactions.
    pub fn interactions(&self) -> Vec<Interaction> {
        self.registry().all().into_iter().cloned().collect()
    }

    /// Requests matched to an interaction.
    pub fn received(&self, handle: InteractionHandle) -> Vec<RecordedRequest> {
        self.registry()
            .received(handle)
            .map(<[RecordedRequest]>::to_vec)
            .unwrap_or_default()
    }

    pub fn times_received(&self, handle: InteractionHandle) -> usize {
        self.registry().times_received(handle)
    }

    /// See [`InteractionRegistry::invocation_report`].
    pub fn invocation_report(&self) -> InvocationReport {
        self.registry().invocation_report()
    }

    /// Reset between scenarios of the same run.
    pub fn clear(&self) {
        self.registry().clear();
    }

    /// Stop the listener and wait for it to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    /// Lock the registry for direct access.
    pub fn registry(&self) -> MutexGuard<'_, InteractionRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stop(&mut self) {
        self.registry().tear_down();
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                error!("Mock server thread panicked");
            }
            debug!(addr = %self.addr, "Mock server stopped");
        }
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn serve_request(
    State(state): State<ServerState>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    let request = MockRequest {
        method: method.as_str().to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        body: (!body.is_empty()).then(|| String::from_utf8_lossy(&body).into_owned()),
    };

    let response = {
        let mut registry = state.registry.lock().unwrap_or_else(PoisonError::into_inner);
        state.responder.handle(&mut registry, &request)
    };

    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, [(header::CONTENT_TYPE, response.content_type)], response.body).into_response()
}
