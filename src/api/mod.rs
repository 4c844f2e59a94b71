//! REST API surface
//!
//! Every entity type gets the same set of routes under `/api`; see
//! [`routes`]. Handlers run service calls on the blocking pool since the
//! stores use synchronous SQLite connections.

pub mod error;
mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderName, HeaderValue},
    middleware,
    response::Response,
    Router,
};
use miette::{IntoDiagnostic, Result};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::core::identity::EntityKind;
use crate::core::service::ResourceService;

pub use error::{ApiError, ErrorResponse};

/// Shared state of the HTTP server
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ResourceService>,
    /// Prefix of the alert headers, e.g. `X-smartParkingApp-alert`
    pub application_name: Arc<str>,
}

impl AppState {
    pub fn new(service: ResourceService, application_name: impl Into<Arc<str>>) -> Self {
        Self {
            service: Arc::new(service),
            application_name: application_name.into(),
        }
    }
}

/// Outcome attached to a response, turned into alert headers on the way out
#[derive(Debug, Clone)]
pub(crate) enum Alert {
    Created { entity: EntityKind, id: i64 },
    Updated { entity: EntityKind, id: i64 },
    Deleted { entity: EntityKind, id: i64 },
    Failure {
        entity: Option<EntityKind>,
        key: &'static str,
    },
}

impl Alert {
    /// `(header suffix, value)` pairs
    fn headers(&self, application: &str) -> Vec<(&'static str, String)> {
        let success = |entity: &EntityKind, action: &str, id: &i64| {
            vec![
                ("alert", format!("{}.{}.{}", application, entity, action)),
                ("params", id.to_string()),
            ]
        };
        match self {
            Alert::Created { entity, id } => success(entity, "created", id),
            Alert::Updated { entity, id } => success(entity, "updated", id),
            Alert::Deleted { entity, id } => success(entity, "deleted", id),
            Alert::Failure { entity, key } => {
                let mut headers = vec![("error", format!("error.{}", key))];
                if let Some(entity) = entity {
                    headers.push(("params", entity.to_string()));
                }
                headers
            }
        }
    }
}

async fn alert_headers(State(state): State<AppState>, mut response: Response) -> Response {
    if let Some(alert) = response.extensions_mut().remove::<Alert>() {
        for (suffix, value) in alert.headers(&state.application_name) {
            let name = format!("x-{}-{}", state.application_name, suffix);
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                (Ok(name), Ok(value)) => {
                    response.headers_mut().insert(name, value);
                }
                _ => warn!(header = %name, "skipping invalid alert header"),
            }
        }
    }
    response
}

/// Build the full router
pub fn router(state: AppState) -> Router {
    routes::all()
        .layer(middleware::map_response_with_state(
            state.clone(),
            alert_headers,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API until interrupted
pub async fn serve(state: AppState, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr).await.into_diagnostic()?;
    info!(%addr, "smart parking API listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .into_diagnostic()?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
