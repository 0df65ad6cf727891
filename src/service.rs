//! HTTP query endpoint — the server half of the remote transport mode.
//!
//! Exposes `POST /query` taking the transport's `{query, variables,
//! operationName}` JSON body and answering with the bare `{data, errors}`
//! result object (HTTP itself correlates request and response, so no id
//! wrapper on this path).

use std::{net::SocketAddr, sync::Arc};

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use tower_http::trace::TraceLayer;

use crate::{
    error::OpenRefError,
    transport::{QueryExecutor, QueryPayload, QueryResult},
};

#[derive(Clone)]
struct ServiceState {
    executor: Arc<dyn QueryExecutor>,
}

/// Build the query router around a shared executor.
pub fn router(executor: Arc<dyn QueryExecutor>) -> Router {
    Router::new()
        .route("/query", post(query_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(ServiceState { executor })
}

async fn query_handler(
    State(state): State<ServiceState>,
    Json(payload): Json<QueryPayload>,
) -> Result<Json<QueryResult>, (StatusCode, String)> {
    tracing::debug!(
        operation = payload.operation_name.as_deref().unwrap_or("<anonymous>"),
        "Executing query over HTTP"
    );
    match state
        .executor
        .execute(&payload.query, payload.variables)
        .await
    {
        Ok(result) => Ok(Json(result)),
        Err(e) => Err((e.status_code(), e.to_string())),
    }
}

/// Serve the query endpoint until the shutdown signal resolves.
pub async fn serve(
    addr: SocketAddr,
    executor: Arc<dyn QueryExecutor>,
    shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), OpenRefError> {
    let app = router(executor);
    tracing::info!("Query service starting on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal)
        .await?;
    tracing::info!("Query service shut down");
    Ok(())
}
