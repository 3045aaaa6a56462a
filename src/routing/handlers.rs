use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{delete, get, post},
    Json, Router,
};
use std::sync::Arc;

use super::context::{RoutingContext, RoutingError};
use super::protocol::{
    ErrorResponse, GetResponse, JoinParams, LeadersResponse, PutRequest, PutResponse,
    ENDPOINT_DELETE, ENDPOINT_GET, ENDPOINT_JOIN, ENDPOINT_LEADERS, ENDPOINT_PUT,
};
use crate::store::Command;

/// Builds the public HTTP surface around one routing context.
pub fn router(ctx: Arc<RoutingContext>) -> Router {
    Router::new()
        .route(ENDPOINT_PUT, post(handle_put))
        .route(&format!("{}/:key", ENDPOINT_GET), get(handle_get))
        .route(&format!("{}/:key", ENDPOINT_DELETE), delete(handle_delete))
        .route(ENDPOINT_JOIN, get(handle_join))
        .route(ENDPOINT_LEADERS, get(handle_leaders))
        .layer(Extension(ctx))
}

fn error_response(e: RoutingError) -> Response {
    let status = match &e {
        RoutingError::NotLeader => StatusCode::BAD_REQUEST,
        RoutingError::ClusterNotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (status, Json(ErrorResponse { error: e.to_string() })).into_response()
}

/// 307 keeps the method and body, so a redirected PUT stays a PUT.
fn redirect(addr: &str, path: &str) -> Response {
    Redirect::temporary(&format!("http://{}{}", addr, path)).into_response()
}

pub async fn handle_put(
    Extension(ctx): Extension<Arc<RoutingContext>>,
    Json(req): Json<PutRequest>,
) -> Response {
    match ctx.route(&req.key, true) {
        Ok(Some(addr)) => redirect(&addr, ENDPOINT_PUT),
        Ok(None) => {
            let cmd = Command::Set {
                key: req.key,
                value: req.value,
            };
            match ctx.process_cmd(&cmd, false).await {
                Ok(_) => (StatusCode::OK, Json(PutResponse { success: true })).into_response(),
                Err(e) => {
                    tracing::error!("put failed: {}", e);
                    error_response(e)
                }
            }
        }
        Err(e) => error_response(e),
    }
}

pub async fn handle_get(
    Extension(ctx): Extension<Arc<RoutingContext>>,
    Path(key): Path<String>,
) -> Response {
    match ctx.route(&key, false) {
        Ok(Some(addr)) => redirect(&addr, &format!("{}/{}", ENDPOINT_GET, key)),
        Ok(None) => {
            let cmd = Command::Get { key };
            // Reads bypass replication and hit the local table.
            match ctx.process_cmd(&cmd, true).await {
                Ok(Some(value)) => (
                    StatusCode::OK,
                    Json(GetResponse { value: Some(value) }),
                )
                    .into_response(),
                Ok(None) => {
                    (StatusCode::NOT_FOUND, Json(GetResponse { value: None })).into_response()
                }
                Err(e) => {
                    tracing::error!("get failed: {}", e);
                    error_response(e)
                }
            }
        }
        Err(e) => error_response(e),
    }
}

pub async fn handle_delete(
    Extension(ctx): Extension<Arc<RoutingContext>>,
    Path(key): Path<String>,
) -> Response {
    match ctx.route(&key, true) {
        Ok(Some(addr)) => redirect(&addr, &format!("{}/{}", ENDPOINT_DELETE, key)),
        Ok(None) => {
            let cmd = Command::Del { key };
            match ctx.process_cmd(&cmd, false).await {
                Ok(_) => (StatusCode::OK, Json(PutResponse { success: true })).into_response(),
                Err(e) => {
                    tracing::error!("delete failed: {}", e);
                    error_response(e)
                }
            }
        }
        Err(e) => error_response(e),
    }
}

pub async fn handle_join(
    Extension(ctx): Extension<Arc<RoutingContext>>,
    Query(params): Query<JoinParams>,
) -> Response {
    match ctx.replica_join(&params.addr) {
        Ok(()) => (StatusCode::OK, Json(PutResponse { success: true })).into_response(),
        Err(e) => {
            tracing::error!(addr = %params.addr, "replica join failed: {}", e);
            error_response(e)
        }
    }
}

pub async fn handle_leaders(Extension(ctx): Extension<Arc<RoutingContext>>) -> Response {
    let readiness = ctx.ledger().readiness();
    let leaders = ctx.ledger().leaders();

    (
        StatusCode::OK,
        Json(LeadersResponse {
            readiness: readiness.code().to_string(),
            leaders,
        }),
    )
        .into_response()
}
