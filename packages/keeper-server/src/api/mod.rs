//! HTTP/WebSocket surface: route composition and the error-to-status
//! mapping shared by every handler.

pub mod handlers;
pub mod transfer;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use tower_http::trace::TraceLayer;

use keeper_core::error::{Error, ErrorKind};
use keeper_core::wire::ErrorResponse;

use crate::auth;
use crate::state::AppState;

/// Build the full application router.
///
/// The unauthenticated routes (register, login, refresh, health) sit outside
/// the bearer-token layer; everything else runs behind it.
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/api/auth/register", post(handlers::register))
        .route("/api/auth/login", post(handlers::login))
        .route("/api/auth/refresh", post(handlers::refresh))
        .route("/health", get(handlers::health));

    let protected = Router::new()
        .route("/api/secrets", post(handlers::create))
        .route("/api/secrets/:kind", get(handlers::list))
        .route(
            "/api/secrets/:kind/item",
            get(handlers::get_secret).delete(handlers::delete_secret),
        )
        .route("/ws/upload", get(transfer::upload))
        .route("/ws/download", get(transfer::download))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    public
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Error wrapper implementing the wire status mapping.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.kind() {
            ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorKind::AlreadyExists => StatusCode::CONFLICT,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Aborted => StatusCode::CONFLICT,
            ErrorKind::Canceled => StatusCode::REQUEST_TIMEOUT,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        } else {
            tracing::debug!(error = %self.0, status = %status, "request rejected");
        }

        (
            status,
            Json(ErrorResponse {
                error: format!("cannot perform the action: {}", self.0),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (Error::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (Error::Validation("x".into()), StatusCode::BAD_REQUEST),
            (Error::UserExists("m".into()), StatusCode::CONFLICT),
            (Error::SecretNotFound("p".into()), StatusCode::NOT_FOUND),
            (
                Error::ChunkHashMismatch { chunk_id: 1 },
                StatusCode::CONFLICT,
            ),
            (Error::Database("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            let response = ApiError(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
