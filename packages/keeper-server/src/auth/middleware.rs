//! Bearer-token middleware: the auth interceptor.
//!
//! Runs ahead of every protected handler: extracts the `authorization`
//! header, requires the `Bearer ` prefix, validates the access token, and
//! attaches the subject to the request as a typed extension. Routes that
//! skip authentication (login, register, refresh, health) simply sit outside
//! this layer.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

use keeper_core::error::{Error, Result};

use crate::api::ApiError;
use crate::state::AppState;

/// The authenticated username, inserted into request extensions by
/// [`require_auth`]. Handlers read it through `Extension<AuthUser>`; a
/// missing value is a routing bug, not a runtime condition.
#[derive(Debug, Clone)]
pub struct AuthUser(pub String);

/// Extract and validate the bearer token, then pass the request on with the
/// subject attached.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> std::result::Result<Response, ApiError> {
    let token = bearer_token(request.headers())?;
    let username = state.auth.validate_access_token(token)?;

    request.extensions_mut().insert(AuthUser(username));
    Ok(next.run(request).await)
}

fn bearer_token(headers: &HeaderMap) -> Result<&str> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| Error::Unauthenticated("authorization token is not provided".into()))?;

    let header = header
        .to_str()
        .map_err(|_| Error::Unauthenticated("invalid authorization format".into()))?;

    header
        .strip_prefix("Bearer ")
        .ok_or_else(|| Error::Unauthenticated("invalid authorization format".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&headers).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn test_missing_header_rejected() {
        let headers = HeaderMap::new();
        assert!(matches!(
            bearer_token(&headers),
            Err(Error::Unauthenticated(_))
        ));
    }

    #[test]
    fn test_malformed_header_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(matches!(
            bearer_token(&headers),
            Err(Error::Unauthenticated(_))
        ));
    }
}
