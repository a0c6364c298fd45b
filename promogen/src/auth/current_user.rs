use crate::{
    AppState,
    api::models::users::CurrentUser,
    auth::token::verify_session_token,
    errors::{Error, Result},
};
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::{debug, instrument, trace};

/// Extract the bearer token from the Authorization header
/// Returns:
/// - None: No Authorization header, or a non-bearer scheme
/// - Some(token): The raw token
fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let Some(token) = bearer_token(parts) else {
            trace!("No bearer token in request");
            return Err(Error::Unauthenticated { message: None });
        };

        let claims = verify_session_token(token, &state.config.auth)?;
        debug!("Authenticated user {}", claims.sub);
        Ok(CurrentUser { id: claims.sub })
    }
}
