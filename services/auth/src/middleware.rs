//! Middleware resolving the session cookie or bearer token

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, Cookie, authorization::Bearer},
};
use common::{
    roles::{Feature, has_permission},
    session::{CurrentSession, ResolveError, SESSION_COOKIE},
};
use tracing::warn;

use crate::{AppState, error::AuthError};

/// Reject the request unless it carries a live session or a valid token.
///
/// The resolved [`CurrentSession`] is inserted into the request extensions.
pub async fn require_session(
    State(state): State<AppState>,
    cookies: Option<TypedHeader<Cookie>>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let session_id = cookies
        .as_ref()
        .and_then(|TypedHeader(cookies)| cookies.get(SESSION_COOKIE));
    let token = bearer
        .as_ref()
        .map(|TypedHeader(Authorization(bearer))| bearer.token());

    let current = state
        .resolver
        .resolve(session_id, token)
        .await
        .map_err(|e| match e {
            ResolveError::NotAuthenticated => AuthError::NotAuthenticated,
            ResolveError::Store(cause) => AuthError::Internal(cause),
        })?;

    req.extensions_mut().insert(current);

    Ok(next.run(req).await)
}

/// Route guard: the session's role must be allowed to use `feature`
pub fn authorize(session: &CurrentSession, feature: Feature) -> Result<(), AuthError> {
    if has_permission(Some(&session.data), feature.allowed_roles()) {
        Ok(())
    } else {
        warn!(
            "User {} ({}) denied access to {:?}",
            session.data.username, session.data.role, feature
        );
        Err(AuthError::Forbidden)
    }
}
