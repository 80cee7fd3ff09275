//! Session middleware for the API service
//!
//! Requests are authenticated with the same resolver the auth service uses,
//! so a session cookie and a bearer token are both accepted here.

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
use tracing::{debug, warn};

use crate::{error::ApiError, state::AppState};

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<AppState>,
    cookies: Option<TypedHeader<Cookie>>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let session_id = cookies
        .as_ref()
        .and_then(|TypedHeader(cookies)| cookies.get(SESSION_COOKIE));
    let token = bearer
        .as_ref()
        .map(|TypedHeader(Authorization(bearer))| bearer.token());

    let current = match state.resolver.resolve(session_id, token).await {
        Ok(current) => current,
        Err(ResolveError::NotAuthenticated) => return Err(ApiError::NotAuthenticated),
        Err(ResolveError::Store(cause)) => return Err(ApiError::Internal(cause)),
    };
    debug!(
        "Request from {} via {:?}",
        current.data.username, current.channel
    );

    req.extensions_mut().insert(current);

    Ok(next.run(req).await)
}

/// Check the current session against a feature's allowed roles
pub fn require(session: &CurrentSession, feature: Feature) -> Result<(), ApiError> {
    if !has_permission(Some(&session.data), feature.allowed_roles()) {
        warn!(
            "{} ({}) is not allowed to use {:?}",
            session.data.username, session.data.role, feature
        );
        return Err(ApiError::Forbidden);
    }
    Ok(())
}
