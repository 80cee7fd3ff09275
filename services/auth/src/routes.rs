//! Authentication service routes

use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::{StatusCode, header},
    middleware,
    response::IntoResponse,
    routing::{delete, get, patch, post},
};
use axum_extra::{
    TypedHeader,
    extract::WithRejection,
    headers::{Authorization, Cookie, authorization::Bearer},
};
use common::{
    roles::{Feature, permissions_for},
    session::{CurrentSession, SESSION_COOKIE, clear_session_cookie, session_cookie},
};
use serde::Serialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::{
    AppState,
    error::{AuthError, AuthResult},
    middleware::{authorize, require_session},
    models::{LoginCredentials, RegisterRequest, UpdateUserStatus, UserResponse, UserSummary},
};

/// Response for user login
#[derive(Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub user: UserSummary,
    pub token: String,
}

/// Create the router for the authentication service
pub fn create_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/auth/session", get(session))
        .route("/auth/register", post(register))
        .route("/users", get(list_users))
        .route("/users/:id/status", patch(update_user_status))
        .route("/users/:id", delete(delete_user))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "auth-service"
    }))
}

/// User login endpoint
pub async fn login(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<LoginCredentials>, AuthError>,
) -> AuthResult<impl IntoResponse> {
    info!("Login attempt for user: {}", payload.username);

    let limiter_key = payload.username.to_lowercase();
    let allowed = state
        .rate_limiter
        .is_allowed(&limiter_key)
        .await
        .map_err(AuthError::Internal)?;
    if !allowed {
        return Err(AuthError::TooManyAttempts);
    }

    let outcome = state
        .authenticator
        .login(&payload.username, &payload.password)
        .await?;
    state.rate_limiter.reset(&limiter_key).await;

    let cookie = session_cookie(
        &outcome.session_id,
        state.settings.session_ttl(),
        state.settings.secure_cookies,
    );

    let response = LoginResponse {
        success: true,
        user: UserSummary::from(&outcome.user),
        token: outcome.token,
    };

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(response),
    ))
}

/// Current session endpoint
pub async fn session(Extension(current): Extension<CurrentSession>) -> impl IntoResponse {
    let data = &current.data;

    Json(json!({
        "success": true,
        "user": UserSummary {
            id: data.user_id,
            username: data.username.clone(),
            role: data.role,
            name: data.name.clone(),
        },
        "permissions": permissions_for(Some(data)),
    }))
}

/// Logout endpoint
pub async fn logout(
    State(state): State<AppState>,
    cookies: Option<TypedHeader<Cookie>>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
) -> AuthResult<impl IntoResponse> {
    info!("Logout request");

    let session_id = cookies
        .as_ref()
        .and_then(|TypedHeader(cookies)| cookies.get(SESSION_COOKIE));
    let token = bearer
        .as_ref()
        .map(|TypedHeader(Authorization(bearer))| bearer.token());

    state.authenticator.logout(session_id, token).await?;

    Ok((
        StatusCode::OK,
        [(
            header::SET_COOKIE,
            clear_session_cookie(state.settings.secure_cookies),
        )],
        Json(json!({"success": true, "message": "Logged out successfully"})),
    ))
}

/// Register a new user (admins only)
pub async fn register(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    WithRejection(Json(payload), _): WithRejection<Json<RegisterRequest>, AuthError>,
) -> AuthResult<impl IntoResponse> {
    authorize(&current, Feature::ManageUsers)?;

    let user = state.authenticator.register(payload).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({"success": true, "user": UserResponse::from(user)})),
    ))
}

/// List all users
pub async fn list_users(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
) -> AuthResult<impl IntoResponse> {
    authorize(&current, Feature::ManageUsers)?;

    let users: Vec<UserResponse> = state
        .users
        .list()
        .await?
        .into_iter()
        .map(UserResponse::from)
        .collect();

    Ok(Json(json!({"success": true, "users": users})))
}

/// Activate or deactivate a user
pub async fn update_user_status(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Path(id): Path<Uuid>,
    WithRejection(Json(payload), _): WithRejection<Json<UpdateUserStatus>, AuthError>,
) -> AuthResult<impl IntoResponse> {
    authorize(&current, Feature::ManageUsers)?;

    let user = state
        .users
        .set_active(id, payload.is_active)
        .await?
        .ok_or(AuthError::NotFound("User"))?;

    Ok(Json(
        json!({"success": true, "user": UserResponse::from(user)}),
    ))
}

/// Delete a user
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Path(id): Path<Uuid>,
) -> AuthResult<impl IntoResponse> {
    authorize(&current, Feature::ManageUsers)?;

    if !state.users.delete(id).await? {
        return Err(AuthError::NotFound("User"));
    }

    Ok(Json(
        json!({"success": true, "message": "User deleted successfully"}),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        authenticator::SessionAuthenticator,
        models::User,
        password::hash_password,
        rate_limiter::{RateLimiter, RateLimiterConfig},
        repositories::{UserStore, memory::MemoryUserStore},
        settings::Settings,
    };
    use axum::{
        body::{Body, to_bytes},
        http::Request,
    };
    use chrono::Utc;
    use common::{
        roles::Role,
        session::{MemorySessionStore, SessionResolver},
        token::{DEFAULT_TOKEN_EXPIRY, JwtConfig, JwtService},
    };
    use serde_json::Value;
    use std::{sync::Arc, time::Duration};
    use tower::ServiceExt;

    struct Harness {
        router: Router,
        users: MemoryUserStore,
    }

    async fn harness() -> Harness {
        let users = MemoryUserStore::new();
        let sessions = Arc::new(MemorySessionStore::new());
        let jwt_service = JwtService::new(JwtConfig {
            secret: "0123456789abcdef0123456789abcdef".to_string(),
            token_expiry: DEFAULT_TOKEN_EXPIRY,
        });
        let settings = Settings {
            bind_address: "127.0.0.1:0".to_string(),
            session_ttl_secs: 86_400,
            session_store_timeout_ms: 500,
            secure_cookies: false,
        };

        for (username, role) in [("admin", Role::Admin), ("cashier", Role::User)] {
            users
                .seed(User {
                    id: Uuid::new_v4(),
                    username: username.to_string(),
                    password_hash: hash_password("Passw0rd!").unwrap(),
                    name: username.to_uppercase(),
                    role,
                    is_active: true,
                    last_login: None,
                    created_at: Utc::now(),
                })
                .await;
        }

        let state = AppState {
            authenticator: SessionAuthenticator::new(
                Arc::new(users.clone()),
                sessions.clone(),
                jwt_service.clone(),
                settings.session_ttl(),
                settings.session_store_timeout(),
            ),
            resolver: SessionResolver::new(sessions, jwt_service, Duration::from_millis(500)),
            users: Arc::new(users.clone()),
            rate_limiter: RateLimiter::new(RateLimiterConfig::default()),
            settings,
        };

        Harness {
            router: create_router(state),
            users,
        }
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Option<String>, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, cookie, body)
    }

    fn login_request(username: &str, password: &str) -> Request<Body> {
        Request::post("/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({"username": username, "password": password}).to_string(),
            ))
            .unwrap()
    }

    async fn login_token(router: &Router, username: &str) -> String {
        let (_, _, body) = send(router, login_request(username, "Passw0rd!")).await;
        body["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn login_sets_cookie_and_returns_token() {
        let h = harness().await;

        let (status, cookie, body) = send(&h.router, login_request("admin", "Passw0rd!")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["user"]["username"], "admin");
        assert_eq!(body["user"]["role"], "admin");
        assert_eq!(body["user"]["name"], "ADMIN");
        assert!(body["token"].as_str().is_some());

        let cookie = cookie.unwrap();
        assert!(cookie.starts_with("sid="));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Max-Age=86400"));
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_user_are_indistinguishable() {
        let h = harness().await;

        let wrong_password = send(&h.router, login_request("admin", "wrongpw")).await;
        let unknown_user = send(&h.router, login_request("ghost", "wrongpw")).await;

        assert_eq!(wrong_password.0, StatusCode::UNAUTHORIZED);
        assert_eq!(
            wrong_password.2,
            json!({"success": false, "message": "Invalid credentials"})
        );
        assert_eq!(wrong_password.0, unknown_user.0);
        assert_eq!(wrong_password.2, unknown_user.2);
    }

    #[tokio::test]
    async fn malformed_login_body_uses_the_error_envelope() {
        let h = harness().await;

        let (status, _, body) = send(
            &h.router,
            Request::post("/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"username": 5}"#))
                .unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Validation failed");
        assert_eq!(body["errors"][0]["field"], "body");
    }

    #[tokio::test]
    async fn repeated_failures_are_rate_limited() {
        let h = harness().await;

        for _ in 0..5 {
            let (status, _, _) = send(&h.router, login_request("admin", "wrongpw")).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }
        let (status, _, _) = send(&h.router, login_request("admin", "Passw0rd!")).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn session_endpoint_accepts_cookie_or_token() {
        let h = harness().await;
        let (_, cookie, body) = send(&h.router, login_request("cashier", "Passw0rd!")).await;
        let sid = cookie.unwrap().split(';').next().unwrap().to_string();
        let token = body["token"].as_str().unwrap().to_string();

        let by_cookie = Request::get("/auth/session")
            .header(header::COOKIE, sid)
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(&h.router, by_cookie).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["username"], "cashier");
        assert_eq!(body["permissions"]["record_payments"], true);
        assert_eq!(body["permissions"]["manage_users"], false);

        let by_token = Request::get("/auth/session")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        let (status, _, _) = send(&h.router, by_token).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn session_endpoint_requires_authentication() {
        let h = harness().await;

        let (status, _, body) = send(
            &h.router,
            Request::get("/auth/session").body(Body::empty()).unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn logout_clears_cookie_and_revokes_token() {
        let h = harness().await;
        let token = login_token(&h.router, "admin").await;

        let (status, cookie, _) = send(
            &h.router,
            Request::post("/auth/logout")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(cookie.unwrap().contains("Max-Age=0"));

        let (status, _, _) = send(
            &h.router,
            Request::get("/auth/session")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn cookie_logout_also_ends_the_login_token() {
        let h = harness().await;
        let (_, cookie, body) = send(&h.router, login_request("admin", "Passw0rd!")).await;
        let sid = cookie.unwrap().split(';').next().unwrap().to_string();
        let token = body["token"].as_str().unwrap().to_string();

        let (status, _, _) = send(
            &h.router,
            Request::post("/auth/logout")
                .header(header::COOKIE, sid)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _, _) = send(
            &h.router,
            Request::get("/auth/session")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn register_is_admin_only() {
        let h = harness().await;
        let payload = json!({
            "username": "new_clerk",
            "password": "Cl3rk!pass",
            "name": "New Clerk",
            "role": "user"
        })
        .to_string();

        let cashier = login_token(&h.router, "cashier").await;
        let (status, _, _) = send(
            &h.router,
            Request::post("/auth/register")
                .header(header::AUTHORIZATION, format!("Bearer {}", cashier))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(payload.clone()))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let admin = login_token(&h.router, "admin").await;
        let register = || {
            Request::post("/auth/register")
                .header(header::AUTHORIZATION, format!("Bearer {}", admin))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(payload.clone()))
                .unwrap()
        };

        let (status, _, body) = send(&h.router, register()).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["user"]["is_active"], false);
        assert!(body["user"].get("password_hash").is_none());

        let (status, _, body) = send(&h.router, register()).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["message"], "Username already exists");
    }

    #[tokio::test]
    async fn admin_can_deactivate_and_delete_users() {
        let h = harness().await;
        let admin = login_token(&h.router, "admin").await;
        let cashier_id = h
            .users
            .find_by_username("cashier")
            .await
            .unwrap()
            .unwrap()
            .id;

        let (status, _, body) = send(
            &h.router,
            Request::patch(format!("/users/{}/status", cashier_id))
                .header(header::AUTHORIZATION, format!("Bearer {}", admin))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({"is_active": false}).to_string()))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["is_active"], false);

        let (status, _, _) = send(&h.router, login_request("cashier", "Passw0rd!")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let delete = || {
            Request::delete(format!("/users/{}", cashier_id))
                .header(header::AUTHORIZATION, format!("Bearer {}", admin))
                .body(Body::empty())
                .unwrap()
        };
        assert_eq!(send(&h.router, delete()).await.0, StatusCode::OK);
        assert_eq!(send(&h.router, delete()).await.0, StatusCode::NOT_FOUND);
    }
}
