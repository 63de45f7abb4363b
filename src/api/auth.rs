use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::auth::{AuthProvider, Credentials, Session, User};
use crate::store::DataStore;
use axum::{
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    routing::{get, post},
    Json, Router,
};
use tracing::info;

/// Signed-in admin, resolved from a `Bearer` token by the auth provider.
#[derive(Debug, Clone)]
pub struct AdminUser {
    pub user: User,
    pub access_token: String,
}

fn bearer_token(parts: &Parts) -> ApiResult<String> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".into()))?;

    header
        .strip_prefix("Bearer ")
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            ApiError::Unauthorized("Invalid Authorization format. Expected: Bearer <token>".into())
        })
}

#[axum::async_trait]
impl<S: DataStore, A: AuthProvider> FromRequestParts<AppState<S, A>> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<S, A>,
    ) -> Result<Self, Self::Rejection> {
        let access_token = bearer_token(parts)?;
        let user = state.auth.user_for_token(&access_token).await?;
        Ok(AdminUser { user, access_token })
    }
}

async fn sign_in<S: DataStore, A: AuthProvider>(
    State(state): State<AppState<S, A>>,
    Json(credentials): Json<Credentials>,
) -> ApiResult<Json<Session>> {
    if credentials.email.trim().is_empty() || credentials.password.is_empty() {
        return Err(ApiError::validation("Email and password are required"));
    }
    let session = state
        .auth
        .sign_in(credentials.email.trim(), &credentials.password)
        .await?;
    info!(user_id = %session.user.id, "Admin signed in");
    Ok(Json(session))
}

async fn sign_out<S: DataStore, A: AuthProvider>(
    State(state): State<AppState<S, A>>,
    admin: AdminUser,
) -> ApiResult<StatusCode> {
    state.auth.sign_out(&admin.access_token).await?;
    info!(user_id = %admin.user.id, "Admin signed out");
    Ok(StatusCode::NO_CONTENT)
}

async fn current_user(admin: AdminUser) -> Json<User> {
    Json(admin.user)
}

pub fn router<S: DataStore, A: AuthProvider>() -> Router<AppState<S, A>> {
    Router::new()
        .route("/auth/sign-in", post(sign_in::<S, A>))
        .route("/auth/sign-out", post(sign_out::<S, A>))
        .route("/auth/user", get(current_user))
}
