use axum::{
    Extension, Json,
    extract::{Query, State},
    response::IntoResponse,
};
use jsonwebtoken::{EncodingKey, Header, encode};
use portal_core::PortalError;
use portal_core::oauth;
use portal_types::api::{AuthorizeUrlResponse, Claims, LoginResponse, OauthCallbackQuery};
use portal_types::models::User;

use crate::AppState;
use crate::error::ApiError;

/// POST /auth/dev — only routed when dev mode was enabled at startup.
pub async fn dev_login(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let user = state.identity.resolve_dev().await?;
    let token = create_token(&state.session_secret, &user)?;
    Ok(Json(login_response(user, token)))
}

/// GET /auth/google — where to send the browser.
pub async fn google_authorize(
    State(state): State<AppState>,
) -> Result<Json<AuthorizeUrlResponse>, ApiError> {
    let google = state
        .google
        .as_ref()
        .ok_or(PortalError::ConfigurationMissing("Google OAuth"))?;

    let authorize_url = google.authorize_url(&oauth::random_state());
    Ok(Json(AuthorizeUrlResponse { authorize_url }))
}

/// GET /auth/google/callback — exchange the code, establish the session.
pub async fn google_callback(
    State(state): State<AppState>,
    Query(query): Query<OauthCallbackQuery>,
) -> Result<Json<LoginResponse>, ApiError> {
    let google = state
        .google
        .as_ref()
        .ok_or(PortalError::ConfigurationMissing("Google OAuth"))?;

    let identity = google.exchange_code(&query.code).await?;
    let user = state.identity.resolve_provider(&identity).await?;
    let token = create_token(&state.session_secret, &user)?;
    Ok(Json(login_response(user, token)))
}

/// GET /me — the identity behind the current session.
pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<User>, ApiError> {
    let user = state
        .identity
        .user_by_id(claims.sub)
        .await?
        .ok_or(PortalError::Unauthenticated)?;
    Ok(Json(user))
}

fn login_response(user: User, token: String) -> LoginResponse {
    LoginResponse {
        user_id: user.id,
        email: user.email,
        display_name: user.display_name,
        token,
    }
}

fn create_token(secret: &str, user: &User) -> Result<String, PortalError> {
    let claims = Claims {
        sub: user.id,
        email: user.email.clone(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| PortalError::Internal(e.into()))
}
