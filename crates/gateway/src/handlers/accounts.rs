//! Registration, confirmation and login handlers

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::AppState;
use docshelf_common::{
    auth::{expired_cookie, read_cookie, session_cookie, AuthContext, Credentials, PendingRegistration},
    errors::Result,
};

/// Start a registration; the confirmation link is sent by email
pub async fn register(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<(StatusCode, Json<PendingRegistration>)> {
    let pending = state.accounts.register(&credentials).await?;
    Ok((StatusCode::ACCEPTED, Json(pending)))
}

#[derive(Debug, Deserialize)]
pub struct ConfirmParams {
    #[serde(rename = "ref")]
    pub reference: String,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub admin: bool,
}

pub async fn confirm(
    State(state): State<AppState>,
    Query(params): Query<ConfirmParams>,
) -> Result<(StatusCode, Json<UserResponse>)> {
    let user = state.accounts.confirm(&params.reference).await?;
    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            id: user.id,
            email: user.email,
            admin: user.admin,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<impl IntoResponse> {
    let login = state.accounts.login(&credentials).await?;
    let cookie = session_cookie(
        state.accounts.cookie_name(),
        &login.token,
        state.accounts.session_ttl_secs(),
    );
    Ok(([(header::SET_COOKIE, cookie)], Json::<AuthContext>(login.context)))
}

#[derive(Serialize)]
pub struct LogoutResponse {
    pub logged_out: bool,
}

/// Drop the current session (if any) and clear the cookie
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<impl IntoResponse> {
    let name = state.accounts.cookie_name();
    let logged_out = match read_cookie(&headers, name) {
        Some(token) => state.accounts.logout(&token).await?,
        None => false,
    };
    Ok((
        [(header::SET_COOKIE, expired_cookie(name))],
        Json(LogoutResponse { logged_out }),
    ))
}
