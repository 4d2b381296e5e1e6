use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        cookie::{cleared_cookie, session_cookie},
        dto::{AuthResponse, LoginRequest, MessageResponse, RegisterRequest},
        extractors::AuthUser,
        jwt::JwtKeys,
        password::verify_password,
    },
    error::{AppError, AppResult},
    state::AppState,
    users::{
        dto::CreateUserRequest,
        model::{Role, User},
        services::{self, normalize_email},
    },
    validation::ValidatedJson,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/me", get(me))
        .route("/auth/logout", post(logout))
}

fn start_session(state: &AppState, jar: CookieJar, user: &User) -> AppResult<CookieJar> {
    let keys = JwtKeys::from_ref(state);
    let token = keys.sign(user.id, user.role).map_err(|e| {
        error!(error = %e, "jwt sign failed");
        AppError::Internal(e)
    })?;
    Ok(jar.add(session_cookie(token, &state.config)))
}

#[instrument(skip(state, jar, payload), fields(email = %payload.email))]
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(payload): ValidatedJson<RegisterRequest>,
) -> AppResult<(StatusCode, CookieJar, Json<AuthResponse>)> {
    let user = services::create_user(
        state.users.as_ref(),
        CreateUserRequest {
            first_name: payload.first_name,
            last_name: payload.last_name,
            username: payload.username,
            email: payload.email,
            password: payload.password,
            role: Some(Role::Estudiante),
        },
    )
    .await?;

    let jar = start_session(&state, jar, &user)?;
    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        jar,
        Json(AuthResponse { user: user.into() }),
    ))
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(payload): ValidatedJson<LoginRequest>,
) -> AppResult<(CookieJar, Json<AuthResponse>)> {
    let identifier = payload.identifier.trim();
    let found = if identifier.contains('@') {
        state.users.find_by_email(&normalize_email(identifier)).await?
    } else {
        state.users.find_by_username(identifier).await?
    };

    let Some(user) = found else {
        warn!(identifier = %identifier, "login unknown user");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    };

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }

    let jar = start_session(&state, jar, &user)?;
    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok((jar, Json(AuthResponse { user: user.into() })))
}

#[instrument(skip(state, auth), fields(user_id = %auth.id))]
pub async fn me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<AuthResponse>> {
    let user = state.users.find_by_id(auth.id).await?.ok_or_else(|| {
        warn!(user_id = %auth.id, "session user no longer exists");
        AppError::Unauthorized("User not found".into())
    })?;
    Ok(Json(AuthResponse { user: user.into() }))
}

#[instrument(skip(state, jar))]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> (CookieJar, Json<MessageResponse>) {
    let jar = jar.add(cleared_cookie(&state.config));
    (
        jar,
        Json(MessageResponse {
            message: "Logged out".into(),
        }),
    )
}
