use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use axum_extra::extract::WithRejection;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::extractors::AdminUser,
    error::{AppError, AppResult},
    state::AppState,
    validation::ValidatedJson,
};

use super::{
    dto::{CreateUserRequest, ListUsersQuery, UpdateUserRequest, UserPage},
    model::{PublicUser, UserFilter},
    services,
};

const MAX_PAGE_SIZE: i64 = 100;

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/:id", put(update_user).delete(delete_user))
}

#[instrument(skip(state, _admin))]
pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
    WithRejection(Query(q), _): WithRejection<Query<ListUsersQuery>, AppError>,
) -> AppResult<Json<UserPage>> {
    let page = q.page.max(1);
    let page_size = q.page_size.clamp(1, MAX_PAGE_SIZE);
    let offset = (page - 1)
        .checked_mul(page_size)
        .ok_or_else(|| AppError::BadRequest("Page is out of range".into()))?;
    let search = q
        .search
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let filter = UserFilter {
        search,
        role: q.role,
        limit: page_size,
        offset,
    };
    let (rows, total) = state.users.list(&filter).await?;

    Ok(Json(UserPage {
        items: rows.into_iter().map(PublicUser::from).collect(),
        total,
        page,
        page_size,
    }))
}

#[instrument(skip(state, admin, body), fields(admin_id = %admin.0.id))]
pub async fn create_user(
    State(state): State<AppState>,
    admin: AdminUser,
    ValidatedJson(body): ValidatedJson<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<PublicUser>)> {
    let user = services::create_user(state.users.as_ref(), body).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state, admin, body), fields(admin_id = %admin.0.id))]
pub async fn update_user(
    State(state): State<AppState>,
    admin: AdminUser,
    WithRejection(Path(id), _): WithRejection<Path<Uuid>, AppError>,
    ValidatedJson(body): ValidatedJson<UpdateUserRequest>,
) -> AppResult<Json<PublicUser>> {
    let user = services::update_user(state.users.as_ref(), id, body).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, admin), fields(admin_id = %admin.0.id))]
pub async fn delete_user(
    State(state): State<AppState>,
    admin: AdminUser,
    WithRejection(Path(id), _): WithRejection<Path<Uuid>, AppError>,
) -> AppResult<StatusCode> {
    services::delete_user(state.users.as_ref(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}
