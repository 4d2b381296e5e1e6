use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tracing::instrument;

use crate::{
    auth::extractors::AdminUser,
    error::AppResult,
    state::AppState,
    users::model::{PublicUser, Role, UserFilter},
};

const RECENT_USERS: i64 = 5;

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct RoleCounts {
    pub admin: i64,
    pub docente: i64,
    pub estudiante: i64,
}

impl RoleCounts {
    fn from_rows(rows: &[(Role, i64)]) -> Self {
        let mut counts = RoleCounts::default();
        for (role, n) in rows {
            match role {
                Role::Admin => counts.admin += n,
                Role::Docente => counts.docente += n,
                Role::Estudiante => counts.estudiante += n,
            }
        }
        counts
    }

    fn total(&self) -> i64 {
        self.admin + self.docente + self.estudiante
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total_users: i64,
    pub by_role: RoleCounts,
    pub recent_users: Vec<PublicUser>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/dashboard/summary", get(summary))
}

#[instrument(skip(state, _admin))]
pub async fn summary(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> AppResult<Json<DashboardSummary>> {
    let newest = UserFilter {
        limit: RECENT_USERS,
        ..Default::default()
    };
    let (counts, (recent, _)) =
        tokio::try_join!(state.users.count_by_role(), state.users.list(&newest))?;

    let by_role = RoleCounts::from_rows(&counts);
    Ok(Json(DashboardSummary {
        total_users: by_role.total(),
        by_role,
        recent_users: recent.into_iter().map(PublicUser::from).collect(),
    }))
}
