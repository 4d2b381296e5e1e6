mod app;
mod auth;
mod config;
mod dashboard;
mod error;
mod state;
mod users;
mod validation;

use crate::{config::AppConfig, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "iusacademy=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = AppConfig::from_env()?;
    let admin_seed = config.admin_seed.clone();
    let app_state = AppState::init(config).await?;

    if let Some(seed) = admin_seed {
        users::services::ensure_admin(app_state.users.as_ref(), &seed).await?;
    }

    let app = app::build_app(app_state)?;
    app::serve(app).await
}
