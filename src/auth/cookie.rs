use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

use crate::config::AppConfig;

pub const SESSION_COOKIE: &str = "token";

/// `HttpOnly`, `SameSite=Lax` cookie carrying the session JWT.
pub fn session_cookie(token: String, config: &AppConfig) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.cookie.secure)
        .max_age(Duration::minutes(config.jwt.ttl_minutes))
        .build()
}

/// Same cookie, emptied and already expired.
pub fn cleared_cookie(config: &AppConfig) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.cookie.secure)
        .max_age(Duration::ZERO)
        .build()
}
