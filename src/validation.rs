use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json,
};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::error::AppError;

/// JSON body that has passed its `validator` rules.
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(ValidatedJson(value))
    }
}

/// `deserialize_with` helper so length rules see the trimmed value.
pub(crate) fn trimmed<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(|s| s.trim().to_string())
}

pub(crate) fn trimmed_opt<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(|s| s.map(|s| s.trim().to_string()))
}

pub(crate) fn is_valid_username(username: &str) -> bool {
    lazy_static! {
        static ref USERNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9._-]{3,32}$").unwrap();
    }
    USERNAME_RE.is_match(username)
}

/// Rejects a username outside `[A-Za-z0-9._-]{3,32}` with a field issue.
pub(crate) fn check_username(username: &str) -> Result<(), AppError> {
    if is_valid_username(username) {
        return Ok(());
    }
    let mut error = ValidationError::new("regex");
    error.message =
        Some("Username must be 3-32 characters of letters, digits, '.', '_' or '-'".into());
    let mut errors = ValidationErrors::new();
    errors.add("username", error);
    Err(AppError::Validation(errors))
}
