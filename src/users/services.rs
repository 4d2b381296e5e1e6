use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::password::hash_password,
    config::AdminSeed,
    error::{AppError, AppResult},
    validation::check_username,
};

use super::{
    dto::{CreateUserRequest, UpdateUserRequest},
    model::{NewUser, Role, User, UserChanges},
    repo::UserStore,
};

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Checks email, then username, against users other than `except`.
///
/// Not transactional: a concurrent writer can still win the race, in which
/// case the unique constraint surfaces as the same 409.
async fn ensure_available(
    store: &dyn UserStore,
    email: Option<&str>,
    username: Option<&str>,
    except: Option<Uuid>,
) -> AppResult<()> {
    if let Some(email) = email {
        if let Some(existing) = store.find_by_email(email).await? {
            if Some(existing.id) != except {
                return Err(AppError::Conflict("Email already in use".into()));
            }
        }
    }
    if let Some(username) = username {
        if let Some(existing) = store.find_by_username(username).await? {
            if Some(existing.id) != except {
                return Err(AppError::Conflict("Username already in use".into()));
            }
        }
    }
    Ok(())
}

#[instrument(skip(store, req), fields(username = %req.username))]
pub async fn create_user(store: &dyn UserStore, req: CreateUserRequest) -> AppResult<User> {
    let email = normalize_email(&req.email);
    let username = req.username.trim().to_string();
    check_username(&username)?;

    ensure_available(store, Some(&email), Some(&username), None).await?;

    let password_hash = hash_password(&req.password)?;
    let user = store
        .create(NewUser {
            first_name: req.first_name.trim().to_string(),
            last_name: req.last_name.trim().to_string(),
            username,
            email,
            password_hash,
            role: req.role.unwrap_or_default(),
        })
        .await?;

    info!(user_id = %user.id, role = ?user.role, "user created");
    Ok(user)
}

#[instrument(skip(store, req))]
pub async fn update_user(
    store: &dyn UserStore,
    id: Uuid,
    req: UpdateUserRequest,
) -> AppResult<User> {
    if store.find_by_id(id).await?.is_none() {
        return Err(AppError::NotFound("User not found".into()));
    }

    let email = req.email.as_deref().map(normalize_email);
    let username = req.username.as_deref().map(|u| u.trim().to_string());
    if let Some(u) = &username {
        check_username(u)?;
    }
    ensure_available(store, email.as_deref(), username.as_deref(), Some(id)).await?;

    let password_hash = match req.password.as_deref() {
        Some(p) => Some(hash_password(p)?),
        None => None,
    };

    let changes = UserChanges {
        first_name: req.first_name.map(|s| s.trim().to_string()),
        last_name: req.last_name.map(|s| s.trim().to_string()),
        username,
        email,
        password_hash,
        role: req.role,
    };
    let rotated = changes.password_hash.is_some();

    // the row can vanish between the lookup and the write
    let user = store
        .update(id, changes)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    info!(user_id = %user.id, password_rotated = rotated, "user updated");
    Ok(user)
}

#[instrument(skip(store))]
pub async fn delete_user(store: &dyn UserStore, id: Uuid) -> AppResult<()> {
    if !store.delete(id).await? {
        return Err(AppError::NotFound("User not found".into()));
    }
    info!(user_id = %id, "user deleted");
    Ok(())
}

const MAX_USERNAME_LEN: usize = 32;

/// Username derived from an email local part: only `[A-Za-z0-9._-]` kept,
/// at most 32 chars, `admin` when fewer than 3 remain.
fn username_from_email(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default();
    let name: String = local
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .take(MAX_USERNAME_LEN)
        .collect();
    if name.len() < 3 {
        "admin".to_string()
    } else {
        name
    }
}

/// `base`, or `base` with the first free numeric suffix.
async fn free_username(store: &dyn UserStore, base: &str) -> AppResult<String> {
    if store.find_by_username(base).await?.is_none() {
        return Ok(base.to_string());
    }
    for n in 1..1000 {
        let suffix = n.to_string();
        let stem = &base[..base.len().min(MAX_USERNAME_LEN - suffix.len())];
        let candidate = format!("{stem}{suffix}");
        if store.find_by_username(&candidate).await?.is_none() {
            return Ok(candidate);
        }
    }
    Err(AppError::Conflict("Username already in use".into()))
}

/// Creates the configured administrator unless that email is already taken.
pub async fn ensure_admin(store: &dyn UserStore, seed: &AdminSeed) -> AppResult<Option<User>> {
    let email = normalize_email(&seed.email);
    if store.find_by_email(&email).await?.is_some() {
        return Ok(None);
    }
    let username = free_username(store, &username_from_email(&email)).await?;
    let user = create_user(
        store,
        CreateUserRequest {
            first_name: "Admin".into(),
            last_name: "IUSAcademy".into(),
            username,
            email,
            password: seed.password.clone(),
            role: Some(Role::Admin),
        },
    )
    .await?;
    info!(user_id = %user.id, "bootstrap admin created");
    Ok(Some(user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::password::verify_password, users::memory::MemoryUserStore};

    fn request(username: &str, email: &str) -> CreateUserRequest {
        CreateUserRequest {
            first_name: " Ana ".into(),
            last_name: "Torres".into(),
            username: username.into(),
            email: email.into(),
            password: "password-123".into(),
            role: None,
        }
    }

    #[tokio::test]
    async fn create_normalizes_and_hashes() {
        let store = MemoryUserStore::default();
        let user = create_user(&store, request("atorres", "  Ana@IUS.test ")).await.unwrap();
        assert_eq!(user.email, "ana@ius.test");
        assert_eq!(user.first_name, "Ana");
        assert_eq!(user.role, Role::Estudiante);
        assert!(verify_password("password-123", &user.password_hash).unwrap());
    }

    #[tokio::test]
    async fn create_rejects_duplicates_with_conflict() {
        let store = MemoryUserStore::default();
        create_user(&store, request("atorres", "ana@ius.test")).await.unwrap();

        let err = create_user(&store, request("other", "ANA@ius.test")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(m) if m == "Email already in use"));

        let err = create_user(&store, request("atorres", "b@ius.test")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(m) if m == "Username already in use"));
    }

    #[tokio::test]
    async fn create_rejects_malformed_username() {
        let store = MemoryUserStore::default();
        let err = create_user(&store, request("bad name", "x@ius.test")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn update_merges_and_rotates_password() {
        let store = MemoryUserStore::default();
        let user = create_user(&store, request("atorres", "ana@ius.test")).await.unwrap();

        let updated = update_user(
            &store,
            user.id,
            UpdateUserRequest {
                first_name: Some("Editado".into()),
                password: Some("nueva-clave-99".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.first_name, "Editado");
        assert_eq!(updated.last_name, "Torres");
        assert_eq!(updated.email, "ana@ius.test");
        assert!(verify_password("nueva-clave-99", &updated.password_hash).unwrap());
    }

    #[tokio::test]
    async fn update_allows_own_email_but_not_others() {
        let store = MemoryUserStore::default();
        let ana = create_user(&store, request("atorres", "ana@ius.test")).await.unwrap();
        create_user(&store, request("bruno", "bruno@ius.test")).await.unwrap();

        let same = UpdateUserRequest {
            email: Some("ana@ius.test".into()),
            ..Default::default()
        };
        assert!(update_user(&store, ana.id, same).await.is_ok());

        let taken = UpdateUserRequest {
            username: Some("bruno".into()),
            ..Default::default()
        };
        let err = update_user(&store, ana.id, taken).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn update_and_delete_missing_user_is_not_found() {
        let store = MemoryUserStore::default();
        let err = update_user(&store, Uuid::new_v4(), UpdateUserRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        let err = delete_user(&store, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn ensure_admin_is_idempotent() {
        let store = MemoryUserStore::default();
        let seed = AdminSeed {
            email: "Root@IUS.test".into(),
            password: "admin-password".into(),
        };
        let created = ensure_admin(&store, &seed).await.unwrap().expect("created");
        assert_eq!(created.role, Role::Admin);
        assert_eq!(created.username, "root");
        assert!(ensure_admin(&store, &seed).await.unwrap().is_none());
    }

    fn seed(email: &str) -> AdminSeed {
        AdminSeed {
            email: email.into(),
            password: "admin-password".into(),
        }
    }

    #[test]
    fn admin_username_is_sanitized() {
        assert_eq!(username_from_email("jo@ius.test"), "admin");
        assert_eq!(username_from_email("dean+admin@ius.test"), "deanadmin");
        assert_eq!(username_from_email("ñ+@ius.test"), "admin");
        assert_eq!(username_from_email(&format!("{}@ius.test", "a".repeat(40))).len(), 32);
    }

    #[tokio::test]
    async fn ensure_admin_boots_with_any_valid_email() {
        for email in ["jo@ius.test", "dean+admin@ius.test"] {
            let store = MemoryUserStore::default();
            let created = ensure_admin(&store, &seed(email)).await.unwrap().expect("created");
            assert_eq!(created.role, Role::Admin);
            assert!(check_username(&created.username).is_ok());
        }
    }

    #[tokio::test]
    async fn ensure_admin_skips_a_taken_username() {
        let store = MemoryUserStore::default();
        create_user(&store, request("root", "someone@ius.test")).await.unwrap();
        create_user(&store, request("root1", "other@ius.test")).await.unwrap();

        let created = ensure_admin(&store, &seed("root@ius.test")).await.unwrap().expect("created");
        assert_eq!(created.username, "root2");
        assert_eq!(created.email, "root@ius.test");
    }
}
