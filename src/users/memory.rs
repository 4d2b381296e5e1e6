use std::sync::Mutex;

use axum::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::users::model::{NewUser, Role, User, UserChanges, UserFilter};
use crate::users::repo::UserStore;

/// In-process store with the same uniqueness rules as the `users` table.
#[derive(Default)]
pub struct MemoryUserStore {
    rows: Mutex<Vec<User>>,
}

impl MemoryUserStore {
    fn check_unique(rows: &[User], id: Option<Uuid>, email: &str, username: &str) -> AppResult<()> {
        let others = move || rows.iter().filter(move |u| Some(u.id) != id);
        if others().any(|u| u.email == email) {
            return Err(AppError::Conflict("Email already in use".into()));
        }
        if others().any(|u| u.username == username) {
            return Err(AppError::Conflict("Username already in use".into()));
        }
        Ok(())
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().find(|u| u.email == email).cloned())
    }

    async fn find_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().find(|u| u.username == username).cloned())
    }

    async fn list(&self, filter: &UserFilter) -> AppResult<(Vec<User>, i64)> {
        let rows = self.rows.lock().unwrap();
        // newest first: rows are kept in insertion order
        let matching: Vec<User> = rows
            .iter()
            .rev()
            .filter(|u| filter.role.map_or(true, |r| u.role == r))
            .filter(|u| match filter.search.as_deref() {
                None => true,
                Some(q) => {
                    contains_ci(&u.first_name, q)
                        || contains_ci(&u.last_name, q)
                        || contains_ci(&u.username, q)
                        || contains_ci(&u.email, q)
                }
            })
            .cloned()
            .collect();
        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn create(&self, new: NewUser) -> AppResult<User> {
        let mut rows = self.rows.lock().unwrap();
        Self::check_unique(&rows, None, &new.email, &new.username)?;
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            first_name: new.first_name,
            last_name: new.last_name,
            username: new.username,
            email: new.email,
            password_hash: new.password_hash,
            role: new.role,
            created_at: now,
            updated_at: now,
        };
        rows.push(user.clone());
        Ok(user)
    }

    async fn update(&self, id: Uuid, changes: UserChanges) -> AppResult<Option<User>> {
        let mut rows = self.rows.lock().unwrap();
        let Some(current) = rows.iter().find(|u| u.id == id).cloned() else {
            return Ok(None);
        };
        let email = changes.email.unwrap_or(current.email);
        let username = changes.username.unwrap_or(current.username);
        Self::check_unique(&rows, Some(id), &email, &username)?;

        let Some(user) = rows.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        user.email = email;
        user.username = username;
        if let Some(v) = changes.first_name {
            user.first_name = v;
        }
        if let Some(v) = changes.last_name {
            user.last_name = v;
        }
        if let Some(v) = changes.password_hash {
            user.password_hash = v;
        }
        if let Some(v) = changes.role {
            user.role = v;
        }
        user.updated_at = OffsetDateTime::now_utc();
        Ok(Some(user.clone()))
    }

    async fn delete(&self, id: Uuid) -> AppResult<bool> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|u| u.id != id);
        Ok(rows.len() != before)
    }

    async fn count_by_role(&self) -> AppResult<Vec<(Role, i64)>> {
        let rows = self.rows.lock().unwrap();
        let mut counts: Vec<(Role, i64)> = Vec::new();
        for user in rows.iter() {
            match counts.iter_mut().find(|(r, _)| *r == user.role) {
                Some((_, n)) => *n += 1,
                None => counts.push((user.role, 1)),
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(username: &str, email: &str, role: Role) -> NewUser {
        NewUser {
            first_name: "Test".into(),
            last_name: "User".into(),
            username: username.into(),
            email: email.into(),
            password_hash: "hash".into(),
            role,
        }
    }

    #[tokio::test]
    async fn create_enforces_unique_email_and_username() {
        let store = MemoryUserStore::default();
        store.create(new_user("ana", "ana@ius.test", Role::Estudiante)).await.unwrap();

        let err = store
            .create(new_user("other", "ana@ius.test", Role::Estudiante))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(m) if m.contains("Email")));

        let err = store
            .create(new_user("ana", "other@ius.test", Role::Estudiante))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(m) if m.contains("Username")));
    }

    #[tokio::test]
    async fn list_filters_and_pages_newest_first() {
        let store = MemoryUserStore::default();
        store.create(new_user("maria", "maria@ius.test", Role::Docente)).await.unwrap();
        store.create(new_user("mario", "mario@ius.test", Role::Estudiante)).await.unwrap();
        store.create(new_user("luis", "luis@ius.test", Role::Estudiante)).await.unwrap();

        let filter = UserFilter { search: Some("MAR".into()), role: None, limit: 10, offset: 0 };
        let (rows, total) = store.list(&filter).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(rows[0].username, "mario");

        let filter = UserFilter { search: None, role: Some(Role::Estudiante), limit: 1, offset: 1 };
        let (rows, total) = store.list(&filter).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].username, "mario");
    }

    #[tokio::test]
    async fn update_and_delete_report_missing_rows() {
        let store = MemoryUserStore::default();
        assert!(store.update(Uuid::new_v4(), UserChanges::default()).await.unwrap().is_none());
        assert!(!store.delete(Uuid::new_v4()).await.unwrap());

        let u = store.create(new_user("ana", "ana@ius.test", Role::Admin)).await.unwrap();
        assert!(store.delete(u.id).await.unwrap());
        assert!(store.find_by_id(u.id).await.unwrap().is_none());
    }
}
