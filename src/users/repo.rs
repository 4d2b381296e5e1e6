use axum::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppResult;
use crate::users::model::{NewUser, Role, User, UserChanges, UserFilter};

const USER_COLUMNS: &str =
    "id, first_name, last_name, username, email, password_hash, role, created_at, updated_at";

/// `%term%` for `ILIKE ... ESCAPE '\'`, with the term's own wildcards escaped
/// so it matches literally.
fn contains_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Persistence seam for user records.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>>;
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>>;
    async fn find_by_username(&self, username: &str) -> AppResult<Option<User>>;
    /// Returns one page plus the total number of matching rows.
    async fn list(&self, filter: &UserFilter) -> AppResult<(Vec<User>, i64)>;
    async fn create(&self, new: NewUser) -> AppResult<User>;
    async fn update(&self, id: Uuid, changes: UserChanges) -> AppResult<Option<User>>;
    /// Hard delete. `false` when nothing matched.
    async fn delete(&self, id: Uuid) -> AppResult<bool>;
    async fn count_by_role(&self) -> AppResult<Vec<(Role, i64)>>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn find_one(&self, column: &str, value: &str) -> AppResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(value)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        self.find_one("email", email).await
    }

    async fn find_by_username(&self, username: &str) -> AppResult<Option<User>> {
        self.find_one("username", username).await
    }

    async fn list(&self, filter: &UserFilter) -> AppResult<(Vec<User>, i64)> {
        let predicate = r#"
            ($1::TEXT IS NULL
                OR first_name ILIKE $1 ESCAPE '\'
                OR last_name ILIKE $1 ESCAPE '\'
                OR username ILIKE $1 ESCAPE '\'
                OR email ILIKE $1 ESCAPE '\')
            AND ($2::user_role IS NULL OR role = $2)
        "#;
        let page_sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE {predicate} \
             ORDER BY created_at DESC, id LIMIT $3 OFFSET $4"
        );
        let count_sql = format!("SELECT COUNT(*) FROM users WHERE {predicate}");
        let search = filter.search.as_deref().map(contains_pattern);

        let page = sqlx::query_as::<_, User>(&page_sql)
            .bind(search.as_deref())
            .bind(filter.role)
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(&self.db);
        let total = sqlx::query_scalar::<_, i64>(&count_sql)
            .bind(search.as_deref())
            .bind(filter.role)
            .fetch_one(&self.db);

        let (rows, total) = tokio::try_join!(page, total)?;
        Ok((rows, total))
    }

    async fn create(&self, new: NewUser) -> AppResult<User> {
        let sql = format!(
            r#"
            INSERT INTO users (first_name, last_name, username, email, password_hash, role)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(&new.first_name)
            .bind(&new.last_name)
            .bind(&new.username)
            .bind(&new.email)
            .bind(&new.password_hash)
            .bind(new.role)
            .fetch_one(&self.db)
            .await?;
        Ok(user)
    }

    async fn update(&self, id: Uuid, changes: UserChanges) -> AppResult<Option<User>> {
        let sql = format!(
            r#"
            UPDATE users SET
                first_name    = COALESCE($2, first_name),
                last_name     = COALESCE($3, last_name),
                username      = COALESCE($4, username),
                email         = COALESCE($5, email),
                password_hash = COALESCE($6, password_hash),
                role          = COALESCE($7, role),
                updated_at    = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(changes.first_name)
            .bind(changes.last_name)
            .bind(changes.username)
            .bind(changes.email)
            .bind(changes.password_hash)
            .bind(changes.role)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn delete(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_by_role(&self) -> AppResult<Vec<(Role, i64)>> {
        let rows = sqlx::query_as::<_, (Role, i64)>(
            "SELECT role, COUNT(*) FROM users GROUP BY role",
        )
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }
}
