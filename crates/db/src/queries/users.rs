//! User account queries.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::Row;

use super::now_secs;
use crate::{from_unix, Database, DbError, DbResult};

/// A user account. The password hash never leaves the server.
#[derive(Debug, Clone, Serialize)]
pub struct UserRow {
    pub id: i64,
    pub name: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub email: String,
    pub status: bool,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_connection: Option<DateTime<Utc>>,
}

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for UserRow {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            username: row.try_get("username")?,
            password_hash: row.try_get("password")?,
            email: row.try_get("email")?,
            status: row.try_get("status")?,
            deleted: row.try_get("deleted")?,
            created_at: from_unix(row.try_get("created_at")?),
            updated_at: from_unix(row.try_get("updated_at")?),
            last_connection: row
                .try_get::<Option<i64>, _>("last_connection")?
                .map(from_unix),
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub username: String,
    pub password_hash: String,
    pub email: String,
    pub status: bool,
}

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub name: Option<String>,
    pub username: Option<String>,
    pub password_hash: Option<String>,
    pub email: Option<String>,
    pub status: Option<bool>,
}

const USER_COLUMNS: &str = "id, name, username, password, email, status, deleted, \
     created_at, updated_at, last_connection";

impl Database {
    /// Insert a user. A taken username or email yields `DbError::Conflict`.
    pub async fn insert_user(&self, user: &NewUser) -> DbResult<UserRow> {
        let now = now_secs();
        let result = sqlx::query(
            "INSERT INTO users (name, username, password, email, status, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&user.name)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.email)
        .bind(user.status)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await
        .map_err(DbError::from_write)?;

        self.fetch_user(result.last_insert_rowid()).await
    }

    async fn fetch_user(&self, id: i64) -> DbResult<UserRow> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
        Ok(sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_one(self.pool())
            .await?)
    }

    /// Look up a user that has not been deleted.
    pub async fn get_user(&self, id: i64) -> DbResult<Option<UserRow>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ? AND deleted = 0");
        Ok(sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await?)
    }

    pub async fn get_user_by_username(&self, username: &str) -> DbResult<Option<UserRow>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = ? AND deleted = 0");
        Ok(sqlx::query_as::<_, UserRow>(&sql)
            .bind(username)
            .fetch_optional(self.pool())
            .await?)
    }

    pub async fn list_users(&self) -> DbResult<Vec<UserRow>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE deleted = 0 ORDER BY id");
        Ok(sqlx::query_as::<_, UserRow>(&sql)
            .fetch_all(self.pool())
            .await?)
    }

    /// Apply a partial update. Returns `None` if the user does not exist.
    pub async fn update_user(&self, id: i64, changes: &UserChanges) -> DbResult<Option<UserRow>> {
        let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new("UPDATE users SET updated_at = ");
        qb.push_bind(now_secs());
        if let Some(name) = &changes.name {
            qb.push(", name = ").push_bind(name);
        }
        if let Some(username) = &changes.username {
            qb.push(", username = ").push_bind(username);
        }
        if let Some(hash) = &changes.password_hash {
            qb.push(", password = ").push_bind(hash);
        }
        if let Some(email) = &changes.email {
            qb.push(", email = ").push_bind(email);
        }
        if let Some(status) = changes.status {
            qb.push(", status = ").push_bind(status);
        }
        qb.push(" WHERE deleted = 0 AND id = ").push_bind(id);

        let result = qb
            .build()
            .execute(self.pool())
            .await
            .map_err(DbError::from_write)?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_user(id).await
    }

    /// Soft delete: the row stays for log history but disappears from lookups.
    pub async fn delete_user(&self, id: i64) -> DbResult<bool> {
        let result =
            sqlx::query("UPDATE users SET deleted = 1, updated_at = ? WHERE id = ? AND deleted = 0")
                .bind(now_secs())
                .bind(id)
                .execute(self.pool())
                .await?;
        if result.rows_affected() > 0 {
            sqlx::query("UPDATE tokens SET status_token = 0 WHERE id_user = ?")
                .bind(id)
                .execute(self.pool())
                .await?;
        }
        Ok(result.rows_affected() > 0)
    }

    /// Whether any row, soft-deleted ones included, holds `username`.
    /// `except_id` excludes the user being renamed.
    pub async fn username_taken(&self, username: &str, except_id: Option<i64>) -> DbResult<bool> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM users WHERE username = ? AND id != ?")
                .bind(username)
                .bind(except_id.unwrap_or(0))
                .fetch_one(self.pool())
                .await?;
        Ok(count > 0)
    }

    pub async fn touch_last_connection(&self, id: i64) -> DbResult<()> {
        sqlx::query("UPDATE users SET last_connection = ? WHERE id = ?")
            .bind(now_secs())
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
