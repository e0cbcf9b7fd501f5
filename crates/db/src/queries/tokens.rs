//! Issued bearer tokens.

use chrono::{DateTime, Utc};
use sqlx::Row;

use crate::{from_unix, Database, DbError, DbResult};

#[derive(Debug, Clone)]
pub struct TokenRow {
    pub id: i64,
    pub id_user: i64,
    pub token: String,
    pub active: bool,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for TokenRow {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            id_user: row.try_get("id_user")?,
            token: row.try_get("token")?,
            active: row.try_get("status_token")?,
            issued_at: from_unix(row.try_get("date_token")?),
            expires_at: from_unix(row.try_get("expiration")?),
        })
    }
}

impl Database {
    pub async fn insert_token(
        &self,
        id_user: i64,
        token: &str,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> DbResult<i64> {
        let result = sqlx::query(
            "INSERT INTO tokens (id_user, token, status_token, date_token, expiration) \
             VALUES (?, ?, 1, ?, ?)",
        )
        .bind(id_user)
        .bind(token)
        .bind(issued_at.timestamp())
        .bind(expires_at.timestamp())
        .execute(self.pool())
        .await
        .map_err(DbError::from_write)?;
        Ok(result.last_insert_rowid())
    }

    /// The token row, only if it is still on the allow-list.
    pub async fn get_active_token(&self, token: &str) -> DbResult<Option<TokenRow>> {
        Ok(sqlx::query_as::<_, TokenRow>(
            "SELECT id, id_user, token, status_token, date_token, expiration \
             FROM tokens WHERE token = ? AND status_token = 1",
        )
        .bind(token)
        .fetch_optional(self.pool())
        .await?)
    }

    /// Take a token off the allow-list. Returns `false` if it was not active.
    pub async fn deactivate_token(&self, token: &str) -> DbResult<bool> {
        let result =
            sqlx::query("UPDATE tokens SET status_token = 0 WHERE token = ? AND status_token = 1")
                .bind(token)
                .execute(self.pool())
                .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NewUser;
    use chrono::Duration;

    #[tokio::test]
    async fn test_token_lifecycle() {
        let db = Database::new_in_memory().await.unwrap();
        let user = db
            .insert_user(&NewUser {
                name: "Bob".into(),
                username: "bob".into(),
                password_hash: "h".into(),
                email: "bob@example.com".into(),
                status: true,
            })
            .await
            .unwrap();

        let now = Utc::now();
        db.insert_token(user.id, "tok-1", now, now + Duration::minutes(60))
            .await
            .unwrap();

        let row = db.get_active_token("tok-1").await.unwrap().unwrap();
        assert_eq!(row.id_user, user.id);
        assert!(row.active);
        assert_eq!(row.expires_at.timestamp() - row.issued_at.timestamp(), 3600);

        assert!(db.deactivate_token("tok-1").await.unwrap());
        assert!(db.get_active_token("tok-1").await.unwrap().is_none());
        assert!(!db.deactivate_token("tok-1").await.unwrap());
        assert!(!db.deactivate_token("unknown").await.unwrap());
    }

    #[tokio::test]
    async fn test_deleting_user_revokes_tokens() {
        let db = Database::new_in_memory().await.unwrap();
        let user = db
            .insert_user(&NewUser {
                name: "Eve".into(),
                username: "eve".into(),
                password_hash: "h".into(),
                email: "eve@example.com".into(),
                status: true,
            })
            .await
            .unwrap();
        let now = Utc::now();
        db.insert_token(user.id, "tok-eve", now, now + Duration::minutes(5))
            .await
            .unwrap();

        db.delete_user(user.id).await.unwrap();
        assert!(db.get_active_token("tok-eve").await.unwrap().is_none());
    }
}
