//! Action (device command) queries.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::Row;

use crate::{from_unix, Database, DbResult};

#[derive(Debug, Clone, Serialize)]
pub struct ActionRow {
    pub id: i64,
    pub id_device: i64,
    pub action: String,
    pub executed: bool,
    pub created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for ActionRow {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            id_device: row.try_get("id_device")?,
            action: row.try_get("action")?,
            executed: row.try_get("executed")?,
            created_at: from_unix(row.try_get("created_at")?),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ActionFilter {
    pub id_device: Option<i64>,
    pub executed: Option<bool>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for ActionFilter {
    fn default() -> Self {
        Self {
            id_device: None,
            executed: None,
            limit: 20,
            offset: 0,
        }
    }
}

const ACTION_COLUMNS: &str = "id, id_device, action, executed, created_at";

impl Database {
    /// Insert a pending action for `id_device`.
    pub async fn insert_action(&self, id_device: i64, action: &str) -> DbResult<ActionRow> {
        let result = sqlx::query(
            "INSERT INTO actions (id_device, action, executed, created_at) VALUES (?, ?, 0, ?)",
        )
        .bind(id_device)
        .bind(action)
        .bind(super::now_secs())
        .execute(self.pool())
        .await?;

        let sql = format!("SELECT {ACTION_COLUMNS} FROM actions WHERE id = ?");
        Ok(sqlx::query_as::<_, ActionRow>(&sql)
            .bind(result.last_insert_rowid())
            .fetch_one(self.pool())
            .await?)
    }

    pub async fn get_action(&self, id: i64) -> DbResult<Option<ActionRow>> {
        let sql = format!("SELECT {ACTION_COLUMNS} FROM actions WHERE id = ?");
        Ok(sqlx::query_as::<_, ActionRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await?)
    }

    pub async fn list_actions(&self, filter: &ActionFilter) -> DbResult<Vec<ActionRow>> {
        let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new(format!(
            "SELECT {ACTION_COLUMNS} FROM actions WHERE 1=1"
        ));
        if let Some(id_device) = filter.id_device {
            qb.push(" AND id_device = ").push_bind(id_device);
        }
        if let Some(executed) = filter.executed {
            qb.push(" AND executed = ").push_bind(executed);
        }
        qb.push(" ORDER BY id LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.offset);

        Ok(qb
            .build_query_as::<ActionRow>()
            .fetch_all(self.pool())
            .await?)
    }

    /// Returns the updated row, or `None` if the action does not exist.
    pub async fn set_action_executed(
        &self,
        id: i64,
        executed: bool,
    ) -> DbResult<Option<ActionRow>> {
        let result = sqlx::query("UPDATE actions SET executed = ? WHERE id = ?")
            .bind(executed)
            .bind(id)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_action(id).await
    }

    pub async fn delete_action(&self, id: i64) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM actions WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
