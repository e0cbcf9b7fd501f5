//! Device registry queries.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::Row;

use super::now_secs;
use crate::{from_unix, Database, DbError, DbResult};

#[derive(Debug, Clone, Serialize)]
pub struct DeviceRow {
    pub id: i64,
    pub name: String,
    pub status: String,
    /// IPv4 address the device last reported.
    pub direction: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for DeviceRow {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            status: row.try_get("status")?,
            direction: row.try_get("direction")?,
            created_at: from_unix(row.try_get("created_at")?),
            updated_at: from_unix(row.try_get("updated_at")?),
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewDevice {
    pub name: String,
    pub status: String,
    pub direction: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DeviceChanges {
    pub name: Option<String>,
    pub status: Option<String>,
    pub direction: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DeviceFilter {
    pub status: Option<String>,
    /// Case-insensitive substring match on the name.
    pub name: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for DeviceFilter {
    fn default() -> Self {
        Self {
            status: None,
            name: None,
            limit: 20,
            offset: 0,
        }
    }
}

const DEVICE_COLUMNS: &str = "id, name, status, direction, created_at, updated_at";

impl Database {
    /// Insert a device. A taken name yields `DbError::Conflict`.
    pub async fn insert_device(&self, device: &NewDevice) -> DbResult<DeviceRow> {
        let now = now_secs();
        let result = sqlx::query(
            "INSERT INTO devices (name, status, direction, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&device.name)
        .bind(&device.status)
        .bind(&device.direction)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await
        .map_err(DbError::from_write)?;

        self.get_device(result.last_insert_rowid())
            .await?
            .ok_or(DbError::Sqlx(sqlx::Error::RowNotFound))
    }

    pub async fn get_device(&self, id: i64) -> DbResult<Option<DeviceRow>> {
        let sql = format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE id = ?");
        Ok(sqlx::query_as::<_, DeviceRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await?)
    }

    pub async fn get_device_by_name(&self, name: &str) -> DbResult<Option<DeviceRow>> {
        let sql = format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE name = ?");
        Ok(sqlx::query_as::<_, DeviceRow>(&sql)
            .bind(name)
            .fetch_optional(self.pool())
            .await?)
    }

    pub async fn list_devices(&self, filter: &DeviceFilter) -> DbResult<Vec<DeviceRow>> {
        let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new(format!(
            "SELECT {DEVICE_COLUMNS} FROM devices WHERE 1=1"
        ));
        if let Some(status) = &filter.status {
            qb.push(" AND status = ").push_bind(status);
        }
        if let Some(name) = &filter.name {
            qb.push(" AND name LIKE ").push_bind(format!("%{name}%"));
        }
        qb.push(" ORDER BY id LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.offset);

        Ok(qb
            .build_query_as::<DeviceRow>()
            .fetch_all(self.pool())
            .await?)
    }

    /// Apply a partial update. Returns `None` if the device does not exist.
    pub async fn update_device(
        &self,
        id: i64,
        changes: &DeviceChanges,
    ) -> DbResult<Option<DeviceRow>> {
        let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new("UPDATE devices SET updated_at = ");
        qb.push_bind(now_secs());
        if let Some(name) = &changes.name {
            qb.push(", name = ").push_bind(name);
        }
        if let Some(status) = &changes.status {
            qb.push(", status = ").push_bind(status);
        }
        if let Some(direction) = &changes.direction {
            qb.push(", direction = ").push_bind(direction);
        }
        qb.push(" WHERE id = ").push_bind(id);

        let result = qb
            .build()
            .execute(self.pool())
            .await
            .map_err(DbError::from_write)?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_device(id).await
    }

    /// Record a new address and mark the device online.
    pub async fn set_device_ip(&self, id: i64, ip: &str) -> DbResult<Option<DeviceRow>> {
        let changes = DeviceChanges {
            direction: Some(ip.to_string()),
            status: Some("online".to_string()),
            ..Default::default()
        };
        self.update_device(id, &changes).await
    }

    /// Delete a device together with its actions and logs.
    pub async fn delete_device(&self, id: i64) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM devices WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
