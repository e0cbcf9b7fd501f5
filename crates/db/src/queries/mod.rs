// crates/db/src/queries/mod.rs
// CRUD operations for the panel's SQLite database.

pub mod actions;
pub mod devices;
pub mod logs;
pub mod reports;
pub mod tokens;
pub mod users;

/// Current time as unix seconds.
pub(crate) fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}
