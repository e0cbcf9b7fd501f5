/// Inline SQL migrations for the panel schema.
///
/// Timestamps are unix seconds. Each entry is a single statement.
pub const MIGRATIONS: &[&str] = &[
    // Migration 1: users
    r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    username TEXT NOT NULL UNIQUE,
    password TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    status BOOLEAN NOT NULL DEFAULT 1,
    deleted BOOLEAN NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    last_connection INTEGER
);
"#,
    // Migration 2: issued tokens (allow-list checked on every request)
    r#"
CREATE TABLE IF NOT EXISTS tokens (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    id_user INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    token TEXT NOT NULL UNIQUE,
    status_token BOOLEAN NOT NULL DEFAULT 1,
    date_token INTEGER NOT NULL,
    expiration INTEGER NOT NULL
);
"#,
    // Migration 3: devices
    r#"
CREATE TABLE IF NOT EXISTS devices (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    status TEXT NOT NULL DEFAULT 'offline',
    direction TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
"#,
    // Migration 4: actions queued for devices
    r#"
CREATE TABLE IF NOT EXISTS actions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    id_device INTEGER NOT NULL REFERENCES devices(id) ON DELETE CASCADE,
    action TEXT NOT NULL,
    executed BOOLEAN NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL
);
"#,
    r#"CREATE INDEX IF NOT EXISTS idx_actions_device ON actions(id_device);"#,
    // Migration 5: activity log
    r#"
CREATE TABLE IF NOT EXISTS logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event TEXT NOT NULL,
    id_device INTEGER NOT NULL REFERENCES devices(id) ON DELETE CASCADE,
    id_user INTEGER REFERENCES users(id) ON DELETE SET NULL,
    id_action INTEGER REFERENCES actions(id) ON DELETE SET NULL,
    timestamp INTEGER NOT NULL
);
"#,
    r#"CREATE INDEX IF NOT EXISTS idx_logs_device ON logs(id_device);"#,
    r#"CREATE INDEX IF NOT EXISTS idx_logs_timestamp ON logs(timestamp DESC);"#,
];
