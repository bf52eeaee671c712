pub mod models;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::path::Path;

use crate::state::DbPool;

pub const MIGRATIONS: &[(&str, &str)] = &[
    ("001_users", include_str!("../../migrations/001_users.sql")),
    (
        "002_listings",
        include_str!("../../migrations/002_listings.sql"),
    ),
    (
        "003_messaging",
        include_str!("../../migrations/003_messaging.sql"),
    ),
    (
        "004_community",
        include_str!("../../migrations/004_community.sql"),
    ),
    (
        "005_payments",
        include_str!("../../migrations/005_payments.sql"),
    ),
    (
        "006_conversation_inquiries",
        include_str!("../../migrations/006_conversation_inquiries.sql"),
    ),
];

/// Per-connection pragmas, applied as each pooled connection is opened.
/// `foreign_keys` is connection-scoped in SQLite.
#[derive(Debug)]
struct SqlitePragmas;

impl r2d2::CustomizeConnection<rusqlite::Connection, rusqlite::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut rusqlite::Connection) -> Result<(), rusqlite::Error> {
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
            ",
        )
    }
}

pub fn create_pool(db_path: &Path) -> anyhow::Result<DbPool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let manager = SqliteConnectionManager::file(db_path);
    let pool = Pool::builder()
        .max_size(8)
        .connection_customizer(Box::new(SqlitePragmas))
        .build(manager)?;

    let conn = pool.get()?;
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        ",
    )?;

    Ok(pool)
}

pub fn run_migrations(pool: &DbPool) -> anyhow::Result<()> {
    let conn = pool.get()?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    for (name, sql) in MIGRATIONS {
        let already_applied: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM schema_version WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;

        if !already_applied {
            tracing::info!("Applying migration: {}", name);
            conn.execute_batch(sql)?;
            conn.execute(
                "INSERT INTO schema_version (name) VALUES (?1)",
                params![name],
            )?;
        }
    }

    tracing::info!("Database migrations complete");
    Ok(())
}

/// True when a statement failed on a UNIQUE (or PRIMARY KEY) constraint.
pub fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

/// Current time in the format used by the `created_at` column defaults.
pub fn now_timestamp() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

pub fn new_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

#[cfg(test)]
pub(crate) fn test_pool() -> (tempfile::TempDir, DbPool) {
    let tmp = tempfile::tempdir().unwrap();
    let pool = create_pool(&tmp.path().join("test.db")).unwrap();
    run_migrations(&pool).unwrap();
    (tmp, pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_pool_creates_db_file() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("sub/dir/test.db");
        let pool = create_pool(&db_path).unwrap();
        assert!(db_path.exists());
        let conn = pool.get().unwrap();
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "wal");
    }

    #[test]
    fn migrations_run_successfully() {
        let (_tmp, pool) = test_pool();
        let conn = pool.get().unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as i64);

        let tables: Vec<String> = {
            let mut stmt = conn
                .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
                .unwrap();
            stmt.query_map([], |row| row.get(0))
                .unwrap()
                .filter_map(|r| r.ok())
                .collect()
        };
        for table in [
            "users",
            "sessions",
            "points_ledger",
            "listings",
            "listing_images",
            "saved_listings",
            "reviews",
            "conversations",
            "messages",
            "conversation_inquiries",
            "forum_posts",
            "forum_replies",
            "rewards",
            "ads",
            "payments",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }
    }

    #[test]
    fn migrations_are_idempotent() {
        let (_tmp, pool) = test_pool();
        run_migrations(&pool).unwrap();

        let conn = pool.get().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as i64);
    }

    #[test]
    fn foreign_keys_enforced_on_every_connection() {
        let (_tmp, pool) = test_pool();
        // Hold one connection so the next checkout is a different one
        let _first = pool.get().unwrap();
        let conn = pool.get().unwrap();
        let result = conn.execute(
            "INSERT INTO listings (id, landlord_id, title, price) VALUES ('l1', 'ghost', 't', 1)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn conversation_pair_must_be_ordered() {
        let (_tmp, pool) = test_pool();
        let conn = pool.get().unwrap();
        for (id, email, code) in [("a", "a@x.io", "AAAAAAAA"), ("b", "b@x.io", "BBBBBBBB")] {
            conn.execute(
                "INSERT INTO users (id, name, email, password_hash, referral_code) VALUES (?1, ?1, ?2, 'h', ?3)",
                params![id, email, code],
            )
            .unwrap();
        }
        let reversed = conn.execute(
            "INSERT INTO conversations (id, user_a, user_b) VALUES ('c1', 'b', 'a')",
            [],
        );
        assert!(reversed.is_err());
        conn.execute(
            "INSERT INTO conversations (id, user_a, user_b) VALUES ('c1', 'a', 'b')",
            [],
        )
        .unwrap();
    }

    #[test]
    fn now_timestamp_sorts_like_column_default() {
        let (_tmp, pool) = test_pool();
        let conn = pool.get().unwrap();
        let db_now: String = conn
            .query_row("SELECT strftime('%Y-%m-%dT%H:%M:%fZ', 'now')", [], |r| r.get(0))
            .unwrap();
        let ours = now_timestamp();
        assert_eq!(db_now.len(), ours.len());
        assert_eq!(&db_now[..10], &ours[..10]);
    }
}
