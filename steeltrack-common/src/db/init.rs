//! Database initialization
//!
//! Creates the database on first run, applies pragmas and builds the full
//! schema idempotently. Enumerated status/location/condition values are
//! closed sets validated by CHECK constraints at the storage boundary in
//! addition to the enum parsing at the API boundary.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::{info, warn};

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Use sqlite options to create database if it doesn't exist
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(20)
        .min_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL mode allows concurrent readers with one writer, which matters for
    // SSE-driven dashboards reading while transitions commit
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    // Writers that lose the race wait briefly instead of failing immediately
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_tables(&pool).await?;
    init_default_settings(&pool).await?;

    Ok(pool)
}

/// Initialize an in-memory database (test and tooling use)
///
/// The pool is capped at a single connection: each SQLite `:memory:`
/// connection is its own database, so a wider pool would hand out empty
/// databases to all but the first connection.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    create_tables(&pool).await?;
    init_default_settings(&pool).await?;

    Ok(pool)
}

/// Create all tables (idempotent - safe to call multiple times)
pub async fn create_tables(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_settings_table(pool).await?;
    create_piece_marks_table(pool).await?;
    create_deliveries_table(pool).await?;
    create_delivery_items_table(pool).await?;
    create_crew_assignments_table(pool).await?;
    create_crew_assignment_marks_table(pool).await?;
    create_activity_log_table(pool).await?;
    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the settings table
///
/// Stores application configuration key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the piece_marks table
///
/// The canonical record for each fabricated component. `total_weight` is
/// always `quantity * weight_per_unit`; the engine recomputes it on every
/// write and it is never independently settable. `version` backs the
/// optimistic concurrency check; `archived` is the soft-delete flag (marks
/// referenced by the activity log are never hard-deleted).
pub async fn create_piece_marks_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS piece_marks (
            guid TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            mark TEXT NOT NULL,
            quantity INTEGER NOT NULL,
            weight_per_unit REAL NOT NULL,
            total_weight REAL NOT NULL,
            material TEXT,
            drawing_ref TEXT,
            sequence_no INTEGER,
            status TEXT NOT NULL DEFAULT 'not_started'
                CHECK (status IN ('not_started', 'fabricating', 'completed', 'shipped', 'installed')),
            location TEXT
                CHECK (location IS NULL OR location IN ('yard', 'staging', 'crane_zone', 'installed', 'unknown')),
            archived INTEGER NOT NULL DEFAULT 0,
            version INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (project_id, mark),
            CHECK (quantity > 0),
            CHECK (weight_per_unit >= 0.0),
            CHECK (total_weight >= 0.0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_piece_marks_project ON piece_marks(project_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_piece_marks_status ON piece_marks(status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_piece_marks_location ON piece_marks(location)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the deliveries table
pub async fn create_deliveries_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS deliveries (
            guid TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            delivery_number TEXT NOT NULL,
            scheduled_date TEXT,
            arrived_at TIMESTAMP,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'in_transit', 'delivered', 'received', 'rejected')),
            carrier TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (project_id, delivery_number)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_deliveries_project ON deliveries(project_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_deliveries_status ON deliveries(status)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the delivery_items table
///
/// One row per piece mark in a delivery. `received_quantity`, `condition`
/// and `location` stay NULL until reconciliation records the outcome triple.
pub async fn create_delivery_items_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS delivery_items (
            guid TEXT PRIMARY KEY,
            delivery_id TEXT NOT NULL REFERENCES deliveries(guid) ON DELETE CASCADE,
            piece_mark_id TEXT NOT NULL REFERENCES piece_marks(guid),
            expected_quantity INTEGER NOT NULL,
            received_quantity INTEGER,
            condition TEXT
                CHECK (condition IS NULL OR condition IN ('good', 'damaged', 'missing')),
            location TEXT
                CHECK (location IS NULL OR location IN ('yard', 'staging', 'crane_zone', 'installed', 'unknown')),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (expected_quantity > 0),
            CHECK (received_quantity IS NULL OR received_quantity >= 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_delivery_items_delivery ON delivery_items(delivery_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_delivery_items_mark ON delivery_items(piece_mark_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the crew_assignments table
pub async fn create_crew_assignments_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS crew_assignments (
            guid TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            crew_name TEXT NOT NULL,
            work_date TEXT NOT NULL,
            shift TEXT NOT NULL,
            crew_size INTEGER NOT NULL,
            zone TEXT,
            supervisor_id TEXT,
            status TEXT NOT NULL DEFAULT 'scheduled'
                CHECK (status IN ('scheduled', 'active', 'completed')),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (project_id, crew_name, work_date, shift),
            CHECK (crew_size > 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_crew_assignments_project ON crew_assignments(project_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the crew_assignment_marks linking table
pub async fn create_crew_assignment_marks_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS crew_assignment_marks (
            crew_assignment_id TEXT NOT NULL REFERENCES crew_assignments(guid) ON DELETE CASCADE,
            piece_mark_id TEXT NOT NULL REFERENCES piece_marks(guid),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (crew_assignment_id, piece_mark_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_crew_assignment_marks_mark ON crew_assignment_marks(piece_mark_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the activity_log table
///
/// Append-only: the engine issues INSERTs only, never UPDATE or DELETE.
/// This is the durable record from which all dashboards must be
/// reconstructible. The implicit rowid provides a stable tiebreaker for
/// entries sharing a timestamp.
pub async fn create_activity_log_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS activity_log (
            guid TEXT PRIMARY KEY,
            actor_id TEXT NOT NULL,
            role TEXT NOT NULL
                CHECK (role IN ('admin', 'project_manager', 'shop', 'field', 'client')),
            subject_type TEXT NOT NULL
                CHECK (subject_type IN ('piece_mark', 'delivery', 'crew')),
            subject_id TEXT NOT NULL,
            transition TEXT NOT NULL,
            before_state TEXT,
            after_state TEXT,
            description TEXT,
            discrepancy TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_activity_log_subject ON activity_log(subject_type, subject_id, created_at)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_activity_log_actor ON activity_log(actor_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_activity_log_created ON activity_log(created_at)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Initialize or update default settings
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    ensure_setting(pool, "event_bus_capacity", "1000").await?;
    ensure_setting(pool, "http_request_timeout_ms", "30000").await?;
    ensure_setting(pool, "activity_page_size", "100").await?;

    Ok(())
}

/// Ensure a setting exists with the specified default value
///
/// If the setting doesn't exist, it will be created with the default.
/// If the setting exists but has a NULL value, it will be reset to the default.
pub async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM settings WHERE key = ?)")
            .bind(key)
            .fetch_one(pool)
            .await?;

    if !exists {
        // INSERT OR IGNORE handles concurrent initialization races: multiple
        // connections may pass the exists check simultaneously
        sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(default_value)
            .execute(pool)
            .await?;

        return Ok(());
    }

    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_one(pool)
        .await?;

    if value.is_none() {
        sqlx::query("UPDATE settings SET value = ? WHERE key = ?")
            .bind(default_value)
            .bind(key)
            .execute(pool)
            .await?;

        warn!("Setting '{}' was NULL, reset to default: {}", key, default_value);
    }

    Ok(())
}

/// Read an integer setting, falling back to `default` when absent or unparsable
pub async fn setting_i64(pool: &SqlitePool, key: &str, default: i64) -> Result<i64> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?
        .flatten();

    Ok(value.and_then(|v| v.parse().ok()).unwrap_or(default))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_database_has_schema() {
        let pool = init_memory_database().await.unwrap();

        // All tables present
        for table in [
            "settings",
            "piece_marks",
            "deliveries",
            "delivery_items",
            "crew_assignments",
            "crew_assignment_marks",
            "activity_log",
        ] {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
            )
            .bind(table)
            .fetch_one(&pool)
            .await
            .unwrap();
            assert!(exists, "table {} should exist", table);
        }
    }

    #[tokio::test]
    async fn test_file_database_creates_and_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("steeltrack.db");

        let pool = init_database(&db_path).await.unwrap();
        drop(pool);
        assert!(db_path.exists());

        // Reopening an existing database must be a no-op, not an error
        let pool = init_database(&db_path).await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM piece_marks")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_check_constraint_rejects_unknown_status() {
        let pool = init_memory_database().await.unwrap();

        let result = sqlx::query(
            "INSERT INTO piece_marks (guid, project_id, mark, quantity, weight_per_unit, total_weight, status)
             VALUES ('g1', 'p1', 'B-1', 1, 1.0, 1.0, 'melted')",
        )
        .execute(&pool)
        .await;
        assert!(result.is_err(), "unknown status must violate CHECK constraint");
    }

    #[tokio::test]
    async fn test_check_constraint_rejects_nonpositive_quantity() {
        let pool = init_memory_database().await.unwrap();

        let result = sqlx::query(
            "INSERT INTO piece_marks (guid, project_id, mark, quantity, weight_per_unit, total_weight)
             VALUES ('g1', 'p1', 'B-1', 0, 1.0, 0.0)",
        )
        .execute(&pool)
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_ensure_setting_creates_and_preserves() {
        let pool = init_memory_database().await.unwrap();

        ensure_setting(&pool, "test_key", "42").await.unwrap();
        assert_eq!(setting_i64(&pool, "test_key", 0).await.unwrap(), 42);

        // Existing value preserved on re-ensure
        sqlx::query("UPDATE settings SET value = '7' WHERE key = 'test_key'")
            .execute(&pool)
            .await
            .unwrap();
        ensure_setting(&pool, "test_key", "42").await.unwrap();
        assert_eq!(setting_i64(&pool, "test_key", 0).await.unwrap(), 7);
    }
}
