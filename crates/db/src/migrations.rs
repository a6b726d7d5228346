use sqlx::migrate::{MigrateError, MigrationType, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// Reports whether every bundled up-migration has been applied to `pool`.
///
/// A database without the migrations bookkeeping table counts as not
/// current rather than as an error, so callers can probe fresh files.
pub async fn is_schema_current(pool: &DbPool) -> Result<bool, sqlx::Error> {
    let expected = MIGRATOR
        .iter()
        .filter(|migration| !matches!(migration.migration_type, MigrationType::ReversibleDown))
        .count() as i64;

    let applied: i64 = match sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
    {
        Ok(count) => count,
        Err(_) => return Ok(false),
    };

    Ok(applied >= expected)
}
