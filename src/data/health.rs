//! Database health check query.

use sqlx::postgres::PgExecutor;

/// Verify the database connection is alive, returning the scalar it answered with.
pub async fn ping<'e, E>(executor: E) -> Result<i32, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(executor)
        .await
}
