//! Favorites repository
//!
//! Favorites reference channels by stable id only, with no foreign key to
//! the catalog, so a catalog replacement leaves them in place.

use sqlx::PgPool;
use uuid::Uuid;

pub async fn add(pool: &PgPool, source_id: Uuid, channel_id: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO favorites (source_id, channel_id)
        VALUES ($1, $2)
        ON CONFLICT (source_id, channel_id) DO NOTHING
        "#,
    )
    .bind(source_id)
    .bind(channel_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn remove(pool: &PgPool, source_id: Uuid, channel_id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM favorites WHERE source_id = $1 AND channel_id = $2")
        .bind(source_id)
        .bind(channel_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn get_by_source(pool: &PgPool, source_id: Uuid) -> Result<Vec<String>, sqlx::Error> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT channel_id FROM favorites WHERE source_id = $1")
            .bind(source_id)
            .fetch_all(pool)
            .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}
