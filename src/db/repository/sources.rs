//! Source repository

use sqlx::PgPool;
use uuid::Uuid;

use crate::db::models::SourceRow;
use crate::models::SourceDescriptor;

/// Insert a source or replace every field of an existing one
pub async fn upsert_source(pool: &PgPool, source: &SourceDescriptor) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO sources (id, name, kind, endpoint, username, password, epg_url, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (id) DO UPDATE SET
            name = EXCLUDED.name,
            kind = EXCLUDED.kind,
            endpoint = EXCLUDED.endpoint,
            username = EXCLUDED.username,
            password = EXCLUDED.password,
            epg_url = EXCLUDED.epg_url
        "#,
    )
    .bind(source.id)
    .bind(&source.name)
    .bind(source.kind.to_string())
    .bind(&source.endpoint)
    .bind(&source.username)
    .bind(&source.password)
    .bind(&source.epg_url)
    .bind(source.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<SourceRow>, sqlx::Error> {
    sqlx::query_as::<_, SourceRow>(
        r#"
        SELECT id, name, kind, endpoint, username, password, epg_url, created_at
        FROM sources
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn list_all(pool: &PgPool) -> Result<Vec<SourceRow>, sqlx::Error> {
    sqlx::query_as::<_, SourceRow>(
        r#"
        SELECT id, name, kind, endpoint, username, password, epg_url, created_at
        FROM sources
        ORDER BY created_at, name
        "#,
    )
    .fetch_all(pool)
    .await
}

/// Delete a source; catalog, guide and favorites go with it (ON DELETE CASCADE)
pub async fn delete_source(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM sources WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
