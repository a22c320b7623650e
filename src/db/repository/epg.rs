//! Programme guide repository

use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::db::models::{epg_channel_copy_line, program_copy_line, ProgramRow};
use crate::models::{EpgChannel, EpgProgram};

use super::copy_lines;

pub async fn delete_by_source(
    tx: &mut Transaction<'_, Postgres>,
    source_id: Uuid,
) -> Result<u64, sqlx::Error> {
    sqlx::query("DELETE FROM epg_channels WHERE source_id = $1")
        .bind(source_id)
        .execute(&mut **tx)
        .await?;

    let result = sqlx::query("DELETE FROM epg_programs WHERE source_id = $1")
        .bind(source_id)
        .execute(&mut **tx)
        .await?;

    Ok(result.rows_affected())
}

pub async fn insert_channels(
    tx: &mut Transaction<'_, Postgres>,
    source_id: Uuid,
    channels: &[EpgChannel],
) -> Result<u64, sqlx::Error> {
    copy_lines(
        tx,
        r#"
        COPY epg_channels (source_id, id, display_name, icon)
        FROM STDIN WITH (FORMAT text)
        "#,
        channels
            .iter()
            .map(|channel| epg_channel_copy_line(source_id, channel))
            .collect(),
    )
    .await
}

pub async fn insert_programs(
    tx: &mut Transaction<'_, Postgres>,
    source_id: Uuid,
    programs: &[EpgProgram],
) -> Result<u64, sqlx::Error> {
    copy_lines(
        tx,
        r#"
        COPY epg_programs (source_id, channel_id, title, description,
                           start_time, end_time, category, icon)
        FROM STDIN WITH (FORMAT text)
        "#,
        programs
            .iter()
            .map(|program| program_copy_line(source_id, program))
            .collect(),
    )
    .await
}

/// Programmes ordered by start, optionally restricted to one EPG channel id
pub async fn get_programs(
    pool: &PgPool,
    source_id: Uuid,
    channel_id: Option<&str>,
) -> Result<Vec<ProgramRow>, sqlx::Error> {
    match channel_id {
        Some(channel) => {
            sqlx::query_as::<_, ProgramRow>(
                r#"
                SELECT channel_id, title, description, start_time, end_time, category, icon
                FROM epg_programs
                WHERE source_id = $1 AND channel_id = $2
                ORDER BY start_time
                "#,
            )
            .bind(source_id)
            .bind(channel)
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query_as::<_, ProgramRow>(
                r#"
                SELECT channel_id, title, description, start_time, end_time, category, icon
                FROM epg_programs
                WHERE source_id = $1
                ORDER BY start_time, channel_id
                "#,
            )
            .bind(source_id)
            .fetch_all(pool)
            .await
        }
    }
}
