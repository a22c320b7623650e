//! Series repository

use std::collections::HashMap;

use sqlx::{PgConnection, Postgres, Transaction};
use uuid::Uuid;

use crate::db::models::{episode_copy_line, series_copy_line, EpisodeRow, SeriesRow};
use crate::models::{Episode, SeriesRecord};

use super::copy_lines;

/// All series of a source with their episodes, ordered by name
pub async fn get_with_episodes(
    conn: &mut PgConnection,
    source_id: Uuid,
) -> Result<Vec<SeriesRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, SeriesRow>(
        r#"
        SELECT id, source_id, name, group_title, logo_url, provider_id
        FROM series
        WHERE source_id = $1
        ORDER BY name, id
        "#,
    )
    .bind(source_id)
    .fetch_all(&mut *conn)
    .await?;

    let episode_rows = sqlx::query_as::<_, EpisodeRow>(
        r#"
        SELECT series_id, season_number, episode_number, name, stream_url, provider_id
        FROM episodes
        WHERE source_id = $1
        ORDER BY series_id, season_number, episode_number
        "#,
    )
    .bind(source_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut episodes: HashMap<String, Vec<Episode>> = HashMap::new();
    for row in episode_rows {
        episodes
            .entry(row.series_id.clone())
            .or_default()
            .push(Episode::from(row));
    }

    Ok(rows
        .into_iter()
        .map(|row| SeriesRecord {
            episodes: episodes.remove(&row.id).unwrap_or_default(),
            id: row.id,
            source_id: row.source_id,
            name: row.name,
            group_title: row.group_title,
            logo_url: row.logo_url,
            provider_id: row.provider_id,
        })
        .collect())
}

/// Deletes series of a source; episodes follow through ON DELETE CASCADE
pub async fn delete_by_source(
    tx: &mut Transaction<'_, Postgres>,
    source_id: Uuid,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM series WHERE source_id = $1")
        .bind(source_id)
        .execute(&mut **tx)
        .await?;

    Ok(result.rows_affected())
}

/// COPY lines of every episode, keyed to its series
fn episode_lines(series: &[SeriesRecord]) -> Vec<String> {
    series
        .iter()
        .flat_map(|record| {
            record
                .episodes
                .iter()
                .map(move |episode| episode_copy_line(record.source_id, &record.id, episode))
        })
        .collect()
}

/// Inserts series rows, then their episodes
pub async fn insert_many(
    tx: &mut Transaction<'_, Postgres>,
    series: &[SeriesRecord],
) -> Result<u64, sqlx::Error> {
    copy_lines(
        tx,
        r#"
        COPY series (source_id, id, name, group_title, logo_url, provider_id)
        FROM STDIN WITH (FORMAT text)
        "#,
        series.iter().map(series_copy_line).collect(),
    )
    .await?;

    copy_lines(
        tx,
        r#"
        COPY episodes (source_id, series_id, season_number, episode_number,
                       name, stream_url, provider_id)
        FROM STDIN WITH (FORMAT text)
        "#,
        episode_lines(series),
    )
    .await?;

    Ok(series.len() as u64)
}
