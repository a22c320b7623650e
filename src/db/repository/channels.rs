//! Live channel repository

use sqlx::{PgConnection, Postgres, Transaction};
use uuid::Uuid;

use crate::db::models::{channel_copy_line, ChannelRow};
use crate::models::ChannelRecord;

use super::copy_lines;

pub async fn get_by_source(
    conn: &mut PgConnection,
    source_id: Uuid,
) -> Result<Vec<ChannelRow>, sqlx::Error> {
    sqlx::query_as::<_, ChannelRow>(
        r#"
        SELECT id, source_id, name, stream_url, logo_url, group_title, epg_id,
               catchup_days, catchup_source, channel_number, sort_order
        FROM channels
        WHERE source_id = $1
        ORDER BY sort_order, id
        "#,
    )
    .bind(source_id)
    .fetch_all(&mut *conn)
    .await
}

pub async fn delete_by_source(
    tx: &mut Transaction<'_, Postgres>,
    source_id: Uuid,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM channels WHERE source_id = $1")
        .bind(source_id)
        .execute(&mut **tx)
        .await?;

    Ok(result.rows_affected())
}

pub async fn insert_many(
    tx: &mut Transaction<'_, Postgres>,
    channels: &[ChannelRecord],
) -> Result<u64, sqlx::Error> {
    copy_lines(
        tx,
        r#"
        COPY channels (source_id, id, name, stream_url, logo_url, group_title, epg_id,
                       catchup_days, catchup_source, channel_number, sort_order)
        FROM STDIN WITH (FORMAT text)
        "#,
        channels.iter().map(channel_copy_line).collect(),
    )
    .await
}
