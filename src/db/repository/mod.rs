//! Database repositories
//!
//! Repository pattern for database access, separating data access logic
//! from business logic. Catalog writes take a transaction so the store can
//! replace a whole source atomically.

pub mod channels;
pub mod epg;
pub mod favorites;
pub mod movies;
pub mod series;
pub mod sources;

use sqlx::{Postgres, Transaction};

/// Rows sent per COPY chunk
const COPY_CHUNK: usize = 500;

/// Streams pre-rendered COPY text lines into one `COPY ... FROM STDIN`
///
/// Lines are rendered up front so nothing borrowed is held across an await.
pub(crate) async fn copy_lines(
    tx: &mut Transaction<'_, Postgres>,
    statement: &str,
    lines: Vec<String>,
) -> Result<u64, sqlx::Error> {
    if lines.is_empty() {
        return Ok(0);
    }

    let mut copy = tx.copy_in_raw(statement).await?;
    let mut chunk = String::new();
    let mut buffered = 0;

    for line in lines {
        chunk.push_str(&line);
        buffered += 1;
        if buffered >= COPY_CHUNK {
            copy.send(chunk.as_bytes()).await?;
            chunk.clear();
            buffered = 0;
        }
    }
    if !chunk.is_empty() {
        copy.send(chunk.as_bytes()).await?;
    }

    copy.finish().await
}
