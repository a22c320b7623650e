//! Database row types for PostgreSQL
//!
//! These types map directly to database rows and convert to the canonical
//! records in `crate::models`. Catalog inserts go through COPY, so each
//! insertable type also knows how to render itself as a COPY text line.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::{
    ChannelRecord, EpgChannel, EpgProgram, Episode, MovieRecord, SeriesRecord, SourceDescriptor,
    SourceKind,
};

// ============================================================================
// Database Row Types
// ============================================================================

/// Source row from database
#[derive(Debug, Clone, FromRow)]
pub struct SourceRow {
    pub id: Uuid,
    pub name: String,
    pub kind: String,
    pub endpoint: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub epg_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SourceRow {
    /// Rows with an unknown kind are treated as M3U
    pub fn into_descriptor(self) -> SourceDescriptor {
        SourceDescriptor {
            id: self.id,
            name: self.name,
            kind: self.kind.parse().unwrap_or(SourceKind::M3u),
            endpoint: self.endpoint,
            username: self.username,
            password: self.password,
            epg_url: self.epg_url,
            created_at: self.created_at,
        }
    }
}

/// Channel row from database
#[derive(Debug, Clone, FromRow)]
pub struct ChannelRow {
    pub id: String,
    pub source_id: Uuid,
    pub name: String,
    pub stream_url: String,
    pub logo_url: Option<String>,
    pub group_title: String,
    pub epg_id: Option<String>,
    pub catchup_days: i32,
    pub catchup_source: Option<String>,
    pub channel_number: Option<i32>,
    pub sort_order: i64,
}

impl From<ChannelRow> for ChannelRecord {
    fn from(row: ChannelRow) -> Self {
        ChannelRecord {
            id: row.id,
            source_id: row.source_id,
            name: row.name,
            stream_url: row.stream_url,
            logo_url: row.logo_url,
            group_title: row.group_title,
            epg_id: row.epg_id,
            catchup_days: row.catchup_days.max(0) as u32,
            catchup_source: row.catchup_source,
            channel_number: row.channel_number.map(|n| n.max(0) as u32),
            order: row.sort_order,
        }
    }
}

/// Movie row from database
#[derive(Debug, Clone, FromRow)]
pub struct MovieRow {
    pub id: String,
    pub source_id: Uuid,
    pub name: String,
    pub stream_url: String,
    pub logo_url: Option<String>,
    pub group_title: String,
    pub sort_order: i64,
}

impl From<MovieRow> for MovieRecord {
    fn from(row: MovieRow) -> Self {
        MovieRecord {
            id: row.id,
            source_id: row.source_id,
            name: row.name,
            stream_url: row.stream_url,
            logo_url: row.logo_url,
            group_title: row.group_title,
            order: row.sort_order,
        }
    }
}

/// Series row from database (episodes are loaded separately)
#[derive(Debug, Clone, FromRow)]
pub struct SeriesRow {
    pub id: String,
    pub source_id: Uuid,
    pub name: String,
    pub group_title: String,
    pub logo_url: Option<String>,
    pub provider_id: Option<String>,
}

/// Episode row from database
#[derive(Debug, Clone, FromRow)]
pub struct EpisodeRow {
    pub series_id: String,
    pub season_number: i32,
    pub episode_number: i32,
    pub name: String,
    pub stream_url: String,
    pub provider_id: Option<String>,
}

impl From<EpisodeRow> for Episode {
    fn from(row: EpisodeRow) -> Self {
        Episode {
            season_number: row.season_number.max(0) as u32,
            episode_number: row.episode_number.max(0) as u32,
            name: row.name,
            stream_url: row.stream_url,
            provider_id: row.provider_id,
        }
    }
}

/// EPG programme row from database
#[derive(Debug, Clone, FromRow)]
pub struct ProgramRow {
    pub channel_id: String,
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub category: Option<String>,
    pub icon: Option<String>,
}

impl From<ProgramRow> for EpgProgram {
    fn from(row: ProgramRow) -> Self {
        EpgProgram {
            channel_id: row.channel_id,
            title: row.title,
            description: row.description,
            start: row.start_time,
            end: row.end_time,
            category: row.category,
            icon: row.icon,
        }
    }
}

// ============================================================================
// COPY text format
// ============================================================================

const COPY_NULL: &str = "\\N";

/// Escapes one COPY text field
fn copy_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

fn copy_opt(value: Option<&str>) -> String {
    value.map(copy_text).unwrap_or_else(|| COPY_NULL.to_string())
}

fn copy_line(fields: &[String]) -> String {
    let mut line = fields.join("\t");
    line.push('\n');
    line
}

// source_id, id, name, stream_url, logo_url, group_title, epg_id,
// catchup_days, catchup_source, channel_number, sort_order
pub fn channel_copy_line(channel: &ChannelRecord) -> String {
    copy_line(&[
        channel.source_id.to_string(),
        copy_text(&channel.id),
        copy_text(&channel.name),
        copy_text(&channel.stream_url),
        copy_opt(channel.logo_url.as_deref()),
        copy_text(&channel.group_title),
        copy_opt(channel.epg_id.as_deref()),
        channel.catchup_days.to_string(),
        copy_opt(channel.catchup_source.as_deref()),
        channel
            .channel_number
            .map(|n| n.to_string())
            .unwrap_or_else(|| COPY_NULL.to_string()),
        channel.order.to_string(),
    ])
}

// source_id, id, name, stream_url, logo_url, group_title, sort_order
pub fn movie_copy_line(movie: &MovieRecord) -> String {
    copy_line(&[
        movie.source_id.to_string(),
        copy_text(&movie.id),
        copy_text(&movie.name),
        copy_text(&movie.stream_url),
        copy_opt(movie.logo_url.as_deref()),
        copy_text(&movie.group_title),
        movie.order.to_string(),
    ])
}

// source_id, id, name, group_title, logo_url, provider_id
pub fn series_copy_line(series: &SeriesRecord) -> String {
    copy_line(&[
        series.source_id.to_string(),
        copy_text(&series.id),
        copy_text(&series.name),
        copy_text(&series.group_title),
        copy_opt(series.logo_url.as_deref()),
        copy_opt(series.provider_id.as_deref()),
    ])
}

// source_id, series_id, season_number, episode_number, name, stream_url, provider_id
pub fn episode_copy_line(source_id: Uuid, series_id: &str, episode: &Episode) -> String {
    copy_line(&[
        source_id.to_string(),
        copy_text(series_id),
        episode.season_number.to_string(),
        episode.episode_number.to_string(),
        copy_text(&episode.name),
        copy_text(&episode.stream_url),
        copy_opt(episode.provider_id.as_deref()),
    ])
}

// source_id, id, display_name, icon
pub fn epg_channel_copy_line(source_id: Uuid, channel: &EpgChannel) -> String {
    copy_line(&[
        source_id.to_string(),
        copy_text(&channel.id),
        copy_text(&channel.display_name),
        copy_opt(channel.icon.as_deref()),
    ])
}

// source_id, channel_id, title, description, start_time, end_time, category, icon
pub fn program_copy_line(source_id: Uuid, program: &EpgProgram) -> String {
    copy_line(&[
        source_id.to_string(),
        copy_text(&program.channel_id),
        copy_text(&program.title),
        copy_opt(program.description.as_deref()),
        program.start.to_rfc3339(),
        program.end.to_rfc3339(),
        copy_opt(program.category.as_deref()),
        copy_opt(program.icon.as_deref()),
    ])
}
