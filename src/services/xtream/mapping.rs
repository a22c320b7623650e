//! Xtream wire types to the canonical content model
//!
//! Category lookups are built per call and dropped with it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::types::*;
use crate::models::{catalog_number, ContentType, EntryWarning, Episode, RawEntry, WarningKind};

const DEFAULT_VOD_EXTENSION: &str = "mp4";

/// Entries of one stream list plus the problems met while mapping them
#[derive(Debug, Clone, Default)]
pub struct XtreamListing {
    pub entries: Vec<RawEntry>,
    pub warnings: Vec<EntryWarning>,
}

/// One series as announced by `get_series`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XtreamSeriesSummary {
    pub series_id: String,
    pub name: String,
    pub group_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
    pub ordinal: usize,
}

#[derive(Debug, Clone, Default)]
pub struct XtreamSeriesListing {
    pub series: Vec<XtreamSeriesSummary>,
    pub warnings: Vec<EntryWarning>,
}

/// `get_vod_info` mapped to playback-ready fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VodDetail {
    pub stream_id: String,
    pub name: String,
    pub stream_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plot: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub director: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cast: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trailer: Option<String>,
}

/// `get_series_info` mapped to episodes grouped by season
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesDetail {
    pub series_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plot: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    /// Season number to episodes sorted by episode number
    pub seasons: BTreeMap<u32, Vec<Episode>>,
}

impl SeriesDetail {
    /// All episodes ordered by (season, episode)
    pub fn episodes(&self) -> Vec<Episode> {
        self.seasons.values().flatten().cloned().collect()
    }
}

/// category_id -> category_name
pub fn category_lookup(categories: &[XtreamCategory]) -> HashMap<String, String> {
    categories
        .iter()
        .filter_map(|c| Some((c.category_id.clone()?, c.category_name.clone()?)))
        .collect()
}

/// Resolves a group title, warning when an id is present but unknown
fn resolve_group(
    lookup: &HashMap<String, String>,
    category_id: Option<&str>,
    kind: CategoryKind,
    item: &str,
    warnings: &mut Vec<EntryWarning>,
) -> String {
    match category_id {
        Some(id) => match lookup.get(id) {
            Some(name) => name.clone(),
            None => {
                warnings.push(EntryWarning::new(
                    WarningKind::UnresolvedCategory,
                    format!("'{}' references unknown category {}", item, id),
                ));
                kind.fallback_group().to_string()
            }
        },
        None => kind.fallback_group().to_string(),
    }
}

fn missing_id_warning(kind: &str, name: Option<&str>) -> EntryWarning {
    EntryWarning::new(
        WarningKind::MalformedRecord,
        format!("{} '{}' has no id, skipped", kind, name.unwrap_or_default()),
    )
}

pub fn map_live_streams(
    creds: &XtreamCredentials,
    streams: Vec<XtreamLiveStream>,
    categories: &[XtreamCategory],
) -> XtreamListing {
    let lookup = category_lookup(categories);
    let mut listing = XtreamListing::default();

    for stream in streams {
        let Some(stream_id) = stream.stream_id.clone() else {
            listing
                .warnings
                .push(missing_id_warning("Live stream", stream.name.as_deref()));
            continue;
        };
        let name = stream.name.clone().unwrap_or_default();
        let group_title = resolve_group(
            &lookup,
            stream.category_id.as_deref(),
            CategoryKind::Live,
            &name,
            &mut listing.warnings,
        );
        let catchup_days = match (stream.tv_archive, stream.tv_archive_duration) {
            (Some(1), Some(days)) => catalog_number(days).unwrap_or_else(|| {
                if days > 0 {
                    listing.warnings.push(EntryWarning::new(
                        WarningKind::OutOfRange,
                        format!("Live stream '{}' archive of {} days ignored", name, days),
                    ));
                }
                0
            }),
            _ => 0,
        };

        listing.entries.push(RawEntry {
            display_name: name,
            stream_url: creds.live_url(&stream_id),
            logo_url: stream.stream_icon,
            group_title,
            epg_id: stream.epg_channel_id,
            catchup_days,
            catchup_source: None,
            channel_number: stream.num.and_then(catalog_number),
            provider_id: Some(format!("live:{}", stream_id)),
            ordinal: listing.entries.len(),
            content_type: ContentType::Live,
        });
    }

    listing
}

pub fn map_vod_streams(
    creds: &XtreamCredentials,
    streams: Vec<XtreamVodStream>,
    categories: &[XtreamCategory],
) -> XtreamListing {
    let lookup = category_lookup(categories);
    let mut listing = XtreamListing::default();

    for stream in streams {
        let Some(stream_id) = stream.stream_id.clone() else {
            listing
                .warnings
                .push(missing_id_warning("Movie", stream.name.as_deref()));
            continue;
        };
        let name = stream.name.clone().unwrap_or_default();
        let group_title = resolve_group(
            &lookup,
            stream.category_id.as_deref(),
            CategoryKind::Vod,
            &name,
            &mut listing.warnings,
        );
        let extension = stream
            .container_extension
            .as_deref()
            .unwrap_or(DEFAULT_VOD_EXTENSION);

        listing.entries.push(RawEntry {
            display_name: name,
            stream_url: creds.vod_url(&stream_id, extension),
            logo_url: stream.stream_icon,
            group_title,
            epg_id: None,
            catchup_days: 0,
            catchup_source: None,
            channel_number: None,
            provider_id: Some(format!("vod:{}", stream_id)),
            ordinal: listing.entries.len(),
            content_type: ContentType::Movie,
        });
    }

    listing
}

pub fn map_series(list: Vec<XtreamSeries>, categories: &[XtreamCategory]) -> XtreamSeriesListing {
    let lookup = category_lookup(categories);
    let mut listing = XtreamSeriesListing::default();

    for series in list {
        let (Some(series_id), Some(name)) = (series.series_id.clone(), series.name.clone()) else {
            listing.warnings.push(EntryWarning::new(
                WarningKind::MalformedRecord,
                format!(
                    "Series '{}' has no id or name, skipped",
                    series.name.as_deref().unwrap_or_default()
                ),
            ));
            continue;
        };
        let group_title = resolve_group(
            &lookup,
            series.category_id.as_deref(),
            CategoryKind::Series,
            &name,
            &mut listing.warnings,
        );

        listing.series.push(XtreamSeriesSummary {
            series_id,
            name,
            group_title,
            cover: series.cover,
            ordinal: listing.series.len(),
        });
    }

    listing
}

pub fn map_vod_detail(creds: &XtreamCredentials, vod_id: &str, info: XtreamVodInfo) -> VodDetail {
    let details = info.info.unwrap_or_default();
    let movie = info.movie_data.unwrap_or_default();
    let stream_id = movie.stream_id.clone().unwrap_or_else(|| vod_id.to_string());
    let extension = movie
        .container_extension
        .as_deref()
        .unwrap_or(DEFAULT_VOD_EXTENSION);

    VodDetail {
        stream_url: creds.vod_url(&stream_id, extension),
        name: movie.name.or(details.name).unwrap_or_default(),
        stream_id,
        plot: details.plot.or(details.description),
        genre: details.genre,
        director: details.director,
        cast: details.cast,
        release_date: details.releasedate,
        duration_secs: details.duration_secs,
        rating: details.rating,
        cover: details.cover_big.or(details.movie_image),
        trailer: details.youtube_trailer,
    }
}

/// Groups episodes by season. Numbers below 1 become 1; a repeated
/// (season, episode) keeps the later one.
pub fn map_series_detail(
    creds: &XtreamCredentials,
    series_id: &str,
    fallback_name: Option<&str>,
    info: XtreamSeriesInfo,
) -> SeriesDetail {
    let details = info.info.unwrap_or_default();
    let name = details
        .name
        .or_else(|| fallback_name.map(str::to_string))
        .unwrap_or_default();

    let mut keyed: BTreeMap<(u32, u32), Episode> = BTreeMap::new();
    for episode in info.episodes {
        let Some(episode_id) = episode.id.clone() else {
            continue;
        };
        let season = clamp_number(episode.season);
        let number = clamp_number(episode.episode_num);
        let extension = episode
            .container_extension
            .as_deref()
            .unwrap_or(DEFAULT_VOD_EXTENSION);
        let title = episode
            .title
            .clone()
            .unwrap_or_else(|| format!("{} S{:02}E{:02}", name, season, number));

        keyed.insert(
            (season, number),
            Episode {
                season_number: season,
                episode_number: number,
                name: title,
                stream_url: creds.series_url(&episode_id, extension),
                provider_id: Some(format!("episode:{}", episode_id)),
            },
        );
    }

    let mut seasons: BTreeMap<u32, Vec<Episode>> = BTreeMap::new();
    for ((season, _), episode) in keyed {
        seasons.entry(season).or_default().push(episode);
    }

    SeriesDetail {
        series_id: series_id.to_string(),
        name,
        plot: details.plot,
        cover: details.cover,
        genre: details.genre,
        seasons,
    }
}

fn clamp_number(value: Option<i64>) -> u32 {
    value.and_then(catalog_number).unwrap_or(1).max(1)
}
