//! Groups classified series episodes into named series

use std::collections::BTreeMap;
use uuid::Uuid;

use crate::models::{ContentType, Episode, RawEntry, SeriesGroup, SeriesRecord};

/// Groups series-episode entries of one source by series name.
///
/// Names are matched exactly after trimming. Within a series, entries that
/// share `(season, episode)` collapse to the one with the highest ordinal.
/// The result is ordered by name, each episode list by `(season, episode)`.
/// Entries that are not series episodes are ignored.
pub fn group_series<I>(entries: I) -> BTreeMap<String, Vec<RawEntry>>
where
    I: IntoIterator<Item = RawEntry>,
{
    let mut by_series: BTreeMap<String, BTreeMap<(u32, u32), RawEntry>> = BTreeMap::new();

    for entry in entries {
        let (name, key) = match &entry.content_type {
            ContentType::SeriesEpisode {
                series_name,
                season_number,
                episode_number,
            } => (
                series_name.trim().to_string(),
                (*season_number, *episode_number),
            ),
            _ => continue,
        };

        let episodes = by_series.entry(name).or_default();
        match episodes.get(&key) {
            Some(existing) if existing.ordinal > entry.ordinal => {}
            _ => {
                episodes.insert(key, entry);
            }
        }
    }

    by_series
        .into_iter()
        .map(|(name, episodes)| (name, episodes.into_values().collect()))
        .collect()
}

/// Same grouping, as a list of [`SeriesGroup`]
pub fn group_series_list<I>(entries: I) -> Vec<SeriesGroup>
where
    I: IntoIterator<Item = RawEntry>,
{
    group_series(entries)
        .into_iter()
        .map(|(name, episodes)| SeriesGroup { name, episodes })
        .collect()
}

/// Builds the persisted series record for one group.
///
/// Group title and logo come from the most recent (highest ordinal) episode
/// that carries them.
pub fn series_record(source_id: Uuid, group: &SeriesGroup) -> SeriesRecord {
    let mut record = SeriesRecord::new(source_id, &group.name);

    let mut by_recency: Vec<&RawEntry> = group.episodes.iter().collect();
    by_recency.sort_by(|a, b| b.ordinal.cmp(&a.ordinal));

    if let Some(latest) = by_recency.first() {
        record.group_title = latest.group_title.clone();
    }
    record.logo_url = by_recency.iter().find_map(|e| e.logo_url.clone());

    record.episodes = group
        .episodes
        .iter()
        .filter_map(|entry| match &entry.content_type {
            ContentType::SeriesEpisode {
                season_number,
                episode_number,
                ..
            } => Some(Episode {
                season_number: *season_number,
                episode_number: *episode_number,
                name: entry.display_name.clone(),
                stream_url: entry.stream_url.clone(),
                provider_id: entry.provider_id.clone(),
            }),
            _ => None,
        })
        .collect();

    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DEFAULT_GROUP_TITLE;

    fn episode(series: &str, season: u32, ep: u32, ordinal: usize) -> RawEntry {
        RawEntry {
            display_name: format!("{} S{:02}E{:02}", series, season, ep),
            stream_url: format!("http://host/series/{}.mp4", ordinal),
            logo_url: None,
            group_title: DEFAULT_GROUP_TITLE.to_string(),
            epg_id: None,
            catchup_days: 0,
            catchup_source: None,
            channel_number: None,
            provider_id: None,
            ordinal,
            content_type: ContentType::SeriesEpisode {
                series_name: series.to_string(),
                season_number: season,
                episode_number: ep,
            },
        }
    }

    #[test]
    fn test_duplicate_episode_keeps_highest_ordinal() {
        let grouped = group_series(vec![episode("Show", 1, 1, 3), episode("Show", 1, 1, 9)]);
        let episodes = &grouped["Show"];
        assert_eq!(episodes.len(), 1);
        assert_eq!(episodes[0].stream_url, "http://host/series/9.mp4");

        // Input order does not matter, ordinal does
        let grouped = group_series(vec![episode("Show", 1, 1, 9), episode("Show", 1, 1, 3)]);
        assert_eq!(grouped["Show"][0].stream_url, "http://host/series/9.mp4");
    }

    #[test]
    fn test_episodes_sorted_by_season_then_episode() {
        let grouped = group_series(vec![
            episode("Show", 2, 1, 0),
            episode("Show", 1, 10, 1),
            episode("Show", 1, 2, 2),
        ]);
        let keys: Vec<(u32, u32)> = grouped["Show"]
            .iter()
            .map(|e| match &e.content_type {
                ContentType::SeriesEpisode {
                    season_number,
                    episode_number,
                    ..
                } => (*season_number, *episode_number),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(keys, vec![(1, 2), (1, 10), (2, 1)]);
    }

    #[test]
    fn test_groups_ordered_by_name_and_case_sensitive() {
        let grouped = group_series(vec![
            episode("zeta", 1, 1, 0),
            episode("Alpha ", 1, 1, 1),
            episode("alpha", 1, 1, 2),
        ]);
        let names: Vec<&str> = grouped.keys().map(|k| k.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "alpha", "zeta"]);
    }

    #[test]
    fn test_non_series_entries_are_ignored() {
        let mut live = episode("Show", 1, 1, 0);
        live.content_type = ContentType::Live;
        assert!(group_series(vec![live]).is_empty());
    }

    #[test]
    fn test_series_record_uses_latest_metadata() {
        let mut first = episode("Show", 1, 1, 0);
        first.logo_url = Some("http://img/old.png".to_string());
        first.group_title = "Old".to_string();
        let mut second = episode("Show", 1, 2, 5);
        second.group_title = "New".to_string();

        let groups = group_series_list(vec![first, second]);
        let record = series_record(Uuid::new_v4(), &groups[0]);
        assert_eq!(record.name, "Show");
        assert_eq!(record.group_title, "New");
        assert_eq!(record.logo_url.as_deref(), Some("http://img/old.png"));
        assert_eq!(record.episodes.len(), 2);
        assert_eq!(record.episodes[1].episode_number, 2);
    }
}
