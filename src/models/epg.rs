use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EntryWarning;

/// Channel metadata declared by an XMLTV document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpgChannel {
    /// Opaque XMLTV id, matched against `ChannelRecord::epg_id`
    pub id: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// One scheduled programme. `start < end` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpgProgram {
    /// XMLTV channel id, not the internal channel id
    pub channel_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl EpgProgram {
    pub fn is_airing_at(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

/// Output of `parse_xmltv`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XmltvDocument {
    pub channels: Vec<EpgChannel>,
    pub programs: Vec<EpgProgram>,
    pub warnings: Vec<EntryWarning>,
}
