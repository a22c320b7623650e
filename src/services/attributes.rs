//! `key="value"` attribute extraction for `#EXTINF` lines

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

use crate::models::catalog_number;

lazy_static! {
    /// Tolerant attribute pattern: letters, digits, `_` and `-` in keys,
    /// anything but `"` in values (empty allowed)
    static ref ATTR_REGEX: Regex = Regex::new(r#"([A-Za-z0-9_-]+)="([^"]*)""#).unwrap();
}

/// Attributes of one `#EXTINF` directive, keyed by lower-cased name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtinfAttributes {
    values: HashMap<String, String>,
}

impl ExtinfAttributes {
    /// Raw lookup by (case-insensitive) key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(&key.to_lowercase()).map(|s| s.as_str())
    }

    /// Lookup that treats empty and whitespace-only values as absent
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn tvg_id(&self) -> Option<&str> {
        self.non_empty("tvg-id")
    }

    pub fn tvg_name(&self) -> Option<&str> {
        self.non_empty("tvg-name")
    }

    pub fn tvg_logo(&self) -> Option<&str> {
        self.non_empty("tvg-logo")
    }

    pub fn group_title(&self) -> Option<&str> {
        self.non_empty("group-title")
    }

    pub fn channel_number(&self) -> Option<u32> {
        self.number("tvg-chno")
    }

    /// `catchup-days`, 0 when absent, unparseable or out of range
    pub fn catchup_days(&self) -> u32 {
        self.number("catchup-days").unwrap_or(0)
    }

    fn number(&self, key: &str) -> Option<u32> {
        self.non_empty(key)?.parse::<u64>().ok().and_then(catalog_number)
    }

    /// Numeric keys whose value is all digits but too large to store
    pub fn out_of_range_keys(&self) -> Vec<&'static str> {
        ["tvg-chno", "catchup-days"]
            .into_iter()
            .filter(|key| {
                self.non_empty(key).map_or(false, |v| {
                    v.chars().all(|c| c.is_ascii_digit()) && self.number(key).is_none()
                })
            })
            .collect()
    }

    pub fn catchup_source(&self) -> Option<&str> {
        self.non_empty("catchup-source")
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Scans `segment` for repeated `key="value"` tokens.
///
/// Never fails; a segment without matches yields an empty map. When a key
/// repeats, the last occurrence wins.
pub fn tokenize_attributes(segment: &str) -> ExtinfAttributes {
    let mut values = HashMap::new();
    for caps in ATTR_REGEX.captures_iter(segment) {
        let key = caps.get(1).map(|m| m.as_str().to_lowercase()).unwrap_or_default();
        let value = caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default();
        values.insert(key, value);
    }
    ExtinfAttributes { values }
}

/// Byte index of the last comma that is not inside a quoted value
pub fn last_unquoted_comma(line: &str) -> Option<usize> {
    let mut in_quotes = false;
    let mut last = None;
    for (idx, ch) in line.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => last = Some(idx),
            _ => {}
        }
    }
    last
}
