//! XMLTV programme guide parser
//!
//! Single pass over the document with `quick-xml`. Structural XML errors fail
//! the whole document; a bad `<programme>` only costs a warning.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::IngestError;
use crate::models::{EntryWarning, EpgChannel, EpgProgram, WarningKind, XmltvDocument};

/// Element whose text is being collected
#[derive(Debug, Clone, Copy, PartialEq)]
enum TextField {
    None,
    DisplayName,
    Title,
    Desc,
    Category,
}

#[derive(Debug, Default)]
struct PendingChannel {
    id: Option<String>,
    display_name: Option<String>,
    icon: Option<String>,
}

#[derive(Debug, Default)]
struct PendingProgramme {
    channel: Option<String>,
    start: Option<String>,
    stop: Option<String>,
    title: Option<String>,
    description: Option<String>,
    category: Option<String>,
    icon: Option<String>,
}

impl PendingChannel {
    fn finish(self, doc: &mut XmltvDocument) {
        match self.id {
            Some(id) => doc.channels.push(EpgChannel {
                display_name: self.display_name.unwrap_or_else(|| id.clone()),
                id,
                icon: self.icon,
            }),
            None => doc.warnings.push(EntryWarning::new(
                WarningKind::MissingAttribute,
                "<channel> without id skipped",
            )),
        }
    }
}

impl PendingProgramme {
    fn finish(self, doc: &mut XmltvDocument) {
        let (channel_id, start_raw, stop_raw) = match (self.channel, self.start, self.stop) {
            (Some(c), Some(start), Some(stop)) => (c, start, stop),
            (channel, start, stop) => {
                let missing: Vec<&str> = [
                    ("channel", channel.is_none()),
                    ("start", start.is_none()),
                    ("stop", stop.is_none()),
                ]
                .iter()
                .filter(|(_, absent)| *absent)
                .map(|(name, _)| *name)
                .collect();
                doc.warnings.push(EntryWarning::new(
                    WarningKind::MissingAttribute,
                    format!(
                        "<programme> for '{}' missing {} skipped",
                        channel.unwrap_or_default(),
                        missing.join(", ")
                    ),
                ));
                return;
            }
        };

        let (start, end) = match (parse_xmltv_time(&start_raw), parse_xmltv_time(&stop_raw)) {
            (Some(start), Some(end)) => (start, end),
            _ => {
                doc.warnings.push(EntryWarning::new(
                    WarningKind::InvalidTimestamp,
                    format!(
                        "<programme> for '{}' has unparseable time '{}' / '{}'",
                        channel_id, start_raw, stop_raw
                    ),
                ));
                return;
            }
        };

        if end <= start {
            doc.warnings.push(EntryWarning::new(
                WarningKind::InvalidTimeRange,
                format!(
                    "<programme> for '{}' stops at {} before it starts at {}",
                    channel_id, stop_raw, start_raw
                ),
            ));
            return;
        }

        doc.programs.push(EpgProgram {
            channel_id,
            title: self.title.unwrap_or_default(),
            description: self.description,
            start,
            end,
            category: self.category,
            icon: self.icon,
        });
    }
}

/// `parseXmltv`: channels and time-bounded programmes plus warnings.
///
/// Fails with `MalformedInput` when the text is not well-formed XML or the
/// root element is not `<tv>`.
pub fn parse_xmltv(xml: &str) -> Result<XmltvDocument, IngestError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut doc = XmltvDocument::default();
    let mut saw_root = false;
    let mut channel: Option<PendingChannel> = None;
    let mut programme: Option<PendingProgramme> = None;
    let mut field = TextField::None;
    let mut text_buf = String::new();

    loop {
        let position = reader.buffer_position();
        let event = reader.read_event().map_err(|e| {
            IngestError::MalformedInput(format!("XML error at byte {}: {}", position, e))
        })?;

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let self_closing = matches!(event, Event::Empty(_));
                let name = e.name();

                if !saw_root {
                    if name.as_ref() != b"tv" {
                        return Err(IngestError::MalformedInput(format!(
                            "Expected <tv> root element, found <{}>",
                            String::from_utf8_lossy(name.as_ref())
                        )));
                    }
                    saw_root = true;
                    continue;
                }

                match name.as_ref() {
                    b"channel" => {
                        let pending = PendingChannel {
                            id: attribute(e, b"id"),
                            ..Default::default()
                        };
                        if self_closing {
                            pending.finish(&mut doc);
                        } else {
                            channel = Some(pending);
                        }
                    }
                    b"programme" => {
                        let pending = PendingProgramme {
                            channel: attribute(e, b"channel"),
                            start: attribute(e, b"start"),
                            stop: attribute(e, b"stop"),
                            ..Default::default()
                        };
                        if self_closing {
                            pending.finish(&mut doc);
                        } else {
                            programme = Some(pending);
                        }
                    }
                    b"icon" => {
                        let src = attribute(e, b"src");
                        if let Some(p) = programme.as_mut() {
                            p.icon = p.icon.take().or(src);
                        } else if let Some(c) = channel.as_mut() {
                            c.icon = c.icon.take().or(src);
                        }
                    }
                    b"display-name" if channel.is_some() && !self_closing => {
                        field = TextField::DisplayName;
                        text_buf.clear();
                    }
                    b"title" if programme.is_some() && !self_closing => {
                        field = TextField::Title;
                        text_buf.clear();
                    }
                    b"desc" if programme.is_some() && !self_closing => {
                        field = TextField::Desc;
                        text_buf.clear();
                    }
                    b"category" if programme.is_some() && !self_closing => {
                        field = TextField::Category;
                        text_buf.clear();
                    }
                    _ => {}
                }
            }
            Event::Text(e) => {
                if field != TextField::None {
                    // Unknown entities (&nbsp; and friends) keep the raw text
                    match e.unescape() {
                        Ok(text) => text_buf.push_str(&text),
                        Err(_) => text_buf.push_str(&String::from_utf8_lossy(&e)),
                    }
                }
            }
            Event::CData(e) => {
                if field != TextField::None {
                    text_buf.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Event::End(ref e) => match e.name().as_ref() {
                b"channel" => {
                    if let Some(pending) = channel.take() {
                        pending.finish(&mut doc);
                    }
                    field = TextField::None;
                }
                b"programme" => {
                    if let Some(pending) = programme.take() {
                        pending.finish(&mut doc);
                    }
                    field = TextField::None;
                }
                b"display-name" | b"title" | b"desc" | b"category" => {
                    let text = text_buf.trim().to_string();
                    text_buf.clear();
                    if !text.is_empty() {
                        // First occurrence wins for repeated (multi-language) elements
                        match field {
                            TextField::DisplayName => {
                                if let Some(c) = channel.as_mut() {
                                    c.display_name.get_or_insert(text);
                                }
                            }
                            TextField::Title => {
                                if let Some(p) = programme.as_mut() {
                                    p.title.get_or_insert(text);
                                }
                            }
                            TextField::Desc => {
                                if let Some(p) = programme.as_mut() {
                                    p.description.get_or_insert(text);
                                }
                            }
                            TextField::Category => {
                                if let Some(p) = programme.as_mut() {
                                    p.category.get_or_insert(text);
                                }
                            }
                            TextField::None => {}
                        }
                    }
                    field = TextField::None;
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err(IngestError::MalformedInput(
            "Document has no <tv> root element".to_string(),
        ));
    }

    tracing::debug!(
        channels = doc.channels.len(),
        programs = doc.programs.len(),
        warnings = doc.warnings.len(),
        "XMLTV parsed"
    );

    Ok(doc)
}

/// Trimmed, non-empty attribute value
fn attribute(e: &BytesStart, name: &[u8]) -> Option<String> {
    e.try_get_attribute(name)
        .ok()
        .flatten()
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.trim().to_string()))
        .filter(|v| !v.is_empty())
}

/// Parses `YYYYMMDDHHMMSS [±HHMM]` (seconds optional).
/// Without an offset the time is taken as UTC.
pub fn parse_xmltv_time(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    let digits_end = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, rest) = value.split_at(digits_end);

    let digits = match digits.len() {
        14 => digits.to_string(),
        12 => format!("{}00", digits),
        _ => return None,
    };
    let naive = NaiveDateTime::parse_from_str(&digits, "%Y%m%d%H%M%S").ok()?;

    let offset = match rest.trim() {
        "" | "Z" | "UTC" | "GMT" => return Some(Utc.from_utc_datetime(&naive)),
        other => parse_offset(other)?,
    };

    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// `+0200`, `-0530` or `+02:00`
fn parse_offset(value: &str) -> Option<FixedOffset> {
    let (sign, rest) = match value.as_bytes().first()? {
        b'+' => (1, &value[1..]),
        b'-' => (-1, &value[1..]),
        _ => return None,
    };
    let rest = rest.replace(':', "");
    if rest.len() != 4 || !rest.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = rest[..2].parse().ok()?;
    let minutes: i32 = rest[2..].parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_parse_time_with_and_without_offset() {
        assert_eq!(
            parse_xmltv_time("20240101120000 +0200"),
            Some(utc(2024, 1, 1, 10, 0))
        );
        assert_eq!(
            parse_xmltv_time("20240101120000 -0130"),
            Some(utc(2024, 1, 1, 13, 30))
        );
        assert_eq!(parse_xmltv_time("20240101120000"), Some(utc(2024, 1, 1, 12, 0)));
        assert_eq!(parse_xmltv_time("202401011200"), Some(utc(2024, 1, 1, 12, 0)));
        assert_eq!(parse_xmltv_time("2024-01-01"), None);
        assert_eq!(parse_xmltv_time("20240101120000 CET"), None);
        assert_eq!(parse_xmltv_time("20241301120000"), None);
    }

    #[test]
    fn test_parse_document() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE tv SYSTEM "xmltv.dtd">
<tv generator-info-name="test">
  <channel id="bbc1.uk">
    <display-name lang="en">BBC One</display-name>
    <display-name lang="cy">BBC Un</display-name>
    <icon src="http://img/bbc1.png"/>
  </channel>
  <programme start="20240101120000 +0200" stop="20240101130000 +0200" channel="bbc1.uk">
    <title lang="en">News &amp; Weather</title>
    <desc>Headlines</desc>
    <category>News</category>
    <category>Current Affairs</category>
    <icon src="http://img/news.png"/>
  </programme>
</tv>"#;

        let doc = parse_xmltv(xml).unwrap();
        assert!(doc.warnings.is_empty());

        assert_eq!(doc.channels.len(), 1);
        assert_eq!(doc.channels[0].id, "bbc1.uk");
        assert_eq!(doc.channels[0].display_name, "BBC One");
        assert_eq!(doc.channels[0].icon.as_deref(), Some("http://img/bbc1.png"));

        assert_eq!(doc.programs.len(), 1);
        let program = &doc.programs[0];
        assert_eq!(program.channel_id, "bbc1.uk");
        assert_eq!(program.title, "News & Weather");
        assert_eq!(program.description.as_deref(), Some("Headlines"));
        assert_eq!(program.category.as_deref(), Some("News"));
        assert_eq!(program.icon.as_deref(), Some("http://img/news.png"));
        assert_eq!(program.start, utc(2024, 1, 1, 10, 0));
        assert_eq!(program.end, utc(2024, 1, 1, 11, 0));
    }

    #[test]
    fn test_inverted_range_is_rejected() {
        let xml = r#"<tv>
  <programme start="20240101060000" stop="20240101050000" channel="a"><title>Bad</title></programme>
  <programme start="20240101060000" stop="20240101070000" channel="a"><title>Good</title></programme>
</tv>"#;
        let doc = parse_xmltv(xml).unwrap();
        assert_eq!(doc.programs.len(), 1);
        assert_eq!(doc.programs[0].title, "Good");
        assert_eq!(doc.warnings.len(), 1);
        assert_eq!(doc.warnings[0].kind, WarningKind::InvalidTimeRange);
    }

    #[test]
    fn test_equal_start_and_stop_is_rejected() {
        let xml = r#"<tv><programme start="20240101060000" stop="20240101060000" channel="a"/></tv>"#;
        let doc = parse_xmltv(xml).unwrap();
        assert!(doc.programs.is_empty());
        assert_eq!(doc.warnings[0].kind, WarningKind::InvalidTimeRange);
    }

    #[test]
    fn test_missing_attributes_and_bad_times_are_warnings() {
        let xml = r#"<tv>
  <programme start="20240101060000" channel="a"><title>No stop</title></programme>
  <programme start="soon" stop="later" channel="a"><title>Bad time</title></programme>
  <channel><display-name>No id</display-name></channel>
</tv>"#;
        let doc = parse_xmltv(xml).unwrap();
        assert!(doc.programs.is_empty());
        assert!(doc.channels.is_empty());

        let kinds: Vec<WarningKind> = doc.warnings.iter().map(|w| w.kind).collect();
        assert_eq!(
            kinds,
            vec![
                WarningKind::MissingAttribute,
                WarningKind::InvalidTimestamp,
                WarningKind::MissingAttribute
            ]
        );
        assert!(doc.warnings[0].message.contains("stop"));
    }

    #[test]
    fn test_channel_without_display_name_uses_id() {
        let doc = parse_xmltv(r#"<tv><channel id="x.tv"/></tv>"#).unwrap();
        assert_eq!(doc.channels[0].display_name, "x.tv");
    }

    #[test]
    fn test_malformed_documents() {
        assert!(matches!(
            parse_xmltv("<tv><programme></tv>"),
            Err(IngestError::MalformedInput(_))
        ));
        assert!(matches!(
            parse_xmltv("<html><body/></html>"),
            Err(IngestError::MalformedInput(_))
        ));
        assert!(matches!(parse_xmltv(""), Err(IngestError::MalformedInput(_))));
    }

    #[test]
    fn test_cdata_text() {
        let xml = r#"<tv><programme start="20240101060000" stop="20240101070000" channel="a"><title><![CDATA[Tom & Jerry]]></title></programme></tv>"#;
        let doc = parse_xmltv(xml).unwrap();
        assert_eq!(doc.programs[0].title, "Tom & Jerry");
    }
}
