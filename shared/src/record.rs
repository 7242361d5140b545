//! Catalog records as the core sees them.
//!
//! The catalog's JSON is loosely typed: every field may be missing, null, or
//! a number where a string was expected. All of that is absorbed here, at the
//! fetch boundary, so nothing downstream has to guess.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::event::RecordUid;

/// Display placeholder for absent metadata.
pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordImage {
    pub thumbnail_url: String,
    pub large_url: String,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFile {
    pub url: String,
    pub name: Option<String>,
}

/// A wanted-person entry. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub uid: RecordUid,
    pub title: String,
    pub description: String,
    pub images: Vec<RecordImage>,
    pub details: Option<String>,
    pub remarks: Option<String>,
    pub reward_text: Option<String>,
    pub warning_message: Option<String>,
    pub age_range: Option<String>,
    pub race: Option<String>,
    pub hair: Option<String>,
    pub eyes: Option<String>,
    pub height_min: Option<String>,
    pub weight_min: Option<String>,
    pub subjects: Vec<String>,
    pub publication: Option<String>,
    pub files: Vec<RecordFile>,
}

impl Record {
    /// Minimal record, mostly for tests and fixtures.
    pub fn new(uid: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            uid: RecordUid::new(uid),
            title: title.into(),
            description: String::new(),
            images: Vec::new(),
            details: None,
            remarks: None,
            reward_text: None,
            warning_message: None,
            age_range: None,
            race: None,
            hair: None,
            eyes: None,
            height_min: None,
            weight_min: None,
            subjects: Vec::new(),
            publication: None,
            files: Vec::new(),
        }
    }

    pub fn thumbnail_url(&self) -> Option<&str> {
        self.images.first().map(|i| i.thumbnail_url.as_str())
    }

    pub fn detail(&self) -> RecordDetail {
        RecordDetail::from(self)
    }
}

/// One page of the catalog as returned by the list endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub page_number: u32,
    pub items: Vec<Record>,
    pub total_count: u64,
}

impl Page {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// --- Wire shapes -----------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct RawPage {
    pub items: Vec<RawRecord>,
    pub total: u64,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawImage {
    #[serde(default, deserialize_with = "lenient_text")]
    thumb: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    large: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    original: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    caption: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawFile {
    #[serde(default, deserialize_with = "lenient_text")]
    url: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawRecord {
    #[serde(default, deserialize_with = "lenient_text")]
    uid: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    title: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    description: Option<String>,
    #[serde(default)]
    images: Option<Vec<RawImage>>,
    #[serde(default, deserialize_with = "lenient_text")]
    details: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    remarks: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    reward_text: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    warning_message: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    age_range: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    race: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    hair: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    eyes: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    height_min: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    weight_min: Option<String>,
    #[serde(default)]
    subjects: Option<Vec<Option<String>>>,
    #[serde(default, deserialize_with = "lenient_text")]
    publication: Option<String>,
    #[serde(default)]
    files: Option<Vec<RawFile>>,
}

/// Accepts strings, numbers and booleans; anything else, and blank text,
/// becomes `None`.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let text = match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    };
    Ok(text
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty()))
}

impl RawRecord {
    /// `None` when the record has no uid; such entries cannot be addressed.
    pub(crate) fn normalize(self) -> Option<Record> {
        let uid = RecordUid::new(self.uid?);

        let images = self
            .images
            .unwrap_or_default()
            .into_iter()
            .filter_map(|img| {
                let thumb = img.thumb.or_else(|| img.large.clone())?;
                let large = img
                    .large
                    .or(img.original)
                    .unwrap_or_else(|| thumb.clone());
                Some(RecordImage {
                    thumbnail_url: thumb,
                    large_url: large,
                    caption: img.caption,
                })
            })
            .collect();

        let files = self
            .files
            .unwrap_or_default()
            .into_iter()
            .filter_map(|f| {
                Some(RecordFile {
                    url: f.url?,
                    name: f.name,
                })
            })
            .collect();

        let subjects = self
            .subjects
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Some(Record {
            uid,
            title: self.title.unwrap_or_default(),
            description: self.description.map(|d| strip_html(&d)).unwrap_or_default(),
            images,
            details: self.details.map(|d| strip_html(&d)).filter(|d| !d.trim().is_empty()),
            remarks: self.remarks.map(|r| strip_html(&r)).filter(|r| !r.trim().is_empty()),
            reward_text: self.reward_text,
            warning_message: self.warning_message,
            age_range: self.age_range,
            race: self.race,
            hair: self.hair,
            eyes: self.eyes,
            height_min: self.height_min,
            weight_min: self.weight_min,
            subjects,
            publication: self.publication,
            files,
        })
    }
}

impl RawPage {
    pub(crate) fn normalize(self, page_number: u32) -> Page {
        let mut dropped = 0usize;
        let items = self
            .items
            .into_iter()
            .filter_map(|raw| {
                let record = raw.normalize();
                if record.is_none() {
                    dropped += 1;
                }
                record
            })
            .collect();

        if dropped > 0 {
            warn!(page = page_number, dropped, "catalog entries without uid dropped");
        }

        Page {
            page_number,
            items,
            total_count: self.total,
        }
    }
}

/// Removes markup tags. An opening `<` with no closing `>` swallows the rest
/// of the text; a bare `<` at the very end, or `<>`, is kept.
pub fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('>') {
            Some(0) => {
                out.push('<');
                rest = after;
            }
            Some(end) => rest = &after[end + 1..],
            None if after.is_empty() => {
                out.push('<');
                rest = after;
            }
            None => rest = "",
        }
    }

    out.push_str(rest);
    out
}

/// Renders an ISO-8601 timestamp as a calendar date.
pub fn format_publication_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let date = DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.date_naive())
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").map(|dt| dt.date()))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").map(|dt| dt.date()))
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()?;
    Some(date.format("%Y-%m-%d").to_string())
}

fn or_na(value: Option<&str>) -> String {
    value.unwrap_or(NOT_AVAILABLE).to_string()
}

/// Display-ready view of a record: every optional field resolved to text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDetail {
    pub uid: String,
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    pub details: String,
    pub reward: String,
    pub age: String,
    pub race: String,
    pub publication_date: String,
    pub subjects: String,
    pub hair: String,
    pub eyes: String,
    pub height: String,
    pub weight: String,
    pub remarks: String,
    pub warning_message: String,
    pub download_url: Option<String>,
}

impl From<&Record> for RecordDetail {
    fn from(record: &Record) -> Self {
        let subjects = if record.subjects.is_empty() {
            NOT_AVAILABLE.to_string()
        } else {
            record.subjects.join(", ")
        };

        Self {
            uid: record.uid.to_string(),
            title: record.title.clone(),
            description: record.description.clone(),
            image_url: record.thumbnail_url().map(str::to_string),
            details: or_na(record.details.as_deref()),
            reward: or_na(record.reward_text.as_deref()),
            age: or_na(record.age_range.as_deref()),
            race: or_na(record.race.as_deref()),
            publication_date: record
                .publication
                .as_deref()
                .and_then(format_publication_date)
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            subjects,
            hair: or_na(record.hair.as_deref()),
            eyes: or_na(record.eyes.as_deref()),
            height: record
                .height_min
                .as_deref()
                .map_or_else(|| NOT_AVAILABLE.to_string(), |h| format!("{h} inches")),
            weight: record
                .weight_min
                .as_deref()
                .map_or_else(|| NOT_AVAILABLE.to_string(), |w| format!("{w} pounds")),
            remarks: or_na(record.remarks.as_deref()),
            warning_message: or_na(record.warning_message.as_deref()),
            download_url: record.files.first().map(|f| f.url.clone()),
        }
    }
}
