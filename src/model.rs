//! Data models for archived tweets.
//!
//! An [`ArchivedTweet`] is the unit of persistence: one record per tweet,
//! stored as `<id>.json` with every supplemental byte (avatar, media) inlined
//! as base64. Field names on disk are kept stable so existing site templates
//! can read both new and legacy records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, TwarchiveError};

/// Discriminant key written into every encoded object.
pub const RECORD_TYPE_KEY: &str = "record_type";

/// Keys whose joint presence marks an untagged legacy tweet record.
const TWEET_REQUIRED_KEYS: &[&str] = &[
    "id",
    "date",
    "date_original_format",
    "full_text",
    "media",
    "entities",
    "username",
    "user_displayname",
    "user_pfp",
];

/// Keys whose joint presence marks an untagged legacy media attachment.
const MEDIA_REQUIRED_KEYS: &[&str] = &["width", "height", "alttext", "url", "data"];

/// Kind of an attached media item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Video,
    AnimatedGif,
}

impl MediaKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Video => "video",
            Self::AnimatedGif => "animated_gif",
        }
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "photo" => Ok(Self::Photo),
            "video" => Ok(Self::Video),
            "animated_gif" => Ok(Self::AnimatedGif),
            other => Err(format!("Unknown media kind: {other}")),
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single media item (photo, video, GIF) with its bytes inlined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAttachment {
    #[serde(rename = "media_type")]
    pub kind: MediaKind,
    pub content_type: String,
    #[serde(deserialize_with = "flexible_number::deserialize_u32")]
    pub width: u32,
    #[serde(deserialize_with = "flexible_number::deserialize_u32")]
    pub height: u32,
    #[serde(rename = "alttext", default)]
    pub alt_text: String,
    #[serde(rename = "url")]
    pub source_url: String,
    #[serde(rename = "data", with = "base64_bytes")]
    pub bytes: Vec<u8>,
}

impl MediaAttachment {
    /// Build an attachment from a source-provided kind string.
    ///
    /// # Errors
    /// Returns [`TwarchiveError::UnknownMediaKind`] for anything other than
    /// `photo`, `video` or `animated_gif`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kind: &str,
        tweet_id: &str,
        content_type: impl Into<String>,
        width: u32,
        height: u32,
        alt_text: impl Into<String>,
        source_url: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Result<Self> {
        let kind = kind
            .parse::<MediaKind>()
            .map_err(|_| TwarchiveError::UnknownMediaKind {
                kind: kind.to_string(),
                tweet_id: tweet_id.to_string(),
            })?;
        Ok(Self {
            kind,
            content_type: content_type.into(),
            width,
            height,
            alt_text: alt_text.into(),
            source_url: source_url.into(),
            bytes,
        })
    }
}

/// A tweet with all of its supplemental data downloaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedTweet {
    pub id: String,
    #[serde(rename = "date", with = "iso8601")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "date_original_format")]
    pub original_date_text: String,
    pub full_text: String,
    #[serde(rename = "full_html_strip_qts", default)]
    pub html_strip_quotes: String,
    #[serde(rename = "full_html_link_qts", default)]
    pub html_link_quotes: String,
    pub media: Vec<MediaAttachment>,
    /// Source entity annotations, kept verbatim for later reprocessing.
    pub entities: Value,
    #[serde(rename = "qts", default)]
    pub quote_tweet_ids: Vec<String>,
    #[serde(rename = "rt_of")]
    pub retweet_of_id: Option<String>,
    #[serde(rename = "replyto_tweetid")]
    pub reply_parent_id: Option<String>,
    #[serde(rename = "replyto_username")]
    pub reply_parent_username: Option<String>,
    #[serde(rename = "username")]
    pub author_username: String,
    #[serde(rename = "user_displayname")]
    pub author_display_name: String,
    #[serde(rename = "user_pfp", with = "base64_bytes")]
    pub author_avatar: Vec<u8>,
    #[serde(rename = "retrieved_date", with = "iso8601")]
    pub retrieved_at: DateTime<Utc>,
}

impl ArchivedTweet {
    /// Every tweet this one points at: quotes, reply parent, retweet original.
    ///
    /// Deduplicated, first occurrence wins, so the walk order is stable.
    #[must_use]
    pub fn referenced_ids(&self) -> Vec<String> {
        use itertools::Itertools;

        self.quote_tweet_ids
            .iter()
            .chain(self.reply_parent_id.iter())
            .chain(self.retweet_of_id.iter())
            .filter(|id| id.as_str() != self.id)
            .unique()
            .cloned()
            .collect()
    }
}

/// A text splice applied while rendering a tweet body.
///
/// `start..end` is a half-open range of character offsets into the raw text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextReplacement {
    pub start: usize,
    pub end: usize,
    pub replacement: String,
}

impl TextReplacement {
    pub fn new(start: usize, end: usize, replacement: impl Into<String>) -> Self {
        Self {
            start,
            end,
            replacement: replacement.into(),
        }
    }
}

/// A decoded record of either shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Tweet(Box<ArchivedTweet>),
    Media(MediaAttachment),
}

// =============================================================================
// Encoding
// =============================================================================

/// Encode a tweet into its persisted text form.
///
/// Keys are sorted and indented by two spaces so that committed records
/// produce small diffs.
///
/// # Errors
/// Returns an error if serialization fails.
pub fn encode_tweet(tweet: &ArchivedTweet) -> Result<String> {
    let mut value = serde_json::to_value(tweet)?;
    if let Value::Object(map) = &mut value {
        map.insert(RECORD_TYPE_KEY.into(), Value::from("tweet"));
        if let Some(Value::Array(media)) = map.get_mut("media") {
            for item in media {
                if let Value::Object(m) = item {
                    m.insert(RECORD_TYPE_KEY.into(), Value::from("media"));
                }
            }
        }
    }
    Ok(serde_json::to_string_pretty(&sort_keys(value))?)
}

/// Rebuild every object with its keys inserted in sorted order.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, sort_keys(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode a persisted tweet.
///
/// # Errors
/// Returns an error if the text is not JSON or is not a tweet record.
pub fn decode_tweet(text: &str) -> std::result::Result<ArchivedTweet, String> {
    let value: Value = serde_json::from_str(text).map_err(|e| e.to_string())?;
    match decode_record(value)? {
        Record::Tweet(tweet) => Ok(*tweet),
        Record::Media(_) => Err("expected a tweet record, found a media attachment".into()),
    }
}

/// Decode a JSON object into a [`Record`].
///
/// Tagged objects dispatch on `record_type`. Untagged (legacy) objects are
/// classified by which required key set they carry.
///
/// # Errors
/// Returns an error if the object matches neither shape or fails to decode.
pub fn decode_record(value: Value) -> std::result::Result<Record, String> {
    let Value::Object(mut map) = value else {
        return Err("record is not a JSON object".into());
    };

    let kind = match map.remove(RECORD_TYPE_KEY) {
        Some(Value::String(tag)) => tag,
        Some(other) => return Err(format!("invalid {RECORD_TYPE_KEY}: {other}")),
        None if has_keys(&map, TWEET_REQUIRED_KEYS) => "tweet".to_string(),
        None if has_keys(&map, MEDIA_REQUIRED_KEYS) => "media".to_string(),
        None => return Err("object matches neither tweet nor media record shape".into()),
    };

    match kind.as_str() {
        "tweet" => {
            normalize_legacy_tweet(&mut map);
            serde_json::from_value::<ArchivedTweet>(Value::Object(map))
                .map(|t| Record::Tweet(Box::new(t)))
                .map_err(|e| e.to_string())
        }
        "media" => serde_json::from_value::<MediaAttachment>(Value::Object(map))
            .map(Record::Media)
            .map_err(|e| e.to_string()),
        other => Err(format!("unknown {RECORD_TYPE_KEY} '{other}'")),
    }
}

fn has_keys(map: &Map<String, Value>, keys: &[&str]) -> bool {
    keys.iter().all(|k| map.contains_key(*k))
}

/// Fold older field conventions into the current ones.
fn normalize_legacy_tweet(map: &mut Map<String, Value>) {
    // Older records carried the reply parent twice; only one survives.
    let legacy_parent = map.remove("thread_parent_id");
    if is_blank(map.get("replyto_tweetid")) {
        if let Some(parent) = legacy_parent {
            map.insert("replyto_tweetid".into(), parent);
        }
    }

    for key in ["rt_of", "replyto_tweetid", "replyto_username"] {
        if is_blank(map.get(key)) {
            map.insert(key.into(), Value::Null);
        }
    }
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

/// Base64 text for binary payloads.
mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text.as_bytes()).map_err(serde::de::Error::custom)
    }
}

/// ISO-8601 timestamps.
///
/// Written as RFC 3339 with a numeric offset. Reads RFC 3339, and naive
/// timestamps (which older records contain) as UTC.
mod iso8601 {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::AutoSi, false))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse_iso8601(&text)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{text}'")))
    }
}

/// Counts that exports (and records copied from them) store as strings.
pub(crate) mod flexible_number {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(u64),
        Text(String),
    }

    impl NumberOrString {
        fn into_u64<E: serde::de::Error>(self) -> Result<u64, E> {
            match self {
                Self::Number(n) => Ok(n),
                Self::Text(s) => s.trim().parse().map_err(E::custom),
            }
        }
    }

    pub fn deserialize_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
        let n = NumberOrString::deserialize(deserializer)?.into_u64::<D::Error>()?;
        u32::try_from(n).map_err(serde::de::Error::custom)
    }

    pub fn deserialize_opt_u64<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<u64>, D::Error> {
        Option::<NumberOrString>::deserialize(deserializer)?
            .map(NumberOrString::into_u64::<D::Error>)
            .transpose()
    }
}

/// Parse an ISO-8601 timestamp, with or without an offset.
#[must_use]
pub fn parse_iso8601(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|n| n.and_utc())
        })
}
