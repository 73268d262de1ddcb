//! Media resolution: picking the rendition to keep and fetching its bytes.
//!
//! Both the live API and bulk exports describe attachments under
//! `extended_entities.media` with the same shape, except that exports store
//! every number as a string.

use serde::Deserialize;
use serde_json::Value;
use std::fs;
use tracing::debug;

use crate::api::TwitterApi;
use crate::archive::TwitterArchive;
use crate::error::{Result, TwarchiveError};
use crate::model::{MediaAttachment, flexible_number};

/// Where attachment bytes come from.
#[derive(Clone, Copy)]
pub enum MediaSource<'a> {
    /// Files shipped in an export's `tweet_media/` directory. Never touches
    /// the network; a missing file is an error.
    Archive(&'a TwitterArchive),
    /// Download each URL.
    Network(&'a dyn TwitterApi),
}

#[derive(Debug, Deserialize)]
struct RawMediaItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    media_url_https: String,
    #[serde(default)]
    sizes: RawSizes,
    #[serde(default)]
    media_alt_text: Option<String>,
    #[serde(default)]
    ext_alt_text: Option<String>,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    video_info: Option<RawVideoInfo>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSizes {
    #[serde(default)]
    small: RawSize,
}

#[derive(Debug, Default, Deserialize)]
struct RawSize {
    #[serde(default, deserialize_with = "flexible_number::deserialize_u32")]
    w: u32,
    #[serde(default, deserialize_with = "flexible_number::deserialize_u32")]
    h: u32,
}

#[derive(Debug, Deserialize)]
struct RawVideoInfo {
    #[serde(default)]
    variants: Vec<VideoVariant>,
}

/// One encoding of a video or GIF.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VideoVariant {
    #[serde(default, deserialize_with = "flexible_number::deserialize_opt_u64")]
    pub bitrate: Option<u64>,
    #[serde(default)]
    pub content_type: Option<String>,
    pub url: String,
}

/// The highest-bitrate variant. Variants without a bitrate (HLS playlists)
/// are never chosen.
#[must_use]
pub fn select_best_variant(variants: &[VideoVariant]) -> Option<&VideoVariant> {
    variants
        .iter()
        .filter(|v| v.bitrate.is_some())
        .max_by_key(|v| v.bitrate)
}

/// Resolve every attachment listed in an `extended_entities` object.
///
/// # Errors
///
/// Fails on an unknown media kind, a video without a usable variant, or any
/// byte retrieval failure.
pub fn resolve_media(
    extended_entities: &Value,
    tweet_id: &str,
    source: MediaSource<'_>,
) -> Result<Vec<MediaAttachment>> {
    let Some(items) = extended_entities.get("media").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };
    items
        .iter()
        .map(|item| resolve_item(item, tweet_id, source))
        .collect()
}

fn resolve_item(item: &Value, tweet_id: &str, source: MediaSource<'_>) -> Result<MediaAttachment> {
    let raw = RawMediaItem::deserialize(item)
        .map_err(|e| TwarchiveError::parse_error(format!("media of tweet {tweet_id}"), e.to_string()))?;

    let (url, content_type) = match raw.kind.as_str() {
        "photo" => (raw.media_url_https.clone(), raw.content_type.clone()),
        "video" | "animated_gif" => {
            let variants = raw.video_info.as_ref().map_or(&[][..], |v| v.variants.as_slice());
            let best = select_best_variant(variants).ok_or_else(|| {
                TwarchiveError::NoVideoVariant {
                    tweet_id: tweet_id.to_string(),
                }
            })?;
            (best.url.clone(), best.content_type.clone())
        }
        other => {
            return Err(TwarchiveError::UnknownMediaKind {
                kind: other.to_string(),
                tweet_id: tweet_id.to_string(),
            });
        }
    };

    let content_type = content_type.unwrap_or_else(|| guess_content_type(&url));
    let alt_text = raw.media_alt_text.or(raw.ext_alt_text).unwrap_or_default();
    let bytes = fetch_media_bytes(&url, tweet_id, source)?;
    debug!(tweet_id, url = %url, size = bytes.len(), "Resolved media item");

    MediaAttachment::new(
        &raw.kind,
        tweet_id,
        content_type,
        raw.sizes.small.w,
        raw.sizes.small.h,
        alt_text,
        url,
        bytes,
    )
}

fn fetch_media_bytes(url: &str, tweet_id: &str, source: MediaSource<'_>) -> Result<Vec<u8>> {
    match source {
        MediaSource::Archive(archive) => {
            let path = archive
                .tweet_media_dir()
                .join(local_media_filename(tweet_id, url));
            fs::read(&path).map_err(|e| TwarchiveError::path_error("read media", &path, e))
        }
        MediaSource::Network(api) => api.fetch_bytes(url),
    }
}

/// Filename an export uses for a tweet's media file:
/// `<tweetId>-<last URL path segment>`, query string removed.
#[must_use]
pub fn local_media_filename(owner_id: &str, url: &str) -> String {
    format!("{owner_id}-{}", last_path_segment(url))
}

/// Last `/`-separated segment of a URL, without query or fragment.
#[must_use]
pub fn last_path_segment(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().unwrap_or(path)
}

/// MIME type from a URL's file extension.
#[must_use]
pub fn guess_content_type(url: &str) -> String {
    mime_guess::from_path(last_path_segment(url))
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}
