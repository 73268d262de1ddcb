//! twarchive - Archive tweets for a static site
//!
//! This library saves tweets, together with every tweet they quote, reply
//! to or retweet, as self-contained JSON records (media and avatars
//! included), and generates Hugo content pages for them.
//!
//! # Modules
//!
//! - [`api`] - Live Twitter API capability and conversion of its tweets
//! - [`archive`] - Reading bulk "Download your data" exports
//! - [`cli`] - Command-line interface definitions
//! - [`config`] - Layered configuration (file, environment, flags)
//! - [`error`] - Custom error types with rich context
//! - [`logging`] - Tracing subscriber setup
//! - [`media`] - Media variant selection and byte retrieval
//! - [`model`] - Archived tweet records and their JSON encoding
//! - [`render`] - Tweet body HTML rendering
//! - [`site`] - Hugo site layout, inline shortcode scanning, page generation
//! - [`storage`] - One-file-per-tweet record store
//! - [`walk`] - Recursive fetch-and-save of a tweet and its references

pub mod api;
pub mod archive;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod media;
pub mod model;
pub mod render;
pub mod site;
pub mod storage;
pub mod walk;

pub use api::{ApiTweet, HttpTwitterApi, TwitterApi};
pub use archive::TwitterArchive;
pub use cli::*;
pub use error::{Result, ResultExt, TwarchiveError, format_error};
pub use model::*;
pub use site::HugoSite;
pub use storage::TweetStore;
pub use walk::{Archiver, WalkOptions, WalkReport, WalkTarget};

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

/// Default ceiling on how many quote/reply/retweet hops the walk follows.
pub const DEFAULT_MAX_RECURSE: usize = 20;

/// Date format used by both the live API and bulk exports,
/// e.g. `Wed Oct 10 20:19:24 +0000 2018`.
pub const TWITTER_DATE_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// Suffix marking an inline tweet reference as deliberately broken.
pub const INTENTIONALLY_INVALID_SUFFIX: &str = "-intentionallyinvalid";

static TWEET_URI_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://(?:(?:www|mobile)\.)?(?:twitter|x)\.com/.*/status/(?P<tweetid>[0-9]+)")
        .expect("tweet URI regex is valid")
});

/// Whether a URI points to a single tweet.
#[must_use]
pub fn uri_is_tweet(uri: &str) -> bool {
    TWEET_URI_RE.is_match(uri)
}

/// Extract the tweet ID from a single-tweet URI.
#[must_use]
pub fn tweet_id_from_uri(uri: &str) -> Option<String> {
    TWEET_URI_RE
        .captures(uri)
        .map(|caps| caps["tweetid"].to_string())
}

/// Parse Twitter's date format: "Wed Oct 10 20:19:24 +0000 2018"
#[must_use]
pub fn parse_twitter_date(date_str: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(date_str, TWITTER_DATE_FORMAT)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Sort file names or IDs that start with a tweet ID numerically.
///
/// Tweet IDs vary in digit length, so a plain string sort puts `999` after
/// `1000`. Names that do not start with a digit are dropped.
#[must_use]
pub fn sort_by_tweet_id(names: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut numbered: Vec<(u128, String)> = names
        .into_iter()
        .filter_map(|name| {
            let digits: String = name.chars().take_while(char::is_ascii_digit).collect();
            digits.parse::<u128>().ok().map(|n| (n, name))
        })
        .collect();
    numbered.sort();
    numbered.into_iter().map(|(_, name)| name).collect()
}

/// Format an unsigned integer with thousands separators.
#[must_use]
pub fn format_number_u64(value: u64) -> String {
    let mut out = String::with_capacity(24);

    for (idx, ch) in value.to_string().chars().rev().enumerate() {
        if idx > 0 && idx % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }

    out.chars().rev().collect()
}

/// Format a usize with thousands separators.
#[must_use]
pub fn format_number_usize(value: usize) -> String {
    format_number_u64(u64::try_from(value).unwrap_or(u64::MAX))
}
