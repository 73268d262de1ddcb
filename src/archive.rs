//! Bulk "Download your data" exports.
//!
//! An extracted export is a directory whose `data/*.js` files each hold a
//! JavaScript assignment (`window.YTD.tweets.part0 = [...]`). Stripping the
//! assignment leaves JSON. Tweets found in an export are definitive and are
//! never downloaded again, with one exception: retweets, which the export
//! records only as "RT @user ..." text.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use once_cell::unsync::OnceCell;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::api::quote_tweet_ids;
use crate::error::{Result, TwarchiveError};
use crate::media::{MediaSource, last_path_segment, local_media_filename, resolve_media};
use crate::model::{ArchivedTweet, parse_iso8601};
use crate::parse_twitter_date;
use crate::render::render_html;
use crate::storage::TweetStore;
use crate::walk::{Archiver, WalkTarget};

static MANIFEST_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^window\.__THAR_CONFIG = ").expect("manifest prefix regex"));

static YTD_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^window\.YTD\.[A-Za-z0-9_]+\.part[A-Za-z0-9_]+ = ").expect("YTD prefix regex")
});

/// Text prefix the export gives retweets in place of the original tweet.
const LOW_FIDELITY_RETWEET_PREFIX: &str = "RT @";

/// One extracted export bundle.
///
/// Paths are fixed at construction; the manifest and generation date are
/// parsed on first use and cached.
#[derive(Debug)]
pub struct TwitterArchive {
    root: PathBuf,
    manifest: OnceCell<Value>,
    generation_date: OnceCell<DateTime<Utc>>,
}

/// Account owning an export, with its avatar bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveAuthor {
    pub account_id: String,
    pub username: String,
    pub display_name: String,
    pub avatar: Vec<u8>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountJs {
    account_id: String,
    username: String,
    account_display_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileJs {
    avatar_media_url: String,
}

/// A tweet as recorded in `tweet.js`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExportTweet {
    pub id_str: String,
    pub created_at: String,
    pub full_text: String,
    #[serde(default)]
    pub entities: Value,
    #[serde(default)]
    pub extended_entities: Value,
    #[serde(default)]
    pub in_reply_to_status_id_str: Option<String>,
    #[serde(default)]
    pub in_reply_to_screen_name: Option<String>,
}

impl ExportTweet {
    /// Whether this is a retweet stripped of its original by the export.
    #[must_use]
    pub fn is_low_fidelity_retweet(&self) -> bool {
        is_low_fidelity_retweet(&self.full_text)
    }
}

#[must_use]
pub fn is_low_fidelity_retweet(text: &str) -> bool {
    text.starts_with(LOW_FIDELITY_RETWEET_PREFIX)
}

impl TwitterArchive {
    pub fn from_path(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            manifest: OnceCell::new(),
            generation_date: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    #[must_use]
    pub fn manifest_js(&self) -> PathBuf {
        self.data_dir().join("manifest.js")
    }

    #[must_use]
    pub fn profile_js(&self) -> PathBuf {
        self.data_dir().join("profile.js")
    }

    #[must_use]
    pub fn tweet_js(&self) -> PathBuf {
        self.data_dir().join("tweet.js")
    }

    #[must_use]
    pub fn account_js(&self) -> PathBuf {
        self.data_dir().join("account.js")
    }

    #[must_use]
    pub fn profile_media_dir(&self) -> PathBuf {
        self.data_dir().join("profile_media")
    }

    #[must_use]
    pub fn tweet_media_dir(&self) -> PathBuf {
        self.data_dir().join("tweet_media")
    }

    /// Required files and directories that do not exist.
    #[must_use]
    pub fn missing(&self) -> Vec<PathBuf> {
        [
            self.manifest_js(),
            self.profile_js(),
            self.tweet_js(),
            self.account_js(),
            self.profile_media_dir(),
            self.tweet_media_dir(),
        ]
        .into_iter()
        .filter(|p| !p.exists())
        .collect()
    }

    /// Fail unless every required file is present.
    ///
    /// # Errors
    ///
    /// [`TwarchiveError::ArchiveNotFound`] if the root does not exist,
    /// [`TwarchiveError::IncompleteArchive`] if anything inside is missing.
    pub fn validate(&self) -> Result<()> {
        if !self.root.is_dir() {
            return Err(TwarchiveError::archive_not_found(&self.root));
        }
        let missing = self.missing();
        if missing.is_empty() {
            return Ok(());
        }
        Err(TwarchiveError::IncompleteArchive {
            path: self.root.clone(),
            missing: missing
                .iter()
                .map(|p| p.strip_prefix(&self.root).unwrap_or(p).display().to_string())
                .collect(),
        })
    }

    /// Parsed `manifest.js`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn manifest(&self) -> Result<&Value> {
        self.manifest
            .get_or_try_init(|| parse_js_file(&self.manifest_js(), &MANIFEST_PREFIX))
    }

    /// When the export was generated, from the manifest.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest lacks a parseable generation date.
    pub fn generation_date(&self) -> Result<DateTime<Utc>> {
        self.generation_date
            .get_or_try_init(|| {
                let raw = self.manifest()?["archiveInfo"]["generationDate"]
                    .as_str()
                    .ok_or_else(|| TwarchiveError::InvalidManifest {
                        reason: "archiveInfo.generationDate is missing".into(),
                    })?;
                parse_iso8601(raw).ok_or_else(|| TwarchiveError::InvalidDate {
                    value: raw.to_string(),
                    context: "manifest generationDate".into(),
                })
            })
            .copied()
    }

    /// Account name, display name and avatar bytes of the export's owner.
    ///
    /// # Errors
    ///
    /// Returns an error if `account.js` or `profile.js` cannot be parsed or
    /// the avatar file is missing.
    pub fn author(&self) -> Result<ArchiveAuthor> {
        let account: AccountJs = first_wrapped(&self.account_js(), "account")?;
        let profile: ProfileJs = first_wrapped(&self.profile_js(), "profile")?;

        let avatar_path = self
            .profile_media_dir()
            .join(local_media_filename(&account.account_id, &profile.avatar_media_url));
        let avatar = fs::read(&avatar_path)
            .map_err(|e| TwarchiveError::path_error("read avatar", &avatar_path, e))?;
        debug!(
            avatar = last_path_segment(&profile.avatar_media_url),
            "Loaded export owner's avatar"
        );

        Ok(ArchiveAuthor {
            account_id: account.account_id,
            username: account.username,
            display_name: account.account_display_name,
            avatar,
        })
    }

    /// Every tweet in `tweet.js`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn tweets(&self) -> Result<Vec<ExportTweet>> {
        let path = self.tweet_js();
        let parsed = parse_js_file(&path, &YTD_PREFIX)?;
        let Value::Array(entries) = parsed else {
            return Err(parse_failure(&path, "expected a top-level array"));
        };
        entries
            .into_iter()
            .map(|mut entry| {
                let tweet = entry.get_mut("tweet").map(Value::take).unwrap_or_default();
                serde_json::from_value(tweet).map_err(|e| parse_failure(&path, e))
            })
            .collect()
    }
}

fn parse_failure(path: &Path, reason: impl ToString) -> TwarchiveError {
    TwarchiveError::parse_error(path.display().to_string(), reason.to_string())
}

/// Remove the assignment in front of an export file's JSON payload.
#[must_use]
pub fn strip_js_prefix<'a>(contents: &'a str, prefix: &Regex) -> &'a str {
    prefix
        .find(contents)
        .map_or(contents, |m| &contents[m.end()..])
}

fn parse_js_file(path: &Path, prefix: &Regex) -> Result<Value> {
    let contents =
        fs::read_to_string(path).map_err(|e| TwarchiveError::path_error("read", path, e))?;
    serde_json::from_str(strip_js_prefix(&contents, prefix)).map_err(|e| parse_failure(path, e))
}

/// `[{"<key>": {...}}, ...]` files: deserialize the first entry's inner object.
fn first_wrapped<T: for<'de> Deserialize<'de>>(path: &Path, key: &str) -> Result<T> {
    let mut parsed = parse_js_file(path, &YTD_PREFIX)?;
    let inner = parsed
        .get_mut(0)
        .and_then(|first| first.get_mut(key))
        .map(Value::take)
        .unwrap_or_default();
    if inner.is_null() {
        return Err(parse_failure(path, format!("no '{key}' entry")));
    }
    serde_json::from_value(inner).map_err(|e| parse_failure(path, e))
}

/// How a reply-parent username was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsernameSource {
    /// The record's own `in_reply_to_screen_name`.
    Explicit,
    /// Guessed from a leading `@mention` in the text.
    Heuristic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyUsername {
    pub username: String,
    pub source: UsernameSource,
}

/// Best-effort username from text starting with `@`: everything up to the
/// first space or colon.
#[must_use]
pub fn first_mention(text: &str) -> Option<String> {
    let rest = text.strip_prefix('@')?;
    let end = rest.find([' ', ':']).unwrap_or(rest.len());
    let username = &rest[..end];
    (!username.is_empty()).then(|| username.to_string())
}

/// Username of the account `tweet` replies to.
#[must_use]
pub fn reply_username(tweet: &ExportTweet) -> Option<ReplyUsername> {
    if let Some(name) = tweet.in_reply_to_screen_name.as_ref().filter(|n| !n.is_empty()) {
        return Some(ReplyUsername {
            username: name.clone(),
            source: UsernameSource::Explicit,
        });
    }
    first_mention(&tweet.full_text).map(|username| ReplyUsername {
        username,
        source: UsernameSource::Heuristic,
    })
}

/// Convert one export record into an [`ArchivedTweet`].
///
/// Media bytes come from the export's `tweet_media/`; the retrieval time is
/// the export's generation date.
///
/// # Errors
///
/// Fails for low-fidelity retweets, replies whose parent username cannot be
/// determined, unparseable dates, and missing media files.
pub fn tweet_from_archive(
    tweet: &ExportTweet,
    author: &ArchiveAuthor,
    archive: &TwitterArchive,
) -> Result<ArchivedTweet> {
    let id = &tweet.id_str;
    if tweet.is_low_fidelity_retweet() {
        return Err(TwarchiveError::LowFidelityRetweet {
            tweet_id: id.clone(),
        });
    }

    let created_at =
        parse_twitter_date(&tweet.created_at).ok_or_else(|| TwarchiveError::InvalidDate {
            value: tweet.created_at.clone(),
            context: format!("tweet {id} in {}", archive.root.display()),
        })?;

    let reply_parent_id = tweet.in_reply_to_status_id_str.clone().filter(|p| !p.is_empty());
    let reply_parent_username = match &reply_parent_id {
        None => None,
        Some(_) => {
            let reply = reply_username(tweet).ok_or_else(|| TwarchiveError::UnknownReplyUsername {
                tweet_id: id.clone(),
            })?;
            if reply.source == UsernameSource::Heuristic {
                debug!(tweet_id = %id, username = %reply.username, "Guessed reply username from text");
            }
            Some(reply.username)
        }
    };

    let media = resolve_media(&tweet.extended_entities, id, MediaSource::Archive(archive))?;

    Ok(ArchivedTweet {
        id: id.clone(),
        created_at,
        original_date_text: tweet.created_at.clone(),
        full_text: tweet.full_text.clone(),
        html_strip_quotes: render_html(&tweet.full_text, &tweet.entities, false),
        html_link_quotes: render_html(&tweet.full_text, &tweet.entities, true),
        media,
        entities: tweet.entities.clone(),
        quote_tweet_ids: quote_tweet_ids(&tweet.entities),
        retweet_of_id: None,
        reply_parent_id,
        reply_parent_username,
        author_username: author.username.clone(),
        author_display_name: author.display_name.clone(),
        author_avatar: author.avatar.clone(),
        retrieved_at: archive.generation_date()?,
    })
}

/// Complete exports under `dir`, sorted by directory name.
///
/// Incomplete ones are logged and left out.
///
/// # Errors
///
/// Returns an error if `dir` cannot be listed.
pub fn find_archives(dir: &Path) -> Result<Vec<TwitterArchive>> {
    let entries = fs::read_dir(dir).map_err(|e| TwarchiveError::path_error("list", dir, e))?;
    let mut roots = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            roots.push(path);
        }
    }
    roots.sort();

    Ok(roots
        .into_iter()
        .map(TwitterArchive::from_path)
        .filter(|archive| match archive.validate() {
            Ok(()) => true,
            Err(e) => {
                debug!(archive = %archive.root.display(), "Skipping archive: {e}");
                false
            }
        })
        .collect())
}

/// Outcome of importing one export.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveImport {
    /// Regular tweets written from export data.
    pub saved: Vec<String>,
    /// Low-fidelity retweets archived through the live walk.
    pub fetched_live: Vec<String>,
    /// Low-fidelity retweets the live API reported deleted or forbidden.
    pub unavailable: Vec<String>,
    /// Low-fidelity retweets skipped because no live API was available.
    pub skipped: Vec<String>,
}

/// Save every tweet of an export to `store`.
///
/// Regular tweets come from export data alone. Low-fidelity retweets go to
/// `archiver` when one is supplied (not-found and forbidden only skip that
/// retweet) and are skipped otherwise.
///
/// # Errors
///
/// Fails if the export is incomplete or any regular tweet cannot be
/// converted or saved.
pub fn archive_to_data(
    store: &TweetStore,
    archive: &TwitterArchive,
    mut archiver: Option<&mut Archiver<'_>>,
) -> Result<ArchiveImport> {
    archive.validate()?;
    let author = archive.author()?;
    let tweets = archive.tweets()?;
    info!(
        archive = %archive.root.display(),
        tweets = tweets.len(),
        username = %author.username,
        "Importing archive"
    );

    let mut import = ArchiveImport::default();
    for tweet in &tweets {
        let id = &tweet.id_str;
        if tweet.is_low_fidelity_retweet() {
            if let Some(archiver) = archiver.as_deref_mut() {
                info!(tweet_id = %id, "Low-fidelity retweet, fetching from the live API");
                let abandoned_before = archiver.report().abandoned.len();
                archiver.continue_on_error(WalkTarget::Id(id.clone()), 0)?;
                if archiver.report().abandoned[abandoned_before..].contains(id) {
                    import.unavailable.push(id.clone());
                } else {
                    import.fetched_live.push(id.clone());
                }
            } else {
                info!(tweet_id = %id, "Low-fidelity retweet and no live API, skipping");
                import.skipped.push(id.clone());
            }
            continue;
        }

        let archived = tweet_from_archive(tweet, &author, archive)?;
        store.save(&archived)?;
        debug!(tweet_id = %id, "Saved tweet from archive");
        import.saved.push(id.clone());
    }

    if !import.skipped.is_empty() {
        warn!(
            count = import.skipped.len(),
            "Retweets skipped; rerun with API access to fetch them"
        );
    }
    Ok(import)
}
