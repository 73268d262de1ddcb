//! Hugo site layout, inline tweet references and generated pages.

use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{Result, ResultExt, TwarchiveError};
use crate::model::ArchivedTweet;
use crate::sort_by_tweet_id;
use crate::storage::{TweetStore, read_record};

/// Shortcodes embedding a tweet or a thread, e.g.
/// `{{< twarchiveTweet "1050118621198921728" >}}`.
static INLINE_SHORTCODE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\{\{. (?:twarchiveTweet|twarchiveThread) .(?P<tweetid>[0-9]+(?:-intentionallyinvalid)?)",
    )
    .expect("inline shortcode regex")
});

/// Paths inside a Hugo site root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HugoSite {
    base: PathBuf,
}

impl HugoSite {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    #[must_use]
    pub fn base(&self) -> &Path {
        &self.base
    }

    #[must_use]
    pub fn content(&self) -> PathBuf {
        self.base.join("content")
    }

    /// Generated tweet pages.
    #[must_use]
    pub fn content_twarchive(&self) -> PathBuf {
        self.content().join("twarchive")
    }

    #[must_use]
    pub fn data(&self) -> PathBuf {
        self.base.join("data")
    }

    /// Tweet records.
    #[must_use]
    pub fn data_twarchive(&self) -> PathBuf {
        self.data().join("twarchive")
    }

    /// Extracted bulk exports, one directory each.
    #[must_use]
    pub fn twitter_archives(&self) -> PathBuf {
        self.base.join("twitter-archives")
    }

    #[must_use]
    pub fn store(&self) -> TweetStore {
        TweetStore::new(self.data_twarchive())
    }

    /// IDs referenced by inline shortcodes anywhere under `content/`.
    ///
    /// IDs carrying the intentionally-invalid suffix are returned with the
    /// suffix so callers can filter them.
    ///
    /// # Errors
    ///
    /// Returns an error if the content tree cannot be walked.
    pub fn find_inline_tweets(&self) -> Result<BTreeSet<String>> {
        let content = self.content();
        let mut found = BTreeSet::new();
        if !content.is_dir() {
            return Ok(found);
        }

        for entry in WalkDir::new(&content).follow_links(true) {
            let entry = entry.context("walking site content")?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(text) = fs::read_to_string(entry.path()) else {
                debug!(path = %entry.path().display(), "Skipping non-text file");
                continue;
            };
            found.extend(find_inline_ids(&text));
        }
        Ok(found)
    }

    /// Write one page per stored record under `content/twarchive/`.
    ///
    /// Returns the number of pages written.
    ///
    /// # Errors
    ///
    /// Fails if any record cannot be loaded or any page cannot be written.
    pub fn data_to_md(&self, show_progress: bool) -> Result<usize> {
        let paths = self.store().record_paths()?;

        let pb = if show_progress {
            ProgressBar::new(paths.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                .context("progress bar template")?
                .progress_chars("##-"),
        );
        pb.set_message("Loading tweets...");

        let mut tweets = Vec::with_capacity(paths.len());
        for path in &paths {
            tweets.push(read_record(path)?);
            pb.inc(1);
        }
        pb.finish_and_clear();

        let finals = thread_finals(&tweets);
        let out_dir = self.content_twarchive();
        fs::create_dir_all(&out_dir)
            .map_err(|e| TwarchiveError::path_error("create directory", &out_dir, e))?;

        for tweet in &tweets {
            let path = out_dir.join(format!("{}.md", tweet.id));
            let page = page_contents(&tweet.id, tweet.created_at, finals.contains(&tweet.id));
            fs::write(&path, page).map_err(|e| TwarchiveError::path_error("write", &path, e))?;
        }

        info!(
            pages = tweets.len(),
            thread_finals = finals.len(),
            dir = %out_dir.display(),
            "Generated tweet pages"
        );
        Ok(tweets.len())
    }
}

/// Inline tweet IDs in one piece of text.
pub fn find_inline_ids(text: &str) -> impl Iterator<Item = String> + '_ {
    INLINE_SHORTCODE_RE
        .captures_iter(text)
        .map(|caps| caps["tweetid"].to_string())
}

/// Tweets that reply to something but that no stored tweet replies to:
/// the last tweet of each reply chain.
#[must_use]
pub fn thread_finals(tweets: &[ArchivedTweet]) -> HashSet<String> {
    let parents: HashSet<&str> = tweets
        .iter()
        .filter_map(|t| t.reply_parent_id.as_deref())
        .collect();
    tweets
        .iter()
        .filter(|t| t.reply_parent_id.is_some() && !parents.contains(t.id.as_str()))
        .map(|t| t.id.clone())
        .collect()
}

/// Markdown stub for one tweet's page.
#[must_use]
pub fn page_contents(tweet_id: &str, date: DateTime<Utc>, thread_final: bool) -> String {
    let mut page = format!(
        "---\ntweetid: \"{tweet_id}\"\ndate: {}\n---\n",
        date.format("%Y-%m-%d %H:%M:%S%:z")
    );
    if thread_final {
        page.push_str(&format!(
            "\n\n\nThis tweet is part of a thread:\n\n{{{{% twarchiveThread \"{tweet_id}\" %}}}}\n\n"
        ));
    }
    page
}

/// Files in `dir` named after tweet IDs, sorted numerically.
///
/// # Errors
///
/// Returns an error if `dir` cannot be listed.
pub fn list_tweet_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| TwarchiveError::path_error("list", dir, e))?;
    let mut names = Vec::new();
    for entry in entries {
        names.push(entry?.file_name().to_string_lossy().into_owned());
    }
    Ok(sort_by_tweet_id(names)
        .into_iter()
        .map(|name| dir.join(name))
        .collect())
}
