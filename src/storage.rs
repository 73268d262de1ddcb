//! One-file-per-tweet record storage.
//!
//! Every archived tweet lives at `<dir>/<id>.json`. The file's presence is
//! the deduplication signal for the recursive walk, so writes go through a
//! temporary file and a rename: a crash mid-write never leaves a truncated
//! record that would be mistaken for a finished one.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Result, TwarchiveError};
use crate::model::{ArchivedTweet, decode_tweet, encode_tweet};

const RECORD_EXTENSION: &str = "json";

/// Directory of persisted [`ArchivedTweet`] records.
#[derive(Debug, Clone)]
pub struct TweetStore {
    dir: PathBuf,
}

impl TweetStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `id`, whether or not it exists.
    #[must_use]
    pub fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.{RECORD_EXTENSION}"))
    }

    #[must_use]
    pub fn exists(&self, id: &str) -> bool {
        self.record_path(id).is_file()
    }

    /// Persist a tweet, replacing any existing record with the same ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file
    /// cannot be written.
    pub fn save(&self, tweet: &ArchivedTweet) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| TwarchiveError::path_error("create directory", &self.dir, e))?;
        let path = self.record_path(&tweet.id);
        write_record(&path, tweet)?;
        debug!(tweet_id = %tweet.id, path = %path.display(), "Saved tweet record");
        Ok(path)
    }

    /// Load the record for `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or does not decode.
    pub fn load(&self, id: &str) -> Result<ArchivedTweet> {
        read_record(&self.record_path(id))
    }

    /// IDs of every record currently in the store.
    ///
    /// A missing directory is an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be listed.
    pub fn downloaded_ids(&self) -> Result<HashSet<String>> {
        Ok(self
            .record_paths()?
            .iter()
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect())
    }

    /// Paths of every `*.json` record, in directory order.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be listed.
    pub fn record_paths(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| TwarchiveError::path_error("list", &self.dir, e))?;

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == RECORD_EXTENSION) {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    /// Load every record in the store.
    ///
    /// # Errors
    ///
    /// Returns an error on the first record that cannot be read or decoded.
    pub fn load_all(&self) -> Result<Vec<ArchivedTweet>> {
        self.record_paths()?.iter().map(|p| read_record(p)).collect()
    }

    /// Decode and rewrite every record with the current encoding.
    ///
    /// Legacy (untagged, older field convention) records come out in the
    /// current form; current records come out byte-identical.
    ///
    /// # Errors
    ///
    /// Returns an error on the first record that cannot be read, decoded or
    /// written back.
    pub fn reencode_all(&self) -> Result<usize> {
        let paths = self.record_paths()?;
        for path in &paths {
            let tweet = read_record(path)?;
            write_record(path, &tweet)?;
        }
        info!(count = paths.len(), dir = %self.dir.display(), "Re-encoded tweet records");
        Ok(paths.len())
    }
}

/// Read and decode one record file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a tweet record.
pub fn read_record(path: &Path) -> Result<ArchivedTweet> {
    let text =
        fs::read_to_string(path).map_err(|e| TwarchiveError::path_error("read", path, e))?;
    decode_tweet(&text).map_err(|reason| TwarchiveError::invalid_record(path, reason))
}

/// Encode and write one record file through a temporary sibling.
///
/// # Errors
///
/// Returns an error if encoding or any filesystem step fails.
pub fn write_record(path: &Path, tweet: &ArchivedTweet) -> Result<()> {
    let mut text = encode_tweet(tweet)?;
    text.push('\n');

    let temp_path = path.with_extension(format!("{RECORD_EXTENSION}.tmp"));
    fs::write(&temp_path, text).map_err(|e| TwarchiveError::path_error("write", &temp_path, e))?;
    fs::rename(&temp_path, path).map_err(|e| TwarchiveError::path_error("rename", path, e))?;
    Ok(())
}
