//! Custom error types for twarchive.
//!
//! Provides structured error handling with detailed context for better
//! diagnostics and user experience. The recursive walk relies on
//! [`TwarchiveError::is_branch_recoverable`] to decide which failures stay
//! local to one branch of the reference graph.

use std::path::PathBuf;
use thiserror::Error;

/// Primary error type for twarchive operations.
///
/// Each variant provides specific context about what went wrong,
/// enabling better error messages and programmatic error handling.
#[derive(Error, Debug)]
pub enum TwarchiveError {
    // =========================================================================
    // Archive Errors
    // =========================================================================
    /// Archive directory not found at the specified path.
    #[error("Archive not found at '{path}'")]
    ArchiveNotFound { path: PathBuf },

    /// Archive exists but is missing required files or directories.
    #[error("Incomplete archive at '{path}', missing: {}", .missing.join(", "))]
    IncompleteArchive { path: PathBuf, missing: Vec<String> },

    /// Failed to parse an archive data file.
    #[error("Failed to parse '{file}': {reason}")]
    ParseError { file: String, reason: String },

    /// Archive manifest is invalid or corrupt.
    #[error("Invalid manifest: {reason}")]
    InvalidManifest { reason: String },

    /// Export record is a retweet without the original's identity or content.
    #[error("Tweet {tweet_id} is a low-fidelity retweet")]
    LowFidelityRetweet { tweet_id: String },

    /// No reply-parent username could be determined for a reply.
    #[error("Cannot determine the username tweet {tweet_id} is replying to")]
    UnknownReplyUsername { tweet_id: String },

    // =========================================================================
    // Record Errors
    // =========================================================================
    /// Media item kind outside photo/video/animated_gif.
    #[error("Unknown media kind '{kind}' for tweet {tweet_id}")]
    UnknownMediaKind { kind: String, tweet_id: String },

    /// A video or GIF offered no variant with a bitrate.
    #[error("No video variant with a bitrate for tweet {tweet_id}")]
    NoVideoVariant { tweet_id: String },

    /// A record file could not be decoded.
    #[error("Invalid record '{path}': {reason}")]
    InvalidRecord { path: PathBuf, reason: String },

    /// Invalid date format in source data.
    #[error("Invalid date format '{value}' in {context}")]
    InvalidDate { value: String, context: String },

    // =========================================================================
    // Live API Errors
    // =========================================================================
    /// The tweet (or its author) no longer exists.
    #[error("Tweet {id} not found")]
    TweetNotFound { id: String },

    /// The tweet's account is suspended or protected.
    #[error("Not permitted to access tweet {id}: {reason}")]
    Forbidden { id: String, reason: String },

    /// Any other transport failure.
    #[error("Twitter API error: {0}")]
    Transport(String),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The live API is needed but no credentials were configured.
    #[error("No Twitter API credentials configured")]
    MissingCredentials,

    // =========================================================================
    // IO Errors
    // =========================================================================
    /// File read/write error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Path-specific IO error with context.
    #[error("Failed to {operation} '{path}': {source}")]
    PathError {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON encode/decode error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration file parsing error.
    #[error("Invalid configuration in '{path}': {reason}")]
    ConfigError { path: PathBuf, reason: String },

    // =========================================================================
    // Usage Errors
    // =========================================================================
    /// Invalid argument combination.
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    // =========================================================================
    // Generic Errors
    // =========================================================================
    /// Catch-all for other errors with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Result type alias for twarchive operations.
pub type Result<T> = std::result::Result<T, TwarchiveError>;

impl TwarchiveError {
    /// Create an archive not found error.
    pub fn archive_not_found(path: impl Into<PathBuf>) -> Self {
        Self::ArchiveNotFound { path: path.into() }
    }

    /// Create a parse error.
    pub fn parse_error(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ParseError {
            file: file.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid record error.
    pub fn invalid_record(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidRecord {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Create a tweet not found error.
    pub fn tweet_not_found(id: impl Into<String>) -> Self {
        Self::TweetNotFound { id: id.into() }
    }

    /// Create a forbidden error.
    pub fn forbidden(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Forbidden {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Create a path error with context.
    pub fn path_error(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::PathError {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Wrap an error with additional context.
    pub fn with_context<E>(context: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::WithContext {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Whether the walk may abandon the current branch and carry on.
    ///
    /// Only deleted tweets/authors and suspended/protected accounts qualify.
    #[must_use]
    pub const fn is_branch_recoverable(&self) -> bool {
        matches!(self, Self::TweetNotFound { .. } | Self::Forbidden { .. })
    }

    /// Get a suggestion for how to fix this error, if applicable.
    #[must_use]
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::ArchiveNotFound { .. } => Some(
                "Extract the Twitter data export under twitter-archives/ in the site root.",
            ),
            Self::IncompleteArchive { .. } => {
                Some("Re-extract the archive; profile, tweet and media files are all required.")
            }
            Self::MissingCredentials => Some(
                "Set TWARCHIVE_BEARER_TOKEN, or TWARCHIVE_CONSUMER_KEY and TWARCHIVE_CONSUMER_SECRET.",
            ),
            Self::UnknownMediaKind { .. } => {
                Some("This media kind is not handled yet; the record was not written.")
            }
            Self::InvalidRecord { .. } => {
                Some("Delete the broken record file and re-run to download it again.")
            }
            _ => None,
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error.
    ///
    /// # Errors
    ///
    /// Returns the original error wrapped with additional context.
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily (only evaluated on error).
    ///
    /// # Errors
    ///
    /// Returns the original error wrapped with additional context.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| TwarchiveError::with_context(context, e))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| TwarchiveError::with_context(f(), e))
    }
}

// =============================================================================
// CLI Error Formatting Utilities
// =============================================================================

use colored::Colorize;

/// Format a structured CLI error with explanation and suggestions.
///
/// # Arguments
/// * `title` - Brief error title (e.g., "Archive walk failed")
/// * `explanation` - What went wrong and why
/// * `suggestions` - List of actionable suggestions
#[must_use]
pub fn format_error(title: &str, explanation: &str, suggestions: &[&str]) -> String {
    use std::fmt::Write;

    let mut output = format!("{} {}", "✗".red().bold(), title.bold());

    if !explanation.is_empty() {
        let _ = write!(output, "\n\n   {explanation}");
    }

    if !suggestions.is_empty() {
        output.push_str("\n\n   ");
        if suggestions.len() == 1 {
            let _ = write!(output, "{} {}", "Hint:".cyan(), suggestions[0]);
        } else {
            let _ = write!(output, "{}:", "Try".cyan());
            for suggestion in suggestions {
                let _ = write!(output, "\n     {} {}", "•".dimmed(), suggestion);
            }
        }
    }

    output
}
