//! CLI definitions for twarchive.
//!
//! Uses clap for argument parsing with derive macros.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// twarchive - Archive tweets for a Hugo site
#[derive(Parser, Debug)]
#[command(name = "twarchive")]
#[command(version)]
#[command(about = "Archive tweets, and everything they reference, for a static site")]
#[command(long_about = r#"
twarchive saves tweets as self-contained JSON records under data/twarchive/
of a Hugo site, following quotes, replies and retweets recursively, and
generates one content page per tweet under content/twarchive/.

Quick start:
  1. Set TWARCHIVE_BEARER_TOKEN (or a consumer key and secret)
  2. Run: twarchive --site ~/blog tweet2data 1050118621198921728
  3. Or import a data export: twarchive --site ~/blog archive2data
"#)]
pub struct Cli {
    /// Hugo site root
    #[arg(long, short = 's', env = "TWARCHIVE_SITE", global = true)]
    pub site: Option<PathBuf>,

    /// Be verbose (repeat for trace output)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Be quiet (errors only)
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Print the debug representation of errors on failure
    #[arg(long, global = true)]
    pub debug: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List record or page files, sorted by tweet ID
    Ls(LsArgs),

    /// Fetch one tweet and write its record to a file, without recursion
    Tweet2json(Tweet2jsonArgs),

    /// Archive one tweet and everything it references
    Tweet2data(Tweet2dataArgs),

    /// Show tweet IDs referenced by shortcodes in site content
    Showinlines,

    /// Archive every tweet referenced by shortcodes in site content
    Inline2data(WalkArgs),

    /// Regenerate content pages from archived records
    Data2md,

    /// Archive a user's timeline
    User2data(User2dataArgs),

    /// Import extracted data exports from twitter-archives/
    Archive2data(Archive2dataArgs),

    /// Rewrite every record in the current encoding
    Reencode,

    /// Show or manage configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
pub struct LsArgs {
    /// Which directory to list
    #[arg(default_value = "data")]
    pub directory: LsTarget,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LsTarget {
    /// Tweet records under data/twarchive/
    #[default]
    Data,
    /// Generated pages under content/twarchive/
    Content,
}

/// Credentials and walk tuning shared by commands that reach the live API.
#[derive(Args, Debug, Clone, Default)]
pub struct WalkArgs {
    /// API consumer key
    #[arg(long)]
    pub consumer_key: Option<String>,

    /// API consumer secret
    #[arg(long)]
    pub consumer_secret: Option<String>,

    /// App-only bearer token
    #[arg(long)]
    pub bearer_token: Option<String>,

    /// How many quote/reply/retweet hops to follow
    #[arg(long)]
    pub max_recurse: Option<usize>,

    /// Overwrite records that already exist
    #[arg(long, short = 'F')]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct Tweet2jsonArgs {
    /// Tweet ID or tweet URL
    pub tweetid: String,

    /// Output file
    pub filename: PathBuf,

    #[command(flatten)]
    pub walk: WalkArgs,
}

#[derive(Args, Debug)]
pub struct Tweet2dataArgs {
    /// Tweet ID or tweet URL
    pub tweetid: String,

    #[command(flatten)]
    pub walk: WalkArgs,
}

#[derive(Args, Debug)]
pub struct User2dataArgs {
    /// Screen name, with or without a leading @
    pub username: String,

    /// Keep paging past tweets that are already archived
    #[arg(long)]
    pub retrieve_all: bool,

    #[command(flatten)]
    pub walk: WalkArgs,
}

#[derive(Args, Debug)]
pub struct Archive2dataArgs {
    /// Only import this directory under twitter-archives/
    #[arg(long)]
    pub archive: Option<String>,

    /// Skip retweets instead of fetching them from the live API
    #[arg(long)]
    pub no_api: bool,

    #[command(flatten)]
    pub walk: WalkArgs,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Show current configuration
    #[arg(long)]
    pub show: bool,

    /// Print the config file path
    #[arg(long)]
    pub path: bool,

    /// Write a default config file
    #[arg(long)]
    pub init: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
