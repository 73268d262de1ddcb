//! End-to-end CLI tests for twarchive.
//!
//! These tests run the actual twarchive binary against temporary Hugo sites
//! and cover every command that works without network access.
//!
//! # Test Organization
//!
//! - `test_cli_*` - General CLI tests (flags, help, version)
//! - `test_archive2data_*` - Export import
//! - `test_ls_*`, `test_showinlines_*`, `test_data2md_*` - Site commands
//! - `test_api_*` - Commands that need credentials, run without them

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use std::time::Instant;
use tempfile::TempDir;

// =============================================================================
// Test Utilities
// =============================================================================

/// Log a test event with timestamp
macro_rules! test_log {
    ($($arg:tt)*) => {
        let timestamp = chrono::Utc::now().format("%H:%M:%S%.3f");
        eprintln!("[TEST {}] {}", timestamp, format!($($arg)*));
    };
}

/// A twarchive command isolated from the user's config and credentials.
fn twarchive_cmd(home: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("twarchive");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env_remove("TWARCHIVE_SITE")
        .env_remove("TWARCHIVE_BEARER_TOKEN")
        .env_remove("TWARCHIVE_CONSUMER_KEY")
        .env_remove("TWARCHIVE_CONSUMER_SECRET")
        .env_remove("RUST_LOG")
        .arg("--no-color");
    cmd
}

/// A site command: `--site <tmp>/site`.
fn site_cmd(tmp: &TempDir) -> Command {
    let mut cmd = twarchive_cmd(tmp.path());
    cmd.arg("--site").arg(tmp.path().join("site"));
    cmd
}

const EXPORT_TWEETS: &str = r#"window.YTD.tweets.part0 = [
    {"tweet": {
        "id_str": "1000",
        "created_at": "Wed Oct 10 20:19:24 +0000 2018",
        "full_text": "first & foremost",
        "entities": {"hashtags": [], "urls": [], "user_mentions": []}
    }},
    {"tweet": {
        "id_str": "1001",
        "created_at": "Wed Oct 10 20:25:00 +0000 2018",
        "full_text": "@me continuing the thread",
        "in_reply_to_status_id_str": "1000",
        "in_reply_to_screen_name": "me",
        "entities": {"hashtags": [], "urls": [], "user_mentions": []}
    }},
    {"tweet": {
        "id_str": "999",
        "created_at": "Tue Oct 09 10:00:00 +0000 2018",
        "full_text": "RT @bob: something worth sharing",
        "entities": {"hashtags": [], "urls": [], "user_mentions": []}
    }}
]"#;

/// Write a complete export under `<site>/twitter-archives/<name>`.
fn create_export(tmp: &TempDir, name: &str) {
    let data = tmp
        .path()
        .join("site/twitter-archives")
        .join(name)
        .join("data");
    fs::create_dir_all(data.join("profile_media")).unwrap();
    fs::create_dir_all(data.join("tweet_media")).unwrap();
    fs::write(
        data.join("manifest.js"),
        r#"window.__THAR_CONFIG = {"archiveInfo": {"generationDate": "2022-05-06T17:27:17.889Z"}}"#,
    )
    .unwrap();
    fs::write(
        data.join("account.js"),
        r#"window.YTD.account.part0 = [{"account": {"accountId": "7", "username": "me", "accountDisplayName": "Me"}}]"#,
    )
    .unwrap();
    fs::write(
        data.join("profile.js"),
        r#"window.YTD.profile.part0 = [{"profile": {"avatarMediaUrl": "https://pbs.twimg.com/profile_images/7/me.png"}}]"#,
    )
    .unwrap();
    fs::write(data.join("profile_media/7-me.png"), b"png").unwrap();
    fs::write(data.join("tweet.js"), EXPORT_TWEETS).unwrap();
}

fn import_export(tmp: &TempDir) {
    create_export(tmp, "twitter-2022-05-06");
    site_cmd(tmp)
        .args(["archive2data", "--no-api"])
        .assert()
        .success();
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_cli_help() {
    test_log!("Starting test_cli_help");
    let start = Instant::now();

    let tmp = TempDir::new().unwrap();
    twarchive_cmd(tmp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("twarchive"))
        .stdout(predicate::str::contains("tweet2data"))
        .stdout(predicate::str::contains("archive2data"));

    test_log!("test_cli_help completed in {:?}", start.elapsed());
}

#[test]
fn test_cli_version() {
    let tmp = TempDir::new().unwrap();
    twarchive_cmd(tmp.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_cli_no_args() {
    let tmp = TempDir::new().unwrap();
    twarchive_cmd(tmp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_unknown_command() {
    let tmp = TempDir::new().unwrap();
    twarchive_cmd(tmp.path())
        .arg("tweet2pdf")
        .assert()
        .failure();
}

// =============================================================================
// Export Import Tests
// =============================================================================

#[test]
fn test_archive2data_no_api_saves_regular_tweets() {
    test_log!("Starting test_archive2data_no_api_saves_regular_tweets");
    let start = Instant::now();

    let tmp = TempDir::new().unwrap();
    create_export(&tmp, "twitter-2022-05-06");

    site_cmd(&tmp)
        .args(["archive2data", "--no-api"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 tweets saved"))
        .stdout(predicate::str::contains("1 retweets skipped"));

    let records = tmp.path().join("site/data/twarchive");
    assert!(records.join("1000.json").exists());
    assert!(records.join("1001.json").exists());
    assert!(!records.join("999.json").exists());

    let record = fs::read_to_string(records.join("1001.json")).unwrap();
    assert!(record.contains("continuing the thread"));

    test_log!(
        "test_archive2data_no_api_saves_regular_tweets completed in {:?}",
        start.elapsed()
    );
}

#[test]
fn test_archive2data_without_credentials_skips_retweets() {
    let tmp = TempDir::new().unwrap();
    create_export(&tmp, "twitter-2022-05-06");

    site_cmd(&tmp)
        .arg("archive2data")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 retweets skipped"));
}

#[test]
fn test_archive2data_named_archive_missing() {
    let tmp = TempDir::new().unwrap();
    create_export(&tmp, "twitter-2022-05-06");

    site_cmd(&tmp)
        .args(["archive2data", "--no-api", "--archive", "twitter-1999-01-01"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("twitter-1999-01-01"));
}

#[test]
fn test_archive2data_no_archives() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("site")).unwrap();

    site_cmd(&tmp)
        .args(["archive2data", "--no-api"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Archive not found"));
}

// =============================================================================
// Site Command Tests
// =============================================================================

#[test]
fn test_ls_data_sorts_numerically() {
    let tmp = TempDir::new().unwrap();
    import_export(&tmp);

    site_cmd(&tmp)
        .args(["ls", "data"])
        .assert()
        .success()
        .stdout("1000.json\n1001.json\n");
}

#[test]
fn test_ls_empty_site() {
    let tmp = TempDir::new().unwrap();
    site_cmd(&tmp)
        .args(["ls", "content"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_data2md_marks_thread_final() {
    test_log!("Starting test_data2md_marks_thread_final");
    let start = Instant::now();

    let tmp = TempDir::new().unwrap();
    import_export(&tmp);

    site_cmd(&tmp)
        .arg("data2md")
        .assert()
        .success()
        .stdout(predicate::str::contains("Generated 2 pages"));

    let pages = tmp.path().join("site/content/twarchive");
    let first = fs::read_to_string(pages.join("1000.md")).unwrap();
    let last = fs::read_to_string(pages.join("1001.md")).unwrap();
    assert_eq!(
        first,
        "---\ntweetid: \"1000\"\ndate: 2018-10-10 20:19:24+00:00\n---\n"
    );
    assert!(last.contains("This tweet is part of a thread:"));
    assert!(last.contains(r#"{{% twarchiveThread "1001" %}}"#));

    site_cmd(&tmp)
        .args(["ls", "content"])
        .assert()
        .success()
        .stdout("1000.md\n1001.md\n");

    test_log!(
        "test_data2md_marks_thread_final completed in {:?}",
        start.elapsed()
    );
}

#[test]
fn test_showinlines_lists_shortcodes() {
    let tmp = TempDir::new().unwrap();
    let posts = tmp.path().join("site/content/posts");
    fs::create_dir_all(&posts).unwrap();
    fs::write(
        posts.join("a.md"),
        r#"{{< twarchiveTweet "20" >}} {{< twarchiveThread "1001" >}}"#,
    )
    .unwrap();
    fs::write(
        posts.join("b.md"),
        r#"{{< twarchiveTweet "20" >}} {{< twarchiveTweet "7-intentionallyinvalid" >}}"#,
    )
    .unwrap();

    site_cmd(&tmp)
        .arg("showinlines")
        .assert()
        .success()
        .stdout("- 1001\n- 20\n- 7-intentionallyinvalid\n");
}

#[test]
fn test_reencode_rewrites_records() {
    let tmp = TempDir::new().unwrap();
    import_export(&tmp);
    let record = tmp.path().join("site/data/twarchive/1000.json");
    let before = fs::read(&record).unwrap();

    site_cmd(&tmp)
        .arg("reencode")
        .assert()
        .success()
        .stdout(predicate::str::contains("Re-encoded 2 records"));

    assert_eq!(fs::read(&record).unwrap(), before);
}

#[test]
fn test_reencode_reports_broken_record() {
    let tmp = TempDir::new().unwrap();
    let records = tmp.path().join("site/data/twarchive");
    fs::create_dir_all(&records).unwrap();
    fs::write(records.join("5.json"), "{not json").unwrap();

    site_cmd(&tmp)
        .arg("reencode")
        .assert()
        .failure()
        .stderr(predicate::str::contains("5.json"));
}

#[test]
fn test_quiet_mode_prints_nothing() {
    let tmp = TempDir::new().unwrap();
    create_export(&tmp, "twitter-2022-05-06");

    site_cmd(&tmp)
        .args(["--quiet", "archive2data", "--no-api"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

// =============================================================================
// Commands Needing the Live API
// =============================================================================

#[test]
fn test_api_tweet2data_requires_credentials() {
    let tmp = TempDir::new().unwrap();
    site_cmd(&tmp)
        .args(["tweet2data", "20"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No Twitter API credentials configured"))
        .stderr(predicate::str::contains("TWARCHIVE_BEARER_TOKEN"));
}

#[test]
fn test_api_tweet2data_rejects_bad_id() {
    let tmp = TempDir::new().unwrap();
    site_cmd(&tmp)
        .args(["tweet2data", "not-a-tweet"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a tweet ID or tweet URL"));
}

// =============================================================================
// Config and Completions
// =============================================================================

#[test]
fn test_config_prints_defaults() {
    let tmp = TempDir::new().unwrap();
    twarchive_cmd(tmp.path())
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("[walk]"))
        .stdout(predicate::str::contains("max_recurse = 20"));
}

#[test]
fn test_config_show_redacts_secrets() {
    let tmp = TempDir::new().unwrap();
    twarchive_cmd(tmp.path())
        .env("TWARCHIVE_BEARER_TOKEN", "hunter2")
        .args(["config", "--show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Bearer token: <set>"))
        .stdout(predicate::str::contains("hunter2").not());
}

#[test]
fn test_completions_bash() {
    let tmp = TempDir::new().unwrap();
    twarchive_cmd(tmp.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("twarchive"));
}
