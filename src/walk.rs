//! Recursive fetch-and-save of tweets and everything they reference.
//!
//! Saving a tweet saves its quoted tweets, its reply parent and the
//! original of a retweet, and so on transitively. The walk is depth-first
//! on the call stack and stops at:
//!
//! - a tweet already on disk (unless forced)
//! - a tweet already written during this run
//! - a depth beyond [`WalkOptions::max_rlevel`]
//!
//! A referenced tweet that is gone, or whose account is suspended or
//! protected, abandons that branch only. Every other failure aborts the walk;
//! rerunning it is safe because finished records are skipped.

use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::api::{ApiTweet, MAX_TIMELINE_PAGE, TwitterApi, tweet_from_api};
use crate::error::{Result, TwarchiveError};
use crate::storage::TweetStore;
use crate::{DEFAULT_MAX_RECURSE, INTENTIONALLY_INVALID_SUFFIX};

/// What to archive: a tweet by ID, or one already fetched.
#[derive(Debug, Clone, PartialEq)]
pub enum WalkTarget {
    Id(String),
    Tweet(Box<ApiTweet>),
}

impl WalkTarget {
    /// Build a target from exactly one of an ID or a fetched tweet.
    ///
    /// # Errors
    ///
    /// [`TwarchiveError::InvalidArgument`] when both or neither are given.
    pub fn from_parts(id: Option<String>, tweet: Option<ApiTweet>) -> Result<Self> {
        match (id, tweet) {
            (Some(id), None) => Ok(Self::Id(id)),
            (None, Some(tweet)) => Ok(Self::Tweet(Box::new(tweet))),
            (Some(_), Some(_)) => Err(TwarchiveError::invalid_argument(
                "give a tweet ID or a fetched tweet, not both",
            )),
            (None, None) => Err(TwarchiveError::invalid_argument(
                "a tweet ID or a fetched tweet is required",
            )),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Id(id) => id,
            Self::Tweet(tweet) => &tweet.id_str,
        }
    }
}

/// Knobs for one walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkOptions {
    /// Deepest recursion level still saved; the starting tweet is level 0.
    pub max_rlevel: usize,
    /// Overwrite records that already exist.
    pub force: bool,
    /// Tweets requested per timeline page.
    pub page_size: usize,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            max_rlevel: DEFAULT_MAX_RECURSE,
            force: false,
            page_size: MAX_TIMELINE_PAGE,
        }
    }
}

/// What a walk did, by tweet ID.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkReport {
    pub saved: Vec<String>,
    pub already_present: Vec<String>,
    pub too_deep: Vec<String>,
    /// Branches dropped because the tweet was gone or forbidden.
    pub abandoned: Vec<String>,
}

/// Drives walks against one API and one store.
pub struct Archiver<'a> {
    api: &'a dyn TwitterApi,
    store: &'a TweetStore,
    options: WalkOptions,
    written: HashSet<String>,
    report: WalkReport,
}

impl<'a> Archiver<'a> {
    pub fn new(api: &'a dyn TwitterApi, store: &'a TweetStore, options: WalkOptions) -> Self {
        Self {
            api,
            store,
            options,
            written: HashSet::new(),
            report: WalkReport::default(),
        }
    }

    #[must_use]
    pub const fn options(&self) -> &WalkOptions {
        &self.options
    }

    #[must_use]
    pub const fn report(&self) -> &WalkReport {
        &self.report
    }

    #[must_use]
    pub fn into_report(self) -> WalkReport {
        self.report
    }

    /// Save `target` at recursion level `rlevel`, then walk its references.
    ///
    /// # Errors
    ///
    /// Propagates any failure for `target` itself, and any failure other
    /// than not-found or forbidden from the tweets it references.
    pub fn tweet_to_data(&mut self, target: WalkTarget, rlevel: usize) -> Result<()> {
        let id = target.id().to_string();

        if self.written.contains(&id) {
            debug!(tweet_id = %id, "Already written during this run");
            return Ok(());
        }

        if !self.options.force && self.store.exists(&id) {
            info!(tweet_id = %id, "Already archived and not forced, skipping");
            self.report.already_present.push(id);
            return Ok(());
        }

        if rlevel > self.options.max_rlevel {
            warn!(
                tweet_id = %id,
                rlevel,
                max_rlevel = self.options.max_rlevel,
                "Recursion level too deep, refusing to download"
            );
            self.report.too_deep.push(id);
            return Ok(());
        }

        let tweet = match target {
            WalkTarget::Tweet(tweet) => *tweet,
            WalkTarget::Id(id) => {
                info!(tweet_id = %id, rlevel, "Downloading tweet");
                self.api.get_tweet(&id)?
            }
        };

        let archived = tweet_from_api(&tweet, self.api)?;
        self.store.save(&archived)?;
        self.written.insert(id.clone());
        self.report.saved.push(id);

        for referenced in archived.referenced_ids() {
            self.continue_on_error(WalkTarget::Id(referenced), rlevel + 1)?;
        }
        Ok(())
    }

    /// [`Archiver::tweet_to_data`], treating not-found and forbidden as a
    /// dead branch instead of an error.
    ///
    /// # Errors
    ///
    /// Propagates every other failure.
    pub fn continue_on_error(&mut self, target: WalkTarget, rlevel: usize) -> Result<()> {
        let id = target.id().to_string();
        match self.tweet_to_data(target, rlevel) {
            Err(e) if e.is_branch_recoverable() => {
                warn!(tweet_id = %id, "Abandoning branch: {e}");
                self.report.abandoned.push(id);
                Ok(())
            }
            other => other,
        }
    }

    /// Archive a user's timeline, newest first.
    ///
    /// Pages back through the timeline until an empty page. Unless forced,
    /// tweets already on disk are left out, and paging stops at the first
    /// page containing one unless `retrieve_all` is set. Returns how many
    /// timeline tweets were walked.
    ///
    /// # Errors
    ///
    /// Fails if a page cannot be fetched or any walk fails.
    pub fn user_tweets_to_data(&mut self, screen_name: &str, retrieve_all: bool) -> Result<usize> {
        let downloaded = self.store.downloaded_ids()?;
        let page_size = self.options.page_size.clamp(1, MAX_TIMELINE_PAGE);
        let mut collected: Vec<ApiTweet> = Vec::new();
        let mut max_id: Option<u64> = None;

        loop {
            info!(screen_name, ?max_id, "Retrieving timeline page");
            let page = self.api.user_timeline(screen_name, max_id, page_size)?;
            if page.is_empty() {
                break;
            }
            let oldest = page.iter().filter_map(ApiTweet::numeric_id).min();
            let total = page.len();

            if self.options.force {
                collected.extend(page);
            } else {
                let unseen: Vec<ApiTweet> = page
                    .into_iter()
                    .filter(|t| !downloaded.contains(&t.id_str))
                    .collect();
                let reached_archived = unseen.len() < total;
                collected.extend(unseen);
                if reached_archived && !retrieve_all {
                    break;
                }
            }

            let next = match oldest {
                Some(oldest) if oldest > 0 => oldest - 1,
                _ => break,
            };
            if max_id.is_some_and(|prev| next >= prev) {
                warn!(screen_name, next, "Timeline did not move backwards, stopping");
                break;
            }
            max_id = Some(next);
        }

        info!(
            screen_name,
            count = collected.len(),
            force = self.options.force,
            retrieve_all,
            "Finished retrieving timeline"
        );

        let count = collected.len();
        for tweet in collected {
            self.tweet_to_data(WalkTarget::Tweet(Box::new(tweet)), 0)?;
        }
        Ok(count)
    }

    /// Walk every inline-referenced ID, skipping intentionally invalid ones.
    ///
    /// Returns how many IDs were walked.
    ///
    /// # Errors
    ///
    /// Propagates any failure other than not-found or forbidden.
    pub fn inline_to_data<I>(&mut self, ids: I) -> Result<usize>
    where
        I: IntoIterator<Item = String>,
    {
        let mut walked = 0;
        for id in ids {
            if id.ends_with(INTENTIONALLY_INVALID_SUFFIX) {
                info!(tweet_id = %id, "Skipping intentionally invalid tweet ID");
                continue;
            }
            self.continue_on_error(WalkTarget::Id(id), 0)?;
            walked += 1;
        }
        Ok(walked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    enum Failure {
        NotFound,
        Forbidden,
        Transport,
    }

    #[derive(Default)]
    struct MockApi {
        tweets: HashMap<String, ApiTweet>,
        failures: HashMap<String, Failure>,
        timeline: Vec<String>,
        requested: RefCell<Vec<String>>,
    }

    impl MockApi {
        fn add(&mut self, tweet: ApiTweet) {
            self.tweets.insert(tweet.id_str.clone(), tweet);
        }

        fn requested(&self) -> Vec<String> {
            self.requested.borrow().clone()
        }
    }

    impl TwitterApi for MockApi {
        fn get_tweet(&self, id: &str) -> Result<ApiTweet> {
            self.requested.borrow_mut().push(id.to_string());
            match self.failures.get(id) {
                Some(Failure::NotFound) => Err(TwarchiveError::tweet_not_found(id)),
                Some(Failure::Forbidden) => Err(TwarchiveError::forbidden(id, "suspended")),
                Some(Failure::Transport) => Err(TwarchiveError::Transport("HTTP 500".into())),
                None => self
                    .tweets
                    .get(id)
                    .cloned()
                    .ok_or_else(|| TwarchiveError::tweet_not_found(id)),
            }
        }

        fn user_timeline(
            &self,
            _screen_name: &str,
            max_id: Option<u64>,
            count: usize,
        ) -> Result<Vec<ApiTweet>> {
            Ok(self
                .timeline
                .iter()
                .filter(|id| max_id.is_none_or(|max| id.parse::<u64>().unwrap() <= max))
                .take(count)
                .map(|id| self.tweets[id].clone())
                .collect())
        }

        fn fetch_bytes(&self, _url: &str) -> Result<Vec<u8>> {
            Ok(b"img".to_vec())
        }
    }

    fn api_tweet(id: &str, reply_to: Option<&str>, quotes: &[&str]) -> ApiTweet {
        let urls: Vec<Value> = quotes
            .iter()
            .map(|q| json!({"expanded_url": format!("https://twitter.com/u/status/{q}")}))
            .collect();
        serde_json::from_value(json!({
            "id_str": id,
            "created_at": "Wed Oct 10 20:19:24 +0000 2018",
            "full_text": format!("tweet {id}"),
            "entities": {"urls": urls},
            "in_reply_to_status_id_str": reply_to,
            "in_reply_to_screen_name": reply_to.map(|_| "parent"),
            "user": {"screen_name": "u", "name": "U", "profile_image_url_https": "https://p/a.jpg"}
        }))
        .unwrap()
    }

    fn setup() -> (TempDir, TweetStore) {
        let tmp = TempDir::new().unwrap();
        let store = TweetStore::new(tmp.path().join("data/twarchive"));
        (tmp, store)
    }

    #[test]
    fn test_target_requires_exactly_one() {
        assert!(WalkTarget::from_parts(Some("1".into()), None).is_ok());
        assert!(WalkTarget::from_parts(None, Some(api_tweet("1", None, &[]))).is_ok());
        let both = WalkTarget::from_parts(Some("1".into()), Some(api_tweet("1", None, &[])));
        assert!(matches!(both, Err(TwarchiveError::InvalidArgument { .. })));
        assert!(WalkTarget::from_parts(None, None).is_err());
    }

    #[test]
    fn test_depth_bound() {
        let (_tmp, store) = setup();
        let max_rlevel = 3;
        let chain_len = max_rlevel + 5;
        let mut api = MockApi::default();
        for n in 1..=chain_len {
            api.add(api_tweet(&n.to_string(), Some(&(n + 1).to_string()), &[]));
        }

        let options = WalkOptions {
            max_rlevel,
            ..WalkOptions::default()
        };
        let mut archiver = Archiver::new(&api, &store, options);
        archiver.tweet_to_data(WalkTarget::Id("1".into()), 0).unwrap();

        assert_eq!(store.downloaded_ids().unwrap().len(), max_rlevel + 1);
        assert!(store.exists(&(max_rlevel + 1).to_string()));
        assert!(!store.exists(&(max_rlevel + 2).to_string()));
        assert_eq!(api.requested().len(), max_rlevel + 1);
        assert_eq!(archiver.report().too_deep, vec![(max_rlevel + 2).to_string()]);
    }

    #[test]
    fn test_branch_isolation() {
        let (_tmp, store) = setup();
        let mut api = MockApi::default();
        api.add(api_tweet("1", None, &["2", "3", "4"]));
        api.add(api_tweet("4", None, &[]));
        api.failures.insert("2".into(), Failure::NotFound);
        api.failures.insert("3".into(), Failure::Forbidden);

        let mut archiver = Archiver::new(&api, &store, WalkOptions::default());
        archiver.tweet_to_data(WalkTarget::Id("1".into()), 0).unwrap();

        assert!(store.exists("1"));
        assert!(store.exists("4"));
        assert!(!store.exists("2"));
        assert_eq!(archiver.report().abandoned, vec!["2", "3"]);
    }

    #[test]
    fn test_other_failures_abort() {
        let (_tmp, store) = setup();
        let mut api = MockApi::default();
        api.add(api_tweet("1", Some("2"), &[]));
        api.failures.insert("2".into(), Failure::Transport);

        let mut archiver = Archiver::new(&api, &store, WalkOptions::default());
        let err = archiver
            .tweet_to_data(WalkTarget::Id("1".into()), 0)
            .unwrap_err();
        assert!(matches!(err, TwarchiveError::Transport(_)));
        assert!(store.exists("1"));
    }

    #[test]
    fn test_root_not_found_propagates_without_isolation() {
        let (_tmp, store) = setup();
        let api = MockApi::default();
        let mut archiver = Archiver::new(&api, &store, WalkOptions::default());
        assert!(archiver.tweet_to_data(WalkTarget::Id("404".into()), 0).is_err());
        assert!(archiver.continue_on_error(WalkTarget::Id("404".into()), 0).is_ok());
    }

    #[test]
    fn test_idempotent_rerun() {
        let (_tmp, store) = setup();
        let mut api = MockApi::default();
        api.add(api_tweet("1", Some("2"), &[]));
        api.add(api_tweet("2", None, &[]));

        Archiver::new(&api, &store, WalkOptions::default())
            .tweet_to_data(WalkTarget::Id("1".into()), 0)
            .unwrap();
        let first = fs::read(store.record_path("1")).unwrap();

        let mut again = Archiver::new(&api, &store, WalkOptions::default());
        again.tweet_to_data(WalkTarget::Id("1".into()), 0).unwrap();
        assert_eq!(fs::read(store.record_path("1")).unwrap(), first);
        assert_eq!(again.report().already_present, vec!["1"]);
        assert_eq!(api.requested(), vec!["1", "2"]);
    }

    #[test]
    fn test_forced_cycle_terminates() {
        let (_tmp, store) = setup();
        let mut api = MockApi::default();
        api.add(api_tweet("1", None, &["2"]));
        api.add(api_tweet("2", None, &["1"]));

        let options = WalkOptions {
            force: true,
            ..WalkOptions::default()
        };
        let mut archiver = Archiver::new(&api, &store, options);
        archiver.tweet_to_data(WalkTarget::Id("1".into()), 0).unwrap();
        assert_eq!(archiver.report().saved, vec!["1", "2"]);
        assert_eq!(api.requested(), vec!["1", "2"]);
    }

    #[test]
    fn test_prefetched_tweet_is_not_refetched() {
        let (_tmp, store) = setup();
        let api = MockApi::default();
        let mut archiver = Archiver::new(&api, &store, WalkOptions::default());
        archiver
            .tweet_to_data(WalkTarget::Tweet(Box::new(api_tweet("9", None, &[]))), 0)
            .unwrap();
        assert!(store.exists("9"));
        assert!(api.requested().is_empty());
    }

    fn timeline_api() -> MockApi {
        let mut api = MockApi::default();
        for n in (1..=10).rev() {
            api.add(api_tweet(&n.to_string(), None, &[]));
            api.timeline.push(n.to_string());
        }
        api
    }

    fn timeline_options(force: bool) -> WalkOptions {
        WalkOptions {
            force,
            page_size: 3,
            ..WalkOptions::default()
        }
    }

    #[test]
    fn test_timeline_stops_at_archived_tweet() {
        let (_tmp, store) = setup();
        let api = timeline_api();
        store.save(&tweet_from_api(&api_tweet("7", None, &[]), &api).unwrap()).unwrap();

        let mut archiver = Archiver::new(&api, &store, timeline_options(false));
        assert_eq!(archiver.user_tweets_to_data("u", false).unwrap(), 5);
        let ids = store.downloaded_ids().unwrap();
        for id in ["10", "9", "8", "6", "5"] {
            assert!(ids.contains(id), "missing {id}");
        }
        assert!(!ids.contains("4"));
    }

    #[test]
    fn test_timeline_retrieve_all_fills_gaps() {
        let (_tmp, store) = setup();
        let api = timeline_api();
        store.save(&tweet_from_api(&api_tweet("7", None, &[]), &api).unwrap()).unwrap();

        let mut archiver = Archiver::new(&api, &store, timeline_options(false));
        assert_eq!(archiver.user_tweets_to_data("u", true).unwrap(), 9);
        assert_eq!(store.downloaded_ids().unwrap().len(), 10);
        assert!(archiver.report().already_present.is_empty());
    }

    #[test]
    fn test_timeline_force_rewalks_everything() {
        let (_tmp, store) = setup();
        let api = timeline_api();
        store.save(&tweet_from_api(&api_tweet("7", None, &[]), &api).unwrap()).unwrap();

        let mut archiver = Archiver::new(&api, &store, timeline_options(true));
        assert_eq!(archiver.user_tweets_to_data("u", false).unwrap(), 10);
        assert_eq!(archiver.report().saved.len(), 10);
    }

    #[test]
    fn test_inline_skips_intentionally_invalid() {
        let (_tmp, store) = setup();
        let mut api = MockApi::default();
        api.add(api_tweet("5", None, &[]));
        let mut archiver = Archiver::new(&api, &store, WalkOptions::default());
        let walked = archiver
            .inline_to_data(vec!["5".to_string(), "6-intentionallyinvalid".to_string(), "404".to_string()])
            .unwrap();
        assert_eq!(walked, 2);
        assert!(store.exists("5"));
        assert_eq!(api.requested(), vec!["5", "404"]);
    }
}
