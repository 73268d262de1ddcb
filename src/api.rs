//! Live Twitter API access.
//!
//! [`TwitterApi`] is the capability the rest of the crate depends on: fetch
//! one tweet, fetch a page of a user's timeline, download a URL. Its errors
//! distinguish not-found and forbidden (branch-local for the walk) from
//! everything else. [`HttpTwitterApi`] implements it over the v1.1 REST API
//! with an app-only bearer token.

use chrono::Utc;
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::ApiConfig;
use crate::error::{Result, TwarchiveError};
use crate::media::{MediaSource, resolve_media};
use crate::model::ArchivedTweet;
use crate::render::render_html;
use crate::{parse_twitter_date, tweet_id_from_uri, uri_is_tweet};

/// Most tweets the timeline endpoint returns per request.
pub const MAX_TIMELINE_PAGE: usize = 200;

pub const DEFAULT_BASE_URL: &str = "https://api.twitter.com";

/// Access to the live service.
pub trait TwitterApi {
    /// Fetch one tweet with full text, extended entities and alt text.
    ///
    /// # Errors
    ///
    /// [`TwarchiveError::TweetNotFound`] if the tweet or its author is gone,
    /// [`TwarchiveError::Forbidden`] if the account is suspended or
    /// protected, anything else for transport failures.
    fn get_tweet(&self, id: &str) -> Result<ApiTweet>;

    /// Fetch up to `count` of a user's most recent tweets, newest first,
    /// none newer than `max_id` when given.
    ///
    /// # Errors
    ///
    /// Same classification as [`TwitterApi::get_tweet`].
    fn user_timeline(
        &self,
        screen_name: &str,
        max_id: Option<u64>,
        count: usize,
    ) -> Result<Vec<ApiTweet>>;

    /// Download the body of `url`.
    ///
    /// # Errors
    ///
    /// Returns an error on any transport failure or non-success status.
    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>>;
}

/// A tweet as returned by the live API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiTweet {
    pub id_str: String,
    pub created_at: String,
    #[serde(default)]
    pub full_text: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub entities: Value,
    #[serde(default)]
    pub extended_entities: Value,
    #[serde(default)]
    pub retweeted_status: Option<Box<ApiTweet>>,
    #[serde(default)]
    pub in_reply_to_status_id_str: Option<String>,
    #[serde(default)]
    pub in_reply_to_screen_name: Option<String>,
    pub user: ApiUser,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiUser {
    pub screen_name: String,
    pub name: String,
    #[serde(default)]
    pub profile_image_url_https: Option<String>,
    #[serde(default)]
    pub profile_image_url: Option<String>,
}

impl ApiTweet {
    /// Full text when the extended mode supplied it, plain text otherwise.
    #[must_use]
    pub fn body_text(&self) -> &str {
        self.full_text
            .as_deref()
            .or(self.text.as_deref())
            .unwrap_or_default()
    }

    /// Numeric ID, used for timeline paging.
    #[must_use]
    pub fn numeric_id(&self) -> Option<u64> {
        self.id_str.parse().ok()
    }
}

/// IDs of the single tweets linked from a tweet's URL entities.
#[must_use]
pub fn quote_tweet_ids(entities: &Value) -> Vec<String> {
    use itertools::Itertools;

    entities["urls"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|url| url["expanded_url"].as_str())
        .filter(|expanded| uri_is_tweet(expanded))
        .filter_map(tweet_id_from_uri)
        .unique()
        .collect()
}

/// Convert a live tweet into an [`ArchivedTweet`], downloading its media and
/// the author's current avatar.
///
/// # Errors
///
/// Fails on an unparseable date, an unknown media kind, or any download
/// failure.
pub fn tweet_from_api(tweet: &ApiTweet, api: &dyn TwitterApi) -> Result<ArchivedTweet> {
    let id = tweet.id_str.clone();
    let text = tweet.body_text();
    let created_at =
        parse_twitter_date(&tweet.created_at).ok_or_else(|| TwarchiveError::InvalidDate {
            value: tweet.created_at.clone(),
            context: format!("tweet {id}"),
        })?;

    let media = resolve_media(&tweet.extended_entities, &id, MediaSource::Network(api))?;

    let avatar_url = tweet
        .user
        .profile_image_url_https
        .as_deref()
        .or(tweet.user.profile_image_url.as_deref());
    let author_avatar = match avatar_url {
        Some(url) => api.fetch_bytes(url)?,
        None => {
            warn!(tweet_id = %id, "Author has no profile image URL");
            Vec::new()
        }
    };

    Ok(ArchivedTweet {
        created_at,
        original_date_text: tweet.created_at.clone(),
        full_text: text.to_string(),
        html_strip_quotes: render_html(text, &tweet.entities, false),
        html_link_quotes: render_html(text, &tweet.entities, true),
        media,
        entities: tweet.entities.clone(),
        quote_tweet_ids: quote_tweet_ids(&tweet.entities),
        retweet_of_id: tweet.retweeted_status.as_ref().map(|rt| rt.id_str.clone()),
        reply_parent_id: tweet.in_reply_to_status_id_str.clone(),
        reply_parent_username: tweet.in_reply_to_screen_name.clone(),
        author_username: tweet.user.screen_name.clone(),
        author_display_name: tweet.user.name.clone(),
        author_avatar,
        retrieved_at: Utc::now(),
        id,
    })
}

// =============================================================================
// HTTP client
// =============================================================================

/// Blocking client for the v1.1 REST API.
pub struct HttpTwitterApi {
    client: Client,
    base_url: String,
    bearer_token: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    token_type: String,
    access_token: String,
}

impl HttpTwitterApi {
    /// Client using an existing app-only bearer token.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, bearer_token: impl Into<String>, user_agent: &str) -> Result<Self> {
        Ok(Self {
            client: Client::builder().user_agent(user_agent).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            bearer_token: bearer_token.into(),
        })
    }

    /// Client whose bearer token is exchanged from consumer credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the token exchange fails.
    pub fn from_consumer_credentials(
        base_url: &str,
        consumer_key: &str,
        consumer_secret: &str,
        user_agent: &str,
    ) -> Result<Self> {
        let mut api = Self::new(base_url, String::new(), user_agent)?;
        let resp = api
            .client
            .post(format!("{}/oauth2/token", api.base_url))
            .basic_auth(consumer_key, Some(consumer_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()?;
        let resp = check_status(resp, "oauth2/token")?;
        let token: TokenResponse = resp.json()?;
        if !token.token_type.eq_ignore_ascii_case("bearer") {
            return Err(TwarchiveError::Transport(format!(
                "Unexpected token type '{}' from oauth2/token",
                token.token_type
            )));
        }
        info!("Obtained app-only bearer token");
        api.bearer_token = token.access_token;
        Ok(api)
    }

    /// Client from configured credentials: a bearer token when present,
    /// consumer key and secret otherwise.
    ///
    /// # Errors
    ///
    /// [`TwarchiveError::MissingCredentials`] when neither is configured.
    pub fn from_config(config: &ApiConfig) -> Result<Self> {
        if let Some(token) = &config.bearer_token {
            return Self::new(&config.base_url, token.clone(), &config.user_agent);
        }
        match (&config.consumer_key, &config.consumer_secret) {
            (Some(key), Some(secret)) => {
                Self::from_consumer_credentials(&config.base_url, key, secret, &config.user_agent)
            }
            _ => Err(TwarchiveError::MissingCredentials),
        }
    }

    fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
        subject: &str,
    ) -> Result<T> {
        let url = format!("{}/1.1/{endpoint}", self.base_url);
        debug!(url = %url, subject, "API request");
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.bearer_token)
            .query(query)
            .send()?;
        Ok(check_status(resp, subject)?.json()?)
    }
}

fn check_status(resp: Response, subject: &str) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().unwrap_or_default();
    classify_status(status, subject, &body)?;
    Err(TwarchiveError::Transport(format!("{subject}: HTTP {status}")))
}

/// Map a response status onto the error classification.
///
/// 404 means the tweet or its author is gone and 403 means the account is
/// suspended or protected; the walk abandons only those branches. Every
/// other non-2xx status is a transport failure.
///
/// # Errors
///
/// Returns the classified error for any non-2xx status.
pub fn classify_status(status: StatusCode, subject: &str, body: &str) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }
    let body = body.replace('\n', " ");
    match status {
        StatusCode::NOT_FOUND => Err(TwarchiveError::tweet_not_found(subject)),
        StatusCode::FORBIDDEN => Err(TwarchiveError::forbidden(subject, body)),
        _ => Err(TwarchiveError::Transport(format!(
            "{subject}: HTTP {status}: {body}"
        ))),
    }
}

impl TwitterApi for HttpTwitterApi {
    fn get_tweet(&self, id: &str) -> Result<ApiTweet> {
        self.get_json(
            "statuses/show.json",
            &[
                ("id", id.to_string()),
                ("tweet_mode", "extended".to_string()),
                ("include_ext_alt_text", "true".to_string()),
            ],
            id,
        )
    }

    fn user_timeline(
        &self,
        screen_name: &str,
        max_id: Option<u64>,
        count: usize,
    ) -> Result<Vec<ApiTweet>> {
        let mut query = vec![
            ("screen_name", screen_name.to_string()),
            ("count", count.min(MAX_TIMELINE_PAGE).to_string()),
            ("tweet_mode", "extended".to_string()),
            ("include_ext_alt_text", "true".to_string()),
        ];
        if let Some(max_id) = max_id {
            query.push(("max_id", max_id.to_string()));
        }
        self.get_json("statuses/user_timeline.json", &query, &format!("@{screen_name}"))
    }

    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self.client.get(url).send()?.error_for_status()?;
        Ok(resp.bytes()?.to_vec())
    }
}
