//! Tweet and account identifiers, and the text a user posts to prove wallet ownership.

use crate::error::SocialError;
use alloy_primitives::Address;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Longest decimal id that still fits in a `u64`.
const MAX_ID_DIGITS: usize = 19;
const MAX_HANDLE_LEN: usize = 15;

const TWEET_HOSTS: &[&str] = &[
    "twitter.com",
    "www.twitter.com",
    "mobile.twitter.com",
    "x.com",
    "www.x.com",
    "mobile.x.com",
];

fn is_decimal_id(s: &str) -> bool {
    !s.is_empty() && s.len() <= MAX_ID_DIGITS && s.bytes().all(|b| b.is_ascii_digit())
}

/// Numeric id of a tweet, kept as its decimal string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TweetId(String);

impl TweetId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for TweetId {
    type Err = SocialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if is_decimal_id(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(SocialError::InvalidTweetId(s.to_string()))
        }
    }
}

impl TryFrom<String> for TweetId {
    type Error = SocialError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TweetId> for String {
    fn from(id: TweetId) -> Self {
        id.0
    }
}

impl fmt::Display for TweetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable numeric id of a Twitter account. Unlike the handle it never changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TwitterUserId(String);

impl TwitterUserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for TwitterUserId {
    type Err = SocialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if is_decimal_id(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(SocialError::InvalidTwitterId(s.to_string()))
        }
    }
}

impl TryFrom<String> for TwitterUserId {
    type Error = SocialError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TwitterUserId> for String {
    fn from(id: TwitterUserId) -> Self {
        id.0
    }
}

impl fmt::Display for TwitterUserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A Twitter handle without the leading `@`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TwitterHandle(String);

impl TwitterHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for TwitterHandle {
    type Err = SocialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let handle = trimmed.strip_prefix('@').unwrap_or(trimmed);
        let valid = !handle.is_empty()
            && handle.len() <= MAX_HANDLE_LEN
            && handle
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_');
        if valid {
            Ok(Self(handle.to_string()))
        } else {
            Err(SocialError::InvalidHandle(s.to_string()))
        }
    }
}

impl TryFrom<String> for TwitterHandle {
    type Error = SocialError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TwitterHandle> for String {
    fn from(h: TwitterHandle) -> Self {
        h.0
    }
}

impl fmt::Display for TwitterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// A reference to a tweet as typed by a user: either the bare id or a status URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TweetRef {
    pub tweet_id: TweetId,
    pub author: Option<TwitterHandle>,
}

impl TweetRef {
    pub fn parse(input: &str) -> Result<Self, SocialError> {
        let input = input.trim();
        if let Ok(tweet_id) = input.parse::<TweetId>() {
            return Ok(Self {
                tweet_id,
                author: None,
            });
        }

        let not_a_tweet = || SocialError::NotATweetUrl(input.to_string());
        let with_scheme = if input.contains("://") {
            input.to_string()
        } else {
            format!("https://{input}")
        };
        let url = Url::parse(&with_scheme).map_err(|_| not_a_tweet())?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(not_a_tweet());
        }
        let host = url.host_str().ok_or_else(not_a_tweet)?.to_ascii_lowercase();
        if !TWEET_HOSTS.contains(&host.as_str()) {
            return Err(not_a_tweet());
        }

        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();
        match segments.as_slice() {
            [handle, "status" | "statuses", id, ..] => {
                let tweet_id = id.parse::<TweetId>()?;
                // `/i/status/<id>` links carry no author.
                let author = if *handle == "i" {
                    None
                } else {
                    Some(handle.parse::<TwitterHandle>()?)
                };
                Ok(Self { tweet_id, author })
            }
            _ => Err(not_a_tweet()),
        }
    }
}

/// Strict `0x` + 40 hex digits; mixed case is accepted without checksum enforcement.
pub fn parse_wallet_address(input: &str) -> Result<Address, SocialError> {
    let s = input.trim();
    let invalid = || SocialError::InvalidWallet(s.to_string());
    let hex_part = s.strip_prefix("0x").ok_or_else(invalid)?;
    if hex_part.len() != 40 || !hex_part.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    let bytes = hex::decode(hex_part).map_err(|_| invalid())?;
    Ok(Address::from_slice(&bytes))
}

pub fn verification_tweet_text(wallet: &Address) -> String {
    format!(
        "Verifying my wallet {} on Flare Network #FlareNetwork #Web3Verification",
        wallet.to_checksum(None)
    )
}

pub fn bio_code(wallet: &Address) -> String {
    format!("flare-verify:{}", wallet.to_checksum(None))
}

pub fn tweet_intent_url(text: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(text.as_bytes()).collect();
    format!("https://twitter.com/intent/tweet?text={encoded}")
}

/// True when `text` contains the wallet's `0x` hex form, ignoring case. A match that runs
/// on into more hex digits (a tx hash, say) does not count.
pub fn text_mentions_wallet(text: &str, wallet: &Address) -> bool {
    let needle = format!("0x{}", hex::encode(wallet.as_slice()));
    let text = text.to_ascii_lowercase();
    text.match_indices(&needle).any(|(at, _)| {
        !text[at + needle.len()..].starts_with(|c: char| c.is_ascii_hexdigit())
    })
}

/// Resolves a handle to the account's numeric id.
#[async_trait]
pub trait HandleResolver: Send + Sync {
    async fn resolve(&self, handle: &TwitterHandle) -> Result<TwitterUserId, SocialError>;
}

/// Fixed handle table, for offline runs and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    ids: HashMap<String, TwitterUserId>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, handle: &TwitterHandle, id: TwitterUserId) -> Self {
        self.ids.insert(handle.as_str().to_ascii_lowercase(), id);
        self
    }
}

#[async_trait]
impl HandleResolver for StaticResolver {
    async fn resolve(&self, handle: &TwitterHandle) -> Result<TwitterUserId, SocialError> {
        self.ids
            .get(&handle.as_str().to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| SocialError::UnknownHandle(handle.as_str().to_string()))
    }
}

/// Looks handles up through the Twitter v2 users endpoint.
#[derive(Debug, Clone)]
pub struct TwitterApiResolver {
    base_url: String,
    bearer_token: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct UserLookupResponse {
    data: Option<UserLookupData>,
}

#[derive(Debug, Deserialize)]
struct UserLookupData {
    id: String,
}

impl TwitterApiResolver {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.twitter.com";

    pub fn new(base_url: &str, bearer_token: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            bearer_token: bearer_token.to_string(),
            client,
        }
    }
}

fn parse_user_lookup(handle: &TwitterHandle, body: &str) -> Result<TwitterUserId, SocialError> {
    let parsed: UserLookupResponse =
        serde_json::from_str(body).map_err(|e| SocialError::Lookup(e.to_string()))?;
    match parsed.data {
        Some(data) => data.id.parse(),
        None => Err(SocialError::UnknownHandle(handle.as_str().to_string())),
    }
}

#[async_trait]
impl HandleResolver for TwitterApiResolver {
    async fn resolve(&self, handle: &TwitterHandle) -> Result<TwitterUserId, SocialError> {
        let url = format!("{}/2/users/by/username/{}", self.base_url, handle.as_str());
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.bearer_token)
            .send()
            .await
            .map_err(|e| SocialError::Lookup(e.to_string()))?;
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SocialError::UnknownHandle(handle.as_str().to_string()));
        }
        if !status.is_success() {
            return Err(SocialError::Lookup(format!("twitter api returned HTTP {status}")));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| SocialError::Lookup(e.to_string()))?;
        parse_user_lookup(handle, &body)
    }
}
