//! Mastodon platform implementation
//!
//! This module reads the home timeline and favourites/reblogs statuses on
//! Mastodon and other Fediverse servers that implement the Mastodon API,
//! using the megalodon library.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use megalodon::entities::Status;
use megalodon::megalodon::GetHomeTimelineInputOptions;
use megalodon::response::Response;
use megalodon::{Megalodon, SNS};
use secrecy::{ExposeSecret, SecretString};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::MastodonConfig;
use crate::error::{ActionError, ActionErrorKind, ConfigError, FetchError, Result};
use crate::platforms::{ActionDispatcher, TimelineSource};
use crate::types::{Action, ApiResponse, FetchWindow, Post, RateLimitInfo, TimelinePage};

const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";
const RATE_LIMIT_RESET_HEADER: &str = "x-ratelimit-reset";

/// Mastodon API client
pub struct MastodonClient {
    /// The megalodon client for API interactions
    client: Box<dyn Megalodon + Send + Sync>,

    /// The instance URL (e.g., "https://mastodon.social")
    instance_url: String,
}

impl MastodonClient {
    /// Create a new Mastodon client
    ///
    /// # Arguments
    ///
    /// * `instance_url` - The base URL of the Mastodon instance (e.g., "https://mastodon.social")
    /// * `access_token` - OAuth access token with `read:statuses` and `write:favourites`,
    ///   `write:statuses` scopes
    pub fn new(instance_url: String, access_token: String) -> Result<Self> {
        let client = megalodon::generator(
            SNS::Mastodon,
            instance_url.clone(),
            Some(access_token),
            None,
        )
        .map_err(|e| ConfigError::InvalidValue {
            field: "mastodon.instance".to_string(),
            reason: format!("failed to create Mastodon client: {:?}", e),
        })?;

        Ok(Self {
            client,
            instance_url,
        })
    }

    /// Create a Mastodon client from configuration
    ///
    /// Reads the access token from the configured token file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The token file cannot be read
    /// - The token file is empty
    pub fn from_config(config: &MastodonConfig) -> Result<Self> {
        let token_path =
            shellexpand::full(&config.token_file).map_err(|e| ConfigError::InvalidValue {
                field: "mastodon.token_file".to_string(),
                reason: e.to_string(),
            })?;

        let token = SecretString::from(
            std::fs::read_to_string(token_path.as_ref())
                .map_err(ConfigError::ReadError)?
                .trim()
                .to_string(),
        );

        if token.expose_secret().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "mastodon.token_file".to_string(),
                reason: "token file is empty".to_string(),
            }
            .into());
        }

        Self::new(
            normalize_instance_url(&config.instance),
            token.expose_secret().to_string(),
        )
    }

    /// Check that the access token is accepted by the instance
    pub async fn verify(&self) -> std::result::Result<String, FetchError> {
        let response = self
            .client
            .verify_account_credentials()
            .await
            .map_err(|e| fetch_error(e, "verify credentials"))?;

        debug!(instance = %self.instance_url, account = %response.json.acct, "Credentials verified");
        Ok(response.json.acct)
    }

    pub fn instance_url(&self) -> &str {
        &self.instance_url
    }
}

#[async_trait]
impl TimelineSource for MastodonClient {
    async fn fetch_timeline(
        &self,
        window: &FetchWindow,
    ) -> std::result::Result<ApiResponse<TimelinePage>, FetchError> {
        let response = self
            .client
            .get_home_timeline(Some(&timeline_options(window)))
            .await
            .map_err(|e| fetch_error(e, "home timeline"))?;

        let rate_limit = rate_limit_info(&response);
        let posts = response.json.iter().filter_map(post_from_status).collect();
        let page = TimelinePage::new(posts, response.json.len());
        if page.unreadable() > 0 {
            warn!(
                unreadable = page.unreadable(),
                returned = page.returned,
                "Some statuses on this page could not be read"
            );
        }

        Ok(ApiResponse::new(page, rate_limit))
    }
}

#[async_trait]
impl ActionDispatcher for MastodonClient {
    async fn like(&self, post_id: u64) -> std::result::Result<ApiResponse<()>, ActionError> {
        let response = self
            .client
            .favourite_status(post_id.to_string())
            .await
            .map_err(|e| ActionError::new(Action::Like, post_id, action_error_kind(e)))?;

        Ok(ApiResponse::new((), rate_limit_info(&response)))
    }

    async fn retweet(&self, post_id: u64) -> std::result::Result<ApiResponse<()>, ActionError> {
        let response = self
            .client
            .reblog_status(post_id.to_string())
            .await
            .map_err(|e| ActionError::new(Action::Retweet, post_id, action_error_kind(e)))?;

        Ok(ApiResponse::new((), rate_limit_info(&response)))
    }

    fn name(&self) -> &str {
        "mastodon"
    }
}

/// Ensure the instance URL carries a scheme, defaulting to https
pub fn normalize_instance_url(instance: &str) -> String {
    if instance.starts_with("http://") || instance.starts_with("https://") {
        instance.trim_end_matches('/').to_string()
    } else {
        format!("https://{}", instance.trim_end_matches('/'))
    }
}

/// Translate a fetch window into Mastodon query options
///
/// Mastodon's `max_id` is exclusive while the window's is inclusive, so the
/// bound is shifted up by one on the wire.
fn timeline_options(window: &FetchWindow) -> GetHomeTimelineInputOptions {
    GetHomeTimelineInputOptions {
        limit: Some(window.page_size),
        max_id: window.max_id.map(|id| id.saturating_add(1).to_string()),
        since_id: window.since_id.map(|id| id.to_string()),
        ..Default::default()
    }
}

/// The parts of a status a [`Post`] is built from
trait StatusFields {
    fn id(&self) -> &str;
    fn author(&self) -> &str;
    fn tag_names(&self) -> Vec<String>;
    fn is_sensitive(&self) -> bool;
    fn boosted(&self) -> Option<&Self>;
}

impl StatusFields for Status {
    fn id(&self) -> &str {
        &self.id
    }

    fn author(&self) -> &str {
        &self.account.acct
    }

    fn tag_names(&self) -> Vec<String> {
        self.tags.iter().map(|tag| tag.name.clone()).collect()
    }

    fn is_sensitive(&self) -> bool {
        self.sensitive
    }

    fn boosted(&self) -> Option<&Self> {
        self.reblog.as_deref()
    }
}

/// Map a status to a post
///
/// A boost keeps the wrapper's id and author (the account on the timeline),
/// but its hashtags and sensitive flag come from the boosted status: the
/// wrapper itself never carries tags and is never marked sensitive.
fn post_from_status<S: StatusFields>(status: &S) -> Option<Post> {
    let Some(id) = parse_status_id(status.id()) else {
        warn!(status_id = %status.id(), "Skipping status with non-numeric id");
        return None;
    };

    let content = status.boosted().unwrap_or(status);

    Some(Post {
        id,
        author_handle: status.author().to_string(),
        hashtags: content.tag_names(),
        is_repost: status.boosted().is_some(),
        is_sensitive: content.is_sensitive(),
    })
}

fn parse_status_id(id: &str) -> Option<u64> {
    id.trim().parse::<u64>().ok()
}

fn rate_limit_info<T>(response: &Response<T>) -> Option<RateLimitInfo> {
    let header = |name: &str| {
        response
            .header
            .get(name)
            .and_then(|value| value.to_str().ok())
    };

    parse_rate_limit(
        header(RATE_LIMIT_REMAINING_HEADER),
        header(RATE_LIMIT_RESET_HEADER),
        Utc::now(),
        Instant::now(),
    )
}

/// Parse `X-RateLimit-Remaining` / `X-RateLimit-Reset` into a quota
///
/// The reset header is an RFC 3339 timestamp; it is converted to a monotonic
/// deadline relative to `now`. Missing or malformed headers yield `None`.
fn parse_rate_limit(
    remaining: Option<&str>,
    reset: Option<&str>,
    now_utc: DateTime<Utc>,
    now: Instant,
) -> Option<RateLimitInfo> {
    let remaining = remaining?.trim().parse::<i64>().ok()?;
    let reset_at = DateTime::parse_from_rfc3339(reset?.trim())
        .ok()?
        .with_timezone(&Utc);

    let until_reset = (reset_at - now_utc).to_std().unwrap_or_default();

    Some(RateLimitInfo {
        remaining,
        reset_at: now + until_reset,
    })
}

/// Broad classification of a megalodon error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorClass {
    Authentication,
    NotFound,
    Validation,
    RateLimit,
    Server,
    Parse,
    Network,
}

fn classify(error_str: &str) -> ErrorClass {
    let error_lower = error_str.to_lowercase();

    match extract_http_status(error_str) {
        Some(401) | Some(403) => ErrorClass::Authentication,
        Some(404) => ErrorClass::NotFound,
        Some(422) => ErrorClass::Validation,
        Some(429) => ErrorClass::RateLimit,
        Some(500..=599) => ErrorClass::Server,
        Some(_) => ErrorClass::Network,
        None => {
            if error_lower.contains("unauthorized")
                || error_lower.contains("forbidden")
                || error_lower.contains("authentication")
                || error_lower.contains("token")
            {
                ErrorClass::Authentication
            } else if error_lower.contains("rate limit") || error_lower.contains("too many requests")
            {
                ErrorClass::RateLimit
            } else if error_lower.contains("not found") {
                ErrorClass::NotFound
            } else if error_lower.contains("parse")
                || error_lower.contains("json")
                || error_lower.contains("deserialize")
            {
                ErrorClass::Parse
            } else if error_lower.contains("validation") || error_lower.contains("unprocessable") {
                ErrorClass::Validation
            } else {
                ErrorClass::Network
            }
        }
    }
}

fn fetch_error(error: megalodon::error::Error, context: &str) -> FetchError {
    fetch_error_from_str(&error.to_string(), context)
}

fn fetch_error_from_str(error_str: &str, context: &str) -> FetchError {
    let message = format!("Mastodon {}: {}", context, error_str);
    match classify(error_str) {
        ErrorClass::Authentication => FetchError::Authentication(format!(
            "{}. Suggestion: Verify your OAuth token is valid and has not expired.",
            message
        )),
        ErrorClass::RateLimit => FetchError::RateLimit(message),
        ErrorClass::Server => FetchError::Server(message),
        ErrorClass::Parse | ErrorClass::Validation | ErrorClass::NotFound => {
            FetchError::InvalidResponse(message)
        }
        ErrorClass::Network => FetchError::Network(message),
    }
}

fn action_error_kind(error: megalodon::error::Error) -> ActionErrorKind {
    action_error_kind_from_str(&error.to_string())
}

fn action_error_kind_from_str(error_str: &str) -> ActionErrorKind {
    let message = error_str.to_string();
    match classify(error_str) {
        ErrorClass::Authentication => ActionErrorKind::Authentication(message),
        ErrorClass::NotFound => ActionErrorKind::NotFound(message),
        ErrorClass::RateLimit => ActionErrorKind::RateLimit(message),
        ErrorClass::Validation | ErrorClass::Parse => ActionErrorKind::Rejected(message),
        ErrorClass::Server | ErrorClass::Network => ActionErrorKind::Network(message),
    }
}

/// Extract HTTP status code from error message
///
/// Looks for patterns like "HTTP 401", "status 403", "401:", etc.
fn extract_http_status(error_str: &str) -> Option<u16> {
    let prefixes = ["HTTP ", "status ", "code: ", "status_code: "];

    for prefix in &prefixes {
        if let Some(pos) = error_str.find(prefix) {
            let after_prefix = &error_str[pos + prefix.len()..];
            if let Some(code) = after_prefix.get(0..3).and_then(|s| s.parse::<u16>().ok()) {
                if (100..=599).contains(&code) {
                    return Some(code);
                }
            }
        }
    }

    // Standalone 3-digit codes followed by colon or space
    let bytes = error_str.as_bytes();
    for (i, window) in bytes.windows(4).enumerate() {
        if window[..3].iter().all(u8::is_ascii_digit)
            && (window[3] == b':' || window[3] == b' ')
            && (i == 0 || !bytes[i - 1].is_ascii_digit())
        {
            let code = std::str::from_utf8(&window[..3])
                .ok()
                .and_then(|s| s.parse::<u16>().ok());
            if let Some(code) = code.filter(|c| (100..=599).contains(c)) {
                return Some(code);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlurboostError;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn token_file(contents: &[u8]) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
        temp_file
            .write_all(contents)
            .expect("Failed to write to temp file");
        temp_file.flush().expect("Failed to flush");
        temp_file
    }

    fn config_for(instance: &str, file: &NamedTempFile) -> MastodonConfig {
        MastodonConfig {
            instance: instance.to_string(),
            token_file: file.path().to_str().unwrap().to_string(),
        }
    }

    #[test]
    fn test_mastodon_client_creation() {
        let client = MastodonClient::new(
            "https://mastodon.social".to_string(),
            "test-token".to_string(),
        )
        .expect("Failed to create client");

        assert_eq!(ActionDispatcher::name(&client), "mastodon");
        assert_eq!(client.instance_url(), "https://mastodon.social");
    }

    #[test]
    fn test_from_config_valid_token() {
        let file = token_file(b"  test-token-123  \n");
        let client = MastodonClient::from_config(&config_for("mastodon.social", &file))
            .expect("client from config");

        assert_eq!(client.instance_url(), "https://mastodon.social");
    }

    #[test]
    fn test_from_config_empty_token_file() {
        let file = token_file(b"   \n");
        let result = MastodonClient::from_config(&config_for("mastodon.social", &file));

        match result {
            Err(PlurboostError::Config(ConfigError::InvalidValue { reason, .. })) => {
                assert!(reason.contains("empty"));
            }
            _ => panic!("Expected config error for empty token file"),
        }
    }

    #[test]
    fn test_from_config_missing_token_file() {
        let config = MastodonConfig {
            instance: "mastodon.social".to_string(),
            token_file: "/nonexistent/plurboost/mastodon.token".to_string(),
        };

        let result = MastodonClient::from_config(&config);
        assert!(matches!(
            result,
            Err(PlurboostError::Config(ConfigError::ReadError(_)))
        ));
    }

    #[test]
    fn test_normalize_instance_url() {
        assert_eq!(
            normalize_instance_url("mastodon.social"),
            "https://mastodon.social"
        );
        assert_eq!(
            normalize_instance_url("https://mastodon.social/"),
            "https://mastodon.social"
        );
        assert_eq!(
            normalize_instance_url("http://localhost:3000"),
            "http://localhost:3000"
        );
    }

    #[test]
    fn test_timeline_options_shift_max_id() {
        let window = FetchWindow {
            max_id: Some(27),
            since_id: Some(10),
            page_size: 40,
        };

        let options = timeline_options(&window);
        assert_eq!(options.limit, Some(40));
        assert_eq!(options.max_id.as_deref(), Some("28"));
        assert_eq!(options.since_id.as_deref(), Some("10"));
    }

    #[test]
    fn test_timeline_options_open_window() {
        let window = FetchWindow {
            max_id: None,
            since_id: None,
            page_size: 20,
        };

        let options = timeline_options(&window);
        assert_eq!(options.max_id, None);
        assert_eq!(options.since_id, None);
    }

    #[test]
    fn test_parse_status_id() {
        assert_eq!(parse_status_id("109876543210987654"), Some(109876543210987654));
        assert_eq!(parse_status_id("abc"), None);
        assert_eq!(parse_status_id(""), None);
    }

    /// Stand-in for a megalodon status with only the mapped fields
    struct TestStatus {
        id: &'static str,
        acct: &'static str,
        tags: Vec<&'static str>,
        sensitive: bool,
        reblog: Option<Box<TestStatus>>,
    }

    impl TestStatus {
        fn new(id: &'static str, acct: &'static str) -> Self {
            Self {
                id,
                acct,
                tags: Vec::new(),
                sensitive: false,
                reblog: None,
            }
        }
    }

    impl StatusFields for TestStatus {
        fn id(&self) -> &str {
            self.id
        }

        fn author(&self) -> &str {
            self.acct
        }

        fn tag_names(&self) -> Vec<String> {
            self.tags.iter().map(|tag| tag.to_string()).collect()
        }

        fn is_sensitive(&self) -> bool {
            self.sensitive
        }

        fn boosted(&self) -> Option<&Self> {
            self.reblog.as_deref()
        }
    }

    #[test]
    fn test_post_from_plain_status() {
        let mut status = TestStatus::new("110", "alice");
        status.tags = vec!["launch"];
        status.sensitive = true;

        let post = post_from_status(&status).unwrap();
        assert_eq!(post.id, 110);
        assert_eq!(post.author_handle, "alice");
        assert_eq!(post.hashtags, vec!["launch".to_string()]);
        assert!(post.is_sensitive);
        assert!(!post.is_repost);
    }

    #[test]
    fn test_post_from_boost_reads_boosted_content() {
        let mut inner = TestStatus::new("90", "carol@fosstodon.org");
        inner.tags = vec!["launch", "release"];
        inner.sensitive = true;

        // The wrapper carries no tags and is never marked sensitive
        let mut boost = TestStatus::new("120", "bob");
        boost.reblog = Some(Box::new(inner));

        let post = post_from_status(&boost).unwrap();
        assert_eq!(post.id, 120);
        assert_eq!(post.author_handle, "bob");
        assert!(post.is_repost);
        assert!(post.is_sensitive);
        assert_eq!(
            post.hashtags,
            vec!["launch".to_string(), "release".to_string()]
        );
    }

    #[test]
    fn test_post_from_status_skips_non_numeric_id() {
        let status = TestStatus::new("9ztq7bSbmO2mC5Qt1M", "alice");
        assert!(post_from_status(&status).is_none());
    }

    #[test]
    fn test_parse_rate_limit() {
        let now_utc = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let now = Instant::now();

        let info = parse_rate_limit(Some("0"), Some("2024-05-01T12:05:00.000Z"), now_utc, now)
            .expect("headers should parse");
        assert_eq!(info.remaining, 0);
        assert_eq!(info.reset_at - now, Duration::from_secs(300));
    }

    #[test]
    fn test_parse_rate_limit_reset_in_past() {
        let now_utc = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let now = Instant::now();

        let info = parse_rate_limit(Some("5"), Some("2024-05-01T11:00:00Z"), now_utc, now).unwrap();
        assert_eq!(info.reset_at, now);
    }

    #[test]
    fn test_parse_rate_limit_missing_headers() {
        let now_utc = Utc::now();
        let now = Instant::now();

        assert!(parse_rate_limit(None, Some("2024-05-01T12:05:00Z"), now_utc, now).is_none());
        assert!(parse_rate_limit(Some("10"), None, now_utc, now).is_none());
        assert!(parse_rate_limit(Some("ten"), Some("2024-05-01T12:05:00Z"), now_utc, now).is_none());
        assert!(parse_rate_limit(Some("10"), Some("tomorrow"), now_utc, now).is_none());
    }

    #[test]
    fn test_extract_http_status_patterns() {
        assert_eq!(extract_http_status("HTTP 401 Unauthorized"), Some(401));
        assert_eq!(extract_http_status("status 404 not found"), Some(404));
        assert_eq!(extract_http_status("Error: 422: Unprocessable"), Some(422));
        assert_eq!(extract_http_status("status_code: 429"), Some(429));
        assert_eq!(extract_http_status("Network error"), None);
        assert_eq!(extract_http_status("HTTP 999"), None);
        assert_eq!(extract_http_status("1234"), None);
    }

    #[test]
    fn test_fetch_error_classification() {
        assert!(matches!(
            fetch_error_from_str("HTTP 401 Unauthorized", "home timeline"),
            FetchError::Authentication(_)
        ));
        assert!(matches!(
            fetch_error_from_str("HTTP 429 Too Many Requests", "home timeline"),
            FetchError::RateLimit(_)
        ));
        assert!(matches!(
            fetch_error_from_str("HTTP 503 Service Unavailable", "home timeline"),
            FetchError::Server(_)
        ));
        assert!(matches!(
            fetch_error_from_str("failed to deserialize body", "home timeline"),
            FetchError::InvalidResponse(_)
        ));
        assert!(matches!(
            fetch_error_from_str("connection refused", "home timeline"),
            FetchError::Network(_)
        ));
    }

    #[test]
    fn test_fetch_error_message_includes_context() {
        let error = fetch_error_from_str("connection refused", "home timeline");
        let message = error.to_string();
        assert!(message.contains("home timeline"));
        assert!(message.contains("connection refused"));
    }

    #[test]
    fn test_action_error_classification() {
        assert!(matches!(
            action_error_kind_from_str("HTTP 404 Not Found"),
            ActionErrorKind::NotFound(_)
        ));
        assert!(matches!(
            action_error_kind_from_str("HTTP 403 Forbidden"),
            ActionErrorKind::Authentication(_)
        ));
        assert!(matches!(
            action_error_kind_from_str("HTTP 422 Unprocessable Entity"),
            ActionErrorKind::Rejected(_)
        ));
        assert!(matches!(
            action_error_kind_from_str("rate limit reached"),
            ActionErrorKind::RateLimit(_)
        ));
        assert!(matches!(
            action_error_kind_from_str("HTTP 502 Bad Gateway"),
            ActionErrorKind::Network(_)
        ));
    }
}
