use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::monitor::error::ProviderError;

pub const DEFAULT_BASE_URL: &str = "https://io.adafruit.com/api/v2";

/// Free Adafruit IO accounts accept at most this many data points per minute.
pub const RATE_LIMIT_PER_MINUTE: u32 = 30;

/// Upper bound on one HTTP request, connect and response included.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const KEY_HEADER: &str = "X-AIO-Key";

/// Retry policy for idempotent reads: exponential backoff with jitter.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`
    /// plus up to half of `base` of random jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1 << attempt.saturating_sub(1).min(16));
        let jitter_ms = self.base_delay.as_millis() as u64 / 2;
        let jitter = if jitter_ms > 0 {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        } else {
            Duration::ZERO
        };
        exp + jitter
    }
}

#[derive(Clone)]
pub struct AdafruitClient {
    base_url: String,
    username: String,
    key: Option<String>,
    http: Client,
    retry: RetryPolicy,
    timeout: Duration,
}

/// One feed of a group as reported by `GET /{user}/groups/{group}/feeds`.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedSnapshot {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub last_value: Option<String>,
    #[serde(default)]
    pub last_value_at: Option<String>,
}

impl FeedSnapshot {
    /// Parsed `last_value_at`. Missing or malformed timestamps yield `None`.
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        let raw = self.last_value_at.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|err| {
                tracing::warn!("Feed {} has invalid timestamp '{}': {}", self.key, raw, err);
            })
            .ok()
    }
}

#[derive(Debug, Serialize)]
struct DataRequest<'a> {
    value: &'a str,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

impl AdafruitClient {
    pub fn new(base_url: impl Into<String>, username: impl Into<String>, key: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            username: username.into(),
            key,
            http: Client::new(),
            retry: RetryPolicy::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check the client's credentials against `/user` when it has a key.
    ///
    /// Used at startup: a key that cannot authenticate is fatal. Without a
    /// key the client reads public groups only and nothing is checked.
    pub async fn connect(self) -> Result<Self, ProviderError> {
        if self.key.is_none() {
            tracing::info!(
                "No Adafruit IO key configured, reading public data of user '{}'",
                self.username
            );
            return Ok(self);
        }
        self.verify_credentials().await?;
        tracing::info!("Adafruit IO credentials accepted for user '{}'", self.username);
        Ok(self)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub async fn verify_credentials(&self) -> Result<(), ProviderError> {
        if self.key.is_none() {
            return Err(ProviderError::AuthError {
                message: "no Adafruit IO key configured".into(),
            });
        }

        let url = format!("{}/user", self.base_url);
        let response = self
            .authorize(self.http.get(&url))
            .send()
            .await
            .map_err(|err| ProviderError::network(err.to_string()))?;

        check(response).await.map(|_| ())
    }

    /// All feeds of `group` with their latest value. Retried on transient
    /// failures according to the client's [`RetryPolicy`].
    pub async fn group_feeds(&self, group: &str) -> Result<Vec<FeedSnapshot>, ProviderError> {
        let url = format!("{}/{}/groups/{}/feeds", self.base_url, self.username, group);

        let mut attempt = 1;
        loop {
            match self.fetch_json::<Vec<FeedSnapshot>>(&url).await {
                Ok(feeds) => return Ok(feeds),
                Err(err) if err.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(
                        "Fetching group '{}' failed (attempt {}), retrying in {:?}: {}",
                        group,
                        attempt,
                        delay,
                        err
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Upload one data point to a feed. Not retried: a lost point is
    /// replaced by the next one.
    pub async fn record(
        &self,
        feed_key: &str,
        value: &str,
        created_at: DateTime<Utc>,
    ) -> Result<(), ProviderError> {
        let url = format!("{}/{}/feeds/{}/data", self.base_url, self.username, feed_key);

        let response = self
            .authorize(self.http.post(&url))
            .json(&DataRequest { value, created_at })
            .send()
            .await
            .map_err(|err| ProviderError::network(err.to_string()))?;

        check(response).await.map(|_| ())
    }

    async fn fetch_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T, ProviderError> {
        let response = self
            .authorize(self.http.get(url))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|err| ProviderError::network(err.to_string()))?;

        let response = check(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|err| ProviderError::format(err.to_string()))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.timeout(self.timeout);
        match &self.key {
            Some(key) => request.header(KEY_HEADER, key),
            None => request,
        }
    }
}

/// Map HTTP failures and `{"error": ...}` bodies onto [`ProviderError`].
async fn check(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.error)
        .unwrap_or_else(|| format!("Adafruit IO returned HTTP {}", status));

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::AuthError { message },
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimitExceeded,
        s if s.is_server_error() => ProviderError::ServiceUnavailable,
        _ => ProviderError::ApiError { message },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        matchers::{body_partial_json, header, header_exists, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    const GROUP_FEEDS: &str = r#"[
        {"id": 1, "name": "Tank 1", "key": "fish.tank1", "last_value": "72.4", "last_value_at": "2024-06-01T12:00:00Z"},
        {"id": 2, "name": "Tank 2", "key": "fish.tank2", "last_value": null, "last_value_at": null}
    ]"#;

    fn client(server: &MockServer) -> AdafruitClient {
        AdafruitClient::new(server.uri(), "alice", Some("secret".into())).with_retry(RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        })
    }

    #[tokio::test]
    async fn group_feeds_parses_snapshots() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/alice/groups/fish/feeds"))
            .and(header("X-AIO-Key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(GROUP_FEEDS, "application/json"))
            .mount(&server)
            .await;

        let feeds = client(&server).group_feeds("fish").await.unwrap();

        assert_eq!(feeds.len(), 2);
        assert_eq!(feeds[0].key, "fish.tank1");
        assert_eq!(feeds[0].last_value.as_deref(), Some("72.4"));
        assert!(feeds[0].last_updated().is_some());
        assert!(feeds[1].last_value.is_none());
        assert!(feeds[1].last_updated().is_none());
    }

    #[tokio::test]
    async fn group_feeds_retries_transient_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/alice/groups/fish/feeds"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/alice/groups/fish/feeds"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(GROUP_FEEDS, "application/json"))
            .with_priority(2)
            .mount(&server)
            .await;

        let feeds = client(&server).group_feeds("fish").await.unwrap();
        assert_eq!(feeds.len(), 2);
    }

    #[tokio::test]
    async fn group_feeds_gives_up_after_max_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let err = client(&server).group_feeds("fish").await.unwrap_err();
        assert!(matches!(err, ProviderError::ServiceUnavailable));
    }

    #[tokio::test]
    async fn group_feeds_does_not_retry_api_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(404).set_body_raw(r#"{"error":"not found"}"#, "application/json"),
            )
            .expect(1)
            .mount(&server)
            .await;

        match client(&server).group_feeds("nope").await {
            Err(ProviderError::ApiError { message }) => assert_eq!(message, "not found"),
            other => panic!("expected api error, got {:?}", other.map(|f| f.len())),
        }
    }

    #[tokio::test]
    async fn verify_credentials_rejects_bad_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_raw(r#"{"error":"invalid API key"}"#, "application/json"),
            )
            .mount(&server)
            .await;

        match client(&server).verify_credentials().await {
            Err(ProviderError::AuthError { message }) => assert_eq!(message, "invalid API key"),
            other => panic!("expected auth error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn verify_credentials_requires_a_key() {
        let client = AdafruitClient::new("http://127.0.0.1:1", "alice", None);
        assert!(matches!(
            client.verify_credentials().await,
            Err(ProviderError::AuthError { .. })
        ));
    }

    #[tokio::test]
    async fn connect_succeeds_with_valid_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .and(header("X-AIO-Key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(r#"{"username":"alice"}"#, "application/json"))
            .mount(&server)
            .await;

        let client = AdafruitClient::new(server.uri(), "alice", Some("secret".into()))
            .connect()
            .await
            .unwrap();
        assert_eq!(client.username(), "alice");
    }

    #[tokio::test]
    async fn connect_without_key_reads_public_group() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(ResponseTemplate::new(401))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/alice/groups/fish/feeds"))
            .and(header_exists(KEY_HEADER))
            .respond_with(ResponseTemplate::new(403))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/alice/groups/fish/feeds"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(GROUP_FEEDS, "application/json"))
            .with_priority(2)
            .mount(&server)
            .await;

        let client = AdafruitClient::new(server.uri(), "alice", None)
            .connect()
            .await
            .unwrap();
        let feeds = client.group_feeds("fish").await.unwrap();

        assert_eq!(feeds.len(), 2);
    }

    #[tokio::test]
    async fn slow_response_times_out_as_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(GROUP_FEEDS, "application/json")
                    .set_delay(Duration::from_secs(30)),
            )
            .mount(&server)
            .await;

        let err = AdafruitClient::new(server.uri(), "alice", None)
            .with_retry(RetryPolicy::none())
            .with_timeout(Duration::from_millis(100))
            .group_feeds("fish")
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::NetworkError { .. }));
    }

    #[tokio::test]
    async fn record_posts_value_to_feed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/alice/feeds/fish.tank1/data"))
            .and(body_partial_json(serde_json::json!({ "value": "72.125" })))
            .respond_with(ResponseTemplate::new(200).set_body_raw("{}", "application/json"))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .record("fish.tank1", "72.125", Utc::now())
            .await
            .unwrap();
    }

    #[test]
    fn retry_delay_grows_exponentially() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
        };
        let first = policy.delay_for(1);
        let third = policy.delay_for(3);

        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(150));
        assert!(third >= Duration::from_millis(400) && third <= Duration::from_millis(450));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = AdafruitClient::new("https://io.adafruit.com/api/v2/", "alice", None);
        assert_eq!(client.base_url(), DEFAULT_BASE_URL);
    }
}
