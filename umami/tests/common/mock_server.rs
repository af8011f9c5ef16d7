#![allow(dead_code)]

use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use time::OffsetDateTime;
use umami::{Credentials, TimeWindowResolver, UmamiClient};
use wiremock::matchers::{body_json, header, method, path, path_regex};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

pub const WEBSITE_ID: &str = "test-website-id";
pub const USERNAME: &str = "testuser";
pub const PASSWORD: &str = "testpass";
pub const TOKEN: &str = "test-token";

/// Fixed "now" used by [`UmamiMock::anchored_client`], in milliseconds.
pub const ANCHOR_MILLIS: i64 = 1_700_000_000_000;
pub const MILLIS_PER_DAY: i64 = 86_400_000;

#[derive(Deserialize)]
pub struct Fixture {
    #[serde(rename = "_meta")]
    pub meta: Option<FixtureMeta>,
    pub request: FixtureRequest,
    pub response: FixtureResponse,
}

#[derive(Deserialize)]
pub struct FixtureMeta {
    pub query: Option<HashMap<String, serde_json::Value>>,
}

#[derive(Deserialize)]
pub struct FixtureRequest {
    pub method: String,
    pub path_pattern: String,
}

#[derive(Deserialize)]
pub struct FixtureResponse {
    pub status_code: u16,
    pub body: serde_json::Value,
}

pub struct UmamiMock {
    pub server: MockServer,
}

impl UmamiMock {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
    }

    /// Accepts the test credentials and hands out [`TOKEN`], expecting
    /// exactly `times` logins.
    pub async fn mount_login(&self, times: u64) {
        self.mount_login_token(TOKEN, times).await;
    }

    pub async fn mount_login_token(&self, token: &str, times: u64) {
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .and(body_json(serde_json::json!({
                "username": USERNAME,
                "password": PASSWORD,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": token,
                "user": { "id": "user-1", "username": USERNAME, "role": "admin" },
            })))
            .expect(times)
            .mount(&self.server)
            .await;
    }

    /// Mounts a fixture and expects it to be hit exactly `times` times.
    /// Authenticated fixtures only match requests carrying [`TOKEN`].
    pub async fn mount_fixture(&self, fixture_path: &str, times: u64) {
        let full_path = Self::fixtures_dir().join(fixture_path);

        let content = fs::read_to_string(&full_path)
            .unwrap_or_else(|e| panic!("Failed to read fixture {}: {}", full_path.display(), e));

        let fixture: Fixture = serde_json::from_str(&content)
            .unwrap_or_else(|e| panic!("Failed to parse fixture {}: {}", full_path.display(), e));

        let mut mock = Mock::given(method(fixture.request.method.as_str()))
            .and(path_regex(&fixture.request.path_pattern));

        if fixture.request.method == "GET" {
            mock = mock.and(header("authorization", format!("Bearer {TOKEN}").as_str()));
        }

        if let Some(meta) = &fixture.meta {
            if let Some(query) = &meta.query {
                for (key, value) in query {
                    if let Some(value) = query_value_to_string(value) {
                        mock = mock.and(query_param_exact(key, value));
                    }
                }
            }
        }

        mock.respond_with(
            ResponseTemplate::new(fixture.response.status_code)
                .set_body_json(&fixture.response.body),
        )
        .expect(times)
        .mount(&self.server)
        .await;
    }

    pub fn client(&self) -> UmamiClient {
        UmamiClient::new(
            self.server.uri(),
            Credentials::new(USERNAME, PASSWORD),
            WEBSITE_ID,
        )
    }

    /// Client whose windows always end at [`ANCHOR_MILLIS`].
    pub fn anchored_client(&self) -> UmamiClient {
        let anchor = OffsetDateTime::from_unix_timestamp(ANCHOR_MILLIS / 1000).unwrap();
        self.client()
            .with_time_window_resolver(TimeWindowResolver::anchored_at(anchor))
    }

    /// Requests received so far, in arrival order.
    pub async fn requests(&self) -> Vec<Request> {
        self.server
            .received_requests()
            .await
            .expect("request recording is enabled")
    }
}

/// Reads one query parameter off a recorded request.
pub fn query_param_of(request: &Request, key: &str) -> Option<String> {
    request
        .url
        .query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// Returns `(startAt, endAt)` of a recorded request.
pub fn window_of(request: &Request) -> (i64, i64) {
    let start = query_param_of(request, "startAt")
        .expect("startAt present")
        .parse()
        .expect("startAt is an integer");
    let end = query_param_of(request, "endAt")
        .expect("endAt present")
        .parse()
        .expect("endAt is an integer");
    (start, end)
}

fn query_value_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(value) => Some(value.clone()),
        serde_json::Value::Number(value) => Some(value.to_string()),
        serde_json::Value::Bool(value) => Some(value.to_string()),
        serde_json::Value::Null => None,
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
    }
}

struct QueryParamExactMatcher {
    key: String,
    expected: String,
}

fn query_param_exact(
    key: impl Into<String>,
    expected: impl Into<String>,
) -> QueryParamExactMatcher {
    QueryParamExactMatcher {
        key: key.into(),
        expected: expected.into(),
    }
}

impl Match for QueryParamExactMatcher {
    fn matches(&self, request: &Request) -> bool {
        let mut values = request
            .url
            .query_pairs()
            .filter(|(k, _)| k == self.key.as_str())
            .map(|(_, v)| v.into_owned());
        matches!((values.next(), values.next()), (Some(value), None) if value == self.expected)
    }
}
