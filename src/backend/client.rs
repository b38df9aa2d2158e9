//! Parse Server REST client with safe request logging.

use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{info, warn};
use url::Url;

use super::{
    Actor, EntityKind, EntityService, Record, SearchQuery, ServiceFuture, Session,
    VisibilityPolicy,
};
use crate::error::AppError;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// User agent string for all backend requests.
const CLIENT_USER_AGENT: &str = concat!("menu-loader/", env!("CARGO_PKG_VERSION"));

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Records requested per search page.
const PAGE_SIZE: usize = 1000;

/// Fields maintained by the server that must never be sent back on update.
const READ_ONLY_FIELDS: &[&str] = &["objectId", "createdAt", "updatedAt", "sessionToken"];

/// Query parameter keys (case-insensitive) that should have their values redacted.
const SENSITIVE_QUERY_PARAMS: &[&str] = &["where", "password", "sessiontoken", "masterkey"];

// ─────────────────────────────────────────────────────────────────────────────
// LoggingMode
// ─────────────────────────────────────────────────────────────────────────────

/// Controls how URLs are sanitized for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoggingMode {
    /// Log only the path component. Strips scheme, host, query, and fragment.
    /// Example: `/parse/classes/Tag`
    #[default]
    PathOnly,

    /// Log path and query parameters, but redact sensitive values.
    /// Example: `/parse/classes/Tag?where=***&limit=1000`
    PathAndQueryRedacted,
}

/// Determines if a query parameter key is sensitive and should be redacted.
fn is_sensitive_param(key: &str) -> bool {
    let key_lower = key.to_ascii_lowercase();
    SENSITIVE_QUERY_PARAMS
        .iter()
        .any(|&sensitive| key_lower == sensitive)
}

/// Sanitizes a URL for safe logging based on the specified mode.
///
/// The result never contains the scheme, host, or fragment. Search criteria
/// (`where`) carry user data and are always redacted.
pub fn sanitize_url_for_logs(url: &Url, mode: LoggingMode) -> String {
    let path = url.path();

    match mode {
        LoggingMode::PathOnly => path.to_string(),
        LoggingMode::PathAndQueryRedacted => {
            let query_pairs: Vec<_> = url.query_pairs().collect();
            if query_pairs.is_empty() {
                return path.to_string();
            }

            let redacted_pairs: Vec<String> = query_pairs
                .into_iter()
                .map(|(key, value)| {
                    if is_sensitive_param(&key) {
                        format!("{}=***", key)
                    } else {
                        format!("{}={}", key, value)
                    }
                })
                .collect();

            format!("{}?{}", path, redacted_pairs.join("&"))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire Types
// ─────────────────────────────────────────────────────────────────────────────

/// Search response: `{"results": [...]}`.
#[derive(Debug, Deserialize)]
struct WireResults {
    results: Vec<Map<String, Value>>,
}

/// Create response: `{"objectId": "...", "createdAt": "..."}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCreated {
    object_id: String,
}

/// Login response. Only the token is kept.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireLogin {
    session_token: String,
}

/// Parse error body: `{"code": 101, "error": "Object not found."}`.
#[derive(Debug, Deserialize)]
struct WireError {
    code: i64,
    error: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// ParseClient
// ─────────────────────────────────────────────────────────────────────────────

/// HTTP client for a Parse Server REST API.
///
/// Holds no credentials: the [`Session`] travels with each call.
#[derive(Clone)]
pub struct ParseClient {
    /// The underlying HTTP client.
    http: reqwest::Client,
    /// Server mount point, always ending in `/`.
    base_url: Url,
    /// Controls URL sanitization for logging.
    logging_mode: LoggingMode,
}

impl ParseClient {
    /// Creates a client for the server mounted at `server_url`
    /// (e.g. `http://localhost:1337/parse`).
    ///
    /// # Errors
    ///
    /// - `AppError::InvalidServerUrl` if the URL cannot be parsed
    /// - `AppError::Internal` if the HTTP client fails to initialize
    pub fn new(server_url: &str) -> Result<Self, AppError> {
        let mut base_url =
            Url::parse(server_url).map_err(|_| AppError::InvalidServerUrl(server_url.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::InvalidServerUrl(server_url.to_string()));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            http: build_http_client()?,
            base_url,
            logging_mode: LoggingMode::default(),
        })
    }

    /// Updates the logging mode for URL sanitization.
    pub fn with_logging_mode(mut self, mode: LoggingMode) -> Self {
        self.logging_mode = mode;
        self
    }

    /// Logs in as a user and returns a session carrying the session token.
    ///
    /// # Errors
    ///
    /// - `AppError::LoginFailed` - wrong username or password
    /// - `AppError::ConnectionFailed` - network error
    pub async fn log_in(
        &self,
        session: &Session,
        username: &str,
        password: &SecretString,
    ) -> Result<Session, AppError> {
        let mut url = self.build_url("login")?;
        url.query_pairs_mut()
            .append_pair("username", username)
            .append_pair("password", password.expose_secret());

        let response = self.send(session, Method::GET, url, None).await?;
        let login: WireLogin = match parse_json(response).await {
            Ok(login) => login,
            Err(AppError::Backend { message, .. }) => return Err(AppError::LoginFailed(message)),
            Err(e) => return Err(e),
        };

        info!("[BACKEND] Logged in as {}", username);
        Ok(session
            .clone()
            .with_session_token(SecretString::from(login.session_token)))
    }

    /// Builds a full URL by joining a relative path with the server mount point.
    fn build_url(&self, path: &str) -> Result<Url, AppError> {
        self.base_url
            .join(path)
            .map_err(|_| AppError::Internal(format!("Invalid path: {}", path)))
    }

    /// Relative endpoint path for a kind. Users live outside `classes/`.
    fn collection_path(kind: EntityKind) -> String {
        match kind {
            EntityKind::User => "users".to_string(),
            other => format!("classes/{}", other.class_name()),
        }
    }

    async fn search_records(
        &self,
        session: &Session,
        query: &SearchQuery,
    ) -> Result<Vec<Record>, AppError> {
        let where_clause = query.to_where().to_string();
        let mut records = Vec::new();
        let mut skip = 0usize;

        // Page until the server returns a short page.
        loop {
            let mut url = self.build_url(&Self::collection_path(query.kind))?;
            url.query_pairs_mut()
                .append_pair("where", &where_clause)
                .append_pair("limit", &PAGE_SIZE.to_string())
                .append_pair("skip", &skip.to_string());

            let response = self.send(session, Method::GET, url, None).await?;
            let page: WireResults = parse_json(response).await?;
            let page_len = page.results.len();

            for fields in page.results {
                records.push(into_record(fields)?);
            }

            if page_len < PAGE_SIZE {
                break;
            }
            skip += page_len;
        }

        Ok(records)
    }

    async fn find_user(&self, session: &Session, username: &str) -> Result<Option<Actor>, AppError> {
        let query = SearchQuery::new(EntityKind::User).matching("username", username);
        let mut users = self.search_records(session, &query).await?;

        if users.len() > 1 {
            warn!("[BACKEND] {} users share username {}", users.len(), username);
        }

        Ok(users.pop().map(|user| Actor::new(user.id, username)))
    }

    async fn create_record(
        &self,
        session: &Session,
        kind: EntityKind,
        mut fields: Map<String, Value>,
        policy: Option<&VisibilityPolicy>,
        owner: Option<&Actor>,
    ) -> Result<Record, AppError> {
        if let Some(policy) = policy {
            fields.insert("ACL".to_string(), policy.to_acl(owner));
        }

        let url = self.build_url(&Self::collection_path(kind))?;
        let response = self
            .send(session, Method::POST, url, Some(Value::Object(fields.clone())))
            .await?;
        let created: WireCreated = parse_json(response).await?;

        // Never keep a plaintext password in the returned record.
        fields.remove("password");
        Ok(Record::new(created.object_id, fields))
    }

    async fn update_record(
        &self,
        session: &Session,
        kind: EntityKind,
        record: &Record,
    ) -> Result<Record, AppError> {
        let body: Map<String, Value> = record
            .fields
            .iter()
            .filter(|(key, _)| !READ_ONLY_FIELDS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        let path = format!("{}/{}", Self::collection_path(kind), record.id);
        let url = self.build_url(&path)?;
        let response = self
            .send(session, Method::PUT, url, Some(Value::Object(body)))
            .await?;
        let _: Value = parse_json(response).await?;

        Ok(record.clone())
    }

    /// Executes a single request with the session headers attached.
    ///
    /// Logs method, sanitized path, status, duration and request id; never
    /// headers or bodies.
    async fn send(
        &self,
        session: &Session,
        method: Method,
        url: Url,
        body: Option<Value>,
    ) -> Result<reqwest::Response, AppError> {
        let start = Instant::now();
        let sanitized_url = sanitize_url_for_logs(&url, self.logging_mode);

        let mut request = self
            .http
            .request(method.clone(), url.as_str())
            .header("X-Parse-Application-Id", &session.application_id);

        if let Some(key) = &session.javascript_key {
            request = request.header("X-Parse-Javascript-Key", key.expose_secret());
        }
        if let Some(key) = &session.master_key {
            request = request.header("X-Parse-Master-Key", key.expose_secret());
        }
        if let Some(token) = &session.session_token {
            request = request.header("X-Parse-Session-Token", token.expose_secret());
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let result = request.send().await;
        let duration_ms = start.elapsed().as_millis();

        match result {
            Ok(response) => {
                let status = response.status();
                let x_request_id = response
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");

                info!(
                    "[BACKEND] {} {} {} {}ms {}",
                    method,
                    sanitized_url,
                    status.as_u16(),
                    duration_ms,
                    x_request_id
                );

                Ok(response)
            }
            Err(_) => {
                // The raw reqwest error may embed the full URL, so it is dropped.
                info!(
                    "[BACKEND] {} {} FAILED {}ms",
                    method, sanitized_url, duration_ms
                );
                Err(AppError::ConnectionFailed(
                    "Connection to backend failed".to_string(),
                ))
            }
        }
    }
}

impl EntityService for ParseClient {
    fn find_actor<'a>(
        &'a self,
        session: &'a Session,
        username: &'a str,
    ) -> ServiceFuture<'a, Option<Actor>> {
        Box::pin(self.find_user(session, username))
    }

    fn search<'a>(
        &'a self,
        session: &'a Session,
        query: &'a SearchQuery,
    ) -> ServiceFuture<'a, Vec<Record>> {
        Box::pin(self.search_records(session, query))
    }

    fn create<'a>(
        &'a self,
        session: &'a Session,
        kind: EntityKind,
        fields: Map<String, Value>,
        policy: Option<&'a VisibilityPolicy>,
        owner: Option<&'a Actor>,
    ) -> ServiceFuture<'a, Record> {
        Box::pin(self.create_record(session, kind, fields, policy, owner))
    }

    fn update<'a>(
        &'a self,
        session: &'a Session,
        kind: EntityKind,
        record: &'a Record,
    ) -> ServiceFuture<'a, Record> {
        Box::pin(self.update_record(session, kind, record))
    }
}

/// Maps a response to `T`, or to an `AppError` for non-success statuses.
async fn parse_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, AppError> {
    let status = response.status();

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(AppError::NotAuthenticated);
    }

    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("Unable to read error body"));

        if let Ok(error) = serde_json::from_str::<WireError>(&body) {
            return Err(AppError::Backend {
                code: error.code,
                message: error.error,
            });
        }

        return Err(AppError::Backend {
            code: i64::from(status.as_u16()),
            message: status.canonical_reason().unwrap_or("Unknown error").to_string(),
        });
    }

    response
        .json()
        .await
        .map_err(|e| AppError::UnexpectedResponse(format!("Failed to parse response: {}", e)))
}

/// Splits a wire object into a [`Record`].
fn into_record(mut fields: Map<String, Value>) -> Result<Record, AppError> {
    let id = match fields.remove("objectId") {
        Some(Value::String(id)) => id,
        _ => {
            return Err(AppError::UnexpectedResponse(
                "record without objectId".to_string(),
            ))
        }
    };
    Ok(Record::new(id, fields))
}

/// Builds the configured HTTP client.
fn build_http_client() -> Result<reqwest::Client, AppError> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ActorField;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_session() -> Session {
        Session::new("test-app").with_master_key("test-master")
    }

    // ─────────────────────────────────────────────────────────────────────────
    // URL Sanitization
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn sanitize_strips_scheme_and_host() {
        let url = Url::parse("https://api.example.com/parse/classes/Tag").unwrap();

        let result = sanitize_url_for_logs(&url, LoggingMode::PathOnly);

        assert_eq!(result, "/parse/classes/Tag");
        assert!(!result.contains("api.example.com"));
    }

    #[test]
    fn path_and_query_redacted_hides_search_criteria() {
        let url = Url::parse(
            "https://api.example.com/parse/classes/Tag?where=%7B%22name%22%3A1%7D&limit=1000",
        )
        .unwrap();

        let result = sanitize_url_for_logs(&url, LoggingMode::PathAndQueryRedacted);

        assert_eq!(result, "/parse/classes/Tag?where=***&limit=1000");
    }

    #[test]
    fn path_and_query_redacted_hides_login_password() {
        let url =
            Url::parse("https://api.example.com/parse/login?username=bob&password=hunter2").unwrap();

        let result = sanitize_url_for_logs(&url, LoggingMode::PathAndQueryRedacted);

        assert!(result.contains("username=bob"));
        assert!(!result.contains("hunter2"));
    }

    #[test]
    fn new_rejects_invalid_url_and_appends_slash() {
        assert!(matches!(
            ParseClient::new("not a url"),
            Err(AppError::InvalidServerUrl(_))
        ));

        let client = ParseClient::new("http://localhost:1337/parse").unwrap();
        assert_eq!(client.base_url.path(), "/parse/");
        let url = client.build_url("classes/Tag").unwrap();
        assert_eq!(url.path(), "/parse/classes/Tag");
    }

    // ─────────────────────────────────────────────────────────────────────────
    // HTTP behavior
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn search_sends_headers_and_where_clause() {
        let mock_server = MockServer::start().await;
        let client = ParseClient::new(&format!("{}/parse", mock_server.uri())).unwrap();
        let owner = Actor::new("u1", "owner");

        let query = SearchQuery::new(EntityKind::Tag)
            .scoped(ActorField::OwnedBy, &owner)
            .matching("name.en_NZ", "Spicy");

        Mock::given(method("GET"))
            .and(path("/parse/classes/Tag"))
            .and(header("X-Parse-Application-Id", "test-app"))
            .and(header("X-Parse-Master-Key", "test-master"))
            .and(query_param("where", query.to_where().to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    { "objectId": "t1", "name": { "en_NZ": "Spicy" }, "createdAt": "2020-01-01T00:00:00.000Z" }
                ]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let records = client.search(&test_session(), &query).await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "t1");
        assert_eq!(records[0].str_at("name.en_NZ"), Some("Spicy"));
        assert!(records[0].fields.get("objectId").is_none());
    }

    #[tokio::test]
    async fn search_follows_pages_until_short_page() {
        let mock_server = MockServer::start().await;
        let client = ParseClient::new(&mock_server.uri()).unwrap();

        let full_page: Vec<Value> = (0..PAGE_SIZE)
            .map(|i| json!({ "objectId": format!("s{}", i) }))
            .collect();

        Mock::given(method("GET"))
            .and(path("/classes/Size"))
            .and(query_param("skip", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": full_page })))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/classes/Size"))
            .and(query_param("skip", PAGE_SIZE.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{ "objectId": "last" }]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let records = client
            .search(&test_session(), &SearchQuery::new(EntityKind::Size))
            .await
            .unwrap();

        assert_eq!(records.len(), PAGE_SIZE + 1);
        assert_eq!(records.last().unwrap().id, "last");
    }

    #[tokio::test]
    async fn create_attaches_acl_and_returns_object_id() {
        let mock_server = MockServer::start().await;
        let client = ParseClient::new(&mock_server.uri()).unwrap();
        let owner = Actor::new("u1", "owner");

        Mock::given(method("POST"))
            .and(path("/classes/Tag"))
            .and(body_partial_json(json!({
                "name": { "en_NZ": "Spicy" },
                "ACL": { "*": { "read": true }, "u1": { "read": true, "write": true } }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "objectId": "new1", "createdAt": "2020-01-01T00:00:00.000Z"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let fields = json!({ "name": { "en_NZ": "Spicy" } }).as_object().cloned().unwrap();
        let policy = VisibilityPolicy::public_read();
        let record = client
            .create(&test_session(), EntityKind::Tag, fields, Some(&policy), Some(&owner))
            .await
            .unwrap();

        assert_eq!(record.id, "new1");
    }

    #[tokio::test]
    async fn update_puts_to_object_path_without_read_only_fields() {
        let mock_server = MockServer::start().await;
        let client = ParseClient::new(&mock_server.uri()).unwrap();

        Mock::given(method("PUT"))
            .and(path("/classes/Menu/m1"))
            .and(body_partial_json(json!({ "menuPageUrl": "https://x" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "updatedAt": "2020-01-02T00:00:00.000Z"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let fields = json!({
            "menuPageUrl": "https://x",
            "createdAt": "2020-01-01T00:00:00.000Z",
        })
        .as_object()
        .cloned()
        .unwrap();
        let record = Record::new("m1", fields);

        client
            .update(&test_session(), EntityKind::Menu, &record)
            .await
            .unwrap();

        let requests = mock_server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(body.get("createdAt").is_none());
    }

    #[tokio::test]
    async fn find_actor_queries_users_endpoint() {
        let mock_server = MockServer::start().await;
        let client = ParseClient::new(&mock_server.uri()).unwrap();

        Mock::given(method("GET"))
            .and(path("/users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{ "objectId": "u7", "username": "owner" }]
            })))
            .mount(&mock_server)
            .await;

        let actor = client
            .find_actor(&test_session(), "owner")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(actor, Actor::new("u7", "owner"));
    }

    #[tokio::test]
    async fn backend_error_body_is_mapped() {
        let mock_server = MockServer::start().await;
        let client = ParseClient::new(&mock_server.uri()).unwrap();

        Mock::given(method("GET"))
            .and(path("/classes/Tag"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "code": 102, "error": "Invalid key name"
            })))
            .mount(&mock_server)
            .await;

        let err = client
            .search(&test_session(), &SearchQuery::new(EntityKind::Tag))
            .await
            .unwrap_err();

        match err {
            AppError::Backend { code, message } => {
                assert_eq!(code, 102);
                assert_eq!(message, "Invalid key name");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn unauthorized_maps_to_not_authenticated() {
        let mock_server = MockServer::start().await;
        let client = ParseClient::new(&mock_server.uri()).unwrap();

        Mock::given(method("GET"))
            .and(path("/classes/Tag"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "error": "unauthorized" })))
            .mount(&mock_server)
            .await;

        let err = client
            .search(&test_session(), &SearchQuery::new(EntityKind::Tag))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::NotAuthenticated));
    }

    #[tokio::test]
    async fn log_in_returns_session_with_token() {
        let mock_server = MockServer::start().await;
        let client = ParseClient::new(&mock_server.uri()).unwrap();

        Mock::given(method("GET"))
            .and(path("/login"))
            .and(query_param("username", "owner"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "objectId": "u1", "username": "owner", "sessionToken": "r:abc"
            })))
            .mount(&mock_server)
            .await;

        let session = client
            .log_in(
                &test_session(),
                "owner",
                &SecretString::from("pw".to_string()),
            )
            .await
            .unwrap();

        assert_eq!(
            session.session_token.as_ref().map(|t| t.expose_secret().to_string()),
            Some("r:abc".to_string())
        );
    }

    #[tokio::test]
    async fn log_in_failure_maps_to_login_failed() {
        let mock_server = MockServer::start().await;
        let client = ParseClient::new(&mock_server.uri()).unwrap();

        Mock::given(method("GET"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "code": 101, "error": "Invalid username/password."
            })))
            .mount(&mock_server)
            .await;

        let err = client
            .log_in(&test_session(), "owner", &SecretString::from("bad".to_string()))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::LoginFailed(_)));
    }

    #[tokio::test]
    async fn connection_failure_is_sanitized() {
        // Nothing listens on port 9 (discard); the request fails at transport level.
        let client = ParseClient::new("http://127.0.0.1:9/parse").unwrap();

        let err = client
            .search(&test_session(), &SearchQuery::new(EntityKind::Tag))
            .await
            .unwrap_err();

        match err {
            AppError::ConnectionFailed(msg) => assert!(!msg.contains("127.0.0.1")),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
