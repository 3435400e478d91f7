//! Authenticated API client
//!
//! Wraps a `reqwest::Client` with bearer-token injection and the
//! refresh-and-replay protocol: a 401 on a fresh, replayable request marks it
//! retried, runs a single-flight refresh against the auth server, and resends
//! the request once with the replaced credentials. Every other status passes
//! through to the caller unmodified.

use std::sync::Arc;

use bytes::Bytes;
use reqwest::{
    Client, Method, Response, StatusCode,
    header::{HeaderName, HeaderValue},
};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};
use url::Url;

use super::refresh::RefreshGate;
use super::session::{Principal, SessionStore, TokenGrant};
use crate::config::Config;
use crate::{Error, RefreshError, Result};

/// Body of an outbound request
enum ApiBody {
    /// Buffered payload, cloned per attempt and safe to replay
    Buffered(Bytes),
    /// One-shot stream, sent at most once and never replayed
    Stream(reqwest::Body),
}

/// Outbound request descriptor.
///
/// Built once per call and consumed by [`ApiClient::execute`]; the `retried`
/// flag caps replays at exactly one.
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: Vec<(HeaderName, HeaderValue)>,
    body: Option<ApiBody>,
    /// Set when the body is a one-shot stream; such requests are never replayed
    one_shot: bool,
    retried: bool,
}

impl ApiRequest {
    /// Start a request descriptor
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            one_shot: false,
            retried: false,
        }
    }

    /// GET request
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// POST request
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Append a query pair. Repeated keys are preserved in order.
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Add a request header
    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.push((name, value));
        self
    }

    /// Attach a buffered byte payload (replayable)
    #[must_use]
    pub fn bytes(mut self, payload: impl Into<Bytes>) -> Self {
        self.body = Some(ApiBody::Buffered(payload.into()));
        self.one_shot = false;
        self
    }

    /// Attach a JSON payload (replayable)
    pub fn json<T: Serialize>(mut self, value: &T) -> Result<Self> {
        let payload = serde_json::to_vec(value)?;
        self.headers.push((
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        ));
        self.body = Some(ApiBody::Buffered(Bytes::from(payload)));
        self.one_shot = false;
        Ok(self)
    }

    /// Attach a one-shot streamed body.
    ///
    /// The stream is consumed by the first send, so the request is never
    /// replayed: a 401 is surfaced to the caller instead of risking a
    /// duplicated side effect.
    #[must_use]
    pub fn stream(mut self, body: reqwest::Body) -> Self {
        self.body = Some(ApiBody::Stream(body));
        self.one_shot = true;
        self
    }

    /// Whether this request can be safely resent
    fn replayable(&self) -> bool {
        !self.one_shot
    }
}

/// HTTP client with bearer injection and transparent credential refresh
pub struct ApiClient {
    http: Client,
    api_base: Url,
    auth_base: Url,
    token_path: String,
    refresh_path: String,
    session: Arc<SessionStore>,
    gate: RefreshGate,
}

impl ApiClient {
    /// Create a client against `api_base`, using the same origin and the
    /// default paths for the auth endpoints.
    #[must_use]
    pub fn new(http: Client, api_base: Url, session: Arc<SessionStore>) -> Self {
        Self {
            http,
            auth_base: api_base.clone(),
            api_base,
            token_path: "/auth/token".to_string(),
            refresh_path: "/auth/refresh".to_string(),
            session,
            gate: RefreshGate::new(),
        }
    }

    /// Create a client from the gateway configuration
    pub fn from_config(http: Client, config: &Config, session: Arc<SessionStore>) -> Result<Self> {
        let api_base = Url::parse(&config.upstream.base_url)
            .map_err(|e| Error::Config(format!("Invalid upstream base URL: {e}")))?;
        let auth_base = Url::parse(config.auth_base_url())
            .map_err(|e| Error::Config(format!("Invalid auth base URL: {e}")))?;

        let mut client = Self::new(http, api_base, session);
        client.auth_base = auth_base;
        client.token_path.clone_from(&config.auth.token_path);
        client.refresh_path.clone_from(&config.auth.refresh_path);
        Ok(client)
    }

    /// Point the auth endpoints at a different origin
    #[must_use]
    pub fn with_auth_base(mut self, auth_base: Url) -> Self {
        self.auth_base = auth_base;
        self
    }

    /// The session store this client reads tokens from
    #[must_use]
    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    /// Execute a request with bearer injection and refresh-and-replay.
    ///
    /// Returns `Ok` with the terminal response for every completed exchange,
    /// including non-2xx statuses, which pass through unmodified. A 401 that
    /// survives the protocol (anonymous session, one-shot body, or a second
    /// 401 after replay) is returned as-is and means the session is dead.
    ///
    /// # Errors
    ///
    /// [`Error::Transport`] when the backend is unreachable and
    /// [`Error::RefreshFailed`] when the refresh endpoint rejects or cannot
    /// be reached -- distinct so callers can clear the session and force a
    /// re-login only for the latter.
    pub async fn execute(&self, mut request: ApiRequest) -> Result<Response> {
        loop {
            let response = self.dispatch(&mut request).await?;

            if response.status() != StatusCode::UNAUTHORIZED || request.retried {
                return Ok(response);
            }
            if !request.replayable() {
                debug!(path = %request.path, "401 on one-shot body; surfacing without replay");
                return Ok(response);
            }
            if self.session.refresh_token().is_none() {
                debug!(path = %request.path, "401 without a refresh token; surfacing");
                return Ok(response);
            }

            // Expired credential: one refresh, one replay.
            request.retried = true;
            self.refresh().await?;
            debug!(path = %request.path, "Replaying request with refreshed credentials");
        }
    }

    /// Send one attempt, injecting the bearer token current at dispatch time.
    async fn dispatch(&self, request: &mut ApiRequest) -> Result<Response> {
        let url = join_url(&self.api_base, &request.path);
        let mut builder = self.http.request(request.method.clone(), url);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(token) = self.session.access_token() {
            builder = builder.bearer_auth(token);
        }

        match request.body.take() {
            Some(ApiBody::Buffered(payload)) => {
                builder = builder.body(payload.clone());
                // Put the buffered payload back for a possible replay.
                request.body = Some(ApiBody::Buffered(payload));
            }
            Some(ApiBody::Stream(stream)) => {
                // The stream leaves for good; it can only be sent once.
                builder = builder.body(stream);
            }
            None => {}
        }

        Ok(builder.send().await?)
    }

    /// Run the single-flight refresh and map its outcome into the crate error.
    async fn refresh(&self) -> Result<()> {
        let http = self.http.clone();
        let session = Arc::clone(&self.session);
        let url = join_url(&self.auth_base, &self.refresh_path);

        self.gate
            .run(async move { run_refresh(http, url, session).await })
            .await
            .map_err(|e| {
                warn!(error = %e, "Credential refresh failed");
                Error::RefreshFailed(e)
            })
    }

    /// Log in with username/password and store the issued credential pair.
    ///
    /// # Errors
    ///
    /// [`Error::AuthRejected`] when the auth server answers non-2xx (401 for
    /// bad credentials), [`Error::Transport`] when it is unreachable.
    pub async fn login(&self, username: &str, password: &str) -> Result<Option<Principal>> {
        let url = join_url(&self.auth_base, &self.token_path);
        let response = self
            .http
            .post(url)
            .json(&json!({"username": username, "password": password}))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::AuthRejected(response.status().as_u16()));
        }

        let grant: TokenGrant = response.json().await?;
        let principal = grant.principal.clone();
        self.session.replace(grant.into());
        info!(username = %username, "Logged in");
        Ok(principal)
    }

    /// Clear the session
    pub fn logout(&self) {
        self.session.clear();
        info!("Logged out");
    }
}

/// Exchange the current refresh token for a new credential pair.
///
/// The refresh token is read at execution time, never captured earlier, so a
/// coalesced refresh always sends the latest one. The session is only touched
/// on success; on failure the credential pair is left exactly as it was.
async fn run_refresh(
    http: Client,
    url: String,
    session: Arc<SessionStore>,
) -> std::result::Result<(), RefreshError> {
    let Some(refresh_token) = session.refresh_token() else {
        return Err(RefreshError::MissingToken);
    };

    let response = http
        .post(url)
        .json(&json!({"refreshToken": refresh_token}))
        .send()
        .await
        .map_err(|e| RefreshError::Transport(e.to_string()))?;

    if !response.status().is_success() {
        return Err(RefreshError::Rejected(response.status().as_u16()));
    }

    let grant: TokenGrant = response
        .json()
        .await
        .map_err(|e| RefreshError::Transport(e.to_string()))?;

    session.replace(grant.into());
    debug!("Credential pair replaced after refresh");
    Ok(())
}

/// Join a base URL and a path without re-encoding either part
fn join_url(base: &Url, path: &str) -> String {
    format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    // ── Request descriptor ─────────────────────────────────────────────

    #[test]
    fn new_request_starts_unretried() {
        let request = ApiRequest::get("/boards");
        assert!(!request.retried);
        assert!(request.replayable());
    }

    #[test]
    fn query_preserves_repeated_keys() {
        let request = ApiRequest::get("/cards")
            .query("tag", "a")
            .query("tag", "b")
            .query("sort", "desc");
        assert_eq!(
            request.query,
            vec![
                ("tag".to_string(), "a".to_string()),
                ("tag".to_string(), "b".to_string()),
                ("sort".to_string(), "desc".to_string()),
            ]
        );
    }

    #[test]
    fn json_body_is_replayable_and_typed() {
        let request = ApiRequest::post("/boards")
            .json(&serde_json::json!({"name": "Sprint 12"}))
            .unwrap();
        assert!(request.replayable());
        assert!(
            request
                .headers
                .iter()
                .any(|(name, value)| name == reqwest::header::CONTENT_TYPE
                    && value == "application/json")
        );
        assert!(matches!(request.body, Some(ApiBody::Buffered(_))));
    }

    #[test]
    fn streamed_body_is_not_replayable() {
        let request = ApiRequest::post("/attachments").stream(reqwest::Body::from("payload"));
        assert!(!request.replayable());
    }

    // ── URL joining ────────────────────────────────────────────────────

    #[test]
    fn join_url_handles_slashes() {
        let base = Url::parse("http://api:8080/v1/").unwrap();
        assert_eq!(join_url(&base, "/boards/42"), "http://api:8080/v1/boards/42");
        assert_eq!(join_url(&base, "boards/42"), "http://api:8080/v1/boards/42");
    }

    #[test]
    fn from_config_resolves_auth_base() {
        let mut config = Config::default();
        config.upstream.base_url = "http://api:8080".to_string();
        config.auth.base_url = Some("http://auth:9000".to_string());

        let client = ApiClient::from_config(
            Client::new(),
            &config,
            Arc::new(SessionStore::new()),
        )
        .unwrap();
        assert_eq!(client.api_base.as_str(), "http://api:8080/");
        assert_eq!(client.auth_base.as_str(), "http://auth:9000/");
        assert_eq!(client.refresh_path, "/auth/refresh");
    }
}
