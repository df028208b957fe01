//! Authenticated API client for the dicomview backend.
//!
//! `AuthSession` owns the session state and a pooled `reqwest::Client`.
//! Every request made through it carries the current bearer token, and a
//! 401 answer triggers at most one refresh followed by at most one retry.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::auth::{FileSessionStore, Session, SessionState, SessionStore};
use crate::config::Config;

use super::types::{AuthResponse, Credentials, RefreshRequest, RefreshResponse, SignupRequest, UserInfo};
use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

const LOGIN_PATH: &str = "/api/auth/login";
const SIGNUP_PATH: &str = "/api/auth/signup";
const REFRESH_PATH: &str = "/api/auth/refresh";
const LOGOUT_PATH: &str = "/api/auth/logout";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Method, JSON body and extra headers for `AuthSession::request`.
///
/// Headers set here are applied after the computed `Content-Type` and
/// `Authorization` headers, so an explicit value wins.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub body: Option<serde_json::Value>,
    pub headers: HeaderMap,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            body: None,
            headers: HeaderMap::new(),
        }
    }
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post<B: Serialize + ?Sized>(body: &B) -> Result<Self, ApiError> {
        Ok(Self {
            method: Method::POST,
            body: Some(serde_json::to_value(body)?),
            headers: HeaderMap::new(),
        })
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn header(mut self, name: reqwest::header::HeaderName, value: &str) -> Result<Self, ApiError> {
        self.headers.insert(name, HeaderValue::from_str(value)?);
        Ok(self)
    }
}

/// API client holding the one session for this process.
///
/// Share it by reference or `Arc`; it is `Send + Sync`.
pub struct AuthSession {
    client: Client,
    base_url: String,
    session: Session,
    /// Serializes refresh-and-overwrite so concurrent 401s refresh once.
    refresh_lock: Mutex<()>,
}

impl AuthSession {
    pub fn new(base_url: impl Into<String>, store: impl SessionStore + 'static) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        debug!(base_url = %base_url, "API client created");

        Ok(Self {
            client,
            base_url,
            session: Session::new(store),
            refresh_lock: Mutex::new(()),
        })
    }

    /// Client against the configured base URL, persisting to the cache dir.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let store = FileSessionStore::new(config.cache_dir()?);
        Ok(Self::new(config.api_base_url(), store)?)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn access_token(&self) -> Option<String> {
        self.session.access_token()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    pub fn user(&self) -> UserInfo {
        self.session.user()
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    fn bearer(token: &str) -> Result<HeaderValue, ApiError> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token))?;
        value.set_sensitive(true);
        Ok(value)
    }

    fn auth_headers(token: Option<&str>, extra: &HeaderMap) -> Result<HeaderMap, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(token) = token {
            headers.insert(AUTHORIZATION, Self::bearer(token)?);
        }
        for name in extra.keys() {
            headers.remove(name);
        }
        for (name, value) in extra {
            headers.append(name.clone(), value.clone());
        }
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn parse_json<T: DeserializeOwned>(response: Response, url: &str) -> Result<T, ApiError> {
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", url, e)))
    }

    async fn send(&self, url: &str, options: &RequestOptions, headers: HeaderMap) -> Result<Response, ApiError> {
        let mut builder = self
            .client
            .request(options.method.clone(), url)
            .headers(headers);
        if let Some(ref body) = options.body {
            builder = builder.json(body);
        }
        Ok(builder.send().await?)
    }

    // ===== Authenticated requests =====

    /// Issue a request with the current bearer token and parse the JSON body.
    ///
    /// A 401 triggers one refresh and one retry. If the refresh fails the
    /// session is logged out and `ApiError::AuthenticationFailed` is returned.
    pub async fn request<T: DeserializeOwned>(&self, endpoint: &str, options: RequestOptions) -> Result<T, ApiError> {
        let url = self.url(endpoint);
        let sent_token = self.session.access_token();
        let mut headers = Self::auth_headers(sent_token.as_deref(), &options.headers)?;

        debug!(method = %options.method, endpoint, "Sending request");
        let response = self.send(&url, &options, headers.clone()).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            let response = Self::check_response(response).await?;
            return Self::parse_json(response, &url).await;
        }

        debug!(endpoint, "Access token rejected, refreshing");
        if !self.refresh_after_rejection(sent_token.as_deref()).await {
            warn!(endpoint, "Token refresh failed, logging out");
            self.logout().await;
            return Err(ApiError::AuthenticationFailed);
        }

        match self.session.access_token() {
            Some(token) => {
                headers.insert(AUTHORIZATION, Self::bearer(&token)?);
            }
            None => {
                headers.remove(AUTHORIZATION);
            }
        }

        debug!(method = %options.method, endpoint, "Retrying request with refreshed token");
        let retry = self.send(&url, &options, headers).await?;
        let retry = Self::check_response(retry).await?;
        Self::parse_json(retry, &url).await
    }

    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        self.request(endpoint, RequestOptions::get()).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(&self, endpoint: &str, body: &B) -> Result<T, ApiError> {
        self.request(endpoint, RequestOptions::post(body)?).await
    }

    // ===== Login / signup / logout =====

    async fn authenticate<B: Serialize + ?Sized>(&self, endpoint: &str, body: &B) -> Result<AuthResponse, ApiError> {
        let url = self.url(endpoint);
        let response = self
            .client
            .post(&url)
            .headers(Self::auth_headers(None, &HeaderMap::new())?)
            .json(body)
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        Self::parse_json(response, &url).await
    }

    /// Log in and replace the session with the returned tokens and identity.
    pub async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, ApiError> {
        let auth = self.authenticate(LOGIN_PATH, credentials).await?;
        self.session.replace(SessionState::from(&auth));
        info!(username = %auth.username, expires_in_sec = auth.expires_in_sec, "Login successful");
        Ok(auth)
    }

    /// Create an account; on success the new user is logged in.
    pub async fn signup(&self, request: &SignupRequest) -> Result<AuthResponse, ApiError> {
        let auth = self.authenticate(SIGNUP_PATH, request).await?;
        self.session.replace(SessionState::from(&auth));
        info!(username = %auth.username, "Signup successful");
        Ok(auth)
    }

    /// Exchange the stored refresh token for a new token pair.
    ///
    /// Returns `false` without touching the session when there is no refresh
    /// token or the exchange fails for any reason.
    pub async fn refresh_token(&self) -> bool {
        let _guard = self.refresh_lock.lock().await;
        self.exchange_refresh_token().await
    }

    /// Refresh on behalf of a request that was rejected with `rejected`.
    /// Skips the network call if another task already replaced that token.
    async fn refresh_after_rejection(&self, rejected: Option<&str>) -> bool {
        let _guard = self.refresh_lock.lock().await;
        let current = self.session.access_token();
        if current.is_some() && current.as_deref() != rejected {
            debug!("Access token already refreshed by a concurrent request");
            return true;
        }
        self.exchange_refresh_token().await
    }

    async fn exchange_refresh_token(&self) -> bool {
        let Some(refresh_token) = self.session.refresh_token() else {
            debug!("No refresh token stored");
            return false;
        };

        let result = self
            .client
            .post(self.url(REFRESH_PATH))
            .header(CONTENT_TYPE, "application/json")
            .json(&RefreshRequest {
                refresh_token: &refresh_token,
            })
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Refresh request failed");
                return false;
            }
        };

        if !response.status().is_success() {
            warn!(status = %response.status(), "Refresh token rejected");
            return false;
        }

        match response.json::<RefreshResponse>().await {
            Ok(tokens) => {
                self.session
                    .update_tokens(tokens.access_token, tokens.refresh_token);
                info!("Access token refreshed");
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to parse refresh response");
                false
            }
        }
    }

    /// Notify the server (best effort) and clear the local session.
    ///
    /// The notification is sent once, without refresh-and-retry; its
    /// outcome never affects the local clear. Holds the refresh lock so an
    /// in-flight refresh cannot write tokens back after the clear.
    pub async fn logout(&self) {
        let _guard = self.refresh_lock.lock().await;
        if let Some(refresh_token) = self.session.refresh_token() {
            if let Err(e) = self.notify_logout(&refresh_token).await {
                debug!(error = %e, "Logout notification failed");
            }
        }
        self.session.clear();
        info!("Logged out");
    }

    async fn notify_logout(&self, refresh_token: &str) -> Result<(), ApiError> {
        let headers = Self::auth_headers(self.session.access_token().as_deref(), &HeaderMap::new())?;
        let response = self
            .client
            .post(self.url(LOGOUT_PATH))
            .headers(headers)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await?;
        Self::check_response(response).await?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
