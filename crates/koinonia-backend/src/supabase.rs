//! Hosted auth (GoTrue-style) and row (PostgREST-style) API client.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::RwLock;

use koinonia_core::config::ServiceConfig;
use koinonia_core::events::{AuthEventBroadcaster, AuthEventKind, AuthSubscription};
use koinonia_core::secrets::{Token, scrub_bearer};
use koinonia_core::storage::SessionStorage;
use koinonia_core::types::{Identity, Session};

use crate::query::Query;
use crate::traits::{AuthBackend, BackendError, EntityStore};

/// Client for a hosted auth + row service project.
///
/// Keeps the current session in memory and in `SessionStorage`, and emits an
/// [`koinonia_core::AuthChangeEvent`] on every session transition.
pub struct SupabaseClient {
    http: Client,
    base_url: String,
    anon_key: Token,
    storage: Arc<dyn SessionStorage>,
    storage_key: String,
    events: AuthEventBroadcaster,
    session: RwLock<Option<Session>>,
}

impl SupabaseClient {
    /// Create a client for the project at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Config` if the URL has no host.
    pub fn new(
        base_url: &str,
        anon_key: Token,
        storage: Arc<dyn SessionStorage>,
    ) -> Result<Self, BackendError> {
        let parsed = url::Url::parse(base_url)
            .map_err(|e| BackendError::Config(format!("Invalid service URL '{base_url}': {e}")))?;
        let project_ref = parsed
            .host_str()
            .and_then(|host| host.split('.').next())
            .filter(|label| !label.is_empty())
            .ok_or_else(|| BackendError::Config(format!("Service URL has no host: {base_url}")))?;

        Ok(Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key,
            storage,
            storage_key: format!("sb-{project_ref}-auth-token"),
            events: AuthEventBroadcaster::new(),
            session: RwLock::new(None),
        })
    }

    /// Create a client from service configuration.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Config` if URL or anon key is missing or invalid.
    pub fn from_config(
        config: &ServiceConfig,
        storage: Arc<dyn SessionStorage>,
    ) -> Result<Self, BackendError> {
        let url = config
            .require_url()
            .map_err(|e| BackendError::Config(e.to_string()))?;
        let key = config
            .require_anon_key()
            .map_err(|e| BackendError::Config(e.to_string()))?;
        Self::new(url, Token::new(key), storage)
    }

    /// Key the session is persisted under.
    #[must_use]
    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    /// Exchange the refresh token for a new session.
    ///
    /// Returns `Ok(None)` (and signs out locally) when there is no session to
    /// refresh or the service rejects the refresh token.
    ///
    /// # Errors
    ///
    /// Returns error on network failure or unexpected service errors.
    pub async fn refresh_session(&self) -> Result<Option<Session>, BackendError> {
        let refresh_token = {
            let session = self.session.read().await;
            session.as_ref().and_then(|s| s.refresh_token.clone())
        };

        let Some(refresh_token) = refresh_token else {
            return Ok(None);
        };

        let response = self
            .auth_request(self.http.post(self.auth_url("token")))
            .query(&[("grant_type", "refresh_token")])
            .json(&json!({ "refresh_token": refresh_token.expose() }))
            .send()
            .await?;

        let status = response.status();
        if status.is_client_error() {
            let message = error_message(response).await;
            tracing::warn!(status = status.as_u16(), %message, "Refresh token rejected");
            self.clear_local().await;
            self.events.emit(AuthEventKind::SignedOut, None);
            return Ok(None);
        }

        let session = self.read_token_response(response).await?;
        self.store_session(&session).await?;
        self.events
            .emit(AuthEventKind::TokenRefreshed, Some(session.clone()));
        tracing::debug!(user = %session.user.id, "Session refreshed");
        Ok(Some(session))
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.base_url)
    }

    fn rest_url(&self, collection: &str) -> String {
        format!("{}/rest/v1/{collection}", self.base_url)
    }

    fn auth_request(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header("apikey", self.anon_key.expose())
    }

    async fn rest_request(&self, builder: RequestBuilder) -> RequestBuilder {
        let bearer = {
            let session = self.session.read().await;
            session
                .as_ref()
                .map_or_else(|| self.anon_key.clone(), |s| s.access_token.clone())
        };
        builder
            .header("apikey", self.anon_key.expose())
            .bearer_auth(bearer.expose())
    }

    async fn read_token_response(&self, response: Response) -> Result<Session, BackendError> {
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Api {
                status: status.as_u16(),
                message: error_message(response).await,
            });
        }

        let body: TokenResponse = response.json().await?;
        Ok(body.into_session())
    }

    async fn store_session(&self, session: &Session) -> Result<(), BackendError> {
        let json = serde_json::to_string(session)?;
        self.storage.set(&self.storage_key, &json)?;
        *self.session.write().await = Some(session.clone());
        Ok(())
    }

    fn load_persisted(&self) -> Option<Session> {
        let raw = match self.storage.get(&self.storage_key) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read persisted session");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unreadable persisted session");
                if let Err(e) = self.storage.remove(&self.storage_key) {
                    tracing::warn!(error = %e, "Failed to remove persisted session");
                }
                None
            }
        }
    }

    async fn clear_local(&self) {
        *self.session.write().await = None;
        if let Err(e) = self.storage.remove(&self.storage_key) {
            tracing::warn!(error = %e, "Failed to remove persisted session");
        }
    }

    async fn check(response: Response) -> Result<Response, BackendError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(BackendError::Api {
                status: status.as_u16(),
                message: error_message(response).await,
            })
        }
    }
}

impl std::fmt::Debug for SupabaseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseClient")
            .field("base_url", &self.base_url)
            .field("storage_key", &self.storage_key)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AuthBackend for SupabaseClient {
    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        let in_memory = self.session.read().await.clone();
        let current = match in_memory {
            Some(session) => Some(session),
            None => {
                let persisted = self.load_persisted();
                if let Some(session) = &persisted {
                    *self.session.write().await = Some(session.clone());
                }
                persisted
            }
        };

        match current {
            None => Ok(None),
            Some(session) if session.needs_refresh() && session.refresh_token.is_some() => {
                self.refresh_session().await
            }
            Some(session) if session.is_expired() => {
                tracing::debug!(user = %session.user.id, "Persisted session expired");
                self.clear_local().await;
                Ok(None)
            }
            Some(session) => Ok(Some(session)),
        }
    }

    fn subscribe(&self) -> AuthSubscription {
        self.events.subscribe()
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, BackendError> {
        let response = self
            .auth_request(self.http.post(self.auth_url("token")))
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        let status = response.status();
        if matches!(
            status,
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::UNPROCESSABLE_ENTITY
        ) {
            return Err(BackendError::InvalidCredentials(error_message(response).await));
        }

        let session = self.read_token_response(response).await?;
        self.store_session(&session).await?;
        tracing::info!(user = %session.user.id, "Signed in with password");
        self.events.emit(AuthEventKind::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_in_with_otp(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> Result<(), BackendError> {
        let mut request = self
            .auth_request(self.http.post(self.auth_url("otp")))
            .json(&json!({ "email": email, "create_user": true }));
        if let Some(redirect_to) = redirect_to {
            request = request.query(&[("redirect_to", redirect_to)]);
        }

        let response = request.send().await?;
        let status = response.status();
        if matches!(status, StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY) {
            return Err(BackendError::InvalidCredentials(error_message(response).await));
        }
        Self::check(response).await?;
        tracing::info!("Magic link requested");
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        // Local state goes first so a dropped future cannot leave it behind
        let token = self.session.write().await.take().map(|s| s.access_token);
        if let Err(e) = self.storage.remove(&self.storage_key) {
            tracing::warn!(error = %e, "Failed to remove persisted session");
        }
        self.events.emit(AuthEventKind::SignedOut, None);
        tracing::info!("Signed out locally");

        let Some(token) = token else {
            return Ok(());
        };

        let response = self
            .auth_request(self.http.post(self.auth_url("logout")))
            .bearer_auth(token.expose())
            .send()
            .await?;
        match response.status() {
            // Already invalid on the service side
            StatusCode::UNAUTHORIZED | StatusCode::NOT_FOUND => Ok(()),
            _ => Self::check(response).await.map(|_| ()),
        }
    }
}

#[async_trait]
impl EntityStore for SupabaseClient {
    async fn select(&self, collection: &str, query: &Query) -> Result<Vec<Value>, BackendError> {
        let request = self
            .rest_request(self.http.get(self.rest_url(collection)))
            .await
            .query(&query.to_params());
        let response = Self::check(request.send().await?).await?;
        Ok(response.json().await?)
    }

    async fn insert(&self, collection: &str, row: Value) -> Result<Value, BackendError> {
        let request = self
            .rest_request(self.http.post(self.rest_url(collection)))
            .await
            .header("Prefer", "return=representation")
            .json(&row);
        let response = Self::check(request.send().await?).await?;
        let mut rows: Vec<Value> = response.json().await?;
        if rows.is_empty() {
            return Err(BackendError::Api {
                status: 403,
                message: format!("Insert into {collection} returned no row"),
            });
        }
        Ok(rows.swap_remove(0))
    }

    async fn update(
        &self,
        collection: &str,
        query: &Query,
        patch: Value,
    ) -> Result<Vec<Value>, BackendError> {
        let request = self
            .rest_request(self.http.patch(self.rest_url(collection)))
            .await
            .header("Prefer", "return=representation")
            .query(&query.to_params())
            .json(&patch);
        let response = Self::check(request.send().await?).await?;
        Ok(response.json().await?)
    }

    async fn delete(&self, collection: &str, query: &Query) -> Result<(), BackendError> {
        let params: Vec<(String, String)> = query
            .to_params()
            .into_iter()
            .filter(|(key, _)| key != "select")
            .collect();
        let request = self
            .rest_request(self.http.delete(self.rest_url(collection)))
            .await
            .query(&params);
        Self::check(request.send().await?).await?;
        Ok(())
    }
}

/// Pull a readable message out of an error response.
async fn error_message(response: Response) -> String {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();

    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(ErrorBody::into_message)
        .unwrap_or_else(|| {
            if text.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("Request failed")
                    .to_string()
            } else {
                text
            }
        });

    scrub_bearer(&message)
}

// Auth API types

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: Identity,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .or_else(|| {
                self.expires_in
                    .map(|secs| Utc::now() + chrono::Duration::seconds(secs))
            });

        Session {
            access_token: Token::new(self.access_token),
            refresh_token: self.refresh_token.map(Token::new),
            token_type: self.token_type.unwrap_or_else(|| "bearer".to_string()),
            expires_at,
            user: self.user,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl ErrorBody {
    fn into_message(self) -> Option<String> {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
    }
}
