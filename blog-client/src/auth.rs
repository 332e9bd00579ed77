use async_trait::async_trait;
use blog_feed::DomainError;
use blog_feed::data::identity::{IdentityProvider, RoleStore};
use blog_feed::domain::user::{Credentials, Session, UserRole};
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use crate::BackendClient;
use crate::http_client::{HttpClient, Prefer, eq};

#[derive(Debug, Serialize)]
struct CredentialsDto<'a> {
    email: &'a str,
    password: &'a str,
}

impl<'a> From<&'a Credentials> for CredentialsDto<'a> {
    fn from(value: &'a Credentials) -> Self {
        Self {
            email: &value.email,
            password: &value.password,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UserDto {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
}

/// Ответ `token`/`signup`: при включённом подтверждении почты токена нет.
#[derive(Debug, Deserialize)]
struct AuthResponseDto {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    user: Option<UserDto>,
}

impl AuthResponseDto {
    fn into_session(self, now: DateTime<Utc>) -> Option<Session> {
        let access_token = self.access_token?;
        let user = self.user?;
        let expires_at = self
            .expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .or_else(|| {
                self.expires_in
                    .map(|secs| now + chrono::Duration::seconds(secs))
            });
        Some(Session {
            access_token,
            user_id: user.id,
            email: user.email,
            expires_at,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RoleRow {
    #[serde(default)]
    is_admin: Option<bool>,
}

#[async_trait]
impl IdentityProvider for BackendClient {
    fn current_session(&self) -> Option<Session> {
        self.sessions.borrow().clone()
    }

    fn session_changes(&self) -> watch::Receiver<Option<Session>> {
        self.sessions.subscribe()
    }

    async fn sign_in(&self, credentials: Credentials) -> Result<Session, DomainError> {
        let credentials = credentials.validate()?;
        let request = self
            .http
            .request(Method::POST, "/auth/v1/token", None)
            .query(&[("grant_type", "password")])
            .json(&CredentialsDto::from(&credentials));
        let dto = HttpClient::send_json::<AuthResponseDto>(request).await?;
        let session = dto.into_session(Utc::now()).ok_or_else(|| {
            DomainError::Unexpected("sign-in response carries no session".to_string())
        })?;

        info!(user_id = %session.user_id, "signed in");
        self.sessions.send_replace(Some(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, credentials: Credentials) -> Result<Option<Session>, DomainError> {
        let credentials = credentials.validate()?;
        let request = self
            .http
            .request(Method::POST, "/auth/v1/signup", None)
            .json(&CredentialsDto::from(&credentials));
        let dto = HttpClient::send_json::<AuthResponseDto>(request).await?;

        let session = dto.into_session(Utc::now());
        match &session {
            Some(session) => {
                info!(user_id = %session.user_id, "signed up");
                self.sessions.send_replace(Some(session.clone()));
            }
            None => info!(email = %credentials.email, "signed up, e-mail confirmation pending"),
        }
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), DomainError> {
        let Some(session) = self.sessions.send_replace(None) else {
            return Ok(());
        };
        let request = self.http.request(
            Method::POST,
            "/auth/v1/logout",
            Some(&session.access_token),
        );
        if let Err(err) = HttpClient::send_empty(request).await {
            // the local session is already gone; the token will expire on its own
            warn!(error = %err, "remote sign-out failed");
        }
        info!(user_id = %session.user_id, "signed out");
        Ok(())
    }
}

#[async_trait]
impl RoleStore for BackendClient {
    async fn role_of(&self, user_id: Uuid) -> Result<UserRole, DomainError> {
        let token = self.access_token();
        let request = self
            .http
            .table(Method::GET, "users", token.as_deref(), Prefer::None)
            .query(&[
                ("select", "is_admin".to_string()),
                ("id", eq(user_id)),
                ("limit", "1".to_string()),
            ]);
        let rows = HttpClient::send_json::<Vec<RoleRow>>(request).await?;
        let is_admin = rows
            .into_iter()
            .next()
            .and_then(|row| row.is_admin)
            .unwrap_or(false);
        Ok(UserRole { user_id, is_admin })
    }
}
