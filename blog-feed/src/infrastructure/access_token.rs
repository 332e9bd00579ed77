use chrono::DateTime;
use jsonwebtoken::dangerous::insecure_decode;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::error::DomainError;
use crate::domain::user::Session;

#[derive(Debug, Error)]
pub enum AccessTokenError {
    #[error("access token is malformed")]
    Malformed(#[source] jsonwebtoken::errors::Error),

    #[error("access token has no valid subject")]
    Subject,
}

impl From<AccessTokenError> for DomainError {
    fn from(_: AccessTokenError) -> Self {
        DomainError::Unauthorized
    }
}

#[derive(Debug, Deserialize)]
struct AccessClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    exp: Option<i64>,
}

/// Подпись не проверяется локально: это делает backend на каждом запросе.
pub fn session_from_access_token(token: &str) -> Result<Session, AccessTokenError> {
    let data = insecure_decode::<AccessClaims>(token).map_err(AccessTokenError::Malformed)?;
    let user_id = Uuid::parse_str(&data.claims.sub).map_err(|_| AccessTokenError::Subject)?;

    Ok(Session {
        access_token: token.to_string(),
        user_id,
        email: data.claims.email,
        expires_at: data
            .claims
            .exp
            .and_then(|exp| DateTime::from_timestamp(exp, 0)),
    })
}
