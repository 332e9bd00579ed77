use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::ValidateEmail;

use super::error::DomainError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn validate(self) -> Result<Self, DomainError> {
        let email = normalize_email(&self.email)?;
        let password_len = self.password.chars().count();
        if !(6..=128).contains(&password_len) {
            return Err(DomainError::Validation {
                field: "password",
                message: "must be 6..128 chars",
            });
        }
        Ok(Self {
            email,
            password: self.password,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub user_id: Uuid,
    pub email: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRole {
    pub user_id: Uuid,
    pub is_admin: bool,
}

/// Кто смотрит на данные. Пересоздаётся при смене сессии.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewerContext {
    pub user_id: Option<Uuid>,
    pub privileged: bool,
}

impl ViewerContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn for_role(role: UserRole) -> Self {
        Self {
            user_id: Some(role.user_id),
            privileged: role.is_admin,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    pub fn require_user(&self) -> Result<Uuid, DomainError> {
        self.user_id.ok_or(DomainError::Unauthorized)
    }

    pub fn may_modify(&self, owner_id: Uuid) -> bool {
        self.privileged || self.user_id == Some(owner_id)
    }
}

fn normalize_email(email: &str) -> Result<String, DomainError> {
    let email = email.trim().to_lowercase();
    if !email.validate_email() {
        return Err(DomainError::Validation {
            field: "email",
            message: "must be a valid email",
        });
    }
    Ok(email)
}
