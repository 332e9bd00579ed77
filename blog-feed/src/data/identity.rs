use async_trait::async_trait;
use tokio::sync::watch;
use uuid::Uuid;

use crate::domain::error::DomainError;
use crate::domain::user::{Credentials, Session, UserRole};

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn current_session(&self) -> Option<Session>;
    fn session_changes(&self) -> watch::Receiver<Option<Session>>;
    async fn sign_in(&self, credentials: Credentials) -> Result<Session, DomainError>;
    /// `None`, если нужно подтверждение e-mail.
    async fn sign_up(&self, credentials: Credentials) -> Result<Option<Session>, DomainError>;
    async fn sign_out(&self) -> Result<(), DomainError>;
}

#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn role_of(&self, user_id: Uuid) -> Result<UserRole, DomainError>;
}
