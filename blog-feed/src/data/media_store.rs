use async_trait::async_trait;

use crate::domain::error::DomainError;

#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Существующий объект не перезаписывается.
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str)
    -> Result<(), DomainError>;
    fn public_url(&self, path: &str) -> String;
}
