use async_trait::async_trait;
use uuid::Uuid;

use crate::data::query::{ListQuery, Page};
use crate::domain::error::DomainError;
use crate::domain::taxonomy::{Category, Tag, ValidTaxonomy};

#[async_trait]
pub trait CategoryStore: Send + Sync {
    async fn insert_category(&self, input: ValidTaxonomy) -> Result<Category, DomainError>;
    async fn update_category(
        &self,
        id: Uuid,
        input: ValidTaxonomy,
    ) -> Result<Option<Category>, DomainError>;
    async fn delete_category(&self, id: Uuid) -> Result<bool, DomainError>;
    async fn find_category_by_slug(&self, slug: &str) -> Result<Option<Category>, DomainError>;
    /// `name ASC, id ASC`.
    async fn list_categories(&self, query: ListQuery) -> Result<Page<Category>, DomainError>;
}

#[async_trait]
pub trait TagStore: Send + Sync {
    async fn insert_tag(&self, input: ValidTaxonomy, color: &str) -> Result<Tag, DomainError>;
    async fn list_tags(&self) -> Result<Vec<Tag>, DomainError>;
    async fn search_tags(&self, needle: &str, limit: u64) -> Result<Vec<Tag>, DomainError>;
}
