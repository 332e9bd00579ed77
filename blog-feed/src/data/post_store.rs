use async_trait::async_trait;
use uuid::Uuid;

use crate::data::query::{ListQuery, Page, RowFilter};
use crate::domain::error::DomainError;
use crate::domain::post::Post;

#[derive(Debug, Clone, PartialEq)]
pub struct NewPost {
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: Option<String>,
    pub author_id: Uuid,
    pub published: bool,
    pub is_public: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostPatch {
    pub title: String,
    pub content: String,
    pub excerpt: Option<String>,
    pub published: bool,
    pub is_public: bool,
}

#[async_trait]
pub trait PostStore: Send + Sync {
    async fn insert_post(&self, input: NewPost) -> Result<Post, DomainError>;
    async fn get_post(&self, id: Uuid) -> Result<Option<Post>, DomainError>;
    async fn find_post_by_slug(&self, slug: &str) -> Result<Option<Post>, DomainError>;
    async fn update_post(&self, id: Uuid, patch: PostPatch) -> Result<Option<Post>, DomainError>;
    async fn delete_post(&self, id: Uuid) -> Result<bool, DomainError>;
    /// `created_at DESC, id DESC`.
    async fn list_posts(&self, query: ListQuery) -> Result<Page<Post>, DomainError>;
    async fn search_posts(
        &self,
        needle: &str,
        filter: RowFilter,
        limit: u64,
    ) -> Result<Vec<Post>, DomainError>;
}
