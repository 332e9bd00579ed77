use async_trait::async_trait;

use crate::data::post_store::PostStore;
use crate::data::query::{ListQuery, Page};
use crate::data::taxonomy_store::CategoryStore;
use crate::domain::error::DomainError;
use crate::domain::post::Post;
use crate::domain::taxonomy::Category;

#[async_trait]
pub trait PageSource<R>: Send + Sync {
    async fn fetch_page(&self, query: ListQuery) -> Result<Page<R>, DomainError>;
}

#[async_trait]
impl<T> PageSource<Post> for T
where
    T: PostStore + ?Sized,
{
    async fn fetch_page(&self, query: ListQuery) -> Result<Page<Post>, DomainError> {
        self.list_posts(query).await
    }
}

#[async_trait]
impl<T> PageSource<Category> for T
where
    T: CategoryStore + ?Sized,
{
    async fn fetch_page(&self, query: ListQuery) -> Result<Page<Category>, DomainError> {
        self.list_categories(query).await
    }
}
