use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::error::DomainError;
use crate::domain::post::Post;
use crate::domain::taxonomy::{Category, Tag};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Membership {
    Category,
    Tag,
}

impl Membership {
    pub fn table(self) -> &'static str {
        match self {
            Self::Category => "post_categories",
            Self::Tag => "post_tags",
        }
    }

    pub fn member_column(self) -> &'static str {
        match self {
            Self::Category => "category_id",
            Self::Tag => "tag_id",
        }
    }
}

#[async_trait]
pub trait MembershipStore: Send + Sync {
    async fn member_ids(&self, kind: Membership, post_id: Uuid) -> Result<Vec<Uuid>, DomainError>;
    async fn insert_members(
        &self,
        kind: Membership,
        post_id: Uuid,
        member_ids: &[Uuid],
    ) -> Result<(), DomainError>;
    async fn delete_member(
        &self,
        kind: Membership,
        post_id: Uuid,
        member_id: Uuid,
    ) -> Result<bool, DomainError>;
    async fn categories_of_post(&self, post_id: Uuid) -> Result<Vec<Category>, DomainError>;
    async fn tags_of_post(&self, post_id: Uuid) -> Result<Vec<Tag>, DomainError>;
    async fn posts_in_category(&self, category_id: Uuid) -> Result<Vec<Post>, DomainError>;
    async fn count_posts_by_category(
        &self,
        category_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, u64>, DomainError>;
}
