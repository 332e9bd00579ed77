use uuid::Uuid;

use crate::data::membership_store::MembershipStore;
use crate::data::post_store::PostStore;
use crate::data::taxonomy_store::{CategoryStore, TagStore};
use crate::domain::error::DomainError;
use crate::domain::post::Post;
use crate::domain::taxonomy::{Category, Tag};
use crate::domain::user::ViewerContext;
use crate::feed::record::FeedRecord;
use crate::feed::visibility::VisibilityFilter;

pub const SEARCH_LIMIT: u64 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct PostDetail {
    pub post: Post,
    pub categories: Vec<Category>,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryPage {
    pub category: Category,
    pub posts: Vec<Post>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResults {
    pub posts: Vec<Post>,
    pub tags: Vec<Tag>,
}

impl SearchResults {
    pub fn is_empty(&self) -> bool {
        self.posts.is_empty() && self.tags.is_empty()
    }
}

pub struct ReaderService<S> {
    store: S,
}

impl<S> ReaderService<S>
where
    S: PostStore + CategoryStore + TagStore + MembershipStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn post_by_slug(
        &self,
        viewer: &ViewerContext,
        slug: &str,
    ) -> Result<PostDetail, DomainError> {
        let not_found = || DomainError::NotFound(format!("post slug: {slug}"));
        let post = self
            .store
            .find_post_by_slug(slug)
            .await?
            .ok_or_else(not_found)?;
        if !VisibilityFilter::for_viewer(viewer).accepts(&post) {
            return Err(not_found());
        }

        let categories = self.store.categories_of_post(post.id).await?;
        let tags = self.store.tags_of_post(post.id).await?;
        Ok(PostDetail {
            post,
            categories,
            tags,
        })
    }

    pub async fn post_by_id(&self, viewer: &ViewerContext, id: Uuid) -> Result<Post, DomainError> {
        self.store
            .get_post(id)
            .await?
            .filter(|post| VisibilityFilter::for_viewer(viewer).accepts(post))
            .ok_or(DomainError::NotFound(format!("post id: {id}")))
    }

    pub async fn category_page(
        &self,
        viewer: &ViewerContext,
        slug: &str,
    ) -> Result<CategoryPage, DomainError> {
        let category = self
            .store
            .find_category_by_slug(slug)
            .await?
            .ok_or(DomainError::NotFound(format!("category slug: {slug}")))?;

        let filter = VisibilityFilter::for_viewer(viewer);
        let mut posts: Vec<Post> = self
            .store
            .posts_in_category(category.id)
            .await?
            .into_iter()
            .filter(|post| filter.accepts(post))
            .collect();
        posts.sort_by(|a, b| a.feed_order(b));

        Ok(CategoryPage { category, posts })
    }

    /// До пяти постов и пяти тегов.
    pub async fn search(
        &self,
        viewer: &ViewerContext,
        query: &str,
    ) -> Result<SearchResults, DomainError> {
        let needle = query.trim();
        if needle.is_empty() {
            return Ok(SearchResults::default());
        }

        let filter = VisibilityFilter::for_viewer(viewer);
        let posts = self
            .store
            .search_posts(needle, filter.row_filter(), SEARCH_LIMIT)
            .await?;
        let tags = self.store.search_tags(needle, SEARCH_LIMIT).await?;
        Ok(SearchResults { posts, tags })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::ReaderService;
    use crate::data::membership_store::{Membership, MembershipStore};
    use crate::data::memory::MemoryBackend;
    use crate::data::taxonomy_store::{CategoryStore, TagStore};
    use crate::domain::error::DomainError;
    use crate::domain::post::Post;
    use crate::domain::taxonomy::TaxonomyInput;
    use crate::domain::user::{UserRole, ViewerContext};

    fn post(slug: &str, minutes_ago: i64, published: bool, is_public: bool) -> Post {
        Post {
            id: Uuid::new_v4(),
            title: slug.replace('-', " "),
            slug: slug.to_string(),
            content: format!("content of {slug}"),
            excerpt: None,
            author_id: Uuid::new_v4(),
            published,
            is_public,
            created_at: Utc::now() - Duration::minutes(minutes_ago),
            updated_at: None,
        }
    }

    fn admin() -> ViewerContext {
        ViewerContext::for_role(UserRole {
            user_id: Uuid::new_v4(),
            is_admin: true,
        })
    }

    #[tokio::test]
    async fn post_by_slug_hides_private_posts_from_anonymous_readers() {
        let backend = MemoryBackend::new();
        backend
            .seed_post(post("secret-plans", 1, true, false))
            .expect("seed");
        let reader = ReaderService::new(backend);

        let err = reader
            .post_by_slug(&ViewerContext::anonymous(), "secret-plans")
            .await
            .expect_err("private post must be hidden");
        assert!(matches!(err, DomainError::NotFound(_)));

        let detail = reader
            .post_by_slug(&admin(), "secret-plans")
            .await
            .expect("admin sees everything");
        assert_eq!(detail.post.slug, "secret-plans");
    }

    #[tokio::test]
    async fn post_detail_includes_categories_and_tags() {
        let backend = MemoryBackend::new();
        let post = post("hello", 1, true, true);
        backend.seed_post(post.clone()).expect("seed");
        let category = backend
            .insert_category(TaxonomyInput::new("Rust").validate("cat").expect("valid"))
            .await
            .expect("category");
        let tag = backend
            .insert_tag(TaxonomyInput::new("async").validate("tag").expect("valid"), "#10b981")
            .await
            .expect("tag");
        backend
            .insert_members(Membership::Category, post.id, &[category.id])
            .await
            .expect("membership");
        backend
            .insert_members(Membership::Tag, post.id, &[tag.id])
            .await
            .expect("membership");

        let detail = ReaderService::new(backend)
            .post_by_slug(&ViewerContext::anonymous(), "hello")
            .await
            .expect("post must be visible");
        assert_eq!(detail.categories, vec![category]);
        assert_eq!(detail.tags, vec![tag]);
    }

    #[tokio::test]
    async fn category_page_lists_visible_posts_newest_first() {
        let backend = MemoryBackend::new();
        let category = backend
            .insert_category(TaxonomyInput::new("Rust").validate("cat").expect("valid"))
            .await
            .expect("category");
        let old = post("old", 60, true, true);
        let new = post("new", 5, true, true);
        let draft = post("draft", 1, false, false);
        for p in [&old, &new, &draft] {
            backend.seed_post(p.clone()).expect("seed");
            backend
                .insert_members(Membership::Category, p.id, &[category.id])
                .await
                .expect("membership");
        }

        let page = ReaderService::new(backend)
            .category_page(&ViewerContext::anonymous(), "rust")
            .await
            .expect("category must exist");
        let slugs: Vec<&str> = page.posts.iter().map(|p| p.slug.as_str()).collect();
        assert_eq!(slugs, vec!["new", "old"]);
    }

    #[tokio::test]
    async fn search_matches_visible_posts_and_tags() {
        let backend = MemoryBackend::new();
        backend
            .seed_post(post("tokio-internals", 1, true, true))
            .expect("seed");
        backend
            .seed_post(post("tokio-draft", 2, false, true))
            .expect("seed");
        backend
            .insert_tag(TaxonomyInput::new("Tokio").validate("tag").expect("valid"), "#3b82f6")
            .await
            .expect("tag");
        let reader = ReaderService::new(backend);

        let results = reader
            .search(&ViewerContext::anonymous(), "  TOKIO ")
            .await
            .expect("search must succeed");
        let slugs: Vec<&str> = results.posts.iter().map(|p| p.slug.as_str()).collect();
        assert_eq!(slugs, vec!["tokio-internals"]);
        assert_eq!(results.tags.len(), 1);

        let empty = reader
            .search(&ViewerContext::anonymous(), "   ")
            .await
            .expect("blank search must succeed");
        assert!(empty.is_empty());
    }
}
