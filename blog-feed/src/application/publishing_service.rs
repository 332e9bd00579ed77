use tracing::info;
use uuid::Uuid;

use crate::application::memberships::reconcile_memberships;
use crate::data::membership_store::{Membership, MembershipStore};
use crate::data::post_store::{NewPost, PostPatch, PostStore};
use crate::domain::error::DomainError;
use crate::domain::post::{Post, PostInput};
use crate::domain::user::ViewerContext;

pub struct PublishingService<S> {
    store: S,
}

impl<S> PublishingService<S>
where
    S: PostStore + MembershipStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn create_post(
        &self,
        viewer: &ViewerContext,
        input: PostInput,
    ) -> Result<Post, DomainError> {
        let author_id = viewer.require_user()?;
        let input = input.validate()?;

        let new_post = NewPost {
            slug: input.slug_or_derived(),
            title: input.title,
            content: input.content,
            excerpt: input.excerpt,
            author_id,
            published: input.published,
            is_public: input.is_public,
        };
        let post = self.store.insert_post(new_post).await?;
        self.sync_memberships(post.id, &input.category_ids, &input.tag_ids)
            .await?;

        info!(post_id = %post.id, %author_id, published = post.published, "post created");
        Ok(post)
    }

    pub async fn get_post(&self, id: Uuid) -> Result<Post, DomainError> {
        self.store
            .get_post(id)
            .await?
            .ok_or(DomainError::NotFound(format!("post id: {id}")))
    }

    /// Slug не меняется. Неопубликованный пост не может быть публичным.
    pub async fn update_post(
        &self,
        viewer: &ViewerContext,
        post_id: Uuid,
        input: PostInput,
    ) -> Result<Post, DomainError> {
        viewer.require_user()?;
        let input = input.validate()?;
        let existing = self.get_post(post_id).await?;
        if !viewer.may_modify(existing.author_id) {
            return Err(DomainError::Forbidden);
        }

        let patch = PostPatch {
            title: input.title,
            content: input.content,
            excerpt: input.excerpt,
            published: input.published,
            is_public: input.published && input.is_public,
        };
        let post = self
            .store
            .update_post(post_id, patch)
            .await?
            .ok_or(DomainError::NotFound(format!("post id: {post_id}")))?;
        self.sync_memberships(post.id, &input.category_ids, &input.tag_ids)
            .await?;

        info!(%post_id, published = post.published, is_public = post.is_public, "post saved");
        Ok(post)
    }

    pub async fn delete_post(&self, viewer: &ViewerContext, post_id: Uuid) -> Result<(), DomainError> {
        viewer.require_user()?;
        let existing = self.get_post(post_id).await?;
        if !viewer.may_modify(existing.author_id) {
            return Err(DomainError::Forbidden);
        }

        let deleted = self.store.delete_post(post_id).await?;
        if !deleted {
            return Err(DomainError::NotFound(format!("post id: {post_id}")));
        }
        info!(%post_id, "post deleted");
        Ok(())
    }

    async fn sync_memberships(
        &self,
        post_id: Uuid,
        category_ids: &[Uuid],
        tag_ids: &[Uuid],
    ) -> Result<(), DomainError> {
        reconcile_memberships(&self.store, Membership::Category, post_id, category_ids).await?;
        reconcile_memberships(&self.store, Membership::Tag, post_id, tag_ids).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::Utc;
    use uuid::Uuid;

    use super::PublishingService;
    use crate::data::membership_store::{Membership, MembershipStore};
    use crate::data::post_store::{NewPost, PostPatch, PostStore};
    use crate::data::query::{ListQuery, Page, RowFilter};
    use crate::domain::error::DomainError;
    use crate::domain::post::{Post, PostInput};
    use crate::domain::taxonomy::{Category, Tag};
    use crate::domain::user::{UserRole, ViewerContext};

    #[derive(Debug, Clone, PartialEq)]
    enum MembershipCall {
        Insert(Membership, Vec<Uuid>),
        Delete(Membership, Uuid),
    }

    #[derive(Clone)]
    struct FakeStore {
        created_input: Arc<Mutex<Option<NewPost>>>,
        post_for_get: Arc<Mutex<Option<Post>>>,
        update_call: Arc<Mutex<Option<(Uuid, PostPatch)>>>,
        delete_result: Arc<Mutex<bool>>,
        existing_members: Arc<Mutex<HashMap<Membership, Vec<Uuid>>>>,
        membership_calls: Arc<Mutex<Vec<MembershipCall>>>,
        fail_member_insert: Arc<Mutex<bool>>,
    }

    impl FakeStore {
        fn new() -> Self {
            Self {
                created_input: Arc::new(Mutex::new(None)),
                post_for_get: Arc::new(Mutex::new(None)),
                update_call: Arc::new(Mutex::new(None)),
                delete_result: Arc::new(Mutex::new(true)),
                existing_members: Arc::new(Mutex::new(HashMap::new())),
                membership_calls: Arc::new(Mutex::new(Vec::new())),
                fail_member_insert: Arc::new(Mutex::new(false)),
            }
        }

        fn calls(&self) -> Vec<MembershipCall> {
            self.membership_calls
                .lock()
                .expect("membership_calls mutex poisoned")
                .clone()
        }
    }

    #[async_trait]
    impl PostStore for FakeStore {
        async fn insert_post(&self, input: NewPost) -> Result<Post, DomainError> {
            *self
                .created_input
                .lock()
                .expect("created_input mutex poisoned") = Some(input.clone());
            let mut post = sample_post(Uuid::new_v4(), input.author_id);
            post.title = input.title;
            post.slug = input.slug;
            post.published = input.published;
            post.is_public = input.is_public;
            Ok(post)
        }

        async fn get_post(&self, _id: Uuid) -> Result<Option<Post>, DomainError> {
            Ok(self
                .post_for_get
                .lock()
                .expect("post_for_get mutex poisoned")
                .clone())
        }

        async fn find_post_by_slug(&self, _slug: &str) -> Result<Option<Post>, DomainError> {
            Ok(None)
        }

        async fn update_post(&self, id: Uuid, patch: PostPatch) -> Result<Option<Post>, DomainError> {
            *self.update_call.lock().expect("update_call mutex poisoned") =
                Some((id, patch.clone()));
            let updated = self
                .post_for_get
                .lock()
                .expect("post_for_get mutex poisoned")
                .clone()
                .map(|mut post| {
                    post.title = patch.title;
                    post.published = patch.published;
                    post.is_public = patch.is_public;
                    post
                });
            Ok(updated)
        }

        async fn delete_post(&self, _id: Uuid) -> Result<bool, DomainError> {
            Ok(*self.delete_result.lock().expect("delete_result mutex poisoned"))
        }

        async fn list_posts(&self, _query: ListQuery) -> Result<Page<Post>, DomainError> {
            Ok(Page::new(Vec::new(), None))
        }

        async fn search_posts(
            &self,
            _needle: &str,
            _filter: RowFilter,
            _limit: u64,
        ) -> Result<Vec<Post>, DomainError> {
            Ok(Vec::new())
        }
    }

    #[async_trait]
    impl MembershipStore for FakeStore {
        async fn member_ids(&self, kind: Membership, _post_id: Uuid) -> Result<Vec<Uuid>, DomainError> {
            Ok(self
                .existing_members
                .lock()
                .expect("existing_members mutex poisoned")
                .get(&kind)
                .cloned()
                .unwrap_or_default())
        }

        async fn insert_members(
            &self,
            kind: Membership,
            _post_id: Uuid,
            member_ids: &[Uuid],
        ) -> Result<(), DomainError> {
            if *self
                .fail_member_insert
                .lock()
                .expect("fail_member_insert mutex poisoned")
            {
                return Err(DomainError::AlreadyExists("post_categories".to_string()));
            }
            self.membership_calls
                .lock()
                .expect("membership_calls mutex poisoned")
                .push(MembershipCall::Insert(kind, member_ids.to_vec()));
            Ok(())
        }

        async fn delete_member(
            &self,
            kind: Membership,
            _post_id: Uuid,
            member_id: Uuid,
        ) -> Result<bool, DomainError> {
            self.membership_calls
                .lock()
                .expect("membership_calls mutex poisoned")
                .push(MembershipCall::Delete(kind, member_id));
            Ok(true)
        }

        async fn categories_of_post(&self, _post_id: Uuid) -> Result<Vec<Category>, DomainError> {
            Ok(Vec::new())
        }

        async fn tags_of_post(&self, _post_id: Uuid) -> Result<Vec<Tag>, DomainError> {
            Ok(Vec::new())
        }

        async fn posts_in_category(&self, _category_id: Uuid) -> Result<Vec<Post>, DomainError> {
            Ok(Vec::new())
        }

        async fn count_posts_by_category(
            &self,
            _category_ids: &[Uuid],
        ) -> Result<HashMap<Uuid, u64>, DomainError> {
            Ok(HashMap::new())
        }
    }

    fn viewer(user_id: Uuid, is_admin: bool) -> ViewerContext {
        ViewerContext::for_role(UserRole { user_id, is_admin })
    }

    fn input(title: &str) -> PostInput {
        PostInput {
            title: title.to_string(),
            content: "body".to_string(),
            ..PostInput::default()
        }
    }

    #[tokio::test]
    async fn create_post_requires_a_signed_in_viewer() {
        let service = PublishingService::new(FakeStore::new());
        let err = service
            .create_post(&ViewerContext::anonymous(), input("title"))
            .await
            .expect_err("anonymous create must fail");
        assert_eq!(err, DomainError::Unauthorized);
    }

    #[tokio::test]
    async fn create_post_derives_slug_and_inserts_memberships() {
        let store = FakeStore::new();
        let service = PublishingService::new(store.clone());
        let author = Uuid::new_v4();
        let category = Uuid::new_v4();

        let created = service
            .create_post(
                &viewer(author, false),
                PostInput {
                    category_ids: vec![category],
                    ..input("  Hello World  ")
                },
            )
            .await
            .expect("create must succeed");
        assert_eq!(created.slug, "hello-world");

        let captured = store
            .created_input
            .lock()
            .expect("created_input mutex poisoned")
            .clone()
            .expect("insert must be captured");
        assert_eq!(captured.title, "Hello World");
        assert_eq!(captured.author_id, author);
        assert_eq!(
            store.calls(),
            vec![MembershipCall::Insert(Membership::Category, vec![category])]
        );
    }

    #[tokio::test]
    async fn update_post_forces_private_when_unpublished_and_keeps_slug() {
        let store = FakeStore::new();
        let author = Uuid::new_v4();
        let post = sample_post(Uuid::new_v4(), author);
        *store.post_for_get.lock().expect("post_for_get mutex poisoned") = Some(post.clone());

        let service = PublishingService::new(store.clone());
        let updated = service
            .update_post(
                &viewer(author, false),
                post.id,
                PostInput {
                    slug: Some("new-slug".to_string()),
                    published: false,
                    is_public: true,
                    ..input("renamed")
                },
            )
            .await
            .expect("update must succeed");

        assert_eq!(updated.slug, post.slug);
        let (id, patch) = store
            .update_call
            .lock()
            .expect("update_call mutex poisoned")
            .clone()
            .expect("update must be captured");
        assert_eq!(id, post.id);
        assert!(!patch.published);
        assert!(!patch.is_public);
    }

    #[tokio::test]
    async fn update_post_reconciles_by_set_difference() {
        let store = FakeStore::new();
        let author = Uuid::new_v4();
        let post = sample_post(Uuid::new_v4(), author);
        *store.post_for_get.lock().expect("post_for_get mutex poisoned") = Some(post.clone());
        let (kept, dropped, added) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        store
            .existing_members
            .lock()
            .expect("existing_members mutex poisoned")
            .insert(Membership::Category, vec![kept, dropped]);

        let service = PublishingService::new(store.clone());
        service
            .update_post(
                &viewer(author, false),
                post.id,
                PostInput {
                    category_ids: vec![kept, added],
                    ..input("title")
                },
            )
            .await
            .expect("update must succeed");

        assert_eq!(
            store.calls(),
            vec![
                MembershipCall::Insert(Membership::Category, vec![added]),
                MembershipCall::Delete(Membership::Category, dropped),
            ]
        );
    }

    #[tokio::test]
    async fn update_post_surfaces_membership_failure() {
        let store = FakeStore::new();
        let author = Uuid::new_v4();
        let post = sample_post(Uuid::new_v4(), author);
        *store.post_for_get.lock().expect("post_for_get mutex poisoned") = Some(post.clone());
        *store
            .fail_member_insert
            .lock()
            .expect("fail_member_insert mutex poisoned") = true;

        let service = PublishingService::new(store);
        let err = service
            .update_post(
                &viewer(author, false),
                post.id,
                PostInput {
                    tag_ids: vec![Uuid::new_v4()],
                    ..input("title")
                },
            )
            .await
            .expect_err("membership failure must abort");
        assert!(matches!(err, DomainError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn update_post_is_forbidden_for_strangers_but_not_admins() {
        let store = FakeStore::new();
        let post = sample_post(Uuid::new_v4(), Uuid::new_v4());
        *store.post_for_get.lock().expect("post_for_get mutex poisoned") = Some(post.clone());
        let service = PublishingService::new(store);

        let err = service
            .update_post(&viewer(Uuid::new_v4(), false), post.id, input("title"))
            .await
            .expect_err("stranger must be rejected");
        assert_eq!(err, DomainError::Forbidden);

        service
            .update_post(&viewer(Uuid::new_v4(), true), post.id, input("title"))
            .await
            .expect("admin may edit any post");
    }

    #[tokio::test]
    async fn delete_post_reports_missing_post() {
        let service = PublishingService::new(FakeStore::new());
        let err = service
            .delete_post(&viewer(Uuid::new_v4(), true), Uuid::new_v4())
            .await
            .expect_err("post must be missing");
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    fn sample_post(id: Uuid, author_id: Uuid) -> Post {
        Post {
            id,
            title: "title".to_string(),
            slug: "title".to_string(),
            content: "body".to_string(),
            excerpt: None,
            author_id,
            published: true,
            is_public: true,
            created_at: Utc::now(),
            updated_at: None,
        }
    }
}
