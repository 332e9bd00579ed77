//! Backend в памяти для тестов. Delete-уведомления несут только ключ.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::data::change_feed::{ChangeFeed, ChangeNotification, Subscription, Table};
use crate::data::identity::{IdentityProvider, RoleStore};
use crate::data::media_store::MediaStore;
use crate::data::membership_store::{Membership, MembershipStore};
use crate::data::post_store::{NewPost, PostPatch, PostStore};
use crate::data::query::{ListQuery, Page, RowFilter};
use crate::data::taxonomy_store::{CategoryStore, TagStore};
use crate::domain::error::DomainError;
use crate::domain::post::Post;
use crate::domain::taxonomy::{Category, Tag, ValidTaxonomy};
use crate::domain::user::{Credentials, Session, UserRole};
use crate::feed::record::FeedRecord;

#[derive(Default)]
struct State {
    posts: HashMap<Uuid, Post>,
    categories: HashMap<Uuid, Category>,
    tags: HashMap<Uuid, Tag>,
    post_categories: BTreeSet<(Uuid, Uuid)>,
    post_tags: BTreeSet<(Uuid, Uuid)>,
    users: HashMap<String, (Uuid, String)>,
    admins: HashSet<Uuid>,
    objects: HashMap<String, (Vec<u8>, String)>,
    subscribers: HashMap<u64, (Table, mpsc::UnboundedSender<ChangeNotification>)>,
    next_subscriber: u64,
}

impl State {
    fn memberships(&mut self, kind: Membership) -> &mut BTreeSet<(Uuid, Uuid)> {
        match kind {
            Membership::Category => &mut self.post_categories,
            Membership::Tag => &mut self.post_tags,
        }
    }

    fn broadcast(&mut self, notification: ChangeNotification) {
        self.subscribers.retain(|_, (table, sender)| {
            *table != notification.table || sender.send(notification.clone()).is_ok()
        });
    }
}

struct Inner {
    state: Mutex<State>,
    sessions: watch::Sender<Option<Session>>,
}

#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (sessions, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                sessions,
            }),
        }
    }

    pub fn seed_post(&self, post: Post) -> Result<(), DomainError> {
        self.lock()?.posts.insert(post.id, post);
        Ok(())
    }

    pub fn seed_category(&self, category: Category) -> Result<(), DomainError> {
        self.lock()?.categories.insert(category.id, category);
        Ok(())
    }

    pub fn grant_admin(&self, user_id: Uuid) -> Result<(), DomainError> {
        self.lock()?.admins.insert(user_id);
        Ok(())
    }

    pub fn broadcast(&self, notification: ChangeNotification) -> Result<(), DomainError> {
        self.lock()?.broadcast(notification);
        Ok(())
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().map(|state| state.subscribers.len()).unwrap_or(0)
    }

    pub fn object(&self, path: &str) -> Option<(Vec<u8>, String)> {
        self.lock().ok()?.objects.get(path).cloned()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, DomainError> {
        self.inner
            .state
            .lock()
            .map_err(|_| DomainError::Unexpected("memory backend lock poisoned".to_string()))
    }

    fn issue_session(&self, user_id: Uuid, email: &str) -> Session {
        let session = Session {
            access_token: format!("memory-{}", Uuid::new_v4().simple()),
            user_id,
            email: Some(email.to_string()),
            expires_at: None,
        };
        self.inner.sessions.send_replace(Some(session.clone()));
        session
    }
}

fn row_image<R: Serialize>(row: &R) -> Option<Value> {
    serde_json::to_value(row).ok()
}

fn insert_notification<R: FeedRecord + Serialize>(row: &R) -> ChangeNotification {
    ChangeNotification {
        table: R::TABLE,
        kind: "INSERT".to_string(),
        before: None,
        after: row_image(row),
    }
}

fn update_notification<R: FeedRecord + Serialize>(row: &R) -> ChangeNotification {
    ChangeNotification {
        table: R::TABLE,
        kind: "UPDATE".to_string(),
        before: Some(json!({ "id": row.id() })),
        after: row_image(row),
    }
}

fn delete_notification(table: Table, id: Uuid) -> ChangeNotification {
    ChangeNotification {
        table,
        kind: "DELETE".to_string(),
        before: Some(json!({ "id": id })),
        after: None,
    }
}

fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

fn window<R: Clone>(rows: &[R], query: ListQuery) -> Page<R> {
    let total = query.count_exact.then_some(rows.len() as u64);
    let page = rows
        .iter()
        .skip(query.range.offset as usize)
        .take(query.range.limit as usize)
        .cloned()
        .collect();
    Page::new(page, total)
}

#[async_trait]
impl PostStore for MemoryBackend {
    async fn insert_post(&self, input: NewPost) -> Result<Post, DomainError> {
        let mut state = self.lock()?;
        if state.posts.values().any(|post| post.slug == input.slug) {
            return Err(DomainError::AlreadyExists(format!("post slug: {}", input.slug)));
        }

        let now = Utc::now();
        let post = Post {
            id: Uuid::new_v4(),
            title: input.title,
            slug: input.slug,
            content: input.content,
            excerpt: input.excerpt,
            author_id: input.author_id,
            published: input.published,
            is_public: input.is_public,
            created_at: now,
            updated_at: Some(now),
        };
        state.posts.insert(post.id, post.clone());
        state.broadcast(insert_notification(&post));
        Ok(post)
    }

    async fn get_post(&self, id: Uuid) -> Result<Option<Post>, DomainError> {
        Ok(self.lock()?.posts.get(&id).cloned())
    }

    async fn find_post_by_slug(&self, slug: &str) -> Result<Option<Post>, DomainError> {
        Ok(self
            .lock()?
            .posts
            .values()
            .find(|post| post.slug == slug)
            .cloned())
    }

    async fn update_post(&self, id: Uuid, patch: PostPatch) -> Result<Option<Post>, DomainError> {
        let mut state = self.lock()?;
        let Some(post) = state.posts.get_mut(&id) else {
            return Ok(None);
        };
        post.title = patch.title;
        post.content = patch.content;
        post.excerpt = patch.excerpt;
        post.published = patch.published;
        post.is_public = patch.is_public;
        post.updated_at = Some(Utc::now());

        let updated = post.clone();
        state.broadcast(update_notification(&updated));
        Ok(Some(updated))
    }

    async fn delete_post(&self, id: Uuid) -> Result<bool, DomainError> {
        let mut state = self.lock()?;
        if state.posts.remove(&id).is_none() {
            return Ok(false);
        }
        state.post_categories.retain(|(post_id, _)| *post_id != id);
        state.post_tags.retain(|(post_id, _)| *post_id != id);
        state.broadcast(delete_notification(Table::Posts, id));
        Ok(true)
    }

    async fn list_posts(&self, query: ListQuery) -> Result<Page<Post>, DomainError> {
        let state = self.lock()?;
        let mut rows: Vec<Post> = state
            .posts
            .values()
            .filter(|post| query.filter == RowFilter::All || post.is_publicly_visible())
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.feed_order(b));
        Ok(window(&rows, query))
    }

    async fn search_posts(
        &self,
        needle: &str,
        filter: RowFilter,
        limit: u64,
    ) -> Result<Vec<Post>, DomainError> {
        let needle = needle.to_lowercase();
        let state = self.lock()?;
        let mut rows: Vec<Post> = state
            .posts
            .values()
            .filter(|post| filter == RowFilter::All || post.is_publicly_visible())
            .filter(|post| {
                contains_ci(&post.title, &needle)
                    || contains_ci(&post.content, &needle)
                    || post
                        .excerpt
                        .as_deref()
                        .is_some_and(|excerpt| contains_ci(excerpt, &needle))
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.feed_order(b));
        rows.truncate(limit as usize);
        Ok(rows)
    }
}

#[async_trait]
impl CategoryStore for MemoryBackend {
    async fn insert_category(&self, input: ValidTaxonomy) -> Result<Category, DomainError> {
        let mut state = self.lock()?;
        if state
            .categories
            .values()
            .any(|c| c.slug == input.slug || c.name == input.name)
        {
            return Err(DomainError::AlreadyExists(format!("category: {}", input.slug)));
        }
        let category = Category {
            id: Uuid::new_v4(),
            name: input.name,
            slug: input.slug,
            description: input.description,
            created_at: Some(Utc::now()),
        };
        state.categories.insert(category.id, category.clone());
        state.broadcast(insert_notification(&category));
        Ok(category)
    }

    async fn update_category(
        &self,
        id: Uuid,
        input: ValidTaxonomy,
    ) -> Result<Option<Category>, DomainError> {
        let mut state = self.lock()?;
        if state
            .categories
            .values()
            .any(|c| c.id != id && c.slug == input.slug)
        {
            return Err(DomainError::AlreadyExists(format!("category: {}", input.slug)));
        }
        let Some(category) = state.categories.get_mut(&id) else {
            return Ok(None);
        };
        category.name = input.name;
        category.slug = input.slug;
        category.description = input.description;

        let updated = category.clone();
        state.broadcast(update_notification(&updated));
        Ok(Some(updated))
    }

    async fn delete_category(&self, id: Uuid) -> Result<bool, DomainError> {
        let mut state = self.lock()?;
        if state.categories.remove(&id).is_none() {
            return Ok(false);
        }
        state.post_categories.retain(|(_, category_id)| *category_id != id);
        state.broadcast(delete_notification(Table::Categories, id));
        Ok(true)
    }

    async fn find_category_by_slug(&self, slug: &str) -> Result<Option<Category>, DomainError> {
        Ok(self
            .lock()?
            .categories
            .values()
            .find(|c| c.slug == slug)
            .cloned())
    }

    async fn list_categories(&self, query: ListQuery) -> Result<Page<Category>, DomainError> {
        let state = self.lock()?;
        let mut rows: Vec<Category> = state.categories.values().cloned().collect();
        rows.sort_by(|a, b| a.feed_order(b));
        Ok(window(&rows, query))
    }
}

#[async_trait]
impl TagStore for MemoryBackend {
    async fn insert_tag(&self, input: ValidTaxonomy, color: &str) -> Result<Tag, DomainError> {
        let mut state = self.lock()?;
        if state.tags.values().any(|t| t.slug == input.slug) {
            return Err(DomainError::AlreadyExists(format!("tag: {}", input.slug)));
        }
        let tag = Tag {
            id: Uuid::new_v4(),
            name: input.name,
            slug: input.slug,
            description: input.description,
            color: color.to_string(),
            created_at: Some(Utc::now()),
        };
        state.tags.insert(tag.id, tag.clone());
        Ok(tag)
    }

    async fn list_tags(&self) -> Result<Vec<Tag>, DomainError> {
        let mut tags: Vec<Tag> = self.lock()?.tags.values().cloned().collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(tags)
    }

    async fn search_tags(&self, needle: &str, limit: u64) -> Result<Vec<Tag>, DomainError> {
        let needle = needle.to_lowercase();
        let mut tags: Vec<Tag> = self
            .list_tags()
            .await?
            .into_iter()
            .filter(|tag| contains_ci(&tag.name, &needle))
            .collect();
        tags.truncate(limit as usize);
        Ok(tags)
    }
}

#[async_trait]
impl MembershipStore for MemoryBackend {
    async fn member_ids(&self, kind: Membership, post_id: Uuid) -> Result<Vec<Uuid>, DomainError> {
        let mut state = self.lock()?;
        Ok(state
            .memberships(kind)
            .iter()
            .filter(|(post, _)| *post == post_id)
            .map(|(_, member)| *member)
            .collect())
    }

    async fn insert_members(
        &self,
        kind: Membership,
        post_id: Uuid,
        member_ids: &[Uuid],
    ) -> Result<(), DomainError> {
        let mut state = self.lock()?;
        let edges = state.memberships(kind);
        if let Some(duplicate) = member_ids
            .iter()
            .find(|member| edges.contains(&(post_id, **member)))
        {
            return Err(DomainError::AlreadyExists(format!(
                "{}: ({post_id}, {duplicate})",
                kind.table()
            )));
        }
        edges.extend(member_ids.iter().map(|member| (post_id, *member)));
        Ok(())
    }

    async fn delete_member(
        &self,
        kind: Membership,
        post_id: Uuid,
        member_id: Uuid,
    ) -> Result<bool, DomainError> {
        Ok(self.lock()?.memberships(kind).remove(&(post_id, member_id)))
    }

    async fn categories_of_post(&self, post_id: Uuid) -> Result<Vec<Category>, DomainError> {
        let state = self.lock()?;
        let mut categories: Vec<Category> = state
            .post_categories
            .iter()
            .filter(|(post, _)| *post == post_id)
            .filter_map(|(_, category)| state.categories.get(category).cloned())
            .collect();
        categories.sort_by(|a, b| a.feed_order(b));
        Ok(categories)
    }

    async fn tags_of_post(&self, post_id: Uuid) -> Result<Vec<Tag>, DomainError> {
        let state = self.lock()?;
        let mut tags: Vec<Tag> = state
            .post_tags
            .iter()
            .filter(|(post, _)| *post == post_id)
            .filter_map(|(_, tag)| state.tags.get(tag).cloned())
            .collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    async fn posts_in_category(&self, category_id: Uuid) -> Result<Vec<Post>, DomainError> {
        let state = self.lock()?;
        Ok(state
            .post_categories
            .iter()
            .filter(|(_, category)| *category == category_id)
            .filter_map(|(post, _)| state.posts.get(post).cloned())
            .collect())
    }

    async fn count_posts_by_category(
        &self,
        category_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, u64>, DomainError> {
        let state = self.lock()?;
        let mut counts = HashMap::new();
        for (_, category) in state.post_categories.iter() {
            if category_ids.contains(category) {
                *counts.entry(*category).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }
}

#[async_trait]
impl MediaStore for MemoryBackend {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), DomainError> {
        let mut state = self.lock()?;
        if state.objects.contains_key(path) {
            return Err(DomainError::AlreadyExists(format!("object: {path}")));
        }
        state
            .objects
            .insert(path.to_string(), (bytes, content_type.to_string()));
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("memory://media/{}", path.trim_start_matches('/'))
    }
}

#[async_trait]
impl IdentityProvider for MemoryBackend {
    fn current_session(&self) -> Option<Session> {
        self.inner.sessions.borrow().clone()
    }

    fn session_changes(&self) -> watch::Receiver<Option<Session>> {
        self.inner.sessions.subscribe()
    }

    async fn sign_in(&self, credentials: Credentials) -> Result<Session, DomainError> {
        let credentials = credentials.validate()?;
        let user_id = {
            let state = self.lock()?;
            match state.users.get(&credentials.email) {
                Some((user_id, password)) if *password == credentials.password => *user_id,
                _ => return Err(DomainError::InvalidCredentials),
            }
        };
        Ok(self.issue_session(user_id, &credentials.email))
    }

    async fn sign_up(&self, credentials: Credentials) -> Result<Option<Session>, DomainError> {
        let credentials = credentials.validate()?;
        let user_id = Uuid::new_v4();
        {
            let mut state = self.lock()?;
            if state.users.contains_key(&credentials.email) {
                return Err(DomainError::AlreadyExists(format!(
                    "user: {}",
                    credentials.email
                )));
            }
            state
                .users
                .insert(credentials.email.clone(), (user_id, credentials.password));
        }
        Ok(Some(self.issue_session(user_id, &credentials.email)))
    }

    async fn sign_out(&self) -> Result<(), DomainError> {
        self.inner.sessions.send_replace(None);
        Ok(())
    }
}

#[async_trait]
impl RoleStore for MemoryBackend {
    async fn role_of(&self, user_id: Uuid) -> Result<UserRole, DomainError> {
        Ok(UserRole {
            user_id,
            is_admin: self.lock()?.admins.contains(&user_id),
        })
    }
}

#[async_trait]
impl ChangeFeed for MemoryBackend {
    async fn subscribe(&self, table: Table) -> Result<Subscription, DomainError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = {
            let mut state = self.lock()?;
            let id = state.next_subscriber;
            state.next_subscriber += 1;
            state.subscribers.insert(id, (table, sender));
            id
        };

        let inner = Arc::downgrade(&self.inner);
        Ok(Subscription::new(table, receiver, move || {
            if let Some(inner) = inner.upgrade()
                && let Ok(mut state) = inner.state.lock()
            {
                state.subscribers.remove(&id);
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::data::query::PageRange;

    fn post(title: &str, offset_secs: i64, public: bool) -> Post {
        Post {
            id: Uuid::new_v4(),
            title: title.to_string(),
            slug: title.to_string(),
            content: "body".to_string(),
            excerpt: None,
            author_id: Uuid::new_v4(),
            published: true,
            is_public: public,
            created_at: Utc::now() + Duration::seconds(offset_secs),
            updated_at: None,
        }
    }

    fn new_post(slug: &str) -> NewPost {
        NewPost {
            title: slug.to_string(),
            slug: slug.to_string(),
            content: "body".to_string(),
            excerpt: None,
            author_id: Uuid::new_v4(),
            published: true,
            is_public: true,
        }
    }

    #[tokio::test]
    async fn list_posts_filters_orders_and_counts() {
        let backend = MemoryBackend::new();
        backend.seed_post(post("old", 0, true)).expect("seed");
        backend.seed_post(post("new", 10, true)).expect("seed");
        backend.seed_post(post("hidden", 20, false)).expect("seed");

        let page = backend
            .list_posts(ListQuery {
                range: PageRange::page(0, 10),
                filter: RowFilter::PublicOnly,
                count_exact: true,
            })
            .await
            .expect("list must succeed");

        let titles: Vec<&str> = page.rows.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["new", "old"]);
        assert_eq!(page.total, Some(2));
    }

    #[tokio::test]
    async fn insert_post_rejects_duplicate_slug() {
        let backend = MemoryBackend::new();
        backend
            .insert_post(new_post("same"))
            .await
            .expect("first insert must succeed");

        let err = backend
            .insert_post(new_post("same"))
            .await
            .expect_err("duplicate slug must fail");
        assert!(matches!(err, DomainError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn delete_notification_carries_only_the_key() {
        let backend = MemoryBackend::new();
        let mut subscription = backend.subscribe(Table::Posts).await.expect("subscribe");
        let created = backend.insert_post(new_post("p")).await.expect("insert");
        backend.delete_post(created.id).await.expect("delete");

        let insert = subscription.recv().await.expect("insert notification");
        assert_eq!(insert.kind, "INSERT");
        let delete = subscription.recv().await.expect("delete notification");
        assert_eq!(delete.kind, "DELETE");
        assert_eq!(delete.before, Some(json!({ "id": created.id })));
        assert!(delete.after.is_none());
    }

    #[tokio::test]
    async fn dropping_subscription_unregisters_it() {
        let backend = MemoryBackend::new();
        let subscription = backend.subscribe(Table::Posts).await.expect("subscribe");
        assert_eq!(backend.subscriber_count(), 1);
        drop(subscription);
        assert_eq!(backend.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn sign_in_publishes_session_change() {
        let backend = MemoryBackend::new();
        let mut changes = backend.session_changes();
        let credentials = Credentials {
            email: "writer@example.com".to_string(),
            password: "password123".to_string(),
        };
        backend
            .sign_up(credentials.clone())
            .await
            .expect("sign up must succeed");
        backend.sign_out().await.expect("sign out");

        let session = backend.sign_in(credentials).await.expect("sign in");
        changes.changed().await.expect("change must be published");
        assert_eq!(
            changes.borrow().as_ref().map(|s| s.user_id),
            Some(session.user_id)
        );

        let wrong = Credentials {
            email: "writer@example.com".to_string(),
            password: "wrong-password".to_string(),
        };
        let err = backend.sign_in(wrong).await.expect_err("must fail");
        assert_eq!(err, DomainError::InvalidCredentials);
    }
}
