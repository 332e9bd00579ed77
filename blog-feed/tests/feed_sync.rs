use std::sync::Arc;
use std::time::Duration;

use blog_feed::data::change_feed::{ChangeNotification, Table};
use blog_feed::data::memory::MemoryBackend;
use blog_feed::data::post_store::{NewPost, PostPatch, PostStore};
use blog_feed::data::taxonomy_store::CategoryStore;
use blog_feed::domain::post::Post;
use blog_feed::domain::taxonomy::{Category, TaxonomyInput};
use blog_feed::domain::user::{UserRole, ViewerContext};
use blog_feed::feed::{CursorStatus, FeedConfig, FeedHandle, FeedRecord, FeedSnapshot, open_feed};
use chrono::Utc;
use serde_json::json;
use tokio::sync::watch;
use uuid::Uuid;

const WAIT: Duration = Duration::from_secs(2);

fn seeded_post(n: i64, published: bool, is_public: bool) -> Post {
    Post {
        id: Uuid::new_v4(),
        title: format!("Post {n}"),
        slug: format!("post-{n}"),
        content: "body".to_string(),
        excerpt: None,
        author_id: Uuid::new_v4(),
        published,
        is_public,
        created_at: Utc::now() - chrono::Duration::minutes(n),
        updated_at: None,
    }
}

fn new_post(slug: &str, is_public: bool) -> NewPost {
    NewPost {
        title: slug.to_string(),
        slug: slug.to_string(),
        content: "body".to_string(),
        excerpt: None,
        author_id: Uuid::new_v4(),
        published: true,
        is_public,
    }
}

fn admin() -> ViewerContext {
    ViewerContext::for_role(UserRole {
        user_id: Uuid::new_v4(),
        is_admin: true,
    })
}

async fn open_posts(
    backend: &MemoryBackend,
    viewer: ViewerContext,
) -> (FeedHandle<Post>, watch::Sender<ViewerContext>) {
    let (viewer_tx, viewer_rx) = watch::channel(viewer);
    let handle = open_feed::<Post, _, _>(
        Arc::new(backend.clone()),
        backend,
        viewer_rx,
        FeedConfig::default(),
    )
    .await
    .expect("feed must open");
    (handle, viewer_tx)
}

async fn wait_until<R: FeedRecord>(
    handle: &FeedHandle<R>,
    predicate: impl FnMut(&FeedSnapshot<R>) -> bool,
) -> FeedSnapshot<R> {
    let mut snapshots = handle.subscribe();
    let snapshot = tokio::time::timeout(WAIT, snapshots.wait_for(predicate))
        .await
        .expect("feed did not reach the expected state in time")
        .expect("feed driver stopped");
    snapshot.clone()
}

fn slugs(snapshot: &FeedSnapshot<Post>) -> Vec<String> {
    snapshot.rows.iter().map(|p| p.slug.clone()).collect()
}

#[tokio::test]
async fn first_page_then_load_more_until_exhausted() {
    let backend = MemoryBackend::new();
    for n in 0..22 {
        backend.seed_post(seeded_post(n, true, true)).expect("seed");
    }
    backend.seed_post(seeded_post(100, false, false)).expect("seed");

    let (handle, _viewer) = open_posts(&backend, ViewerContext::anonymous()).await;
    let first = handle.snapshot();
    assert_eq!(first.rows.len(), 15);
    assert_eq!(first.total, 22);
    assert_eq!(first.status, CursorStatus::Idle);
    assert_eq!(first.rows[0].slug, "post-0");

    handle.load_more();
    let done = wait_until(&handle, |s| s.status == CursorStatus::Exhausted).await;
    assert_eq!(done.rows.len(), 22);
    assert_eq!(done.total, 22);
    assert!(done.rows.iter().all(|p| p.is_publicly_visible()));

    handle.load_more();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handle.snapshot().rows.len(), 22);
}

#[tokio::test]
async fn live_changes_are_reconciled_for_anonymous_viewer() {
    let backend = MemoryBackend::new();
    backend.seed_post(seeded_post(3, true, true)).expect("seed");
    backend.seed_post(seeded_post(1, true, true)).expect("seed");
    let (handle, _viewer) = open_posts(&backend, ViewerContext::anonymous()).await;
    assert_eq!(slugs(&handle.snapshot()), vec!["post-1", "post-3"]);

    backend
        .insert_post(new_post("hidden", false))
        .await
        .expect("insert");
    let fresh = backend
        .insert_post(new_post("fresh", true))
        .await
        .expect("insert");
    let snapshot = wait_until(&handle, |s| s.total == 3).await;
    assert_eq!(slugs(&snapshot), vec!["fresh", "post-1", "post-3"]);

    backend
        .update_post(
            fresh.id,
            PostPatch {
                title: fresh.title.clone(),
                content: fresh.content.clone(),
                excerpt: None,
                published: true,
                is_public: false,
            },
        )
        .await
        .expect("update");
    let snapshot = wait_until(&handle, |s| s.total == 2).await;
    assert_eq!(slugs(&snapshot), vec!["post-1", "post-3"]);

    let oldest = snapshot.rows[1].id;
    backend.delete_post(oldest).await.expect("delete");
    let snapshot = wait_until(&handle, |s| s.total == 1).await;
    assert_eq!(slugs(&snapshot), vec!["post-1"]);
}

#[tokio::test]
async fn duplicate_and_malformed_deliveries_are_harmless() {
    let backend = MemoryBackend::new();
    let (handle, _viewer) = open_posts(&backend, ViewerContext::anonymous()).await;

    let post = seeded_post(0, true, true);
    let insert = ChangeNotification {
        table: Table::Posts,
        kind: "INSERT".to_string(),
        before: None,
        after: Some(serde_json::to_value(&post).expect("post must serialize")),
    };
    let garbage = ChangeNotification {
        table: Table::Posts,
        kind: "INSERT".to_string(),
        before: None,
        after: Some(json!({ "id": "not-a-uuid" })),
    };
    backend.broadcast(garbage).expect("broadcast");
    backend.broadcast(insert.clone()).expect("broadcast");
    backend.broadcast(insert).expect("broadcast");

    let snapshot = wait_until(&handle, |s| s.total >= 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let snapshot_later = handle.snapshot();
    assert_eq!(snapshot.rows.len(), 1);
    assert_eq!(snapshot_later.rows.len(), 1);
    assert_eq!(snapshot_later.total, 1);
    assert!(snapshot_later.error.is_none());
}

#[tokio::test]
async fn viewer_change_refreshes_under_new_visibility() {
    let backend = MemoryBackend::new();
    backend.seed_post(seeded_post(1, true, true)).expect("seed");
    backend.seed_post(seeded_post(2, false, false)).expect("seed");
    let (handle, viewer) = open_posts(&backend, ViewerContext::anonymous()).await;
    assert_eq!(handle.snapshot().total, 1);

    viewer.send_replace(admin());
    let snapshot = wait_until(&handle, |s| s.total == 2 && s.status != CursorStatus::Loading).await;
    assert_eq!(slugs(&snapshot), vec!["post-1", "post-2"]);

    viewer.send_replace(ViewerContext::anonymous());
    let snapshot = wait_until(&handle, |s| s.total == 1 && s.status != CursorStatus::Loading).await;
    assert_eq!(slugs(&snapshot), vec!["post-1"]);
}

#[tokio::test]
async fn dropping_the_handle_releases_the_subscription() {
    let backend = MemoryBackend::new();
    let (handle, _viewer) = open_posts(&backend, ViewerContext::anonymous()).await;
    assert_eq!(backend.subscriber_count(), 1);

    drop(handle);
    tokio::time::timeout(WAIT, async {
        while backend.subscriber_count() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("subscription must be released");
}

#[tokio::test]
async fn category_feed_orders_by_name() {
    let backend = MemoryBackend::new();
    for name in ["Rust", "Go"] {
        backend
            .insert_category(TaxonomyInput::new(name).validate("cat").expect("valid"))
            .await
            .expect("insert");
    }

    let (_viewer_tx, viewer_rx) = watch::channel(ViewerContext::anonymous());
    let handle = open_feed::<Category, _, _>(
        Arc::new(backend.clone()),
        &backend,
        viewer_rx,
        FeedConfig::default(),
    )
    .await
    .expect("feed must open");
    assert_eq!(handle.snapshot().status, CursorStatus::Exhausted);

    backend
        .insert_category(TaxonomyInput::new("Haskell").validate("cat").expect("valid"))
        .await
        .expect("insert");
    let snapshot = wait_until(&handle, |s| s.total == 3).await;
    let names: Vec<&str> = snapshot.rows.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Go", "Haskell", "Rust"]);
}
