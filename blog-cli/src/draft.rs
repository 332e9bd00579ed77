use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use blog_client::BackendClient;
use blog_feed::application::autosave::DraftAutosaver;
use blog_feed::application::publishing_service::PublishingService;
use blog_feed::domain::post::PostInput;
use blog_feed::domain::user::ViewerContext;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::debug;
use uuid::Uuid;

use crate::map_domain_error;
use crate::output::{print_autosave, print_post};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Parameters of `blog-cli post draft`.
pub struct DraftOptions<'a> {
    pub file: &'a Path,
    pub title: String,
    pub draft_id: Option<Uuid>,
    pub category_ids: Vec<Uuid>,
    pub tag_ids: Vec<Uuid>,
    pub publish: bool,
    /// Видимость для анонимов после публикации.
    pub public: bool,
}

impl DraftOptions<'_> {
    fn input(&self, content: String) -> PostInput {
        PostInput {
            title: self.title.clone(),
            content,
            category_ids: self.category_ids.clone(),
            tag_ids: self.tag_ids.clone(),
            is_public: self.public,
            ..PostInput::default()
        }
    }
}

/// Watches `options.file` and autosaves it as a private draft until Ctrl-C.
///
/// On exit the latest content is saved once more, or published with
/// `--publish`.
pub async fn run_draft(
    client: BackendClient,
    viewer: watch::Receiver<ViewerContext>,
    delay: Duration,
    options: DraftOptions<'_>,
) -> Result<()> {
    let service = Arc::new(PublishingService::new(client));
    let mut autosaver = DraftAutosaver::with_draft(service, viewer, delay, options.draft_id);
    let mut status = autosaver.status();

    let mut ticker = interval(POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_content: Option<String> = None;

    println!(
        "Черновик: {} (автосохранение через {} мс, Ctrl-C для выхода)",
        options.file.display(),
        delay.as_millis()
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let content = tokio::fs::read_to_string(options.file)
                    .await
                    .with_context(|| format!("не удалось прочитать {}", options.file.display()))?;
                if last_content.as_deref() == Some(content.as_str()) {
                    continue;
                }
                last_content = Some(content.clone());
                if !autosaver.content_changed(options.input(content)) {
                    debug!("autosave is disabled for the current content");
                }
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                print_autosave(&status.borrow_and_update());
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    let Some(content) = last_content else {
        return Ok(());
    };
    let input = options.input(content);
    if options.publish {
        let post = autosaver.publish(input).await.map_err(map_domain_error)?;
        print_post("Пост опубликован", &post);
    } else if let Some(post) = autosaver.save_now(input).await.map_err(map_domain_error)? {
        print_post("Черновик сохранён", &post);
    }
    Ok(())
}
