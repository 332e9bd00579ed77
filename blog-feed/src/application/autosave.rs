use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, MutexGuard, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::publishing_service::PublishingService;
use crate::data::membership_store::MembershipStore;
use crate::data::post_store::PostStore;
use crate::domain::error::DomainError;
use crate::domain::post::{Post, PostInput};
use crate::domain::user::ViewerContext;

pub const DEFAULT_AUTOSAVE_DELAY: Duration = Duration::from_millis(5000);

/// Отложенное действие на один слот. Отменить можно только ожидание.
#[derive(Debug, Default)]
pub struct PendingTimer {
    slot: Option<JoinHandle<()>>,
}

impl PendingTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule<F>(&mut self, delay: Duration, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.slot = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tokio::spawn(action);
        }));
    }

    pub fn cancel(&mut self) -> bool {
        match self.slot.take() {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.slot.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for PendingTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutosaveStatus {
    pub saving: bool,
    pub draft_id: Option<Uuid>,
    pub last_saved: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

struct Saver<S> {
    service: Arc<PublishingService<S>>,
    viewer: watch::Receiver<ViewerContext>,
    // держится на всё время сохранения
    draft: Mutex<Option<Uuid>>,
    // растёт при каждой правке и явном сохранении
    generation: AtomicU64,
    status: watch::Sender<AutosaveStatus>,
}

impl<S> Saver<S>
where
    S: PostStore + MembershipStore,
{
    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn save(&self, input: PostInput, publish: bool) -> Result<Post, DomainError> {
        self.next_generation();
        let draft = self.draft.lock().await;
        self.save_locked(draft, input, publish).await
    }

    /// Отложенное сохранение; пропускается, если после его планирования
    /// были новые правки, save_now или publish.
    async fn save_scheduled(&self, input: PostInput, generation: u64) {
        let draft = self.draft.lock().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(generation, "skipping superseded autosave");
            return;
        }
        if let Err(err) = self.save_locked(draft, input, false).await {
            debug!(error = %err, "scheduled autosave failed");
        }
    }

    async fn save_locked(
        &self,
        mut draft: MutexGuard<'_, Option<Uuid>>,
        input: PostInput,
        publish: bool,
    ) -> Result<Post, DomainError> {
        let viewer = *self.viewer.borrow();
        self.status.send_modify(|status| {
            status.saving = true;
            status.error = None;
        });

        let input = if publish {
            PostInput {
                published: true,
                ..input
            }
        } else {
            PostInput {
                published: false,
                is_public: false,
                ..input
            }
        };
        let result = match *draft {
            Some(id) => self.service.update_post(&viewer, id, input).await,
            None => self.service.create_post(&viewer, input).await,
        };

        match &result {
            Ok(post) => {
                *draft = Some(post.id);
                self.status.send_modify(|status| {
                    status.saving = false;
                    status.draft_id = Some(post.id);
                    status.last_saved = Some(Utc::now());
                });
                debug!(post_id = %post.id, publish, "draft saved");
            }
            Err(err) => {
                warn!(error = %err, publish, "draft save failed");
                self.status.send_modify(|status| {
                    status.saving = false;
                    status.error = Some(err.to_string());
                });
            }
        }
        result
    }
}

/// Автосохранение черновика с задержкой после последней правки.
pub struct DraftAutosaver<S> {
    saver: Arc<Saver<S>>,
    timer: PendingTimer,
    delay: Duration,
}

impl<S> DraftAutosaver<S>
where
    S: PostStore + MembershipStore + 'static,
{
    pub fn new(
        service: Arc<PublishingService<S>>,
        viewer: watch::Receiver<ViewerContext>,
        delay: Duration,
    ) -> Self {
        Self::with_draft(service, viewer, delay, None)
    }

    pub fn with_draft(
        service: Arc<PublishingService<S>>,
        viewer: watch::Receiver<ViewerContext>,
        delay: Duration,
        draft_id: Option<Uuid>,
    ) -> Self {
        let (status, _) = watch::channel(AutosaveStatus {
            draft_id,
            ..AutosaveStatus::default()
        });
        Self {
            saver: Arc::new(Saver {
                service,
                viewer,
                draft: Mutex::new(draft_id),
                generation: AtomicU64::new(0),
                status,
            }),
            timer: PendingTimer::new(),
            delay,
        }
    }

    pub fn status(&self) -> watch::Receiver<AutosaveStatus> {
        self.saver.status.subscribe()
    }

    pub fn draft_id(&self) -> Option<Uuid> {
        self.saver.status.borrow().draft_id
    }

    pub fn is_pending(&self) -> bool {
        self.timer.is_pending()
    }

    pub fn is_enabled_for(&self, input: &PostInput) -> bool {
        self.saver.viewer.borrow().is_authenticated() && !input.title.trim().is_empty()
    }

    /// `false`, если автосохранение для этого текста выключено.
    pub fn content_changed(&mut self, input: PostInput) -> bool {
        if !self.is_enabled_for(&input) {
            self.timer.cancel();
            return false;
        }
        let saver = Arc::clone(&self.saver);
        let generation = saver.next_generation();
        self.timer.schedule(self.delay, async move {
            saver.save_scheduled(input, generation).await;
        });
        true
    }

    pub async fn save_now(&mut self, input: PostInput) -> Result<Option<Post>, DomainError> {
        self.timer.cancel();
        if !self.is_enabled_for(&input) {
            return Ok(None);
        }
        self.saver.save(input, false).await.map(Some)
    }

    pub async fn publish(&mut self, input: PostInput) -> Result<Post, DomainError> {
        self.timer.cancel();
        let post = self.saver.save(input, true).await?;
        info!(post_id = %post.id, "draft published");
        Ok(post)
    }
}
