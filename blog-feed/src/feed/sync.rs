use std::sync::Arc;

use futures::future::{BoxFuture, OptionFuture};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::record::FeedRecord;
use super::source::PageSource;
use super::state::{FeedSnapshot, FeedState, FetchKind, PageRequest};
use super::visibility::VisibilityFilter;
use crate::data::change_feed::{ChangeFeed, Subscription};
use crate::data::query::Page;
use crate::domain::error::DomainError;
use crate::domain::user::ViewerContext;

pub const DEFAULT_PAGE_SIZE: u64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedConfig {
    pub page_size: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug)]
enum FeedCommand {
    LoadMore,
}

/// Drop останавливает задачу ленты и освобождает подписку.
pub struct FeedHandle<R> {
    commands: mpsc::UnboundedSender<FeedCommand>,
    snapshots: watch::Receiver<FeedSnapshot<R>>,
    task: JoinHandle<()>,
}

impl<R: FeedRecord> FeedHandle<R> {
    pub fn load_more(&self) {
        if self.commands.send(FeedCommand::LoadMore).is_err() {
            debug!(table = %R::TABLE, "feed driver already stopped");
        }
    }

    pub fn snapshot(&self) -> FeedSnapshot<R> {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FeedSnapshot<R>> {
        self.snapshots.clone()
    }

    pub async fn changed(&mut self) -> Result<FeedSnapshot<R>, DomainError> {
        self.snapshots
            .changed()
            .await
            .map_err(|_| DomainError::Unexpected("feed driver stopped".to_string()))?;
        Ok(self.snapshots.borrow_and_update().clone())
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl<R> Drop for FeedHandle<R> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Сначала подписка, потом первая страница: дубли убирает дедупликация по id.
pub async fn open_feed<R, S, C>(
    source: Arc<S>,
    changes: &C,
    viewer: watch::Receiver<ViewerContext>,
    config: FeedConfig,
) -> Result<FeedHandle<R>, DomainError>
where
    R: FeedRecord,
    S: PageSource<R> + ?Sized + 'static,
    C: ChangeFeed + ?Sized,
{
    if config.page_size == 0 {
        return Err(DomainError::Validation {
            field: "page_size",
            message: "must be greater than zero",
        });
    }

    let subscription = changes.subscribe(R::TABLE).await?;
    let filter = VisibilityFilter::for_viewer(&viewer.borrow());
    let first = source
        .fetch_page(FeedState::<R>::first_page_query(&filter, config.page_size))
        .await?;

    let state = FeedState::from_first_page(config.page_size, filter, first);
    let (snapshot_tx, snapshots) = watch::channel(state.snapshot());
    let (commands, command_rx) = mpsc::unbounded_channel();

    info!(
        table = %R::TABLE,
        rows = state.rows().len(),
        total = state.total(),
        privileged = filter.is_privileged(),
        "feed opened"
    );

    let driver = FeedDriver {
        source,
        subscription,
        viewer,
        commands: command_rx,
        snapshots: snapshot_tx,
        state,
    };
    let task = tokio::spawn(driver.run());

    Ok(FeedHandle {
        commands,
        snapshots,
        task,
    })
}

type PendingPage<R> = BoxFuture<'static, (FetchKind, Result<Page<R>, DomainError>)>;

struct FeedDriver<R, S: ?Sized> {
    source: Arc<S>,
    subscription: Subscription,
    viewer: watch::Receiver<ViewerContext>,
    commands: mpsc::UnboundedReceiver<FeedCommand>,
    snapshots: watch::Sender<FeedSnapshot<R>>,
    state: FeedState<R>,
}

impl<R, S> FeedDriver<R, S>
where
    R: FeedRecord,
    S: PageSource<R> + ?Sized + 'static,
{
    async fn run(mut self) {
        let mut in_flight: Option<PendingPage<R>> = None;
        let mut live = true;
        let mut viewer_open = true;

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(FeedCommand::LoadMore) => {
                        if let Some(request) = self.state.begin_load_more() {
                            in_flight = Some(self.fetch(request));
                            self.publish();
                        }
                    }
                    None => break,
                },
                notification = self.subscription.recv(), if live => match notification {
                    Some(notification) => {
                        if self.state.apply_notification(&notification) {
                            self.publish();
                        }
                    }
                    None => {
                        warn!(table = %R::TABLE, "change stream closed; feed is no longer live");
                        live = false;
                    }
                },
                Some((kind, result)) = OptionFuture::from(in_flight.as_mut()) => {
                    in_flight = None;
                    self.state.finish(kind, result);
                    self.publish();
                }
                changed = self.viewer.changed(), if viewer_open => match changed {
                    Ok(()) => {
                        let filter = VisibilityFilter::for_viewer(&self.viewer.borrow_and_update());
                        debug!(
                            table = %R::TABLE,
                            privileged = filter.is_privileged(),
                            "viewer changed, refreshing feed"
                        );
                        let request = self.state.begin_refresh(filter);
                        in_flight = Some(self.fetch(request));
                        self.publish();
                    }
                    Err(_) => viewer_open = false,
                },
            }
        }

        info!(table = %R::TABLE, "feed closed");
    }

    fn fetch(&self, request: PageRequest) -> PendingPage<R> {
        let source = Arc::clone(&self.source);
        Box::pin(async move { (request.kind, source.fetch_page(request.query).await) })
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.state.snapshot());
    }
}
