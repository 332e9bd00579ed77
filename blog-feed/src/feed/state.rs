use serde::Serialize;
use tracing::{debug, warn};

use super::change::{ChangeEvent, decode};
use super::cursor::{CursorStatus, PageCursor};
use super::reconciler::{Outcome, Reconciler};
use super::record::FeedRecord;
use super::visibility::VisibilityFilter;
use crate::data::change_feed::ChangeNotification;
use crate::data::query::{ListQuery, Page, PageRange};
use crate::domain::error::DomainError;

/// Всё, что нужно для отрисовки ленты.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedSnapshot<R> {
    pub rows: Vec<R>,
    pub total: u64,
    pub status: CursorStatus,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    FirstPage,
    NextPage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub kind: FetchKind,
    pub query: ListQuery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Refresh {
    Done,
    InFlight,
    Failed,
}

/// Состояние ленты без I/O: вызывающий выполняет запрошенные загрузки и
/// возвращает результат в `finish`.
#[derive(Debug, Clone)]
pub struct FeedState<R> {
    reconciler: Reconciler<R>,
    cursor: PageCursor,
    filter: VisibilityFilter,
    refresh: Refresh,
    // события, пришедшие пока первая страница не установлена
    pending: Vec<ChangeEvent<R>>,
    error: Option<String>,
}

impl<R: FeedRecord> FeedState<R> {
    pub fn first_page_query(filter: &VisibilityFilter, page_size: u64) -> ListQuery {
        ListQuery {
            range: PageRange::page(0, page_size),
            filter: filter.row_filter(),
            count_exact: true,
        }
    }

    pub fn from_first_page(page_size: u64, filter: VisibilityFilter, page: Page<R>) -> Self {
        let mut state = Self {
            reconciler: Reconciler::default(),
            cursor: PageCursor::after_first_page(page_size, page.rows.len()),
            filter,
            refresh: Refresh::Done,
            pending: Vec::new(),
            error: None,
        };
        state.install_first_page(page);
        state
    }

    pub fn filter(&self) -> VisibilityFilter {
        self.filter
    }

    pub fn rows(&self) -> &[R] {
        self.reconciler.rows()
    }

    pub fn total(&self) -> u64 {
        self.reconciler.total()
    }

    pub fn status(&self) -> CursorStatus {
        match self.refresh {
            Refresh::InFlight => CursorStatus::Loading,
            Refresh::Done | Refresh::Failed => self.cursor.status(),
        }
    }

    /// Возвращает, изменились ли список или total.
    pub fn apply_notification(&mut self, notification: &ChangeNotification) -> bool {
        match decode::<R>(notification) {
            Some(event) => self.apply(event).changed(),
            None => false,
        }
    }

    pub fn apply(&mut self, event: ChangeEvent<R>) -> Outcome {
        if self.refresh != Refresh::Done {
            self.pending.push(event.clone());
        }
        let outcome = self.reconciler.apply(event, &self.filter);
        if !outcome.changed() {
            debug!(table = %R::TABLE, "change event left the feed unchanged");
        }
        outcome
    }

    /// После неудачного обновления повторяется первая страница.
    pub fn begin_load_more(&mut self) -> Option<PageRequest> {
        match self.refresh {
            Refresh::InFlight => None,
            Refresh::Failed => Some(self.begin_refresh(self.filter)),
            Refresh::Done => {
                let range = self.cursor.begin()?;
                self.error = None;
                Some(PageRequest {
                    kind: FetchKind::NextPage,
                    query: ListQuery {
                        range,
                        filter: self.filter.row_filter(),
                        count_exact: false,
                    },
                })
            }
        }
    }

    /// Страницу, которая ещё загружается, вызывающий должен отбросить.
    pub fn begin_refresh(&mut self, filter: VisibilityFilter) -> PageRequest {
        self.filter = filter;
        self.refresh = Refresh::InFlight;
        self.error = None;
        PageRequest {
            kind: FetchKind::FirstPage,
            query: Self::first_page_query(&filter, self.cursor.page_size()),
        }
    }

    pub fn finish(&mut self, kind: FetchKind, result: Result<Page<R>, DomainError>) {
        match (kind, self.refresh) {
            (FetchKind::FirstPage, Refresh::InFlight) => self.finish_refresh(result),
            (FetchKind::NextPage, Refresh::Done) => self.finish_next_page(result),
            _ => debug!(table = %R::TABLE, ?kind, "discarding superseded page"),
        }
    }

    pub fn snapshot(&self) -> FeedSnapshot<R> {
        FeedSnapshot {
            rows: self.reconciler.rows().to_vec(),
            total: self.reconciler.total(),
            status: self.status(),
            error: self.error.clone(),
        }
    }

    fn finish_refresh(&mut self, result: Result<Page<R>, DomainError>) {
        let page_size = self.cursor.page_size();
        match result {
            Ok(page) => {
                self.cursor = PageCursor::after_first_page(page_size, page.rows.len());
                self.refresh = Refresh::Done;
                self.install_first_page(page);
                self.replay_pending();
            }
            Err(err) => {
                warn!(table = %R::TABLE, error = %err, "feed refresh failed");
                self.reconciler.reset(Vec::new(), 0, &self.filter);
                self.cursor = PageCursor::after_first_page(page_size, page_size as usize);
                self.refresh = Refresh::Failed;
                self.error = Some(err.to_string());
            }
        }
    }

    fn finish_next_page(&mut self, result: Result<Page<R>, DomainError>) {
        match result {
            Ok(page) => {
                let returned = page.rows.len();
                let added = self.reconciler.merge_page(page.rows, &self.filter);
                self.cursor.complete(returned);
                debug!(table = %R::TABLE, returned, added, "page merged");
            }
            Err(err) => {
                warn!(table = %R::TABLE, error = %err, "page fetch failed");
                self.cursor.fail();
                self.error = Some(err.to_string());
            }
        }
    }

    fn install_first_page(&mut self, page: Page<R>) {
        let total = page.total.unwrap_or(page.rows.len() as u64);
        self.reconciler.reset(page.rows, total, &self.filter);
        self.error = None;
    }

    fn replay_pending(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        if !pending.is_empty() {
            debug!(table = %R::TABLE, count = pending.len(), "replaying events from refresh");
        }
        for event in pending {
            self.reconciler.apply(event, &self.filter);
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use uuid::Uuid;

    use super::{FeedState, FetchKind};
    use crate::feed::change::ChangeEvent;
    use crate::data::change_feed::{ChangeNotification, Table};
    use crate::data::query::{Page, PageRange, RowFilter};
    use crate::domain::error::DomainError;
    use crate::domain::post::Post;
    use crate::feed::cursor::CursorStatus;
    use crate::feed::visibility::VisibilityFilter;

    fn post(n: u128) -> Post {
        let at = Utc
            .timestamp_opt(1_000_000 - n as i64, 0)
            .single()
            .expect("valid timestamp");
        Post {
            id: Uuid::from_u128(n),
            title: format!("post {n}"),
            slug: format!("post-{n}"),
            content: "body".to_string(),
            excerpt: None,
            author_id: Uuid::nil(),
            published: true,
            is_public: true,
            created_at: at,
            updated_at: Some(at),
        }
    }

    fn posts(range: std::ops::Range<u128>) -> Vec<Post> {
        range.map(post).collect()
    }

    fn anon_state(first: Vec<Post>, total: u64) -> FeedState<Post> {
        FeedState::from_first_page(15, VisibilityFilter::new(false), Page::new(first, Some(total)))
    }

    #[test]
    fn full_page_advances_and_short_page_exhausts() {
        let mut state = anon_state(posts(0..15), 22);

        let request = state.begin_load_more().expect("first load more");
        assert_eq!(request.kind, FetchKind::NextPage);
        assert_eq!(request.query.range, PageRange { offset: 15, limit: 15 });
        assert_eq!(request.query.filter, RowFilter::PublicOnly);
        state.finish(FetchKind::NextPage, Ok(Page::new(posts(15..30), None)));
        assert_eq!(state.status(), CursorStatus::Idle);

        let request = state.begin_load_more().expect("second load more");
        assert_eq!(request.query.range.offset, 30);
        state.finish(FetchKind::NextPage, Ok(Page::new(posts(30..37), None)));

        assert_eq!(state.status(), CursorStatus::Exhausted);
        assert_eq!(state.rows().len(), 37);
        assert!(state.begin_load_more().is_none());
    }

    #[test]
    fn failed_page_is_reported_and_retried_on_next_trigger() {
        let mut state = anon_state(posts(0..15), 30);
        state.begin_load_more().expect("load more");
        state.finish(
            FetchKind::NextPage,
            Err(DomainError::Backend("connection reset".to_string())),
        );

        let snapshot = state.snapshot();
        assert_eq!(snapshot.status, CursorStatus::Idle);
        assert!(snapshot.error.is_some_and(|e| e.contains("connection reset")));

        let retry = state.begin_load_more().expect("retry");
        assert_eq!(retry.query.range.offset, 15);
        assert!(state.snapshot().error.is_none());
    }

    #[test]
    fn schema_mismatch_is_dropped_silently() {
        let mut state = anon_state(posts(0..3), 3);
        let garbage = ChangeNotification {
            table: Table::Posts,
            kind: "INSERT".to_string(),
            before: None,
            after: Some(json!({ "id": Uuid::new_v4() })),
        };

        assert!(!state.apply_notification(&garbage));
        assert_eq!(state.total(), 3);
        assert!(state.snapshot().error.is_none());
    }

    #[test]
    fn refresh_switches_filter_and_discards_superseded_pages() {
        let mut state = anon_state(posts(0..15), 20);
        state.begin_load_more().expect("load more");

        let refresh = state.begin_refresh(VisibilityFilter::new(true));
        assert_eq!(refresh.query.filter, RowFilter::All);
        assert!(refresh.query.count_exact);
        assert_eq!(state.status(), CursorStatus::Loading);
        assert!(state.begin_load_more().is_none());

        state.finish(FetchKind::NextPage, Ok(Page::new(posts(15..30), None)));
        assert_eq!(state.rows().len(), 15);

        let mut draft = post(99);
        draft.published = false;
        state.finish(FetchKind::FirstPage, Ok(Page::new(vec![draft], Some(1))));
        assert_eq!(state.rows().len(), 1);
        assert_eq!(state.total(), 1);
        assert_eq!(state.status(), CursorStatus::Exhausted);
    }

    #[test]
    fn failed_refresh_clears_rows_and_retries_first_page() {
        let mut state = anon_state(posts(0..15), 20);
        state.begin_refresh(VisibilityFilter::new(false));
        state.finish(
            FetchKind::FirstPage,
            Err(DomainError::Backend("timeout".to_string())),
        );

        assert!(state.rows().is_empty());
        assert_eq!(state.total(), 0);
        let retry = state.begin_load_more().expect("retry");
        assert_eq!(retry.kind, FetchKind::FirstPage);
        assert_eq!(retry.query.range.offset, 0);
    }

    #[test]
    fn events_during_refresh_survive_the_new_first_page() {
        let mut state = anon_state(vec![post(1)], 1);
        state.begin_refresh(VisibilityFilter::new(true));

        let fresh = post(0);
        state.apply(ChangeEvent::Insert(fresh.clone()));
        state.apply(ChangeEvent::Delete {
            id: Uuid::from_u128(5),
        });
        // страница и счётчик посчитаны до вставки и до удаления
        state.finish(FetchKind::FirstPage, Ok(Page::new(vec![post(1), post(5)], Some(2))));

        let ids: Vec<Uuid> = state.rows().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![fresh.id, Uuid::from_u128(1)]);
        assert_eq!(state.total(), 2);

        state.apply(ChangeEvent::Insert(post(2)));
        state.begin_refresh(VisibilityFilter::new(true));
        state.finish(FetchKind::FirstPage, Ok(Page::new(vec![post(0), post(1), post(2)], Some(3))));
        assert_eq!(state.total(), 3);
    }

    #[test]
    fn events_during_failed_refresh_are_replayed_on_retry() {
        let mut state = anon_state(vec![post(1)], 1);
        state.begin_refresh(VisibilityFilter::new(false));
        state.finish(
            FetchKind::FirstPage,
            Err(DomainError::Backend("timeout".to_string())),
        );

        state.apply(ChangeEvent::Insert(post(0)));
        let retry = state.begin_load_more().expect("retry");
        state.finish(retry.kind, Ok(Page::new(vec![post(1)], Some(1))));

        assert_eq!(state.rows().len(), 2);
        assert_eq!(state.total(), 2);
    }
}
