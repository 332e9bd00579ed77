use serde::Serialize;

use crate::data::query::PageRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorStatus {
    Idle,
    Loading,
    Exhausted,
}

/// Короткая страница означает конец источника.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    page_size: u64,
    next_page: u64,
    status: CursorStatus,
}

impl PageCursor {
    pub fn after_first_page(page_size: u64, first_page_len: usize) -> Self {
        Self {
            page_size,
            next_page: 1,
            status: Self::status_after(page_size, first_page_len),
        }
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn next_page(&self) -> u64 {
        self.next_page
    }

    pub fn status(&self) -> CursorStatus {
        self.status
    }

    pub fn is_exhausted(&self) -> bool {
        self.status == CursorStatus::Exhausted
    }

    pub fn begin(&mut self) -> Option<PageRange> {
        if self.status != CursorStatus::Idle {
            return None;
        }
        self.status = CursorStatus::Loading;
        Some(PageRange::page(self.next_page, self.page_size))
    }

    pub fn complete(&mut self, returned: usize) {
        if self.status != CursorStatus::Loading {
            return;
        }
        self.next_page += 1;
        self.status = Self::status_after(self.page_size, returned);
    }

    pub fn fail(&mut self) {
        if self.status == CursorStatus::Loading {
            self.status = CursorStatus::Idle;
        }
    }

    fn status_after(page_size: u64, returned: usize) -> CursorStatus {
        if (returned as u64) < page_size {
            CursorStatus::Exhausted
        } else {
            CursorStatus::Idle
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CursorStatus, PageCursor};
    use crate::data::query::PageRange;

    #[test]
    fn full_page_keeps_loading_open() {
        let mut cursor = PageCursor::after_first_page(15, 15);
        assert_eq!(cursor.begin(), Some(PageRange { offset: 15, limit: 15 }));
        cursor.complete(15);

        assert_eq!(cursor.status(), CursorStatus::Idle);
        assert_eq!(cursor.next_page(), 2);
        assert_eq!(cursor.begin(), Some(PageRange { offset: 30, limit: 15 }));
    }

    #[test]
    fn short_page_exhausts_the_cursor() {
        let mut cursor = PageCursor::after_first_page(15, 15);
        cursor.begin();
        cursor.complete(7);

        assert!(cursor.is_exhausted());
        assert_eq!(cursor.begin(), None);
        assert_eq!(cursor.begin(), None);
        assert_eq!(cursor.next_page(), 2);
    }

    #[test]
    fn short_first_page_is_already_exhausted() {
        let mut cursor = PageCursor::after_first_page(15, 3);
        assert!(cursor.is_exhausted());
        assert_eq!(cursor.begin(), None);
    }

    #[test]
    fn second_request_while_loading_is_refused() {
        let mut cursor = PageCursor::after_first_page(15, 15);
        assert!(cursor.begin().is_some());
        assert_eq!(cursor.begin(), None);
        assert_eq!(cursor.status(), CursorStatus::Loading);
    }

    #[test]
    fn failure_returns_to_idle_on_the_same_page() {
        let mut cursor = PageCursor::after_first_page(15, 15);
        cursor.begin();
        cursor.fail();

        assert_eq!(cursor.status(), CursorStatus::Idle);
        assert_eq!(cursor.begin(), Some(PageRange { offset: 15, limit: 15 }));
    }
}
