use super::record::FeedRecord;
use crate::data::query::RowFilter;
use crate::domain::user::ViewerContext;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VisibilityFilter {
    privileged: bool,
}

impl VisibilityFilter {
    pub const fn new(privileged: bool) -> Self {
        Self { privileged }
    }

    pub fn for_viewer(viewer: &ViewerContext) -> Self {
        Self::new(viewer.privileged)
    }

    pub fn is_privileged(&self) -> bool {
        self.privileged
    }

    pub fn accepts<R: FeedRecord>(&self, row: &R) -> bool {
        self.privileged || row.publicly_visible()
    }

    pub fn row_filter(&self) -> RowFilter {
        if self.privileged {
            RowFilter::All
        } else {
            RowFilter::PublicOnly
        }
    }
}
