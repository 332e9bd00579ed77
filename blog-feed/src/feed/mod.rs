//! Постраничные ленты, синхронизированные с потоком изменений таблицы.

pub mod change;
pub mod cursor;
pub mod reconciler;
pub mod record;
pub mod source;
pub mod state;
pub mod sync;
pub mod visibility;

pub use change::{ChangeEvent, ChangeKind, decode};
pub use cursor::{CursorStatus, PageCursor};
pub use reconciler::{Outcome, Reconciler};
pub use record::FeedRecord;
pub use source::PageSource;
pub use state::{FeedSnapshot, FeedState};
pub use sync::{FeedConfig, FeedHandle, open_feed};
pub use visibility::VisibilityFilter;
