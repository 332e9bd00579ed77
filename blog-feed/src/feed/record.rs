use std::cmp::Ordering;

use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::data::change_feed::Table;
use crate::domain::post::Post;
use crate::domain::taxonomy::Category;

pub trait FeedRecord: Clone + DeserializeOwned + Send + Sync + 'static {
    const TABLE: Table;

    fn id(&self) -> Uuid;

    fn publicly_visible(&self) -> bool {
        true
    }

    fn feed_order(&self, other: &Self) -> Ordering;
}

impl FeedRecord for Post {
    const TABLE: Table = Table::Posts;

    fn id(&self) -> Uuid {
        self.id
    }

    fn publicly_visible(&self) -> bool {
        self.is_publicly_visible()
    }

    fn feed_order(&self, other: &Self) -> Ordering {
        other
            .created_at
            .cmp(&self.created_at)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl FeedRecord for Category {
    const TABLE: Table = Table::Categories;

    fn id(&self) -> Uuid {
        self.id
    }

    fn feed_order(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.id.cmp(&other.id))
    }
}
