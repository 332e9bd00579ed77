use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::record::FeedRecord;
use crate::data::change_feed::ChangeNotification;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.to_ascii_uppercase().as_str() {
            "INSERT" => Some(Self::Insert),
            "UPDATE" => Some(Self::Update),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent<R> {
    Insert(R),
    Update(R),
    Delete { id: Uuid },
}

impl<R: FeedRecord> ChangeEvent<R> {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Insert(row) | Self::Update(row) => row.id(),
            Self::Delete { id } => *id,
        }
    }
}

/// Всё, что не подходит под схему строки, отбрасывается.
pub fn decode<R: FeedRecord>(notification: &ChangeNotification) -> Option<ChangeEvent<R>> {
    if notification.table != R::TABLE {
        debug!(
            expected = %R::TABLE,
            got = %notification.table,
            "dropping change notification for another table"
        );
        return None;
    }

    let Some(kind) = ChangeKind::parse(&notification.kind) else {
        debug!(
            table = %notification.table,
            kind = %notification.kind,
            "dropping change notification with unknown kind"
        );
        return None;
    };

    let event = match kind {
        ChangeKind::Insert => decode_row(notification.after.as_ref()).map(ChangeEvent::Insert),
        ChangeKind::Update => decode_row(notification.after.as_ref()).map(ChangeEvent::Update),
        ChangeKind::Delete => {
            decode_id(notification.before.as_ref()).map(|id| ChangeEvent::Delete { id })
        }
    };

    if event.is_none() {
        debug!(
            table = %notification.table,
            ?kind,
            "dropping change notification that does not match the row schema"
        );
    }
    event
}

fn decode_row<R: FeedRecord>(image: Option<&Value>) -> Option<R> {
    serde_json::from_value(image?.clone()).ok()
}

fn decode_id(image: Option<&Value>) -> Option<Uuid> {
    image?.get("id")?.as_str()?.parse().ok()
}
