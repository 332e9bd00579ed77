use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Posts,
    Categories,
    Tags,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Self::Posts => "posts",
            Self::Categories => "categories",
            Self::Tags => "tags",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Уведомление как есть; `before` и `after` могут быть неполными.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeNotification {
    pub table: Table,
    pub kind: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

/// Подписка на изменения таблицы. Release вызывается ровно один раз.
pub struct Subscription {
    table: Table,
    receiver: mpsc::UnboundedReceiver<ChangeNotification>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(
        table: Table,
        receiver: mpsc::UnboundedReceiver<ChangeNotification>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            table,
            receiver,
            release: Some(Box::new(release)),
        }
    }

    pub fn table(&self) -> Table {
        self.table
    }

    pub async fn recv(&mut self) -> Option<ChangeNotification> {
        self.receiver.recv().await
    }

    pub fn close(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            debug!(table = %self.table, "releasing change subscription");
            release();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("table", &self.table)
            .field("released", &self.release.is_none())
            .finish()
    }
}

#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn subscribe(&self, table: Table) -> Result<Subscription, DomainError>;
}
