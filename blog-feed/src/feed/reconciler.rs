use std::collections::HashSet;

use tracing::debug;
use uuid::Uuid;

use super::change::ChangeEvent;
use super::record::FeedRecord;
use super::visibility::VisibilityFilter;

/// Результат применения одного события к списку.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Inserted,
    Replaced,
    Removed,
    Ignored,
}

impl Outcome {
    pub fn delta(self) -> i64 {
        match self {
            Self::Inserted => 1,
            Self::Removed => -1,
            Self::Replaced | Self::Ignored => 0,
        }
    }

    pub fn changed(self) -> bool {
        self != Self::Ignored
    }
}

/// Упорядоченный список без дублей по идентификатору и счётчик total.
///
/// Обновления применяются в порядке прихода. Удалённые идентификаторы
/// запоминаются, и поздние insert/update по ним игнорируются.
#[derive(Debug, Clone)]
pub struct Reconciler<R> {
    rows: Vec<R>,
    total: u64,
    deleted: HashSet<Uuid>,
}

impl<R: FeedRecord> Default for Reconciler<R> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            total: 0,
            deleted: HashSet::new(),
        }
    }
}

impl<R: FeedRecord> Reconciler<R> {
    pub fn rows(&self) -> &[R] {
        &self.rows
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.position(id).is_some()
    }

    pub fn apply(&mut self, event: ChangeEvent<R>, filter: &VisibilityFilter) -> Outcome {
        let outcome = match event {
            ChangeEvent::Insert(row) => self.apply_insert(row, filter),
            ChangeEvent::Update(row) => self.apply_update(row, filter),
            ChangeEvent::Delete { id } => self.apply_delete(id),
        };
        self.total = self.total.saturating_add_signed(outcome.delta());
        if outcome.changed() {
            self.sort();
        }
        outcome
    }

    /// Добавляет видимые строки страницы, которых ещё нет в списке.
    pub fn merge_page(&mut self, rows: Vec<R>, filter: &VisibilityFilter) -> usize {
        let mut added = 0;
        for row in rows {
            if !filter.accepts(&row) || self.is_deleted(row.id()) || self.contains(row.id()) {
                continue;
            }
            self.rows.push(row);
            added += 1;
        }
        if added > 0 {
            self.sort();
        }
        added
    }

    /// Заменяет список первой страницей; удалённые идентификаторы сохраняются
    /// и вычитаются из total, если сервер их ещё посчитал.
    pub fn reset(&mut self, rows: Vec<R>, total: u64, filter: &VisibilityFilter) {
        let counted_deleted = rows
            .iter()
            .filter(|row| filter.accepts(*row) && self.is_deleted(row.id()))
            .count() as u64;
        self.rows.clear();
        self.total = total.saturating_sub(counted_deleted);
        self.merge_page(rows, filter);
    }

    fn apply_insert(&mut self, row: R, filter: &VisibilityFilter) -> Outcome {
        if self.is_deleted(row.id()) {
            debug!(id = %row.id(), "ignoring insert for a deleted row");
            return Outcome::Ignored;
        }
        if !filter.accepts(&row) || self.contains(row.id()) {
            return Outcome::Ignored;
        }
        self.rows.push(row);
        Outcome::Inserted
    }

    fn apply_update(&mut self, row: R, filter: &VisibilityFilter) -> Outcome {
        if self.is_deleted(row.id()) {
            debug!(id = %row.id(), "ignoring update for a deleted row");
            return Outcome::Ignored;
        }

        match (filter.accepts(&row), self.position(row.id())) {
            (true, Some(index)) => {
                self.rows[index] = row;
                Outcome::Replaced
            }
            (true, None) => {
                self.rows.push(row);
                Outcome::Inserted
            }
            (false, Some(index)) => {
                self.rows.remove(index);
                Outcome::Removed
            }
            (false, None) => Outcome::Ignored,
        }
    }

    fn apply_delete(&mut self, id: Uuid) -> Outcome {
        self.deleted.insert(id);
        match self.position(id) {
            Some(index) => {
                self.rows.remove(index);
                Outcome::Removed
            }
            None => Outcome::Ignored,
        }
    }

    fn is_deleted(&self, id: Uuid) -> bool {
        self.deleted.contains(&id)
    }

    fn position(&self, id: Uuid) -> Option<usize> {
        self.rows.iter().position(|row| row.id() == id)
    }

    fn sort(&mut self) {
        self.rows.sort_by(|a, b| a.feed_order(b));
    }
}
