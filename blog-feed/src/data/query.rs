#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowFilter {
    All,
    PublicOnly,
}

/// Диапазон строк `[offset, offset + limit)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub offset: u64,
    pub limit: u64,
}

impl PageRange {
    pub fn page(index: u64, size: u64) -> Self {
        Self {
            offset: index.saturating_mul(size),
            limit: size,
        }
    }

    pub fn last(&self) -> u64 {
        (self.offset + self.limit).saturating_sub(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListQuery {
    pub range: PageRange,
    pub filter: RowFilter,
    pub count_exact: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<R> {
    pub rows: Vec<R>,
    pub total: Option<u64>,
}

impl<R> Page<R> {
    pub fn new(rows: Vec<R>, total: Option<u64>) -> Self {
        Self { rows, total }
    }
}
