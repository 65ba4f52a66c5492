//! Page arithmetic and page result assembly.

use crate::repo::error::{RepoError, RepoResult};
use serde::{Deserialize, Serialize};

/// Validated one-based page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    index: u32,
    size: u32,
}

impl PageRequest {
    /// # Errors
    /// Returns `InvalidPage` when `index` or `size` is zero, or when the
    /// offset does not fit SQLite's signed 64-bit `OFFSET`.
    pub fn new(index: u32, size: u32) -> RepoResult<Self> {
        let offset = u64::from(index.saturating_sub(1)) * u64::from(size);
        if index == 0 || size == 0 || i64::try_from(offset).is_err() {
            return Err(RepoError::InvalidPage {
                page_index: index,
                page_size: size,
            });
        }
        Ok(Self { index, size })
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Rows skipped before this page: `(index - 1) * size`.
    pub fn offset(&self) -> u64 {
        u64::from(self.index - 1) * u64::from(self.size)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.size)
    }
}

/// One bounded slice of a query result plus pagination metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page_index: u32,
    pub page_size: u32,
    pub total_count: u64,
}

impl<T> Page<T> {
    /// Items beyond `request.size()` are dropped to keep the page bounded.
    pub fn new(mut items: Vec<T>, request: PageRequest, total_count: u64) -> Self {
        items.truncate(request.size() as usize);
        Self {
            items,
            page_index: request.index(),
            page_size: request.size(),
            total_count,
        }
    }

    /// `ceil(total_count / page_size)`.
    pub fn total_pages(&self) -> u64 {
        if self.page_size == 0 {
            return 0;
        }
        self.total_count.div_ceil(u64::from(self.page_size))
    }

    pub fn has_next(&self) -> bool {
        u64::from(self.page_index) < self.total_pages()
    }

    pub fn has_previous(&self) -> bool {
        self.page_index > 1
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page_index: self.page_index,
            page_size: self.page_size,
            total_count: self.total_count,
        }
    }
}
