// src/models/pagination.rs

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[serde(alias = "1")]
    Asc,
    #[default]
    #[serde(alias = "-1")]
    Desc,
}

/// A resolved page request. `page` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Page {
    /// Fills in defaults for missing query values. Range checks happen in the DTO validators.
    pub fn resolve(page: Option<u32>, limit: Option<u32>, default_limit: u32) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(default_limit).max(1),
        }
    }

    pub fn offset(&self) -> usize {
        (self.page as usize - 1) * self.limit as usize
    }

    /// Half-open index range of this page within `len` items, clamped to the slice.
    pub fn bounds(&self, len: usize) -> std::ops::Range<usize> {
        let start = self.offset().min(len);
        let end = (start + self.limit as usize).min(len);
        start..end
    }
}

/// Pagination metadata returned alongside list payloads.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Pagination {
    pub current: u32,
    pub pages: u64,
    pub total: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    pub fn new(page: Page, total: u64) -> Self {
        let pages = total.div_ceil(page.limit as u64);
        Self {
            current: page.page,
            pages,
            total,
            has_next: (page.page as u64) < pages,
            has_prev: page.page > 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply() {
        let page = Page::resolve(None, None, 20);
        assert_eq!(page, Page { page: 1, limit: 20 });
        assert_eq!(page.offset(), 0);
    }

    #[test]
    fn bounds_clamp_to_len() {
        let page = Page { page: 2, limit: 3 };
        assert_eq!(page.bounds(10), 3..6);
        assert_eq!(page.bounds(4), 3..4);
        assert_eq!(page.bounds(2), 2..2);
    }

    #[test]
    fn pagination_flags() {
        let meta = Pagination::new(Page { page: 2, limit: 10 }, 25);
        assert_eq!(meta.pages, 3);
        assert!(meta.has_next);
        assert!(meta.has_prev);

        let empty = Pagination::new(Page { page: 1, limit: 10 }, 0);
        assert_eq!(empty.pages, 0);
        assert!(!empty.has_next);
        assert!(!empty.has_prev);
    }
}
