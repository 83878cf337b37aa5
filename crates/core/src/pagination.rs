//! Page parameters and paged results.

use serde::{Deserialize, Serialize};

/// Query-string paging parameters (`?page=2&per_page=20`).
///
/// Out-of-range values are clamped rather than rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageParams {
    #[serde(default = "PageParams::default_page")]
    pub page: u32,
    #[serde(default = "PageParams::default_per_page")]
    pub per_page: u32,
}

impl Default for PageParams {
    fn default() -> Self {
        Self {
            page: Self::default_page(),
            per_page: Self::default_per_page(),
        }
    }
}

impl PageParams {
    pub const MAX_PER_PAGE: u32 = 100;

    const fn default_page() -> u32 {
        1
    }

    const fn default_per_page() -> u32 {
        20
    }

    #[must_use]
    pub fn new(page: u32, per_page: u32) -> Self {
        Self { page, per_page }.normalized()
    }

    /// Clamp `page` to ≥ 1 and `per_page` to `1..=100`.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            page: self.page.max(1),
            per_page: self.per_page.clamp(1, Self::MAX_PER_PAGE),
        }
    }

    /// SQL `LIMIT`.
    #[must_use]
    pub fn limit(&self) -> i64 {
        i64::from(self.normalized().per_page)
    }

    /// SQL `OFFSET`.
    #[must_use]
    pub fn offset(&self) -> i64 {
        let p = self.normalized();
        i64::from(p.page - 1) * i64::from(p.per_page)
    }
}

/// One page of results plus totals for the client's pager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

impl<T> Page<T> {
    #[must_use]
    pub fn new(items: Vec<T>, total: i64, params: PageParams) -> Self {
        let params = params.normalized();
        let per_page = i64::from(params.per_page);
        let pages = (total.max(0) + per_page - 1) / per_page;
        Self {
            items,
            total: total.max(0),
            page: params.page,
            per_page: params.per_page,
            total_pages: u32::try_from(pages).unwrap_or(u32::MAX),
        }
    }

    /// Convert the items, keeping paging metadata.
    #[must_use]
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
            total_pages: self.total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_and_limit() {
        let params = PageParams::new(3, 25);
        assert_eq!(params.limit(), 25);
        assert_eq!(params.offset(), 50);
    }

    #[test]
    fn test_clamping() {
        let params = PageParams::new(0, 1_000);
        assert_eq!(params.page, 1);
        assert_eq!(params.per_page, PageParams::MAX_PER_PAGE);

        let raw = PageParams {
            page: 0,
            per_page: 0,
        };
        assert_eq!(raw.offset(), 0);
        assert_eq!(raw.limit(), 1);
    }

    #[test]
    fn test_defaults_from_empty_query() {
        let params: PageParams = serde_json::from_str("{}").unwrap_or_default();
        assert_eq!(params, PageParams::default());
        assert_eq!(params.per_page, 20);
    }

    #[test]
    fn test_total_pages() {
        let page = Page::new(vec![1, 2], 41, PageParams::new(1, 20));
        assert_eq!(page.total_pages, 3);

        let empty: Page<i32> = Page::new(vec![], 0, PageParams::default());
        assert_eq!(empty.total_pages, 0);
    }

    #[test]
    fn test_map_keeps_metadata() {
        let page = Page::new(vec![1, 2], 2, PageParams::default()).map(|n| n * 10);
        assert_eq!(page.items, vec![10, 20]);
        assert_eq!(page.total, 2);
    }
}
