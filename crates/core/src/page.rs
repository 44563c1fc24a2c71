//! Offset pagination with bounded page size, optional search and sorting.
//!
//! Specified once and applied uniformly to every listing endpoint. Sort
//! fields are validated against a per-resource allow-list by the store; an
//! unknown field silently falls back to the resource's stable default.

use serde::{Deserialize, Serialize};

const MAX_PAGE_SIZE: u32 = 100;
const DEFAULT_PAGE_SIZE: u32 = 10;

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

/// Pagination parameters as they arrive on the wire.
///
/// Out-of-range values are silently clamped rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
    pub sort_by: Option<String>,
    pub sort_descending: bool,
    pub search: Option<String>,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: default_page(),
            page_size: default_page_size(),
            sort_by: None,
            sort_descending: false,
            search: None,
        }
    }
}

impl PageRequest {
    /// Clamp `page` to ≥ 1 and `page_size` to 1..=100.
    pub fn clamped(mut self) -> Self {
        self.page = self.page.max(1);
        self.page_size = self.page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    /// Lower-cased sort key, or `None` for the resource default.
    pub fn sort_key(&self) -> Option<String> {
        self.sort_by
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }

    /// Lower-cased search needle, or `None` when blank.
    pub fn search_term(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }

    /// Zero-based row offset of the first item on this page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }
}

/// One page of results plus the envelope metadata clients need to paginate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub total_count: u64,
    pub total_pages: u32,
    pub has_previous_page: bool,
    pub has_next_page: bool,
}

impl<T> Page<T> {
    /// Build the envelope for `items` (already cut to one page).
    pub fn new(items: Vec<T>, request: &PageRequest, total_count: u64) -> Self {
        let total_pages = total_count.div_ceil(u64::from(request.page_size)) as u32;
        Self {
            items,
            page: request.page,
            page_size: request.page_size,
            total_count,
            total_pages,
            has_previous_page: request.page > 1,
            has_next_page: request.page < total_pages,
        }
    }

    /// Map the items while keeping the envelope intact.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            page_size: self.page_size,
            total_count: self.total_count,
            total_pages: self.total_pages,
            has_previous_page: self.has_previous_page,
            has_next_page: self.has_next_page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_page_and_page_size() {
        let req = PageRequest {
            page: 0,
            page_size: 1000,
            ..PageRequest::default()
        }
        .clamped();
        assert_eq!(req.page, 1);
        assert_eq!(req.page_size, 100);

        let req = PageRequest {
            page_size: 0,
            ..PageRequest::default()
        }
        .clamped();
        assert_eq!(req.page_size, 1);
    }

    #[test]
    fn envelope_metadata() {
        let req = PageRequest {
            page: 2,
            page_size: 10,
            ..PageRequest::default()
        };
        let page = Page::new(vec![1, 2, 3], &req, 23);
        assert_eq!(page.total_pages, 3);
        assert!(page.has_previous_page);
        assert!(page.has_next_page);

        let last = Page::new(vec![1, 2, 3], &PageRequest { page: 3, ..req }, 23);
        assert!(!last.has_next_page);
    }

    #[test]
    fn empty_result_has_zero_pages() {
        let page = Page::<i32>::new(vec![], &PageRequest::default(), 0);
        assert_eq!(page.total_pages, 0);
        assert!(!page.has_next_page);
        assert!(!page.has_previous_page);
    }

    #[test]
    fn sort_key_and_search_are_normalized() {
        let req = PageRequest {
            sort_by: Some("  JoinedAt ".to_string()),
            search: Some("  Alice@Example.COM ".to_string()),
            ..PageRequest::default()
        };
        assert_eq!(req.sort_key().as_deref(), Some("joinedat"));
        assert_eq!(req.search_term().as_deref(), Some("alice@example.com"));
    }
}
