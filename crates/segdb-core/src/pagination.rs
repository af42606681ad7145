use serde::Serialize;

pub const DEFAULT_HISTORY_LIMIT: i64 = 10;
pub const DEFAULT_CUSTOMER_LIMIT: i64 = 50;
pub const MAX_PAGE_LIMIT: i64 = 200;

/// A normalized page request: `page >= 1`, `1 <= limit <= MAX_PAGE_LIMIT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

impl PageRequest {
    /// Normalizes raw query inputs. A missing or non-positive page becomes 1;
    /// a missing or non-positive limit becomes `default_limit`.
    #[must_use]
    pub fn new(page: Option<i64>, limit: Option<i64>, default_limit: i64) -> Self {
        let page = page.filter(|p| *p >= 1).unwrap_or(1);
        let limit = limit
            .filter(|l| *l >= 1)
            .unwrap_or(default_limit)
            .min(MAX_PAGE_LIMIT);
        Self { page, limit }
    }

    #[must_use]
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

/// Pagination envelope returned alongside list data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub pages: i64,
}

impl Pagination {
    #[must_use]
    pub fn new(request: PageRequest, total: i64) -> Self {
        let total = total.max(0);
        Self {
            page: request.page,
            limit: request.limit,
            total,
            pages: (total + request.limit - 1) / request.limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_is_ceiling_of_total_over_limit() {
        let p = Pagination::new(PageRequest::new(Some(1), Some(10), 10), 45);
        assert_eq!(p.pages, 5);
        assert_eq!(Pagination::new(PageRequest::new(None, Some(10), 10), 40).pages, 4);
        assert_eq!(Pagination::new(PageRequest::new(None, Some(10), 10), 0).pages, 0);
    }

    #[test]
    fn zero_or_negative_page_normalizes_to_one() {
        assert_eq!(PageRequest::new(Some(0), None, 10).page, 1);
        assert_eq!(PageRequest::new(Some(-3), None, 10).page, 1);
        assert_eq!(PageRequest::new(Some(0), None, 10).offset(), 0);
    }

    #[test]
    fn limit_defaults_and_caps() {
        assert_eq!(PageRequest::new(None, None, DEFAULT_HISTORY_LIMIT).limit, 10);
        assert_eq!(PageRequest::new(None, None, DEFAULT_CUSTOMER_LIMIT).limit, 50);
        assert_eq!(PageRequest::new(None, Some(0), 50).limit, 50);
        assert_eq!(PageRequest::new(None, Some(5_000), 50).limit, MAX_PAGE_LIMIT);
    }

    #[test]
    fn offset_skips_previous_pages() {
        assert_eq!(PageRequest::new(Some(3), Some(10), 10).offset(), 20);
    }
}
