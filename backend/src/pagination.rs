//! Pagination and query helpers for the Tally API
//!
//! List endpoints are scoped by `companyId` and paginated with `page` /
//! `per_page`. Parameters are declared flat because nested `serde(flatten)`
//! breaks numeric parsing of query strings.

use serde::{Deserialize, Serialize};

/// Default page size if not specified
pub const DEFAULT_PAGE_SIZE: i64 = 50;
/// Maximum allowed page size
pub const MAX_PAGE_SIZE: i64 = 200;
/// Default page number (1-indexed for API consumers)
pub const DEFAULT_PAGE: i64 = 1;

#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub page: i64,
    pub per_page: i64,
}

impl Page {
    pub fn new(page: Option<i64>, per_page: Option<i64>) -> Self {
        Self {
            page: page.unwrap_or(DEFAULT_PAGE).max(1),
            per_page: per_page.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }

    pub fn limit(&self) -> i64 {
        self.per_page
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// `?companyId=<id>&status=<s>&page=<n>&per_page=<n>`
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CompanyListParams {
    #[serde(rename = "companyId", alias = "company_id")]
    pub company_id: Option<i32>,
    pub status: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl CompanyListParams {
    pub fn page(&self) -> Page {
        Page::new(self.page, self.per_page)
    }

    pub fn status_filter(&self) -> Option<String> {
        self.status
            .as_ref()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

/// `?reference=<text>&companyId=<id>`
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ReferenceParams {
    pub reference: Option<String>,
    #[serde(rename = "companyId", alias = "company_id")]
    pub company_id: Option<i32>,
    pub limit: Option<i64>,
}

/// Build an ILIKE pattern that matches `text` literally as a substring
pub fn substring_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    for c in text.trim().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    format!("%{}%", escaped)
}

/// Pagination metadata returned with list responses
#[derive(Debug, Clone, Serialize)]
pub struct PaginationMeta {
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub total_pages: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl PaginationMeta {
    pub fn new(page: Page, total: i64) -> Self {
        let total_pages = if total <= 0 { 0 } else { (total + page.per_page - 1) / page.per_page };
        Self {
            page: page.page,
            per_page: page.per_page,
            total,
            total_pages,
            has_next: page.page < total_pages,
            has_prev: page.page > 1,
        }
    }
}

/// Standard paginated response wrapper
#[derive(Debug, Clone, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub meta: PaginationMeta,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, page: Page, total: i64) -> Self {
        Self {
            data,
            meta: PaginationMeta::new(page, total),
        }
    }
}
