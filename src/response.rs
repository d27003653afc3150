use axum::{
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};

/// ApiResponse
///
/// Success envelope shared by every JSON endpoint:
/// `{ "isSuccess": true, "message": ..., "data": ..., "pagination": ... }`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub is_success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            is_success: true,
            message: message.into(),
            data: Some(data),
            pagination: None,
        }
    }

    pub fn paginated(message: impl Into<String>, data: T, pagination: Pagination) -> Self {
        Self {
            is_success: true,
            message: message.into(),
            data: Some(data),
            pagination: Some(pagination),
        }
    }
}

impl ApiResponse<()> {
    /// Envelope without a payload, used by deletes and logout.
    pub fn message_only(message: impl Into<String>) -> Self {
        Self {
            is_success: true,
            message: message.into(),
            data: None,
            pagination: None,
        }
    }
}

/// Pagination
///
/// Metadata attached to every list response. `total` is the number of matching
/// records before paging.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub total_pages: u32,
}

impl Pagination {
    pub fn new(query: &PageQuery, total: i64) -> Self {
        let limit = query.limit();
        let total_pages = if total <= 0 {
            0
        } else {
            ((total as u64).div_ceil(limit as u64)) as u32
        };
        Self {
            page: query.page(),
            limit,
            total,
            total_pages,
        }
    }
}

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// PageQuery
///
/// Query parameters accepted by every paginated listing (`?page=2&limit=20&search=abc`).
/// Missing or zero values fall back to page 1 / 10 items; `limit` is capped at 100.
#[derive(Debug, Clone, Default, Deserialize, Serialize, IntoParams)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    /// Case-insensitive substring match on the listing's text columns.
    pub search: Option<String>,
}

impl PageQuery {
    pub fn page(&self) -> u32 {
        self.page.filter(|p| *p > 0).unwrap_or(1)
    }

    pub fn limit(&self) -> u32 {
        self.limit
            .filter(|l| *l > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .min(MAX_PAGE_SIZE)
    }

    /// Rows to skip. Widened to `u64` so any `page` yields a valid offset.
    pub fn offset(&self) -> u64 {
        u64::from(self.page() - 1) * u64::from(self.limit())
    }

    /// Trimmed search term, `None` when absent or blank.
    pub fn search_term(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    /// `%term%` pattern for `ILIKE ... ESCAPE '\'`. Wildcards typed by the caller
    /// match literally.
    pub fn search_pattern(&self) -> Option<String> {
        self.search_term().map(|s| {
            let escaped = s
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_");
            format!("%{escaped}%")
        })
    }

    /// In-memory equivalent of the `ILIKE` filter.
    pub fn matches(&self, haystacks: &[&str]) -> bool {
        match self.search_term() {
            None => true,
            Some(term) => {
                let term = term.to_lowercase();
                haystacks.iter().any(|h| h.to_lowercase().contains(&term))
            }
        }
    }
}

/// CsvFile
///
/// `text/csv` download response with an attachment filename.
pub struct CsvFile {
    pub filename: String,
    pub body: String,
}

impl IntoResponse for CsvFile {
    fn into_response(self) -> Response {
        let disposition = HeaderValue::from_str(&format!(
            "attachment; filename=\"{}\"",
            self.filename.replace('"', "")
        ))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

        (
            [
                (header::CONTENT_TYPE, HeaderValue::from_static("text/csv; charset=utf-8")),
                (header::CONTENT_DISPOSITION, disposition),
            ],
            self.body,
        )
            .into_response()
    }
}
