//! Request-side value types for the lifecycle manager.

use serde::{Deserialize, Serialize};

use crate::error::SheetError;
use crate::model::SheetSummary;

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIST_LIMIT: u64 = 20;

/// Search and pagination for listing a user's sheets. `page` and `limit` are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub search: String,
    pub page: u64,
    pub limit: u64,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            search: String::new(),
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIST_LIMIT,
        }
    }
}

impl ListQuery {
    /// Coerce raw query-string values. Anything missing, non-numeric or below 1
    /// falls back to the default.
    pub fn from_raw(search: Option<&str>, page: Option<&str>, limit: Option<&str>) -> Self {
        Self {
            search: search.unwrap_or_default().to_string(),
            page: parse_positive(page).unwrap_or(DEFAULT_PAGE),
            limit: parse_positive(limit).unwrap_or(DEFAULT_LIST_LIMIT),
        }
    }

    pub fn skip(&self) -> usize {
        (self.page.saturating_sub(1)).saturating_mul(self.limit) as usize
    }

    /// Case-insensitive literal substring match; an empty search matches everything.
    pub fn matches(&self, title: &str) -> bool {
        self.search.is_empty() || title.to_lowercase().contains(&self.search.to_lowercase())
    }
}

fn parse_positive(raw: Option<&str>) -> Option<u64> {
    raw.and_then(|s| s.trim().parse::<u64>().ok()).filter(|n| *n >= 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub total: u64,
    pub total_pages: u64,
    pub page: u64,
}

impl PageMeta {
    pub fn new(total: u64, query: &ListQuery) -> Self {
        Self {
            total,
            total_pages: total.div_ceil(query.limit.max(1)),
            page: query.page,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetPage {
    pub sheets: Vec<SheetSummary>,
    pub page_meta: PageMeta,
}

/// The fields a caller may change on an existing sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SheetPatch {
    pub title: Option<String>,
}

impl SheetPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self { title: Some(title.into()) }
    }

    /// Parse a caller-supplied JSON object. Unknown or ill-typed fields are rejected.
    pub fn from_json(value: serde_json::Value) -> Result<Self, SheetError> {
        let patch: SheetPatch = serde_json::from_value(value)
            .map_err(|e| SheetError::Validation(format!("Invalid sheet update: {e}")))?;
        patch.validate()?;
        Ok(patch)
    }

    pub fn validate(&self) -> Result<(), SheetError> {
        if let Some(title) = &self.title {
            if title.trim().is_empty() {
                return Err(SheetError::Validation("Sheet title cannot be empty".into()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_from_raw_defaults() {
        let q = ListQuery::from_raw(None, None, None);
        assert_eq!(q, ListQuery::default());
        assert_eq!(q.limit, 20);
        assert_eq!(q.skip(), 0);
    }

    #[test]
    fn test_from_raw_coerces_garbage() {
        let q = ListQuery::from_raw(Some("budget"), Some("abc"), Some("-5"));
        assert_eq!(q.search, "budget");
        assert_eq!(q.page, 1);
        assert_eq!(q.limit, 20);

        let q = ListQuery::from_raw(None, Some(" 3 "), Some("0"));
        assert_eq!(q.page, 3);
        assert_eq!(q.limit, 20);
    }

    #[test]
    fn test_skip() {
        let q = ListQuery::from_raw(None, Some("3"), Some("10"));
        assert_eq!(q.skip(), 20);
    }

    #[test]
    fn test_matches_case_insensitive() {
        let q = ListQuery { search: "BuDg".into(), ..ListQuery::default() };
        assert!(q.matches("Q3 budget"));
        assert!(!q.matches("Roadmap"));
        assert!(ListQuery::default().matches("anything"));
    }

    #[test]
    fn test_search_is_literal() {
        let q = ListQuery { search: "a.c".into(), ..ListQuery::default() };
        assert!(!q.matches("abc"));
        assert!(q.matches("xa.cx"));
    }

    #[test]
    fn test_total_pages_ceil() {
        let cases = [(0, 20, 0), (1, 20, 1), (20, 20, 1), (21, 20, 2), (7, 3, 3)];
        for (total, limit, expected) in cases {
            let q = ListQuery { limit, ..ListQuery::default() };
            assert_eq!(PageMeta::new(total, &q).total_pages, expected);
        }
    }

    #[test]
    fn test_patch_rejects_unknown_fields() {
        let err = SheetPatch::from_json(json!({ "createdBy": [] })).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_patch_rejects_blank_title() {
        let err = SheetPatch::from_json(json!({ "title": "   " })).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_patch_accepts_title() {
        let patch = SheetPatch::from_json(json!({ "title": "Budget" })).unwrap();
        assert_eq!(patch, SheetPatch::title("Budget"));
    }
}
