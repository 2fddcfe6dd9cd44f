//! Page request parsing shared by every list endpoint

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};

/// Largest page size a client may ask for
pub const MAX_PAGE_SIZE: i64 = 1000;

/// Sort direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

impl FromStr for SortDirection {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            _ => Err(AppError::Validation(format!(
                "Invalid sort direction '{}' (expected 'asc' or 'desc')",
                s
            ))),
        }
    }
}

/// Sortable fields of a resource: (name accepted from clients, SQL column)
pub type SortColumns = &'static [(&'static str, &'static str)];

/// Validated pagination and ordering for one list query.
///
/// When either `page` or `size` is missing the request is unpaged: every
/// matching row is returned, still in the requested order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub page: Option<i64>,
    pub size: Option<i64>,
    pub sort_column: &'static str,
    pub direction: SortDirection,
}

impl PageRequest {
    pub fn parse(
        page: Option<i64>,
        size: Option<i64>,
        sort_field: Option<&str>,
        sort_direction: Option<&str>,
        columns: SortColumns,
    ) -> AppResult<Self> {
        let field = sort_field.unwrap_or("id");
        let sort_column = columns
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, column)| *column)
            .ok_or_else(|| AppError::Validation(format!("Cannot sort by '{}'", field)))?;

        let direction = match sort_direction {
            Some(d) => d.parse()?,
            None => SortDirection::default(),
        };

        let (page, size) = match (page, size) {
            (Some(page), Some(size)) => {
                if page < 0 {
                    return Err(AppError::Validation("Page index must not be negative".to_string()));
                }
                if !(1..=MAX_PAGE_SIZE).contains(&size) {
                    return Err(AppError::Validation(format!(
                        "Page size must be between 1 and {}",
                        MAX_PAGE_SIZE
                    )));
                }
                if page.checked_mul(size).is_none() {
                    return Err(AppError::Validation("Page index is out of range".to_string()));
                }
                (Some(page), Some(size))
            }
            _ => (None, None),
        };

        Ok(Self {
            page,
            size,
            sort_column,
            direction,
        })
    }

    pub fn is_paged(&self) -> bool {
        self.page.is_some() && self.size.is_some()
    }

    /// `ORDER BY` clause; `id` breaks ties so pages are stable
    pub fn order_clause(&self) -> String {
        if self.sort_column == "id" {
            format!("ORDER BY id {}", self.direction.as_sql())
        } else {
            format!(
                "ORDER BY {} {}, id ASC",
                self.sort_column,
                self.direction.as_sql()
            )
        }
    }

    /// `LIMIT .. OFFSET ..` clause, empty when unpaged
    pub fn limit_clause(&self) -> String {
        match (self.page, self.size) {
            (Some(page), Some(size)) => format!("LIMIT {} OFFSET {}", size, page * size),
            _ => String::new(),
        }
    }

    pub fn total_pages(&self, total: i64) -> i64 {
        match self.size {
            Some(size) => (total + size - 1) / size,
            None if total > 0 => 1,
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLUMNS: SortColumns = &[("id", "id"), ("name", "name"), ("bookId", "book_id")];

    #[test]
    fn test_defaults_are_unpaged_by_id() {
        let request = PageRequest::parse(None, None, None, None, COLUMNS).unwrap();
        assert!(!request.is_paged());
        assert_eq!(request.order_clause(), "ORDER BY id ASC");
        assert_eq!(request.limit_clause(), "");
    }

    #[test]
    fn test_missing_size_is_unpaged() {
        let request = PageRequest::parse(Some(3), None, None, None, COLUMNS).unwrap();
        assert!(!request.is_paged());
        assert_eq!(request.total_pages(12), 1);
        assert_eq!(request.total_pages(0), 0);
    }

    #[test]
    fn test_paged_request() {
        let request =
            PageRequest::parse(Some(2), Some(10), Some("bookId"), Some("DESC"), COLUMNS).unwrap();
        assert_eq!(request.order_clause(), "ORDER BY book_id DESC, id ASC");
        assert_eq!(request.limit_clause(), "LIMIT 10 OFFSET 20");
        assert_eq!(request.total_pages(21), 3);
    }

    #[test]
    fn test_unknown_sort_field_rejected() {
        let err = PageRequest::parse(None, None, Some("password"), None, COLUMNS).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_bad_direction_rejected() {
        let err = PageRequest::parse(None, None, None, Some("sideways"), COLUMNS).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_page_bounds() {
        assert!(PageRequest::parse(Some(-1), Some(10), None, None, COLUMNS).is_err());
        assert!(PageRequest::parse(Some(0), Some(0), None, None, COLUMNS).is_err());
        assert!(PageRequest::parse(Some(0), Some(MAX_PAGE_SIZE + 1), None, None, COLUMNS).is_err());
    }

    #[test]
    fn test_offset_overflow_rejected() {
        let err = PageRequest::parse(Some(i64::MAX / 10), Some(MAX_PAGE_SIZE), None, None, COLUMNS)
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let last = i64::MAX / MAX_PAGE_SIZE;
        let request = PageRequest::parse(Some(last), Some(MAX_PAGE_SIZE), None, None, COLUMNS).unwrap();
        assert_eq!(
            request.limit_clause(),
            format!("LIMIT {} OFFSET {}", MAX_PAGE_SIZE, last * MAX_PAGE_SIZE)
        );
    }
}
