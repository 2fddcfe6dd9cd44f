//! Book model and related types

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::{
    author::Author,
    pagination::{PageRequest, SortColumns},
};
use crate::error::{AppError, AppResult};

/// Book from database, with its authors loaded separately
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub available_copies: i32,
    #[sqlx(skip)]
    #[serde(default)]
    pub authors: Vec<Author>,
}

impl Book {
    /// Check that a copy can be lent out
    pub fn ensure_lendable(&self) -> AppResult<()> {
        if self.available_copies <= 0 {
            return Err(AppError::NoCopiesAvailable(format!(
                "No copies of Book {} available",
                self.name
            )));
        }
        Ok(())
    }
}

/// Create book request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[validate(length(min = 1, message = "Book name is required"))]
    pub name: String,
    pub description: Option<String>,
    #[validate(range(min = 0, message = "Available copies must not be negative"))]
    pub available_copies: i32,
    #[serde(default)]
    pub author_ids: Vec<i32>,
}

/// Update book request.
///
/// The copy counter is only moved by loans, so it is not editable here.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateBook {
    #[validate(length(min = 1, message = "Book name must not be empty"))]
    pub name: Option<String>,
    pub description: Option<String>,
    /// Replaces the author list when present
    pub author_ids: Option<Vec<i32>>,
}

/// Book list query parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct BookQuery {
    /// Substring of the book name
    pub name: Option<String>,
    pub author_id: Option<i32>,
    pub page: Option<i64>,
    pub size: Option<i64>,
    pub sort_field: Option<String>,
    pub sort_direction: Option<String>,
}

const BOOK_SORT_COLUMNS: SortColumns = &[
    ("id", "id"),
    ("name", "name"),
    ("availableCopies", "available_copies"),
    ("available_copies", "available_copies"),
];

impl BookQuery {
    pub fn page_request(&self) -> AppResult<PageRequest> {
        PageRequest::parse(
            self.page,
            self.size,
            self.sort_field.as_deref(),
            self.sort_direction.as_deref(),
            BOOK_SORT_COLUMNS,
        )
    }
}
