//! Author model and related types

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::pagination::{PageRequest, SortColumns};
use crate::error::AppResult;

/// Author from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Author {
    pub id: i32,
    pub firstname: Option<String>,
    pub lastname: String,
    pub birth_date: Option<NaiveDate>,
    pub biography: Option<String>,
    /// Portrait location
    pub picture_url: Option<String>,
}

/// Create author request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateAuthor {
    pub firstname: Option<String>,
    #[validate(length(min = 1, message = "Last name is required"))]
    pub lastname: String,
    pub birth_date: Option<NaiveDate>,
    pub biography: Option<String>,
    #[validate(url(message = "Invalid picture URL"))]
    pub picture_url: Option<String>,
}

/// Update author request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateAuthor {
    pub firstname: Option<String>,
    #[validate(length(min = 1, message = "Last name must not be empty"))]
    pub lastname: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub biography: Option<String>,
    #[validate(url(message = "Invalid picture URL"))]
    pub picture_url: Option<String>,
}

/// Author list query parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct AuthorQuery {
    /// Matches first or last name
    pub name: Option<String>,
    pub page: Option<i64>,
    pub size: Option<i64>,
    pub sort_field: Option<String>,
    pub sort_direction: Option<String>,
}

const AUTHOR_SORT_COLUMNS: SortColumns = &[
    ("id", "id"),
    ("firstName", "firstname"),
    ("firstname", "firstname"),
    ("lastName", "lastname"),
    ("lastname", "lastname"),
    ("birthDate", "birth_date"),
    ("birth_date", "birth_date"),
];

impl AuthorQuery {
    pub fn page_request(&self) -> AppResult<PageRequest> {
        PageRequest::parse(
            self.page,
            self.size,
            self.sort_field.as_deref(),
            self.sort_direction.as_deref(),
            AUTHOR_SORT_COLUMNS,
        )
    }
}
