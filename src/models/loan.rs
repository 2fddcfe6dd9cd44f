//! Loan model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, FromRow, Postgres};
use utoipa::{IntoParams, ToSchema};

use super::pagination::{PageRequest, SortColumns};
use crate::error::{AppError, AppResult};

/// Loan status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum LoanStatus {
    Loaned,
    Returned,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Loaned => "LOANED",
            LoanStatus::Returned => "RETURNED",
        }
    }
}

impl std::fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LoanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "LOANED" => Ok(LoanStatus::Loaned),
            "RETURNED" => Ok(LoanStatus::Returned),
            _ => Err(format!("Invalid loan status: {}", s)),
        }
    }
}

impl sqlx::Type<Postgres> for LoanStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<Postgres>>::type_info()
    }
}

impl<'r> Decode<'r, Postgres> for LoanStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s: String = Decode::<Postgres>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl Encode<'_, Postgres> for LoanStatus {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        <&str as Encode<Postgres>>::encode(self.as_str(), buf)
    }
}

/// Loan record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Loan {
    pub id: i32,
    pub book_id: i32,
    pub user_id: i32,
    pub status: LoanStatus,
    pub loaned_at: DateTime<Utc>,
    /// Set when the loan is returned
    pub returned: Option<DateTime<Utc>>,
}

impl Loan {
    pub fn is_active(&self) -> bool {
        self.status == LoanStatus::Loaned
    }

    /// Check that this loan may be returned.
    ///
    /// `borrower` is the caller's user id for self-service returns; `None`
    /// skips the ownership check (librarian desk).
    pub fn ensure_returnable(&self, borrower: Option<i32>) -> AppResult<()> {
        if !self.is_active() {
            return Err(AppError::AlreadyReturned(
                "Loan has already been returned".to_string(),
            ));
        }

        match borrower {
            Some(user_id) if user_id != self.user_id => Err(AppError::Authorization(
                "You are not allowed to return this loan".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// A state change of a loan, as seen by the book's copy counter.
///
/// Every write to `books.available_copies` goes through
/// [`LoanTransition::copy_delta`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoanTransition {
    /// New active loan
    Open,
    /// Active loan marked returned
    Return,
    /// Loan removed; `was_active` if it was still LOANED
    Delete { was_active: bool },
    /// Historical record inserted without bookkeeping
    Backfill,
    /// Administrative correction of a record
    Edit,
}

impl LoanTransition {
    pub fn copy_delta(self) -> i32 {
        match self {
            LoanTransition::Open => -1,
            LoanTransition::Return => 1,
            LoanTransition::Delete { was_active } => i32::from(was_active),
            LoanTransition::Backfill | LoanTransition::Edit => 0,
        }
    }
}

/// Borrow request from the authenticated user
#[derive(Debug, Deserialize, ToSchema)]
pub struct BorrowBook {
    pub book_id: i32,
}

/// Librarian loan creation on behalf of a user
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateLoan {
    pub user_id: i32,
    pub book_id: i32,
}

/// Raw loan record used for backfill and edits (no bookkeeping)
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LoanRecord {
    pub user_id: i32,
    pub book_id: i32,
    pub status: LoanStatus,
    pub returned: Option<DateTime<Utc>>,
    /// Defaults to now for backfilled records; kept as is on edit when absent
    pub loaned_at: Option<DateTime<Utc>>,
}

impl LoanRecord {
    pub fn check_consistency(&self) -> AppResult<()> {
        self.check_dates(self.loaned_at)
    }

    /// Consistency of this record applied over `stored`, whose loan date
    /// is kept when the record leaves it out
    pub fn check_edit_of(&self, stored: &Loan) -> AppResult<()> {
        self.check_dates(Some(self.loaned_at.unwrap_or(stored.loaned_at)))
    }

    fn check_dates(&self, loaned_at: Option<DateTime<Utc>>) -> AppResult<()> {
        if self.status == LoanStatus::Loaned && self.returned.is_some() {
            return Err(AppError::Validation(
                "An active loan cannot have a return date".to_string(),
            ));
        }
        if let (Some(loaned_at), Some(returned)) = (loaned_at, self.returned) {
            if returned < loaned_at {
                return Err(AppError::Validation(
                    "Return date precedes loan date".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Loan list query parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct LoanQuery {
    pub user_id: Option<i32>,
    pub book_id: Option<i32>,
    pub status: Option<LoanStatus>,
    /// Zero-based page index
    pub page: Option<i64>,
    pub size: Option<i64>,
    pub sort_field: Option<String>,
    pub sort_direction: Option<String>,
}

pub const LOAN_SORT_COLUMNS: SortColumns = &[
    ("id", "id"),
    ("bookId", "book_id"),
    ("book_id", "book_id"),
    ("userId", "user_id"),
    ("user_id", "user_id"),
    ("status", "status"),
    ("loanedAt", "loaned_at"),
    ("loaned_at", "loaned_at"),
    ("returned", "returned"),
];

impl LoanQuery {
    pub fn page_request(&self) -> AppResult<PageRequest> {
        PageRequest::parse(
            self.page,
            self.size,
            self.sort_field.as_deref(),
            self.sort_direction.as_deref(),
            LOAN_SORT_COLUMNS,
        )
    }
}
