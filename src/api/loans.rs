//! Loan management endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::loan::{BorrowBook, CreateLoan, Loan, LoanQuery, LoanRecord},
};

use super::{AuthenticatedUser, PaginatedResponse};

// =============================================================================
// SELF-SERVICE
// =============================================================================

/// Borrow a book for the authenticated user
#[utoipa::path(
    post,
    path = "/loans/me",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = BorrowBook,
    responses(
        (status = 201, description = "Loan created", body = Loan),
        (status = 404, description = "Book not found"),
        (status = 409, description = "User already has a copy of this book"),
        (status = 422, description = "No copies available")
    )
)]
pub async fn borrow(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<BorrowBook>,
) -> AppResult<(StatusCode, Json<Loan>)> {
    let loan = state.services.loans.borrow(&claims, request.book_id).await?;
    Ok((StatusCode::CREATED, Json(loan)))
}

/// Return one of the authenticated user's loans
#[utoipa::path(
    post,
    path = "/loans/me/{id}/return",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Book returned", body = Loan),
        (status = 403, description = "Loan belongs to another user"),
        (status = 404, description = "Loan not found"),
        (status = 422, description = "Loan already returned")
    )
)]
pub async fn return_own(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(loan_id): Path<i32>,
) -> AppResult<Json<Loan>> {
    let loan = state.services.loans.return_own(&claims, loan_id).await?;
    Ok(Json(loan))
}

/// List the authenticated user's loans
#[utoipa::path(
    get,
    path = "/loans/me",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(LoanQuery),
    responses(
        (status = 200, description = "The caller's loans", body = PaginatedResponse<Loan>),
        (status = 400, description = "Invalid paging or sort parameters")
    )
)]
pub async fn list_own(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<LoanQuery>,
) -> AppResult<Json<PaginatedResponse<Loan>>> {
    let page = query.page_request()?;
    let (loans, total) = state.services.loans.list_own(&claims, query, &page).await?;

    Ok(Json(PaginatedResponse::new(loans, total, &page)))
}

// =============================================================================
// ADMINISTRATION
// =============================================================================

/// List all loans
#[utoipa::path(
    get,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(LoanQuery),
    responses(
        (status = 200, description = "List of loans", body = PaginatedResponse<Loan>),
        (status = 403, description = "Administrator privileges required")
    )
)]
pub async fn list_loans(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<LoanQuery>,
) -> AppResult<Json<PaginatedResponse<Loan>>> {
    claims.require_admin()?;

    let page = query.page_request()?;
    let (loans, total) = state.services.loans.list(&query, &page).await?;

    Ok(Json(PaginatedResponse::new(loans, total, &page)))
}

/// Get loan by ID
#[utoipa::path(
    get,
    path = "/loans/{id}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Loan details", body = Loan),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn get_loan(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(loan_id): Path<i32>,
) -> AppResult<Json<Loan>> {
    claims.require_admin()?;

    let loan = state.services.loans.get(loan_id).await?;
    Ok(Json(loan))
}

/// Lend a book to any user
#[utoipa::path(
    post,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = CreateLoan,
    responses(
        (status = 201, description = "Loan created", body = Loan),
        (status = 404, description = "User or book not found"),
        (status = 409, description = "User already has a copy of this book"),
        (status = 422, description = "No copies available")
    )
)]
pub async fn create_loan(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<CreateLoan>,
) -> AppResult<(StatusCode, Json<Loan>)> {
    claims.require_admin()?;

    let loan = state.services.loans.create_for_user(request).await?;
    Ok((StatusCode::CREATED, Json(loan)))
}

/// Return any loan
#[utoipa::path(
    post,
    path = "/loans/{id}/return",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Book returned", body = Loan),
        (status = 404, description = "Loan not found"),
        (status = 422, description = "Loan already returned")
    )
)]
pub async fn return_loan(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(loan_id): Path<i32>,
) -> AppResult<Json<Loan>> {
    claims.require_admin()?;

    let loan = state.services.loans.return_loan(loan_id).await?;
    Ok(Json(loan))
}

/// Record a historical loan without touching copy counters
#[utoipa::path(
    post,
    path = "/loans/backfill",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = LoanRecord,
    responses(
        (status = 201, description = "Loan recorded", body = Loan),
        (status = 400, description = "Inconsistent record"),
        (status = 404, description = "User or book not found")
    )
)]
pub async fn backfill(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(record): Json<LoanRecord>,
) -> AppResult<(StatusCode, Json<Loan>)> {
    claims.require_admin()?;

    let loan = state.services.loans.backfill(record).await?;
    Ok((StatusCode::CREATED, Json(loan)))
}

/// Correct a loan record
#[utoipa::path(
    put,
    path = "/loans/{id}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    request_body = LoanRecord,
    responses(
        (status = 200, description = "Loan updated", body = Loan),
        (status = 400, description = "Inconsistent record"),
        (status = 404, description = "Loan, user or book not found")
    )
)]
pub async fn update_loan(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(loan_id): Path<i32>,
    Json(record): Json<LoanRecord>,
) -> AppResult<Json<Loan>> {
    claims.require_admin()?;

    let loan = state.services.loans.edit(loan_id, record).await?;
    Ok(Json(loan))
}

/// Delete a loan
#[utoipa::path(
    delete,
    path = "/loans/{id}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    responses(
        (status = 204, description = "Loan deleted"),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn delete_loan(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(loan_id): Path<i32>,
) -> AppResult<StatusCode> {
    claims.require_admin()?;

    state.services.loans.delete(loan_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
