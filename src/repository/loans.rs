//! Loans repository for database operations
//!
//! Every mutation runs in a single transaction covering both the loan row
//! and the borrowed book's copy counter.

use async_trait::async_trait;
use sqlx::{PgConnection, Pool, Postgres, QueryBuilder};

use crate::{
    error::{map_unique_violation, AppError, AppResult},
    models::{
        book::Book,
        loan::{Loan, LoanQuery, LoanRecord, LoanStatus, LoanTransition},
        pagination::PageRequest,
    },
};

const LOAN_COLUMNS: &str = "id, book_id, user_id, status, loaned_at, returned";

/// Loan persistence used by the loans service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LoanStore: Send + Sync {
    /// Get loan by ID
    async fn get_by_id(&self, id: i32) -> AppResult<Loan>;

    /// Filtered, ordered page of loans with the total match count
    async fn search(&self, query: &LoanQuery, page: &PageRequest) -> AppResult<(Vec<Loan>, i64)>;

    /// Lend a copy of a book to a user
    async fn open(&self, user_id: i32, book_id: i32) -> AppResult<Loan>;

    /// Mark a loan returned; `borrower` restricts it to that user's loans
    async fn close(&self, loan_id: i32, borrower: Option<i32>) -> AppResult<Loan>;

    /// Insert a loan as given, without checks or copy bookkeeping
    async fn insert_record(&self, record: &LoanRecord) -> AppResult<Loan>;

    /// Overwrite a loan's fields, without copy bookkeeping
    async fn update_record(&self, loan_id: i32, record: &LoanRecord) -> AppResult<Loan>;

    /// Delete a loan, giving its copy back if it was still out
    async fn delete(&self, loan_id: i32) -> AppResult<Loan>;
}

#[derive(Clone)]
pub struct LoansRepository {
    pool: Pool<Postgres>,
}

impl LoansRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn duplicate_loan() -> AppError {
    AppError::Conflict("User already has a copy of this book".to_string())
}

fn loan_not_found() -> AppError {
    AppError::NotFound("Loan does not exist in our system".to_string())
}

/// Load a book and hold its row lock until the transaction ends
async fn lock_book(conn: &mut PgConnection, book_id: i32) -> AppResult<Book> {
    sqlx::query_as::<_, Book>(
        "SELECT id, name, description, available_copies FROM books WHERE id = $1 FOR UPDATE",
    )
    .bind(book_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))
}

async fn lock_loan(conn: &mut PgConnection, loan_id: i32) -> AppResult<Loan> {
    sqlx::query_as::<_, Loan>(&format!(
        "SELECT {} FROM loans WHERE id = $1 FOR UPDATE",
        LOAN_COLUMNS
    ))
    .bind(loan_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(loan_not_found)
}

/// Apply the copy counter change implied by a loan transition
async fn adjust_copies(
    conn: &mut PgConnection,
    book_id: i32,
    transition: LoanTransition,
) -> AppResult<()> {
    let delta = transition.copy_delta();
    if delta == 0 {
        return Ok(());
    }

    let result =
        sqlx::query("UPDATE books SET available_copies = available_copies + $1 WHERE id = $2")
            .bind(delta)
            .bind(book_id)
            .execute(&mut *conn)
            .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Book with id {} not found", book_id)));
    }

    tracing::debug!(book_id, delta, ?transition, "Adjusted available copies");
    Ok(())
}

/// Check that the user and book a raw record points at exist
async fn ensure_references(conn: &mut PgConnection, user_id: i32, book_id: i32) -> AppResult<()> {
    let user_exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;
    if !user_exists {
        return Err(AppError::NotFound("User does not exist".to_string()));
    }

    let book_exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM books WHERE id = $1)")
        .bind(book_id)
        .fetch_one(&mut *conn)
        .await?;
    if !book_exists {
        return Err(AppError::NotFound(format!("Book with id {} not found", book_id)));
    }

    Ok(())
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &LoanQuery) {
    builder.push(" WHERE 1=1");
    if let Some(user_id) = query.user_id {
        builder.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(book_id) = query.book_id {
        builder.push(" AND book_id = ").push_bind(book_id);
    }
    if let Some(status) = query.status {
        builder.push(" AND status = ").push_bind(status);
    }
}

#[async_trait]
impl LoanStore for LoansRepository {
    async fn get_by_id(&self, id: i32) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>(&format!("SELECT {} FROM loans WHERE id = $1", LOAN_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(loan_not_found)
    }

    async fn search(&self, query: &LoanQuery, page: &PageRequest) -> AppResult<(Vec<Loan>, i64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM loans");
        push_filters(&mut count, query);
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM loans", LOAN_COLUMNS));
        push_filters(&mut select, query);
        select.push(" ");
        select.push(page.order_clause());
        select.push(" ");
        select.push(page.limit_clause());

        let loans = select.build_query_as::<Loan>().fetch_all(&self.pool).await?;

        Ok((loans, total))
    }

    async fn open(&self, user_id: i32, book_id: i32) -> AppResult<Loan> {
        let mut tx = self.pool.begin().await?;

        let book = lock_book(&mut *tx, book_id).await?;

        let already_loaned: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM loans WHERE user_id = $1 AND book_id = $2 AND status = $3)",
        )
        .bind(user_id)
        .bind(book_id)
        .bind(LoanStatus::Loaned)
        .fetch_one(&mut *tx)
        .await?;

        if already_loaned {
            return Err(duplicate_loan());
        }

        book.ensure_lendable()?;

        let loan = sqlx::query_as::<_, Loan>(&format!(
            "INSERT INTO loans (book_id, user_id, status, loaned_at) VALUES ($1, $2, $3, NOW()) RETURNING {}",
            LOAN_COLUMNS
        ))
        .bind(book_id)
        .bind(user_id)
        .bind(LoanStatus::Loaned)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_unique_violation(e, duplicate_loan))?;

        adjust_copies(&mut *tx, book_id, LoanTransition::Open).await?;

        tx.commit().await?;

        tracing::info!(loan_id = loan.id, user_id, book_id, "Loan opened");
        Ok(loan)
    }

    async fn close(&self, loan_id: i32, borrower: Option<i32>) -> AppResult<Loan> {
        let mut tx = self.pool.begin().await?;

        let loan = lock_loan(&mut *tx, loan_id).await?;
        loan.ensure_returnable(borrower)?;

        let returned = sqlx::query_as::<_, Loan>(&format!(
            "UPDATE loans SET status = $1, returned = NOW() WHERE id = $2 RETURNING {}",
            LOAN_COLUMNS
        ))
        .bind(LoanStatus::Returned)
        .bind(loan_id)
        .fetch_one(&mut *tx)
        .await?;

        adjust_copies(&mut *tx, loan.book_id, LoanTransition::Return).await?;

        tx.commit().await?;

        tracing::info!(loan_id, user_id = loan.user_id, book_id = loan.book_id, "Loan returned");
        Ok(returned)
    }

    async fn insert_record(&self, record: &LoanRecord) -> AppResult<Loan> {
        let mut tx = self.pool.begin().await?;

        ensure_references(&mut *tx, record.user_id, record.book_id).await?;

        let loan = sqlx::query_as::<_, Loan>(&format!(
            r#"
            INSERT INTO loans (book_id, user_id, status, loaned_at, returned)
            VALUES ($1, $2, $3, COALESCE($4, NOW()), $5)
            RETURNING {}
            "#,
            LOAN_COLUMNS
        ))
        .bind(record.book_id)
        .bind(record.user_id)
        .bind(record.status)
        .bind(record.loaned_at)
        .bind(record.returned)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_unique_violation(e, duplicate_loan))?;

        // LoanTransition::Backfill: no copy bookkeeping
        tx.commit().await?;

        tracing::info!(loan_id = loan.id, status = %loan.status, "Loan record backfilled");
        Ok(loan)
    }

    async fn update_record(&self, loan_id: i32, record: &LoanRecord) -> AppResult<Loan> {
        let mut tx = self.pool.begin().await?;

        let previous = lock_loan(&mut *tx, loan_id).await?;
        record.check_edit_of(&previous)?;
        ensure_references(&mut *tx, record.user_id, record.book_id).await?;

        let loan = sqlx::query_as::<_, Loan>(&format!(
            r#"
            UPDATE loans SET
                book_id = $1,
                user_id = $2,
                status = $3,
                returned = $4,
                loaned_at = COALESCE($5, loaned_at)
            WHERE id = $6
            RETURNING {}
            "#,
            LOAN_COLUMNS
        ))
        .bind(record.book_id)
        .bind(record.user_id)
        .bind(record.status)
        .bind(record.returned)
        .bind(record.loaned_at)
        .bind(loan_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_unique_violation(e, duplicate_loan))?;

        // LoanTransition::Edit: corrections never move copy counters
        tx.commit().await?;

        tracing::info!(loan_id, from = %previous.status, to = %loan.status, "Loan record edited");
        Ok(loan)
    }

    async fn delete(&self, loan_id: i32) -> AppResult<Loan> {
        let mut tx = self.pool.begin().await?;

        let loan = lock_loan(&mut *tx, loan_id).await?;

        sqlx::query("DELETE FROM loans WHERE id = $1")
            .bind(loan_id)
            .execute(&mut *tx)
            .await?;

        adjust_copies(
            &mut *tx,
            loan.book_id,
            LoanTransition::Delete {
                was_active: loan.is_active(),
            },
        )
        .await?;

        tx.commit().await?;

        tracing::info!(loan_id, was_active = loan.is_active(), "Loan deleted");
        Ok(loan)
    }
}
