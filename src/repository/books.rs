//! Books repository for database operations

use std::collections::BTreeSet;

use sqlx::{PgConnection, Pool, Postgres, QueryBuilder};

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookQuery, CreateBook, UpdateBook},
        pagination::PageRequest,
    },
    repository::contains_pattern,
};

const BOOK_COLUMNS: &str = "id, name, description, available_copies";

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &BookQuery) {
    builder.push(" WHERE 1=1");
    if let Some(ref name) = query.name {
        builder
            .push(" AND LOWER(name) LIKE ")
            .push_bind(contains_pattern(name));
    }
    if let Some(author_id) = query.author_id {
        builder
            .push(" AND EXISTS (SELECT 1 FROM book_authors ba WHERE ba.book_id = books.id AND ba.author_id = ")
            .push_bind(author_id)
            .push(")");
    }
}

/// Replace the author links of a book; every id must exist
async fn set_authors(conn: &mut PgConnection, book_id: i32, author_ids: &[i32]) -> AppResult<()> {
    let ids: Vec<i32> = author_ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();

    let found: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM authors WHERE id = ANY($1)")
        .bind(&ids)
        .fetch_one(&mut *conn)
        .await?;

    if found != ids.len() as i64 {
        return Err(AppError::NotFound("One or more authors do not exist".to_string()));
    }

    sqlx::query("DELETE FROM book_authors WHERE book_id = $1")
        .bind(book_id)
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        "INSERT INTO book_authors (book_id, author_id) SELECT $1, UNNEST($2::int4[])",
    )
    .bind(book_id)
    .bind(&ids)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get book by ID, without authors
    pub async fn get_by_id(&self, id: i32) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(&format!("SELECT {} FROM books WHERE id = $1", BOOK_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Search books with pagination
    pub async fn search(&self, query: &BookQuery, page: &PageRequest) -> AppResult<(Vec<Book>, i64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM books");
        push_filters(&mut count, query);
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM books", BOOK_COLUMNS));
        push_filters(&mut select, query);
        select.push(" ");
        select.push(page.order_clause());
        select.push(" ");
        select.push(page.limit_clause());

        let books = select.build_query_as::<Book>().fetch_all(&self.pool).await?;

        Ok((books, total))
    }

    /// Create a new book with its author links
    pub async fn create(&self, book: &CreateBook) -> AppResult<i32> {
        let mut tx = self.pool.begin().await?;

        let id: i32 = sqlx::query_scalar(
            "INSERT INTO books (name, description, available_copies) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(&book.name)
        .bind(&book.description)
        .bind(book.available_copies)
        .fetch_one(&mut *tx)
        .await?;

        set_authors(&mut *tx, id, &book.author_ids).await?;

        tx.commit().await?;
        Ok(id)
    }

    /// Update name, description and optionally the author list
    pub async fn update(&self, id: i32, book: &UpdateBook) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE books SET
                name = COALESCE($1, name),
                description = COALESCE($2, description)
            WHERE id = $3
            "#,
        )
        .bind(&book.name)
        .bind(&book.description)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }

        if let Some(ref author_ids) = book.author_ids {
            set_authors(&mut *tx, id, author_ids).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Delete a book and its loan history; refused while copies are out
    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT id FROM books WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))?;

        let active_loans: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM loans WHERE book_id = $1 AND status = 'LOANED'",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        if active_loans > 0 {
            return Err(AppError::BusinessRule(format!(
                "Book has {} active loan(s)",
                active_loans
            )));
        }

        sqlx::query("DELETE FROM loans WHERE book_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
