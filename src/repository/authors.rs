//! Authors repository for database operations

use sqlx::{Pool, Postgres, QueryBuilder};

use crate::{
    error::{map_unique_violation, AppError, AppResult},
    models::{
        author::{Author, AuthorQuery, CreateAuthor, UpdateAuthor},
        pagination::PageRequest,
    },
    repository::contains_pattern,
};

const AUTHOR_COLUMNS: &str = "id, firstname, lastname, birth_date, biography, picture_url";

fn duplicate_author(firstname: Option<&str>, lastname: &str) -> AppError {
    let name = match firstname {
        Some(first) => format!("{} {}", first, lastname),
        None => lastname.to_string(),
    };
    AppError::AlreadyExists(format!("Author {} already exists", name))
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, pattern: Option<&str>) {
    builder.push(" WHERE 1=1");
    if let Some(pattern) = pattern {
        builder
            .push(" AND (LOWER(firstname) LIKE ")
            .push_bind(pattern.to_string())
            .push(" OR LOWER(lastname) LIKE ")
            .push_bind(pattern.to_string())
            .push(")");
    }
}

#[derive(Clone)]
pub struct AuthorsRepository {
    pool: Pool<Postgres>,
}

impl AuthorsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get author by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Author> {
        sqlx::query_as::<_, Author>(&format!("SELECT {} FROM authors WHERE id = $1", AUTHOR_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Author with id {} not found", id)))
    }

    /// Authors of a book, by last name
    pub async fn get_for_book(&self, book_id: i32) -> AppResult<Vec<Author>> {
        let authors = sqlx::query_as::<_, Author>(
            r#"
            SELECT a.id, a.firstname, a.lastname, a.birth_date, a.biography, a.picture_url
            FROM book_authors ba
            JOIN authors a ON a.id = ba.author_id
            WHERE ba.book_id = $1
            ORDER BY a.lastname, a.firstname
            "#,
        )
        .bind(book_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(authors)
    }

    /// Search authors with pagination
    pub async fn search(&self, query: &AuthorQuery, page: &PageRequest) -> AppResult<(Vec<Author>, i64)> {
        let pattern = query.name.as_deref().map(contains_pattern);

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM authors");
        push_filters(&mut count, pattern.as_deref());
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut select =
            QueryBuilder::<Postgres>::new(format!("SELECT {} FROM authors", AUTHOR_COLUMNS));
        push_filters(&mut select, pattern.as_deref());
        select.push(" ");
        select.push(page.order_clause());
        select.push(" ");
        select.push(page.limit_clause());

        let authors = select.build_query_as::<Author>().fetch_all(&self.pool).await?;

        Ok((authors, total))
    }

    /// Create a new author
    pub async fn create(&self, author: &CreateAuthor) -> AppResult<Author> {
        sqlx::query_as::<_, Author>(&format!(
            r#"
            INSERT INTO authors (firstname, lastname, birth_date, biography, picture_url)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            AUTHOR_COLUMNS
        ))
        .bind(&author.firstname)
        .bind(&author.lastname)
        .bind(author.birth_date)
        .bind(&author.biography)
        .bind(&author.picture_url)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            map_unique_violation(e, || {
                duplicate_author(author.firstname.as_deref(), &author.lastname)
            })
        })
    }

    /// Update an existing author; absent fields keep their value
    pub async fn update(&self, id: i32, author: &UpdateAuthor) -> AppResult<Author> {
        sqlx::query_as::<_, Author>(&format!(
            r#"
            UPDATE authors SET
                firstname = COALESCE($1, firstname),
                lastname = COALESCE($2, lastname),
                birth_date = COALESCE($3, birth_date),
                biography = COALESCE($4, biography),
                picture_url = COALESCE($5, picture_url)
            WHERE id = $6
            RETURNING {}
            "#,
            AUTHOR_COLUMNS
        ))
        .bind(&author.firstname)
        .bind(&author.lastname)
        .bind(author.birth_date)
        .bind(&author.biography)
        .bind(&author.picture_url)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            map_unique_violation(e, || {
                AppError::AlreadyExists("Another author already has this name".to_string())
            })
        })?
        .ok_or_else(|| AppError::NotFound(format!("Author with id {} not found", id)))
    }

    /// Delete an author (book links cascade)
    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM authors WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Author with id {} not found", id)));
        }

        Ok(())
    }
}
