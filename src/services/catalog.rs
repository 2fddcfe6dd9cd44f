//! Catalog management service (books and authors)

use validator::Validate;

use crate::{
    error::AppResult,
    models::{
        author::{Author, AuthorQuery, CreateAuthor, UpdateAuthor},
        book::{Book, BookQuery, CreateBook, UpdateBook},
        pagination::PageRequest,
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
}

impl CatalogService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    // =========================================================================
    // BOOKS
    // =========================================================================

    /// Get book by ID with its authors
    pub async fn get_book(&self, id: i32) -> AppResult<Book> {
        let mut book = self.repository.books.get_by_id(id).await?;
        book.authors = self.repository.authors.get_for_book(id).await?;
        Ok(book)
    }

    /// Search books, each with its authors
    pub async fn search_books(&self, query: &BookQuery, page: &PageRequest) -> AppResult<(Vec<Book>, i64)> {
        let (mut books, total) = self.repository.books.search(query, page).await?;
        for book in books.iter_mut() {
            book.authors = self.repository.authors.get_for_book(book.id).await?;
        }
        Ok((books, total))
    }

    /// Create a new book
    pub async fn create_book(&self, book: CreateBook) -> AppResult<Book> {
        book.validate()?;
        let id = self.repository.books.create(&book).await?;
        tracing::info!(book_id = id, copies = book.available_copies, "Book created");
        self.get_book(id).await
    }

    /// Update an existing book
    pub async fn update_book(&self, id: i32, book: UpdateBook) -> AppResult<Book> {
        book.validate()?;
        self.repository.books.update(id, &book).await?;
        tracing::info!(book_id = id, "Book updated");
        self.get_book(id).await
    }

    /// Delete a book that has no copies out
    pub async fn delete_book(&self, id: i32) -> AppResult<()> {
        self.repository.books.delete(id).await?;
        tracing::info!(book_id = id, "Book deleted");
        Ok(())
    }

    // =========================================================================
    // AUTHORS
    // =========================================================================

    pub async fn get_author(&self, id: i32) -> AppResult<Author> {
        self.repository.authors.get_by_id(id).await
    }

    pub async fn search_authors(
        &self,
        query: &AuthorQuery,
        page: &PageRequest,
    ) -> AppResult<(Vec<Author>, i64)> {
        self.repository.authors.search(query, page).await
    }

    pub async fn create_author(&self, author: CreateAuthor) -> AppResult<Author> {
        author.validate()?;
        let created = self.repository.authors.create(&author).await?;
        tracing::info!(author_id = created.id, "Author created");
        Ok(created)
    }

    pub async fn update_author(&self, id: i32, author: UpdateAuthor) -> AppResult<Author> {
        author.validate()?;
        self.repository.authors.update(id, &author).await
    }

    /// Delete an author; the author is unlinked from its books
    pub async fn delete_author(&self, id: i32) -> AppResult<()> {
        self.repository.authors.delete(id).await?;
        tracing::info!(author_id = id, "Author deleted");
        Ok(())
    }
}
