//! Catalog service: books and their copy counts

use crate::{
    error::{AppError, AppResult},
    models::book::{Book, BookQuery, CreateBook, UpdateBook},
    repository::Repository,
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
    page_size: i64,
}

impl CatalogService {
    pub fn new(repository: Repository, page_size: i64) -> Self {
        Self { repository, page_size }
    }

    pub fn page_size(&self) -> i64 {
        self.page_size
    }

    /// Database round-trip for readiness probes
    pub async fn ping(&self) -> AppResult<()> {
        self.repository.ping().await
    }

    pub async fn get_book(&self, id: i32) -> AppResult<Book> {
        self.repository.books.get_by_id(id).await
    }

    /// Search books with pagination
    pub async fn search_books(&self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)> {
        self.repository.books.search(query, self.page_size).await
    }

    pub async fn recent_books(&self, limit: i64) -> AppResult<Vec<Book>> {
        self.repository.books.recent(limit).await
    }

    /// Add a book to the catalog with every copy available
    pub async fn create_book(&self, book: CreateBook, added_by: i32) -> AppResult<Book> {
        if self.repository.books.isbn_exists(&book.isbn, None).await? {
            return Err(AppError::Conflict(format!(
                "A book with ISBN '{}' already exists",
                book.isbn
            )));
        }

        let created = self.repository.books.create(&book, added_by).await?;
        tracing::info!("Book {} '{}' added by user {}", created.id, created.title, added_by);
        Ok(created)
    }

    /// Update a book; quantity edits shift availability by the same amount
    pub async fn update_book(&self, id: i32, book: UpdateBook) -> AppResult<Book> {
        if let Some(ref isbn) = book.isbn {
            if self.repository.books.isbn_exists(isbn, Some(id)).await? {
                return Err(AppError::Conflict(format!(
                    "A book with ISBN '{}' already exists",
                    isbn
                )));
            }
        }

        self.repository.books.update(id, &book).await
    }

    pub async fn delete_book(&self, id: i32) -> AppResult<()> {
        self.repository.books.delete(id).await?;
        tracing::info!("Book {} deleted", id);
        Ok(())
    }
}
