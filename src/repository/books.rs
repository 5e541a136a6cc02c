//! Books (catalog) repository for database operations

use chrono::Utc;
use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::book::{adjusted_available, Book, BookBorrowCount, BookQuery, BookSearchField, CreateBook, UpdateBook},
};

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    // =========================================================================
    // READ
    // =========================================================================

    pub async fn get_by_id(&self, id: i32) -> AppResult<Book> {
        sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Search the catalog, ordered by title
    pub async fn search(&self, query: &BookQuery, page_size: i64) -> AppResult<(Vec<Book>, i64)> {
        let page = query.page.unwrap_or(1).max(1);
        let per_page = page_size.max(1);
        let offset = (page - 1) * per_page;

        let term = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        let where_clause = match term {
            Some(_) => format!(
                "WHERE {}",
                BookSearchField::from_param(query.search_by.as_deref()).predicate()
            ),
            None => String::new(),
        };
        let pattern = term.map(|t| format!("%{}%", t));

        let count_query = format!("SELECT COUNT(*) FROM books {}", where_clause);
        let mut count_builder = sqlx::query_scalar::<_, i64>(&count_query);
        if let Some(ref pattern) = pattern {
            count_builder = count_builder.bind(pattern);
        }
        let total = count_builder.fetch_one(&self.pool).await?;

        let select_query = format!(
            "SELECT * FROM books {} ORDER BY title, id LIMIT {} OFFSET {}",
            where_clause, per_page, offset
        );
        let mut select_builder = sqlx::query_as::<_, Book>(&select_query);
        if let Some(ref pattern) = pattern {
            select_builder = select_builder.bind(pattern);
        }
        let books = select_builder.fetch_all(&self.pool).await?;

        Ok((books, total))
    }

    /// Most recently added books
    pub async fn recent(&self, limit: i64) -> AppResult<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>("SELECT * FROM books ORDER BY created_at DESC, id DESC LIMIT $1")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(books)
    }

    /// Check if ISBN already exists
    pub async fn isbn_exists(&self, isbn: &str, exclude_id: Option<i32>) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM books WHERE isbn = $1 AND id IS DISTINCT FROM $2)",
        )
        .bind(isbn)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    // =========================================================================
    // WRITE
    // =========================================================================

    /// Create a book with every copy available
    pub async fn create(&self, book: &CreateBook, added_by: i32) -> AppResult<Book> {
        let now = Utc::now();

        sqlx::query_as::<_, Book>(
            r#"
            INSERT INTO books (
                title, author, isbn, publisher, publication_year, category,
                description, quantity, available, added_by, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8, $9, $10, $10)
            RETURNING *
            "#,
        )
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(&book.publisher)
        .bind(book.publication_year)
        .bind(&book.category)
        .bind(&book.description)
        .bind(book.quantity)
        .bind(added_by)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::on_unique_violation(e, || {
                AppError::Conflict(format!("A book with ISBN '{}' already exists", book.isbn))
            })
        })
    }

    /// Update a book. A quantity change moves `available` by the same amount,
    /// clamped to the new bounds, under a row lock.
    pub async fn update(&self, id: i32, book: &UpdateBook) -> AppResult<Book> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))?;

        let quantity = book.quantity.unwrap_or(current.quantity);
        let available = adjusted_available(current.available, current.quantity, quantity);

        let updated = sqlx::query_as::<_, Book>(
            r#"
            UPDATE books
            SET title = COALESCE($1, title),
                author = COALESCE($2, author),
                isbn = COALESCE($3, isbn),
                publisher = COALESCE($4, publisher),
                publication_year = COALESCE($5, publication_year),
                category = COALESCE($6, category),
                description = COALESCE($7, description),
                quantity = $8,
                available = $9,
                updated_at = NOW()
            WHERE id = $10
            RETURNING *
            "#,
        )
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(&book.publisher)
        .bind(book.publication_year)
        .bind(&book.category)
        .bind(&book.description)
        .bind(quantity)
        .bind(available)
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::on_unique_violation(e, || {
                AppError::Conflict("A book with this ISBN already exists".to_string())
            })
        })?;

        tx.commit().await?;

        if quantity != current.quantity {
            tracing::info!(
                "Book {} quantity {} -> {}, available {} -> {}",
                id, current.quantity, quantity, current.available, available
            );
        }

        Ok(updated)
    }

    /// Delete a book with its ledger and reservation rows.
    /// Refused while pending or approved borrows reference it.
    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query_scalar::<_, i32>("SELECT id FROM books WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))?;

        let open_borrows: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM borrows WHERE book_id = $1 AND status IN ('pending', 'approved')",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        if open_borrows > 0 {
            return Err(AppError::InvalidState(format!(
                "Book has {} pending or approved borrow(s)",
                open_borrows
            )));
        }

        sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    // =========================================================================
    // REPORTS
    // =========================================================================

    pub async fn count_all(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Books with at least one free copy
    pub async fn count_available(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books WHERE available > 0")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Books ranked by number of ledger entries, books never requested left out
    pub async fn top_borrowed(&self, limit: i64) -> AppResult<Vec<BookBorrowCount>> {
        let books = sqlx::query_as::<_, BookBorrowCount>(
            r#"
            SELECT b.id, b.title, b.author, b.isbn, b.quantity, b.available,
                   COUNT(br.id) AS borrow_count
            FROM books b
            JOIN borrows br ON br.book_id = b.id
            GROUP BY b.id
            ORDER BY borrow_count DESC, b.title
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(books)
    }
}
