//! Book (catalog) model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

/// Book model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i32,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub publisher: Option<String>,
    pub publication_year: Option<i32>,
    pub category: Option<String>,
    pub description: Option<String>,
    /// Total owned copies
    pub quantity: i32,
    /// Copies not currently lent
    pub available: i32,
    /// Librarian who added the book
    pub added_by: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    pub fn is_available(&self) -> bool {
        self.available > 0
    }

    /// Copies currently out on approved borrows
    pub fn lent_copies(&self) -> i32 {
        self.quantity - self.available
    }
}

/// Availability after the owned quantity changes from `old_quantity` to `new_quantity`.
///
/// The difference is applied to the current availability, then clamped to
/// `0..=new_quantity` so a shrinking catalog never reports more free copies
/// than it owns nor a negative count.
pub fn adjusted_available(available: i32, old_quantity: i32, new_quantity: i32) -> i32 {
    let upper = new_quantity.max(0);
    (available + (new_quantity - old_quantity)).clamp(0, upper)
}

/// Field targeted by a catalog search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BookSearchField {
    Title,
    Author,
    Isbn,
    Category,
    /// Title, author or ISBN
    #[default]
    All,
}

impl BookSearchField {
    pub fn from_param(value: Option<&str>) -> Self {
        match value.map(str::to_lowercase).as_deref() {
            Some("title") => BookSearchField::Title,
            Some("author") => BookSearchField::Author,
            Some("isbn") => BookSearchField::Isbn,
            Some("category") => BookSearchField::Category,
            _ => BookSearchField::All,
        }
    }

    /// SQL predicate matching the `$1` pattern
    pub fn predicate(&self) -> &'static str {
        match self {
            BookSearchField::Title => "title ILIKE $1",
            BookSearchField::Author => "author ILIKE $1",
            BookSearchField::Isbn => "isbn ILIKE $1",
            BookSearchField::Category => "category ILIKE $1",
            BookSearchField::All => "(title ILIKE $1 OR author ILIKE $1 OR isbn ILIKE $1)",
        }
    }
}

/// Book query parameters
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct BookQuery {
    /// Search term (case-insensitive substring)
    pub search: Option<String>,
    /// title, author, isbn, category or all
    pub search_by: Option<String>,
    pub page: Option<i64>,
}

/// Create book request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[validate(length(min = 1, max = 255, message = "Title is required"))]
    pub title: String,
    #[validate(length(min = 1, max = 100, message = "Author is required"))]
    pub author: String,
    #[validate(length(min = 10, max = 20, message = "ISBN must be 10 to 20 characters"))]
    pub isbn: String,
    pub publisher: Option<String>,
    #[validate(range(min = 0, max = 9999, message = "Invalid publication year"))]
    pub publication_year: Option<i32>,
    pub category: Option<String>,
    pub description: Option<String>,
    #[validate(range(min = 1, message = "Quantity must be a positive number"))]
    pub quantity: i32,
}

/// Update book request
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateBook {
    #[validate(length(min = 1, max = 255, message = "Title cannot be empty"))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 100, message = "Author cannot be empty"))]
    pub author: Option<String>,
    #[validate(length(min = 10, max = 20, message = "ISBN must be 10 to 20 characters"))]
    pub isbn: Option<String>,
    pub publisher: Option<String>,
    #[validate(range(min = 0, max = 9999, message = "Invalid publication year"))]
    pub publication_year: Option<i32>,
    pub category: Option<String>,
    pub description: Option<String>,
    #[validate(range(min = 1, message = "Quantity must be a positive number"))]
    pub quantity: Option<i32>,
}

/// Book with its lifetime borrow count (reports)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BookBorrowCount {
    pub id: i32,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub quantity: i32,
    pub available: i32,
    pub borrow_count: i64,
}
