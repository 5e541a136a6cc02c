//! Librarian reports on the catalog and the ledger

use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::{
        book::BookBorrowCount,
        borrow::{BorrowDetails, BorrowStatus},
    },
    repository::Repository,
};

const TOP_BORROWED_LIMIT: i64 = 10;

#[derive(Debug, Serialize, ToSchema)]
pub struct BookReport {
    pub total_books: i64,
    /// Books with at least one free copy
    pub available_books: i64,
    pub unavailable_books: i64,
    pub top_borrowed: Vec<BookBorrowCount>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BorrowReport {
    pub active_count: i64,
    pub overdue_count: i64,
    pub pending_count: i64,
    /// Share of active borrows that are overdue, in percent
    pub overdue_percentage: f64,
    pub active: Vec<BorrowDetails>,
    pub overdue: Vec<BorrowDetails>,
    pub pending: Vec<BorrowDetails>,
}

#[derive(Clone)]
pub struct ReportsService {
    repository: Repository,
}

impl ReportsService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn book_report(&self) -> AppResult<BookReport> {
        let books = &self.repository.books;
        let total_books = books.count_all().await?;
        let available_books = books.count_available().await?;

        Ok(BookReport {
            total_books,
            available_books,
            unavailable_books: total_books - available_books,
            top_borrowed: books.top_borrowed(TOP_BORROWED_LIMIT).await?,
        })
    }

    pub async fn borrow_report(&self) -> AppResult<BorrowReport> {
        let borrows = &self.repository.borrows;
        let active_count = borrows.count_by_status(BorrowStatus::Approved).await?;
        let overdue_count = borrows.count_overdue().await?;

        Ok(BorrowReport {
            active_count,
            overdue_count,
            pending_count: borrows.count_by_status(BorrowStatus::Pending).await?,
            overdue_percentage: overdue_percentage(overdue_count, active_count),
            active: borrows.list_by_status(BorrowStatus::Approved).await?,
            overdue: borrows.overdue().await?,
            pending: borrows.list_by_status(BorrowStatus::Pending).await?,
        })
    }
}

fn overdue_percentage(overdue: i64, active: i64) -> f64 {
    if active == 0 {
        return 0.0;
    }
    overdue as f64 / active as f64 * 100.0
}
