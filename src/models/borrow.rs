//! Borrow (ledger entry) model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use crate::error::{AppError, AppResult};

/// Ledger entry status.
///
/// `pending → approved → returned`, or `pending → rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BorrowStatus {
    Pending,
    Approved,
    Rejected,
    Returned,
}

impl BorrowStatus {
    /// Statuses that hold a (user, book) slot
    pub const OPEN: [BorrowStatus; 2] = [BorrowStatus::Pending, BorrowStatus::Approved];

    pub fn as_str(&self) -> &'static str {
        match self {
            BorrowStatus::Pending => "pending",
            BorrowStatus::Approved => "approved",
            BorrowStatus::Rejected => "rejected",
            BorrowStatus::Returned => "returned",
        }
    }

    pub fn is_open(&self) -> bool {
        Self::OPEN.contains(self)
    }

    pub fn can_transition_to(&self, next: BorrowStatus) -> bool {
        matches!(
            (self, next),
            (BorrowStatus::Pending, BorrowStatus::Approved)
                | (BorrowStatus::Pending, BorrowStatus::Rejected)
                | (BorrowStatus::Approved, BorrowStatus::Returned)
        )
    }

    /// `InvalidState` unless `self → next` is a legal ledger transition
    pub fn ensure_transition(&self, next: BorrowStatus) -> AppResult<()> {
        if self.can_transition_to(next) {
            return Ok(());
        }
        let message = match next {
            BorrowStatus::Approved | BorrowStatus::Rejected => {
                format!("Borrow request is not pending (status: {})", self)
            }
            BorrowStatus::Returned => format!("Book is not currently borrowed (status: {})", self),
            BorrowStatus::Pending => "A borrow cannot go back to pending".to_string(),
        };
        Err(AppError::InvalidState(message))
    }
}

impl std::str::FromStr for BorrowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(BorrowStatus::Pending),
            "approved" => Ok(BorrowStatus::Approved),
            "rejected" => Ok(BorrowStatus::Rejected),
            "returned" => Ok(BorrowStatus::Returned),
            _ => Err(format!("Invalid borrow status: {}", s)),
        }
    }
}

text_column!(BorrowStatus);

/// Borrow model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Borrow {
    pub id: i32,
    pub user_id: i32,
    pub book_id: i32,
    pub status: BorrowStatus,
    pub borrow_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub return_date: Option<DateTime<Utc>>,
    /// Librarian who approved or rejected the request
    pub approved_by: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Borrow {
    /// Approved and past its due date. Never stored.
    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        is_overdue(self.status, self.due_date, now)
    }

    pub fn is_overdue(&self) -> bool {
        self.is_overdue_at(Utc::now())
    }
}

pub fn is_overdue(status: BorrowStatus, due_date: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    status == BorrowStatus::Approved && due_date.map(|d| d < now).unwrap_or(false)
}

/// Values for a new ledger entry
#[derive(Debug, Clone)]
pub struct NewBorrow {
    pub user_id: i32,
    pub book_id: i32,
    pub borrow_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Internal row structure for joined ledger queries
#[derive(Debug, Clone, FromRow)]
pub struct BorrowDetailsRow {
    id: i32,
    user_id: i32,
    book_id: i32,
    status: BorrowStatus,
    borrow_date: Option<DateTime<Utc>>,
    due_date: Option<DateTime<Utc>>,
    return_date: Option<DateTime<Utc>>,
    approved_by: Option<i32>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    book_title: String,
    book_author: String,
    user_name: String,
    user_email: String,
    approver_name: Option<String>,
}

impl From<BorrowDetailsRow> for BorrowDetails {
    fn from(row: BorrowDetailsRow) -> Self {
        BorrowDetails {
            is_overdue: is_overdue(row.status, row.due_date, Utc::now()),
            id: row.id,
            user_id: row.user_id,
            book_id: row.book_id,
            status: row.status,
            borrow_date: row.borrow_date,
            due_date: row.due_date,
            return_date: row.return_date,
            approved_by: row.approved_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
            book_title: row.book_title,
            book_author: row.book_author,
            user_name: row.user_name,
            user_email: row.user_email,
            approver_name: row.approver_name,
        }
    }
}

/// Borrow with book, borrower and approver names for display
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BorrowDetails {
    pub id: i32,
    pub user_id: i32,
    pub book_id: i32,
    pub status: BorrowStatus,
    pub borrow_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub return_date: Option<DateTime<Utc>>,
    pub approved_by: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub book_title: String,
    pub book_author: String,
    pub user_name: String,
    pub user_email: String,
    pub approver_name: Option<String>,
    pub is_overdue: bool,
}

/// Ledger search parameters
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct BorrowQuery {
    /// Matches book title, borrower name, email or student ID
    pub search: Option<String>,
    /// pending, approved, rejected or returned
    pub status: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Approve request
#[derive(Debug, Deserialize, ToSchema)]
pub struct ApproveBorrow {
    /// Due date, strictly in the future. Defaults to the configured loan length.
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
}
