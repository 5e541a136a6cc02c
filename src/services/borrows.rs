//! Ledger queries for the librarian desk and the student dashboard

use crate::{
    error::AppResult,
    models::borrow::{BorrowDetails, BorrowQuery, BorrowStatus},
    repository::Repository,
};

#[derive(Clone)]
pub struct BorrowsService {
    repository: Repository,
}

/// A student's borrows split by state
#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct UserBorrows {
    pub active: Vec<BorrowDetails>,
    pub pending: Vec<BorrowDetails>,
    pub past: Vec<BorrowDetails>,
}

impl BorrowsService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn get_borrow(&self, id: i32) -> AppResult<BorrowDetails> {
        self.repository.borrows.get_details(id).await
    }

    pub async fn search_borrows(&self, query: &BorrowQuery) -> AppResult<(Vec<BorrowDetails>, i64)> {
        self.repository.borrows.search(query).await
    }

    /// Requests waiting for a librarian, oldest first
    pub async fn pending(&self) -> AppResult<Vec<BorrowDetails>> {
        self.repository.borrows.list_by_status(BorrowStatus::Pending).await
    }

    /// Copies currently out, soonest due first
    pub async fn active(&self) -> AppResult<Vec<BorrowDetails>> {
        self.repository.borrows.list_by_status(BorrowStatus::Approved).await
    }

    pub async fn overdue(&self) -> AppResult<Vec<BorrowDetails>> {
        self.repository.borrows.overdue().await
    }

    pub async fn history(&self) -> AppResult<Vec<BorrowDetails>> {
        self.repository.borrows.history().await
    }

    pub async fn user_borrows(&self, user_id: i32) -> AppResult<UserBorrows> {
        // Verify user exists
        self.repository.users.get_by_id(user_id).await?;

        let borrows = &self.repository.borrows;
        Ok(UserBorrows {
            active: borrows.user_borrows(user_id, &[BorrowStatus::Approved]).await?,
            pending: borrows.user_borrows(user_id, &[BorrowStatus::Pending]).await?,
            past: borrows
                .user_borrows(user_id, &[BorrowStatus::Returned, BorrowStatus::Rejected])
                .await?,
        })
    }
}
