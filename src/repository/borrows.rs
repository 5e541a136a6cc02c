//! Borrows (ledger) repository: read side.
//!
//! State changes go through [`super::lending::LendingTx`]; this repository
//! only lists and counts ledger entries.

use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::borrow::{BorrowDetails, BorrowDetailsRow, BorrowQuery, BorrowStatus},
};

/// Ledger row joined with book, borrower and approver names
const DETAILS_SELECT: &str = r#"
    SELECT b.id, b.user_id, b.book_id, b.status, b.borrow_date, b.due_date, b.return_date,
           b.approved_by, b.created_at, b.updated_at,
           bk.title AS book_title, bk.author AS book_author,
           u.name AS user_name, u.email AS user_email,
           a.name AS approver_name
    FROM borrows b
    JOIN books bk ON bk.id = b.book_id
    JOIN users u ON u.id = b.user_id
    LEFT JOIN users a ON a.id = b.approved_by
"#;

#[derive(Clone)]
pub struct BorrowsRepository {
    pool: Pool<Postgres>,
}

impl BorrowsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get a ledger entry with display names
    pub async fn get_details(&self, id: i32) -> AppResult<BorrowDetails> {
        let query = format!("{} WHERE b.id = $1", DETAILS_SELECT);
        let row = sqlx::query_as::<_, BorrowDetailsRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Borrow with id {} not found", id)))?;

        Ok(row.into())
    }

    /// Filtered, paginated ledger search, newest first
    pub async fn search(&self, query: &BorrowQuery) -> AppResult<(Vec<BorrowDetails>, i64)> {
        let page = query.page.unwrap_or(1).max(1);
        let per_page = query.per_page.unwrap_or(20).clamp(1, 100);
        let offset = (page - 1) * per_page;

        let mut conditions = Vec::new();
        let mut params: Vec<String> = Vec::new();

        if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            params.push(format!("%{}%", search));
            let idx = params.len();
            conditions.push(format!(
                "(bk.title ILIKE ${idx} OR u.name ILIKE ${idx} OR u.email ILIKE ${idx} OR u.student_id ILIKE ${idx})"
            ));
        }

        if let Some(status) = query.status.as_deref().filter(|s| !s.is_empty()) {
            let status: BorrowStatus = status.parse().map_err(AppError::Validation)?;
            params.push(status.as_str().to_string());
            conditions.push(format!("b.status = ${}", params.len()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_query = format!(
            r#"
            SELECT COUNT(*)
            FROM borrows b
            JOIN books bk ON bk.id = b.book_id
            JOIN users u ON u.id = b.user_id
            {}
            "#,
            where_clause
        );
        let mut count_builder = sqlx::query_scalar::<_, i64>(&count_query);
        for param in &params {
            count_builder = count_builder.bind(param);
        }
        let total = count_builder.fetch_one(&self.pool).await?;

        let select_query = format!(
            "{} {} ORDER BY b.created_at DESC, b.id DESC LIMIT {} OFFSET {}",
            DETAILS_SELECT, where_clause, per_page, offset
        );
        let mut select_builder = sqlx::query_as::<_, BorrowDetailsRow>(&select_query);
        for param in &params {
            select_builder = select_builder.bind(param);
        }
        let rows = select_builder.fetch_all(&self.pool).await?;

        Ok((rows.into_iter().map(Into::into).collect(), total))
    }

    /// All entries in `status`; pending requests oldest first, others newest first
    pub async fn list_by_status(&self, status: BorrowStatus) -> AppResult<Vec<BorrowDetails>> {
        let order = match status {
            BorrowStatus::Pending => "b.created_at ASC, b.id ASC",
            BorrowStatus::Approved => "b.due_date ASC, b.id ASC",
            _ => "b.updated_at DESC, b.id DESC",
        };
        let query = format!("{} WHERE b.status = $1 ORDER BY {}", DETAILS_SELECT, order);
        let rows = sqlx::query_as::<_, BorrowDetailsRow>(&query)
            .bind(status)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Approved entries past their due date, most overdue first
    pub async fn overdue(&self) -> AppResult<Vec<BorrowDetails>> {
        let query = format!(
            "{} WHERE b.status = $1 AND b.due_date < NOW() ORDER BY b.due_date ASC, b.id ASC",
            DETAILS_SELECT
        );
        let rows = sqlx::query_as::<_, BorrowDetailsRow>(&query)
            .bind(BorrowStatus::Approved)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// A user's entries in any of `statuses`, newest first
    pub async fn user_borrows(&self, user_id: i32, statuses: &[BorrowStatus]) -> AppResult<Vec<BorrowDetails>> {
        let query = format!(
            "{} WHERE b.user_id = $1 AND b.status = ANY($2) ORDER BY b.created_at DESC, b.id DESC",
            DETAILS_SELECT
        );
        let rows = sqlx::query_as::<_, BorrowDetailsRow>(&query)
            .bind(user_id)
            .bind(statuses.iter().map(BorrowStatus::as_str).collect::<Vec<_>>())
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Full ledger history, newest first
    pub async fn history(&self) -> AppResult<Vec<BorrowDetails>> {
        let query = format!("{} ORDER BY b.created_at DESC, b.id DESC", DETAILS_SELECT);
        let rows = sqlx::query_as::<_, BorrowDetailsRow>(&query)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn count_by_status(&self, status: BorrowStatus) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM borrows WHERE status = $1")
            .bind(status)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn count_overdue(&self) -> AppResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM borrows WHERE status = $1 AND due_date < NOW()")
                .bind(BorrowStatus::Approved)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}
