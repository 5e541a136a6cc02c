//! Report endpoints (librarian)

use axum::{extract::State, Json};

use crate::{
    error::AppResult,
    services::reports::{BookReport, BorrowReport},
    AppState,
};

use super::AuthenticatedUser;

/// Catalog report
#[utoipa::path(
    get,
    path = "/reports/books",
    tag = "reports",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Catalog counts and most borrowed books", body = BookReport),
        (status = 403, description = "Librarian privileges required")
    )
)]
pub async fn book_report(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<BookReport>> {
    claims.require_librarian()?;
    Ok(Json(state.services.reports.book_report().await?))
}

/// Ledger report
#[utoipa::path(
    get,
    path = "/reports/borrows",
    tag = "reports",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Active, overdue and pending borrows", body = BorrowReport),
        (status = 403, description = "Librarian privileges required")
    )
)]
pub async fn borrow_report(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<BorrowReport>> {
    claims.require_librarian()?;
    Ok(Json(state.services.reports.borrow_report().await?))
}
