//! Borrow (ledger) endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::{
    error::AppResult,
    models::borrow::{ApproveBorrow, Borrow, BorrowDetails, BorrowQuery},
    services::borrows::UserBorrows,
    AppState,
};

use super::{AuthenticatedUser, PaginatedResponse};

/// Search the ledger
#[utoipa::path(
    get,
    path = "/borrows",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(BorrowQuery),
    responses(
        (status = 200, description = "Ledger entries, newest first", body = PaginatedResponse<BorrowDetails>),
        (status = 403, description = "Librarian privileges required")
    )
)]
pub async fn list_borrows(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<BorrowQuery>,
) -> AppResult<Json<PaginatedResponse<BorrowDetails>>> {
    claims.require_librarian()?;

    let (borrows, total) = state.services.borrows.search_borrows(&query).await?;

    Ok(Json(PaginatedResponse {
        items: borrows,
        total,
        page: query.page.unwrap_or(1).max(1),
        per_page: query.per_page.unwrap_or(20).clamp(1, 100),
    }))
}

/// Requests waiting for approval
#[utoipa::path(
    get,
    path = "/borrows/pending",
    tag = "borrows",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Pending requests, oldest first", body = Vec<BorrowDetails>)
    )
)]
pub async fn pending_borrows(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<BorrowDetails>>> {
    claims.require_librarian()?;
    Ok(Json(state.services.borrows.pending().await?))
}

/// Copies currently out
#[utoipa::path(
    get,
    path = "/borrows/active",
    tag = "borrows",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Approved borrows, soonest due first", body = Vec<BorrowDetails>)
    )
)]
pub async fn active_borrows(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<BorrowDetails>>> {
    claims.require_librarian()?;
    Ok(Json(state.services.borrows.active().await?))
}

/// Approved borrows past their due date
#[utoipa::path(
    get,
    path = "/borrows/overdue",
    tag = "borrows",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Overdue borrows", body = Vec<BorrowDetails>)
    )
)]
pub async fn overdue_borrows(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<BorrowDetails>>> {
    claims.require_librarian()?;
    Ok(Json(state.services.borrows.overdue().await?))
}

/// Full ledger history
#[utoipa::path(
    get,
    path = "/borrows/history",
    tag = "borrows",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Every ledger entry, newest first", body = Vec<BorrowDetails>)
    )
)]
pub async fn borrow_history(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<BorrowDetails>>> {
    claims.require_librarian()?;
    Ok(Json(state.services.borrows.history().await?))
}

/// The caller's borrows
#[utoipa::path(
    get,
    path = "/borrows/mine",
    tag = "borrows",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Active, pending and past borrows", body = UserBorrows)
    )
)]
pub async fn my_borrows(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<UserBorrows>> {
    Ok(Json(state.services.borrows.user_borrows(claims.user_id).await?))
}

/// A user's borrows
#[utoipa::path(
    get,
    path = "/users/{id}/borrows",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "Active, pending and past borrows", body = UserBorrows),
        (status = 404, description = "User not found")
    )
)]
pub async fn user_borrows(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(user_id): Path<i32>,
) -> AppResult<Json<UserBorrows>> {
    claims.require_self_or_librarian(user_id)?;
    Ok(Json(state.services.borrows.user_borrows(user_id).await?))
}

/// Get a ledger entry
#[utoipa::path(
    get,
    path = "/borrows/{id}",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Borrow ID")
    ),
    responses(
        (status = 200, description = "Borrow details", body = BorrowDetails),
        (status = 404, description = "Borrow not found")
    )
)]
pub async fn get_borrow(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<BorrowDetails>> {
    let borrow = state.services.borrows.get_borrow(id).await?;
    claims.require_self_or_librarian(borrow.user_id)?;
    Ok(Json(borrow))
}

/// Approve a pending request
#[utoipa::path(
    post,
    path = "/borrows/{id}/approve",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Borrow ID")
    ),
    request_body = ApproveBorrow,
    responses(
        (status = 200, description = "Borrow approved", body = Borrow),
        (status = 400, description = "Due date not in the future"),
        (status = 404, description = "Borrow not found"),
        (status = 409, description = "Not pending or no copies available")
    )
)]
pub async fn approve_borrow(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(request): Json<ApproveBorrow>,
) -> AppResult<Json<Borrow>> {
    claims.require_librarian()?;

    let lending = &state.services.lending;
    let due_date = request.due_date.unwrap_or_else(|| lending.default_due_date());
    let borrow = lending.approve(id, claims.user_id, due_date).await?;
    Ok(Json(borrow))
}

/// Reject a pending request
#[utoipa::path(
    post,
    path = "/borrows/{id}/reject",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Borrow ID")
    ),
    responses(
        (status = 200, description = "Borrow rejected", body = Borrow),
        (status = 404, description = "Borrow not found"),
        (status = 409, description = "Not pending")
    )
)]
pub async fn reject_borrow(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Borrow>> {
    claims.require_librarian()?;

    let borrow = state.services.lending.reject(id, claims.user_id).await?;
    Ok(Json(borrow))
}

/// Return a borrowed copy (borrower or librarian)
#[utoipa::path(
    post,
    path = "/borrows/{id}/return",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Borrow ID")
    ),
    responses(
        (status = 200, description = "Copy returned", body = Borrow),
        (status = 403, description = "Not your borrow"),
        (status = 404, description = "Borrow not found"),
        (status = 409, description = "Not currently borrowed")
    )
)]
pub async fn return_borrow(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Borrow>> {
    let borrower = if claims.is_librarian() { None } else { Some(claims.user_id) };

    let borrow = state.services.lending.return_borrow(id, borrower).await?;
    Ok(Json(borrow))
}
