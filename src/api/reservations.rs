//! Reservation endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::reservation::{Reservation, ReservationDetails},
    AppState,
};

use super::AuthenticatedUser;

#[derive(Serialize, ToSchema)]
pub struct ExpireResponse {
    /// Reservations moved to expired
    pub expired: u64,
}

/// The caller's reservations
#[utoipa::path(
    get,
    path = "/reservations/mine",
    tag = "reservations",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Reservations, newest first", body = Vec<ReservationDetails>)
    )
)]
pub async fn my_reservations(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<ReservationDetails>>> {
    let reservations = state.services.reservations.user_reservations(claims.user_id).await?;
    Ok(Json(reservations))
}

/// Cancel one of the caller's reservations
#[utoipa::path(
    post,
    path = "/reservations/{id}/cancel",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Reservation ID")
    ),
    responses(
        (status = 200, description = "Reservation cancelled", body = Reservation),
        (status = 404, description = "Reservation not found"),
        (status = 409, description = "Reservation not active")
    )
)]
pub async fn cancel_reservation(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Reservation>> {
    let reservation = state.services.lending.cancel(id, claims.user_id).await?;
    Ok(Json(reservation))
}

/// Run the reservation expiry sweep now
#[utoipa::path(
    post,
    path = "/reservations/expire",
    tag = "reservations",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Sweep completed", body = ExpireResponse),
        (status = 403, description = "Librarian privileges required")
    )
)]
pub async fn expire_reservations(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<ExpireResponse>> {
    claims.require_librarian()?;

    let expired = state.services.lending.expire_sweep().await?;
    Ok(Json(ExpireResponse { expired }))
}
