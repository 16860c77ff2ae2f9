use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use skyfare_booking::manager::{
    AssignSeatsRequest, BaggageRequest, BookingSummary, CreateBookingRequest, Dashboard,
    PaymentConfirmation, PaymentInput, SeatMap,
};
use skyfare_booking::models::{AssignmentOutcome, CancellationSummary};
use skyfare_booking::{Baggage, BookingDetail};
use skyfare_core::identity::Customer;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::customer_auth_middleware;
use crate::state::AppState;

#[derive(Debug, Serialize)]
struct SeatAssignmentResponse {
    booking_id: Uuid,
    assigned: usize,
    results: Vec<AssignmentOutcome>,
}

/// Routes acting on the caller's own bookings; all require a customer token.
pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/v1/flights/{id}/bookings", post(create_booking))
        .route("/v1/bookings", get(list_bookings))
        .route("/v1/bookings/{id}", get(get_booking))
        .route("/v1/bookings/{id}/seats", get(seat_map).post(assign_seats))
        .route("/v1/bookings/{id}/payment", post(pay_booking))
        .route("/v1/bookings/{id}/cancel", post(cancel_booking))
        .route(
            "/v1/bookings/{id}/passengers/{passenger_id}/baggage",
            post(add_baggage),
        )
        .route("/v1/dashboard", get(dashboard))
        .route_layer(middleware::from_fn_with_state(state, customer_auth_middleware))
}

async fn create_booking(
    State(state): State<AppState>,
    Extension(customer): Extension<Customer>,
    Path(flight_id): Path<Uuid>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingDetail>), AppError> {
    let detail = state.bookings.create_booking(&customer, flight_id, &req).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

async fn list_bookings(
    State(state): State<AppState>,
    Extension(customer): Extension<Customer>,
) -> Result<Json<Vec<BookingSummary>>, AppError> {
    Ok(Json(state.bookings.list_bookings(&customer).await?))
}

async fn get_booking(
    State(state): State<AppState>,
    Extension(customer): Extension<Customer>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<BookingDetail>, AppError> {
    Ok(Json(state.bookings.get_booking(&customer, booking_id).await?))
}

async fn seat_map(
    State(state): State<AppState>,
    Extension(customer): Extension<Customer>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<SeatMap>, AppError> {
    Ok(Json(state.bookings.seat_map(&customer, booking_id).await?))
}

async fn assign_seats(
    State(state): State<AppState>,
    Extension(customer): Extension<Customer>,
    Path(booking_id): Path<Uuid>,
    Json(req): Json<AssignSeatsRequest>,
) -> Result<Json<SeatAssignmentResponse>, AppError> {
    let results = state
        .bookings
        .assign_seats(&customer, booking_id, &req.assignments)
        .await?;
    let assigned = results.iter().filter(|r| r.assigned).count();
    info!(
        "Booking {}: {} of {} seat assignments applied",
        booking_id,
        assigned,
        results.len()
    );

    Ok(Json(SeatAssignmentResponse {
        booking_id,
        assigned,
        results,
    }))
}

async fn pay_booking(
    State(state): State<AppState>,
    Extension(customer): Extension<Customer>,
    Path(booking_id): Path<Uuid>,
    Json(req): Json<PaymentInput>,
) -> Result<Json<PaymentConfirmation>, AppError> {
    let confirmation = state
        .bookings
        .pay(&customer, booking_id, req.payment_method)
        .await?;
    Ok(Json(confirmation))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Extension(customer): Extension<Customer>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<CancellationSummary>, AppError> {
    Ok(Json(state.bookings.cancel(&customer, booking_id).await?))
}

async fn add_baggage(
    State(state): State<AppState>,
    Extension(customer): Extension<Customer>,
    Path((booking_id, passenger_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<BaggageRequest>,
) -> Result<(StatusCode, Json<Baggage>), AppError> {
    let baggage = state
        .bookings
        .add_baggage(&customer, booking_id, passenger_id, req.weight)
        .await?;
    Ok((StatusCode::CREATED, Json(baggage)))
}

async fn dashboard(
    State(state): State<AppState>,
    Extension(customer): Extension<Customer>,
) -> Result<Json<Dashboard>, AppError> {
    Ok(Json(state.bookings.dashboard(&customer, Utc::now()).await?))
}
