use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use skyfare_catalog::search::{self, FlightListQuery, FlightOption, FlightPage, HomePage};
use skyfare_catalog::{FlightSearchRequest, FlightSearchResult};
use skyfare_core::CoreError;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

/// Public catalog routes; no token required.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/home", get(home))
        .route("/v1/flights/search", post(search_flights))
        .route("/v1/flights", get(list_flights))
        .route("/v1/flights/{id}", get(get_flight))
        .route("/v1/cities", get(list_cities))
}

async fn home(State(state): State<AppState>) -> Result<Json<HomePage>, AppError> {
    let page = search::home_page(state.catalog.as_ref(), &state.pricing, Utc::now()).await?;
    Ok(Json(page))
}

async fn search_flights(
    State(state): State<AppState>,
    Json(req): Json<FlightSearchRequest>,
) -> Result<Json<FlightSearchResult>, AppError> {
    let result = search::search_flights(state.catalog.as_ref(), &state.pricing, &req).await?;
    Ok(Json(result))
}

async fn list_flights(
    State(state): State<AppState>,
    Query(query): Query<FlightListQuery>,
) -> Result<Json<FlightPage>, AppError> {
    let page =
        search::list_upcoming(state.catalog.as_ref(), &state.pricing, &query, Utc::now()).await?;
    Ok(Json(page))
}

async fn get_flight(
    State(state): State<AppState>,
    Path(flight_id): Path<Uuid>,
) -> Result<Json<FlightOption>, AppError> {
    let detail = state
        .catalog
        .get_flight(flight_id)
        .await?
        .ok_or_else(|| CoreError::not_found("Flight", flight_id))?;

    Ok(Json(FlightOption::from_detail(&detail, &state.pricing, 0)))
}

async fn list_cities(State(state): State<AppState>) -> Result<Json<Vec<String>>, AppError> {
    Ok(Json(state.catalog.list_cities().await?))
}
