use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use skyfare_catalog::{
    Aircraft, Airline, Airport, CatalogRepository, ClassType, Destination, Flight, FlightDetail,
    FlightFilter, FlightPlan, FlightStatus, Seat, SeatClass,
};
use skyfare_core::{CoreError, CoreResult};
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

use crate::database::{
    constraint_or_storage, foreign_key_violation, storage_error, unique_violation,
};

pub struct PgCatalogRepository {
    pool: PgPool,
}

impl PgCatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn seat_classes_for(&self, flight_ids: &[Uuid]) -> CoreResult<HashMap<Uuid, Vec<SeatClass>>> {
        let rows: Vec<SeatClassRow> = sqlx::query_as(
            r#"
            SELECT sc.id, sc.flight_id, sc.class_type, sc.price_multiplier, sc.baggage_allowance,
                   (SELECT COUNT(*) FROM seats s WHERE s.seat_class_id = sc.id AND s.is_available) AS available_seats
            FROM seat_classes sc
            WHERE sc.flight_id = ANY($1)
            "#,
        )
        .bind(flight_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error("Failed to load seat classes"))?;

        let mut by_flight: HashMap<Uuid, Vec<SeatClass>> = HashMap::new();
        for row in rows {
            let seat_class = row.into_seat_class()?;
            by_flight.entry(seat_class.flight_id).or_default().push(seat_class);
        }
        for classes in by_flight.values_mut() {
            classes.sort_by_key(|sc| sc.class_type);
        }
        Ok(by_flight)
    }

    async fn details(&self, rows: Vec<FlightRow>) -> CoreResult<Vec<FlightDetail>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut classes = self.seat_classes_for(&ids).await?;
        rows.into_iter()
            .map(|row| {
                let seat_classes = classes.remove(&row.id).unwrap_or_default();
                row.into_detail(seat_classes)
            })
            .collect()
    }
}

const FLIGHT_SELECT: &str = r#"
    SELECT f.id, f.flight_number, f.airline_id, f.aircraft_id,
           f.departure_airport_id, f.arrival_airport_id,
           f.departure_time, f.arrival_time, f.duration_minutes, f.base_price, f.status,
           av.available AS available_seats,
           al.code AS airline_code, al.name AS airline_name,
           ac.manufacturer AS aircraft_manufacturer, ac.model AS aircraft_model,
           ac.capacity AS aircraft_capacity,
           dep.code AS dep_code, dep.name AS dep_name, dep.city AS dep_city,
           dep.country AS dep_country, dep.timezone AS dep_timezone,
           arr.code AS arr_code, arr.name AS arr_name, arr.city AS arr_city,
           arr.country AS arr_country, arr.timezone AS arr_timezone
    FROM flights f
    JOIN airlines al ON al.id = f.airline_id
    JOIN aircraft ac ON ac.id = f.aircraft_id
    JOIN airports dep ON dep.id = f.departure_airport_id
    JOIN airports arr ON arr.id = f.arrival_airport_id
    CROSS JOIN LATERAL (
        SELECT COUNT(*) AS available FROM seats s WHERE s.flight_id = f.id AND s.is_available
    ) av
"#;

#[derive(sqlx::FromRow)]
struct FlightRow {
    id: Uuid,
    flight_number: String,
    airline_id: Uuid,
    aircraft_id: Uuid,
    departure_airport_id: Uuid,
    arrival_airport_id: Uuid,
    departure_time: DateTime<Utc>,
    arrival_time: DateTime<Utc>,
    duration_minutes: i32,
    base_price: Decimal,
    status: String,
    available_seats: i64,
    airline_code: String,
    airline_name: String,
    aircraft_manufacturer: String,
    aircraft_model: String,
    aircraft_capacity: i32,
    dep_code: String,
    dep_name: String,
    dep_city: String,
    dep_country: String,
    dep_timezone: String,
    arr_code: String,
    arr_name: String,
    arr_city: String,
    arr_country: String,
    arr_timezone: String,
}

impl FlightRow {
    fn into_detail(self, seat_classes: Vec<SeatClass>) -> CoreResult<FlightDetail> {
        Ok(FlightDetail {
            flight: Flight {
                id: self.id,
                flight_number: self.flight_number,
                airline_id: self.airline_id,
                aircraft_id: self.aircraft_id,
                departure_airport_id: self.departure_airport_id,
                arrival_airport_id: self.arrival_airport_id,
                departure_time: self.departure_time,
                arrival_time: self.arrival_time,
                duration_minutes: self.duration_minutes,
                base_price: self.base_price,
                status: self.status.parse::<FlightStatus>()?,
                available_seats: self.available_seats as i32,
            },
            airline: Airline {
                id: self.airline_id,
                code: self.airline_code,
                name: self.airline_name,
            },
            aircraft: Aircraft {
                id: self.aircraft_id,
                manufacturer: self.aircraft_manufacturer,
                model: self.aircraft_model,
                capacity: self.aircraft_capacity,
            },
            departure_airport: Airport {
                id: self.departure_airport_id,
                code: self.dep_code,
                name: self.dep_name,
                city: self.dep_city,
                country: self.dep_country,
                timezone: self.dep_timezone,
            },
            arrival_airport: Airport {
                id: self.arrival_airport_id,
                code: self.arr_code,
                name: self.arr_name,
                city: self.arr_city,
                country: self.arr_country,
                timezone: self.arr_timezone,
            },
            seat_classes,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SeatClassRow {
    id: Uuid,
    flight_id: Uuid,
    class_type: String,
    price_multiplier: Decimal,
    baggage_allowance: i32,
    available_seats: i64,
}

impl SeatClassRow {
    fn into_seat_class(self) -> CoreResult<SeatClass> {
        Ok(SeatClass {
            id: self.id,
            flight_id: self.flight_id,
            class_type: self.class_type.parse::<ClassType>()?,
            price_multiplier: self.price_multiplier,
            available_seats: self.available_seats as i32,
            baggage_allowance: self.baggage_allowance,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SeatRow {
    id: Uuid,
    flight_id: Uuid,
    seat_class_id: Uuid,
    seat_number: String,
    is_available: bool,
    is_window: bool,
    is_aisle: bool,
}

impl From<SeatRow> for Seat {
    fn from(row: SeatRow) -> Self {
        Seat {
            id: row.id,
            flight_id: row.flight_id,
            seat_class_id: row.seat_class_id,
            seat_number: row.seat_number,
            is_available: row.is_available,
            is_window: row.is_window,
            is_aisle: row.is_aisle,
        }
    }
}

/// `%needle%` for ILIKE, with the pattern characters escaped.
fn contains_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[async_trait]
impl CatalogRepository for PgCatalogRepository {
    async fn get_or_create_airport(&self, airport: &Airport) -> CoreResult<(Airport, bool)> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO airports (id, code, name, city, country, timezone)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (code) DO NOTHING
            "#,
        )
        .bind(airport.id)
        .bind(&airport.code)
        .bind(&airport.name)
        .bind(&airport.city)
        .bind(&airport.country)
        .bind(&airport.timezone)
        .execute(&self.pool)
        .await
        .map_err(storage_error("Failed to insert airport"))?
        .rows_affected()
            > 0;

        let (id, code, name, city, country, timezone): (Uuid, String, String, String, String, String) =
            sqlx::query_as(
                "SELECT id, code, name, city, country, timezone FROM airports WHERE code = $1",
            )
            .bind(&airport.code)
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error("Failed to load airport"))?;

        Ok((
            Airport {
                id,
                code,
                name,
                city,
                country,
                timezone,
            },
            inserted,
        ))
    }

    async fn get_or_create_airline(&self, airline: &Airline) -> CoreResult<(Airline, bool)> {
        let inserted = sqlx::query(
            "INSERT INTO airlines (id, code, name) VALUES ($1, $2, $3) ON CONFLICT (code) DO NOTHING",
        )
        .bind(airline.id)
        .bind(&airline.code)
        .bind(&airline.name)
        .execute(&self.pool)
        .await
        .map_err(storage_error("Failed to insert airline"))?
        .rows_affected()
            > 0;

        let (id, code, name): (Uuid, String, String) =
            sqlx::query_as("SELECT id, code, name FROM airlines WHERE code = $1")
                .bind(&airline.code)
                .fetch_one(&self.pool)
                .await
                .map_err(storage_error("Failed to load airline"))?;

        Ok((Airline { id, code, name }, inserted))
    }

    async fn get_or_create_aircraft(&self, aircraft: &Aircraft) -> CoreResult<(Aircraft, bool)> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO aircraft (id, manufacturer, model, capacity)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (manufacturer, model) DO NOTHING
            "#,
        )
        .bind(aircraft.id)
        .bind(&aircraft.manufacturer)
        .bind(&aircraft.model)
        .bind(aircraft.capacity)
        .execute(&self.pool)
        .await
        .map_err(storage_error("Failed to insert aircraft"))?
        .rows_affected()
            > 0;

        let (id, manufacturer, model, capacity): (Uuid, String, String, i32) = sqlx::query_as(
            "SELECT id, manufacturer, model, capacity FROM aircraft WHERE manufacturer = $1 AND model = $2",
        )
        .bind(&aircraft.manufacturer)
        .bind(&aircraft.model)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_error("Failed to load aircraft"))?;

        Ok((
            Aircraft {
                id,
                manufacturer,
                model,
                capacity,
            },
            inserted,
        ))
    }

    async fn insert_flight(&self, plan: &FlightPlan) -> CoreResult<()> {
        let flight = &plan.flight;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage_error("Failed to begin transaction"))?;

        let result = sqlx::query(
            r#"
            INSERT INTO flights (id, flight_number, airline_id, aircraft_id, departure_airport_id,
                                 arrival_airport_id, departure_time, arrival_time, duration_minutes,
                                 base_price, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(flight.id)
        .bind(&flight.flight_number)
        .bind(flight.airline_id)
        .bind(flight.aircraft_id)
        .bind(flight.departure_airport_id)
        .bind(flight.arrival_airport_id)
        .bind(flight.departure_time)
        .bind(flight.arrival_time)
        .bind(flight.duration_minutes)
        .bind(flight.base_price)
        .bind(flight.status.as_str())
        .execute(&mut *tx)
        .await;

        if let Err(e) = result {
            if unique_violation(&e).is_some() || foreign_key_violation(&e) {
                return Err(CoreError::ConstraintViolation(format!(
                    "flight {} departing {}: {}",
                    flight.flight_number, flight.departure_time, e
                )));
            }
            return Err(storage_error("Failed to insert flight")(e));
        }

        for seat_class in &plan.seat_classes {
            sqlx::query(
                r#"
                INSERT INTO seat_classes (id, flight_id, class_type, price_multiplier, baggage_allowance)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(seat_class.id)
            .bind(seat_class.flight_id)
            .bind(seat_class.class_type.as_str())
            .bind(seat_class.price_multiplier)
            .bind(seat_class.baggage_allowance)
            .execute(&mut *tx)
            .await
            .map_err(constraint_or_storage("Failed to insert seat class"))?;
        }

        let ids: Vec<Uuid> = plan.seats.iter().map(|s| s.id).collect();
        let flight_ids: Vec<Uuid> = plan.seats.iter().map(|s| s.flight_id).collect();
        let class_ids: Vec<Uuid> = plan.seats.iter().map(|s| s.seat_class_id).collect();
        let numbers: Vec<String> = plan.seats.iter().map(|s| s.seat_number.clone()).collect();
        let available: Vec<bool> = plan.seats.iter().map(|s| s.is_available).collect();
        let window: Vec<bool> = plan.seats.iter().map(|s| s.is_window).collect();
        let aisle: Vec<bool> = plan.seats.iter().map(|s| s.is_aisle).collect();

        sqlx::query(
            r#"
            INSERT INTO seats (id, flight_id, seat_class_id, seat_number, is_available, is_window, is_aisle)
            SELECT * FROM UNNEST($1::uuid[], $2::uuid[], $3::uuid[], $4::text[], $5::bool[], $6::bool[], $7::bool[])
            "#,
        )
        .bind(&ids)
        .bind(&flight_ids)
        .bind(&class_ids)
        .bind(&numbers)
        .bind(&available)
        .bind(&window)
        .bind(&aisle)
        .execute(&mut *tx)
        .await
        .map_err(constraint_or_storage("Failed to insert seats"))?;

        tx.commit()
            .await
            .map_err(storage_error("Failed to commit flight"))?;
        Ok(())
    }

    async fn find_flights(&self, filter: &FlightFilter) -> CoreResult<Vec<FlightDetail>> {
        let sql = format!(
            r#"{}
            WHERE ($1::text IS NULL OR dep.city ILIKE $1)
              AND ($2::text IS NULL OR arr.city ILIKE $2)
              AND ($3::date IS NULL OR (f.departure_time AT TIME ZONE 'UTC')::date = $3)
              AND ($4::timestamptz IS NULL OR f.departure_time > $4)
              AND ($5::timestamptz IS NULL OR f.departure_time <= $5)
              AND ($6::text IS NULL OR f.status = $6)
              AND av.available >= $7
            ORDER BY f.departure_time, f.flight_number
            LIMIT $8 OFFSET $9
            "#,
            FLIGHT_SELECT
        );

        let rows: Vec<FlightRow> = sqlx::query_as(&sql)
            .bind(filter.departure_city.as_deref().map(contains_pattern))
            .bind(filter.arrival_city.as_deref().map(contains_pattern))
            .bind(filter.departure_date)
            .bind(filter.departing_after)
            .bind(filter.departing_before)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.min_available as i64)
            .bind(filter.limit)
            .bind(filter.offset.max(0))
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error("Failed to search flights"))?;

        self.details(rows).await
    }

    async fn get_flight(&self, id: Uuid) -> CoreResult<Option<FlightDetail>> {
        let sql = format!("{} WHERE f.id = $1", FLIGHT_SELECT);
        let row: Option<FlightRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error("Failed to load flight"))?;

        match row {
            Some(row) => Ok(self.details(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_seats(&self, flight_id: Uuid, seat_class_id: Option<Uuid>) -> CoreResult<Vec<Seat>> {
        let rows: Vec<SeatRow> = sqlx::query_as(
            r#"
            SELECT id, flight_id, seat_class_id, seat_number, is_available, is_window, is_aisle
            FROM seats
            WHERE flight_id = $1 AND ($2::uuid IS NULL OR seat_class_id = $2)
            ORDER BY length(seat_number), seat_number
            "#,
        )
        .bind(flight_id)
        .bind(seat_class_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error("Failed to list seats"))?;

        Ok(rows.into_iter().map(Seat::from).collect())
    }

    async fn list_cities(&self) -> CoreResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT DISTINCT city FROM airports ORDER BY city")
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error("Failed to list cities"))?;
        Ok(rows.into_iter().map(|(city,)| city).collect())
    }

    async fn count_flights(&self) -> CoreResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM flights")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error("Failed to count flights"))?;
        Ok(count)
    }

    async fn popular_destinations(&self, limit: i64) -> CoreResult<Vec<Destination>> {
        let rows: Vec<(Uuid, String, String, String, String, String, i64)> = sqlx::query_as(
            r#"
            SELECT a.id, a.code, a.name, a.city, a.country, a.timezone, COUNT(f.id) AS flight_count
            FROM airports a
            LEFT JOIN flights f ON f.arrival_airport_id = a.id
            GROUP BY a.id
            ORDER BY flight_count DESC, a.code
            LIMIT $1
            "#,
        )
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error("Failed to rank destinations"))?;

        Ok(rows
            .into_iter()
            .map(|(id, code, name, city, country, timezone, flight_count)| Destination {
                airport: Airport {
                    id,
                    code,
                    name,
                    city,
                    country,
                    timezone,
                },
                flight_count,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern("York"), "%York%");
        assert_eq!(contains_pattern("50%_off"), "%50\\%\\_off%");
    }
}
