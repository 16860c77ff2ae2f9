use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use skyfare_core::identity::Customer;

use crate::error::AppError;
use crate::state::AppState;

pub const CUSTOMER_ROLE: &str = "CUSTOMER";

/// Claims of a token issued by the identity store.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CustomerClaims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    pub role: String,
    pub exp: usize,
}

impl From<CustomerClaims> for Customer {
    fn from(claims: CustomerClaims) -> Self {
        Customer {
            id: claims.sub,
            email: claims.email,
            first_name: claims.first_name,
            last_name: claims.last_name,
        }
    }
}

/// Resolves the bearer token to a `Customer` extension, or rejects with
/// 401 (missing or invalid token) or 403 (not a customer).
pub async fn customer_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::AuthenticationError("Missing bearer token".to_string()))?;

    let token_data = decode::<CustomerClaims>(
        token,
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::debug!("Rejected token: {}", e);
        AppError::AuthenticationError("Invalid token".to_string())
    })?;

    if token_data.claims.role != CUSTOMER_ROLE {
        return Err(AppError::AuthorizationError(
            "Customer access required".to_string(),
        ));
    }

    req.extensions_mut().insert(Customer::from(token_data.claims));

    Ok(next.run(req).await)
}
