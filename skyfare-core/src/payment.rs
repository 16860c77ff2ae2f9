use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CreditCard,
    DebitCard,
    Paypal,
    BankTransfer,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::DebitCard => "debit_card",
            PaymentMethod::Paypal => "paypal",
            PaymentMethod::BankTransfer => "bank_transfer",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credit_card" => Ok(PaymentMethod::CreditCard),
            "debit_card" => Ok(PaymentMethod::DebitCard),
            "paypal" => Ok(PaymentMethod::Paypal),
            "bank_transfer" => Ok(PaymentMethod::BankTransfer),
            other => Err(CoreError::ValidationError(format!(
                "unknown payment method '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "processing" => Ok(PaymentStatus::Processing),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(CoreError::ValidationError(format!(
                "unknown payment status '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub booking_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub method: PaymentMethod,
    /// One key per charge attempt; a retried request with the same key must
    /// return the original receipt instead of charging again.
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub transaction_id: String,
    pub status: PaymentStatus,
    pub processed_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Charge the customer for a booking.
    async fn charge(&self, request: &PaymentRequest) -> CoreResult<PaymentReceipt>;
}

/// Completes every charge on the spot. Stands in for a card processor until
/// one is wired up; no external call is made.
pub struct OfflineGateway;

#[async_trait]
impl PaymentGateway for OfflineGateway {
    async fn charge(&self, request: &PaymentRequest) -> CoreResult<PaymentReceipt> {
        if request.amount.is_sign_negative() {
            return Err(CoreError::ValidationError(
                "payment amount must not be negative".to_string(),
            ));
        }

        let transaction_id = Uuid::new_v4().to_string();
        tracing::info!(
            "Offline gateway accepted {} {} via {} for booking {} (key {}, txn {})",
            request.amount,
            request.currency,
            request.method,
            request.booking_id,
            request.idempotency_key,
            transaction_id
        );

        Ok(PaymentReceipt {
            transaction_id,
            status: PaymentStatus::Completed,
            processed_at: Some(Utc::now()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_round_trip_through_text() {
        for method in [
            PaymentMethod::CreditCard,
            PaymentMethod::DebitCard,
            PaymentMethod::Paypal,
            PaymentMethod::BankTransfer,
        ] {
            assert_eq!(method.as_str().parse::<PaymentMethod>().unwrap(), method);
        }
        assert!("cash".parse::<PaymentMethod>().is_err());
    }

    #[tokio::test]
    async fn test_offline_gateway_completes() {
        let receipt = OfflineGateway
            .charge(&PaymentRequest {
                booking_id: Uuid::new_v4(),
                amount: Decimal::new(12_500, 2),
                currency: "USD".to_string(),
                method: PaymentMethod::Paypal,
                idempotency_key: Uuid::new_v4().to_string(),
            })
            .await
            .unwrap();

        assert_eq!(receipt.status, PaymentStatus::Completed);
        assert!(receipt.processed_at.is_some());
        assert!(Uuid::parse_str(&receipt.transaction_id).is_ok());
    }
}
