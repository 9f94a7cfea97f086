use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreditTransactionType {
    Bonus,
    Purchase,
    Usage,
    Refund,
}

impl CreditTransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreditTransactionType::Bonus => "bonus",
            CreditTransactionType::Purchase => "purchase",
            CreditTransactionType::Usage => "usage",
            CreditTransactionType::Refund => "refund",
        }
    }
}

impl fmt::Display for CreditTransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only ledger row. `amount` is signed: positive for credits, negative for debits.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CreditTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: i64,
    #[serde(rename = "type")]
    pub transaction_type: String,
    pub description: Option<String>,
    pub payment_id: Option<Uuid>,
    pub generation_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// A requested balance change. `amount` is always the positive magnitude;
/// the direction comes from the ledger operation applied.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub user_id: Uuid,
    pub amount: i64,
    pub transaction_type: CreditTransactionType,
    pub description: String,
    pub payment_id: Option<Uuid>,
    pub generation_id: Option<Uuid>,
}

impl LedgerEntry {
    pub fn new(
        user_id: Uuid,
        amount: i64,
        transaction_type: CreditTransactionType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            amount,
            transaction_type,
            description: description.into(),
            payment_id: None,
            generation_id: None,
        }
    }

    pub fn with_payment(mut self, payment_id: Uuid) -> Self {
        self.payment_id = Some(payment_id);
        self
    }

    pub fn with_generation(mut self, generation_id: Uuid) -> Self {
        self.generation_id = Some(generation_id);
        self
    }
}

#[derive(Debug, Clone)]
pub struct LedgerReceipt {
    pub transaction: CreditTransaction,
    pub balance: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BalanceDiscrepancy {
    pub user_id: Uuid,
    pub stored_balance: i64,
    pub ledger_balance: i64,
    pub transaction_count: i64,
}

impl BalanceDiscrepancy {
    pub fn difference(&self) -> i64 {
        self.stored_balance - self.ledger_balance
    }
}
