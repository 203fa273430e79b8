use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct DebitOutcome {
    pub new_balance: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LedgerCreditSource {
    /// Card-funded top-up initiated by the account holder.
    CardTopUp,
    /// Unused courier buffer returned after settlement.
    BufferRefund,
    /// Compensating credit when order creation failed after a debit.
    DebitReversal,
}

#[derive(Debug, Error, PartialEq)]
pub enum LedgerError {
    #[error("insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds {
        balance: Decimal,
        requested: Decimal,
    },
    #[error("unknown ledger account {0}")]
    AccountNotFound(Uuid),
    #[error("invalid amount {0}")]
    InvalidAmount(Decimal),
    #[error("ledger service error: {0}")]
    Service(String),
}

/// Internal prepaid balance service.
///
/// `debit` is the atomic compare-and-decrement: it re-checks the balance at
/// debit time and rejects if insufficient, regardless of any earlier
/// `get_balance` result. Callers must fetch a fresh balance immediately
/// before debiting and never reuse a cached one.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn get_balance(&self, account_id: Uuid) -> Result<Decimal, LedgerError>;

    async fn debit(&self, account_id: Uuid, amount: Decimal) -> Result<DebitOutcome, LedgerError>;

    async fn credit(
        &self,
        account_id: Uuid,
        amount: Decimal,
        source: LedgerCreditSource,
    ) -> Result<Decimal, LedgerError>;
}

/// Reference ledger implementation demonstrating the atomic debit contract.
/// Balances live behind a single async mutex, so concurrent debits serialize
/// and exactly one of two racing spends of the same funds can win.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    accounts: Mutex<HashMap<Uuid, Decimal>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn open_account(&self, account_id: Uuid, opening_balance: Decimal) {
        let mut accounts = self.accounts.lock().await;
        accounts.insert(account_id, opening_balance);
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn get_balance(&self, account_id: Uuid) -> Result<Decimal, LedgerError> {
        let accounts = self.accounts.lock().await;
        accounts
            .get(&account_id)
            .copied()
            .ok_or(LedgerError::AccountNotFound(account_id))
    }

    #[instrument(skip(self), fields(account_id = %account_id, amount = %amount))]
    async fn debit(&self, account_id: Uuid, amount: Decimal) -> Result<DebitOutcome, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let mut accounts = self.accounts.lock().await;
        let balance = accounts
            .get_mut(&account_id)
            .ok_or(LedgerError::AccountNotFound(account_id))?;
        if *balance < amount {
            return Err(LedgerError::InsufficientFunds {
                balance: *balance,
                requested: amount,
            });
        }
        *balance -= amount;
        let new_balance = *balance;
        info!(new_balance = %new_balance, "ledger debit applied");
        Ok(DebitOutcome { new_balance })
    }

    #[instrument(skip(self), fields(account_id = %account_id, amount = %amount, source = %source))]
    async fn credit(
        &self,
        account_id: Uuid,
        amount: Decimal,
        source: LedgerCreditSource,
    ) -> Result<Decimal, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let mut accounts = self.accounts.lock().await;
        let balance = accounts.entry(account_id).or_insert(Decimal::ZERO);
        *balance += amount;
        info!(new_balance = %balance, "ledger credit applied");
        Ok(*balance)
    }
}
