//! In-memory account balances behind the HTTP routes.
//!
//! Balances live only as long as the process. Every successful deposit is
//! announced on the account's topic as a [`BalanceUpdate`].

use std::collections::HashMap;
use std::sync::Mutex;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::utils::error::ApiError;

/// Payload published to topic `account_id` after a deposit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceUpdate {
    pub account_id: String,
    pub balance: i64,
}

impl BalanceUpdate {
    /// JSON encoding used on the wire, e.g. `{"account_id":"42","balance":100}`.
    pub fn to_payload(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }
}

/// Response body of the balance and deposit routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub balance: i64,
}

#[derive(Debug)]
pub struct Ledger {
    initial_balance: i64,
    balances: Mutex<HashMap<String, i64>>,
}

impl Ledger {
    /// Accounts that were never touched report `initial_balance`.
    pub fn new(initial_balance: i64) -> Self {
        Self {
            initial_balance,
            balances: Mutex::new(HashMap::new()),
        }
    }

    pub fn balance(&self, account_id: &str) -> i64 {
        self.balances
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(account_id)
            .copied()
            .unwrap_or(self.initial_balance)
    }

    /// Adds `amount` (which may be negative) and returns the new balance.
    pub fn deposit(&self, account_id: &str, amount: i64) -> Result<i64, ApiError> {
        let mut balances = self.balances.lock().unwrap_or_else(|e| e.into_inner());
        let balance = balances
            .entry(account_id.to_string())
            .or_insert(self.initial_balance);
        *balance = balance
            .checked_add(amount)
            .ok_or_else(|| ApiError::BalanceOverflow {
                account_id: account_id.to_string(),
                deposit: amount,
            })?;
        Ok(*balance)
    }
}

/// Parses the `{deposit}` path segment.
pub fn parse_deposit(raw: &str) -> Result<i64, ApiError> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError::InvalidDeposit(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untouched_account_has_initial_balance() {
        let ledger = Ledger::new(42);
        assert_eq!(ledger.balance("42"), 42);
        assert_eq!(ledger.balance("7"), 42);
    }

    #[test]
    fn deposits_accumulate_per_account() {
        let ledger = Ledger::new(42);
        assert_eq!(ledger.deposit("42", 10).unwrap(), 52);
        assert_eq!(ledger.deposit("42", -2).unwrap(), 50);
        assert_eq!(ledger.balance("42"), 50);
        assert_eq!(ledger.balance("7"), 42);
    }

    #[test]
    fn overflowing_deposit_is_rejected_and_balance_kept() {
        let ledger = Ledger::new(i64::MAX - 1);
        let err = ledger.deposit("42", 5).unwrap_err();
        assert!(matches!(err, ApiError::BalanceOverflow { deposit: 5, .. }));
        assert_eq!(ledger.balance("42"), i64::MAX - 1);
    }

    #[test]
    fn parse_deposit_accepts_integers_only() {
        assert_eq!(parse_deposit("10").unwrap(), 10);
        assert_eq!(parse_deposit("-3").unwrap(), -3);
        assert!(matches!(parse_deposit("abc"), Err(ApiError::InvalidDeposit(raw)) if raw == "abc"));
        assert!(parse_deposit("1.5").is_err());
    }

    #[test]
    fn balance_update_wire_format() {
        let update = BalanceUpdate {
            account_id: "42".to_string(),
            balance: 100,
        };
        assert_eq!(
            update.to_payload().unwrap(),
            Bytes::from_static(br#"{"account_id":"42","balance":100}"#)
        );
    }
}
