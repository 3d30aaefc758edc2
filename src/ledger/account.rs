use super::Decimal;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

pub type AccountId = i64;

/// Currencies an account can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Irr,
}

impl Currency {
    /// Number of decimal places between the major and minor unit.
    pub fn minor_unit_scale(self) -> u32 {
        match self {
            Currency::Usd | Currency::Eur => 2,
            Currency::Irr => 0,
        }
    }

    /// Convert a major-unit amount (e.g. `12.34` USD) into minor units (`1234`).
    /// Returns `None` when the amount carries more precision than the currency
    /// allows or does not fit in an `i64`.
    pub fn to_minor_units(self, amount: Decimal) -> Option<i64> {
        let scale = self.minor_unit_scale();
        let amount = amount.normalize();
        if amount.scale() > scale {
            return None;
        }
        let factor = Decimal::from(10_i64.pow(scale));
        amount.checked_mul(factor)?.to_i64()
    }

    /// Render a minor-unit amount in major units with the currency's scale.
    pub fn to_major_units(self, minor: i64) -> Decimal {
        Decimal::new(minor, self.minor_unit_scale())
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Currency::Usd => write!(f, "USD"),
            Currency::Eur => write!(f, "EUR"),
            Currency::Irr => write!(f, "IRR"),
        }
    }
}

/// A ledger account. Balances are kept in minor units and are only changed by
/// applying signed deltas through a store transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    id: AccountId,
    owner: String,
    balance: i64,
    currency: Currency,
    created_at: DateTime<Utc>,
}

impl Account {
    pub(super) fn new(id: AccountId, owner: String, balance: i64, currency: Currency) -> Self {
        Self {
            id,
            owner,
            balance,
            currency,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> AccountId {
        self.id
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Balance in minor units
    pub fn balance(&self) -> i64 {
        self.balance
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Apply a signed delta to the balance.
    /// Returns `None` on overflow, leaving the balance untouched.
    pub(super) fn apply_delta(&mut self, delta: i64) -> Option<i64> {
        let balance = self.balance.checked_add(delta)?;
        self.balance = balance;
        Some(balance)
    }

    pub(super) fn set_balance(&mut self, balance: i64) {
        self.balance = balance;
    }
}

/// Raw account row as read from an accounts CSV file.
#[derive(Debug, Deserialize, Clone)]
pub struct AccountRecord {
    pub owner: String,
    pub currency: Currency,
    /// Opening balance in major units
    pub balance: Decimal,
}

impl std::fmt::Display for AccountRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "account (owner: {}, currency: {}, balance: {})",
            self.owner, self.currency, self.balance
        )
    }
}

/// Account row as written to CSV output.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct AccountRow {
    pub id: AccountId,
    pub owner: String,
    pub currency: Currency,
    pub balance: Decimal,
}

impl From<&Account> for AccountRow {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            owner: account.owner.clone(),
            currency: account.currency,
            balance: account.currency.to_major_units(account.balance),
        }
    }
}
