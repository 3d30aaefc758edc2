use super::account::AccountId;
use chrono::{DateTime, Utc};
use serde::Serialize;

pub type EntryId = i64;

/// One signed ledger line. Negative amounts debit the account, positive
/// amounts credit it. Entries are immutable and always written in offsetting
/// pairs by a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    id: EntryId,
    account_id: AccountId,
    amount: i64,
    created_at: DateTime<Utc>,
}

impl Entry {
    pub(super) fn new(id: EntryId, account_id: AccountId, amount: i64) -> Self {
        Self {
            id,
            account_id,
            amount,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    pub fn amount(&self) -> i64 {
        self.amount
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
