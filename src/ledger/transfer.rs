use super::account::{Account, AccountId};
use super::entry::Entry;
use super::error::RecordError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type TransferId = i64;

/// Record of a positive amount moved from one account to another.
/// Direction is carried by the pair of ids, never by the sign of `amount`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transfer {
    id: TransferId,
    from_account_id: AccountId,
    to_account_id: AccountId,
    amount: i64,
    created_at: DateTime<Utc>,
}

impl Transfer {
    pub(super) fn new(
        id: TransferId,
        from_account_id: AccountId,
        to_account_id: AccountId,
        amount: i64,
    ) -> Self {
        Self {
            id,
            from_account_id,
            to_account_id,
            amount,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> TransferId {
        self.id
    }

    pub fn from_account_id(&self) -> AccountId {
        self.from_account_id
    }

    pub fn to_account_id(&self) -> AccountId {
        self.to_account_id
    }

    pub fn amount(&self) -> i64 {
        self.amount
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Input of the transfer engine. The engine assumes the pair has already been
/// validated: distinct ids, positive amount, shared currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferParams {
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: i64,
}

/// Everything one committed transfer produced.
#[derive(Debug, Clone)]
pub struct TransferResult {
    pub transfer: Transfer,
    pub from_account: Account,
    pub to_account: Account,
    pub from_entry: Entry,
    pub to_entry: Entry,
}

/// Raw transfer row as parsed from CSV input.
#[derive(Debug, Deserialize, Clone)]
pub struct TransferRecord {
    /// Identity of whoever asks to debit `from`
    pub caller: String,
    pub from: AccountId,
    pub to: AccountId,
    /// Amount in minor units of the accounts' currency
    pub amount: i64,
}

impl std::fmt::Display for TransferRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "transfer (caller: {}, from: {}, to: {}, amount: {})",
            self.caller, self.from, self.to, self.amount
        )
    }
}

/// A well-formed transfer request: positive amount, two distinct accounts.
/// Whether the accounts exist and may be debited is checked later by the
/// validator against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    caller: String,
    params: TransferParams,
}

impl TransferRequest {
    pub fn new(
        caller: impl Into<String>,
        from_account_id: AccountId,
        to_account_id: AccountId,
        amount: i64,
    ) -> Result<Self, RecordError> {
        Self::try_from(TransferRecord {
            caller: caller.into(),
            from: from_account_id,
            to: to_account_id,
            amount,
        })
    }

    pub fn caller(&self) -> &str {
        &self.caller
    }

    pub fn params(&self) -> TransferParams {
        self.params
    }

    pub fn from_account_id(&self) -> AccountId {
        self.params.from_account_id
    }

    pub fn to_account_id(&self) -> AccountId {
        self.params.to_account_id
    }

    pub fn amount(&self) -> i64 {
        self.params.amount
    }
}

impl TryFrom<TransferRecord> for TransferRequest {
    type Error = RecordError;

    fn try_from(record: TransferRecord) -> Result<Self, Self::Error> {
        let well_formed = record.amount > 0
            && record.from > 0
            && record.to > 0
            && record.from != record.to
            && !record.caller.is_empty();
        if !well_formed {
            return Err(RecordError::InvalidTransfer(record));
        }

        Ok(TransferRequest {
            params: TransferParams {
                from_account_id: record.from,
                to_account_id: record.to,
                amount: record.amount,
            },
            caller: record.caller,
        })
    }
}

impl std::fmt::Display for TransferRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[transfer] caller={} from={} to={} amount={}",
            self.caller, self.params.from_account_id, self.params.to_account_id, self.params.amount
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_record(from: AccountId, to: AccountId, amount: i64) -> TransferRecord {
        TransferRecord {
            caller: "alice".to_string(),
            from,
            to,
            amount,
        }
    }

    #[test]
    fn test_valid_request() {
        let request = TransferRequest::try_from(make_record(1, 2, 50)).unwrap();

        assert_eq!(request.caller(), "alice");
        assert_eq!(request.from_account_id(), 1);
        assert_eq!(request.to_account_id(), 2);
        assert_eq!(request.amount(), 50);
    }

    #[test]
    fn test_rejects_zero_amount() {
        assert!(TransferRequest::try_from(make_record(1, 2, 0)).is_err());
    }

    #[test]
    fn test_rejects_negative_amount() {
        assert!(TransferRequest::try_from(make_record(1, 2, -10)).is_err());
    }

    #[test]
    fn test_rejects_same_account() {
        assert!(TransferRequest::try_from(make_record(3, 3, 10)).is_err());
    }

    #[test]
    fn test_rejects_non_positive_account_ids() {
        for (from, to) in [(0, 2), (1, 0), (-4, 2), (1, -1)] {
            let err = TransferRequest::try_from(make_record(from, to, 10)).unwrap_err();
            assert!(matches!(err, RecordError::InvalidTransfer(_)));
        }
    }

    #[test]
    fn test_rejects_empty_caller() {
        let mut record = make_record(1, 2, 10);
        record.caller = String::new();
        assert!(TransferRequest::try_from(record).is_err());
    }

    #[test]
    fn test_new_goes_through_the_same_checks() {
        assert!(TransferRequest::new("bob", 2, 1, 5).is_ok());
        assert!(TransferRequest::new("bob", 2, 2, 5).is_err());
    }
}
