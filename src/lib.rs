//! Double-entry balance transfer ledger.
//!
//! Transfers move a positive amount between two accounts as one atomic unit:
//! a transfer row, two offsetting entries and two balance updates. Balance
//! updates lock account rows in ascending id order, so concurrent transfers
//! over overlapping accounts cannot deadlock.

mod ledger;

pub use ledger::*;
