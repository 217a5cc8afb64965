pub mod escrow;
pub mod ledger;
