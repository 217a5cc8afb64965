//! Equity escrow account used by claw-back and the distribution stopper.
//!
//! Holds are credited from the period's cash register; releases are paid
//! to equity out of the accumulated balance and never exceed it.
//!
//! All arithmetic uses `rust_decimal::Decimal`. No `f64`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::WaterfallError;
use crate::types::Money;
use crate::WaterfallResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EscrowAccount {
    balance: Money,
    held_this_period: Money,
    released_this_period: Money,
}

impl EscrowAccount {
    pub fn open(balance: Money) -> Self {
        EscrowAccount {
            balance,
            ..Default::default()
        }
    }

    pub fn balance(&self) -> Money {
        self.balance
    }

    pub fn held_this_period(&self) -> Money {
        self.held_this_period
    }

    pub fn released_this_period(&self) -> Money {
        self.released_this_period
    }

    pub fn hold(&mut self, amount: Money) -> WaterfallResult<()> {
        if amount < Decimal::ZERO {
            return Err(WaterfallError::InvariantViolation(format!(
                "negative escrow hold {amount}"
            )));
        }
        self.balance += amount;
        self.held_this_period += amount;
        Ok(())
    }

    pub fn release(&mut self, amount: Money) -> WaterfallResult<()> {
        if amount < Decimal::ZERO || amount > self.balance {
            return Err(WaterfallError::InvariantViolation(format!(
                "escrow release {amount} outside [0, {}]",
                self.balance
            )));
        }
        self.balance -= amount;
        self.released_this_period += amount;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_hold_then_release() {
        let mut escrow = EscrowAccount::open(dec!(100));
        escrow.hold(dec!(50)).unwrap();
        escrow.release(dec!(120)).unwrap();
        assert_eq!(escrow.balance(), dec!(30));
        assert_eq!(escrow.held_this_period(), dec!(50));
        assert_eq!(escrow.released_this_period(), dec!(120));
    }

    #[test]
    fn test_over_release_rejected() {
        let mut escrow = EscrowAccount::open(dec!(10));
        assert!(escrow.release(dec!(10.01)).unwrap_err().is_invariant_violation());
        assert_eq!(escrow.balance(), dec!(10));
    }
}
