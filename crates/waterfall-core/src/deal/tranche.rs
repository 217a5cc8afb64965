//! Tranche records: one liability class within a deal.
//!
//! All arithmetic uses `rust_decimal::Decimal`. No `f64`.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::WaterfallError;
use crate::types::{Money, Rate, TrancheId};
use crate::WaterfallResult;

/// Coupon terms of a tranche.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CouponTerms {
    /// Fixed annual rate (decimal: 0.065 = 6.5%).
    Fixed { rate: Rate },
    /// Reference rate plus spread, with an optional all-in floor.
    Floating {
        spread: Rate,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        floor: Option<Rate>,
    },
    /// No stated coupon (equity / subordinated notes).
    #[default]
    None,
}

impl CouponTerms {
    /// All-in annual rate given the period's reference rate.
    pub fn annual_rate(&self, reference_rate: Rate) -> Rate {
        match self {
            CouponTerms::Fixed { rate } => *rate,
            CouponTerms::Floating { spread, floor } => {
                let all_in = reference_rate + *spread;
                match floor {
                    Some(f) => all_in.max(*f),
                    None => all_in,
                }
            }
            CouponTerms::None => Decimal::ZERO,
        }
    }
}

/// A single liability class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tranche {
    /// Class label, unique within the deal.
    pub id: TrancheId,
    /// Balance at closing.
    pub original_balance: Money,
    /// Outstanding principal.
    pub current_balance: Money,
    /// Capitalised (PIK) interest not yet paid in cash.
    #[serde(default)]
    pub deferred_balance: Money,
    #[serde(default)]
    pub coupon: CouponTerms,
    /// 1 = most senior; higher = more subordinated.
    pub priority: u32,
    #[serde(default)]
    pub is_equity: bool,
    #[serde(default)]
    pub pik_eligible: bool,
}

impl Tranche {
    /// Interest accrued over a period on current plus deferred balance,
    /// Actual/360.
    pub fn period_interest(&self, reference_rate: Rate, accrual_days: u32) -> Money {
        if self.is_equity {
            return Decimal::ZERO;
        }
        let year_fraction = Decimal::from(accrual_days) / dec!(360);
        (self.current_balance + self.deferred_balance)
            * self.coupon.annual_rate(reference_rate)
            * year_fraction
    }

    /// Balance still owed to the class, including capitalised interest.
    pub fn total_owed(&self) -> Money {
        self.current_balance + self.deferred_balance
    }

    pub(crate) fn validate(&self) -> WaterfallResult<()> {
        if self.id.trim().is_empty() {
            return Err(WaterfallError::config(
                "tranche.id",
                "Tranche identifier cannot be empty.",
            ));
        }
        if self.current_balance < Decimal::ZERO {
            return Err(WaterfallError::config(
                format!("tranche.{}.current_balance", self.id),
                "Current balance cannot be negative.",
            ));
        }
        if self.deferred_balance < Decimal::ZERO {
            return Err(WaterfallError::config(
                format!("tranche.{}.deferred_balance", self.id),
                "Deferred balance cannot be negative.",
            ));
        }
        if self.original_balance < Decimal::ZERO {
            return Err(WaterfallError::config(
                format!("tranche.{}.original_balance", self.id),
                "Original balance cannot be negative.",
            ));
        }
        if self.is_equity && self.pik_eligible {
            return Err(WaterfallError::config(
                format!("tranche.{}.pik_eligible", self.id),
                "An equity tranche cannot be PIK-eligible.",
            ));
        }
        Ok(())
    }
}
