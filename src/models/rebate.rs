//! Voluntary rebate settings and per-user rebate entries.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// How a rebate's entitlement is distributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebateDuration {
    /// Allocated per fiscal month.
    #[serde(alias = "Monthly")]
    Monthly,
    /// A single yearly amount.
    #[serde(alias = "Yearly")]
    Yearly,
}

/// An organization-level rebate type with its annual ceiling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebateSetting {
    /// Unique identifier for the setting.
    pub id: String,
    /// Title used in rules, e.g. `__USER_VOLUNTARY_REBATE__("Life Insurance")`.
    pub title: String,
    /// Annual ceiling; zero means unlimited.
    pub amount: Decimal,
    /// Distribution of the entitlement.
    pub duration_type: RebateDuration,
}

/// Lifecycle state of a rebate entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebateStatus {
    /// Active entry.
    #[default]
    Created,
    /// Superseded entry kept for audit.
    Archived,
}

/// A user's rebate claim for one fiscal year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserVoluntaryRebate {
    /// Unique identifier for the entry.
    pub id: String,
    /// The user claiming the rebate.
    pub user_id: String,
    /// The rebate type.
    pub rebate: RebateSetting,
    /// The fiscal year of the claim.
    pub fiscal_year_id: String,
    /// Distribution of the claim.
    pub duration_unit: RebateDuration,
    /// Total claimed; equals the sum of `fiscal_months_amount` for monthly claims.
    pub amount: Decimal,
    /// Fiscal month display name to allotted amount.
    #[serde(default)]
    pub fiscal_months_amount: BTreeMap<String, Decimal>,
    /// Lifecycle state.
    #[serde(default)]
    pub status: RebateStatus,
    /// Day the entry was created.
    pub created_on: NaiveDate,
}

impl UserVoluntaryRebate {
    /// Sum of the monthly allocations.
    pub fn total(&self) -> Decimal {
        self.fiscal_months_amount.values().copied().sum()
    }

    /// Returns true once the entry has been superseded.
    pub fn is_archived(&self) -> bool {
        self.status == RebateStatus::Archived
    }
}
