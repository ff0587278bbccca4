//! Configuration types for payroll calculation.
//!
//! This module contains the strongly-typed configuration structures that
//! are deserialized from YAML configuration files.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::calculation::DurationSetting;
use crate::models::{
    DurationUnit, FiscalCalendar, FiscalMonth, HeadingDefinition, HeadingRule, HeadingType,
    Package,
};

/// Organization-level payroll settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PayrollSettings {
    /// The organization the settings belong to.
    pub organization: String,
    /// Day counting used to pro-rate monthly headings.
    #[serde(default)]
    pub duration_setting: DurationSetting,
}

/// One fiscal year as configured.
///
/// Without `months`, twelve months are generated from `start_at`.
#[derive(Debug, Clone, Deserialize)]
pub struct FiscalYearConfig {
    /// Unique identifier for the fiscal year.
    pub id: String,
    /// Display name.
    pub name: String,
    /// First day of the fiscal year.
    pub start_at: NaiveDate,
    /// Explicit months, in order.
    #[serde(default)]
    pub months: Vec<FiscalMonth>,
}

/// Fiscal years configuration file structure.
#[derive(Debug, Clone, Deserialize)]
pub struct FiscalYearsConfig {
    /// The configured fiscal years.
    pub fiscal_years: Vec<FiscalYearConfig>,
}

/// Headings configuration file structure.
#[derive(Debug, Clone, Deserialize)]
pub struct HeadingsConfig {
    /// The organization's heading definitions.
    pub headings: Vec<HeadingDefinition>,
}

/// A heading bound into a configured package, referenced by heading id.
#[derive(Debug, Clone, Deserialize)]
pub struct PackageHeadingConfig {
    /// Unique identifier for the package heading.
    pub id: String,
    /// Id of the bound heading definition.
    pub heading: String,
    /// Package-local order.
    pub order: i32,
    /// Rule override.
    #[serde(default)]
    pub rule: Option<HeadingRule>,
    /// Type override.
    #[serde(default, rename = "type")]
    pub heading_type: Option<HeadingType>,
    /// Duration unit override.
    #[serde(default)]
    pub duration_unit: Option<DurationUnit>,
    /// Taxable override.
    #[serde(default)]
    pub taxable: Option<bool>,
    /// Absence impact override.
    #[serde(default)]
    pub absent_days_impact: Option<bool>,
}

/// A configured package.
#[derive(Debug, Clone, Deserialize)]
pub struct PackageConfig {
    /// Unique identifier for the package.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Bound headings.
    pub headings: Vec<PackageHeadingConfig>,
}

/// Packages configuration file structure.
#[derive(Debug, Clone, Deserialize)]
pub struct PackagesConfig {
    /// The organization's packages.
    pub packages: Vec<PackageConfig>,
}

/// The complete payroll configuration.
#[derive(Debug, Clone)]
pub struct PayrollConfig {
    settings: PayrollSettings,
    calendar: FiscalCalendar,
    headings: BTreeMap<String, HeadingDefinition>,
    packages: BTreeMap<String, Package>,
}

impl PayrollConfig {
    /// Creates a new payroll configuration.
    pub fn new(
        settings: PayrollSettings,
        calendar: FiscalCalendar,
        headings: BTreeMap<String, HeadingDefinition>,
        packages: BTreeMap<String, Package>,
    ) -> Self {
        Self {
            settings,
            calendar,
            headings,
            packages,
        }
    }

    /// Returns the organization settings.
    pub fn settings(&self) -> &PayrollSettings {
        &self.settings
    }

    /// Returns the fiscal calendar.
    pub fn calendar(&self) -> &FiscalCalendar {
        &self.calendar
    }

    /// Returns heading definitions keyed by id.
    pub fn headings(&self) -> &BTreeMap<String, HeadingDefinition> {
        &self.headings
    }

    /// Returns packages keyed by id.
    pub fn packages(&self) -> &BTreeMap<String, Package> {
        &self.packages
    }
}
