//! Configuration loading and management for the Payroll Calculation Engine.
//!
//! This module provides functionality to load payroll configurations from
//! YAML files, including organization settings, fiscal years, heading
//! definitions and packages.
//!
//! # Example
//!
//! ```no_run
//! use payroll_engine::config::ConfigLoader;
//!
//! let config = ConfigLoader::load("./config/demo").unwrap();
//! println!("Loaded organization: {}", config.settings().organization);
//! ```

mod loader;
mod types;

pub use loader::ConfigLoader;
pub use types::{
    FiscalYearConfig, FiscalYearsConfig, HeadingsConfig, PackageConfig, PackageHeadingConfig,
    PackagesConfig, PayrollConfig, PayrollSettings,
};
