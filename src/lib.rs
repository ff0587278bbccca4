//! Payroll Calculation Engine
//!
//! This crate computes employee payroll from configurable salary headings.
//! Each heading carries a rule in a small expression language; packages
//! order headings, the dependency resolver checks they can be evaluated,
//! and the salary calculator produces one report row per heading for an
//! employee and period. Backdated package changes are recomputed into
//! per-heading differences, and voluntary tax rebates are amortized over
//! fiscal months.

#![warn(missing_docs)]

pub mod api;
pub mod calculation;
pub mod config;
pub mod error;
pub mod models;
pub mod plugins;
pub mod rules;
pub mod store;
