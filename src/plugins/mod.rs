//! Plugin registry for calculator variables and functions.
//!
//! A plugin contributes either a variable token (`__DUTY_STATION__`) or a
//! function token (`__ANNUAL_AMOUNT__("Basic Salary")`) to the rule
//! language. Plugins are registered once through [`PluginRegistryBuilder`];
//! the built [`PluginRegistry`] is immutable and shared behind an `Arc`.

mod builtins;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::error::{EngineError, EngineResult, RuleResult};
use crate::models::{variable_name, Employee, EmployeeFacts, FiscalYear, Package, PackageHeading};
use crate::rules::{Argument, FunctionValue, STATIC_VARIABLES};

pub use builtins::{AnnualAmountPlugin, DutyStationPlugin, UserVoluntaryRebatePlugin};

/// Read-only view of a calculator pass handed to plugins.
#[derive(Debug, Clone, Copy)]
pub struct CalculatorView<'a> {
    /// The employee being calculated.
    pub employee: &'a Employee,
    /// The employee's facts snapshot.
    pub facts: &'a EmployeeFacts,
    /// The package being evaluated.
    pub package: &'a Package,
    /// The fiscal year containing the period.
    pub fiscal_year: &'a FiscalYear,
    /// First day of the clipped period.
    pub from_date: NaiveDate,
    /// Last day of the clipped period.
    pub to_date: NaiveDate,
    /// Amounts of the headings computed so far, keyed by variable token.
    pub amounts: &'a BTreeMap<String, Decimal>,
}

/// A calculator variable or function provided outside the package.
///
/// Argument validation runs when a heading rule is defined; `call` runs
/// during a pass and must not mutate anything.
pub trait PayrollPlugin: Send + Sync {
    /// Registered name, e.g. "Duty Station". Its token is derived from it.
    fn name(&self) -> &str;

    /// Plugin version recorded in provenance.
    fn version(&self) -> &str;

    /// Whether the token takes arguments.
    fn is_function(&self) -> bool;

    /// Messages describing why `args` are unacceptable; empty when valid.
    fn validate_args(&self, _args: &[Argument]) -> Vec<String> {
        Vec::new()
    }

    /// Heading tokens the call reads, for dependency resolution.
    fn dependencies(&self, _args: &[Argument]) -> Vec<String> {
        Vec::new()
    }

    /// Computes the value for the heading being evaluated.
    fn call(
        &self,
        view: &CalculatorView<'_>,
        heading: &PackageHeading,
        args: &[Argument],
    ) -> RuleResult<FunctionValue>;

    /// The token used in rules.
    fn variable(&self) -> String {
        variable_name(self.name())
    }
}

/// Checks that a plugin name is alphabetic, with spaces or hyphens as separators.
///
/// # Example
///
/// ```
/// use payroll_engine::plugins::validate_plugin_name;
///
/// assert!(validate_plugin_name("Duty-Station Allowance").is_ok());
/// assert!(validate_plugin_name("Grade 2").is_err());
/// ```
pub fn validate_plugin_name(name: &str) -> Result<(), String> {
    let normalized = name.replace('-', " ");
    let words: Vec<&str> = normalized.split_whitespace().collect();
    if words.is_empty() || !words.iter().all(|w| w.chars().all(char::is_alphabetic)) {
        return Err("Only alphabetic characters are accepted".to_string());
    }
    Ok(())
}

/// Immutable set of registered plugins keyed by token.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, Arc<dyn PayrollPlugin>>,
}

impl PluginRegistry {
    /// Starts an empty builder.
    pub fn builder() -> PluginRegistryBuilder {
        PluginRegistryBuilder::default()
    }

    /// A registry holding the built-in plugins.
    pub fn standard() -> Self {
        PluginRegistryBuilder::with_builtins().build()
    }

    /// Looks up a plugin by its token.
    pub fn resolve(&self, variable: &str) -> Option<&dyn PayrollPlugin> {
        self.plugins.get(variable).map(|p| p.as_ref())
    }

    /// Registered tokens, sorted.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }

    /// Number of registered plugins.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.plugins.keys()).finish()
    }
}

/// Collects plugins before the registry is frozen.
#[derive(Default)]
pub struct PluginRegistryBuilder {
    plugins: BTreeMap<String, Arc<dyn PayrollPlugin>>,
    reserved: BTreeSet<String>,
}

impl PluginRegistryBuilder {
    /// A builder pre-populated with the built-in plugins.
    pub fn with_builtins() -> Self {
        let mut builder = Self::default();
        let builtins: [Arc<dyn PayrollPlugin>; 3] = [
            Arc::new(AnnualAmountPlugin),
            Arc::new(UserVoluntaryRebatePlugin),
            Arc::new(DutyStationPlugin),
        ];
        for plugin in builtins {
            builder.plugins.insert(plugin.variable(), plugin);
        }
        builder
    }

    /// Reserves tokens (heading variables, for instance) a plugin may not take.
    pub fn reserve<I, S>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reserved.extend(variables.into_iter().map(Into::into));
        self
    }

    /// Registers a plugin after validating its name and token.
    pub fn register(mut self, plugin: impl PayrollPlugin + 'static) -> EngineResult<Self> {
        let name = plugin.name().to_string();
        validate_plugin_name(&name).map_err(|message| EngineError::InvalidPlugin {
            name: name.clone(),
            message,
        })?;

        let variable = plugin.variable();
        if self.plugins.contains_key(&variable)
            || self.reserved.contains(&variable)
            || STATIC_VARIABLES.contains(&variable.as_str())
            || variable.starts_with("__EMPLOYEE_")
        {
            return Err(EngineError::InvalidPlugin {
                name,
                message: format!("{} clashes with an existing calculator variable", variable),
            });
        }

        self.plugins.insert(variable, Arc::new(plugin));
        Ok(self)
    }

    /// Freezes the registry.
    pub fn build(self) -> PluginRegistry {
        PluginRegistry {
            plugins: self.plugins,
        }
    }
}
