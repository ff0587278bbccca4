//! Configuration loading functionality.
//!
//! This module provides the [`ConfigLoader`] type for loading payroll
//! configurations from YAML files.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::calculation::DurationSetting;
use crate::error::{EngineError, EngineResult};
use crate::models::{FiscalCalendar, FiscalYear, HeadingDefinition, Package, PackageHeading};

use super::types::{
    FiscalYearConfig, FiscalYearsConfig, HeadingsConfig, PackageConfig, PackagesConfig,
    PayrollConfig, PayrollSettings,
};

/// Loads and provides access to payroll configuration.
///
/// # Directory Structure
///
/// ```text
/// config/demo/
/// ├── payroll.yaml       # Organization settings and day counting
/// ├── fiscal_years.yaml  # Fiscal years and their months
/// ├── headings.yaml      # Heading definitions
/// └── packages.yaml      # Packages binding headings in order
/// ```
///
/// # Example
///
/// ```no_run
/// use payroll_engine::config::ConfigLoader;
///
/// let loader = ConfigLoader::load("./config/demo").unwrap();
/// let package = loader.package("standard").unwrap();
/// println!("Package {} has {} headings", package.name, package.headings.len());
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config: PayrollConfig,
}

impl ConfigLoader {
    /// Loads configuration from the specified directory.
    ///
    /// # Returns
    ///
    /// Returns a `ConfigLoader` instance on success, or an error if:
    /// - Any required file is missing
    /// - Any file contains invalid YAML
    /// - A fiscal year's months are not contiguous
    /// - A package binds a heading that is not defined
    pub fn load<P: AsRef<Path>>(path: P) -> EngineResult<Self> {
        let path = path.as_ref();

        let settings = Self::load_yaml::<PayrollSettings>(&path.join("payroll.yaml"))?;

        let fiscal_years_path = path.join("fiscal_years.yaml");
        let fiscal_years = Self::load_yaml::<FiscalYearsConfig>(&fiscal_years_path)?;
        let calendar = Self::build_calendar(&fiscal_years_path, fiscal_years)?;

        let headings = Self::load_yaml::<HeadingsConfig>(&path.join("headings.yaml"))?;
        let headings: BTreeMap<String, HeadingDefinition> = headings
            .headings
            .into_iter()
            .map(|h| (h.id.clone(), h))
            .collect();

        let packages_path = path.join("packages.yaml");
        let packages = Self::load_yaml::<PackagesConfig>(&packages_path)?;
        let mut bound = BTreeMap::new();
        for package in packages.packages {
            let package = Self::bind_package(&packages_path, &settings, &headings, package)?;
            bound.insert(package.id.clone(), package);
        }

        Ok(Self {
            config: PayrollConfig::new(settings, calendar, headings, bound),
        })
    }

    /// Loads and parses a YAML file.
    fn load_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> EngineResult<T> {
        let path_str = path.display().to_string();

        let content = fs::read_to_string(path).map_err(|_| EngineError::ConfigNotFound {
            path: path_str.clone(),
        })?;

        serde_yaml::from_str(&content).map_err(|e| EngineError::ConfigParseError {
            path: path_str,
            message: e.to_string(),
        })
    }

    fn build_calendar(path: &Path, config: FiscalYearsConfig) -> EngineResult<FiscalCalendar> {
        let years = config
            .fiscal_years
            .into_iter()
            .map(|year| Self::build_year(path, year))
            .collect::<EngineResult<Vec<_>>>()?;
        Ok(FiscalCalendar::new(years))
    }

    fn build_year(path: &Path, year: FiscalYearConfig) -> EngineResult<FiscalYear> {
        if year.months.is_empty() {
            return FiscalYear::monthly(year.id, year.name, year.start_at);
        }

        let parse_error = |message: String| EngineError::ConfigParseError {
            path: path.display().to_string(),
            message,
        };

        let mut expected = year.start_at;
        for month in &year.months {
            if month.start_at != expected || month.end_at < month.start_at {
                return Err(parse_error(format!(
                    "fiscal year {}: month {} must start on {} and end after it starts",
                    year.id, month.display_name, expected
                )));
            }
            expected = month
                .end_at
                .succ_opt()
                .ok_or_else(|| parse_error(format!("fiscal year {} ends out of range", year.id)))?;
        }

        let end_at = year
            .months
            .last()
            .map(|m| m.end_at)
            .ok_or_else(|| parse_error(format!("fiscal year {} has no months", year.id)))?;

        Ok(FiscalYear {
            id: year.id,
            name: year.name,
            start_at: year.start_at,
            end_at,
            months: year.months,
        })
    }

    fn bind_package(
        path: &Path,
        settings: &PayrollSettings,
        headings: &BTreeMap<String, HeadingDefinition>,
        package: PackageConfig,
    ) -> EngineResult<Package> {
        let mut bound = Vec::with_capacity(package.headings.len());
        for entry in package.headings {
            let heading = headings
                .get(&entry.heading)
                .cloned()
                .ok_or_else(|| EngineError::ConfigParseError {
                    path: path.display().to_string(),
                    message: format!(
                        "package {} binds unknown heading '{}'",
                        package.id, entry.heading
                    ),
                })?;
            let mut package_heading = PackageHeading::new(entry.id, heading, entry.order);
            package_heading.rule = entry.rule;
            package_heading.heading_type = entry.heading_type;
            package_heading.duration_unit = entry.duration_unit;
            package_heading.taxable = entry.taxable;
            package_heading.absent_days_impact = entry.absent_days_impact;
            bound.push(package_heading);
        }

        Ok(Package {
            id: package.id,
            name: package.name,
            organization: settings.organization.clone(),
            headings: bound,
        })
    }

    /// Returns the underlying payroll configuration.
    pub fn config(&self) -> &PayrollConfig {
        &self.config
    }

    /// Returns the organization settings.
    pub fn settings(&self) -> &PayrollSettings {
        self.config.settings()
    }

    /// Returns the organization's duration setting.
    pub fn duration_setting(&self) -> DurationSetting {
        self.config.settings().duration_setting
    }

    /// Returns the fiscal calendar.
    pub fn calendar(&self) -> &FiscalCalendar {
        self.config.calendar()
    }

    /// Gets a heading definition by id.
    pub fn heading(&self, id: &str) -> EngineResult<&HeadingDefinition> {
        self.config
            .headings()
            .get(id)
            .ok_or_else(|| EngineError::HeadingNotFound {
                heading_id: id.to_string(),
            })
    }

    /// Gets a package by id.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use payroll_engine::config::ConfigLoader;
    ///
    /// let loader = ConfigLoader::load("./config/demo")?;
    /// let package = loader.package("standard")?;
    /// println!("Package: {}", package.name);
    /// # Ok::<(), payroll_engine::error::EngineError>(())
    /// ```
    pub fn package(&self, id: &str) -> EngineResult<&Package> {
        self.config
            .packages()
            .get(id)
            .ok_or_else(|| EngineError::PackageNotFound {
                package_id: id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculation::DayCountPolicy;
    use crate::models::HeadingType;
    use chrono::NaiveDate;

    fn config_path() -> &'static str {
        "./config/demo"
    }

    #[test]
    fn test_load_valid_configuration() {
        let result = ConfigLoader::load(config_path());
        assert!(result.is_ok(), "Failed to load config: {:?}", result.err());

        let loader = result.unwrap();
        assert_eq!(loader.settings().organization, "Himal Traders");
        assert_eq!(
            loader.duration_setting().day_count_policy,
            DayCountPolicy::FixedMonthDays { days: 30 }
        );
    }

    #[test]
    fn test_fiscal_years_loaded() {
        let loader = ConfigLoader::load(config_path()).unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 8, 15).unwrap();
        let (year, month) = loader.calendar().month_for(date).unwrap();
        assert_eq!(year.id, "fy2025");
        assert_eq!(month.display_name, "August");
        assert_eq!(year.months.len(), 12);
    }

    #[test]
    fn test_package_binds_headings_in_order() {
        let loader = ConfigLoader::load(config_path()).unwrap();
        let package = loader.package("standard").unwrap();
        let names: Vec<&str> = package.ordered_headings().iter().map(|h| h.name()).collect();
        assert_eq!(
            names,
            vec![
                "Basic Salary",
                "Dearness Allowance",
                "Lunch Allowance",
                "Provident Fund",
                "Income Tax",
            ]
        );
        assert_eq!(package.organization, "Himal Traders");
    }

    #[test]
    fn test_get_heading() {
        let loader = ConfigLoader::load(config_path()).unwrap();
        let heading = loader.heading("income_tax").unwrap();
        assert_eq!(heading.heading_type, HeadingType::TaxDeduction);
        assert_eq!(heading.rule.variants().len(), 2);
    }

    #[test]
    fn test_get_unknown_package_returns_error() {
        let loader = ConfigLoader::load(config_path()).unwrap();

        match loader.package("unknown") {
            Err(EngineError::PackageNotFound { package_id }) => {
                assert_eq!(package_id, "unknown");
            }
            other => panic!("Expected PackageNotFound error, got {:?}", other.map(|p| &p.id)),
        }
    }

    #[test]
    fn test_load_missing_directory_returns_error() {
        let result = ConfigLoader::load("/nonexistent/path");

        match result {
            Err(EngineError::ConfigNotFound { path }) => {
                assert!(path.contains("payroll.yaml"));
            }
            _ => panic!("Expected ConfigNotFound error"),
        }
    }

    #[test]
    fn test_explicit_months_must_be_contiguous() {
        let date = |m, d| NaiveDate::from_ymd_opt(2025, m, d).unwrap();
        let month = |index, name: &str, start, end| crate::models::FiscalMonth {
            month_index: index,
            display_name: name.to_string(),
            start_at: start,
            end_at: end,
        };
        let year = FiscalYearConfig {
            id: "fy".to_string(),
            name: "FY".to_string(),
            start_at: date(7, 1),
            months: vec![
                month(1, "July", date(7, 1), date(7, 31)),
                month(2, "August", date(8, 2), date(8, 31)),
            ],
        };

        assert!(matches!(
            ConfigLoader::build_year(Path::new("fiscal_years.yaml"), year),
            Err(EngineError::ConfigParseError { .. })
        ));
    }
}
