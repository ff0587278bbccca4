//! Dependency resolution for package headings.
//!
//! Each heading's rule is validated and compiled once, its references are
//! turned into edges to other headings, and the package is ordered so that
//! every heading comes after the headings it reads. Headings are visited
//! in ascending package order, which makes the result stable.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::error::{EngineError, EngineResult, RuleError};
use crate::models::{Package, PackageHeading};
use crate::plugins::PluginRegistry;
use crate::rules::{CompiledRule, Reference, RuleValidator};

use super::ordering::{check_tax_ordering, validate_package_order};

const DEPENDENCY_TYPE_MESSAGE: &str =
    "Addition/Deduction type heading cannot be dependent of Addition/Deduction type heading";

/// A heading with its compiled rule and the headings it reads.
#[derive(Debug, Clone)]
pub struct ResolvedHeading {
    /// The package heading.
    pub heading: PackageHeading,
    /// The heading's rule, parsed once.
    pub compiled: CompiledRule,
    /// Variable tokens of the headings this heading reads.
    pub dependencies: BTreeSet<String>,
}

impl ResolvedHeading {
    /// The heading's variable token.
    pub fn variable(&self) -> String {
        self.heading.variable_name()
    }
}

/// A package whose headings are validated, compiled and ordered.
///
/// Build it once per package and reuse it for every employee.
#[derive(Debug, Clone)]
pub struct ResolvedPackage {
    package: Package,
    headings: Vec<ResolvedHeading>,
}

impl ResolvedPackage {
    /// The package as configured.
    pub fn package(&self) -> &Package {
        &self.package
    }

    /// Headings in evaluation order.
    pub fn headings(&self) -> &[ResolvedHeading] {
        &self.headings
    }

    /// Finds a resolved heading by package heading id.
    pub fn heading(&self, package_heading_id: &str) -> Option<&ResolvedHeading> {
        self.headings.iter().find(|h| h.heading.id == package_heading_id)
    }
}

/// Orders package headings by their references.
#[derive(Debug, Clone, Copy)]
pub struct DependencyResolver<'a> {
    registry: &'a PluginRegistry,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    OnPath,
    Done,
}

impl<'a> DependencyResolver<'a> {
    /// Creates a resolver that knows the registry's plugins.
    pub fn new(registry: &'a PluginRegistry) -> Self {
        Self { registry }
    }

    /// Validates and orders a package.
    ///
    /// # Errors
    ///
    /// - `InvalidHeading` when a heading's fields do not fit its type or an
    ///   Addition/Deduction heading reads another Addition/Deduction heading
    /// - `Rule` when a rule fails to parse or reads an unknown symbol
    /// - `DependencyCycle` when headings read each other in a cycle
    /// - `OrderingViolation` when a tax-impacting heading follows a tax deduction
    pub fn resolve(&self, package: &Package) -> EngineResult<ResolvedPackage> {
        validate_package_order(package)?;

        let ordered = package.ordered_headings();
        let variables: Vec<String> = ordered.iter().map(|h| h.variable_name()).collect();
        let validator = RuleValidator::new(self.registry).with_variables(variables.iter().cloned());

        let mut nodes = Vec::with_capacity(ordered.len());
        for heading in &ordered {
            heading.validate_fields()?;
            let compiled = validator.validate(heading.name(), heading.rule())?;
            let dependencies = self.dependencies(heading, &compiled, &variables)?;
            nodes.push(ResolvedHeading {
                heading: (*heading).clone(),
                compiled,
                dependencies,
            });
        }

        check_dependency_types(&nodes)?;

        let index: HashMap<String, usize> = variables
            .iter()
            .enumerate()
            .map(|(i, v)| (v.clone(), i))
            .collect();
        let mut state: HashMap<usize, Visit> = HashMap::new();
        let mut path = Vec::new();
        let mut resolved = Vec::with_capacity(nodes.len());
        for node in 0..nodes.len() {
            visit(node, &nodes, &index, &mut state, &mut path, &mut resolved)?;
        }

        let headings: Vec<ResolvedHeading> =
            resolved.into_iter().map(|i| nodes[i].clone()).collect();
        check_tax_ordering(headings.iter().map(|h| &h.heading))?;

        debug!(
            package_id = %package.id,
            headings = headings.len(),
            "Resolved package heading order"
        );

        Ok(ResolvedPackage {
            package: package.clone(),
            headings,
        })
    }

    fn dependencies(
        &self,
        heading: &PackageHeading,
        compiled: &CompiledRule,
        variables: &[String],
    ) -> EngineResult<BTreeSet<String>> {
        let mut dependencies = BTreeSet::new();
        for reference in compiled.references() {
            match reference {
                Reference::Variable(name) => {
                    if variables.contains(&name) {
                        dependencies.insert(name);
                    } else if let Some(plugin) = self.registry.resolve(&name) {
                        dependencies.extend(plugin.dependencies(&[]));
                    }
                }
                Reference::Function { name, .. } => {
                    let Some(plugin) = self.registry.resolve(&name) else {
                        continue;
                    };
                    for args in compiled.calls_of(&name) {
                        for dependency in plugin.dependencies(&args) {
                            if !variables.contains(&dependency) {
                                return Err(EngineError::rule(
                                    heading.name(),
                                    RuleError::UnresolvedReference { name: dependency },
                                ));
                            }
                            dependencies.insert(dependency);
                        }
                    }
                }
            }
        }
        Ok(dependencies)
    }
}

/// Validates and orders a package with the given plugins.
pub fn validate_package(package: &Package, registry: &PluginRegistry) -> EngineResult<ResolvedPackage> {
    DependencyResolver::new(registry).resolve(package)
}

fn check_dependency_types(nodes: &[ResolvedHeading]) -> EngineResult<()> {
    for node in nodes {
        if !node.heading.heading_type().is_addition_or_deduction() {
            continue;
        }
        let offending = nodes.iter().find(|other| {
            node.dependencies.contains(&other.variable())
                && other.heading.heading_type().is_addition_or_deduction()
        });
        if let Some(other) = offending {
            return Err(EngineError::InvalidHeading {
                heading: node.heading.name().to_string(),
                field: "rule".to_string(),
                message: format!("{} ('{}')", DEPENDENCY_TYPE_MESSAGE, other.heading.name()),
            });
        }
    }
    Ok(())
}

fn visit(
    node: usize,
    nodes: &[ResolvedHeading],
    index: &HashMap<String, usize>,
    state: &mut HashMap<usize, Visit>,
    path: &mut Vec<usize>,
    resolved: &mut Vec<usize>,
) -> EngineResult<()> {
    match state.get(&node) {
        Some(Visit::Done) => return Ok(()),
        Some(Visit::OnPath) => {
            let start = path.iter().position(|n| *n == node).unwrap_or(0);
            let cycle = path[start..]
                .iter()
                .chain(std::iter::once(&node))
                .map(|n| nodes[*n].variable())
                .collect();
            return Err(EngineError::DependencyCycle { path: cycle });
        }
        None => {}
    }

    state.insert(node, Visit::OnPath);
    path.push(node);

    let mut dependencies: Vec<usize> = nodes[node]
        .dependencies
        .iter()
        .filter_map(|d| index.get(d).copied())
        .collect();
    dependencies.sort_unstable();
    for dependency in dependencies {
        visit(dependency, nodes, index, state, path, resolved)?;
    }

    path.pop();
    state.insert(node, Visit::Done);
    resolved.push(node);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DurationUnit, HeadingDefinition, HeadingRule, HeadingType};

    fn heading(name: &str, heading_type: HeadingType, rule: &str, order: i32) -> PackageHeading {
        PackageHeading::new(
            name.to_lowercase(),
            HeadingDefinition {
                id: name.to_lowercase(),
                name: name.to_string(),
                organization: "org".to_string(),
                rule: HeadingRule::from(rule),
                heading_type,
                duration_unit: heading_type
                    .requires_duration_unit()
                    .then_some(DurationUnit::Monthly),
                taxable: match heading_type {
                    HeadingType::TaxDeduction | HeadingType::Type1Cnst | HeadingType::Type2Cnst => {
                        None
                    }
                    _ => Some(true),
                },
                absent_days_impact: match heading_type {
                    HeadingType::Addition | HeadingType::Deduction => Some(false),
                    _ => None,
                },
                deduct_amount_on_leave: false,
                pay_when_present_holiday_offday: false,
                is_editable: true,
            },
            order,
        )
    }

    fn package(headings: Vec<PackageHeading>) -> Package {
        Package {
            id: "pkg".to_string(),
            name: "Standard".to_string(),
            organization: "org".to_string(),
            headings,
        }
    }

    fn names(resolved: &ResolvedPackage) -> Vec<&str> {
        resolved.headings().iter().map(|h| h.heading.name()).collect()
    }

    #[test]
    fn test_dependencies_come_first() {
        let registry = PluginRegistry::standard();
        let resolved = validate_package(
            &package(vec![
                heading("Allowance", HeadingType::ExtraAddition, "__BASIC__ + 2000", 1),
                heading("Basic", HeadingType::Type1Cnst, "15000", 2),
                heading("Tax", HeadingType::TaxDeduction, "__ALLOWANCE__ * 0.1", 3),
            ]),
            &registry,
        )
        .unwrap();
        assert_eq!(names(&resolved), vec!["Basic", "Allowance", "Tax"]);
        assert!(resolved.headings()[1].dependencies.contains("__BASIC__"));
    }

    #[test]
    fn test_independent_headings_keep_package_order() {
        let registry = PluginRegistry::standard();
        let resolved = validate_package(
            &package(vec![
                heading("C", HeadingType::Type2Cnst, "3", 3),
                heading("A", HeadingType::Type2Cnst, "1", 1),
                heading("B", HeadingType::Type2Cnst, "2", 2),
            ]),
            &registry,
        )
        .unwrap();
        assert_eq!(names(&resolved), vec!["A", "B", "C"]);
    }

    /// DEP-001: A two-heading cycle reports its path.
    #[test]
    fn test_cycle_is_detected() {
        let registry = PluginRegistry::standard();
        let result = validate_package(
            &package(vec![
                heading("A", HeadingType::Type2Cnst, "__B__ + 1", 1),
                heading("B", HeadingType::Type2Cnst, "__A__ + 1", 2),
            ]),
            &registry,
        );
        match result {
            Err(EngineError::DependencyCycle { path }) => {
                assert_eq!(path, vec!["__A__", "__B__", "__A__"]);
            }
            other => panic!("Expected DependencyCycle, got {:?}", other.map(|_| ())),
        }
    }

    /// DEP-002: A heading reading itself is a cycle.
    #[test]
    fn test_self_reference_is_a_cycle() {
        let registry = PluginRegistry::standard();
        let result = validate_package(
            &package(vec![heading("A", HeadingType::Type2Cnst, "__A__ * 2", 1)]),
            &registry,
        );
        assert!(matches!(result, Err(EngineError::DependencyCycle { .. })));
    }

    #[test]
    fn test_annual_amount_argument_is_a_dependency() {
        let registry = PluginRegistry::standard();
        let resolved = validate_package(
            &package(vec![
                heading("Bonus Tax", HeadingType::Type2Cnst, "__ANNUAL_AMOUNT__(\"Bonus\") * 0.1", 1),
                heading("Bonus", HeadingType::Type2Cnst, "1000", 2),
            ]),
            &registry,
        )
        .unwrap();
        assert_eq!(names(&resolved), vec!["Bonus", "Bonus Tax"]);

        let missing = validate_package(
            &package(vec![heading(
                "Bonus Tax",
                HeadingType::Type2Cnst,
                "__ANNUAL_AMOUNT__(\"Bonus\")",
                1,
            )]),
            &registry,
        );
        assert!(matches!(
            missing,
            Err(EngineError::Rule {
                source: RuleError::UnresolvedReference { .. },
                ..
            })
        ));
    }

    #[test]
    fn test_unknown_reference_is_rejected() {
        let registry = PluginRegistry::standard();
        let result = validate_package(
            &package(vec![heading("A", HeadingType::Type2Cnst, "__MISSING__", 1)]),
            &registry,
        );
        assert!(matches!(
            result,
            Err(EngineError::Rule {
                source: RuleError::UnresolvedReference { .. },
                ..
            })
        ));
    }

    #[test]
    fn test_addition_cannot_read_addition() {
        let registry = PluginRegistry::standard();
        let result = validate_package(
            &package(vec![
                heading("Basic", HeadingType::Addition, "15000", 1),
                heading("Dearness", HeadingType::Addition, "__BASIC__ * 0.1", 2),
            ]),
            &registry,
        );
        match result {
            Err(EngineError::InvalidHeading { heading, message, .. }) => {
                assert_eq!(heading, "Dearness");
                assert!(message.starts_with(DEPENDENCY_TYPE_MESSAGE));
            }
            other => panic!("Expected InvalidHeading, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_taxable_heading_reading_tax_is_rejected() {
        let registry = PluginRegistry::standard();
        let result = validate_package(
            &package(vec![
                heading("Allowance", HeadingType::ExtraAddition, "__TAX__ + 1", 1),
                heading("Tax", HeadingType::TaxDeduction, "100", 2),
            ]),
            &registry,
        );
        assert!(matches!(result, Err(EngineError::OrderingViolation { .. })));
    }
}
