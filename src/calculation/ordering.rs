//! Package order maintenance and the tax ordering invariant.
//!
//! Every heading that feeds taxable income must be evaluated before any
//! tax deduction. Reorders are applied to a copy of the package and
//! returned only when the result still satisfies that invariant, so a
//! rejected reorder leaves the caller's package untouched.

use std::collections::BTreeMap;

use crate::error::{EngineError, EngineResult};
use crate::models::{Package, PackageHeading};

const TAX_ORDER_MESSAGE: &str = "Tax impacting headings cannot be after Tax Deduction heading";

/// Checks that no tax-impacting heading follows a tax deduction.
///
/// `headings` must be given in evaluation order.
pub fn check_tax_ordering<'a, I>(headings: I) -> EngineResult<()>
where
    I: IntoIterator<Item = &'a PackageHeading>,
{
    let mut first_tax: Option<&PackageHeading> = None;
    for heading in headings {
        if heading.heading_type().is_tax_deduction() {
            first_tax.get_or_insert(heading);
        } else if let (true, Some(tax)) = (heading.is_tax_impacting(), first_tax) {
            return Err(EngineError::OrderingViolation {
                heading: heading.name().to_string(),
                message: format!("{} ('{}')", TAX_ORDER_MESSAGE, tax.name()),
            });
        }
    }
    Ok(())
}

/// Checks the tax ordering invariant on the package's stored order.
pub fn validate_package_order(package: &Package) -> EngineResult<()> {
    check_tax_ordering(package.ordered_headings())
}

/// Applies explicit `(package_heading_id, order)` assignments.
///
/// All assignments are applied together; any unknown id or ordering
/// violation rejects the whole batch.
///
/// # Example
///
/// ```
/// use payroll_engine::calculation::reorder;
/// use payroll_engine::models::Package;
///
/// let package = Package {
///     id: "pkg".to_string(),
///     name: "Empty".to_string(),
///     organization: String::new(),
///     headings: vec![],
/// };
/// assert!(reorder(&package, &[("missing".to_string(), 1)]).is_err());
/// ```
pub fn reorder(package: &Package, orders: &[(String, i32)]) -> EngineResult<Package> {
    let assignments: BTreeMap<&str, i32> = orders.iter().map(|(id, o)| (id.as_str(), *o)).collect();
    for id in assignments.keys() {
        if package.heading(id).is_none() {
            return Err(unknown_heading(id));
        }
    }

    let mut reordered = package.clone();
    for heading in &mut reordered.headings {
        if let Some(order) = assignments.get(heading.id.as_str()) {
            heading.order = *order;
        }
    }

    validate_package_order(&reordered)?;
    Ok(reordered)
}

/// Moves the heading at `from_order` to `to_order`, shifting the headings
/// in between by one position.
pub fn switch_order(package: &Package, from_order: i32, to_order: i32) -> EngineResult<Package> {
    let moving = package
        .headings
        .iter()
        .find(|h| h.order == from_order)
        .ok_or_else(|| EngineError::InvalidHeading {
            heading: format!("order {}", from_order),
            field: "order".to_string(),
            message: "no heading at this position".to_string(),
        })?;
    let moving_id = moving.id.clone();

    let mut switched = package.clone();
    for heading in &mut switched.headings {
        if heading.id == moving_id {
            heading.order = to_order;
        } else if from_order < to_order && heading.order > from_order && heading.order <= to_order {
            heading.order -= 1;
        } else if from_order > to_order && heading.order >= to_order && heading.order < from_order {
            heading.order += 1;
        }
    }

    validate_package_order(&switched)?;
    Ok(switched)
}

/// Moves a heading, identified by id, to `new_order`.
pub fn move_heading(package: &Package, heading_id: &str, new_order: i32) -> EngineResult<Package> {
    let heading = package
        .heading(heading_id)
        .ok_or_else(|| unknown_heading(heading_id))?;
    switch_order(package, heading.order, new_order)
}

fn unknown_heading(id: &str) -> EngineError {
    EngineError::InvalidHeading {
        heading: id.to_string(),
        field: "order".to_string(),
        message: "heading is not part of the package".to_string(),
    }
}
