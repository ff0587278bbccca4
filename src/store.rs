//! Persistence seam for payroll collaborators.
//!
//! The engine reads package slots, employees and their facts, and the
//! rows of payrolls already generated, and writes backdated differences.
//! [`InMemoryRepository`] backs tests, benchmarks and the preview server.

use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::NaiveDate;

use crate::error::{EngineError, EngineResult};
use crate::models::{BackdatedCalculation, Employee, EmployeeFacts, PackageSlot, ReportRowRecord};

/// Storage operations the engine depends on.
pub trait PayrollRepository: Send + Sync {
    /// Fetches a package slot by id.
    fn package_slot(&self, slot_id: &str) -> EngineResult<PackageSlot>;

    /// All package slots of an employee, ordered by `active_from_date`.
    fn package_slots(&self, employee_id: &str) -> EngineResult<Vec<PackageSlot>>;

    /// Fetches an employee by id.
    fn employee(&self, employee_id: &str) -> EngineResult<Employee>;

    /// Attendance, rebates, history and pending adjustments of an employee.
    fn employee_facts(&self, employee_id: &str) -> EngineResult<EmployeeFacts>;

    /// Generated rows whose period intersects `[from, to]`.
    fn generated_report_rows(
        &self,
        employee_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> EngineResult<Vec<ReportRowRecord>>;

    /// Start date of the earliest generated payroll covering `date`.
    fn payroll_start_covering(
        &self,
        employee_id: &str,
        date: NaiveDate,
    ) -> EngineResult<Option<NaiveDate>>;

    /// Replaces every difference stored for a slot in one step.
    ///
    /// The slot's `backdated_calculation_generated` flag is set only when
    /// `calculations` is not empty.
    fn replace_backdated_calculations(
        &self,
        slot_id: &str,
        calculations: Vec<BackdatedCalculation>,
    ) -> EngineResult<()>;

    /// Differences stored for a slot.
    fn backdated_calculations(&self, slot_id: &str) -> EngineResult<Vec<BackdatedCalculation>>;
}

#[derive(Debug, Default)]
struct State {
    employees: BTreeMap<String, Employee>,
    facts: BTreeMap<String, EmployeeFacts>,
    slots: BTreeMap<String, PackageSlot>,
    rows: Vec<ReportRowRecord>,
    backdated: BTreeMap<String, Vec<BackdatedCalculation>>,
}

/// A [`PayrollRepository`] kept in process memory.
///
/// Every write takes the single state lock, so a diff replacement is seen
/// either entirely or not at all.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    state: RwLock<State>,
}

fn poisoned() -> EngineError {
    EngineError::CalculationError {
        message: "repository lock poisoned".to_string(),
    }
}

impl InMemoryRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an employee with their facts.
    pub fn insert_employee(&self, employee: Employee, facts: EmployeeFacts) -> EngineResult<()> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        state.facts.insert(employee.id.clone(), facts);
        state.employees.insert(employee.id.clone(), employee);
        Ok(())
    }

    /// Stores or replaces a package slot.
    pub fn insert_slot(&self, slot: PackageSlot) -> EngineResult<()> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        state.slots.insert(slot.id.clone(), slot);
        Ok(())
    }

    /// Appends the rows of a generated payroll.
    ///
    /// The rows also become paid history in the employee's facts.
    pub fn record_payroll(&self, rows: Vec<ReportRowRecord>) -> EngineResult<()> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        for row in &rows {
            if let Some(facts) = state.facts.get_mut(&row.employee_id) {
                facts.paid_rows.push(row.clone());
                facts.last_payroll_date = Some(
                    facts
                        .last_payroll_date
                        .map_or(row.to_date, |d| d.max(row.to_date)),
                );
            }
        }
        state.rows.extend(rows);
        Ok(())
    }
}

impl PayrollRepository for InMemoryRepository {
    fn package_slot(&self, slot_id: &str) -> EngineResult<PackageSlot> {
        let state = self.state.read().map_err(|_| poisoned())?;
        state
            .slots
            .get(slot_id)
            .cloned()
            .ok_or_else(|| EngineError::PackageSlotNotFound {
                slot_id: slot_id.to_string(),
            })
    }

    fn package_slots(&self, employee_id: &str) -> EngineResult<Vec<PackageSlot>> {
        let state = self.state.read().map_err(|_| poisoned())?;
        let mut slots: Vec<PackageSlot> = state
            .slots
            .values()
            .filter(|s| s.employee_id == employee_id)
            .cloned()
            .collect();
        slots.sort_by_key(|s| s.active_from_date);
        Ok(slots)
    }

    fn employee(&self, employee_id: &str) -> EngineResult<Employee> {
        let state = self.state.read().map_err(|_| poisoned())?;
        state
            .employees
            .get(employee_id)
            .cloned()
            .ok_or_else(|| EngineError::EmployeeNotFound {
                employee_id: employee_id.to_string(),
            })
    }

    fn employee_facts(&self, employee_id: &str) -> EngineResult<EmployeeFacts> {
        let state = self.state.read().map_err(|_| poisoned())?;
        let mut facts = state.facts.get(employee_id).cloned().unwrap_or_default();
        facts.pending_backdated = state
            .slots
            .values()
            .filter(|s| s.employee_id == employee_id)
            .filter_map(|s| state.backdated.get(&s.id))
            .flatten()
            .filter(|b| b.adjusted_payroll.is_none())
            .cloned()
            .collect();
        Ok(facts)
    }

    fn generated_report_rows(
        &self,
        employee_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> EngineResult<Vec<ReportRowRecord>> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state
            .rows
            .iter()
            .filter(|r| r.employee_id == employee_id && r.from_date <= to && r.to_date >= from)
            .cloned()
            .collect())
    }

    fn payroll_start_covering(
        &self,
        employee_id: &str,
        date: NaiveDate,
    ) -> EngineResult<Option<NaiveDate>> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state
            .rows
            .iter()
            .filter(|r| r.employee_id == employee_id && r.from_date <= date && r.to_date >= date)
            .map(|r| r.from_date)
            .min())
    }

    fn replace_backdated_calculations(
        &self,
        slot_id: &str,
        calculations: Vec<BackdatedCalculation>,
    ) -> EngineResult<()> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        let generated = !calculations.is_empty();
        let slot = state
            .slots
            .get_mut(slot_id)
            .ok_or_else(|| EngineError::PackageSlotNotFound {
                slot_id: slot_id.to_string(),
            })?;
        slot.backdated_calculation_generated = generated;
        state.backdated.insert(slot_id.to_string(), calculations);
        Ok(())
    }

    fn backdated_calculations(&self, slot_id: &str) -> EngineResult<Vec<BackdatedCalculation>> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.backdated.get(slot_id).cloned().unwrap_or_default())
    }
}
