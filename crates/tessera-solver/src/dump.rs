//! Human-readable dumps of a constraint system and of solutions.

use std::fmt;

use crate::locator::LocatorStore;
use crate::solution::Solution;
use crate::system::ConstraintSystem;
use crate::typevar::Binding;

pub struct SystemDump<'s, 'a, 'db> {
    cs: &'s ConstraintSystem<'a, 'db>,
}

impl<'a, 'db> ConstraintSystem<'a, 'db> {
    /// The type variables, constraints and resolved overloads of the system.
    pub fn dump(&self) -> SystemDump<'_, 'a, 'db> {
        SystemDump { cs: self }
    }
}

impl fmt::Display for SystemDump<'_, '_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cs = self.cs;
        let db = cs.db();
        let locators = cs.locators();

        write!(f, "Type Variables:")?;
        for var in cs.type_vars().ids() {
            write!(f, "\n  {var}")?;
            if cs.type_vars().options(var).can_bind_to_lvalue {
                write!(f, " [lvalue allowed]")?;
            }
            match cs.type_vars().binding(var) {
                Binding::Free => {}
                Binding::Parent(_) => write!(f, " equivalent to {}", cs.representative(var))?,
                Binding::Fixed(ty) => write!(f, " as {}", ty.display(db))?,
            }
        }

        write!(f, "\nActive Constraints:")?;
        for (_, constraint) in cs.constraints().active() {
            write!(
                f,
                "\n  {}",
                constraint.display_with_locators(db, locators).indented(2)
            )?;
        }

        let retired = cs.constraints().retired();
        if !retired.is_empty() {
            write!(f, "\nInactive Constraints:")?;
            for constraint in retired {
                write!(
                    f,
                    "\n  {}",
                    constraint.display_with_locators(db, locators).indented(2)
                )?;
            }
        }

        if !cs.resolved_overloads().is_empty() {
            write!(f, "\nResolved overloads:")?;
            for resolved in cs.resolved_overloads() {
                write!(
                    f,
                    "\n  selected overload set choice {}: {} == {}",
                    resolved.choice.display(db),
                    resolved.bound.display(db),
                    resolved.implied.display(db)
                )?;
            }
        }

        if let Some(failed) = cs.failed_constraint() {
            write!(
                f,
                "\nFailed constraint:\n  {}",
                failed.display_with_locators(db, locators).indented(2)
            )?;
        }
        Ok(())
    }
}

pub struct SolutionDump<'s, 'db> {
    db: &'db dyn salsa::Database,
    solution: &'s Solution<'db>,
    locators: Option<&'s LocatorStore>,
}

impl<'db> Solution<'db> {
    /// The score, bindings, overload choices and restrictions of the
    /// solution. Overload choices print their locator when `locators` is
    /// given.
    pub fn dump<'s>(
        &'s self,
        db: &'db dyn salsa::Database,
        locators: Option<&'s LocatorStore>,
    ) -> SolutionDump<'s, 'db> {
        SolutionDump {
            db,
            solution: self,
            locators,
        }
    }
}

impl fmt::Display for SolutionDump<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let db = self.db;
        let solution = self.solution;

        write!(f, "Fixed score: {}", solution.fixed_score())?;
        write!(f, "\nType variables:")?;
        for (var, ty) in solution.type_bindings() {
            write!(f, "\n  {var} as {}", ty.display(db))?;
        }

        if !solution.overload_choices().is_empty() {
            write!(f, "\nOverload choices:")?;
            for (locator, selected) in solution.overload_choices() {
                match self.locators {
                    Some(locators) => write!(f, "\n  {}", locators.get(*locator))?,
                    None => write!(f, "\n  locator #{}", locator.index())?,
                }
                write!(
                    f,
                    " with {} as {}",
                    selected.choice.display(db),
                    selected.implied.display(db)
                )?;
            }
        }

        if !solution.restrictions().is_empty() {
            write!(f, "\nRestrictions:")?;
            for recorded in solution.restrictions() {
                write!(
                    f,
                    "\n  {} to {} is {}",
                    recorded.from.display(db),
                    recorded.to.display(db),
                    recorded.restriction
                )?;
            }
        }
        Ok(())
    }
}
