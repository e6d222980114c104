//! Rendering outcomes for people.

use std::fmt;

use tessera_solver::{LocatorId, LocatorStore, OverloadChoice, Solution};
use tessera_types::{Type, TypeVarId};

use crate::Outcome;
use crate::scenario::{ScenarioDecls, ScenarioVars};

/// Displays an [`Outcome`]: the bindings and overload choices of a solved
/// system, the positions at which an ambiguous one disagrees, or the failure
/// of an unsolvable one.
///
/// With scenario names attached, variables and values print under the names
/// they were declared with, and only the scenario's own variables are listed.
pub struct OutcomeReport<'r, 'db> {
    db: &'db dyn salsa::Database,
    outcome: &'r Outcome<'db>,
    locators: &'r LocatorStore,
    vars: Option<&'r ScenarioVars<'db>>,
    decls: Option<&'r ScenarioDecls<'db>>,
}

impl<'r, 'db> OutcomeReport<'r, 'db> {
    pub fn new(
        db: &'db dyn salsa::Database,
        outcome: &'r Outcome<'db>,
        locators: &'r LocatorStore,
    ) -> Self {
        Self {
            db,
            outcome,
            locators,
            vars: None,
            decls: None,
        }
    }

    pub fn with_names(self, vars: &'r ScenarioVars<'db>, decls: &'r ScenarioDecls<'db>) -> Self {
        Self {
            vars: Some(vars),
            decls: Some(decls),
            ..self
        }
    }

    fn var_name(&self, var: TypeVarId) -> String {
        self.vars
            .and_then(|vars| vars.name(var))
            .map_or_else(|| var.to_string(), str::to_owned)
    }

    fn choice_name(&self, choice: &OverloadChoice<'db>) -> String {
        let key = self
            .decls
            .zip(choice.decl_id())
            .and_then(|(decls, decl)| decls.value_key(decl));
        match (key, choice) {
            (Some(key), OverloadChoice::DeclViaDynamic { .. }) => format!("{key} (dynamic)"),
            (Some(key), _) => key.to_owned(),
            (None, _) => choice.display(self.db).to_string(),
        }
    }

    fn locator(&self, locator: LocatorId) -> String {
        self.locators.get(locator).to_string()
    }

    fn reported_vars(&self, solution: &Solution<'db>) -> Vec<TypeVarId> {
        match self.vars {
            Some(vars) => vars.iter().map(|(var, _)| var).collect(),
            None => solution.type_bindings().keys().copied().collect(),
        }
    }

    fn write_solution(&self, f: &mut fmt::Formatter<'_>, solution: &Solution<'db>) -> fmt::Result {
        let db = self.db;
        write!(f, "Solved (fixed score {})", solution.fixed_score())?;
        let vars = self.reported_vars(solution);
        if !vars.is_empty() {
            write!(f, "\nBindings:")?;
            for var in vars {
                let ty = solution.simplify_type(db, Type::type_var(db, var));
                write!(f, "\n  {} as {}", self.var_name(var), ty.display(db))?;
            }
        }
        if !solution.overload_choices().is_empty() {
            write!(f, "\nOverloads:")?;
            for (locator, selected) in solution.overload_choices() {
                write!(
                    f,
                    "\n  {} with {} as {}",
                    self.locator(*locator),
                    self.choice_name(&selected.choice),
                    selected.implied.display(db)
                )?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for OutcomeReport<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let db = self.db;
        match self.outcome {
            Outcome::Solved(solution) => self.write_solution(f, solution),
            Outcome::Ambiguous { solutions, diff } => {
                write!(f, "Ambiguous: {} solutions", solutions.len())?;
                if !diff.overloads.is_empty() {
                    write!(f, "\nDiffering overloads:")?;
                    for overload in &diff.overloads {
                        let choices: Vec<_> = overload
                            .choices
                            .iter()
                            .map(|choice| self.choice_name(choice))
                            .collect();
                        write!(
                            f,
                            "\n  {}: {}",
                            self.locator(overload.locator),
                            choices.join(" | ")
                        )?;
                    }
                }
                if !diff.type_bindings.is_empty() {
                    write!(f, "\nDiffering bindings:")?;
                    for binding in &diff.type_bindings {
                        let types: Vec<_> = binding
                            .bindings
                            .iter()
                            .map(|ty| ty.display(db).to_string())
                            .collect();
                        write!(f, "\n  {}: {}", self.var_name(binding.var), types.join(" | "))?;
                    }
                }
                Ok(())
            }
            Outcome::Failed(Some(failure)) => {
                write!(f, "No solution: {}", failure.display(db, Some(self.locators)))
            }
            Outcome::Failed(None) => write!(f, "No solution"),
        }
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use tessera_solver::{ConstraintSystem, SolverContext};

    use super::*;
    use crate::scenario::Scenario;
    use crate::solve_system;

    fn test_db() -> salsa::DatabaseImpl {
        salsa::DatabaseImpl::new()
    }

    fn render(json: &str) -> String {
        let db = test_db();
        let scenario = Scenario::from_json(json).unwrap();
        let decls = scenario.build_decls(&db).unwrap();
        let mut cs = ConstraintSystem::new(
            SolverContext::new(&db, &decls.table),
            scenario.config.clone(),
        );
        let vars = scenario.populate(&mut cs, &decls).unwrap();
        let outcome = solve_system(&mut cs).unwrap();
        OutcomeReport::new(&db, &outcome, cs.locators())
            .with_names(&vars, &decls)
            .to_string()
    }

    #[test]
    fn solved_call() {
        let report = render(
            r#"{
                "types": [{ "name": "Int" }, { "name": "String" }],
                "values": [
                    { "id": "f_int", "name": "f", "type": { "function": {
                        "input": { "nominal": "Int" }, "result": { "tuple": [] } } } },
                    { "id": "f_string", "name": "f", "type": { "function": {
                        "input": { "nominal": "String" }, "result": { "tuple": [] } } } }
                ],
                "type_vars": [{ "name": "callee", "anchor": 0 }, "result"],
                "constraints": [
                    { "kind": "overload", "bound": { "var": "callee" },
                      "choices": ["f_int", "f_string"], "anchor": 0 },
                    { "kind": "applicable_function",
                      "function": { "function": { "input": { "nominal": "Int" }, "result": { "var": "result" } } },
                      "callee": { "var": "callee" } }
                ]
            }"#,
        );
        assert_snapshot!(report, @r"
        Solved (fixed score 0)
        Bindings:
          callee as Int -> ()
          result as ()
        Overloads:
          expr#0 with f_int as Int -> ()
        ");
    }

    #[test]
    fn ambiguous_binding() {
        let report = render(
            r#"{
                "types": [{ "name": "Int" }, { "name": "String" }],
                "type_vars": [{ "name": "x", "prefers_subtype": true }],
                "constraints": [
                    { "kind": "disjunction", "constraints": [
                        { "kind": "bind", "first": { "var": "x" }, "second": { "nominal": "Int" } },
                        { "kind": "bind", "first": { "var": "x" }, "second": { "nominal": "String" } }
                    ] }
                ]
            }"#,
        );
        assert_snapshot!(report, @r"
        Ambiguous: 2 solutions
        Differing bindings:
          x: Int | String
        ");
    }

    #[test]
    fn failure() {
        let report = render(
            r#"{
                "types": [{ "name": "Int" }, { "name": "String" }],
                "constraints": [
                    { "kind": "equal", "first": { "nominal": "Int" }, "second": { "nominal": "String" } }
                ]
            }"#,
        );
        assert_snapshot!(report, @"No solution: types are not equal: Int, String");
    }
}
