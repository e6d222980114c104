//! Solver configuration.

use serde::{Deserialize, Serialize};

/// Limits and switches for one constraint system.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Maximum recursion depth of the search.
    pub max_depth: usize,
    /// Maximum number of search steps; each recursive visit is one step.
    pub max_steps: usize,
    /// Dump the system at every branch point.
    pub debug_constraint_solver: bool,
    /// When false, a disjunction left after simplification fails its branch
    /// instead of being split.
    pub branch_on_disjunctions: bool,
    pub stop_at_first_solution: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_depth: 128,
            max_steps: 100_000,
            debug_constraint_solver: false,
            branch_on_disjunctions: true,
            stop_at_first_solution: false,
        }
    }
}

impl SolverConfig {
    /// Configuration for a yes/no relation query.
    pub fn one_shot(&self) -> Self {
        Self {
            stop_at_first_solution: true,
            ..self.clone()
        }
    }

    /// Configuration for the nested "at least as specialized" check.
    ///
    /// The nested system never branches on disjunctions, which bounds the
    /// recursion between ranking and solving.
    pub fn specialization_check(&self) -> Self {
        Self {
            branch_on_disjunctions: false,
            stop_at_first_solution: true,
            debug_constraint_solver: false,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_uses_defaults() {
        let config: SolverConfig = serde_json::from_str(r#"{ "max_depth": 8 }"#).unwrap();
        assert_eq!(config.max_depth, 8);
        assert_eq!(config.max_steps, 100_000);
        assert!(config.branch_on_disjunctions);
    }

    #[test]
    fn specialization_check_never_branches() {
        let config = SolverConfig::default().specialization_check();
        assert!(!config.branch_on_disjunctions);
        assert!(config.stop_at_first_solution);
    }
}
