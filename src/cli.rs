//! Command-line interface for the tessera solver.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tessera_solver::SolverConfig;

#[derive(Parser)]
#[command(name = "tessera")]
#[command(about = "Constraint-based type inference and overload resolution", long_about = None)]
pub struct Cli {
    /// Log solver decisions (overridden by TESSERA_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Solve a scenario and print the outcome
    Solve {
        /// Scenario file (JSON)
        file: PathBuf,

        #[command(flatten)]
        solver: SolverArgs,
    },
    /// Print the constraint system of a scenario without solving it
    Dump {
        /// Scenario file (JSON)
        file: PathBuf,
    },
}

/// Overrides for the scenario's `config`.
#[derive(Args, Debug, Default)]
pub struct SolverArgs {
    /// Maximum recursion depth of the search
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Maximum number of search steps
    #[arg(long)]
    pub max_steps: Option<usize>,

    /// Print the system before solving and every solution after
    #[arg(long)]
    pub debug_solver: bool,
}

impl SolverArgs {
    pub fn apply(&self, config: &mut SolverConfig) {
        if let Some(max_depth) = self.max_depth {
            config.max_depth = max_depth;
        }
        if let Some(max_steps) = self.max_steps {
            config.max_steps = max_steps;
        }
        if self.debug_solver {
            config.debug_constraint_solver = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let cli = Cli::parse_from([
            "tessera",
            "solve",
            "call.json",
            "--max-depth",
            "8",
            "--debug-solver",
        ]);
        let Command::Solve { file, solver } = cli.command else {
            panic!("expected solve");
        };
        assert_eq!(file, PathBuf::from("call.json"));
        let mut config = SolverConfig::default();
        solver.apply(&mut config);
        assert_eq!(config.max_depth, 8);
        assert_eq!(config.max_steps, SolverConfig::default().max_steps);
        assert!(config.debug_constraint_solver);
    }

    #[test]
    fn verbose_is_global() {
        let cli = Cli::parse_from(["tessera", "dump", "call.json", "-v"]);
        assert!(cli.verbose);
        assert!(matches!(cli.command, Command::Dump { .. }));
    }
}
