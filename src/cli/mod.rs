//! Command-line interface
//!
//! `fixloop run`, `fixloop status` and `fixloop rollback`, each printing
//! either human-readable output or JSON (`--json`).

pub mod backlog;
pub mod commands;
pub mod output;
pub mod types;
pub mod wiring;

pub use types::{Cli, Commands};

use crate::cli::output::action_failure;

/// Report a command failure and exit with status 1.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let chain: Vec<String> = err.chain().skip(1).map(ToString::to_string).collect();
        let body = serde_json::json!({
            "success": false,
            "error": err.to_string(),
            "causes": chain,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );
    } else {
        eprintln!("{}", action_failure(&format!("{err:#}")));
    }
    std::process::exit(1);
}
