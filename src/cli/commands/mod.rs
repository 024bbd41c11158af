//! Command handlers, one module per subcommand.

pub mod rollback;
pub mod run;
pub mod status;
