//! One module per subcommand. Each exposes an `execute` function.

pub mod audit;
pub mod create;
pub mod delete;
pub mod get;
pub mod history;
pub mod keygen;
pub mod list;
pub mod mask;
pub mod rotate;
pub mod types;
pub mod update;
