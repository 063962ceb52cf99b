//! Command-driven storage backend access.
//!
//! The backend is reachable only through discrete shell invocations
//! (`hadoop fs -put` and friends). [`executor`] runs those commands off the
//! connection-handling path and captures their output; [`bridge`] builds the
//! command strings and interprets exit codes into domain outcomes, so raw
//! codes never leak to the transfer layer.

mod bridge;
mod executor;

pub use bridge::{BackendConfig, RemoveOutcome, StorageBridge, WriteOutcome};
pub use executor::{CommandOutput, CommandRunner, LaunchError, RunFuture, ShellRunner};
