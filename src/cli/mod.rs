//! Command-line interface definitions for the `stratus` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

/// Top-level CLI for the `stratus` binary.
#[derive(Debug, Parser)]
#[command(
    name = "stratus",
    about = "Converge declarative resource configuration on the control plane",
    arg_required_else_help = true
)]
pub(crate) struct Cli {
    /// Log at debug level regardless of `STRATUS_LOG`.
    #[arg(long, short, global = true)]
    pub(crate) verbose: bool,
    /// Operation to perform.
    #[command(subcommand)]
    pub(crate) command: Command,
}

/// Subcommands of `stratus`.
#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Create, update or replace every configured resource.
    #[command(name = "apply")]
    Apply(ApplyCommand),
    /// Re-read every managed resource and drop the ones that disappeared.
    #[command(name = "refresh")]
    Refresh(StateArgs),
    /// Delete managed resources.
    #[command(name = "destroy")]
    Destroy(DestroyCommand),
    /// Adopt an existing remote object into the state file.
    #[command(name = "import")]
    Import(ImportCommand),
    /// Read a data source and print its attributes.
    #[command(name = "read-data")]
    ReadData(ReadDataCommand),
    /// Print the schema of every resource and data source.
    #[command(name = "schema")]
    Schema,
}

/// Location of the state file.
#[derive(Debug, Args)]
pub(crate) struct StateArgs {
    /// JSON file recording every managed resource.
    #[arg(long, value_name = "PATH", default_value = "stratus.state.json")]
    pub(crate) state: Utf8PathBuf,
}

/// Arguments for `stratus apply`.
#[derive(Debug, Args)]
pub(crate) struct ApplyCommand {
    /// State file location.
    #[command(flatten)]
    pub(crate) state: StateArgs,
    /// JSON document with `resources` and `data` sections keyed by
    /// `<type>.<name>`.
    #[arg(value_name = "CONFIG")]
    pub(crate) config: Utf8PathBuf,
}

/// Arguments for `stratus destroy`.
#[derive(Debug, Args)]
pub(crate) struct DestroyCommand {
    /// State file location.
    #[command(flatten)]
    pub(crate) state: StateArgs,
    /// Addresses to destroy; every managed resource when omitted.
    #[arg(value_name = "ADDRESS")]
    pub(crate) addresses: Vec<String>,
}

/// Arguments for `stratus import`.
#[derive(Debug, Args)]
pub(crate) struct ImportCommand {
    /// State file location.
    #[command(flatten)]
    pub(crate) state: StateArgs,
    /// Address to record the object under, as `<type>.<name>`.
    #[arg(value_name = "ADDRESS")]
    pub(crate) address: String,
    /// Identifier of the remote object.
    #[arg(value_name = "ID")]
    pub(crate) id: String,
}

/// Arguments for `stratus read-data`.
#[derive(Debug, Args)]
pub(crate) struct ReadDataCommand {
    /// Data source type, for example `statemachine_state_machines`.
    #[arg(value_name = "TYPE")]
    pub(crate) type_name: String,
    /// Data source arguments as a JSON object.
    #[arg(long, value_name = "JSON", default_value = "{}")]
    pub(crate) args: String,
}
