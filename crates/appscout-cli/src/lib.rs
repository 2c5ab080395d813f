//! appscout CLI library
//!
//! Command plumbing for the `appscout` binary: argument definitions,
//! output, and the flow runner.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod config;
mod error;
pub mod handlers;
mod output;
mod runner;

pub use commands::{
    CleanGalleryArgs, Cli, ColorArg, Commands, FindArgs, FormatArg, PlatformArg, QrArgs, QrKindArg,
    QueriesArgs, RunArgs, StatusArgs, TapArgs,
};
pub use config::{CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult};
pub use output::{OutputFormat, ProgressReporter};
pub use runner::{Connector, FlowResult, FlowRunner, RunReport};
