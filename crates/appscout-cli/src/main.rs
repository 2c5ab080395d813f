//! appscout CLI
//!
//! ## Usage
//!
//! ```bash
//! appscout status                      # Wait for Appium
//! appscout find "Оплатить" --all       # Locate across contexts
//! appscout queries "Каталог" -p ios    # Show queries, no device needed
//! appscout qr universal --out qr/      # Render a payment QR
//! appscout run login pay_by_qr         # Run flows
//! ```

use appscout_cli::{handlers, Cli, CliConfig, CliResult, ColorChoice, Commands, Verbosity};
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();
    let config = build_config(&cli);
    init_tracing(&config);

    match cli.command {
        Commands::Status(args) => handlers::status(&config, &args),
        Commands::Contexts => handlers::contexts(&config),
        Commands::Find(args) => handlers::find(&config, &args),
        Commands::Tap(args) => handlers::tap(&config, &args),
        Commands::Queries(args) => handlers::queries(&config, &args),
        Commands::Qr(args) => handlers::qr(&config, &args),
        Commands::CleanGallery(args) => handlers::clean(&config, &args),
        Commands::Flows => {
            handlers::list_flows(&config);
            Ok(())
        }
        Commands::Run(args) => handlers::run(&config, &args),
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    let color: ColorChoice = cli.color.into();
    CliConfig::new()
        .with_verbosity(Verbosity::from_flags(cli.quiet, cli.verbose))
        .with_color(color)
        .with_config_path(cli.config.clone())
        .with_platform(cli.platform.map(Into::into))
}

/// `RUST_LOG` wins; otherwise the level follows `-q`/`-v`
fn init_tracing(config: &CliConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.verbosity.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(config.color.should_color())
        .with_target(config.verbosity.is_debug())
        .init();
}
