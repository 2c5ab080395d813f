//! CLI command definitions using clap

use appscout::media::QrKind;
use appscout::Platform;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// appscout: find and tap elements across native and web contexts of an Appium session
#[derive(Parser, Debug)]
#[command(name = "appscout")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Suite config file (default: ./appscout.yaml when present)
    #[arg(short, long, global = true, env = "APPSCOUT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Platform under test; overrides TEST_PLATFORM and the config file
    #[arg(short, long, global = true)]
    pub platform: Option<PlatformArg>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Wait for the Appium server to answer /status
    Status(StatusArgs),

    /// List the contexts of a new session
    Contexts,

    /// Locate an element by visible text or accessibility id
    Find(FindArgs),

    /// Locate an element and tap it
    Tap(TapArgs),

    /// Print the native and web queries built for a text (offline)
    Queries(QueriesArgs),

    /// Render a payment QR code to PNG
    Qr(QrArgs),

    /// Remove images from the device gallery
    CleanGallery(CleanGalleryArgs),

    /// List the available flows
    Flows,

    /// Run flows, each in a fresh session
    Run(RunArgs),
}

/// Arguments for the status command
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Seconds to wait for the server
    #[arg(long, default_value = "60")]
    pub timeout: u64,
}

/// Arguments for the find command
#[derive(Parser, Debug)]
pub struct FindArgs {
    /// Visible text or accessibility id
    pub text: String,

    /// Timeout in milliseconds (default: finder timeout from config)
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Report every match in the first context that has one
    #[arg(long)]
    pub all: bool,
}

/// Arguments for the tap command
#[derive(Parser, Debug)]
pub struct TapArgs {
    /// Visible text or accessibility id
    pub text: String,

    /// Timeout in milliseconds (default: finder timeout from config)
    #[arg(short, long)]
    pub timeout: Option<u64>,
}

/// Arguments for the queries command
#[derive(Parser, Debug)]
pub struct QueriesArgs {
    /// Text to build queries for
    pub text: String,
}

/// Arguments for the qr command
#[derive(Parser, Debug)]
pub struct QrArgs {
    /// QR flavour
    pub kind: QrKindArg,

    /// Output directory (default: qr.out_dir from config)
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Contract or invoice id (default: random 6 digits)
    #[arg(long)]
    pub id: Option<String>,

    /// Amount (default: qr.amount from config)
    #[arg(long)]
    pub amount: Option<String>,

    /// Also push the PNG into the device gallery
    #[arg(long)]
    pub push: bool,
}

/// Arguments for the clean-gallery command
#[derive(Parser, Debug)]
pub struct CleanGalleryArgs {
    /// Only clear this album under Pictures/
    #[arg(long)]
    pub album: Option<String>,
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Flows to run (default: all, in suite order)
    pub flows: Vec<String>,

    /// Stop after the first failing flow
    #[arg(long)]
    pub fail_fast: bool,

    /// Generate and push a QR of this kind before pay_by_qr
    #[arg(long)]
    pub qr: Option<QrKindArg>,

    /// Report format
    #[arg(short, long, default_value = "text")]
    pub format: FormatArg,
}

/// Color argument
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

/// Platform argument
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum PlatformArg {
    /// Android via UiAutomator2
    Android,
    /// iOS via XCUITest
    Ios,
}

impl From<PlatformArg> for Platform {
    fn from(arg: PlatformArg) -> Self {
        match arg {
            PlatformArg::Android => Self::Android,
            PlatformArg::Ios => Self::Ios,
        }
    }
}

/// QR flavour argument
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum QrKindArg {
    /// Megapolis contract payment
    Megapolis,
    /// Universal invoice payment
    Universal,
}

impl From<QrKindArg> for QrKind {
    fn from(arg: QrKindArg) -> Self {
        match arg {
            QrKindArg::Megapolis => Self::Megapolis,
            QrKindArg::Universal => Self::Universal,
        }
    }
}

/// Report format argument
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum FormatArg {
    /// Human-readable
    #[default]
    Text,
    /// JSON report on stdout
    Json,
}

impl From<FormatArg> for crate::output::OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Text => Self::Text,
            FormatArg::Json => Self::Json,
        }
    }
}
