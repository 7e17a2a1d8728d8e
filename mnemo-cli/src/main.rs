//! mnemo CLI - download surveys from and update firmware on the MNEMO logger.
//!
//! ## Features
//!
//! - Import survey data into `.dmp` or raw dump files
//! - Update the logger firmware from an Intel HEX file
//! - Decode dump files into readable surveys or JSON
//! - USB autodetection of the logger
//! - Environment variable and config file support

use {
    anyhow::Result,
    clap::{Parser, Subcommand, ValueEnum},
    console::style,
    env_logger::Env,
    log::debug,
    mnemo::{DumpFormat, ProtocolVersion, device},
    std::{
        env,
        path::PathBuf,
        process::ExitCode,
        sync::atomic::{AtomicBool, Ordering},
    },
    thiserror::Error,
};

mod commands;
mod config;

use config::Config;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Check if emoji/animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Default baud rate for firmware updates.
pub(crate) const DEFAULT_UPDATE_BAUD: u32 = 460_800;

/// Failures the CLI reports with a dedicated exit code.
#[derive(Debug, Error)]
pub(crate) enum CliError {
    /// The invocation cannot be carried out as given.
    #[error("{0}")]
    Usage(String),

    /// No port was given and none could be detected.
    #[error(
        "No MNEMO logger found (USB {vid:04x}:{pid:04x}); pass a TTY, use --port or set MNEMO_PORT"
    )]
    NoDevice {
        /// Vendor ID searched for.
        vid: u16,
        /// Product ID searched for.
        pid: u16,
    },
}

impl CliError {
    fn exit_code(&self) -> u8 {
        match self {
            Self::Usage(_) | Self::NoDevice { .. } => 2,
        }
    }
}

/// Exit code for an error returned by a command.
fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<CliError>()
        .map_or(1, CliError::exit_code)
}

/// mnemo - Survey download and firmware update tool for the MNEMO logger.
///
/// Environment variables:
///   MNEMO_PORT   - Default serial port
///   MNEMO_BAUD   - Firmware update baud rate (default: 460800)
#[derive(Parser)]
#[command(name = "mnemo")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, global = true, env = "MNEMO_PORT")]
    port: Option<String>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Dump file formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    /// Semicolon-separated decimal bytes (default).
    Dmp,
    /// Bytes exactly as received.
    Raw,
}

impl From<Format> for DumpFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Dmp => DumpFormat::Dmp,
            Format::Raw => DumpFormat::Raw,
        }
    }
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Download survey data from the logger into a dump file.
    Import {
        /// Dump file format.
        #[arg(long, value_enum)]
        format: Option<Format>,

        /// Use the v2 download trigger.
        #[arg(long)]
        v2: bool,

        /// Optional serial device followed by the output file.
        #[arg(required = true, num_args = 1..=2, value_names = ["TTY", "FILE"])]
        target: Vec<String>,
    },

    /// Write an Intel HEX firmware image to the logger.
    Update {
        /// Baud rate for the bootloader link.
        #[arg(short, long, env = "MNEMO_BAUD")]
        baud: Option<u32>,

        /// Optional serial device followed by the firmware file.
        #[arg(required = true, num_args = 1..=2, value_names = ["TTY", "FILE"])]
        target: Vec<String>,
    },

    /// Decode a survey dump file.
    Decode {
        /// Print the surveys as JSON to stdout.
        #[arg(long)]
        json: bool,

        /// Dump file (`.dmp` text or raw bytes).
        file: PathBuf,
    },

    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },
}

/// Split `[TTY] FILE` positionals.
fn split_target(target: &[String]) -> (Option<&str>, PathBuf) {
    match target {
        [tty, file] => (Some(tty.as_str()), PathBuf::from(file)),
        [file] => (None, PathBuf::from(file)),
        _ => (None, PathBuf::new()),
    }
}

/// Serial port for a command.
///
/// Priority: positional TTY, `--port`/`MNEMO_PORT`, config file, then USB
/// autodetection with the configured (or built-in) VID/PID.
fn resolve_port(cli: &Cli, config: &Config, tty: Option<&str>) -> Result<String> {
    if let Some(port) = tty
        .or(cli.port.as_deref())
        .or(config.connection.port.as_deref())
    {
        debug!("Using port {port}");
        return Ok(port.to_string());
    }

    let (vid, pid) = config.usb_identity();
    match device::find_device(device::default_locator().as_ref(), vid, pid) {
        Ok(port) => Ok(port),
        Err(mnemo::Error::DeviceNotFound) => Err(CliError::NoDevice { vid, pid }.into()),
        Err(e) => Err(e.into()),
    }
}

/// Download protocol: `--v2` wins, then the config file, then v1.
fn resolve_protocol(v2: bool, config: &Config) -> Result<ProtocolVersion> {
    if v2 {
        return Ok(ProtocolVersion::V2);
    }
    match config.import.protocol.as_deref() {
        Some(name) => name
            .parse()
            .map_err(|e: mnemo::Error| CliError::Usage(e.to_string()).into()),
        None => Ok(ProtocolVersion::default()),
    }
}

/// Dump format: `--format` wins, then the config file, then `dmp`.
fn resolve_format(format: Option<Format>, config: &Config) -> Result<DumpFormat> {
    if let Some(format) = format {
        return Ok(format.into());
    }
    match config.import.format.as_deref() {
        Some(name) => name
            .parse()
            .map_err(|e: mnemo::Error| CliError::Usage(e.to_string()).into()),
        None => Ok(DumpFormat::default()),
    }
}

fn init_logging(cli: &Cli) {
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Import { format, v2, target } => {
            let (tty, file) = split_target(target);
            let format = resolve_format(*format, &config)?;
            let protocol = resolve_protocol(*v2, &config)?;
            commands::import::cmd_import(cli, &config, tty, &file, format, protocol)
        },
        Commands::Update { baud, target } => {
            let (tty, file) = split_target(target);
            let baud = baud
                .or(config.connection.baud)
                .unwrap_or(DEFAULT_UPDATE_BAUD);
            commands::update::cmd_update(cli, &config, tty, &file, baud)
        },
        Commands::Decode { json, file } => commands::decode::cmd_decode(cli, file, *json),
        Commands::ListPorts { json } => commands::ports::cmd_list_ports(&config, *json),
    }
}

fn main() -> ExitCode {
    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => e.exit(),
    };

    init_logging(&cli);
    debug!(
        "mnemo v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", style("Error:").red().bold());
            ExitCode::from(exit_code(&err))
        },
    }
}
