//! notetaker CLI - Command-line tool for Pegasus Mobile NoteTaker M210 pens.
//!
//! ## Features
//!
//! - Show device versions, mode and stored note size
//! - Download the stored note archive
//! - Erase the device memory
//! - List hidraw interfaces and locate the pen automatically
//! - Shell completion generation
//! - Environment variable and config file support

use {
    anyhow::Result,
    clap::{Parser, Subcommand},
    clap_complete::Shell,
    console::style,
    env_logger::Env,
    log::debug,
    std::{
        env,
        path::PathBuf,
        sync::atomic::{AtomicBool, Ordering},
    },
};

mod commands;
mod config;
mod device;

use config::Config;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Set by the Ctrl-C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Check if progress animations should be used (TTY and colors enabled).
pub(crate) fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Whether Ctrl-C was pressed.
pub(crate) fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}

/// CLI failures that carry their own exit code.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Invalid invocation (exit code 2).
    #[error("{0}")]
    Usage(String),
    /// Unusable configuration (exit code 3).
    #[error("{0}")]
    Config(String),
    /// Cancelled by the user (exit code 130).
    #[error("{0}")]
    Cancelled(String),
}

/// notetaker - Talk to Pegasus Mobile NoteTaker M210 pens.
///
/// Environment variables:
///   NOTETAKER_PRIMARY           - hidraw node of the command interface
///   NOTETAKER_SECONDARY         - hidraw node of the event interface
///   NOTETAKER_TIMEOUT_MS        - Read timeout in milliseconds
///   NOTETAKER_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser)]
#[command(name = "notetaker")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub(crate) struct Cli {
    /// hidraw node of the command interface (auto-detected if not specified).
    #[arg(long, global = true, env = "NOTETAKER_PRIMARY", value_name = "PATH")]
    pub(crate) primary: Option<PathBuf>,

    /// hidraw node of the event interface (auto-detected if not specified).
    #[arg(long, global = true, env = "NOTETAKER_SECONDARY", value_name = "PATH")]
    pub(crate) secondary: Option<PathBuf>,

    /// Read timeout in milliseconds.
    #[arg(long, global = true, env = "NOTETAKER_TIMEOUT_MS", value_name = "MS")]
    pub(crate) timeout_ms: Option<u64>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub(crate) verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    pub(crate) quiet: bool,

    /// Non-interactive mode (fail instead of prompting).
    #[arg(long, global = true, env = "NOTETAKER_NON_INTERACTIVE")]
    pub(crate) non_interactive: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    pub(crate) config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub(crate) command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Show firmware versions, mode and stored note size.
    Info {
        /// Output information as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Download all stored notes to a file.
    Download {
        /// Destination file.
        output: PathBuf,

        /// Overwrite the destination if it exists.
        #[arg(short, long)]
        force: bool,
    },

    /// Erase all notes stored in the device.
    Delete {
        /// Skip the confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// List hidraw interfaces.
    ListDevices {
        /// Output the interface list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions.
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Map an error to the process exit code.
pub(crate) fn exit_code_for(err: &anyhow::Error) -> i32 {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return match cli_err {
            CliError::Usage(_) => 2,
            CliError::Config(_) => 3,
            CliError::Cancelled(_) => 130,
        };
    }

    for cause in err.chain() {
        if let Some(lib_err) = cause.downcast_ref::<notetaker::Error>() {
            match lib_err {
                notetaker::Error::DeviceNotFound | notetaker::Error::IdentityMismatch { .. } => {
                    return 4;
                },
                notetaker::Error::Io(io_err) if io_err.kind() == std::io::ErrorKind::NotFound => {
                    return 4;
                },
                notetaker::Error::Interrupted => return 130,
                _ => {},
            }
        }
    }

    1
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

fn install_interrupt_handler() {
    if let Err(e) = ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::Relaxed)) {
        debug!("Could not install Ctrl-C handler: {e}");
    }
    notetaker::set_interrupt_checker(was_interrupted);
}

fn run(cli: &Cli) -> Result<()> {
    let config = match &cli.config_path {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load(),
    };

    match &cli.command {
        Commands::Info { json } => commands::info::cmd_info(cli, &config, *json),
        Commands::Download { output, force } => {
            commands::download::cmd_download(cli, &config, output, *force)
        },
        Commands::Delete { yes } => commands::delete::cmd_delete(cli, &config, *yes),
        Commands::ListDevices { json } => commands::devices::cmd_list_devices(*json),
        Commands::Completions { shell } => {
            commands::completions::cmd_completions(*shell);
            Ok(())
        },
    }
}

fn main() {
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();
    init_logging(&cli);
    install_interrupt_handler();

    debug!(
        "notetaker v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    if let Err(err) = run(&cli) {
        eprintln!("{} {err:#}", style("Error:").red().bold());
        std::process::exit(exit_code_for(&err));
    }
}
