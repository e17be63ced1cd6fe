//! Command-line surface: `mount` and `unmount` subcommands plus the global
//! logging flags.

use clap::{CommandFactory, Parser, Subcommand};

use crate::{
    logging::{LogFormat, LoggingConfig},
    Result,
};

pub mod mount;
pub mod unmount;

#[derive(Debug, Clone)]
pub enum Command {
    Mount(mount::MountArgs),
    Unmount(unmount::UnmountArgs),
    None,
}

#[derive(Debug, Clone)]
pub struct CliArgs {
    pub command: Command,
    pub logging: LoggingConfig,
}

impl Default for CliArgs {
    fn default() -> Self {
        Self {
            command: Command::None,
            logging: LoggingConfig::default(),
        }
    }
}

pub fn dispatch(args: CliArgs) -> Result<()> {
    match args.command {
        Command::Mount(m) => mount::execute(m),
        Command::Unmount(u) => unmount::execute(u),
        Command::None => Ok(()),
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "magnifyfs",
    version,
    about = "Mirror a directory through FUSE with regular-file sizes multiplied by a coefficient"
)]
struct Cli {
    /// Show verbose detailed information (every filesystem call).
    #[arg(long = "debug", global = true, default_value_t = false)]
    debug: bool,

    /// Log output format.
    #[arg(long = "log-format", global = true, value_enum, default_value = "human")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Subcommands>,
}

#[derive(Subcommand, Debug)]
enum Subcommands {
    /// Mount a mirror of a real directory; runs in the foreground until
    /// interrupted or unmounted externally.
    Mount(mount::MountArgs),
    /// Unmount a previously mounted magnifyfs target.
    Unmount(unmount::UnmountArgs),
}

/// Parse CLI arguments into internal representation.
pub fn parse_args<I, S>(args: I) -> Result<CliArgs>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let argv: Vec<String> = args.into_iter().map(Into::into).collect();
    let cli = Cli::parse_from(argv);
    let command = match cli.command {
        Some(Subcommands::Mount(args)) => Command::Mount(args),
        Some(Subcommands::Unmount(args)) => Command::Unmount(args),
        None => Command::None,
    };

    Ok(CliArgs {
        command,
        logging: LoggingConfig {
            format: cli.log_format,
            debug: cli.debug,
        },
    })
}

/// Build the underlying clap `Command` (useful for help/usage contract tests).
pub fn clap_command() -> clap::Command {
    Cli::command()
}
