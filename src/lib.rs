use thiserror::Error;

pub mod cli;
pub mod fs;
pub mod logging;

pub type Result<T> = anyhow::Result<T>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid target directory: {0}")]
    InvalidTargetDir(String),
    #[error("invalid real directory: {0}")]
    InvalidRealPath(String),
    #[error("invalid magnification coefficient: {0} (must be finite and greater than zero)")]
    InvalidCoefficient(String),
    #[error(transparent)]
    Node(#[from] fs::NodeError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("cli error: {0}")]
    Cli(String),
    #[error("target is not mounted: {0}")]
    NotMounted(String),
}

/// Entry point for the library, called by the CLI thin wrapper.
pub fn run<I, S>(args: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let cli_args = cli::parse_args(args.into_iter().map(Into::into))?;

    // Logging depends on the global flags, so it starts right after parsing.
    logging::init_logging(cli_args.logging)?;

    cli::dispatch(cli_args)
}
