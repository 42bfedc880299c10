use crate::runner::Action;
use clap::error::ErrorKind;
use clap::{ArgAction, Parser};
use std::ffi::OsString;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "expat",
    version,
    about = "Upgrade and rollback migrations for a Hopsworks installation"
)]
pub struct Cli {
    /// Action to take
    #[arg(short = 'a', long, value_enum, default_value = "migrate")]
    pub action: Action,

    /// Version to migrate to or to roll back, e.g. 1.4.0-SNAPSHOT
    #[arg(short = 'v', long = "target-version")]
    pub target_version: String,

    /// Configuration file (default: $EXPAT_CONFIG, ./expat-site.toml, ~/.config/expat/expat-site.toml)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Log every write instead of performing it
    #[arg(long, action = ArgAction::SetTrue)]
    pub dry_run: bool,

    /// Log filter (error,warn,info,debug,trace). Falls back to RUST_LOG
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Cli {
    /// Parses arguments. Usage errors print the usage and exit with status 1;
    /// `--help` and `--version` exit normally.
    pub fn parse_or_exit() -> Self {
        match Self::parse_from_args(std::env::args_os()) {
            Ok(cli) => cli,
            Err(e) => match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => e.exit(),
                _ => {
                    let _ = e.print();
                    std::process::exit(1);
                }
            },
        }
    }

    pub fn parse_from_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Self::try_parse_from(args)
    }
}
