use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use mzrds::cli::{self, Cli};

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let Some(command) = args.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    cli::run(command, args.use_profile.as_deref(), &args.connection)?;
    Ok(())
}
