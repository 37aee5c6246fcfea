use anyhow::Result;
use clap::Parser;
use log::error;

use snapdump::logging::{self, LogOptions};

mod cli;
mod util;
mod cmd_dump;
mod cmd_list;
mod cmd_import;
mod cmd_get;
mod cmd_serve;

fn main() {
    let cli = cli::Cli::parse();

    if let Err(e) = init_logging(&cli) {
        eprintln!("error: {:#}", e);
        std::process::exit(util::exit_code(&e));
    }

    if let Err(e) = run(cli) {
        error!("{:#}", e);
        eprintln!("error: {:#}", e);
        std::process::exit(util::exit_code(&e));
    }
}

fn init_logging(cli: &cli::Cli) -> Result<()> {
    let mut opts = LogOptions::from_env();
    if let Some(l) = &cli.log_level {
        opts.level = logging::parse_level(l)?;
    }
    if let Some(f) = &cli.log_format {
        opts.format = f.parse()?;
    }
    if let Some(p) = &cli.log {
        opts.file = Some(p.clone());
    }
    logging::init(&opts)?;
    Ok(())
}

fn run(cli: cli::Cli) -> Result<()> {
    match cli.cmd {
        cli::Cmd::Dump(args) => cmd_dump::exec(args),

        cli::Cmd::List => cmd_list::exec(),

        cli::Cmd::Import(args) => cmd_import::exec(args),

        cli::Cmd::Get { source, key } => cmd_get::exec(source, key),

        cli::Cmd::Serve { path, addr, max_limit } => cmd_serve::exec(path, addr, max_limit),
    }
}
