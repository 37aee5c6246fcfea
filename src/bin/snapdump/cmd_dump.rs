use anyhow::Result;
use log::info;

use snapdump::cancel::install_signal_listener;
use snapdump::catalog;
use snapdump::source::absolutize;
use snapdump::{run_dump, DumpConfig, OutputFormat, RunContext, SourceLocation};

use super::cli::DumpArgs;
use super::util::existing_dest;

pub fn exec(args: DumpArgs) -> Result<()> {
    if args.list_categories {
        print!("{}", catalog::render_listing());
        return Ok(());
    }

    let source = args
        .source
        .as_deref()
        .ok_or_else(|| snapdump::Error::validation("<source> is missing"))?;
    let location = SourceLocation::parse(source)?;
    let categories = catalog::resolve_selection(&args.categories)?;

    let mut cfg = DumpConfig::from_env()
        .with_output_format(args.format.parse::<OutputFormat>()?)
        .with_existing_dest(existing_dest(args.force, args.merge))
        .with_dry_run(args.dry_run);
    if let Some(l) = args.limit {
        cfg = cfg.with_page_limit(l);
    }

    let destination = match &args.destination {
        Some(d) => Some(absolutize(d)?),
        None if args.dry_run => None,
        None => return Err(snapdump::Error::validation("<destination> is missing").into()),
    };

    let cancel = install_signal_listener(cfg.shutdown_grace);
    let ctx = RunContext {
        config: cfg,
        categories,
        source: location,
        destination,
        cancel,
    };
    let report = run_dump(&ctx)?;
    ctx.cancel.cancel();

    info!("done: {:?}", report.elapsed);
    println!("{}", report);
    Ok(())
}
