use anyhow::Result;

use snapdump::cancel::install_signal_listener;
use snapdump::catalog;
use snapdump::source::absolutize;
use snapdump::{run_import, DumpConfig, ImportContext};

use super::cli::ImportArgs;
use super::util::existing_dest;

pub fn exec(args: ImportArgs) -> Result<()> {
    let categories = if args.categories.is_empty() {
        None
    } else {
        Some(catalog::resolve_selection(&args.categories)?)
    };

    let env = DumpConfig::from_env();
    let ctx = ImportContext {
        archive_dir: absolutize(&args.archive_dir)?,
        destination: absolutize(&args.destination)?,
        categories,
        existing_dest: existing_dest(args.force, args.merge),
        sync_on_close: env.sync_on_close,
        cancel: install_signal_listener(env.shutdown_grace),
    };
    let report = run_import(&ctx)?;
    ctx.cancel.cancel();

    for f in &report.files {
        println!("< {}: {} items", f.name, f.items);
    }
    println!("done: items={} elapsed={:?}", report.total_items, report.elapsed);
    Ok(())
}
