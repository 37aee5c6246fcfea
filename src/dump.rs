//! dump: оркестратор прогона.
//!
//! Init (флаги, категории, источник, destination) -> SnapshotOpen ->
//! PerCategory { Paginating <-> Sinking }* -> Finalize -> SnapshotRelease.
//!
//! Любая ошибка внутри категории сразу ведёт в Finalize + SnapshotRelease;
//! повторов нет. Finalize и release выполняются на всех путях, первая ошибка
//! прогона важнее ошибок закрытия.

use log::{error, info, warn};
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::catalog::Category;
use crate::config::DumpConfig;
use crate::error::{Error, Result};
use crate::metrics::metrics_snapshot;
use crate::paginate::{PaginateStats, Paginator};
use crate::sink::{prepare_destination, Sink};
use crate::snapshot::SnapshotManager;
use crate::source::{Source, SourceLocation, SourceView};

/// Всё, что нужно прогону; строится один раз и передаётся по ссылке.
pub struct RunContext {
    pub config: DumpConfig,
    pub categories: Vec<Category>,
    pub source: SourceLocation,
    /// None допустим только для dry run.
    pub destination: Option<PathBuf>,
    pub cancel: CancellationToken,
}

#[derive(Debug, Clone)]
pub struct CategoryReport {
    pub name: &'static str,
    pub items: u64,
    pub fetches: u64,
    pub skipped_boundary: u64,
}

#[derive(Debug, Clone, Default)]
pub struct DumpReport {
    pub categories: Vec<CategoryReport>,
    pub total_items: u64,
    pub elapsed: Duration,
}

impl DumpReport {
    pub fn category(&self, name: &str) -> Option<&CategoryReport> {
        self.categories.iter().find(|c| c.name == name)
    }
}

impl fmt::Display for DumpReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in &self.categories {
            writeln!(f, "{:>36}: items={} fetches={}", c.name, c.items, c.fetches)?;
        }
        write!(f, "total items={} elapsed={:?}", self.total_items, self.elapsed)
    }
}

pub fn run_dump(ctx: &RunContext) -> Result<DumpReport> {
    let started = Instant::now();

    // Init
    ctx.config.validate()?;
    if ctx.categories.is_empty() {
        return Err(Error::validation("no categories selected"));
    }
    info!("parsed flags: {}", ctx.config);
    info!(
        "categories: {}",
        ctx.categories.iter().map(|c| c.name).collect::<Vec<_>>().join(",")
    );

    let source = Source::connect(&ctx.source)?;
    if !ctx.config.dry_run {
        let dest = ctx
            .destination
            .as_deref()
            .ok_or_else(|| Error::validation("<destination> is required unless --dry-run"))?;
        prepare_destination(dest, ctx.config.existing_dest, source.local_path())?;
    }
    let mut sink = Sink::open(&ctx.config, ctx.destination.as_deref())?;
    info!("dump {} -> {}", source.describe(), sink.describe());

    // SnapshotOpen
    let mut snapshot = match SnapshotManager::open(&source) {
        Ok(s) => s,
        Err(e) => {
            if let Err(fe) = sink.finalize() {
                warn!("sink finalize after failed snapshot open: {}", fe);
            }
            return Err(e);
        }
    };

    // PerCategory
    let mut report = DumpReport::default();
    let res = dump_categories(ctx, &source, &snapshot, &mut sink, &mut report);

    // Finalize + SnapshotRelease
    let finalized = sink.finalize();
    let released = snapshot.release();

    res?;
    finalized?;
    released?;

    report.elapsed = started.elapsed();
    info!(
        "dump done: categories={} items={} elapsed={:?}",
        report.categories.len(),
        report.total_items,
        report.elapsed
    );
    info!("metrics: {}", metrics_snapshot());
    Ok(report)
}

fn dump_categories(
    ctx: &RunContext,
    source: &Source,
    snapshot: &SnapshotManager<'_>,
    sink: &mut Sink,
    report: &mut DumpReport,
) -> Result<()> {
    let paginator = Paginator::new(
        ctx.config.page_limit,
        ctx.config.progress_every,
        &ctx.cancel,
    );
    let snap = snapshot.snapshot()?;

    for category in &ctx.categories {
        let t0 = Instant::now();
        info!(
            "> {} (prefix {}, limit {})",
            category.name,
            category.prefix_b64(),
            paginator.limit()
        );

        let mut view = SourceView::new(source, snap);
        let mut stats = PaginateStats::default();
        let res = paginator.run(&mut view, category, &mut stats, |item| {
            sink.consume(category, item)
        });

        if let Err(e) = res {
            error!(
                "category {} failed: prefix={} last_cursor={} items={} snapshot={}: {}",
                category.name,
                category.prefix_b64(),
                stats.last_cursor_b64(),
                stats.items,
                snapshot.token().unwrap_or("local"),
                e
            );
            if let Err(ce) = sink.end_category(category) {
                warn!("closing output of {} after failure: {}", category.name, ce);
            }
            return Err(e);
        }
        sink.end_category(category)?;

        info!(
            "> {}: {} items, {} fetches in {:?}",
            category.name,
            stats.items,
            stats.fetches,
            t0.elapsed()
        );
        report.total_items += stats.items;
        report.categories.push(CategoryReport {
            name: category.name,
            items: stats.items,
            fetches: stats.fetches,
            skipped_boundary: stats.skipped_boundary,
        });
    }
    Ok(())
}
