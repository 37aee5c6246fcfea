//! import: обратный путь: архивы категорий -> нативный стор.
//!
//! Архив: <name>.json.gz (gzip) или <name>.json (plain), по строке JSON на элемент.
//! Прочие записи директории (*.txt, поддиректории) пропускаются.
//! Порядок: сортировка по имени файла. Повторный импорт перезаписывает те же
//! ключи теми же значениями, т.е. результат не меняется.

use flate2::read::GzDecoder;
use log::{debug, info, warn};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::catalog::{self, Category};
use crate::config::ExistingDest;
use crate::error::{Error, IoContext, Result};
use crate::item::Item;
use crate::metrics::{metrics_snapshot, record_import_file, record_item_imported};
use crate::sink::{check_overlap, prepare_destination, StoreSink};

const GZ_SUFFIX: &str = ".json.gz";
const PLAIN_SUFFIX: &str = ".json";

/// Параметры прогона import.
pub struct ImportContext {
    pub archive_dir: PathBuf,
    pub destination: PathBuf,
    /// None: все архивы директории.
    pub categories: Option<Vec<Category>>,
    pub existing_dest: ExistingDest,
    pub sync_on_close: bool,
    pub cancel: CancellationToken,
}

#[derive(Debug, Clone)]
pub struct ImportedFile {
    pub name: String,
    pub items: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    pub files: Vec<ImportedFile>,
    pub total_items: u64,
    pub elapsed: Duration,
}

/// Имя архива без суффикса (имя категории), если файл: архив.
pub fn archive_stem(file_name: &str) -> Option<&str> {
    file_name
        .strip_suffix(GZ_SUFFIX)
        .or_else(|| file_name.strip_suffix(PLAIN_SUFFIX))
        .filter(|s| !s.is_empty())
}

/// Архивы директории по порядку имён, с опциональным фильтром категорий.
pub fn archive_files(dir: &Path, filter: Option<&[Category]>) -> Result<Vec<PathBuf>> {
    let rd = fs::read_dir(dir).map_err(|e| {
        Error::validation(format!("archive directory {}: {e}", dir.display()))
    })?;

    let mut out = Vec::new();
    for entry in rd {
        let entry = entry.io_context(|| format!("read dir {}", dir.display()))?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if !path.is_file() {
            debug!("import: skip non-file {}", path.display());
            continue;
        }
        let Some(stem) = archive_stem(&name) else {
            debug!("import: skip {}", name);
            continue;
        };
        if let Some(cats) = filter {
            if !cats.iter().any(|c| c.name == stem) {
                debug!("import: {} filtered out", name);
                continue;
            }
        }
        out.push(path);
    }
    out.sort();

    if out.is_empty() {
        return Err(Error::validation(format!(
            "no archive files (*.json.gz, *.json) in {}",
            dir.display()
        )));
    }
    Ok(out)
}

/// Проиграть один архив в sink. Возвращает число элементов.
pub fn import_file(path: &Path, sink: &mut StoreSink, cancel: &CancellationToken) -> Result<u64> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let f = File::open(path).io_context(|| format!("open archive {}", path.display()))?;
    let reader: Box<dyn Read> = if name.ends_with(".gz") {
        Box::new(GzDecoder::new(f))
    } else {
        Box::new(f)
    };
    let mut r = BufReader::new(reader);
    let category = archive_stem(&name).and_then(catalog::by_name);
    let mut foreign = 0u64;

    let mut buf = Vec::new();
    let mut line_no = 0u64;
    let mut items = 0u64;
    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        buf.clear();
        let n = r
            .read_until(b'\n', &mut buf)
            .io_context(|| format!("read {} (line {})", name, line_no + 1))?;
        if n == 0 {
            break;
        }
        line_no += 1;

        let line = trim_line(&buf);
        if line.is_empty() {
            continue;
        }
        let item = Item::from_json_line(line)
            .map_err(|e| Error::decode(format!("{name}:{line_no}: {e}")))?;
        if let Some(c) = &category {
            if !c.contains_key(&item.key) {
                foreign += 1;
            }
        }
        sink.put(&item)?;
        record_item_imported();
        items += 1;
    }

    if foreign > 0 {
        warn!("{}: {} keys outside category prefix (imported as is)", name, foreign);
    }
    record_import_file();
    Ok(items)
}

/// Импорт всей директории архивов в destination.
pub fn run_import(ctx: &ImportContext) -> Result<ImportReport> {
    let started = Instant::now();
    check_overlap(&ctx.destination, &ctx.archive_dir)?;
    let files = archive_files(&ctx.archive_dir, ctx.categories.as_deref())?;
    prepare_destination(&ctx.destination, ctx.existing_dest, Some(&ctx.archive_dir))?;
    let mut sink = StoreSink::open(&ctx.destination, ctx.sync_on_close)?;

    let mut report = ImportReport::default();
    let res = import_all(&files, &mut sink, &ctx.cancel, &mut report);
    let closed = sink.close();
    res?;
    closed?;

    report.elapsed = started.elapsed();
    info!(
        "import done: files={} items={} elapsed={:?}",
        report.files.len(),
        report.total_items,
        report.elapsed
    );
    info!("metrics: {}", metrics_snapshot());
    Ok(report)
}

fn import_all(
    files: &[PathBuf],
    sink: &mut StoreSink,
    cancel: &CancellationToken,
    report: &mut ImportReport,
) -> Result<()> {
    for path in files {
        let t0 = Instant::now();
        info!("< {}", path.display());
        let items = import_file(path, sink, cancel)?;
        info!("< {}: {} items in {:?}", path.display(), items, t0.elapsed());
        report.total_items += items;
        report.files.push(ImportedFile {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            items,
        });
    }
    Ok(())
}

fn trim_line(b: &[u8]) -> &[u8] {
    let start = b.iter().position(|c| !c.is_ascii_whitespace()).unwrap_or(b.len());
    let end = b.iter().rposition(|c| !c.is_ascii_whitespace()).map_or(start, |i| i + 1);
    &b[start..end]
}
