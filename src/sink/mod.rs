//! sink: куда пишем выгруженные элементы.
//!
//! Вариант выбирается один раз при старте:
//! - Store  : нативный стор destination (put, last write wins);
//! - Files  : <dir>/<category>.json.gz, одна строка JSON на элемент;
//! - Discard: dry run, только считает.
//!
//! Порядок вызовов: consume* -> end_category на каждую категорию, finalize в конце
//! (в том числе после ошибки). Drop: страховка, если finalize не случился.

pub mod files;
pub mod kv;

use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};

use crate::catalog::Category;
use crate::config::{DumpConfig, ExistingDest, OutputFormat};
use crate::error::{Error, IoContext, Result};
use crate::item::Item;
use crate::source::absolutize;

pub use files::FileSink;
pub use kv::StoreSink;

#[derive(Debug, Default)]
pub struct DiscardSink {
    items: u64,
}

pub enum Sink {
    Store(StoreSink),
    Files(FileSink),
    Discard(DiscardSink),
}

impl Sink {
    /// Выбрать и открыть sink по конфигурации. Destination уже подготовлен.
    pub fn open(cfg: &DumpConfig, destination: Option<&Path>) -> Result<Self> {
        if cfg.dry_run {
            return Ok(Sink::Discard(DiscardSink::default()));
        }
        let dest = destination
            .ok_or_else(|| Error::validation("<destination> is required unless --dry-run"))?;
        match cfg.output_format {
            OutputFormat::Store => Ok(Sink::Store(StoreSink::open(dest, cfg.sync_on_close)?)),
            OutputFormat::GzipJson => Ok(Sink::Files(FileSink::new(dest))),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Sink::Store(s) => format!("store {}", s.root().display()),
            Sink::Files(f) => format!("gzip-json {}", f.dir().display()),
            Sink::Discard(_) => "discard (dry run)".to_string(),
        }
    }

    pub fn consume(&mut self, category: &Category, item: &Item) -> Result<()> {
        match self {
            Sink::Store(s) => s.put(item),
            Sink::Files(f) => f.write(category, item),
            Sink::Discard(d) => {
                d.items += 1;
                Ok(())
            }
        }
    }

    pub fn end_category(&mut self, category: &Category) -> Result<()> {
        match self {
            Sink::Store(s) => s.flush(),
            Sink::Files(f) => f.close_category(category),
            Sink::Discard(_) => Ok(()),
        }
    }

    /// Сбросить и закрыть всё. Повторный вызов: no-op.
    pub fn finalize(&mut self) -> Result<()> {
        match self {
            Sink::Store(s) => s.close(),
            Sink::Files(f) => {
                f.close_current()?;
                info!("archives written: {} ({} items)", f.files(), f.items());
                Ok(())
            }
            Sink::Discard(d) => {
                info!("dry run: {} items discarded", d.items);
                Ok(())
            }
        }
    }

    /// Сколько элементов принято за прогон.
    pub fn items(&self) -> u64 {
        match self {
            Sink::Store(s) => s.items(),
            Sink::Files(f) => f.items(),
            Sink::Discard(d) => d.items,
        }
    }
}

/// Подготовить destination перед открытием sink'а.
///
/// - нет директории: создаём;
/// - пустая: используем;
/// - непустая: Refuse: ошибка; Wipe: удалить и создать заново; Merge: оставить как есть.
///
/// `input`: локальный источник dump'а или директория архивов import'а.
/// Destination не может совпадать с ним, лежать внутри него или содержать его.
pub fn prepare_destination(dest: &Path, mode: ExistingDest, input: Option<&Path>) -> Result<()> {
    if let Some(input) = input {
        check_overlap(dest, input)?;
    }

    if !dest.exists() {
        fs::create_dir_all(dest).io_context(|| format!("create destination {}", dest.display()))?;
        info!("destination created: {}", dest.display());
        return Ok(());
    }
    if !dest.is_dir() {
        return Err(Error::validation(format!(
            "destination {} is not a directory",
            dest.display()
        )));
    }

    let non_empty = fs::read_dir(dest)
        .io_context(|| format!("read destination {}", dest.display()))?
        .next()
        .is_some();
    if !non_empty {
        return Ok(());
    }

    match mode {
        ExistingDest::Refuse => Err(Error::validation(format!(
            "destination {} is not empty; use --force to overwrite or --merge to keep existing data",
            dest.display()
        ))),
        ExistingDest::Wipe => {
            warn!("destination {} is not empty; removing (--force)", dest.display());
            fs::remove_dir_all(dest).io_context(|| format!("remove destination {}", dest.display()))?;
            fs::create_dir_all(dest).io_context(|| format!("create destination {}", dest.display()))?;
            Ok(())
        }
        ExistingDest::Merge => {
            info!("destination {} is not empty; keeping existing data (--merge)", dest.display());
            Ok(())
        }
    }
}

/// Validation-ошибка, если destination и входные данные вложены друг в друга.
pub fn check_overlap(dest: &Path, input: &Path) -> Result<()> {
    let d = resolve(dest)?;
    let i = resolve(input)?;
    if d.starts_with(&i) || i.starts_with(&d) {
        return Err(Error::validation(format!(
            "destination {} overlaps input {}",
            dest.display(),
            input.display()
        )));
    }
    Ok(())
}

/// Канонический путь; для несуществующего пути канонизируется ближайший
/// существующий предок, остаток дописывается как есть.
fn resolve(p: &Path) -> Result<PathBuf> {
    let abs = absolutize(p)?;
    let mut existing = abs.as_path();
    let mut rest = Vec::new();
    loop {
        if let Ok(mut out) = fs::canonicalize(existing) {
            out.extend(rest.iter().rev());
            return Ok(out);
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name);
                existing = parent;
            }
            _ => return Ok(abs.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_dir(name: &str) -> std::path::PathBuf {
        let t = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
        std::env::temp_dir().join(format!("snapdump-sink-{name}-{}-{t}", std::process::id()))
    }

    #[test]
    fn non_empty_destination_modes() {
        let dir = unique_dir("modes");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("keep.txt"), b"x").unwrap();

        let e = prepare_destination(&dir, ExistingDest::Refuse, None).unwrap_err();
        assert_eq!(e.exit_code(), 2);

        prepare_destination(&dir, ExistingDest::Merge, None).unwrap();
        assert!(dir.join("keep.txt").exists());

        prepare_destination(&dir, ExistingDest::Wipe, None).unwrap();
        assert!(dir.is_dir());
        assert!(!dir.join("keep.txt").exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn destination_equal_to_source_is_rejected() {
        let dir = unique_dir("same");
        fs::create_dir_all(&dir).unwrap();
        let e = prepare_destination(&dir, ExistingDest::Wipe, Some(&dir)).unwrap_err();
        assert_eq!(e.exit_code(), 2);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn nested_destination_and_input_overlap() {
        let dir = unique_dir("nested");
        let input = dir.join("input");
        fs::create_dir_all(&input).unwrap();
        fs::write(input.join("data.log"), b"x").unwrap();

        // родитель входа, с --force
        let e = prepare_destination(&dir, ExistingDest::Wipe, Some(&input)).unwrap_err();
        assert_eq!(e.exit_code(), 2);
        assert!(input.join("data.log").exists());

        // внутри входа, ещё не существует
        let e = prepare_destination(&input.join("out/deeper"), ExistingDest::Refuse, Some(&input)).unwrap_err();
        assert_eq!(e.exit_code(), 2);
        assert!(!input.join("out").exists());

        // через `..` к тому же входу
        let e = check_overlap(&dir.join("input/../input"), &input).unwrap_err();
        assert_eq!(e.exit_code(), 2);

        // соседняя директория с общим префиксом имени
        check_overlap(&dir.join("input-copy"), &input).unwrap();
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn discard_counts_only() {
        let cfg = DumpConfig::default().with_dry_run(true);
        let mut sink = Sink::open(&cfg, None).unwrap();
        let cat = crate::catalog::by_name("block-hash").unwrap();
        sink.consume(&cat, &Item::new(b"\x00a".to_vec(), b"1".to_vec())).unwrap();
        sink.end_category(&cat).unwrap();
        sink.finalize().unwrap();
        assert_eq!(sink.items(), 1);
    }
}
