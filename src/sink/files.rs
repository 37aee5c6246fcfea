//! Файловый sink: <dir>/<category>.json.gz, gzip (fast), строка JSON на элемент.
//!
//! Файл категории открывается на первом элементе и закрывается ровно один раз:
//! в конце категории, при смене категории или в finalize после ошибки.
//! Категория без элементов файла не создаёт.

use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug, warn};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::catalog::Category;
use crate::error::{IoContext, Result};
use crate::item::Item;
use crate::metrics::record_archive_file_opened;

struct OpenArchive {
    category: &'static str,
    path: PathBuf,
    enc: GzEncoder<BufWriter<File>>,
    lines: u64,
}

impl OpenArchive {
    fn finish(self) -> Result<u64> {
        let path = self.path;
        let mut w = self
            .enc
            .finish()
            .io_context(|| format!("finish gzip {}", path.display()))?;
        w.flush().io_context(|| format!("flush {}", path.display()))?;
        debug!("archive closed: {} ({} lines)", path.display(), self.lines);
        Ok(self.lines)
    }
}

pub struct FileSink {
    dir: PathBuf,
    current: Option<OpenArchive>,
    items: u64,
    files: u64,
}

impl FileSink {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            current: None,
            items: 0,
            files: 0,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn items(&self) -> u64 {
        self.items
    }

    /// Сколько файлов архивов было открыто.
    pub fn files(&self) -> u64 {
        self.files
    }

    pub fn write(&mut self, category: &Category, item: &Item) -> Result<()> {
        let switch = matches!(&self.current, Some(a) if a.category != category.name);
        if switch {
            self.close_current()?;
        }
        if self.current.is_none() {
            self.current = Some(self.open_archive(category)?);
        }
        let line = item.to_json_line()?;
        if let Some(a) = self.current.as_mut() {
            a.enc
                .write_all(&line)
                .and_then(|_| a.enc.write_all(b"\n"))
                .io_context(|| format!("write {}", a.path.display()))?;
            a.lines += 1;
        }
        self.items += 1;
        Ok(())
    }

    /// Закрыть файл категории, если он открыт.
    pub fn close_category(&mut self, category: &Category) -> Result<()> {
        match &self.current {
            Some(a) if a.category == category.name => self.close_current(),
            Some(a) => {
                warn!(
                    "end of category {} while archive of {} is open; closing it",
                    category.name, a.category
                );
                self.close_current()
            }
            None => Ok(()),
        }
    }

    pub fn close_current(&mut self) -> Result<()> {
        match self.current.take() {
            Some(a) => a.finish().map(|_| ()),
            None => Ok(()),
        }
    }

    fn open_archive(&mut self, category: &Category) -> Result<OpenArchive> {
        let path = self.dir.join(category.archive_file_name());
        let f = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&path)
            .io_context(|| format!("create archive {}", path.display()))?;
        record_archive_file_opened();
        self.files += 1;
        debug!("archive opened: {}", path.display());
        Ok(OpenArchive {
            category: category.name,
            path,
            enc: GzEncoder::new(BufWriter::new(f), Compression::fast()),
            lines: 0,
        })
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        if let Some(a) = self.current.take() {
            let path = a.path.clone();
            if let Err(e) = a.finish() {
                warn!("archive {} not closed cleanly: {}", path.display(), e);
            }
        }
    }
}
