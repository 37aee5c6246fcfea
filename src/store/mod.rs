//! Нативный упорядоченный KV-стор.
//!
//! Раскладка директории:
//! - <root>/LOCK    : advisory lock (exclusive для writer, shared для read-only);
//! - <root>/data.log: журнал записей (см. record.rs).
//!
//! При открытии журнал проигрывается в упорядоченную карту (last write wins).
//! Снапшот: копия карты на момент вызова (Arc, copy-on-write при следующей записи).

pub mod record;

use log::{debug, warn};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Seek, SeekFrom, Write};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Error, IoContext, Result};
use crate::item::Item;
use crate::lock::{try_acquire_lock, LockGuard, LockMode};

use self::record::{read_log_header, read_record, write_log_header, write_record, LOG_HDR_SIZE};

pub const DATA_LOG: &str = "data.log";

type Map = BTreeMap<Vec<u8>, Vec<u8>>;

pub struct Store {
    root: PathBuf,
    map: Arc<Map>,
    writer: Option<BufWriter<File>>,
    sync_on_close: bool,
    closed: bool,
    _lock: LockGuard,
}

impl Store {
    /// Открыть (или создать) стор на запись. Эксклюзивный lock.
    ///
    /// Частичный хвост журнала обрезается до последней полной записи.
    /// Битая запись в середине журнала: Storage-ошибка, файл не трогается.
    pub fn open(root: &Path) -> Result<Self> {
        fs::create_dir_all(root).io_context(|| format!("create store dir {}", root.display()))?;
        let lock = try_acquire_lock(root, LockMode::Exclusive)?;

        let path = root.join(DATA_LOG);
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)
            .io_context(|| format!("open {}", path.display()))?;

        let (map, good_len) = replay(&mut file)?;
        let file_len = file
            .metadata()
            .io_context(|| format!("stat {}", path.display()))?
            .len();

        if good_len == 0 {
            // новый файл (или огрызок заголовка): пишем заголовок заново
            file.set_len(0)?;
            file.seek(SeekFrom::Start(0))?;
            write_log_header(&mut file)?;
            file.flush()?;
        } else if good_len < file_len {
            warn!(
                "store {}: truncating partial tail {} -> {} bytes",
                root.display(),
                file_len,
                good_len
            );
            file.set_len(good_len)
                .io_context(|| format!("truncate {}", path.display()))?;
        }
        file.seek(SeekFrom::End(0))?;

        debug!("store opened rw: {} ({} keys)", root.display(), map.len());
        Ok(Self {
            root: root.to_path_buf(),
            map: Arc::new(map),
            writer: Some(BufWriter::new(file)),
            sync_on_close: true,
            closed: false,
            _lock: lock,
        })
    }

    /// Открыть существующий стор только на чтение. Shared lock; журнал не трогаем.
    pub fn open_ro(root: &Path) -> Result<Self> {
        let path = root.join(DATA_LOG);
        if !path.is_file() {
            return Err(Error::validation(format!(
                "not a store directory (no {}): {}",
                DATA_LOG,
                root.display()
            )));
        }
        let lock = try_acquire_lock(root, LockMode::Shared)?;
        let mut file = File::open(&path).io_context(|| format!("open {}", path.display()))?;
        let (map, _) = replay(&mut file)?;

        debug!("store opened ro: {} ({} keys)", root.display(), map.len());
        Ok(Self {
            root: root.to_path_buf(),
            map: Arc::new(map),
            writer: None,
            sync_on_close: false,
            closed: false,
            _lock: lock,
        })
    }

    /// fsync журнала при close (по умолчанию включено).
    pub fn set_sync_on_close(&mut self, on: bool) {
        self.sync_on_close = on;
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_read_only(&self) -> bool {
        self.writer.is_none()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.map.get(key).cloned()
    }

    /// Записать пару; совпадающий ключ перезаписывается.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let w = self
            .writer
            .as_mut()
            .ok_or_else(|| Error::storage(format!("store is read-only: {}", self.root.display())))?;
        write_record(w, key, value)?;
        Arc::make_mut(&mut self.map).insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    /// Точечный снапшот: дальнейшие put не видны через него.
    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            map: Arc::clone(&self.map),
        }
    }

    pub fn flush(&mut self) -> Result<()> {
        if let Some(w) = self.writer.as_mut() {
            w.flush()
                .io_context(|| format!("flush {}", self.root.join(DATA_LOG).display()))?;
        }
        Ok(())
    }

    /// Сбросить буфер и (если включено) fsync. Повторный вызов: no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let Some(mut w) = self.writer.take() {
            let path = self.root.join(DATA_LOG);
            w.flush().io_context(|| format!("flush {}", path.display()))?;
            if self.sync_on_close {
                w.get_ref()
                    .sync_all()
                    .io_context(|| format!("fsync {}", path.display()))?;
            }
        }
        debug!("store closed: {} ({} keys)", self.root.display(), self.map.len());
        Ok(())
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close() {
                warn!("store {}: close on drop failed: {}", self.root.display(), e);
            }
        }
    }
}

/// Проиграть журнал в карту. Возвращает карту и длину валидного префикса файла
/// (0: заголовка нет).
fn replay(file: &mut File) -> Result<(Map, u64)> {
    let file_len = file.metadata()?.len();
    file.seek(SeekFrom::Start(0))?;
    let mut r = BufReader::new(&mut *file);
    let mut map = Map::new();

    if !read_log_header(&mut r)? {
        return Ok((map, 0));
    }

    let mut pos = LOG_HDR_SIZE as u64;
    while let Some(rec) = read_record(&mut r, file_len.saturating_sub(pos))? {
        pos += rec.len_total;
        map.insert(rec.key, rec.value);
    }
    Ok((map, pos))
}

/// Точечный read-only вид стора.
#[derive(Clone)]
pub struct StoreSnapshot {
    map: Arc<Map>,
}

impl StoreSnapshot {
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.map.get(key).cloned()
    }

    /// Страница ключей с префиксом `prefix`, строго после `cursor`, не более `limit`.
    ///
    /// Курсор: исключающая нижняя граница. Курсор меньше префикса равносилен его отсутствию.
    pub fn range_page(&self, prefix: &[u8], cursor: Option<&[u8]>, limit: usize) -> Vec<Item> {
        let start = match cursor {
            Some(c) if c >= prefix => Bound::Excluded(c.to_vec()),
            _ => Bound::Included(prefix.to_vec()),
        };
        self.map
            .range::<Vec<u8>, _>((start, Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .take(limit)
            .map(|(k, v)| Item::new(k.clone(), v.clone()))
            .collect()
    }

    /// Число ключей с префиксом.
    pub fn count_prefix(&self, prefix: &[u8]) -> usize {
        self.map
            .range::<Vec<u8>, _>((Bound::Included(prefix.to_vec()), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .count()
    }
}
