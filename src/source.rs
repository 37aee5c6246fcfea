//! source: локальный стор или удалённый узел по JSON-RPC.
//!
//! Вариант выбирается один раз при старте (SourceLocation::parse + Source::connect).
//! Постраничный доступ идёт через SourceView (источник + снапшот), который реализует
//! PageSource для пагинатора.

use log::{debug, info};
use rand::Rng;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Error, IoContext, Result};
use crate::paginate::{Page, PageSource};
use crate::rpc::{
    GetArgs, GetIteratorArgs, GetIteratorResult, GetResult, IteratorOptions, RpcTransport,
    METHOD_ECHO, METHOD_GET, METHOD_GET_ITERATOR,
};
use crate::snapshot::Snapshot;
use crate::store::Store;

/// Разобранная строка источника.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    Local(PathBuf),
    Remote(String),
}

impl SourceLocation {
    /// http(s)://: удалённый узел; file:// срезается; относительный путь: от cwd.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::validation("<source> is empty"));
        }
        let lower = s.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Ok(SourceLocation::Remote(s.to_string()));
        }
        let raw = s.strip_prefix("file://").unwrap_or(s);
        Ok(SourceLocation::Local(absolutize(Path::new(raw))?))
    }
}

/// Путь относительно текущей директории.
pub fn absolutize(p: &Path) -> Result<PathBuf> {
    if p.is_absolute() {
        return Ok(p.to_path_buf());
    }
    let cwd = std::env::current_dir().io_context(|| "get current directory")?;
    Ok(cwd.join(p))
}

pub struct LocalSource {
    path: PathBuf,
    store: Store,
}

pub struct RemoteSource {
    transport: RpcTransport,
}

pub enum Source {
    Local(LocalSource),
    Remote(RemoteSource),
}

impl Source {
    /// Открыть и проверить источник.
    ///
    /// - remote: DB.Echo с уникальным payload, ответ должен совпасть;
    /// - local: непустая директория со стором, открывается read-only.
    pub fn connect(location: &SourceLocation) -> Result<Self> {
        match location {
            SourceLocation::Remote(endpoint) => {
                let transport = RpcTransport::new(endpoint)?;
                let src = RemoteSource { transport };
                src.echo()?;
                info!("source is jsonrpc-based: {}", endpoint);
                Ok(Source::Remote(src))
            }
            SourceLocation::Local(path) => {
                check_local_dir(path)?;
                let store = Store::open_ro(path)?;
                info!("source is file-based: {} ({} keys)", path.display(), store.len());
                Ok(Source::Local(LocalSource {
                    path: path.clone(),
                    store,
                }))
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Source::Local(l) => format!("store {}", l.path.display()),
            Source::Remote(r) => format!("jsonrpc {}", r.transport.endpoint()),
        }
    }

    pub fn local_path(&self) -> Option<&Path> {
        match self {
            Source::Local(l) => Some(&l.path),
            Source::Remote(_) => None,
        }
    }

    pub(crate) fn local_store(&self) -> Option<&Store> {
        match self {
            Source::Local(l) => Some(&l.store),
            Source::Remote(_) => None,
        }
    }

    pub(crate) fn transport(&self) -> Option<&RpcTransport> {
        match self {
            Source::Local(_) => None,
            Source::Remote(r) => Some(&r.transport),
        }
    }

    /// Страница по префиксу в рамках снапшота.
    pub fn fetch_page(
        &self,
        snapshot: &Snapshot,
        prefix: &[u8],
        cursor: Option<&[u8]>,
        limit: usize,
    ) -> Result<Page> {
        match (self, snapshot) {
            (Source::Local(_), Snapshot::Local(snap)) => Ok(Page {
                items: snap.range_page(prefix, cursor, limit),
                limit,
            }),
            (Source::Remote(r), Snapshot::Remote(token)) => r.get_iterator(token, prefix, cursor, limit),
            _ => Err(Error::validation("snapshot does not belong to this source")),
        }
    }

    /// Точечное чтение ключа (для get).
    pub fn get(&self, snapshot: &Snapshot, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match (self, snapshot) {
            (Source::Local(_), Snapshot::Local(snap)) => Ok(snap.get(key)),
            (Source::Remote(r), Snapshot::Remote(token)) => {
                let res: GetResult = r.transport.call(
                    METHOD_GET,
                    [GetArgs {
                        snapshot: token.clone(),
                        key: key.to_vec(),
                    }],
                )?;
                Ok(res.value)
            }
            _ => Err(Error::validation("snapshot does not belong to this source")),
        }
    }
}

impl RemoteSource {
    fn echo(&self) -> Result<()> {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let nonce: u32 = rand::thread_rng().gen();
        let payload = format!("{millis}-{nonce:08x}");

        let got: String = self.transport.call(METHOD_ECHO, [payload.as_str()])?;
        if got != payload {
            return Err(Error::decode(format!(
                "echo mismatch: sent '{payload}', got '{got}'"
            )));
        }
        debug!("echo ok: {}", payload);
        Ok(())
    }

    fn get_iterator(
        &self,
        token: &str,
        prefix: &[u8],
        cursor: Option<&[u8]>,
        limit: usize,
    ) -> Result<Page> {
        let prefix = std::str::from_utf8(prefix)
            .map_err(|_| Error::validation("category prefix is not representable as a JSON string"))?;
        let args = GetIteratorArgs {
            snapshot: token.to_string(),
            prefix: prefix.to_string(),
            options: IteratorOptions {
                limit: limit as u64,
                reverse: false,
                cursor: cursor.map(|c| c.to_vec()),
            },
        };
        let res: GetIteratorResult = self.transport.call(METHOD_GET_ITERATOR, [args])?;
        Ok(Page {
            items: res.items,
            limit: res.limit as usize,
        })
    }
}

fn check_local_dir(path: &Path) -> Result<()> {
    let meta = std::fs::metadata(path)
        .map_err(|e| Error::validation(format!("db source {}: {e}", path.display())))?;
    if !meta.is_dir() {
        return Err(Error::validation(format!(
            "db source {} is not a directory",
            path.display()
        )));
    }
    let mut rd = std::fs::read_dir(path).io_context(|| format!("read dir {}", path.display()))?;
    if rd.next().is_none() {
        return Err(Error::validation(format!(
            "db source {} is empty",
            path.display()
        )));
    }
    Ok(())
}

/// Источник + открытый снапшот: то, что видит пагинатор.
pub struct SourceView<'a> {
    source: &'a Source,
    snapshot: &'a Snapshot,
}

impl<'a> SourceView<'a> {
    pub fn new(source: &'a Source, snapshot: &'a Snapshot) -> Self {
        Self { source, snapshot }
    }
}

impl PageSource for SourceView<'_> {
    fn fetch_page(&mut self, prefix: &[u8], cursor: Option<&[u8]>, limit: usize) -> Result<Page> {
        self.source.fetch_page(self.snapshot, prefix, cursor, limit)
    }
}
