//! Lightweight global metrics for snapdump.
//!
//! Потокобезопасные атомарные счётчики:
//! - RPC (вызовы, ошибки транспорта)
//! - Pagination (страницы, элементы)
//! - Sinks (файлы архива, записи в стор)
//! - Import
//! - Snapshots (open/release)

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

// ----- RPC -----
static RPC_CALLS_TOTAL: AtomicU64 = AtomicU64::new(0);
static RPC_ERRORS_TOTAL: AtomicU64 = AtomicU64::new(0);

// ----- Pagination -----
static PAGES_FETCHED: AtomicU64 = AtomicU64::new(0);
static ITEMS_DUMPED: AtomicU64 = AtomicU64::new(0);

// ----- Sinks -----
static ARCHIVE_FILES_OPENED: AtomicU64 = AtomicU64::new(0);
static STORE_PUTS: AtomicU64 = AtomicU64::new(0);

// ----- Import -----
static IMPORT_FILES: AtomicU64 = AtomicU64::new(0);
static ITEMS_IMPORTED: AtomicU64 = AtomicU64::new(0);

// ----- Snapshots -----
static SNAPSHOTS_OPENED: AtomicU64 = AtomicU64::new(0);
static SNAPSHOTS_RELEASED: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub rpc_calls_total: u64,
    pub rpc_errors_total: u64,
    pub pages_fetched: u64,
    pub items_dumped: u64,
    pub archive_files_opened: u64,
    pub store_puts: u64,
    pub import_files: u64,
    pub items_imported: u64,
    pub snapshots_opened: u64,
    pub snapshots_released: u64,
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rpc_calls={} rpc_errors={} pages={} dumped={} files={} puts={} import_files={} imported={} snapshots_opened={} snapshots_released={}",
            self.rpc_calls_total,
            self.rpc_errors_total,
            self.pages_fetched,
            self.items_dumped,
            self.archive_files_opened,
            self.store_puts,
            self.import_files,
            self.items_imported,
            self.snapshots_opened,
            self.snapshots_released,
        )
    }
}

pub fn record_rpc_call() {
    RPC_CALLS_TOTAL.fetch_add(1, Ordering::Relaxed);
}

pub fn record_rpc_error() {
    RPC_ERRORS_TOTAL.fetch_add(1, Ordering::Relaxed);
}

pub fn record_page(items: usize) {
    PAGES_FETCHED.fetch_add(1, Ordering::Relaxed);
    ITEMS_DUMPED.fetch_add(items as u64, Ordering::Relaxed);
}

pub fn record_archive_file_opened() {
    ARCHIVE_FILES_OPENED.fetch_add(1, Ordering::Relaxed);
}

pub fn record_store_put() {
    STORE_PUTS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_import_file() {
    IMPORT_FILES.fetch_add(1, Ordering::Relaxed);
}

pub fn record_item_imported() {
    ITEMS_IMPORTED.fetch_add(1, Ordering::Relaxed);
}

pub fn record_snapshot_opened() {
    SNAPSHOTS_OPENED.fetch_add(1, Ordering::Relaxed);
}

pub fn record_snapshot_released() {
    SNAPSHOTS_RELEASED.fetch_add(1, Ordering::Relaxed);
}

pub fn metrics_snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        rpc_calls_total: RPC_CALLS_TOTAL.load(Ordering::Relaxed),
        rpc_errors_total: RPC_ERRORS_TOTAL.load(Ordering::Relaxed),
        pages_fetched: PAGES_FETCHED.load(Ordering::Relaxed),
        items_dumped: ITEMS_DUMPED.load(Ordering::Relaxed),
        archive_files_opened: ARCHIVE_FILES_OPENED.load(Ordering::Relaxed),
        store_puts: STORE_PUTS.load(Ordering::Relaxed),
        import_files: IMPORT_FILES.load(Ordering::Relaxed),
        items_imported: ITEMS_IMPORTED.load(Ordering::Relaxed),
        snapshots_opened: SNAPSHOTS_OPENED.load(Ordering::Relaxed),
        snapshots_released: SNAPSHOTS_RELEASED.load(Ordering::Relaxed),
    }
}
