//! Centralized configuration for a dump/import run.
//!
//! - DumpConfig::from_env() читает SNAPDUMP_* переменные;
//! - CLI-флаги накладываются поверх через with_* setters;
//! - Display: для debug-лога "parsed flags".
//!
//! Env:
//! - SNAPDUMP_PAGE_LIMIT      (default 1000)
//! - SNAPDUMP_PROGRESS_EVERY  (default 100000)
//! - SNAPDUMP_SYNC            (default true; "0|false|off|no" => false)
//! - SNAPDUMP_SHUTDOWN_GRACE_SECS (default 30; после сигнала, до принудительного выхода)

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::Error;

pub const DEFAULT_PAGE_LIMIT: usize = 1000;
pub const DEFAULT_PROGRESS_EVERY: u64 = 100_000;
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Формат выхода dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Нативный стор (legacy имя: leveldb).
    Store,
    /// Директория <category>.json.gz (legacy имя: json).
    GzipJson,
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "store" | "native-store" | "leveldb" => Ok(OutputFormat::Store),
            "json" | "gzip-json" => Ok(OutputFormat::GzipJson),
            other => Err(Error::validation(format!(
                "unknown output format found: '{other}' (expected store|json)"
            ))),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Store => f.write_str("store"),
            OutputFormat::GzipJson => f.write_str("json"),
        }
    }
}

/// Что делать с непустым destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingDest {
    /// Ошибка валидации.
    Refuse,
    /// Удалить всё и начать с нуля (--force).
    Wipe,
    /// Оставить существующие данные (--merge).
    Merge,
}

#[derive(Clone, Debug)]
pub struct DumpConfig {
    /// Размер страницы GetIterator / локального range-скана.
    pub page_limit: usize,
    /// Как часто (в элементах) логировать прогресс категории.
    pub progress_every: u64,
    pub output_format: OutputFormat,
    pub existing_dest: ExistingDest,
    /// Ничего не писать (Discard sink).
    pub dry_run: bool,
    /// fsync нативного стора при закрытии.
    pub sync_on_close: bool,
    /// Сколько ждать корректного завершения после первого сигнала.
    pub shutdown_grace: Duration,
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            page_limit: DEFAULT_PAGE_LIMIT,
            progress_every: DEFAULT_PROGRESS_EVERY,
            output_format: OutputFormat::Store,
            existing_dest: ExistingDest::Refuse,
            dry_run: false,
            sync_on_close: true,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

fn env_flag(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

impl DumpConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("SNAPDUMP_PAGE_LIMIT") {
            if let Ok(n) = v.trim().parse::<usize>() {
                if n > 0 {
                    cfg.page_limit = n;
                }
            }
        }

        if let Ok(v) = std::env::var("SNAPDUMP_PROGRESS_EVERY") {
            if let Ok(n) = v.trim().parse::<u64>() {
                cfg.progress_every = n;
            }
        }

        if let Ok(v) = std::env::var("SNAPDUMP_SYNC") {
            if let Some(on) = env_flag(&v) {
                cfg.sync_on_close = on;
            }
        }

        if let Ok(v) = std::env::var("SNAPDUMP_SHUTDOWN_GRACE_SECS") {
            if let Ok(n) = v.trim().parse::<u64>() {
                cfg.shutdown_grace = Duration::from_secs(n);
            }
        }

        cfg
    }

    pub fn with_page_limit(mut self, limit: usize) -> Self {
        self.page_limit = limit;
        self
    }

    pub fn with_progress_every(mut self, n: u64) -> Self {
        self.progress_every = n;
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    pub fn with_existing_dest(mut self, mode: ExistingDest) -> Self {
        self.existing_dest = mode;
        self
    }

    pub fn with_dry_run(mut self, on: bool) -> Self {
        self.dry_run = on;
        self
    }

    pub fn with_sync_on_close(mut self, on: bool) -> Self {
        self.sync_on_close = on;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Проверка согласованности после наложения флагов.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.page_limit == 0 {
            return Err(Error::validation("page limit must be > 0"));
        }
        Ok(())
    }
}

impl fmt::Display for DumpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DumpConfig {{ page_limit: {}, progress_every: {}, output_format: {}, existing_dest: {:?}, dry_run: {}, sync_on_close: {}, shutdown_grace: {:?} }}",
            self.page_limit,
            self.progress_every,
            self.output_format,
            self.existing_dest,
            self.dry_run,
            self.sync_on_close,
            self.shutdown_grace,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_format_accepts_legacy_names() {
        assert_eq!("leveldb".parse::<OutputFormat>().unwrap(), OutputFormat::Store);
        assert_eq!("store".parse::<OutputFormat>().unwrap(), OutputFormat::Store);
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::GzipJson);
        assert_eq!("gzip-json".parse::<OutputFormat>().unwrap(), OutputFormat::GzipJson);
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn builder_overrides_defaults() {
        let cfg = DumpConfig::default()
            .with_page_limit(7)
            .with_dry_run(true)
            .with_existing_dest(ExistingDest::Merge);
        assert_eq!(cfg.page_limit, 7);
        assert!(cfg.dry_run);
        assert_eq!(cfg.existing_dest, ExistingDest::Merge);
        assert_eq!(cfg.shutdown_grace, DEFAULT_SHUTDOWN_GRACE);
        let cfg = cfg.with_shutdown_grace(Duration::from_secs(5));
        assert_eq!(cfg.shutdown_grace, Duration::from_secs(5));
        assert!(cfg.validate().is_ok());
        assert!(cfg.with_page_limit(0).validate().is_err());
    }

    #[test]
    fn env_flag_parsing() {
        assert_eq!(env_flag(" On "), Some(true));
        assert_eq!(env_flag("no"), Some(false));
        assert_eq!(env_flag("maybe"), None);
    }
}
