//! Инициализация логгера (env_logger поверх log).
//!
//! - уровень: --log-level / SNAPDUMP_LOG_LEVEL (crit == error), RUST_LOG имеет приоритет;
//! - формат: terminal (стандартный env_logger) или json (объект на строку);
//! - куда: stderr или файл (--log / SNAPDUMP_LOG), файл открывается на дозапись.

use env_logger::{Builder, Env, Target, WriteStyle};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Error, IoContext, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Terminal,
    Json,
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "terminal" | "text" => Ok(LogFormat::Terminal),
            "json" => Ok(LogFormat::Json),
            other => Err(Error::validation(format!("unknown log format: '{other}'"))),
        }
    }
}

/// Уровень логирования в терминах log::LevelFilter (строкой для env_logger filter).
pub fn parse_level(s: &str) -> Result<log::LevelFilter> {
    match s.trim().to_ascii_lowercase().as_str() {
        "crit" | "error" => Ok(log::LevelFilter::Error),
        "warn" => Ok(log::LevelFilter::Warn),
        "info" => Ok(log::LevelFilter::Info),
        "debug" => Ok(log::LevelFilter::Debug),
        "trace" => Ok(log::LevelFilter::Trace),
        other => Err(Error::validation(format!("unknown log level: '{other}'"))),
    }
}

#[derive(Debug, Clone)]
pub struct LogOptions {
    pub level: log::LevelFilter,
    pub format: LogFormat,
    pub file: Option<PathBuf>,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            level: log::LevelFilter::Info,
            format: LogFormat::Terminal,
            file: None,
        }
    }
}

impl LogOptions {
    /// Значения по умолчанию из SNAPDUMP_LOG / SNAPDUMP_LOG_LEVEL / SNAPDUMP_LOG_FORMAT.
    /// Некорректные значения в env игнорируются (флаги CLI проверяются строго).
    pub fn from_env() -> Self {
        let mut o = Self::default();
        if let Ok(v) = std::env::var("SNAPDUMP_LOG_LEVEL") {
            if let Ok(l) = parse_level(&v) {
                o.level = l;
            }
        }
        if let Ok(v) = std::env::var("SNAPDUMP_LOG_FORMAT") {
            if let Ok(f) = v.parse() {
                o.format = f;
            }
        }
        if let Ok(v) = std::env::var("SNAPDUMP_LOG") {
            if !v.trim().is_empty() {
                o.file = Some(PathBuf::from(v.trim()));
            }
        }
        o
    }
}

/// Собрать builder (вынесено для тестов: init глобальный и одноразовый).
pub fn build(opts: &LogOptions) -> Result<Builder> {
    let level = opts.level.to_string().to_ascii_lowercase();
    let mut b = Builder::from_env(Env::default().default_filter_or(level));
    b.format_timestamp_millis();

    if let Some(path) = &opts.file {
        let f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .io_context(|| format!("open log file {}", path.display()))?;
        b.target(Target::Pipe(Box::new(f)));
        b.write_style(WriteStyle::Never);
    }

    if opts.format == LogFormat::Json {
        b.format(|buf, record| {
            let line = serde_json::json!({
                "ts": buf.timestamp_millis().to_string(),
                "level": record.level().to_string(),
                "target": record.target(),
                "msg": record.args().to_string(),
            });
            writeln!(buf, "{}", line)
        });
    }
    Ok(b)
}

/// Инициализировать глобальный логгер. Повторная инициализация: no-op.
pub fn init(opts: &LogOptions) -> Result<()> {
    let mut b = build(opts)?;
    let _ = b.try_init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crit_maps_to_error() {
        assert_eq!(parse_level("crit").unwrap(), log::LevelFilter::Error);
        assert_eq!(parse_level("DEBUG").unwrap(), log::LevelFilter::Debug);
        assert!(parse_level("loud").is_err());
    }

    #[test]
    fn log_format_parse() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("terminal".parse::<LogFormat>().unwrap(), LogFormat::Terminal);
        assert!("yaml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn file_target_is_created() {
        let path = std::env::temp_dir().join(format!("snapdump-log-{}.log", std::process::id()));
        let opts = LogOptions {
            file: Some(path.clone()),
            format: LogFormat::Json,
            ..LogOptions::default()
        };
        assert!(build(&opts).is_ok());
        assert!(path.exists());
        let _ = std::fs::remove_file(&path);
    }
}
