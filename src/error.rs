//! Таксономия ошибок dump/import.
//!
//! - Validation: аргументы, неизвестные категории, непустой destination без --force/--merge.
//! - Transport : сеть/HTTP/ошибка, которую вернул удалённый узел.
//! - Decode    : битый конверт JSON-RPC, неожиданный result, битая строка архива.
//! - Storage   : I/O нативного стора и файлового sink'а.
//! - Cancelled : пришёл сигнал завершения.
//!
//! Каждый вариант отображается в код выхода процесса (см. exit_code).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("validation: {0}")]
    Validation(String),

    #[error("transport: {0}")]
    Transport(String),

    #[error("decode: {0}")]
    Decode(String),

    #[error("storage: {context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cancelled by signal")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Error::Storage {
            context: "io".to_string(),
            source,
        }
    }
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Error::Transport(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Error::Decode(msg.into())
    }

    /// Storage-ошибка без исходного io::Error (битый CRC, неверный magic и т.п.).
    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage {
            context: "invalid data".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, msg.into()),
        }
    }

    /// Код выхода процесса для этой ошибки.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Validation(_) => 2,
            Error::Transport(_) => 3,
            Error::Decode(_) => 4,
            Error::Storage { .. } => 5,
            Error::Cancelled => 130,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// Аналог anyhow::Context для io::Result: заворачивает io::Error в Storage с контекстом.
pub trait IoContext<T> {
    fn io_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn io_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|source| Error::Storage {
            context: f().into(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct_and_nonzero() {
        let errs = [
            Error::validation("x"),
            Error::transport("x"),
            Error::decode("x"),
            Error::storage("x"),
            Error::Cancelled,
        ];
        let mut codes: Vec<i32> = errs.iter().map(|e| e.exit_code()).collect();
        assert!(codes.iter().all(|c| *c != 0));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errs.len());
    }

    #[test]
    fn io_context_wraps_as_storage() {
        let r: std::io::Result<()> = Err(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        let e = r.io_context(|| "write block-hash.json.gz").unwrap_err();
        assert_eq!(e.exit_code(), 5);
        assert!(e.to_string().contains("block-hash.json.gz"));
    }

    #[test]
    fn storage_message_is_shown_once() {
        let e = Error::storage("crc mismatch at offset 16");
        let text = e.to_string();
        assert_eq!(text, "storage: invalid data: crc mismatch at offset 16");
        assert_eq!(text.matches("crc mismatch").count(), 1);
    }
}
