// Базовые модули
pub mod error;
pub mod config;
pub mod metrics;
pub mod logging;
pub mod cancel;

// Данные: категории, элементы, нативный стор
pub mod catalog;
pub mod item;
pub mod lock;
pub mod store; // src/store/{mod,record}.rs

// JSON-RPC: клиент и узел
pub mod rpc; // src/rpc/{mod,transport,server}.rs

// Dump/import
pub mod source;
pub mod snapshot;
pub mod paginate;
pub mod sink; // src/sink/{mod,files,kv}.rs
pub mod dump;
pub mod import;

// Удобные реэкспорты
pub use catalog::Category;
pub use config::{DumpConfig, ExistingDest, OutputFormat};
pub use dump::{run_dump, DumpReport, RunContext};
pub use error::{Error, Result};
pub use import::{run_import, ImportContext, ImportReport};
pub use item::Item;
pub use rpc::RpcServer;
pub use source::{Source, SourceLocation};
pub use store::Store;
