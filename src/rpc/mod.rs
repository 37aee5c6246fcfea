//! JSON-RPC контракт узла (стиль JSON-RPC 1.0).
//!
//! Запрос:  {"method": "DB.GetIterator", "params": [args], "id": 1}
//! Ответ:   {"result": ..., "error": null | "msg", "id": 1}
//!
//! Методы: DB.OpenSnapshot, DB.ReleaseSnapshot, DB.GetIterator, DB.Get, DB.Echo.

pub mod server;
pub mod transport;

use serde::{Deserialize, Serialize};

use crate::item::Item;

pub use server::{RpcServer, ServerStats};
pub use transport::RpcTransport;

pub const METHOD_OPEN_SNAPSHOT: &str = "DB.OpenSnapshot";
pub const METHOD_RELEASE_SNAPSHOT: &str = "DB.ReleaseSnapshot";
pub const METHOD_GET_ITERATOR: &str = "DB.GetIterator";
pub const METHOD_GET: &str = "DB.Get";
pub const METHOD_ECHO: &str = "DB.Echo";

#[derive(Debug, Serialize, Deserialize)]
pub struct RpcRequest<P> {
    pub method: String,
    pub params: P,
    pub id: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RpcResponse<R> {
    // Option без serde(default): иначе derive требует R: Default
    pub result: Option<R>,
    pub error: Option<serde_json::Value>,
    pub id: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenSnapshotResult {
    pub snapshot: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseSnapshotArgs {
    pub snapshot: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IteratorOptions {
    pub limit: u64,
    #[serde(default)]
    pub reverse: bool,
    #[serde(default, with = "crate::item::opt_b64")]
    pub cursor: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetIteratorArgs {
    pub snapshot: String,
    /// Префикс строкой; все префиксы каталога: ASCII.
    pub prefix: String,
    pub options: IteratorOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetIteratorResult {
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub limit: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetArgs {
    pub snapshot: String,
    #[serde(with = "crate::item::b64")]
    pub key: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetResult {
    #[serde(default, with = "crate::item::opt_b64")]
    pub value: Option<Vec<u8>>,
}
