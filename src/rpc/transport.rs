//! rpc/transport: единственный JSON-RPC клиент на прогон.
//!
//! Кодирование запроса, отправка, разбор конверта. Разделение ошибок:
//! - Transport: соединение, не-2xx, непустой "error" в ответе;
//! - Decode: тело не JSON-RPC конверт, result не той формы, result=null без error.
//!
//! Таймаутов и повторов нет.

use log::{debug, trace};
use reqwest::blocking::Client;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::metrics::{record_rpc_call, record_rpc_error};

use super::{RpcRequest, RpcResponse};

pub struct RpcTransport {
    endpoint: Url,
    client: Client,
    next_id: AtomicU64,
}

impl RpcTransport {
    pub fn new(endpoint: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| Error::validation(format!("invalid endpoint '{endpoint}': {e}")))?;
        match endpoint.scheme() {
            "http" | "https" => {}
            other => {
                return Err(Error::validation(format!(
                    "unsupported endpoint scheme '{other}': {endpoint}"
                )))
            }
        }
        let client = Client::builder()
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| Error::transport(format!("build http client: {e}")))?;
        Ok(Self {
            endpoint,
            client,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    /// Один вызов: params уже должны быть массивом (JSON-RPC 1.0).
    pub fn call<P, R>(&self, method: &str, params: P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let req = RpcRequest {
            method: method.to_string(),
            params,
            id,
        };
        record_rpc_call();
        trace!("rpc -> {} id={}", method, id);

        let resp = self
            .client
            .post(self.endpoint.clone())
            .json(&req)
            .send()
            .map_err(|e| {
                record_rpc_error();
                Error::transport(format!("{method}: request to {} failed: {e}", self.endpoint))
            })?;

        let status = resp.status();
        if !status.is_success() {
            record_rpc_error();
            return Err(Error::transport(format!(
                "{method}: failed to get response: status={status}"
            )));
        }

        let body = resp.bytes().map_err(|e| {
            record_rpc_error();
            Error::transport(format!("{method}: read response body: {e}"))
        })?;

        decode_response(method, id, &body)
    }
}

/// Разбор конверта ответа.
pub fn decode_response<R: DeserializeOwned>(method: &str, id: u64, body: &[u8]) -> Result<R> {
    let env: RpcResponse<R> = serde_json::from_slice(body)
        .map_err(|e| Error::decode(format!("{method}: malformed response: {e}")))?;

    if let Some(err) = env.error {
        if !err.is_null() {
            record_rpc_error();
            let msg = match err {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            return Err(Error::transport(format!("{method}: remote error: {msg}")));
        }
    }

    if let Some(got) = env.id {
        if got != id {
            return Err(Error::decode(format!(
                "{method}: response id mismatch: sent {id}, got {got}"
            )));
        }
    }

    let result = env
        .result
        .ok_or_else(|| Error::decode(format!("{method}: empty result")))?;
    debug!("rpc <- {} id={} ok", method, id);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::GetIteratorResult;

    #[test]
    fn remote_error_is_transport() {
        let e = decode_response::<bool>("DB.ReleaseSnapshot", 3, br#"{"result":null,"error":"snapshot not found","id":3}"#)
            .unwrap_err();
        assert_eq!(e.exit_code(), 3);
        assert!(e.to_string().contains("snapshot not found"));
    }

    #[test]
    fn malformed_envelope_is_decode() {
        let e = decode_response::<bool>("DB.Echo", 1, b"<html>").unwrap_err();
        assert_eq!(e.exit_code(), 4);
        let e = decode_response::<bool>("DB.Echo", 1, br#"{"result":null,"error":null,"id":1}"#).unwrap_err();
        assert_eq!(e.exit_code(), 4);
        let e = decode_response::<bool>("DB.Echo", 1, br#"{"result":true,"error":null,"id":2}"#).unwrap_err();
        assert_eq!(e.exit_code(), 4);
    }

    #[test]
    fn empty_page_is_well_formed() {
        let r: GetIteratorResult =
            decode_response("DB.GetIterator", 9, br#"{"result":{"items":[],"limit":1000},"error":null,"id":9}"#)
                .unwrap();
        assert!(r.items.is_empty());
        assert_eq!(r.limit, 1000);
    }

    #[test]
    fn envelope_without_error_and_id_fields() {
        // результат без Default: конверт не должен требовать R: Default
        let r: crate::rpc::OpenSnapshotResult =
            decode_response("DB.OpenSnapshot", 4, br#"{"result":{"snapshot":"s-1"}}"#).unwrap();
        assert_eq!(r.snapshot, "s-1");
        let e = decode_response::<String>("DB.Echo", 5, br#"{"id":5}"#).unwrap_err();
        assert_eq!(e.exit_code(), 4);
    }

    #[test]
    fn rejects_non_http_endpoint() {
        assert!(RpcTransport::new("ftp://localhost/").is_err());
        assert!(RpcTransport::new("not a url").is_err());
    }
}
