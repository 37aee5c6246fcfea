//! rpc/server: JSON-RPC узел поверх нативного стора (tiny_http).
//!
//! Реализует ту же сторону контракта, которую потребляет dump:
//! - DB.OpenSnapshot / DB.ReleaseSnapshot: реестр снапшотов (token -> StoreSnapshot);
//! - DB.GetIterator: курсор исключающий, limit зажимается до max_limit, в ответе -
//!   фактически применённый limit; reverse не поддерживается;
//! - DB.Get, DB.Echo.
//!
//! Один поток обработки: запросы выполняются строго последовательно.

use log::{debug, info, warn};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use tiny_http::{Header, Method, Request, Response, Server};

use crate::error::{Error, Result};
use crate::store::{Store, StoreSnapshot};

use super::{
    GetArgs, GetIteratorArgs, GetIteratorResult, GetResult, OpenSnapshotResult,
    ReleaseSnapshotArgs, RpcRequest, METHOD_ECHO, METHOD_GET, METHOD_GET_ITERATOR,
    METHOD_OPEN_SNAPSHOT, METHOD_RELEASE_SNAPSHOT,
};

pub const DEFAULT_MAX_LIMIT: usize = 1000;

/// Счётчики сервера (для наблюдения в тестах и логах).
#[derive(Debug, Default)]
pub struct ServerStats {
    pub snapshots_opened: AtomicU64,
    pub snapshots_released: AtomicU64,
    pub iterator_calls: AtomicU64,
    pub requests: AtomicU64,
}

impl ServerStats {
    pub fn opened(&self) -> u64 {
        self.snapshots_opened.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> u64 {
        self.snapshots_released.load(Ordering::SeqCst)
    }

    pub fn iterator_calls(&self) -> u64 {
        self.iterator_calls.load(Ordering::SeqCst)
    }
}

struct State {
    store: Mutex<Store>,
    snapshots: Mutex<HashMap<String, StoreSnapshot>>,
    max_limit: usize,
    stats: ServerStats,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // poisoned mutex: берём состояние как есть
    m.lock().unwrap_or_else(|p| p.into_inner())
}

pub struct RpcServer {
    server: Arc<Server>,
    addr: SocketAddr,
    state: Arc<State>,
    stopping: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl RpcServer {
    /// Поднять сервер на addr (например "127.0.0.1:0") в фоновом потоке.
    pub fn start(store: Store, addr: &str, max_limit: usize) -> Result<Self> {
        let server = Server::http(addr)
            .map_err(|e| Error::transport(format!("bind http at {addr}: {e}")))?;
        let addr = server
            .server_addr()
            .to_ip()
            .ok_or_else(|| Error::transport(format!("not an ip listen address: {addr}")))?;

        let server = Arc::new(server);
        let state = Arc::new(State {
            store: Mutex::new(store),
            snapshots: Mutex::new(HashMap::new()),
            max_limit: max_limit.max(1),
            stats: ServerStats::default(),
        });
        let stopping = Arc::new(AtomicBool::new(false));

        let thread = {
            let server = Arc::clone(&server);
            let state = Arc::clone(&state);
            let stopping = Arc::clone(&stopping);
            thread::Builder::new()
                .name("snapdump-rpc".to_string())
                .spawn(move || serve_loop(&server, &state, &stopping))
                .map_err(|e| Error::transport(format!("spawn rpc thread: {e}")))?
        };

        info!("jsonrpc server listening on http://{}/jsonrpc", addr);
        Ok(Self {
            server,
            addr,
            state,
            stopping,
            thread: Some(thread),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}/jsonrpc", self.addr)
    }

    pub fn stats(&self) -> &ServerStats {
        &self.state.stats
    }

    /// Сколько снапшотов сейчас открыто.
    pub fn open_snapshots(&self) -> usize {
        lock(&self.state.snapshots).len()
    }

    /// Доступ к стору под блокировкой (например, дописать данные после OpenSnapshot).
    pub fn with_store<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut Store) -> R,
    {
        let mut g = lock(&self.state.store);
        f(&mut *g)
    }

    /// Остановить поток обработки и закрыть стор.
    pub fn shutdown(mut self) -> Result<()> {
        self.stop_thread();
        lock(&self.state.store).close()
    }

    fn stop_thread(&mut self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.server.unblock();
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
    }
}

impl Drop for RpcServer {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.stop_thread();
            if let Err(e) = lock(&self.state.store).close() {
                warn!("rpc server: store close failed: {}", e);
            }
        }
    }
}

fn serve_loop(server: &Server, state: &State, stopping: &AtomicBool) {
    loop {
        let rq = match server.recv() {
            Ok(rq) => rq,
            Err(e) => {
                if stopping.load(Ordering::SeqCst) {
                    break;
                }
                warn!("http recv error: {}", e);
                continue;
            }
        };
        state.stats.requests.fetch_add(1, Ordering::Relaxed);
        handle(rq, state);
    }
    debug!("jsonrpc server loop stopped");
}

fn json_response(status: u16, body: &Value) -> Response<std::io::Cursor<Vec<u8>>> {
    let mut resp = Response::from_string(body.to_string()).with_status_code(status);
    if let Ok(ct) = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        resp.add_header(ct);
    }
    resp
}

fn handle(mut rq: Request, state: &State) {
    if rq.method() != &Method::Post {
        let resp = Response::from_string("method not allowed\n").with_status_code(405);
        let _ = rq.respond(resp);
        return;
    }

    let mut body = Vec::new();
    if let Err(e) = rq.as_reader().read_to_end(&mut body) {
        let _ = rq.respond(json_response(400, &json!({"error": e.to_string()})));
        return;
    }

    let req: RpcRequest<Value> = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            let _ = rq.respond(json_response(400, &json!({"error": format!("bad request: {e}")})));
            return;
        }
    };

    let out = match dispatch(state, &req.method, &req.params) {
        Ok(result) => json!({"result": result, "error": null, "id": req.id}),
        Err(msg) => {
            debug!("rpc {} failed: {}", req.method, msg);
            json!({"result": null, "error": msg, "id": req.id})
        }
    };
    let _ = rq.respond(json_response(200, &out));
}

/// Первый позиционный аргумент из params (массив).
fn first_arg<T: DeserializeOwned>(params: &Value) -> std::result::Result<T, String> {
    let v = match params {
        Value::Array(a) => a.first().cloned().unwrap_or(Value::Null),
        other => other.clone(),
    };
    serde_json::from_value(v).map_err(|e| format!("invalid params: {e}"))
}

fn new_token() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn dispatch(state: &State, method: &str, params: &Value) -> std::result::Result<Value, String> {
    match method {
        METHOD_OPEN_SNAPSHOT => {
            let snap = lock(&state.store).snapshot();
            let token = new_token();
            lock(&state.snapshots).insert(token.clone(), snap);
            state.stats.snapshots_opened.fetch_add(1, Ordering::SeqCst);
            debug!("snapshot opened: {}", token);
            to_value(OpenSnapshotResult { snapshot: token })
        }
        METHOD_RELEASE_SNAPSHOT => {
            let args: ReleaseSnapshotArgs = first_arg(params)?;
            if lock(&state.snapshots).remove(&args.snapshot).is_none() {
                return Err(format!("snapshot not found: {}", args.snapshot));
            }
            state.stats.snapshots_released.fetch_add(1, Ordering::SeqCst);
            debug!("snapshot released: {}", args.snapshot);
            Ok(Value::Bool(true))
        }
        METHOD_GET_ITERATOR => {
            let args: GetIteratorArgs = first_arg(params)?;
            if args.options.reverse {
                return Err("reverse iteration is not supported".to_string());
            }
            let snap = lookup(state, &args.snapshot)?;
            let limit = match args.options.limit as usize {
                0 => state.max_limit,
                n => n.min(state.max_limit),
            };
            let items = snap.range_page(args.prefix.as_bytes(), args.options.cursor.as_deref(), limit);
            state.stats.iterator_calls.fetch_add(1, Ordering::SeqCst);
            to_value(GetIteratorResult {
                items,
                limit: limit as u64,
            })
        }
        METHOD_GET => {
            let args: GetArgs = first_arg(params)?;
            let snap = lookup(state, &args.snapshot)?;
            to_value(GetResult {
                value: snap.get(&args.key),
            })
        }
        METHOD_ECHO => {
            let payload: Value = first_arg(params)?;
            Ok(payload)
        }
        other => Err(format!("unknown method: {other}")),
    }
}

fn lookup(state: &State, token: &str) -> std::result::Result<StoreSnapshot, String> {
    lock(&state.snapshots)
        .get(token)
        .cloned()
        .ok_or_else(|| format!("snapshot not found: {token}"))
}

fn to_value<T: serde::Serialize>(v: T) -> std::result::Result<Value, String> {
    serde_json::to_value(v).map_err(|e| format!("encode result: {e}"))
}
