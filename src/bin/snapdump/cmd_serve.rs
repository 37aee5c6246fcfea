use anyhow::{Context, Result};
use log::info;
use std::path::PathBuf;
use std::time::Duration;

use snapdump::cancel::install_signal_listener;
use snapdump::{DumpConfig, RpcServer, Store};

pub fn exec(path: PathBuf, addr: String, max_limit: usize) -> Result<()> {
    let store = Store::open(&path).with_context(|| format!("open store {}", path.display()))?;
    let keys = store.len();
    let server = RpcServer::start(store, &addr, max_limit)?;
    println!("serving {} ({} keys) at {}", path.display(), keys, server.endpoint());

    let token = install_signal_listener(DumpConfig::from_env().shutdown_grace);
    while !token.is_cancelled() {
        std::thread::sleep(Duration::from_millis(200));
    }

    let st = server.stats();
    info!(
        "shutting down: snapshots opened={} released={} still open={}",
        st.opened(),
        st.released(),
        server.open_snapshots()
    );
    server.shutdown()?;
    Ok(())
}
