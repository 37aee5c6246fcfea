//! KV sink: put в нативный стор destination. close обязателен (finalize).

use log::debug;
use std::path::Path;

use crate::error::Result;
use crate::item::Item;
use crate::metrics::record_store_put;
use crate::store::Store;

pub struct StoreSink {
    store: Store,
    items: u64,
}

impl StoreSink {
    pub fn open(root: &Path, sync_on_close: bool) -> Result<Self> {
        let mut store = Store::open(root)?;
        store.set_sync_on_close(sync_on_close);
        debug!("store sink: {} ({} keys before run)", root.display(), store.len());
        Ok(Self { store, items: 0 })
    }

    pub fn root(&self) -> &Path {
        self.store.root()
    }

    pub fn items(&self) -> u64 {
        self.items
    }

    pub fn put(&mut self, item: &Item) -> Result<()> {
        self.store.put(&item.key, &item.value)?;
        record_store_put();
        self.items += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.store.flush()
    }

    /// flush + fsync; идемпотентно (см. Store::close).
    pub fn close(&mut self) -> Result<()> {
        self.store.close()
    }
}
