//! snapshot: жизненный цикл снапшота источника.
//!
//! open() -> [snapshot()/token()]* -> release()
//!
//! release() идемпотентен: второй вызов ничего не делает. Если менеджер
//! дропнут без release (паника, ранний return), Drop делает попытку
//! освобождения и только логирует неудачу.

use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::metrics::{record_snapshot_opened, record_snapshot_released};
use crate::rpc::{OpenSnapshotResult, ReleaseSnapshotArgs, METHOD_OPEN_SNAPSHOT, METHOD_RELEASE_SNAPSHOT};
use crate::source::Source;
use crate::store::StoreSnapshot;

/// Хэндл снапшота: локальная COW-копия карты или токен удалённого узла.
#[derive(Clone)]
pub enum Snapshot {
    Local(StoreSnapshot),
    Remote(String),
}

impl Snapshot {
    /// Токен для логов; у локального снапшота токена нет.
    pub fn token(&self) -> Option<&str> {
        match self {
            Snapshot::Local(_) => None,
            Snapshot::Remote(t) => Some(t),
        }
    }
}

pub struct SnapshotManager<'s> {
    source: &'s Source,
    snapshot: Option<Snapshot>,
    released: bool,
}

impl<'s> SnapshotManager<'s> {
    pub fn open(source: &'s Source) -> Result<Self> {
        let snapshot = if let Some(store) = source.local_store() {
            Snapshot::Local(store.snapshot())
        } else if let Some(transport) = source.transport() {
            let empty: [(); 0] = [];
            let res: OpenSnapshotResult = transport.call(METHOD_OPEN_SNAPSHOT, empty)?;
            if res.snapshot.is_empty() {
                return Err(Error::decode("DB.OpenSnapshot returned an empty token"));
            }
            Snapshot::Remote(res.snapshot)
        } else {
            return Err(Error::validation("source has no snapshot capability"));
        };

        record_snapshot_opened();
        match snapshot.token() {
            Some(t) => info!("snapshot opened: {}", t),
            None => info!("snapshot opened: local"),
        }
        Ok(Self {
            source,
            snapshot: Some(snapshot),
            released: false,
        })
    }

    /// Текущий снапшот. После release: Validation-ошибка.
    pub fn snapshot(&self) -> Result<&Snapshot> {
        self.snapshot
            .as_ref()
            .ok_or_else(|| Error::validation("snapshot already released"))
    }

    pub fn token(&self) -> Option<&str> {
        self.snapshot.as_ref().and_then(|s| s.token())
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Освободить снапшот. Повторный вызов: no-op.
    ///
    /// Хэндл забирается до сетевого вызова: при ошибке ReleaseSnapshot
    /// повторной попытки (в том числе из Drop) не будет.
    pub fn release(&mut self) -> Result<()> {
        let Some(snapshot) = self.snapshot.take() else {
            return Ok(());
        };
        self.released = true;

        match snapshot {
            Snapshot::Local(_) => {
                debug!("snapshot released: local");
            }
            Snapshot::Remote(token) => {
                let transport = self
                    .source
                    .transport()
                    .ok_or_else(|| Error::validation("remote snapshot without transport"))?;
                let _: serde_json::Value = transport.call(
                    METHOD_RELEASE_SNAPSHOT,
                    [ReleaseSnapshotArgs {
                        snapshot: token.clone(),
                    }],
                )?;
                info!("snapshot released: {}", token);
            }
        }
        record_snapshot_released();
        Ok(())
    }
}

impl Drop for SnapshotManager<'_> {
    fn drop(&mut self) {
        if self.snapshot.is_some() {
            if let Err(e) = self.release() {
                warn!("snapshot release on drop failed: {}", e);
            }
        }
    }
}
