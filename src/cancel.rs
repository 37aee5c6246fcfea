//! Отмена прогона по сигналу.
//!
//! Слушатель сигналов живёт в отдельном потоке с current-thread tokio runtime.
//! Первый сигнал отменяет токен: главный поток видит отмену между запросами,
//! закрывает sink'и и освобождает снапшот сам. Второй сигнал или истёкший
//! grace-период (запрос к узлу завис) завершают процесс с кодом 130.

use log::{error, info, warn};
use std::future::Future;
use std::thread;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Wait for a `SIGTERM` or `SIGINT` on UNIX systems.
#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!("failed to install SIGTERM handler: {e}");
            let _ = tokio::signal::ctrl_c().await;
            info!("received SIGINT");
            return;
        }
    };

    tokio::select! {
        _ = term.recv() => info!("received SIGTERM"),
        _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
    }
}

/// Wait for a `ctrl+c` on Windows systems.
#[cfg(windows)]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("received SIGINT");
}

/// Чем закончилось наблюдение за сигналами.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Supervision {
    /// Токен отменён без сигнала (прогон завершился сам).
    Finished,
    /// Сигнал отменил токен, а главный поток не успел за grace.
    Forced,
}

/// Ждать сигналы: первый отменяет `token`, второй (или `grace` после первого) даёт Forced.
///
/// `next_signal` вызывается на каждое ожидание; в тестах вместо ОС-сигналов.
pub async fn supervise<S, F>(mut next_signal: S, token: CancellationToken, grace: Duration) -> Supervision
where
    S: FnMut() -> F,
    F: Future<Output = ()>,
{
    tokio::select! {
        _ = next_signal() => {
            warn!(
                "termination requested; finishing current request and releasing snapshot (send again to exit now, forced exit in {:?})",
                grace
            );
            token.cancel();
        }
        _ = token.cancelled() => return Supervision::Finished,
    }

    tokio::select! {
        _ = next_signal() => error!("second termination signal; exiting without cleanup"),
        _ = tokio::time::sleep(grace) => error!("shutdown grace {:?} expired; exiting without cleanup", grace),
    }
    Supervision::Forced
}

/// Запустить слушатель сигналов; возвращает токен, который он отменит.
///
/// Поток detached: при нормальном завершении процесса просто умирает вместе с ним.
/// Forced: std::process::exit(130), снапшот на удалённом узле остаётся открытым.
pub fn install_signal_listener(grace: Duration) -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();

    let spawned = thread::Builder::new()
        .name("snapdump-signals".to_string())
        .spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    warn!("signal listener: runtime build failed: {e}");
                    return;
                }
            };
            if rt.block_on(supervise(wait_for_signal, child, grace)) == Supervision::Forced {
                std::process::exit(130);
            }
        });

    if let Err(e) = spawned {
        warn!("signal listener not installed: {e}");
    }
    token
}
