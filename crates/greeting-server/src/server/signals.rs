//! OS signal observation.
//!
//! SIGINT (Ctrl+C) and, on Unix, SIGTERM fire the shared [`Shutdown`]
//! coordinator. Nothing else in the crate touches signals, so tests drive
//! shutdown by calling [`Shutdown::trigger`] directly.

use super::shutdown::{Shutdown, ShutdownTrigger};
use tokio::task::JoinHandle;

/// Spawns the task that turns SIGINT and SIGTERM into shutdown triggers.
///
/// The first signal fires `shutdown`. A signal that arrives once `shutdown`
/// has fired, for any reason, forces it with [`Shutdown::force`]. On Unix the
/// handlers are installed before this returns, so a signal sent afterwards is
/// never missed. The task runs until it forces a shutdown or is aborted.
pub fn spawn_signal_listener(shutdown: Shutdown) -> JoinHandle<()> {
    let mut signals = Signals::install();

    tokio::spawn(async move {
        loop {
            let trigger = signals.recv().await;
            if !shutdown.trigger(trigger) {
                shutdown.force(trigger);
                return;
            }
        }
    })
}

#[cfg(unix)]
struct Signals {
    interrupt: Option<tokio::signal::unix::Signal>,
    terminate: Option<tokio::signal::unix::Signal>,
}

#[cfg(unix)]
impl Signals {
    fn install() -> Self {
        use tokio::signal::unix::{SignalKind, signal};

        let install = |kind: SignalKind, name: &str| match signal(kind) {
            Ok(stream) => Some(stream),
            Err(e) => {
                tracing::error!(error = %e, "Failed to install {name} handler");
                None
            }
        };

        Self {
            interrupt: install(SignalKind::interrupt(), "SIGINT"),
            terminate: install(SignalKind::terminate(), "SIGTERM"),
        }
    }

    async fn recv(&mut self) -> ShutdownTrigger {
        tokio::select! {
            () = delivered(self.interrupt.as_mut().map(|s| s.recv())) => ShutdownTrigger::Interrupt,
            () = delivered(self.terminate.as_mut().map(|s| s.recv())) => ShutdownTrigger::Terminate,
        }
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    const fn install() -> Self {
        Self
    }

    async fn recv(&mut self) -> ShutdownTrigger {
        delivered(Some(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => Some(()),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install Ctrl+C handler");
                    None
                }
            }
        }))
        .await;
        ShutdownTrigger::Interrupt
    }
}

/// Resolves once `received` yields a delivery. A source that is missing or
/// closed never resolves, leaving the other sources in charge.
async fn delivered(received: Option<impl Future<Output = Option<()>>>) {
    if let Some(received) = received {
        if received.await.is_some() {
            return;
        }
        tracing::warn!("Signal stream closed, ignoring it from now on");
    }
    std::future::pending().await
}
