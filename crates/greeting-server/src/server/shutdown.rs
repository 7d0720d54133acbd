//! One-shot shutdown coordination.
//!
//! A [`Shutdown`] is armed when created and fires exactly once. Anything can
//! fire it: the OS signal listener, the serving task when it stops on its
//! own, or a test. Every clone observes the same state, and the first
//! [`ShutdownTrigger`] is kept so the runner can tell how the run ended.
//!
//! A second signal while the graceful stop is running forces the shutdown:
//! the runner stops waiting for in-flight calls and returns an error.

use core::fmt;
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;

/// What moved the coordinator from armed to fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownTrigger {
    /// SIGINT / Ctrl+C.
    Interrupt,
    /// SIGTERM.
    Terminate,
    /// The serving task returned an error.
    ServeFailed,
    /// The serving task returned without being asked to stop.
    ServeExited,
    /// Fired programmatically.
    Requested,
}

impl ShutdownTrigger {
    /// Returns `true` for triggers that originate from an OS signal.
    pub const fn is_signal(self) -> bool {
        matches!(self, Self::Interrupt | Self::Terminate)
    }
}

impl fmt::Display for ShutdownTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
            Self::ServeFailed => "serve failure",
            Self::ServeExited => "serve exited",
            Self::Requested => "requested",
        })
    }
}

/// Write-once, multi-reader shutdown signal.
///
/// Cloning is cheap; all clones share one [`CancellationToken`]. Once fired
/// the coordinator can never be re-armed.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
    fired_by: Arc<OnceLock<ShutdownTrigger>>,
    forced: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the coordinator.
    ///
    /// Returns `true` if this call performed the armed → fired transition and
    /// `false` if the coordinator had already fired, in which case nothing
    /// happens. The transition is logged before waiters are released.
    pub fn trigger(&self, trigger: ShutdownTrigger) -> bool {
        if self.fired_by.set(trigger).is_err() {
            tracing::trace!(%trigger, "Shutdown already in progress, ignoring trigger");
            return false;
        }

        if trigger.is_signal() {
            tracing::warn!(signal = %trigger, "Received termination signal");
        } else {
            tracing::warn!(reason = %trigger, "Shutdown triggered");
        }

        self.token.cancel();
        true
    }

    pub fn is_fired(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The trigger that fired the coordinator, if it has fired.
    pub fn fired_by(&self) -> Option<ShutdownTrigger> {
        self.fired_by.get().copied()
    }

    /// Waits until the coordinator fires. Returns immediately if it already has.
    pub async fn fired(&self) {
        self.token.cancelled().await;
    }

    /// A child token that is cancelled when the coordinator fires.
    ///
    /// Cancelling the child does not fire the coordinator.
    pub fn token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Abandons the graceful stop. Fires the coordinator too if it has not
    /// fired yet.
    pub fn force(&self, trigger: ShutdownTrigger) {
        self.trigger(trigger);
        if self.forced.is_cancelled() {
            return;
        }

        tracing::error!(signal = %trigger, "Received second termination signal, forcing shutdown");
        self.forced.cancel();
    }

    pub fn is_forced(&self) -> bool {
        self.forced.is_cancelled()
    }

    /// Waits until the shutdown is forced.
    pub async fn forced(&self) {
        self.forced.cancelled().await;
    }
}
