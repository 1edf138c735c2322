//! Cooperative shutdown.
//!
//! A [`Shutdown`] is a cloneable flag backed by a [`CancellationToken`]. Signal
//! handlers set it; long-running loops check it at their iteration boundaries
//! and race it against their sleeps. In-flight work is never cancelled.

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Exit status after a second termination signal (128 + SIGINT).
pub const FORCED_EXIT_CODE: i32 = 130;

#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once [`trigger`](Self::trigger) has been called.
    pub async fn wait(&self) {
        self.token.cancelled().await
    }

    /// Trigger on the first SIGINT or SIGTERM; exit the process with
    /// [`FORCED_EXIT_CODE`] on the second.
    ///
    /// Handlers are registered before this returns, so a signal delivered
    /// right after the call is not lost.
    pub fn install_signal_handlers(&self) -> Result<JoinHandle<()>> {
        self.install_signal_handlers_with(|| std::process::exit(FORCED_EXIT_CODE))
    }

    /// Same as [`install_signal_handlers`](Self::install_signal_handlers)
    /// with a custom action for the second signal.
    pub fn install_signal_handlers_with<F>(&self, on_second: F) -> Result<JoinHandle<()>>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut signals = TerminationSignals::register()?;
        let this = self.clone();
        Ok(tokio::spawn(async move {
            let name = signals.recv_next().await;
            tracing::info!(signal = name, "termination signal received, shutting down");
            this.trigger();

            let name = signals.recv_next().await;
            tracing::warn!(signal = name, "second termination signal, exiting now");
            on_second();
        }))
    }
}

/// Registered SIGINT + SIGTERM streams.
pub struct TerminationSignals {
    #[cfg(unix)]
    sigint: tokio::signal::unix::Signal,
    #[cfg(unix)]
    sigterm: tokio::signal::unix::Signal,
}

impl TerminationSignals {
    pub fn register() -> Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            Ok(Self {
                sigint: signal(SignalKind::interrupt())?,
                sigterm: signal(SignalKind::terminate())?,
            })
        }

        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Wait for the next signal and return its name. The streams stay
    /// registered, so later signals are seen by later calls.
    pub async fn recv_next(&mut self) -> &'static str {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = self.sigint.recv() => "SIGINT",
                _ = self.sigterm.recv() => "SIGTERM",
            }
        }

        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            "ctrl-c"
        }
    }
}
