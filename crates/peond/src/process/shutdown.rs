use std::future::Future;
use std::io;
use std::sync::{Mutex, PoisonError};
use std::thread;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info};

use super::PROCESS_TARGET;

const TERMINATION_SIGNALS: [i32; 4] = [SIGTERM, SIGINT, SIGQUIT, SIGHUP];

/// Abstraction over shutdown notification mechanisms.
pub trait ShutdownSignal: Send + Sync {
    /// Starts listening. Notifications arriving after this call are kept
    /// until [`ShutdownSignal::wait`] observes them.
    fn arm(&self) -> Result<(), ShutdownError>;

    /// Resolves once shutdown should proceed.
    fn wait(&self) -> impl Future<Output = Result<(), ShutdownError>> + Send;
}

/// Errors reported by shutdown signal listeners.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Spawning the signal forwarding thread failed.
    #[error("failed to spawn signal listener thread: {source}")]
    Listener {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// `wait` was called without a preceding `arm`.
    #[error("shutdown listener was not armed")]
    NotArmed,
}

/// Shutdown listener that waits for `SIGTERM`, `SIGINT`, `SIGQUIT` or `SIGHUP`.
///
/// Signals are collected on a dedicated thread and forwarded to the async
/// side through a oneshot channel.
#[derive(Debug, Default)]
pub struct SystemShutdownSignal {
    handle: Mutex<Option<Handle>>,
    receiver: Mutex<Option<oneshot::Receiver<i32>>>,
}

impl SystemShutdownSignal {
    /// Builds an unarmed signal listener.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ShutdownSignal for SystemShutdownSignal {
    fn arm(&self) -> Result<(), ShutdownError> {
        let mut signals = Signals::new(TERMINATION_SIGNALS)
            .map_err(|source| ShutdownError::Install { source })?;
        let handle = signals.handle();
        let (sender, receiver) = oneshot::channel();
        thread::Builder::new()
            .name(String::from("peond-signals"))
            .spawn(move || {
                if let Some(signal) = signals.forever().next() {
                    let _ = sender.send(signal);
                }
            })
            .map_err(|source| {
                handle.close();
                ShutdownError::Listener { source }
            })?;
        *self.handle.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        *self.receiver.lock().unwrap_or_else(PoisonError::into_inner) = Some(receiver);
        debug!(target: PROCESS_TARGET, "termination signal handlers installed");
        Ok(())
    }

    async fn wait(&self) -> Result<(), ShutdownError> {
        let receiver = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(ShutdownError::NotArmed)?;
        match receiver.await {
            Ok(signal) => info!(
                target: PROCESS_TARGET,
                signal,
                "shutdown signal received"
            ),
            Err(_) => info!(target: PROCESS_TARGET, "signal listener closed"),
        }
        Ok(())
    }
}

impl Drop for SystemShutdownSignal {
    fn drop(&mut self) {
        if let Some(handle) = self
            .handle
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waiting_before_arming_is_an_error() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime");
        let signal = SystemShutdownSignal::new();
        let error = runtime
            .block_on(signal.wait())
            .expect_err("listener was never armed");
        assert!(matches!(error, ShutdownError::NotArmed));
    }
}
