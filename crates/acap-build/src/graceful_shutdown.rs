//! Cancellation of a running build

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::signal;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{BuildError, Result};

/// Why the build is being cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Ctrl-C
    UserRequest,
    /// SIGTERM or a programmatic request
    External,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::UserRequest => write!(f, "user request"),
            ShutdownReason::External => write!(f, "external request"),
        }
    }
}

/// Caller-side cancellation signal shared with the orchestrator
pub struct ShutdownManager {
    requested: AtomicBool,
    sender: watch::Sender<bool>,
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { requested: AtomicBool::new(false), sender }
    }

    /// Receiver that flips to `true` once shutdown is requested
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    pub fn request_shutdown(&self, reason: ShutdownReason) {
        if self.requested.swap(true, Ordering::AcqRel) {
            debug!("Shutdown already requested, ignoring {}", reason);
            return;
        }
        info!("Shutdown requested: {}", reason);
        self.sender.send_replace(true);
    }

    /// Fail with [`BuildError::Cancelled`] if shutdown was requested
    pub fn check(&self, stage: &str) -> Result<()> {
        if self.is_shutdown_requested() {
            info!("Cancelled before {}", stage);
            Err(BuildError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Route Ctrl-C (and SIGTERM on unix) to the shutdown manager
pub fn setup_signal_handlers(shutdown_manager: Arc<ShutdownManager>) -> Result<()> {
    debug!("Setting up signal handlers");

    let on_ctrl_c = Arc::clone(&shutdown_manager);
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Received SIGINT (Ctrl-C)");
                on_ctrl_c.request_shutdown(ShutdownReason::UserRequest);
            }
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::spawn(async move {
            if sigterm.recv().await.is_some() {
                info!("Received SIGTERM");
                shutdown_manager.request_shutdown(ShutdownReason::External);
            }
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_request() {
        let manager = ShutdownManager::new();
        assert!(!manager.is_shutdown_requested());
        assert!(manager.check("build").is_ok());

        manager.request_shutdown(ShutdownReason::UserRequest);
        assert!(manager.is_shutdown_requested());
        assert!(manager.check("build").unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_subscribers_see_request() {
        let manager = ShutdownManager::new();
        let mut receiver = manager.subscribe();

        manager.request_shutdown(ShutdownReason::External);
        receiver.changed().await.unwrap();
        assert!(*receiver.borrow());

        // a second request does not resend
        manager.request_shutdown(ShutdownReason::UserRequest);
        assert!(!receiver.has_changed().unwrap());
    }

    #[test]
    fn test_shutdown_reason_display() {
        assert_eq!(ShutdownReason::UserRequest.to_string(), "user request");
        assert_eq!(ShutdownReason::External.to_string(), "external request");
    }

    #[tokio::test]
    async fn test_signal_handlers_install() {
        let manager = Arc::new(ShutdownManager::new());
        setup_signal_handlers(Arc::clone(&manager)).unwrap();
        assert!(!manager.is_shutdown_requested());
    }
}
