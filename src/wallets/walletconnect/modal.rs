//! Pairing Presenter
//!
//! Shows a pairing URI to the user and reports when they dismiss it.

use std::sync::{Mutex, PoisonError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Displays pairing URIs
///
/// The receiver returned by `open` resolves when the user dismisses the
/// prompt. Dropping the sender without sending means the prompt can no
/// longer be dismissed.
pub trait PairingPresenter: Send + Sync {
    fn open(&self, uri: &str) -> oneshot::Receiver<()>;

    /// Hide the prompt, whether or not pairing succeeded
    fn close(&self);

    /// The wallet accepted the pairing
    fn paired(&self) {
        self.close();
    }
}

/// Prints the URI to stdout, Ctrl-C dismisses
#[derive(Default)]
pub struct TerminalPresenter {
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl TerminalPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop the Ctrl-C watcher, true if one was running
    fn stop_watching(&self) -> bool {
        match self.watcher.lock().unwrap_or_else(PoisonError::into_inner).take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }
}

impl PairingPresenter for TerminalPresenter {
    fn open(&self, uri: &str) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();

        println!();
        println!("╔══════════════════════════════════════════════════════════════╗");
        println!("║  Scan or paste this URI in your wallet (Ctrl-C to cancel)    ║");
        println!("╚══════════════════════════════════════════════════════════════╝");
        println!("{}", uri);
        println!();
        info!("Pairing URI shown");

        let handle = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                debug!("Pairing dismissed");
                let _ = tx.send(());
            }
        });
        let previous = self
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
        rx
    }

    fn close(&self) {
        self.stop_watching();
    }

    fn paired(&self) {
        if self.stop_watching() {
            println!("Wallet paired, waiting for session approval...");
        }
    }
}

impl Drop for TerminalPresenter {
    fn drop(&mut self) {
        self.stop_watching();
    }
}
