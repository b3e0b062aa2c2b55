//! Connection Lifecycle
//!
//! State shared by every adapter: readiness, the connecting guard, the
//! connected address and the event surface. Adapters hold an
//! [`AdapterCore`] and drive it from their transport specific code.
//!
//! ```text
//!   Idle ──connect()──▶ Connecting ──account──▶ Connected
//!    ▲                      │                       │
//!    └────── failure ───────┘                       │
//!    └──────────── disconnect() / wallet event ─────┘
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use super::error::WalletError;
use super::events::{AdapterEvent, EventEmitter};
use super::readiness::{EnvironmentProbe, PollConfig, ReadinessPoller};
use crate::wallets::WalletName;

/// Observable adapter state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdapterSession {
    pub address: Option<String>,
    pub ready: bool,
    pub connecting: bool,
}

/// Coarse connection phase derived from an [`AdapterSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Idle,
    Connecting,
    Connected,
}

impl AdapterSession {
    pub fn connected(&self) -> bool {
        self.address.is_some()
    }

    pub fn phase(&self) -> ConnectionPhase {
        if self.connected() {
            ConnectionPhase::Connected
        } else if self.connecting {
            ConnectionPhase::Connecting
        } else {
            ConnectionPhase::Idle
        }
    }
}

/// Lifecycle state machine shared by every adapter
pub struct AdapterCore {
    name: WalletName,
    session: Mutex<AdapterSession>,
    events: EventEmitter,
    probe: Arc<dyn EnvironmentProbe>,
    poll: PollConfig,
    poller: ReadinessPoller,
}

impl AdapterCore {
    /// Create the core and start watching for the wallet if it is absent
    pub fn new(name: WalletName, probe: Arc<dyn EnvironmentProbe>, poll: PollConfig) -> Arc<Self> {
        let ready = probe.is_present();
        let core = Arc::new(Self {
            name,
            session: Mutex::new(AdapterSession {
                address: None,
                ready,
                connecting: false,
            }),
            events: EventEmitter::new(),
            probe,
            poll,
            poller: ReadinessPoller::new(),
        });
        if !ready {
            core.watch_readiness();
        }
        core
    }

    fn state(&self) -> MutexGuard<'_, AdapterSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the readiness poller, a no-op while one is running
    pub fn watch_readiness(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let started = self.poller.start(self.probe.clone(), self.poll, move || {
            if let Some(core) = weak.upgrade() {
                core.mark_ready();
            }
        });
        if started {
            debug!("Polling for {} every {}ms", self.name, self.poll.interval_ms);
        }
    }

    pub fn name(&self) -> WalletName {
        self.name
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn snapshot(&self) -> AdapterSession {
        self.state().clone()
    }

    pub fn address(&self) -> Option<String> {
        self.state().address.clone()
    }

    pub fn ready(&self) -> bool {
        self.state().ready
    }

    pub fn connecting(&self) -> bool {
        self.state().connecting
    }

    pub fn connected(&self) -> bool {
        self.state().connected()
    }

    /// Flag the wallet as detected, emitting `Ready` on the first call only
    pub fn mark_ready(&self) {
        let changed = {
            let mut state = self.state();
            !std::mem::replace(&mut state.ready, true)
        };
        if changed {
            info!("{} is ready", self.name);
            self.events.emit(AdapterEvent::Ready);
        }
    }

    /// Probe the environment again, returns the resulting readiness
    pub fn refresh_ready(&self) -> bool {
        if self.probe.is_present() {
            self.mark_ready();
            true
        } else {
            self.ready()
        }
    }

    // =========================================================================
    // Connect
    // =========================================================================

    /// Enter `Connecting`
    ///
    /// Returns `None` when already connected or connecting, in which case
    /// `connect()` must return without side effects. The flag is cleared when
    /// the guard drops.
    pub fn begin_connect(&self) -> Option<ConnectGuard<'_>> {
        let mut state = self.state();
        if state.connected() || state.connecting {
            return None;
        }
        state.connecting = true;
        Some(ConnectGuard { core: self })
    }

    /// Fail with `NotReady` unless the wallet transport is present
    pub fn require_ready(&self) -> Result<(), WalletError> {
        if self.refresh_ready() {
            Ok(())
        } else {
            Err(WalletError::not_ready())
        }
    }

    /// Record the connected account and emit `Connect`
    pub fn complete_connect(&self, address: String) {
        info!("{} connected: {}", self.name, address);
        self.state().address = Some(address);
        self.events.emit(AdapterEvent::Connect);
    }

    // =========================================================================
    // Guards and reporting
    // =========================================================================

    /// Current address, or `NotConnected` without touching any transport
    pub fn require_connected(&self) -> Result<String, WalletError> {
        self.address().ok_or_else(WalletError::not_connected)
    }

    pub fn emit_error(&self, error: WalletError) {
        warn!("{} error: {}", self.name, error);
        self.events.emit(AdapterEvent::Error(error));
    }

    /// Emit the error of a failed result, passing the result through
    pub fn report<T>(&self, result: Result<T, WalletError>) -> Result<T, WalletError> {
        if let Err(e) = &result {
            self.emit_error(e.clone());
        }
        result
    }

    // =========================================================================
    // Disconnect
    // =========================================================================

    /// Clear the address, returns whether one was set
    pub fn clear(&self) -> bool {
        self.state().address.take().is_some()
    }

    /// Finish a caller initiated disconnect
    pub fn complete_disconnect(&self) {
        self.clear();
        info!("{} disconnected", self.name);
        self.events.emit(AdapterEvent::Disconnect);
    }

    /// Finish a wallet initiated disconnect
    ///
    /// Emits `Error(Disconnected)` and then `Disconnect`.
    pub fn transport_disconnected(&self) {
        self.clear();
        warn!("{} was disconnected by the wallet", self.name);
        self.events.emit(AdapterEvent::Error(WalletError::disconnected()));
        self.events.emit(AdapterEvent::Disconnect);
    }
}

/// Clears the connecting flag on drop
pub struct ConnectGuard<'a> {
    core: &'a AdapterCore,
}

impl Drop for ConnectGuard<'_> {
    fn drop(&mut self) {
        self.core.state().connecting = false;
    }
}
