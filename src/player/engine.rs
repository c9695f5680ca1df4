use super::errors::{EngineError, EngineResult};
use super::ffi::{NativeApi, RawHandle};
use super::poller::{self, Poller};
use super::property::{ObservedProperty, to_cstring};
use super::status::{PlaybackStatus, StatusTracker};
use crate::constants::{DEFAULT_EVENT_CAPACITY, DEFAULT_LOG_LEVEL, DEFAULT_POLL_TIMEOUT};
use crate::events::{EventBus, EventBusStats, EventKind, EventSubscriber};
use std::collections::HashMap;
use std::ffi::c_int;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::sync::mpsc::RecvTimeoutError;
use std::thread;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

/// Knobs for one engine instance
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Upper bound for one blocking wait of the event poller. Disposal waits
    /// at most twice this long for the poller to exit.
    pub poll_timeout: Duration,
    /// Minimum level of engine log lines delivered as events
    pub log_level: String,
    /// Buffer size of the event broadcast channel
    pub event_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// State shared between the owning `Engine` and the event poller thread.
pub(crate) struct EngineCore {
    pub(super) api: Arc<dyn NativeApi>,
    /// `None` once disposal has taken the handle. Ordinary calls hold a read
    /// guard for their duration, destroy needs the write guard.
    pub(super) handle: RwLock<Option<RawHandle>>,
    pub(super) disposed: AtomicBool,
    initialized: Mutex<bool>,
    pub(super) observed: Mutex<HashMap<u64, ObservedProperty>>,
    pub(super) bus: EventBus,
    pub(super) status: StatusTracker,
    pub(super) settings: EngineSettings,
}

impl EngineCore {
    pub(super) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Run `f` against the live handle, or fail with `Disposed`.
    pub(super) fn with_handle<T>(
        &self,
        f: impl FnOnce(&dyn NativeApi, RawHandle) -> EngineResult<T>,
    ) -> EngineResult<T> {
        if self.is_disposed() {
            return Err(EngineError::Disposed);
        }
        let guard = self.handle.read().unwrap_or_else(PoisonError::into_inner);
        match *guard {
            Some(handle) if !self.is_disposed() => f(self.api.as_ref(), handle),
            _ => Err(EngineError::Disposed),
        }
    }

    pub(super) fn message(&self, code: c_int) -> String {
        self.api.error_string(code)
    }

    fn wake_poller(&self) {
        let guard = self.handle.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = *guard {
            // SAFETY: the handle cannot be destroyed while the read guard is held.
            unsafe { self.api.wakeup(handle) };
        }
    }

    /// Clear the slot, then destroy what was in it. Runs at most once per
    /// handle no matter how many callers race here.
    fn release_handle(&self) {
        let taken = self
            .handle
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = taken {
            trace!("Destroying native handle {:#x}", handle.addr());
            // SAFETY: the handle was taken out of the slot under the write
            // guard, so no other call can be using it or reach it again.
            unsafe { self.api.destroy(handle) };
        }
    }
}

impl Drop for EngineCore {
    fn drop(&mut self) {
        self.disposed.store(true, Ordering::Release);
        self.release_handle();
    }
}

/// Owner of exactly one native engine instance.
///
/// The event poller starts as soon as the instance exists and stops when
/// the engine is disposed, either explicitly or on drop. All methods are
/// callable from any thread.
pub struct Engine {
    pub(super) core: Arc<EngineCore>,
    poller: Mutex<Option<Poller>>,
}

impl Engine {
    /// Create an engine instance on top of the system libmpv
    #[cfg(feature = "mpv")]
    pub fn new(settings: EngineSettings) -> EngineResult<Self> {
        Self::create(Arc::new(super::libmpv::LibMpv::new()), settings)
    }

    /// Create an engine instance through `api` and start its event poller.
    pub fn create(api: Arc<dyn NativeApi>, settings: EngineSettings) -> EngineResult<Self> {
        debug!(
            "Creating engine instance (client API {:#x})",
            api.client_api_version()
        );

        let handle = api.create().ok_or_else(|| {
            EngineError::Creation("native factory returned a null handle".to_string())
        })?;

        let core = Arc::new(EngineCore {
            bus: EventBus::new(settings.event_capacity),
            api,
            handle: RwLock::new(Some(handle)),
            disposed: AtomicBool::new(false),
            initialized: Mutex::new(false),
            observed: Mutex::new(HashMap::new()),
            status: StatusTracker::new(),
            settings,
        });

        let poller = match poller::spawn(&core) {
            Ok(poller) => poller,
            Err(e) => {
                core.disposed.store(true, Ordering::Release);
                core.release_handle();
                return Err(EngineError::Creation(format!(
                    "failed to start event poller: {}",
                    e
                )));
            }
        };

        info!("Engine instance created");
        Ok(Self {
            core,
            poller: Mutex::new(Some(poller)),
        })
    }

    /// Request log delivery and initialize the engine. Options set before
    /// this call are applied as startup configuration. Subsequent calls
    /// are no-ops.
    pub fn initialize(&self) -> EngineResult<()> {
        let mut initialized = self
            .core
            .initialized
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *initialized {
            trace!("Engine already initialized");
            return Ok(());
        }

        let level = to_cstring(&self.core.settings.log_level)?;
        self.core.with_handle(|api, handle| {
            // SAFETY: `with_handle` guarantees a live handle.
            let code = unsafe { api.request_log_messages(handle, &level) };
            if code < 0 {
                return Err(EngineError::Init {
                    code,
                    message: self.core.message(code),
                });
            }

            let code = unsafe { api.initialize(handle) };
            if code < 0 {
                return Err(EngineError::Init {
                    code,
                    message: self.core.message(code),
                });
            }
            Ok(())
        })?;

        *initialized = true;
        info!("Engine initialized");
        Ok(())
    }

    /// Tear the instance down. Safe to call any number of times from any
    /// thread; only the first call does work, and it never panics.
    pub fn dispose(&self) {
        if self.core.disposed.swap(true, Ordering::AcqRel) {
            trace!("Engine already disposed");
            return;
        }
        debug!("Disposing engine instance");

        self.core.wake_poller();

        let poller = self
            .poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(poller) = poller {
            self.join_poller(poller);
        }

        self.core.release_handle();
        info!("Engine instance disposed");
    }

    fn join_poller(&self, poller: Poller) {
        if poller.thread.thread().id() == thread::current().id() {
            return;
        }

        let limit = self.core.settings.poll_timeout * 2;
        match poller.exited.recv_timeout(limit) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if poller.thread.join().is_err() {
                    warn!("Event poller thread panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                // Destroy still waits for the poller's read guard
                warn!("Event poller did not stop within {:?}, detaching", limit);
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        *self
            .core
            .initialized
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_disposed(&self) -> bool {
        self.core.is_disposed()
    }

    /// Identity of the native instance, `None` after disposal
    pub fn raw_handle(&self) -> Option<RawHandle> {
        *self
            .core
            .handle
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn client_api_version(&self) -> u64 {
        self.core.api.client_api_version()
    }

    /// Subscribe to every decoded engine event
    pub fn subscribe(&self) -> EventSubscriber {
        self.core.bus.subscribe()
    }

    /// Subscribe to a subset of event kinds
    pub fn subscribe_to(&self, kinds: Vec<EventKind>) -> EventSubscriber {
        self.core.bus.subscribe_to_kinds(kinds)
    }

    pub fn event_stats(&self) -> EventBusStats {
        self.core.bus.stats()
    }

    /// Observable derived playback status
    pub fn status(&self) -> watch::Receiver<PlaybackStatus> {
        self.core.status.subscribe()
    }

    pub fn playback_status(&self) -> PlaybackStatus {
        self.core.status.current()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("handle", &self.raw_handle())
            .field("initialized", &self.is_initialized())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
