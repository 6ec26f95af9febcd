//! Lifecycle of the single shared rendering engine
//!
//! The manager starts the engine on first use, hands the same handle to every
//! caller, relaunches it if it stops answering and shuts it down once.
//! Construction runs while holding an async mutex, so callers racing on a cold
//! manager collapse onto one launch.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::Mutex;

use crate::{Engine, EngineLauncher, Error, Result};

/// Default upper bound on how long `shutdown_engine` waits for the engine to exit
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default upper bound on the liveness ping made when reusing the engine
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(2);

/// Observable lifecycle phase of the managed engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    NotStarted,
    Starting,
    Running,
    Stopped,
}

impl EngineStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => EngineStatus::Starting,
            2 => EngineStatus::Running,
            3 => EngineStatus::Stopped,
            _ => EngineStatus::NotStarted,
        }
    }
}

enum Slot<E> {
    Empty,
    Running(Arc<E>),
    Stopped,
}

/// Owns the one engine process of the service.
///
/// All access goes through [`acquire_engine`](Self::acquire_engine) and
/// [`shutdown_engine`](Self::shutdown_engine).
pub struct EngineManager<L: EngineLauncher> {
    launcher: L,
    slot: Mutex<Slot<L::Engine>>,
    status: AtomicU8,
    launches: AtomicUsize,
    health_check: bool,
    ping_timeout: Duration,
    close_timeout: Duration,
}

impl<L: EngineLauncher> EngineManager<L> {
    pub fn new(launcher: L) -> Self {
        Self {
            launcher,
            slot: Mutex::new(Slot::Empty),
            status: AtomicU8::new(EngineStatus::NotStarted as u8),
            launches: AtomicUsize::new(0),
            health_check: true,
            ping_timeout: DEFAULT_PING_TIMEOUT,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }

    /// Skip the liveness ping when reusing a running engine.
    pub fn without_health_check(mut self) -> Self {
        self.health_check = false;
        self
    }

    /// Bound the liveness ping; an engine that does not answer in time is
    /// treated as dead and relaunched.
    pub fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    /// Bound how long closing the engine may take.
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Number of successful engine launches so far.
    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::Acquire)
    }

    fn set_status(&self, status: EngineStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    /// Return the live engine, launching it if there is none.
    ///
    /// A failed launch leaves the manager in `NotStarted` so the next call
    /// retries. After shutdown this returns [`Error::EngineStopped`].
    pub async fn acquire_engine(&self) -> Result<Arc<L::Engine>> {
        let mut slot = self.slot.lock().await;

        if let Slot::Running(engine) = &*slot {
            if !self.health_check {
                return Ok(engine.clone());
            }
            let health = match tokio::time::timeout(self.ping_timeout, engine.ping()).await {
                Ok(res) => res,
                Err(_) => Err(Error::RenderError(format!(
                    "no answer to ping within {}ms",
                    self.ping_timeout.as_millis()
                ))),
            };
            match health {
                Ok(()) => {
                    debug!("Reusing running engine");
                    return Ok(engine.clone());
                }
                Err(e) => {
                    warn!("Engine failed health check, relaunching: {}", e);
                    let dead = engine.clone();
                    *slot = Slot::Empty;
                    self.set_status(EngineStatus::NotStarted);
                    self.close_quietly(&dead).await;
                }
            }
        }

        if let Slot::Stopped = &*slot {
            return Err(Error::EngineStopped);
        }

        self.set_status(EngineStatus::Starting);
        info!("Launching rendering engine");
        match self.launcher.launch().await {
            Ok(engine) => {
                let engine = Arc::new(engine);
                *slot = Slot::Running(engine.clone());
                self.launches.fetch_add(1, Ordering::AcqRel);
                self.set_status(EngineStatus::Running);
                info!("Rendering engine started");
                Ok(engine)
            }
            Err(e) => {
                self.set_status(EngineStatus::NotStarted);
                warn!("Rendering engine failed to start: {}", e);
                Err(match e {
                    Error::EngineStart(_) => e,
                    other => Error::EngineStart(other.to_string()),
                })
            }
        }
    }

    /// Terminate the engine if one is running. Safe to call any number of
    /// times; close errors are logged and dropped.
    pub async fn shutdown_engine(&self) {
        let mut slot = self.slot.lock().await;
        let previous = std::mem::replace(&mut *slot, Slot::Stopped);
        self.set_status(EngineStatus::Stopped);

        if let Slot::Running(engine) = previous {
            info!("Shutting down rendering engine");
            self.close_quietly(&engine).await;
        }
    }

    async fn close_quietly(&self, engine: &L::Engine) {
        match tokio::time::timeout(self.close_timeout, engine.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Ignoring engine close failure: {}", e),
            Err(_) => warn!(
                "Engine did not close within {}ms, abandoning it",
                self.close_timeout.as_millis()
            ),
        }
    }
}
