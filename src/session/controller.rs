//! Session lifecycle state machine
//!
//! ```text
//!            start                      stop
//!   Idle ──────────────▶ Running ──────────────▶ Running (stopping)
//!    ▲                      │                          │
//!    └──────────────────────┴──────────────────────────┘
//!                 worker finished teardown
//! ```
//!
//! Start and stop are serialized by the lifecycle lock. Stop only raises the
//! signal and clears the pipes; the worker thread moves the state back to
//! Idle once its teardown is done, so a start arriving before then is still
//! rejected.

use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::audio::device::AudioBackend;
use crate::config::AppConfig;
use crate::error::SessionError;
use crate::feedback::TurnHook;
use crate::network::{LiveConnector, LiveSetup};
use crate::session::diagnostics::{SessionDiagnostics, SessionStats};
use crate::session::signal::CancellationSignal;
use crate::session::worker::{SessionPipes, SessionWorker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Running,
}

/// Acknowledgement of a started session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionTicket {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
}

/// Point-in-time view of the controller
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub session_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    /// Stop was requested and teardown is still in progress
    pub stopping: bool,
    pub stats: Option<SessionStats>,
}

struct ActiveSession {
    ticket: SessionTicket,
    signal: CancellationSignal,
    pipes: SessionPipes,
    diagnostics: Arc<SessionDiagnostics>,
}

enum Lifecycle {
    Idle,
    Running(ActiveSession),
}

struct ControllerInner {
    lifecycle: Mutex<Lifecycle>,
    idle: Condvar,
    connector: Arc<dyn LiveConnector>,
    backend: Arc<dyn AudioBackend>,
    hook: Arc<dyn TurnHook>,
    config: Arc<AppConfig>,
}

impl ControllerInner {
    /// Called by the worker thread once teardown is complete
    fn finish(&self, id: Uuid) {
        let mut lifecycle = self.lifecycle.lock();
        if matches!(&*lifecycle, Lifecycle::Running(active) if active.ticket.session_id == id) {
            *lifecycle = Lifecycle::Idle;
            tracing::info!(session = %id, "Session ended");
        }
        self.idle.notify_all();
    }
}

/// Owns the single session slot
///
/// Cheap to clone; clones share the same slot.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<ControllerInner>,
}

impl SessionController {
    pub fn new(
        connector: Arc<dyn LiveConnector>,
        backend: Arc<dyn AudioBackend>,
        hook: Arc<dyn TurnHook>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                lifecycle: Mutex::new(Lifecycle::Idle),
                idle: Condvar::new(),
                connector,
                backend,
                hook,
                config,
            }),
        }
    }

    /// Start a session about `job_description`
    ///
    /// Rejected without side effects if a session is running or still
    /// tearing down.
    pub fn start(&self, job_description: &str) -> Result<SessionTicket, SessionError> {
        let mut lifecycle = self.inner.lifecycle.lock();
        if matches!(*lifecycle, Lifecycle::Running(_)) {
            return Err(SessionError::AlreadyRunning);
        }

        let config = &self.inner.config;
        let ticket = SessionTicket {
            session_id: Uuid::new_v4(),
            started_at: Utc::now(),
        };
        let signal = CancellationSignal::new();
        let pipes = SessionPipes::new(config);
        let diagnostics = Arc::new(SessionDiagnostics::new());

        let worker = SessionWorker {
            id: ticket.session_id,
            connector: self.inner.connector.clone(),
            backend: self.inner.backend.clone(),
            hook: self.inner.hook.clone(),
            config: config.clone(),
            setup: LiveSetup::for_interview(&config.remote, job_description),
            pipes: pipes.clone(),
            signal: signal.clone(),
            diagnostics: diagnostics.clone(),
        };

        // Mark running before the thread exists so its exit always finds us
        *lifecycle = Lifecycle::Running(ActiveSession {
            ticket: ticket.clone(),
            signal,
            pipes,
            diagnostics,
        });

        let inner = self.inner.clone();
        let id = ticket.session_id;
        if let Err(e) = worker.spawn(move || inner.finish(id)) {
            *lifecycle = Lifecycle::Idle;
            self.inner.idle.notify_all();
            tracing::error!("Failed to spawn session worker: {}", e);
            return Err(SessionError::SpawnFailed(e.to_string()));
        }

        tracing::info!(session = %id, "Session started");
        Ok(ticket)
    }

    /// Request the running session to stop
    ///
    /// Returns as soon as the signal is raised and the pipes are cleared;
    /// teardown continues on the worker thread.
    pub fn stop(&self) -> Result<(), SessionError> {
        let lifecycle = self.inner.lifecycle.lock();
        let Lifecycle::Running(active) = &*lifecycle else {
            return Err(SessionError::NotRunning);
        };

        active.signal.cancel();
        let discarded = active.pipes.clear();
        tracing::info!(session = %active.ticket.session_id, discarded, "Session stop requested");
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        match *self.inner.lifecycle.lock() {
            Lifecycle::Idle => SessionState::Idle,
            Lifecycle::Running(_) => SessionState::Running,
        }
    }

    pub fn status(&self) -> SessionStatus {
        match &*self.inner.lifecycle.lock() {
            Lifecycle::Idle => SessionStatus {
                state: SessionState::Idle,
                session_id: None,
                started_at: None,
                stopping: false,
                stats: None,
            },
            Lifecycle::Running(active) => SessionStatus {
                state: SessionState::Running,
                session_id: Some(active.ticket.session_id),
                started_at: Some(active.ticket.started_at),
                stopping: active.signal.is_cancelled(),
                stats: Some(active.diagnostics.snapshot(
                    active.pipes.input.stats(),
                    active.pipes.output.stats(),
                    active.pipes.playback.len(),
                    active.pipes.playback.overflowed(),
                )),
            },
        }
    }

    /// Queues and buffer of the running session
    pub fn pipes(&self) -> Option<SessionPipes> {
        match &*self.inner.lifecycle.lock() {
            Lifecycle::Idle => None,
            Lifecycle::Running(active) => Some(active.pipes.clone()),
        }
    }

    /// Block until the controller is Idle or `timeout` passes
    /// Returns true if Idle was reached
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut lifecycle = self.inner.lifecycle.lock();
        while matches!(*lifecycle, Lifecycle::Running(_)) {
            if self.inner.idle.wait_until(&mut lifecycle, deadline).timed_out() {
                return matches!(*lifecycle, Lifecycle::Idle);
            }
        }
        true
    }
}
