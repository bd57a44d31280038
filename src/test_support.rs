//! Scripted collaborators for unit tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::audio::capture::CaptureSource;
use crate::audio::device::{ActiveStream, AudioBackend, StreamSpec};
use crate::audio::playback::PlaybackSink;
use crate::error::{AudioError, RemoteError};
use crate::feedback::{TurnEvent, TurnHook};
use crate::network::{AudioBlob, InboundItem, LiveConnector, LiveSession, LiveSetup};

/// One scripted result of `receive`
pub(crate) enum Step {
    Item(InboundItem),
    End,
    Fail(RemoteError),
}

/// Session that replays a script and then waits forever
#[derive(Default)]
pub(crate) struct ScriptedSession {
    steps: Mutex<VecDeque<Step>>,
    sent: Mutex<Vec<AudioBlob>>,
    failing_sends: AtomicUsize,
    receives: AtomicUsize,
    closed: AtomicBool,
}

impl ScriptedSession {
    pub(crate) fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            ..Default::default()
        })
    }

    pub(crate) fn items(items: Vec<InboundItem>) -> Arc<Self> {
        Self::new(items.into_iter().map(Step::Item).collect())
    }

    /// Fail the next `count` sends
    pub(crate) fn fail_sends(&self, count: usize) {
        self.failing_sends.store(count, Ordering::SeqCst);
    }

    pub(crate) fn sent(&self) -> Vec<AudioBlob> {
        self.sent.lock().clone()
    }

    pub(crate) fn receive_calls(&self) -> usize {
        self.receives.load(Ordering::SeqCst)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LiveSession for ScriptedSession {
    async fn send_audio(&self, blob: AudioBlob) -> Result<(), RemoteError> {
        let failing = self.failing_sends.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_sends.store(failing - 1, Ordering::SeqCst);
            return Err(RemoteError::SendFailed("scripted failure".into()));
        }
        self.sent.lock().push(blob);
        Ok(())
    }

    async fn receive(&self) -> Result<Option<InboundItem>, RemoteError> {
        self.receives.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().pop_front();
        match step {
            Some(Step::Item(item)) => Ok(Some(item)),
            Some(Step::End) => Ok(None),
            Some(Step::Fail(e)) => Err(e),
            None => std::future::pending().await,
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Connector handing out one shared scripted session
pub(crate) struct ScriptedConnector {
    session: Arc<ScriptedSession>,
    fail: bool,
    setups: Mutex<Vec<LiveSetup>>,
}

impl ScriptedConnector {
    pub(crate) fn new(session: Arc<ScriptedSession>) -> Arc<Self> {
        Arc::new(Self {
            session,
            fail: false,
            setups: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn failing() -> Arc<Self> {
        Arc::new(Self {
            session: ScriptedSession::new(Vec::new()),
            fail: true,
            setups: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn setups(&self) -> Vec<LiveSetup> {
        self.setups.lock().clone()
    }
}

#[async_trait]
impl LiveConnector for ScriptedConnector {
    async fn connect(&self, setup: &LiveSetup) -> Result<Arc<dyn LiveSession>, RemoteError> {
        self.setups.lock().push(setup.clone());
        if self.fail {
            return Err(RemoteError::ConnectionFailed("scripted refusal".into()));
        }
        Ok(self.session.clone())
    }
}

/// Backend that opens no hardware but keeps the callbacks for tests to drive
#[derive(Default)]
pub(crate) struct NullBackend {
    fail_playback: bool,
    capture: Mutex<Option<Arc<CaptureSource>>>,
    playback: Mutex<Option<Arc<PlaybackSink>>>,
    closed: Arc<AtomicUsize>,
}

impl NullBackend {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Backend whose output device cannot be opened
    pub(crate) fn failing_playback() -> Arc<Self> {
        Arc::new(Self {
            fail_playback: true,
            ..Default::default()
        })
    }

    pub(crate) fn capture(&self) -> Option<Arc<CaptureSource>> {
        self.capture.lock().clone()
    }

    pub(crate) fn playback(&self) -> Option<Arc<PlaybackSink>> {
        self.playback.lock().clone()
    }

    pub(crate) fn streams_closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

struct NullStream {
    closed: Arc<AtomicUsize>,
}

impl ActiveStream for NullStream {
    fn close(self: Box<Self>) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

impl AudioBackend for NullBackend {
    fn open_capture(
        &self,
        _spec: &StreamSpec,
        source: Arc<CaptureSource>,
    ) -> Result<Box<dyn ActiveStream>, AudioError> {
        *self.capture.lock() = Some(source);
        Ok(Box::new(NullStream {
            closed: self.closed.clone(),
        }))
    }

    fn open_playback(
        &self,
        _spec: &StreamSpec,
        sink: Arc<PlaybackSink>,
    ) -> Result<Box<dyn ActiveStream>, AudioError> {
        if self.fail_playback {
            return Err(AudioError::DeviceNotFound("null output".into()));
        }
        *self.playback.lock() = Some(sink);
        Ok(Box::new(NullStream {
            closed: self.closed.clone(),
        }))
    }
}

/// Hook that remembers every turn
#[derive(Default)]
pub(crate) struct RecordingHook {
    events: Mutex<Vec<TurnEvent>>,
}

impl RecordingHook {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn events(&self) -> Vec<TurnEvent> {
        self.events.lock().clone()
    }
}

impl TurnHook for RecordingHook {
    fn on_turn_complete(&self, event: &TurnEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Poll `condition` until it holds or `timeout` passes
pub(crate) async fn eventually(timeout: std::time::Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    condition()
}
