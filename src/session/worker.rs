//! Session worker context
//!
//! One dedicated thread per session hosts a current-thread runtime. On it the
//! worker opens the remote session and the hardware streams, schedules the
//! sender and receiver tasks, then supervises until the signal is set and
//! tears everything down in reverse order.

use std::sync::Arc;
use std::thread::JoinHandle;
use uuid::Uuid;

use crate::audio::buffer::SharedFrameQueue;
use crate::audio::capture::CaptureSource;
use crate::audio::device::{ActiveStream, AudioBackend, StreamSpec};
use crate::audio::playback::{PlaybackBuffer, PlaybackSink};
use crate::config::AppConfig;
use crate::error::{AudioError, Result};
use crate::feedback::TurnHook;
use crate::network::{LiveConnector, LiveSetup};
use crate::session::diagnostics::SessionDiagnostics;
use crate::session::receiver::ReceiverTask;
use crate::session::sender::SenderTask;
use crate::session::signal::CancellationSignal;

/// Capacity of the callback fault channel
const FAULT_CHANNEL_CAPACITY: usize = 64;

/// Calls the wrapped closure when dropped
struct ExitGuard<F: FnOnce()>(Option<F>);

impl<F: FnOnce()> Drop for ExitGuard<F> {
    fn drop(&mut self) {
        if let Some(on_exit) = self.0.take() {
            on_exit();
        }
    }
}

/// Queues and buffer shared between the callbacks, the tasks and the
/// controller
#[derive(Clone)]
pub struct SessionPipes {
    pub input: SharedFrameQueue,
    pub output: SharedFrameQueue,
    pub playback: Arc<PlaybackBuffer>,
}

impl SessionPipes {
    pub fn new(config: &AppConfig) -> Self {
        let audio = &config.audio;
        Self {
            input: crate::audio::buffer::create_shared_queue(audio.input_queue_capacity),
            output: crate::audio::buffer::create_shared_queue(audio.output_queue_capacity),
            playback: Arc::new(PlaybackBuffer::new(
                audio.max_playback_samples,
                audio.overflow_policy,
            )),
        }
    }

    /// Empty both queues and the playback buffer
    pub fn clear(&self) -> usize {
        let discarded = self.input.clear() + self.output.clear();
        self.playback.reset();
        discarded
    }
}

/// Everything one session run needs
pub struct SessionWorker {
    pub id: Uuid,
    pub connector: Arc<dyn LiveConnector>,
    pub backend: Arc<dyn AudioBackend>,
    pub hook: Arc<dyn TurnHook>,
    pub config: Arc<AppConfig>,
    pub setup: LiveSetup,
    pub pipes: SessionPipes,
    pub signal: CancellationSignal,
    pub diagnostics: Arc<SessionDiagnostics>,
}

impl SessionWorker {
    /// Run the session on a new named thread, then call `on_exit`
    ///
    /// `on_exit` also runs if the thread unwinds.
    pub fn spawn<F>(self, on_exit: F) -> std::io::Result<JoinHandle<()>>
    where
        F: FnOnce() + Send + 'static,
    {
        let name = format!("session-{}", &self.id.simple().to_string()[..8]);
        std::thread::Builder::new().name(name).spawn(move || {
            let _exit = ExitGuard(Some(on_exit));
            match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime.block_on(self.run()),
                Err(e) => {
                    tracing::error!(session = %self.id, "Failed to build session runtime: {}", e);
                    self.signal.cancel();
                }
            }
        })
    }

    /// Run the session to completion
    ///
    /// Failures are logged and end the session as if it had been stopped.
    pub async fn run(self) {
        tracing::info!(session = %self.id, "Session worker started");

        if let Err(e) = self.run_session().await {
            tracing::error!(session = %self.id, "Session failed: {}", e);
        }
        self.signal.cancel();

        let discarded = self.pipes.clear();
        tracing::info!(session = %self.id, discarded, "Session worker finished");
    }

    async fn run_session(&self) -> Result<()> {
        let session = tokio::select! {
            biased;
            _ = self.signal.cancelled() => {
                tracing::info!(
                    session = %self.id,
                    "Stopped before the remote session was established"
                );
                return Ok(());
            }
            session = self.connector.connect(&self.setup) => session?,
        };

        let (fault_tx, fault_rx) = crossbeam_channel::bounded(FAULT_CHANNEL_CAPACITY);
        let audio = &self.config.audio;
        let capture = Arc::new(CaptureSource::new(
            self.pipes.input.clone(),
            audio.capture_sample_rate,
            self.diagnostics.clone(),
            fault_tx.clone(),
        ));
        let sink = Arc::new(PlaybackSink::new(
            self.pipes.output.clone(),
            self.pipes.playback.clone(),
            audio.playback_sample_rate,
            audio.refill_factor,
            self.diagnostics.clone(),
            fault_tx,
        ));

        let streams = match self.open_streams(capture, sink) {
            Ok(streams) => streams,
            Err(e) => {
                session.close().await;
                return Err(e.into());
            }
        };

        let timing = &self.config.session;
        let sender = tokio::spawn(
            SenderTask::new(
                self.pipes.input.clone(),
                session.clone(),
                self.signal.clone(),
                self.diagnostics.clone(),
                timing.send_poll(),
                timing.send_failure_backoff(),
            )
            .run(),
        );
        let receiver = tokio::spawn(
            ReceiverTask::new(
                session.clone(),
                self.pipes.output.clone(),
                self.pipes.playback.clone(),
                self.hook.clone(),
                self.signal.clone(),
                self.diagnostics.clone(),
                audio.playback_sample_rate,
                timing.receive_retry(),
                timing.send_poll(),
            )
            .run(),
        );

        tracing::info!(session = %self.id, "Streaming");
        self.supervise(&fault_rx).await;
        tracing::info!(session = %self.id, "Stop requested, tearing down");

        for stream in streams {
            stream.close();
        }

        let grace = timing.task_shutdown_grace();
        for (name, mut handle) in [("sender", sender), ("receiver", receiver)] {
            match tokio::time::timeout(grace, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(session = %self.id, "{} task failed: {}", name, e),
                Err(_) => {
                    tracing::warn!(
                        session = %self.id,
                        "{} task did not stop within {:?}, aborting",
                        name,
                        grace
                    );
                    handle.abort();
                }
            }
        }

        session.close().await;
        Ok(())
    }

    /// Open capture then playback; a playback failure closes capture again
    fn open_streams(
        &self,
        capture: Arc<CaptureSource>,
        sink: Arc<PlaybackSink>,
    ) -> std::result::Result<Vec<Box<dyn ActiveStream>>, AudioError> {
        let audio = &self.config.audio;
        let capture_spec = StreamSpec::mono(
            audio.input_device.clone(),
            audio.capture_sample_rate,
            audio.capture_block_size,
        );
        let playback_spec = StreamSpec::mono(
            audio.output_device.clone(),
            audio.playback_sample_rate,
            audio.playback_block_size,
        );

        let input = self.backend.open_capture(&capture_spec, capture)?;
        match self.backend.open_playback(&playback_spec, sink) {
            Ok(output) => Ok(vec![input, output]),
            Err(e) => {
                input.close();
                Err(e)
            }
        }
    }

    /// Wait for the signal, logging callback faults as they arrive
    async fn supervise(&self, faults: &crossbeam_channel::Receiver<AudioError>) {
        let interval = self.config.session.supervise_interval();
        loop {
            for fault in faults.try_iter() {
                tracing::warn!(session = %self.id, "Audio stream fault: {}", fault);
            }
            if !self.signal.sleep(interval).await {
                break;
            }
        }
        for fault in faults.try_iter() {
            tracing::warn!(session = %self.id, "Audio stream fault: {}", fault);
        }
    }
}
