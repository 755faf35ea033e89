//! Voice session: the connection state machine that ties the microphone,
//! the realtime link, playback and the transcript together.
//!
//! ```text
//!   Idle ──start──▶ Connecting ──Open──▶ Connected ──stop──▶ Disconnecting
//!    ▲                  │                    │                     │
//!    └──────────────────┴──── error / close / timeout ─────────────┘
//! ```
//!
//! The session is a single-writer actor: every mutation happens on whoever
//! owns the [`VoiceSession`], normally inside [`VoiceSession::run`]. All
//! per-session resources live in one [`SessionResources`] bundle so cleanup
//! is a single idempotent drop.

use std::fmt;
use std::future::{self, Future};
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::audio_io::{AudioDevices, AudioPair, AudioSource};
use crate::capture_pipeline::CapturePipeline;
use crate::codec::{decode, decode_audio_data, sample_rate_from_mime};
use crate::config::SessionConfig;
use crate::error::{ErrorKind, VoiceError};
use crate::realtime::{Outbound, RealtimeLink, RealtimeTransport, ServerContent, ServerEvent};
use crate::scheduler::{PlaybackId, PlaybackScheduler};
use crate::transcript::{Speaker, Transcript};

/// Shown when the microphone cannot be acquired.
pub const PERMISSION_NOTICE: &str =
    "Could not start the session. Please ensure you have given microphone permissions.";

// ── State machine ──────────────────────────────────────────────────

/// Lifecycle of the realtime connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ConnectionState {
    /// No session; all resources released.
    #[default]
    Idle,

    /// Devices acquired, waiting for the server to acknowledge setup.
    Connecting,

    /// Microphone streaming, replies playing.
    Connected,

    /// Close requested, waiting for the server to confirm.
    Disconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
        })
    }
}

// ── Events and commands ────────────────────────────────────────────

/// Events emitted by the session to the UI layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(ConnectionState),

    /// The transcript was emptied at the start of a session.
    TranscriptCleared,

    /// A transcription delta landed in turn `index`.
    TranscriptUpdated {
        index: usize,
        speaker: Speaker,
        /// The text just appended.
        delta: String,
        /// Full text of the turn so far.
        text: String,
    },

    /// Whether any reply audio is audible.
    SpeakingChanged(bool),

    /// A user-facing message (failures, timeouts).
    Notice(String),
}

/// Requests accepted by [`VoiceSession::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Start,
    Stop,
    /// Start when idle, stop when connected.
    Toggle,
    /// Clean up and leave the run loop.
    Shutdown,
}

// ── Per-session resources ──────────────────────────────────────────

/// Everything acquired for one session, released together.
struct SessionResources {
    source: Box<dyn AudioSource>,
    scheduler: PlaybackScheduler,
    ended_rx: mpsc::UnboundedReceiver<PlaybackId>,
    link: Option<RealtimeLink>,
    capture: Option<CapturePipeline>,
    released: bool,
}

impl SessionResources {
    fn new(pair: AudioPair, ended_rx: mpsc::UnboundedReceiver<PlaybackId>) -> Self {
        Self {
            source: pair.source,
            scheduler: PlaybackScheduler::new(pair.sink),
            ended_rx,
            link: None,
            capture: None,
            released: false,
        }
    }

    fn stop_capture(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            self.source.stop_capture();
            capture.teardown();
        }
    }

    /// Stop everything. Runs at most once.
    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        self.stop_capture();
        self.scheduler.teardown();
        // Dropping the outbound sender closes the socket.
        self.link = None;
        tracing::debug!("Session resources released");
    }
}

impl Drop for SessionResources {
    fn drop(&mut self) {
        self.release();
    }
}

/// Devices and link acquired by a successful start.
struct Opened {
    pair: AudioPair,
    ended_rx: mpsc::UnboundedReceiver<PlaybackId>,
    link: RealtimeLink,
}

/// Device open plus connect, bounded by `connect_timeout`. Dropping it
/// cancels the start and releases whatever it already acquired.
type PendingStart = Pin<Box<dyn Future<Output = Result<Opened, VoiceError>> + Send>>;

// ── Session ────────────────────────────────────────────────────────

enum Input {
    Command(Option<SessionCommand>),
    Started(Result<Opened, VoiceError>),
    Server(Option<ServerEvent>),
    Ended(PlaybackId),
    Deadline,
}

/// The voice session actor.
pub struct VoiceSession {
    config: SessionConfig,
    transport: Arc<dyn RealtimeTransport>,
    devices: Arc<dyn AudioDevices>,

    state: ConnectionState,
    transcript: Transcript,
    speaking: bool,

    resources: Option<SessionResources>,

    /// In-flight start driven by [`run`](Self::run).
    pending_start: Option<PendingStart>,

    /// Bounds `Connecting` and `Disconnecting`.
    deadline: Option<Instant>,

    event_tx: mpsc::UnboundedSender<SessionEvent>,
}

impl VoiceSession {
    /// Create an idle session and the receiver for its events.
    pub fn new(
        config: SessionConfig,
        transport: Arc<dyn RealtimeTransport>,
        devices: Arc<dyn AudioDevices>,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let session = Self {
            config,
            transport,
            devices,
            state: ConnectionState::Idle,
            transcript: Transcript::new(),
            speaking: false,
            resources: None,
            pending_start: None,
            deadline: None,
            event_tx,
        };
        (session, event_rx)
    }

    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    pub const fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Whether reply audio is audible.
    pub const fn is_speaking(&self) -> bool {
        self.speaking
    }

    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Instant at which the current `Connecting` or `Disconnecting` phase
    /// gives up.
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    // ── Operations ─────────────────────────────────────────────────

    /// Acquire the devices and open the realtime link.
    ///
    /// On return the session is `Connecting`; [`ServerEvent::Open`] moves it
    /// to `Connected`. On failure a notice is emitted and the session is
    /// back in `Idle` with nothing held.
    pub async fn start(&mut self) -> Result<(), VoiceError> {
        let pending = self.begin_start()?;
        let outcome = pending.await;
        self.finish_start(outcome)
    }

    /// End the session.
    ///
    /// Connected sessions ask the server to close and wait for it;
    /// connecting sessions are dropped at once. No-op otherwise.
    pub fn stop(&mut self) {
        match self.state {
            ConnectionState::Idle | ConnectionState::Disconnecting => {}
            ConnectionState::Connecting => {
                tracing::info!("Voice session cancelled while connecting");
                self.cleanup();
            }
            ConnectionState::Connected => {
                tracing::info!("Stopping voice session");
                self.set_state(ConnectionState::Disconnecting);

                let Some(resources) = self.resources.as_mut() else {
                    self.cleanup();
                    return;
                };
                resources.stop_capture();
                let closed = resources
                    .link
                    .as_ref()
                    .is_some_and(|link| link.outbound.send(Outbound::Close).is_ok());

                if closed {
                    self.deadline = Some(Instant::now() + self.config.connect_timeout);
                } else {
                    self.cleanup();
                }
            }
        }
    }

    /// The orb: start when idle, stop when connected.
    pub async fn toggle(&mut self) -> Result<(), VoiceError> {
        match self.state {
            ConnectionState::Idle | ConnectionState::Disconnecting => self.start().await,
            ConnectionState::Connected => {
                self.stop();
                Ok(())
            }
            ConnectionState::Connecting => Ok(()),
        }
    }

    /// React to one event from the realtime link.
    pub fn handle_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Open => self.on_open(),

            ServerEvent::Content(content) => {
                if self.state == ConnectionState::Connected {
                    self.on_content(content);
                } else {
                    tracing::trace!(state = %self.state, "Ignoring content outside a live session");
                }
            }

            ServerEvent::GoAway { time_left } => {
                tracing::info!(?time_left, "Server will close the session soon");
            }

            ServerEvent::Error(message) => {
                if self.state == ConnectionState::Idle {
                    return;
                }
                tracing::warn!(error = %message, "Realtime session error");
                self.notice(format!("An error occurred: {message}. Please try again."));
                self.cleanup();
            }

            ServerEvent::Closed { code, reason } => {
                tracing::info!(?code, %reason, state = %self.state, "Realtime session closed");
                match self.state {
                    ConnectionState::Idle => {}
                    ConnectionState::Connecting => {
                        self.notice(
                            "The connection closed before the session opened. Please try again."
                                .to_string(),
                        );
                        self.cleanup();
                    }
                    ConnectionState::Connected | ConnectionState::Disconnecting => self.cleanup(),
                }
            }
        }
    }

    /// A scheduled chunk finished playing.
    pub fn handle_playback_ended(&mut self, id: PlaybackId) {
        if let Some(resources) = self.resources.as_mut() {
            resources.scheduler.on_ended(id);
        }
        self.refresh_speaking();
    }

    /// The `Connecting` / `Disconnecting` deadline passed.
    pub fn on_deadline(&mut self) {
        self.deadline = None;
        match self.state {
            ConnectionState::Connecting => {
                tracing::warn!(timeout = ?self.config.connect_timeout, "Realtime session did not open in time");
                self.notice(format!(
                    "{}. Please try again.",
                    VoiceError::ConnectTimeout(self.config.connect_timeout)
                ));
                self.cleanup();
            }
            ConnectionState::Disconnecting => {
                tracing::warn!("Server did not confirm close, releasing anyway");
                self.cleanup();
            }
            ConnectionState::Idle | ConnectionState::Connected => {}
        }
    }

    /// Release everything and return to `Idle`. Safe to call repeatedly.
    pub fn cleanup(&mut self) {
        if self.pending_start.take().is_some() {
            tracing::debug!("Cancelled in-flight start");
        }
        if let Some(mut resources) = self.resources.take() {
            resources.release();
        }
        self.deadline = None;
        self.refresh_speaking();
        self.set_state(ConnectionState::Idle);
    }

    /// Final cleanup before the session is dropped.
    pub fn shutdown(&mut self) {
        tracing::debug!("Voice session shutting down");
        self.cleanup();
    }

    /// Drive the session until `Shutdown` or until every command sender is
    /// dropped.
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<SessionCommand>) {
        loop {
            let input = {
                let deadline = self.deadline;
                let pending = self.pending_start.as_mut();
                let (events, ended) = match self.resources.as_mut() {
                    Some(SessionResources { link, ended_rx, .. }) => {
                        (link.as_mut().map(|l| &mut l.events), Some(ended_rx))
                    }
                    None => (None, None),
                };

                tokio::select! {
                    command = commands.recv() => Input::Command(command),
                    outcome = start_or_pending(pending) => Input::Started(outcome),
                    event = recv_or_pending(events) => Input::Server(event),
                    Some(id) = recv_or_pending(ended) => Input::Ended(id),
                    () = sleep_or_pending(deadline) => Input::Deadline,
                }
            };

            match input {
                Input::Command(Some(SessionCommand::Start)) => self.request_start(),
                Input::Command(Some(SessionCommand::Stop)) => self.stop(),
                Input::Command(Some(SessionCommand::Toggle)) => match self.state {
                    ConnectionState::Connected => self.stop(),
                    ConnectionState::Idle | ConnectionState::Disconnecting => {
                        self.request_start();
                    }
                    ConnectionState::Connecting => {}
                },
                Input::Command(Some(SessionCommand::Shutdown) | None) => break,
                Input::Started(outcome) => {
                    self.pending_start = None;
                    if let Err(e) = self.finish_start(outcome) {
                        tracing::debug!(error = %e, "Start request failed");
                    }
                }
                Input::Server(Some(event)) => self.handle_server_event(event),
                // The link ended without a close frame.
                Input::Server(None) => self.handle_server_event(ServerEvent::Closed {
                    code: None,
                    reason: String::new(),
                }),
                Input::Ended(id) => self.handle_playback_ended(id),
                Input::Deadline => self.on_deadline(),
            }
        }

        self.shutdown();
    }

    // ── Internal helpers ───────────────────────────────────────────

    /// Enter `Connecting` and build the future that acquires the devices
    /// and the link. Only `AlreadyActive` is returned as an error here.
    fn begin_start(&mut self) -> Result<PendingStart, VoiceError> {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Connected => {
                return Err(VoiceError::AlreadyActive);
            }
            ConnectionState::Disconnecting => self.cleanup(),
            ConnectionState::Idle => {}
        }

        tracing::info!(model = %self.config.live.model, "Starting voice session");
        self.transcript.clear();
        self.emit(SessionEvent::TranscriptCleared);
        self.set_state(ConnectionState::Connecting);

        let devices = Arc::clone(&self.devices);
        let transport = Arc::clone(&self.transport);
        let live = self.config.live.clone();
        let timeout = self.config.connect_timeout;

        Ok(Box::pin(async move {
            let (ended_tx, ended_rx) = mpsc::unbounded_channel();
            // Opening the local devices waits for the audio thread to report.
            let pair = tokio::task::spawn_blocking(move || devices.open(ended_tx))
                .await
                .map_err(|_| VoiceError::AudioThreadDied)??;
            let link = tokio::time::timeout(timeout, transport.connect(&live))
                .await
                .map_err(|_| VoiceError::ConnectTimeout(timeout))??;
            Ok::<_, VoiceError>(Opened {
                pair,
                ended_rx,
                link,
            })
        }))
    }

    /// Install what a start acquired, or roll back to `Idle` on failure.
    fn finish_start(&mut self, outcome: Result<Opened, VoiceError>) -> Result<(), VoiceError> {
        let opened = match outcome {
            Ok(opened) => opened,
            Err(e) => return Err(self.fail_start(e)),
        };

        let mut resources = SessionResources::new(opened.pair, opened.ended_rx);
        resources.link = Some(opened.link);
        self.resources = Some(resources);
        self.deadline = Some(Instant::now() + self.config.connect_timeout);
        Ok(())
    }

    fn request_start(&mut self) {
        match self.begin_start() {
            Ok(pending) => self.pending_start = Some(pending),
            Err(e) => tracing::debug!(error = %e, "Start request failed"),
        }
    }

    fn on_open(&mut self) {
        if self.state != ConnectionState::Connecting {
            return;
        }
        let Some(resources) = self.resources.as_mut() else {
            return;
        };
        let Some(outbound) = resources.link.as_ref().map(|l| l.outbound.clone()) else {
            return;
        };

        match CapturePipeline::start(resources.source.as_ref(), outbound, &self.config.capture) {
            Ok(capture) => {
                resources.capture = Some(capture);
                self.deadline = None;
                tracing::info!("Voice session connected");
                self.set_state(ConnectionState::Connected);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to start capture");
                self.notice(notice_for(&e));
                self.cleanup();
            }
        }
    }

    fn on_content(&mut self, content: ServerContent) {
        if let Some(t) = content.output_transcription.as_ref() {
            self.append_transcript(Speaker::Model, &t.text);
        }
        if let Some(t) = content.input_transcription.as_ref() {
            self.append_transcript(Speaker::User, &t.text);
        }

        if let Some(audio) = content.first_inline_audio() {
            let rate =
                sample_rate_from_mime(&audio.mime_type).unwrap_or(self.config.playback_sample_rate);
            let decoded = decode(&audio.data).and_then(|bytes| decode_audio_data(&bytes, rate, 1));
            match decoded {
                Ok(buffer) => {
                    if let Some(resources) = self.resources.as_mut() {
                        if let Err(e) = resources.scheduler.schedule_chunk(buffer) {
                            tracing::warn!(error = %e, "Failed to schedule reply audio");
                        }
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Skipping undecodable audio chunk"),
            }
        }

        if content.interrupted {
            tracing::debug!("Reply interrupted by the user");
            if let Some(resources) = self.resources.as_mut() {
                resources.scheduler.interrupt();
            }
        }

        self.refresh_speaking();
    }

    fn append_transcript(&mut self, speaker: Speaker, delta: &str) {
        if delta.is_empty() {
            return;
        }
        let index = self.transcript.append_delta(speaker, delta);
        let text = self.transcript.turns()[index].text.clone();
        self.emit(SessionEvent::TranscriptUpdated {
            index,
            speaker,
            delta: delta.to_string(),
            text,
        });
    }

    /// Report a failed start and roll back to `Idle`.
    fn fail_start(&mut self, error: VoiceError) -> VoiceError {
        tracing::warn!(error = %error, "Failed to start voice session");
        self.notice(notice_for(&error));
        self.cleanup();
        error
    }

    fn refresh_speaking(&mut self) {
        let speaking = self
            .resources
            .as_ref()
            .is_some_and(|r| r.scheduler.is_speaking());
        if speaking != self.speaking {
            self.speaking = speaking;
            self.emit(SessionEvent::SpeakingChanged(speaking));
        }
    }

    fn notice(&self, message: String) {
        self.emit(SessionEvent::Notice(message));
    }

    fn set_state(&mut self, new_state: ConnectionState) {
        if self.state != new_state {
            tracing::debug!(old = %self.state, new = %new_state, "Session state transition");
            self.state = new_state;
            self.emit(SessionEvent::StateChanged(new_state));
        }
    }

    fn emit(&self, event: SessionEvent) {
        if self.event_tx.send(event).is_err() {
            tracing::trace!("Session event receiver dropped");
        }
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// User-facing text for a failed start.
fn notice_for(error: &VoiceError) -> String {
    match error.kind() {
        ErrorKind::Permission => PERMISSION_NOTICE.to_string(),
        _ => format!("Could not start the session: {error}. Please try again."),
    }
}

async fn recv_or_pending<T>(rx: Option<&mut mpsc::UnboundedReceiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => future::pending().await,
    }
}

async fn start_or_pending(pending: Option<&mut PendingStart>) -> Result<Opened, VoiceError> {
    match pending {
        Some(pending) => pending.await,
        None => future::pending().await,
    }
}

async fn sleep_or_pending(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_names() {
        assert_eq!(ConnectionState::default(), ConnectionState::Idle);
        assert_eq!(ConnectionState::Disconnecting.to_string(), "disconnecting");
    }

    #[test]
    fn permission_failures_get_the_microphone_notice() {
        assert_eq!(notice_for(&VoiceError::NoInputDevice), PERMISSION_NOTICE);
        assert!(
            notice_for(&VoiceError::ConnectError("refused".into())).contains("refused")
        );
    }
}
