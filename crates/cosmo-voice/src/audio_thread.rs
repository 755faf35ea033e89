//! Dedicated audio I/O thread: isolates `!Send` audio resources from the async runtime.
//!
//! `cpal::Stream` (capture) and `rodio::OutputStream` (playback) are `!Send` on
//! some platforms. Both are confined to a single OS thread that lives for one
//! session; the public [`AudioThreadHandle`] is the `Send + Sync` proxy.
//!
//! Playback does not need the command channel: the thread hands the mixer
//! source to the output stream once, and scheduling goes through the shared
//! [`MixerHandle`] directly.

use std::sync::mpsc;
use std::thread;

use rodio::OutputStream;

use crate::audio_io::{ChunkSender, PlaybackEndedSender};
use crate::capture::AudioCapture;
use crate::error::VoiceError;
use crate::playback::MixerHandle;

// ── Commands ───────────────────────────────────────────────────────

/// A command sent from the session to the audio thread.
enum AudioCommand {
    /// Arm the microphone and deliver chunks to `chunks`.
    StartCapture {
        chunks: ChunkSender,
        reply: mpsc::Sender<Result<(), VoiceError>>,
    },

    /// Disarm the microphone (fire-and-forget).
    StopCapture,

    /// Query whether the microphone is armed.
    IsCapturing { reply: mpsc::Sender<bool> },

    /// Release the microphone and the output device.
    Shutdown,
}

// ── Handle (Send + Sync proxy) ─────────────────────────────────────

/// `Send + Sync` handle to the dedicated audio I/O thread.
///
/// Request-reply methods block the caller until the audio thread responds;
/// the latency is a local channel round-trip.
pub struct AudioThreadHandle {
    cmd_tx: mpsc::Sender<AudioCommand>,
    thread: Option<thread::JoinHandle<()>>,
}

impl AudioThreadHandle {
    /// Spawn the audio thread, acquire the microphone and the output device,
    /// and start the mixer.
    ///
    /// Initialisation errors are propagated back through a one-shot channel,
    /// so a denied microphone surfaces here. Blocks until the thread reports;
    /// async callers go through `spawn_blocking`.
    pub fn spawn(
        playback_sample_rate: u32,
        ended: PlaybackEndedSender,
    ) -> Result<(Self, MixerHandle), VoiceError> {
        let (cmd_tx, cmd_rx) = mpsc::channel::<AudioCommand>();
        let (init_tx, init_rx) = mpsc::channel::<Result<MixerHandle, VoiceError>>();

        let thread = thread::Builder::new()
            .name("cosmo-audio".into())
            .spawn(move || {
                Self::run(playback_sample_rate, ended, cmd_rx, init_tx);
            })
            .map_err(|e| {
                VoiceError::InputStreamError(format!("failed to spawn audio thread: {e}"))
            })?;

        let mixer = init_rx.recv().map_err(|_| VoiceError::AudioThreadDied)??;

        Ok((
            Self {
                cmd_tx,
                thread: Some(thread),
            },
            mixer,
        ))
    }

    /// Arm the microphone.
    pub fn start_capture(&self, chunks: ChunkSender) -> Result<(), VoiceError> {
        self.send_and_recv(|reply| AudioCommand::StartCapture { chunks, reply })
    }

    /// Disarm the microphone.
    pub fn stop_capture(&self) {
        let _ = self.cmd_tx.send(AudioCommand::StopCapture);
    }

    /// Check whether the microphone is armed.
    pub fn is_capturing(&self) -> bool {
        self.query(|reply| AudioCommand::IsCapturing { reply })
            .unwrap_or(false)
    }

    // ── Internal helpers ───────────────────────────────────────────

    fn send_and_recv<T>(
        &self,
        build: impl FnOnce(mpsc::Sender<Result<T, VoiceError>>) -> AudioCommand,
    ) -> Result<T, VoiceError> {
        let (tx, rx) = mpsc::channel();
        self.cmd_tx
            .send(build(tx))
            .map_err(|_| VoiceError::AudioThreadDied)?;
        rx.recv().map_err(|_| VoiceError::AudioThreadDied)?
    }

    fn query<T>(&self, build: impl FnOnce(mpsc::Sender<T>) -> AudioCommand) -> Option<T> {
        let (tx, rx) = mpsc::channel();
        self.cmd_tx.send(build(tx)).ok()?;
        rx.recv().ok()
    }

    // ── Audio thread event loop ────────────────────────────────────

    fn run(
        playback_sample_rate: u32,
        ended: PlaybackEndedSender,
        cmd_rx: mpsc::Receiver<AudioCommand>,
        init_tx: mpsc::Sender<Result<MixerHandle, VoiceError>>,
    ) {
        // ── Initialise audio I/O on *this* thread ──────────────────
        let capture = match AudioCapture::new() {
            Ok(c) => c,
            Err(e) => {
                let _ = init_tx.send(Err(e));
                return;
            }
        };

        let (_stream, stream_handle) = match OutputStream::try_default() {
            Ok(pair) => pair,
            Err(e) => {
                let _ = init_tx.send(Err(VoiceError::OutputStreamError(e.to_string())));
                return;
            }
        };

        let (mixer, source) = MixerHandle::new(playback_sample_rate, ended);
        if let Err(e) = stream_handle.play_raw(source) {
            let _ = init_tx.send(Err(VoiceError::OutputStreamError(e.to_string())));
            return;
        }
        tracing::info!(
            sample_rate = playback_sample_rate,
            "Audio playback initialized on default output device"
        );

        if init_tx.send(Ok(mixer)).is_err() {
            return;
        }

        while let Ok(cmd) = cmd_rx.recv() {
            match cmd {
                AudioCommand::StartCapture { chunks, reply } => {
                    let _ = reply.send(capture.start(chunks));
                }

                AudioCommand::StopCapture => capture.stop(),

                AudioCommand::IsCapturing { reply } => {
                    let _ = reply.send(capture.is_capturing());
                }

                AudioCommand::Shutdown => break,
            }
        }

        // `capture` and the output stream are dropped here, on the audio thread.
        tracing::debug!("Audio thread shutting down");
    }
}

/// Joins the audio thread. The thread only has to drop its streams after
/// `Shutdown`, so the wait is short and bounded.
impl Drop for AudioThreadHandle {
    fn drop(&mut self) {
        // The thread may already be gone.
        let _ = self.cmd_tx.send(AudioCommand::Shutdown);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}
