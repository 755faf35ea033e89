//! Talk command handler.
//!
//! Runs a [`VoiceSession`] against the local audio devices and the Gemini
//! Live service. Enter toggles the session, `q` quits and Ctrl-C shuts
//! down with cleanup.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use console::{Key, Term, style};
use cosmo_voice::{
    ConnectionState, GeminiLiveTransport, LocalAudioDevices, SessionCommand, SessionEvent,
    Transcript, VoiceSession,
};
use tokio::sync::mpsc;

use crate::config::CliConfig;
use crate::presentation::status::IDLE_PROMPT;
use crate::error::CliError;
use crate::presentation::{TranscriptPrinter, display_text, orb_state, status_text};

/// What a keystroke asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Toggle,
    Quit,
}

/// Map a keystroke to an action; other keys are ignored.
pub fn action_for_key(key: &Key) -> Option<KeyAction> {
    match key {
        Key::Enter | Key::Char(' ') => Some(KeyAction::Toggle),
        Key::Char('q' | 'Q') | Key::Escape | Key::CtrlC => Some(KeyAction::Quit),
        _ => None,
    }
}

/// Map a line of piped input to an action.
fn action_for_line(line: &str) -> Option<KeyAction> {
    match line.trim() {
        "" => Some(KeyAction::Toggle),
        "q" | "quit" | "exit" => Some(KeyAction::Quit),
        _ => None,
    }
}

/// Execute the talk command.
pub async fn execute(config: &CliConfig) -> Result<()> {
    let api_key = config.require_api_key()?;
    tracing::debug!(source = %api_key.source, model = %config.session.live.model, "Starting talk");

    let transport = GeminiLiveTransport::new(api_key.key.clone()).with_endpoint(&config.endpoint);
    let devices = LocalAudioDevices::new(config.session.playback_sample_rate);
    let (session, mut events) =
        VoiceSession::new(config.session.clone(), Arc::new(transport), Arc::new(devices));

    let (commands, command_rx) = mpsc::unbounded_channel();
    let runner = tokio::spawn(session.run(command_rx));
    spawn_key_reader(commands.clone());

    // Unlocked handles: tracing writes to stderr from the session task.
    let colored = Term::stdout().is_term();
    let mut view = SessionView::new(io::stdout(), io::stderr(), colored);
    view.banner().map_err(CliError::from)?;

    let mut interrupted = false;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => view.apply(&event).map_err(CliError::from)?,
                // The run loop exited and dropped the session.
                None => break,
            },
            signal = tokio::signal::ctrl_c(), if !interrupted => {
                if let Err(e) = signal {
                    tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
                }
                interrupted = true;
                let _ = commands.send(SessionCommand::Shutdown);
            }
        }
    }

    view.finish().map_err(CliError::from)?;
    runner.await.context("voice session task failed")?;
    Ok(())
}

/// Forward keystrokes to the session from a blocking thread.
///
/// The thread is detached: it may be parked in `read_key` when the session
/// ends, and the process exit reclaims it.
fn spawn_key_reader(commands: mpsc::UnboundedSender<SessionCommand>) {
    let spawned = std::thread::Builder::new()
        .name("cosmo-keys".to_string())
        .spawn(move || {
            let term = Term::stdout();
            if term.is_term() {
                read_keys(&term, &commands);
            } else {
                read_lines(&commands);
            }
        });
    if let Err(e) = spawned {
        tracing::warn!(error = %e, "Failed to spawn key reader; only Ctrl-C will work");
    }
}

fn read_keys(term: &Term, commands: &mpsc::UnboundedSender<SessionCommand>) {
    loop {
        match term.read_key() {
            Ok(key) => {
                if !dispatch(action_for_key(&key), commands) {
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Keyboard input unavailable");
                return;
            }
        }
    }
}

fn read_lines(commands: &mpsc::UnboundedSender<SessionCommand>) {
    for line in io::stdin().lock().lines() {
        let Ok(line) = line else {
            return;
        };
        if !dispatch(action_for_line(&line), commands) {
            return;
        }
    }
    let _ = commands.send(SessionCommand::Shutdown);
}

/// Send the command for `action`; false once the reader should stop.
fn dispatch(action: Option<KeyAction>, commands: &mpsc::UnboundedSender<SessionCommand>) -> bool {
    match action {
        Some(KeyAction::Toggle) => commands.send(SessionCommand::Toggle).is_ok(),
        Some(KeyAction::Quit) => {
            let _ = commands.send(SessionCommand::Shutdown);
            false
        }
        None => !commands.is_closed(),
    }
}

/// Renders session events: transcript on `out`, status and notices on `err`.
pub struct SessionView<O: Write, E: Write> {
    printer: TranscriptPrinter<O>,
    err: E,
    colored: bool,
    state: ConnectionState,
    speaking: bool,
    transcript: Transcript,
    last_status: &'static str,
}

impl<O: Write, E: Write> SessionView<O, E> {
    pub const fn new(out: O, err: E, colored: bool) -> Self {
        Self {
            printer: TranscriptPrinter::new(out, colored),
            err,
            colored,
            state: ConnectionState::Idle,
            speaking: false,
            transcript: Transcript::new(),
            last_status: "",
        }
    }

    pub fn banner(&mut self) -> io::Result<()> {
        let hint = style("Enter: start/stop   q: quit").dim().force_styling(self.colored);
        writeln!(self.err, "{IDLE_PROMPT}")?;
        writeln!(self.err, "{hint}")
    }

    pub fn apply(&mut self, event: &SessionEvent) -> io::Result<()> {
        match event {
            SessionEvent::StateChanged(state) => {
                self.state = *state;
                self.refresh_status()?;
                if *state == ConnectionState::Idle {
                    self.printer.finish_line()?;
                    writeln!(self.err, "{}", display_text(self.state, &self.transcript))?;
                }
            }
            SessionEvent::SpeakingChanged(speaking) => {
                self.speaking = *speaking;
                self.refresh_status()?;
            }
            SessionEvent::TranscriptCleared => {
                self.transcript.clear();
                self.printer.reset()?;
            }
            SessionEvent::TranscriptUpdated {
                index,
                speaker,
                delta,
                ..
            } => {
                self.transcript.append_delta(*speaker, delta);
                self.printer.delta(*index, *speaker, delta)?;
            }
            SessionEvent::Notice(message) => {
                self.printer.finish_line()?;
                let message = style(message).yellow().force_styling(self.colored);
                writeln!(self.err, "{message}")?;
            }
        }
        Ok(())
    }

    pub fn finish(&mut self) -> io::Result<()> {
        self.printer.finish_line()
    }

    /// Print the status line when it changes.
    fn refresh_status(&mut self) -> io::Result<()> {
        let status = status_text(self.state, self.speaking);
        if status == self.last_status {
            return Ok(());
        }
        self.last_status = status;
        if status.is_empty() {
            return Ok(());
        }
        self.printer.finish_line()?;
        let orb = orb_state(self.state, self.speaking).marker();
        let status = style(format!("{orb} {status}")).cyan().force_styling(self.colored);
        writeln!(self.err, "{status}")
    }

    #[cfg(test)]
    fn into_parts(self) -> (O, E) {
        (self.printer.into_inner(), self.err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosmo_voice::Speaker;

    fn render(events: &[SessionEvent]) -> (String, String) {
        let mut view = SessionView::new(Vec::new(), Vec::new(), false);
        for event in events {
            view.apply(event).unwrap();
        }
        view.finish().unwrap();
        let (out, err) = view.into_parts();
        (String::from_utf8(out).unwrap(), String::from_utf8(err).unwrap())
    }

    fn delta(index: usize, speaker: Speaker, delta: &str) -> SessionEvent {
        SessionEvent::TranscriptUpdated {
            index,
            speaker,
            delta: delta.to_string(),
            text: String::new(),
        }
    }

    #[test]
    fn test_key_mapping() {
        assert_eq!(action_for_key(&Key::Enter), Some(KeyAction::Toggle));
        assert_eq!(action_for_key(&Key::Char('q')), Some(KeyAction::Quit));
        assert_eq!(action_for_key(&Key::Escape), Some(KeyAction::Quit));
        assert_eq!(action_for_key(&Key::Char('x')), None);
        assert_eq!(action_for_line("\n"), Some(KeyAction::Toggle));
        assert_eq!(action_for_line("quit"), Some(KeyAction::Quit));
    }

    #[test]
    fn test_dispatch_stops_on_quit() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        assert!(dispatch(Some(KeyAction::Toggle), &tx));
        assert!(!dispatch(Some(KeyAction::Quit), &tx));
        assert_eq!(rx.try_recv().unwrap(), SessionCommand::Toggle);
        assert_eq!(rx.try_recv().unwrap(), SessionCommand::Shutdown);
    }

    #[test]
    fn test_session_lifecycle_rendering() {
        let (out, err) = render(&[
            SessionEvent::TranscriptCleared,
            SessionEvent::StateChanged(ConnectionState::Connecting),
            SessionEvent::StateChanged(ConnectionState::Connected),
            delta(0, Speaker::User, "Tell me about"),
            delta(0, Speaker::User, " pulsars"),
            delta(1, Speaker::Model, "Pulsars spin."),
            SessionEvent::StateChanged(ConnectionState::Disconnecting),
            SessionEvent::StateChanged(ConnectionState::Idle),
        ]);
        assert_eq!(out, "You: Tell me about pulsars\nCosmo: Pulsars spin.\n");
        assert_eq!(
            err,
            format!("◎ Connecting...\n◎ Listening...\n○ Disconnecting...\n{IDLE_PROMPT}\n")
        );
    }

    #[test]
    fn test_speaking_updates_status_once() {
        let (_, err) = render(&[
            SessionEvent::StateChanged(ConnectionState::Connected),
            SessionEvent::SpeakingChanged(true),
            SessionEvent::SpeakingChanged(true),
            SessionEvent::SpeakingChanged(false),
        ]);
        assert_eq!(err, "◎ Listening...\n● Speaking...\n◎ Listening...\n");
    }

    #[test]
    fn test_notice_goes_to_stderr() {
        let (out, err) = render(&[
            delta(0, Speaker::Model, "Hello"),
            SessionEvent::Notice("An error occurred: boom. Please try again.".to_string()),
        ]);
        assert_eq!(out, "Cosmo: Hello\n");
        assert_eq!(err, "An error occurred: boom. Please try again.\n");
    }
}
