//! Streaming transcript rendering.
//!
//! Deltas for the turn already on screen are appended in place; a delta for
//! a new turn starts a fresh line with the speaker label.

use std::io::{self, Write};

use console::style;
use cosmo_voice::Speaker;

/// Label shown before a turn.
pub const fn speaker_label(speaker: Speaker) -> &'static str {
    match speaker {
        Speaker::User => "You",
        Speaker::Model => "Cosmo",
    }
}

/// Writes transcript deltas to a terminal-like sink.
pub struct TranscriptPrinter<W: Write> {
    out: W,
    colored: bool,
    /// Index of the turn whose text is on the current line.
    open_turn: Option<usize>,
}

impl<W: Write> TranscriptPrinter<W> {
    pub const fn new(out: W, colored: bool) -> Self {
        Self {
            out,
            colored,
            open_turn: None,
        }
    }

    /// Render one delta of turn `index`.
    pub fn delta(&mut self, index: usize, speaker: Speaker, delta: &str) -> io::Result<()> {
        if self.open_turn != Some(index) {
            self.finish_line()?;
            let label = speaker_label(speaker);
            let label = match speaker {
                Speaker::User => style(label).blue().bold(),
                Speaker::Model => style(label).magenta().bold(),
            }
            .force_styling(self.colored);
            write!(self.out, "{label}: ")?;
            self.open_turn = Some(index);
        }
        write!(self.out, "{delta}")?;
        self.out.flush()
    }

    /// Terminate the line of the open turn, if any.
    pub fn finish_line(&mut self) -> io::Result<()> {
        if self.open_turn.take().is_some() {
            writeln!(self.out)?;
        }
        Ok(())
    }

    /// Forget the open turn after the transcript was cleared.
    pub fn reset(&mut self) -> io::Result<()> {
        self.finish_line()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
