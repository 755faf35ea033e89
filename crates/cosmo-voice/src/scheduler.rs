//! Gapless playback scheduling for inbound speech chunks.
//!
//! Chunks arrive asynchronously and must play back-to-back in arrival order.
//! A single cursor (`next_start_time`) marks where the next chunk begins on
//! the output clock; the set of active [`PlaybackId`]s tracks what is still
//! audible and therefore whether the model is "speaking".

use std::collections::HashSet;
use std::fmt;

use crate::audio_io::AudioSink;
use crate::codec::AudioBuffer;
use crate::error::VoiceError;

/// Handle to one scheduled chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaybackId(u64);

impl PlaybackId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw numeric id.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PlaybackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Schedules decoded chunks on an [`AudioSink`] without gaps or overlaps.
pub struct PlaybackScheduler {
    sink: Box<dyn AudioSink>,
    next_start_time: f64,
    active: HashSet<PlaybackId>,
    next_id: u64,
}

impl PlaybackScheduler {
    /// Create a scheduler that owns `sink`.
    pub fn new(sink: Box<dyn AudioSink>) -> Self {
        Self {
            sink,
            next_start_time: 0.0,
            active: HashSet::new(),
            next_id: 0,
        }
    }

    /// Queue `buffer` directly after everything already scheduled.
    ///
    /// Never schedules in the past: if the output clock has overtaken the
    /// cursor, the chunk starts now.
    pub fn schedule_chunk(&mut self, buffer: AudioBuffer) -> Result<PlaybackId, VoiceError> {
        let start_at = self.next_start_time.max(self.sink.current_time());
        let duration = buffer.duration_secs();

        let id = PlaybackId(self.next_id);
        self.next_id += 1;

        self.sink.schedule(id, buffer, start_at)?;
        self.next_start_time = start_at + duration;
        self.active.insert(id);

        tracing::trace!(%id, start_at, duration, "Scheduled playback chunk");
        Ok(id)
    }

    /// Record that `id` played to the end.
    ///
    /// Returns `true` if the id was active.
    pub fn on_ended(&mut self, id: PlaybackId) -> bool {
        self.active.remove(&id)
    }

    /// Stop everything immediately and rewind the cursor.
    pub fn interrupt(&mut self) {
        let stopped = self.active.len();
        for id in self.active.drain() {
            self.sink.stop(id);
        }
        self.next_start_time = 0.0;
        tracing::debug!(stopped, "Playback interrupted");
    }

    /// Release everything still scheduled on the sink.
    pub fn teardown(&mut self) {
        self.sink.stop_all();
        self.active.clear();
    }

    /// Whether any scheduled chunk is still audible.
    pub fn is_speaking(&self) -> bool {
        !self.active.is_empty()
    }

    /// Number of chunks scheduled or playing.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Where the next chunk will start if the clock has not caught up.
    pub const fn next_start_time(&self) -> f64 {
        self.next_start_time
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Default)]
    struct SinkLog {
        now: f64,
        scheduled: Vec<(PlaybackId, f64, f64)>,
        stopped: Vec<PlaybackId>,
        stop_all_calls: usize,
    }

    #[derive(Clone, Default)]
    struct ManualSink(Arc<Mutex<SinkLog>>);

    impl ManualSink {
        fn set_now(&self, now: f64) {
            self.0.lock().unwrap().now = now;
        }

        fn starts(&self) -> Vec<f64> {
            self.0.lock().unwrap().scheduled.iter().map(|s| s.1).collect()
        }
    }

    impl AudioSink for ManualSink {
        fn current_time(&self) -> f64 {
            self.0.lock().unwrap().now
        }

        fn schedule(
            &self,
            id: PlaybackId,
            buffer: AudioBuffer,
            start_at: f64,
        ) -> Result<(), VoiceError> {
            self.0
                .lock()
                .unwrap()
                .scheduled
                .push((id, start_at, buffer.duration_secs()));
            Ok(())
        }

        fn stop(&self, id: PlaybackId) {
            self.0.lock().unwrap().stopped.push(id);
        }

        fn stop_all(&self) {
            self.0.lock().unwrap().stop_all_calls += 1;
        }
    }

    fn chunk(frames: usize) -> AudioBuffer {
        AudioBuffer {
            samples: vec![0.0; frames],
            sample_rate: 1_000,
            channels: 1,
        }
    }

    fn scheduler() -> (PlaybackScheduler, ManualSink) {
        let sink = ManualSink::default();
        (PlaybackScheduler::new(Box::new(sink.clone())), sink)
    }

    #[test]
    fn starts_idle() {
        let (scheduler, _) = scheduler();
        assert!(!scheduler.is_speaking());
        assert!(scheduler.next_start_time().abs() < f64::EPSILON);
    }

    #[test]
    fn chunks_play_back_to_back_while_clock_lags() {
        let (mut scheduler, sink) = scheduler();
        sink.set_now(1.0);

        for frames in [500, 250, 1_000] {
            scheduler.schedule_chunk(chunk(frames)).unwrap();
        }

        assert_eq!(sink.starts(), vec![1.0, 1.5, 1.75]);
        assert!((scheduler.next_start_time() - 2.75).abs() < 1e-9);
        assert_eq!(scheduler.active_count(), 3);
    }

    #[test]
    fn never_schedules_in_the_past() {
        let (mut scheduler, sink) = scheduler();
        scheduler.schedule_chunk(chunk(100)).unwrap();

        // The clock ran past the cursor (stream went quiet).
        sink.set_now(5.0);
        scheduler.schedule_chunk(chunk(100)).unwrap();

        assert_eq!(sink.starts(), vec![0.0, 5.0]);
    }

    #[test]
    fn speaking_clears_when_last_chunk_ends() {
        let (mut scheduler, _) = scheduler();
        let first = scheduler.schedule_chunk(chunk(10)).unwrap();
        let second = scheduler.schedule_chunk(chunk(10)).unwrap();

        assert!(scheduler.on_ended(first));
        assert!(scheduler.is_speaking());

        assert!(scheduler.on_ended(second));
        assert!(!scheduler.is_speaking());
    }

    #[test]
    fn unknown_completion_is_ignored() {
        let (mut scheduler, _) = scheduler();
        assert!(!scheduler.on_ended(PlaybackId(42)));
        assert!(!scheduler.is_speaking());
    }

    #[test]
    fn interrupt_stops_every_active_chunk() {
        for count in [0_usize, 1, 5] {
            let (mut scheduler, sink) = scheduler();
            sink.set_now(2.0);
            for _ in 0..count {
                scheduler.schedule_chunk(chunk(100)).unwrap();
            }

            scheduler.interrupt();

            assert!(!scheduler.is_speaking());
            assert_eq!(scheduler.active_count(), 0);
            assert!(scheduler.next_start_time().abs() < f64::EPSILON);
            assert_eq!(sink.0.lock().unwrap().stopped.len(), count);
        }
    }

    #[test]
    fn chunk_after_interrupt_starts_at_clock() {
        let (mut scheduler, sink) = scheduler();
        sink.set_now(3.0);
        scheduler.schedule_chunk(chunk(1_000)).unwrap();
        scheduler.interrupt();

        scheduler.schedule_chunk(chunk(100)).unwrap();
        assert_eq!(sink.starts(), vec![3.0, 3.0]);
    }

    #[test]
    fn teardown_releases_sink() {
        let (mut scheduler, sink) = scheduler();
        scheduler.schedule_chunk(chunk(100)).unwrap();
        scheduler.teardown();

        assert!(!scheduler.is_speaking());
        assert_eq!(sink.0.lock().unwrap().stop_all_calls, 1);
    }
}
