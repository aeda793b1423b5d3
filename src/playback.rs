//! Per-channel waveform queue and playback state machine.
//!
//! The queue tracks two independent cursors:
//!
//! - `buffer_position` feeds the send loop and may run ahead of what is
//!   reported as playing, absorbing transmission jitter.
//! - `logical_position` is the progress exposed to observers and is advanced
//!   exactly once per tick, staying inside the valid data range.
//!
//! State machine: `Idle` (empty queue) -> `Playing` (data queued) ->
//! `Finished` (Once mode, queue exhausted) -> `Idle` (explicit clear or
//! reload). Loop mode never enters `Finished`.

use crate::pulse::PulseOperation;

/// What happens when the queue runs out of slices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackMode {
    /// Stop at the end of the queue and report finished.
    Once,
    /// Wrap to the start indefinitely.
    #[default]
    Loop,
}

/// Current phase of a channel's playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    /// No waveform data queued.
    #[default]
    Idle,
    /// Slices are being consumed.
    Playing,
    /// Once mode only: the queue has been exhausted.
    Finished,
}

/// Ordered queue of waveform slices with playback-mode semantics.
#[derive(Debug, Clone, Default)]
pub struct PulseQueue {
    ops: Vec<PulseOperation>,
    mode: PlaybackMode,
    state: PlaybackState,
    buffer_position: usize,
    logical_position: usize,
}

impl PulseQueue {
    /// Empty queue in the given mode.
    pub fn new(mode: PlaybackMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Replace the queue contents, resetting both cursors.
    pub fn replace(&mut self, ops: Vec<PulseOperation>) {
        self.ops = ops;
        self.buffer_position = 0;
        self.logical_position = 0;
        self.state = if self.ops.is_empty() {
            PlaybackState::Idle
        } else {
            PlaybackState::Playing
        };
    }

    /// Append slices without touching the cursors, for uninterrupted
    /// continuation of an already-playing stream.
    pub fn append(&mut self, ops: impl IntoIterator<Item = PulseOperation>) {
        self.ops.extend(ops);
        // New data past the old end revives a finished/idle queue.
        if !self.ops.is_empty() && self.buffer_position < self.ops.len() {
            self.state = PlaybackState::Playing;
        }
    }

    /// Drop all data and return to `Idle`.
    pub fn clear(&mut self) {
        self.ops.clear();
        self.buffer_position = 0;
        self.logical_position = 0;
        self.state = PlaybackState::Idle;
    }

    /// Switch playback mode, re-normalizing the cursors into the new mode's
    /// valid range.
    pub fn set_mode(&mut self, mode: PlaybackMode) {
        if self.mode == mode {
            return;
        }
        self.mode = mode;

        let len = self.ops.len();
        if len == 0 {
            return;
        }
        match mode {
            PlaybackMode::Loop => {
                self.logical_position %= len;
                self.buffer_position %= len;
                if self.state == PlaybackState::Finished {
                    self.state = PlaybackState::Playing;
                }
            }
            PlaybackMode::Once => {
                self.logical_position = self.logical_position.min(len - 1);
            }
        }
    }

    /// Take the slice at the buffer cursor and advance it.
    ///
    /// Loop mode wraps at the end; Once mode past the end yields the idle
    /// slice and marks the queue `Finished`. An empty queue always yields the
    /// idle slice.
    pub fn advance_buffer_for_send(&mut self) -> PulseOperation {
        if self.ops.is_empty() {
            return PulseOperation::idle();
        }

        match self.mode {
            PlaybackMode::Loop => {
                let op = self.ops[self.buffer_position % self.ops.len()];
                self.buffer_position = (self.buffer_position + 1) % self.ops.len();
                op
            }
            PlaybackMode::Once => {
                if self.buffer_position < self.ops.len() {
                    let op = self.ops[self.buffer_position];
                    self.buffer_position += 1;
                    op
                } else {
                    self.state = PlaybackState::Finished;
                    PulseOperation::idle()
                }
            }
        }
    }

    /// Advance the observer-facing progress cursor by one slice.
    ///
    /// Independent of [`advance_buffer_for_send`]: the buffer may read ahead
    /// while reported progress moves one step per tick. Once mode saturates
    /// at the last valid index; Loop mode wraps.
    pub fn advance_logical_frame(&mut self) {
        let len = self.ops.len();
        if len == 0 {
            return;
        }
        match self.mode {
            PlaybackMode::Loop => {
                self.logical_position = (self.logical_position + 1) % len;
            }
            PlaybackMode::Once => {
                if self.logical_position < len - 1 {
                    self.logical_position += 1;
                }
            }
        }
    }

    /// True only in Once mode once the buffer is exhausted.
    pub fn is_finished(&self) -> bool {
        self.mode == PlaybackMode::Once && self.state == PlaybackState::Finished
    }

    /// Slice the logical cursor currently points at, if any.
    pub fn current_logical_slice(&self) -> Option<PulseOperation> {
        if self.ops.is_empty() {
            return None;
        }
        Some(self.ops[self.logical_position % self.ops.len()])
    }

    /// Number of queued slices.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the queue holds no data.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Current playback mode.
    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    /// Current playback state.
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Send-side cursor.
    pub fn buffer_position(&self) -> usize {
        self.buffer_position
    }

    /// Observer-side cursor.
    pub fn logical_position(&self) -> usize {
        self.logical_position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slice(freq: u16) -> PulseOperation {
        PulseOperation::new([freq; 4], [50; 4])
    }

    fn three_slices() -> Vec<PulseOperation> {
        vec![slice(20), slice(30), slice(40)]
    }

    #[test]
    fn test_loop_mode_wraps_indices() {
        let mut queue = PulseQueue::new(PlaybackMode::Loop);
        queue.replace(three_slices());

        let seen: Vec<u16> = (0..5)
            .map(|_| queue.advance_buffer_for_send().frequencies[0])
            .collect();
        assert_eq!(seen, vec![20, 30, 40, 20, 30]);
    }

    #[test]
    fn test_loop_never_finishes() {
        let mut queue = PulseQueue::new(PlaybackMode::Loop);
        queue.replace(three_slices());
        for _ in 0..20 {
            queue.advance_buffer_for_send();
            queue.advance_logical_frame();
            assert!(!queue.is_finished());
        }
        assert_eq!(queue.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_once_finishes_exactly_once_then_idles() {
        let mut queue = PulseQueue::new(PlaybackMode::Once);
        queue.replace(three_slices());

        for expected in [20, 30, 40] {
            let op = queue.advance_buffer_for_send();
            assert_eq!(op.frequencies[0], expected);
            assert!(!queue.is_finished());
        }

        // Past the end: idle slice, finished.
        let op = queue.advance_buffer_for_send();
        assert_eq!(op, PulseOperation::idle());
        assert!(queue.is_finished());

        // Stays finished and keeps yielding the idle slice.
        for _ in 0..3 {
            assert_eq!(queue.advance_buffer_for_send(), PulseOperation::idle());
            assert!(queue.is_finished());
        }
    }

    #[test]
    fn test_empty_queue_yields_idle_and_stays_idle() {
        let mut queue = PulseQueue::new(PlaybackMode::Once);
        assert_eq!(queue.advance_buffer_for_send(), PulseOperation::idle());
        assert_eq!(queue.state(), PlaybackState::Idle);
        assert!(!queue.is_finished());
    }

    #[test]
    fn test_replace_resets_positions() {
        let mut queue = PulseQueue::new(PlaybackMode::Loop);
        queue.replace(three_slices());
        queue.advance_buffer_for_send();
        queue.advance_logical_frame();
        assert_eq!(queue.buffer_position(), 1);

        queue.replace(vec![slice(99)]);
        assert_eq!(queue.buffer_position(), 0);
        assert_eq!(queue.logical_position(), 0);
        assert_eq!(queue.advance_buffer_for_send().frequencies[0], 99);
    }

    #[test]
    fn test_append_preserves_positions() {
        let mut queue = PulseQueue::new(PlaybackMode::Once);
        queue.replace(three_slices());
        queue.advance_buffer_for_send();
        queue.advance_buffer_for_send();
        assert_eq!(queue.buffer_position(), 2);

        queue.append([slice(50)]);
        assert_eq!(queue.buffer_position(), 2);
        assert_eq!(queue.len(), 4);
        assert_eq!(queue.advance_buffer_for_send().frequencies[0], 40);
        assert_eq!(queue.advance_buffer_for_send().frequencies[0], 50);
    }

    #[test]
    fn test_append_revives_finished_queue() {
        let mut queue = PulseQueue::new(PlaybackMode::Once);
        queue.replace(vec![slice(20)]);
        queue.advance_buffer_for_send();
        queue.advance_buffer_for_send();
        assert!(queue.is_finished());

        queue.append([slice(60)]);
        assert_eq!(queue.state(), PlaybackState::Playing);
        assert_eq!(queue.advance_buffer_for_send().frequencies[0], 60);
    }

    #[test]
    fn test_logical_cursor_independent_of_buffer() {
        let mut queue = PulseQueue::new(PlaybackMode::Once);
        queue.replace(three_slices());

        // Buffer reads ahead two slices before progress moves at all.
        queue.advance_buffer_for_send();
        queue.advance_buffer_for_send();
        assert_eq!(queue.buffer_position(), 2);
        assert_eq!(queue.logical_position(), 0);

        queue.advance_logical_frame();
        assert_eq!(queue.logical_position(), 1);
    }

    #[test]
    fn test_logical_cursor_saturates_in_once_mode() {
        let mut queue = PulseQueue::new(PlaybackMode::Once);
        queue.replace(three_slices());
        for _ in 0..10 {
            queue.advance_logical_frame();
        }
        assert_eq!(queue.logical_position(), 2);
    }

    #[test]
    fn test_logical_cursor_wraps_in_loop_mode() {
        let mut queue = PulseQueue::new(PlaybackMode::Loop);
        queue.replace(three_slices());
        for _ in 0..4 {
            queue.advance_logical_frame();
        }
        assert_eq!(queue.logical_position(), 1);
    }

    #[test]
    fn test_mode_switch_renormalizes_cursors() {
        let mut queue = PulseQueue::new(PlaybackMode::Once);
        queue.replace(three_slices());
        for _ in 0..4 {
            queue.advance_buffer_for_send();
        }
        assert!(queue.is_finished());
        assert_eq!(queue.buffer_position(), 3);

        queue.set_mode(PlaybackMode::Loop);
        assert!(!queue.is_finished());
        assert_eq!(queue.state(), PlaybackState::Playing);
        assert_eq!(queue.advance_buffer_for_send().frequencies[0], 20);
    }

    #[test]
    fn test_clear_returns_to_idle() {
        let mut queue = PulseQueue::new(PlaybackMode::Loop);
        queue.replace(three_slices());
        queue.advance_buffer_for_send();
        queue.clear();
        assert_eq!(queue.state(), PlaybackState::Idle);
        assert!(queue.is_empty());
        assert_eq!(queue.buffer_position(), 0);
    }
}
