//! Channel identifiers and per-channel state.
//!
//! Channels A and B are fully independent: each owns its own queue,
//! accumulator, and acknowledgment bookkeeping. The live [`ChannelState`] is
//! owned exclusively by the session task; callers observe it through cheap
//! [`ChannelSnapshot`] copies.

use crate::convert::clamp_channel_strength;
use crate::playback::{PlaybackMode, PlaybackState, PulseQueue};
use crate::protocol::{DeviceParamsFrame, SequenceNumber, SEQUENCE_MODULUS};
use crate::pulse::PulseOperation;
use crate::strength::StrengthAccumulator;

/// One of the two stimulation outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Channel A.
    A,
    /// Channel B.
    B,
}

impl Channel {
    /// Both channels, A first.
    pub const ALL: [Channel; 2] = [Channel::A, Channel::B];

    /// Stable array index (A = 0, B = 1).
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Channel::A => 0,
            Channel::B => 1,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::A => write!(f, "A"),
            Channel::B => write!(f, "B"),
        }
    }
}

/// Strength instruction sent but not yet acknowledged by the device.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PendingAck {
    /// Sequence number of the control frame that carried the instruction.
    pub seq: SequenceNumber,
    /// Control frames sent since, for staleness detection.
    pub age: u8,
}

impl PendingAck {
    /// A pending acknowledgment older than one full sequence wrap can no
    /// longer be correlated and is treated as lost.
    pub fn is_expired(&self) -> bool {
        self.age >= SEQUENCE_MODULUS
    }
}

/// Live state of one channel, owned by the session task.
#[derive(Debug)]
pub(crate) struct ChannelState {
    /// Device-reported output strength (0-200).
    pub current_strength: u8,
    /// Configured safety ceiling (0-200).
    pub strength_limit: u8,
    /// Device-side frequency shaping byte.
    pub frequency_balance: u8,
    /// Device-side strength shaping byte.
    pub strength_balance: u8,
    /// Queued waveform slices.
    pub queue: PulseQueue,
    /// Pending strength requests.
    pub accumulator: StrengthAccumulator,
    /// Outstanding strength instruction awaiting a device echo.
    pub pending_ack: Option<PendingAck>,
}

impl ChannelState {
    pub fn new(params: &DeviceParamsFrame, channel: Channel) -> Self {
        let (limit, freq_balance, strength_balance) = match channel {
            Channel::A => (
                params.strength_limit_a,
                params.freq_balance_a,
                params.strength_balance_a,
            ),
            Channel::B => (
                params.strength_limit_b,
                params.freq_balance_b,
                params.strength_balance_b,
            ),
        };
        Self {
            current_strength: 0,
            strength_limit: limit,
            frequency_balance: freq_balance,
            strength_balance,
            queue: PulseQueue::new(PlaybackMode::default()),
            accumulator: StrengthAccumulator::new(),
            pending_ack: None,
        }
    }

    /// Apply the per-channel fields of a device-parameters frame.
    pub fn apply_params(&mut self, params: &DeviceParamsFrame, channel: Channel) {
        match channel {
            Channel::A => {
                self.strength_limit = params.strength_limit_a;
                self.frequency_balance = params.freq_balance_a;
                self.strength_balance = params.strength_balance_a;
            }
            Channel::B => {
                self.strength_limit = params.strength_limit_b;
                self.frequency_balance = params.freq_balance_b;
                self.strength_balance = params.strength_balance_b;
            }
        }
        // Tightening the limit pulls the tracked strength down with it.
        self.current_strength = clamp_channel_strength(self.current_strength as u16, self.strength_limit);
    }

    /// Refresh from a device strength echo. Returns true when the value
    /// actually changed.
    pub fn refresh_strength(&mut self, reported: u8) -> bool {
        let clamped = clamp_channel_strength(reported as u16, self.strength_limit);
        let changed = clamped != self.current_strength;
        self.current_strength = clamped;
        self.pending_ack = None;
        changed
    }

    /// Point-in-time view of this channel.
    pub fn snapshot(&self) -> ChannelSnapshot {
        ChannelSnapshot {
            current_strength: self.current_strength,
            strength_limit: self.strength_limit,
            frequency_balance: self.frequency_balance,
            strength_balance: self.strength_balance,
            playback_mode: self.queue.mode(),
            playback_state: self.queue.state(),
            queue_len: self.queue.len(),
            buffer_position: self.queue.buffer_position(),
            logical_position: self.queue.logical_position(),
            current_slice: self.queue.current_logical_slice(),
        }
    }
}

/// Point-in-time copy of one channel's observable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelSnapshot {
    /// Device-reported output strength (0-200).
    pub current_strength: u8,
    /// Configured safety ceiling (0-200).
    pub strength_limit: u8,
    /// Device-side frequency shaping byte.
    pub frequency_balance: u8,
    /// Device-side strength shaping byte.
    pub strength_balance: u8,
    /// Current playback mode.
    pub playback_mode: PlaybackMode,
    /// Current playback phase.
    pub playback_state: PlaybackState,
    /// Number of queued slices.
    pub queue_len: usize,
    /// Send-side cursor.
    pub buffer_position: usize,
    /// Observer-side progress cursor.
    pub logical_position: usize,
    /// Slice under the progress cursor, `None` when the queue is empty.
    pub current_slice: Option<PulseOperation>,
}
