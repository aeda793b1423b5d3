//! Per-channel strength request accumulation.
//!
//! The wire protocol permits exactly one strength instruction per 100 ms
//! control frame, but producers (game events, panel input) fire much faster.
//! Relative requests accumulate into one signed delta between ticks; an
//! absolute request wins over any accumulated delta in the same tick,
//! regardless of call order.

use crate::convert::clamp_channel_strength;
use crate::protocol::{StrengthInterpretation, CHANNEL_STRENGTH_MAX};

/// The single strength instruction resolved for one outgoing frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrengthInstruction {
    /// Wire interpretation code.
    pub interpretation: StrengthInterpretation,
    /// Magnitude for relative codes, target for absolute, 0 for no-change.
    pub value: u8,
}

impl StrengthInstruction {
    /// The no-op instruction.
    pub const NO_CHANGE: Self = Self {
        interpretation: StrengthInterpretation::NoChange,
        value: 0,
    };
}

/// Accumulates strength requests arriving between ticks.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrengthAccumulator {
    delta: i32,
    absolute: Option<u8>,
}

impl StrengthAccumulator {
    /// Empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a relative request. Positive increases, negative decreases.
    pub fn add_delta(&mut self, delta: i32) {
        self.delta = self.delta.saturating_add(delta);
    }

    /// Request an absolute strength, clamped to [0, limit].
    ///
    /// Discards whatever delta has accumulated for this tick.
    pub fn set_absolute(&mut self, value: u16, limit: u8) {
        self.absolute = Some(clamp_channel_strength(value, limit));
        self.delta = 0;
    }

    /// Whether anything is pending for the next tick.
    pub fn is_pending(&self) -> bool {
        self.absolute.is_some() || self.delta != 0
    }

    /// Resolve the accumulated requests into one instruction and reset.
    ///
    /// An absolute request always wins; otherwise a non-zero delta becomes an
    /// increase/decrease with the magnitude capped at the wire maximum.
    pub fn take_instruction(&mut self) -> StrengthInstruction {
        if let Some(value) = self.absolute.take() {
            self.delta = 0;
            return StrengthInstruction {
                interpretation: StrengthInterpretation::Absolute,
                value,
            };
        }

        let delta = std::mem::take(&mut self.delta);
        match delta {
            0 => StrengthInstruction::NO_CHANGE,
            d if d > 0 => StrengthInstruction {
                interpretation: StrengthInterpretation::Increase,
                value: d.min(CHANNEL_STRENGTH_MAX as i32) as u8,
            },
            d => StrengthInstruction {
                interpretation: StrengthInterpretation::Decrease,
                value: d.unsigned_abs().min(CHANNEL_STRENGTH_MAX as u32) as u8,
            },
        }
    }
}
