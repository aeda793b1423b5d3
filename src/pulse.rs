//! Waveform slice type.

use crate::convert::{self, clamp_pulse_strength};
use crate::error::ValidationError;

/// One 100 ms waveform slice for a single channel: four frequency values and
/// four strength values at 25 ms granularity.
///
/// Frequencies are user-facing units (10-1000) and are converted to device
/// units when the slice is encoded; strengths are 0-100 and are clamped, not
/// rejected, at that point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseOperation {
    /// Frequency per 25 ms step, user units.
    pub frequencies: [u16; 4],
    /// Strength per 25 ms step, 0-100.
    pub strengths: [u8; 4],
}

impl PulseOperation {
    /// Build a slice from raw components.
    pub const fn new(frequencies: [u16; 4], strengths: [u8; 4]) -> Self {
        Self {
            frequencies,
            strengths,
        }
    }

    /// The idle slice: minimum frequency, zero output.
    ///
    /// Sent whenever a channel has nothing to play.
    pub const fn idle() -> Self {
        Self {
            frequencies: [10, 10, 10, 10],
            strengths: [0, 0, 0, 0],
        }
    }

    /// Whether this slice produces no output.
    pub fn is_silent(&self) -> bool {
        self.strengths == [0, 0, 0, 0]
    }

    /// Check that every frequency is inside the convertible range.
    ///
    /// Used at enqueue time so bad input is rejected before it can reach the
    /// send loop.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for freq in self.frequencies {
            convert::frequency_to_device(freq)?;
        }
        Ok(())
    }

    /// Convert to device units: `(frequencies, strengths)` ready to encode.
    ///
    /// Frequencies fail on out-of-range values; strengths are clamped.
    pub fn to_device_units(&self) -> Result<([u8; 4], [u8; 4]), ValidationError> {
        let mut freq = [0u8; 4];
        let mut amp = [0u8; 4];
        for i in 0..4 {
            freq[i] = convert::frequency_to_device(self.frequencies[i])?;
            amp[i] = clamp_pulse_strength(self.strengths[i]);
        }
        Ok((freq, amp))
    }
}

impl Default for PulseOperation {
    fn default() -> Self {
        Self::idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_slice_shape() {
        let idle = PulseOperation::idle();
        assert_eq!(idle.frequencies, [10, 10, 10, 10]);
        assert_eq!(idle.strengths, [0, 0, 0, 0]);
        assert!(idle.is_silent());
    }

    #[test]
    fn test_validate_rejects_bad_frequency() {
        let op = PulseOperation::new([10, 5, 10, 10], [0, 0, 0, 0]);
        assert!(op.validate().is_err());
    }

    #[test]
    fn test_to_device_units_converts_and_clamps() {
        let op = PulseOperation::new([100, 600, 1000, 10], [50, 100, 120, 0]);
        let (freq, amp) = op.to_device_units().unwrap();
        assert_eq!(freq, [100, 200, 240, 10]);
        assert_eq!(amp, [50, 100, 100, 0]);
    }

    #[test]
    fn test_to_device_units_rejects_frequency() {
        let op = PulseOperation::new([1001, 10, 10, 10], [0, 0, 0, 0]);
        assert!(op.to_device_units().is_err());
    }
}
