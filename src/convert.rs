//! Frequency domain conversion and strength clamping.
//!
//! Waveforms are authored in user-facing frequency units (10-1000); the
//! device speaks a compressed 10-240 scale. The mapping is piecewise linear
//! with coarser resolution at higher frequencies:
//!
//! ```text
//! [10, 100]    -> identity
//! [101, 600]   -> (v - 100) / 5 + 100
//! [601, 1000]  -> (v - 600) / 10 + 200
//! ```
//!
//! Out-of-range frequencies are rejected, never clamped. Strengths are the
//! opposite: they are clamped, never rejected, so a misbehaving caller can
//! never push output past a configured safety ceiling.

use crate::error::ValidationError;
use crate::protocol::{CHANNEL_STRENGTH_MAX, PULSE_STRENGTH_MAX};

/// Minimum user-facing frequency.
pub const INPUT_FREQUENCY_MIN: u16 = 10;
/// Maximum user-facing frequency.
pub const INPUT_FREQUENCY_MAX: u16 = 1000;

/// Convert a user-facing frequency into device units (10-240).
///
/// Fails with [`ValidationError::OutOfRange`] for anything outside
/// [10, 1000]; the value is never silently clamped.
pub fn frequency_to_device(freq: u16) -> Result<u8, ValidationError> {
    match freq {
        10..=100 => Ok(freq as u8),
        101..=600 => Ok(((freq - 100) / 5 + 100) as u8),
        601..=1000 => Ok(((freq - 600) / 10 + 200) as u8),
        _ => Err(ValidationError::out_of_range(
            "frequency",
            freq,
            INPUT_FREQUENCY_MIN as i64,
            INPUT_FREQUENCY_MAX as i64,
        )),
    }
}

/// Inverse of [`frequency_to_device`], for progress display and telemetry.
///
/// The forward mapping is lossy, so this returns the lowest user-facing
/// frequency in each device bucket. Values below the device minimum map to
/// the minimum.
pub fn device_to_frequency(device: u8) -> u16 {
    match device {
        0..=100 => (device as u16).max(INPUT_FREQUENCY_MIN),
        101..=200 => (device as u16 - 100) * 5 + 100,
        201..=240 => (device as u16 - 200) * 10 + 600,
        _ => INPUT_FREQUENCY_MAX,
    }
}

/// Clamp a per-slice pulse strength into [0, 100].
#[inline]
pub fn clamp_pulse_strength(strength: u8) -> u8 {
    strength.min(PULSE_STRENGTH_MAX)
}

/// Clamp an absolute channel strength into [0, min(limit, 200)].
///
/// The configured per-channel limit is always honored, even when the caller
/// passes a larger value.
#[inline]
pub fn clamp_channel_strength(strength: u16, limit: u8) -> u8 {
    let ceiling = limit.min(CHANNEL_STRENGTH_MAX);
    strength.min(ceiling as u16) as u8
}
