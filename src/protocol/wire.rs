//! Wire format encoding and decoding for the V3 command stream.
//!
//! Three frame shapes exist on the wire:
//!
//! ```text
//! ControlFrame (20 bytes, sent every tick):
//! ┌──────┬─────────────────┬────────┬────────┬─────────┬────────┬─────────┬────────┐
//! │ 0xB0 │ seq(4b) ia ib   │ str A  │ str B  │ freqA[4]│ ampA[4]│ freqB[4]│ ampB[4]│
//! │ 1 B  │ (2b)(2b) 1 B    │ 1 B    │ 1 B    │ 4 B     │ 4 B    │ 4 B     │ 4 B    │
//! └──────┴─────────────────┴────────┴────────┴─────────┴────────┴─────────┴────────┘
//!
//! DeviceParamsFrame (7 bytes, sent on start and on change):
//! 0xBF | limit A | limit B | freq bal A | freq bal B | str bal A | str bal B
//!
//! ResponseFrame (4 bytes, device -> host):
//! 0xB1 | strength A | strength B | reserved
//! ```
//!
//! All functions here are pure transformations. Every field is range-checked
//! before bit-packing; frequency values are never silently truncated.

use crate::error::{ProtocolError, ValidationError};

/// Leading type byte of a control frame.
pub const CONTROL_FRAME_TYPE: u8 = 0xB0;
/// Leading type byte of a response frame.
pub const RESPONSE_FRAME_TYPE: u8 = 0xB1;
/// Leading type byte of a device-parameters frame.
pub const DEVICE_PARAMS_FRAME_TYPE: u8 = 0xBF;

/// Control frame size in bytes (fixed, exactly 20).
pub const CONTROL_FRAME_SIZE: usize = 20;
/// Response frame size in bytes (fixed, exactly 4).
pub const RESPONSE_FRAME_SIZE: usize = 4;
/// Device-parameters frame size in bytes (fixed, exactly 7).
pub const DEVICE_PARAMS_FRAME_SIZE: usize = 7;

/// Maximum channel strength / strength limit in device units.
pub const CHANNEL_STRENGTH_MAX: u8 = 200;
/// Maximum per-slice pulse amplitude in device units.
pub const PULSE_STRENGTH_MAX: u8 = 100;
/// Minimum pulse frequency in device units.
pub const DEVICE_FREQUENCY_MIN: u8 = 10;
/// Maximum pulse frequency in device units.
pub const DEVICE_FREQUENCY_MAX: u8 = 240;
/// Default balance parameter shipped by the device firmware.
pub const BALANCE_DEFAULT: u8 = 100;

/// How the device interprets the strength byte of a control frame.
///
/// Mirrors the 2-bit wire field, one per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrengthInterpretation {
    /// Leave the channel strength untouched.
    #[default]
    NoChange,
    /// Add the strength byte to the current value.
    Increase,
    /// Subtract the strength byte from the current value.
    Decrease,
    /// Replace the current value with the strength byte.
    Absolute,
}

impl StrengthInterpretation {
    /// Two-bit wire encoding.
    #[inline]
    pub fn bits(self) -> u8 {
        match self {
            Self::NoChange => 0b00,
            Self::Increase => 0b01,
            Self::Decrease => 0b10,
            Self::Absolute => 0b11,
        }
    }

    /// Decode from the two low bits of `bits`.
    #[inline]
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => Self::NoChange,
            0b01 => Self::Increase,
            0b10 => Self::Decrease,
            _ => Self::Absolute,
        }
    }
}

/// 4-bit rolling frame counter, wrapping 15 -> 0.
///
/// Strictly increases (mod 16) with each outgoing control frame, giving a
/// total order usable to detect stale acknowledgments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SequenceNumber(u8);

/// Number of distinct sequence values before the counter wraps.
pub const SEQUENCE_MODULUS: u8 = 16;

impl SequenceNumber {
    /// Counter starting at zero.
    pub const ZERO: Self = Self(0);

    /// Build from a raw value, rejecting anything that does not fit 4 bits.
    pub fn new(value: u8) -> Result<Self, ValidationError> {
        if value >= SEQUENCE_MODULUS {
            return Err(ValidationError::out_of_range(
                "sequence number",
                value,
                0,
                (SEQUENCE_MODULUS - 1) as i64,
            ));
        }
        Ok(Self(value))
    }

    /// Raw 4-bit value.
    #[inline]
    pub fn value(self) -> u8 {
        self.0
    }

    /// Return the current value and step the counter forward.
    #[inline]
    pub fn next(&mut self) -> Self {
        let current = *self;
        self.0 = (self.0 + 1) % SEQUENCE_MODULUS;
        current
    }

    /// Frames between `self` and `later`, walking forward mod 16.
    #[inline]
    pub fn distance_to(self, later: Self) -> u8 {
        (later.0 + SEQUENCE_MODULUS - self.0) % SEQUENCE_MODULUS
    }
}

impl std::fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One outgoing 20-byte control frame: strength instruction plus one 100 ms
/// waveform slice per channel, all in device units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlFrame {
    /// Rolling frame counter.
    pub seq: SequenceNumber,
    /// How the device reads `strength_a`.
    pub interpretation_a: StrengthInterpretation,
    /// How the device reads `strength_b`.
    pub interpretation_b: StrengthInterpretation,
    /// Channel A strength byte (0-200).
    pub strength_a: u8,
    /// Channel B strength byte (0-200).
    pub strength_b: u8,
    /// Channel A frequencies, device units (10-240), 25 ms granularity.
    pub frequency_a: [u8; 4],
    /// Channel A amplitudes (0-100), 25 ms granularity.
    pub amplitude_a: [u8; 4],
    /// Channel B frequencies, device units (10-240).
    pub frequency_b: [u8; 4],
    /// Channel B amplitudes (0-100).
    pub amplitude_b: [u8; 4],
}

impl ControlFrame {
    /// Encode into the 20-byte wire representation.
    ///
    /// Every field is validated before packing; an out-of-range frequency or
    /// strength fails with [`ValidationError`] rather than being truncated.
    pub fn encode(&self) -> Result<[u8; CONTROL_FRAME_SIZE], ValidationError> {
        self.validate()?;

        let mut buf = [0u8; CONTROL_FRAME_SIZE];
        buf[0] = CONTROL_FRAME_TYPE;
        buf[1] = (self.seq.value() << 4)
            | (self.interpretation_a.bits() << 2)
            | self.interpretation_b.bits();
        buf[2] = self.strength_a;
        buf[3] = self.strength_b;
        buf[4..8].copy_from_slice(&self.frequency_a);
        buf[8..12].copy_from_slice(&self.amplitude_a);
        buf[12..16].copy_from_slice(&self.frequency_b);
        buf[16..20].copy_from_slice(&self.amplitude_b);
        Ok(buf)
    }

    /// Decode from the 20-byte wire representation.
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() != CONTROL_FRAME_SIZE {
            return Err(ProtocolError::Malformed(format!(
                "control frame must be {} bytes, got {}",
                CONTROL_FRAME_SIZE,
                buf.len()
            )));
        }
        if buf[0] != CONTROL_FRAME_TYPE {
            return Err(ProtocolError::Malformed(format!(
                "expected control frame type {CONTROL_FRAME_TYPE:#04X}, got {:#04X}",
                buf[0]
            )));
        }

        let seq = SequenceNumber((buf[1] >> 4) & 0x0F);
        let mut frequency_a = [0u8; 4];
        let mut amplitude_a = [0u8; 4];
        let mut frequency_b = [0u8; 4];
        let mut amplitude_b = [0u8; 4];
        frequency_a.copy_from_slice(&buf[4..8]);
        amplitude_a.copy_from_slice(&buf[8..12]);
        frequency_b.copy_from_slice(&buf[12..16]);
        amplitude_b.copy_from_slice(&buf[16..20]);

        Ok(Self {
            seq,
            interpretation_a: StrengthInterpretation::from_bits(buf[1] >> 2),
            interpretation_b: StrengthInterpretation::from_bits(buf[1]),
            strength_a: buf[2],
            strength_b: buf[3],
            frequency_a,
            amplitude_a,
            frequency_b,
            amplitude_b,
        })
    }

    fn validate(&self) -> Result<(), ValidationError> {
        for strength in [self.strength_a, self.strength_b] {
            if strength > CHANNEL_STRENGTH_MAX {
                return Err(ValidationError::out_of_range(
                    "channel strength",
                    strength,
                    0,
                    CHANNEL_STRENGTH_MAX as i64,
                ));
            }
        }
        for freq in self
            .frequency_a
            .iter()
            .chain(self.frequency_b.iter())
            .copied()
        {
            if !(DEVICE_FREQUENCY_MIN..=DEVICE_FREQUENCY_MAX).contains(&freq) {
                return Err(ValidationError::out_of_range(
                    "pulse frequency",
                    freq,
                    DEVICE_FREQUENCY_MIN as i64,
                    DEVICE_FREQUENCY_MAX as i64,
                ));
            }
        }
        for amp in self
            .amplitude_a
            .iter()
            .chain(self.amplitude_b.iter())
            .copied()
        {
            if amp > PULSE_STRENGTH_MAX {
                return Err(ValidationError::out_of_range(
                    "pulse amplitude",
                    amp,
                    0,
                    PULSE_STRENGTH_MAX as i64,
                ));
            }
        }
        Ok(())
    }
}

/// Per-channel strength limits and balance tuning, carried by the 7-byte
/// 0xBF frame. Sent once on session start and whenever the caller changes
/// them; the device applies the limits to subsequent control frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceParamsFrame {
    /// Channel A strength ceiling (0-200).
    pub strength_limit_a: u8,
    /// Channel B strength ceiling (0-200).
    pub strength_limit_b: u8,
    /// Channel A frequency balance byte, opaque device-side shaping.
    pub freq_balance_a: u8,
    /// Channel B frequency balance byte.
    pub freq_balance_b: u8,
    /// Channel A strength balance byte.
    pub strength_balance_a: u8,
    /// Channel B strength balance byte.
    pub strength_balance_b: u8,
}

impl Default for DeviceParamsFrame {
    fn default() -> Self {
        Self {
            strength_limit_a: CHANNEL_STRENGTH_MAX,
            strength_limit_b: CHANNEL_STRENGTH_MAX,
            freq_balance_a: BALANCE_DEFAULT,
            freq_balance_b: BALANCE_DEFAULT,
            strength_balance_a: BALANCE_DEFAULT,
            strength_balance_b: BALANCE_DEFAULT,
        }
    }
}

impl DeviceParamsFrame {
    /// Encode into the 7-byte wire representation.
    ///
    /// Balance bytes cover the full 0-255 range; only the strength limits
    /// are range-checked.
    pub fn encode(&self) -> Result<[u8; DEVICE_PARAMS_FRAME_SIZE], ValidationError> {
        for limit in [self.strength_limit_a, self.strength_limit_b] {
            if limit > CHANNEL_STRENGTH_MAX {
                return Err(ValidationError::out_of_range(
                    "strength limit",
                    limit,
                    0,
                    CHANNEL_STRENGTH_MAX as i64,
                ));
            }
        }

        Ok([
            DEVICE_PARAMS_FRAME_TYPE,
            self.strength_limit_a,
            self.strength_limit_b,
            self.freq_balance_a,
            self.freq_balance_b,
            self.strength_balance_a,
            self.strength_balance_b,
        ])
    }

    /// Decode from the 7-byte wire representation.
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() != DEVICE_PARAMS_FRAME_SIZE {
            return Err(ProtocolError::Malformed(format!(
                "device params frame must be {} bytes, got {}",
                DEVICE_PARAMS_FRAME_SIZE,
                buf.len()
            )));
        }
        if buf[0] != DEVICE_PARAMS_FRAME_TYPE {
            return Err(ProtocolError::Malformed(format!(
                "expected device params frame type {DEVICE_PARAMS_FRAME_TYPE:#04X}, got {:#04X}",
                buf[0]
            )));
        }
        Ok(Self {
            strength_limit_a: buf[1],
            strength_limit_b: buf[2],
            freq_balance_a: buf[3],
            freq_balance_b: buf[4],
            strength_balance_a: buf[5],
            strength_balance_b: buf[6],
        })
    }
}

/// Device status echo: the actual output strength of both channels.
///
/// Arrives both as acknowledgment of strength instructions and unsolicited
/// when the user adjusts strength on the device itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseFrame {
    /// Channel A strength as reported by the device.
    pub strength_a: u8,
    /// Channel B strength as reported by the device.
    pub strength_b: u8,
}

impl ResponseFrame {
    /// Decode from the 4-byte wire representation.
    ///
    /// The trailing byte is reserved and ignored.
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() != RESPONSE_FRAME_SIZE {
            return Err(ProtocolError::Malformed(format!(
                "response frame must be {} bytes, got {}",
                RESPONSE_FRAME_SIZE,
                buf.len()
            )));
        }
        if buf[0] != RESPONSE_FRAME_TYPE {
            return Err(ProtocolError::Malformed(format!(
                "expected response frame type {RESPONSE_FRAME_TYPE:#04X}, got {:#04X}",
                buf[0]
            )));
        }
        Ok(Self {
            strength_a: buf[1],
            strength_b: buf[2],
        })
    }

    /// Encode into the 4-byte wire representation (device side / tests).
    pub fn encode(&self) -> [u8; RESPONSE_FRAME_SIZE] {
        [RESPONSE_FRAME_TYPE, self.strength_a, self.strength_b, 0]
    }
}
