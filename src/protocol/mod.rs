//! Wire protocol: frame types, codec, and the inbound response scanner.

mod scanner;
mod wire;

pub use scanner::ResponseScanner;
pub use wire::{
    ControlFrame, DeviceParamsFrame, ResponseFrame, SequenceNumber, StrengthInterpretation,
    BALANCE_DEFAULT, CHANNEL_STRENGTH_MAX, CONTROL_FRAME_SIZE, CONTROL_FRAME_TYPE,
    DEVICE_FREQUENCY_MAX, DEVICE_FREQUENCY_MIN, DEVICE_PARAMS_FRAME_SIZE,
    DEVICE_PARAMS_FRAME_TYPE, PULSE_STRENGTH_MAX, RESPONSE_FRAME_SIZE, RESPONSE_FRAME_TYPE,
    SEQUENCE_MODULUS,
};
