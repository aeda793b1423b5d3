//! # pulselink
//!
//! Device-protocol engine for a two-channel electro-stimulation peripheral
//! driven over a periodic 100 ms command stream.
//!
//! The device forgets everything it is not told every tick: the host streams
//! one 20-byte control frame per 100 ms carrying, per channel, one strength
//! instruction and one waveform slice (4 frequency + 4 amplitude bytes at
//! 25 ms granularity). The device answers with 4-byte strength reports,
//! including unsolicited ones when its own buttons change the strength.
//!
//! ## Architecture
//!
//! ```text
//! SessionHandle --commands--> engine task --frames--> Transport --> device
//!      ^                          |
//!      +------snapshots/events----+
//! ```
//!
//! - [`protocol`] — bit-exact wire codec for control, response and
//!   device-parameter frames, plus the rolling 4-bit sequence counter and
//!   the resynchronizing inbound scanner.
//! - [`convert`] — user-unit frequency (10-1000) to device-unit (10-240)
//!   piecewise conversion, and the strength clamping rules.
//! - [`pulse`] / [`playback`] — 100 ms waveform slices and the per-channel
//!   queue with Once/Loop playback and independent send/progress cursors.
//! - [`strength`] — per-channel accumulation of strength requests into the
//!   single instruction each frame may carry.
//! - [`session`] — the spawned engine task that owns all state and drives
//!   the tick loop over a [`transport::Transport`].
//! - [`events`] — async callback seam for connection, strength and playback
//!   notifications.
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Duration;
//! use pulselink::{Channel, DuplexTransport, PulseOperation, SessionBuilder};
//!
//! # async fn demo() -> pulselink::Result<()> {
//! let (transport, _device) = DuplexTransport::pair(4096);
//! let (session, handle) = SessionBuilder::new().spawn(transport);
//!
//! handle
//!     .enqueue(Channel::A, vec![PulseOperation::new([120; 4], [60; 4])])
//!     .await?;
//! handle.request_delta(Channel::A, 5).await?;
//!
//! tokio::time::sleep(Duration::from_secs(1)).await;
//! session.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod convert;
pub mod error;
pub mod events;
pub mod playback;
pub mod protocol;
pub mod pulse;
pub mod session;
pub mod strength;
pub mod transport;

pub use channel::{Channel, ChannelSnapshot};
pub use error::{ProtocolError, PulseLinkError, Result, ValidationError};
pub use events::{EventSink, NullSink};
pub use playback::{PlaybackMode, PlaybackState};
pub use protocol::{ControlFrame, DeviceParamsFrame, ResponseFrame, StrengthInterpretation};
pub use pulse::PulseOperation;
pub use session::{Session, SessionBuilder, SessionHandle, SessionSnapshot};
pub use transport::{DuplexTransport, TcpTransport, Transport};
