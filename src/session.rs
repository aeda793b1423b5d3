//! Transport session: the periodic engine that owns all device state.
//!
//! A spawned task drives the whole protocol from a single `select!` loop:
//!
//! ```text
//!                commands (mpsc)
//!  SessionHandle ----------------> +--------------------+
//!                                  |    engine task     | --1 frame/100ms--> Transport
//!  SessionHandle <---------------- | owns ChannelState, |
//!                snapshots (watch) | seq, scanner       | <--response bytes-- Transport
//!                                  +--------------------+
//! ```
//!
//! The engine owns both `ChannelState` values, the sequence counter and the
//! inbound scanner outright, so no lock is ever held across an await point.
//! Producers talk to it through typed messages and never block the tick; the
//! tick interval skips missed ticks instead of queueing them, so a stall is
//! followed by one frame, not a burst.
//!
//! A failed write is retried a bounded number of times inside the same tick.
//! When the budget is exhausted the slice is dropped, the sink is told the
//! connection is down, and the loop keeps ticking: a lost slice beats a
//! stalled stream, and the next successful write reports the connection back
//! up.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

use crate::channel::{Channel, ChannelSnapshot, ChannelState, PendingAck};
use crate::error::{PulseLinkError, Result};
use crate::events::EventSink;
use crate::playback::PlaybackMode;
use crate::protocol::{
    ControlFrame, DeviceParamsFrame, ResponseScanner, SequenceNumber, StrengthInterpretation,
    DEVICE_FREQUENCY_MIN, SEQUENCE_MODULUS,
};
use crate::pulse::PulseOperation;
use crate::transport::Transport;

/// Default spacing between outgoing control frames.
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_millis(100);

/// Default bounded write-retry budget per frame.
pub const DEFAULT_WRITE_RETRIES: u32 = 3;

/// Default deadline for `stop()` to close the transport and join the task.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

const COMMAND_CAPACITY: usize = 64;

/// Messages from handles to the engine task.
enum Command {
    Enqueue {
        channel: Channel,
        ops: Vec<PulseOperation>,
        append: bool,
    },
    Clear(Channel),
    SetPlaybackMode(Channel, PlaybackMode),
    RequestDelta(Channel, i32),
    RequestAbsolute(Channel, u16),
    SetDeviceParams(DeviceParamsFrame),
    Fire {
        channel: Channel,
        boost: u8,
        duration: Duration,
    },
    Stop(oneshot::Sender<()>),
}

/// Point-in-time view of the whole session, published over a watch channel
/// after every tick and every state-changing command.
#[derive(Debug, Clone, Copy)]
pub struct SessionSnapshot {
    /// Last known transport health: true after a successful write, false
    /// after a retry budget was exhausted.
    pub connected: bool,
    /// Per-channel state, indexed by [`Channel::index`].
    pub channels: [ChannelSnapshot; 2],
}

/// Configures and spawns a [`Session`].
pub struct SessionBuilder {
    tick_period: Duration,
    write_retries: u32,
    shutdown_timeout: Duration,
    prebuffer: usize,
    params: DeviceParamsFrame,
    sink: Arc<dyn EventSink>,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBuilder {
    /// Builder with the protocol defaults: 100 ms tick, 3 write attempts,
    /// 1 s shutdown deadline, no prebuffering, default device params, no-op
    /// event sink.
    pub fn new() -> Self {
        Self {
            tick_period: DEFAULT_TICK_PERIOD,
            write_retries: DEFAULT_WRITE_RETRIES,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            prebuffer: 0,
            params: DeviceParamsFrame::default(),
            sink: Arc::new(crate::events::NullSink),
        }
    }

    /// Spacing between outgoing control frames.
    pub fn tick_period(mut self, period: Duration) -> Self {
        self.tick_period = period;
        self
    }

    /// Total write attempts per frame before the slice is dropped.
    pub fn write_retries(mut self, retries: u32) -> Self {
        self.write_retries = retries.max(1);
        self
    }

    /// Deadline for `stop()` to drain and close the transport.
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Extra frames sent on the tick after a queue is replaced, letting the
    /// device-side buffer run ahead of the reported playback position.
    pub fn prebuffer(mut self, frames: usize) -> Self {
        self.prebuffer = frames;
        self
    }

    /// Initial strength limits and balance parameters, written to the device
    /// on the first tick.
    pub fn device_params(mut self, params: DeviceParamsFrame) -> Self {
        self.params = params;
        self
    }

    /// Sink for connection, strength and playback notifications.
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Spawn the engine task over the given transport.
    pub fn spawn<T>(self, transport: T) -> (Session, SessionHandle)
    where
        T: Transport + 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CAPACITY);

        let channels = [
            ChannelState::new(&self.params, Channel::A),
            ChannelState::new(&self.params, Channel::B),
        ];
        let initial = SessionSnapshot {
            connected: false,
            channels: [channels[0].snapshot(), channels[1].snapshot()],
        };
        let (state_tx, state_rx) = watch::channel(initial);

        let engine = Engine {
            transport,
            channels,
            seq: SequenceNumber::ZERO,
            scanner: ResponseScanner::new(),
            fires: [None, None],
            connected: false,
            read_closed: false,
            prime_remaining: 0,
            params: self.params,
            params_dirty: true,
            logged_skipped: 0,
            tick_period: self.tick_period,
            write_retries: self.write_retries,
            prebuffer: self.prebuffer,
            sink: self.sink,
            cmd_rx,
            state_tx,
        };
        let task = tokio::spawn(engine.run());

        let session = Session {
            task,
            cmd_tx: cmd_tx.clone(),
            shutdown_timeout: self.shutdown_timeout,
        };
        let handle = SessionHandle { cmd_tx, state_rx };
        (session, handle)
    }
}

/// Owner of the spawned engine task. Dropping it without calling
/// [`Session::stop`] leaves the task running until every handle is dropped.
pub struct Session {
    task: JoinHandle<()>,
    cmd_tx: mpsc::Sender<Command>,
    shutdown_timeout: Duration,
}

impl Session {
    /// Orderly shutdown: stop ticking, close the transport, join the task.
    ///
    /// Bounded by the builder's shutdown deadline; a task that fails to
    /// drain in time is aborted.
    pub async fn stop(mut self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Stop(done_tx)).await.is_ok() {
            let _ = tokio::time::timeout(self.shutdown_timeout, done_rx).await;
        }
        match tokio::time::timeout(self.shutdown_timeout, &mut self.task).await {
            Ok(joined) => joined.map_err(|_| PulseLinkError::SessionClosed),
            Err(_) => {
                self.task.abort();
                Ok(())
            }
        }
    }
}

/// Cloneable command/observation surface of a running session.
///
/// Waveform input is validated here, before anything crosses into the engine
/// task, so out-of-range frequencies fail synchronously and nothing reaches
/// the wire.
#[derive(Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::Sender<Command>,
    state_rx: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    /// Replace the channel's queue with new slices, restarting playback from
    /// the first one.
    pub async fn enqueue(&self, channel: Channel, ops: Vec<PulseOperation>) -> Result<()> {
        for op in &ops {
            op.validate()?;
        }
        self.send(Command::Enqueue {
            channel,
            ops,
            append: false,
        })
        .await
    }

    /// Append slices behind the current queue without disturbing playback.
    pub async fn append(&self, channel: Channel, ops: Vec<PulseOperation>) -> Result<()> {
        for op in &ops {
            op.validate()?;
        }
        self.send(Command::Enqueue {
            channel,
            ops,
            append: true,
        })
        .await
    }

    /// Drop the channel's queue and fall back to idle output.
    pub async fn clear(&self, channel: Channel) -> Result<()> {
        self.send(Command::Clear(channel)).await
    }

    /// Switch between one-shot and looping playback.
    pub async fn set_playback_mode(&self, channel: Channel, mode: PlaybackMode) -> Result<()> {
        self.send(Command::SetPlaybackMode(channel, mode)).await
    }

    /// Request a relative strength change; requests accumulate until the
    /// next tick resolves them into one instruction.
    pub async fn request_delta(&self, channel: Channel, delta: i32) -> Result<()> {
        self.send(Command::RequestDelta(channel, delta)).await
    }

    /// Request an absolute strength, clamped to the channel's limit. Wins
    /// over any delta accumulated in the same tick.
    pub async fn request_absolute(&self, channel: Channel, value: u16) -> Result<()> {
        self.send(Command::RequestAbsolute(channel, value)).await
    }

    /// Update strength limits and balance parameters. The frame is re-sent
    /// to the device on the next tick.
    pub async fn set_device_params(&self, params: DeviceParamsFrame) -> Result<()> {
        params.encode()?;
        self.send(Command::SetDeviceParams(params)).await
    }

    /// Temporarily boost the channel's strength above its current value,
    /// restoring the origin strength after `duration`.
    pub async fn fire(&self, channel: Channel, boost: u8, duration: Duration) -> Result<()> {
        self.send(Command::Fire {
            channel,
            boost,
            duration,
        })
        .await
    }

    /// Latest published view of one channel.
    pub fn snapshot(&self, channel: Channel) -> ChannelSnapshot {
        self.state_rx.borrow().channels[channel.index()]
    }

    /// Latest published view of the whole session.
    pub fn session_snapshot(&self) -> SessionSnapshot {
        *self.state_rx.borrow()
    }

    /// Watch receiver for snapshot updates, for callers that want to await
    /// changes rather than poll.
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.state_rx.clone()
    }

    async fn send(&self, cmd: Command) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| PulseLinkError::SessionClosed)
    }
}

/// Active fire-mode boost on one channel.
struct FireState {
    /// Strength to restore once the boost expires.
    origin: u8,
    ticks_left: u32,
}

struct Engine<T: Transport> {
    transport: T,
    channels: [ChannelState; 2],
    seq: SequenceNumber,
    scanner: ResponseScanner,
    fires: [Option<FireState>; 2],
    connected: bool,
    read_closed: bool,
    prime_remaining: usize,
    params: DeviceParamsFrame,
    params_dirty: bool,
    logged_skipped: u64,
    tick_period: Duration,
    write_retries: u32,
    prebuffer: usize,
    sink: Arc<dyn EventSink>,
    cmd_rx: mpsc::Receiver<Command>,
    state_tx: watch::Sender<SessionSnapshot>,
}

impl<T: Transport> Engine<T> {
    async fn run(mut self) {
        match self.transport.open().await {
            Ok(()) => {
                self.connected = true;
                self.sink.connection_changed(true).await;
            }
            Err(err) => {
                error!(%err, "transport open failed");
                self.sink.connection_changed(false).await;
            }
        }
        self.publish();

        let mut ticker = tokio::time::interval(self.tick_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let done = loop {
            tokio::select! {
                biased;

                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Command::Stop(done)) => break Some(done),
                    Some(cmd) => {
                        self.handle_command(cmd);
                        self.publish();
                    }
                    // Every handle dropped: nothing can command us anymore.
                    None => break None,
                },

                _ = ticker.tick() => self.tick().await,

                inbound = self.transport.read(), if !self.read_closed => {
                    self.handle_read(inbound).await;
                }
            }
        };

        if let Err(err) = self.transport.close().await {
            debug!(%err, "transport close failed during shutdown");
        }
        if let Some(done) = done {
            let _ = done.send(());
        }
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Enqueue { channel, ops, append } => {
                let queue = &mut self.channels[channel.index()].queue;
                if append {
                    queue.append(ops);
                } else {
                    queue.replace(ops);
                    self.prime_remaining = self.prebuffer;
                }
            }
            Command::Clear(channel) => {
                self.channels[channel.index()].queue.clear();
            }
            Command::SetPlaybackMode(channel, mode) => {
                self.channels[channel.index()].queue.set_mode(mode);
            }
            Command::RequestDelta(channel, delta) => {
                self.channels[channel.index()].accumulator.add_delta(delta);
            }
            Command::RequestAbsolute(channel, value) => {
                let state = &mut self.channels[channel.index()];
                state.accumulator.set_absolute(value, state.strength_limit);
            }
            Command::SetDeviceParams(params) => {
                self.params = params;
                self.params_dirty = true;
                for channel in Channel::ALL {
                    self.channels[channel.index()].apply_params(&params, channel);
                }
            }
            Command::Fire {
                channel,
                boost,
                duration,
            } => self.start_fire(channel, boost, duration),
            Command::Stop(_) => unreachable!("handled by the run loop"),
        }
    }

    fn start_fire(&mut self, channel: Channel, boost: u8, duration: Duration) {
        let ticks = (duration.as_millis() / self.tick_period.as_millis().max(1)).max(1) as u32;
        let index = channel.index();
        // A re-trigger while boosted keeps the original restore target.
        let origin = match &self.fires[index] {
            Some(fire) => fire.origin,
            None => self.channels[index].current_strength,
        };
        let state = &mut self.channels[index];
        let target = origin.saturating_add(boost);
        state
            .accumulator
            .set_absolute(target as u16, state.strength_limit);
        debug!(%channel, origin, target, ticks, "fire boost armed");
        self.fires[index] = Some(FireState {
            origin,
            ticks_left: ticks,
        });
    }

    async fn tick(&mut self) {
        let finished_before = [
            self.channels[0].queue.is_finished(),
            self.channels[1].queue.is_finished(),
        ];

        if self.params_dirty {
            self.flush_params().await;
        }

        let frames = 1 + std::mem::take(&mut self.prime_remaining);
        for _ in 0..frames {
            self.send_control_frame().await;
        }

        for channel in Channel::ALL {
            self.channels[channel.index()].queue.advance_logical_frame();
        }

        self.expire_fires();

        for channel in Channel::ALL {
            let index = channel.index();
            if !finished_before[index] && self.channels[index].queue.is_finished() {
                debug!(%channel, "playback finished");
                self.sink.playback_finished(channel).await;
            }
        }

        self.publish();
    }

    async fn flush_params(&mut self) {
        match self.params.encode() {
            Ok(buf) => {
                if self.write_with_retry(&buf).await {
                    self.params_dirty = false;
                }
            }
            Err(err) => {
                // Unencodable params cannot become encodable by retrying.
                warn!(%err, "dropping invalid device params");
                self.params_dirty = false;
            }
        }
    }

    /// Build and send one control frame, consuming one buffered slice and at
    /// most one strength instruction per channel.
    async fn send_control_frame(&mut self) {
        let seq = self.seq.next();

        let mut interpretations = [StrengthInterpretation::NoChange; 2];
        let mut strengths = [0u8; 2];
        let mut frequencies = [[DEVICE_FREQUENCY_MIN; 4]; 2];
        let mut amplitudes = [[0u8; 4]; 2];

        for channel in Channel::ALL {
            let index = channel.index();
            let state = &mut self.channels[index];

            // An expired ack stays armed so the late answer, if it ever
            // comes, is recognized and discarded as stale.
            if let Some(ack) = &mut state.pending_ack {
                ack.age = ack.age.saturating_add(1);
                if ack.age == SEQUENCE_MODULUS {
                    warn!(%channel, seq = ack.seq.value(), "strength ack window expired");
                }
            }

            let instruction = state.accumulator.take_instruction();
            interpretations[index] = instruction.interpretation;
            strengths[index] = instruction.value;
            if instruction.interpretation != StrengthInterpretation::NoChange {
                state.pending_ack = Some(PendingAck { seq, age: 0 });
            }

            let op = state.queue.advance_buffer_for_send();
            match op.to_device_units() {
                Ok((freq, amp)) => {
                    frequencies[index] = freq;
                    amplitudes[index] = amp;
                }
                Err(err) => {
                    // Enqueue validated this already; keep idle output rather
                    // than killing the stream.
                    warn!(%channel, %err, "unconvertible slice replaced with idle output");
                }
            }
        }

        let frame = ControlFrame {
            seq,
            interpretation_a: interpretations[0],
            interpretation_b: interpretations[1],
            strength_a: strengths[0],
            strength_b: strengths[1],
            frequency_a: frequencies[0],
            amplitude_a: amplitudes[0],
            frequency_b: frequencies[1],
            amplitude_b: amplitudes[1],
        };
        match frame.encode() {
            Ok(buf) => {
                self.write_with_retry(&buf).await;
            }
            Err(err) => warn!(seq = seq.value(), %err, "dropping unencodable control frame"),
        }
    }

    async fn write_with_retry(&mut self, bytes: &[u8]) -> bool {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.transport.write(bytes).await {
                Ok(()) => {
                    if !self.connected {
                        self.connected = true;
                        self.sink.connection_changed(true).await;
                    }
                    return true;
                }
                Err(err) if attempt < self.write_retries => {
                    debug!(attempt, %err, "write failed, retrying");
                }
                Err(err) => {
                    error!(attempts = attempt, %err, "dropping frame after exhausted retries");
                    if self.connected {
                        self.connected = false;
                        self.sink.connection_changed(false).await;
                    }
                    return false;
                }
            }
        }
    }

    fn expire_fires(&mut self) {
        for channel in Channel::ALL {
            let index = channel.index();
            let Some(fire) = &mut self.fires[index] else {
                continue;
            };
            fire.ticks_left = fire.ticks_left.saturating_sub(1);
            if fire.ticks_left == 0 {
                let origin = fire.origin;
                self.fires[index] = None;
                let state = &mut self.channels[index];
                state
                    .accumulator
                    .set_absolute(origin as u16, state.strength_limit);
                debug!(%channel, origin, "fire boost expired, restoring strength");
            }
        }
    }

    async fn handle_read(&mut self, inbound: std::io::Result<Vec<u8>>) {
        let bytes = match inbound {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(%err, "transport read failed, stopping reader");
                self.read_closed = true;
                if self.connected {
                    self.connected = false;
                    self.sink.connection_changed(false).await;
                    self.publish();
                }
                return;
            }
        };

        let frames = self.scanner.push(&bytes);
        let skipped = self.scanner.skipped_bytes();
        if skipped > self.logged_skipped {
            warn!(bytes = skipped - self.logged_skipped, "discarded unparseable inbound bytes");
            self.logged_skipped = skipped;
        }

        let mut changed = false;
        for frame in frames {
            let reported = [frame.strength_a, frame.strength_b];
            for channel in Channel::ALL {
                let state = &mut self.channels[channel.index()];
                // A report landing after the ack window closed answers an
                // instruction the sequence counter has already lapped.
                if state.pending_ack.map_or(false, |ack| ack.is_expired()) {
                    warn!(
                        %channel,
                        reported = reported[channel.index()],
                        "discarding stale strength report"
                    );
                    state.pending_ack = None;
                    continue;
                }
                changed |= state.refresh_strength(reported[channel.index()]);
            }
        }
        if changed {
            let (a, b) = (
                self.channels[0].current_strength,
                self.channels[1].current_strength,
            );
            debug!(strength_a = a, strength_b = b, "device reported new strengths");
            self.sink.strength_changed(a, b).await;
            self.publish();
        }
    }

    fn publish(&self) {
        let snapshot = SessionSnapshot {
            connected: self.connected,
            channels: [self.channels[0].snapshot(), self.channels[1].snapshot()],
        };
        self.state_tx.send_replace(snapshot);
    }
}
