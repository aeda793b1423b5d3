//! End-to-end tests: a full session over an in-memory transport, with the
//! test playing the device side of the stream.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use pulselink::protocol::{CONTROL_FRAME_SIZE, DEVICE_PARAMS_FRAME_SIZE, DEVICE_PARAMS_FRAME_TYPE};
use pulselink::{
    Channel, ControlFrame, DeviceParamsFrame, DuplexTransport, EventSink, PlaybackMode,
    PlaybackState, PulseOperation, SessionBuilder, Transport,
};

/// Read and discard the device-params frame written on the first tick.
async fn read_params_frame(device: &mut DuplexStream) -> DeviceParamsFrame {
    let mut buf = [0u8; DEVICE_PARAMS_FRAME_SIZE];
    device.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf[0], DEVICE_PARAMS_FRAME_TYPE);
    DeviceParamsFrame::decode(&buf).unwrap()
}

async fn read_control_frame(device: &mut DuplexStream) -> ControlFrame {
    let mut buf = [0u8; CONTROL_FRAME_SIZE];
    device.read_exact(&mut buf).await.unwrap();
    ControlFrame::decode(&buf).unwrap()
}

#[derive(Default)]
struct RecordingSink {
    connection: Mutex<Vec<bool>>,
    finished: Mutex<Vec<Channel>>,
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn connection_changed(&self, connected: bool) {
        self.connection.lock().unwrap().push(connected);
    }

    async fn playback_finished(&self, channel: Channel) {
        self.finished.lock().unwrap().push(channel);
    }
}

/// Transport whose writes fail for a window of attempts, then recover.
/// Reads never complete, like a device that only ever listens.
struct FlakyTransport {
    attempts: usize,
    fail_from: usize,
    fail_until: usize,
}

#[async_trait]
impl Transport for FlakyTransport {
    async fn open(&mut self) -> std::io::Result<()> {
        Ok(())
    }

    async fn write(&mut self, _bytes: &[u8]) -> std::io::Result<()> {
        let n = self.attempts;
        self.attempts += 1;
        if n >= self.fail_from && n < self.fail_until {
            Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "simulated outage",
            ))
        } else {
            Ok(())
        }
    }

    async fn read(&mut self) -> std::io::Result<Vec<u8>> {
        std::future::pending().await
    }

    async fn close(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn waveform_streams_in_device_units_with_rolling_sequence() {
    let (transport, mut device) = DuplexTransport::pair(16384);
    let (session, handle) = SessionBuilder::new().spawn(transport);

    // 350 Hz user units map to 150 device units; amplitudes pass through.
    handle
        .enqueue(Channel::A, vec![PulseOperation::new([350; 4], [80; 4])])
        .await
        .unwrap();

    read_params_frame(&mut device).await;

    let mut prev_seq = None;
    let mut saw_waveform = false;
    for _ in 0..40 {
        let frame = read_control_frame(&mut device).await;
        if let Some(prev) = prev_seq {
            assert_eq!(frame.seq.value(), (prev + 1) % 16, "sequence must roll mod 16");
        }
        prev_seq = Some(frame.seq.value());

        if frame.frequency_a == [150; 4] {
            assert_eq!(frame.amplitude_a, [80; 4]);
            saw_waveform = true;
        }
        // Channel B was never fed: always the idle slice.
        assert_eq!(frame.amplitude_b, [0; 4]);
    }
    assert!(saw_waveform, "enqueued slice never reached the wire");

    session.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn loop_playback_repeats_and_never_finishes() {
    let (transport, mut device) = DuplexTransport::pair(16384);
    let sink = std::sync::Arc::new(RecordingSink::default());
    let (session, handle) = SessionBuilder::new().event_sink(sink.clone()).spawn(transport);

    let slices = vec![
        PulseOperation::new([20; 4], [50; 4]),
        PulseOperation::new([30; 4], [50; 4]),
        PulseOperation::new([40; 4], [50; 4]),
    ];
    handle.enqueue(Channel::A, slices).await.unwrap();

    read_params_frame(&mut device).await;

    // Collect the non-idle frequencies of a couple dozen frames: the three
    // slices must cycle, and the fourth occurrence wraps to the first.
    let mut seen = Vec::new();
    for _ in 0..24 {
        let frame = read_control_frame(&mut device).await;
        if frame.amplitude_a != [0; 4] {
            seen.push(frame.frequency_a[0]);
        }
    }
    let start = seen
        .iter()
        .position(|&f| f == 20)
        .expect("first slice never sent");
    assert!(seen[start..].starts_with(&[20, 30, 40, 20]));

    let snap = handle.snapshot(Channel::A);
    assert_eq!(snap.playback_state, PlaybackState::Playing);
    assert!(sink.finished.lock().unwrap().is_empty());

    session.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn once_playback_finishes_exactly_once_then_idles() {
    let (transport, mut device) = DuplexTransport::pair(16384);
    let sink = std::sync::Arc::new(RecordingSink::default());
    let (session, handle) = SessionBuilder::new().event_sink(sink.clone()).spawn(transport);

    handle
        .set_playback_mode(Channel::B, PlaybackMode::Once)
        .await
        .unwrap();
    handle
        .enqueue(
            Channel::B,
            vec![
                PulseOperation::new([20; 4], [50; 4]),
                PulseOperation::new([30; 4], [50; 4]),
                PulseOperation::new([40; 4], [50; 4]),
            ],
        )
        .await
        .unwrap();

    read_params_frame(&mut device).await;

    let mut seen = Vec::new();
    for _ in 0..24 {
        let frame = read_control_frame(&mut device).await;
        if frame.amplitude_b != [0; 4] {
            seen.push(frame.frequency_b[0]);
        }
    }
    // Each slice exactly once, then idle output only.
    assert_eq!(seen, vec![20, 30, 40]);

    let snap = handle.snapshot(Channel::B);
    assert_eq!(snap.playback_state, PlaybackState::Finished);
    assert_eq!(sink.finished.lock().unwrap().as_slice(), &[Channel::B]);

    session.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn malformed_response_bytes_are_skipped_without_state_damage() {
    let (transport, mut device) = DuplexTransport::pair(16384);
    let (session, handle) = SessionBuilder::new().spawn(transport);

    read_params_frame(&mut device).await;
    read_control_frame(&mut device).await;

    // Garbage prefix, then a valid report split across two writes.
    device.write_all(&[0xFF, 0x00, 0xDE, 0xAD]).await.unwrap();
    device.write_all(&[0xB1, 33]).await.unwrap();
    device.write_all(&[0x44, 0x00]).await.unwrap();

    let mut rx = handle.watch();
    tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            rx.changed().await.unwrap();
            let snap = *rx.borrow();
            if snap.channels[0].current_strength == 33 {
                assert_eq!(snap.channels[1].current_strength, 0x44);
                break;
            }
            // The garbage must never be treated as a report.
            assert_eq!(snap.channels[0].current_strength, 0);
        }
    })
    .await
    .unwrap();

    // The stream is still alive after the garbage.
    read_control_frame(&mut device).await;

    session.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn write_outage_reports_connection_loss_and_recovery() {
    let sink = std::sync::Arc::new(RecordingSink::default());
    // Attempt 0 is the params frame; attempts 1..7 fail, covering two full
    // retry budgets, then writes succeed again.
    let transport = FlakyTransport {
        attempts: 0,
        fail_from: 1,
        fail_until: 7,
    };
    let (session, _handle) = SessionBuilder::new().event_sink(sink.clone()).spawn(transport);

    tokio::time::sleep(Duration::from_millis(450)).await;

    let connection = sink.connection.lock().unwrap().clone();
    assert_eq!(
        connection,
        vec![true, false, true],
        "open, outage after retries, recovery"
    );

    session.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn updated_device_params_reach_the_wire_and_clamp_strength() {
    let (transport, mut device) = DuplexTransport::pair(16384);
    let (session, handle) = SessionBuilder::new().spawn(transport);

    let initial = read_params_frame(&mut device).await;
    assert_eq!(initial.strength_limit_a, 200);

    let tightened = DeviceParamsFrame {
        strength_limit_a: 30,
        ..DeviceParamsFrame::default()
    };
    handle.set_device_params(tightened).await.unwrap();
    // Over-limit absolute requests clamp to the new ceiling.
    handle.request_absolute(Channel::A, 180).await.unwrap();

    // The updated params frame goes out on the next tick, between control
    // frames; scan the byte stream for it.
    let mut found_params = false;
    let mut clamped_request = false;
    for _ in 0..16 {
        let mut type_byte = [0u8; 1];
        device.read_exact(&mut type_byte).await.unwrap();
        if type_byte[0] == DEVICE_PARAMS_FRAME_TYPE {
            let mut rest = [0u8; DEVICE_PARAMS_FRAME_SIZE - 1];
            device.read_exact(&mut rest).await.unwrap();
            assert_eq!(rest[0], 30);
            found_params = true;
        } else {
            let mut rest = [0u8; CONTROL_FRAME_SIZE - 1];
            device.read_exact(&mut rest).await.unwrap();
            let mut full = vec![type_byte[0]];
            full.extend_from_slice(&rest);
            let frame = ControlFrame::decode(&full).unwrap();
            if frame.interpretation_a == pulselink::StrengthInterpretation::Absolute {
                assert_eq!(frame.strength_a, 30);
                clamped_request = true;
            }
        }
        if found_params && clamped_request {
            break;
        }
    }
    assert!(found_params, "updated params never written");
    assert!(clamped_request, "absolute request never written");

    session.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn append_continues_playback_without_restart() {
    let (transport, mut device) = DuplexTransport::pair(16384);
    let (session, handle) = SessionBuilder::new().spawn(transport);

    handle
        .set_playback_mode(Channel::A, PlaybackMode::Once)
        .await
        .unwrap();
    handle
        .enqueue(Channel::A, vec![PulseOperation::new([20; 4], [50; 4])])
        .await
        .unwrap();
    handle
        .append(Channel::A, vec![PulseOperation::new([60; 4], [50; 4])])
        .await
        .unwrap();

    read_params_frame(&mut device).await;

    let mut seen = Vec::new();
    for _ in 0..12 {
        let frame = read_control_frame(&mut device).await;
        if frame.amplitude_a != [0; 4] {
            seen.push(frame.frequency_a[0]);
        }
    }
    assert_eq!(seen, vec![20, 60]);

    session.stop().await.unwrap();
}
