//! Binary dialect transactions against a simulated MICON.

mod common;

use std::thread;
use std::time::Duration;

use common::{micon_frame, open_with_mcu};
use mculink_engine::binary_protocol::{
    CommandFrame, DeviceError, FrameDecoder, Decoded, Op, ReplyFrame, CMD_BOOT_END, CMD_FAN_CTRL,
    CMD_FAN_SPEED, CMD_GET_VER, CMD_INT_SW_STAT, CMD_PWR_STATE, CMD_SERMOD_CON, CMD_TEMP,
    MAX_PAYLOAD_LEN,
};
use mculink_engine::{Binary, ChannelTransport, Flow, Link, LinkConfig, LinkError, DEFAULT_PRIORITY};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serial_test::serial;

/// Parse a host frame; requests share the reply layout.
fn parse(frame: &[u8]) -> ReplyFrame {
    match FrameDecoder::new().push(frame) {
        Decoded::Frame(request) => request,
        other => panic!("host sent an invalid frame {frame:02x?}: {other:?}"),
    }
}

/// Acknowledge writes with a zero status byte.
fn ack(request: &ReplyFrame) -> Vec<Vec<u8>> {
    vec![micon_frame(Op::Write, request.cmd, &[0x00])]
}

fn config() -> LinkConfig {
    LinkConfig::binary().with_timeout(Duration::from_millis(200))
}

#[test]
fn test_write_frame_on_the_wire() {
    let (link, mcu) = open_with_mcu::<Binary, _>(config(), |frame| ack(&parse(frame)));

    link.write(0x50, &[0x0f]).unwrap();
    assert_eq!(mcu.requests(), vec![vec![0x01, 0x50, 0x0f, 0xa0]]);
}

#[test]
fn test_typed_reads() {
    let (link, _mcu) = open_with_mcu::<Binary, _>(config(), |frame| {
        let request = parse(frame);
        let payload: &[u8] = match request.cmd {
            CMD_TEMP => &[0x28],
            CMD_FAN_SPEED => &[0x0b, 0xb8],
            CMD_GET_VER => &[0x00, 0x01, 0x02, 0x03],
            _ => &[],
        };
        vec![micon_frame(Op::Read, request.cmd, payload)]
    });

    assert_eq!(link.read_u8(CMD_TEMP).unwrap(), 40);
    assert_eq!(link.read_u16(CMD_FAN_SPEED).unwrap(), 3000);
    assert_eq!(link.read_u32(CMD_GET_VER).unwrap(), 0x0001_0203);

    // Extra bytes are cut to the width of the value.
    assert_eq!(link.read_u16(CMD_GET_VER).unwrap(), 0x0001);

    match link.read_u32(CMD_FAN_SPEED) {
        Err(LinkError::ShortReply { expected, actual }) => {
            assert_eq!(expected, 4);
            assert_eq!(actual, 2);
        }
        other => panic!("expected short reply, got {other:?}"),
    }
}

#[test]
fn test_typed_writes_are_big_endian() {
    let (link, mcu) = open_with_mcu::<Binary, _>(config(), |frame| ack(&parse(frame)));

    link.write_u8(CMD_FAN_CTRL, 0x02).unwrap();
    link.write_u16(CMD_FAN_CTRL, 0x0102).unwrap();
    link.write_u32(CMD_FAN_CTRL, 0x0102_0304).unwrap();
    link.write_flag(CMD_BOOT_END).unwrap();

    let payloads: Vec<Vec<u8>> = mcu.requests().iter().map(|f| parse(f).payload).collect();
    assert_eq!(
        payloads,
        vec![vec![0x02], vec![0x01, 0x02], vec![0x01, 0x02, 0x03, 0x04], vec![]]
    );
}

#[test]
fn test_correlation_error() {
    let (link, _mcu) = open_with_mcu::<Binary, _>(config(), |frame| {
        let request = parse(frame);
        // Answer as if a different command had been sent.
        vec![micon_frame(Op::Read, request.cmd.wrapping_add(1), &[0x01])]
    });

    match link.read(CMD_TEMP, 1) {
        Err(LinkError::Correlation { expected, got }) => {
            assert_eq!(expected, "read/0x37");
            assert_eq!(got, "read/0x38");
        }
        other => panic!("expected correlation error, got {other:?}"),
    }
}

#[test]
fn test_device_errors() {
    let (link, _mcu) = open_with_mcu::<Binary, _>(config(), |frame| {
        let request = parse(frame);
        match (request.op, request.cmd) {
            (Op::Write, _) => vec![micon_frame(Op::Write, request.cmd, &[0xf5])],
            (Op::Read, CMD_INT_SW_STAT) => vec![micon_frame(Op::Read, request.cmd, &[0xf4])],
            (Op::Read, _) => vec![micon_frame(Op::Read, request.cmd, &[0xf4, 0x01])],
        }
    });

    let err = link.write_u8(CMD_FAN_CTRL, 9).unwrap_err();
    assert_eq!(err.device_error(), Some(DeviceError::InvalidLength));

    let err = link.read_u8(CMD_INT_SW_STAT).unwrap_err();
    assert_eq!(err.device_error(), Some(DeviceError::UnavailableCommand));

    // The caller can opt out of the error table.
    assert_eq!(link.read_u8_lenient(CMD_INT_SW_STAT).unwrap(), 0xf4);

    // Multi-byte read replies are data, whatever their first byte.
    assert_eq!(link.read(CMD_FAN_SPEED, 2).unwrap(), vec![0xf4, 0x01]);

    let stats = link.stats();
    assert_eq!(stats.failures, 2);
}

#[test]
#[serial]
fn test_timeout_then_late_reply_is_discarded() {
    let (link, mcu) = open_with_mcu::<Binary, _>(config(), |frame| {
        let request = parse(frame);
        if request.cmd == CMD_PWR_STATE {
            // Stay silent.
            return Vec::new();
        }
        vec![micon_frame(Op::Read, request.cmd, &[0x28])]
    });

    match link.read_u8(CMD_PWR_STATE) {
        Err(LinkError::Timeout(timeout)) => assert_eq!(timeout, Duration::from_millis(200)),
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(mcu.requests().len(), 1);

    // The reply shows up after the caller gave up.
    link.receive(&micon_frame(Op::Read, CMD_PWR_STATE, &[0x03]));
    let stats = link.stats();
    assert_eq!(stats.discarded_replies, 1);
    assert_eq!(stats.timeouts, 1);

    // The link keeps working.
    assert_eq!(link.read_u8(CMD_TEMP).unwrap(), 0x28);
}

#[test]
fn test_malformed_reply_fails_transaction() {
    let (link, _mcu) = open_with_mcu::<Binary, _>(config(), |frame| {
        let request = parse(frame);
        let mut reply = micon_frame(Op::Read, request.cmd, &[0x28]);
        if request.cmd == CMD_TEMP {
            *reply.last_mut().unwrap() ^= 0x55;
        }
        vec![reply]
    });

    assert!(matches!(link.read_u8(CMD_TEMP), Err(LinkError::Framing(_))));
    assert_eq!(link.stats().malformed, 1);
    assert_eq!(link.read_u8(CMD_FAN_SPEED).unwrap(), 0x28);
}

#[test]
fn test_checksum_verification_disabled() {
    let config = config().with_checksum_verification(false);
    let (link, _mcu) = open_with_mcu::<Binary, _>(config, |frame| {
        let request = parse(frame);
        let mut reply = micon_frame(Op::Read, request.cmd, &[0x28]);
        *reply.last_mut().unwrap() = 0;
        vec![reply]
    });

    assert_eq!(link.read_u8(CMD_TEMP).unwrap(), 0x28);
}

#[test]
fn test_reply_split_into_single_bytes() {
    let (link, _mcu) = open_with_mcu::<Binary, _>(config(), |frame| {
        let request = parse(frame);
        micon_frame(Op::Read, request.cmd, b"TS-WXL v1.10")
            .into_iter()
            .map(|b| vec![b])
            .collect()
    });

    let version = link.read(CMD_GET_VER, MAX_PAYLOAD_LEN).unwrap();
    assert_eq!(version, b"TS-WXL v1.10".to_vec());
}

#[test]
fn test_oversized_payload_is_rejected_before_sending() {
    common::init_tracing();
    let (host, device) = ChannelTransport::pair();
    let link = Link::<Binary>::open(host, config()).unwrap();

    let err = link.write(CMD_FAN_CTRL, &[0u8; MAX_PAYLOAD_LEN + 1]).unwrap_err();
    assert!(matches!(err, LinkError::Argument(_)));
    assert_eq!(device.pending(), 0);
    assert_eq!(link.stats().transactions, 0);
}

#[test]
fn test_round_trip_every_payload_length() {
    // The simulated MICON echoes each request back as its reply.
    let (link, _mcu) = open_with_mcu::<Binary, _>(config(), |frame| vec![frame.to_vec()]);

    let mut rng = ChaCha8Rng::seed_from_u64(0x5eed);
    for len in 0..=MAX_PAYLOAD_LEN {
        let payload: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
        let op = if rng.gen_bool(0.5) { Op::Read } else { Op::Write };
        let cmd: u8 = rng.gen();
        let request = CommandFrame::new(op, cmd, &payload)
            .unwrap()
            .ignoring_device_errors();

        let reply = link.execute(request, MAX_PAYLOAD_LEN).unwrap();
        assert_eq!(reply, payload, "len {len}");
    }
}

#[test]
#[serial]
fn test_concurrent_callers_are_serialized() {
    let (link, mcu) = open_with_mcu::<Binary, _>(config(), |frame| {
        let request = parse(frame);
        // Answer each read with its own command id.
        vec![micon_frame(Op::Read, request.cmd, &[request.cmd])]
    });

    let workers: Vec<_> = (0..8u8)
        .map(|worker| {
            let link = link.clone();
            thread::spawn(move || {
                for round in 0..10u8 {
                    let cmd = 0x40 + worker * 10 + round;
                    assert_eq!(link.read_u8(cmd).unwrap(), cmd);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(mcu.requests().len(), 80);
    assert_eq!(mcu.overlaps(), 0);
    assert_eq!(link.stats().transactions, 80);
    assert_eq!(link.stats().failures, 0);
}

#[test]
fn test_handshake_switches_to_console_mode() {
    let (link, mcu) = open_with_mcu::<Binary, _>(config(), |frame| {
        let request = parse(frame);
        match request.cmd {
            CMD_GET_VER => vec![micon_frame(Op::Read, CMD_GET_VER, b"TS-XEL v1.00")],
            CMD_PWR_STATE => vec![micon_frame(Op::Read, CMD_PWR_STATE, &[0x02])],
            _ => ack(&request),
        }
    });

    let info = link.handshake().unwrap();
    assert_eq!(info.version, "TS-XEL v1.00");
    assert_eq!(info.power_state, 2);

    let commands: Vec<u8> = mcu.requests().iter().map(|f| parse(f).cmd).collect();
    assert_eq!(
        commands,
        vec![CMD_BOOT_END, CMD_GET_VER, CMD_PWR_STATE, CMD_SERMOD_CON]
    );
}

#[test]
fn test_handshake_after_restart_keeps_serial_mode() {
    let (link, mcu) = open_with_mcu::<Binary, _>(config(), |frame| {
        let request = parse(frame);
        match request.cmd {
            // No answer to BOOT_END; the handshake carries on.
            CMD_BOOT_END => Vec::new(),
            CMD_GET_VER => vec![micon_frame(Op::Read, CMD_GET_VER, b"TS-XEL v1.00")],
            CMD_PWR_STATE => vec![micon_frame(Op::Read, CMD_PWR_STATE, &[0x04])],
            _ => ack(&request),
        }
    });

    let info = link.handshake().unwrap();
    assert_eq!(info.power_state, 4);
    let commands: Vec<u8> = mcu.requests().iter().map(|f| parse(f).cmd).collect();
    assert_eq!(commands, vec![CMD_BOOT_END, CMD_GET_VER, CMD_PWR_STATE]);
}

#[test]
fn test_interrupt_event_polls_switch_state() {
    let (link, _mcu) = open_with_mcu::<Binary, _>(config(), |frame| {
        let request = parse(frame);
        vec![micon_frame(Op::Read, request.cmd, &[0x05])]
    });

    let (tx, rx) = crossbeam_channel::unbounded();
    let weak = link.downgrade();
    let _keys = link.subscribe_scoped(DEFAULT_PRIORITY, move |_code| {
        if let Some(link) = weak.upgrade() {
            let _ = tx.send(link.read_u8(CMD_INT_SW_STAT));
        }
        Flow::Stop
    });

    link.notify_event(0x01);
    let pressed = rx.recv_timeout(Duration::from_secs(2)).unwrap().unwrap();
    assert_eq!(pressed, 0x05);
    assert_eq!(link.stats().events, 1);
}

#[test]
fn test_receiver_detaches_when_link_dropped() {
    let (host, _device) = ChannelTransport::pair();
    let link = Link::<Binary>::open(host, config()).unwrap();
    let receiver = link.receiver();
    assert!(receiver.is_attached());

    drop(link);
    assert!(!receiver.is_attached());
    assert!(matches!(receiver.receive(&[0x00]), Err(LinkError::Detached)));
}

#[test]
fn test_transport_failure_releases_link() {
    common::init_tracing();
    let (host, device) = ChannelTransport::pair();
    let link = Link::<Binary>::open(host, config()).unwrap();
    drop(device);

    for _ in 0..2 {
        match link.read(CMD_TEMP, 1) {
            Err(LinkError::Transport(err)) => {
                assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe)
            }
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    let stats = link.stats();
    assert_eq!(stats.transactions, 2);
    assert_eq!(stats.failures, 2);
    assert_eq!(stats.timeouts, 0);

    // Nothing is left outstanding for a late reply to complete.
    link.receive(&micon_frame(Op::Read, CMD_TEMP, &[0x28]));
    assert_eq!(link.stats().discarded_replies, 1);
}
