use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use mcm_core::error::stage_error;
use mcm_core::mocks::{ScriptedTransport, position_report};
use mcm_core::{ControllerBuilder, Desync, MotionCfg, MoveOutcome, StageController, StageError};
use mcm_traits::Transport;
use mcm_traits::clock::test_clock::TestClock;
use rstest::rstest;

const ZFM_SCALE: f64 = 0.2116667;

/// Single-axis device model: moves land at once, zero resets the counter.
fn instant_device() -> ScriptedTransport {
    let mut counts = 0i32;
    ScriptedTransport::new(move |frame| match frame[0] {
        0x53 => {
            counts = i32::from_le_bytes([frame[8], frame[9], frame[10], frame[11]]);
            Vec::new()
        }
        0x09 => {
            counts = 0;
            Vec::new()
        }
        0x0A => position_report(frame[2], counts),
        _ => Vec::new(),
    })
}

fn controller(transport: ScriptedTransport) -> StageController<ScriptedTransport> {
    ControllerBuilder::new()
        .with_transport(transport)
        .with_channel(0, "ZFM2020", false)
        .build()
        .expect("controller build")
}

fn simulated_time(transport: ScriptedTransport) -> StageController<ScriptedTransport> {
    ControllerBuilder::new()
        .with_transport(transport)
        .with_channel(0, "ZFM2020", false)
        .with_clock(Box::new(TestClock::new()))
        .with_motion(MotionCfg {
            poll_interval: Duration::from_millis(100),
            ..MotionCfg::default()
        })
        .build()
        .expect("controller build")
}

fn expect_stage_error(err: eyre::Report) -> StageError {
    match stage_error(&err) {
        Some(e) => e.clone(),
        None => panic!("expected StageError, got: {err:?}"),
    }
}

#[test]
fn initial_read_populates_runtime() {
    let ctrl = controller(ScriptedTransport::reporting([-10]));
    let rt = ctrl.channel_runtime(0).unwrap();
    assert_eq!(rt.last_encoder_counts(), -10);
    assert!((rt.last_position_um() + 10.0 * ZFM_SCALE).abs() < 1e-12);
    assert!(!rt.in_flight());
    assert_eq!(ctrl.transport().writes().len(), 1);
    assert_eq!(ctrl.channels().collect::<Vec<_>>(), vec![0]);
}

#[test]
fn ten_micron_move_completes_at_47_counts() {
    let mut ctrl = controller(ScriptedTransport::reporting([47]));
    let legal = ctrl
        .move_um(0, 10.0, false, Some(Duration::from_secs(5)))
        .expect("move completes");
    assert!((legal - 47.0 * ZFM_SCALE).abs() < 1e-9);
    assert_eq!(ctrl.transport().moves(), vec![(0, 47)]);
    let rt = ctrl.channel_runtime(0).unwrap();
    assert_eq!(rt.target_encoder_counts(), None);
    assert_eq!(rt.last_encoder_counts(), 47);
}

#[rstest]
#[case(20_000.0)]
#[case(-12_700.5)]
#[case(f64::NAN)]
#[case(f64::INFINITY)]
fn absolute_move_outside_limits_writes_nothing(#[case] target: f64) {
    let mut ctrl = controller(ScriptedTransport::reporting([0]));
    let before = ctrl.transport().writes().len();
    let err = ctrl.move_um(0, target, false, None).unwrap_err();
    assert!(matches!(
        expect_stage_error(err),
        StageError::LimitExceeded { channel: 0, .. }
    ));
    assert_eq!(ctrl.transport().writes().len(), before);
    assert!(!ctrl.channel_runtime(0).unwrap().in_flight());
}

#[rstest]
#[case(12_700.0, false, 59_999)]
#[case(-12_700.0, false, -59_999)]
#[case(12_700.0, true, -59_999)]
#[case(-12_700.0, true, 59_999)]
fn move_to_limit_stays_inside_travel(
    #[case] target: f64,
    #[case] reversed: bool,
    #[case] sent: i32,
) {
    // 12700 um rounds to 60000 counts, which is 12700.002 um.
    let mut ctrl = ControllerBuilder::new()
        .with_transport(instant_device())
        .with_channel(0, "ZFM2020", reversed)
        .build()
        .unwrap();
    let legal = ctrl
        .move_um(0, target, false, Some(Duration::from_secs(1)))
        .unwrap();
    assert_eq!(ctrl.transport().moves(), vec![(0, sent)]);
    assert!(legal.abs() <= 12_700.0, "legal={legal}");
    assert!((legal - target).abs() <= ZFM_SCALE);
    assert_eq!(legal.signum(), target.signum());
    let position = ctrl.channel_runtime(0).unwrap().last_position_um();
    assert!(position.abs() <= 12_700.0, "position={position}");
    assert_eq!(position, legal);
}

#[test]
fn relative_move_reads_first_and_adds_delta() {
    let mut ctrl = controller(ScriptedTransport::reporting([0, 100]));
    let legal = ctrl.move_um(0, 10.0, true, None).unwrap();
    let writes = ctrl.transport().writes();
    // init read, fresh read for the relative base, then the move
    assert_eq!(writes.len(), 3);
    assert_eq!(writes[1][0], 0x0A);
    assert_eq!(writes[2][0], 0x53);
    let expected_counts = ((100.0 * ZFM_SCALE + 10.0) / ZFM_SCALE).round() as i32;
    assert_eq!(ctrl.transport().moves(), vec![(0, expected_counts)]);
    assert!((legal - f64::from(expected_counts) * ZFM_SCALE).abs() < 1e-9);
    assert!(ctrl.channel_runtime(0).unwrap().in_flight());
}

#[test]
fn relative_move_checks_limit_against_fresh_position() {
    // 60000 counts ~ 12700 um; another 10 um pushes past the limit.
    let mut ctrl = controller(ScriptedTransport::reporting([0, 60_000]));
    let err = ctrl.move_um(0, 10.0, true, None).unwrap_err();
    assert!(matches!(
        expect_stage_error(err),
        StageError::LimitExceeded { .. }
    ));
    assert!(ctrl.transport().moves().is_empty());
}

#[test]
fn absolute_move_does_not_read_first() {
    let mut ctrl = controller(ScriptedTransport::reporting([0]));
    ctrl.move_um(0, 50.0, false, None).unwrap();
    let writes = ctrl.transport().writes();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[1][0], 0x53);
}

#[test]
fn reversed_channel_sends_negated_counts() {
    let mut ctrl = ControllerBuilder::new()
        .with_transport(instant_device())
        .with_channel(0, "ZFM2020", true)
        .build()
        .unwrap();
    let legal = ctrl
        .move_um(0, 10.0, false, Some(Duration::from_secs(1)))
        .unwrap();
    assert_eq!(ctrl.transport().moves(), vec![(0, -47)]);
    assert!((legal - 47.0 * ZFM_SCALE).abs() < 1e-9);
    assert_eq!(ctrl.position_encoder_counts(0).unwrap(), -47);
    assert!((ctrl.position_um(0).unwrap() - legal).abs() < 1e-12);
}

#[test]
fn pending_move_is_resolved_before_the_next_one() {
    let mut ctrl = controller(instant_device());
    ctrl.move_um(0, 100.0, false, None).unwrap();
    let a = ctrl.channel_runtime(0).unwrap().target_encoder_counts();
    assert_eq!(a, Some(472));

    ctrl.move_um(0, 200.0, false, Some(Duration::from_secs(1)))
        .unwrap();

    let ops: Vec<u8> = ctrl.transport().writes().iter().map(|f| f[0]).collect();
    // init read, move A, drain read for A, move B, completion read for B
    assert_eq!(ops, vec![0x0A, 0x53, 0x0A, 0x53, 0x0A]);
    assert_eq!(ctrl.transport().moves(), vec![(0, 472), (0, 945)]);
    let rt = ctrl.channel_runtime(0).unwrap();
    assert_eq!(rt.target_encoder_counts(), None);
    assert_eq!(rt.last_encoder_counts(), 945);
}

#[test]
fn stalled_pending_move_is_abandoned_after_drain_timeout() {
    let clock = TestClock::new();
    let mut ctrl = ControllerBuilder::new()
        .with_transport(ScriptedTransport::reporting([0]))
        .with_channel(0, "ZFM2020", false)
        .with_clock(Box::new(clock.clone()))
        .with_motion(MotionCfg {
            poll_interval: Duration::from_millis(100),
            ..MotionCfg::default()
        })
        .build()
        .unwrap();
    ctrl.move_um(0, 100.0, false, None).unwrap();
    ctrl.move_um(0, 200.0, false, None).unwrap();

    assert_eq!(clock.elapsed(), Duration::from_secs(5));
    assert_eq!(ctrl.transport().moves(), vec![(0, 472), (0, 945)]);
    assert_eq!(
        ctrl.channel_runtime(0).unwrap().target_encoder_counts(),
        Some(945)
    );
}

#[test]
fn move_times_out_and_clears_target() {
    let mut ctrl = simulated_time(ScriptedTransport::reporting([0]));
    let err = ctrl
        .move_um(0, 100.0, false, Some(Duration::from_secs(1)))
        .unwrap_err();
    assert_eq!(
        expect_stage_error(err),
        StageError::MoveTimedOut {
            channel: 0,
            target_counts: 472,
            last_counts: 0,
        }
    );
    assert!(!ctrl.channel_runtime(0).unwrap().in_flight());
    // init + move + ten polls at 100 ms
    assert_eq!(ctrl.transport().writes().len(), 12);

    // The channel is usable again without draining anything.
    ctrl.move_um(0, 0.0, false, None).unwrap();
    assert_eq!(ctrl.transport().writes().len(), 13);
}

#[test]
fn one_count_short_of_target_counts_as_arrived() {
    let mut ctrl = simulated_time(ScriptedTransport::reporting([0, 0, 471]));
    ctrl.move_um(0, 100.0, false, Some(Duration::from_secs(1)))
        .expect("within tolerance");
    assert_eq!(ctrl.channel_runtime(0).unwrap().last_encoder_counts(), 471);
}

#[test]
fn finish_move_reports_outcome() {
    let mut ctrl = simulated_time(ScriptedTransport::reporting([0, 472]));
    assert_eq!(
        ctrl.finish_move(0, Duration::from_secs(1)).unwrap(),
        MoveOutcome::Idle
    );
    ctrl.move_um(0, 100.0, false, None).unwrap();
    let outcome = ctrl.finish_move(0, Duration::from_secs(1)).unwrap();
    assert_eq!(outcome, MoveOutcome::Arrived { counts: 472 });
    assert!(!outcome.is_timed_out());
}

#[test]
fn finish_move_reports_timeout_without_error() {
    let mut ctrl = simulated_time(ScriptedTransport::reporting([0]));
    ctrl.move_um(0, 100.0, false, None).unwrap();
    let outcome = ctrl.finish_move(0, Duration::from_millis(300)).unwrap();
    assert!(outcome.is_timed_out());
    assert!(!ctrl.channel_runtime(0).unwrap().in_flight());
}

#[test]
fn zero_timeout_still_reads_once() {
    let mut ctrl = simulated_time(instant_device());
    let legal = ctrl
        .move_um(0, 10.0, false, Some(Duration::ZERO))
        .expect("stage already on target");
    assert!((legal - 47.0 * ZFM_SCALE).abs() < 1e-9);
    let ops: Vec<u8> = ctrl.transport().writes().iter().map(|f| f[0]).collect();
    assert_eq!(ops, vec![0x0A, 0x53, 0x0A]);
    assert!(!ctrl.channel_runtime(0).unwrap().in_flight());
}

#[test]
fn zero_timeout_on_a_stalled_stage_times_out_after_one_read() {
    let mut ctrl = simulated_time(ScriptedTransport::reporting([0]));
    let err = ctrl
        .move_um(0, 10.0, false, Some(Duration::ZERO))
        .unwrap_err();
    assert!(matches!(
        expect_stage_error(err),
        StageError::MoveTimedOut {
            channel: 0,
            target_counts: 47,
            last_counts: 0,
        }
    ));
    assert_eq!(ctrl.transport().writes().len(), 3);
}

#[test]
fn back_to_back_polling_still_honours_timeout() {
    // No sleep between polls; only reading the clock moves time forward.
    let clock = TestClock::new().with_auto_advance(Duration::from_millis(1));
    let mut ctrl = ControllerBuilder::new()
        .with_transport(ScriptedTransport::reporting([0]))
        .with_channel(0, "ZFM2020", false)
        .with_clock(Box::new(clock.clone()))
        .build()
        .unwrap();
    assert_eq!(ctrl.motion_cfg().poll_interval, Duration::ZERO);
    let err = ctrl
        .move_um(0, 10.0, false, Some(Duration::from_millis(50)))
        .unwrap_err();
    assert!(matches!(
        expect_stage_error(err),
        StageError::MoveTimedOut { channel: 0, .. }
    ));
    assert!(clock.elapsed() >= Duration::from_millis(50));
    let polls = ctrl.transport().writes().len() - 2;
    assert!((1..=50).contains(&polls), "polls={polls}");
}

#[test]
fn residual_bytes_are_a_desync() {
    let mut reads = 0;
    let transport = ScriptedTransport::new(move |frame| {
        if frame[0] != 0x0A {
            return Vec::new();
        }
        reads += 1;
        let mut reply = position_report(frame[2], 5);
        if reads > 1 {
            reply.push(0xAA);
        }
        reply
    });
    let mut ctrl = controller(transport);
    let err = ctrl.position_um(0).unwrap_err();
    assert_eq!(
        expect_stage_error(err),
        StageError::ProtocolDesync {
            channel: 0,
            desync: Desync::ResidualBytes(1),
        }
    );
}

/// Device that answers frames starting with `opcode` with one stray byte.
fn stray_byte_after(opcode: u8) -> ScriptedTransport {
    ScriptedTransport::new(move |frame| match frame[0] {
        0x0A => position_report(frame[2], 0),
        op if op == opcode => vec![0xAA],
        _ => Vec::new(),
    })
}

#[test]
fn stray_byte_after_move_is_a_desync_and_clears_target() {
    let mut ctrl = controller(stray_byte_after(0x53));
    let err = ctrl
        .move_um(0, 10.0, false, Some(Duration::from_secs(1)))
        .unwrap_err();
    assert_eq!(
        expect_stage_error(err),
        StageError::ProtocolDesync {
            channel: 0,
            desync: Desync::ResidualBytes(1),
        }
    );
    assert_eq!(ctrl.transport().moves(), vec![(0, 47)]);
    assert!(!ctrl.channel_runtime(0).unwrap().in_flight());
}

#[test]
fn stray_byte_after_set_zero_is_a_desync() {
    let mut ctrl = controller(stray_byte_after(0x09));
    ctrl.move_um(0, 10.0, false, None).unwrap();
    assert!(ctrl.channel_runtime(0).unwrap().in_flight());
    let err = ctrl.zero_encoder(0).unwrap_err();
    assert_eq!(
        expect_stage_error(err),
        StageError::ProtocolDesync {
            channel: 0,
            desync: Desync::ResidualBytes(1),
        }
    );
    assert!(!ctrl.channel_runtime(0).unwrap().in_flight());
    let ops: Vec<u8> = ctrl.transport().writes().iter().map(|f| f[0]).collect();
    // no poll after the failed set-zero
    assert_eq!(ops, vec![0x0A, 0x53, 0x09]);
}

#[test]
fn wrong_channel_echo_leaves_state_untouched() {
    let mut reads = 0;
    let transport = ScriptedTransport::new(move |frame| {
        if frame[0] != 0x0A {
            return Vec::new();
        }
        reads += 1;
        if reads == 1 {
            position_report(frame[2], 5)
        } else {
            position_report(frame[2] + 1, 999)
        }
    });
    let mut ctrl = controller(transport);
    let before = *ctrl.channel_runtime(0).unwrap();
    let err = ctrl.position_encoder_counts(0).unwrap_err();
    assert_eq!(
        expect_stage_error(err),
        StageError::ProtocolDesync {
            channel: 0,
            desync: Desync::ChannelMismatch { echoed: 1 },
        }
    );
    assert_eq!(*ctrl.channel_runtime(0).unwrap(), before);
    assert_eq!(before.last_encoder_counts(), 5);
}

#[test]
fn missing_reply_is_a_transport_error() {
    let mut reads = 0;
    let transport = ScriptedTransport::new(move |frame| {
        reads += 1;
        if reads == 1 {
            position_report(frame[2], 0)
        } else {
            Vec::new()
        }
    });
    let mut ctrl = controller(transport);
    let err = ctrl.position_um(0).unwrap_err();
    assert!(matches!(
        expect_stage_error(err),
        StageError::Transport { channel: 0, .. }
    ));
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(3)]
#[case(200)]
fn absent_channels_are_rejected_before_io(#[case] channel: u8) {
    let mut ctrl = controller(ScriptedTransport::reporting([0]));
    let before = ctrl.transport().writes().len();

    let errs = [
        ctrl.position_um(channel).unwrap_err(),
        ctrl.position_encoder_counts(channel).unwrap_err(),
        ctrl.position_limits_um(channel).unwrap_err(),
        ctrl.move_um(channel, 1.0, true, None).unwrap_err(),
        ctrl.zero_encoder(channel).unwrap_err(),
        ctrl.finish_move(channel, Duration::from_secs(1)).unwrap_err(),
    ];
    for err in errs {
        assert_eq!(
            expect_stage_error(err),
            StageError::ChannelNotConfigured(channel)
        );
    }
    assert_eq!(ctrl.transport().writes().len(), before);
}

#[test]
fn limits_are_symmetric_and_need_no_io() {
    let ctrl = ControllerBuilder::new()
        .with_transport(ScriptedTransport::reporting([0]))
        .with_channel(1, "MMP-2XY", false)
        .build()
        .unwrap();
    assert_eq!(ctrl.position_limits_um(1).unwrap(), (-25_400.0, 25_400.0));
    assert_eq!(ctrl.transport().writes().len(), 1);
}

#[rstest]
#[case(false)]
#[case(true)]
fn zero_encoder_ends_at_positive_zero(#[case] reversed: bool) {
    let mut ctrl = ControllerBuilder::new()
        .with_transport(instant_device())
        .with_channel(0, "ZFM2020", reversed)
        .build()
        .unwrap();
    ctrl.move_um(0, 30.0, false, None).unwrap();
    ctrl.zero_encoder(0).unwrap();
    let rt = ctrl.channel_runtime(0).unwrap();
    assert_eq!(rt.last_encoder_counts(), 0);
    assert_eq!(rt.last_position_um(), 0.0);
    assert!(rt.last_position_um().is_sign_positive());
    assert!(!rt.in_flight());
    let ops: Vec<u8> = ctrl.transport().writes().iter().map(|f| f[0]).collect();
    assert_eq!(ops, vec![0x0A, 0x53, 0x09, 0x0A]);
}

#[test]
fn zero_encoder_polls_until_zero() {
    let mut ctrl = simulated_time(ScriptedTransport::reporting([40, 30, 20, 0]));
    ctrl.zero_encoder(0).unwrap();
    // init, set-zero, three polls (30, 20, 0)
    assert_eq!(ctrl.transport().writes().len(), 5);
}

/// Delegates to a scripted device and flags `close`.
struct Closing {
    inner: ScriptedTransport,
    closed: Arc<AtomicBool>,
}

impl Transport for Closing {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.inner.write_all(bytes)
    }
    fn read_exact(
        &mut self,
        buf: &mut [u8],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.inner.read_exact(buf)
    }
    fn bytes_pending(&mut self) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
        self.inner.bytes_pending()
    }
    fn close(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn close_releases_transport() {
    let closed = Arc::new(AtomicBool::new(false));
    let ctrl = ControllerBuilder::new()
        .with_transport(Closing {
            inner: ScriptedTransport::reporting([0]),
            closed: closed.clone(),
        })
        .with_channel(0, "ZFM2020", false)
        .build()
        .unwrap();
    ctrl.close().unwrap();
    assert!(closed.load(Ordering::SeqCst));
}
