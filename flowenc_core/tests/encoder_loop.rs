use std::sync::atomic::AtomicBool;
use std::time::Duration;

use flowenc_core::mocks::{RecordingPins, ScriptStep, ScriptedSensorDriver};
use flowenc_core::quadrature::QuadratureDecoder;
use flowenc_core::snapshot;
use flowenc_core::{Calibration, RunOptions, SensorPhase, ShutdownPolicy, VirtualEncoder};
use flowenc_traits::clock::test_clock::TestClock;
use flowenc_traits::{EncoderPin, Level, Motion};

const CONFIG: &str = r#"
[sensor]
height_mm = 30.0
read_timeout_ms = 20

[encoder]
mm_per_rev = 150.0
pulses_per_rev = 300
projection_axis = "y"

[recovery]
backoff_ms = 5
max_backoff_ms = 5

[shutdown]
pins = "low"
"#;

fn motions(dys: &[i32]) -> Vec<ScriptStep> {
    dys.iter()
        .map(|dy| ScriptStep::Motion(Motion::new(0, *dy)))
        .collect()
}

#[test]
fn run_stops_after_max_cycles_on_schedule() {
    let clock = TestClock::new();
    let mut enc = VirtualEncoder::builder()
        .with_sensor(ScriptedSensorDriver::new(motions(&[5; 10])))
        .with_outputs(RecordingPins::new())
        .with_calibration(Calibration::new(0.1, 0.5, 300).unwrap())
        .with_clock(clock.clone())
        .try_build()
        .unwrap();

    let stop = AtomicBool::new(false);
    let summary = enc.run(
        &stop,
        &RunOptions {
            period: Duration::from_millis(1),
            max_cycles: Some(10),
            collect_stats: true,
        },
    );

    assert_eq!(summary.cycles, 10);
    assert_eq!(summary.elapsed, Duration::from_millis(10));
    assert_eq!(summary.encoder.position, 10);
    assert_eq!(summary.totals.forward, 10);
    let stats = summary.loop_stats.unwrap();
    assert_eq!(stats.count(), 10);
    assert_eq!(stats.overruns(), 0);
}

#[test]
fn raised_shutdown_flag_runs_no_cycles() {
    let mut enc = VirtualEncoder::builder()
        .with_sensor(ScriptedSensorDriver::new(motions(&[100])))
        .with_outputs(RecordingPins::new())
        .with_calibration(Calibration::new(0.1, 0.5, 300).unwrap())
        .with_clock(TestClock::new())
        .try_build()
        .unwrap();
    let stop = AtomicBool::new(true);
    let summary = enc.run(&stop, &RunOptions::default());
    assert_eq!(summary.cycles, 0);
    assert_eq!(summary.encoder.position, 0);
    assert!(summary.loop_stats.is_none());
}

#[test]
fn slow_cycles_count_as_overruns() {
    let clock = TestClock::new();
    let sleeper = clock.clone();
    let driver = ScriptedSensorDriver::new(vec![
        ScriptStep::Slow(Motion::new(0, 5), Duration::from_millis(3)),
        ScriptStep::Motion(Motion::new(0, 5)),
    ])
    .with_sleeper(move |d| sleeper.advance(d));
    let mut enc = VirtualEncoder::builder()
        .with_sensor(driver)
        .with_outputs(RecordingPins::new())
        .with_calibration(Calibration::new(0.1, 0.5, 300).unwrap())
        .with_clock(clock.clone())
        .try_build()
        .unwrap();

    let summary = enc.run(
        &AtomicBool::new(false),
        &RunOptions {
            period: Duration::from_millis(1),
            max_cycles: Some(2),
            collect_stats: true,
        },
    );
    let stats = summary.loop_stats.unwrap();
    assert_eq!(stats.overruns(), 1);
    assert_eq!(stats.max_us(), 3000);
    assert_eq!(summary.encoder.position, 2);
}

#[test]
fn config_driven_encoder_releases_pins_on_shutdown() {
    let cfg = flowenc_config::load_toml(CONFIG).unwrap();
    cfg.validate().unwrap();
    // 0.051 mm/pixel, 0.5 mm/pulse: 30 pixels = 1.53 mm = 3 pulses.
    let mut enc = VirtualEncoder::builder()
        .with_sensor(ScriptedSensorDriver::new(motions(&[30])))
        .with_outputs(RecordingPins::new())
        .with_clock(TestClock::new())
        .with_config(&cfg)
        .unwrap()
        .try_build()
        .unwrap();
    assert_eq!(enc.shutdown_policy(), ShutdownPolicy::Low);

    let summary = enc.run(
        &AtomicBool::new(false),
        &RunOptions {
            period: Duration::from_micros(1000),
            max_cycles: Some(1),
            collect_stats: false,
        },
    );
    assert_eq!(summary.encoder.position, 3);
    assert_eq!(enc.outputs().level(EncoderPin::A), Level::Low);
    assert_eq!(enc.outputs().level(EncoderPin::B), Level::Low);
    // Logical position survives the release.
    assert_eq!(enc.position(), 3);
}

#[test]
fn hold_policy_keeps_last_levels() {
    let mut enc = VirtualEncoder::builder()
        .with_sensor(ScriptedSensorDriver::new(motions(&[10])))
        .with_outputs(RecordingPins::new())
        .with_calibration(Calibration::new(0.1, 0.5, 300).unwrap())
        .with_shutdown(ShutdownPolicy::Hold)
        .with_clock(TestClock::new())
        .try_build()
        .unwrap();
    enc.run(
        &AtomicBool::new(false),
        &RunOptions {
            max_cycles: Some(1),
            ..RunOptions::default()
        },
    );
    // Two pulses forward: phase 2, A and B high.
    assert_eq!(enc.outputs().level(EncoderPin::A), Level::High);
    assert_eq!(enc.outputs().level(EncoderPin::B), Level::High);
}

#[test]
fn pin_trace_decodes_to_final_position() {
    let dys = [13, -40, 7, 25, -3, 0, 60, -61, 2];
    let mut enc = VirtualEncoder::builder()
        .with_sensor(ScriptedSensorDriver::new(motions(&dys)))
        .with_outputs(RecordingPins::new())
        .with_calibration(Calibration::new(0.1, 0.5, 300).unwrap())
        .with_clock(TestClock::new())
        .try_build()
        .unwrap();
    for _ in 0..dys.len() {
        enc.cycle();
    }

    let mut dec = QuadratureDecoder::new();
    let (mut a, mut b) = (Level::Low, Level::Low);
    for (pin, level) in enc.outputs().writes() {
        match pin {
            EncoderPin::A => a = *level,
            EncoderPin::B => b = *level,
            EncoderPin::Z => continue,
        }
        dec.observe(a, b);
    }
    assert_eq!(dec.errors(), 0);
    assert_eq!(dec.count(), enc.position());
}

#[test]
fn published_snapshot_tracks_loop() {
    let (publisher, mut reader) = snapshot::channel();
    let mut enc = VirtualEncoder::builder()
        .with_sensor(ScriptedSensorDriver::new(motions(&[10, 10, 10])))
        .with_outputs(RecordingPins::new())
        .with_calibration(Calibration::new(0.1, 0.5, 300).unwrap())
        .with_publisher(publisher)
        .with_clock(TestClock::new())
        .try_build()
        .unwrap();
    assert!(reader.latest().is_none());
    for _ in 0..3 {
        enc.cycle();
    }
    let snap = reader.latest().unwrap();
    assert_eq!(snap.cycles, 3);
    assert_eq!(snap.encoder.position, 6);
    assert_eq!(snap.phase, SensorPhase::Running);
    drop(enc);
    assert!(reader.is_closed());
}
