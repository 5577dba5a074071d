use std::time::Duration;

use flowenc_core::error::BuildError;
use flowenc_core::mocks::{RecordingPins, ScriptedSensorDriver};
use flowenc_core::{Calibration, RetryPolicy, VirtualEncoder};
use flowenc_traits::MonotonicClock;
use rstest::rstest;

type Enc = VirtualEncoder<ScriptedSensorDriver, RecordingPins, MonotonicClock>;

fn cal() -> Calibration {
    Calibration::from_geometry(30.0, 150.0, 300).unwrap()
}

#[rstest]
fn builder_missing_sensor_yields_typed_build_error() {
    let err = Enc::builder()
        .with_outputs(RecordingPins::new())
        .with_calibration(cal())
        .try_build()
        .expect_err("should fail with MissingSensor");

    match err.downcast_ref::<BuildError>() {
        Some(BuildError::MissingSensor) => {}
        other => panic!("expected MissingSensor, got: {other:?}"),
    }
}

#[rstest]
fn builder_missing_outputs_yields_typed_build_error() {
    let err = Enc::builder()
        .with_sensor(ScriptedSensorDriver::new(vec![]))
        .with_calibration(cal())
        .try_build()
        .expect_err("should fail with MissingOutputs");

    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::MissingOutputs)
    ));
}

#[rstest]
fn builder_missing_calibration_yields_typed_build_error() {
    let err = Enc::builder()
        .with_sensor(ScriptedSensorDriver::new(vec![]))
        .with_outputs(RecordingPins::new())
        .try_build()
        .expect_err("should fail with MissingCalibration");

    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::MissingCalibration)
    ));
}

#[rstest]
#[case::zero_timeout(Duration::ZERO, RetryPolicy::default(), 64)]
#[case::zero_backoff(Duration::from_millis(20), RetryPolicy::fixed(Duration::ZERO), 64)]
#[case::inverted_backoff(
    Duration::from_millis(20),
    RetryPolicy { initial: Duration::from_secs(2), max: Duration::from_secs(1) },
    64
)]
#[case::zero_burst_warn(Duration::from_millis(20), RetryPolicy::default(), 0)]
fn builder_rejects_invalid_settings(
    #[case] timeout: Duration,
    #[case] retry: RetryPolicy,
    #[case] burst_warn: u32,
) {
    let err = Enc::builder()
        .with_sensor(ScriptedSensorDriver::new(vec![]))
        .with_outputs(RecordingPins::new())
        .with_calibration(cal())
        .with_read_timeout(timeout)
        .with_retry(retry)
        .with_burst_warn_pulses(burst_warn)
        .try_build()
        .expect_err("invalid setting must be rejected");

    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::InvalidConfig(_))
    ));
}

#[test]
fn bad_geometry_in_config_is_a_config_error() {
    let cfg = flowenc_config::load_toml(
        r#"
        [sensor]
        height_mm = 30.0
        [encoder]
        mm_per_rev = -1.0
        pulses_per_rev = 300
        "#,
    )
    .unwrap();
    let Err(err) = Enc::builder().with_config(&cfg) else {
        panic!("negative mm_per_rev must be rejected");
    };
    assert!(matches!(
        err.downcast_ref::<flowenc_core::EncoderError>(),
        Some(flowenc_core::EncoderError::Config(_))
    ));
}
