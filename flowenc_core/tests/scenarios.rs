use flowenc_core::mocks::{RecordingPins, ScriptStep, ScriptedSensorDriver};
use flowenc_core::quadrature::{Direction, QuadratureEmitter};
use flowenc_core::{Axis, Calibration, CycleStatus, VirtualEncoder};
use flowenc_traits::{EncoderPin, Level, Motion};
use rstest::rstest;

fn encoder_with(
    steps: Vec<ScriptStep>,
    axis: Axis,
) -> VirtualEncoder<ScriptedSensorDriver, RecordingPins, flowenc_traits::MonotonicClock> {
    VirtualEncoder::builder()
        .with_sensor(ScriptedSensorDriver::new(steps))
        .with_outputs(RecordingPins::new())
        .with_calibration(Calibration::new(0.1, 0.5, 300).unwrap())
        .with_axis(axis)
        .try_build()
        .unwrap()
}

#[test]
fn one_point_three_mm_emits_two_pulses() {
    let mut enc = encoder_with(vec![ScriptStep::Motion(Motion::new(0, 13))], Axis::Y);
    let status = enc.cycle();
    assert_eq!(
        status,
        CycleStatus::Sampled {
            pulses: 2,
            direction: Some(Direction::Forward)
        }
    );
    assert_eq!(enc.position(), 2);
    assert!((enc.residual_mm() - 0.3).abs() < 1e-9);
}

#[test]
fn residual_carries_across_cycles() {
    let steps = vec![
        ScriptStep::Motion(Motion::new(0, 3)),
        ScriptStep::Motion(Motion::new(0, 3)),
    ];
    let mut enc = encoder_with(steps, Axis::Y);
    assert_eq!(enc.cycle().pulses(), 0);
    assert_eq!(enc.position(), 0);
    assert_eq!(enc.cycle().pulses(), 1);
    assert_eq!(enc.position(), 1);
    assert!((enc.residual_mm() - 0.1).abs() < 1e-9);
}

#[test]
fn reversal_walks_back_through_every_phase() {
    let steps = vec![
        ScriptStep::Motion(Motion::new(0, 20)),
        ScriptStep::Motion(Motion::new(0, -30)),
    ];
    let mut enc = encoder_with(steps, Axis::Y);
    enc.cycle();
    assert_eq!(enc.position(), 4);
    let status = enc.cycle();
    assert_eq!(
        status,
        CycleStatus::Sampled {
            pulses: 6,
            direction: Some(Direction::Backward)
        }
    );
    assert_eq!(enc.position(), -2);
    assert_eq!(enc.encoder_snapshot().state.index(), 2);
}

#[rstest]
#[case(Axis::X, Motion::new(10, 0), 2)]
#[case(Axis::NegX, Motion::new(-10, 0), 2)]
#[case(Axis::NegY, Motion::new(0, 10), -2)]
#[case(Axis::Magnitude, Motion::new(-6, -8), 2)]
fn projection_axis_selects_component(
    #[case] axis: Axis,
    #[case] m: Motion,
    #[case] expected_position: i64,
) {
    let mut enc = encoder_with(vec![ScriptStep::Motion(m)], axis);
    enc.cycle();
    assert_eq!(enc.position(), expected_position);
}

#[test]
fn forward_into_revolution_boundary_raises_index() {
    let mut pins = RecordingPins::new();
    let mut em = QuadratureEmitter::starting_at(299, 300);
    let l = em.step(Direction::Forward, &mut pins);
    assert_eq!(em.position(), 300);
    assert_eq!(em.state().index(), 0);
    assert_eq!(l.z, Level::High);
    assert_eq!(pins.level(EncoderPin::Z), Level::High);
}

#[test]
fn backward_out_of_revolution_boundary() {
    let mut pins = RecordingPins::new();
    let mut em = QuadratureEmitter::starting_at(300, 300);
    let l = em.step(Direction::Backward, &mut pins);
    assert_eq!(em.position(), 299);
    assert_eq!(em.state().index(), 3);
    assert_eq!((l.a, l.b, l.z), (Level::Low, Level::High, Level::Low));
}

#[test]
fn build_drives_all_outputs_low_once() {
    let enc = encoder_with(vec![], Axis::Y);
    let writes = enc.outputs().writes();
    assert_eq!(writes.len(), 3);
    assert!(writes.iter().all(|(_, l)| *l == Level::Low));
}

#[test]
fn full_revolution_emits_exactly_one_index() {
    // 150 mm at 0.5 mm/pulse is one 300-pulse revolution.
    let mut enc = encoder_with(vec![ScriptStep::Motion(Motion::new(0, 1500))], Axis::Y);
    let status = enc.cycle();
    assert_eq!(status.pulses(), 300);
    let snap = enc.encoder_snapshot();
    assert_eq!(snap.position, 300);
    assert_eq!(snap.index_pulses, 1);
    assert_eq!(snap.revolution(300), 1);
    assert_eq!(snap.pins.z, Level::High);
}

#[test]
fn absurd_burst_is_dropped_instead_of_emitted() {
    // 1e12 mm per pixel: one pixel is ~2e12 pulses, far past 1 x 1e6.
    let mut enc = VirtualEncoder::builder()
        .with_sensor(ScriptedSensorDriver::new(vec![
            ScriptStep::Motion(Motion::new(0, 1)),
            ScriptStep::Motion(Motion::new(0, 0)),
        ]))
        .with_outputs(RecordingPins::new())
        .with_calibration(Calibration::new(1e12, 0.5, 300).unwrap())
        .with_burst_warn_pulses(1)
        .try_build()
        .unwrap();

    assert_eq!(
        enc.cycle(),
        CycleStatus::Sampled {
            pulses: 0,
            direction: None
        }
    );
    assert_eq!(enc.position(), 0);
    assert_eq!(enc.residual_mm(), 0.0);
    // The loop carries on normally afterwards.
    assert_eq!(enc.cycle().pulses(), 0);
    assert_eq!(enc.cycles(), 2);
}
