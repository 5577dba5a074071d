#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Virtual quadrature encoder core (hardware-agnostic).
//!
//! Turns optical-flow displacement samples into an incremental encoder
//! signal. All hardware goes through `flowenc_traits::SensorDriver`,
//! `flowenc_traits::MotionSensor` and `flowenc_traits::EncoderOutputs`.
//!
//! ## Pipeline
//!
//! Once per cycle, strictly downstream:
//!
//! - **Sampler** (`sampler`): one reading, with `Init → Running → Faulted`
//!   recovery and bounded backoff
//! - **Accumulator** (`accumulator`): pixels → mm on the projection axis,
//!   added to a signed residual
//! - **Scheduler** (`scheduler`): drains whole pulses; `|residual| < mm/pulse`
//!   afterwards
//! - **Emitter** (`quadrature`): one Gray-code phase per pulse on A/B, index on Z
//!
//! `VirtualEncoder::cycle` runs one iteration; `VirtualEncoder::run` paces
//! cycles on a fixed period until a shutdown flag is raised.

pub mod accumulator;
pub mod builder;
pub mod calibration;
pub mod conversions;
pub mod encoder;
pub mod error;
pub mod hw_error;
pub mod mocks;
pub mod quadrature;
pub mod runner;
pub mod sampler;
pub mod scheduler;
pub mod snapshot;
pub mod stats;
pub mod status;
pub mod util;

pub use accumulator::{Axis, DistanceAccumulator};
pub use builder::VirtualEncoderBuilder;
pub use calibration::Calibration;
pub use encoder::{PulseTotals, ShutdownPolicy, VirtualEncoder};
pub use error::{BuildError, EncoderError};
pub use quadrature::{Direction, EncoderSnapshot, PinLevels, QuadState, QuadratureEmitter};
pub use runner::{RunOptions, RunSummary};
pub use sampler::{RetryPolicy, SampleOutcome, SamplerStats, SensorPhase};
pub use snapshot::{Snapshot, SnapshotPublisher, SnapshotReader};
pub use stats::LoopStats;
pub use status::CycleStatus;
