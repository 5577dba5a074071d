//! Command bodies: config loading, backend assembly, and the encoder run.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use eyre::WrapErr;
use flowenc_config::{Config, PixelScale, SensorBackend, SimulationCfg};
use flowenc_core::error::{EncoderError, Result as CoreResult};
use flowenc_core::snapshot::{self, SnapshotReader};
use flowenc_core::util::{rate_hz, saturating_ms};
use flowenc_core::{Calibration, RunOptions, RunSummary, VirtualEncoder};
use flowenc_hardware::{SimulatedPins, SimulatedSensorDriver, SimulationProfile};
use flowenc_traits::{EncoderOutputs, MotionSensor, SensorDriver};

use crate::cli::RtArgs;

fn config_error(msg: impl Into<String>) -> eyre::Report {
    eyre::Report::new(EncoderError::Config(msg.into()))
}

/// Read, parse and validate the TOML config.
pub fn load_config(path: &Path) -> CoreResult<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| config_error(format!("read config {}: {e}", path.display())))?;
    let cfg = flowenc_config::load_toml(&text)
        .map_err(|e| config_error(format!("parse config {}: {e}", path.display())))?;
    cfg.validate()
        .map_err(|e| config_error(format!("invalid configuration: {e}")))?;
    Ok(cfg)
}

pub fn load_pixel_scale(path: Option<&Path>) -> CoreResult<Option<PixelScale>> {
    let Some(p) = path else {
        return Ok(None);
    };
    let scale = flowenc_config::load_pixel_calibration_csv(p).map_err(|e| config_error(e.to_string()))?;
    tracing::info!(
        mm_per_pixel = scale.mm_per_pixel,
        rows_used = scale.rows_used,
        path = %p.display(),
        "pixel calibration loaded"
    );
    Ok(Some(scale))
}

/// Height-derived calibration, optionally overridden by a fitted pixel scale.
pub fn calibration_for(cfg: &Config, scale: Option<&PixelScale>) -> CoreResult<Calibration> {
    let base = Calibration::try_from(cfg)?;
    match scale {
        Some(s) => Ok(base.with_pixel_to_mm(s.mm_per_pixel)?),
        None => Ok(base),
    }
}

pub fn simulation_profile(c: &SimulationCfg) -> SimulationProfile {
    SimulationProfile {
        dx_per_read: c.dx_per_read,
        dy_per_read: c.dy_per_read,
        reverse_every: c.reverse_every,
        fail_init_attempts: c.fail_init_attempts,
        fail_every: c.fail_every,
    }
}

fn use_simulation(cfg: &Config, simulate: bool) -> bool {
    simulate || cfg.sensor.backend == SensorBackend::Simulated
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn real_backend_unavailable() -> eyre::Report {
    config_error(
        "sensor.backend = \"real\" needs a build with the `hardware` feature on Linux; use --simulate or backend = \"simulated\"",
    )
}

pub struct RunArgs {
    pub cycles: Option<u64>,
    pub simulate: bool,
    pub stats: bool,
    pub report_ms: Option<u64>,
    pub rt: RtArgs,
}

/// Assemble the configured backend and run the loop until shutdown.
pub fn run_encoder(
    cfg: &Config,
    scale: Option<&PixelScale>,
    args: &RunArgs,
    shutdown: Arc<AtomicBool>,
) -> CoreResult<RunSummary> {
    let calibration = calibration_for(cfg, scale)?;
    log_banner(cfg, &calibration);

    #[cfg(unix)]
    crate::rt::setup_once(&args.rt);

    if use_simulation(cfg, args.simulate) {
        let driver = SimulatedSensorDriver::new(simulation_profile(&cfg.simulation));
        return drive(cfg, calibration, driver, SimulatedPins::new(), args, shutdown);
    }

    #[cfg(all(feature = "hardware", target_os = "linux"))]
    {
        let driver = flowenc_hardware::pmw3901::Pmw3901Driver {
            spi_bus: cfg.sensor.spi_bus,
            spi_cs: cfg.sensor.spi_cs,
            clock_hz: cfg.sensor.spi_clock_hz,
        };
        let release_on_drop = cfg.shutdown.pins == flowenc_config::ShutdownPins::Low;
        let pins = flowenc_hardware::gpio::GpioEncoderPins::try_new(
            cfg.pins.encoder_a,
            cfg.pins.encoder_b,
            cfg.pins.encoder_z,
            release_on_drop,
        )
        .wrap_err("open encoder pins")?;
        drive(cfg, calibration, driver, pins, args, shutdown)
    }
    #[cfg(not(all(feature = "hardware", target_os = "linux")))]
    {
        Err(real_backend_unavailable())
    }
}

fn drive<D: SensorDriver, P: EncoderOutputs>(
    cfg: &Config,
    calibration: Calibration,
    driver: D,
    pins: P,
    args: &RunArgs,
    shutdown: Arc<AtomicBool>,
) -> CoreResult<RunSummary> {
    let (publisher, reader) = snapshot::channel();
    let mut encoder = VirtualEncoder::builder()
        .with_sensor(driver)
        .with_outputs(pins)
        .with_config(cfg)?
        .with_calibration(calibration)
        .with_publisher(publisher)
        .try_build()?;

    let reporter = args
        .report_ms
        .filter(|ms| *ms > 0)
        .map(|ms| spawn_reporter(reader, Duration::from_millis(ms), shutdown.clone()))
        .transpose()?;

    let summary = encoder.run(
        &shutdown,
        &RunOptions {
            period: Duration::from_micros(cfg.cycle.cycle_us),
            max_cycles: args.cycles,
            collect_stats: args.stats,
        },
    );

    // Dropping the encoder closes the snapshot channel so the reporter exits.
    drop(encoder);
    if let Some(h) = reporter
        && h.join().is_err()
    {
        tracing::warn!("snapshot reporter panicked");
    }
    Ok(summary)
}

fn spawn_reporter(
    mut reader: SnapshotReader,
    every: Duration,
    shutdown: Arc<AtomicBool>,
) -> CoreResult<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("flowenc-report".into())
        .spawn(move || {
            while !shutdown.load(Ordering::Relaxed) && !reader.is_closed() {
                std::thread::sleep(every);
                if let Some(s) = reader.latest() {
                    tracing::info!(
                        position = s.encoder.position,
                        state = s.encoder.state.index(),
                        index_pulses = s.encoder.index_pulses,
                        residual_mm = s.residual_mm,
                        cycles = s.cycles,
                        phase = ?s.phase,
                        "encoder"
                    );
                }
            }
        })
        .wrap_err("spawn snapshot reporter")
}

fn log_banner(cfg: &Config, cal: &Calibration) {
    tracing::info!(
        pulses_per_rev = cal.pulses_per_rev(),
        mm_per_rev = cal.mm_per_rev(),
        mm_per_pulse = cal.mm_per_pulse(),
        sensor_height_mm = cfg.sensor.height_mm,
        pixel_to_mm = cal.pixel_to_mm(),
        axis = ?cfg.encoder.projection_axis,
        loop_hz = rate_hz(Duration::from_micros(cfg.cycle.cycle_us)),
        pins = ?(cfg.pins.encoder_a, cfg.pins.encoder_b, cfg.pins.encoder_z),
        "virtual encoder starting"
    );
}

/// One-shot sensor check: initialise once and take a single reading.
pub fn self_check(cfg: &Config, simulate: bool) -> CoreResult<(i32, i32)> {
    let timeout = Duration::from_millis(cfg.sensor.read_timeout_ms);
    if use_simulation(cfg, simulate) {
        let mut driver = SimulatedSensorDriver::new(simulation_profile(&cfg.simulation));
        return read_once(&mut driver, timeout);
    }
    #[cfg(all(feature = "hardware", target_os = "linux"))]
    {
        let mut driver = flowenc_hardware::pmw3901::Pmw3901Driver {
            spi_bus: cfg.sensor.spi_bus,
            spi_cs: cfg.sensor.spi_cs,
            clock_hz: cfg.sensor.spi_clock_hz,
        };
        read_once(&mut driver, timeout)
    }
    #[cfg(not(all(feature = "hardware", target_os = "linux")))]
    {
        Err(real_backend_unavailable())
    }
}

fn read_once<D: SensorDriver>(driver: &mut D, timeout: Duration) -> CoreResult<(i32, i32)> {
    let mut sensor = driver
        .initialize()
        .map_err(|e| eyre::Report::new(EncoderError::SensorInit(e.to_string())))?;
    let m = sensor
        .read_motion(timeout)
        .map_err(|e| eyre::Report::new(flowenc_core::hw_error::map_hw_error(&*e)))?;
    Ok((m.dx, m.dy))
}

/// Print the run summary to stdout (JSON when requested) and stats to stderr.
pub fn print_summary(summary: &RunSummary, pulses_per_rev: u32, json: bool, stats: bool) {
    let revolutions = summary.encoder.revolution(pulses_per_rev);
    if json {
        let mut obj = serde_json::json!({
            "cycles": summary.cycles,
            "elapsed_ms": saturating_ms(summary.elapsed),
            "position": summary.encoder.position,
            "state": summary.encoder.state.index(),
            "revolutions": revolutions,
            "index_pulses": summary.encoder.index_pulses,
            "residual_mm": summary.residual_mm,
            "pulses_forward": summary.totals.forward,
            "pulses_backward": summary.totals.backward,
            "faults": summary.totals.faults,
            "recoveries": summary.sampler.recoveries,
        });
        if let Some(s) = summary.loop_stats.filter(|_| stats) {
            obj["loop"] = serde_json::json!({
                "min_us": s.min_us(),
                "mean_us": s.mean_us(),
                "max_us": s.max_us(),
                "stdev_us": s.stdev_us(),
                "overruns": s.overruns(),
            });
        }
        println!("{obj}");
    } else {
        println!(
            "run complete: cycles={} position={} revolutions={} residual_mm={:.4} faults={}",
            summary.cycles,
            summary.encoder.position,
            revolutions,
            summary.residual_mm,
            summary.totals.faults
        );
    }

    if stats && !json {
        let s = &summary.sampler;
        eprintln!("\n--- Encoder Stats ---");
        eprintln!("Cycles: {}", summary.cycles);
        eprintln!(
            "Pulses fwd/back (max burst): {} / {} ({})",
            summary.totals.forward, summary.totals.backward, summary.totals.max_burst
        );
        eprintln!(
            "Sensor reads ok/failed, inits/failed, recoveries: {} / {}, {} / {}, {}",
            s.reads_ok, s.read_failures, s.init_attempts, s.init_failures, s.recoveries
        );
        if let Some(l) = summary.loop_stats {
            eprintln!(
                "Cycle time min/avg/max/stdev (us): {} / {:.1} / {} / {:.1}",
                l.min_us(),
                l.mean_us(),
                l.max_us(),
                l.stdev_us()
            );
            eprintln!("Missed deadlines: {}", l.overruns());
        }
        eprintln!("---------------------\n");
    }
}
