#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and pixel-scale calibration parsing for the virtual encoder.
//!
//! - `Config` and its sections are deserialized from TOML and validated.
//! - The pixel calibration CSV loader enforces headers and fits a
//!   through-origin scale with one outlier-rejecting refit.
use serde::Deserialize;

/// Pixel calibration CSV schema.
///
/// Expected headers:
/// pixels,mm
///
/// Example:
/// pixels,mm
/// 1961,100.0
/// -1955,-100.0
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct PixelCalibrationRow {
    pub pixels: i64,
    pub mm: f64,
}

/// Output pins in BCM numbering. Defaults match the reference wiring.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Pins {
    pub encoder_a: u8,
    pub encoder_b: u8,
    pub encoder_z: u8,
}

impl Default for Pins {
    fn default() -> Self {
        Self {
            encoder_a: 17,
            encoder_b: 27,
            encoder_z: 22,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SensorBackend {
    #[default]
    Real,
    Simulated,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SensorCfg {
    pub backend: SensorBackend,
    /// Mounting height above the surface; sets the pixel-to-mm scale.
    pub height_mm: f64,
    /// Upper bound for one motion read (ms).
    pub read_timeout_ms: u64,
    pub spi_bus: u8,
    pub spi_cs: u8,
    pub spi_clock_hz: u32,
}

impl Default for SensorCfg {
    fn default() -> Self {
        Self {
            backend: SensorBackend::Real,
            height_mm: 30.0,
            read_timeout_ms: 20,
            spi_bus: 0,
            spi_cs: 0,
            spi_clock_hz: 2_000_000,
        }
    }
}

/// Which sampled component feeds the distance accumulator.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProjectionAxis {
    #[serde(rename = "x")]
    X,
    #[default]
    #[serde(rename = "y")]
    Y,
    #[serde(rename = "-x")]
    NegX,
    #[serde(rename = "-y")]
    NegY,
    /// Euclidean length of the sample; never negative.
    #[serde(rename = "magnitude")]
    Magnitude,
}

#[derive(Debug, Deserialize)]
pub struct EncoderCfg {
    /// Linear travel treated as one virtual revolution.
    pub mm_per_rev: f64,
    pub pulses_per_rev: u32,
    #[serde(default)]
    pub projection_axis: ProjectionAxis,
    /// Log a warning when one cycle drains more pulses than this.
    #[serde(default = "default_burst_warn_pulses")]
    pub burst_warn_pulses: u32,
}

fn default_burst_warn_pulses() -> u32 {
    64
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoopCfg {
    /// Target control loop period (µs).
    pub cycle_us: u64,
}

impl Default for LoopCfg {
    fn default() -> Self {
        Self { cycle_us: 1000 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RecoveryCfg {
    /// Wait before the first re-initialisation attempt (ms).
    pub backoff_ms: u64,
    /// Cap for the doubling backoff (ms). Equal to `backoff_ms` for a fixed interval.
    pub max_backoff_ms: u64,
}

impl Default for RecoveryCfg {
    fn default() -> Self {
        Self {
            backoff_ms: 500,
            max_backoff_ms: 5000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownPins {
    /// Leave A/B/Z at their last driven level.
    #[default]
    Hold,
    /// Drive A/B/Z low before exiting.
    Low,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ShutdownCfg {
    pub pins: ShutdownPins,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct SimulationCfg {
    pub dx_per_read: i32,
    pub dy_per_read: i32,
    pub reverse_every: u32,
    pub fail_init_attempts: u32,
    pub fail_every: u32,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pins: Pins,
    pub sensor: SensorCfg,
    pub encoder: EncoderCfg,
    #[serde(default, rename = "loop")]
    pub cycle: LoopCfg,
    #[serde(default)]
    pub recovery: RecoveryCfg,
    #[serde(default)]
    pub shutdown: ShutdownCfg,
    #[serde(default)]
    pub simulation: SimulationCfg,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Empirical pixel-to-millimetre scale fitted from measured travel.
#[derive(Debug, Clone, Copy)]
pub struct PixelScale {
    pub mm_per_pixel: f64,
    /// Rows that survived outlier rejection.
    pub rows_used: usize,
}

impl PixelScale {
    /// Least-squares fit of mm = k * pixels (line through the origin).
    ///
    /// One refit drops rows whose residual exceeds 2x the RMS residual, as long
    /// as at least two rows remain.
    pub fn from_rows(rows: &[PixelCalibrationRow]) -> eyre::Result<Self> {
        if rows.len() < 2 {
            eyre::bail!("pixel calibration requires at least two rows, got {}", rows.len());
        }
        for (i, r) in rows.iter().enumerate() {
            if r.pixels == 0 {
                eyre::bail!("pixel calibration row {} has zero pixels", i + 1);
            }
            if !r.mm.is_finite() {
                eyre::bail!("pixel calibration row {} has non-finite mm", i + 1);
            }
        }

        let pts: Vec<(f64, f64)> = rows.iter().map(|r| (r.pixels as f64, r.mm)).collect();
        let k0 = fit_through_origin(pts.iter().copied())?;

        let sumsq: f64 = pts.iter().map(|(x, y)| (y - k0 * x).powi(2)).sum();
        let rms = (sumsq / pts.len() as f64).sqrt();

        let (k, used) = if rms.is_finite() && rms > 0.0 {
            let inliers: Vec<(f64, f64)> = pts
                .iter()
                .copied()
                .filter(|(x, y)| (y - k0 * x).abs() <= 2.0 * rms)
                .collect();
            if inliers.len() >= 2 && inliers.len() < pts.len() {
                (fit_through_origin(inliers.iter().copied())?, inliers.len())
            } else {
                (k0, pts.len())
            }
        } else {
            (k0, pts.len())
        };

        if k <= 0.0 {
            eyre::bail!(
                "pixel calibration produced a non-positive scale ({k}); flip encoder.projection_axis instead"
            );
        }
        Ok(Self {
            mm_per_pixel: k,
            rows_used: used,
        })
    }
}

fn fit_through_origin(pts: impl Iterator<Item = (f64, f64)>) -> eyre::Result<f64> {
    let (sxy, sxx) = pts.fold((0.0f64, 0.0f64), |(sxy, sxx), (x, y)| {
        (sxy + x * y, sxx + x * x)
    });
    if !sxx.is_finite() || sxx == 0.0 {
        eyre::bail!("pixel calibration cannot determine scale (degenerate pixel variance)");
    }
    let k = sxy / sxx;
    if !k.is_finite() {
        eyre::bail!("pixel calibration produced non-finite scale");
    }
    Ok(k)
}

impl TryFrom<&[PixelCalibrationRow]> for PixelScale {
    type Error = eyre::Report;
    fn try_from(rows: &[PixelCalibrationRow]) -> Result<Self, Self::Error> {
        Self::from_rows(rows)
    }
}

pub fn load_pixel_calibration_csv(path: &std::path::Path) -> eyre::Result<PixelScale> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open pixel calibration CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["pixels", "mm"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "pixel calibration CSV must have headers 'pixels,mm', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<PixelCalibrationRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }

    PixelScale::from_rows(&rows)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Sensor
        if !(self.sensor.height_mm.is_finite() && self.sensor.height_mm > 0.0) {
            eyre::bail!("sensor.height_mm must be > 0");
        }
        if self.sensor.read_timeout_ms == 0 {
            eyre::bail!("sensor.read_timeout_ms must be >= 1");
        }
        if self.sensor.spi_bus > 1 {
            eyre::bail!("sensor.spi_bus must be 0 or 1");
        }
        if self.sensor.spi_cs > 2 {
            eyre::bail!("sensor.spi_cs must be in [0, 2]");
        }
        if self.sensor.spi_clock_hz == 0 {
            eyre::bail!("sensor.spi_clock_hz must be > 0");
        }

        // Encoder
        if !(self.encoder.mm_per_rev.is_finite() && self.encoder.mm_per_rev > 0.0) {
            eyre::bail!("encoder.mm_per_rev must be > 0");
        }
        if self.encoder.pulses_per_rev == 0 {
            eyre::bail!("encoder.pulses_per_rev must be >= 1");
        }
        if self.encoder.burst_warn_pulses == 0 {
            eyre::bail!("encoder.burst_warn_pulses must be >= 1");
        }

        // Loop
        if self.cycle.cycle_us == 0 {
            eyre::bail!("loop.cycle_us must be >= 1");
        }
        if self.cycle.cycle_us > 1_000_000 {
            eyre::bail!("loop.cycle_us is unreasonably large (>1s)");
        }

        // Recovery
        if self.recovery.backoff_ms == 0 {
            eyre::bail!("recovery.backoff_ms must be >= 1");
        }
        if self.recovery.max_backoff_ms < self.recovery.backoff_ms {
            eyre::bail!("recovery.max_backoff_ms must be >= recovery.backoff_ms");
        }

        // Pins
        let p = &self.pins;
        if p.encoder_a == p.encoder_b || p.encoder_a == p.encoder_z || p.encoder_b == p.encoder_z
        {
            eyre::bail!("pins.encoder_a, encoder_b and encoder_z must be distinct");
        }

        Ok(())
    }
}
