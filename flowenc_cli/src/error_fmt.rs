//! Human-readable error descriptions, stable exit codes and JSON error output.

use flowenc_core::error::{BuildError, EncoderError};

/// Exit code for configuration problems (bad TOML, failed validation, bad CSV).
pub const EXIT_CONFIG: i32 = 3;
/// Exit code for any other failure. Clap itself exits with 2 on usage errors.
pub const EXIT_GENERIC: i32 = 1;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingSensor => {
                "What happened: No sensor driver was provided to the encoder.\nLikely causes: The sensor backend could not be selected.\nHow to fix: Set [sensor] backend to \"real\" or \"simulated\".".to_string()
            }
            BuildError::MissingOutputs => {
                "What happened: No encoder outputs were provided.\nLikely causes: GPIO pins failed to open.\nHow to fix: Check [pins] in the config and GPIO permissions.".to_string()
            }
            BuildError::MissingCalibration => {
                "What happened: Encoder calibration not set.\nLikely causes: [sensor] height_mm or [encoder] geometry missing.\nHow to fix: Provide height_mm, mm_per_rev and pulses_per_rev in the config.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
        };
    }

    if let Some(ee) = err.downcast_ref::<EncoderError>() {
        return match ee {
            EncoderError::Config(msg) if msg.contains("must have headers") => {
                "Invalid headers in pixel calibration CSV. Expected 'pixels,mm'.".to_string()
            }
            EncoderError::Config(msg) => format!(
                "What happened: Configuration error: {msg}.\nLikely causes: A missing section, a typo in an enum value, or an out-of-range number.\nHow to fix: Compare the file with etc/flowenc.toml and rerun `flowenc health`."
            ),
            EncoderError::Timeout => {
                "What happened: The optical-flow sensor did not answer within the read timeout.\nLikely causes: SPI wiring, wrong chip select, or sensor.read_timeout_ms too low.\nHow to fix: Check [sensor] spi_bus/spi_cs and wiring, or raise read_timeout_ms.".to_string()
            }
            EncoderError::SensorInit(msg) => format!(
                "What happened: Sensor initialisation failed: {msg}.\nLikely causes: Sensor not powered, wrong SPI bus/chip select, or an unexpected product id.\nHow to fix: Verify power and [sensor] spi settings; try `flowenc self-check --simulate` to rule out config."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("open gpio") || lower.contains("open encoder pin") {
        return "What happened: Failed to claim the encoder output pins.\nLikely causes: Incorrect pin numbers or insufficient GPIO permissions.\nHow to fix: Fix [pins] in the config; ensure the process may access /dev/gpiomem.".to_string();
    }

    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<EncoderError>() {
        Some(EncoderError::Config(_)) => return EXIT_CONFIG,
        Some(_) => return EXIT_GENERIC,
        None => {}
    }
    if matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::InvalidConfig(_))
    ) {
        return EXIT_CONFIG;
    }
    EXIT_GENERIC
}

/// Stable machine-readable name for the error class.
pub fn reason_name(err: &eyre::Report) -> &'static str {
    if let Some(ee) = err.downcast_ref::<EncoderError>() {
        return match ee {
            EncoderError::SensorInit(_) => "SensorInit",
            EncoderError::SensorRead(_) => "SensorRead",
            EncoderError::HardwareFault(_) => "HardwareFault",
            EncoderError::Timeout => "Timeout",
            EncoderError::Config(_) => "Config",
        };
    }
    if err.downcast_ref::<BuildError>().is_some() {
        return "Build";
    }
    "Error"
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({
        "reason": reason_name(err),
        "message": humanize(err),
        "exit_code": exit_code_for_error(err),
    })
    .to_string()
}
