#![no_main]
use libfuzzer_sys::fuzz_target;

// Arbitrary TOML must either fail to parse, fail validation, or yield a
// config whose geometry is usable. Never a panic.
fuzz_target!(|data: &str| {
    let Ok(cfg) = flowenc_config::load_toml(data) else {
        return;
    };
    if cfg.validate().is_ok() {
        let mm_per_pulse = cfg.encoder.mm_per_rev / f64::from(cfg.encoder.pulses_per_rev);
        assert!(mm_per_pulse.is_finite() && mm_per_pulse > 0.0);
        assert!(cfg.sensor.height_mm > 0.0);
    }
});
