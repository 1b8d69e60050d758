#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Arbitrary text must either fail to parse, fail validation, or map onto
    // a builder; none of these may panic.
    let Ok(cfg) = mcm_config::load_toml(data) else {
        return;
    };
    if cfg.validate().is_err() {
        return;
    }
    let _ = mcm_core::ControllerBuilder::new().apply_config(&cfg);
});
