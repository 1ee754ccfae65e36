#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parsing and validation may reject the input but must never panic, and a
    // config that validates must convert into engine tunables.
    if let Ok(cfg) = toml::from_str::<glyco_config::Config>(data)
        && cfg.validate().is_ok()
    {
        let _ = glyco_core::Tunables::from(&cfg);
    }
});
