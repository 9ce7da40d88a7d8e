#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // TOML parsing of Config must reject bad input gracefully, never panic.
    let parsed = toml::from_str::<agsa_config::Config>(data);
    match parsed {
        Ok(cfg) => {
            // Ensure validate() does not panic either.
            let _ = cfg.validate();
        }
        Err(_e) => {
            // parse error is acceptable
        }
    }
});
