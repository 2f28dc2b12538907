#![no_main]

use fanwrite::engine::WriterConfig;
use fanwrite::mode::WriteMode;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Neither parser may panic on arbitrary input
    let json = WriterConfig::from_json(text);
    let _ = WriterConfig::from_toml(text);

    // Every accepted mode must survive a token round trip
    if let Ok(config) = json {
        if let Some(mode) = config.mode {
            assert_eq!(mode.as_token().parse::<WriteMode>().ok(), Some(mode));
        }
    }
    if let Ok(mode) = text.parse::<WriteMode>() {
        assert!(WriteMode::available_modes().contains(&mode.as_token()));
    }
});
