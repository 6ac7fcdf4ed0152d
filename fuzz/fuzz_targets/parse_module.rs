#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let outcome = tla_syntax::parse_module(s, "fuzz.tla");
        if let Some(module) = &outcome.module {
            let _ = tla_syntax::ModuleInterface::of_module(module);
        }
    }
});
