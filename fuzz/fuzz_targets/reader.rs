#![no_main]

use dotweave::{
    emitter::emit,
    reader::{ModuleReader, ReaderOptions},
    resolution::RuntimeResolver,
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let resolver = RuntimeResolver::new();
    let options = ReaderOptions {
        symbols_required: false,
        ..ReaderOptions::default()
    };

    // Emission must not panic on anything the reader accepts
    if let Ok(module) = ModuleReader::with_options(&resolver, options).read("fuzz.dll", data, None) {
        let _ = emit(&module);
    }
});
