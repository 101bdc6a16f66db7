#![no_main]

use libfuzzer_sys::fuzz_target;
use nfe_reforma::core::DiagnosticKind;

fuzz_target!(|data: &[u8]| {
    // Must not panic; rejected input is exactly one ParseError.
    let (doc, diagnostics) = nfe_reforma::nfe::parse(data);
    if doc.is_none() {
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::ParseError);
    }
});
