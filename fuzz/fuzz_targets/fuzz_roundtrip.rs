#![no_main]

use libfuzzer_sys::fuzz_target;
use nfe_reforma::nfe;

fuzz_target!(|data: &[u8]| {
    // parse → generate → parse must not panic, and a clean document must
    // survive regeneration unchanged.
    let (Some(doc), _) = nfe::parse(data) else {
        return;
    };
    if let Ok(out) = nfe::generate(&doc) {
        let (again, _) = nfe::parse(&out);
        if doc.has_blocking_diagnostics() {
            return;
        }
        assert_eq!(again.as_ref(), Some(&doc));
    }
});
