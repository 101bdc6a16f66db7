#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use nfe_reforma::core::{ProcessOptions, ProcessorConfig, TaxKind};
use nfe_reforma::pipeline::Processor;
use nfe_reforma::tax::RateTable;
use rust_decimal::Decimal;

fuzz_target!(|data: &[u8]| {
    let rates = RateTable::new()
        .with_rate(TaxKind::Ibs, "*", "*", Decimal::new(1770, 2))
        .with_rate(TaxKind::Cbs, "*", "*", Decimal::new(880, 2))
        .with_rate(TaxKind::Selective, "*", "*", Decimal::ZERO);
    let processor = Processor::new(ProcessorConfig::default(), Arc::new(rates));
    let options = ProcessOptions {
        generate_updated_output: true,
        ..ProcessOptions::default()
    };
    let result = processor.process(data, &options);
    assert_eq!(result.success, result.errors.is_empty());
});
