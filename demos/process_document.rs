//! Process an NF-e file and print the result.
//!
//! ```text
//! RUST_LOG=nfe_reforma=debug cargo run --example process_document -- nota.xml [rates.json]
//! ```
//!
//! Without a rate file a small built-in table is used. Loading rates from
//! JSON needs the `json` feature. The regenerated XML is written next to
//! the input as `<name>.reforma.xml`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use nfe_reforma::core::tax_id::format_cnpj;
use nfe_reforma::core::*;
use nfe_reforma::pipeline::Processor;
use nfe_reforma::tax::{RateLookup, RateTable};
use rust_decimal_macros::dec;
use tracing_subscriber::EnvFilter;

fn default_rates() -> RateTable {
    RateTable::new()
        .with_rate(TaxKind::Ibs, "*", "*", dec!(17.70))
        .with_rate(TaxKind::Cbs, "BR", "*", dec!(8.80))
        .with_rate(TaxKind::Selective, "BR", "*", dec!(0))
}

#[cfg(feature = "json")]
fn load_rates(path: &Path) -> Result<RateTable, Box<dyn std::error::Error>> {
    Ok(RateTable::from_json(&std::fs::read_to_string(path)?)?)
}

#[cfg(not(feature = "json"))]
fn load_rates(_path: &Path) -> Result<RateTable, Box<dyn std::error::Error>> {
    Err("loading rates from JSON requires the `json` feature".into())
}

fn output_path(input: &Path) -> PathBuf {
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("nfe");
    input.with_file_name(format!("{stem}.reforma.xml"))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args_os().skip(1);
    let Some(input) = args.next().map(PathBuf::from) else {
        eprintln!("usage: process_document <nota.xml> [rates.json]");
        std::process::exit(2);
    };
    let rates: Arc<dyn RateLookup> = match args.next() {
        Some(path) => Arc::new(load_rates(Path::new(&path))?),
        None => Arc::new(default_rates()),
    };

    let bytes = std::fs::read(&input)?;
    let processor = Processor::new(ProcessorConfig::default(), rates);
    let options = ProcessOptions {
        generate_updated_output: true,
        ..processor.default_options()
    };
    let result = processor.process(&bytes, &options);

    println!("status:  {:?}", result.status);
    println!("success: {}", result.success);
    println!("time:    {:.3} ms", result.processing_time_ms);
    for d in &result.errors {
        println!("error:   {d}");
    }
    for d in &result.warnings {
        println!("warning: {d}");
    }

    if let Some(doc) = &result.document {
        let summary = doc.summary();
        println!("key:     {}", summary.access_key);
        if let Some(emitter) = &doc.emitter {
            let id = match &emitter.tax_id {
                Some(TaxId::Cnpj(cnpj)) => format_cnpj(cnpj).unwrap_or_else(|| cnpj.clone()),
                Some(other) => other.digits().to_string(),
                None => String::new(),
            };
            println!("emitter: {} {id}", emitter.name);
        }
        println!("items:   {}", summary.item_count);
        if let Some(totals) = &doc.tax_totals {
            for kind in TaxKind::ALL {
                let sum = totals.get(kind);
                println!("{:<8} base {} value {}", kind.code(), sum.base, sum.value);
            }
        }
    }

    if let Some(updated) = &result.updated_bytes {
        let path = output_path(&input);
        std::fs::write(&path, updated)?;
        println!("written: {}", path.display());
    }

    Ok(())
}
