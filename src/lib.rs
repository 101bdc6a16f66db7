//! # nfe-reforma
//!
//! NF-e / NFC-e processing for the Brazilian consumption-tax reform:
//! parse the fiscal XML, validate it, compute IBS, CBS and IS per item,
//! and write the document back with the reform groups filled in.
//!
//! All monetary values use [`rust_decimal::Decimal`], never floating point.
//! Problems found in a document are reported as [`Diagnostic`] values with
//! an explicit field path; API misuse is reported through [`NfeError`].
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use chrono::NaiveDate;
//! use nfe_reforma::core::*;
//! use nfe_reforma::pipeline::Processor;
//! use nfe_reforma::tax::RateTable;
//! use rust_decimal_macros::dec;
//!
//! let doc = DocumentBuilder::new(1, 123, NaiveDate::from_ymd_opt(2026, 3, 1).unwrap())
//!     .emitter(PartyBuilder::new("Emitente Ltda", TaxId::Cnpj("12345678000195".into()))
//!         .address(AddressBuilder::new("São Paulo", "SP").build()).build())
//!     .recipient(PartyBuilder::new("Cliente SA", TaxId::Cnpj("11222333000181".into()))
//!         .address(AddressBuilder::new("Rio de Janeiro", "RJ").build()).build())
//!     .add_item(ItemBuilder::new("P1", "Cerveja", "22030000", dec!(10), dec!(15.00)).build())
//!     .build()
//!     .unwrap();
//!
//! let rates = RateTable::new()
//!     .with_rate(TaxKind::Ibs, "RJ", "*", dec!(17.70))
//!     .with_rate(TaxKind::Cbs, "BR", "*", dec!(8.80))
//!     .with_rate(TaxKind::Selective, "BR", "2203", dec!(2.00));
//! let processor = Processor::new(ProcessorConfig::default(), Arc::new(rates));
//!
//! let result = processor.process_document(doc, &processor.default_options());
//! assert!(result.success);
//! let totals = result.document.unwrap().tax_totals.unwrap();
//! assert_eq!(totals.ibs.value, dec!(26.55));
//! assert_eq!(totals.selective.value, dec!(3.00));
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `core` (default) | Document model, check digits, validation, tax engine |
//! | `nfe` (default) | NF-e XML parsing and generation, the processing pipeline |
//! | `json` | Load rate tables from JSON |
//! | `all` | Everything |

#[cfg(feature = "core")]
pub mod core;

#[cfg(feature = "core")]
pub mod tax;

#[cfg(feature = "nfe")]
pub mod nfe;

#[cfg(feature = "nfe")]
pub mod pipeline;

// Re-export core types at crate root for convenience
#[cfg(feature = "core")]
pub use crate::core::*;
