//! NF-e XML: parsing into [`Document`](crate::core::Document) and
//! generation back to XML with the IBS/CBS/IS groups filled in.
//!
//! # Example
//!
//! ```rust,no_run
//! use nfe_reforma::nfe;
//!
//! let xml = std::fs::read("nota.xml").unwrap();
//! let (doc, diagnostics) = nfe::parse(&xml);
//! for d in &diagnostics {
//!     println!("{d}");
//! }
//! if let Some(doc) = doc {
//!     let out = nfe::generate(&doc).unwrap();
//!     std::fs::write("nota-out.xml", out).unwrap();
//! }
//! ```

mod generator;
mod parser;
pub(crate) mod xml_utils;

pub use generator::generate;
pub use parser::parse;

/// Namespace of the NF-e layout.
pub const NFE_NAMESPACE: &str = "http://www.portalfiscal.inf.br/nfe";

/// Layout version written on `infNFe`.
pub const LAYOUT_VERSION: &str = "4.00";
