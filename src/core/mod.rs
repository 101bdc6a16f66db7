//! Core document model, diagnostics, check digits and validation.
//!
//! Everything here is format-independent: the NF-e XML reader and writer
//! live in [`crate::nfe`], the reform tax engine in [`crate::tax`].

pub mod access_key;
mod builder;
mod config;
mod error;
pub mod states;
pub mod tax_id;
mod types;
mod validation;

pub use access_key::{AccessKey, access_key_check_digit, is_valid_access_key};
pub use builder::*;
pub use config::*;
pub use error::*;
pub use tax_id::{is_valid_cnpj, is_valid_cpf};
pub use types::*;
pub use validation::*;
