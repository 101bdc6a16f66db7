//! NF-e access key (chave de acesso).
//!
//! Layout of the 44 digits:
//!
//! | Digits | Field |
//! |--------|-------|
//! | 2 | IBGE state code (cUF) |
//! | 4 | Year and month of issue (AAMM) |
//! | 14 | Issuer CNPJ |
//! | 2 | Model (55 / 65) |
//! | 3 | Series |
//! | 9 | Number |
//! | 1 | Emission type (tpEmis) |
//! | 8 | Random numeric code (cNF) |
//! | 1 | Check digit (cDV) |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::AccessKeyError;

/// Total number of digits in an access key.
pub const ACCESS_KEY_LEN: usize = 44;

/// Modulo-11 check digit over `digits` with weights 2..=9 cycling from the
/// rightmost digit. Returns `None` if `digits` contains a non-digit.
///
/// Remainders 0 and 1 map to check digit 0.
pub fn mod11_check_digit(digits: &str) -> Option<u8> {
    let mut sum: u32 = 0;
    for (i, c) in digits.chars().rev().enumerate() {
        let d = c.to_digit(10)?;
        sum += d * (2 + (i as u32 % 8));
    }
    let rem = sum % 11;
    Some(if rem < 2 { 0 } else { (11 - rem) as u8 })
}

/// Check digit for the first 43 digits of an access key.
pub fn access_key_check_digit(first43: &str) -> Option<u8> {
    if first43.len() != ACCESS_KEY_LEN - 1 {
        return None;
    }
    mod11_check_digit(first43)
}

/// Whether `key` is 44 ASCII digits whose last digit matches the check digit.
pub fn is_valid_access_key(key: &str) -> bool {
    if key.len() != ACCESS_KEY_LEN || !key.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let declared = key.as_bytes()[ACCESS_KEY_LEN - 1] - b'0';
    access_key_check_digit(&key[..ACCESS_KEY_LEN - 1]) == Some(declared)
}

/// Decoded access key fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessKey {
    /// IBGE state code of the issuer.
    pub state_code: u8,
    /// Two-digit year of issue.
    pub year: u8,
    pub month: u8,
    /// Issuer CNPJ (14 digits).
    pub cnpj: String,
    pub model: u8,
    pub series: u32,
    pub number: u64,
    pub emission_type: u8,
    /// 8-digit random code (cNF).
    pub numeric_code: u32,
    /// Declared check digit.
    pub check_digit: u8,
}

impl AccessKey {
    /// Split a 44-digit key into its fields. The check digit is *not* verified;
    /// use [`AccessKey::has_valid_check_digit`].
    pub fn parse(key: &str) -> Result<Self, AccessKeyError> {
        if key.len() != ACCESS_KEY_LEN {
            return Err(AccessKeyError::Length(key.chars().count()));
        }
        if !key.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AccessKeyError::NonDigit);
        }
        // All-ASCII digits, so byte slicing and integer parsing cannot fail.
        let num = |range: std::ops::Range<usize>| -> u64 {
            key[range].bytes().fold(0u64, |acc, b| acc * 10 + u64::from(b - b'0'))
        };
        Ok(Self {
            state_code: num(0..2) as u8,
            year: num(2..4) as u8,
            month: num(4..6) as u8,
            cnpj: key[6..20].to_string(),
            model: num(20..22) as u8,
            series: num(22..25) as u32,
            number: num(25..34),
            emission_type: num(34..35) as u8,
            numeric_code: num(35..43) as u32,
            check_digit: num(43..44) as u8,
        })
    }

    /// The first 43 digits, derived from the fields.
    pub fn body(&self) -> String {
        format!(
            "{:02}{:02}{:02}{:0>14}{:02}{:03}{:09}{:01}{:08}",
            self.state_code,
            self.year,
            self.month,
            self.cnpj,
            self.model,
            self.series,
            self.number,
            self.emission_type,
            self.numeric_code
        )
    }

    /// Whether the declared check digit matches the computed one.
    pub fn has_valid_check_digit(&self) -> bool {
        access_key_check_digit(&self.body()) == Some(self.check_digit)
    }

    /// Encode the fields with a freshly computed check digit.
    ///
    /// Returns `None` if a field does not fit its width.
    pub fn encode(&self) -> Option<String> {
        let body = self.body();
        if body.len() != ACCESS_KEY_LEN - 1 {
            return None;
        }
        let dv = access_key_check_digit(&body)?;
        Some(format!("{body}{dv}"))
    }
}

impl FromStr for AccessKey {
    type Err = AccessKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for AccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.body(), self.check_digit)
    }
}
