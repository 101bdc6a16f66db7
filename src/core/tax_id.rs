//! CNPJ and CPF check digits.

/// Number of digits in a CNPJ.
pub const CNPJ_LEN: usize = 14;
/// Number of digits in a CPF.
pub const CPF_LEN: usize = 11;

const CNPJ_WEIGHTS_1: [u32; 12] = [5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
const CNPJ_WEIGHTS_2: [u32; 13] = [6, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];

fn digits(s: &str) -> Option<Vec<u32>> {
    s.chars().map(|c| c.to_digit(10)).collect()
}

/// One weighted modulo-11 pass: `11 - sum % 11`, with 10 and 11 mapping to 0.
fn check_digit(values: &[u32], weights: impl Iterator<Item = u32>) -> u32 {
    let sum: u32 = values.iter().zip(weights).map(|(d, w)| d * w).sum();
    let dv = 11 - sum % 11;
    if dv >= 10 { 0 } else { dv }
}

/// Both CNPJ check digits for a 12-digit base.
pub fn cnpj_check_digits(base: &str) -> Option<(u8, u8)> {
    let mut values = digits(base)?;
    if values.len() != CNPJ_LEN - 2 {
        return None;
    }
    let first = check_digit(&values, CNPJ_WEIGHTS_1.into_iter());
    values.push(first);
    let second = check_digit(&values, CNPJ_WEIGHTS_2.into_iter());
    Some((first as u8, second as u8))
}

/// Whether `cnpj` is 14 digits and both check digits match.
///
/// Repeated-digit sequences such as `00000000000000` pass this test; see
/// [`is_repeated_sequence`].
pub fn is_valid_cnpj(cnpj: &str) -> bool {
    if cnpj.len() != CNPJ_LEN || !cnpj.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let b = cnpj.as_bytes();
    cnpj_check_digits(&cnpj[..12]) == Some((b[12] - b'0', b[13] - b'0'))
}

/// Append check digits to a 12-digit CNPJ base.
pub fn complete_cnpj(base: &str) -> Option<String> {
    let (d1, d2) = cnpj_check_digits(base)?;
    Some(format!("{base}{d1}{d2}"))
}

/// Both CPF check digits for a 9-digit base.
pub fn cpf_check_digits(base: &str) -> Option<(u8, u8)> {
    let mut values = digits(base)?;
    if values.len() != CPF_LEN - 2 {
        return None;
    }
    let first = check_digit(&values, (2..=10).rev());
    values.push(first);
    let second = check_digit(&values, (2..=11).rev());
    Some((first as u8, second as u8))
}

/// Whether `cpf` is 11 digits and both check digits match.
pub fn is_valid_cpf(cpf: &str) -> bool {
    if cpf.len() != CPF_LEN || !cpf.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let b = cpf.as_bytes();
    cpf_check_digits(&cpf[..9]) == Some((b[9] - b'0', b[10] - b'0'))
}

/// Append check digits to a 9-digit CPF base.
pub fn complete_cpf(base: &str) -> Option<String> {
    let (d1, d2) = cpf_check_digits(base)?;
    Some(format!("{base}{d1}{d2}"))
}

/// Whether every character of `s` is the same (e.g. `11111111111111`).
pub fn is_repeated_sequence(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => chars.all(|c| c == first),
        None => false,
    }
}

/// Whether `s` is exactly `len` ASCII digits.
pub fn is_digits(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_digit())
}

/// Format a CNPJ as `12.345.678/0001-95`. Returns `None` unless 14 digits.
pub fn format_cnpj(cnpj: &str) -> Option<String> {
    if !is_digits(cnpj, CNPJ_LEN) {
        return None;
    }
    Some(format!(
        "{}.{}.{}/{}-{}",
        &cnpj[0..2],
        &cnpj[2..5],
        &cnpj[5..8],
        &cnpj[8..12],
        &cnpj[12..14]
    ))
}

/// Strip punctuation from a formatted CNPJ/CPF.
pub fn strip_formatting(s: &str) -> String {
    s.chars().filter(|c| !matches!(c, '.' | '/' | '-' | ' ')).collect()
}
