use std::collections::HashSet;

use rust_decimal::{Decimal, RoundingStrategy};

use super::access_key::{ACCESS_KEY_LEN, AccessKey, is_valid_access_key};
use super::config::ValidationOptions;
use super::error::{Diagnostic, DiagnosticKind, Stage};
use super::states::{is_known_state, is_known_state_code, state_abbreviation, state_code};
use super::tax_id::{CNPJ_LEN, CPF_LEN, is_digits, is_repeated_sequence, is_valid_cnpj, is_valid_cpf};
use super::types::*;

/// Validate a document's format, check digits and business rules.
///
/// Pure: the document is not modified and the same input always yields the
/// same diagnostics. Every check runs independently, so one failure never
/// hides another.
pub fn validate(doc: &Document, options: &ValidationOptions) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    validate_access_key(&doc.access_key, "infNFe.Id", &mut diagnostics);
    validate_key_consistency(doc, &mut diagnostics);

    if let Some(emitter) = &doc.emitter {
        validate_party(emitter, "emit", "enderEmit", options, &mut diagnostics);
    }
    if let Some(recipient) = &doc.recipient {
        validate_party(recipient, "dest", "enderDest", options, &mut diagnostics);
    }

    validate_sequences(&doc.items, &mut diagnostics);
    for (index, item) in doc.items.iter().enumerate() {
        validate_item(item, index, options, &mut diagnostics);
    }

    if let Some(declared) = doc.declared_total {
        check_non_negative(declared, "total.ICMSTot.vProd", &mut diagnostics);
        if options.reconcile_totals && !doc.items.is_empty() {
            match doc.items_total() {
                Some(computed) => check_tolerance(
                    declared,
                    computed,
                    options.total_tolerance,
                    "total.ICMSTot.vProd",
                    "declared total",
                    &mut diagnostics,
                ),
                None => diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::ComputationError,
                        "total.ICMSTot.vProd",
                        "sum of item totals overflows; declared total cannot be reconciled",
                    )
                    .in_stage(Stage::Validate),
                ),
            }
        }
    }

    diagnostics
}

/// Check the shape and check digit of an access key.
pub fn validate_access_key(key: &str, field: &str, diagnostics: &mut Vec<Diagnostic>) {
    if !is_digits(key, ACCESS_KEY_LEN) {
        diagnostics.push(Diagnostic::new(
            DiagnosticKind::FormatError,
            field,
            format!("access key must be exactly {ACCESS_KEY_LEN} digits"),
        ));
        return;
    }
    if !is_valid_access_key(key) {
        diagnostics.push(Diagnostic::new(
            DiagnosticKind::ChecksumError,
            field,
            "access key check digit does not match",
        ));
    }
}

/// Cross-check the fields embedded in the access key against the header.
fn validate_key_consistency(doc: &Document, diagnostics: &mut Vec<Diagnostic>) {
    let Ok(key) = AccessKey::parse(&doc.access_key) else {
        return;
    };
    let field = "infNFe.Id";

    if !is_known_state_code(key.state_code) {
        diagnostics.push(Diagnostic::new(
            DiagnosticKind::FormatError,
            field,
            format!("access key state code {:02} is not a known IBGE code", key.state_code),
        ));
    }
    if DocumentModel::from_code(key.model).is_none() {
        diagnostics.push(Diagnostic::new(
            DiagnosticKind::FormatError,
            field,
            format!("access key model {:02} is neither 55 nor 65", key.model),
        ));
    }

    let mut mismatch = |what: &str, key_value: String, doc_value: String| {
        diagnostics.push(Diagnostic::new(
            DiagnosticKind::AccessKeyMismatch,
            field,
            format!("access key {what} {key_value} differs from document {what} {doc_value}"),
        ));
    };

    if let Some(model) = doc.model {
        if model.code() != key.model {
            mismatch("model", key.model.to_string(), model.code().to_string());
        }
    }
    if let Some(series) = doc.series {
        if series != key.series {
            mismatch("series", key.series.to_string(), series.to_string());
        }
    }
    if let Some(number) = doc.number {
        if number != key.number {
            mismatch("number", key.number.to_string(), number.to_string());
        }
    }
    if let Some(date) = doc.issue_date {
        let year_month = date.format("%y%m").to_string();
        let key_year_month = format!("{:02}{:02}", key.year, key.month);
        if year_month != key_year_month {
            mismatch("year-month", key_year_month, year_month);
        }
    }
    if let Some(uf) = doc.emitter.as_ref().and_then(|p| p.address.state.as_deref()) {
        if let Some(code) = state_code(uf).filter(|c| *c != key.state_code) {
            let key_state = match state_abbreviation(key.state_code) {
                Some(key_uf) => format!("{:02} ({key_uf})", key.state_code),
                None => format!("{:02}", key.state_code),
            };
            mismatch("state", key_state, format!("{code:02} ({uf})"));
        }
    }
    if let Some(TaxId::Cnpj(cnpj)) = doc.emitter.as_ref().and_then(|p| p.tax_id.as_ref()) {
        if *cnpj != key.cnpj {
            mismatch("issuer CNPJ", key.cnpj.clone(), cnpj.clone());
        }
    }
}

fn validate_party(
    party: &Party,
    prefix: &str,
    address_element: &str,
    options: &ValidationOptions,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if let Some(tax_id) = &party.tax_id {
        let field = format!("{prefix}.{}", tax_id.element_name());
        validate_tax_id(tax_id, &field, options.validate_tax_ids, diagnostics);
    }

    if let Some(state) = &party.address.state {
        if !is_known_state(state) {
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::FormatError,
                format!("{prefix}.{address_element}.UF"),
                format!("'{state}' is not a known state abbreviation"),
            ));
        }
    }
}

/// Check a CNPJ/CPF. The digit-count check always runs; check digits are
/// verified only when `check_digits` is set.
pub fn validate_tax_id(
    tax_id: &TaxId,
    field: &str,
    check_digits: bool,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let (label, len, digits_ok): (&str, usize, fn(&str) -> bool) = match tax_id {
        TaxId::Cnpj(_) => ("CNPJ", CNPJ_LEN, is_valid_cnpj),
        TaxId::Cpf(_) => ("CPF", CPF_LEN, is_valid_cpf),
    };
    let value = tax_id.digits();

    if !is_digits(value, len) {
        diagnostics.push(Diagnostic::new(
            DiagnosticKind::FormatError,
            field,
            format!("{label} must be exactly {len} digits"),
        ));
        return;
    }
    if is_repeated_sequence(value) {
        diagnostics.push(Diagnostic::new(
            DiagnosticKind::FormatError,
            field,
            format!("{label} must not be a single repeated digit"),
        ));
    }
    if check_digits && !digits_ok(value) {
        diagnostics.push(Diagnostic::new(
            DiagnosticKind::ChecksumError,
            field,
            format!("{label} check digits do not match"),
        ));
    }
}

fn validate_sequences(items: &[Item], diagnostics: &mut Vec<Diagnostic>) {
    let mut seen = HashSet::new();
    for (index, item) in items.iter().enumerate() {
        let field = format!("det[{}].nItem", index + 1);
        if !seen.insert(item.sequence) {
            diagnostics.push(
                Diagnostic::new(
                    DiagnosticKind::StructuralError,
                    field,
                    format!("duplicate item number {}", item.sequence),
                )
                .in_stage(Stage::Validate),
            );
        } else if item.sequence as usize != index + 1 {
            diagnostics.push(
                Diagnostic::new(
                    DiagnosticKind::StructuralError,
                    field,
                    format!("item number {} out of sequence, expected {}", item.sequence, index + 1),
                )
                .in_stage(Stage::Validate),
            );
        }
    }
}

fn validate_item(
    item: &Item,
    index: usize,
    options: &ValidationOptions,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let prefix = format!("det[{}].prod", index + 1);

    check_non_negative(item.quantity, &format!("{prefix}.qCom"), diagnostics);
    check_non_negative(item.unit_value, &format!("{prefix}.vUnCom"), diagnostics);
    check_non_negative(item.total_value, &format!("{prefix}.vProd"), diagnostics);

    if let Some(expected) = item
        .quantity
        .checked_mul(item.unit_value)
        .map(|v| round_half_even(v, 2))
    {
        check_tolerance(
            item.total_value,
            expected,
            options.total_tolerance,
            &format!("{prefix}.vProd"),
            "item total",
            diagnostics,
        );
    }
}

/// Round to `dp` decimal places, ties to even.
pub fn round_half_even(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointNearestEven)
}

fn check_non_negative(value: Decimal, field: &str, diagnostics: &mut Vec<Diagnostic>) {
    if value.is_sign_negative() && !value.is_zero() {
        diagnostics.push(Diagnostic::new(
            DiagnosticKind::NegativeValueError,
            field,
            format!("value {value} must not be negative"),
        ));
    }
}

/// `TotalMismatch` when `|declared - computed| > tolerance`.
fn check_tolerance(
    declared: Decimal,
    computed: Decimal,
    tolerance: Decimal,
    field: &str,
    what: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let Some(difference) = declared.checked_sub(computed) else {
        return;
    };
    if difference.abs() > tolerance {
        diagnostics.push(Diagnostic::new(
            DiagnosticKind::TotalMismatch,
            field,
            format!("{what} {declared} differs from computed {computed} by {}", difference.abs()),
        ));
    }
}
