#![cfg(feature = "nfe")]

mod common;

use common::*;
use nfe_reforma::core::*;
use nfe_reforma::nfe;
use rust_decimal_macros::dec;

fn parsed(xml: &str) -> Document {
    let (doc, diagnostics) = nfe::parse(xml.as_bytes());
    assert!(diagnostics.is_empty(), "{diagnostics:?}");
    doc.unwrap()
}

fn validate_default(doc: &Document) -> Vec<Diagnostic> {
    validate(doc, &ValidationOptions::default())
}

fn only(diagnostics: &[Diagnostic]) -> (DiagnosticKind, &str) {
    assert_eq!(diagnostics.len(), 1, "{diagnostics:?}");
    (diagnostics[0].kind, diagnostics[0].field.as_str())
}

#[test]
fn clean_document_has_no_findings() {
    let doc = parsed(&single_item_xml("150.00", "150.00"));
    assert!(validate_default(&doc).is_empty());
}

#[test]
fn validation_does_not_mutate() {
    let doc = parsed(&single_item_xml("99.00", "100.00"));
    let before = doc.clone();
    let first = validate_default(&doc);
    let second = validate_default(&doc);
    assert_eq!(doc, before);
    assert_eq!(first, second);
}

// --- Total reconciliation ---

#[test]
fn difference_at_tolerance_is_accepted() {
    let doc = parsed(&single_item_xml("99.99", "100.00"));
    assert!(validate_default(&doc).is_empty());
}

#[test]
fn difference_beyond_tolerance_is_a_warning() {
    let doc = parsed(&single_item_xml("100.02", "100.00"));
    let diagnostics = validate_default(&doc);
    assert_eq!(only(&diagnostics), (DiagnosticKind::TotalMismatch, "total.ICMSTot.vProd"));
    assert_eq!(diagnostics[0].severity, Severity::Warning);
}

#[test]
fn overflowing_item_sum_is_reported() {
    let big = "50000000000000000000000000000";
    let xml = nfe_xml(
        &[
            item_xml(1, "22030000", "1", big, big),
            item_xml(2, "22030000", "1", big, big),
        ],
        "100.00",
    );
    let doc = parsed(&xml);
    let diagnostics = validate_default(&doc);
    assert_eq!(only(&diagnostics), (DiagnosticKind::ComputationError, "total.ICMSTot.vProd"));
    assert!(diagnostics[0].is_blocking());

    let off = ValidationOptions {
        reconcile_totals: false,
        ..ValidationOptions::default()
    };
    assert!(validate(&doc, &off).is_empty());
}

#[test]
fn reconciliation_can_be_disabled_or_widened() {
    let doc = parsed(&single_item_xml("100.02", "100.00"));
    let off = ValidationOptions {
        reconcile_totals: false,
        ..ValidationOptions::default()
    };
    assert!(validate(&doc, &off).is_empty());
    let wide = ValidationOptions {
        total_tolerance: dec!(0.05),
        ..ValidationOptions::default()
    };
    assert!(validate(&doc, &wide).is_empty());
}

#[test]
fn item_total_is_checked_against_quantity_times_price() {
    let doc = parsed(&nfe_xml(
        &[item_xml(1, "22030000", "3", "10.00", "31.00")],
        "31.00",
    ));
    let diagnostics = validate_default(&doc);
    assert_eq!(only(&diagnostics), (DiagnosticKind::TotalMismatch, "det[1].prod.vProd"));
}

// --- Check digits and formats ---

#[test]
fn bad_access_key_check_digit() {
    let xml = single_item_xml("100.00", "100.00").replace(ACCESS_KEY, &format!("{}0", &ACCESS_KEY[..43]));
    let diagnostics = validate_default(&parsed(&xml));
    assert_eq!(only(&diagnostics), (DiagnosticKind::ChecksumError, "infNFe.Id"));
    assert!(diagnostics[0].is_blocking());
}

#[test]
fn malformed_access_key() {
    let xml = single_item_xml("100.00", "100.00").replace(ACCESS_KEY, "123");
    let diagnostics = validate_default(&parsed(&xml));
    assert_eq!(only(&diagnostics), (DiagnosticKind::FormatError, "infNFe.Id"));
}

#[test]
fn access_key_disagreeing_with_header_is_a_warning() {
    let xml = single_item_xml("100.00", "100.00").replace("<nNF>123</nNF>", "<nNF>124</nNF>");
    let diagnostics = validate_default(&parsed(&xml));
    assert_eq!(only(&diagnostics), (DiagnosticKind::AccessKeyMismatch, "infNFe.Id"));
    assert!(!diagnostics[0].is_blocking());
}

#[test]
fn access_key_state_must_match_emitter() {
    let xml = single_item_xml("100.00", "100.00").replacen("<UF>SP</UF>", "<UF>MG</UF>", 1);
    let diagnostics = validate_default(&parsed(&xml));
    assert_eq!(only(&diagnostics), (DiagnosticKind::AccessKeyMismatch, "infNFe.Id"));
    assert!(diagnostics[0].message.contains("35 (SP)"), "{}", diagnostics[0].message);
    assert!(diagnostics[0].message.contains("31 (MG)"), "{}", diagnostics[0].message);
}

#[test]
fn bad_recipient_cnpj() {
    let xml = single_item_xml("100.00", "100.00").replace(RECIPIENT_CNPJ, "11222333000180");
    let doc = parsed(&xml);
    let diagnostics = validate_default(&doc);
    assert_eq!(only(&diagnostics), (DiagnosticKind::ChecksumError, "dest.CNPJ"));

    let lenient = ValidationOptions {
        validate_tax_ids: false,
        ..ValidationOptions::default()
    };
    assert!(validate(&doc, &lenient).is_empty());
}

#[test]
fn tax_id_length_is_always_checked() {
    let xml = single_item_xml("100.00", "100.00").replace(RECIPIENT_CNPJ, "1122233300018");
    let lenient = ValidationOptions {
        validate_tax_ids: false,
        ..ValidationOptions::default()
    };
    let diagnostics = validate(&parsed(&xml), &lenient);
    assert_eq!(only(&diagnostics), (DiagnosticKind::FormatError, "dest.CNPJ"));
}

#[test]
fn recipient_cpf_is_checked() {
    let xml = single_item_xml("100.00", "100.00").replace(
        &format!("<CNPJ>{RECIPIENT_CNPJ}</CNPJ>"),
        "<CPF>12345678900</CPF>",
    );
    let diagnostics = validate_default(&parsed(&xml));
    assert_eq!(only(&diagnostics), (DiagnosticKind::ChecksumError, "dest.CPF"));
}

#[test]
fn unknown_state() {
    let xml = single_item_xml("100.00", "100.00").replace("<UF>RJ</UF>", "<UF>XX</UF>");
    let diagnostics = validate_default(&parsed(&xml));
    assert_eq!(only(&diagnostics), (DiagnosticKind::FormatError, "dest.enderDest.UF"));
}

// --- Values and sequences ---

#[test]
fn negative_values_are_blocking() {
    let xml = nfe_xml(&[item_xml(1, "22030000", "-1", "10.00", "-10.00")], "-10.00");
    let diagnostics = validate_default(&parsed(&xml));
    let negative: Vec<&str> = diagnostics
        .iter()
        .filter(|d| d.kind == DiagnosticKind::NegativeValueError)
        .map(|d| d.field.as_str())
        .collect();
    assert_eq!(negative, vec!["det[1].prod.qCom", "det[1].prod.vProd", "total.ICMSTot.vProd"]);
    assert!(has_blocking(&diagnostics));
}

#[test]
fn item_numbers_must_be_sequential_and_unique() {
    let xml = nfe_xml(
        &[
            item_xml(1, "22030000", "1", "1.00", "1.00"),
            item_xml(1, "22030000", "1", "1.00", "1.00"),
            item_xml(4, "22030000", "1", "1.00", "1.00"),
        ],
        "3.00",
    );
    let diagnostics = validate_default(&parsed(&xml));
    let fields: Vec<&str> = diagnostics.iter().map(|d| d.field.as_str()).collect();
    assert_eq!(fields, vec!["det[2].nItem", "det[3].nItem"]);
    assert!(diagnostics.iter().all(|d| d.kind == DiagnosticKind::StructuralError));
}

#[test]
fn every_check_runs_independently() {
    let xml = single_item_xml("100.02", "100.00")
        .replace(ACCESS_KEY, &format!("{}0", &ACCESS_KEY[..43]))
        .replace(RECIPIENT_CNPJ, "11222333000180")
        .replace("<UF>SP</UF>", "<UF>ZZ</UF>");
    let diagnostics = validate_default(&parsed(&xml));
    let kinds: Vec<DiagnosticKind> = diagnostics.iter().map(|d| d.kind).collect();
    assert_eq!(
        kinds,
        vec![
            DiagnosticKind::ChecksumError,
            DiagnosticKind::FormatError,
            DiagnosticKind::ChecksumError,
            DiagnosticKind::TotalMismatch,
        ]
    );
}

#[test]
fn builder_refuses_invalid_documents() {
    let result = DocumentBuilder::new(1, 1, chrono::NaiveDate::from_ymd_opt(2024, 5, 10).unwrap())
        .emitter(
            PartyBuilder::new("Emitente", TaxId::Cnpj(EMITTER_CNPJ.into()))
                .address(AddressBuilder::new("São Paulo", "SP").build())
                .build(),
        )
        .recipient(PartyBuilder::new("Cliente", TaxId::Cnpj("11222333000180".into())).build())
        .add_item(ItemBuilder::new("P1", "Produto", "22030000", dec!(1), dec!(10)).build())
        .build();
    match result {
        Err(NfeError::Validation(message)) => assert!(message.contains("dest.CNPJ")),
        other => panic!("expected validation error, got {other:?}"),
    }
}
