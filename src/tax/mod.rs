//! Reform tax engine: IBS, CBS and IS per item, aggregated per document.
//!
//! For every item and tax kind the rate is resolved through a [`RateLookup`],
//! then `value = round_half_even(base * rate / 100, 2)`. The document
//! aggregate is the sum of the already-rounded item values.
//!
//! ```
//! use chrono::NaiveDate;
//! use nfe_reforma::core::*;
//! use nfe_reforma::tax::{RateTable, compute_taxes};
//! use rust_decimal_macros::dec;
//!
//! let mut doc = DocumentBuilder::new(1, 1, NaiveDate::from_ymd_opt(2026, 3, 1).unwrap())
//!     .emitter(PartyBuilder::new("Emitente", TaxId::Cnpj("12345678000195".into()))
//!         .address(AddressBuilder::new("São Paulo", "SP").build()).build())
//!     .recipient(PartyBuilder::new("Cliente", TaxId::Cnpj("11222333000181".into())).build())
//!     .add_item(ItemBuilder::new("P1", "Produto", "22030000", dec!(1), dec!(100.00)).build())
//!     .build()
//!     .unwrap();
//!
//! let rates = RateTable::new()
//!     .with_rate(TaxKind::Ibs, "*", "*", dec!(10.50))
//!     .with_rate(TaxKind::Cbs, "BR", "*", dec!(8.80))
//!     .with_rate(TaxKind::Selective, "BR", "*", dec!(0));
//! let diagnostics = compute_taxes(&mut doc, &rates, &TaxOptions::default());
//!
//! assert!(diagnostics.is_empty());
//! assert_eq!(doc.items[0].tax.ibs.value, Some(dec!(10.50)));
//! assert_eq!(doc.tax_totals.unwrap().total(), Some(dec!(19.30)));
//! ```

mod rates;

pub use rates::{FEDERAL_JURISDICTION, Rate, RateEntry, RateLookup, RateQuery, RateTable, WILDCARD};

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::core::{
    Diagnostic, DiagnosticKind, Document, Item, RateNotFoundPolicy, Stage, TaxComponent, TaxKind,
    TaxOptions, TaxTotals, round_half_even,
};

/// Compute reform taxes for every item and store the aggregate in
/// `doc.tax_totals`.
///
/// Items whose computation fails are reported with a `ComputationError`,
/// left with unset values and excluded from the aggregate; the remaining
/// items are still computed.
pub fn compute_taxes(
    doc: &mut Document,
    rates: &dyn RateLookup,
    options: &TaxOptions,
) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let Some(as_of) = doc.issue_date else {
        diagnostics.push(
            Diagnostic::new(
                DiagnosticKind::StructuralError,
                "ide.dhEmi",
                "issue date is required to resolve tax rates",
            )
            .in_stage(Stage::Tax),
        );
        return diagnostics;
    };

    let ibs_jurisdiction = ibs_jurisdiction(doc);
    let mut failed = 0usize;

    for (index, item) in doc.items.iter_mut().enumerate() {
        let ctx = ItemContext {
            field: format!("det[{}].imposto", index + 1),
            ibs_jurisdiction: &ibs_jurisdiction,
            as_of,
            policy: options.rate_not_found,
        };
        if let Err(diagnostic) = compute_item(item, &ctx, rates, &mut diagnostics) {
            item.tax.clear_computed();
            diagnostics.push(diagnostic);
            failed += 1;
        }
    }

    let (totals, overflowed) = accumulate(&doc.items);
    for index in overflowed {
        if let Some(item) = doc.items.get_mut(index) {
            item.tax.clear_computed();
        }
        diagnostics.push(Diagnostic::new(
            DiagnosticKind::ComputationError,
            format!("det[{}].imposto", index + 1),
            "item taxes overflow the document totals; item excluded from totals",
        ));
        failed += 1;
    }
    tracing::debug!(
        items = doc.items.len(),
        failed,
        ibs = %totals.ibs.value,
        cbs = %totals.cbs.value,
        selective = %totals.selective.value,
        "reform taxes computed"
    );
    doc.tax_totals = Some(totals);

    diagnostics
}

/// Sum bases and values of every item component that has a value.
///
/// Values are added as stored; nothing is re-rounded. An item whose
/// contribution would overflow any sum is skipped as a whole.
pub fn aggregate(items: &[Item]) -> TaxTotals {
    accumulate(items).0
}

/// Totals plus the indices of the items skipped on overflow.
fn accumulate(items: &[Item]) -> (TaxTotals, Vec<usize>) {
    let mut totals = TaxTotals::default();
    let mut overflowed = Vec::new();
    for (index, item) in items.iter().enumerate() {
        match with_item(totals, item) {
            Some(next) => totals = next,
            None => overflowed.push(index),
        }
    }
    (totals, overflowed)
}

fn with_item(mut totals: TaxTotals, item: &Item) -> Option<TaxTotals> {
    for kind in TaxKind::ALL {
        let component = item.tax.component(kind);
        if let Some(value) = component.value {
            let sum = totals.get_mut(kind);
            sum.value = sum.value.checked_add(value)?;
            sum.base = sum
                .base
                .checked_add(component.base.unwrap_or(item.total_value))?;
        }
    }
    Some(totals)
}

/// `round_half_even(base * rate / 100, 2)`, or `None` on overflow.
pub fn tax_value(base: Decimal, rate: Decimal) -> Option<Decimal> {
    base.checked_mul(rate)?
        .checked_div(Decimal::ONE_HUNDRED)
        .map(|v| round_half_even(v, 2))
}

/// IBS is due to the destination state; fall back to the origin, then to
/// the federal jurisdiction when neither party carries a UF.
fn ibs_jurisdiction(doc: &Document) -> String {
    doc.recipient
        .as_ref()
        .and_then(|p| p.address.state.clone())
        .or_else(|| doc.emitter.as_ref().and_then(|p| p.address.state.clone()))
        .unwrap_or_else(|| FEDERAL_JURISDICTION.to_string())
}

struct ItemContext<'a> {
    field: String,
    ibs_jurisdiction: &'a str,
    as_of: NaiveDate,
    policy: RateNotFoundPolicy,
}

fn compute_item(
    item: &mut Item,
    ctx: &ItemContext<'_>,
    rates: &dyn RateLookup,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<(), Diagnostic> {
    let mut computed = [TaxComponent::default(); 3];

    for (slot, kind) in computed.iter_mut().zip(TaxKind::ALL) {
        let current = item.tax.component(kind);
        let base = current.base.unwrap_or(item.total_value);
        let jurisdiction = if kind.is_federal() {
            FEDERAL_JURISDICTION
        } else {
            ctx.ibs_jurisdiction
        };
        let query = RateQuery {
            kind,
            jurisdiction,
            classification: &item.classification,
            as_of: ctx.as_of,
        };

        let rate = match rates.lookup(&query) {
            Some(rate) => rate.percent,
            None => {
                diagnostics.push(Diagnostic::with_severity(
                    DiagnosticKind::RateNotFound,
                    ctx.policy.severity(),
                    format!("{}.{}", ctx.field, kind.code()),
                    format!(
                        "no {} rate for jurisdiction {jurisdiction}, classification '{}' on {}",
                        kind.code(),
                        item.classification,
                        ctx.as_of
                    ),
                ));
                match ctx.policy {
                    RateNotFoundPolicy::Warn => Decimal::ZERO,
                    RateNotFoundPolicy::Block => {
                        *slot = TaxComponent {
                            base: current.base,
                            rate: None,
                            value: None,
                        };
                        continue;
                    }
                }
            }
        };

        let value = tax_value(base, rate).ok_or_else(|| {
            Diagnostic::new(
                DiagnosticKind::ComputationError,
                format!("{}.{}", ctx.field, kind.code()),
                format!("{} computation overflowed for base {base} and rate {rate}", kind.code()),
            )
        })?;
        if value.is_sign_negative() && !value.is_zero() {
            return Err(Diagnostic::new(
                DiagnosticKind::ComputationError,
                format!("{}.{}", ctx.field, kind.code()),
                format!("{} value {value} is negative; item excluded from totals", kind.code()),
            ));
        }

        *slot = TaxComponent {
            base: Some(base),
            rate: Some(rate),
            value: Some(value),
        };
    }

    for (kind, component) in TaxKind::ALL.into_iter().zip(computed) {
        *item.tax.component_mut(kind) = component;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Address, Party, TaxDetail, TaxId};
    use rust_decimal_macros::dec;

    fn item(sequence: u32, total: Decimal) -> Item {
        Item {
            sequence,
            product_code: format!("P{sequence}"),
            description: "Produto".into(),
            classification: "22030000".into(),
            cfop: None,
            unit: None,
            quantity: dec!(1),
            unit_value: total,
            total_value: total,
            tax: TaxDetail::default(),
        }
    }

    fn party(state: &str) -> Party {
        Party {
            tax_id: Some(TaxId::Cnpj("12345678000195".into())),
            name: "Parte".into(),
            trade_name: None,
            state_registration: None,
            address: Address {
                state: Some(state.into()),
                ..Default::default()
            },
            email: None,
        }
    }

    fn doc(items: Vec<Item>) -> Document {
        Document {
            issue_date: NaiveDate::from_ymd_opt(2026, 3, 1),
            emitter: Some(party("SP")),
            recipient: Some(party("RJ")),
            items,
            ..Default::default()
        }
    }

    fn rates() -> RateTable {
        RateTable::new()
            .with_rate(TaxKind::Ibs, "RJ", "*", dec!(10.50))
            .with_rate(TaxKind::Ibs, "SP", "*", dec!(17.00))
            .with_rate(TaxKind::Cbs, "BR", "*", dec!(8.80))
            .with_rate(TaxKind::Selective, "BR", "*", dec!(0))
    }

    #[test]
    fn base_times_rate() {
        let mut d = doc(vec![item(1, dec!(100.00))]);
        let diagnostics = compute_taxes(&mut d, &rates(), &TaxOptions::default());
        assert!(diagnostics.is_empty());
        let tax = &d.items[0].tax;
        assert_eq!(tax.ibs.value, Some(dec!(10.50)));
        assert_eq!(tax.ibs.rate, Some(dec!(10.50)));
        assert_eq!(tax.ibs.base, Some(dec!(100.00)));
        assert_eq!(tax.cbs.value, Some(dec!(8.80)));
        assert_eq!(tax.selective.value, Some(dec!(0)));
    }

    #[test]
    fn recipient_state_drives_ibs() {
        let mut d = doc(vec![item(1, dec!(100.00))]);
        d.recipient.as_mut().unwrap().address.state = None;
        compute_taxes(&mut d, &rates(), &TaxOptions::default());
        assert_eq!(d.items[0].tax.ibs.value, Some(dec!(17.00)));
    }

    #[test]
    fn base_override_is_used() {
        let mut it = item(1, dec!(100.00));
        it.tax.cbs.base = Some(dec!(40.00));
        let mut d = doc(vec![it]);
        compute_taxes(&mut d, &rates(), &TaxOptions::default());
        assert_eq!(d.items[0].tax.cbs.value, Some(dec!(3.52)));
        assert_eq!(d.tax_totals.unwrap().cbs.base, dec!(40.00));
    }

    #[test]
    fn rounding_is_half_even() {
        // 0.25 * 10 / 100 = 0.025 -> 0.02; 0.35 * 10 / 100 = 0.035 -> 0.04
        let table = RateTable::new().with_rate(TaxKind::Ibs, "*", "*", dec!(10));
        assert_eq!(tax_value(dec!(0.25), dec!(10)), Some(dec!(0.02)));
        assert_eq!(tax_value(dec!(0.35), dec!(10)), Some(dec!(0.04)));
        let mut d = doc(vec![item(1, dec!(0.25))]);
        compute_taxes(&mut d, &table, &TaxOptions::default());
        assert_eq!(d.items[0].tax.ibs.value, Some(dec!(0.02)));
    }

    #[test]
    fn aggregate_sums_rounded_item_values() {
        // Each item: 0.25 * 10% = 0.025 -> 0.02. Three items: 0.06, not round(0.075) = 0.08.
        let table = RateTable::new()
            .with_rate(TaxKind::Ibs, "*", "*", dec!(10))
            .with_rate(TaxKind::Cbs, "*", "*", dec!(0))
            .with_rate(TaxKind::Selective, "*", "*", dec!(0));
        let mut d = doc(vec![item(1, dec!(0.25)), item(2, dec!(0.25)), item(3, dec!(0.25))]);
        compute_taxes(&mut d, &table, &TaxOptions::default());
        let totals = d.tax_totals.unwrap();
        assert_eq!(totals.ibs.value, dec!(0.06));
        assert_eq!(totals.ibs.base, dec!(0.75));
        assert_eq!(totals, aggregate(&d.items));
    }

    #[test]
    fn missing_rate_warns_and_defaults_to_zero() {
        let table = RateTable::new().with_rate(TaxKind::Cbs, "BR", "*", dec!(8.80));
        let mut d = doc(vec![item(1, dec!(100.00))]);
        let diagnostics = compute_taxes(&mut d, &table, &TaxOptions::default());
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics.iter().all(|d| d.kind == DiagnosticKind::RateNotFound));
        assert!(diagnostics.iter().all(|d| !d.is_blocking()));
        assert_eq!(diagnostics[0].field, "det[1].imposto.IBS");
        assert_eq!(d.items[0].tax.ibs.value, Some(Decimal::ZERO));
        assert_eq!(d.items[0].tax.ibs.rate, Some(Decimal::ZERO));
    }

    #[test]
    fn missing_rate_can_block() {
        let table = RateTable::new().with_rate(TaxKind::Cbs, "BR", "*", dec!(8.80));
        let mut d = doc(vec![item(1, dec!(100.00))]);
        let options = TaxOptions {
            rate_not_found: RateNotFoundPolicy::Block,
        };
        let diagnostics = compute_taxes(&mut d, &table, &options);
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics.iter().all(|d| d.is_blocking()));
        assert_eq!(d.items[0].tax.ibs.value, None);
        assert_eq!(d.items[0].tax.cbs.value, Some(dec!(8.80)));
        assert_eq!(d.tax_totals.unwrap().total(), Some(dec!(8.80)));
    }

    #[test]
    fn negative_result_excludes_only_that_item() {
        let mut d = doc(vec![item(1, dec!(100.00)), item(2, dec!(-50.00)), item(3, dec!(10.00))]);
        let diagnostics = compute_taxes(&mut d, &rates(), &TaxOptions::default());
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::ComputationError);
        assert!(diagnostics[0].is_blocking());
        assert_eq!(diagnostics[0].field, "det[2].imposto.IBS");
        assert!(d.items[1].tax.ibs.value.is_none());
        assert!(d.items[1].tax.cbs.value.is_none());
        let totals = d.tax_totals.unwrap();
        assert_eq!(totals.ibs.value, dec!(11.55));
        assert_eq!(totals.cbs.value, dec!(9.68));
    }

    #[test]
    fn overflow_is_a_computation_error() {
        let table = RateTable::new().with_rate(TaxKind::Ibs, "*", "*", Decimal::MAX);
        let mut d = doc(vec![item(1, Decimal::MAX)]);
        let diagnostics = compute_taxes(&mut d, &table, &TaxOptions::default());
        assert!(diagnostics.iter().any(|d| d.kind == DiagnosticKind::ComputationError));
        assert!(d.items[0].tax.ibs.value.is_none());
    }

    #[test]
    fn totals_overflow_excludes_the_item() {
        let huge = Decimal::from_i128_with_scale(50_000_000_000_000_000_000_000_000_000, 0);
        let flat = RateTable::new()
            .with_rate(TaxKind::Ibs, "*", "*", dec!(1))
            .with_rate(TaxKind::Cbs, "*", "*", dec!(1))
            .with_rate(TaxKind::Selective, "*", "*", dec!(0));
        let mut d = doc(vec![item(1, huge), item(2, huge), item(3, dec!(100.00))]);

        let diagnostics = compute_taxes(&mut d, &flat, &TaxOptions::default());
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::ComputationError);
        assert_eq!(diagnostics[0].field, "det[2].imposto");
        assert!(d.items[1].tax.ibs.value.is_none());
        assert_eq!(d.items[2].tax.ibs.value, Some(dec!(1.00)));

        let totals = d.tax_totals.unwrap();
        assert_eq!(totals.ibs.base, huge + dec!(100.00));
        assert_eq!(totals, aggregate(&d.items));
    }

    #[test]
    fn missing_issue_date_stops_computation() {
        let mut d = doc(vec![item(1, dec!(100.00))]);
        d.issue_date = None;
        let diagnostics = compute_taxes(&mut d, &rates(), &TaxOptions::default());
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::StructuralError);
        assert_eq!(diagnostics[0].stage, Stage::Tax);
        assert!(d.tax_totals.is_none());
        assert!(d.items[0].tax.ibs.value.is_none());
    }

    #[test]
    fn recomputation_is_stable() {
        let mut d = doc(vec![item(1, dec!(123.45)), item(2, dec!(0.99))]);
        compute_taxes(&mut d, &rates(), &TaxOptions::default());
        let first = d.clone();
        compute_taxes(&mut d, &rates(), &TaxOptions::default());
        assert_eq!(first, d);
    }
}
