use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::Diagnostic;

/// An NF-e / NFC-e fiscal document.
///
/// Values are `Option` wherever the parser may return a partial document.
/// Equality compares fiscal content only: `status`, `diagnostics` and the
/// retained source text are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    /// 44-digit access key (chave de acesso), without the `NFe` prefix.
    pub access_key: String,
    /// Document model (`mod`): NF-e or NFC-e.
    pub model: Option<DocumentModel>,
    /// Series (`serie`).
    pub series: Option<u32>,
    /// Document number (`nNF`).
    pub number: Option<u64>,
    /// Issue date (`dhEmi`, or legacy `dEmi`).
    pub issue_date: Option<NaiveDate>,
    /// Nature of the operation (`natOp`).
    pub operation_nature: Option<String>,
    /// Pipeline stage reached.
    pub status: DocumentStatus,
    /// Issuer (`emit`).
    pub emitter: Option<Party>,
    /// Recipient (`dest`).
    pub recipient: Option<Party>,
    /// Line items (`det`), in document order.
    pub items: Vec<Item>,
    /// Declared sum of item totals (`ICMSTot/vProd`).
    pub declared_total: Option<Decimal>,
    /// Declared invoice total (`ICMSTot/vNF`), carried unmodified.
    pub invoice_total: Option<Decimal>,
    /// Other `ICMSTot` values (`vICMS`, `vPIS`, `vFrete`, ...), carried unmodified.
    pub legacy_totals: BTreeMap<String, Decimal>,
    /// Reform tax aggregate (set by `compute_taxes`).
    pub tax_totals: Option<TaxTotals>,
    /// Findings accumulated while processing this document.
    pub diagnostics: Vec<Diagnostic>,
    /// Original XML text, used by the generator to preserve untouched sections.
    #[serde(skip)]
    pub source: Option<String>,
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.access_key == other.access_key
            && self.model == other.model
            && self.series == other.series
            && self.number == other.number
            && self.issue_date == other.issue_date
            && self.operation_nature == other.operation_nature
            && self.emitter == other.emitter
            && self.recipient == other.recipient
            && self.items == other.items
            && self.declared_total == other.declared_total
            && self.invoice_total == other.invoice_total
            && self.legacy_totals == other.legacy_totals
            && self.tax_totals == other.tax_totals
    }
}

impl Document {
    /// Sum of all item totals, or `None` if the sum overflows.
    pub fn items_total(&self) -> Option<Decimal> {
        self.items
            .iter()
            .try_fold(Decimal::ZERO, |sum, i| sum.checked_add(i.total_value))
    }

    /// Move the status forward. Returns `false` (and changes nothing) if
    /// `next` is not after the current status or the current status is terminal.
    pub fn advance(&mut self, next: DocumentStatus) -> bool {
        if self.status.can_advance_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }

    /// Whether any recorded diagnostic is blocking or fatal.
    pub fn has_blocking_diagnostics(&self) -> bool {
        super::error::has_blocking(&self.diagnostics)
    }

    /// Condensed view for listings and logs.
    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            access_key: self.access_key.clone(),
            series: self.series,
            number: self.number,
            issue_date: self.issue_date,
            status: self.status,
            emitter_name: self.emitter.as_ref().map(|p| p.name.clone()),
            recipient_name: self.recipient.as_ref().map(|p| p.name.clone()),
            item_count: self.items.len(),
            declared_total: self.declared_total,
            invoice_total: self.invoice_total,
            reform_tax_total: self.tax_totals.as_ref().and_then(TaxTotals::total),
        }
    }
}

/// Short description of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub access_key: String,
    pub series: Option<u32>,
    pub number: Option<u64>,
    pub issue_date: Option<NaiveDate>,
    pub status: DocumentStatus,
    pub emitter_name: Option<String>,
    pub recipient_name: Option<String>,
    pub item_count: usize,
    pub declared_total: Option<Decimal>,
    pub invoice_total: Option<Decimal>,
    pub reform_tax_total: Option<Decimal>,
}

/// Pipeline stage of a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    #[default]
    Received,
    Parsed,
    Validated,
    TaxComputed,
    Generated,
    Completed,
    /// Absorbing failure state.
    Failed,
}

impl DocumentStatus {
    fn rank(self) -> Option<u8> {
        match self {
            Self::Received => Some(0),
            Self::Parsed => Some(1),
            Self::Validated => Some(2),
            Self::TaxComputed => Some(3),
            Self::Generated => Some(4),
            Self::Completed => Some(5),
            Self::Failed => None,
        }
    }

    /// `Completed` and `Failed` are terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether moving from `self` to `next` keeps the status monotonic.
    pub fn can_advance_to(self, next: DocumentStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.rank(), next.rank()) {
            (_, None) => true,
            (Some(current), Some(next)) => next > current,
            (None, Some(_)) => false,
        }
    }
}

/// Document model code (`mod`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentModel {
    /// 55: NF-e.
    Nfe,
    /// 65: NFC-e (consumer receipt).
    Nfce,
}

impl DocumentModel {
    pub fn code(&self) -> u8 {
        match self {
            Self::Nfe => 55,
            Self::Nfce => 65,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            55 => Some(Self::Nfe),
            65 => Some(Self::Nfce),
            _ => None,
        }
    }
}

/// Issuer or recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Party {
    /// CNPJ or CPF; `None` when absent from the source.
    pub tax_id: Option<TaxId>,
    /// Legal name (`xNome`).
    pub name: String,
    /// Trade name (`xFant`).
    pub trade_name: Option<String>,
    /// State registration (`IE`).
    pub state_registration: Option<String>,
    /// Postal address (`enderEmit` / `enderDest`).
    pub address: Address,
    pub email: Option<String>,
}

/// Registration number of a party.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum TaxId {
    /// 14-digit legal-entity registration.
    Cnpj(String),
    /// 11-digit natural-person registration.
    Cpf(String),
}

impl TaxId {
    pub fn digits(&self) -> &str {
        match self {
            Self::Cnpj(s) | Self::Cpf(s) => s,
        }
    }

    /// XML element name (`CNPJ` / `CPF`).
    pub fn element_name(&self) -> &'static str {
        match self {
            Self::Cnpj(_) => "CNPJ",
            Self::Cpf(_) => "CPF",
        }
    }
}

/// Postal address. All fields optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// `xLgr`
    pub street: Option<String>,
    /// `nro`
    pub number: Option<String>,
    /// `xCpl`
    pub complement: Option<String>,
    /// `xBairro`
    pub district: Option<String>,
    /// IBGE municipality code (`cMun`).
    pub city_code: Option<String>,
    /// `xMun`
    pub city: Option<String>,
    /// Two-letter state abbreviation (`UF`).
    pub state: Option<String>,
    /// `CEP`
    pub zip_code: Option<String>,
    /// `fone`
    pub phone: Option<String>,
}

/// A line item (`det`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// 1-based position (`nItem`).
    pub sequence: u32,
    /// `cProd`
    pub product_code: String,
    /// `xProd`
    pub description: String,
    /// NCM product classification code.
    pub classification: String,
    /// Fiscal operation code (`CFOP`).
    pub cfop: Option<String>,
    /// Commercial unit (`uCom`).
    pub unit: Option<String>,
    /// `qCom`
    pub quantity: Decimal,
    /// `vUnCom`
    pub unit_value: Decimal,
    /// `vProd`
    pub total_value: Decimal,
    pub tax: TaxDetail,
}

/// The three reform tax kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaxKind {
    /// IBS: general consumption tax (state/municipal).
    Ibs,
    /// CBS: federal consumption contribution.
    Cbs,
    /// IS: selective tax.
    Selective,
}

impl TaxKind {
    pub const ALL: [TaxKind; 3] = [TaxKind::Ibs, TaxKind::Cbs, TaxKind::Selective];

    pub fn code(&self) -> &'static str {
        match self {
            Self::Ibs => "IBS",
            Self::Cbs => "CBS",
            Self::Selective => "IS",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "IBS" => Some(Self::Ibs),
            "CBS" => Some(Self::Cbs),
            "IS" => Some(Self::Selective),
            _ => None,
        }
    }

    /// Whether the tax is levied by the federal government.
    pub fn is_federal(&self) -> bool {
        !matches!(self, Self::Ibs)
    }
}

/// `{base, rate, value}` for one tax kind. `None` means unset, which is
/// distinct from a computed zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxComponent {
    /// Taxable base; when set before computation it overrides the item total.
    pub base: Option<Decimal>,
    /// Rate in percent.
    pub rate: Option<Decimal>,
    pub value: Option<Decimal>,
}

impl TaxComponent {
    pub fn is_unset(&self) -> bool {
        self.base.is_none() && self.rate.is_none() && self.value.is_none()
    }
}

/// Legacy tax group carried through unmodified (ICMS, IPI, PIS, COFINS).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyTax {
    /// Tax element name, e.g. "ICMS".
    pub tax: String,
    /// Situation group element name, e.g. "ICMS00" or "PISAliq".
    pub group: Option<String>,
    pub base: Option<Decimal>,
    pub rate: Option<Decimal>,
    pub value: Option<Decimal>,
}

/// Per-item taxes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxDetail {
    pub ibs: TaxComponent,
    pub cbs: TaxComponent,
    pub selective: TaxComponent,
    pub legacy: Vec<LegacyTax>,
}

impl TaxDetail {
    pub fn component(&self, kind: TaxKind) -> &TaxComponent {
        match kind {
            TaxKind::Ibs => &self.ibs,
            TaxKind::Cbs => &self.cbs,
            TaxKind::Selective => &self.selective,
        }
    }

    pub fn component_mut(&mut self, kind: TaxKind) -> &mut TaxComponent {
        match kind {
            TaxKind::Ibs => &mut self.ibs,
            TaxKind::Cbs => &mut self.cbs,
            TaxKind::Selective => &mut self.selective,
        }
    }

    /// Reset all reform values to unset, keeping base overrides.
    pub fn clear_computed(&mut self) {
        for kind in TaxKind::ALL {
            let c = self.component_mut(kind);
            c.rate = None;
            c.value = None;
        }
    }
}

/// Sum of bases and values for one tax kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxSum {
    pub base: Decimal,
    pub value: Decimal,
}

/// Document-level reform tax aggregate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxTotals {
    pub ibs: TaxSum,
    pub cbs: TaxSum,
    pub selective: TaxSum,
}

impl TaxTotals {
    pub fn get(&self, kind: TaxKind) -> &TaxSum {
        match kind {
            TaxKind::Ibs => &self.ibs,
            TaxKind::Cbs => &self.cbs,
            TaxKind::Selective => &self.selective,
        }
    }

    pub fn get_mut(&mut self, kind: TaxKind) -> &mut TaxSum {
        match kind {
            TaxKind::Ibs => &mut self.ibs,
            TaxKind::Cbs => &mut self.cbs,
            TaxKind::Selective => &mut self.selective,
        }
    }

    /// IBS + CBS + IS, or `None` if the sum overflows.
    pub fn total(&self) -> Option<Decimal> {
        self.ibs
            .value
            .checked_add(self.cbs.value)?
            .checked_add(self.selective.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn status_only_moves_forward() {
        let mut doc = Document::default();
        assert!(doc.advance(DocumentStatus::Parsed));
        assert!(doc.advance(DocumentStatus::TaxComputed));
        assert!(!doc.advance(DocumentStatus::Validated));
        assert_eq!(doc.status, DocumentStatus::TaxComputed);
        assert!(doc.advance(DocumentStatus::Completed));
        assert!(!doc.advance(DocumentStatus::Failed));
    }

    #[test]
    fn failed_is_absorbing() {
        let mut doc = Document::default();
        assert!(doc.advance(DocumentStatus::Failed));
        assert!(!doc.advance(DocumentStatus::Parsed));
        assert!(!doc.advance(DocumentStatus::Completed));
        assert_eq!(doc.status, DocumentStatus::Failed);
    }

    #[test]
    fn equality_ignores_status_and_diagnostics() {
        let a = Document {
            access_key: "1".repeat(44),
            declared_total: Some(dec!(10.00)),
            ..Default::default()
        };
        let mut b = a.clone();
        b.status = DocumentStatus::Completed;
        b.source = Some("<NFe/>".into());
        assert_eq!(a, b);
        b.declared_total = Some(dec!(10.01));
        assert_ne!(a, b);
    }

    #[test]
    fn tax_kind_codes() {
        for kind in TaxKind::ALL {
            assert_eq!(TaxKind::from_code(kind.code()), Some(kind));
        }
        assert!(!TaxKind::Ibs.is_federal());
        assert!(TaxKind::Cbs.is_federal());
    }

    #[test]
    fn model_codes() {
        assert_eq!(DocumentModel::from_code(55), Some(DocumentModel::Nfe));
        assert_eq!(DocumentModel::from_code(65), Some(DocumentModel::Nfce));
        assert_eq!(DocumentModel::from_code(57), None);
        assert_eq!(DocumentModel::Nfce.code(), 65);
    }

    #[test]
    fn totals_sum_values() {
        let totals = TaxTotals {
            ibs: TaxSum { base: dec!(100), value: dec!(17.70) },
            cbs: TaxSum { base: dec!(100), value: dec!(8.80) },
            selective: TaxSum::default(),
        };
        assert_eq!(totals.total(), Some(dec!(26.50)));
    }

    #[test]
    fn totals_sum_overflow_is_none() {
        let totals = TaxTotals {
            ibs: TaxSum { base: Decimal::MAX, value: Decimal::MAX },
            cbs: TaxSum { base: dec!(1), value: dec!(1) },
            selective: TaxSum::default(),
        };
        assert_eq!(totals.total(), None);
    }
}
