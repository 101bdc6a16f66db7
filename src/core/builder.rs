use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;

use super::access_key::AccessKey;
use super::config::ValidationOptions;
use super::error::NfeError;
use super::states::state_code;
use super::tax_id::strip_formatting;
use super::types::*;
use super::validation::{round_half_even, validate};

/// Builder for documents assembled in memory rather than parsed.
///
/// ```
/// use chrono::NaiveDate;
/// use nfe_reforma::core::*;
/// use rust_decimal_macros::dec;
///
/// let doc = DocumentBuilder::new(1, 123, NaiveDate::from_ymd_opt(2024, 5, 10).unwrap())
///     .numeric_code(12345678)
///     .emitter(PartyBuilder::new("Empresa Teste Ltda", TaxId::Cnpj("12345678000195".into()))
///         .address(AddressBuilder::new("São Paulo", "SP").build())
///         .build())
///     .recipient(PartyBuilder::new("Cliente SA", TaxId::Cnpj("11222333000181".into()))
///         .address(AddressBuilder::new("Rio de Janeiro", "RJ").build())
///         .build())
///     .add_item(ItemBuilder::new("P1", "Cerveja lata", "22030000", dec!(10), dec!(15.00)).build())
///     .build()
///     .unwrap();
///
/// assert_eq!(doc.declared_total, Some(dec!(150.00)));
/// assert_eq!(doc.access_key, "35240512345678000195550010000001231123456786");
/// ```
pub struct DocumentBuilder {
    access_key: Option<String>,
    model: DocumentModel,
    series: u32,
    number: u64,
    issue_date: NaiveDate,
    emission_type: u8,
    numeric_code: u32,
    operation_nature: Option<String>,
    emitter: Option<Party>,
    recipient: Option<Party>,
    items: Vec<Item>,
    declared_total: Option<Decimal>,
}

impl DocumentBuilder {
    pub fn new(series: u32, number: u64, issue_date: NaiveDate) -> Self {
        Self {
            access_key: None,
            model: DocumentModel::Nfe,
            series,
            number,
            issue_date,
            emission_type: 1,
            numeric_code: 0,
            operation_nature: None,
            emitter: None,
            recipient: None,
            items: Vec::new(),
            declared_total: None,
        }
    }

    /// Use an existing access key instead of deriving one.
    pub fn access_key(mut self, key: impl Into<String>) -> Self {
        self.access_key = Some(key.into());
        self
    }

    pub fn model(mut self, model: DocumentModel) -> Self {
        self.model = model;
        self
    }

    /// Emission type (`tpEmis`) used when deriving the access key. Default 1 (normal).
    pub fn emission_type(mut self, emission_type: u8) -> Self {
        self.emission_type = emission_type;
        self
    }

    /// Random code (`cNF`) used when deriving the access key.
    pub fn numeric_code(mut self, code: u32) -> Self {
        self.numeric_code = code;
        self
    }

    pub fn operation_nature(mut self, nature: impl Into<String>) -> Self {
        self.operation_nature = Some(nature.into());
        self
    }

    pub fn emitter(mut self, party: Party) -> Self {
        self.emitter = Some(party);
        self
    }

    pub fn recipient(mut self, party: Party) -> Self {
        self.recipient = Some(party);
        self
    }

    /// Add an item. Its sequence is assigned from its position.
    pub fn add_item(mut self, mut item: Item) -> Self {
        item.sequence = self.items.len() as u32 + 1;
        self.items.push(item);
        self
    }

    /// Override the declared total. Defaults to the sum of item totals.
    pub fn declared_total(mut self, total: Decimal) -> Self {
        self.declared_total = Some(total);
        self
    }

    /// Build and validate. Fails with all blocking diagnostics joined.
    pub fn build(self) -> Result<Document, NfeError> {
        let doc = self.build_unchecked()?;
        let diagnostics = validate(&doc, &ValidationOptions::default());
        let blocking: Vec<String> = diagnostics
            .iter()
            .filter(|d| d.is_blocking())
            .map(|d| d.to_string())
            .collect();
        if !blocking.is_empty() {
            return Err(NfeError::Validation(blocking.join("; ")));
        }
        Ok(doc)
    }

    /// Build without validation. Still requires both parties and one item.
    pub fn build_unchecked(self) -> Result<Document, NfeError> {
        let emitter = self
            .emitter
            .ok_or_else(|| NfeError::Builder("emitter is required".into()))?;
        let recipient = self
            .recipient
            .ok_or_else(|| NfeError::Builder("recipient is required".into()))?;
        if self.items.is_empty() {
            return Err(NfeError::Builder("at least one item is required".into()));
        }

        let access_key = match self.access_key {
            Some(key) => key,
            None => derive_access_key(
                &emitter,
                self.model,
                self.series,
                self.number,
                self.issue_date,
                self.emission_type,
                self.numeric_code,
            )?,
        };

        let items_total = self
            .items
            .iter()
            .try_fold(Decimal::ZERO, |sum, i| sum.checked_add(i.total_value))
            .ok_or_else(|| NfeError::Builder("sum of item totals overflows".into()))?;

        Ok(Document {
            access_key,
            model: Some(self.model),
            series: Some(self.series),
            number: Some(self.number),
            issue_date: Some(self.issue_date),
            operation_nature: self.operation_nature,
            emitter: Some(emitter),
            recipient: Some(recipient),
            items: self.items,
            declared_total: Some(self.declared_total.unwrap_or(items_total)),
            invoice_total: None,
            ..Default::default()
        })
    }
}

fn derive_access_key(
    emitter: &Party,
    model: DocumentModel,
    series: u32,
    number: u64,
    issue_date: NaiveDate,
    emission_type: u8,
    numeric_code: u32,
) -> Result<String, NfeError> {
    let Some(TaxId::Cnpj(cnpj)) = &emitter.tax_id else {
        return Err(NfeError::Builder(
            "deriving an access key requires an emitter CNPJ".into(),
        ));
    };
    let uf = emitter
        .address
        .state
        .as_deref()
        .and_then(state_code)
        .ok_or_else(|| NfeError::Builder("deriving an access key requires the emitter UF".into()))?;
    let key = AccessKey {
        state_code: uf,
        year: (issue_date.year() % 100) as u8,
        month: issue_date.month() as u8,
        cnpj: cnpj.clone(),
        model: model.code(),
        series,
        number,
        emission_type,
        numeric_code,
        check_digit: 0,
    };
    key.encode()
        .ok_or_else(|| NfeError::Builder("access key fields exceed their widths".into()))
}

/// Builder for [`Party`].
pub struct PartyBuilder {
    party: Party,
}

impl PartyBuilder {
    /// Punctuation in a formatted tax id (`12.345.678/0001-95`) is dropped.
    pub fn new(name: impl Into<String>, tax_id: TaxId) -> Self {
        let tax_id = match tax_id {
            TaxId::Cnpj(s) => TaxId::Cnpj(strip_formatting(&s)),
            TaxId::Cpf(s) => TaxId::Cpf(strip_formatting(&s)),
        };
        Self {
            party: Party {
                tax_id: Some(tax_id),
                name: name.into(),
                trade_name: None,
                state_registration: None,
                address: Address::default(),
                email: None,
            },
        }
    }

    pub fn trade_name(mut self, name: impl Into<String>) -> Self {
        self.party.trade_name = Some(name.into());
        self
    }

    pub fn state_registration(mut self, ie: impl Into<String>) -> Self {
        self.party.state_registration = Some(ie.into());
        self
    }

    pub fn address(mut self, address: Address) -> Self {
        self.party.address = address;
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.party.email = Some(email.into());
        self
    }

    pub fn build(self) -> Party {
        self.party
    }
}

/// Builder for [`Address`].
pub struct AddressBuilder {
    address: Address,
}

impl AddressBuilder {
    pub fn new(city: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            address: Address {
                city: Some(city.into()),
                state: Some(state.into()),
                ..Default::default()
            },
        }
    }

    pub fn street(mut self, street: impl Into<String>) -> Self {
        self.address.street = Some(street.into());
        self
    }

    pub fn number(mut self, number: impl Into<String>) -> Self {
        self.address.number = Some(number.into());
        self
    }

    pub fn complement(mut self, complement: impl Into<String>) -> Self {
        self.address.complement = Some(complement.into());
        self
    }

    pub fn district(mut self, district: impl Into<String>) -> Self {
        self.address.district = Some(district.into());
        self
    }

    pub fn city_code(mut self, code: impl Into<String>) -> Self {
        self.address.city_code = Some(code.into());
        self
    }

    pub fn zip_code(mut self, zip: impl Into<String>) -> Self {
        self.address.zip_code = Some(zip.into());
        self
    }

    pub fn phone(mut self, phone: impl Into<String>) -> Self {
        self.address.phone = Some(phone.into());
        self
    }

    pub fn build(self) -> Address {
        self.address
    }
}

/// Builder for [`Item`].
pub struct ItemBuilder {
    item: Item,
}

impl ItemBuilder {
    /// The total defaults to `round_half_even(quantity * unit_value, 2)`.
    pub fn new(
        product_code: impl Into<String>,
        description: impl Into<String>,
        classification: impl Into<String>,
        quantity: Decimal,
        unit_value: Decimal,
    ) -> Self {
        let total_value = quantity
            .checked_mul(unit_value)
            .map(|v| round_half_even(v, 2))
            .unwrap_or_default();
        Self {
            item: Item {
                sequence: 0,
                product_code: product_code.into(),
                description: description.into(),
                classification: classification.into(),
                cfop: None,
                unit: None,
                quantity,
                unit_value,
                total_value,
                tax: TaxDetail::default(),
            },
        }
    }

    pub fn cfop(mut self, cfop: impl Into<String>) -> Self {
        self.item.cfop = Some(cfop.into());
        self
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.item.unit = Some(unit.into());
        self
    }

    pub fn total_value(mut self, total: Decimal) -> Self {
        self.item.total_value = total;
        self
    }

    /// Taxable base override for one reform tax kind.
    pub fn tax_base(mut self, kind: TaxKind, base: Decimal) -> Self {
        self.item.tax.component_mut(kind).base = Some(base);
        self
    }

    /// Carry a legacy tax group.
    pub fn legacy_tax(mut self, tax: LegacyTax) -> Self {
        self.item.tax.legacy.push(tax);
        self
    }

    pub fn build(self) -> Item {
        self.item
    }
}
