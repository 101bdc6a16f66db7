use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use rust_decimal::Decimal;

use crate::core::*;

/// Direct children of `infNFe` defined by layout 4.00 and the reform extension.
const INF_NFE_CHILDREN: &[&str] = &[
    "agropecuario",
    "autXML",
    "avulsa",
    "cana",
    "cobr",
    "compra",
    "dest",
    "det",
    "emit",
    "entrega",
    "exporta",
    "ide",
    "infAdic",
    "infIntermed",
    "infRespTec",
    "infSolicNFF",
    "pag",
    "retirada",
    "total",
    "transp",
];

/// Children of `imposto`.
const IMPOSTO_CHILDREN: &[&str] = &[
    "COFINS",
    "COFINSST",
    "IBSCBS",
    "ICMS",
    "ICMSUFDest",
    "II",
    "IPI",
    "IS",
    "ISSQN",
    "PIS",
    "PISST",
    "vTotTrib",
];

/// Children of the document root(s).
const WRAPPER_CHILDREN: &[&str] = &["NFe", "Signature", "infNFe", "infNFeSupl", "protNFe"];

/// Parse NF-e / NFC-e XML into a [`Document`].
///
/// Never panics and never stops at the first problem:
///
/// - input that is not well-formed UTF-8 XML yields exactly one fatal
///   `ParseError` and no document;
/// - a well-formed document without `infNFe` yields a fatal `StructuralError`
///   and a document in `Failed` state;
/// - every missing required section or value yields its own
///   `StructuralError` alongside a partial document;
/// - unknown elements yield `UnrecognizedElement` warnings.
///
/// The source text is retained in the document for [`super::generate`].
pub fn parse(bytes: &[u8]) -> (Option<Document>, Vec<Diagnostic>) {
    let text = match std::str::from_utf8(bytes) {
        Ok(t) => t,
        Err(e) => {
            return (
                None,
                vec![parse_error(format!(
                    "input is not valid UTF-8 (invalid byte at offset {})",
                    e.valid_up_to()
                ))],
            );
        }
    };
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut p = NfeParsed::default();
    if let Err(message) = read_events(text, &mut p) {
        return (None, vec![parse_error(message)]);
    }

    let (mut doc, diagnostics) = p.into_document();
    doc.source = Some(text.to_string());
    doc.diagnostics = diagnostics.clone();
    tracing::debug!(
        access_key = %doc.access_key,
        items = doc.items.len(),
        diagnostics = diagnostics.len(),
        "document parsed"
    );
    (Some(doc), diagnostics)
}

fn parse_error(message: impl Into<String>) -> Diagnostic {
    Diagnostic::new(DiagnosticKind::ParseError, "", message)
}

/// Walk all events, checking well-formedness and feeding `p`.
fn read_events(text: &str, p: &mut NfeParsed) -> Result<(), String> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut path: Vec<String> = Vec::new();
    // Character data of the innermost open element, delivered at its end so
    // values split by comments or CDATA sections arrive whole.
    let mut pending = String::new();
    let mut root_closed = false;
    let mut root_seen = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| format!("malformed XML at byte {}: {e}", reader.buffer_position()))?;
        let self_closing = matches!(event, Event::Empty(_));
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                if root_closed {
                    return Err(format!(
                        "unexpected element after the root element at byte {}",
                        reader.buffer_position()
                    ));
                }
                root_seen = true;
                flush_text(p, &path, &mut pending);
                let name = local_name(e)?;
                path.push(name);
                p.handle_start(&path, e)?;
                if self_closing {
                    p.handle_end(&path);
                    path.pop();
                    root_closed = path.is_empty();
                }
            }
            Event::End(_) => {
                if path.is_empty() {
                    return Err(format!(
                        "unmatched end tag at byte {}",
                        reader.buffer_position()
                    ));
                }
                flush_text(p, &path, &mut pending);
                p.handle_end(&path);
                path.pop();
                root_closed = path.is_empty();
            }
            Event::Text(ref e) => {
                let text = e
                    .unescape()
                    .map_err(|e| format!("invalid character data: {e}"))?;
                if path.is_empty() {
                    if !text.trim().is_empty() {
                        return Err("text outside the root element".into());
                    }
                } else {
                    pending.push_str(&text);
                }
            }
            Event::CData(ref e) => {
                let raw = std::str::from_utf8(e)
                    .map_err(|e| format!("invalid CDATA: {e}"))?;
                if path.is_empty() {
                    return Err("CDATA outside the root element".into());
                }
                pending.push_str(raw);
            }
            Event::Decl(ref e) => {
                if let Some(encoding) = e.encoding() {
                    let encoding = encoding.map_err(|e| format!("invalid XML declaration: {e}"))?;
                    let encoding = String::from_utf8_lossy(&encoding).to_ascii_lowercase();
                    if encoding != "utf-8" && encoding != "utf8" {
                        return Err(format!("unsupported encoding '{encoding}', expected UTF-8"));
                    }
                }
            }
            Event::Eof => {
                if let Some(open) = path.last() {
                    return Err(format!("unexpected end of input: <{open}> is not closed"));
                }
                if !root_seen {
                    return Err("no root element".into());
                }
                return Ok(());
            }
            _ => {}
        }
    }
}

fn flush_text(p: &mut NfeParsed, path: &[String], pending: &mut String) {
    if !pending.is_empty() && !path.is_empty() {
        p.handle_text(path, pending);
    }
    pending.clear();
}

fn local_name(e: &BytesStart<'_>) -> Result<String, String> {
    std::str::from_utf8(e.local_name().as_ref())
        .map(str::to_string)
        .map_err(|e| format!("invalid element name: {e}"))
}

/// Attributes of `e` by local name, with entity references resolved.
fn attributes(e: &BytesStart<'_>) -> Result<Vec<(String, String)>, String> {
    let mut out = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| format!("malformed attribute: {e}"))?;
        let key = std::str::from_utf8(attr.key.local_name().as_ref())
            .map_err(|e| format!("invalid attribute name: {e}"))?
            .to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| format!("invalid attribute value: {e}"))?
            .into_owned();
        out.push((key, value));
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Accumulated raw values
// ---------------------------------------------------------------------------

#[derive(Default)]
struct PartyParsed {
    cnpj: Option<String>,
    cpf: Option<String>,
    foreign_id: Option<String>,
    name: Option<String>,
    trade_name: Option<String>,
    state_registration: Option<String>,
    email: Option<String>,
    address: Address,
}

#[derive(Default)]
struct LegacyParsed {
    tax: String,
    group: Option<String>,
    base: Option<String>,
    rate: Option<String>,
    value: Option<String>,
}

#[derive(Default)]
struct ComponentParsed {
    base: Option<String>,
    rate: Option<String>,
    value: Option<String>,
}

#[derive(Default)]
struct ItemParsed {
    sequence: Option<String>,
    prod_seen: bool,
    product_code: Option<String>,
    description: Option<String>,
    classification: Option<String>,
    cfop: Option<String>,
    unit: Option<String>,
    quantity: Option<String>,
    unit_value: Option<String>,
    total_value: Option<String>,
    legacy: Vec<LegacyParsed>,
    ibs: ComponentParsed,
    cbs: ComponentParsed,
    selective: ComponentParsed,
}

#[derive(Default)]
struct NfeParsed {
    inf_nfe_seen: bool,
    id: Option<String>,

    ide_seen: bool,
    model: Option<String>,
    series: Option<String>,
    number: Option<String>,
    issued_at: Option<String>,
    issue_date_legacy: Option<String>,
    operation_nature: Option<String>,

    emitter: Option<PartyParsed>,
    recipient: Option<PartyParsed>,

    items: Vec<ItemParsed>,
    current_item: Option<ItemParsed>,

    total_seen: bool,
    icms_total_seen: bool,
    declared_total: Option<String>,
    invoice_total: Option<String>,
    legacy_totals: Vec<(String, String)>,
    reform_totals_seen: bool,
    totals: [ComponentParsed; 3],

    warnings: Vec<Diagnostic>,
}

/// Position of `infNFe` in the path, if inside it.
fn inf_nfe_index(path: &[String]) -> Option<usize> {
    path.iter().position(|p| p == "infNFe")
}

impl NfeParsed {
    fn handle_start(&mut self, path: &[String], e: &BytesStart<'_>) -> Result<(), String> {
        // Attributes are always decoded so malformed ones are reported anywhere.
        let attrs = attributes(e)?;
        let Some(name) = path.last() else {
            return Ok(());
        };

        let Some(pos) = inf_nfe_index(path) else {
            if path.len() >= 2 {
                let parent = &path[path.len() - 2];
                if (parent == "nfeProc" || parent == "NFe")
                    && path.len() <= 3
                    && !WRAPPER_CHILDREN.contains(&name.as_str())
                {
                    self.unrecognized(&format!("{parent}.{name}"));
                }
            }
            return Ok(());
        };
        let rel = &path[pos + 1..];

        match rel {
            [] => {
                if !self.inf_nfe_seen {
                    self.inf_nfe_seen = true;
                    self.id = attr(&attrs, "Id");
                }
            }
            [child] => match child.as_str() {
                "ide" => self.ide_seen = true,
                "emit" => self.emitter = Some(PartyParsed::default()),
                "dest" => self.recipient = Some(PartyParsed::default()),
                "det" => {
                    self.current_item = Some(ItemParsed {
                        sequence: attr(&attrs, "nItem"),
                        ..Default::default()
                    });
                }
                "total" => self.total_seen = true,
                other if !INF_NFE_CHILDREN.contains(&other) => {
                    self.unrecognized(&format!("infNFe.{other}"));
                }
                _ => {}
            },
            [det, prod] if det == "det" && prod == "prod" => {
                if let Some(item) = self.current_item.as_mut() {
                    item.prod_seen = true;
                }
            }
            [det, imposto, tax] if det == "det" && imposto == "imposto" => {
                if !IMPOSTO_CHILDREN.contains(&tax.as_str()) {
                    let index = self.items.len() + 1;
                    self.unrecognized(&format!("det[{index}].imposto.{tax}"));
                } else if !matches!(tax.as_str(), "IBSCBS" | "IS" | "vTotTrib") {
                    if let Some(item) = self.current_item.as_mut() {
                        item.legacy.push(LegacyParsed {
                            tax: tax.clone(),
                            ..Default::default()
                        });
                    }
                }
            }
            [det, imposto, tax, group]
                if det == "det" && imposto == "imposto" && group.starts_with(tax.as_str()) =>
            {
                if let Some(legacy) = self
                    .current_item
                    .as_mut()
                    .and_then(|item| item.legacy.last_mut())
                    .filter(|l| l.tax == *tax)
                {
                    legacy.group = Some(group.clone());
                }
            }
            [total, tot] if total == "total" => match tot.as_str() {
                "ICMSTot" => self.icms_total_seen = true,
                "IBSCBSTot" | "ISTot" => self.reform_totals_seen = true,
                _ => {}
            },
            _ => {}
        }
        Ok(())
    }

    fn handle_end(&mut self, path: &[String]) {
        let Some(pos) = inf_nfe_index(path) else {
            return;
        };
        if let [det] = &path[pos + 1..] {
            if det == "det" {
                if let Some(item) = self.current_item.take() {
                    self.items.push(item);
                }
            }
        }
    }

    fn handle_text(&mut self, path: &[String], text: &str) {
        let Some(pos) = inf_nfe_index(path) else {
            return;
        };
        let rel: Vec<&str> = path[pos + 1..].iter().map(String::as_str).collect();
        let value = Some(text.to_string());

        match rel.as_slice() {
            ["ide", leaf] => match *leaf {
                "mod" => self.model = value,
                "serie" => self.series = value,
                "nNF" => self.number = value,
                "dhEmi" => self.issued_at = value,
                "dEmi" => self.issue_date_legacy = value,
                "natOp" => self.operation_nature = value,
                _ => {}
            },
            ["emit", rest @ ..] => {
                if let Some(party) = self.emitter.as_mut() {
                    party.handle_text(rest, "enderEmit", value);
                }
            }
            ["dest", rest @ ..] => {
                if let Some(party) = self.recipient.as_mut() {
                    party.handle_text(rest, "enderDest", value);
                }
            }
            ["det", rest @ ..] => {
                if let Some(item) = self.current_item.as_mut() {
                    item.handle_text(rest, value);
                }
            }
            ["total", "ICMSTot", leaf] => match *leaf {
                "vProd" => self.declared_total = value,
                "vNF" => self.invoice_total = value,
                other => self.legacy_totals.push((other.to_string(), text.to_string())),
            },
            ["total", "IBSCBSTot", leaf] => match *leaf {
                "vBCIBS" => self.totals[0].base = value,
                "vIBS" => self.totals[0].value = value,
                "vBCCBS" => self.totals[1].base = value,
                "vCBS" => self.totals[1].value = value,
                _ => {}
            },
            ["total", "ISTot", leaf] => match *leaf {
                "vBCIS" => self.totals[2].base = value,
                "vIS" => self.totals[2].value = value,
                _ => {}
            },
            _ => {}
        }
    }

    fn unrecognized(&mut self, field: &str) {
        self.warnings.push(Diagnostic::new(
            DiagnosticKind::UnrecognizedElement,
            field,
            "element is not recognized and was ignored",
        ));
    }

    /// Convert accumulated values, recording one `StructuralError` per
    /// missing or unreadable piece.
    fn into_document(self) -> (Document, Vec<Diagnostic>) {
        let mut diagnostics = self.warnings;
        let mut doc = Document::default();

        if !self.inf_nfe_seen {
            diagnostics.push(Diagnostic::fatal(
                DiagnosticKind::StructuralError,
                "infNFe",
                "document has no infNFe element",
            ));
            doc.status = DocumentStatus::Failed;
            return (doc, diagnostics);
        }
        doc.advance(DocumentStatus::Parsed);

        let errors = &mut diagnostics;

        match self.id {
            Some(id) => doc.access_key = id.strip_prefix("NFe").unwrap_or(&id).to_string(),
            None => missing(errors, "infNFe.Id", "access key attribute Id is missing"),
        }

        if self.ide_seen {
            doc.model = self
                .model
                .and_then(|m| integer::<u8>(&m, "ide.mod", errors))
                .and_then(|code| {
                    let model = DocumentModel::from_code(code);
                    if model.is_none() {
                        errors.push(
                            Diagnostic::new(
                                DiagnosticKind::FormatError,
                                "ide.mod",
                                format!("model {code} is neither 55 nor 65"),
                            )
                            .in_stage(Stage::Parse),
                        );
                    }
                    model
                });
            doc.series = required(self.series, "ide.serie", errors)
                .and_then(|s| integer::<u32>(&s, "ide.serie", errors));
            doc.number = required(self.number, "ide.nNF", errors)
                .and_then(|s| integer::<u64>(&s, "ide.nNF", errors));
            doc.issue_date = match (self.issued_at, self.issue_date_legacy) {
                (Some(dh), _) => date(&dh, "ide.dhEmi", errors),
                (None, Some(d)) => date(&d, "ide.dEmi", errors),
                (None, None) => {
                    missing(errors, "ide.dhEmi", "issue date is missing");
                    None
                }
            };
            doc.operation_nature = self.operation_nature;
        } else {
            missing(errors, "ide", "identification block ide is missing");
        }

        match self.emitter {
            Some(p) => doc.emitter = Some(p.into_party("emit", errors)),
            None => missing(errors, "emit", "issuer block emit is missing"),
        }
        match self.recipient {
            Some(p) => doc.recipient = Some(p.into_party("dest", errors)),
            None => missing(errors, "dest", "recipient block dest is missing"),
        }

        if self.items.is_empty() {
            missing(errors, "det", "document must contain at least one item");
        }
        doc.items = self
            .items
            .into_iter()
            .enumerate()
            .map(|(index, item)| item.into_item(index, errors))
            .collect();

        if !self.total_seen {
            missing(errors, "total", "totals block total is missing");
        } else if !self.icms_total_seen {
            missing(errors, "total.ICMSTot", "totals group ICMSTot is missing");
        } else {
            doc.declared_total = required(self.declared_total, "total.ICMSTot.vProd", errors)
                .and_then(|v| decimal(&v, "total.ICMSTot.vProd", errors));
            doc.invoice_total = self
                .invoice_total
                .and_then(|v| decimal(&v, "total.ICMSTot.vNF", errors));
            let mut legacy = BTreeMap::new();
            for (name, raw) in self.legacy_totals {
                if let Some(v) = decimal(&raw, &format!("total.ICMSTot.{name}"), errors) {
                    legacy.insert(name, v);
                }
            }
            doc.legacy_totals = legacy;
        }

        if self.reform_totals_seen {
            let mut totals = TaxTotals::default();
            for (kind, raw) in TaxKind::ALL.into_iter().zip(self.totals) {
                let field = format!("total.{}", kind.code());
                let sum = totals.get_mut(kind);
                sum.base = raw
                    .base
                    .and_then(|v| decimal(&v, &field, errors))
                    .unwrap_or_default();
                sum.value = raw
                    .value
                    .and_then(|v| decimal(&v, &field, errors))
                    .unwrap_or_default();
            }
            doc.tax_totals = Some(totals);
        }

        (doc, diagnostics)
    }
}

impl PartyParsed {
    fn handle_text(&mut self, rest: &[&str], address_element: &str, value: Option<String>) {
        match rest {
            ["CNPJ"] => self.cnpj = value,
            ["CPF"] => self.cpf = value,
            ["idEstrangeiro"] => self.foreign_id = value,
            ["xNome"] => self.name = value,
            ["xFant"] => self.trade_name = value,
            ["IE"] => self.state_registration = value,
            ["email"] => self.email = value,
            [ender, leaf] if *ender == address_element => {
                let a = &mut self.address;
                match *leaf {
                    "xLgr" => a.street = value,
                    "nro" => a.number = value,
                    "xCpl" => a.complement = value,
                    "xBairro" => a.district = value,
                    "cMun" => a.city_code = value,
                    "xMun" => a.city = value,
                    "UF" => a.state = value,
                    "CEP" => a.zip_code = value,
                    "fone" => a.phone = value,
                    _ => {}
                }
            }
            _ => {}
        }
    }

    fn into_party(self, prefix: &str, errors: &mut Vec<Diagnostic>) -> Party {
        let tax_id = match (self.cnpj, self.cpf) {
            (Some(cnpj), _) => Some(TaxId::Cnpj(cnpj)),
            (None, Some(cpf)) => Some(TaxId::Cpf(cpf)),
            (None, None) => {
                if self.foreign_id.is_none() {
                    missing(errors, &format!("{prefix}.CNPJ"), "CNPJ or CPF is missing");
                }
                None
            }
        };
        let name = required(self.name, &format!("{prefix}.xNome"), errors).unwrap_or_default();
        Party {
            tax_id,
            name,
            trade_name: self.trade_name,
            state_registration: self.state_registration,
            address: self.address,
            email: self.email,
        }
    }
}

impl ItemParsed {
    fn handle_text(&mut self, rest: &[&str], value: Option<String>) {
        match rest {
            ["prod", leaf] => match *leaf {
                "cProd" => self.product_code = value,
                "xProd" => self.description = value,
                "NCM" => self.classification = value,
                "CFOP" => self.cfop = value,
                "uCom" => self.unit = value,
                "qCom" => self.quantity = value,
                "vUnCom" => self.unit_value = value,
                "vProd" => self.total_value = value,
                _ => {}
            },
            ["imposto", "IBSCBS", "gIBS", leaf] => match *leaf {
                "vBC" => self.ibs.base = value,
                "pIBS" => self.ibs.rate = value,
                "vIBS" => self.ibs.value = value,
                _ => {}
            },
            ["imposto", "IBSCBS", "gCBS", leaf] => match *leaf {
                "vBC" => self.cbs.base = value,
                "pCBS" => self.cbs.rate = value,
                "vCBS" => self.cbs.value = value,
                _ => {}
            },
            ["imposto", "IS", leaf] => match *leaf {
                "vBCIS" => self.selective.base = value,
                "pIS" => self.selective.rate = value,
                "vIS" => self.selective.value = value,
                _ => {}
            },
            ["imposto", tax, .., leaf] => {
                if let Some(legacy) = self.legacy.last_mut().filter(|l| l.tax == *tax) {
                    if *leaf == "vBC" {
                        legacy.base = value;
                    } else if leaf.strip_prefix('p') == Some(*tax) {
                        legacy.rate = value;
                    } else if leaf.strip_prefix('v') == Some(*tax) {
                        legacy.value = value;
                    }
                }
            }
            _ => {}
        }
    }

    fn into_item(self, index: usize, errors: &mut Vec<Diagnostic>) -> Item {
        let prefix = format!("det[{}]", index + 1);
        let sequence = match self.sequence {
            Some(s) => integer::<u32>(&s, &format!("{prefix}.nItem"), errors),
            None => {
                missing(errors, &format!("{prefix}.nItem"), "item number nItem is missing");
                None
            }
        };

        let mut item = Item {
            sequence: sequence.unwrap_or_default(),
            product_code: String::new(),
            description: String::new(),
            classification: String::new(),
            cfop: self.cfop,
            unit: self.unit,
            quantity: Decimal::ZERO,
            unit_value: Decimal::ZERO,
            total_value: Decimal::ZERO,
            tax: TaxDetail::default(),
        };

        if self.prod_seen {
            let field = |leaf: &str| format!("{prefix}.prod.{leaf}");
            item.product_code = required(self.product_code, &field("cProd"), errors).unwrap_or_default();
            item.description = required(self.description, &field("xProd"), errors).unwrap_or_default();
            item.classification = required(self.classification, &field("NCM"), errors).unwrap_or_default();
            item.quantity = required_decimal(self.quantity, &field("qCom"), errors);
            item.unit_value = required_decimal(self.unit_value, &field("vUnCom"), errors);
            item.total_value = required_decimal(self.total_value, &field("vProd"), errors);
        } else {
            missing(errors, &format!("{prefix}.prod"), "product group prod is missing");
        }

        let imposto = format!("{prefix}.imposto");
        item.tax.ibs = self.ibs.into_component(&format!("{imposto}.IBSCBS.gIBS"), errors);
        item.tax.cbs = self.cbs.into_component(&format!("{imposto}.IBSCBS.gCBS"), errors);
        item.tax.selective = self.selective.into_component(&format!("{imposto}.IS"), errors);
        item.tax.legacy = self
            .legacy
            .into_iter()
            .map(|l| {
                let field = format!("{imposto}.{}", l.tax);
                LegacyTax {
                    base: l.base.and_then(|v| decimal(&v, &field, errors)),
                    rate: l.rate.and_then(|v| decimal(&v, &field, errors)),
                    value: l.value.and_then(|v| decimal(&v, &field, errors)),
                    tax: l.tax,
                    group: l.group,
                }
            })
            .collect();
        item
    }
}

impl ComponentParsed {
    fn into_component(self, field: &str, errors: &mut Vec<Diagnostic>) -> TaxComponent {
        TaxComponent {
            base: self.base.and_then(|v| decimal(&v, field, errors)),
            rate: self.rate.and_then(|v| decimal(&v, field, errors)),
            value: self.value.and_then(|v| decimal(&v, field, errors)),
        }
    }
}

// ---------------------------------------------------------------------------
// Value conversion
// ---------------------------------------------------------------------------

fn attr(attrs: &[(String, String)], name: &str) -> Option<String> {
    attrs
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.clone())
}

fn missing(errors: &mut Vec<Diagnostic>, field: &str, message: &str) {
    errors.push(Diagnostic::new(DiagnosticKind::StructuralError, field, message));
}

fn required(value: Option<String>, field: &str, errors: &mut Vec<Diagnostic>) -> Option<String> {
    if value.is_none() {
        missing(errors, field, "required value is missing");
    }
    value
}

fn required_decimal(value: Option<String>, field: &str, errors: &mut Vec<Diagnostic>) -> Decimal {
    required(value, field, errors)
        .and_then(|v| decimal(&v, field, errors))
        .unwrap_or_default()
}

/// Whether `s` matches `-?[0-9]+(\.[0-9]+)?`.
fn is_plain_decimal(s: &str) -> bool {
    let unsigned = s.strip_prefix('-').unwrap_or(s);
    let (int, frac) = match unsigned.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (unsigned, None),
    };
    let digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    digits(int) && frac.is_none_or(digits)
}

/// Parse an exact decimal. Exponents, thousands separators, `NaN` and
/// values that do not fit a `Decimal` without rounding are rejected.
fn decimal(raw: &str, field: &str, errors: &mut Vec<Diagnostic>) -> Option<Decimal> {
    let parsed = if is_plain_decimal(raw) {
        Decimal::from_str(raw).ok().filter(|d| is_exact(raw, *d))
    } else {
        None
    };
    if parsed.is_none() {
        errors.push(Diagnostic::new(
            DiagnosticKind::StructuralError,
            field,
            format!("'{raw}' is not a valid decimal number"),
        ));
    }
    parsed
}

/// `from_str` rounds away fractional digits that do not fit; the value is
/// exact only if every digit past the kept scale is zero.
fn is_exact(raw: &str, parsed: Decimal) -> bool {
    let fraction = raw.split_once('.').map_or("", |(_, f)| f);
    let kept = parsed.scale() as usize;
    fraction.len() <= kept || fraction.bytes().skip(kept).all(|b| b == b'0')
}

fn integer<T: FromStr>(raw: &str, field: &str, errors: &mut Vec<Diagnostic>) -> Option<T> {
    let parsed = if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
        raw.parse::<T>().ok()
    } else {
        None
    };
    if parsed.is_none() {
        errors.push(Diagnostic::new(
            DiagnosticKind::StructuralError,
            field,
            format!("'{raw}' is not a valid number"),
        ));
    }
    parsed
}

/// `dhEmi` is an RFC 3339 timestamp whose local date is the issue date;
/// legacy `dEmi` is a plain `YYYY-MM-DD` date.
fn date(raw: &str, field: &str, errors: &mut Vec<Diagnostic>) -> Option<NaiveDate> {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.date_naive())
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok();
    if parsed.is_none() {
        errors.push(Diagnostic::new(
            DiagnosticKind::StructuralError,
            field,
            format!("'{raw}' is not a valid date"),
        ));
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn plain_decimal_grammar() {
        assert!(is_plain_decimal("100.00"));
        assert!(is_plain_decimal("-0.5"));
        assert!(is_plain_decimal("7"));
        assert!(!is_plain_decimal("1e3"));
        assert!(!is_plain_decimal("1,50"));
        assert!(!is_plain_decimal(".5"));
        assert!(!is_plain_decimal("5."));
        assert!(!is_plain_decimal("+5"));
        assert!(!is_plain_decimal("NaN"));
        assert!(!is_plain_decimal(""));
    }

    #[test]
    fn decimal_is_exact() {
        let mut errors = Vec::new();
        assert_eq!(decimal("0.1", "f", &mut errors), Some(dec!(0.1)));
        assert_eq!(decimal("1e2", "f", &mut errors), None);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "f");
    }

    #[test]
    fn dates_with_offset_keep_local_day() {
        let mut errors = Vec::new();
        assert_eq!(
            date("2024-05-10T23:30:00-03:00", "ide.dhEmi", &mut errors),
            NaiveDate::from_ymd_opt(2024, 5, 10)
        );
        assert_eq!(
            date("2024-05-10", "ide.dEmi", &mut errors),
            NaiveDate::from_ymd_opt(2024, 5, 10)
        );
        assert!(errors.is_empty());
        assert_eq!(date("10/05/2024", "ide.dhEmi", &mut errors), None);
        assert_eq!(errors.len(), 1);
    }
}
