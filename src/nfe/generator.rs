use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::QName;

use super::xml_utils::XmlWriter;
use super::{LAYOUT_VERSION, NFE_NAMESPACE};
use crate::core::*;

/// Serialize a document back to NF-e XML.
///
/// Refuses with [`NfeError::GenerationRefused`] if the document carries any
/// blocking diagnostic.
///
/// A parsed document is regenerated from its retained source: every event
/// is copied verbatim (declaration, namespaces, ordering, whitespace,
/// comments, signature), stale reform groups are dropped and the current
/// ones are written at the end of each `imposto` and of `total`. Only tax
/// groups are updated this way; documents whose structure was edited after
/// parsing should have `source` cleared so they are written from scratch.
///
/// Any existing `Signature` no longer matches the content and must be
/// recomputed by the caller.
pub fn generate(doc: &Document) -> Result<Vec<u8>, NfeError> {
    if let Some(blocking) = doc.diagnostics.iter().find(|d| d.is_blocking()) {
        tracing::warn!(access_key = %doc.access_key, first = %blocking, "generation refused");
        return Err(NfeError::GenerationRefused(format!(
            "document carries blocking diagnostics, first: {blocking}"
        )));
    }

    let out = match &doc.source {
        Some(source) => splice(doc, source)?,
        None => write_document(doc)?,
    };
    tracing::debug!(access_key = %doc.access_key, bytes = out.len(), "document generated");
    Ok(out)
}

// ---------------------------------------------------------------------------
// Regeneration from retained source
// ---------------------------------------------------------------------------

fn local(name: QName<'_>) -> String {
    String::from_utf8_lossy(name.local_name().as_ref()).into_owned()
}

fn prefix(name: QName<'_>) -> Option<String> {
    name.prefix()
        .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned())
}

/// Reform groups the generator owns and rewrites.
fn is_reform_group(parent: Option<&str>, name: &str) -> bool {
    match parent {
        Some("imposto") => name == "IBSCBS" || name == "IS",
        Some("total") => name == "IBSCBSTot" || name == "ISTot",
        _ => false,
    }
}

fn splice(doc: &Document, source: &str) -> Result<Vec<u8>, NfeError> {
    let mut reader = Reader::from_str(source);
    let mut w = XmlWriter::passthrough();

    let mut path: Vec<String> = Vec::new();
    let mut skip_depth = 0usize;
    let mut det_count = 0usize;
    let mut imposto_seen = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| NfeError::Xml(format!("retained source is not well-formed: {e}")))?;

        if skip_depth > 0 {
            match event {
                Event::Start(_) => skip_depth += 1,
                Event::End(_) => skip_depth -= 1,
                Event::Eof => return Err(NfeError::Xml("unexpected end of retained source".into())),
                _ => {}
            }
            continue;
        }

        let parent = path.last().map(String::as_str);
        match event {
            Event::Start(ref e) => {
                let name = local(e.name());
                if is_reform_group(parent, &name) {
                    skip_depth = 1;
                    continue;
                }
                if name == "det" && parent == Some("infNFe") {
                    det_count += 1;
                    imposto_seen = false;
                }
                if name == "imposto" && parent == Some("det") {
                    imposto_seen = true;
                }
                path.push(name);
                w.write_event(event)?;
            }
            Event::Empty(ref e) => {
                let name = local(e.name());
                if is_reform_group(parent, &name) {
                    continue;
                }
                if name == "imposto" && parent == Some("det") {
                    imposto_seen = true;
                    expand_empty(&mut w, e, |w| write_item_groups(w, doc, det_count))?;
                } else if name == "total" && parent == Some("infNFe") {
                    expand_empty(&mut w, e, |w| write_total_groups(w, doc))?;
                } else {
                    w.write_event(event)?;
                }
            }
            Event::End(ref e) => {
                let name = path.pop().unwrap_or_default();
                let parent = path.last().map(String::as_str);
                w.set_prefix(prefix(e.name()).as_deref());
                match (name.as_str(), parent) {
                    ("imposto", Some("det")) => write_item_groups(&mut w, doc, det_count)?,
                    ("det", Some("infNFe")) if !imposto_seen => {
                        if let Some(item) = doc.items.get(det_count.wrapping_sub(1)) {
                            if has_reform_values(&item.tax) {
                                w.start_element("imposto")?;
                                write_item_reform(&mut w, &item.tax)?;
                                w.end_element("imposto")?;
                            }
                        }
                    }
                    ("total", Some("infNFe")) => write_total_groups(&mut w, doc)?,
                    _ => {}
                }
                w.write_event(event)?;
            }
            Event::Eof => break,
            other => {
                w.write_event(other)?;
            }
        }
    }

    Ok(w.into_bytes())
}

/// Turn `<x/>` into `<x>…</x>` so groups can be written inside it.
fn expand_empty(
    w: &mut XmlWriter,
    e: &BytesStart<'_>,
    inner: impl FnOnce(&mut XmlWriter) -> Result<(), NfeError>,
) -> Result<(), NfeError> {
    w.set_prefix(prefix(e.name()).as_deref());
    w.write_event(Event::Start(e.borrow()))?;
    inner(w)?;
    w.write_event(Event::End(e.to_end()))?;
    Ok(())
}

/// Groups for the `det_count`-th item (1-based), if the document has it.
fn write_item_groups(w: &mut XmlWriter, doc: &Document, det_count: usize) -> Result<(), NfeError> {
    match doc.items.get(det_count.wrapping_sub(1)) {
        Some(item) => write_item_reform(w, &item.tax),
        None => Ok(()),
    }
}

fn write_total_groups(w: &mut XmlWriter, doc: &Document) -> Result<(), NfeError> {
    match &doc.tax_totals {
        Some(totals) => write_total_reform(w, totals),
        None => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Reform groups
// ---------------------------------------------------------------------------

fn has_reform_values(tax: &TaxDetail) -> bool {
    TaxKind::ALL.iter().any(|&k| !tax.component(k).is_unset())
}

/// `IBSCBS` (with `gIBS` / `gCBS`) and `IS`; unset components are omitted.
fn write_item_reform(w: &mut XmlWriter, tax: &TaxDetail) -> Result<(), NfeError> {
    if !tax.ibs.is_unset() || !tax.cbs.is_unset() {
        w.start_element("IBSCBS")?;
        write_component(w, "gIBS", ["vBC", "pIBS", "vIBS"], &tax.ibs)?;
        write_component(w, "gCBS", ["vBC", "pCBS", "vCBS"], &tax.cbs)?;
        w.end_element("IBSCBS")?;
    }
    write_component(w, "IS", ["vBCIS", "pIS", "vIS"], &tax.selective)
}

fn write_component(
    w: &mut XmlWriter,
    group: &str,
    [base, rate, value]: [&str; 3],
    component: &TaxComponent,
) -> Result<(), NfeError> {
    if component.is_unset() {
        return Ok(());
    }
    w.start_element(group)?;
    w.opt_amount_element(base, component.base)?;
    w.opt_decimal_element(rate, component.rate)?;
    w.opt_amount_element(value, component.value)?;
    w.end_element(group)?;
    Ok(())
}

fn write_total_reform(w: &mut XmlWriter, totals: &TaxTotals) -> Result<(), NfeError> {
    w.start_element("IBSCBSTot")?;
    w.amount_element("vBCIBS", totals.ibs.base)?;
    w.amount_element("vIBS", totals.ibs.value)?;
    w.amount_element("vBCCBS", totals.cbs.base)?;
    w.amount_element("vCBS", totals.cbs.value)?;
    w.end_element("IBSCBSTot")?;
    w.start_element("ISTot")?;
    w.amount_element("vBCIS", totals.selective.base)?;
    w.amount_element("vIS", totals.selective.value)?;
    w.end_element("ISTot")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Writing from the model
// ---------------------------------------------------------------------------

fn write_document(doc: &Document) -> Result<Vec<u8>, NfeError> {
    let mut w = XmlWriter::new()?;
    w.start_element_with_attrs("NFe", &[("xmlns", NFE_NAMESPACE)])?;
    let id = format!("NFe{}", doc.access_key);
    w.start_element_with_attrs("infNFe", &[("Id", id.as_str()), ("versao", LAYOUT_VERSION)])?;

    w.start_element("ide")?;
    w.opt_text_element("natOp", doc.operation_nature.as_deref())?;
    w.opt_text_element("mod", doc.model.map(|m| m.code().to_string()).as_deref())?;
    w.opt_text_element("serie", doc.series.map(|s| s.to_string()).as_deref())?;
    w.opt_text_element("nNF", doc.number.map(|n| n.to_string()).as_deref())?;
    w.opt_text_element(
        "dhEmi",
        doc.issue_date
            .map(|d| format!("{}T00:00:00-03:00", d.format("%Y-%m-%d")))
            .as_deref(),
    )?;
    w.end_element("ide")?;

    if let Some(emitter) = &doc.emitter {
        write_party(&mut w, emitter, "emit", "enderEmit")?;
    }
    if let Some(recipient) = &doc.recipient {
        write_party(&mut w, recipient, "dest", "enderDest")?;
    }
    for item in &doc.items {
        write_item(&mut w, item)?;
    }

    w.start_element("total")?;
    w.start_element("ICMSTot")?;
    for (name, value) in &doc.legacy_totals {
        w.amount_element(name, *value)?;
    }
    w.opt_amount_element("vProd", doc.declared_total)?;
    w.opt_amount_element("vNF", doc.invoice_total)?;
    w.end_element("ICMSTot")?;
    if let Some(totals) = &doc.tax_totals {
        write_total_reform(&mut w, totals)?;
    }
    w.end_element("total")?;

    w.end_element("infNFe")?;
    w.end_element("NFe")?;
    Ok(w.into_bytes())
}

fn write_party(w: &mut XmlWriter, party: &Party, element: &str, address_element: &str) -> Result<(), NfeError> {
    w.start_element(element)?;
    if let Some(tax_id) = &party.tax_id {
        w.text_element(tax_id.element_name(), tax_id.digits())?;
    }
    w.text_element("xNome", &party.name)?;
    w.opt_text_element("xFant", party.trade_name.as_deref())?;

    let a = &party.address;
    if *a != Address::default() {
        w.start_element(address_element)?;
        w.opt_text_element("xLgr", a.street.as_deref())?;
        w.opt_text_element("nro", a.number.as_deref())?;
        w.opt_text_element("xCpl", a.complement.as_deref())?;
        w.opt_text_element("xBairro", a.district.as_deref())?;
        w.opt_text_element("cMun", a.city_code.as_deref())?;
        w.opt_text_element("xMun", a.city.as_deref())?;
        w.opt_text_element("UF", a.state.as_deref())?;
        w.opt_text_element("CEP", a.zip_code.as_deref())?;
        w.opt_text_element("fone", a.phone.as_deref())?;
        w.end_element(address_element)?;
    }

    w.opt_text_element("IE", party.state_registration.as_deref())?;
    w.opt_text_element("email", party.email.as_deref())?;
    w.end_element(element)?;
    Ok(())
}

fn write_item(w: &mut XmlWriter, item: &Item) -> Result<(), NfeError> {
    let n = item.sequence.to_string();
    w.start_element_with_attrs("det", &[("nItem", n.as_str())])?;

    w.start_element("prod")?;
    w.text_element("cProd", &item.product_code)?;
    w.text_element("xProd", &item.description)?;
    w.text_element("NCM", &item.classification)?;
    w.opt_text_element("CFOP", item.cfop.as_deref())?;
    w.opt_text_element("uCom", item.unit.as_deref())?;
    w.opt_decimal_element("qCom", Some(item.quantity))?;
    w.opt_decimal_element("vUnCom", Some(item.unit_value))?;
    w.amount_element("vProd", item.total_value)?;
    w.end_element("prod")?;

    w.start_element("imposto")?;
    for legacy in &item.tax.legacy {
        w.start_element(&legacy.tax)?;
        if let Some(group) = &legacy.group {
            w.start_element(group)?;
        }
        w.opt_decimal_element("vBC", legacy.base)?;
        w.opt_decimal_element(&format!("p{}", legacy.tax), legacy.rate)?;
        w.opt_amount_element(&format!("v{}", legacy.tax), legacy.value)?;
        if let Some(group) = &legacy.group {
            w.end_element(group)?;
        }
        w.end_element(&legacy.tax)?;
    }
    write_item_reform(w, &item.tax)?;
    w.end_element("imposto")?;

    w.end_element("det")?;
    Ok(())
}
