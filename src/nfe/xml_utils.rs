use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use rust_decimal::Decimal;

use crate::core::NfeError;

fn xml_io(e: std::io::Error) -> NfeError {
    NfeError::Xml(format!("XML write error: {e}"))
}

/// Thin wrapper over a quick-xml writer.
///
/// Element names are written with an optional namespace prefix so that
/// groups spliced into a prefixed document stay in the document namespace.
pub struct XmlWriter {
    writer: Writer<Vec<u8>>,
    prefix: String,
}

impl XmlWriter {
    /// Indented writer starting with an XML declaration.
    pub fn new() -> Result<Self, NfeError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_io)?;
        Ok(Self {
            writer,
            prefix: String::new(),
        })
    }

    /// Unindented writer without declaration, for copying events verbatim.
    pub fn passthrough() -> Self {
        Self {
            writer: Writer::new(Vec::new()),
            prefix: String::new(),
        }
    }

    /// Namespace prefix (without the colon) for subsequent element names.
    pub fn set_prefix(&mut self, prefix: Option<&str>) {
        self.prefix = match prefix {
            Some(p) if !p.is_empty() => format!("{p}:"),
            _ => String::new(),
        };
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.writer.into_inner()
    }

    /// Write an event read from another document unchanged.
    pub fn write_event(&mut self, event: Event<'_>) -> Result<&mut Self, NfeError> {
        self.writer.write_event(event).map_err(xml_io)?;
        Ok(self)
    }

    pub fn start_element(&mut self, name: &str) -> Result<&mut Self, NfeError> {
        let elem = BytesStart::new(format!("{}{name}", self.prefix));
        self.writer
            .write_event(Event::Start(elem))
            .map_err(xml_io)?;
        Ok(self)
    }

    pub fn start_element_with_attrs(
        &mut self,
        name: &str,
        attrs: &[(&str, &str)],
    ) -> Result<&mut Self, NfeError> {
        let mut elem = BytesStart::new(format!("{}{name}", self.prefix));
        for (k, v) in attrs {
            elem.push_attribute((*k, *v));
        }
        self.writer
            .write_event(Event::Start(elem))
            .map_err(xml_io)?;
        Ok(self)
    }

    pub fn end_element(&mut self, name: &str) -> Result<&mut Self, NfeError> {
        self.writer
            .write_event(Event::End(BytesEnd::new(format!("{}{name}", self.prefix))))
            .map_err(xml_io)?;
        Ok(self)
    }

    pub fn text_element(&mut self, name: &str, text: &str) -> Result<&mut Self, NfeError> {
        self.start_element(name)?;
        self.writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(xml_io)?;
        self.end_element(name)
    }

    /// Write `name` only when `text` is present.
    pub fn opt_text_element(
        &mut self,
        name: &str,
        text: Option<&str>,
    ) -> Result<&mut Self, NfeError> {
        match text {
            Some(t) => self.text_element(name, t),
            None => Ok(self),
        }
    }

    /// Monetary value with at least two decimals.
    pub fn amount_element(&mut self, name: &str, amount: Decimal) -> Result<&mut Self, NfeError> {
        self.text_element(name, &format_amount(amount))
    }

    pub fn opt_amount_element(
        &mut self,
        name: &str,
        amount: Option<Decimal>,
    ) -> Result<&mut Self, NfeError> {
        match amount {
            Some(a) => self.amount_element(name, a),
            None => Ok(self),
        }
    }

    /// Quantity, base or rate, keeping its significant decimals.
    pub fn opt_decimal_element(
        &mut self,
        name: &str,
        value: Option<Decimal>,
    ) -> Result<&mut Self, NfeError> {
        match value {
            Some(v) => self.text_element(name, &format_decimal(v)),
            None => Ok(self),
        }
    }
}

/// Format a Decimal for XML output: at least 2 decimal places, trailing
/// zeros beyond that stripped.
pub fn format_decimal(d: Decimal) -> String {
    let s = unsigned_zero(d).normalize().to_string();
    if let Some(dot_pos) = s.find('.') {
        let decimals = s.len() - dot_pos - 1;
        if decimals < 2 {
            format!("{s}{}", "0".repeat(2 - decimals))
        } else {
            s
        }
    } else {
        format!("{s}.00")
    }
}

/// Format a monetary value: exactly two decimals for values already rounded
/// to cents, never dropping digits of a more precise value.
pub fn format_amount(d: Decimal) -> String {
    let mut d = unsigned_zero(d);
    if d.scale() < 2 {
        d.rescale(2);
    }
    d.to_string()
}

fn unsigned_zero(d: Decimal) -> Decimal {
    if d.is_zero() { d.abs() } else { d }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn format_decimal_cases() {
        assert_eq!(format_decimal(dec!(100)), "100.00");
        assert_eq!(format_decimal(dec!(1500.0)), "1500.00");
        assert_eq!(format_decimal(dec!(17.70)), "17.70");
        assert_eq!(format_decimal(dec!(0.0005)), "0.0005");
        assert_eq!(format_decimal(dec!(3.5000)), "3.50");
    }

    #[test]
    fn format_amount_cases() {
        assert_eq!(format_amount(dec!(10.5)), "10.50");
        assert_eq!(format_amount(dec!(0)), "0.00");
        assert_eq!(format_amount(dec!(1234567.89)), "1234567.89");
        assert_eq!(format_amount(dec!(-0.00)), "0.00");
        assert_eq!(format_amount(dec!(1.235)), "1.235");
    }

    #[test]
    fn never_scientific() {
        assert_eq!(format_amount(dec!(0.00000001)), "0.00000001");
        assert_eq!(format_amount(dec!(100000000000000000000)), "100000000000000000000.00");
    }

    #[test]
    fn prefixed_elements() {
        let mut w = XmlWriter::passthrough();
        w.set_prefix(Some("nfe"));
        w.opt_amount_element("vIBS", Some(dec!(1.5))).unwrap();
        w.opt_amount_element("vCBS", None).unwrap();
        let out = String::from_utf8(w.into_bytes()).unwrap();
        assert_eq!(out, "<nfe:vIBS>1.50</nfe:vIBS>");
    }
}
