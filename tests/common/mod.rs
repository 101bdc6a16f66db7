//! Shared NF-e fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use nfe_reforma::core::*;
use nfe_reforma::pipeline::Processor;
use nfe_reforma::tax::{RateLookup, RateTable};
use rust_decimal_macros::dec;

/// Valid key: SP, 2024-05, CNPJ 12345678000195, model 55, series 1, number 123.
pub const ACCESS_KEY: &str = "35240512345678000195550010000001231123456786";
pub const EMITTER_CNPJ: &str = "12345678000195";
pub const RECIPIENT_CNPJ: &str = "11222333000181";

/// One `det` element.
pub fn item_xml(n: usize, ncm: &str, quantity: &str, unit_value: &str, total: &str) -> String {
    format!(
        r#"    <det nItem="{n}">
      <prod>
        <cProd>P{n}</cProd>
        <xProd>Produto {n}</xProd>
        <NCM>{ncm}</NCM>
        <CFOP>5102</CFOP>
        <uCom>UN</uCom>
        <qCom>{quantity}</qCom>
        <vUnCom>{unit_value}</vUnCom>
        <vProd>{total}</vProd>
      </prod>
      <imposto>
        <ICMS>
          <ICMS00>
            <orig>0</orig>
            <CST>00</CST>
            <vBC>{total}</vBC>
            <pICMS>18.00</pICMS>
            <vICMS>0.00</vICMS>
          </ICMS00>
        </ICMS>
      </imposto>
    </det>
"#
    )
}

/// A complete NF-e with the given `det` elements and declared `vProd`.
pub fn nfe_xml(items: &[String], declared_total: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<NFe xmlns="http://www.portalfiscal.inf.br/nfe">
  <infNFe Id="NFe{ACCESS_KEY}" versao="4.00">
    <ide>
      <cUF>35</cUF>
      <natOp>Venda de mercadoria</natOp>
      <mod>55</mod>
      <serie>1</serie>
      <nNF>123</nNF>
      <dhEmi>2024-05-10T10:00:00-03:00</dhEmi>
    </ide>
    <emit>
      <CNPJ>{EMITTER_CNPJ}</CNPJ>
      <xNome>Empresa Teste Ltda</xNome>
      <enderEmit>
        <xLgr>Rua A</xLgr>
        <nro>100</nro>
        <xMun>São Paulo</xMun>
        <UF>SP</UF>
      </enderEmit>
      <IE>123456789</IE>
    </emit>
    <dest>
      <CNPJ>{RECIPIENT_CNPJ}</CNPJ>
      <xNome>Cliente &amp; Filhos SA</xNome>
      <enderDest>
        <xMun>Rio de Janeiro</xMun>
        <UF>RJ</UF>
      </enderDest>
    </dest>
{items}    <total>
      <ICMSTot>
        <vBC>{declared_total}</vBC>
        <vICMS>0.00</vICMS>
        <vProd>{declared_total}</vProd>
        <vNF>{declared_total}</vNF>
      </ICMSTot>
    </total>
  </infNFe>
</NFe>
"#,
        items = items.concat()
    )
}

/// Single-item document: `1 x total`.
pub fn single_item_xml(total: &str, declared_total: &str) -> String {
    nfe_xml(&[item_xml(1, "22030000", "1", total, total)], declared_total)
}

/// Rates covering every kind: IBS 17.70 (RJ) / 17.00 elsewhere, CBS 8.80,
/// IS 0 except beverages (NCM 2203) at 2.00.
pub fn rate_table() -> RateTable {
    RateTable::new()
        .with_rate(TaxKind::Ibs, "RJ", "*", dec!(17.70))
        .with_rate(TaxKind::Ibs, "*", "*", dec!(17.00))
        .with_rate(TaxKind::Cbs, "BR", "*", dec!(8.80))
        .with_rate(TaxKind::Selective, "BR", "*", dec!(0))
        .with_rate(TaxKind::Selective, "BR", "2203", dec!(2.00))
}

pub fn rates() -> Arc<dyn RateLookup> {
    Arc::new(rate_table())
}

pub fn processor() -> Processor {
    Processor::new(ProcessorConfig::default(), rates())
}
