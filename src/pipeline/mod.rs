//! Orchestrator: parse → validate → compute taxes → generate.
//!
//! A [`Processor`] is immutable and `Send + Sync`; share it between threads
//! and call [`Processor::process`] concurrently. Rate updates produce a new
//! processor through [`Processor::with_rates`].

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::core::*;
use crate::nfe;
use crate::tax::{RateLookup, compute_taxes};

/// Outcome of one `process` call.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingResult {
    /// The document as far as it could be built; `None` if the input was
    /// not well-formed XML or was rejected before parsing.
    pub document: Option<Document>,
    pub status: DocumentStatus,
    /// Blocking and fatal diagnostics, in pipeline order.
    pub errors: Vec<Diagnostic>,
    /// Everything else, in pipeline order.
    pub warnings: Vec<Diagnostic>,
    pub processing_time_ms: f64,
    /// `false` iff any blocking or fatal diagnostic was recorded.
    pub success: bool,
    /// Regenerated XML, when requested and allowed.
    #[serde(skip)]
    pub updated_bytes: Option<Vec<u8>>,
}

impl ProcessingResult {
    fn new(
        document: Option<Document>,
        status: DocumentStatus,
        diagnostics: Vec<Diagnostic>,
        updated_bytes: Option<Vec<u8>>,
        started: Instant,
    ) -> Self {
        let (errors, warnings): (Vec<_>, Vec<_>) =
            diagnostics.into_iter().partition(Diagnostic::is_blocking);
        Self {
            document,
            status,
            success: errors.is_empty(),
            errors,
            warnings,
            processing_time_ms: started.elapsed().as_secs_f64() * 1000.0,
            updated_bytes,
        }
    }

    /// All diagnostics, errors first.
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.errors.iter().chain(&self.warnings)
    }

    /// Number of diagnostics of the given kind.
    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.diagnostics().filter(|d| d.kind == kind).count()
    }
}

/// Runs documents through the pipeline against one rate snapshot.
#[derive(Clone)]
pub struct Processor {
    config: ProcessorConfig,
    rates: Arc<dyn RateLookup>,
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Processor {
    pub fn new(config: ProcessorConfig, rates: Arc<dyn RateLookup>) -> Self {
        Self { config, rates }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Per-call options defaulted from the configuration.
    pub fn default_options(&self) -> ProcessOptions {
        self.config.default_options()
    }

    /// A processor with the same configuration over a new rate snapshot.
    /// Calls already running on `self` keep their snapshot.
    pub fn with_rates(&self, rates: Arc<dyn RateLookup>) -> Self {
        Self {
            config: self.config.clone(),
            rates,
        }
    }

    /// Process raw NF-e XML.
    pub fn process(&self, bytes: &[u8], options: &ProcessOptions) -> ProcessingResult {
        let started = Instant::now();

        if bytes.len() > self.config.max_input_bytes {
            tracing::warn!(
                bytes = bytes.len(),
                limit = self.config.max_input_bytes,
                "input rejected: too large"
            );
            let diagnostic = Diagnostic::new(
                DiagnosticKind::ParseError,
                "",
                format!(
                    "input of {} bytes exceeds the limit of {} bytes",
                    bytes.len(),
                    self.config.max_input_bytes
                ),
            );
            return ProcessingResult::new(None, DocumentStatus::Failed, vec![diagnostic], None, started);
        }

        let (document, diagnostics) = nfe::parse(bytes);
        let Some(doc) = document else {
            tracing::warn!(diagnostics = diagnostics.len(), "input is not well-formed XML");
            return ProcessingResult::new(None, DocumentStatus::Failed, diagnostics, None, started);
        };
        if doc.status == DocumentStatus::Failed {
            tracing::warn!(diagnostics = diagnostics.len(), "input is not an NF-e document");
            return ProcessingResult::new(Some(doc), DocumentStatus::Failed, diagnostics, None, started);
        }

        self.run(doc, options, started)
    }

    /// Process a document that is already in memory (built or parsed
    /// earlier). Parser diagnostics it carries are kept; findings of
    /// earlier validation, tax and generation runs are dropped and
    /// recomputed.
    pub fn process_document(&self, doc: Document, options: &ProcessOptions) -> ProcessingResult {
        self.run(doc, options, Instant::now())
    }

    fn run(&self, mut doc: Document, options: &ProcessOptions, started: Instant) -> ProcessingResult {
        doc.diagnostics.retain(|d| d.stage == Stage::Parse);
        doc.advance(DocumentStatus::Parsed);
        let partial = doc
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::StructuralError);

        let found = validate(&doc, &options.validation(self.config.total_tolerance));
        tracing::debug!(access_key = %doc.access_key, diagnostics = found.len(), "document validated");
        doc.diagnostics.extend(found);
        doc.advance(DocumentStatus::Validated);

        if options.extract_taxes {
            if partial {
                tracing::debug!(access_key = %doc.access_key, "tax computation skipped for partial document");
            } else {
                let found = compute_taxes(&mut doc, self.rates.as_ref(), &options.tax());
                doc.diagnostics.extend(found);
                doc.advance(DocumentStatus::TaxComputed);
            }
        }

        let mut updated_bytes = None;
        if options.generate_updated_output {
            match nfe::generate(&doc) {
                Ok(bytes) => {
                    updated_bytes = Some(bytes);
                    doc.advance(DocumentStatus::Generated);
                }
                Err(e) => {
                    let message = match e {
                        NfeError::GenerationRefused(message) => message,
                        other => other.to_string(),
                    };
                    doc.diagnostics.push(Diagnostic::new(
                        DiagnosticKind::GenerationRefused,
                        "",
                        message,
                    ));
                }
            }
        }

        if doc.diagnostics.iter().any(Diagnostic::is_fatal) {
            doc.advance(DocumentStatus::Failed);
        } else {
            doc.advance(DocumentStatus::Completed);
        }

        let diagnostics = doc.diagnostics.clone();
        let status = doc.status;
        let result = ProcessingResult::new(Some(doc), status, diagnostics, updated_bytes, started);
        tracing::info!(
            status = ?result.status,
            errors = result.errors.len(),
            warnings = result.warnings.len(),
            elapsed_ms = result.processing_time_ms,
            "document processed"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tax::RateTable;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn rates() -> Arc<dyn RateLookup> {
        Arc::new(
            RateTable::new()
                .with_rate(TaxKind::Ibs, "*", "*", dec!(10.50))
                .with_rate(TaxKind::Cbs, "BR", "*", dec!(8.80))
                .with_rate(TaxKind::Selective, "BR", "*", dec!(0)),
        )
    }

    fn document() -> Document {
        DocumentBuilder::new(1, 123, NaiveDate::from_ymd_opt(2024, 5, 10).unwrap())
            .emitter(
                PartyBuilder::new("Emitente", TaxId::Cnpj("12345678000195".into()))
                    .address(AddressBuilder::new("São Paulo", "SP").build())
                    .build(),
            )
            .recipient(PartyBuilder::new("Cliente", TaxId::Cnpj("11222333000181".into())).build())
            .add_item(ItemBuilder::new("P1", "Produto", "22030000", dec!(1), dec!(100.00)).build())
            .build()
            .unwrap()
    }

    #[test]
    fn processor_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Processor>();
    }

    #[test]
    fn oversize_input_is_rejected_before_parsing() {
        let config = ProcessorConfig::builder().max_input_bytes(8).build();
        let processor = Processor::new(config, rates());
        let result = processor.process(b"<NFe></NFe>", &ProcessOptions::default());
        assert!(!result.success);
        assert_eq!(result.status, DocumentStatus::Failed);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, DiagnosticKind::ParseError);
        assert!(result.document.is_none());
    }

    #[test]
    fn in_memory_document_completes() {
        let processor = Processor::new(ProcessorConfig::default(), rates());
        let options = ProcessOptions {
            generate_updated_output: true,
            ..processor.default_options()
        };
        let result = processor.process_document(document(), &options);
        assert!(result.success, "{:?}", result.errors);
        assert_eq!(result.status, DocumentStatus::Completed);
        let doc = result.document.as_ref().unwrap();
        assert_eq!(doc.tax_totals.as_ref().unwrap().total(), Some(dec!(19.30)));
        assert!(result.updated_bytes.is_some());
    }

    #[test]
    fn refused_generation_is_a_diagnostic() {
        let processor = Processor::new(ProcessorConfig::default(), rates());
        let mut doc = document();
        doc.items[0].quantity = dec!(-1);
        let options = ProcessOptions {
            generate_updated_output: true,
            ..ProcessOptions::default()
        };
        let result = processor.process_document(doc, &options);
        assert!(!result.success);
        assert_eq!(result.count(DiagnosticKind::NegativeValueError), 1);
        assert_eq!(result.count(DiagnosticKind::GenerationRefused), 1);
        assert!(result.updated_bytes.is_none());
        assert_eq!(result.status, DocumentStatus::Completed);
    }

    #[test]
    fn with_rates_swaps_the_snapshot() {
        let processor = Processor::new(ProcessorConfig::default(), rates());
        let updated = processor.with_rates(Arc::new(
            RateTable::new()
                .with_rate(TaxKind::Ibs, "*", "*", dec!(17.70))
                .with_rate(TaxKind::Cbs, "BR", "*", dec!(8.80))
                .with_rate(TaxKind::Selective, "BR", "*", dec!(0)),
        ));
        let options = ProcessOptions::default();

        let before = processor.process_document(document(), &options);
        let after = updated.process_document(document(), &options);
        let ibs = |r: &ProcessingResult| r.document.as_ref().unwrap().tax_totals.as_ref().unwrap().ibs.value;
        assert_eq!(ibs(&before), dec!(10.50));
        assert_eq!(ibs(&after), dec!(17.70));
        assert_eq!(updated.config(), processor.config());
    }
}
