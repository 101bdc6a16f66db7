use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by the library API itself.
///
/// Everything that can go wrong with a *document* is reported as a
/// [`Diagnostic`]; these errors cover calls that cannot produce a result.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NfeError {
    /// One or more blocking validation diagnostics.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Builder encountered missing or invalid input.
    #[error("builder error: {0}")]
    Builder(String),

    /// The document carries blocking diagnostics and may not be serialized.
    #[error("generation refused: {0}")]
    GenerationRefused(String),

    /// XML generation or re-reading of retained source failed.
    #[error("XML error: {0}")]
    Xml(String),

    /// A rate table snapshot could not be loaded.
    #[error("rate table error: {0}")]
    RateTable(String),
}

/// Error from decoding a 44-digit access key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum AccessKeyError {
    #[error("access key must have 44 digits, got {0} characters")]
    Length(usize),

    #[error("access key must contain only digits")]
    NonDigit,
}

/// How serious a diagnostic is.
///
/// Ordered: `Warning < Blocking < Fatal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational; the document remains usable.
    Warning,
    /// Processing continues, but the result is not successful and no
    /// output is generated.
    Blocking,
    /// Processing of the document stops.
    Fatal,
}

impl Severity {
    /// Whether this severity makes `success` false.
    pub fn is_blocking(self) -> bool {
        self >= Severity::Blocking
    }
}

/// Pipeline stage that produced a diagnostic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Parse,
    Validate,
    Tax,
    Generate,
}

/// Diagnostic taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum DiagnosticKind {
    /// Input bytes are not well-formed UTF-8 XML, or are oversized.
    ParseError,
    /// A required section or value is missing or unreadable.
    StructuralError,
    /// A key, tax id, state or model has the wrong shape.
    FormatError,
    /// An access-key or tax-id check digit does not match.
    ChecksumError,
    /// A quantity or monetary value is negative.
    NegativeValueError,
    /// Declared and computed totals disagree beyond the tolerance.
    TotalMismatch,
    /// The access key disagrees with the document header.
    AccessKeyMismatch,
    /// No rate was available for a tax kind.
    RateNotFound,
    /// A tax computation overflowed or produced a negative value.
    ComputationError,
    /// Output generation was refused.
    GenerationRefused,
    /// An unknown element was skipped.
    UnrecognizedElement,
}

impl DiagnosticKind {
    /// Severity this kind carries unless a policy overrides it.
    pub fn default_severity(self) -> Severity {
        match self {
            Self::ParseError => Severity::Fatal,
            Self::TotalMismatch | Self::AccessKeyMismatch | Self::UnrecognizedElement => {
                Severity::Warning
            }
            Self::RateNotFound => Severity::Warning,
            Self::StructuralError
            | Self::FormatError
            | Self::ChecksumError
            | Self::NegativeValueError
            | Self::ComputationError
            | Self::GenerationRefused => Severity::Blocking,
        }
    }

    /// Stage that usually reports this kind. `StructuralError` and
    /// `FormatError` are reported by more than one stage; those emitters
    /// set the stage explicitly with [`Diagnostic::in_stage`].
    pub fn default_stage(self) -> Stage {
        match self {
            Self::ParseError | Self::StructuralError | Self::UnrecognizedElement => Stage::Parse,
            Self::FormatError
            | Self::ChecksumError
            | Self::NegativeValueError
            | Self::TotalMismatch
            | Self::AccessKeyMismatch => Stage::Validate,
            Self::RateNotFound | Self::ComputationError => Stage::Tax,
            Self::GenerationRefused => Stage::Generate,
        }
    }

    /// Stable identifier used in display output.
    pub fn code(self) -> &'static str {
        match self {
            Self::ParseError => "ParseError",
            Self::StructuralError => "StructuralError",
            Self::FormatError => "FormatError",
            Self::ChecksumError => "ChecksumError",
            Self::NegativeValueError => "NegativeValueError",
            Self::TotalMismatch => "TotalMismatch",
            Self::AccessKeyMismatch => "AccessKeyMismatch",
            Self::RateNotFound => "RateNotFound",
            Self::ComputationError => "ComputationError",
            Self::GenerationRefused => "GenerationRefused",
            Self::UnrecognizedElement => "UnrecognizedElement",
        }
    }
}

/// A single finding with kind, severity and location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    /// Dot-separated location (e.g. "det[2].prod.vProd"); empty for the whole document.
    pub field: String,
    /// Human-readable description.
    pub message: String,
    #[serde(default)]
    pub stage: Stage,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.field.is_empty() {
            write!(f, "[{}] {}", self.kind.code(), self.message)
        } else {
            write!(f, "[{}] {}: {}", self.kind.code(), self.field, self.message)
        }
    }
}

impl Diagnostic {
    /// Create a diagnostic with the kind's default severity.
    pub fn new(kind: DiagnosticKind, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_severity(kind, kind.default_severity(), field, message)
    }

    /// Create a diagnostic with an explicit severity.
    pub fn with_severity(
        kind: DiagnosticKind,
        severity: Severity,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            severity,
            field: field.into(),
            message: message.into(),
            stage: kind.default_stage(),
        }
    }

    /// Attribute the diagnostic to `stage`.
    pub fn in_stage(mut self, stage: Stage) -> Self {
        self.stage = stage;
        self
    }

    /// Create a fatal diagnostic regardless of the kind's default.
    pub fn fatal(kind: DiagnosticKind, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_severity(kind, Severity::Fatal, field, message)
    }

    pub fn is_blocking(&self) -> bool {
        self.severity.is_blocking()
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }
}

/// Whether any diagnostic in `diagnostics` is blocking or fatal.
pub fn has_blocking(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_blocking)
}
