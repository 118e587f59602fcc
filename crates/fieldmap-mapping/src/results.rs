//! Per-entry mapping results
//!
//! Every entry applied during a pass records one [`MappingResult`]: a
//! success carrying the mapped value, a skip (guard not satisfied), or a
//! failure with its cause and severity.

use std::fmt;
use std::sync::Arc;

use fieldmap_convert::ConversionError;
use fieldmap_expr::EvalError;
use fieldmap_model::Value;

use crate::MappingError;

/// Severity of a mapping failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// Why an entry failed
#[derive(Debug, Clone)]
pub enum FailureCause {
    /// The guard condition could not be evaluated to a boolean
    Condition(EvalError),
    /// The source expression could not be evaluated
    Read(EvalError),
    /// The entry's converter or assembler failed
    Conversion(ConversionError),
    /// The target path could not be written, including coercion failures
    Write(EvalError),
    /// A nested mapper failed
    Nested(Arc<MappingError>),
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::Condition(error) => write!(f, "condition failed: {error}"),
            FailureCause::Read(error) => write!(f, "read failed: {error}"),
            FailureCause::Conversion(error) => write!(f, "conversion failed: {error}"),
            FailureCause::Write(error) => write!(f, "write failed: {error}"),
            FailureCause::Nested(error) => write!(f, "nested mapping failed: {error}"),
        }
    }
}

/// Outcome of applying one entry
#[derive(Debug, Clone)]
pub enum Outcome {
    Success(Value),
    Skipped,
    Failure {
        cause: FailureCause,
        severity: Severity,
    },
}

/// Result of applying one mapping entry
#[derive(Debug, Clone)]
pub struct MappingResult {
    pub source_field: String,
    pub target_field: String,
    /// True for auto-discovered mappings
    pub auto: bool,
    pub outcome: Outcome,
}

impl MappingResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success(_))
    }

    #[must_use]
    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, Outcome::Skipped)
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, Outcome::Failure { .. })
    }

    /// Mapped value of a successful result
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        match &self.outcome {
            Outcome::Success(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn severity(&self) -> Option<Severity> {
        match &self.outcome {
            Outcome::Failure { severity, .. } => Some(*severity),
            _ => None,
        }
    }

    #[must_use]
    pub fn cause(&self) -> Option<&FailureCause> {
        match &self.outcome {
            Outcome::Failure { cause, .. } => Some(cause),
            _ => None,
        }
    }
}

impl fmt::Display for MappingResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source_field, self.target_field)?;
        if self.auto {
            write!(f, " (auto)")?;
        }
        match &self.outcome {
            Outcome::Success(value) => write!(f, ": success [{value}]"),
            Outcome::Skipped => write!(f, ": skipped"),
            Outcome::Failure { cause, severity } => write!(f, ": {severity} [{cause}]"),
        }
    }
}

/// Ordered results of one mapping pass
#[derive(Debug, Clone, Default)]
pub struct MappingResults {
    results: Vec<MappingResult>,
}

impl MappingResults {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, result: MappingResult) {
        self.results.push(result);
    }

    pub fn iter(&self) -> impl Iterator<Item = &MappingResult> {
        self.results.iter()
    }

    pub fn successes(&self) -> impl Iterator<Item = &MappingResult> {
        self.results.iter().filter(|r| r.is_success())
    }

    pub fn failures(&self) -> impl Iterator<Item = &MappingResult> {
        self.results.iter().filter(|r| r.is_failure())
    }

    /// Failures of severity `Error`
    pub fn errors(&self) -> impl Iterator<Item = &MappingResult> {
        self.results
            .iter()
            .filter(|r| r.severity().is_some_and(|s| s >= Severity::Error))
    }

    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&MappingResult> {
        self.results.get(index)
    }

    /// First result written to the given target field
    #[must_use]
    pub fn get_field(&self, target_field: &str) -> Option<&MappingResult> {
        self.results.iter().find(|r| r.target_field == target_field)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl<'a> IntoIterator for &'a MappingResults {
    type Item = &'a MappingResult;
    type IntoIter = std::slice::Iter<'a, MappingResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}

impl fmt::Display for MappingResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[MappingResults = [")?;
        for (i, result) in self.results.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{result}")?;
        }
        write!(f, "]]")
    }
}
