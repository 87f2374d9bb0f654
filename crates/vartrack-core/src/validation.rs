#![forbid(unsafe_code)]

//! Validation results and validator state snapshots.
//!
//! A [`ValidationResult`] is what a rule callback returns: ordered error
//! codes and ordered warning codes. A [`ValidatorState`] is the snapshot a
//! validator holds after finishing a run. Neither is ever an error value;
//! invalid data is queryable state.

use std::fmt;

/// Ordered error and warning codes produced by a validation callback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl ValidationResult {
    /// A result with no errors and no warnings.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A result with the given errors and warnings.
    pub fn new<E, W>(errors: E, warnings: W) -> Self
    where
        E: IntoIterator,
        E::Item: Into<String>,
        W: IntoIterator,
        W::Item: Into<String>,
    {
        Self {
            errors: errors.into_iter().map(Into::into).collect(),
            warnings: warnings.into_iter().map(Into::into).collect(),
        }
    }

    /// A result carrying only errors.
    pub fn from_errors<I>(errors: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self::new(errors, Vec::<String>::new())
    }

    /// A result carrying only warnings.
    pub fn from_warnings<I>(warnings: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self::new(Vec::<String>::new(), warnings)
    }

    /// Error codes in the order they were reported.
    #[must_use]
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Warning codes in the order they were reported.
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Whether no errors were reported.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Whether any warnings were reported.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Append `other`'s errors and warnings after this result's.
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self
    }

    /// Merge two optional results. Neither side discards the other.
    #[must_use]
    pub fn combine(first: Option<Self>, second: Option<Self>) -> Option<Self> {
        match (first, second) {
            (Some(a), Some(b)) => Some(a.merge(b)),
            (a, b) => a.or(b),
        }
    }
}

/// A validator's state after its latest finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatorState {
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl ValidatorState {
    /// Error codes of the latest run.
    #[must_use]
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Warning codes of the latest run.
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Whether the latest run reported no errors.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Whether the latest run reported warnings.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

impl From<ValidationResult> for ValidatorState {
    fn from(result: ValidationResult) -> Self {
        Self {
            errors: result.errors,
            warnings: result.warnings,
        }
    }
}

impl From<Option<ValidationResult>> for ValidatorState {
    fn from(result: Option<ValidationResult>) -> Self {
        result.map(Self::from).unwrap_or_default()
    }
}

/// Published by a validator whenever a run finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableValidatedEvent {
    /// Overall validity, including nested elements where applicable.
    pub is_valid: bool,
    /// Overall warning presence, including nested elements where applicable.
    pub has_warnings: bool,
    /// The validator's own state snapshot.
    pub state: ValidatorState,
}

impl VariableValidatedEvent {
    /// Build an event from explicit flags and a state snapshot.
    #[must_use]
    pub fn new(is_valid: bool, has_warnings: bool, state: ValidatorState) -> Self {
        Self {
            is_valid,
            has_warnings,
            state,
        }
    }
}

/// Which phase of a validation run produced a finished state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidatorFinishMode {
    /// The synchronous pre-check, surfaced before the async part completes.
    Sync,
    /// The combined synchronous and asynchronous result.
    Async,
}

impl fmt::Display for ValidatorFinishMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync => f.write_str("sync"),
            Self::Async => f.write_str("async"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_concatenates_both_sides() {
        let sync = ValidationResult::new(["A"], ["W1"]);
        let async_ = ValidationResult::new(["B", "C"], Vec::<String>::new());
        let merged = ValidationResult::combine(Some(sync), Some(async_)).unwrap();

        assert_eq!(merged.errors(), ["A", "B", "C"]);
        assert_eq!(merged.warnings(), ["W1"]);
    }

    #[test]
    fn combine_keeps_the_present_side() {
        let only = ValidationResult::from_warnings(["W"]);

        assert_eq!(
            ValidationResult::combine(None, Some(only.clone())),
            Some(only.clone())
        );
        assert_eq!(ValidationResult::combine(Some(only.clone()), None), Some(only));
        assert_eq!(ValidationResult::combine(None, None), None);
    }

    #[test]
    fn state_from_absent_result_is_valid() {
        let state = ValidatorState::from(None::<ValidationResult>);
        assert!(state.is_valid());
        assert!(!state.has_warnings());

        let state = ValidatorState::from(ValidationResult::from_errors(["REQUIRED"]));
        assert!(!state.is_valid());
        assert_eq!(state.errors(), ["REQUIRED"]);
    }

    #[test]
    fn warnings_are_not_inverted() {
        assert!(!ValidationResult::empty().has_warnings());
        assert!(ValidationResult::from_warnings(["W"]).has_warnings());
        assert!(ValidationResult::from_warnings(["W"]).is_valid());
    }
}
