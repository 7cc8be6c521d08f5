use thiserror::Error;

/// All messages collected while validating one field list.
///
/// Validation never short-circuits: every offending field contributes its
/// own messages (prefixed with its 1-based position) so a builder UI can
/// highlight all problems in one round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors {
    pub messages: Vec<String>,
}

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.messages.join("; "))
    }
}

/// Errors produced by the field sanitization/validation pipeline.
#[derive(Error, Debug)]
pub enum FieldError {
    /// The payload exceeded the configured field-count ceiling.  Kept as
    /// its own variant so the HTTP layer can answer 413 instead of 400.
    #[error("Too many fields: {count} (maximum {max})")]
    TooManyFields { count: usize, max: usize },

    /// One or more per-field validation rules were violated.
    #[error("Field validation failed: {0}")]
    Invalid(ValidationErrors),
}
