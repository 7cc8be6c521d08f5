//! Configurable ceilings applied during field validation.

/// Maximum number of fields a single form may carry.
pub const DEFAULT_MAX_FIELDS: usize = 100;

/// Maximum length of the canonical comma-joined options string.
pub const DEFAULT_MAX_OPTIONS_LEN: usize = 2000;

/// Maximum length of a field label or placeholder.
pub const MAX_LABEL_LEN: usize = 255;

/// Maximum length of a field's internal name.
pub const MAX_NAME_LEN: usize = 64;

/// Limits applied to an incoming field list.
///
/// The defaults match production values; the server overrides
/// `max_fields` from its environment configuration.
#[derive(Debug, Clone, Copy)]
pub struct FieldLimits {
    /// Reject the whole payload when it carries more fields than this.
    pub max_fields: usize,
    /// Reject an options string longer than this after canonicalization.
    pub max_options_len: usize,
}

impl Default for FieldLimits {
    fn default() -> Self {
        Self {
            max_fields: DEFAULT_MAX_FIELDS,
            max_options_len: DEFAULT_MAX_OPTIONS_LEN,
        }
    }
}
