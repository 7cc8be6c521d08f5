use formbase_core::FieldError;
use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A query expected exactly one row but found none.
    #[error("Record not found")]
    NotFound,

    /// A form with the same title (case-insensitively) already exists.
    #[error("A form with this title already exists")]
    TitleTaken,

    /// A template with the same name (case-insensitively) already exists.
    #[error("A template with this name already exists")]
    TemplateNameTaken,

    /// A category with the same name already exists.
    #[error("A category with this name already exists")]
    CategoryNameTaken,

    /// Two fields in the same form share an internal name.
    #[error("Duplicate field name within form")]
    DuplicateFieldName,

    /// The category is still referenced by forms or templates.
    #[error("Category is in use and cannot be deleted")]
    CategoryInUse,

    /// Category color is not a `#RRGGBB` hex string.
    #[error("Invalid category color: {0}")]
    InvalidColor(String),

    /// Could not allocate a unique id after the retry budget.  At this id
    /// length a genuine random collision is astronomically unlikely, so
    /// hitting this signals a systemic problem worth operator attention.
    #[error("Could not generate a unique id after {0} attempts")]
    IdExhausted(u32),

    /// Field payload failed sanitization/validation.
    #[error(transparent)]
    InvalidFields(#[from] FieldError),

    /// Submission payload failed validation against the form's field set.
    #[error("Submission validation failed: {}", .0.join("; "))]
    InvalidSubmission(Vec<String>),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// Snapshot or stored-field JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// UUID parsing error.
    #[error("UUID error: {0}")]
    Uuid(#[from] uuid::Error),

    /// Chrono parsing error.
    #[error("Timestamp parse error: {0}")]
    ChronoParse(#[from] chrono::ParseError),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Translate a SQLite unique-constraint violation into the typed
    /// conflict it represents.  The pre-write uniqueness checks are only a
    /// fast path; the constraint is the authoritative arbiter under races,
    /// and both must surface the same outcome.
    pub(crate) fn from_constraint(err: rusqlite::Error) -> StoreError {
        if let rusqlite::Error::SqliteFailure(code, Some(msg)) = &err {
            if code.code == rusqlite::ErrorCode::ConstraintViolation {
                if msg.contains("forms.title_norm") {
                    return StoreError::TitleTaken;
                }
                if msg.contains("templates.name_norm") {
                    return StoreError::TemplateNameTaken;
                }
                if msg.contains("categories.name") {
                    return StoreError::CategoryNameTaken;
                }
                if msg.contains("form_fields.form_id") && msg.contains("form_fields.name") {
                    return StoreError::DuplicateFieldName;
                }
            }
        }
        StoreError::Sqlite(err)
    }
}
