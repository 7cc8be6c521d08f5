//! Domain model structs persisted in the SQLite database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the HTTP layer as a response body.

use chrono::{DateTime, Utc};
use formbase_core::{CategoryId, CleanField, FormId, TemplateId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A partial-update value for one column.
///
/// `Keep` means the caller did not supply the key at all ("leave
/// unchanged"); `Set` carries the new value, where an empty string or
/// `None` inside means "clear it".  Making the distinction a type keeps
/// `undefined` and `""` from ever being conflated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Patch<T> {
    #[default]
    Keep,
    Set(T),
}

impl<T> Patch<T> {
    pub fn is_set(&self) -> bool {
        matches!(self, Patch::Set(_))
    }

    /// Convert from the wire convention where a missing key means "keep".
    pub fn from_option(value: Option<T>) -> Self {
        match value {
            Some(v) => Patch::Set(v),
            None => Patch::Keep,
        }
    }
}

// ---------------------------------------------------------------------------
// Form
// ---------------------------------------------------------------------------

/// A named, ordered collection of fields plus metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Form {
    /// Stable short readable id (`form-XXXXXXXX`), immutable.
    pub id: FormId,
    /// Display title, globally unique case-insensitively.
    pub title: String,
    /// Category name: survey, quiz, feedback, registration or contact.
    pub category: String,
    /// Owner reference; `None` when auth is disabled.
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Denormalized pointer to the currently published version, if any.
    pub last_published_version_id: Option<Uuid>,
    pub published_at: Option<DateTime<Utc>>,
}

/// One typed input definition, owned exclusively by its form.
///
/// Fields are destroyed and recreated wholesale on every form update;
/// their ids are not stable across saves.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FormField {
    /// 16-character random token, never user-facing.
    pub id: String,
    pub form_id: FormId,
    /// Wire name of the field type (for example `multipleChoice`).
    pub field_type: String,
    pub label: String,
    /// Internal identifier, unique within the owning form.
    pub name: String,
    pub placeholder: Option<String>,
    pub required: bool,
    /// Excluded from any persisted submission copy.
    pub do_not_store: bool,
    /// Canonical comma-joined option tokens; `None` for non-option types.
    pub options: Option<String>,
    pub data_source: Option<String>,
    /// Zero-based render/edit order, contiguous per form.
    pub position: i64,
}

impl FormField {
    /// The sanitized shape this row was created from.
    pub fn to_clean(&self) -> CleanField {
        CleanField {
            field_type: self.field_type.clone(),
            label: self.label.clone(),
            name: self.name.clone(),
            placeholder: self.placeholder.clone(),
            required: self.required,
            do_not_store: self.do_not_store,
            options: self.options.clone(),
            data_source: self.data_source.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Versions and drafts
// ---------------------------------------------------------------------------

/// An immutable snapshot of a form's title/category/fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FormVersion {
    pub id: Uuid,
    pub form_id: FormId,
    /// Monotonically increasing per form, starts at 1, never reused.
    pub version_number: i64,
    pub title: String,
    pub category_id: Option<String>,
    /// The field list at snapshot time.
    pub fields: Vec<CleanField>,
    pub change_description: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub is_published: bool,
    pub published_at: Option<DateTime<Utc>>,
}

/// A mutable, author-scoped working copy of a form-in-progress.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FormDraft {
    pub id: Uuid,
    /// `None` while the draft describes a not-yet-created form.
    pub form_id: Option<FormId>,
    pub created_by: String,
    pub title: String,
    pub category_id: Option<String>,
    pub fields: Vec<CleanField>,
    pub last_saved_at: DateTime<Utc>,
    /// Distinguishes periodic autosave from an explicit save action.
    pub is_auto_save: bool,
}

// ---------------------------------------------------------------------------
// Templates and categories
// ---------------------------------------------------------------------------

/// A reusable, form-independent field-set definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Template {
    pub id: TemplateId,
    /// Globally unique case-insensitively.
    pub name: String,
    pub description: Option<String>,
    pub category_id: Option<CategoryId>,
    pub fields: Vec<CleanField>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Simple lookup entity referenced by forms and templates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub description: Option<String>,
    /// Hex color, `#RRGGBB`.
    pub color: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Submissions
// ---------------------------------------------------------------------------

/// A stored public submission, already redacted of `doNotStore` fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Submission {
    pub id: Uuid,
    pub form_id: FormId,
    /// Field name -> submitted value(s).
    pub data: serde_json::Map<String, serde_json::Value>,
    pub submitted_at: DateTime<Utc>,
}
