//! Field type system and the raw/clean field payload shapes.
//!
//! `RawField` is the wire shape the builder UI submits; `CleanField` is the
//! sanitized form that gets persisted and snapshotted.  Both serialize with
//! camelCase keys so version snapshots round-trip unchanged through the
//! HTTP layer.

use serde::{Deserialize, Serialize};

/// The closed set of field types a form may contain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum FieldType {
    SingleLine,
    Paragraph,
    Dropdown,
    MultipleChoice,
    Checkboxes,
    Number,
    Name,
    Email,
    Phone,
    Password,
    Date,
    Time,
    Datetime,
    Url,
    File,
    RichText,
}

impl FieldType {
    /// Wire/database name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::SingleLine => "singleLine",
            FieldType::Paragraph => "paragraph",
            FieldType::Dropdown => "dropdown",
            FieldType::MultipleChoice => "multipleChoice",
            FieldType::Checkboxes => "checkboxes",
            FieldType::Number => "number",
            FieldType::Name => "name",
            FieldType::Email => "email",
            FieldType::Phone => "phone",
            FieldType::Password => "password",
            FieldType::Date => "date",
            FieldType::Time => "time",
            FieldType::Datetime => "datetime",
            FieldType::Url => "url",
            FieldType::File => "file",
            FieldType::RichText => "richText",
        }
    }

    /// Parse a wire/database name back into a `FieldType`.
    pub fn parse(s: &str) -> Option<Self> {
        let t = match s {
            "singleLine" => FieldType::SingleLine,
            "paragraph" => FieldType::Paragraph,
            "dropdown" => FieldType::Dropdown,
            "multipleChoice" => FieldType::MultipleChoice,
            "checkboxes" => FieldType::Checkboxes,
            "number" => FieldType::Number,
            "name" => FieldType::Name,
            "email" => FieldType::Email,
            "phone" => FieldType::Phone,
            "password" => FieldType::Password,
            "date" => FieldType::Date,
            "time" => FieldType::Time,
            "datetime" => FieldType::Datetime,
            "url" => FieldType::Url,
            "file" => FieldType::File,
            "richText" => FieldType::RichText,
            _ => return None,
        };
        Some(t)
    }

    /// Whether this type requires a non-empty option list (or data source).
    pub fn needs_options(&self) -> bool {
        matches!(
            self,
            FieldType::Dropdown | FieldType::MultipleChoice | FieldType::Checkboxes
        )
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Option list as submitted: the builder sends an array, older clients and
/// imports send a comma-separated string.  Both canonicalize to the same
/// comma-joined form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum OptionsInput {
    List(Vec<String>),
    Text(String),
}

/// One field exactly as submitted by a client, before sanitization.
///
/// `field_type` is a plain string so an unknown type is reported as a
/// validation message instead of a deserialization failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RawField {
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub do_not_store: bool,
    #[serde(default)]
    pub options: Option<OptionsInput>,
    /// Dynamic source that can substitute for literal options in the
    /// builder (for example a lookup endpoint name).
    #[serde(default)]
    pub data_source: Option<String>,
    /// Transient editor flag: the interactive builder sets this when it
    /// auto-derived `name` from `label`.  Stripped before persistence.
    #[serde(default)]
    pub auto_name: bool,
}

/// A sanitized field, ready for persistence or snapshotting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CleanField {
    #[serde(rename = "type")]
    pub field_type: String,
    pub label: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub do_not_store: bool,
    /// Canonical comma-joined option tokens; `None` for non-option types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<String>,
}

impl CleanField {
    /// Parsed field type, if the stored string is a known type.
    pub fn field_type(&self) -> Option<FieldType> {
        FieldType::parse(&self.field_type)
    }

    /// The individual option tokens, empty for non-option fields.
    pub fn option_tokens(&self) -> Vec<&str> {
        self.options
            .as_deref()
            .map(|s| s.split(',').map(str::trim).filter(|t| !t.is_empty()).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names_round_trip() {
        for t in [
            FieldType::SingleLine,
            FieldType::MultipleChoice,
            FieldType::RichText,
            FieldType::Datetime,
        ] {
            assert_eq!(FieldType::parse(t.as_str()), Some(t));
        }
        assert_eq!(FieldType::parse("textarea"), None);
    }

    #[test]
    fn options_deserialize_from_array_or_string() {
        let from_array: RawField =
            serde_json::from_str(r#"{"type":"dropdown","label":"L","name":"n","options":["a","b"]}"#)
                .unwrap();
        let from_string: RawField =
            serde_json::from_str(r#"{"type":"dropdown","label":"L","name":"n","options":"a,b"}"#)
                .unwrap();

        assert_eq!(
            from_array.options,
            Some(OptionsInput::List(vec!["a".into(), "b".into()]))
        );
        assert_eq!(from_string.options, Some(OptionsInput::Text("a,b".into())));
    }

    #[test]
    fn clean_field_skips_absent_options_in_json() {
        let field = CleanField {
            field_type: "email".into(),
            label: "Email".into(),
            name: "email".into(),
            placeholder: None,
            required: true,
            do_not_store: false,
            options: None,
            data_source: None,
        };
        let json = serde_json::to_string(&field).unwrap();
        assert!(!json.contains("options"));
        assert!(!json.contains("placeholder"));
    }
}
