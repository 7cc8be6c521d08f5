//! Sanitization and validation pipeline for incoming field lists.
//!
//! Every field list passes through here exactly once before persistence:
//! `sanitize_fields` normalizes the payload into [`CleanField`]s, then
//! `validate_fields` checks every rule and aggregates all violations.
//! Sanitization is a fixed point: running it twice produces the same output.

use crate::error::{FieldError, ValidationErrors};
use crate::field::{CleanField, FieldType, OptionsInput, RawField};
use crate::limits::{FieldLimits, MAX_LABEL_LEN, MAX_NAME_LEN};

/// Sanitize then validate a submitted field list.
///
/// The field-count ceiling is checked against the raw payload before any
/// per-field work so oversized payloads are rejected cheaply.
pub fn sanitize_and_validate(
    raw: &[RawField],
    limits: &FieldLimits,
) -> Result<Vec<CleanField>, FieldError> {
    if raw.len() > limits.max_fields {
        return Err(FieldError::TooManyFields {
            count: raw.len(),
            max: limits.max_fields,
        });
    }

    let clean = sanitize_fields(raw);
    validate_fields(&clean, limits)?;
    Ok(clean)
}

/// Normalize a raw field list into its canonical persisted shape.
///
/// - label/placeholder: markup stripped, trimmed
/// - name: control characters stripped, trimmed
/// - options: canonical comma-joined token string for option types,
///   removed entirely for every other type
/// - the builder's transient `autoName` flag is dropped
pub fn sanitize_fields(raw: &[RawField]) -> Vec<CleanField> {
    raw.iter().map(sanitize_field).collect()
}

fn sanitize_field(raw: &RawField) -> CleanField {
    let field_type = raw.field_type.trim().to_string();
    let needs_options = FieldType::parse(&field_type)
        .map(|t| t.needs_options())
        .unwrap_or(false);

    // An options payload with no surviving tokens (empty list, all-blank
    // entries) is treated as absent, not as an empty token set.
    let options = if needs_options {
        raw.options
            .as_ref()
            .map(canonicalize_options)
            .filter(|s| !s.is_empty())
    } else {
        None
    };

    let placeholder = raw
        .placeholder
        .as_deref()
        .map(strip_markup)
        .filter(|s| !s.is_empty());

    let data_source = raw
        .data_source
        .as_deref()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    CleanField {
        field_type,
        label: strip_markup(&raw.label),
        name: strip_control(&raw.name),
        placeholder,
        required: raw.required,
        do_not_store: raw.do_not_store,
        options,
        data_source,
    }
}

/// Check every rule against an already-sanitized field list.
///
/// All violations are collected; nothing short-circuits.  Messages carry
/// the 1-based field position so the builder can highlight each offender.
pub fn validate_fields(clean: &[CleanField], limits: &FieldLimits) -> Result<(), FieldError> {
    if clean.len() > limits.max_fields {
        return Err(FieldError::TooManyFields {
            count: clean.len(),
            max: limits.max_fields,
        });
    }

    let mut messages = Vec::new();

    for (i, field) in clean.iter().enumerate() {
        let pos = i + 1;

        if field.label.is_empty() {
            messages.push(format!("Field {pos}: label is required"));
        } else if field.label.chars().count() > MAX_LABEL_LEN {
            messages.push(format!(
                "Field {pos}: label exceeds {MAX_LABEL_LEN} characters"
            ));
        }

        if field.name.is_empty() {
            messages.push(format!("Field {pos}: name is required"));
        } else if field.name.chars().count() > MAX_NAME_LEN {
            messages.push(format!(
                "Field {pos}: name exceeds {MAX_NAME_LEN} characters"
            ));
        } else if !is_valid_name(&field.name) {
            messages.push(format!(
                "Field {pos}: name must start with a letter and contain only letters, digits and underscores"
            ));
        }

        if let Some(placeholder) = &field.placeholder {
            if placeholder.chars().count() > MAX_LABEL_LEN {
                messages.push(format!(
                    "Field {pos}: placeholder exceeds {MAX_LABEL_LEN} characters"
                ));
            }
        }

        match FieldType::parse(&field.field_type) {
            None => {
                messages.push(format!(
                    "Field {pos}: unknown field type \"{}\"",
                    field.field_type
                ));
            }
            Some(t) if t.needs_options() => {
                let has_tokens = !field.option_tokens().is_empty();
                let has_source = field.data_source.is_some();
                if !has_tokens && !has_source {
                    messages.push(format!(
                        "Field {pos}: {} fields require at least one option",
                        t.as_str()
                    ));
                }
                if let Some(options) = &field.options {
                    if options.chars().count() > limits.max_options_len {
                        messages.push(format!(
                            "Field {pos}: options exceed {} characters",
                            limits.max_options_len
                        ));
                    }
                }
            }
            Some(_) => {}
        }

        // Duplicate detection is exact match on the trimmed name; only the
        // later occurrence is reported.
        if !field.name.is_empty() {
            let earlier = clean[..i].iter().any(|f| f.name == field.name);
            if earlier {
                messages.push(format!(
                    "Field {pos}: duplicate field name \"{}\"",
                    field.name
                ));
            }
        }
    }

    if messages.is_empty() {
        Ok(())
    } else {
        Err(FieldError::Invalid(ValidationErrors { messages }))
    }
}

/// `[A-Za-z][A-Za-z0-9_]*`
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Remove markup spans (`<...>`, including an unterminated trailing `<`)
/// and control characters, then trim.  The output never contains `<`, so
/// applying this twice is a no-op.
fn strip_markup(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    for c in input.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if in_tag => {}
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out.trim().to_string()
}

/// Remove control characters and trim.
fn strip_control(input: &str) -> String {
    input.chars().filter(|c| !c.is_control()).collect::<String>().trim().to_string()
}

/// Canonicalize an options payload: split, trim each token, drop empties,
/// join with commas.
fn canonicalize_options(input: &OptionsInput) -> String {
    let tokens: Vec<String> = match input {
        OptionsInput::List(items) => items
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        OptionsInput::Text(s) => s
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
    };
    tokens.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(field_type: &str, label: &str, name: &str) -> RawField {
        RawField {
            field_type: field_type.into(),
            label: label.into(),
            name: name.into(),
            placeholder: None,
            required: false,
            do_not_store: false,
            options: None,
            data_source: None,
            auto_name: false,
        }
    }

    fn clean_one(raw: &RawField) -> CleanField {
        sanitize_fields(std::slice::from_ref(raw)).remove(0)
    }

    #[test]
    fn strips_markup_from_label_and_placeholder() {
        let mut field = raw("singleLine", "  Name <script>alert(1)</script>  ", "name");
        field.placeholder = Some("<b>Your</b> name".into());

        let clean = clean_one(&field);
        assert_eq!(clean.label, "Name alert(1)");
        assert_eq!(clean.placeholder.as_deref(), Some("Your name"));
    }

    #[test]
    fn strips_control_characters_from_name() {
        let clean = clean_one(&raw("singleLine", "Label", "na\u{0000}me\t"));
        assert_eq!(clean.name, "name");
    }

    #[test]
    fn options_canonicalized_for_option_types_only() {
        let mut dropdown = raw("dropdown", "Pick", "pick");
        dropdown.options = Some(OptionsInput::Text(" a , b ,, c ".into()));
        assert_eq!(clean_one(&dropdown).options.as_deref(), Some("a,b,c"));

        let mut email = raw("email", "Email", "email");
        email.options = Some(OptionsInput::List(vec!["junk".into()]));
        assert_eq!(clean_one(&email).options, None);
    }

    #[test]
    fn empty_options_payload_becomes_absent() {
        let mut sourced = raw("dropdown", "Country", "country");
        sourced.options = Some(OptionsInput::List(vec![]));
        sourced.data_source = Some("countries".into());

        let clean = clean_one(&sourced);
        assert_eq!(clean.options, None);
        assert_eq!(clean.data_source.as_deref(), Some("countries"));

        let mut blank = raw("checkboxes", "Pick", "pick");
        blank.options = Some(OptionsInput::Text(" , , ".into()));
        assert_eq!(clean_one(&blank).options, None);
    }

    #[test]
    fn sanitize_is_idempotent() {
        let mut fields = vec![
            raw("dropdown", " Pick <i>one</i> ", " pick "),
            raw("email", "Email", "email"),
        ];
        fields[0].options = Some(OptionsInput::List(vec![" a ".into(), "".into(), "b".into()]));

        let once = sanitize_fields(&fields);
        let twice = sanitize_fields(
            &once
                .iter()
                .map(|c| RawField {
                    field_type: c.field_type.clone(),
                    label: c.label.clone(),
                    name: c.name.clone(),
                    placeholder: c.placeholder.clone(),
                    required: c.required,
                    do_not_store: c.do_not_store,
                    options: c.options.clone().map(OptionsInput::Text),
                    data_source: c.data_source.clone(),
                    auto_name: false,
                })
                .collect::<Vec<_>>(),
        );
        assert_eq!(once, twice);
    }

    #[test]
    fn duplicate_names_rejected_case_sensitively() {
        let fields = sanitize_fields(&[
            raw("email", "Email", "email"),
            raw("singleLine", "Other", "email"),
            raw("singleLine", "Cased", "Email"),
        ]);

        let err = validate_fields(&fields, &FieldLimits::default()).unwrap_err();
        match err {
            FieldError::Invalid(errors) => {
                assert_eq!(errors.messages.len(), 1);
                assert!(errors.messages[0].contains("Field 2"));
                assert!(errors.messages[0].contains("duplicate"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn option_type_without_options_or_source_fails() {
        let fields = sanitize_fields(&[raw("dropdown", "Pick", "pick")]);
        let err = validate_fields(&fields, &FieldLimits::default()).unwrap_err();
        assert!(matches!(err, FieldError::Invalid(_)));

        let mut sourced = raw("dropdown", "Pick", "pick");
        sourced.data_source = Some("countries".into());
        let fields = sanitize_fields(&[sourced]);
        assert!(validate_fields(&fields, &FieldLimits::default()).is_ok());
    }

    #[test]
    fn all_violations_reported_with_positions() {
        let fields = sanitize_fields(&[
            raw("singleLine", "", ""),
            raw("mystery", "Label", "9bad name"),
        ]);

        let err = validate_fields(&fields, &FieldLimits::default()).unwrap_err();
        let FieldError::Invalid(errors) = err else {
            panic!("expected Invalid");
        };
        assert!(errors.messages.iter().any(|m| m.starts_with("Field 1: label")));
        assert!(errors.messages.iter().any(|m| m.starts_with("Field 1: name")));
        assert!(errors.messages.iter().any(|m| m.contains("unknown field type")));
        assert!(errors
            .messages
            .iter()
            .any(|m| m.starts_with("Field 2: name must start")));
    }

    #[test]
    fn field_count_ceiling_enforced_before_validation() {
        let limits = FieldLimits {
            max_fields: 2,
            ..FieldLimits::default()
        };
        let fields: Vec<RawField> = (0..3)
            .map(|i| raw("singleLine", "L", &format!("f{i}")))
            .collect();

        let err = sanitize_and_validate(&fields, &limits).unwrap_err();
        assert!(matches!(err, FieldError::TooManyFields { count: 3, max: 2 }));
    }

    #[test]
    fn valid_payload_passes_end_to_end() {
        let mut dropdown = raw("dropdown", "Country", "country");
        dropdown.options = Some(OptionsInput::List(vec!["NZ".into(), "DE".into()]));
        let mut email = raw("email", "Email", "email");
        email.required = true;

        let clean = sanitize_and_validate(&[dropdown, email], &FieldLimits::default()).unwrap();
        assert_eq!(clean.len(), 2);
        assert_eq!(clean[0].options.as_deref(), Some("NZ,DE"));
        assert!(clean[1].required);
    }
}
