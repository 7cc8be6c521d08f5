//! Submission intake: validate incoming data against a form's live field
//! set and store a redacted copy.
//!
//! Fields flagged `doNotStore` are checked like any other but never
//! written; the persisted JSON object simply omits them.

use chrono::Utc;
use rusqlite::params;
use serde_json::{Map, Value};
use uuid::Uuid;

use formbase_core::FormId;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::forms::{parse_form_id, parse_timestamp};
use crate::models::{FormField, Submission};

impl Database {
    /// Validate and store one submission for a form.
    ///
    /// Validation aggregates every problem (unknown field names, missing
    /// required values, values outside a field's option set) before
    /// failing, mirroring the field validator's behavior.
    pub fn submit(&self, form_id: &FormId, values: &Map<String, Value>) -> Result<Submission> {
        if !crate::forms::form_exists(self.conn(), form_id)? {
            return Err(StoreError::NotFound);
        }
        let fields = self.get_form_fields(form_id)?;

        let errors = validate_submission(&fields, values);
        if !errors.is_empty() {
            return Err(StoreError::InvalidSubmission(errors));
        }

        let mut redacted = Map::new();
        for field in &fields {
            if field.do_not_store {
                continue;
            }
            if let Some(value) = values.get(&field.name) {
                redacted.insert(field.name.clone(), value.clone());
            }
        }

        let id = Uuid::new_v4();
        let now = Utc::now();
        self.conn().execute(
            "INSERT INTO submissions (id, form_id, data, submitted_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                id.to_string(),
                form_id.as_str(),
                serde_json::to_string(&redacted)?,
                now.to_rfc3339(),
            ],
        )?;

        Ok(Submission {
            id,
            form_id: form_id.clone(),
            data: redacted,
            submitted_at: now,
        })
    }

    /// All stored submissions for a form, newest first.
    pub fn list_submissions(&self, form_id: &FormId) -> Result<Vec<Submission>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, form_id, data, submitted_at
             FROM submissions
             WHERE form_id = ?1
             ORDER BY submitted_at DESC",
        )?;

        let rows = stmt.query_map(params![form_id.as_str()], row_to_submission)?;

        let mut submissions = Vec::new();
        for row in rows {
            let (submission, data) = row?;
            submissions.push(decode_submission(submission, data)?);
        }
        Ok(submissions)
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate_submission(fields: &[FormField], values: &Map<String, Value>) -> Vec<String> {
    let mut errors = Vec::new();

    for key in values.keys() {
        if !fields.iter().any(|f| &f.name == key) {
            errors.push(format!("Unknown field \"{key}\""));
        }
    }

    for field in fields {
        let value = values.get(&field.name);

        if field.required && value.map(is_empty_value).unwrap_or(true) {
            errors.push(format!("\"{}\" is required", field.label));
            continue;
        }

        // Option membership only applies when literal tokens exist; a
        // data-source-backed field is validated upstream.  Blank tokens
        // are dropped the same way the sanitizer drops them.
        let tokens: Vec<&str> = field
            .options
            .as_deref()
            .map(|s| s.split(',').map(str::trim).filter(|t| !t.is_empty()).collect())
            .unwrap_or_default();
        if tokens.is_empty() {
            continue;
        }

        match value {
            None | Some(Value::Null) => {}
            Some(Value::String(s)) if s.is_empty() => {}
            Some(Value::String(s)) => {
                if !tokens.contains(&s.as_str()) {
                    errors.push(format!("\"{}\": \"{s}\" is not an option", field.label));
                }
            }
            Some(Value::Array(items)) => {
                for item in items {
                    match item {
                        Value::String(s) if tokens.contains(&s.as_str()) => {}
                        other => errors.push(format!(
                            "\"{}\": {other} is not an option",
                            field.label
                        )),
                    }
                }
            }
            Some(other) => {
                errors.push(format!("\"{}\": {other} is not an option", field.label));
            }
        }
    }

    errors
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Row mappers
// ---------------------------------------------------------------------------

fn decode_submission(mut submission: Submission, data: String) -> Result<Submission> {
    submission.data = serde_json::from_str(&data)?;
    Ok(submission)
}

fn row_to_submission(row: &rusqlite::Row<'_>) -> rusqlite::Result<(Submission, String)> {
    let id_str: String = row.get(0)?;
    let form_id_str: String = row.get(1)?;
    let submitted_str: String = row.get(3)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok((
        Submission {
            id,
            form_id: parse_form_id(1, &form_id_str)?,
            data: Map::new(),
            submitted_at: parse_timestamp(3, &submitted_str)?,
        },
        row.get(2)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{clean_field, open_db, option_field};
    use serde_json::json;

    fn seed(db: &mut Database) -> FormId {
        let mut secret = clean_field("password", "Secret", "secret", true);
        secret.do_not_store = true;
        let fields = vec![
            clean_field("email", "Email", "email", true),
            option_field("dropdown", "Country", "country", "NZ,DE,JP"),
            secret,
        ];
        let (form, _) = db
            .create_form_with_fields("Intake", &fields, None, None)
            .unwrap();
        form.id
    }

    fn values(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn stores_redacted_copy() {
        let mut db = open_db();
        let form_id = seed(&mut db);

        let submission = db
            .submit(
                &form_id,
                &values(&[
                    ("email", json!("a@b.example")),
                    ("country", json!("NZ")),
                    ("secret", json!("hunter2")),
                ]),
            )
            .unwrap();

        assert!(submission.data.contains_key("email"));
        assert!(!submission.data.contains_key("secret"));

        let stored = db.list_submissions(&form_id).unwrap();
        assert_eq!(stored.len(), 1);
        assert!(!stored[0].data.contains_key("secret"));
    }

    #[test]
    fn aggregates_all_validation_errors() {
        let mut db = open_db();
        let form_id = seed(&mut db);

        let err = db
            .submit(
                &form_id,
                &values(&[
                    ("country", json!("FR")),
                    ("bogus", json!("x")),
                    ("secret", json!("hunter2")),
                ]),
            )
            .unwrap_err();

        let StoreError::InvalidSubmission(messages) = err else {
            panic!("expected InvalidSubmission");
        };
        assert!(messages.iter().any(|m| m.contains("Unknown field \"bogus\"")));
        assert!(messages.iter().any(|m| m.contains("\"Email\" is required")));
        assert!(messages.iter().any(|m| m.contains("not an option")));

        assert!(db.list_submissions(&form_id).unwrap().is_empty());
    }

    #[test]
    fn checkbox_values_validated_individually() {
        let mut db = open_db();
        let fields = vec![option_field("checkboxes", "Toppings", "toppings", "ham,feta")];
        let (form, _) = db
            .create_form_with_fields("Pizza", &fields, None, None)
            .unwrap();

        db.submit(&form.id, &values(&[("toppings", json!(["ham", "feta"]))]))
            .unwrap();

        let err = db
            .submit(&form.id, &values(&[("toppings", json!(["ham", "glue"]))]))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidSubmission(_)));
    }

    #[test]
    fn data_source_fields_accept_any_value() {
        let mut db = open_db();
        // Older rows may carry an empty options string alongside the data
        // source; neither shape may constrain submitted values.
        let mut legacy = option_field("dropdown", "Country", "country", "");
        legacy.data_source = Some("countries".into());
        let mut sourced = clean_field("dropdown", "Region", "region", false);
        sourced.data_source = Some("regions".into());

        let (form, _) = db
            .create_form_with_fields("Locations", &[legacy, sourced], None, None)
            .unwrap();

        let submission = db
            .submit(
                &form.id,
                &values(&[("country", json!("NZ")), ("region", json!("Otago"))]),
            )
            .unwrap();
        assert_eq!(submission.data["country"], json!("NZ"));
    }

    #[test]
    fn non_string_scalar_rejected_for_option_fields() {
        let mut db = open_db();
        let fields = vec![option_field("dropdown", "Country", "country", "NZ,DE,JP")];
        let (form, _) = db
            .create_form_with_fields("Scalar", &fields, None, None)
            .unwrap();

        let err = db
            .submit(&form.id, &values(&[("country", json!(7))]))
            .unwrap_err();
        let StoreError::InvalidSubmission(messages) = err else {
            panic!("expected InvalidSubmission");
        };
        assert!(messages.iter().any(|m| m.contains("not an option")));
    }

    #[test]
    fn submissions_cascade_with_form_delete() {
        let mut db = open_db();
        let form_id = seed(&mut db);
        db.submit(
            &form_id,
            &values(&[
                ("email", json!("a@b.example")),
                ("secret", json!("x")),
            ]),
        )
        .unwrap();

        db.delete_form(&form_id).unwrap();
        let remaining: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM submissions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(remaining, 0);
    }
}
