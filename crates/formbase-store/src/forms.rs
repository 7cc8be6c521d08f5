//! Form persistence: transactional create/replace workflows, title
//! uniqueness and id allocation.
//!
//! Field lists are never diff-patched.  Whenever an update supplies a new
//! list, every existing `form_fields` row is deleted and the new list
//! inserted fresh inside the same transaction, keeping `position`
//! contiguous and sidestepping partial-update bugs.  Version snapshots
//! (see `versions.rs`) exist to recover the history this discards.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use unicode_normalization::UnicodeNormalization;

use formbase_core::{ids, CleanField, FormId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Form, FormField, Patch};

/// Allowed `category` values; the first is the default.
pub const FORM_CATEGORIES: [&str; 5] = ["survey", "quiz", "feedback", "registration", "contact"];

/// Attempts made to find an unused id before giving up.
const ID_RETRIES: u32 = 5;

/// Canonical comparison key for titles and template names: NFKC
/// normalization, trim, lowercase.
pub(crate) fn normalize_unique(s: &str) -> String {
    s.nfkc().collect::<String>().trim().to_lowercase()
}

/// Resolve a caller-supplied category to a stored value.  Unknown values
/// fall back to the default rather than failing the whole save.
pub(crate) fn resolve_category(category: Option<&str>) -> &str {
    match category {
        Some(c) if FORM_CATEGORIES.contains(&c) => c,
        Some(c) if !c.is_empty() => {
            tracing::warn!(category = c, "unknown form category, using default");
            FORM_CATEGORIES[0]
        }
        _ => FORM_CATEGORIES[0],
    }
}

impl Database {
    // ------------------------------------------------------------------
    // Uniqueness
    // ------------------------------------------------------------------

    /// Case-insensitive check whether a form title is already in use.
    ///
    /// This is the fast pre-check for client feedback; the unique index on
    /// `title_norm` remains the authoritative arbiter under races.
    pub fn is_form_title_taken(&self, title: &str, exclude: Option<&FormId>) -> Result<bool> {
        is_title_taken(self.conn(), title, exclude)
    }

    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Create a form together with its ordered field list, atomically.
    ///
    /// The caller passes fields that already went through
    /// [`formbase_core::sanitize_and_validate`].
    pub fn create_form_with_fields(
        &mut self,
        title: &str,
        fields: &[CleanField],
        category: Option<&str>,
        created_by: Option<&str>,
    ) -> Result<(Form, Vec<FormField>)> {
        let title = title.trim();
        let title_norm = normalize_unique(title);
        let category = resolve_category(category).to_string();
        let now = Utc::now();

        let tx = self.conn_mut().transaction()?;

        if is_title_taken(&tx, title, None)? {
            return Err(StoreError::TitleTaken);
        }

        let id = allocate_form_id(&tx)?;

        tx.execute(
            "INSERT INTO forms (id, title, title_norm, category, created_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id.as_str(),
                title,
                title_norm,
                category,
                created_by,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )
        .map_err(StoreError::from_constraint)?;

        let inserted = insert_fields(&tx, &id, fields)?;

        tx.commit()?;

        let form = Form {
            id,
            title: title.to_string(),
            category,
            created_by: created_by.map(str::to_string),
            created_at: now,
            updated_at: now,
            last_published_version_id: None,
            published_at: None,
        };
        Ok((form, inserted))
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Update a form's title/category and optionally replace its fields.
    ///
    /// Returns `Ok(None)` when no form with this id exists, so callers can
    /// answer 404 without a separate existence check.  `Patch::Keep`
    /// leaves a column untouched; `Patch::Set("")` on the category resets
    /// it to the default.  A supplied field list replaces all existing
    /// field rows wholesale.  The whole operation is one transaction.
    pub fn update_form_with_fields(
        &mut self,
        id: &FormId,
        title: Patch<String>,
        fields: Option<&[CleanField]>,
        category: Patch<String>,
    ) -> Result<Option<Form>> {
        let now = Utc::now();
        let tx = self.conn_mut().transaction()?;

        if !form_exists(&tx, id)? {
            return Ok(None);
        }

        if let Patch::Set(new_title) = &title {
            let new_title = new_title.trim();
            if is_title_taken(&tx, new_title, Some(id))? {
                return Err(StoreError::TitleTaken);
            }
            tx.execute(
                "UPDATE forms SET title = ?1, title_norm = ?2 WHERE id = ?3",
                params![new_title, normalize_unique(new_title), id.as_str()],
            )
            .map_err(StoreError::from_constraint)?;
        }

        if let Patch::Set(new_category) = &category {
            let resolved = if new_category.is_empty() {
                FORM_CATEGORIES[0]
            } else {
                resolve_category(Some(new_category))
            };
            tx.execute(
                "UPDATE forms SET category = ?1 WHERE id = ?2",
                params![resolved, id.as_str()],
            )?;
        }

        if let Some(new_fields) = fields {
            replace_fields(&tx, id, new_fields)?;
        }

        tx.execute(
            "UPDATE forms SET updated_at = ?1 WHERE id = ?2",
            params![now.to_rfc3339(), id.as_str()],
        )?;

        let form = get_form_row(&tx, id)?;
        tx.commit()?;

        Ok(Some(form))
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single form by id.
    pub fn get_form(&self, id: &FormId) -> Result<Form> {
        get_form_row(self.conn(), id)
    }

    /// The form's live fields, ordered by position.
    pub fn get_form_fields(&self, id: &FormId) -> Result<Vec<FormField>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, form_id, type, label, name, placeholder, required, do_not_store,
                    options, data_source, position
             FROM form_fields
             WHERE form_id = ?1
             ORDER BY position ASC",
        )?;

        let rows = stmt.query_map(params![id.as_str()], row_to_field)?;

        let mut fields = Vec::new();
        for row in rows {
            fields.push(row?);
        }
        Ok(fields)
    }

    /// List all forms, most recently updated first.
    pub fn list_forms(&self) -> Result<Vec<Form>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, title, category, created_by, created_at, updated_at,
                    last_published_version_id, published_at
             FROM forms
             ORDER BY updated_at DESC",
        )?;

        let rows = stmt.query_map([], row_to_form)?;

        let mut forms = Vec::new();
        for row in rows {
            forms.push(row?);
        }
        Ok(forms)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a form.  Fields, versions, drafts and submissions cascade.
    /// Returns `true` if a row was deleted.
    pub fn delete_form(&self, id: &FormId) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM forms WHERE id = ?1", params![id.as_str()])?;
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Shared helpers (also used by the version and draft workflows)
// ---------------------------------------------------------------------------

pub(crate) fn form_exists(conn: &Connection, id: &FormId) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM forms WHERE id = ?1",
            params![id.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub(crate) fn is_title_taken(
    conn: &Connection,
    title: &str,
    exclude: Option<&FormId>,
) -> Result<bool> {
    let norm = normalize_unique(title);
    let found: Option<i64> = match exclude {
        Some(id) => conn
            .query_row(
                "SELECT 1 FROM forms WHERE title_norm = ?1 AND id != ?2",
                params![norm, id.as_str()],
                |row| row.get(0),
            )
            .optional()?,
        None => conn
            .query_row(
                "SELECT 1 FROM forms WHERE title_norm = ?1",
                params![norm],
                |row| row.get(0),
            )
            .optional()?,
    };
    Ok(found.is_some())
}

/// Allocate an unused form id, retrying on collision.
///
/// A collision at this id length is astronomically unlikely; exhausting
/// the retry budget is treated as an operational anomaly.
pub(crate) fn allocate_form_id(conn: &Connection) -> Result<FormId> {
    for _ in 0..ID_RETRIES {
        let candidate = FormId::generate();
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM forms WHERE id = ?1",
                params![candidate.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Ok(candidate);
        }
        tracing::warn!(id = %candidate, "form id collision, retrying");
    }
    tracing::error!("exhausted form id generation retries");
    Err(StoreError::IdExhausted(ID_RETRIES))
}

/// Insert a field list for a form, `position` following array order.
pub(crate) fn insert_fields(
    conn: &Connection,
    form_id: &FormId,
    fields: &[CleanField],
) -> Result<Vec<FormField>> {
    let mut inserted = Vec::with_capacity(fields.len());

    for (position, field) in fields.iter().enumerate() {
        let id = ids::random_field_id();
        conn.execute(
            "INSERT INTO form_fields (id, form_id, type, label, name, placeholder,
                                      required, do_not_store, options, data_source, position)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                id,
                form_id.as_str(),
                field.field_type,
                field.label,
                field.name,
                field.placeholder,
                field.required,
                field.do_not_store,
                field.options,
                field.data_source,
                position as i64,
            ],
        )
        .map_err(StoreError::from_constraint)?;

        inserted.push(FormField {
            id,
            form_id: form_id.clone(),
            field_type: field.field_type.clone(),
            label: field.label.clone(),
            name: field.name.clone(),
            placeholder: field.placeholder.clone(),
            required: field.required,
            do_not_store: field.do_not_store,
            options: field.options.clone(),
            data_source: field.data_source.clone(),
            position: position as i64,
        });
    }

    Ok(inserted)
}

/// Wholesale replace: delete every field row of the form, insert fresh.
pub(crate) fn replace_fields(
    conn: &Connection,
    form_id: &FormId,
    fields: &[CleanField],
) -> Result<Vec<FormField>> {
    conn.execute(
        "DELETE FROM form_fields WHERE form_id = ?1",
        params![form_id.as_str()],
    )?;
    insert_fields(conn, form_id, fields)
}

pub(crate) fn get_form_row(conn: &Connection, id: &FormId) -> Result<Form> {
    conn.query_row(
        "SELECT id, title, category, created_by, created_at, updated_at,
                last_published_version_id, published_at
         FROM forms
         WHERE id = ?1",
        params![id.as_str()],
        row_to_form,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
        other => StoreError::Sqlite(other),
    })
}

// ---------------------------------------------------------------------------
// Row mappers
// ---------------------------------------------------------------------------

pub(crate) fn parse_timestamp(col: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(e))
        })
}

pub(crate) fn parse_form_id(col: usize, s: &str) -> rusqlite::Result<FormId> {
    FormId::parse(s).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            col,
            rusqlite::types::Type::Text,
            format!("malformed form id: {s}").into(),
        )
    })
}

/// Map a `rusqlite::Row` to a [`Form`].
fn row_to_form(row: &rusqlite::Row<'_>) -> rusqlite::Result<Form> {
    let id_str: String = row.get(0)?;
    let created_str: String = row.get(4)?;
    let updated_str: String = row.get(5)?;
    let published_version_str: Option<String> = row.get(6)?;
    let published_str: Option<String> = row.get(7)?;

    let last_published_version_id = published_version_str
        .map(|s| uuid::Uuid::parse_str(&s))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?;

    let published_at = published_str
        .as_deref()
        .map(|s| parse_timestamp(7, s))
        .transpose()?;

    Ok(Form {
        id: parse_form_id(0, &id_str)?,
        title: row.get(1)?,
        category: row.get(2)?,
        created_by: row.get(3)?,
        created_at: parse_timestamp(4, &created_str)?,
        updated_at: parse_timestamp(5, &updated_str)?,
        last_published_version_id,
        published_at,
    })
}

/// Map a `rusqlite::Row` to a [`FormField`].
pub(crate) fn row_to_field(row: &rusqlite::Row<'_>) -> rusqlite::Result<FormField> {
    let form_id_str: String = row.get(1)?;

    Ok(FormField {
        id: row.get(0)?,
        form_id: parse_form_id(1, &form_id_str)?,
        field_type: row.get(2)?,
        label: row.get(3)?,
        name: row.get(4)?,
        placeholder: row.get(5)?,
        required: row.get(6)?,
        do_not_store: row.get(7)?,
        options: row.get(8)?,
        data_source: row.get(9)?,
        position: row.get(10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{clean_field, open_db, option_field};

    #[test]
    fn create_returns_prefixed_id_and_fields() {
        let mut db = open_db();
        let fields = vec![clean_field("email", "Email", "email", true)];

        let (form, inserted) = db
            .create_form_with_fields("Newsletter", &fields, None, Some("alice"))
            .unwrap();

        let suffix = form.id.as_str().strip_prefix("form-").expect("prefix");
        assert_eq!(suffix.len(), 8);
        assert!(suffix.bytes().all(|b| b.is_ascii_alphanumeric()));
        assert_eq!(form.category, "survey");
        assert_eq!(inserted.len(), 1);
        assert_eq!(inserted[0].position, 0);
    }

    #[test]
    fn title_conflict_is_case_insensitive() {
        let mut db = open_db();
        let fields = vec![clean_field("email", "Email", "email", false)];

        db.create_form_with_fields("Contact", &fields, None, None)
            .unwrap();
        let err = db
            .create_form_with_fields("contact", &fields, None, None)
            .unwrap_err();
        assert!(matches!(err, StoreError::TitleTaken));

        // Pre-check agrees in both casings.
        assert!(db.is_form_title_taken("Contact", None).unwrap());
        assert!(db.is_form_title_taken("CONTACT", None).unwrap());
        assert!(!db.is_form_title_taken("Other", None).unwrap());
    }

    #[test]
    fn title_comparison_folds_unicode_compatibility_forms() {
        let mut db = open_db();
        let fields = vec![clean_field("email", "Email", "email", false)];

        // U+FF26 FULLWIDTH LATIN CAPITAL LETTER F etc.
        db.create_form_with_fields("Feedback", &fields, None, None)
            .unwrap();
        assert!(db
            .is_form_title_taken("\u{FF26}eedback", None)
            .unwrap());
    }

    #[test]
    fn exclude_self_on_update_path() {
        let mut db = open_db();
        let fields = vec![clean_field("email", "Email", "email", false)];
        let (form, _) = db
            .create_form_with_fields("Survey 1", &fields, None, None)
            .unwrap();

        assert!(!db.is_form_title_taken("Survey 1", Some(&form.id)).unwrap());

        // Renaming to its own title is not a conflict.
        let updated = db
            .update_form_with_fields(
                &form.id,
                Patch::Set("Survey 1".into()),
                None,
                Patch::Keep,
            )
            .unwrap()
            .expect("form exists");
        assert_eq!(updated.title, "Survey 1");
    }

    #[test]
    fn update_replaces_fields_wholesale() {
        let mut db = open_db();
        let first = vec![
            clean_field("singleLine", "A", "a", false),
            clean_field("singleLine", "B", "b", false),
            clean_field("singleLine", "C", "c", false),
        ];
        let (form, _) = db
            .create_form_with_fields("Atomic", &first, None, None)
            .unwrap();

        let second = vec![
            clean_field("email", "Email", "email", true),
            option_field("dropdown", "Pick", "pick", "x,y"),
        ];
        db.update_form_with_fields(&form.id, Patch::Keep, Some(&second), Patch::Keep)
            .unwrap()
            .expect("form exists");

        let live = db.get_form_fields(&form.id).unwrap();
        assert_eq!(live.len(), 2);
        assert_eq!(live[0].name, "email");
        assert_eq!(live[0].position, 0);
        assert_eq!(live[1].name, "pick");
        assert_eq!(live[1].position, 1);
        // Nothing of the prior set survives.
        assert!(live.iter().all(|f| !["a", "b", "c"].contains(&f.name.as_str())));
    }

    #[test]
    fn update_without_fields_leaves_rows_untouched() {
        let mut db = open_db();
        let fields = vec![
            clean_field("singleLine", "A", "a", false),
            clean_field("singleLine", "B", "b", false),
        ];
        let (form, inserted) = db
            .create_form_with_fields("Title Only", &fields, None, None)
            .unwrap();

        let updated = db
            .update_form_with_fields(
                &form.id,
                Patch::Set("Renamed".into()),
                None,
                Patch::Keep,
            )
            .unwrap()
            .expect("form exists");
        assert_eq!(updated.title, "Renamed");

        let live = db.get_form_fields(&form.id).unwrap();
        assert_eq!(live, inserted);
    }

    #[test]
    fn update_missing_form_returns_none() {
        let mut db = open_db();
        let ghost = FormId::parse("form-00000000").unwrap();
        let result = db
            .update_form_with_fields(&ghost, Patch::Set("X".into()), None, Patch::Keep)
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn category_patch_set_empty_resets_to_default() {
        let mut db = open_db();
        let fields = vec![clean_field("email", "Email", "email", false)];
        let (form, _) = db
            .create_form_with_fields("Quiz Night", &fields, Some("quiz"), None)
            .unwrap();
        assert_eq!(form.category, "quiz");

        let kept = db
            .update_form_with_fields(&form.id, Patch::Keep, None, Patch::Keep)
            .unwrap()
            .unwrap();
        assert_eq!(kept.category, "quiz");

        let cleared = db
            .update_form_with_fields(&form.id, Patch::Keep, None, Patch::Set(String::new()))
            .unwrap()
            .unwrap();
        assert_eq!(cleared.category, "survey");
    }

    #[test]
    fn duplicate_field_name_constraint_rolls_back_create() {
        let mut db = open_db();
        let fields = vec![
            clean_field("email", "Email", "email", false),
            clean_field("singleLine", "Again", "email", false),
        ];

        let err = db
            .create_form_with_fields("Backstop", &fields, None, None)
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateFieldName));

        // The form row did not survive the rollback.
        assert!(db.list_forms().unwrap().is_empty());
        assert!(!db.is_form_title_taken("Backstop", None).unwrap());
    }

    #[test]
    fn delete_cascades_to_fields() {
        let mut db = open_db();
        let fields = vec![clean_field("email", "Email", "email", false)];
        let (form, _) = db
            .create_form_with_fields("Doomed", &fields, None, None)
            .unwrap();

        assert!(db.delete_form(&form.id).unwrap());
        assert!(!db.delete_form(&form.id).unwrap());

        let orphans: i64 = db
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM form_fields WHERE form_id = ?1",
                params![form.id.as_str()],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(orphans, 0);
    }
}
