//! Draft lifecycle: author-scoped working copies, orthogonal to versions.
//!
//! Each author holds at most one draft per form, plus at most one draft
//! for a brand-new form (`form_id = NULL`).  Saves upsert that single row;
//! repeated autosaves never accumulate.  Publishing a new-form draft is a
//! one-way transition that creates the Form, its live fields and a
//! published version 1 in a single transaction, then removes the draft.

use chrono::{Duration, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use formbase_core::{CleanField, FormId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::forms::{
    allocate_form_id, form_exists, insert_fields, is_title_taken, normalize_unique, parse_form_id,
    parse_timestamp, resolve_category,
};
use crate::models::{Form, FormDraft, FormVersion};

/// Drafts older than this are eligible for cleanup.
pub const DEFAULT_DRAFT_MAX_AGE_DAYS: i64 = 30;

impl Database {
    // ------------------------------------------------------------------
    // Save (upsert)
    // ------------------------------------------------------------------

    /// Create or overwrite the author's draft for `form_id` (or their
    /// new-form draft when `form_id` is `None`), stamping `last_saved_at`.
    pub fn save_draft(
        &mut self,
        form_id: Option<&FormId>,
        created_by: &str,
        title: &str,
        category_id: Option<&str>,
        fields: &[CleanField],
        is_auto_save: bool,
    ) -> Result<FormDraft> {
        let now = Utc::now();
        let fields_data = serde_json::to_string(fields)?;
        let tx = self.conn_mut().transaction()?;

        if let Some(form_id) = form_id {
            if !form_exists(&tx, form_id)? {
                return Err(StoreError::NotFound);
            }
        }

        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM form_drafts
                 WHERE created_by = ?1 AND IFNULL(form_id, '') = IFNULL(?2, '')",
                params![created_by, form_id.map(FormId::as_str)],
                |row| row.get(0),
            )
            .optional()?;

        let id = match existing {
            Some(id_str) => {
                tx.execute(
                    "UPDATE form_drafts
                     SET title = ?1, category_id = ?2, fields_data = ?3,
                         last_saved_at = ?4, is_auto_save = ?5
                     WHERE id = ?6",
                    params![
                        title,
                        category_id,
                        fields_data,
                        now.to_rfc3339(),
                        is_auto_save,
                        id_str,
                    ],
                )?;
                Uuid::parse_str(&id_str)?
            }
            None => {
                let id = Uuid::new_v4();
                tx.execute(
                    "INSERT INTO form_drafts (id, form_id, created_by, title, category_id,
                                              fields_data, last_saved_at, is_auto_save)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        id.to_string(),
                        form_id.map(FormId::as_str),
                        created_by,
                        title,
                        category_id,
                        fields_data,
                        now.to_rfc3339(),
                        is_auto_save,
                    ],
                )?;
                id
            }
        };

        tx.commit()?;

        Ok(FormDraft {
            id,
            form_id: form_id.cloned(),
            created_by: created_by.to_string(),
            title: title.to_string(),
            category_id: category_id.map(str::to_string),
            fields: fields.to_vec(),
            last_saved_at: now,
            is_auto_save,
        })
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// The author's draft for a form (or their new-form draft), if any.
    pub fn get_draft(&self, form_id: Option<&FormId>, created_by: &str) -> Result<Option<FormDraft>> {
        let row = self
            .conn()
            .query_row(
                "SELECT id, form_id, created_by, title, category_id, fields_data,
                        last_saved_at, is_auto_save
                 FROM form_drafts
                 WHERE created_by = ?1 AND IFNULL(form_id, '') = IFNULL(?2, '')",
                params![created_by, form_id.map(FormId::as_str)],
                row_to_draft,
            )
            .optional()?;

        row.map(decode_draft).transpose()
    }

    // ------------------------------------------------------------------
    // Publish
    // ------------------------------------------------------------------

    /// Turn a new-form draft into a real form: the Form row, its live
    /// fields and a published version 1 are created atomically, then the
    /// draft is deleted.  Fails with [`StoreError::TitleTaken`] when the
    /// drafted title is no longer free.
    pub fn publish_draft_as_form(&mut self, draft_id: Uuid) -> Result<(Form, FormVersion)> {
        let now = Utc::now();
        let tx = self.conn_mut().transaction()?;

        let draft = decode_draft(
            tx.query_row(
                "SELECT id, form_id, created_by, title, category_id, fields_data,
                        last_saved_at, is_auto_save
                 FROM form_drafts
                 WHERE id = ?1",
                params![draft_id.to_string()],
                row_to_draft,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })?,
        )?;

        let title = draft.title.trim();
        if is_title_taken(&tx, title, None)? {
            return Err(StoreError::TitleTaken);
        }

        let form_id = allocate_form_id(&tx)?;
        let category = resolve_category(draft.category_id.as_deref()).to_string();

        tx.execute(
            "INSERT INTO forms (id, title, title_norm, category, created_by,
                                created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                form_id.as_str(),
                title,
                normalize_unique(title),
                category,
                draft.created_by,
                now.to_rfc3339(),
            ],
        )
        .map_err(StoreError::from_constraint)?;

        insert_fields(&tx, &form_id, &draft.fields)?;

        let version_id = Uuid::new_v4();
        tx.execute(
            "INSERT INTO form_versions (id, form_id, version_number, title, category_id,
                                        fields_data, change_description, created_by,
                                        created_at, is_published, published_at)
             VALUES (?1, ?2, 1, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?8)",
            params![
                version_id.to_string(),
                form_id.as_str(),
                title,
                draft.category_id,
                serde_json::to_string(&draft.fields)?,
                "Initial version",
                draft.created_by,
                now.to_rfc3339(),
            ],
        )?;

        tx.execute(
            "UPDATE forms SET last_published_version_id = ?1, published_at = ?2
             WHERE id = ?3",
            params![version_id.to_string(), now.to_rfc3339(), form_id.as_str()],
        )?;

        tx.execute(
            "DELETE FROM form_drafts WHERE id = ?1",
            params![draft_id.to_string()],
        )?;

        tx.commit()?;

        let form = Form {
            id: form_id.clone(),
            title: title.to_string(),
            category,
            created_by: Some(draft.created_by.clone()),
            created_at: now,
            updated_at: now,
            last_published_version_id: Some(version_id),
            published_at: Some(now),
        };
        let version = FormVersion {
            id: version_id,
            form_id,
            version_number: 1,
            title: title.to_string(),
            category_id: draft.category_id.clone(),
            fields: draft.fields.clone(),
            change_description: Some("Initial version".to_string()),
            created_by: Some(draft.created_by),
            created_at: now,
            is_published: true,
            published_at: Some(now),
        };
        Ok((form, version))
    }

    // ------------------------------------------------------------------
    // Cleanup
    // ------------------------------------------------------------------

    /// Delete every draft whose `last_saved_at` precedes the cutoff.
    /// Idempotent and safe to retry; intended for periodic scheduling.
    /// Returns the number of drafts reaped.
    pub fn cleanup_old_drafts(&self, days_old: i64) -> Result<usize> {
        let cutoff = Utc::now() - Duration::days(days_old);
        let affected = self.conn().execute(
            "DELETE FROM form_drafts WHERE last_saved_at < ?1",
            params![cutoff.to_rfc3339()],
        )?;
        if affected > 0 {
            tracing::info!(count = affected, days_old, "reaped stale drafts");
        }
        Ok(affected)
    }
}

// ---------------------------------------------------------------------------
// Row mappers
// ---------------------------------------------------------------------------

struct DraftRow {
    draft: FormDraft,
    fields_data: String,
}

fn decode_draft(row: DraftRow) -> Result<FormDraft> {
    let mut draft = row.draft;
    draft.fields = serde_json::from_str(&row.fields_data)?;
    Ok(draft)
}

fn row_to_draft(row: &rusqlite::Row<'_>) -> rusqlite::Result<DraftRow> {
    let id_str: String = row.get(0)?;
    let form_id_str: Option<String> = row.get(1)?;
    let saved_str: String = row.get(6)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let form_id = form_id_str
        .as_deref()
        .map(|s| parse_form_id(1, s))
        .transpose()?;

    Ok(DraftRow {
        draft: FormDraft {
            id,
            form_id,
            created_by: row.get(2)?,
            title: row.get(3)?,
            category_id: row.get(4)?,
            fields: Vec::new(),
            last_saved_at: parse_timestamp(6, &saved_str)?,
            is_auto_save: row.get(7)?,
        },
        fields_data: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{clean_field, open_db};

    #[test]
    fn repeated_saves_upsert_a_single_row() {
        let mut db = open_db();
        let fields = vec![clean_field("email", "Email", "email", true)];

        let first = db
            .save_draft(None, "alice", "WIP", None, &fields, true)
            .unwrap();
        let second = db
            .save_draft(None, "alice", "WIP v2", None, &fields, false)
            .unwrap();

        assert_eq!(first.id, second.id);
        assert!(!second.is_auto_save);

        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM form_drafts", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);

        let loaded = db.get_draft(None, "alice").unwrap().unwrap();
        assert_eq!(loaded.title, "WIP v2");
    }

    #[test]
    fn drafts_are_scoped_per_author_and_form() {
        let mut db = open_db();
        let fields = vec![clean_field("email", "Email", "email", true)];
        let (form, _) = db
            .create_form_with_fields("Scoped", &fields, None, None)
            .unwrap();

        db.save_draft(None, "alice", "Alice new", None, &fields, true)
            .unwrap();
        db.save_draft(Some(&form.id), "alice", "Alice edit", None, &fields, true)
            .unwrap();
        db.save_draft(None, "bob", "Bob new", None, &fields, true)
            .unwrap();

        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM form_drafts", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 3);

        assert_eq!(
            db.get_draft(Some(&form.id), "alice").unwrap().unwrap().title,
            "Alice edit"
        );
        assert_eq!(db.get_draft(None, "bob").unwrap().unwrap().title, "Bob new");
        assert!(db.get_draft(Some(&form.id), "bob").unwrap().is_none());
    }

    #[test]
    fn publish_draft_creates_form_version_and_removes_draft() {
        let mut db = open_db();
        let fields = vec![
            clean_field("email", "Email", "email", true),
            clean_field("singleLine", "Name", "full_name", false),
        ];

        let draft = db
            .save_draft(None, "alice", "Launch Survey", Some("survey"), &fields, false)
            .unwrap();

        let (form, version) = db.publish_draft_as_form(draft.id).unwrap();

        assert_eq!(form.title, "Launch Survey");
        assert_eq!(version.version_number, 1);
        assert!(version.is_published);
        assert_eq!(form.last_published_version_id, Some(version.id));

        assert_eq!(db.get_form_fields(&form.id).unwrap().len(), 2);
        assert!(db.get_draft(None, "alice").unwrap().is_none());

        // Publishing twice fails: the draft is gone.
        let err = db.publish_draft_as_form(draft.id).unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[test]
    fn publish_draft_respects_title_uniqueness() {
        let mut db = open_db();
        let fields = vec![clean_field("email", "Email", "email", true)];
        db.create_form_with_fields("Taken", &fields, None, None)
            .unwrap();

        let draft = db
            .save_draft(None, "alice", "taken", None, &fields, false)
            .unwrap();
        let err = db.publish_draft_as_form(draft.id).unwrap_err();
        assert!(matches!(err, StoreError::TitleTaken));

        // Draft survives the failed publish.
        assert!(db.get_draft(None, "alice").unwrap().is_some());
    }

    #[test]
    fn cleanup_reaps_only_stale_drafts() {
        let mut db = open_db();
        let fields = vec![clean_field("email", "Email", "email", true)];

        db.save_draft(None, "alice", "Fresh", None, &fields, true)
            .unwrap();
        db.save_draft(None, "bob", "Stale", None, &fields, true)
            .unwrap();

        // Age bob's draft past the cutoff.
        let old = (Utc::now() - Duration::days(45)).to_rfc3339();
        db.conn()
            .execute(
                "UPDATE form_drafts SET last_saved_at = ?1 WHERE created_by = 'bob'",
                params![old],
            )
            .unwrap();

        assert_eq!(db.cleanup_old_drafts(DEFAULT_DRAFT_MAX_AGE_DAYS).unwrap(), 1);
        assert!(db.get_draft(None, "bob").unwrap().is_none());
        assert!(db.get_draft(None, "alice").unwrap().is_some());

        // Idempotent.
        assert_eq!(db.cleanup_old_drafts(DEFAULT_DRAFT_MAX_AGE_DAYS).unwrap(), 0);
    }
}
