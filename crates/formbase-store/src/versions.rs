//! Form versioning: immutable numbered snapshots, publish and rollback.
//!
//! Versions are append-only.  `version_number` is derived as
//! `max(version_number) + 1` inside the creating transaction rather than
//! read from a cached counter, so an out-of-band deletion can never make
//! the sequence drift.  Publishing is the only path that moves a snapshot
//! back into the live `form_fields` rows, and at most one version per
//! form is published at any time.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use formbase_core::{CleanField, FormId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::forms::{form_exists, parse_form_id, parse_timestamp, replace_fields};
use crate::models::FormVersion;

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Snapshot a form's title/category/fields as the next numbered
    /// version.  Live field rows are not touched.
    pub fn create_version(
        &mut self,
        form_id: &FormId,
        title: &str,
        fields: &[CleanField],
        category_id: Option<&str>,
        created_by: Option<&str>,
        change_description: Option<&str>,
    ) -> Result<FormVersion> {
        let now = Utc::now();
        let tx = self.conn_mut().transaction()?;

        if !form_exists(&tx, form_id)? {
            return Err(StoreError::NotFound);
        }

        let version_number: i64 = tx.query_row(
            "SELECT COALESCE(MAX(version_number), 0) + 1
             FROM form_versions
             WHERE form_id = ?1",
            params![form_id.as_str()],
            |row| row.get(0),
        )?;

        let id = Uuid::new_v4();
        let fields_data = serde_json::to_string(fields)?;

        tx.execute(
            "INSERT INTO form_versions (id, form_id, version_number, title, category_id,
                                        fields_data, change_description, created_by,
                                        created_at, is_published)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0)",
            params![
                id.to_string(),
                form_id.as_str(),
                version_number,
                title,
                category_id,
                fields_data,
                change_description,
                created_by,
                now.to_rfc3339(),
            ],
        )?;

        tx.commit()?;

        Ok(FormVersion {
            id,
            form_id: form_id.clone(),
            version_number,
            title: title.to_string(),
            category_id: category_id.map(str::to_string),
            fields: fields.to_vec(),
            change_description: change_description.map(str::to_string),
            created_by: created_by.map(str::to_string),
            created_at: now,
            is_published: false,
            published_at: None,
        })
    }

    // ------------------------------------------------------------------
    // Publish
    // ------------------------------------------------------------------

    /// Publish one version of a form, atomically:
    /// any currently published sibling is unpublished, the target is
    /// stamped, the form's denormalized pointer is updated and the live
    /// field rows are wholesale-replaced from the snapshot.
    pub fn publish_version(&mut self, form_id: &FormId, version_id: Uuid) -> Result<FormVersion> {
        let now = Utc::now();
        let tx = self.conn_mut().transaction()?;

        let mut version = get_version_row(&tx, version_id)?;
        if &version.form_id != form_id {
            return Err(StoreError::NotFound);
        }

        tx.execute(
            "UPDATE form_versions SET is_published = 0, published_at = NULL
             WHERE form_id = ?1 AND is_published = 1",
            params![form_id.as_str()],
        )?;

        tx.execute(
            "UPDATE form_versions SET is_published = 1, published_at = ?1
             WHERE id = ?2",
            params![now.to_rfc3339(), version_id.to_string()],
        )?;

        tx.execute(
            "UPDATE forms SET last_published_version_id = ?1, published_at = ?2, updated_at = ?2
             WHERE id = ?3",
            params![version_id.to_string(), now.to_rfc3339(), form_id.as_str()],
        )?;

        replace_fields(&tx, form_id, &version.fields)?;

        tx.commit()?;

        version.is_published = true;
        version.published_at = Some(now);
        Ok(version)
    }

    // ------------------------------------------------------------------
    // Rollback
    // ------------------------------------------------------------------

    /// Roll a form back to an old version by re-publishing its content as
    /// a brand-new version.  History is never mutated in place, so the
    /// audit trail stays linear.
    pub fn rollback_to_version(
        &mut self,
        form_id: &FormId,
        version_id: Uuid,
        created_by: Option<&str>,
    ) -> Result<FormVersion> {
        let old = self.get_version(version_id)?;
        if &old.form_id != form_id {
            return Err(StoreError::NotFound);
        }

        let description = format!("Rollback to version {}", old.version_number);
        let new_version = self.create_version(
            form_id,
            &old.title,
            &old.fields,
            old.category_id.as_deref(),
            created_by,
            Some(&description),
        )?;

        self.publish_version(form_id, new_version.id)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single version by id.
    pub fn get_version(&self, version_id: Uuid) -> Result<FormVersion> {
        get_version_row(self.conn(), version_id)
    }

    /// All versions of a form, newest first.
    pub fn list_versions(&self, form_id: &FormId) -> Result<Vec<FormVersion>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, form_id, version_number, title, category_id, fields_data,
                    change_description, created_by, created_at, is_published, published_at
             FROM form_versions
             WHERE form_id = ?1
             ORDER BY version_number DESC",
        )?;

        let rows = stmt.query_map(params![form_id.as_str()], row_to_version)?;

        let mut versions = Vec::new();
        for row in rows {
            versions.push(decode_fields(row?)?);
        }
        Ok(versions)
    }

    /// The currently published version of a form, if any.
    pub fn get_published_version(&self, form_id: &FormId) -> Result<Option<FormVersion>> {
        let row = self
            .conn()
            .query_row(
                "SELECT id, form_id, version_number, title, category_id, fields_data,
                        change_description, created_by, created_at, is_published, published_at
                 FROM form_versions
                 WHERE form_id = ?1 AND is_published = 1",
                params![form_id.as_str()],
                row_to_version,
            )
            .optional()?;

        row.map(decode_fields).transpose()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Intermediate row with the snapshot still as JSON text.
struct VersionRow {
    version: FormVersion,
    fields_data: String,
}

fn get_version_row(conn: &Connection, version_id: Uuid) -> Result<FormVersion> {
    let row = conn
        .query_row(
            "SELECT id, form_id, version_number, title, category_id, fields_data,
                    change_description, created_by, created_at, is_published, published_at
             FROM form_versions
             WHERE id = ?1",
            params![version_id.to_string()],
            row_to_version,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
            other => StoreError::Sqlite(other),
        })?;

    decode_fields(row)
}

fn decode_fields(row: VersionRow) -> Result<FormVersion> {
    let mut version = row.version;
    version.fields = serde_json::from_str(&row.fields_data)?;
    Ok(version)
}

/// Map a `rusqlite::Row` to a [`VersionRow`]; the JSON snapshot is decoded
/// separately so a serde error is not squeezed through rusqlite's error type.
fn row_to_version(row: &rusqlite::Row<'_>) -> rusqlite::Result<VersionRow> {
    let id_str: String = row.get(0)?;
    let form_id_str: String = row.get(1)?;
    let created_str: String = row.get(8)?;
    let published_str: Option<String> = row.get(10)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let published_at = published_str
        .as_deref()
        .map(|s| parse_timestamp(10, s))
        .transpose()?;

    Ok(VersionRow {
        version: FormVersion {
            id,
            form_id: parse_form_id(1, &form_id_str)?,
            version_number: row.get(2)?,
            title: row.get(3)?,
            category_id: row.get(4)?,
            fields: Vec::new(),
            change_description: row.get(6)?,
            created_by: row.get(7)?,
            created_at: parse_timestamp(8, &created_str)?,
            is_published: row.get(9)?,
            published_at,
        },
        fields_data: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{clean_field, open_db};

    fn seed_form(db: &mut Database) -> FormId {
        let fields = vec![clean_field("email", "Email", "email", true)];
        let (form, _) = db
            .create_form_with_fields("Versioned", &fields, None, Some("alice"))
            .unwrap();
        form.id
    }

    #[test]
    fn version_numbers_start_at_one_and_are_gapless() {
        let mut db = open_db();
        let form_id = seed_form(&mut db);
        let fields = vec![clean_field("email", "Email", "email", true)];

        for expected in 1..=4 {
            let v = db
                .create_version(&form_id, "Versioned", &fields, None, None, None)
                .unwrap();
            assert_eq!(v.version_number, expected);
        }

        let numbers: Vec<i64> = db
            .list_versions(&form_id)
            .unwrap()
            .iter()
            .map(|v| v.version_number)
            .collect();
        assert_eq!(numbers, vec![4, 3, 2, 1]);
    }

    #[test]
    fn at_most_one_published_version() {
        let mut db = open_db();
        let form_id = seed_form(&mut db);

        let v1_fields = vec![clean_field("email", "Email", "email", true)];
        let v2_fields = vec![
            clean_field("email", "Email", "email", true),
            clean_field("singleLine", "Nickname", "nickname", false),
        ];

        let v1 = db
            .create_version(&form_id, "Versioned", &v1_fields, None, None, None)
            .unwrap();
        let v2 = db
            .create_version(&form_id, "Versioned", &v2_fields, None, None, None)
            .unwrap();

        db.publish_version(&form_id, v1.id).unwrap();
        db.publish_version(&form_id, v2.id).unwrap();

        let published = db.get_published_version(&form_id).unwrap().unwrap();
        assert_eq!(published.id, v2.id);

        let versions = db.list_versions(&form_id).unwrap();
        assert_eq!(
            versions.iter().filter(|v| v.is_published).count(),
            1
        );
        let old = versions.iter().find(|v| v.id == v1.id).unwrap();
        assert!(!old.is_published);
        assert!(old.published_at.is_none());
    }

    #[test]
    fn publish_replaces_live_fields_from_snapshot() {
        let mut db = open_db();
        let form_id = seed_form(&mut db);

        let snapshot = vec![
            clean_field("singleLine", "Snapshot A", "snap_a", false),
            clean_field("singleLine", "Snapshot B", "snap_b", false),
        ];
        let v = db
            .create_version(&form_id, "Versioned", &snapshot, None, None, None)
            .unwrap();

        // Creating the version alone leaves live fields untouched.
        assert_eq!(db.get_form_fields(&form_id).unwrap().len(), 1);

        db.publish_version(&form_id, v.id).unwrap();

        let live = db.get_form_fields(&form_id).unwrap();
        assert_eq!(live.len(), 2);
        assert_eq!(live[0].name, "snap_a");
        assert_eq!(live[1].name, "snap_b");

        let form = db.get_form(&form_id).unwrap();
        assert_eq!(form.last_published_version_id, Some(v.id));
        assert!(form.published_at.is_some());
    }

    #[test]
    fn rollback_appends_instead_of_rewriting_history() {
        let mut db = open_db();
        let form_id = seed_form(&mut db);

        let v1_fields = vec![clean_field("email", "Email", "email", true)];
        let v2_fields = vec![clean_field("phone", "Phone", "phone", true)];

        let v1 = db
            .create_version(&form_id, "Versioned", &v1_fields, None, None, None)
            .unwrap();
        let v2 = db
            .create_version(&form_id, "Versioned", &v2_fields, None, None, None)
            .unwrap();
        db.publish_version(&form_id, v2.id).unwrap();

        let restored = db
            .rollback_to_version(&form_id, v1.id, Some("alice"))
            .unwrap();

        assert_eq!(restored.version_number, 3);
        assert_eq!(
            restored.change_description.as_deref(),
            Some("Rollback to version 1")
        );
        assert!(restored.is_published);
        assert_eq!(restored.fields, v1_fields);

        // v1 and v2 are untouched; the published pointer moved to v3.
        let published = db.get_published_version(&form_id).unwrap().unwrap();
        assert_eq!(published.id, restored.id);
        assert_eq!(db.list_versions(&form_id).unwrap().len(), 3);

        let live = db.get_form_fields(&form_id).unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].name, "email");
    }

    #[test]
    fn publish_with_mismatched_form_is_not_found() {
        let mut db = open_db();
        let form_a = seed_form(&mut db);
        let fields = vec![clean_field("email", "Email2", "email", true)];
        let (form_b, _) = db
            .create_form_with_fields("Other Form", &fields, None, None)
            .unwrap();

        let v = db
            .create_version(&form_a, "Versioned", &fields, None, None, None)
            .unwrap();

        let err = db.publish_version(&form_b.id, v.id).unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[test]
    fn create_version_on_missing_form_fails() {
        let mut db = open_db();
        let ghost = FormId::parse("form-zzzzzzzz").unwrap();
        let err = db
            .create_version(&ghost, "T", &[], None, None, None)
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }
}
