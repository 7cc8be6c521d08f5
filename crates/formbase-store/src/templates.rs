//! Reusable field-set templates.
//!
//! Structurally parallel to form persistence but simpler: a template's
//! fields live as one JSON array on the row, there is no second entity to
//! keep transactionally consistent and no versioning.  Updates are partial
//! patches; a supplied field array replaces the stored one outright.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use formbase_core::{CategoryId, CleanField, TemplateId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::forms::{normalize_unique, parse_timestamp};
use crate::models::{Patch, Template};

const ID_RETRIES: u32 = 5;

impl Database {
    // ------------------------------------------------------------------
    // Uniqueness
    // ------------------------------------------------------------------

    /// Case-insensitive check whether a template name is already in use.
    pub fn is_template_name_taken(
        &self,
        name: &str,
        exclude: Option<&TemplateId>,
    ) -> Result<bool> {
        is_name_taken(self.conn(), name, exclude)
    }

    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    pub fn create_template(
        &mut self,
        name: &str,
        description: Option<&str>,
        fields: &[CleanField],
        category_id: Option<&CategoryId>,
        created_by: Option<&str>,
    ) -> Result<Template> {
        let name = name.trim();
        let now = Utc::now();
        let tx = self.conn_mut().transaction()?;

        if is_name_taken(&tx, name, None)? {
            return Err(StoreError::TemplateNameTaken);
        }
        if let Some(category_id) = category_id {
            ensure_category_exists(&tx, category_id)?;
        }

        let id = allocate_template_id(&tx)?;

        tx.execute(
            "INSERT INTO templates (id, name, name_norm, description, category_id,
                                    fields_data, created_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                id.as_str(),
                name,
                normalize_unique(name),
                description,
                category_id.map(CategoryId::as_str),
                serde_json::to_string(fields)?,
                created_by,
                now.to_rfc3339(),
            ],
        )
        .map_err(StoreError::from_constraint)?;

        tx.commit()?;

        Ok(Template {
            id,
            name: name.to_string(),
            description: description.map(str::to_string),
            category_id: category_id.cloned(),
            fields: fields.to_vec(),
            created_by: created_by.map(str::to_string),
            created_at: now,
            updated_at: now,
        })
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Patch a template.  Only `Patch::Set` values are written; a set
    /// field array replaces the stored one wholesale.  Returns `Ok(None)`
    /// when the template does not exist.
    pub fn update_template(
        &mut self,
        id: &TemplateId,
        name: Patch<String>,
        description: Patch<Option<String>>,
        fields: Patch<Vec<CleanField>>,
        category_id: Patch<Option<CategoryId>>,
    ) -> Result<Option<Template>> {
        let now = Utc::now();
        let tx = self.conn_mut().transaction()?;

        let exists: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM templates WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Ok(None);
        }

        if let Patch::Set(new_name) = &name {
            let new_name = new_name.trim();
            if is_name_taken(&tx, new_name, Some(id))? {
                return Err(StoreError::TemplateNameTaken);
            }
            tx.execute(
                "UPDATE templates SET name = ?1, name_norm = ?2 WHERE id = ?3",
                params![new_name, normalize_unique(new_name), id.as_str()],
            )
            .map_err(StoreError::from_constraint)?;
        }

        if let Patch::Set(new_description) = &description {
            tx.execute(
                "UPDATE templates SET description = ?1 WHERE id = ?2",
                params![new_description, id.as_str()],
            )?;
        }

        if let Patch::Set(new_fields) = &fields {
            tx.execute(
                "UPDATE templates SET fields_data = ?1 WHERE id = ?2",
                params![serde_json::to_string(new_fields)?, id.as_str()],
            )?;
        }

        if let Patch::Set(new_category) = &category_id {
            if let Some(category) = new_category {
                ensure_category_exists(&tx, category)?;
            }
            tx.execute(
                "UPDATE templates SET category_id = ?1 WHERE id = ?2",
                params![new_category.as_ref().map(CategoryId::as_str), id.as_str()],
            )?;
        }

        tx.execute(
            "UPDATE templates SET updated_at = ?1 WHERE id = ?2",
            params![now.to_rfc3339(), id.as_str()],
        )?;

        let template = get_template_row(&tx, id)?;
        tx.commit()?;

        Ok(Some(template))
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_template(&self, id: &TemplateId) -> Result<Template> {
        get_template_row(self.conn(), id)
    }

    /// List all templates, alphabetically.
    pub fn list_templates(&self) -> Result<Vec<Template>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, name, description, category_id, fields_data, created_by,
                    created_at, updated_at
             FROM templates
             ORDER BY name COLLATE NOCASE ASC",
        )?;

        let rows = stmt.query_map([], row_to_template)?;

        let mut templates = Vec::new();
        for row in rows {
            templates.push(decode_template(row?)?);
        }
        Ok(templates)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a template.  Returns `true` if a row was deleted.
    pub fn delete_template(&self, id: &TemplateId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM templates WHERE id = ?1",
            params![id.as_str()],
        )?;
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn is_name_taken(conn: &Connection, name: &str, exclude: Option<&TemplateId>) -> Result<bool> {
    let norm = normalize_unique(name);
    let found: Option<i64> = match exclude {
        Some(id) => conn
            .query_row(
                "SELECT 1 FROM templates WHERE name_norm = ?1 AND id != ?2",
                params![norm, id.as_str()],
                |row| row.get(0),
            )
            .optional()?,
        None => conn
            .query_row(
                "SELECT 1 FROM templates WHERE name_norm = ?1",
                params![norm],
                |row| row.get(0),
            )
            .optional()?,
    };
    Ok(found.is_some())
}

fn allocate_template_id(conn: &Connection) -> Result<TemplateId> {
    for _ in 0..ID_RETRIES {
        let candidate = TemplateId::generate();
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM templates WHERE id = ?1",
                params![candidate.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Ok(candidate);
        }
        tracing::warn!(id = %candidate, "template id collision, retrying");
    }
    tracing::error!("exhausted template id generation retries");
    Err(StoreError::IdExhausted(ID_RETRIES))
}

pub(crate) fn ensure_category_exists(conn: &Connection, id: &CategoryId) -> Result<()> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM categories WHERE id = ?1",
            params![id.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    if found.is_some() {
        Ok(())
    } else {
        Err(StoreError::NotFound)
    }
}

fn get_template_row(conn: &Connection, id: &TemplateId) -> Result<Template> {
    let row = conn
        .query_row(
            "SELECT id, name, description, category_id, fields_data, created_by,
                    created_at, updated_at
             FROM templates
             WHERE id = ?1",
            params![id.as_str()],
            row_to_template,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
            other => StoreError::Sqlite(other),
        })?;

    decode_template(row)
}

struct TemplateRow {
    template: Template,
    fields_data: String,
}

fn decode_template(row: TemplateRow) -> Result<Template> {
    let mut template = row.template;
    template.fields = serde_json::from_str(&row.fields_data)?;
    Ok(template)
}

fn row_to_template(row: &rusqlite::Row<'_>) -> rusqlite::Result<TemplateRow> {
    let id_str: String = row.get(0)?;
    let category_str: Option<String> = row.get(3)?;
    let created_str: String = row.get(6)?;
    let updated_str: String = row.get(7)?;

    let id = TemplateId::parse(&id_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("malformed template id: {id_str}").into(),
        )
    })?;

    let category_id = category_str
        .as_deref()
        .map(|s| {
            CategoryId::parse(s).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    3,
                    rusqlite::types::Type::Text,
                    format!("malformed category id: {s}").into(),
                )
            })
        })
        .transpose()?;

    Ok(TemplateRow {
        template: Template {
            id,
            name: row.get(1)?,
            description: row.get(2)?,
            category_id,
            fields: Vec::new(),
            created_by: row.get(5)?,
            created_at: parse_timestamp(6, &created_str)?,
            updated_at: parse_timestamp(7, &updated_str)?,
        },
        fields_data: row.get(4)?,
    })
}
