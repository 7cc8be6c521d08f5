//! CRUD operations for [`Category`] lookup records.
//!
//! Categories are referenced by templates (by id) and by forms (by name,
//! through the enum-like `category` column).  Deleting a category that is
//! still referenced either way is refused.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use formbase_core::CategoryId;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::forms::parse_timestamp;
use crate::models::{Category, Patch};

const ID_RETRIES: u32 = 5;

/// Default color assigned when none is supplied.
pub const DEFAULT_CATEGORY_COLOR: &str = "#808080";

fn valid_color(color: &str) -> bool {
    color.len() == 7
        && color.starts_with('#')
        && color[1..].bytes().all(|b| b.is_ascii_hexdigit())
}

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    pub fn create_category(
        &mut self,
        name: &str,
        description: Option<&str>,
        color: Option<&str>,
    ) -> Result<Category> {
        let name = name.trim();
        let color = color.unwrap_or(DEFAULT_CATEGORY_COLOR);
        if !valid_color(color) {
            return Err(StoreError::InvalidColor(color.to_string()));
        }

        let now = Utc::now();
        let tx = self.conn_mut().transaction()?;

        let id = {
            let mut allocated = None;
            for _ in 0..ID_RETRIES {
                let candidate = CategoryId::generate();
                let exists: Option<i64> = tx
                    .query_row(
                        "SELECT 1 FROM categories WHERE id = ?1",
                        params![candidate.as_str()],
                        |row| row.get(0),
                    )
                    .optional()?;
                if exists.is_none() {
                    allocated = Some(candidate);
                    break;
                }
                tracing::warn!(id = %candidate, "category id collision, retrying");
            }
            allocated.ok_or(StoreError::IdExhausted(ID_RETRIES))?
        };

        tx.execute(
            "INSERT INTO categories (id, name, description, color, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id.as_str(), name, description, color, now.to_rfc3339()],
        )
        .map_err(StoreError::from_constraint)?;

        tx.commit()?;

        Ok(Category {
            id,
            name: name.to_string(),
            description: description.map(str::to_string),
            color: color.to_string(),
            created_at: now,
        })
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_category(&self, id: &CategoryId) -> Result<Category> {
        self.conn()
            .query_row(
                "SELECT id, name, description, color, created_at
                 FROM categories
                 WHERE id = ?1",
                params![id.as_str()],
                row_to_category,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// List all categories, alphabetically.
    pub fn list_categories(&self) -> Result<Vec<Category>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, name, description, color, created_at
             FROM categories
             ORDER BY name COLLATE NOCASE ASC",
        )?;

        let rows = stmt.query_map([], row_to_category)?;

        let mut categories = Vec::new();
        for row in rows {
            categories.push(row?);
        }
        Ok(categories)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Patch a category.  Returns `Ok(None)` when it does not exist.
    pub fn update_category(
        &mut self,
        id: &CategoryId,
        name: Patch<String>,
        description: Patch<Option<String>>,
        color: Patch<String>,
    ) -> Result<Option<Category>> {
        let tx = self.conn_mut().transaction()?;

        let exists: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM categories WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Ok(None);
        }

        if let Patch::Set(new_name) = &name {
            tx.execute(
                "UPDATE categories SET name = ?1 WHERE id = ?2",
                params![new_name.trim(), id.as_str()],
            )
            .map_err(StoreError::from_constraint)?;
        }

        if let Patch::Set(new_description) = &description {
            tx.execute(
                "UPDATE categories SET description = ?1 WHERE id = ?2",
                params![new_description, id.as_str()],
            )?;
        }

        if let Patch::Set(new_color) = &color {
            if !valid_color(new_color) {
                return Err(StoreError::InvalidColor(new_color.clone()));
            }
            tx.execute(
                "UPDATE categories SET color = ?1 WHERE id = ?2",
                params![new_color, id.as_str()],
            )?;
        }

        let category = tx.query_row(
            "SELECT id, name, description, color, created_at
             FROM categories WHERE id = ?1",
            params![id.as_str()],
            row_to_category,
        )?;
        tx.commit()?;

        Ok(Some(category))
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a category.  Refused while any form carries its name or any
    /// template references its id.  Returns `true` if a row was deleted.
    pub fn delete_category(&self, id: &CategoryId) -> Result<bool> {
        let category = match self.get_category(id) {
            Ok(c) => c,
            Err(StoreError::NotFound) => return Ok(false),
            Err(e) => return Err(e),
        };

        let referencing: i64 = self.conn().query_row(
            "SELECT
                (SELECT COUNT(*) FROM forms WHERE category = ?1 COLLATE NOCASE)
              + (SELECT COUNT(*) FROM templates WHERE category_id = ?2)",
            params![category.name, id.as_str()],
            |row| row.get(0),
        )?;
        if referencing > 0 {
            return Err(StoreError::CategoryInUse);
        }

        let affected = self.conn().execute(
            "DELETE FROM categories WHERE id = ?1",
            params![id.as_str()],
        )?;
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Category`].
fn row_to_category(row: &rusqlite::Row<'_>) -> rusqlite::Result<Category> {
    let id_str: String = row.get(0)?;
    let created_str: String = row.get(4)?;

    let id = CategoryId::parse(&id_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("malformed category id: {id_str}").into(),
        )
    })?;

    Ok(Category {
        id,
        name: row.get(1)?,
        description: row.get(2)?,
        color: row.get(3)?,
        created_at: parse_timestamp(4, &created_str)?,
    })
}
