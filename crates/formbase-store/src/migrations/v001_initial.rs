//! v001 -- Initial schema creation.
//!
//! Creates the seven core tables: `categories`, `forms`, `form_fields`,
//! `form_versions`, `form_drafts`, `templates` and `submissions`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Categories (lookup table referenced by forms and templates)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS categories (
    id          TEXT PRIMARY KEY NOT NULL,    -- category-XXXXXXXX
    name        TEXT NOT NULL UNIQUE COLLATE NOCASE,
    description TEXT,
    color       TEXT NOT NULL DEFAULT '#808080',  -- #RRGGBB
    created_at  TEXT NOT NULL                 -- ISO-8601 / RFC-3339
);

-- ----------------------------------------------------------------
-- Forms
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS forms (
    id                        TEXT PRIMARY KEY NOT NULL,  -- form-XXXXXXXX
    title                     TEXT NOT NULL,
    title_norm                TEXT NOT NULL UNIQUE,       -- NFKC + trim + lowercase
    category                  TEXT NOT NULL DEFAULT 'survey',
    created_by                TEXT,                       -- nullable when auth disabled
    created_at                TEXT NOT NULL,
    updated_at                TEXT NOT NULL,
    last_published_version_id TEXT,                       -- denormalized, FK -> form_versions(id)
    published_at              TEXT
);

-- ----------------------------------------------------------------
-- Form fields (wholesale-replaced on every update)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS form_fields (
    id           TEXT PRIMARY KEY NOT NULL,   -- 16-char random token
    form_id      TEXT NOT NULL,               -- FK -> forms(id)
    type         TEXT NOT NULL,
    label        TEXT NOT NULL,
    name         TEXT NOT NULL,
    placeholder  TEXT,
    required     INTEGER NOT NULL DEFAULT 0,  -- boolean 0/1
    do_not_store INTEGER NOT NULL DEFAULT 0,  -- boolean 0/1
    options      TEXT,                        -- canonical comma-joined tokens
    data_source  TEXT,
    position     INTEGER NOT NULL,            -- zero-based, contiguous per form

    FOREIGN KEY (form_id) REFERENCES forms(id) ON DELETE CASCADE,
    UNIQUE (form_id, name)
);

CREATE INDEX IF NOT EXISTS idx_form_fields_form_pos
    ON form_fields(form_id, position);

-- ----------------------------------------------------------------
-- Form versions (immutable snapshots)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS form_versions (
    id                 TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    form_id            TEXT NOT NULL,              -- FK -> forms(id)
    version_number     INTEGER NOT NULL,           -- starts at 1, never reused
    title              TEXT NOT NULL,
    category_id        TEXT,
    fields_data        TEXT NOT NULL,              -- JSON array of fields
    change_description TEXT,
    created_by         TEXT,
    created_at         TEXT NOT NULL,
    is_published       INTEGER NOT NULL DEFAULT 0, -- boolean 0/1
    published_at       TEXT,

    FOREIGN KEY (form_id) REFERENCES forms(id) ON DELETE CASCADE,
    UNIQUE (form_id, version_number)
);

CREATE INDEX IF NOT EXISTS idx_form_versions_form
    ON form_versions(form_id, version_number DESC);

-- ----------------------------------------------------------------
-- Form drafts (one mutable working copy per author per form)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS form_drafts (
    id           TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    form_id      TEXT,                        -- nullable FK -> forms(id); NULL = unsaved new form
    created_by   TEXT NOT NULL,
    title        TEXT NOT NULL,
    category_id  TEXT,
    fields_data  TEXT NOT NULL,               -- JSON array of fields
    last_saved_at TEXT NOT NULL,
    is_auto_save INTEGER NOT NULL DEFAULT 0,  -- boolean 0/1

    FOREIGN KEY (form_id) REFERENCES forms(id) ON DELETE CASCADE
);

-- SQLite treats NULLs as distinct in plain UNIQUE constraints, so the
-- one-draft-per-author-per-form rule needs an expression index.
CREATE UNIQUE INDEX IF NOT EXISTS idx_form_drafts_author_form
    ON form_drafts(created_by, IFNULL(form_id, ''));

-- ----------------------------------------------------------------
-- Templates (reusable field sets, independent of forms)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS templates (
    id          TEXT PRIMARY KEY NOT NULL,    -- template-XXXXXXXX
    name        TEXT NOT NULL,
    name_norm   TEXT NOT NULL UNIQUE,         -- NFKC + trim + lowercase
    description TEXT,
    category_id TEXT,                         -- FK -> categories(id)
    fields_data TEXT NOT NULL,                -- JSON array of fields
    created_by  TEXT,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,

    FOREIGN KEY (category_id) REFERENCES categories(id)
);

-- ----------------------------------------------------------------
-- Submissions (redacted copies of public form submissions)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS submissions (
    id           TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    form_id      TEXT NOT NULL,               -- FK -> forms(id)
    data         TEXT NOT NULL,               -- JSON object, doNotStore fields omitted
    submitted_at TEXT NOT NULL,

    FOREIGN KEY (form_id) REFERENCES forms(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_submissions_form
    ON submissions(form_id, submitted_at DESC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
