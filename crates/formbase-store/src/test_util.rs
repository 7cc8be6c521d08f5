//! Shared helpers for the store test modules.

use formbase_core::CleanField;

use crate::database::Database;

pub fn open_db() -> Database {
    Database::open_in_memory().expect("in-memory database")
}

pub fn clean_field(field_type: &str, label: &str, name: &str, required: bool) -> CleanField {
    CleanField {
        field_type: field_type.into(),
        label: label.into(),
        name: name.into(),
        placeholder: None,
        required,
        do_not_store: false,
        options: None,
        data_source: None,
    }
}

pub fn option_field(field_type: &str, label: &str, name: &str, options: &str) -> CleanField {
    CleanField {
        options: Some(options.into()),
        ..clean_field(field_type, label, name, false)
    }
}
