//! Typed entity identifiers and their random generators.
//!
//! User-facing entities carry short prefixed ids (`form-XXXXXXXX`) drawn
//! from a 62-symbol alphabet with a cryptographically strong source.  The
//! prefix makes an id self-describing and the validating constructors stop
//! a template id from ever being passed where a form id is expected.
//!
//! Collision checking against the persistent store (with retries) lives in
//! `formbase-store`; this module only produces and validates candidates.

use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// 62-symbol alphabet for id suffixes.
const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Length of the random suffix on prefixed entity ids.
pub const SUFFIX_LEN: usize = 8;

/// Length of the denser, unprefixed tokens used for field rows.
pub const FIELD_ID_LEN: usize = 16;

/// Draw `len` symbols from the id alphabet using the OS random source.
fn random_token(len: usize) -> String {
    let mut rng = OsRng;
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Random id for a field row.  Fields are never user-facing, so there is
/// no prefix; the extra length keeps per-form collisions out of reach.
pub fn random_field_id() -> String {
    random_token(FIELD_ID_LEN)
}

fn valid_suffix(s: &str) -> bool {
    s.len() == SUFFIX_LEN && s.bytes().all(|b| b.is_ascii_alphanumeric())
}

macro_rules! prefixed_id {
    ($name:ident, $prefix:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            /// Generate a fresh random candidate id.
            pub fn generate() -> Self {
                Self(format!("{}-{}", $prefix, random_token(SUFFIX_LEN)))
            }

            /// Validate an id string received from a client or the store.
            pub fn parse(s: &str) -> Option<Self> {
                let suffix = s.strip_prefix(concat!($prefix, "-"))?;
                if valid_suffix(suffix) {
                    Some(Self(s.to_string()))
                } else {
                    None
                }
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

prefixed_id!(FormId, "form", "Identifier of a form: `form-XXXXXXXX`.");
prefixed_id!(
    TemplateId,
    "template",
    "Identifier of a reusable field-set template: `template-XXXXXXXX`."
);
prefixed_id!(
    CategoryId,
    "category",
    "Identifier of a lookup category: `category-XXXXXXXX`."
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_form_ids_match_the_documented_shape() {
        for _ in 0..50 {
            let id = FormId::generate();
            let suffix = id.as_str().strip_prefix("form-").expect("prefix");
            assert_eq!(suffix.len(), 8);
            assert!(suffix.bytes().all(|b| b.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn parse_rejects_wrong_prefix_and_bad_suffix() {
        let template = TemplateId::generate();
        assert!(FormId::parse(template.as_str()).is_none());
        assert!(FormId::parse("form-short").is_none());
        assert!(FormId::parse("form-has spaces").is_none());
        assert!(FormId::parse("form-AbCd1234").is_some());
    }

    #[test]
    fn field_ids_are_dense_unprefixed_tokens() {
        let id = random_field_id();
        assert_eq!(id.len(), FIELD_ID_LEN);
        assert!(id.bytes().all(|b| b.is_ascii_alphanumeric()));
    }

    #[test]
    fn serde_round_trips_as_a_plain_string() {
        let id = FormId::parse("form-AbCd1234").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"form-AbCd1234\"");
        let back: FormId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
