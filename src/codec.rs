//! Field-level codec.
//!
//! Encrypts and decrypts only the declared sensitive fields of a record.
//! Values are walked as a tree: string leaves are sealed individually,
//! arrays and objects are descended into, object keys are never
//! encrypted, and numbers, booleans and null are left alone even when a
//! field naming them is declared sensitive.

use serde_json::{Map, Value};
use tracing::debug;

use crate::crypto;
use crate::error::CryptoError;
use crate::keys::DataKey;

/// Classification of a single string leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafState {
    /// Empty string: nothing to protect.
    Empty,
    /// Envelope-shaped and opens under the DEK.
    Encrypted,
    /// Anything else, including short values and envelope-shaped strings
    /// that do not open under this DEK.
    Plaintext,
}

/// Classify a string leaf. Cheap length check first, trial decryption
/// only for values that could be envelopes.
pub fn classify_leaf(value: &str, dek: &DataKey) -> LeafState {
    if value.is_empty() {
        return LeafState::Empty;
    }
    if !crypto::looks_like_envelope(value) {
        return LeafState::Plaintext;
    }
    match crypto::decrypt_bytes(value, dek) {
        Ok(_) => LeafState::Encrypted,
        Err(_) => LeafState::Plaintext,
    }
}

/// Seal every non-empty string leaf of `value`.
pub fn encrypt_value(value: &mut Value, dek: &DataKey) -> Result<(), CryptoError> {
    match value {
        Value::String(s) if !s.is_empty() => {
            *s = crypto::encrypt_str(s, dek)?;
        }
        Value::Array(items) => {
            for item in items {
                encrypt_value(item, dek)?;
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                encrypt_value(item, dek)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Open every string leaf of `value` that decrypts under `dek`.
///
/// Leaves that are not envelopes, or do not open, are left as they are:
/// partially migrated accounts still carry plaintext.
pub fn decrypt_value(value: &mut Value, dek: &DataKey) {
    match value {
        Value::String(s) => {
            if !crypto::looks_like_envelope(s) {
                return;
            }
            match crypto::decrypt_str(s, dek) {
                Ok(plain) => *s = plain,
                Err(e) => debug!(error = %e, "leaving undecryptable value as stored"),
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|item| decrypt_value(item, dek)),
        Value::Object(map) => map.values_mut().for_each(|item| decrypt_value(item, dek)),
        _ => {}
    }
}

/// Seal only the leaves classified as plaintext. Returns how many leaves
/// were sealed. Leaves already sealed under `dek` are not touched.
pub fn seal_plaintext_leaves(value: &mut Value, dek: &DataKey) -> Result<usize, CryptoError> {
    match value {
        Value::String(s) => match classify_leaf(s, dek) {
            LeafState::Plaintext => {
                *s = crypto::encrypt_str(s, dek)?;
                Ok(1)
            }
            LeafState::Empty | LeafState::Encrypted => Ok(0),
        },
        Value::Array(items) => {
            let mut sealed = 0;
            for item in items {
                sealed += seal_plaintext_leaves(item, dek)?;
            }
            Ok(sealed)
        }
        Value::Object(map) => {
            let mut sealed = 0;
            for item in map.values_mut() {
                sealed += seal_plaintext_leaves(item, dek)?;
            }
            Ok(sealed)
        }
        _ => Ok(0),
    }
}

/// Count plaintext leaves without modifying anything.
pub fn count_plaintext_leaves(value: &Value, dek: &DataKey) -> usize {
    match value {
        Value::String(s) => usize::from(classify_leaf(s, dek) == LeafState::Plaintext),
        Value::Array(items) => items.iter().map(|v| count_plaintext_leaves(v, dek)).sum(),
        Value::Object(map) => map.values().map(|v| count_plaintext_leaves(v, dek)).sum(),
        _ => 0,
    }
}

/// Encrypt the named fields of a record in place. Missing fields are
/// skipped.
pub fn encrypt_fields(
    record: &mut Map<String, Value>,
    fields: &[&str],
    dek: &DataKey,
) -> Result<(), CryptoError> {
    for field in fields {
        if let Some(value) = record.get_mut(*field) {
            encrypt_value(value, dek)?;
        }
    }
    Ok(())
}

/// Decrypt the named fields of a record in place.
///
/// Without a key the record passes through unchanged so callers can render
/// it rather than fail.
pub fn decrypt_fields(record: &mut Map<String, Value>, fields: &[&str], dek: Option<&DataKey>) {
    let Some(dek) = dek else {
        return;
    };
    for field in fields {
        if let Some(value) = record.get_mut(*field) {
            decrypt_value(value, dek);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_only_declared_fields_are_encrypted() {
        let dek = crypto::generate_key().unwrap();
        let mut note = object(json!({"title": "Hello", "text": "world", "pinned": true, "color": "red"}));
        encrypt_fields(&mut note, &["title", "text"], &dek).unwrap();

        assert_ne!(note["title"], "Hello");
        assert_ne!(note["text"], "world");
        assert_eq!(note["color"], "red");
        assert_eq!(note["pinned"], true);
    }

    #[test]
    fn test_structured_fields_encrypt_leaves_not_keys() {
        let dek = crypto::generate_key().unwrap();
        let mut template = object(json!({
            "placeholders": [{"tag": "name", "defaultValue": "Ada"}, {"tag": "n", "defaultValue": 3}]
        }));
        encrypt_fields(&mut template, &["placeholders"], &dek).unwrap();

        let first = &template["placeholders"][0];
        assert!(first.get("tag").is_some());
        assert!(crypto::looks_like_envelope(first["tag"].as_str().unwrap()));
        assert!(crypto::looks_like_envelope(first["defaultValue"].as_str().unwrap()));
        assert_eq!(template["placeholders"][1]["defaultValue"], 3);

        decrypt_fields(&mut template, &["placeholders"], Some(&dek));
        assert_eq!(template["placeholders"][0]["tag"], "name");
        assert_eq!(template["placeholders"][0]["defaultValue"], "Ada");
    }

    #[test]
    fn test_non_string_primitives_are_never_encrypted() {
        let dek = crypto::generate_key().unwrap();
        let mut record = object(json!({"salary": 120000, "remote": false, "notes": null}));
        let before = record.clone();
        encrypt_fields(&mut record, &["salary", "remote", "notes"], &dek).unwrap();
        assert_eq!(record, before);
    }

    #[test]
    fn test_empty_and_missing_fields_are_tolerated() {
        let dek = crypto::generate_key().unwrap();
        let mut record = object(json!({"title": ""}));
        encrypt_fields(&mut record, &["title", "text"], &dek).unwrap();
        assert_eq!(record["title"], "");
        assert!(record.get("text").is_none());
    }

    #[test]
    fn test_decrypt_without_key_passes_through() {
        let dek = crypto::generate_key().unwrap();
        let mut record = object(json!({"title": "secret"}));
        encrypt_fields(&mut record, &["title"], &dek).unwrap();
        let sealed = record.clone();
        decrypt_fields(&mut record, &["title"], None);
        assert_eq!(record, sealed);
    }

    #[test]
    fn test_decrypt_leaves_legacy_plaintext_alone() {
        let dek = crypto::generate_key().unwrap();
        let mut record = object(json!({"title": "legacy plaintext title", "text": "Hi"}));
        let before = record.clone();
        decrypt_fields(&mut record, &["title", "text"], Some(&dek));
        assert_eq!(record, before);
    }

    #[test]
    fn test_classify_leaf() {
        let dek = crypto::generate_key().unwrap();
        let other = crypto::generate_key().unwrap();
        let sealed = crypto::encrypt_str("Hello", &dek).unwrap();

        assert_eq!(classify_leaf("", &dek), LeafState::Empty);
        assert_eq!(classify_leaf("Hello", &dek), LeafState::Plaintext);
        assert_eq!(classify_leaf(&sealed, &dek), LeafState::Encrypted);
        assert_eq!(classify_leaf(&sealed, &other), LeafState::Plaintext);
    }

    #[test]
    fn test_seal_plaintext_leaves_skips_sealed_ones() {
        let dek = crypto::generate_key().unwrap();
        let sealed = crypto::encrypt_str("done", &dek).unwrap();
        let mut value = json!([{"tag": sealed.clone(), "defaultValue": "todo"}]);

        assert_eq!(count_plaintext_leaves(&value, &dek), 1);
        assert_eq!(seal_plaintext_leaves(&mut value, &dek).unwrap(), 1);
        assert_eq!(value[0]["tag"], Value::String(sealed));
        assert_eq!(count_plaintext_leaves(&value, &dek), 0);
    }
}
