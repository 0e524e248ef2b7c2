//! Encryptable entity kinds and their sensitive fields.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::Record;
use crate::codec;
use crate::error::{Result, VaultError};
use crate::keys::DataKey;

/// Every record collection that carries user content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Note,
    Bookmark,
    TextTemplate,
    JobApplication,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Note,
        EntityKind::Bookmark,
        EntityKind::TextTemplate,
        EntityKind::JobApplication,
    ];

    /// REST collection name.
    pub fn collection(&self) -> &'static str {
        match self {
            Self::Note => "notes",
            Self::Bookmark => "bookmarks",
            Self::TextTemplate => "text-templates",
            Self::JobApplication => "job-applications",
        }
    }

    /// Wire names of the fields that must never reach the server in
    /// plaintext.
    pub fn sensitive_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Note => &["title", "text"],
            Self::Bookmark => &["label", "note", "logoUrl", "url"],
            // placeholders[].tag is included: tags are user-chosen identifiers.
            Self::TextTemplate => &["title", "text", "placeholders"],
            Self::JobApplication => &[
                "companyName",
                "jobTitle",
                "jobUrl",
                "location",
                "salary",
                "contactName",
                "contactEmail",
                "notes",
            ],
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection())
    }
}

/// A typed entity that goes through the field codec.
pub trait Encryptable: Serialize + DeserializeOwned {
    const KIND: EntityKind;
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Encryptable for Note {
    const KIND: EntityKind = EntityKind::Note;
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    pub id: String,
    pub label: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Encryptable for Bookmark {
    const KIND: EntityKind = EntityKind::Bookmark;
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Placeholder {
    pub tag: String,
    #[serde(default)]
    pub default_value: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextTemplate {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub placeholders: Vec<Placeholder>,
}

impl Encryptable for TextTemplate {
    const KIND: EntityKind = EntityKind::TextTemplate;
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobApplication {
    pub id: String,
    pub company_name: String,
    pub job_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Pipeline stage ("applied", "interview", ...). Not sensitive.
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<DateTime<Utc>>,
}

impl Encryptable for JobApplication {
    const KIND: EntityKind = EntityKind::JobApplication;
}

fn to_object<T: Serialize>(entity: &T) -> Result<serde_json::Map<String, Value>> {
    match serde_json::to_value(entity)? {
        Value::Object(map) => Ok(map),
        other => Err(VaultError::Config(format!(
            "entity must serialize to an object, got {other}"
        ))),
    }
}

/// Encrypt the sensitive fields of a typed entity.
pub fn encrypt_entity<T: Encryptable>(entity: &T, dek: &DataKey) -> Result<T> {
    let mut map = to_object(entity)?;
    codec::encrypt_fields(&mut map, T::KIND.sensitive_fields(), dek)?;
    Ok(serde_json::from_value(Value::Object(map))?)
}

/// Decrypt the sensitive fields of a typed entity. Without a key the
/// entity is returned as stored.
pub fn decrypt_entity<T: Encryptable>(entity: &T, dek: Option<&DataKey>) -> Result<T> {
    let mut map = to_object(entity)?;
    codec::decrypt_fields(&mut map, T::KIND.sensitive_fields(), dek);
    Ok(serde_json::from_value(Value::Object(map))?)
}

/// Encrypt the sensitive fields of a raw record in place.
pub fn encrypt_record(kind: EntityKind, record: &mut Record, dek: &DataKey) -> Result<()> {
    codec::encrypt_fields(&mut record.fields, kind.sensitive_fields(), dek)?;
    Ok(())
}

/// Decrypt the sensitive fields of a raw record in place.
pub fn decrypt_record(kind: EntityKind, record: &mut Record, dek: Option<&DataKey>) {
    codec::decrypt_fields(&mut record.fields, kind.sensitive_fields(), dek);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto;

    #[test]
    fn test_collections_are_distinct() {
        let mut names: Vec<_> = EntityKind::ALL.iter().map(|k| k.collection()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), EntityKind::ALL.len());
    }

    #[test]
    fn test_note_roundtrip_keeps_id_and_flags() {
        let dek = crypto::generate_key().unwrap();
        let note = Note {
            id: "n1".into(),
            title: "Hello".into(),
            text: "body".into(),
            pinned: true,
            updated_at: Some(Utc::now()),
        };

        let sealed = encrypt_entity(&note, &dek).unwrap();
        assert_eq!(sealed.id, "n1");
        assert!(sealed.pinned);
        assert!(crypto::looks_like_envelope(&sealed.title));

        assert_eq!(decrypt_entity(&sealed, Some(&dek)).unwrap(), note);
    }

    #[test]
    fn test_bookmark_tags_stay_plaintext() {
        let dek = crypto::generate_key().unwrap();
        let bookmark = Bookmark {
            id: "b1".into(),
            label: "Rust".into(),
            url: "https://www.rust-lang.org".into(),
            tags: vec!["lang".into()],
            ..Bookmark::default()
        };
        let sealed = encrypt_entity(&bookmark, &dek).unwrap();
        assert_eq!(sealed.tags, vec!["lang".to_string()]);
        assert!(sealed.note.is_none());
        assert_ne!(sealed.url, bookmark.url);
    }

    #[test]
    fn test_decrypt_entity_without_key_is_identity() {
        let dek = crypto::generate_key().unwrap();
        let template = TextTemplate {
            id: "t1".into(),
            title: "Greeting".into(),
            text: "Hi {name}".into(),
            placeholders: vec![Placeholder {
                tag: "name".into(),
                default_value: "friend".into(),
            }],
        };
        let sealed = encrypt_entity(&template, &dek).unwrap();
        assert_eq!(decrypt_entity(&sealed, None).unwrap(), sealed);
    }
}
