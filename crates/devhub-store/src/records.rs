//! Record schemas for the three collections and their boundary validation.
//!
//! Records travel over the wire as camelCase JSON. The `id` field is never
//! written into a stored document body; repositories fill it from the
//! document address on read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{document::Direction, error::ValidationError};

/// Schema binding between a record type and its collection.
pub trait Record: Serialize + serde::de::DeserializeOwned + Send + Sync + 'static {
    const COLLECTION: &'static str;
    /// Field and direction used by `list` and all filters.
    const ORDER_BY: (&'static str, Direction);

    fn id(&self) -> Option<&str>;
    fn set_id(&mut self, id: String);

    /// Runs before the first write of a new record.
    fn prepare_create(&mut self, _now: DateTime<Utc>) {}

    /// Runs before every full-replace write.
    fn prepare_update(&mut self, _now: DateTime<Utc>) {}

    fn validate(&self) -> Result<(), ValidationError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioLink {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub order: Option<i64>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl Record for PortfolioLink {
    const COLLECTION: &'static str = "portfolio";
    const ORDER_BY: (&'static str, Direction) = ("order", Direction::Ascending);

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_text("title", &self.title)?;
        require_text("url", &self.url)?;
        if self.order.is_none() {
            return Err(ValidationError::MissingField("order"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CodeSnippet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub language: String,
    #[serde(default, deserialize_with = "wire::null_as_empty")]
    pub tags: Vec<String>,
    #[serde(default, with = "wire::timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, with = "wire::timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub blob_locator: Option<String>,
    #[serde(default, deserialize_with = "wire::null_as_false")]
    pub is_public: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
}

impl Record for CodeSnippet {
    const COLLECTION: &'static str = "snippets";
    const ORDER_BY: (&'static str, Direction) = ("createdAt", Direction::Descending);

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn prepare_create(&mut self, now: DateTime<Utc>) {
        self.created_at = Some(now);
        self.updated_at = Some(now);
    }

    // createdAt is whatever the caller sent; the stored value is not merged back.
    fn prepare_update(&mut self, now: DateTime<Utc>) {
        self.updated_at = Some(now);
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_text("title", &self.title)?;
        require_text("code", &self.code)?;
        require_text("language", &self.language)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LearningNote {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, deserialize_with = "wire::null_as_empty")]
    pub tags: Vec<String>,
    #[serde(default, with = "wire::timestamp")]
    pub date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "wire::null_as_empty")]
    pub resources: Vec<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub difficulty_level: Option<i64>,
}

pub const MIN_DIFFICULTY: i64 = 1;
pub const MAX_DIFFICULTY: i64 = 5;

impl Record for LearningNote {
    const COLLECTION: &'static str = "learningNotes";
    const ORDER_BY: (&'static str, Direction) = ("date", Direction::Descending);

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_text("title", &self.title)?;
        require_text("content", &self.content)?;
        if let Some(level) = self.difficulty_level {
            if !(MIN_DIFFICULTY..=MAX_DIFFICULTY).contains(&level) {
                return Err(ValidationError::OutOfRange {
                    field: "difficultyLevel",
                    min: MIN_DIFFICULTY,
                    max: MAX_DIFFICULTY,
                    value: level,
                });
            }
        }
        Ok(())
    }
}

fn require_text(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::MissingField(field))
    } else {
        Ok(())
    }
}

/// Serde helpers for record fields.
mod wire {
    use serde::{Deserialize, Deserializer};

    /// Timestamps are written with fixed microsecond precision so that the
    /// document store's lexical ordering matches chronological ordering.
    pub mod timestamp {
        use chrono::{DateTime, SecondsFormat, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match value {
                Some(ts) => {
                    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Micros, true))
                }
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
        where
            D: Deserializer<'de>,
        {
            Option::<DateTime<Utc>>::deserialize(deserializer)
        }
    }

    pub fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
    }

    pub fn null_as_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn missing_collections_default_to_empty() {
        let snippet: CodeSnippet = serde_json::from_value(json!({
            "title": "Fib",
            "code": "def fib(n): ...",
            "language": "python",
            "tags": null
        }))
        .unwrap();
        assert!(snippet.tags.is_empty());
        assert!(!snippet.is_public);

        let note: LearningNote = serde_json::from_value(json!({
            "title": "GKE",
            "content": "autopilot"
        }))
        .unwrap();
        assert!(note.tags.is_empty());
        assert!(note.resources.is_empty());

        let encoded = serde_json::to_value(&note).unwrap();
        assert_eq!(encoded["tags"], json!([]));
        assert_eq!(encoded["resources"], json!([]));
    }

    #[test]
    fn snippet_uses_camel_case_wire_names() {
        let snippet = CodeSnippet {
            title: "t".into(),
            code: "c".into(),
            language: "rust".into(),
            is_public: true,
            blob_locator: Some("blob://b/k".into()),
            created_at: Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
            ..CodeSnippet::default()
        };

        let encoded = serde_json::to_value(&snippet).unwrap();
        assert_eq!(encoded["isPublic"], true);
        assert_eq!(encoded["blobLocator"], "blob://b/k");
        assert_eq!(encoded["createdAt"], "2024-05-01T12:00:00.000000Z");
        assert!(encoded.get("id").is_none());
    }

    #[test]
    fn timestamps_roundtrip_with_fixed_precision() {
        let note = LearningNote {
            title: "t".into(),
            content: "c".into(),
            date: Some(Utc.with_ymd_and_hms(2023, 1, 2, 3, 4, 5).unwrap()),
            ..LearningNote::default()
        };
        let encoded = serde_json::to_string(&note).unwrap();
        let decoded: LearningNote = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, note);
    }

    #[test]
    fn validation_rejects_blank_required_fields() {
        let link = PortfolioLink {
            title: "  ".into(),
            url: "https://github.com".into(),
            order: Some(1),
            ..PortfolioLink::default()
        };
        assert_eq!(link.validate(), Err(ValidationError::MissingField("title")));

        let link = PortfolioLink {
            title: "GitHub".into(),
            url: "https://github.com".into(),
            ..PortfolioLink::default()
        };
        assert_eq!(link.validate(), Err(ValidationError::MissingField("order")));

        let snippet = CodeSnippet {
            title: "t".into(),
            code: "c".into(),
            ..CodeSnippet::default()
        };
        assert_eq!(
            snippet.validate(),
            Err(ValidationError::MissingField("language"))
        );
    }

    #[test]
    fn difficulty_level_must_be_in_range() {
        let mut note = LearningNote {
            title: "t".into(),
            content: "c".into(),
            difficulty_level: Some(6),
            ..LearningNote::default()
        };
        assert!(matches!(
            note.validate(),
            Err(ValidationError::OutOfRange { value: 6, .. })
        ));

        note.difficulty_level = Some(5);
        assert!(note.validate().is_ok());
        note.difficulty_level = None;
        assert!(note.validate().is_ok());
    }

    #[test]
    fn snippet_hooks_stamp_timestamps() {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();

        let mut snippet = CodeSnippet::default();
        snippet.prepare_create(created);
        assert_eq!(snippet.created_at, Some(created));
        assert_eq!(snippet.updated_at, Some(created));

        snippet.prepare_update(later);
        assert_eq!(snippet.created_at, Some(created));
        assert_eq!(snippet.updated_at, Some(later));
    }
}
