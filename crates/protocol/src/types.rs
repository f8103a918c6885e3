use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Metadata sent alongside every upload, direct or chunked.
///
/// The engine treats all of it as opaque: association keys (for example
/// `ticket_id`) are chosen by the caller and forwarded verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadMetadata {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub associations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub is_public: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_temporary: bool,
}

impl Default for UploadMetadata {
    fn default() -> Self {
        Self {
            associations: BTreeMap::new(),
            category: None,
            description: None,
            is_public: true,
            tags: Vec::new(),
            is_temporary: false,
        }
    }
}

impl UploadMetadata {
    /// Adds an association id (builder style).
    pub fn associate(mut self, key: impl Into<String>, id: impl Into<String>) -> Self {
        self.associations.insert(key.into(), id.into());
        self
    }

    /// Flattens the metadata into multipart text fields.
    ///
    /// Associations become one field each, tags are comma-joined and
    /// booleans are rendered as `"true"`/`"false"`. Absent values are omitted.
    pub fn form_fields(&self) -> Vec<(String, String)> {
        let mut fields: Vec<(String, String)> = self
            .associations
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        if let Some(category) = &self.category {
            fields.push(("category".into(), category.clone()));
        }
        if let Some(description) = &self.description {
            fields.push(("description".into(), description.clone()));
        }
        fields.push(("is_public".into(), self.is_public.to_string()));
        if !self.tags.is_empty() {
            fields.push(("tags".into(), self.tags.join(",")));
        }
        fields.push(("is_temporary".into(), self.is_temporary.to_string()));
        fields
    }
}

fn default_true() -> bool {
    true
}

fn is_false(v: &bool) -> bool {
    !v
}

/// Record of a stored artifact, returned by direct upload and session completion.
///
/// Field aliases accept the attachment naming used by the storage backend
/// (`attachment_id`, `file_size`, `mime_type`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRecord {
    #[serde(alias = "attachment_id", with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, alias = "file_size")]
    pub size: u64,
    #[serde(default, alias = "mime_type")]
    pub content_type: String,
    #[serde(default)]
    pub is_image: bool,
    #[serde(default)]
    pub is_document: bool,
}

impl TransferRecord {
    /// Remote reference to the stored artifact: the URL when the server
    /// returned one, otherwise the record id.
    pub fn locator(&self) -> &str {
        self.url.as_deref().unwrap_or(&self.id)
    }
}

/// Accepts ids serialized either as JSON strings or JSON integers.
mod string_or_number {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Int(i64),
        Uint(u64),
    }

    pub fn serialize<S: Serializer>(id: &str, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(id)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        Ok(match Id::deserialize(deserializer)? {
            Id::Text(s) => s,
            Id::Int(n) => n.to_string(),
            Id::Uint(n) => n.to_string(),
        })
    }
}
