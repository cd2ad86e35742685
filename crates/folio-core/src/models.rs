//! Collection and document models.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tree::{DocumentTree, TreeNode};
use crate::Error;

// =============================================================================
// COLLECTION TYPES
// =============================================================================

/// Kind of collection. Only atlas collections carry a document structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CollectionType {
    #[default]
    Atlas,
    Journal,
}

impl CollectionType {
    /// Whether collections of this type maintain a document structure.
    pub fn has_structure(&self) -> bool {
        matches!(self, CollectionType::Atlas)
    }
}

impl fmt::Display for CollectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectionType::Atlas => write!(f, "atlas"),
            CollectionType::Journal => write!(f, "journal"),
        }
    }
}

impl FromStr for CollectionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "atlas" => Ok(CollectionType::Atlas),
            "journal" => Ok(CollectionType::Journal),
            other => Err(Error::InvalidInput(format!(
                "unknown collection type: {}",
                other
            ))),
        }
    }
}

/// A collection of documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub id: Uuid,
    pub url_id: String,
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub private: bool,
    #[serde(rename = "type")]
    pub collection_type: CollectionType,
    pub team_id: Uuid,
    pub creator_id: Uuid,
    /// Ordered document tree; `None` for journal collections.
    pub document_structure: Option<DocumentTree>,
    pub created_at_utc: DateTime<Utc>,
    pub updated_at_utc: DateTime<Utc>,
}

impl Collection {
    /// Relative URL of the collection page.
    pub fn url(&self) -> String {
        format!("/collections/{}", self.id)
    }
}

/// Request for creating a new collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCollection {
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    #[serde(default)]
    pub private: bool,
    #[serde(rename = "type", default)]
    pub collection_type: CollectionType,
    pub team_id: Uuid,
    pub creator_id: Uuid,
    /// Explicit URL slug; generated when absent.
    pub url_id: Option<String>,
}

impl NewCollection {
    /// A public atlas collection with no description or color.
    pub fn new(name: impl Into<String>, team_id: Uuid, creator_id: Uuid) -> Self {
        Self {
            name: name.into(),
            description: None,
            color: None,
            private: false,
            collection_type: CollectionType::default(),
            team_id,
            creator_id,
            url_id: None,
        }
    }
}

// =============================================================================
// DOCUMENT TYPES
// =============================================================================

/// Lightweight projection of a document record.
///
/// This is the shape a document contributes to its collection's structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: Uuid,
    pub title: String,
    pub url: String,
    pub collection_id: Uuid,
    pub parent_document_id: Option<Uuid>,
}

impl DocumentSummary {
    /// Relative URL for a document slug.
    pub fn url_for(title: &str, url_id: &str) -> String {
        let slug: String = title
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect::<String>()
            .split('-')
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("-");
        if slug.is_empty() {
            format!("/doc/{}", url_id)
        } else {
            format!("/doc/{}-{}", slug, url_id)
        }
    }
}

impl From<&DocumentSummary> for TreeNode {
    fn from(doc: &DocumentSummary) -> Self {
        TreeNode::new(doc.id, doc.title.clone(), doc.url.clone())
    }
}

/// Request for creating a new document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDocument {
    pub collection_id: Uuid,
    pub parent_document_id: Option<Uuid>,
    pub team_id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub publish: bool,
}
