use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use super::error::DomainError;
use super::slug::{is_valid_slug, slugify_or_fallback};

pub const DEFAULT_TAG_COLOR: &str = "#3b82f6";

const TAG_PALETTE: [&str; 8] = [
    "#3b82f6", "#8b5cf6", "#ec4899", "#f59e0b", "#10b981", "#06b6d4", "#6366f1", "#f43f5e",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_tag_color", deserialize_with = "null_as_default_color")]
    pub color: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

fn default_tag_color() -> String {
    DEFAULT_TAG_COLOR.to_string()
}

fn null_as_default_color<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(default_tag_color))
}

#[derive(Debug, Clone, Default)]
pub struct TaxonomyInput {
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
}

impl TaxonomyInput {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn validate(self, slug_prefix: &str) -> Result<ValidTaxonomy, DomainError> {
        let name = self.name.trim();
        if name.is_empty() || name.chars().count() > 64 {
            return Err(DomainError::Validation {
                field: "name",
                message: "must be 1..64 chars",
            });
        }

        let slug = match self.slug.as_deref().map(str::trim) {
            Some(slug) if !slug.is_empty() => {
                if !is_valid_slug(slug) {
                    return Err(DomainError::Validation {
                        field: "slug",
                        message: "must be lowercase letters, digits and single dashes",
                    });
                }
                slug.to_string()
            }
            _ => slugify_or_fallback(name, slug_prefix),
        };

        let description = self
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string);

        Ok(ValidTaxonomy {
            name: name.to_string(),
            slug,
            description,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidTaxonomy {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
}

pub fn tag_color_for(slug: &str) -> &'static str {
    let hash = slug
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)));
    TAG_PALETTE[hash as usize % TAG_PALETTE.len()]
}
