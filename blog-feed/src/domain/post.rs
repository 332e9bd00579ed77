use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::DomainError;
use super::serde_helpers::null_as_default;
use super::slug::{is_valid_slug, slugify_or_fallback};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(default)]
    pub excerpt: Option<String>,
    pub author_id: Uuid,
    #[serde(default, deserialize_with = "null_as_default")]
    pub published: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Post {
    /// Анониму виден только опубликованный публичный пост.
    pub fn is_publicly_visible(&self) -> bool {
        self.published && self.is_public
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.author_id == user_id
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostInput {
    pub title: String,
    pub slug: Option<String>,
    pub content: String,
    pub excerpt: Option<String>,
    pub published: bool,
    pub is_public: bool,
    pub category_ids: Vec<Uuid>,
    pub tag_ids: Vec<Uuid>,
}

impl PostInput {
    pub fn validate(self) -> Result<Self, DomainError> {
        let title = normalize_title(&self.title)?;
        let content = self.content.trim_end().to_string();
        if self.published && content.trim().is_empty() {
            return Err(DomainError::Validation {
                field: "content",
                message: "must not be empty for a published post",
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
                Some(slug.to_string())
            }
            _ => None,
        };

        Ok(Self {
            title,
            slug,
            content,
            excerpt: normalize_excerpt(self.excerpt.as_deref())?,
            published: self.published,
            is_public: self.is_public,
            category_ids: dedup_ids(self.category_ids),
            tag_ids: dedup_ids(self.tag_ids),
        })
    }

    pub fn slug_or_derived(&self) -> String {
        self.slug
            .clone()
            .unwrap_or_else(|| slugify_or_fallback(&self.title, "post"))
    }
}

pub(crate) fn normalize_title(title: &str) -> Result<String, DomainError> {
    let title = title.trim();
    if title.is_empty() || title.chars().count() > 255 {
        return Err(DomainError::Validation {
            field: "title",
            message: "must be 1..255 chars",
        });
    }
    Ok(title.to_string())
}

fn normalize_excerpt(excerpt: Option<&str>) -> Result<Option<String>, DomainError> {
    let Some(excerpt) = excerpt.map(str::trim).filter(|e| !e.is_empty()) else {
        return Ok(None);
    };
    if excerpt.chars().count() > 500 {
        return Err(DomainError::Validation {
            field: "excerpt",
            message: "must be at most 500 chars",
        });
    }
    Ok(Some(excerpt.to_string()))
}

fn dedup_ids(ids: Vec<Uuid>) -> Vec<Uuid> {
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}
