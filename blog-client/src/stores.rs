use std::collections::HashMap;

use async_trait::async_trait;
use blog_feed::DomainError;
use blog_feed::data::media_store::MediaStore;
use blog_feed::data::membership_store::{Membership, MembershipStore};
use blog_feed::data::post_store::{NewPost, PostPatch, PostStore};
use blog_feed::data::query::{ListQuery, Page, RowFilter};
use blog_feed::data::taxonomy_store::{CategoryStore, TagStore};
use blog_feed::domain::post::Post;
use blog_feed::domain::taxonomy::{Category, Tag, ValidTaxonomy};
use blog_feed::feed::FeedRecord;
use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::BackendClient;
use crate::error::{BackendError, BackendResult};
use crate::http_client::{HttpClient, Prefer, any_of, eq, ilike_pattern};

const POST_ORDER: &str = "created_at.desc,id.desc";
const CATEGORY_ORDER: &str = "name.asc,id.asc";

#[derive(Debug, Serialize)]
struct NewPostDto<'a> {
    title: &'a str,
    slug: &'a str,
    content: &'a str,
    excerpt: Option<&'a str>,
    author_id: Uuid,
    published: bool,
    is_public: bool,
}

impl<'a> From<&'a NewPost> for NewPostDto<'a> {
    fn from(value: &'a NewPost) -> Self {
        Self {
            title: &value.title,
            slug: &value.slug,
            content: &value.content,
            excerpt: value.excerpt.as_deref(),
            author_id: value.author_id,
            published: value.published,
            is_public: value.is_public,
        }
    }
}

#[derive(Debug, Serialize)]
struct PostPatchDto<'a> {
    title: &'a str,
    content: &'a str,
    excerpt: Option<&'a str>,
    published: bool,
    is_public: bool,
    updated_at: DateTime<Utc>,
}

impl<'a> PostPatchDto<'a> {
    fn new(patch: &'a PostPatch, updated_at: DateTime<Utc>) -> Self {
        Self {
            title: &patch.title,
            content: &patch.content,
            excerpt: patch.excerpt.as_deref(),
            published: patch.published,
            is_public: patch.is_public,
            updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct TaxonomyDto<'a> {
    name: &'a str,
    slug: &'a str,
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    color: Option<&'a str>,
}

impl<'a> TaxonomyDto<'a> {
    fn new(input: &'a ValidTaxonomy, color: Option<&'a str>) -> Self {
        Self {
            name: &input.name,
            slug: &input.slug,
            description: input.description.as_deref(),
            color,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MemberRow {
    #[serde(alias = "category_id", alias = "tag_id")]
    member_id: Uuid,
}

fn member_row(kind: Membership, post_id: Uuid, member_id: Uuid) -> serde_json::Value {
    let mut row = serde_json::Map::new();
    row.insert("post_id".to_string(), serde_json::Value::String(post_id.to_string()));
    row.insert(
        kind.member_column().to_string(),
        serde_json::Value::String(member_id.to_string()),
    );
    serde_json::Value::Object(row)
}

#[derive(Debug, Deserialize)]
struct CategoryEmbed {
    categories: Option<Category>,
}

#[derive(Debug, Deserialize)]
struct TagEmbed {
    tags: Option<Tag>,
}

#[derive(Debug, Deserialize)]
struct PostEmbed {
    posts: Option<Post>,
}

#[derive(Debug, Deserialize)]
struct CategoryIdRow {
    category_id: Uuid,
}

fn visibility_params(filter: RowFilter) -> Vec<(&'static str, String)> {
    match filter {
        RowFilter::All => Vec::new(),
        RowFilter::PublicOnly => vec![("published", eq(true)), ("is_public", eq(true))],
    }
}

fn page_params(query: ListQuery, order: &str) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("select", "*".to_string()),
        ("order", order.to_string()),
        ("offset", query.range.offset.to_string()),
        ("limit", query.range.limit.to_string()),
    ];
    params.extend(visibility_params(query.filter));
    params
}

fn first_row<T>(rows: Vec<T>, what: &str) -> BackendResult<T> {
    rows.into_iter()
        .next()
        .ok_or_else(|| BackendError::Decode(format!("{what}: empty representation")))
}

impl BackendClient {
    fn table(&self, method: Method, table: &str, prefer: Prefer) -> RequestBuilder {
        let token = self.access_token();
        self.http.table(method, table, token.as_deref(), prefer)
    }

    async fn fetch_page<R>(&self, table: &str, query: ListQuery, order: &str) -> BackendResult<Page<R>>
    where
        R: serde::de::DeserializeOwned,
    {
        let prefer = if query.count_exact {
            Prefer::CountExact
        } else {
            Prefer::None
        };
        let request = self
            .table(Method::GET, table, prefer)
            .query(&page_params(query, order));
        let (rows, total) = HttpClient::send_counted::<Vec<R>>(request).await?;
        Ok(Page::new(rows, total))
    }

    async fn find_one<R>(&self, table: &str, column: &str, value: String) -> BackendResult<Option<R>>
    where
        R: serde::de::DeserializeOwned,
    {
        let request = self
            .table(Method::GET, table, Prefer::None)
            .query(&[("select", "*".to_string()), (column, value), ("limit", "1".to_string())]);
        let rows = HttpClient::send_json::<Vec<R>>(request).await?;
        Ok(rows.into_iter().next())
    }

    async fn delete_by_id(&self, table: &str, id: Uuid) -> BackendResult<bool> {
        let request = self
            .table(Method::DELETE, table, Prefer::ReturnRepresentation)
            .query(&[("id", eq(id)), ("select", "id".to_string())]);
        let rows = HttpClient::send_json::<Vec<serde_json::Value>>(request).await?;
        Ok(!rows.is_empty())
    }
}

#[async_trait]
impl PostStore for BackendClient {
    async fn insert_post(&self, input: NewPost) -> Result<Post, DomainError> {
        let request = self
            .table(Method::POST, "posts", Prefer::ReturnRepresentation)
            .json(&NewPostDto::from(&input));
        let rows = HttpClient::send_json::<Vec<Post>>(request).await?;
        Ok(first_row(rows, "insert posts")?)
    }

    async fn get_post(&self, id: Uuid) -> Result<Option<Post>, DomainError> {
        Ok(self.find_one("posts", "id", eq(id)).await?)
    }

    async fn find_post_by_slug(&self, slug: &str) -> Result<Option<Post>, DomainError> {
        Ok(self.find_one("posts", "slug", eq(slug)).await?)
    }

    async fn update_post(&self, id: Uuid, patch: PostPatch) -> Result<Option<Post>, DomainError> {
        let request = self
            .table(Method::PATCH, "posts", Prefer::ReturnRepresentation)
            .query(&[("id", eq(id))])
            .json(&PostPatchDto::new(&patch, Utc::now()));
        let rows = HttpClient::send_json::<Vec<Post>>(request).await?;
        Ok(rows.into_iter().next())
    }

    async fn delete_post(&self, id: Uuid) -> Result<bool, DomainError> {
        Ok(self.delete_by_id("posts", id).await?)
    }

    async fn list_posts(&self, query: ListQuery) -> Result<Page<Post>, DomainError> {
        Ok(self.fetch_page("posts", query, POST_ORDER).await?)
    }

    async fn search_posts(
        &self,
        needle: &str,
        filter: RowFilter,
        limit: u64,
    ) -> Result<Vec<Post>, DomainError> {
        let Some(pattern) = ilike_pattern(needle) else {
            return Ok(Vec::new());
        };
        let mut params = vec![
            ("select", "*".to_string()),
            (
                "or",
                format!("(title.ilike.{pattern},excerpt.ilike.{pattern},content.ilike.{pattern})"),
            ),
            ("order", POST_ORDER.to_string()),
            ("limit", limit.to_string()),
        ];
        params.extend(visibility_params(filter));

        let request = self.table(Method::GET, "posts", Prefer::None).query(&params);
        Ok(HttpClient::send_json::<Vec<Post>>(request).await?)
    }
}

#[async_trait]
impl CategoryStore for BackendClient {
    async fn insert_category(&self, input: ValidTaxonomy) -> Result<Category, DomainError> {
        let request = self
            .table(Method::POST, "categories", Prefer::ReturnRepresentation)
            .json(&TaxonomyDto::new(&input, None));
        let rows = HttpClient::send_json::<Vec<Category>>(request).await?;
        Ok(first_row(rows, "insert categories")?)
    }

    async fn update_category(
        &self,
        id: Uuid,
        input: ValidTaxonomy,
    ) -> Result<Option<Category>, DomainError> {
        let request = self
            .table(Method::PATCH, "categories", Prefer::ReturnRepresentation)
            .query(&[("id", eq(id))])
            .json(&TaxonomyDto::new(&input, None));
        let rows = HttpClient::send_json::<Vec<Category>>(request).await?;
        Ok(rows.into_iter().next())
    }

    async fn delete_category(&self, id: Uuid) -> Result<bool, DomainError> {
        Ok(self.delete_by_id("categories", id).await?)
    }

    async fn find_category_by_slug(&self, slug: &str) -> Result<Option<Category>, DomainError> {
        Ok(self.find_one("categories", "slug", eq(slug)).await?)
    }

    async fn list_categories(&self, query: ListQuery) -> Result<Page<Category>, DomainError> {
        // categories carry no visibility flags
        let query = ListQuery {
            filter: RowFilter::All,
            ..query
        };
        Ok(self.fetch_page("categories", query, CATEGORY_ORDER).await?)
    }
}

#[async_trait]
impl TagStore for BackendClient {
    async fn insert_tag(&self, input: ValidTaxonomy, color: &str) -> Result<Tag, DomainError> {
        let request = self
            .table(Method::POST, "tags", Prefer::ReturnRepresentation)
            .json(&TaxonomyDto::new(&input, Some(color)));
        let rows = HttpClient::send_json::<Vec<Tag>>(request).await?;
        Ok(first_row(rows, "insert tags")?)
    }

    async fn list_tags(&self) -> Result<Vec<Tag>, DomainError> {
        let request = self
            .table(Method::GET, "tags", Prefer::None)
            .query(&[("select", "*"), ("order", "name.asc")]);
        Ok(HttpClient::send_json::<Vec<Tag>>(request).await?)
    }

    async fn search_tags(&self, needle: &str, limit: u64) -> Result<Vec<Tag>, DomainError> {
        let Some(pattern) = ilike_pattern(needle) else {
            return Ok(Vec::new());
        };
        let request = self.table(Method::GET, "tags", Prefer::None).query(&[
            ("select", "*".to_string()),
            ("name", format!("ilike.{pattern}")),
            ("order", "name.asc".to_string()),
            ("limit", limit.to_string()),
        ]);
        Ok(HttpClient::send_json::<Vec<Tag>>(request).await?)
    }
}

#[async_trait]
impl MembershipStore for BackendClient {
    async fn member_ids(&self, kind: Membership, post_id: Uuid) -> Result<Vec<Uuid>, DomainError> {
        let request = self
            .table(Method::GET, kind.table(), Prefer::None)
            .query(&[("select", kind.member_column().to_string()), ("post_id", eq(post_id))]);
        let rows = HttpClient::send_json::<Vec<MemberRow>>(request).await?;
        Ok(rows.into_iter().map(|row| row.member_id).collect())
    }

    async fn insert_members(
        &self,
        kind: Membership,
        post_id: Uuid,
        member_ids: &[Uuid],
    ) -> Result<(), DomainError> {
        if member_ids.is_empty() {
            return Ok(());
        }
        let rows: Vec<serde_json::Value> = member_ids
            .iter()
            .map(|member_id| member_row(kind, post_id, *member_id))
            .collect();
        let request = self
            .table(Method::POST, kind.table(), Prefer::ReturnMinimal)
            .json(&rows);
        Ok(HttpClient::send_empty(request).await?)
    }

    async fn delete_member(
        &self,
        kind: Membership,
        post_id: Uuid,
        member_id: Uuid,
    ) -> Result<bool, DomainError> {
        let request = self
            .table(Method::DELETE, kind.table(), Prefer::ReturnRepresentation)
            .query(&[
                ("post_id", eq(post_id)),
                (kind.member_column(), eq(member_id)),
            ]);
        let rows = HttpClient::send_json::<Vec<serde_json::Value>>(request).await?;
        Ok(!rows.is_empty())
    }

    async fn categories_of_post(&self, post_id: Uuid) -> Result<Vec<Category>, DomainError> {
        let request = self
            .table(Method::GET, Membership::Category.table(), Prefer::None)
            .query(&[("select", "categories(*)".to_string()), ("post_id", eq(post_id))]);
        let rows = HttpClient::send_json::<Vec<CategoryEmbed>>(request).await?;
        let mut categories: Vec<Category> = rows.into_iter().filter_map(|row| row.categories).collect();
        categories.sort_by(|a, b| a.feed_order(b));
        Ok(categories)
    }

    async fn tags_of_post(&self, post_id: Uuid) -> Result<Vec<Tag>, DomainError> {
        let request = self
            .table(Method::GET, Membership::Tag.table(), Prefer::None)
            .query(&[("select", "tags(*)".to_string()), ("post_id", eq(post_id))]);
        let rows = HttpClient::send_json::<Vec<TagEmbed>>(request).await?;
        let mut tags: Vec<Tag> = rows.into_iter().filter_map(|row| row.tags).collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    async fn posts_in_category(&self, category_id: Uuid) -> Result<Vec<Post>, DomainError> {
        let request = self
            .table(Method::GET, Membership::Category.table(), Prefer::None)
            .query(&[("select", "posts(*)".to_string()), ("category_id", eq(category_id))]);
        let rows = HttpClient::send_json::<Vec<PostEmbed>>(request).await?;
        // rows hidden by access policies come back as null embeds
        Ok(rows.into_iter().filter_map(|row| row.posts).collect())
    }

    async fn count_posts_by_category(
        &self,
        category_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, u64>, DomainError> {
        if category_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let request = self
            .table(Method::GET, Membership::Category.table(), Prefer::None)
            .query(&[
                ("select", "category_id".to_string()),
                ("category_id", any_of(category_ids)),
            ]);
        let rows = HttpClient::send_json::<Vec<CategoryIdRow>>(request).await?;
        let mut counts = HashMap::new();
        for row in rows {
            *counts.entry(row.category_id).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

#[async_trait]
impl MediaStore for BackendClient {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), DomainError> {
        let token = self.access_token();
        let request = self.http.upload_request(
            &format!("/storage/v1/object/{}/{path}", self.config.media_bucket),
            token.as_deref(),
            bytes,
            content_type,
        );
        Ok(HttpClient::send_empty(request).await?)
    }

    fn public_url(&self, path: &str) -> String {
        self.http.endpoint(&format!(
            "/storage/v1/object/public/{}/{path}",
            self.config.media_bucket
        ))
    }
}
