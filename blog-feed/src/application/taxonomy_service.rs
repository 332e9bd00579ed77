use std::collections::HashMap;

use tracing::info;
use uuid::Uuid;

use crate::data::membership_store::MembershipStore;
use crate::data::query::{ListQuery, PageRange, RowFilter};
use crate::data::taxonomy_store::{CategoryStore, TagStore};
use crate::domain::error::DomainError;
use crate::domain::taxonomy::{Category, Tag, TaxonomyInput, tag_color_for};
use crate::domain::user::ViewerContext;

const LIST_LIMIT: u64 = 1000;

pub struct TaxonomyService<S> {
    store: S,
}

impl<S> TaxonomyService<S>
where
    S: CategoryStore + TagStore + MembershipStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn create_category(
        &self,
        viewer: &ViewerContext,
        input: TaxonomyInput,
    ) -> Result<Category, DomainError> {
        viewer.require_user()?;
        let category = self
            .store
            .insert_category(input.validate("cat")?)
            .await?;
        info!(category_id = %category.id, slug = %category.slug, "category created");
        Ok(category)
    }

    pub async fn update_category(
        &self,
        viewer: &ViewerContext,
        id: Uuid,
        input: TaxonomyInput,
    ) -> Result<Category, DomainError> {
        require_admin(viewer)?;
        self.store
            .update_category(id, input.validate("cat")?)
            .await?
            .ok_or(DomainError::NotFound(format!("category id: {id}")))
    }

    pub async fn delete_category(&self, viewer: &ViewerContext, id: Uuid) -> Result<(), DomainError> {
        require_admin(viewer)?;
        if !self.store.delete_category(id).await? {
            return Err(DomainError::NotFound(format!("category id: {id}")));
        }
        info!(category_id = %id, "category deleted");
        Ok(())
    }

    pub async fn list_categories(&self) -> Result<Vec<Category>, DomainError> {
        let page = self
            .store
            .list_categories(ListQuery {
                range: PageRange {
                    offset: 0,
                    limit: LIST_LIMIT,
                },
                filter: RowFilter::All,
                count_exact: false,
            })
            .await?;
        Ok(page.rows)
    }

    pub async fn create_tag(
        &self,
        viewer: &ViewerContext,
        input: TaxonomyInput,
    ) -> Result<Tag, DomainError> {
        viewer.require_user()?;
        let valid = input.validate("tag")?;
        let color = tag_color_for(&valid.slug);
        let tag = self.store.insert_tag(valid, color).await?;
        info!(tag_id = %tag.id, slug = %tag.slug, "tag created");
        Ok(tag)
    }

    pub async fn list_tags(&self) -> Result<Vec<Tag>, DomainError> {
        self.store.list_tags().await
    }

    pub async fn category_post_counts(
        &self,
        category_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, u64>, DomainError> {
        if category_ids.is_empty() {
            return Ok(HashMap::new());
        }
        self.store.count_posts_by_category(category_ids).await
    }
}

fn require_admin(viewer: &ViewerContext) -> Result<(), DomainError> {
    viewer.require_user()?;
    if !viewer.privileged {
        return Err(DomainError::Forbidden);
    }
    Ok(())
}
