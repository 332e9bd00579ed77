use tracing::debug;
use uuid::Uuid;

use crate::data::membership_store::{Membership, MembershipStore};
use crate::domain::error::DomainError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipDelta {
    pub added: Vec<Uuid>,
    pub removed: Vec<Uuid>,
}

impl MembershipDelta {
    pub fn between(existing: &[Uuid], desired: &[Uuid]) -> Self {
        let mut delta = Self::default();
        for id in desired {
            if !existing.contains(id) && !delta.added.contains(id) {
                delta.added.push(*id);
            }
        }
        for id in existing {
            if !desired.contains(id) && !delta.removed.contains(id) {
                delta.removed.push(*id);
            }
        }
        delta
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Добавления одной пачкой, удаления по одной; первая ошибка возвращается как есть.
pub async fn reconcile_memberships<S>(
    store: &S,
    kind: Membership,
    post_id: Uuid,
    desired: &[Uuid],
) -> Result<MembershipDelta, DomainError>
where
    S: MembershipStore + ?Sized,
{
    let existing = store.member_ids(kind, post_id).await?;
    let delta = MembershipDelta::between(&existing, desired);
    if delta.is_empty() {
        return Ok(delta);
    }

    if !delta.added.is_empty() {
        store.insert_members(kind, post_id, &delta.added).await?;
    }
    for member_id in &delta.removed {
        store.delete_member(kind, post_id, *member_id).await?;
    }

    debug!(
        table = kind.table(),
        %post_id,
        added = delta.added.len(),
        removed = delta.removed.len(),
        "memberships reconciled"
    );
    Ok(delta)
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{MembershipDelta, reconcile_memberships};
    use crate::data::membership_store::{Membership, MembershipStore};
    use crate::data::memory::MemoryBackend;

    #[test]
    fn delta_is_the_symmetric_difference() {
        let (a, b, c) = (Uuid::from_u128(1), Uuid::from_u128(2), Uuid::from_u128(3));
        let delta = MembershipDelta::between(&[a, b], &[b, c, c]);
        assert_eq!(delta.added, vec![c]);
        assert_eq!(delta.removed, vec![a]);
        assert!(MembershipDelta::between(&[a], &[a]).is_empty());
    }

    #[tokio::test]
    async fn reconcile_only_touches_the_difference() {
        let store = MemoryBackend::new();
        let post_id = Uuid::new_v4();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        store
            .insert_members(Membership::Tag, post_id, &[a, b])
            .await
            .expect("seed memberships");

        let delta = reconcile_memberships(&store, Membership::Tag, post_id, &[b, c])
            .await
            .expect("reconcile must succeed");
        assert_eq!(delta.added, vec![c]);
        assert_eq!(delta.removed, vec![a]);

        let mut stored = store
            .member_ids(Membership::Tag, post_id)
            .await
            .expect("member ids");
        stored.sort();
        let mut expected = vec![b, c];
        expected.sort();
        assert_eq!(stored, expected);

        let categories = store
            .member_ids(Membership::Category, post_id)
            .await
            .expect("member ids");
        assert!(categories.is_empty());
    }
}
