use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;
use uuid::Uuid;

use crate::commands::{CommandSet, Commandable};
use crate::dummy::{DataPage, Dummy, DummyCommandSet, FilterParams, PagingParams};

/// In-memory CRUD over [`Dummy`] entities. Clones share the same storage.
#[derive(Clone, Default)]
pub struct DummyController {
    entities: Arc<Mutex<Vec<Dummy>>>,
}

impl DummyController {
    pub fn new() -> Self {
        Self::default()
    }

    fn entities(&self) -> MutexGuard<'_, Vec<Dummy>> {
        self.entities.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Entities matching the optional `key` filter, `skip` 0 and `take` 100
    /// by default.
    pub fn get_page_by_filter(
        &self,
        _correlation_id: Option<&str>,
        filter: &FilterParams,
        paging: &PagingParams,
    ) -> DataPage<Dummy> {
        let key = filter.get_as_nullable_string("key");
        let skip = paging.get_skip(0) as usize;
        let take = paging.get_take(100) as usize;

        let entities = self.entities();
        let matching = entities
            .iter()
            .filter(|entity| key.map_or(true, |key| entity.key == key));
        let total = paging.total.then(|| matching.clone().count() as i64);

        DataPage {
            total,
            data: matching.skip(skip).take(take).cloned().collect(),
        }
    }

    pub fn get_one_by_id(&self, _correlation_id: Option<&str>, id: &str) -> Option<Dummy> {
        self.entities()
            .iter()
            .find(|entity| entity.id.as_deref() == Some(id))
            .cloned()
    }

    /// Stores the entity, generating its id when it has none.
    pub fn create(&self, correlation_id: Option<&str>, mut entity: Dummy) -> Dummy {
        if entity.id.as_deref().map_or(true, str::is_empty) {
            entity.id = Some(Uuid::new_v4().simple().to_string());
        }
        self.entities().push(entity.clone());
        debug!(
            correlation_id = correlation_id.unwrap_or_default(),
            "Created dummy {}",
            entity.id.as_deref().unwrap_or_default()
        );
        entity
    }

    /// Replaces the entity with the same id; `None` when there is none.
    pub fn update(&self, _correlation_id: Option<&str>, entity: Dummy) -> Option<Dummy> {
        let mut entities = self.entities();
        let existing = entities
            .iter_mut()
            .find(|existing| entity.id.is_some() && existing.id == entity.id)?;
        *existing = entity.clone();
        Some(entity)
    }

    pub fn delete_by_id(&self, _correlation_id: Option<&str>, id: &str) -> Option<Dummy> {
        let mut entities = self.entities();
        let index = entities
            .iter()
            .position(|entity| entity.id.as_deref() == Some(id))?;
        Some(entities.remove(index))
    }
}

impl Commandable for DummyController {
    fn get_command_set(&self) -> CommandSet {
        DummyCommandSet::new(self.clone()).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crud() {
        let controller = DummyController::new();
        let created = controller.create(None, Dummy::new("K1", "C1"));
        let id = created.id.clone().unwrap();
        assert!(!id.is_empty());
        controller.create(None, Dummy::new("K2", "C2"));

        let page = controller.get_page_by_filter(
            None,
            &FilterParams::new().with("key", "K1"),
            &PagingParams::new(None, None, true),
        );
        assert_eq!(page.total, Some(1));
        assert_eq!(page.data, vec![created.clone()]);

        let page = controller.get_page_by_filter(
            None,
            &FilterParams::new(),
            &PagingParams::new(Some(1), Some(5), false),
        );
        assert_eq!(page.total, None);
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].key, "K2");

        let mut changed = created.clone();
        changed.content = "C1 updated".to_string();
        assert_eq!(controller.update(None, changed.clone()), Some(changed.clone()));
        assert_eq!(controller.get_one_by_id(None, &id), Some(changed.clone()));
        assert_eq!(controller.update(None, Dummy::new("K3", "C3")), None);

        assert_eq!(controller.delete_by_id(None, &id), Some(changed));
        assert_eq!(controller.delete_by_id(None, &id), None);
        assert_eq!(controller.get_one_by_id(None, &id), None);
    }
}
