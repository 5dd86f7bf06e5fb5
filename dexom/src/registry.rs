use std::{
    any::{Any, TypeId, type_name},
    collections::HashMap,
    sync::{Arc, OnceLock},
};

use log::info;
use parking_lot::RwLock;

use crate::{
    errors::RepoError,
    schema::{EntitySchema, SchemaBuilder},
    types::Entity,
};

type SchemaSlot = Arc<dyn Any + Send + Sync>;

#[derive(Default)]
struct RegistryState {
    schemas: HashMap<TypeId, SchemaSlot>,
    kinds: HashMap<&'static str, &'static str>,
}

/// Resolved schemas, keyed by entity type.
///
/// A schema is built once, when its type is registered, and read-only afterwards.
#[derive(Default)]
pub struct Registry {
    state: RwLock<RegistryState>,
}

static GLOBAL: OnceLock<Arc<Registry>> = OnceLock::new();

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry shared by clients created with [`crate::Client::new`].
    pub fn global() -> Arc<Registry> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Registry::new())))
    }

    /// Resolve and store the schema of `T`. Registering the same type again returns the
    /// existing schema.
    pub fn register<T: Entity>(&self) -> Result<Arc<EntitySchema<T>>, RepoError> {
        if let Some(schema) = self.lookup::<T>() {
            return Ok(schema);
        }

        let schema = Arc::new(SchemaBuilder::build::<T>()?);

        let mut state = self.state.write();
        match state.kinds.get(T::KIND) {
            Some(existing) if *existing != type_name::<T>() => {
                return Err(RepoError::InvalidSchema {
                    message: format!("kind {} is already registered by {existing}", T::KIND),
                });
            }
            _ => {}
        }
        let slot = state
            .schemas
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Arc::clone(&schema) as SchemaSlot)
            .clone();
        state.kinds.insert(T::KIND, type_name::<T>());
        drop(state);

        info!("registered entity kind {} ({} fields)", T::KIND, schema.fields().len());
        slot.downcast::<EntitySchema<T>>().map_err(|_| RepoError::Other {
            message: format!("schema slot for {} holds another type", T::KIND).into(),
        })
    }

    /// Schema of a registered type.
    pub fn schema<T: Entity>(&self) -> Result<Arc<EntitySchema<T>>, RepoError> {
        self.lookup::<T>().ok_or(RepoError::NotRegistered {
            type_name: type_name::<T>(),
        })
    }

    pub fn is_registered<T: Entity>(&self) -> bool {
        self.state.read().schemas.contains_key(&TypeId::of::<T>())
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.state.read().kinds.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }

    fn lookup<T: Entity>(&self) -> Option<Arc<EntitySchema<T>>> {
        let slot = self.state.read().schemas.get(&TypeId::of::<T>()).cloned()?;
        slot.downcast::<EntitySchema<T>>().ok()
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::{
        datastore::KeyId,
        schema::{Embedded, EntityDeclaration, FieldDeclaration, IndexMarker},
    };

    #[derive(Serialize, Deserialize)]
    struct Note {
        id: Option<i64>,
        body: String,
    }

    impl Entity for Note {
        const KIND: &'static str = "Note";
        const ID_FIELD: &'static str = "id";

        fn declaration() -> EntityDeclaration<Self> {
            EntityDeclaration::new(Self::KIND, Self::ID_FIELD).field(FieldDeclaration::new("body").marker(IndexMarker::index()))
        }

        fn entity_id(&self) -> Option<KeyId> {
            self.id.map(KeyId::Id)
        }

        fn assign_id(&mut self, id: i64) {
            self.id = Some(id);
        }
    }

    #[derive(Serialize, Deserialize)]
    struct OtherNote {
        id: Option<i64>,
    }

    impl Entity for OtherNote {
        const KIND: &'static str = "Note";
        const ID_FIELD: &'static str = "id";

        fn declaration() -> EntityDeclaration<Self> {
            EntityDeclaration::new(Self::KIND, Self::ID_FIELD)
        }

        fn entity_id(&self) -> Option<KeyId> {
            self.id.map(KeyId::Id)
        }

        fn assign_id(&mut self, id: i64) {
            self.id = Some(id);
        }
    }

    #[derive(Serialize, Deserialize)]
    struct Nested {
        id: Option<i64>,
        child: Option<Box<Nested>>,
    }

    impl Entity for Nested {
        const KIND: &'static str = "Nested";
        const ID_FIELD: &'static str = "id";

        fn declaration() -> EntityDeclaration<Self> {
            EntityDeclaration::new(Self::KIND, Self::ID_FIELD)
                .field(FieldDeclaration::new("child").embedded(Embedded::of::<Nested>()))
        }

        fn entity_id(&self) -> Option<KeyId> {
            self.id.map(KeyId::Id)
        }

        fn assign_id(&mut self, id: i64) {
            self.id = Some(id);
        }
    }

    #[test]
    fn register_is_idempotent() {
        let registry = Registry::new();
        let first = registry.register::<Note>().unwrap();
        let second = registry.register::<Note>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(registry.is_registered::<Note>());
        assert_eq!(registry.kinds(), vec!["Note"]);
    }

    #[test]
    fn unregistered_types_are_reported() {
        let registry = Registry::new();
        assert!(matches!(
            registry.schema::<Note>(),
            Err(RepoError::NotRegistered { .. })
        ));
    }

    #[test]
    fn kinds_are_unique() {
        let registry = Registry::new();
        registry.register::<Note>().unwrap();
        assert!(matches!(
            registry.register::<OtherNote>(),
            Err(RepoError::InvalidSchema { .. })
        ));
    }

    #[test]
    fn self_embedding_types_are_rejected() {
        let registry = Registry::new();
        assert!(matches!(
            registry.register::<Nested>(),
            Err(RepoError::InvalidSchema { .. })
        ));
        assert!(!registry.is_registered::<Nested>());
    }
}
