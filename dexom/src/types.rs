use serde::{Serialize, de::DeserializeOwned};

use crate::{datastore::KeyId, schema::EntityDeclaration};

/// Trait for types persisted by dexom, top-level or embedded.
///
/// This trait is normally implemented by `#[derive(Entity)]`. The entity must serialize
/// to a JSON object; every key of that object except the id field becomes a property.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Datastore kind name.
    const KIND: &'static str;

    /// Name of the serialized id field. It becomes the key and is never a property.
    const ID_FIELD: &'static str;

    /// Index markers declared on the type and its fields.
    fn declaration() -> EntityDeclaration<Self>;

    /// Current id, or `None` when the datastore should allocate one on save.
    fn entity_id(&self) -> Option<KeyId>;

    /// Write back an allocated id. Types with caller-assigned ids ignore this.
    fn assign_id(&mut self, id: i64);
}
