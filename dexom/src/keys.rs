use crate::datastore::Key;

/// Redis key-construction helpers for one entity kind.
#[derive(Debug, Clone)]
pub struct KeyContext<'a> {
    pub prefix: &'a str,
    pub kind: &'a str,
}

impl<'a> KeyContext<'a> {
    pub fn new(prefix: &'a str, kind: &'a str) -> Self {
        Self { prefix, kind }
    }

    pub fn entity(&self, key: &Key) -> String {
        format!("{}:{}:e:{}", self.prefix, self.kind, key.id.segment())
    }

    /// Set of index keys the entity is currently a member of. Kept out of the `e:`
    /// namespace, which holds arbitrary entity names.
    pub fn entity_indexes(&self, key: &Key) -> String {
        format!("{}:{}:x:{}", self.prefix, self.kind, key.id.segment())
    }

    /// Equality index bucket: members are entity keys whose `path` holds the value `token`.
    pub fn index(&self, path: &str, token: &str) -> String {
        format!("{}:{}:i:{}={}", self.prefix, self.kind, path, token)
    }

    /// Set of every entity key of this kind.
    pub fn members(&self) -> String {
        format!("{}:{}:all", self.prefix, self.kind)
    }

    pub fn sequence(&self) -> String {
        format!("{}:{}:seq", self.prefix, self.kind)
    }
}
