//! Stored representation of entities.
//!
//! Every value written to a datastore is wrapped in a [`Property`] that carries its own
//! `exclude_from_indexes` flag. Embedded entities and array elements are properties too,
//! so the flags form a tree parallel to the values.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

/// Identifier part of a [`Key`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyId {
    Id(i64),
    Name(String),
}

impl KeyId {
    /// Segment used when the key is embedded in a storage key string.
    pub fn segment(&self) -> String {
        match self {
            KeyId::Id(id) => format!("id:{id}"),
            KeyId::Name(name) => format!("name:{name}"),
        }
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyId::Id(id) => write!(f, "{id}"),
            KeyId::Name(name) => write!(f, "{name:?}"),
        }
    }
}

impl From<i64> for KeyId {
    fn from(id: i64) -> Self {
        KeyId::Id(id)
    }
}

impl From<&str> for KeyId {
    fn from(name: &str) -> Self {
        KeyId::Name(name.to_string())
    }
}

impl From<String> for KeyId {
    fn from(name: String) -> Self {
        KeyId::Name(name)
    }
}

/// Complete datastore key: entity kind plus identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Key {
    pub kind: String,
    pub id: KeyId,
}

impl Key {
    pub fn new(kind: impl Into<String>, id: impl Into<KeyId>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind, self.id)
    }
}

pub type PropertyMap = BTreeMap<String, Property>;

/// A datastore value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Array(Vec<Property>),
    Entity(EmbeddedEntity),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Entity(_) => "entity",
        }
    }

    /// Token identifying this value inside an equality index.
    ///
    /// Arrays and embedded entities have no token of their own; their elements and
    /// nested properties are indexed individually.
    pub fn index_token(&self) -> Option<String> {
        match self {
            Value::Null => Some("n".to_string()),
            Value::Bool(value) => Some(format!("b:{value}")),
            Value::Integer(value) => Some(format!("i:{value}")),
            Value::Double(value) if value.is_nan() => None,
            // -0.0 == 0.0, so both share a bucket.
            Value::Double(value) => Some(format!("d:{}", if *value == 0.0 { 0.0 } else { *value })),
            Value::String(value) => Some(format!("s:{value}")),
            Value::Array(_) | Value::Entity(_) => None,
        }
    }

    pub fn as_entity(&self) -> Option<&EmbeddedEntity> {
        match self {
            Value::Entity(entity) => Some(entity),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Integer(value) => write!(f, "{value}"),
            Value::Double(value) => write!(f, "{value}"),
            Value::String(value) => write!(f, "{value:?}"),
            Value::Array(items) => write!(f, "[{} items]", items.len()),
            Value::Entity(entity) => match &entity.key {
                Some(key) => write!(f, "{key} {{{} properties}}", entity.properties.len()),
                None => write!(f, "{{{} properties}}", entity.properties.len()),
            },
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

/// A stored value together with its index exclusion flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub value: Value,
    #[serde(default)]
    pub exclude_from_indexes: bool,
}

impl Property {
    pub fn new(value: Value, exclude_from_indexes: bool) -> Self {
        Self {
            value,
            exclude_from_indexes,
        }
    }

    pub fn indexed(value: impl Into<Value>) -> Self {
        Self::new(value.into(), false)
    }

    pub fn unindexed(value: impl Into<Value>) -> Self {
        Self::new(value.into(), true)
    }
}

/// Entity stored inside another entity's property.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EmbeddedEntity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<Key>,
    pub properties: PropertyMap,
}

/// Entity as written to and read from a datastore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntity {
    pub key: Key,
    pub properties: PropertyMap,
}

/// One leaf of a flattened property tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlatProperty {
    pub path: String,
    pub value: Value,
    pub exclude_from_indexes: bool,
}

impl StoredEntity {
    pub fn new(key: Key, properties: PropertyMap) -> Self {
        Self { key, properties }
    }

    pub fn get(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    /// Follow a dotted path (`embedded.foo`) through embedded entities.
    pub fn property_at(&self, path: &str) -> Option<&Property> {
        let mut segments = path.split('.');
        let mut current = self.properties.get(segments.next()?)?;
        for segment in segments {
            current = current.value.as_entity()?.properties.get(segment)?;
        }
        Some(current)
    }

    /// Every property in the tree, including embedded entities and array elements,
    /// in path order. Containers are listed before their children.
    pub fn flatten(&self) -> Vec<FlatProperty> {
        let mut out = Vec::new();
        flatten_into(&self.properties, "", &mut out);
        out
    }

    /// `(path, value)` pairs that an equality index must contain for this entity.
    ///
    /// Only leaf values whose own flag is clear are returned. Containers are never
    /// consulted; their exclusion has to have been pushed down to each nested value.
    pub fn index_entries(&self) -> Vec<(String, Value)> {
        let mut out = Vec::new();
        collect_index_entries(&self.properties, "", &mut out);
        out
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

fn flatten_into(properties: &PropertyMap, prefix: &str, out: &mut Vec<FlatProperty>) {
    for (name, property) in properties {
        let path = join_path(prefix, name);
        flatten_property(property, path, out);
    }
}

fn flatten_property(property: &Property, path: String, out: &mut Vec<FlatProperty>) {
    out.push(FlatProperty {
        path: path.clone(),
        value: property.value.clone(),
        exclude_from_indexes: property.exclude_from_indexes,
    });
    match &property.value {
        Value::Entity(entity) => flatten_into(&entity.properties, &path, out),
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                flatten_property(item, format!("{path}[{index}]"), out);
            }
        }
        _ => {}
    }
}

fn collect_index_entries(properties: &PropertyMap, prefix: &str, out: &mut Vec<(String, Value)>) {
    for (name, property) in properties {
        let path = join_path(prefix, name);
        collect_property_entries(property, &path, out);
    }
}

fn collect_property_entries(property: &Property, path: &str, out: &mut Vec<(String, Value)>) {
    match &property.value {
        Value::Entity(entity) => collect_index_entries(&entity.properties, path, out),
        // Elements share the array's path, so a filter on `tags` matches any element.
        Value::Array(items) => {
            for item in items {
                collect_property_entries(item, path, out);
            }
        }
        leaf => {
            if !property.exclude_from_indexes {
                out.push((path.to_string(), leaf.clone()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StoredEntity {
        let mut nested = PropertyMap::new();
        nested.insert("foo".to_string(), Property::unindexed(true));
        let mut properties = PropertyMap::new();
        properties.insert(
            "embedded".to_string(),
            Property::new(
                Value::Entity(EmbeddedEntity {
                    key: Some(Key::new("Inner", 1)),
                    properties: nested,
                }),
                true,
            ),
        );
        properties.insert("name".to_string(), Property::indexed("blah"));
        properties.insert(
            "tags".to_string(),
            Property::new(
                Value::Array(vec![Property::indexed("a"), Property::unindexed("b")]),
                false,
            ),
        );
        StoredEntity::new(Key::new("Outer", 2), properties)
    }

    #[test]
    fn property_at_walks_embedded_entities() {
        let entity = sample();
        let foo = entity.property_at("embedded.foo").expect("nested property");
        assert_eq!(foo.value, Value::Bool(true));
        assert!(foo.exclude_from_indexes);
        assert!(entity.property_at("embedded.missing").is_none());
        assert!(entity.property_at("name.foo").is_none());
    }

    #[test]
    fn index_entries_skip_excluded_leaves() {
        let entries = sample().index_entries();
        assert_eq!(
            entries,
            vec![
                ("name".to_string(), Value::from("blah")),
                ("tags".to_string(), Value::from("a")),
            ]
        );
    }

    #[test]
    fn flatten_lists_containers_before_children() {
        let paths: Vec<String> = sample().flatten().into_iter().map(|p| p.path).collect();
        assert_eq!(
            paths,
            vec!["embedded", "embedded.foo", "name", "tags", "tags[0]", "tags[1]"]
        );
    }

    #[test]
    fn stored_json_keeps_exclusion_flags() {
        let json = serde_json::to_value(sample()).expect("serialize");
        assert_eq!(json["key"]["id"], serde_json::json!(2));
        assert_eq!(json["properties"]["embedded"]["exclude_from_indexes"], serde_json::json!(true));
        assert_eq!(
            json["properties"]["embedded"]["value"]["value"]["properties"]["foo"]["exclude_from_indexes"],
            serde_json::json!(true)
        );
        let back: StoredEntity = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, sample());
    }

    #[test]
    fn equal_doubles_share_a_token() {
        assert_eq!(Value::Double(-0.0), Value::Double(0.0));
        assert_eq!(Value::Double(-0.0).index_token(), Value::Double(0.0).index_token());
        assert_eq!(Value::Double(1.5).index_token().as_deref(), Some("d:1.5"));
        assert_eq!(Value::Double(f64::NAN).index_token(), None);
    }

    #[test]
    fn key_display_distinguishes_ids_and_names() {
        assert_eq!(Key::new("Thing", 2).to_string(), "Thing(2)");
        assert_eq!(Key::new("Thing", "abc").to_string(), "Thing(\"abc\")");
    }
}
