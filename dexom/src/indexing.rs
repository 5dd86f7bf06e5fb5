//! Save-time indexing decisions.
//!
//! [`encode`] turns a live entity into the property tree handed to the datastore: each
//! declared field's directive is evaluated against the current instance, and the
//! resulting exclusion flag is written onto the stored value. Embedded entities are
//! walked with their own schema, and a container's exclusion is pushed onto every nested
//! value explicitly, so an unindexed container never hides indexed values inside it.
//!
//! Encoding either resolves every field or fails; a failing condition surfaces as
//! [`RepoError::IndexingPredicate`] and nothing is handed to the datastore.

use log::{debug, trace, warn};
use serde_json::{Map, Number, Value as JsonValue};

use crate::{
    datastore::{EmbeddedEntity, Key, KeyId, Property, PropertyMap, StoredEntity, Value},
    errors::RepoError,
    schema::{Directive, EntitySchema},
    types::Entity,
};

/// Type-erased schema of an embedded entity.
pub(crate) trait NestedSchema: Send + Sync {
    fn kind(&self) -> &'static str;

    /// Encode one embedded value. `container_excluded` is the effective decision of the
    /// field holding it and becomes the embedded value's own flag.
    fn encode(&self, raw: JsonValue, container_excluded: bool, path: &str) -> Result<Property, RepoError>;

    fn decode(&self, entity: &EmbeddedEntity) -> JsonValue;
}

impl<E: Entity> NestedSchema for EntitySchema<E> {
    fn kind(&self) -> &'static str {
        EntitySchema::kind(self)
    }

    fn encode(&self, raw: JsonValue, container_excluded: bool, path: &str) -> Result<Property, RepoError> {
        let pojo: E = serde_json::from_value(raw.clone())?;
        let JsonValue::Object(object) = raw else {
            return Err(RepoError::InvalidRequest {
                message: format!("{path}: embedded {} did not serialize to an object", self.kind()),
            });
        };
        let key = object
            .get(self.id_field())
            .and_then(key_id_from_json)
            .map(|id| Key::new(self.kind(), id));
        let properties = encode_object(self, &pojo, object, container_excluded, path)?;
        Ok(Property::new(
            Value::Entity(EmbeddedEntity { key, properties }),
            container_excluded,
        ))
    }

    fn decode(&self, entity: &EmbeddedEntity) -> JsonValue {
        let mut object = decode_object(self, &entity.properties);
        if let Some(key) = &entity.key {
            object.insert(self.id_field().to_string(), key_id_to_json(&key.id));
        }
        JsonValue::Object(object)
    }
}

/// Property tree for saving `owner`: every value paired with its exclusion flag.
pub fn encode<T: Entity>(schema: &EntitySchema<T>, owner: &T) -> Result<PropertyMap, RepoError> {
    let JsonValue::Object(object) = serde_json::to_value(owner)? else {
        return Err(RepoError::InvalidRequest {
            message: format!("{} did not serialize to an object", schema.kind()),
        });
    };
    let properties = encode_object(schema, owner, object, false, "")?;
    debug!("{}: resolved exclusion flags for {} properties", schema.kind(), properties.len());
    Ok(properties)
}

/// Rebuild an entity from its stored representation.
pub fn decode<T: Entity>(schema: &EntitySchema<T>, stored: &StoredEntity) -> Result<T, RepoError> {
    let mut object = decode_object(schema, &stored.properties);
    object.insert(schema.id_field().to_string(), key_id_to_json(&stored.key.id));
    Ok(serde_json::from_value(JsonValue::Object(object))?)
}

/// Exclusion flag of one field for this save.
pub fn evaluate<T>(
    kind: &str,
    path: &str,
    directive: &Directive<T>,
    owner: &T,
    value: &JsonValue,
) -> Result<bool, RepoError> {
    directive.evaluate(owner, value).map_err(|err| {
        warn!("{kind}.{path}: indexing condition failed: {err}");
        RepoError::IndexingPredicate {
            kind: kind.to_string(),
            field: path.to_string(),
            message: err.message,
        }
    })
}

/// Encode a field that holds embedded entities.
///
/// Nested fields are decided by the embedded schema, then OR-ed with the container's
/// decision. Arrays of embedded entities apply the same rule to every element.
pub(crate) fn apply_to_embedded(
    nested: &dyn NestedSchema,
    raw: JsonValue,
    container_excluded: bool,
    path: &str,
) -> Result<Property, RepoError> {
    match raw {
        JsonValue::Object(_) => nested.encode(raw, container_excluded, path),
        JsonValue::Array(items) => {
            let mut elements = Vec::with_capacity(items.len());
            for item in items {
                elements.push(apply_to_embedded(nested, item, container_excluded, path)?);
            }
            Ok(Property::new(Value::Array(elements), container_excluded))
        }
        other => encode_plain(other, container_excluded, path),
    }
}

fn encode_object<T>(
    schema: &EntitySchema<T>,
    owner: &T,
    mut object: Map<String, JsonValue>,
    container_excluded: bool,
    prefix: &str,
) -> Result<PropertyMap, RepoError> {
    object.remove(schema.id_field());
    let mut properties = PropertyMap::new();

    for field in schema.fields() {
        let path = join_path(prefix, field.name());
        let Some(raw) = object.remove(field.name()) else {
            if field.is_optional() {
                continue;
            }
            return Err(RepoError::InvalidSchema {
                message: format!(
                    "{}.{path} is declared but missing from the serialized entity",
                    schema.kind()
                ),
            });
        };
        let own = evaluate(schema.kind(), &path, field.directive(), owner, &raw)?;
        let excluded = container_excluded || own;
        trace!("{}.{path}: excluded={excluded} (own={own}, container={container_excluded})", schema.kind());

        let property = match field.nested() {
            Some(nested) => apply_to_embedded(nested, raw, excluded, &path)?,
            None => encode_plain(raw, excluded, &path)?,
        };
        properties.insert(field.name().to_string(), property);
    }

    // Serialized keys without a declaration follow the entity default.
    for (name, raw) in object {
        let path = join_path(prefix, &name);
        let own = evaluate(schema.kind(), &path, schema.default_directive(), owner, &raw)?;
        properties.insert(name, encode_plain(raw, container_excluded || own, &path)?);
    }

    Ok(properties)
}

/// Convert a value with no schema of its own, stamping `excluded` on every nested value.
fn encode_plain(raw: JsonValue, excluded: bool, path: &str) -> Result<Property, RepoError> {
    let value = match raw {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(flag) => Value::Bool(flag),
        JsonValue::Number(number) => number_value(&number, path)?,
        JsonValue::String(string) => Value::String(string),
        JsonValue::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| encode_plain(item, excluded, path))
                .collect::<Result<_, _>>()?,
        ),
        JsonValue::Object(object) => {
            let mut properties = PropertyMap::new();
            for (name, item) in object {
                let property = encode_plain(item, excluded, &join_path(path, &name))?;
                properties.insert(name, property);
            }
            Value::Entity(EmbeddedEntity { key: None, properties })
        }
    };
    Ok(Property::new(value, excluded))
}

/// Integers outside the signed 64-bit range are rejected.
fn number_value(number: &Number, path: &str) -> Result<Value, RepoError> {
    if let Some(integer) = number.as_i64() {
        return Ok(Value::Integer(integer));
    }
    if number.is_u64() {
        return Err(RepoError::InvalidRequest {
            message: format!("{path}: integer {number} does not fit in a signed 64-bit integer"),
        });
    }
    number.as_f64().map(Value::Double).ok_or_else(|| RepoError::InvalidRequest {
        message: format!("{path}: unsupported number {number}"),
    })
}

fn decode_object<T>(schema: &EntitySchema<T>, properties: &PropertyMap) -> Map<String, JsonValue> {
    properties
        .iter()
        .map(|(name, property)| {
            let nested = schema.field(name).and_then(|field| field.nested());
            (name.clone(), decode_value(&property.value, nested))
        })
        .collect()
}

fn decode_value(value: &Value, nested: Option<&dyn NestedSchema>) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Bool(flag) => JsonValue::Bool(*flag),
        Value::Integer(integer) => JsonValue::from(*integer),
        Value::Double(double) => Number::from_f64(*double).map_or(JsonValue::Null, JsonValue::Number),
        Value::String(string) => JsonValue::String(string.clone()),
        Value::Array(items) => JsonValue::Array(items.iter().map(|item| decode_value(&item.value, nested)).collect()),
        Value::Entity(entity) => match nested {
            Some(schema) => schema.decode(entity),
            None => JsonValue::Object(
                entity
                    .properties
                    .iter()
                    .map(|(name, property)| (name.clone(), decode_value(&property.value, None)))
                    .collect(),
            ),
        },
    }
}

fn key_id_from_json(value: &JsonValue) -> Option<KeyId> {
    match value {
        JsonValue::Number(number) => number.as_i64().map(KeyId::Id),
        JsonValue::String(name) => Some(KeyId::Name(name.clone())),
        _ => None,
    }
}

fn key_id_to_json(id: &KeyId) -> JsonValue {
    match id {
        KeyId::Id(id) => JsonValue::from(*id),
        KeyId::Name(name) => JsonValue::String(name.clone()),
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        condition::{Condition, IfFalse},
        errors::ConditionError,
        schema::{Embedded, EntityDeclaration, FieldDeclaration, IndexMarker, SchemaBuilder},
    };
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Inner {
        id: Option<i64>,
        foo: bool,
        note: String,
    }

    impl Entity for Inner {
        const KIND: &'static str = "Inner";
        const ID_FIELD: &'static str = "id";

        fn declaration() -> EntityDeclaration<Self> {
            EntityDeclaration::new(Self::KIND, Self::ID_FIELD)
                .field(FieldDeclaration::new("foo").marker(IndexMarker::index()))
                .field(FieldDeclaration::new("note").marker(IndexMarker::unindex_when(Condition::value(IfFalse))))
        }

        fn entity_id(&self) -> Option<KeyId> {
            self.id.map(KeyId::Id)
        }

        fn assign_id(&mut self, id: i64) {
            self.id = Some(id);
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Outer {
        id: Option<i64>,
        inner: Inner,
        many: Vec<Inner>,
        flag: bool,
        extra: Vec<String>,
    }

    impl Entity for Outer {
        const KIND: &'static str = "Outer";
        const ID_FIELD: &'static str = "id";

        fn declaration() -> EntityDeclaration<Self> {
            outer_declaration(IndexMarker::index())
        }

        fn entity_id(&self) -> Option<KeyId> {
            self.id.map(KeyId::Id)
        }

        fn assign_id(&mut self, id: i64) {
            self.id = Some(id);
        }
    }

    fn outer_declaration(inner_marker: IndexMarker<Outer>) -> EntityDeclaration<Outer> {
        EntityDeclaration::new("Outer", "id")
            .marker(IndexMarker::index())
            .field(FieldDeclaration::new("inner").marker(inner_marker).embedded(Embedded::of::<Inner>()))
            .field(FieldDeclaration::new("many").embedded(Embedded::of::<Inner>()))
            .field(FieldDeclaration::new("flag").marker(IndexMarker::index_when(Condition::pojo_fn(|o: &Outer| o.flag))))
    }

    fn sample() -> Outer {
        let inner = Inner {
            id: Some(1),
            foo: true,
            note: "n".to_string(),
        };
        Outer {
            id: Some(2),
            inner: inner.clone(),
            many: vec![inner],
            flag: false,
            extra: vec!["x".to_string()],
        }
    }

    fn stored(properties: PropertyMap) -> StoredEntity {
        StoredEntity::new(Key::new("Outer", 2), properties)
    }

    #[test]
    fn unindexed_container_pushes_exclusion_to_every_nested_value() {
        let schema = SchemaBuilder::from_declaration(outer_declaration(IndexMarker::unindex()), 0).unwrap();
        let properties = encode(&schema, &sample()).unwrap();
        let entity = stored(properties);

        let inner = entity.get("inner").unwrap();
        assert!(inner.exclude_from_indexes);
        let embedded = inner.value.as_entity().unwrap();
        assert_eq!(embedded.key, Some(Key::new("Inner", 1)));
        assert!(!embedded.properties.contains_key("id"));
        for flat in entity.flatten().iter().filter(|flat| flat.path.starts_with("inner")) {
            assert!(flat.exclude_from_indexes, "{} should be excluded", flat.path);
        }
    }

    #[test]
    fn indexed_container_honours_nested_directives() {
        let schema = SchemaBuilder::from_declaration(outer_declaration(IndexMarker::index()), 0).unwrap();
        let entity = stored(encode(&schema, &sample()).unwrap());

        assert!(!entity.property_at("inner").unwrap().exclude_from_indexes);
        assert!(!entity.property_at("inner.foo").unwrap().exclude_from_indexes);
        // `note` is a string, so IfFalse does not match and the value stays indexed.
        assert!(!entity.property_at("inner.note").unwrap().exclude_from_indexes);
    }

    #[test]
    fn arrays_of_embedded_entities_use_the_nested_schema() {
        let schema = SchemaBuilder::from_declaration(outer_declaration(IndexMarker::index()), 0).unwrap();
        let entity = stored(encode(&schema, &sample()).unwrap());

        // `many` has no marker of its own; the entity default indexes it.
        let many = entity.get("many").unwrap();
        let Value::Array(items) = &many.value else {
            panic!("expected array");
        };
        let element = items[0].value.as_entity().unwrap();
        assert!(!element.properties["foo"].exclude_from_indexes);
        assert!(entity.index_entries().contains(&("many.foo".to_string(), Value::Bool(true))));
    }

    #[test]
    fn whole_object_condition_sees_sibling_fields() {
        let schema = SchemaBuilder::from_declaration(outer_declaration(IndexMarker::index()), 0).unwrap();
        let mut outer = sample();
        let entity = stored(encode(&schema, &outer).unwrap());
        assert!(entity.get("flag").unwrap().exclude_from_indexes);

        outer.flag = true;
        let entity = stored(encode(&schema, &outer).unwrap());
        assert!(!entity.get("flag").unwrap().exclude_from_indexes);
    }

    #[test]
    fn undeclared_keys_follow_entity_default() {
        let schema = SchemaBuilder::from_declaration(outer_declaration(IndexMarker::index()), 0).unwrap();
        let entity = stored(encode(&schema, &sample()).unwrap());
        let extra = entity.get("extra").unwrap();
        assert!(!extra.exclude_from_indexes);
        let Value::Array(items) = &extra.value else {
            panic!("expected array");
        };
        assert!(!items[0].exclude_from_indexes);
    }

    #[test]
    fn failing_condition_aborts_encoding() {
        let declaration = EntityDeclaration::<Outer>::new("Outer", "id").field(
            FieldDeclaration::new("flag").marker(IndexMarker::index_when(Condition::try_pojo_fn(|_: &Outer| {
                Err(ConditionError::new("cannot decide"))
            }))),
        );
        let schema = SchemaBuilder::from_declaration(declaration, 0).unwrap();
        match encode(&schema, &sample()) {
            Err(RepoError::IndexingPredicate { kind, field, message }) => {
                assert_eq!(kind, "Outer");
                assert_eq!(field, "flag");
                assert_eq!(message, "cannot decide");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn declared_fields_must_be_serialized() {
        let declaration = EntityDeclaration::<Outer>::new("Outer", "id").field(FieldDeclaration::new("ghost"));
        let schema = SchemaBuilder::from_declaration(declaration, 0).unwrap();
        match encode(&schema, &sample()) {
            Err(RepoError::InvalidSchema { message }) => assert!(message.contains("Outer.ghost"), "{message}"),
            other => panic!("unexpected result {other:?}"),
        }

        let declaration =
            EntityDeclaration::<Outer>::new("Outer", "id").field(FieldDeclaration::new("ghost").optional());
        let schema = SchemaBuilder::from_declaration(declaration, 0).unwrap();
        assert!(encode(&schema, &sample()).is_ok());
    }

    #[test]
    fn unsigned_integers_beyond_i64_are_rejected() {
        let declaration = EntityDeclaration::<Outer>::new("Outer", "id").marker(IndexMarker::index());
        let schema = SchemaBuilder::from_declaration(declaration, 0).unwrap();
        let raw = serde_json::json!({ "counts": [1, u64::MAX] });
        let JsonValue::Object(object) = raw else {
            panic!("expected object");
        };
        match encode_object(&schema, &sample(), object, false, "") {
            Err(RepoError::InvalidRequest { message }) => assert!(message.starts_with("counts:"), "{message}"),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn decode_restores_ids_and_embedded_values() {
        let schema = SchemaBuilder::from_declaration(outer_declaration(IndexMarker::unindex()), 0).unwrap();
        let original = sample();
        let entity = stored(encode(&schema, &original).unwrap());
        let decoded: Outer = decode(&schema, &entity).unwrap();
        assert_eq!(decoded, original);
    }
}
